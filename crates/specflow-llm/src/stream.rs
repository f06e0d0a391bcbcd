//! Streaming response handles and server-sent event decoding

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use specflow_utils::error::LlmError;

/// Source of raw response body chunks
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LlmError>;
}

/// Handle to a `text/event-stream` response body that has not been read yet.
pub struct StreamHandle {
    source: Box<dyn ChunkSource>,
}

impl StreamHandle {
    #[must_use]
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        Self { source }
    }

    /// In-memory handle yielding the given chunks in order.
    #[must_use]
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self::new(Box::new(ScriptedChunks(
            chunks.into_iter().map(Into::into).collect(),
        )))
    }

    /// Next raw body chunk.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Stream` if the connection fails mid-body.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LlmError> {
        self.source.next_chunk().await
    }

    /// Drain the remaining body.
    ///
    /// # Errors
    ///
    /// Propagates chunk read failures.
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>, LlmError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

struct ScriptedChunks(VecDeque<Vec<u8>>);

#[async_trait]
impl ChunkSource for ScriptedChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LlmError> {
        Ok(self.0.pop_front())
    }
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<crate::types::ErrorBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Content deltas decoded from a completion event stream.
///
/// Lines beginning with `:` are keep-alive comments and are skipped. The
/// stream ends at `data: [DONE]` or when the body is exhausted.
#[derive(Debug)]
pub struct CompletionStream {
    handle: StreamHandle,
    // Raw bytes; a chunk boundary may fall inside a multi-byte character.
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl CompletionStream {
    #[must_use]
    pub fn new(handle: StreamHandle) -> Self {
        Self {
            handle,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// A stream that yields `content` once. Used when the server ignores
    /// `stream: true` and answers with a plain JSON body.
    pub(crate) fn from_content(content: String) -> Self {
        let mut stream = Self::new(StreamHandle::from_chunks(Vec::<Vec<u8>>::new()));
        if !content.is_empty() {
            stream.pending.push_back(content);
        }
        stream.done = true;
        stream
    }

    /// Next content delta.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Stream` for transport failures or an in-band error
    /// event, and `LlmError::Parse` for undecodable event payloads.
    pub async fn next_delta(&mut self) -> Result<Option<String>, LlmError> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                return Ok(Some(delta));
            }
            if self.done {
                return Ok(None);
            }
            match self.handle.next_chunk().await? {
                Some(chunk) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.drain_lines()?;
                }
                None => {
                    let rest = std::mem::take(&mut self.buffer);
                    self.handle_line(String::from_utf8_lossy(&rest).trim_end_matches('\r'))?;
                    self.done = true;
                }
            }
        }
    }

    /// Concatenate all remaining deltas.
    ///
    /// # Errors
    ///
    /// Propagates the first stream error.
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(delta) = self.next_delta().await? {
            text.push_str(&delta);
        }
        Ok(text)
    }

    fn drain_lines(&mut self) -> Result<(), LlmError> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\n', '\r']))?;
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<(), LlmError> {
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let event: StreamEvent = serde_json::from_str(data)?;
        if let Some(error) = event.error {
            return Err(LlmError::Stream(
                error
                    .message
                    .unwrap_or_else(|| "stream reported an error".to_string()),
            ));
        }
        if let Some(content) = event
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|c| !c.is_empty())
        {
            self.pending.push_back(content);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decodes_deltas_split_across_chunks() {
        let handle = StreamHandle::from_chunks([
            ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"lo\"}}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        ]);
        let text = CompletionStream::new(handle).collect_text().await.unwrap();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{6f22}\"}}]}\n\n";
        let bytes = event.as_bytes();
        let e_acute = bytes.iter().position(|&b| b == 0xC3).unwrap();
        let han = bytes.iter().position(|&b| b == 0xE6).unwrap();
        let handle = StreamHandle::from_chunks([
            bytes[..=e_acute].to_vec(),
            bytes[e_acute + 1..han + 2].to_vec(),
            bytes[han + 2..].to_vec(),
        ]);
        let text = CompletionStream::new(handle).collect_text().await.unwrap();
        assert_eq!(text, "caf\u{e9} \u{6f22}");
    }

    #[tokio::test]
    async fn test_last_line_without_newline_is_decoded() {
        let handle =
            StreamHandle::from_chunks(["data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}"]);
        let text = CompletionStream::new(handle).collect_text().await.unwrap();
        assert_eq!(text, "end");
    }

    #[tokio::test]
    async fn test_in_band_error_event() {
        let handle = StreamHandle::from_chunks(["data: {\"error\":{\"message\":\"overloaded\"}}\n"]);
        let err = CompletionStream::new(handle).collect_text().await.unwrap_err();
        assert!(matches!(err, LlmError::Stream(ref m) if m == "overloaded"));
    }

    #[tokio::test]
    async fn test_invalid_event_json_is_parse_error() {
        let handle = StreamHandle::from_chunks(["data: {not json\n"]);
        let err = CompletionStream::new(handle).collect_text().await.unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[tokio::test]
    async fn test_collect_bytes() {
        let handle = StreamHandle::from_chunks(["ab", "cd"]);
        assert_eq!(handle.collect_bytes().await.unwrap(), b"abcd");
    }
}
