/// Marker inserted where middle-out truncation removed content.
pub const OMISSION_MARKER: &str = "\n\n[... content omitted for length ...]\n\n";

/// How a character budget is divided between the kept head and tail.
///
/// The remainder (`1 - head - tail`) absorbs the marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub head: f64,
    pub tail: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            head: 0.60,
            tail: 0.35,
        }
    }
}

impl SplitRatios {
    /// Characters kept from the start and the end for a budget of `max_chars`.
    #[must_use]
    pub fn split(&self, max_chars: usize) -> (usize, usize) {
        let head = (max_chars as f64 * self.head).floor() as usize;
        let tail = (max_chars as f64 * self.tail).floor() as usize;
        (head, tail)
    }
}

/// Shorten `text` to roughly `max_chars` characters by eliding its middle.
///
/// Text of at most `max_chars` characters is returned unchanged. Otherwise the
/// result is the first `head * max_chars` characters, [`OMISSION_MARKER`], and
/// the last `tail * max_chars` characters. Lengths are counted in `char`s.
///
/// Applying the function twice with the same arguments yields the same
/// string as applying it once: the head and tail of a truncated string are
/// the head and tail of the original.
///
/// # Example
///
/// ```rust
/// use specflow_packet::{OMISSION_MARKER, SplitRatios, middle_out_truncate};
///
/// let text = "a".repeat(600) + &"b".repeat(1400);
/// let out = middle_out_truncate(&text, 1000, SplitRatios::default());
/// assert!(out.starts_with(&"a".repeat(600)));
/// assert!(out.ends_with(&"b".repeat(350)));
/// assert!(out.contains(OMISSION_MARKER));
/// ```
#[must_use]
pub fn middle_out_truncate(text: &str, max_chars: usize, ratios: SplitRatios) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let (head, tail) = ratios.split(max_chars);
    let head_end = byte_offset(text, head);
    let tail_start = byte_offset(text, total - tail);

    let mut out = String::with_capacity(head_end + OMISSION_MARKER.len() + text.len() - tail_start);
    out.push_str(&text[..head_end]);
    out.push_str(OMISSION_MARKER);
    out.push_str(&text[tail_start..]);
    out
}

/// Byte offset of the `n`th char, or `text.len()` past the end.
pub(crate) fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}
