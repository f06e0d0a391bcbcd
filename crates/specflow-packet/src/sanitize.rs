use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Replaces a `data:` URL carrying base64 content.
pub const DATA_URL_PLACEHOLDER: &str = "[binary data omitted]";

/// Replaces a long run of base64-looking characters.
pub const BASE64_PLACEHOLDER: &str = "[base64 content omitted]";

/// Runs of at least this many base64 characters are candidates for stripping.
const MIN_BASE64_RUN: usize = 200;

/// Encoded binary uses most of the alphabet; hex digests top out at 22.
const MIN_DISTINCT_SYMBOLS: usize = 32;

static DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:[A-Za-z0-9.+/-]+(?:;[A-Za-z0-9.+=-]+)*;base64,[A-Za-z0-9+/=]*")
        .expect("valid regex")
});

static LONG_BASE64: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"[A-Za-z0-9+/]{{{MIN_BASE64_RUN},}}={{0,2}}")).expect("valid regex")
});

/// Replace embedded binaries with short placeholders.
///
/// Data URLs and long base64 runs inflate the character count, and so the
/// token estimate, without carrying anything a language model can use.
/// A run only counts as base64 when it mixes digits with both letter cases
/// and uses a wide spread of symbols, so long identifiers, hex digests and
/// repeated words pass through untouched. The placeholders never match
/// again, so this is idempotent.
#[must_use]
pub fn strip_binary(text: &str) -> Cow<'_, str> {
    let stripped = DATA_URL.replace_all(text, DATA_URL_PLACEHOLDER);
    match strip_base64_runs(&stripped) {
        Some(s) => Cow::Owned(s),
        None => stripped,
    }
}

fn strip_base64_runs(text: &str) -> Option<String> {
    let mut out = String::new();
    let mut last = 0;
    for m in LONG_BASE64.find_iter(text) {
        if !looks_encoded(m.as_str()) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(BASE64_PLACEHOLDER);
        last = m.end();
    }
    if last == 0 {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

fn looks_encoded(run: &str) -> bool {
    let bytes = run.as_bytes();
    let has_digit = bytes.iter().any(u8::is_ascii_digit);
    let has_upper = bytes.iter().any(u8::is_ascii_uppercase);
    let has_lower = bytes.iter().any(u8::is_ascii_lowercase);
    if !(has_digit && has_upper && has_lower) {
        return false;
    }
    let mut seen = [false; 128];
    let mut distinct = 0;
    for &b in bytes {
        let slot = &mut seen[usize::from(b & 0x7f)];
        if !*slot {
            *slot = true;
            distinct += 1;
        }
    }
    distinct >= MIN_DISTINCT_SYMBOLS
}
