//! Header-safe text encoding.
//!
//! Envelope bytes travel in headers and URL paths, which cannot carry raw
//! control bytes. Bytes are base64-encoded as 76-column lines, each ending
//! in `\n`, and every line break is then escaped to the two characters `\n`
//! (backslash, `n`). Decoding undoes both steps.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{CoreError, Result};

/// Maximum base64 characters per line before a line break.
pub const LINE_WIDTH: usize = 76;

/// Encode bytes as escaped multi-line base64.
pub fn encode_escaped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + 2 * (encoded.len() / LINE_WIDTH + 1));

    // Chunks of an ASCII string are always valid UTF-8.
    for line in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push_str("\\n");
    }

    out
}

/// Decode escaped multi-line base64 back to bytes.
///
/// Accepts both escaped (`\n`, `\r`) and literal line breaks, so a carrier
/// that already unescaped the text still decodes.
pub fn decode_escaped(text: &str) -> Result<Vec<u8>> {
    let unescaped = text.replace("\\n", "\n").replace("\\r", "\r");
    let compact: String = unescaped
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CoreError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_has_no_raw_line_breaks() {
        let data = vec![0xAB; 200];
        let text = encode_escaped(&data);

        assert!(!text.contains('\n'));
        assert!(!text.contains('\r'));
        assert!(text.ends_with("\\n"));
    }

    #[test]
    fn test_long_input_is_split_into_lines() {
        let data = vec![7u8; 120]; // 160 base64 chars -> 3 lines
        let text = encode_escaped(&data);

        assert_eq!(text.matches("\\n").count(), 3);
        assert_eq!(decode_escaped(&text).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        let text = encode_escaped(b"");
        assert_eq!(text, "");
        assert_eq!(decode_escaped(&text).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_accepts_carriage_returns() {
        let text = encode_escaped(b"hello world").replace("\\n", "\\r\\n");
        assert_eq!(decode_escaped(&text).unwrap(), b"hello world");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_escaped("not*base64!"),
            Err(CoreError::Encoding(_))
        ));
    }
}
