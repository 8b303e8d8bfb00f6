//! Defensive decoding of accumulated message text.

use std::borrow::Cow;

/// Percent-decodes `raw` for display, falling back to `raw` on failure.
///
/// Fails (and falls back) when a `%` is not followed by two hex digits or
/// when the decoded bytes are not valid UTF-8. `+` is left as is.
pub fn decode_display_text(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    if !has_valid_escapes(raw) {
        tracing::debug!("malformed percent escape, showing raw text");
        return Cow::Borrowed(raw);
    }
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::debug!("percent-decoded text is not UTF-8 ({err}), showing raw text");
            Cow::Borrowed(raw)
        }
    }
}

fn has_valid_escapes(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// A message is empty when its decoded text is blank.
pub fn is_empty_text(decoded: &str) -> bool {
    decoded.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(decode_display_text("hello"), Cow::Borrowed("hello")));
    }

    #[test]
    fn test_percent_sequences_are_decoded() {
        assert_eq!(decode_display_text("a%20b%C3%A9"), "a bé");
        assert_eq!(decode_display_text("1+1"), "1+1");
    }

    #[test]
    fn test_malformed_escape_falls_back_to_raw() {
        assert_eq!(decode_display_text("100% sure"), "100% sure");
        assert_eq!(decode_display_text("trailing %"), "trailing %");
        assert_eq!(decode_display_text("%zz"), "%zz");
    }

    #[test]
    fn test_invalid_utf8_falls_back_to_raw() {
        assert_eq!(decode_display_text("%FF%FE"), "%FF%FE");
    }

    #[test]
    fn test_emptiness_uses_trimmed_text() {
        assert!(is_empty_text(""));
        assert!(is_empty_text(" \n\t"));
        assert!(!is_empty_text(" x "));
        assert!(is_empty_text(&decode_display_text("%20%0A")));
    }
}
