//! Utility functions for decoding input and escaping output

use crate::error::{DomError, Result};
use encoding_rs::Encoding;
use std::borrow::Cow;

/// Decode a length-delimited byte payload into text.
///
/// Strict mode rejects malformed sequences with `ParseError`; lossy mode
/// substitutes U+FFFD. A leading BOM is left in place and handled by the
/// tree builder like any other character.
pub fn decode_input<'a>(
    bytes: &'a [u8],
    encoding: &'static Encoding,
    lossy: bool,
) -> Result<Cow<'a, str>> {
    if lossy {
        let (text, _) = encoding.decode_without_bom_handling(bytes);
        return Ok(text);
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| {
            DomError::ParseError(format!("input is not valid {}", encoding.name()))
        })
}

/// Decode selector text. Selectors are always UTF-8.
pub fn decode_selector(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| DomError::SelectorError(format!("selector is not valid UTF-8: {}", e)))
}

/// Escape character data the way the HTML serializer does for text outside
/// raw-text elements.
pub fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '\u{a0}' => output.push_str("&nbsp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}
