//! Encoded-size measurement for mutation payload ceilings.
//!
//! The host transport carries mutations as URI-component-encoded JSON, so the
//! size ceiling is measured against that encoding, not the raw JSON text.

use serde_json::Value;

/// Characters `encodeURIComponent` leaves unescaped.
fn is_uri_component_unreserved(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(ch, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
}

/// Length of `s` after URI-component encoding: unreserved characters count
/// as one byte, everything else as three bytes per UTF-8 byte.
pub fn uri_component_encoded_len(s: &str) -> usize {
    s.chars()
        .map(|ch| {
            if is_uri_component_unreserved(ch) {
                1
            } else {
                3 * ch.len_utf8()
            }
        })
        .sum()
}

/// Size of `value` as the host transport would carry it: compact JSON text,
/// URI-component encoded.
pub fn encoded_value_size(value: &Value) -> usize {
    uri_component_encoded_len(&value.to_string())
}
