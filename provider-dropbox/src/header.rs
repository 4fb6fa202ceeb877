//! ASCII-safe JSON for HTTP header values.
//!
//! Dropbox content endpoints read their arguments from the `Dropbox-API-Arg`
//! header. Header values may only carry printable ASCII, so after regular
//! JSON encoding every code point from U+007F upward is rewritten as a
//! `\uXXXX` escape. Characters outside the Basic Multilingual Plane become a
//! UTF-16 surrogate pair, the same form JSON itself uses, so the header still
//! decodes to the original string.

use serde::Serialize;

use crate::error::{DropboxError, Result};

/// Serialize `value` as JSON whose text is entirely ASCII.
///
/// ```
/// use provider_dropbox::http_header_safe_json;
///
/// let value = serde_json::json!({ "path": "/É" });
/// assert_eq!(http_header_safe_json(&value).unwrap(), r#"{"path":"/\u00c9"}"#);
/// ```
pub fn http_header_safe_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)
        .map_err(|e| DropboxError::ParseError(format!("Failed to encode header argument: {}", e)))?;
    Ok(escape_non_ascii(&json))
}

fn escape_non_ascii(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    let mut units = [0u16; 2];

    for ch in json.chars() {
        if (ch as u32) < 0x7f {
            escaped.push(ch);
            continue;
        }

        for unit in ch.encode_utf16(&mut units) {
            escaped.push_str(&format!("\\u{:04x}", unit));
        }
    }

    escaped
}
