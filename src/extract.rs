//! Unsubscribe target extraction from a raw email.
//!
//! Reads the `List-Unsubscribe` header, decodes RFC 2047 encoded words, and
//! strips the angle brackets or quotes around the address.

use crate::error::ExtractionError;
use mailparse::MailHeaderMap;

const HEADER: &str = "List-Unsubscribe";

/// Extract the unsubscribe URL from a raw RFC 5322 message.
///
/// Only the header block is parsed; the body may be anything.
pub fn extract_unsubscribe_target(raw: &[u8]) -> Result<String, ExtractionError> {
    let (headers, _) = mailparse::parse_headers(raw)?;
    let value = headers
        .get_first_value(HEADER)
        .ok_or(ExtractionError::MissingHeader)?;

    let target = select_target(value.trim());
    if target.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(target.to_string())
}

/// Pick the address out of a decoded header value.
///
/// A header may list several `<…>` entries (typically a `mailto:` and an
/// `https:` one); the first web address wins, else the first entry. Commas
/// inside the brackets belong to the address.
fn select_target(value: &str) -> &str {
    if !value.starts_with('<') {
        return unquote(value).trim();
    }
    let entries: Vec<&str> = bracketed_entries(value)
        .into_iter()
        .map(|entry| unquote(entry.trim()).trim())
        .filter(|entry| !entry.is_empty())
        .collect();
    entries
        .iter()
        .find(|entry| entry.starts_with("http://") || entry.starts_with("https://"))
        .or_else(|| entries.first())
        .copied()
        .unwrap_or_default()
}

/// Split a header list on the commas outside `<…>`.
fn bracketed_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

/// Remove one level of `<…>` or `"…"` around a value.
pub fn unquote(value: &str) -> &str {
    if value.len() > 1 {
        if let Some(inner) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
            return inner;
        }
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return inner;
        }
    }
    value
}
