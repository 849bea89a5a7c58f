//! Key escaping for MongoDB compatibility.
//!
//! MongoDB reserves `.` and `$` in field names and rejects null bytes. Keys holding
//! those characters are escaped on the way in and restored on the way out. Values are
//! left untouched so that filters keep matching what was stored.

use bson::Bson;

pub(crate) struct ValueSanitizer;

impl ValueSanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Escapes reserved characters in every key of `value`, recursively.
    pub(crate) fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items.iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(
                doc.iter()
                    .map(|(k, v)| (Self::sanitize_string(k), Self::sanitize_value(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_string(input: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .fold(input.to_string(), |acc, (target, replacement)| acc.replace(target, replacement))
    }

    /// Inverse of [`sanitize_value`](Self::sanitize_value).
    pub(crate) fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items.iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(
                doc.iter()
                    .map(|(k, v)| (Self::restore_string(k), Self::restore_value(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    pub(crate) fn restore_string(input: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .rev()
            .fold(input.to_string(), |acc, (target, replacement)| acc.replace(replacement, target))
    }
}
