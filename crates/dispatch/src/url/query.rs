use super::{EscapeFn, UrlParams, UrlValue};
use std::sync::Arc;

/// The default escaping function.
///
/// Every byte except ASCII alphanumerics, `.`, `-` and `_` is percent-encoded, so a space
/// becomes `%20`.
pub fn default_escape() -> EscapeFn {
    Arc::new(percent_encode)
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

pub(crate) fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_') {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(byte >> 4)]));
            out.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
    }
    out
}

/// Builds the query string from the leftover map entries, without the leading `?`.
pub(super) fn build_query(params: &UrlParams, escape: &EscapeFn) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        push_pairs(&escape(key), value, escape, &mut pairs);
    }
    pairs.join("&")
}

fn push_pairs(prefix: &str, value: &UrlValue, escape: &EscapeFn, pairs: &mut Vec<String>) {
    match value {
        UrlValue::Scalar(scalar) => pairs.push(format!("{prefix}={}", escape(scalar))),
        UrlValue::List(values) => {
            let list_prefix = format!("{prefix}[]");
            let mut list_pairs = Vec::new();
            for value in values {
                push_pairs(&list_prefix, value, escape, &mut list_pairs);
            }
            list_pairs.sort();
            pairs.extend(list_pairs);
        }
        UrlValue::Map(map) => {
            for (key, value) in map {
                push_pairs(&format!("{prefix}[{}]", escape(key)), value, escape, pairs);
            }
        }
    }
}
