use crate::http::HttpError;
use crate::session::{SessionFlags, SessionRecord};
use crate::tree;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use thiserror::Error;

pub const SERIALIZED_REQUEST: &str = "SerializedRequest";
pub const SERIALIZED_RESPONSE: &str = "SerializedResponse";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Pair entry is a {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("Missing or non-string field {0}")]
    MissingField(&'static str),
    #[error("Invalid base64 in {field}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("Malformed request head")]
    Request(#[from] HttpError),
}

/// Rebuilds one session from a pair entry of a URL group.
pub fn reconstruct_pair(entry: &Value, is_https: bool, url: &str) -> Result<SessionRecord, RecordError> {
    if !entry.is_object() {
        return Err(RecordError::NotAnObject(tree::kind(entry)));
    }

    let raw_request = decode_field(entry, SERIALIZED_REQUEST)?;
    let raw_response = decode_field(entry, SERIALIZED_RESPONSE)?;

    let mut record = SessionRecord::from_raw(raw_request, raw_response, SessionFlags::IMPORTED_FROM_OTHER_TOOL)?;

    if is_https {
        apply_https_repair(&mut record, url);

        if record.full_url() != url {
            tracing::warn!(
                expected = url,
                actual = %record.full_url(),
                "Session URL does not match its capture key after scheme repair"
            );
        }
        debug_assert_eq!(record.full_url(), url, "scheme repair left a mismatched URL");
    }

    Ok(record)
}

/// Marks a record as HTTPS when its request bytes did not say so.
///
/// Request lines only carry a scheme when the client spoke to a proxy, so
/// the capture key is the authority on whether the traffic was secure.
pub fn apply_https_repair(record: &mut SessionRecord, url: &str) {
    if record.full_url() != url {
        record.set_scheme("https");
        record.set_https(true);
    }
}

fn decode_field(entry: &Value, field: &'static str) -> Result<Vec<u8>, RecordError> {
    let encoded = tree::str_member(entry, field).ok_or(RecordError::MissingField(field))?;

    STANDARD
        .decode(encoded.trim())
        .map_err(|source| RecordError::Base64 { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::describe_error;
    use serde_json::json;

    fn pair(request: &[u8], response: &[u8]) -> Value {
        json!({
            "SerializedRequest": STANDARD.encode(request),
            "SerializedResponse": STANDARD.encode(response),
        })
    }

    const GET_ROOT: &[u8] = b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n";
    const OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";

    #[test]
    fn test_plain_http_pair() {
        let record = reconstruct_pair(&pair(GET_ROOT, OK), false, "http://a.test/").unwrap();

        assert_eq!(record.scheme(), "http");
        assert_eq!(record.full_url(), "http://a.test/");
        assert!(!record.is_https());
        assert!(record.flags().contains(SessionFlags::IMPORTED_FROM_OTHER_TOOL));
    }

    #[test]
    fn test_https_key_repairs_scheme() {
        let record = reconstruct_pair(&pair(GET_ROOT, OK), true, "https://a.test/").unwrap();

        assert_eq!(record.scheme(), "https");
        assert_eq!(record.full_url(), "https://a.test/");
        assert!(record.is_https());
    }

    #[test]
    fn test_https_absolute_request_needs_no_repair() {
        let request = b"GET https://a.test/ HTTP/1.1\r\nHost: a.test\r\n\r\n";
        let record = reconstruct_pair(&pair(request, OK), true, "https://a.test/").unwrap();

        assert_eq!(record.full_url(), "https://a.test/");
        assert!(record.is_https());
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut once = reconstruct_pair(&pair(GET_ROOT, OK), false, "https://a.test/").unwrap();
        apply_https_repair(&mut once, "https://a.test/");
        let mut twice = once.clone();
        apply_https_repair(&mut twice, "https://a.test/");

        assert_eq!(once.full_url(), twice.full_url());
        assert_eq!(once.is_https(), twice.is_https());
        assert_eq!(once.scheme(), twice.scheme());
    }

    #[test]
    fn test_raw_bytes_survive_decoding() {
        let response: Vec<u8> = b"HTTP/1.1 200 OK\r\n\r\n".iter().copied().chain(0..=255u8).collect();
        let record = reconstruct_pair(&pair(GET_ROOT, &response), false, "http://a.test/").unwrap();

        assert_eq!(record.raw_request(), GET_ROOT);
        assert_eq!(record.raw_response(), response.as_slice());
    }

    #[test]
    fn test_missing_response_field() {
        let entry = json!({ "SerializedRequest": STANDARD.encode(GET_ROOT) });
        match reconstruct_pair(&entry, false, "http://a.test/") {
            Err(RecordError::MissingField(SERIALIZED_RESPONSE)) => (),
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_field() {
        let entry = json!({ "SerializedRequest": 42, "SerializedResponse": "" });
        assert!(matches!(
            reconstruct_pair(&entry, false, "http://a.test/"),
            Err(RecordError::MissingField(SERIALIZED_REQUEST))
        ));
    }

    #[test]
    fn test_bad_base64_is_described_with_cause() {
        let entry = json!({ "SerializedRequest": "not*base64!", "SerializedResponse": "" });
        let err = reconstruct_pair(&entry, false, "http://a.test/").unwrap_err();

        assert!(matches!(err, RecordError::Base64 { field: SERIALIZED_REQUEST, .. }));
        let description = describe_error(&err);
        assert!(description.starts_with("Invalid base64 in SerializedRequest\n < "));
    }

    #[test]
    fn test_entry_must_be_object() {
        assert!(matches!(
            reconstruct_pair(&json!(["a", "b"]), false, "http://a.test/"),
            Err(RecordError::NotAnObject("array"))
        ));
    }

    #[test]
    fn test_undecodable_request_head() {
        let entry = pair(b"\x00\x00\x00", OK);
        assert!(matches!(
            reconstruct_pair(&entry, false, "http://a.test/"),
            Err(RecordError::Request(_))
        ));
    }
}
