//! Walks the `Requests` section of a capture and rebuilds its sessions.

use crate::progress::{describe_error, ProgressSink};
use crate::reconstruct::reconstruct_pair;
use crate::session::SessionRecord;
use crate::tree;
use serde_json::Value;
use thiserror::Error;

pub const REQUESTS_KEY: &str = "Requests";

#[derive(Error, Debug)]
#[error("Document has no \"Requests\" object")]
pub struct ShapeMismatch;

/// Appends one record per decodable pair entry to `sessions`.
///
/// Accepts URL groups directly under `Requests` as well as the host-keyed
/// layout written by WPR Go (`Requests -> host -> url -> [pairs]`). A broken
/// entry is reported through `progress` and skipped; its siblings are still
/// imported.
pub fn extract_sessions(
    document: &Value,
    sessions: &mut Vec<SessionRecord>,
    progress: &mut dyn ProgressSink,
) -> Result<usize, ShapeMismatch> {
    let requests = tree::object_member(document, REQUESTS_KEY).ok_or(ShapeMismatch)?;

    progress.notify(0.0, "Found WPR Capture data.");
    let before = sessions.len();

    for (key, group) in requests {
        match group {
            Value::Array(entries) => import_group(key, entries, sessions, progress),
            Value::Object(urls) => {
                for (url, entries) in urls {
                    match entries {
                        Value::Array(entries) => import_group(url, entries, sessions, progress),
                        other => skip_member(url, other, progress),
                    }
                }
            }
            other => skip_member(key, other, progress),
        }
    }

    let imported = sessions.len() - before;
    tracing::debug!(imported, total = sessions.len(), "Finished walking capture");
    progress.notify(
        1.0,
        &format!("Import completed; saw {} requests", sessions.len()),
    );

    Ok(imported)
}

fn import_group(
    url: &str,
    entries: &[Value],
    sessions: &mut Vec<SessionRecord>,
    progress: &mut dyn ProgressSink,
) {
    let is_https = url.starts_with("https:");

    for (index, entry) in entries.iter().enumerate() {
        match reconstruct_pair(entry, is_https, url) {
            Ok(record) => sessions.push(record),
            Err(e) => {
                tracing::warn!(url, index, error = %e, "Dropping undecodable pair entry");
                progress.notify(
                    0.0,
                    &format!("{}\n   at pair #{} of {}", describe_error(&e), index, url),
                );
            }
        }
    }
}

fn skip_member(key: &str, value: &Value, progress: &mut dyn ProgressSink) {
    tracing::warn!(key, kind = tree::kind(value), "Skipping unexpected capture member");
    progress.notify(
        0.0,
        &format!("Skipped {}: expected a list of pairs, found {}", key, tree::kind(value)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde_json::json;

    fn pair(path: &str, host: &str) -> Value {
        let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", path, host);
        json!({
            "SerializedRequest": STANDARD.encode(request),
            "SerializedResponse": STANDARD.encode("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"),
        })
    }

    fn collect(document: &Value) -> (Result<usize, ShapeMismatch>, Vec<SessionRecord>, Vec<(f32, String)>) {
        let mut sessions = Vec::new();
        let mut events = Vec::new();
        let result = {
            let mut sink = |fraction: f32, message: &str| events.push((fraction, message.to_string()));
            extract_sessions(document, &mut sessions, &mut sink)
        };
        (result, sessions, events)
    }

    #[test]
    fn test_missing_requests_is_shape_mismatch() {
        let (result, sessions, events) = collect(&json!({"Certs": {}}));
        assert!(result.is_err());
        assert!(sessions.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_requests_of_wrong_kind_is_shape_mismatch() {
        let mut sessions = Vec::new();
        assert!(extract_sessions(&json!({"Requests": []}), &mut sessions, &mut NoProgress).is_err());
        assert!(extract_sessions(&json!([1, 2, 3]), &mut sessions, &mut NoProgress).is_err());
    }

    #[test]
    fn test_flat_layout_preserves_order() {
        let document = json!({
            "Requests": {
                "http://b.test/two": [pair("/two", "b.test"), pair("/two", "b.test")],
                "http://a.test/one": [pair("/one", "a.test")],
            }
        });

        let (result, sessions, events) = collect(&document);
        assert_eq!(result.unwrap(), 3);
        let urls: Vec<String> = sessions.iter().map(|s| s.full_url()).collect();
        assert_eq!(urls, vec!["http://b.test/two", "http://b.test/two", "http://a.test/one"]);

        assert_eq!(events.first().unwrap(), &(0.0, "Found WPR Capture data.".to_string()));
        assert_eq!(
            events.last().unwrap(),
            &(1.0, "Import completed; saw 3 requests".to_string())
        );
    }

    #[test]
    fn test_host_nested_layout() {
        let document = json!({
            "Requests": {
                "a.test": {
                    "https://a.test/": [pair("/", "a.test")],
                    "http://a.test/x": [pair("/x", "a.test")],
                }
            }
        });

        let (result, sessions, _) = collect(&document);
        assert_eq!(result.unwrap(), 2);
        assert_eq!(sessions[0].full_url(), "https://a.test/");
        assert!(sessions[0].is_https());
        assert_eq!(sessions[1].full_url(), "http://a.test/x");
        assert!(!sessions[1].is_https());
    }

    #[test]
    fn test_huge_chunk_size_does_not_stop_import() {
        let upload = "POST /up HTTP/1.1\r\nHost: a.test\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nabc";
        let document = json!({
            "Requests": {
                "http://a.test/up": [
                    {
                        "SerializedRequest": STANDARD.encode(upload),
                        "SerializedResponse": STANDARD.encode("HTTP/1.1 200 OK\r\n\r\n"),
                    },
                    pair("/up", "a.test"),
                ]
            }
        });

        let (result, sessions, _) = collect(&document);
        assert_eq!(result.unwrap(), 2);
        assert_eq!(sessions[0].method(), "POST");
        assert_eq!(sessions[0].raw_request(), upload.as_bytes());
        assert_eq!(sessions[0].request().unwrap().body, b"abc");
        assert_eq!(sessions[1].full_url(), "http://a.test/up");
    }

    #[test]
    fn test_bad_entry_is_dropped_with_diagnostic() {
        let document = json!({
            "Requests": {
                "http://a.test/": [
                    pair("/", "a.test"),
                    {"SerializedRequest": "@@@", "SerializedResponse": ""},
                    pair("/", "a.test"),
                ]
            }
        });

        let (result, sessions, events) = collect(&document);
        assert_eq!(result.unwrap(), 2);
        assert_eq!(sessions.len(), 2);

        let diagnostics: Vec<&(f32, String)> = events
            .iter()
            .filter(|(_, m)| m.starts_with("Invalid base64"))
            .collect();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0, 0.0);
        assert!(diagnostics[0].1.ends_with("at pair #1 of http://a.test/"));
    }

    #[test]
    fn test_unexpected_members_are_skipped() {
        let document = json!({
            "Requests": {
                "http://a.test/": "not a list",
                "b.test": { "http://b.test/": 7 },
                "http://c.test/": [pair("/", "c.test")],
            }
        });

        let (result, sessions, events) = collect(&document);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(sessions[0].full_url(), "http://c.test/");
        assert_eq!(events.iter().filter(|(_, m)| m.starts_with("Skipped")).count(), 2);
    }

    #[test]
    fn test_empty_requests_yields_nothing() {
        let (result, sessions, events) = collect(&json!({"Requests": {}}));
        assert_eq!(result.unwrap(), 0);
        assert!(sessions.is_empty());
        assert_eq!(events.last().unwrap().1, "Import completed; saw 0 requests");
    }

    #[test]
    fn test_count_includes_existing_sessions() {
        let mut sessions = Vec::new();
        let document = json!({"Requests": {"http://a.test/": [pair("/", "a.test")]}});
        extract_sessions(&document, &mut sessions, &mut NoProgress).unwrap();

        let mut last = String::new();
        let mut sink = |_: f32, message: &str| last = message.to_string();
        let added = extract_sessions(&document, &mut sessions, &mut sink).unwrap();

        assert_eq!(added, 1);
        assert_eq!(last, "Import completed; saw 2 requests");
    }
}
