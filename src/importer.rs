//! The import pipeline: source → gzip detection → JSON tree → sessions.

use crate::capture::extract_sessions;
use crate::compression::{gunzip, read_all_bounded, sniff_gzip, DEFAULT_SIZE_LIMIT};
use crate::http::HttpError;
use crate::progress::ProgressSink;
use crate::session::{SessionFlags, SessionRecord};
use crate::tree::parse_tree;
use chrono::Utc;
use serde_json::Value;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

pub const FORMAT_NAME: &str = "WPRCapture JSON";
pub const FORMAT_DESCRIPTION: &str = "WebPageReplay Capture (v1.0.1). See https://github.com/catapult-project/catapult/blob/master/web_page_replay_go/README.md for more details.";
pub const FILE_EXTENSION: &str = "wprgo";

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported import format: {0}")]
    UnsupportedFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input of {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { size: u64, limit: u64 },
    #[error("Decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the capture comes from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    Filename(PathBuf),
    Content(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Upper bound for both the input and its decompressed form.
    pub size_limit: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

/// A user-facing message about an import that did not go as expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The input could not be parsed at all; nothing was imported.
    ImportAborted,
    /// The input parsed but is not a capture; its JSON was wrapped instead.
    UnexpectedData,
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::ImportAborted => "Import aborted",
            Notice::UnexpectedData => "Unexpected Data",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Notice::ImportAborted => "This file is not a properly-formatted WPR Capture.",
            Notice::UnexpectedData => "This JSON file does not seem to contain WPR Capture data.",
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub sessions: Vec<SessionRecord>,
    pub notice: Option<Notice>,
}

/// Imports a capture in the named format.
pub fn import_sessions(
    format: &str,
    source: ImportSource,
    options: &ImportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<ImportReport, ImportError> {
    if format != FORMAT_NAME {
        return Err(ImportError::UnsupportedFormat(format.to_string()));
    }
    import_capture(source, options, progress)
}

/// Reads, decompresses and walks a capture.
///
/// Only I/O, decompression and size-limit failures are returned as errors.
/// Unparseable text yields an empty report with [`Notice::ImportAborted`];
/// JSON that is not a capture yields one synthetic session wrapping it,
/// with [`Notice::UnexpectedData`].
pub fn import_capture(
    source: ImportSource,
    options: &ImportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<ImportReport, ImportError> {
    let bytes = match source {
        ImportSource::Filename(path) => {
            tracing::debug!(path = %path.display(), "Opening capture file");
            let mut file = File::open(&path)?;
            let (bytes, compressed) = read_input(&mut file, options, progress)?;
            if !compressed {
                tracing::warn!(path = %path.display(), "Capture file was not gzip-compressed");
            }
            bytes
        }
        ImportSource::Content(text) => read_input(&mut Cursor::new(text.into_bytes()), options, progress)?.0,
        ImportSource::Bytes(bytes) => read_input(&mut Cursor::new(bytes), options, progress)?.0,
    };

    let text = String::from_utf8_lossy(&bytes);
    Ok(import_text(&text, progress))
}

/// Loads the whole stream, expanding it when it starts with the gzip magic.
/// Also reports whether it was compressed.
fn read_input<S: Read + Seek>(
    stream: &mut S,
    options: &ImportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<(Vec<u8>, bool), ImportError> {
    let compressed = sniff_gzip(stream)?;
    if compressed {
        progress.notify(0.0, "Import file was compressed using gzip/DEFLATE.");
    }

    let start = stream.stream_position()?;
    let end = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(start))?;

    let bytes = read_all_bounded(stream, end.saturating_sub(start), options.size_limit)?;
    if compressed {
        let expanded = gunzip(&bytes, options.size_limit)?;
        tracing::debug!(compressed = bytes.len(), expanded = expanded.len(), "Expanded capture");
        Ok((expanded, true))
    } else {
        Ok((bytes, false))
    }
}

/// Parses capture text and rebuilds its sessions.
pub fn import_text(text: &str, progress: &mut dyn ProgressSink) -> ImportReport {
    let started = Instant::now();

    let document = match parse_tree(text).map_err(ImportError::from) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(error = %e, "Capture is not valid JSON");
            progress.notify(1.0, "Aborting; file is not a properly-formatted WPR Capture.");
            return ImportReport {
                sessions: Vec::new(),
                notice: Some(Notice::ImportAborted),
            };
        }
    };

    progress.notify(
        0.25,
        &format!(
            "Finished parsing JSON file; took {}ms.",
            started.elapsed().as_millis()
        ),
    );

    let mut report = ImportReport::default();
    if extract_sessions(&document, &mut report.sessions, progress).is_err() {
        tracing::warn!("JSON document has no capture data; wrapping it as a single session");
        report.notice = Some(Notice::UnexpectedData);
        match wrap_document(&document) {
            Ok(session) => report.sessions.insert(0, session),
            Err(e) => tracing::error!(error = %e, "Failed to build placeholder session"),
        }
    }

    report
}

/// Builds the placeholder session that carries a non-capture document as
/// its response body.
pub fn wrap_document(document: &Value) -> Result<SessionRecord, HttpError> {
    let body = document.to_string().into_bytes();

    let request = format!(
        "GET /file.json HTTP/1.1\r\nHost: IMPORTED\r\nDate: {}\r\n\r\n",
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT")
    );
    let mut response = format!(
        "HTTP/1.1 200 File Data\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);

    let flags = SessionFlags::IMPORTED_FROM_OTHER_TOOL
        | SessionFlags::REQUEST_GENERATED
        | SessionFlags::RESPONSE_GENERATED
        | SessionFlags::SERVED_FROM_CACHE;

    SessionRecord::from_raw(request.into_bytes(), response, flags)
}
