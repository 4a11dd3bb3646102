use crate::compression::gunzip;
use httparse::{Header, Request, Response, Status, EMPTY_HEADER};
use thiserror::Error;

const MAX_HEADERS: usize = 128;

/// Upper bound on a gzip-encoded message body once decoded.
pub const MAX_DECODED_BODY: u64 = 64 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Incomplete message head")]
    Incomplete,
}

#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub header_size: usize,
}

#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: u16,
    pub reason: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub header_size: usize,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Parses a raw request: request line, headers and (decoded) body.
pub fn parse_request(data: &[u8]) -> Result<ParsedRequest, HttpError> {
    let mut req = parse_request_head(data)?;
    req.body = extract_body(&data[req.header_size..], &req.headers);
    Ok(req)
}

/// Parses only the request line and headers; `body` is left empty.
pub fn parse_request_head(data: &[u8]) -> Result<ParsedRequest, HttpError> {
    let mut headers = [EMPTY_HEADER; MAX_HEADERS];
    let mut req = Request::new(&mut headers);

    match req.parse(data) {
        Ok(Status::Complete(header_len)) => Ok(ParsedRequest {
            method: req.method.unwrap_or("").to_string(),
            target: req.path.unwrap_or("").to_string(),
            version: format!("HTTP/1.{}", req.version.unwrap_or(1)),
            headers: collect_headers(req.headers),
            body: Vec::new(),
            header_size: header_len,
        }),
        Ok(Status::Partial) => Err(HttpError::Incomplete),
        Err(e) => Err(HttpError::Parse(e.to_string())),
    }
}

/// Parses a raw response: status line, headers and (decoded) body.
pub fn parse_response(data: &[u8]) -> Result<ParsedResponse, HttpError> {
    let mut headers = [EMPTY_HEADER; MAX_HEADERS];
    let mut resp = Response::new(&mut headers);

    match resp.parse(data) {
        Ok(Status::Complete(header_len)) => {
            let headers = collect_headers(resp.headers);
            let body = extract_body(&data[header_len..], &headers);

            Ok(ParsedResponse {
                status: resp.code.unwrap_or(0),
                reason: resp.reason.unwrap_or("").to_string(),
                version: format!("HTTP/1.{}", resp.version.unwrap_or(1)),
                headers,
                body,
                header_size: header_len,
            })
        }
        Ok(Status::Partial) => Err(HttpError::Incomplete),
        Err(e) => Err(HttpError::Parse(e.to_string())),
    }
}

pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn collect_headers(headers: &[Header<'_>]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect()
}

fn extract_body(data: &[u8], headers: &[(String, String)]) -> Vec<u8> {
    let content_length = find_header(headers, "content-length").and_then(|v| v.trim().parse::<usize>().ok());

    let is_chunked = find_header(headers, "transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    let body = if is_chunked {
        decode_chunked(data)
    } else if let Some(len) = content_length {
        data[..len.min(data.len())].to_vec()
    } else {
        data.to_vec()
    };

    let is_gzip = find_header(headers, "content-encoding")
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);

    if is_gzip {
        decode_gzip_body(body, MAX_DECODED_BODY)
    } else {
        body
    }
}

fn decode_chunked(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let Some(line_end) = data[pos..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|p| pos + p)
        else {
            break;
        };

        // Chunk extensions (";name=value") follow the size.
        let size_line = String::from_utf8_lossy(&data[pos..line_end]);
        let size_str = size_line.split(';').next().unwrap_or("");
        let size = usize::from_str_radix(size_str.trim(), 16).unwrap_or(0);

        if size == 0 {
            break;
        }

        // The size comes from the wire: a chunk running past the data is
        // treated as truncated.
        let chunk_start = line_end + 2;
        match chunk_start.checked_add(size) {
            Some(chunk_end) if chunk_end <= data.len() => {
                result.extend_from_slice(&data[chunk_start..chunk_end]);
                pos = chunk_end + 2;
            }
            _ => {
                result.extend_from_slice(&data[chunk_start..]);
                break;
            }
        }
    }

    result
}

/// Gunzips a body, keeping the encoded bytes when they do not decode or
/// would expand past `limit`.
fn decode_gzip_body(body: Vec<u8>, limit: u64) -> Vec<u8> {
    match gunzip(&body, limit) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(error = %e, encoded = body.len(), "Keeping gzip body encoded");
            body
        }
    }
}
