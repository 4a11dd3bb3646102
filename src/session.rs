//! Session records built from raw request/response bytes.

use crate::http::{parse_request, parse_request_head, parse_response, HttpError, ParsedRequest, ParsedResponse};
use std::ops::{BitOr, BitOrAssign};

/// Origin flags attached to a [`SessionRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionFlags(u32);

impl SessionFlags {
    pub const NONE: SessionFlags = SessionFlags(0);
    pub const IMPORTED_FROM_OTHER_TOOL: SessionFlags = SessionFlags(1 << 0);
    pub const REQUEST_GENERATED: SessionFlags = SessionFlags(1 << 1);
    pub const RESPONSE_GENERATED: SessionFlags = SessionFlags(1 << 2);
    pub const SERVED_FROM_CACHE: SessionFlags = SessionFlags(1 << 3);

    pub fn contains(self, other: SessionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for SessionFlags {
    type Output = SessionFlags;

    fn bitor(self, rhs: SessionFlags) -> SessionFlags {
        SessionFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SessionFlags {
    fn bitor_assign(&mut self, rhs: SessionFlags) {
        self.0 |= rhs.0;
    }
}

/// One reconstructed HTTP transaction.
///
/// The raw buffers are kept exactly as captured. Scheme, host and path are
/// resolved from the request head when the record is built; only the scheme
/// and the security flag can change afterwards.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    raw_request: Vec<u8>,
    raw_response: Vec<u8>,
    flags: SessionFlags,
    method: String,
    scheme: String,
    host: String,
    path: String,
    is_https: bool,
}

impl SessionRecord {
    /// Builds a record from raw message bytes.
    ///
    /// Only the request head is parsed here, and a failure there is the only
    /// error; both bodies and the response are left raw and parsed on demand.
    pub fn from_raw(
        raw_request: Vec<u8>,
        raw_response: Vec<u8>,
        flags: SessionFlags,
    ) -> Result<Self, HttpError> {
        let request = parse_request_head(&raw_request)?;
        let (scheme, host, path) = resolve_target(&request);
        let is_https = scheme == "https";

        Ok(SessionRecord {
            method: request.method,
            raw_request,
            raw_response,
            flags,
            scheme,
            host,
            path,
            is_https,
        })
    }

    pub fn raw_request(&self) -> &[u8] {
        &self.raw_request
    }

    pub fn raw_response(&self) -> &[u8] {
        &self.raw_response
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_https(&self) -> bool {
        self.is_https
    }

    pub fn full_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }

    pub fn set_scheme(&mut self, scheme: &str) {
        self.scheme = scheme.to_ascii_lowercase();
    }

    pub fn set_https(&mut self, is_https: bool) {
        self.is_https = is_https;
    }

    pub fn request(&self) -> Result<ParsedRequest, HttpError> {
        parse_request(&self.raw_request)
    }

    pub fn response(&self) -> Result<ParsedResponse, HttpError> {
        parse_response(&self.raw_response)
    }
}

/// Splits a request target into (scheme, host, path).
///
/// Absolute-form targets only appear when traffic was sent to a proxy;
/// everything else takes its host from the `Host` header and defaults to
/// `http`.
fn resolve_target(request: &ParsedRequest) -> (String, String, String) {
    let target = request.target.as_str();

    if let Some((scheme, rest)) = target.split_once("://") {
        if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            let (host, path) = match rest.find(['/', '?']) {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            return (scheme.to_ascii_lowercase(), host.to_string(), path.to_string());
        }
    }

    if request.method.eq_ignore_ascii_case("CONNECT") {
        return ("http".to_string(), target.to_string(), String::new());
    }

    let host = request.header("host").unwrap_or("").trim().to_string();
    ("http".to_string(), host, target.to_string())
}
