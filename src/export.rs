//! Conversion of imported sessions into a HAR log.

use crate::har::{Cache, Content, Cookie, Entry, Har, Header, PostData, QueryParam, Request, Response, Timings};
use crate::http::{find_header, ParsedRequest, ParsedResponse};
use crate::session::{SessionFlags, SessionRecord};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use url::Url;

pub struct HarExporter {
    started: DateTime<Utc>,
}

impl HarExporter {
    /// Captures carry no timing, so every entry is stamped with `started`.
    pub fn new(started: DateTime<Utc>) -> Self {
        HarExporter { started }
    }

    pub fn to_har(&self, sessions: &[SessionRecord]) -> Har {
        let mut har = Har::new();
        for session in sessions {
            har.add_entry(self.session_to_entry(session));
        }
        har
    }

    fn session_to_entry(&self, session: &SessionRecord) -> Entry {
        let url = session.full_url();

        let request = match session.request() {
            Ok(req) => self.build_request(&req, &url),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Request no longer parses; exporting URL only");
                self.build_request(&empty_request(session.method()), &url)
            }
        };

        let response = match session.response() {
            Ok(resp) => Some(resp),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Response head did not parse");
                None
            }
        };

        Entry {
            started_date_time: self.started,
            time: 0.0,
            request,
            response: self.build_response(response.as_ref()),
            cache: Cache {},
            timings: Timings::default(),
            comment: describe_flags(session),
        }
    }

    fn build_request(&self, req: &ParsedRequest, url: &str) -> Request {
        Request {
            method: req.method.clone(),
            url: url.to_string(),
            http_version: req.version.clone(),
            cookies: self.parse_cookies(&req.headers),
            headers: to_har_headers(&req.headers),
            query_string: self.parse_query_string(url),
            post_data: self.parse_post_data(req),
            headers_size: req.header_size as i64,
            body_size: req.body.len() as i64,
        }
    }

    fn build_response(&self, resp: Option<&ParsedResponse>) -> Response {
        let Some(resp) = resp else {
            return Response {
                status: 0,
                status_text: String::new(),
                http_version: "HTTP/1.1".to_string(),
                cookies: Vec::new(),
                headers: Vec::new(),
                content: Content {
                    size: 0,
                    mime_type: String::new(),
                    text: None,
                    encoding: None,
                },
                redirect_url: String::new(),
                headers_size: -1,
                body_size: -1,
            };
        };

        Response {
            status: resp.status,
            status_text: resp.reason.clone(),
            http_version: resp.version.clone(),
            cookies: Vec::new(),
            headers: to_har_headers(&resp.headers),
            content: self.build_content(resp),
            redirect_url: resp.header("location").unwrap_or("").to_string(),
            headers_size: resp.header_size as i64,
            body_size: resp.body.len() as i64,
        }
    }

    fn build_content(&self, resp: &ParsedResponse) -> Content {
        let mime_type = mime_type(&resp.headers);

        let (text, encoding) = if resp.body.is_empty() {
            (Some(String::new()), None)
        } else if is_text_content(&mime_type) {
            (Some(String::from_utf8_lossy(&resp.body).to_string()), None)
        } else {
            (Some(STANDARD.encode(&resp.body)), Some("base64".to_string()))
        };

        Content {
            size: resp.body.len() as i64,
            mime_type,
            text,
            encoding,
        }
    }

    fn parse_cookies(&self, headers: &[(String, String)]) -> Vec<Cookie> {
        headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| {
                v.split(';').filter_map(|cookie| {
                    let cookie = cookie.trim();
                    if cookie.is_empty() {
                        return None;
                    }
                    let (name, value) = cookie.split_once('=').unwrap_or((cookie, ""));
                    Some(Cookie {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                })
            })
            .collect()
    }

    fn parse_query_string(&self, url: &str) -> Vec<QueryParam> {
        Url::parse(url)
            .map(|u| {
                u.query_pairs()
                    .map(|(k, v)| QueryParam {
                        name: k.to_string(),
                        value: v.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse_post_data(&self, req: &ParsedRequest) -> Option<PostData> {
        if req.body.is_empty() {
            return None;
        }

        Some(PostData {
            mime_type: mime_type(&req.headers),
            text: String::from_utf8_lossy(&req.body).to_string(),
        })
    }
}

fn empty_request(method: &str) -> ParsedRequest {
    ParsedRequest {
        method: method.to_string(),
        target: String::new(),
        version: "HTTP/1.1".to_string(),
        headers: Vec::new(),
        body: Vec::new(),
        header_size: 0,
    }
}

fn to_har_headers(headers: &[(String, String)]) -> Vec<Header> {
    headers
        .iter()
        .map(|(k, v)| Header {
            name: k.clone(),
            value: v.clone(),
        })
        .collect()
}

fn mime_type(headers: &[(String, String)]) -> String {
    find_header(headers, "content-type")
        .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

fn is_text_content(mime_type: &str) -> bool {
    mime_type.starts_with("text/")
        || mime_type.contains("json")
        || mime_type.contains("xml")
        || mime_type.contains("javascript")
}

fn describe_flags(session: &SessionRecord) -> Option<String> {
    let flags = session.flags();
    if flags.contains(SessionFlags::SERVED_FROM_CACHE) {
        Some("Generated placeholder wrapping a non-capture JSON file".to_string())
    } else if flags.contains(SessionFlags::IMPORTED_FROM_OTHER_TOOL) {
        Some("Imported from WebPageReplay capture".to_string())
    } else {
        None
    }
}
