//! Request line, headers and body framing.
//!
//! Only what the device needs is understood: `GET` and `POST`, bodies framed
//! by `Content-Length`, and the two form encodings browsers submit.

use std::fmt;

use crate::codec::{ProtocolError, MAX_LINE_LENGTH};

/// Request method. Anything else is rejected at the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `METHOD target HTTP/x.y` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: String,
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = trim_line_ending(line);
        let invalid = || ProtocolError::InvalidRequestLine(line.to_string());

        if line.len() > MAX_LINE_LENGTH {
            return Err(ProtocolError::HeaderTooLong);
        }

        let mut parts = line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(method), Some(target), Some(version), None) => (method, target, version),
            _ => return Err(invalid()),
        };

        let method = match method {
            "GET" => Method::Get,
            "POST" => Method::Post,
            _ => return Err(invalid()),
        };

        if target.is_empty() || !is_http_version(version) {
            return Err(invalid());
        }

        Ok(Self {
            method,
            target: target.to_string(),
            version: version.to_string(),
        })
    }

    /// Target without its query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }
}

fn is_http_version(version: &str) -> bool {
    let Some(number) = version.strip_prefix("HTTP/") else {
        return false;
    };
    match number.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(|c: char| c == '\r' || c == '\n')
}

/// Request headers in arrival order. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `Name: value` line and add it.
    pub fn push_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        let (name, value) = parse_header_line(line)?;
        self.insert(name, value);
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Split a header line on its first `:` and trim both sides.
pub fn parse_header_line(line: &str) -> Result<(String, String), ProtocolError> {
    let line = trim_line_ending(line);
    if line.len() > MAX_LINE_LENGTH {
        return Err(ProtocolError::HeaderTooLong);
    }
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::MissingHeaderSeparator(line.to_string()))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

/// Body encoding announced by `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    UrlEncoded,
    Multipart { boundary: String },
    Other(String),
}

impl ContentType {
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        let lower = value.to_ascii_lowercase();
        if lower.contains("x-www-form-urlencoded") {
            return Ok(ContentType::UrlEncoded);
        }
        if !lower.contains("multipart") {
            return Ok(ContentType::Other(value.trim().to_string()));
        }

        let boundary = value
            .split(';')
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim()
                    .eq_ignore_ascii_case("boundary")
                    .then(|| value.trim().trim_matches('"'))
            })
            .next()
            .filter(|boundary| !boundary.is_empty())
            .ok_or(ProtocolError::MissingBoundary)?;

        Ok(ContentType::Multipart {
            boundary: boundary.to_string(),
        })
    }
}

/// A request whose head has been read. The body is still on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    /// Declared body length, zero when absent on a `GET`.
    pub content_length: usize,
    pub content_type: Option<ContentType>,
}

impl Request {
    /// Validate body framing and build the request.
    ///
    /// A `POST` must declare its length. A `GET` may, in which case the body
    /// is drained before the response.
    pub fn from_head(line: RequestLine, headers: HeaderMap) -> Result<Self, ProtocolError> {
        let content_length = match headers.get("content-length") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(raw.to_string()))?,
            None if line.method == Method::Post => {
                return Err(ProtocolError::InvalidContentLength(String::new()))
            }
            None => 0,
        };

        let content_type = headers
            .get("content-type")
            .map(ContentType::parse)
            .transpose()?;

        Ok(Self {
            method: line.method,
            target: line.target,
            headers,
            content_length,
            content_type,
        })
    }

    /// Target without its query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let line = RequestLine::parse("GET /favicon.ico HTTP/1.1\r\n").unwrap();
        assert_eq!(line.method, Method::Get);
        assert_eq!(line.target, "/favicon.ico");
        assert_eq!(line.version, "HTTP/1.1");

        let line = RequestLine::parse("POST /?x=1 HTTP/2.0").unwrap();
        assert_eq!(line.method, Method::Post);
        assert_eq!(line.path(), "/");
    }

    #[test]
    fn test_reject_bad_request_lines() {
        for line in [
            "",
            "GET /",
            "PUT / HTTP/1.1",
            "get / HTTP/1.1",
            "GET / HTTP/1.1 extra",
            "GET / FTP/1.0",
            "GET / HTTP/x.1",
            "GET  HTTP/1.1",
        ] {
            assert!(
                matches!(
                    RequestLine::parse(line),
                    Err(ProtocolError::InvalidRequestLine(_))
                ),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn test_reject_long_request_line() {
        let line = format!("GET /{} HTTP/1.1", "a".repeat(MAX_LINE_LENGTH));
        assert_eq!(RequestLine::parse(&line), Err(ProtocolError::HeaderTooLong));
    }

    #[test]
    fn test_parse_header_line() {
        assert_eq!(
            parse_header_line("Content-Type:  text/html \r\n").unwrap(),
            ("Content-Type".to_string(), "text/html".to_string())
        );
        // Only the first colon separates
        assert_eq!(
            parse_header_line("Host: 192.168.4.1:80").unwrap(),
            ("Host".to_string(), "192.168.4.1:80".to_string())
        );
        assert!(matches!(
            parse_header_line("no separator here"),
            Err(ProtocolError::MissingHeaderSeparator(_))
        ));
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.push_line("content-length: 42").unwrap();
        headers.push_line("Content-Type: text/plain").unwrap();

        assert_eq!(headers.get("Content-Length"), Some("42"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("Host"), None);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_content_type_selection() {
        assert_eq!(
            ContentType::parse("application/x-www-form-urlencoded").unwrap(),
            ContentType::UrlEncoded
        );
        assert_eq!(
            ContentType::parse("multipart/form-data; boundary=----WebKitFormBoundaryXYZ").unwrap(),
            ContentType::Multipart {
                boundary: "----WebKitFormBoundaryXYZ".to_string()
            }
        );
        assert_eq!(
            ContentType::parse("multipart/form-data; charset=utf-8; boundary=\"abc def\"").unwrap(),
            ContentType::Multipart {
                boundary: "abc def".to_string()
            }
        );
        assert_eq!(
            ContentType::parse("multipart/form-data"),
            Err(ProtocolError::MissingBoundary)
        );
        assert_eq!(
            ContentType::parse("application/json").unwrap(),
            ContentType::Other("application/json".to_string())
        );
    }

    #[test]
    fn test_post_requires_content_length() {
        let line = RequestLine::parse("POST / HTTP/1.1").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/x-www-form-urlencoded");

        assert!(matches!(
            Request::from_head(line.clone(), headers.clone()),
            Err(ProtocolError::InvalidContentLength(_))
        ));

        headers.insert("Content-Length", "abc");
        assert_eq!(
            Request::from_head(line, headers),
            Err(ProtocolError::InvalidContentLength("abc".to_string()))
        );
    }

    #[test]
    fn test_get_without_body() {
        let line = RequestLine::parse("GET /upload HTTP/1.1").unwrap();
        let request = Request::from_head(line, HeaderMap::new()).unwrap();

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.content_length, 0);
        assert_eq!(request.content_type, None);
        assert_eq!(request.path(), "/upload");
    }
}
