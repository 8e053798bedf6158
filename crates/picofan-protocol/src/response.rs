//! Response status line and headers.
//!
//! Every response closes the connection, so the body length is optional and
//! pages can be streamed in chunks after the head.

use std::fmt;

pub const HTTP_VERSION: &str = "HTTP/1.1";

pub const TEXT_HTML: &str = "text/html";
pub const TEXT_CSS: &str = "text/css";
pub const TEXT_JAVASCRIPT: &str = "text/javascript";
pub const IMAGE_ICON: &str = "image/x-icon";

/// Status codes the device answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: Status,
    pub content_type: &'static str,
    pub content_length: Option<usize>,
}

impl ResponseHead {
    pub fn new(status: Status, content_type: &'static str) -> Self {
        Self {
            status,
            content_type,
            content_length: None,
        }
    }

    /// `200 OK` HTML page of unknown length.
    pub fn html() -> Self {
        Self::new(Status::Ok, TEXT_HTML)
    }

    pub fn with_content_length(mut self, length: usize) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Render the status line and headers, blank line included.
    pub fn render(&self) -> String {
        let mut head = format!(
            "{HTTP_VERSION} {}\r\nContent-Type: {}\r\n",
            self.status, self.content_type
        );
        if let Some(length) = self.content_length {
            head.push_str(&format!("Content-Length: {length}\r\n"));
        }
        head.push_str("Connection: close\r\n\r\n");
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_html_head() {
        assert_eq!(
            ResponseHead::html().render(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_render_with_length() {
        let head = ResponseHead::new(Status::Ok, IMAGE_ICON).with_content_length(318);
        assert_eq!(
            head.render(),
            "HTTP/1.1 200 OK\r\nContent-Type: image/x-icon\r\nContent-Length: 318\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(Status::BadRequest.to_string(), "400 Bad Request");
        assert_eq!(Status::NotFound.to_string(), "404 Not Found");
        assert_eq!(
            Status::InternalServerError.to_string(),
            "500 Internal Server Error"
        );
    }
}
