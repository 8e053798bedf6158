//! Limits and errors shared by the request parser and body decoders.
//!
//! The device reads bodies in small fixed windows, never the whole body at
//! once. These constants define those windows.

use thiserror::Error;

/// Longest request or header line accepted, in bytes.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Default read size for url-encoded bodies.
pub const URL_ENCODED_CHUNK: usize = 1024;

/// Window size used when streaming multipart bodies to flash.
pub const MULTIPART_WINDOW: usize = 512;

/// Errors that can occur while parsing a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first line is not `GET|POST target HTTP/x.y`.
    #[error("Invalid request line: {0:?}")]
    InvalidRequestLine(String),

    /// A header line has no `:` separator.
    #[error("Header line has no ':' separator: {0:?}")]
    MissingHeaderSeparator(String),

    /// A request or header line exceeds [`MAX_LINE_LENGTH`].
    #[error("Line exceeds {MAX_LINE_LENGTH} bytes")]
    HeaderTooLong,

    /// The connection closed before the request head was complete.
    #[error("Connection closed before the request was complete")]
    UnexpectedEof,

    /// `Content-Length` is missing or not a number.
    #[error("Missing or invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// The body encoding is neither url-encoded nor multipart.
    #[error("Unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    /// A multipart content type without a `boundary=` parameter.
    #[error("Multipart content type has no boundary")]
    MissingBoundary,

    /// The multipart part headers carry no `filename` parameter.
    #[error("Multipart part has no filename")]
    MissingFilename,

    /// The multipart part headers never ended.
    #[error("Multipart part headers exceed {0} bytes")]
    PartHeadersTooLong(usize),

    /// The body ended before the closing boundary.
    #[error("Multipart body ended without closing boundary")]
    UnterminatedMultipart,
}

/// How many bytes of a url-encoded body are read.
///
/// The chunk doubles once when the body is larger than the default; bodies
/// larger still are truncated to that chunk. Returns the read size and
/// whether the body is truncated.
pub fn url_encoded_read_len(content_length: usize) -> (usize, bool) {
    let chunk = if content_length > URL_ENCODED_CHUNK {
        URL_ENCODED_CHUNK * 2
    } else {
        URL_ENCODED_CHUNK
    };
    (content_length.min(chunk), content_length > chunk)
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
