//! Streaming decoder for single-file `multipart/form-data` bodies.
//!
//! The body arrives in small windows and the file is written as it arrives.
//! Bytes are released only once they can no longer be the start of the
//! closing delimiter `\r\n--<boundary>`, so the delimiter never reaches the
//! file even when it straddles two windows.

use crate::codec::{find_subsequence, ProtocolError};

/// Bound on the part headers that may accumulate before the blank line.
pub const MAX_PART_HEADERS: usize = 2048;

const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PartHeaders,
    Content,
    Done,
}

/// Decodes one file part, window by window.
#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    buffer: Vec<u8>,
    state: State,
    filename: Option<String>,
    released: usize,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            delimiter,
            buffer: Vec::new(),
            state: State::PartHeaders,
            filename: None,
            released: 0,
        }
    }

    /// The `filename` from the part headers, once they have been read.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Whether the closing delimiter has been seen.
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Number of file bytes released so far.
    pub fn released(&self) -> usize {
        self.released
    }

    /// Feed the next window and return the file bytes that are safe to
    /// write. Bytes after the closing delimiter are discarded.
    pub fn push(&mut self, window: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        match self.state {
            State::Done => Ok(Vec::new()),
            State::PartHeaders => {
                self.buffer.extend_from_slice(window);
                let Some(end) = find_subsequence(&self.buffer, HEADER_END) else {
                    if self.buffer.len() > MAX_PART_HEADERS {
                        return Err(ProtocolError::PartHeadersTooLong(MAX_PART_HEADERS));
                    }
                    return Ok(Vec::new());
                };

                let headers = String::from_utf8_lossy(&self.buffer[..end]);
                let filename = part_filename(&headers).ok_or(ProtocolError::MissingFilename)?;
                self.filename = Some(filename);
                self.buffer.drain(..end + HEADER_END.len());
                self.state = State::Content;
                Ok(self.release())
            }
            State::Content => {
                self.buffer.extend_from_slice(window);
                Ok(self.release())
            }
        }
    }

    /// Check that the body was complete. Returns the filename.
    pub fn finish(self) -> Result<String, ProtocolError> {
        match (self.state, self.filename) {
            (State::Done, Some(filename)) => Ok(filename),
            (State::PartHeaders, _) => Err(ProtocolError::MissingFilename),
            _ => Err(ProtocolError::UnterminatedMultipart),
        }
    }

    fn release(&mut self) -> Vec<u8> {
        if let Some(position) = find_subsequence(&self.buffer, &self.delimiter) {
            self.buffer.truncate(position);
            self.state = State::Done;
            let content = std::mem::take(&mut self.buffer);
            self.released += content.len();
            return content;
        }

        // A partial delimiter at the tail is at most one byte shorter than it.
        let hold_back = self.delimiter.len() - 1;
        if self.buffer.len() <= hold_back {
            return Vec::new();
        }
        let safe = self.buffer.len() - hold_back;
        let content: Vec<u8> = self.buffer.drain(..safe).collect();
        self.released += content.len();
        content
    }
}

/// Extract the `filename` parameter from a `Content-Disposition` header.
fn part_filename(headers: &str) -> Option<String> {
    headers
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("content-disposition"))
        .flat_map(|(_, value)| split_params(value))
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, value)| {
            let value = value.trim();
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
                .to_string()
        })
}

/// Split header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}
