//! One accepted connection: read one request, write one response.
//!
//! Bodies are never held whole. Url-encoded bodies are read up to a fixed
//! chunk, multipart bodies are streamed to flash in small windows.

use std::io::Write;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, error, warn};

use picofan_core::codec::{escape_html, simple_page};
use picofan_core::files::upload_file_name;
use picofan_core::{FileError, FileManager};
use picofan_protocol::codec::url_encoded_read_len;
use picofan_protocol::response::TEXT_HTML;
use picofan_protocol::{
    HeaderMap, Method, MultipartDecoder, ProtocolError, Request, RequestLine, ResponseHead,
    MAX_LINE_LENGTH, MULTIPART_WINDOW,
};

use crate::error::ServerError;

/// Byte stream a connection runs over: plain TCP, TLS, or an in-memory pipe
/// in tests.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A file received through a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub name: String,
    pub size: usize,
}

pub struct Connection {
    stream: BufReader<Box<dyn Transport>>,
    head_written: bool,
}

impl Connection {
    pub fn new(stream: impl Transport + 'static) -> Self {
        Self {
            stream: BufReader::new(Box::new(stream)),
            head_written: false,
        }
    }

    /// Whether a response head has gone out. After that an error can only
    /// be logged.
    pub fn head_written(&self) -> bool {
        self.head_written
    }

    /// Read the request line and headers.
    ///
    /// A body declared on a `GET` is drained here so the client has finished
    /// sending before the response starts.
    pub async fn read_request(&mut self) -> Result<Request, ServerError> {
        let line = self.read_line().await?;
        let request_line = RequestLine::parse(&line)?;

        let mut headers = HeaderMap::new();
        loop {
            let line = self.read_line().await?;
            if line.trim_end_matches(|c: char| c == '\r' || c == '\n').is_empty() {
                break;
            }
            headers.push_line(&line)?;
        }

        let request = Request::from_head(request_line, headers)?;
        if request.method == Method::Get && request.content_length > 0 {
            self.drain(request.content_length).await?;
        }
        Ok(request)
    }

    async fn read_line(&mut self) -> Result<String, ServerError> {
        let limit = (MAX_LINE_LENGTH + 2) as u64;
        let mut buf = Vec::new();
        let read = (&mut self.stream)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;

        if buf.ends_with(b"\n") {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        if read as u64 == limit {
            Err(ProtocolError::HeaderTooLong.into())
        } else {
            Err(ProtocolError::UnexpectedEof.into())
        }
    }

    /// Discard `len` body bytes.
    pub async fn drain(&mut self, len: usize) -> Result<(), ServerError> {
        let drained = tokio::io::copy(&mut (&mut self.stream).take(len as u64), &mut tokio::io::sink())
            .await?;
        if drained < len as u64 {
            debug!("Body ended after {} of {} bytes", drained, len);
        }
        Ok(())
    }

    /// Read a url-encoded body, truncated to the read chunk.
    pub async fn read_url_encoded_body(
        &mut self,
        content_length: usize,
    ) -> Result<String, ServerError> {
        let (len, truncated) = url_encoded_read_len(content_length);
        let mut body = vec![0; len];
        self.stream.read_exact(&mut body).await?;

        if truncated {
            warn!(
                "Url-encoded body of {} bytes truncated to {}",
                content_length, len
            );
            self.drain(content_length - len).await?;
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Stream a single-file multipart body into the flash root.
    ///
    /// The file is created as soon as the part headers are in and each
    /// window is written before the next is read.
    pub async fn read_multipart_body(
        &mut self,
        content_length: usize,
        boundary: &str,
        files: &FileManager,
    ) -> Result<StoredUpload, ServerError> {
        let mut decoder = MultipartDecoder::new(boundary);
        let mut target: Option<(String, std::fs::File)> = None;
        let mut window = [0u8; MULTIPART_WINDOW];
        let mut remaining = content_length;

        while remaining > 0 {
            let len = remaining.min(MULTIPART_WINDOW);
            self.stream.read_exact(&mut window[..len]).await?;
            remaining -= len;

            let content = decoder.push(&window[..len])?;
            if target.is_none() {
                if let Some(raw) = decoder.filename() {
                    let name = upload_file_name(raw)
                        .ok_or_else(|| FileError::InvalidPath(raw.to_string()))?;
                    debug!("Receiving upload '{}' ({} bytes)", name, content_length);
                    let file = files.create(&name)?;
                    target = Some((name, file));
                }
            }
            if let Some((name, file)) = target.as_mut() {
                file.write_all(&content).map_err(|source| FileError::Io {
                    name: name.clone(),
                    source,
                })?;
            }
        }

        let size = decoder.released();
        decoder.finish()?;
        let (name, _) = target.ok_or(ProtocolError::MissingFilename)?;
        Ok(StoredUpload { name, size })
    }

    pub async fn write_head(&mut self, head: &ResponseHead) -> Result<(), ServerError> {
        self.head_written = true;
        self.stream.write_all(head.render().as_bytes()).await?;
        Ok(())
    }

    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ServerError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ServerError> {
        self.stream.flush().await?;
        Ok(())
    }

    /// Write a head followed by the page one chunk at a time.
    pub async fn write_page<I>(&mut self, head: &ResponseHead, chunks: I) -> Result<(), ServerError>
    where
        I: IntoIterator<Item = String>,
    {
        self.write_head(head).await?;
        for chunk in chunks {
            self.stream.write_all(chunk.as_bytes()).await?;
        }
        self.flush().await
    }

    /// Log a failed request and answer with an error page if the response
    /// has not started.
    pub async fn write_error(&mut self, err: &ServerError) {
        let status = err.status();
        if status.code() < 500 {
            warn!("Request failed with {}: {}", status, err);
        } else {
            error!("Request failed with {}: {}", status, err);
        }

        if self.head_written {
            debug!("Response already started, closing connection");
            return;
        }

        let page = simple_page(status.reason(), &format!("<p>{}</p>", escape_html(&err.to_string())));
        let head = ResponseHead::new(status, TEXT_HTML).with_content_length(page.len());
        if let Err(e) = self.write_page(&head, Some(page)).await {
            debug!("Failed to send error page: {}", e);
        }
    }

    /// Flush and close the write side.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error closing connection: {}", e);
        }
    }
}
