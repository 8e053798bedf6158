//! # picofan-protocol
//!
//! The small HTTP/1.x subset spoken by the PicoFan web server.
//!
//! Parsing is pure and runtime-agnostic: callers read lines and body windows
//! from whatever transport they have and feed them in here.

pub mod codec;
pub mod multipart;
pub mod request;
pub mod response;

pub use codec::{ProtocolError, MAX_LINE_LENGTH, MULTIPART_WINDOW, URL_ENCODED_CHUNK};
pub use multipart::MultipartDecoder;
pub use request::{ContentType, HeaderMap, Method, Request, RequestLine};
pub use response::{ResponseHead, Status};
