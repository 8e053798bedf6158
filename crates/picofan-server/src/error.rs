//! Server errors and the status codes they are reported with.

use std::io;

use thiserror::Error;

use picofan_core::{ConfigError, CredentialsError, FileError};
use picofan_protocol::{ProtocolError, Status};

use crate::device::RadioError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Form field '{0}' is missing")]
    MissingField(&'static str),

    #[error("Form submission was not recognized")]
    UnrecognizedForm,

    #[error("Not found: {0}")]
    AssetNotFound(String),
}

impl ServerError {
    /// Status of the error page sent when nothing has been written yet.
    pub fn status(&self) -> Status {
        match self {
            ServerError::Protocol(_)
            | ServerError::MissingField(_)
            | ServerError::UnrecognizedForm
            | ServerError::Config(ConfigError::InvalidField(_))
            | ServerError::File(FileError::InvalidPath(_)) => Status::BadRequest,
            ServerError::AssetNotFound(_) | ServerError::File(FileError::NotFound(_)) => {
                Status::NotFound
            }
            _ => Status::InternalServerError,
        }
    }
}
