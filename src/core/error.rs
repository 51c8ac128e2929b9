//! Purpose: Single structured error type for the validation pipeline and CLI.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Every layer surfaces failures as `Error`; callers branch on `kind()`.
//! Invariants: Decode absence/malformed details survive as `decode_error()`.
//! Invariants: Exit code mapping is stable once published.
use std::error::Error as StdError;
use std::fmt;

use crate::core::request::DecodeError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    BadInput,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    parameter: Option<String>,
    index: Option<u64>,
    hint: Option<String>,
    decode: Option<DecodeError>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            parameter: None,
            index: None,
            hint: None,
            decode: None,
            source: None,
        }
    }

    /// Shorthand for the pipeline's user-facing rejection kind.
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput).with_message(message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    pub fn index(&self) -> Option<u64> {
        self.index
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn decode_error(&self) -> Option<&DecodeError> {
        self.decode.as_ref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_decode(mut self, decode: DecodeError) -> Self {
        self.decode = Some(decode);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl From<DecodeError> for Error {
    fn from(decode: DecodeError) -> Self {
        Error::new(ErrorKind::BadInput)
            .with_message(decode.to_string())
            .with_parameter(decode.parameter())
            .with_decode(decode)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(index) = self.index {
            write!(f, " (index: {index})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        if let Some(source) = self.source.as_ref() {
            return Some(source.as_ref() as &(dyn StdError + 'static));
        }
        self.decode
            .as_ref()
            .map(|decode| decode as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::BadInput => 4,
        ErrorKind::Io => 5,
    }
}
