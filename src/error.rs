//! Crate level error type.
//!
//! Every failure surfaced by the runtime is one variant of [`Error`]. Each
//! variant wraps a typed error that keeps the underlying cause reachable
//! through `source()`.

use crate::document::MediaType;
use crate::eval::{EvaluationError, ScriptCompileError};
use crate::formats::{DecodeError, Direction, EncodeError};
use crate::header::HeaderParseError;
use crate::library::LibraryResolutionError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    HeaderParse(#[from] HeaderParseError),

    #[error(transparent)]
    ScriptCompile(#[from] ScriptCompileError),

    #[error(transparent)]
    LibraryResolution(#[from] LibraryResolutionError),

    #[error("no data format can {direction} {media_type}")]
    UnsupportedMediaType {
        media_type: String,
        direction: Direction,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Discriminant of [`Error`], for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    HeaderParse,
    ScriptCompile,
    LibraryResolution,
    UnsupportedMediaType,
    Decode,
    Encode,
    Evaluation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::HeaderParse(_) => ErrorKind::HeaderParse,
            Error::ScriptCompile(_) => ErrorKind::ScriptCompile,
            Error::LibraryResolution(_) => ErrorKind::LibraryResolution,
            Error::UnsupportedMediaType { .. } => ErrorKind::UnsupportedMediaType,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Encode(_) => ErrorKind::Encode,
            Error::Evaluation(_) => ErrorKind::Evaluation,
        }
    }

    /// No registered format serves any of `requested`.
    pub fn unsupported(requested: &[MediaType], direction: Direction) -> Self {
        let media_type = match requested {
            [] => String::from("(none)"),
            [single] => single.to_string(),
            many => many
                .iter()
                .map(MediaType::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        };
        Error::UnsupportedMediaType {
            media_type,
            direction,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::HeaderParse => "header parse",
            ErrorKind::ScriptCompile => "script compile",
            ErrorKind::LibraryResolution => "library resolution",
            ErrorKind::UnsupportedMediaType => "unsupported media type",
            ErrorKind::Decode => "decode",
            ErrorKind::Encode => "encode",
            ErrorKind::Evaluation => "evaluation",
        };
        write!(f, "{}", name)
    }
}
