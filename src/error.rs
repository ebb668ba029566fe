//! Errors raised at the load/save boundary.
//!
//! Graph edits never fail with an `Error`; they report through `bool` and
//! `Option` returns. Only reading or writing a whole document does.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or save a COLLADA document.
#[derive(Error, Debug)]
pub enum Error {
    /// The file could not be read or written.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The text is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The root element is not `<COLLADA>`.
    #[error("root element is <{0}>, expected <COLLADA>")]
    NotCollada(String),

    /// A required attribute is absent.
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    /// The element exists but its content cannot be interpreted.
    #[error("malformed <{element}>: {reason}")]
    Malformed { element: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(element: &str, reason: impl Into<String>) -> Error {
        Error::Malformed {
            element: element.to_string(),
            reason: reason.into(),
        }
    }
}
