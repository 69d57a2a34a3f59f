use crate::Rule;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("Unknown class '{0}'")]
    UnknownClass(String),
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("Unknown data blob '{0}'")]
    UnknownData(String),
    #[error("'{0}' is defined more than once")]
    Duplicate(String),
    #[error("Invalid {what}: '{text}'")]
    Invalid { what: &'static str, text: String },
    #[error("Signature of function {0} does not match its method declaration")]
    SignatureMismatch(String),
    #[error("Malformed {0}")]
    Malformed(&'static str),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub(crate) fn invalid(what: &'static str, text: impl Into<String>) -> Self {
        ParseError::Invalid {
            what,
            text: text.into(),
        }
    }
}
