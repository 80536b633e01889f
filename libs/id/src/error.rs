//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID exceeds the maximum accepted length.
    #[error("ID too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    /// The ID contains whitespace or a control character.
    #[error("invalid character {found:?} at byte {index} in {kind}")]
    InvalidCharacter {
        kind: &'static str,
        found: char,
        index: usize,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}

/// Validate the raw text of an id of the given kind.
pub fn validate(kind: &'static str, s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    if s.len() > crate::MAX_ID_LEN {
        return Err(IdError::TooLong {
            len: s.len(),
            max: crate::MAX_ID_LEN,
        });
    }

    if let Some((index, found)) = s
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || c.is_control())
    {
        return Err(IdError::InvalidCharacter { kind, found, index });
    }

    Ok(())
}
