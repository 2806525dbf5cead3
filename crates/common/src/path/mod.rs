// Document path validation: absolute, percent-decoded, 512 char max.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum allowed path length in characters.
const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path must begin with '/'")]
    NotAbsolute,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains null byte")]
    NullByte,
}

/// A validated document path.
///
/// Not a filesystem path: an opaque identifier for a page of the built
/// site. The route layer percent-decodes the raw segment before this
/// type ever sees it.
///
/// Rules:
/// - Non-empty
/// - Must begin with `/`
/// - No null bytes
/// - At most 512 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(String);

impl PathId {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        if input.contains('\0') {
            return Err(PathError::NullByte);
        }

        if !input.starts_with('/') {
            return Err(PathError::NotAbsolute);
        }

        if input.chars().count() > MAX_PATH_CHARS {
            return Err(PathError::TooLong);
        }

        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_path() {
        assert_eq!(PathId::parse("/docs/intro").unwrap().as_str(), "/docs/intro");
    }

    #[test]
    fn test_root_path() {
        assert_eq!(PathId::parse("/").unwrap().as_str(), "/");
    }

    #[test]
    fn test_decoded_unicode_path() {
        assert_eq!(PathId::parse("/图论/简介").unwrap().as_str(), "/图论/简介");
    }

    #[test]
    fn test_trailing_slash_is_preserved() {
        assert_eq!(PathId::parse("/docs/intro/").unwrap().as_str(), "/docs/intro/");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(PathId::parse(""), Err(PathError::Empty));
    }

    #[test]
    fn test_rejects_relative() {
        assert_eq!(PathId::parse("docs/intro"), Err(PathError::NotAbsolute));
    }

    #[test]
    fn test_rejects_null_byte() {
        assert_eq!(PathId::parse("/docs\0intro"), Err(PathError::NullByte));
    }

    #[test]
    fn test_rejects_over_length() {
        let long = format!("/{}", "a".repeat(512));
        assert_eq!(PathId::parse(&long), Err(PathError::TooLong));
    }

    #[test]
    fn test_accepts_exact_length() {
        let exact = format!("/{}", "a".repeat(511));
        assert!(PathId::parse(&exact).is_ok());
    }
}
