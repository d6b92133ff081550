//! Error types for Maktaba

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaktabaError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for MaktabaError {
    fn from(err: std::io::Error) -> Self {
        MaktabaError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for MaktabaError {
    fn from(err: reqwest::Error) -> Self {
        MaktabaError::Fetch(err.to_string())
    }
}

impl serde::Serialize for MaktabaError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MaktabaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_keep_their_message() {
        let err: MaktabaError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err, MaktabaError::Io("denied".into()));
    }

    #[test]
    fn test_serializes_as_message() {
        let json = serde_json::to_string(&MaktabaError::NotFound("book 7".into())).unwrap();
        assert_eq!(json, "\"Not found: book 7\"");
    }
}
