use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    VersionConflict,
    TypeMismatch,
    InvalidMapping,
    IndexClosed,
    QuerySyntaxError,
    UnsupportedPattern,
    InvalidArgument,
    Internal,
}

#[derive(Debug, Clone, PartialEq, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn index_not_found(index: &str) -> Self {
        Error::new(ErrorKind::NotFound, format!("no such index [{}]", index))
    }

    pub fn document_not_found(index: &str, id: &str) -> Self {
        Error::new(ErrorKind::NotFound, format!("[{}]: document [{}] missing", index, id))
    }

    pub fn field_not_found(index: &str, field: &str) -> Self {
        Error::new(ErrorKind::NotFound, format!("[{}]: no mapping for field [{}]", index, field))
    }

    pub fn version_conflict(index: &str, id: &str, detail: impl std::fmt::Display) -> Self {
        Error::new(
            ErrorKind::VersionConflict,
            format!("[{}]: version conflict on document [{}], {}", index, id, detail),
        )
    }

    pub fn type_mismatch(field: &str, detail: impl std::fmt::Display) -> Self {
        Error::new(
            ErrorKind::TypeMismatch,
            format!("failed to parse field [{}]: {}", field, detail),
        )
    }

    pub fn invalid_mapping(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidMapping, detail.into())
    }

    pub fn index_closed(index: &str) -> Self {
        Error::new(ErrorKind::IndexClosed, format!("index [{}] is closed", index))
    }

    pub fn query(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::QuerySyntaxError, detail.into())
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, detail.into())
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error {
            kind: ErrorKind::QuerySyntaxError,
            context: format!("invalid pattern: {}", err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::InvalidArgument,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_kind_and_target() {
        let err = Error::document_not_found("products", "42");
        assert_eq!(err.to_string(), "NotFound: [products]: document [42] missing");
        assert!(err.is(ErrorKind::NotFound));
    }

    #[test]
    fn regex_errors_are_query_errors() {
        let err: Error = regex::Regex::new("(unclosed").unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::QuerySyntaxError);
    }
}
