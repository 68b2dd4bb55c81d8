//! Error types for the vCenter client crate.

use std::fmt;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcenterErrorKind {
    /// Required field absent from a payload
    MissingDataField,
    /// Field present but of the wrong JSON type
    InvalidDataTypeField,
    /// String value outside the known enumeration labels
    InvalidFieldValue,
    /// vCenter unreachable
    ConnectionError,
    /// Authentication failed or session expired (401)
    AuthenticationError,
    /// Permission denied (403)
    AccessDenied,
    /// Resource not found (404)
    NotFound,
    /// HTTP / API error with status code
    ApiError(u16),
    /// Timeout
    Timeout,
    /// JSON / XML parse error
    ParseError,
    /// vim25 SOAP fault
    SoapFault,
    /// Task failed on vCenter
    TaskError,
    /// Invalid client configuration
    ConfigError,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone)]
pub struct VcenterError {
    pub kind: VcenterErrorKind,
    pub message: String,
}

impl VcenterError {
    pub fn new(kind: VcenterErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            VcenterErrorKind::MissingDataField,
            format!("Missing {field} required attribute"),
        )
    }

    pub fn invalid_type(field: &str, expected: &str) -> Self {
        Self::new(
            VcenterErrorKind::InvalidDataTypeField,
            format!("Field {field} must have {expected} type"),
        )
    }

    pub fn invalid_value(field: &str, value: &str) -> Self {
        Self::new(
            VcenterErrorKind::InvalidFieldValue,
            format!("Invalid {field} field value: {value:?}"),
        )
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::AuthenticationError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::NotFound, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::ApiError(status), msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::ParseError, msg)
    }

    pub fn soap_fault(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::SoapFault, msg)
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::TaskError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::Timeout, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(VcenterErrorKind::ConfigError, msg)
    }

    /// True for the three payload-decoding kinds.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self.kind,
            VcenterErrorKind::MissingDataField
                | VcenterErrorKind::InvalidDataTypeField
                | VcenterErrorKind::InvalidFieldValue
        )
    }
}

impl fmt::Display for VcenterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for VcenterError {}

impl From<VcenterError> for String {
    fn from(e: VcenterError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for VcenterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(VcenterErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for VcenterError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

impl From<quick_xml::Error> for VcenterError {
    fn from(e: quick_xml::Error) -> Self {
        Self::parse(format!("XML parse error: {e}"))
    }
}

/// Convenience alias.
pub type VcenterResult<T> = Result<T, VcenterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = VcenterError::api(500, "boom");
        let s = err.to_string();
        assert!(s.contains("ApiError(500)"));
        assert!(s.contains("boom"));
    }

    #[test]
    fn decode_kinds_are_flagged() {
        assert!(VcenterError::missing_field("name").is_decode_error());
        assert!(VcenterError::invalid_type("name", "string").is_decode_error());
        assert!(VcenterError::invalid_value("type", "FOO").is_decode_error());
        assert!(!VcenterError::not_found("vm-1").is_decode_error());
    }

    #[test]
    fn messages_name_the_field() {
        assert!(VcenterError::missing_field("power_state")
            .message
            .contains("power_state"));
        let err = VcenterError::invalid_type("cpu_count", "integer");
        assert!(err.message.contains("cpu_count"));
        assert!(err.message.contains("integer"));
    }
}
