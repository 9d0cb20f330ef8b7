use thiserror::Error;

/// Failure reasons for a data-collection job.
///
/// `Connection`, `DataFormat` and `ServerReported` are the terminal job
/// failures delivered through a single `on_error` callback. `InvalidInput` is
/// only ever returned synchronously, before anything is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    /// Backend unreachable, start request refused at the transport level,
    /// or the stream dropped before a terminal event.
    #[error("connection error: {0}")]
    Connection(String),
    /// An event frame or the terminal payload could not be decoded.
    #[error("data format error: {0}")]
    DataFormat(String),
    /// Explicit failure reported by the backend. Displayed verbatim.
    #[error("{0}")]
    ServerReported(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ReceiptError {
    pub fn missing_field(path: &str) -> Self {
        ReceiptError::DataFormat(format!("missing field `{path}`"))
    }

    pub fn invalid_field(path: &str, expected: &str) -> Self {
        ReceiptError::DataFormat(format!("invalid field `{path}`: expected {expected}"))
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ReceiptError::Connection(_) => "connection",
            ReceiptError::DataFormat(_) => "data_format",
            ReceiptError::ServerReported(_) => "server_reported",
            ReceiptError::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReceiptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_reported_displays_message_verbatim() {
        let err = ReceiptError::ServerReported("rate limited".into());
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(err.kind(), "server_reported");
    }

    #[test]
    fn field_errors_name_the_path() {
        let err = ReceiptError::missing_field("followers.totalCount");
        assert!(err.to_string().contains("`followers.totalCount`"));

        let err = ReceiptError::invalid_field("best_day.date", "a YYYY-MM-DD date");
        assert_eq!(
            err.to_string(),
            "data format error: invalid field `best_day.date`: expected a YYYY-MM-DD date"
        );
    }
}
