//! Error handling for the MkulimaExpo core
//!
//! Two layers: [`GatewayError`] for whatever went wrong while talking to the
//! backend, and [`Error`] for the classified failure a controller reports.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the remote data gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket errors from the realtime connection
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The backend answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// An operation needed a signed-in user
    #[error("not signed in")]
    NotAuthenticated,

    /// Realtime protocol errors
    #[error("realtime error: {0}")]
    Realtime(String),
}

impl GatewayError {
    /// Create a status error from a response code and body
    pub fn status<T: fmt::Display>(status: u16, message: T) -> Self {
        GatewayError::Status {
            status,
            message: message.to_string(),
        }
    }

    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        GatewayError::Realtime(msg.to_string())
    }

    /// The HTTP status, when the backend produced one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            GatewayError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A single failed validation rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    /// Field name as bound in the form
    pub field: &'static str,
    /// Human readable reason
    pub reason: String,
}

impl FieldProblem {
    pub fn new<T: Into<String>>(field: &'static str, reason: T) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Every rule that failed for one submission or upload batch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub problems: Vec<FieldProblem>,
}

impl ValidationError {
    pub fn single(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            problems: vec![FieldProblem::new(field, reason)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn push(&mut self, field: &'static str, reason: impl Into<String>) {
        self.problems.push(FieldProblem::new(field, reason));
    }

    /// Names of the failing fields, in rule order
    pub fn fields(&self) -> Vec<&'static str> {
        self.problems.iter().map(|p| p.field).collect()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<&str> = self.problems.iter().map(|p| p.reason.as_str()).collect();
        write!(f, "Please fix the following: {}", reasons.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Which write an upload or mutation failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Upload,
    Insert,
    Update,
    Upsert,
    Delete,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PersistStage::Upload => "image upload",
            PersistStage::Insert => "insert",
            PersistStage::Update => "update",
            PersistStage::Upsert => "upsert",
            PersistStage::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Classified error surfaced by repositories and controllers
#[derive(Error, Debug)]
pub enum Error {
    /// Client-side validation, no network call was made
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Credential or identity failures
    #[error("authentication error: {0}")]
    Auth(String),

    /// Malformed identifier or no matching row
    #[error("not found: {0}")]
    NotFound(String),

    /// An ownership-scoped mutation touched zero rows
    #[error("listing {0} does not belong to the current farmer")]
    Forbidden(Uuid),

    /// Transport or backend fault during a write.
    ///
    /// `orphaned` lists storage paths written before the failure; nothing
    /// references them.
    #[error("{stage} failed ({} image(s) already stored): {source}", orphaned.len())]
    Persistence {
        stage: PersistStage,
        orphaned: Vec<String>,
        #[source]
        source: GatewayError,
    },

    /// Transport or backend fault during a read
    #[error("query failed: {0}")]
    Query(#[source] GatewayError),

    /// Start-up configuration problems
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Wrap a gateway failure that happened while writing
    pub fn persistence(stage: PersistStage, source: GatewayError) -> Self {
        Error::Persistence {
            stage,
            orphaned: Vec::new(),
            source,
        }
    }

    /// Record uploads that a failed write leaves unreferenced
    pub fn with_orphans(mut self, paths: Vec<String>) -> Self {
        if let Error::Persistence { orphaned, .. } = &mut self {
            orphaned.extend(paths);
        }
        self
    }

    /// Storage paths left behind by a failed write
    pub fn orphaned_uploads(&self) -> &[String] {
        match self {
            Error::Persistence { orphaned, .. } => orphaned,
            _ => &[],
        }
    }

    /// Short message for a transient notice
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(err) => err.to_string(),
            Error::Auth(msg) => msg.clone(),
            Error::NotFound(_) => "Product not found".to_string(),
            Error::Forbidden(_) => "You can only change your own listings".to_string(),
            Error::Persistence {
                stage: PersistStage::Upload,
                ..
            } => "Failed to upload image. Please try again.".to_string(),
            Error::Persistence { .. } => "Could not save your changes. Please try again.".to_string(),
            Error::Query(_) => "Could not load listings. Please try again.".to_string(),
            Error::Config(msg) => msg.clone(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_problem() {
        let mut err = ValidationError::default();
        err.push("title", "Title is required");
        err.push("quantity", "Quantity must be a positive number");
        assert_eq!(
            err.to_string(),
            "Please fix the following: Title is required; Quantity must be a positive number"
        );
        assert_eq!(err.fields(), vec!["title", "quantity"]);
    }

    #[test]
    fn persistence_reports_orphans() {
        let err = Error::Persistence {
            stage: PersistStage::Insert,
            orphaned: vec!["a/1.png".into(), "a/2.png".into()],
            source: GatewayError::status(500, "boom"),
        };
        assert_eq!(err.orphaned_uploads().len(), 2);
        assert!(err.to_string().contains("2 image(s)"));
        assert_eq!(Error::auth("x").orphaned_uploads().len(), 0);
    }
}
