//! Error types for Roster.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for Roster operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    DatabaseError,
    MigrationFailed,

    // Not Found (exit 3)
    RecordNotFound,
    MissingIdentity,

    // Validation (exit 4)
    IdentityAssigned,
    DuplicateMigration,
    InvalidArgument,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::MissingIdentity => "MISSING_IDENTITY",
            Self::IdentityAssigned => "IDENTITY_ASSIGNED",
            Self::DuplicateMigration => "DUPLICATE_MIGRATION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::MigrationFailed => 2,
            Self::RecordNotFound | Self::MissingIdentity => 3,
            Self::IdentityAssigned | Self::DuplicateMigration | Self::InvalidArgument => 4,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the caller may reasonably retry.
    ///
    /// Storage errors (busy, locked) may succeed on a plain retry; invalid
    /// arguments may succeed once retried with corrected input. Retry policy
    /// itself belongs to the caller; nothing in the storage layer retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError | Self::InvalidArgument)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Roster operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{table} record not found: {id}")]
    NotFound { table: &'static str, id: i64 },

    #[error("{table} record has no identity; insert it first")]
    MissingIdentity { table: &'static str },

    #[error("{table} record already has identity {id}; identities are assigned by storage")]
    IdentityAssigned { table: &'static str, id: i64 },

    #[error("Migration '{name}' failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Migration '{name}' is registered twice")]
    DuplicateMigration { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Migration { .. } => ErrorCode::MigrationFailed,
            Self::NotFound { .. } => ErrorCode::RecordNotFound,
            Self::MissingIdentity { .. } => ErrorCode::MissingIdentity,
            Self::IdentityAssigned { .. } => ErrorCode::IdentityAssigned,
            Self::DuplicateMigration { .. } => ErrorCode::DuplicateMigration,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Task(_) | Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Name of the migration step that failed, if this is a migration error.
    #[must_use]
    pub fn failed_migration(&self) -> Option<&str> {
        match self {
            Self::Migration { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotFound { id, .. } => Some(format!(
                "No record with ID {id}. Use `roster list` to see stored records."
            )),
            Self::MissingIdentity { .. } => {
                Some("Insert the record before updating or deleting it.".to_string())
            }
            Self::IdentityAssigned { .. } => {
                Some("Create the record without an ID; storage assigns one on insert.".to_string())
            }
            Self::Migration { name, .. } => Some(format!(
                "Steps before '{name}' remain applied. Fix the cause and run `roster migrate` to resume."
            )),
            Self::Config(_) => Some("Pass `--db <path>` or set ROSTER_DB.".to_string()),
            Self::Database(_)
            | Self::DuplicateMigration { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Task(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
