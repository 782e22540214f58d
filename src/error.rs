use std::time::Duration;

use thiserror::Error;

use crate::migration::MigrationKey;

/// Invalid plan shape detected while building a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error(
        "foreign key referencing '{table}' has {columns} column(s) but {ref_columns} referenced column(s)"
    )]
    ForeignKeyArity {
        table: String,
        columns: usize,
        ref_columns: usize,
    },

    #[error("invalid plan: {0}")]
    Invalid(String),
}

/// A plan that cannot be rendered for the target dialect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{dialect} does not support {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: String,
    },

    #[error("cannot compile plan: {0}")]
    InvalidPlan(String),
}

impl CompileError {
    pub(crate) fn unsupported(dialect: &'static str, operation: impl Into<String>) -> Self {
        CompileError::Unsupported {
            dialect,
            operation: operation.into(),
        }
    }
}

/// Error reported by the database client.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct DbError {
    pub message: String,
    pub sql_state: Option<String>,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
        }
    }

    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::new(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for DbError {
    fn from(err: postgres::Error) -> Self {
        let state = err.code().map(|code| code.code().to_string());
        let message = match err.as_db_error() {
            Some(db) => db.message().to_string(),
            None => err.to_string(),
        };
        DbError {
            message,
            sql_state: state,
        }
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for DbError {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::MySqlError(ref server) => {
                DbError::new(server.message.clone()).with_sql_state(server.state.clone())
            }
            other => DbError::new(other.to_string()),
        }
    }
}

/// Invalid migrator configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LockError {
    #[error("migration lock '{name}' is held by another process (waited {waited:?})")]
    Held { name: String, waited: Duration },

    #[error("migration lock '{name}' was taken over by another process")]
    Lost { name: String },

    #[error("migration lock '{name}' could not be released: {source}")]
    Release { name: String, source: DbError },

    #[error(transparent)]
    Database(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("duplicate migration key {key}: '{title}' conflicts with '{existing}'")]
    RegistrationConflict {
        key: MigrationKey,
        title: String,
        existing: String,
    },

    #[error("migration {0} is not registered")]
    NotFound(MigrationKey),

    #[error("migration key {0} is wider than 14 digits")]
    InvalidKey(MigrationKey),

    #[error("migration {key} has an invalid plan: {source}")]
    Plan { key: MigrationKey, source: PlanError },

    #[error("migration {key} cannot be compiled: {source}")]
    Compile {
        key: MigrationKey,
        source: CompileError,
    },

    #[error("failed to acquire migration lock: {0}")]
    LockAcquisitionFailed(#[from] LockError),

    #[error("{}", execution_failed_message(.key, .title, .step, .sql, .source, .completed))]
    ExecutionFailed {
        key: MigrationKey,
        title: String,
        /// Index of the failing statement within the compiled plan, if any.
        step: Option<usize>,
        sql: Option<String>,
        source: DbError,
        /// Migrations committed earlier in the same run.
        completed: Vec<MigrationKey>,
    },

    #[error("migration {key} ('{title}') has no down migration")]
    DownNotImplemented { key: MigrationKey, title: String },

    #[error("migration {0} is already applied")]
    AlreadyApplied(MigrationKey),

    #[error("migration {0} is not applied")]
    NotApplied(MigrationKey),

    #[error("checksum mismatch for applied migration(s): {}", join_keys(.0))]
    ChecksumMismatch(Vec<MigrationKey>),

    #[error("migration history error: {0}")]
    History(#[from] DbError),
}

impl MigrationError {
    /// The migration this error concerns, if any.
    pub fn key(&self) -> Option<MigrationKey> {
        match self {
            MigrationError::RegistrationConflict { key, .. }
            | MigrationError::Plan { key, .. }
            | MigrationError::Compile { key, .. }
            | MigrationError::ExecutionFailed { key, .. }
            | MigrationError::DownNotImplemented { key, .. } => Some(*key),
            MigrationError::NotFound(key)
            | MigrationError::InvalidKey(key)
            | MigrationError::AlreadyApplied(key)
            | MigrationError::NotApplied(key) => Some(*key),
            _ => None,
        }
    }

    pub(crate) fn with_completed(mut self, done: &[MigrationKey]) -> Self {
        if let MigrationError::ExecutionFailed {
            ref mut completed, ..
        } = self
        {
            *completed = done.to_vec();
        }
        self
    }
}

fn execution_failed_message(
    key: &MigrationKey,
    title: &str,
    step: &Option<usize>,
    sql: &Option<String>,
    source: &DbError,
    completed: &[MigrationKey],
) -> String {
    let mut message = match step {
        Some(step) => format!("migration {key} ('{title}') failed at step {step}: {source}"),
        None => format!("migration {key} ('{title}') failed: {source}"),
    };
    if let Some(sql) = sql {
        message.push_str(&format!("\nSQL: {sql}"));
    }
    if !completed.is_empty() {
        message.push_str(&format!(" (completed: {})", join_keys(completed)));
    }
    message
}

fn join_keys(keys: &[MigrationKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
