use std::sync::Arc;

use thiserror::Error;

use crate::error_code::StandardErrorCode;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "max_batch_items")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected value, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "batch_manager", "receive_queue_buffer")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the batching runtime.
///
/// The type is `Clone`: a single batch failure is delivered to every caller whose
/// entry was part of that batch, and a single resolver failure to every waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Batch buffer for key '{batch_key}' is full (max_buffer_size = {max_buffer_size})")]
    BufferFull {
        batch_key: String,
        max_buffer_size: usize,
    },

    #[error("Too many distinct batch keys (max_batch_keys = {max_batch_keys})")]
    TooManyBatchKeys { max_batch_keys: usize },

    #[error("Remote entry error: {code}: {message}")]
    Remote {
        code: String,
        message: String,
        sender_fault: bool,
    },

    #[error("Transport error: {message}{}", format_context(.context))]
    Transport {
        message: String,
        context: ErrorContext,
    },

    #[error("Batch for key '{batch_key}' failed: {source}")]
    BatchFailed {
        batch_key: String,
        #[source]
        source: Arc<Error>,
    },

    #[error("Attribute resolution for '{key}' failed: {source}")]
    Resolution {
        key: String,
        #[source]
        source: Arc<Error>,
    },

    #[error("Batch manager is closed")]
    Closed,

    #[error("Internal error: {message}{}", format_context(.context))]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Configuration error for a builder field that was never set.
    pub fn missing_field(field: &str, source: &str) -> Self {
        Error::configuration_with_context(
            format!("{} must be provided", field),
            ErrorContext::new().with_field_path(field).with_source(source),
        )
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn transport_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Transport {
            message: msg.into(),
            context,
        }
    }

    /// Create a new internal error with structured context
    pub fn internal_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Internal {
            message: msg.into(),
            context,
        }
    }

    /// Wraps a whole-batch failure so every entry of the batch sees the same cause.
    pub fn batch_failed(batch_key: impl Into<String>, cause: Error) -> Self {
        Error::BatchFailed {
            batch_key: batch_key.into(),
            source: Arc::new(cause),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Transport { context, .. }
            | Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Standard error code for this error.
    pub fn code(&self) -> StandardErrorCode {
        match self {
            Error::Configuration { .. } => StandardErrorCode::InvalidConfiguration,
            Error::BufferFull { .. } => StandardErrorCode::BufferFull,
            Error::TooManyBatchKeys { .. } => StandardErrorCode::TooManyBatchKeys,
            Error::Remote { sender_fault, .. } => {
                if *sender_fault {
                    StandardErrorCode::EntryRejected
                } else {
                    StandardErrorCode::EntryFailed
                }
            }
            Error::Transport { .. } => StandardErrorCode::Transport,
            Error::BatchFailed { .. } => StandardErrorCode::BatchFailed,
            Error::Resolution { .. } => StandardErrorCode::ResolutionFailed,
            Error::Closed => StandardErrorCode::Closed,
            Error::Internal { .. } => StandardErrorCode::Internal,
        }
    }

    /// Whether retrying the same operation may succeed. Wrappers defer to their cause.
    pub fn is_retryable(&self) -> bool {
        self.root_cause().code().retryable()
    }

    /// The innermost cause, unwrapping batch and resolution wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::BatchFailed { source, .. } | Error::Resolution { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}
