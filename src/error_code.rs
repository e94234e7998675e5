//! 标准错误码：为批处理运行时的每类错误定义稳定的错误码及其重试语义。
//!
//! Standard error codes for the batching runtime.
//!
//! Each [`crate::Error`] variant maps to one code so callers can branch on a stable
//! identifier instead of matching on message text.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category     | Description                                  |
//! |--------|--------------|----------------------------------------------|
//! | E1xxx  | construction | Invalid or incomplete configuration          |
//! | E2xxx  | capacity     | Backpressure: buffer or key limits reached   |
//! | E3xxx  | execution    | Per-entry, whole-batch and resolver failures |
//! | E4xxx  | lifecycle    | Manager shut down                            |
//! | E9xxx  | internal     | Invariant violations                         |
//!
//! ## Example
//!
//! ```rust
//! use sdk_batch_rust::error_code::StandardErrorCode;
//!
//! let code = StandardErrorCode::BufferFull;
//! assert_eq!(code.code(), "E2001");
//! assert!(code.retryable());
//! assert_eq!(code.category(), "capacity");
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// E1001: Missing or invalid configuration
    InvalidConfiguration,
    /// E2001: Per-key buffer reached `max_buffer_size`
    BufferFull,
    /// E2002: Distinct batch keys reached `max_batch_keys`
    TooManyBatchKeys,
    /// E3001: Entry rejected by the service because of the request itself
    EntryRejected,
    /// E3002: Entry failed on the service side
    EntryFailed,
    /// E3003: Network or transport failure of a wire call
    Transport,
    /// E3004: Whole batch failed; every entry carries the same cause
    BatchFailed,
    /// E3005: Dynamic attribute lookup failed
    ResolutionFailed,
    /// E4001: Manager was closed before the entry completed
    Closed,
    /// E9001: Internal invariant violation
    Internal,
}

impl StandardErrorCode {
    /// Returns the canonical code string (e.g., `"E1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "E1001",
            Self::BufferFull => "E2001",
            Self::TooManyBatchKeys => "E2002",
            Self::EntryRejected => "E3001",
            Self::EntryFailed => "E3002",
            Self::Transport => "E3003",
            Self::BatchFailed => "E3004",
            Self::ResolutionFailed => "E3005",
            Self::Closed => "E4001",
            Self::Internal => "E9001",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "invalid_configuration",
            Self::BufferFull => "buffer_full",
            Self::TooManyBatchKeys => "too_many_batch_keys",
            Self::EntryRejected => "entry_rejected",
            Self::EntryFailed => "entry_failed",
            Self::Transport => "transport",
            Self::BatchFailed => "batch_failed",
            Self::ResolutionFailed => "resolution_failed",
            Self::Closed => "closed",
            Self::Internal => "internal",
        }
    }

    /// Returns whether this error is retryable by default.
    ///
    /// A failed batch carries no retryability of its own;
    /// [`crate::Error::is_retryable`] looks through to the wrapped cause.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::BufferFull
                | Self::TooManyBatchKeys
                | Self::EntryFailed
                | Self::Transport
                | Self::ResolutionFailed
        )
    }

    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "construction",
            Self::BufferFull | Self::TooManyBatchKeys => "capacity",
            Self::EntryRejected
            | Self::EntryFailed
            | Self::Transport
            | Self::BatchFailed
            | Self::ResolutionFailed => "execution",
            Self::Closed => "lifecycle",
            Self::Internal => "internal",
        }
    }

    /// Maps a standard name back to its code.
    pub fn from_name(name: &str) -> Option<Self> {
        let code = match name {
            "invalid_configuration" => Self::InvalidConfiguration,
            "buffer_full" => Self::BufferFull,
            "too_many_batch_keys" => Self::TooManyBatchKeys,
            "entry_rejected" => Self::EntryRejected,
            "entry_failed" => Self::EntryFailed,
            "transport" => Self::Transport,
            "batch_failed" => Self::BatchFailed,
            "resolution_failed" => Self::ResolutionFailed,
            "closed" => Self::Closed,
            "internal" => Self::Internal,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StandardErrorCode; 10] = [
        StandardErrorCode::InvalidConfiguration,
        StandardErrorCode::BufferFull,
        StandardErrorCode::TooManyBatchKeys,
        StandardErrorCode::EntryRejected,
        StandardErrorCode::EntryFailed,
        StandardErrorCode::Transport,
        StandardErrorCode::BatchFailed,
        StandardErrorCode::ResolutionFailed,
        StandardErrorCode::Closed,
        StandardErrorCode::Internal,
    ];

    #[test]
    fn names_round_trip() {
        for code in ALL {
            assert_eq!(StandardErrorCode::from_name(code.name()), Some(code));
        }
        assert_eq!(StandardErrorCode::from_name("nope"), None);
    }

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code);
        }
    }

    #[test]
    fn closed_is_not_retryable() {
        assert!(!StandardErrorCode::Closed.retryable());
        assert_eq!(StandardErrorCode::Closed.category(), "lifecycle");
    }
}
