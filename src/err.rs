//! Driver errors

use std::{io, time::Duration};
use thiserror::Error;

/// ORA-00028: your session has been killed
pub(crate) const SESSION_KILLED     : i32 = 28;
/// ORA-01012: not logged on
pub(crate) const NOT_LOGGED_ON      : i32 = 1012;
/// ORA-01013: user requested cancel of current operation
pub(crate) const USER_CANCEL        : i32 = 1013;
/// ORA-03113: end-of-file on communication channel
pub(crate) const END_OF_CHANNEL     : i32 = 3113;
/// ORA-03114: not connected to ORACLE
pub(crate) const NOT_CONNECTED      : i32 = 3114;
/// ORA-03135: connection lost contact
pub(crate) const LOST_CONTACT       : i32 = 3135;
/// ORA-03156: OCI call timed out
pub(crate) const CALL_TIMEOUT       : i32 = 3156;

/// Represents possible errors returned from augur
#[derive(Error, Debug)]
pub enum Error {
    /// All sessions were busy and none became available within the wait timeout
    #[error("session pool exhausted: no session became available within {0:?}")]
    PoolExhausted(Duration),

    /// The pool has been shut down
    #[error("session pool is closed")]
    PoolClosed,

    /// The caller's context was canceled
    #[error("operation canceled")]
    Canceled,

    /// The caller's context deadline has passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A value cannot be coerced to or from the requested type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A slice was bound while PL/SQL array semantics were not enabled
    #[error("array bind requires PL/SQL array semantics to be enabled")]
    ArrayBindDisabled,

    /// Named and positional arguments were mixed, or an argument does not map onto a placeholder
    #[error("bind error: {0}")]
    OrdinalGap(String),

    /// The session was found dead and cannot be used anymore
    #[error("session is no longer valid: {0}")]
    SessionInvalid(String),

    /// The cursor was closed, most likely together with its parent
    #[error("cursor is closed")]
    CursorClosed,

    /// Error reported by the database
    #[error("ORA-{code:05}: {message}")]
    Backend { code: i32, message: String },

    /// Invalid connection parameters
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Driver interface misuse
    #[error("{0}")]
    Interface(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::Backend { code: this_code, .. }, Error::Backend { code: other_code, .. }) => this_code == other_code,
            (Error::PoolExhausted(_), Error::PoolExhausted(_)) => true,
            (Error::TypeMismatch(this_msg), Error::TypeMismatch(other_msg)) => this_msg == other_msg,
            (Error::OrdinalGap(this_msg), Error::OrdinalGap(other_msg)) => this_msg == other_msg,
            (Error::SessionInvalid(_), Error::SessionInvalid(_)) => true,
            (Error::Config(this_msg), Error::Config(other_msg)) => this_msg == other_msg,
            (Error::Interface(this_msg), Error::Interface(other_msg)) => this_msg == other_msg,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

impl Error {
    pub(crate) fn new(msg: &str) -> Self {
        Error::Interface( msg.to_owned() )
    }

    pub(crate) fn msg(msg: String) -> Self {
        Error::Interface(msg)
    }

    /// Creates a database error with the specified code.
    pub fn backend(code: i32, message: impl Into<String>) -> Self {
        Error::Backend { code, message: message.into() }
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Error::TypeMismatch(msg.into())
    }

    /**
        Returns the database error code if this error was reported by the database.

        ```
        let err = augur::Error::backend(955, "name is already used by an existing object");
        assert_eq!(err.code(), Some(955));
        assert_eq!(err.to_string(), "ORA-00955: name is already used by an existing object");
        ```
    */
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Backend { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this error is one of the two cancellation kinds.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Canceled | Error::DeadlineExceeded)
    }

    /// Returns `true` if the database reported that the session is gone.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self.code(), Some(SESSION_KILLED | NOT_LOGGED_ON | END_OF_CHANNEL | NOT_CONNECTED | LOST_CONTACT))
    }

    /// Returns a copy of the error's kind. `Backend`, `Config` and `Interface` keep their payload.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Error::PoolExhausted(d)         => Error::PoolExhausted(*d),
            Error::PoolClosed               => Error::PoolClosed,
            Error::Canceled                 => Error::Canceled,
            Error::DeadlineExceeded         => Error::DeadlineExceeded,
            Error::TypeMismatch(msg)        => Error::TypeMismatch(msg.clone()),
            Error::ArrayBindDisabled        => Error::ArrayBindDisabled,
            Error::OrdinalGap(msg)          => Error::OrdinalGap(msg.clone()),
            Error::SessionInvalid(msg)      => Error::SessionInvalid(msg.clone()),
            Error::CursorClosed             => Error::CursorClosed,
            Error::Backend { code, message } => Error::Backend { code: *code, message: message.clone() },
            Error::Config(msg)              => Error::Config(msg.clone()),
            Error::Interface(msg)           => Error::Interface(msg.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_display() {
        let err = Error::backend(1013, "user requested cancel of current operation");
        assert_eq!(err.to_string(), "ORA-01013: user requested cancel of current operation");
        assert_eq!(err.code(), Some(1013));
        assert!(!err.is_cancellation());
    }

    #[test]
    fn fatal_codes() {
        assert!(Error::backend(3113, "end-of-file on communication channel").is_session_fatal());
        assert!(Error::backend(28, "your session has been killed").is_session_fatal());
        assert!(!Error::backend(942, "table or view does not exist").is_session_fatal());
        assert!(!Error::Canceled.is_session_fatal());
    }

    #[test]
    fn equality_by_kind() {
        assert_eq!(Error::backend(955, "a"), Error::backend(955, "b"));
        assert_ne!(Error::backend(955, "a"), Error::backend(942, "a"));
        assert_eq!(Error::Canceled, Error::Canceled);
        assert_ne!(Error::Canceled, Error::DeadlineExceeded);
        assert_eq!(Error::PoolExhausted(Duration::from_secs(1)), Error::PoolExhausted(Duration::from_secs(2)));
    }
}
