//! Error types used by the registry and by receivers.
//!
//! - [`DispatchError`] is raised by registry operations and by dispatch.
//! - [`ReceiverError`] is what a receiver returns when it fails.
//! - [`PluginError`] covers plugin installation.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error accepted from receivers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// # Errors produced by registry operations and dispatch.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The receiver cannot describe which arguments it accepts.
    #[error("unknown callable kind for receiver {receiver}: no introspectable signature")]
    UnknownCallableKind {
        /// Display name of the offending receiver.
        receiver: String,
    },

    /// A parameter was supplied both positionally and by name.
    #[error("argument {name:?} specified both positionally and by name for calling {receiver}")]
    DuplicateArgument {
        /// The parameter supplied twice.
        name: String,
        /// Display name of the receiver being called.
        receiver: String,
    },

    /// `disconnect` found no matching connection.
    #[error("no receiver {receiver} connected for signal {signal} from sender {sender}")]
    NoSuchReceiver {
        /// Display name of the receiver.
        receiver: String,
        /// The signal that was looked up.
        signal: String,
        /// The sender that was looked up.
        sender: String,
    },

    /// The signal cannot be used as a registry key.
    #[error("invalid signal: {reason}")]
    InvalidSignal {
        /// Why the signal was rejected.
        reason: &'static str,
    },

    /// A receiver returned an error (or panicked during robust dispatch).
    #[error("receiver {receiver} failed: {source}")]
    Receiver {
        /// Display name of the failing receiver.
        receiver: String,
        /// What the receiver reported.
        #[source]
        source: ReceiverError,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use relay_core::DispatchError;
    ///
    /// let err = DispatchError::InvalidSignal { reason: "empty signal name" };
    /// assert_eq!(err.as_label(), "dispatch_invalid_signal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::UnknownCallableKind { .. } => "dispatch_unknown_callable_kind",
            DispatchError::DuplicateArgument { .. } => "dispatch_duplicate_argument",
            DispatchError::NoSuchReceiver { .. } => "dispatch_no_such_receiver",
            DispatchError::InvalidSignal { .. } => "dispatch_invalid_signal",
            DispatchError::Receiver { .. } => "dispatch_receiver_failed",
        }
    }

    /// The receiver's own error, if this error came from a receiver.
    pub fn receiver_error(&self) -> Option<&ReceiverError> {
        match self {
            DispatchError::Receiver { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// # Errors reported by receivers.
///
/// `ReceiverError` is cheap to clone so that robust dispatch can hand the
/// same failure to several consumers.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ReceiverError {
    /// The receiver's own error object, kept intact.
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync>),

    /// A required parameter was not supplied.
    #[error("missing argument {name:?}")]
    MissingArgument {
        /// The parameter name.
        name: String,
    },

    /// A parameter was supplied with an unexpected type.
    #[error("argument {name:?} is not a {expected}")]
    ArgumentType {
        /// The parameter name.
        name: String,
        /// The type the receiver asked for.
        expected: &'static str,
    },

    /// The tracked target does not hold the type the receiver was built for.
    #[error("receiver target is not a {expected}")]
    TargetType {
        /// The type the receiver was built for.
        expected: &'static str,
    },

    /// The receiver panicked; carries the panic message.
    #[error("receiver panicked: {0}")]
    Panicked(String),
}

impl ReceiverError {
    /// Wraps any error (or message) a receiver wants to report.
    ///
    /// # Example
    /// ```
    /// use relay_core::ReceiverError;
    ///
    /// let err = ReceiverError::failed("disk full");
    /// assert_eq!(err.to_string(), "disk full");
    /// ```
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        let error: BoxError = error.into();
        ReceiverError::Failed(Arc::from(error))
    }

    /// Borrows the original error as `E`, if this wraps one of that type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            ReceiverError::Failed(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// # Errors produced when installing or removing plugins.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A plugin of this type is already installed.
    #[error("plugin of type {0} already installed")]
    AlreadyInstalled(&'static str),

    /// No plugin of this type is installed.
    #[error("plugin of type {0} is not installed")]
    NotInstalled(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    struct Rejected(&'static str);

    impl fmt::Display for Rejected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "rejected: {}", self.0)
        }
    }

    impl StdError for Rejected {}

    #[test]
    fn test_failed_preserves_original_error() {
        let err = ReceiverError::failed(Rejected("this"));
        assert_eq!(err.downcast_ref::<Rejected>(), Some(&Rejected("this")));
        assert_eq!(err.to_string(), "rejected: this");
    }

    #[test]
    fn test_downcast_of_other_variants_is_none() {
        let err = ReceiverError::Panicked("boom".into());
        assert!(err.downcast_ref::<Rejected>().is_none());
    }

    #[test]
    fn test_dispatch_error_exposes_receiver_source() {
        let err = DispatchError::Receiver {
            receiver: "x#1".into(),
            source: ReceiverError::failed("bad input"),
        };
        assert_eq!(err.as_label(), "dispatch_receiver_failed");
        assert_eq!(err.receiver_error().map(|e| e.to_string()), Some("bad input".into()));
        assert!(StdError::source(&err).is_some());
        assert_eq!(err.to_string(), "receiver x#1 failed: bad input");
    }

    #[test]
    fn test_duplicate_argument_message_names_parameter() {
        let err = DispatchError::DuplicateArgument {
            name: "sender".into(),
            receiver: "handler#3".into(),
        };
        assert_eq!(
            err.to_string(),
            "argument \"sender\" specified both positionally and by name for calling handler#3"
        );
        assert!(err.receiver_error().is_none());
    }
}
