//! Registry plugins.
//!
//! A plugin can hide receivers from lookup and intercept their calls. It is
//! installed per registry and identified by its type, so each type can be
//! installed at most once.

use std::any::Any;

use crate::receiver::Receiver;

/// Hooks a registry runs around receiver lookup and invocation.
///
/// # Examples
///
/// ```rust
/// use relay_core::{Plugin, Receiver};
///
/// /// Skips receivers whose name starts with `debug_`.
/// struct Quiet;
///
/// impl Plugin for Quiet {
///     fn is_live(&self, receiver: &Receiver) -> bool {
///         !receiver.name().starts_with("debug_")
///     }
/// }
/// ```
pub trait Plugin: Any + Send + Sync {
    /// Whether `receiver` should take part in dispatch
    fn is_live(&self, _receiver: &Receiver) -> bool {
        true
    }

    /// Replaces `receiver` before it is invoked, e.g. with [`Receiver::wrap`]
    fn wrap_receiver(&self, receiver: Receiver) -> Receiver {
        receiver
    }
}
