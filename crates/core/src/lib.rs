//! Core of relay: an in-process signal registry that tracks the lifetime of
//! its senders and receivers.

pub mod args;
pub mod dispatcher;
pub mod error;
pub mod object;
pub mod panic_handler;
pub mod plugin;
pub mod receiver;
pub mod robustapply;
pub mod saferef;
pub mod signal;

// Re-export commonly used items
pub use args::{Args, Value};
pub use dispatcher::{Receivers, Registry, RegistryConfig, RegistryStats, Responses, RobustResponses};
pub use error::{BoxError, DispatchError, PluginError, ReceiverError};
pub use object::{ObjectId, Tracked, WeakTracked};
pub use plugin::Plugin;
pub use receiver::{
    AsReceiverKey, Callable, Function, IntoReceiver, Method, Outcome, Receiver, ReceiverKind,
};
pub use robustapply::{Signature, resolve_signature, robust_apply};
pub use saferef::{HandleKey, OnDestroy, WeakHandle, safe_ref, strong_ref};
pub use signal::{ALL_SIGNALS, ANONYMOUS_SENDER, ANY_SENDER, Sender, SenderKey, Signal};
