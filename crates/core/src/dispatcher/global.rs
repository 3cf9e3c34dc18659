//! Process-wide default registry.
//!
//! Free functions mirroring [`Registry`]'s methods for code that does not
//! need its own registry instance.

use once_cell::sync::Lazy;

use super::{Receivers, Registry, Responses, RobustResponses};
use crate::args::Args;
use crate::error::{DispatchError, PluginError};
use crate::plugin::Plugin;
use crate::receiver::{AsReceiverKey, IntoReceiver, Receiver};
use crate::signal::{Sender, Signal};

static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// The default registry used by the functions in this module
pub fn registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// See [`Registry::connect`]
pub fn connect<R: IntoReceiver>(
    receiver: R,
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
) -> Result<Receiver, DispatchError> {
    DEFAULT_REGISTRY.connect(receiver, signal, sender)
}

/// See [`Registry::connect_strong`]
pub fn connect_strong<R: IntoReceiver>(
    receiver: R,
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
) -> Result<Receiver, DispatchError> {
    DEFAULT_REGISTRY.connect_strong(receiver, signal, sender)
}

/// See [`Registry::disconnect`]
pub fn disconnect<K: AsReceiverKey>(
    receiver: K,
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
) -> Result<(), DispatchError> {
    DEFAULT_REGISTRY.disconnect(receiver, signal, sender)
}

/// See [`Registry::get_all_receivers`]
pub fn get_all_receivers(sender: impl Into<Sender>, signal: impl Into<Signal>) -> Receivers {
    DEFAULT_REGISTRY.get_all_receivers(sender, signal)
}

/// See [`Registry::send`]
pub fn send(
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
    args: Args,
) -> Result<Responses, DispatchError> {
    DEFAULT_REGISTRY.send(signal, sender, args)
}

/// See [`Registry::send_exact`]
pub fn send_exact(
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
    args: Args,
) -> Result<Responses, DispatchError> {
    DEFAULT_REGISTRY.send_exact(signal, sender, args)
}

/// See [`Registry::send_minimal`]
pub fn send_minimal(
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
    args: Args,
) -> Result<Responses, DispatchError> {
    DEFAULT_REGISTRY.send_minimal(signal, sender, args)
}

/// See [`Registry::send_robust`]
pub fn send_robust(
    signal: impl Into<Signal>,
    sender: impl Into<Sender>,
    args: Args,
) -> RobustResponses {
    DEFAULT_REGISTRY.send_robust(signal, sender, args)
}

/// See [`Registry::install_plugin`]
pub fn install_plugin<P: Plugin>(plugin: P) -> Result<(), PluginError> {
    DEFAULT_REGISTRY.install_plugin(plugin)
}

/// See [`Registry::remove_plugin`]
pub fn remove_plugin<P: Plugin>() -> Result<(), PluginError> {
    DEFAULT_REGISTRY.remove_plugin::<P>()
}

/// See [`Registry::reset`]
pub fn reset() {
    DEFAULT_REGISTRY.reset();
}
