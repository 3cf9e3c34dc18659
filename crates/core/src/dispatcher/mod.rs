//! Subscription registry.
//!
//! A [`Registry`] maps (sender, signal) pairs to ordered lists of weak
//! receiver handles, plus two back indices used to clean up after a
//! participant is destroyed:
//!
//! - `senders`: every sender key that has connections, with a weak
//!   reference for tracked senders
//! - `senders_back`: for every receiver, the sender keys it is connected
//!   under
//!
//! One mutex guards the three indices. It is never held while a receiver,
//! plugin, or destruction observer runs, and handles removed from the
//! indices are dropped only after it is released. This lets receivers
//! connect and disconnect during a dispatch, and lets a participant's
//! destruction remove its own entries from whichever thread drops it.


pub mod global;

use parking_lot::{Mutex, RwLock};
use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::args::{Args, Value};
use crate::error::{DispatchError, PluginError, ReceiverError};
use crate::object::ErasedCell;
use crate::panic_handler::{catch_panic, panic_message};
use crate::plugin::Plugin;
use crate::receiver::{AsReceiverKey, IntoReceiver, Receiver};
use crate::robustapply::{resolve_signature, robust_apply};
use crate::saferef::{HandleKey, WeakHandle, safe_ref, strong_ref};
use crate::signal::{ALL_SIGNALS, ANY_SENDER, Sender, SenderKey, Signal};

type Map<K, V> = HashMap<K, V, ahash::RandomState>;
type Set<K> = HashSet<K, ahash::RandomState>;

/// Results of a dispatch that stops at the first error.
pub type Responses = Vec<(Receiver, Value)>;

/// Per-receiver results of a robust dispatch.
pub type RobustResponses = Vec<(Receiver, Result<Value, DispatchError>)>;

/// Registry behaviour switches.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Whether `send_robust` turns receiver panics into
    /// [`ReceiverError::Panicked`] results instead of unwinding
    pub capture_panics: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capture_panics: true,
        }
    }
}

/// Counters describing the registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Sender keys with at least one connection
    pub senders: usize,
    /// Of those, senders whose destruction is tracked
    pub tracked_senders: usize,
    /// (sender, signal, receiver) connections
    pub connections: usize,
    /// Distinct receivers with at least one connection
    pub receivers: usize,
    /// Installed plugins
    pub plugins: usize,
}

enum SenderEntry {
    Tracked(Weak<ErasedCell>),
    Untracked,
}

#[derive(Default)]
struct Indices {
    connections: Map<SenderKey, Map<Signal, Vec<WeakHandle>>>,
    senders: Map<SenderKey, SenderEntry>,
    senders_back: Map<HandleKey, Set<SenderKey>>,
    /// Participants carrying this registry's destruction observer. Entries
    /// leave only when the participant dies, so each gets one observer.
    watched_receivers: Set<HandleKey>,
    watched_senders: Set<SenderKey>,
}

impl Indices {
    fn forget_back_ref(&mut self, receiver: HandleKey, sender: &SenderKey) {
        if let Some(senders) = self.senders_back.get_mut(&receiver) {
            senders.remove(sender);
            if senders.is_empty() {
                self.senders_back.remove(&receiver);
            }
        }
    }

    fn remove_connection(
        &mut self,
        sender: &SenderKey,
        signal: &Signal,
        receiver: HandleKey,
    ) -> Option<WeakHandle> {
        let signals = self.connections.get_mut(sender)?;
        let handles = signals.get_mut(signal)?;
        let index = handles.iter().position(|handle| handle.key() == receiver)?;
        let removed = handles.remove(index);
        if handles.is_empty() {
            signals.remove(signal);
        }

        let still_connected = signals
            .values()
            .any(|handles| handles.iter().any(|handle| handle.key() == receiver));
        if signals.is_empty() {
            self.connections.remove(sender);
            self.senders.remove(sender);
        }
        if !still_connected {
            self.forget_back_ref(receiver, sender);
        }
        Some(removed)
    }

    fn purge_receiver(&mut self, receiver: HandleKey) -> Vec<WeakHandle> {
        self.watched_receivers.remove(&receiver);
        let mut garbage = Vec::new();
        let Some(senders) = self.senders_back.remove(&receiver) else {
            return garbage;
        };

        for sender in senders {
            let Some(signals) = self.connections.get_mut(&sender) else {
                continue;
            };
            for handles in signals.values_mut() {
                let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(handles)
                    .into_iter()
                    .partition(|handle| handle.key() == receiver);
                *handles = live;
                garbage.extend(dead);
            }
            signals.retain(|_, handles| !handles.is_empty());
            if signals.is_empty() {
                self.connections.remove(&sender);
                self.senders.remove(&sender);
            }
        }
        garbage
    }

    fn purge_sender(&mut self, sender: &SenderKey) -> Vec<WeakHandle> {
        self.watched_senders.remove(sender);
        self.senders.remove(sender);
        let Some(signals) = self.connections.remove(sender) else {
            return Vec::new();
        };

        let garbage: Vec<WeakHandle> = signals.into_values().flatten().collect();
        for handle in &garbage {
            self.forget_back_ref(handle.key(), sender);
        }
        garbage
    }

    /// Empties the three indices, keeping the watch sets since their
    /// observers stay registered.
    fn clear(&mut self) -> Indices {
        Indices {
            connections: std::mem::take(&mut self.connections),
            senders: std::mem::take(&mut self.senders),
            senders_back: std::mem::take(&mut self.senders_back),
            ..Indices::default()
        }
    }

    fn snapshot(&self, sender: &SenderKey, signal: &Signal, exact: bool) -> Vec<WeakHandle> {
        let mut buckets = vec![(sender.clone(), signal.clone())];
        if !exact {
            buckets.extend([
                (ANY_SENDER, signal.clone()),
                (sender.clone(), ALL_SIGNALS),
                (ANY_SENDER, ALL_SIGNALS),
            ]);
        }

        let mut seen = Set::default();
        let mut handles = Vec::new();
        for (sender, signal) in &buckets {
            let Some(bucket) = self.connections.get(sender).and_then(|s| s.get(signal)) else {
                continue;
            };
            for handle in bucket {
                if seen.insert(handle.key()) {
                    handles.push(handle.clone());
                }
            }
        }
        handles
    }

    fn is_clean(&self) -> bool {
        let senders_match = self.connections.len() == self.senders.len()
            && self.connections.keys().all(|key| self.senders.contains_key(key));
        let senders_alive = self.senders.values().all(|entry| match entry {
            SenderEntry::Tracked(cell) => cell.strong_count() > 0,
            SenderEntry::Untracked => true,
        });
        let connections_sound = self.connections.iter().all(|(sender, signals)| {
            !signals.is_empty()
                && signals.values().all(|handles| {
                    !handles.is_empty()
                        && handles.iter().all(|handle| {
                            handle.is_alive()
                                && self
                                    .senders_back
                                    .get(&handle.key())
                                    .is_some_and(|back| back.contains(sender))
                        })
                })
        });
        let back_refs_sound = self.senders_back.iter().all(|(receiver, senders)| {
            !senders.is_empty()
                && senders.iter().all(|sender| {
                    self.connections.get(sender).is_some_and(|signals| {
                        signals
                            .values()
                            .any(|handles| handles.iter().any(|h| h.key() == *receiver))
                    })
                })
        });
        senders_match && senders_alive && connections_sound && back_refs_sound
    }
}

type PluginList = Vec<(TypeId, Arc<dyn Plugin>)>;

struct Shared {
    config: RegistryConfig,
    indices: Mutex<Indices>,
    plugins: RwLock<PluginList>,
}

impl Shared {
    fn remove_receiver(&self, receiver: HandleKey) {
        let garbage = self.indices.lock().purge_receiver(receiver);
        if !garbage.is_empty() {
            debug!(
                target: "relay::dispatcher",
                receiver = %receiver,
                removed = garbage.len(),
                "receiver destroyed, connections removed"
            );
        }
    }

    fn remove_sender(&self, sender: &SenderKey) {
        let garbage = self.indices.lock().purge_sender(sender);
        if !garbage.is_empty() {
            debug!(
                target: "relay::dispatcher",
                sender = %sender,
                removed = garbage.len(),
                "sender destroyed, connections removed"
            );
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Full,
    Exact,
    Minimal,
}

/// Live receivers for a (sender, signal) pair, resolved lazily.
///
/// The matching handles are captured when the iterator is created.
/// Receivers destroyed before they are reached are skipped.
pub struct Receivers {
    handles: std::vec::IntoIter<WeakHandle>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Iterator for Receivers {
    type Item = Receiver;

    fn next(&mut self) -> Option<Receiver> {
        for handle in self.handles.by_ref() {
            if let Some(receiver) = handle.resolve()
                && self.plugins.iter().all(|plugin| plugin.is_live(&receiver))
            {
                return Some(receiver);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.handles.len()))
    }
}

/// An in-process signal registry.
///
/// Cloning a `Registry` yields another handle to the same registry.
///
/// # Examples
///
/// ```rust
/// use relay_core::{ANY_SENDER, Args, Function, Registry, Signature, Tracked, Value};
///
/// let registry = Registry::new();
/// let on_saved = Function::new("on_saved", Signature::from_static(&["path"]), |args| {
///     Ok(Value::new(format!("saved {}", args.get::<&str>("path")?)))
/// });
/// registry.connect(&on_saved, "saved", ANY_SENDER).unwrap();
///
/// let document = Tracked::new(());
/// let responses = registry
///     .send("saved", &document, Args::new().with("path", "a.txt"))
///     .unwrap();
/// assert_eq!(responses.len(), 1);
///
/// // dropping the function removes its connection
/// drop(on_saved);
/// assert!(registry.send("saved", &document, Args::new()).unwrap().is_empty());
/// assert!(registry.is_clean());
/// ```
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    /// Creates an empty registry with the default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates an empty registry
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                indices: Mutex::new(Indices::default()),
                plugins: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The configuration this registry was built with
    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Connects `receiver` to `signal` from `sender` without keeping it
    /// alive.
    ///
    /// [`ALL_SIGNALS`] and [`ANY_SENDER`] act as wildcards. Connecting the
    /// same receiver to the same pair again has no effect and keeps its
    /// original position. The connection is removed when the receiver or a
    /// tracked sender is destroyed.
    pub fn connect<R>(
        &self,
        receiver: R,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
    ) -> Result<Receiver, DispatchError>
    where
        R: IntoReceiver,
    {
        self.connect_inner(receiver.into_receiver()?, signal.into(), sender.into(), true)
    }

    /// Like [`connect`](Self::connect), but the registry owns the receiver
    /// until it is disconnected.
    pub fn connect_strong<R>(
        &self,
        receiver: R,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
    ) -> Result<Receiver, DispatchError>
    where
        R: IntoReceiver,
    {
        self.connect_inner(receiver.into_receiver()?, signal.into(), sender.into(), false)
    }

    fn connect_inner(
        &self,
        receiver: Receiver,
        signal: Signal,
        sender: Sender,
        weak: bool,
    ) -> Result<Receiver, DispatchError> {
        signal
            .validate()
            .map_err(|reason| DispatchError::InvalidSignal { reason })?;

        let handle = if weak {
            safe_ref(&receiver, None)
        } else {
            strong_ref(receiver.clone())
        };
        let key = handle.key();
        let sender_key = sender.key().clone();

        // Both participants are held strongly here, so neither observer can
        // fire before the connection is in place.
        let duplicate = {
            let mut indices = self.shared.indices.lock();
            if weak && indices.watched_receivers.insert(key) {
                let registry = Arc::downgrade(&self.shared);
                receiver.target().lifeline().observe(Box::new(move |_| {
                    if let Some(shared) = registry.upgrade() {
                        shared.remove_receiver(key);
                    }
                }));
            }
            if let Some(cell) = sender.target()
                && indices.watched_senders.insert(sender_key.clone())
            {
                let registry = Arc::downgrade(&self.shared);
                let dead = sender_key.clone();
                cell.lifeline().observe(Box::new(move |_| {
                    if let Some(shared) = registry.upgrade() {
                        shared.remove_sender(&dead);
                    }
                }));
            }
            if !indices.senders.contains_key(&sender_key) {
                let entry = match sender.target() {
                    Some(cell) => SenderEntry::Tracked(Arc::downgrade(cell)),
                    None => SenderEntry::Untracked,
                };
                indices.senders.insert(sender_key.clone(), entry);
            }

            let handles = indices
                .connections
                .entry(sender_key.clone())
                .or_default()
                .entry(signal.clone())
                .or_default();
            let duplicate = if handles.iter().any(|existing| existing.key() == key) {
                Some(handle)
            } else {
                handles.push(handle);
                None
            };
            indices
                .senders_back
                .entry(key)
                .or_default()
                .insert(sender_key.clone());
            duplicate
        };

        debug!(
            target: "relay::dispatcher",
            receiver = %receiver.name(),
            signal = %signal,
            sender = %sender_key,
            weak,
            duplicate = duplicate.is_some(),
            "connected"
        );
        drop(duplicate);
        Ok(receiver)
    }

    /// Removes the connection of `receiver` stored under exactly this
    /// `signal` and `sender`.
    ///
    /// Wildcard connections are only removed by disconnecting with the same
    /// wildcard. Fails with [`DispatchError::NoSuchReceiver`] if there is no
    /// such connection.
    pub fn disconnect<K>(
        &self,
        receiver: K,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
    ) -> Result<(), DispatchError>
    where
        K: AsReceiverKey,
    {
        let signal = signal.into();
        signal
            .validate()
            .map_err(|reason| DispatchError::InvalidSignal { reason })?;
        let sender = sender.into();
        let key = receiver.receiver_key();

        let removed = self
            .shared
            .indices
            .lock()
            .remove_connection(sender.key(), &signal, key);

        match removed {
            Some(handle) => {
                debug!(
                    target: "relay::dispatcher",
                    receiver = %key,
                    signal = %signal,
                    sender = %sender.key(),
                    "disconnected"
                );
                drop(handle);
                Ok(())
            }
            None => Err(DispatchError::NoSuchReceiver {
                receiver: receiver.receiver_name(),
                signal: signal.to_string(),
                sender: sender.key().to_string(),
            }),
        }
    }

    fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.shared
            .plugins
            .read()
            .iter()
            .map(|(_, plugin)| plugin.clone())
            .collect()
    }

    fn lookup(&self, sender: &SenderKey, signal: &Signal, exact: bool) -> Receivers {
        let handles = self.shared.indices.lock().snapshot(sender, signal, exact);
        Receivers {
            handles: handles.into_iter(),
            plugins: self.plugins(),
        }
    }

    /// Live receivers that a send of `signal` from `sender` would reach.
    ///
    /// Order: receivers connected to exactly this pair, then to any sender,
    /// then to all signals, then to both wildcards. Each receiver appears
    /// once; within a group, registration order is kept.
    pub fn get_all_receivers(
        &self,
        sender: impl Into<Sender>,
        signal: impl Into<Signal>,
    ) -> Receivers {
        let sender = sender.into();
        self.lookup(sender.key(), &signal.into(), false)
    }

    /// Sends `signal` from `sender` to every matching receiver.
    ///
    /// `args` is extended with `signal` and `sender` named arguments, then
    /// filtered per receiver by its signature. Caller-supplied named
    /// arguments called `signal` or `sender` are replaced by the dispatch's
    /// own values. The first error stops the dispatch and is returned;
    /// receivers after it are not called.
    pub fn send(
        &self,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
        args: Args,
    ) -> Result<Responses, DispatchError> {
        self.send_inner(signal.into(), sender.into(), args, Delivery::Full)
    }

    /// Like [`send`](Self::send), but only reaches receivers connected to
    /// exactly this (sender, signal) pair.
    pub fn send_exact(
        &self,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
        args: Args,
    ) -> Result<Responses, DispatchError> {
        self.send_inner(signal.into(), sender.into(), args, Delivery::Exact)
    }

    /// Like [`send`](Self::send), but `signal` and `sender` are only passed
    /// to receivers that declare a parameter with that name.
    pub fn send_minimal(
        &self,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
        args: Args,
    ) -> Result<Responses, DispatchError> {
        self.send_inner(signal.into(), sender.into(), args, Delivery::Minimal)
    }

    fn send_inner(
        &self,
        signal: Signal,
        sender: Sender,
        args: Args,
        delivery: Delivery,
    ) -> Result<Responses, DispatchError> {
        let plugins = self.plugins();
        let receivers = self.lookup(sender.key(), &signal, delivery == Delivery::Exact);
        let args = inject(args, &signal, &sender, delivery);

        let mut responses = Vec::new();
        for receiver in receivers {
            let value = invoke(&plugins, &receiver, &signal, &sender, &args, delivery)?;
            responses.push((receiver, value));
        }
        trace!(
            target: "relay::dispatcher",
            signal = %signal,
            sender = %sender.key(),
            receivers = responses.len(),
            "sent"
        );
        Ok(responses)
    }

    /// Sends `signal` to every matching receiver, collecting each
    /// receiver's result instead of stopping at the first error.
    ///
    /// Arguments are injected and filtered as in [`send`](Self::send).
    ///
    /// With [`RegistryConfig::capture_panics`] set, a panicking receiver is
    /// reported as [`ReceiverError::Panicked`].
    pub fn send_robust(
        &self,
        signal: impl Into<Signal>,
        sender: impl Into<Sender>,
        args: Args,
    ) -> RobustResponses {
        let signal = signal.into();
        let sender = sender.into();
        let plugins = self.plugins();
        let receivers = self.lookup(sender.key(), &signal, false);
        let args = inject(args, &signal, &sender, Delivery::Full);

        let mut responses = Vec::new();
        for receiver in receivers {
            let call = || invoke(&plugins, &receiver, &signal, &sender, &args, Delivery::Full);
            let outcome = if self.shared.config.capture_panics {
                catch_panic(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
                    Err(DispatchError::Receiver {
                        receiver: receiver.name(),
                        source: ReceiverError::Panicked(panic_message(&*payload)),
                    })
                })
            } else {
                call()
            };

            if let Err(error) = &outcome {
                warn!(
                    target: "relay::dispatcher",
                    receiver = %receiver.name(),
                    signal = %signal,
                    kind = error.as_label(),
                    error = %error,
                    "receiver failed during robust send"
                );
            }
            responses.push((receiver, outcome));
        }
        responses
    }

    /// Removes every connection and every installed plugin.
    pub fn reset(&self) {
        let indices = self.shared.indices.lock().clear();
        let plugins = std::mem::take(&mut *self.shared.plugins.write());
        debug!(
            target: "relay::dispatcher",
            senders = indices.senders.len(),
            plugins = plugins.len(),
            "registry reset"
        );
        drop(indices);
        drop(plugins);
    }

    /// Installs `plugin`; each plugin type can be installed once.
    pub fn install_plugin<P: Plugin>(&self, plugin: P) -> Result<(), PluginError> {
        let mut plugins = self.shared.plugins.write();
        let type_id = TypeId::of::<P>();
        if plugins.iter().any(|(id, _)| *id == type_id) {
            return Err(PluginError::AlreadyInstalled(type_name::<P>()));
        }
        plugins.push((type_id, Arc::new(plugin)));
        Ok(())
    }

    /// Removes the installed plugin of type `P`.
    pub fn remove_plugin<P: Plugin>(&self) -> Result<(), PluginError> {
        let removed = {
            let mut plugins = self.shared.plugins.write();
            let type_id = TypeId::of::<P>();
            let index = plugins
                .iter()
                .position(|(id, _)| *id == type_id)
                .ok_or(PluginError::NotInstalled(type_name::<P>()))?;
            plugins.remove(index)
        };
        drop(removed);
        Ok(())
    }

    /// Whether a plugin of type `P` is installed
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        let type_id = TypeId::of::<P>();
        self.shared.plugins.read().iter().any(|(id, _)| *id == type_id)
    }

    /// Counts of what the registry currently holds
    pub fn stats(&self) -> RegistryStats {
        let plugins = self.shared.plugins.read().len();
        let indices = self.shared.indices.lock();
        RegistryStats {
            senders: indices.senders.len(),
            tracked_senders: indices
                .senders
                .values()
                .filter(|entry| matches!(entry, SenderEntry::Tracked(_)))
                .count(),
            connections: indices
                .connections
                .values()
                .flat_map(|signals| signals.values())
                .map(Vec::len)
                .sum(),
            receivers: indices.senders_back.len(),
            plugins,
        }
    }

    /// Whether the indices are consistent: no dead participants, no empty
    /// containers, and back references matching the connections
    pub fn is_clean(&self) -> bool {
        self.shared.indices.lock().is_clean()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn inject(mut args: Args, signal: &Signal, sender: &Sender, delivery: Delivery) -> Args {
    if delivery != Delivery::Minimal {
        args.insert("signal", Value::new(signal.clone()));
        args.insert("sender", sender.value().clone());
    }
    args
}

fn invoke(
    plugins: &[Arc<dyn Plugin>],
    receiver: &Receiver,
    signal: &Signal,
    sender: &Sender,
    args: &Args,
    delivery: Delivery,
) -> Result<Value, DispatchError> {
    let signature = resolve_signature(receiver);
    let wrapped = plugins
        .iter()
        .fold(receiver.clone(), |receiver, plugin| plugin.wrap_receiver(receiver));

    if delivery == Delivery::Minimal {
        let mut args = args.clone();
        if signature.declares("signal") {
            args.insert("signal", Value::new(signal.clone()));
        }
        if signature.declares("sender") {
            args.insert("sender", sender.value().clone());
        }
        return robust_apply(&wrapped, signature, &args);
    }
    robust_apply(&wrapped, signature, args)
}
