//! Signal and sender identities used as registry keys.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use crate::args::Value;
use crate::object::{ErasedCell, ObjectId, Tracked};

/// An event category.
///
/// Named signals compare by name. Typed signals compare by type, which
/// gives each marker type its own signal without string collisions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    /// Matches every signal when used to connect
    All,
    /// A signal identified by name
    Named(Arc<str>),
    /// A signal identified by a marker type
    Typed {
        /// Identity of the marker type
        type_id: TypeId,
        /// Name of the marker type, for display
        name: &'static str,
    },
}

/// Connect with this signal to receive every signal from the sender.
pub const ALL_SIGNALS: Signal = Signal::All;

impl Signal {
    /// A signal identified by `name`
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Signal::Named(name.into())
    }

    /// A signal identified by the marker type `T`
    pub fn of<T: Any>() -> Self {
        Signal::Typed {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Whether this is the [`ALL_SIGNALS`] wildcard
    pub fn is_all(&self) -> bool {
        matches!(self, Signal::All)
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        match self {
            Signal::Named(name) if name.is_empty() => Err("signal name must not be empty"),
            _ => Ok(()),
        }
    }
}

impl From<&str> for Signal {
    fn from(name: &str) -> Self {
        Signal::Named(name.into())
    }
}

impl From<String> for Signal {
    fn from(name: String) -> Self {
        Signal::Named(name.into())
    }
}

impl From<&Signal> for Signal {
    fn from(signal: &Signal) -> Self {
        signal.clone()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::All => f.write_str("<all signals>"),
            Signal::Named(name) => f.write_str(name),
            Signal::Typed { name, .. } => f.write_str(name),
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::All => f.write_str("ALL_SIGNALS"),
            Signal::Named(name) => write!(f, "Signal({name:?})"),
            Signal::Typed { name, .. } => write!(f, "Signal(<{name}>)"),
        }
    }
}

/// Identity of a sender within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SenderKey {
    /// Matches every sender when used to connect
    Any,
    /// The sender used when none is given
    Anonymous,
    /// A tracked object, identified by identity rather than value
    Object(ObjectId),
    /// An untracked sender identified by a label
    Named(Arc<str>),
}

/// Connect with this sender to receive a signal from every sender.
pub const ANY_SENDER: SenderKey = SenderKey::Any;

/// The default sender for dispatches that do not name one.
pub const ANONYMOUS_SENDER: SenderKey = SenderKey::Anonymous;

impl fmt::Display for SenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderKey::Any => f.write_str("<any sender>"),
            SenderKey::Anonymous => f.write_str("<anonymous>"),
            SenderKey::Object(id) => write!(f, "{id}"),
            SenderKey::Named(name) => f.write_str(name),
        }
    }
}

/// A sender as passed to `connect` and `send`.
///
/// Receivers get [`Sender::value`] as their `sender` argument: a clone of
/// the `Tracked<T>` for object senders, otherwise the [`SenderKey`] itself.
/// Only object senders are tracked; their connections are removed when the
/// object is destroyed.
#[derive(Clone)]
pub struct Sender {
    key: SenderKey,
    target: Option<Arc<ErasedCell>>,
    value: Value,
}

impl Sender {
    /// An untracked sender identified by `name`
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::from(SenderKey::Named(name.into()))
    }

    /// Registry key of this sender
    pub fn key(&self) -> &SenderKey {
        &self.key
    }

    /// What receivers get as the `sender` argument
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn target(&self) -> Option<&Arc<ErasedCell>> {
        self.target.as_ref()
    }
}

impl<T: Any + Send + Sync> From<&Tracked<T>> for Sender {
    fn from(object: &Tracked<T>) -> Self {
        Self {
            key: SenderKey::Object(object.id()),
            target: Some(object.erased()),
            value: Value::new(object.clone()),
        }
    }
}

impl From<SenderKey> for Sender {
    fn from(key: SenderKey) -> Self {
        Self {
            value: Value::new(key.clone()),
            key,
            target: None,
        }
    }
}

impl From<&Sender> for Sender {
    fn from(sender: &Sender) -> Self {
        sender.clone()
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("key", &self.key)
            .field("tracked", &self.target.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Saved;
    struct Loaded;

    #[test]
    fn test_named_signals_compare_by_name() {
        assert_eq!(Signal::from("saved"), Signal::named(String::from("saved")));
        assert_ne!(Signal::from("saved"), Signal::from("loaded"));
        assert!(ALL_SIGNALS.is_all());
    }

    #[test]
    fn test_typed_signals_compare_by_type() {
        let set: HashSet<Signal> = [Signal::of::<Saved>(), Signal::of::<Saved>(), Signal::of::<Loaded>()]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_ne!(Signal::of::<Saved>(), Signal::from(type_name::<Saved>()));
        assert!(Signal::of::<Saved>().to_string().ends_with("Saved"));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        assert!(Signal::from("").validate().is_err());
        assert!(Signal::from("ok").validate().is_ok());
        assert!(ALL_SIGNALS.validate().is_ok());
    }

    #[test]
    fn test_tracked_sender_uses_identity() {
        let a = Tracked::new(String::from("same"));
        let b = Tracked::new(String::from("same"));

        let sa = Sender::from(&a);
        let sb = Sender::from(&b);
        assert_ne!(sa.key(), sb.key());
        assert_eq!(sa.key(), &SenderKey::Object(a.id()));
        assert!(sa.target().is_some());

        let passed = sa.value().downcast_ref::<Tracked<String>>().unwrap();
        assert!(Tracked::ptr_eq(passed, &a));
    }

    #[test]
    fn test_untracked_senders_pass_their_key() {
        let sender = Sender::named("cli");
        assert!(sender.target().is_none());
        assert_eq!(sender.value().downcast_ref::<SenderKey>(), Some(&SenderKey::Named("cli".into())));

        let anonymous = Sender::from(ANONYMOUS_SENDER);
        assert_eq!(anonymous.key().to_string(), "<anonymous>");
    }
}
