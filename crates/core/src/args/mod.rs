//! Dispatch arguments: untyped values plus the positional/named container
//! receivers read from.

#[cfg(test)]
mod tests;

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ReceiverError;

/// A cheaply cloneable, type-erased argument or result.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    /// Wraps `value`
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// The value returned by receivers that produce nothing
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Borrows the inner value as `T` if it has that type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).downcast_ref::<T>()
    }

    /// Whether the inner value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        (*self.0).is::<T>()
    }

    /// Whether both values share the same allocation
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&"<any>").finish()
    }
}

/// Positional and named arguments for one receiver call.
///
/// Named arguments are what receivers normally read. Before a call, the
/// invocation adapter binds positional values to the receiver's leading
/// parameter names, so `get` works the same for both.
///
/// # Examples
///
/// ```rust
/// use relay_core::Args;
///
/// let args = Args::new().with("path", String::from("/tmp/a")).with("size", 42_u64);
///
/// assert_eq!(args.get::<u64>("size").unwrap(), 42);
/// assert!(args.get::<String>("missing").is_err());
/// ```
#[derive(Clone, Default)]
pub struct Args {
    positional: Vec<Value>,
    named: HashMap<Cow<'static, str>, Value, ahash::RandomState>,
}

impl Args {
    /// Creates an empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument
    pub fn arg<T: Any + Send + Sync>(self, value: T) -> Self {
        self.arg_value(Value::new(value))
    }

    /// Appends an already wrapped positional argument
    pub fn arg_value(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Adds a named argument
    pub fn with<T: Any + Send + Sync>(self, name: impl Into<Cow<'static, str>>, value: T) -> Self {
        self.with_value(name, Value::new(value))
    }

    /// Adds an already wrapped named argument
    pub fn with_value(mut self, name: impl Into<Cow<'static, str>>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a named argument, returning the value it replaced
    pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, value: Value) -> Option<Value> {
        self.named.insert(name.into(), value)
    }

    /// Positional arguments in call order
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Iterates over named arguments in no particular order
    pub fn named(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.named.iter().map(|(name, value)| (name.as_ref(), value))
    }

    /// Looks up a named argument
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Whether a named argument is present
    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Number of named arguments
    pub fn named_len(&self) -> usize {
        self.named.len()
    }

    /// Required untyped argument
    pub fn value(&self, name: &str) -> Result<&Value, ReceiverError> {
        self.named
            .get(name)
            .ok_or_else(|| ReceiverError::MissingArgument {
                name: name.to_string(),
            })
    }

    /// Required argument borrowed as `T`
    pub fn get_ref<T: Any>(&self, name: &str) -> Result<&T, ReceiverError> {
        self.value(name)?
            .downcast_ref::<T>()
            .ok_or_else(|| ReceiverError::ArgumentType {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Required argument cloned out as `T`
    pub fn get<T: Any + Clone>(&self, name: &str) -> Result<T, ReceiverError> {
        self.get_ref::<T>(name).cloned()
    }

    /// Optional argument; absent is `None`, present with the wrong type is an error
    pub fn get_opt<T: Any + Clone>(&self, name: &str) -> Result<Option<T>, ReceiverError> {
        match self.named.get(name) {
            None => Ok(None),
            Some(value) => value.downcast_ref::<T>().cloned().map(Some).ok_or_else(|| {
                ReceiverError::ArgumentType {
                    name: name.to_string(),
                    expected: type_name::<T>(),
                }
            }),
        }
    }

    pub(crate) fn retain_named<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.named.retain(|name, _| keep(name));
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.named.keys().map(|name| name.as_ref()).collect();
        names.sort_unstable();
        f.debug_struct("Args")
            .field("positional", &self.positional.len())
            .field("named", &names)
            .finish()
    }
}
