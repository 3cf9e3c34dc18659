//! Invocation adapter.
//!
//! A dispatch supplies one argument set to many receivers. Each receiver
//! declares the parameter names it accepts in a [`Signature`], and
//! [`robust_apply`] trims the argument set down to those names before the
//! call, so receivers with different signatures can share a single send.

#[cfg(test)]
mod tests;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::sync::Arc;

use crate::args::{Args, Value};
use crate::error::DispatchError;
use crate::object::{ObjectId, Tracked};
use crate::receiver::{Callable, Receiver};

/// Parameter names a receiver accepts.
///
/// For methods the instance parameter is not listed; `bound` records that
/// one was present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Cow<'static, str>>,
    variadic_named: bool,
    bound: bool,
}

impl Signature {
    /// Signature with the given ordered parameter names
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            variadic_named: false,
            bound: false,
        }
    }

    /// Signature over static names, as generated by `#[receiver]`
    pub fn from_static(params: &'static [&'static str]) -> Self {
        Self::new(params.iter().copied())
    }

    /// Accept every named argument in addition to the listed ones
    pub fn with_variadic_named(mut self) -> Self {
        self.variadic_named = true;
        self
    }

    pub(crate) fn into_bound(mut self) -> Self {
        self.bound = true;
        self
    }

    /// Ordered parameter names
    pub fn params(&self) -> &[Cow<'static, str>] {
        &self.params
    }

    /// Whether any named argument is accepted
    pub fn is_variadic_named(&self) -> bool {
        self.variadic_named
    }

    /// Whether this describes a method bound to an instance
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Number of named parameters
    pub fn accepted_count(&self) -> usize {
        self.params.len()
    }

    /// Whether `name` is listed explicitly
    pub fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|param| param == name)
    }

    /// Whether a named argument called `name` would reach the receiver
    pub fn accepts(&self, name: &str) -> bool {
        self.variadic_named || self.declares(name)
    }
}

static OBJECT_SIGNATURES: Lazy<DashMap<ObjectId, Arc<Signature>, ahash::RandomState>> =
    Lazy::new(|| DashMap::with_hasher(ahash::RandomState::new()));

/// Describes a callable object, caching the result for the object's lifetime.
pub(crate) fn object_signature<T: Callable>(
    object: &Tracked<T>,
) -> Result<Arc<Signature>, DispatchError> {
    let id = object.id();
    if let Some(cached) = OBJECT_SIGNATURES.get(&id) {
        return Ok(cached.clone());
    }

    let signature = object
        .signature()
        .ok_or_else(|| DispatchError::UnknownCallableKind {
            receiver: format!("{}{}", std::any::type_name::<T>(), id),
        })?;
    let signature = Arc::new(signature);

    if let Entry::Vacant(slot) = OBJECT_SIGNATURES.entry(id) {
        slot.insert(signature.clone());
        object.on_drop(|id| {
            OBJECT_SIGNATURES.remove(&id);
        });
    }
    Ok(signature)
}

#[cfg(test)]
pub(crate) fn cached_signature_count() -> usize {
    OBJECT_SIGNATURES.len()
}

#[cfg(test)]
pub(crate) fn is_signature_cached(id: ObjectId) -> bool {
    OBJECT_SIGNATURES.contains_key(&id)
}

/// The descriptor used to filter arguments for `receiver`
pub fn resolve_signature(receiver: &Receiver) -> &Signature {
    receiver.signature()
}

/// Calls `receiver` with the subset of `args` that `signature` accepts.
///
/// Positional values fill the leading parameters. A parameter supplied both
/// positionally and by name is a [`DispatchError::DuplicateArgument`].
/// Unless the signature is variadic, named arguments it does not list are
/// dropped. Positional values are then also bound to their parameter names,
/// so receivers read every argument by name.
///
/// # Examples
///
/// ```rust
/// use relay_core::{Args, Function, Signature, Value, robust_apply};
/// use relay_core::receiver::IntoReceiver;
///
/// let add = Function::new("add", Signature::from_static(&["a", "b"]), |args| {
///     Ok(Value::new(args.get::<i32>("a")? + args.get::<i32>("b")?))
/// });
/// let receiver = add.into_receiver().unwrap();
///
/// let args = Args::new().arg(2_i32).with("b", 3_i32).with("unused", "ignored");
/// let sum = robust_apply(&receiver, receiver.signature(), &args).unwrap();
/// assert_eq!(sum.downcast_ref::<i32>(), Some(&5));
/// ```
pub fn robust_apply(
    receiver: &Receiver,
    signature: &Signature,
    args: &Args,
) -> Result<Value, DispatchError> {
    let params = signature.params();
    let bound_count = args.positional().len().min(params.len());
    // positional values past the declared params stay unnamed
    let (positional_names, remaining) = params.split_at(bound_count);

    if let Some(name) = positional_names.iter().find(|name| args.contains(name)) {
        return Err(DispatchError::DuplicateArgument {
            name: name.to_string(),
            receiver: receiver.name(),
        });
    }

    let mut call_args = args.clone();
    if !signature.is_variadic_named() {
        call_args.retain_named(|name| remaining.iter().any(|param| param == name));
    }
    for (name, value) in positional_names.iter().zip(args.positional()) {
        call_args.insert(name.clone(), value.clone());
    }

    receiver
        .call(&call_args)
        .map_err(|source| DispatchError::Receiver {
            receiver: receiver.name(),
            source,
        })
}
