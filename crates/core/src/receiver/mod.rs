//! Receivers: the callables a registry delivers signals to.
//!
//! Three kinds exist, mirroring what can be subscribed:
//!
//! - [`Function`]: a named closure owned by a tracked cell. Dropping every
//!   clone of the `Function` destroys it.
//! - [`Method`]: a plain `fn(&T, &Args)` bound to a [`Tracked<T>`] instance.
//!   Its identity is the pair (instance, function), so two `Method`s built
//!   from the same pair are the same receiver.
//! - Callable objects: a [`Tracked<T>`] whose `T` implements [`Callable`].


use std::any::{Any, type_name};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::args::{Args, Value};
use crate::error::{DispatchError, ReceiverError};
use crate::object::{ErasedCell, ObjectId, Tracked};
use crate::robustapply::{Signature, object_signature};
use crate::saferef::HandleKey;

/// What a receiver call produces.
pub type Outcome = Result<Value, ReceiverError>;

type Invoke = Arc<dyn Fn(&(dyn Any + Send + Sync), &Args) -> Outcome + Send + Sync>;

/// The kind of callable behind a [`Receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKind {
    /// A [`Function`]
    Function,
    /// A [`Method`] bound to an instance
    Method,
    /// A tracked [`Callable`] object
    Object,
}

/// Everything about a receiver except the object it runs against.
///
/// Weak handles keep this part and only downgrade the target.
#[derive(Clone)]
pub(crate) struct Member {
    pub(crate) addr: usize,
    pub(crate) name: Cow<'static, str>,
    pub(crate) signature: Arc<Signature>,
    pub(crate) invoke: Invoke,
}

/// A live, callable receiver.
///
/// Holding a `Receiver` keeps its target alive. The registry only stores
/// weak handles and hands out `Receiver`s for the duration of a dispatch.
#[derive(Clone)]
pub struct Receiver {
    kind: ReceiverKind,
    target: Arc<ErasedCell>,
    member: Member,
}

impl Receiver {
    pub(crate) fn from_parts(kind: ReceiverKind, target: Arc<ErasedCell>, member: Member) -> Self {
        Self {
            kind,
            target,
            member,
        }
    }

    pub(crate) fn target(&self) -> &Arc<ErasedCell> {
        &self.target
    }

    pub(crate) fn member(&self) -> &Member {
        &self.member
    }

    /// Which kind of callable this is
    pub fn kind(&self) -> ReceiverKind {
        self.kind
    }

    /// Identity of the object that owns the receiver
    pub fn id(&self) -> ObjectId {
        self.target.id()
    }

    /// Identity used for de-duplication and disconnection
    pub fn key(&self) -> HandleKey {
        HandleKey::new(self.target.id(), self.member.addr)
    }

    /// Human readable name, e.g. `on_save#12`
    pub fn name(&self) -> String {
        format!("{}{}", self.member.name, self.target.id())
    }

    /// The declared parameter names
    pub fn signature(&self) -> &Signature {
        &self.member.signature
    }

    /// Borrows the target as `T` (the instance for methods, the object for
    /// callable objects)
    pub fn target_as<T: Any>(&self) -> Option<&T> {
        self.target.value().downcast_ref::<T>()
    }

    /// Calls the receiver directly with `args`, without argument filtering
    pub fn call(&self, args: &Args) -> Outcome {
        (self.member.invoke)(self.target.value(), args)
    }

    /// Replaces the call path while keeping identity and signature.
    ///
    /// `wrapper` receives the original receiver. Plugins use this to
    /// intercept calls.
    pub fn wrap<F>(self, wrapper: F) -> Receiver
    where
        F: Fn(&Receiver, &Args) -> Outcome + Send + Sync + 'static,
    {
        let inner = self.clone();
        Receiver {
            kind: self.kind,
            target: self.target,
            member: Member {
                invoke: Arc::new(move |_: &(dyn Any + Send + Sync), args: &Args| {
                    wrapper(&inner, args)
                }),
                ..self.member
            },
        }
    }
}

impl PartialEq for Receiver {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Receiver {}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("kind", &self.kind)
            .field("name", &self.name())
            .field("signature", &self.member.signature)
            .finish()
    }
}

/// Storage behind a [`Function`].
pub struct FunctionBody {
    call: Box<dyn Fn(&Args) -> Outcome + Send + Sync>,
}

fn invoke_function(target: &(dyn Any + Send + Sync), args: &Args) -> Outcome {
    let body = target
        .downcast_ref::<FunctionBody>()
        .ok_or(ReceiverError::TargetType {
            expected: type_name::<FunctionBody>(),
        })?;
    (body.call)(args)
}

/// A named closure that can be connected as a receiver.
///
/// Clones share identity. The function is destroyed, and its weak
/// connections removed, when the last clone drops.
///
/// # Examples
///
/// ```rust
/// use relay_core::{Args, Function, Signature, Value};
///
/// let greet = Function::new("greet", Signature::from_static(&["name"]), |args: &Args| {
///     Ok(Value::new(format!("hello {}", args.get::<String>("name")?)))
/// });
///
/// let out = greet.call(&Args::new().with("name", String::from("ada"))).unwrap();
/// assert_eq!(out.downcast_ref::<String>().map(String::as_str), Some("hello ada"));
/// ```
#[derive(Clone)]
pub struct Function {
    name: Cow<'static, str>,
    signature: Arc<Signature>,
    body: Tracked<FunctionBody>,
}

impl Function {
    /// Wraps `call` with the parameter names it reads
    pub fn new<F>(name: impl Into<Cow<'static, str>>, signature: Signature, call: F) -> Self
    where
        F: Fn(&Args) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature: Arc::new(signature),
            body: Tracked::new(FunctionBody {
                call: Box::new(call),
            }),
        }
    }

    /// Identity shared by every clone
    pub fn id(&self) -> ObjectId {
        self.body.id()
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter names
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the closure directly
    pub fn call(&self, args: &Args) -> Outcome {
        (self.body.call)(args)
    }

    /// Runs `observer` once the last clone drops
    pub fn on_drop<F>(&self, observer: F)
    where
        F: FnOnce(ObjectId) + Send + 'static,
    {
        self.body.on_drop(observer);
    }

    fn to_receiver(&self) -> Receiver {
        Receiver::from_parts(
            ReceiverKind::Function,
            self.body.erased(),
            Member {
                addr: 0,
                name: self.name.clone(),
                signature: self.signature.clone(),
                invoke: Arc::new(invoke_function),
            },
        )
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("signature", &self.signature)
            .finish()
    }
}

/// A function bound to a tracked instance.
///
/// The method does not keep the instance alive once connected weakly; the
/// registry drops the connection when the instance goes away.
#[derive(Clone)]
pub struct Method {
    instance: Arc<ErasedCell>,
    member: Member,
}

impl Method {
    /// Binds `func` to `instance`.
    ///
    /// `signature` lists the parameters after the instance.
    pub fn new<T>(
        instance: &Tracked<T>,
        name: impl Into<Cow<'static, str>>,
        func: fn(&T, &Args) -> Outcome,
        signature: Signature,
    ) -> Self
    where
        T: Any + Send + Sync,
    {
        let invoke: Invoke = Arc::new(move |target: &(dyn Any + Send + Sync), args: &Args| {
            let this = target
                .downcast_ref::<T>()
                .ok_or(ReceiverError::TargetType {
                    expected: type_name::<T>(),
                })?;
            func(this, args)
        });
        Self {
            instance: instance.erased(),
            member: Member {
                addr: func as usize,
                name: name.into(),
                signature: Arc::new(signature.into_bound()),
                invoke,
            },
        }
    }

    /// Identity of the bound instance
    pub fn instance_id(&self) -> ObjectId {
        self.instance.id()
    }

    /// Identity of this (instance, function) pair
    pub fn key(&self) -> HandleKey {
        HandleKey::new(self.instance.id(), self.member.addr)
    }

    /// Declared parameter names, excluding the instance
    pub fn signature(&self) -> &Signature {
        &self.member.signature
    }

    fn to_receiver(&self) -> Receiver {
        Receiver::from_parts(ReceiverKind::Method, self.instance.clone(), self.member.clone())
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.member.name)
            .field("instance", &self.instance.id())
            .field("signature", &self.member.signature)
            .finish()
    }
}

/// An object that can be called like a function.
///
/// Implementors must describe their parameters through [`signature`];
/// objects that return `None` cannot be connected.
///
/// [`signature`]: Callable::signature
pub trait Callable: Any + Send + Sync {
    /// Runs the object with the filtered arguments
    fn call(&self, args: &Args) -> Outcome;

    /// Parameter names this object accepts
    fn signature(&self) -> Option<Signature> {
        None
    }
}

fn invoke_object<T: Callable>(target: &(dyn Any + Send + Sync), args: &Args) -> Outcome {
    let object = target.downcast_ref::<T>().ok_or(ReceiverError::TargetType {
        expected: type_name::<T>(),
    })?;
    object.call(args)
}

fn object_receiver<T: Callable>(object: &Tracked<T>) -> Result<Receiver, DispatchError> {
    let signature = object_signature(object)?;
    let name = type_name::<T>();
    let short = name.rsplit("::").next().unwrap_or(name);
    Ok(Receiver::from_parts(
        ReceiverKind::Object,
        object.erased(),
        Member {
            addr: 0,
            name: Cow::Borrowed(short),
            signature,
            invoke: Arc::new(invoke_object::<T>),
        },
    ))
}

/// Conversion into a [`Receiver`], used by `connect`.
pub trait IntoReceiver {
    /// Resolves `self` into a callable receiver
    fn into_receiver(self) -> Result<Receiver, DispatchError>;
}

impl IntoReceiver for Receiver {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        Ok(self)
    }
}

impl IntoReceiver for &Receiver {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        Ok(self.clone())
    }
}

impl IntoReceiver for Function {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        Ok(self.to_receiver())
    }
}

impl IntoReceiver for &Function {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        Ok(self.to_receiver())
    }
}

impl IntoReceiver for Method {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        Ok(self.to_receiver())
    }
}

impl IntoReceiver for &Method {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        Ok(self.to_receiver())
    }
}

impl<T: Callable> IntoReceiver for Tracked<T> {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        object_receiver(&self)
    }
}

impl<T: Callable> IntoReceiver for &Tracked<T> {
    fn into_receiver(self) -> Result<Receiver, DispatchError> {
        object_receiver(self)
    }
}

/// Anything that identifies a receiver, used by `disconnect`.
///
/// Unlike [`IntoReceiver`] this never fails and never needs the receiver
/// to be alive.
pub trait AsReceiverKey {
    /// Identity of the receiver
    fn receiver_key(&self) -> HandleKey;

    /// Name used in error messages
    fn receiver_name(&self) -> String {
        self.receiver_key().to_string()
    }
}

impl AsReceiverKey for HandleKey {
    fn receiver_key(&self) -> HandleKey {
        *self
    }
}

impl AsReceiverKey for Receiver {
    fn receiver_key(&self) -> HandleKey {
        self.key()
    }

    fn receiver_name(&self) -> String {
        self.name()
    }
}

impl AsReceiverKey for Function {
    fn receiver_key(&self) -> HandleKey {
        HandleKey::new(self.id(), 0)
    }

    fn receiver_name(&self) -> String {
        format!("{}{}", self.name, self.id())
    }
}

impl AsReceiverKey for Method {
    fn receiver_key(&self) -> HandleKey {
        self.key()
    }

    fn receiver_name(&self) -> String {
        format!("{}{}", self.member.name, self.instance.id())
    }
}

impl<T: Callable> AsReceiverKey for Tracked<T> {
    fn receiver_key(&self) -> HandleKey {
        HandleKey::new(self.id(), 0)
    }
}

impl<K: AsReceiverKey + ?Sized> AsReceiverKey for &K {
    fn receiver_key(&self) -> HandleKey {
        (**self).receiver_key()
    }

    fn receiver_name(&self) -> String {
        (**self).receiver_name()
    }
}
