use super::*;
use crate::error::ReceiverError;
use crate::receiver::{Function, IntoReceiver, Method, Outcome};
use parking_lot::Mutex;

fn recorder(name: &'static str, signature: Signature) -> (Function, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let function = Function::new(name, signature, move |args: &Args| {
        let mut names: Vec<String> = args.named().map(|(name, _)| name.to_string()).collect();
        names.sort();
        *sink.lock() = names;
        Ok(Value::unit())
    });
    (function, seen)
}

#[test]
fn test_signature_queries() {
    let signature = Signature::from_static(&["signal", "sender", "payload"]);

    assert_eq!(signature.accepted_count(), 3);
    assert!(signature.declares("sender"));
    assert!(!signature.accepts("extra"));
    assert!(!signature.is_bound());

    let variadic = signature.clone().with_variadic_named();
    assert!(variadic.accepts("extra"));
    assert!(!variadic.declares("extra"));
}

#[test]
fn test_undeclared_named_arguments_are_dropped() {
    let (function, seen) = recorder("narrow", Signature::from_static(&["a"]));
    let receiver = function.into_receiver().unwrap();
    let args = Args::new().with("a", 1_u8).with("b", 2_u8).with("sender", ());

    robust_apply(&receiver, receiver.signature(), &args).unwrap();
    assert_eq!(*seen.lock(), ["a"]);
}

#[test]
fn test_variadic_receives_everything() {
    let (function, seen) = recorder("wide", Signature::from_static(&["a"]).with_variadic_named());
    let receiver = function.into_receiver().unwrap();
    let args = Args::new().with("a", 1_u8).with("b", 2_u8).with("c", 3_u8);

    robust_apply(&receiver, receiver.signature(), &args).unwrap();
    assert_eq!(*seen.lock(), ["a", "b", "c"]);
}

#[test]
fn test_positional_values_bind_to_leading_params() {
    let function = Function::new("sub", Signature::from_static(&["x", "y"]), |args: &Args| {
        Ok(Value::new(args.get::<i64>("x")? - args.get::<i64>("y")?))
    });
    let receiver = function.into_receiver().unwrap();

    let out = robust_apply(&receiver, receiver.signature(), &Args::new().arg(10_i64).arg(4_i64));
    assert_eq!(out.unwrap().downcast_ref::<i64>(), Some(&6));
}

#[test]
fn test_extra_positional_values_are_not_named() {
    let (function, seen) = recorder("one", Signature::from_static(&["only"]));
    let receiver = function.into_receiver().unwrap();

    robust_apply(&receiver, receiver.signature(), &Args::new().arg(1_u8).arg(2_u8)).unwrap();
    assert_eq!(*seen.lock(), ["only"]);
}

#[test]
fn test_duplicate_argument_is_rejected_before_call() {
    let (function, seen) = recorder("dup", Signature::from_static(&["a", "b"]));
    let receiver = function.into_receiver().unwrap();
    let args = Args::new().arg(1_u8).with("a", 2_u8);

    let err = robust_apply(&receiver, receiver.signature(), &args).unwrap_err();
    match err {
        DispatchError::DuplicateArgument { name, receiver: who } => {
            assert_eq!(name, "a");
            assert_eq!(who, receiver.name());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(seen.lock().is_empty(), "receiver must not run");
}

#[test]
fn test_named_value_for_unfilled_param_is_not_duplicate() {
    let (function, seen) = recorder("fill", Signature::from_static(&["a", "b"]));
    let receiver = function.into_receiver().unwrap();

    robust_apply(&receiver, receiver.signature(), &Args::new().arg(1_u8).with("b", 2_u8))
        .unwrap();
    assert_eq!(*seen.lock(), ["a", "b"]);
}

#[test]
fn test_receiver_error_is_wrapped_with_name() {
    let function = Function::new("fails", Signature::default(), |_: &Args| {
        Err(ReceiverError::failed("nope"))
    });
    let receiver = function.into_receiver().unwrap();

    let err = robust_apply(&receiver, receiver.signature(), &Args::new()).unwrap_err();
    assert_eq!(err.as_label(), "dispatch_receiver_failed");
    assert_eq!(err.to_string(), format!("receiver {} failed: nope", receiver.name()));
}

struct Doubler;

impl Callable for Doubler {
    fn call(&self, args: &Args) -> Outcome {
        Ok(Value::new(args.get::<u32>("n")? * 2))
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature::from_static(&["n"]))
    }
}

struct Opaque;

impl Callable for Opaque {
    fn call(&self, _args: &Args) -> Outcome {
        Ok(Value::unit())
    }
}

#[test]
fn test_callable_object_signature_is_cached_until_drop() {
    let doubler = Tracked::new(Doubler);
    let id = doubler.id();

    let receiver = doubler.clone().into_receiver().unwrap();
    assert!(is_signature_cached(id));
    assert!(cached_signature_count() >= 1);

    let out = robust_apply(&receiver, resolve_signature(&receiver), &Args::new().arg(21_u32));
    assert_eq!(out.unwrap().downcast_ref::<u32>(), Some(&42));

    drop(receiver);
    drop(doubler);
    assert!(!is_signature_cached(id));
}

#[test]
fn test_object_without_signature_is_unknown_kind() {
    let opaque = Tracked::new(Opaque);
    let err = (&opaque).into_receiver().unwrap_err();

    assert!(matches!(err, DispatchError::UnknownCallableKind { .. }));
    assert!(!is_signature_cached(opaque.id()));
}

#[test]
fn test_method_signature_is_bound() {
    struct Unit;
    fn noop(_: &Unit, _: &Args) -> Outcome {
        Ok(Value::unit())
    }

    let instance = Tracked::new(Unit);
    let method = Method::new(&instance, "noop", noop, Signature::from_static(&["sender"]));
    let receiver = method.into_receiver().unwrap();

    let signature = resolve_signature(&receiver);
    assert!(signature.is_bound());
    assert_eq!(signature.accepted_count(), 1);
}
