use parking_lot::Mutex;
use relay::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static TEST_MUTEX: Mutex<()> = Mutex::new(());

#[receiver]
fn shout(text: String) -> String {
    text.to_uppercase()
}

struct Audit;

impl Plugin for Audit {
    fn wrap_receiver(&self, receiver: Receiver) -> Receiver {
        receiver.wrap(|inner, args| {
            let value = inner.call(args)?;
            let text = value.downcast_ref::<String>().map_or("?", String::as_str);
            Ok(Value::new(format!("audited:{text}")))
        })
    }
}

#[test]
fn test_global_connect_send_disconnect() {
    let _guard = TEST_MUTEX.lock();
    global::reset();

    global::connect(shout(), "say", ANY_SENDER).unwrap();
    let args = Args::new().with("text", String::from("hi"));
    let responses = global::send("say", ANONYMOUS_SENDER, args).unwrap();
    assert_eq!(responses[0].1.downcast_ref::<String>().map(String::as_str), Some("HI"));

    global::disconnect(shout(), "say", ANY_SENDER).unwrap();
    assert!(global::get_all_receivers(ANONYMOUS_SENDER, "say").next().is_none());
    assert!(global::registry().is_clean());
}

#[test]
fn test_global_plugins_are_cleared_by_reset() {
    let _guard = TEST_MUTEX.lock();
    global::reset();

    global::connect(shout(), "say", ANY_SENDER).unwrap();
    global::install_plugin(Audit).unwrap();
    assert!(global::install_plugin(Audit).is_err());

    let args = Args::new().with("text", String::from("x"));
    let responses = global::send("say", ANONYMOUS_SENDER, args).unwrap();
    assert_eq!(responses[0].1.downcast_ref::<String>().map(String::as_str), Some("audited:X"));

    global::reset();
    assert!(global::remove_plugin::<Audit>().is_err());
    assert_eq!(global::registry().stats(), RegistryStats::default());
}

#[test]
fn test_global_strong_and_robust() {
    let _guard = TEST_MUTEX.lock();
    global::reset();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let key = global::connect_strong(
        Function::new("count", Signature::default(), move |_: &Args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::unit())
        }),
        "tick",
        ANY_SENDER,
    )
    .unwrap()
    .key();

    let results = global::send_robust("tick", ANONYMOUS_SENDER, Args::new());
    assert!(results.iter().all(|(_, outcome)| outcome.is_ok()));
    global::send_exact("tick", ANY_SENDER, Args::new()).unwrap();
    global::send_minimal("tick", ANONYMOUS_SENDER, Args::new()).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    global::disconnect(key, "tick", ANY_SENDER).unwrap();
    assert!(global::registry().is_clean());
}
