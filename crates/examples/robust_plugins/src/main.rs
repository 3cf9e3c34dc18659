//! # Robust dispatch and plugins
//!
//! `send` stops at the first failing receiver. `send_robust` calls every
//! receiver and reports each result, turning panics into errors. Plugins
//! can hide receivers and intercept their calls.

use relay::panic_handler::setup_tracing;
use relay::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
struct QuotaExceeded(u64);

impl std::fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "quota exceeded by {} bytes", self.0)
    }
}

impl std::error::Error for QuotaExceeded {}

#[receiver]
fn check_quota(bytes: u64) -> Result<u64, QuotaExceeded> {
    const LIMIT: u64 = 1024;
    if bytes > LIMIT {
        Err(QuotaExceeded(bytes - LIMIT))
    } else {
        Ok(LIMIT - bytes)
    }
}

#[receiver]
fn flaky(bytes: u64) {
    if bytes % 2 == 1 {
        panic!("odd upload size");
    }
}

#[receiver]
fn debug_dump(args: &Args) {
    println!("  debug_dump: {args:?}");
}

#[receiver]
fn archive(bytes: u64) -> bool {
    bytes > 0
}

/// Hides receivers whose name starts with `debug_`.
struct Quiet;

impl Plugin for Quiet {
    fn is_live(&self, receiver: &Receiver) -> bool {
        !receiver.name().starts_with("debug_")
    }
}

/// Counts every call made through the registry.
struct CallCounter;

static CALLS: AtomicUsize = AtomicUsize::new(0);

impl Plugin for CallCounter {
    fn wrap_receiver(&self, receiver: Receiver) -> Receiver {
        receiver.wrap(|inner: &Receiver, args: &Args| {
            CALLS.fetch_add(1, Ordering::Relaxed);
            inner.call(args)
        })
    }
}

fn print_robust(responses: &RobustResponses) {
    for (receiver, result) in responses {
        match result {
            Ok(value) if value.is::<()>() => println!("  {}: done", receiver.name()),
            Ok(value) => match value.downcast_ref::<u64>() {
                Some(left) => println!("  {}: {left} bytes left", receiver.name()),
                None => println!("  {}: ok", receiver.name()),
            },
            Err(error) => println!("  {}: {error}", receiver.name()),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();
    tracing::info!(example = "robust_plugins", "starting");
    let registry = Registry::new();

    registry.connect(debug_dump(), "upload", ANY_SENDER)?;
    registry.connect(check_quota(), "upload", ANY_SENDER)?;
    registry.connect(flaky(), "upload", ANY_SENDER)?;
    registry.connect(archive(), "upload", ANY_SENDER)?;

    println!("send, small upload");
    let responses = registry.send("upload", ANONYMOUS_SENDER, Args::new().with("bytes", 512_u64))?;
    println!("  {} receivers answered", responses.len());

    println!("send, oversized upload");
    match registry.send("upload", ANONYMOUS_SENDER, Args::new().with("bytes", 4096_u64)) {
        Ok(_) => println!("  unexpectedly succeeded"),
        Err(error) => println!("  aborted: {error}"),
    }

    println!("send_robust, oversized odd upload");
    let responses = registry.send_robust("upload", ANONYMOUS_SENDER, Args::new().with("bytes", 4097_u64));
    print_robust(&responses);

    registry.install_plugin(Quiet)?;
    registry.install_plugin(CallCounter)?;
    if let Err(error) = registry.install_plugin(Quiet) {
        println!("  second install rejected: {error}");
    }

    println!("send_robust with plugins");
    let responses = registry.send_robust("upload", ANONYMOUS_SENDER, Args::new().with("bytes", 100_u64));
    print_robust(&responses);
    println!("  calls counted by plugin: {}", CALLS.load(Ordering::Relaxed));

    registry.remove_plugin::<Quiet>()?;
    let visible = registry.get_all_receivers(ANY_SENDER, "upload").count();
    println!("  receivers visible after removing Quiet: {visible}");
    Ok(())
}
