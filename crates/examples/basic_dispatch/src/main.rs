//! # Basic dispatch
//!
//! Connects a few receivers with different signatures to one signal and
//! sends it from two senders. Shows how:
//! - receivers only get the arguments they declare
//! - `ANY_SENDER` and `ALL_SIGNALS` act as wildcards
//! - bound methods are declared with `#[receiver]`

use relay::panic_handler::setup_tracing;
use relay::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker type for a typed signal
struct Shutdown;

#[receiver]
fn log_saved(path: String, sender: Value) {
    let origin = sender
        .downcast_ref::<Tracked<String>>()
        .map(|doc| doc.as_str().to_owned())
        .unwrap_or_else(|| "<unknown>".to_owned());
    println!("  log_saved: {path} (from {origin})");
}

#[receiver]
fn size_report(path: String, bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{path} is {bytes} bytes"),
        None => format!("{path} has unknown size"),
    }
}

#[receiver]
fn everything(signal: Signal, args: &Args) {
    println!("  everything: {signal} with {} named arguments", args.named_len());
}

struct Stats {
    saves: AtomicU64,
}

impl Stats {
    #[receiver]
    fn on_saved(&self, bytes: Option<u64>) -> u64 {
        self.saves.fetch_add(1, Ordering::SeqCst);
        bytes.unwrap_or_default()
    }
}

fn main() -> Result<(), DispatchError> {
    setup_tracing();
    tracing::info!(example = "basic_dispatch", "starting");

    let registry = Registry::new();
    let readme = Tracked::new(String::from("README.md"));
    let notes = Tracked::new(String::from("notes.txt"));
    let stats = Tracked::new(Stats {
        saves: AtomicU64::new(0),
    });

    registry.connect(log_saved(), "saved", ANY_SENDER)?;
    registry.connect(size_report(), "saved", &readme)?;
    registry.connect(everything(), ALL_SIGNALS, ANY_SENDER)?;
    registry.connect(Stats::on_saved_receiver(&stats), "saved", ANY_SENDER)?;

    println!("saving README.md");
    let args = Args::new()
        .with("path", String::from("README.md"))
        .with("bytes", 2048_u64);
    for (receiver, value) in registry.send("saved", &readme, args)? {
        if let Some(text) = value.downcast_ref::<String>() {
            println!("  {} returned {text:?}", receiver.name());
        }
    }

    println!("saving notes.txt");
    let args = Args::new().with("path", String::from("notes.txt"));
    let responses = registry.send("saved", &notes, args)?;
    println!("  {} receivers answered", responses.len());

    println!("shutting down");
    registry.send(Signal::of::<Shutdown>(), ANONYMOUS_SENDER, Args::new())?;

    println!("stats saw {} saves", stats.saves.load(Ordering::SeqCst));
    println!("{:?}", registry.stats());
    Ok(())
}
