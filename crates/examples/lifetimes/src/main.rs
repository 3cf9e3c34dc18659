//! # Lifetimes
//!
//! The registry only holds weak references. This example shows connections
//! disappearing on their own when:
//! - the object owning a bound method is dropped
//! - a sender is dropped
//! - a closure receiver is dropped
//!
//! and how `connect_strong` keeps a receiver alive instead.

use relay::panic_handler::setup_tracing;
use relay::prelude::*;

struct Window {
    title: &'static str,
}

impl Window {
    #[receiver]
    fn on_theme(&self, theme: String) -> String {
        format!("{} repainted with {theme}", self.title)
    }
}

fn report(registry: &Registry, label: &str) {
    let stats = registry.stats();
    println!(
        "  [{label}] senders={} connections={} receivers={}",
        stats.senders, stats.connections, stats.receivers
    );
}

fn main() -> Result<(), DispatchError> {
    setup_tracing();
    tracing::info!(example = "lifetimes", "starting");
    let registry = Registry::new();

    println!("bound methods");
    let main_window = Tracked::new(Window { title: "main" });
    let about = Tracked::new(Window { title: "about" });
    registry.connect(Window::on_theme_receiver(&main_window), "theme", ANY_SENDER)?;
    registry.connect(Window::on_theme_receiver(&about), "theme", ANY_SENDER)?;
    report(&registry, "two windows");

    let args = Args::new().with("theme", String::from("dark"));
    for (_, value) in registry.send("theme", ANONYMOUS_SENDER, args.clone())? {
        if let Some(line) = value.downcast_ref::<String>() {
            println!("  {line}");
        }
    }

    drop(about);
    report(&registry, "about closed");
    let responses = registry.send("theme", ANONYMOUS_SENDER, args)?;
    println!("  {} window answered", responses.len());

    println!("senders");
    let socket = Tracked::new(String::from("socket-1"));
    let closed = Function::new("on_closed", Signature::from_static(&[]), |_: &Args| Ok(Value::unit()));
    registry.connect(&closed, "closed", &socket)?;
    report(&registry, "socket watched");
    drop(socket);
    report(&registry, "socket dropped");

    println!("weak and strong closures");
    let weak = Function::new("weak_tick", Signature::from_static(&[]), |_: &Args| {
        println!("  weak tick");
        Ok(Value::unit())
    });
    registry.connect(&weak, "tick", ANY_SENDER)?;
    registry.connect_strong(
        Function::new("strong_tick", Signature::from_static(&[]), |_: &Args| {
            println!("  strong tick");
            Ok(Value::unit())
        }),
        "tick",
        ANY_SENDER,
    )?;
    registry.send("tick", ANONYMOUS_SENDER, Args::new())?;

    drop(weak);
    println!("  after dropping weak_tick:");
    registry.send("tick", ANONYMOUS_SENDER, Args::new())?;

    drop(main_window);
    drop(closed);
    report(&registry, "done");
    Ok(())
}
