use std::any::Any;
use std::io;
use std::panic::UnwindSafe;
use std::sync::Once;
use tracing::info;
use tracing_subscriber::Registry;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
    util::SubscriberInitExt,
};

static INIT: Once = Once::new();

/// Installs a stderr `tracing` subscriber for binaries built on relay.
///
/// The filter comes from `RUST_LOG` with `INFO` as the floor. The library
/// itself only emits events; tests and libraries should leave subscriber
/// setup to the final binary.
///
/// This function should be called only once. Subsequent calls will be ignored.
pub fn setup_tracing() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into());
        let console_layer = fmt::Layer::new().with_writer(io::stderr).with_target(true);

        let installed = Registry::default()
            .with(env_filter)
            .with(console_layer)
            .try_init();

        if installed.is_ok() {
            info!(target: "relay::panic_handler", "tracing subscriber installed");
        }
    });
}

/// Executes a closure and catches any panics that occur, returning a Result.
///
/// # Example
/// ```
/// use relay_core::panic_handler::catch_panic;
///
/// let ok = catch_panic(|| 42);
/// assert!(ok.is_ok());
/// assert_eq!(ok.unwrap(), 42);
///
/// let err = catch_panic(|| panic!("fail!"));
/// assert!(err.is_err());
/// ```
pub fn catch_panic<T, F>(f: F) -> Result<T, Box<dyn Any + Send + 'static>>
where
    F: FnOnce() -> T + UnwindSafe,
{
    std::panic::catch_unwind(f)
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<unknown panic>".to_string()
    }
}
