//! relay: in-process signal dispatch with automatic lifetime management.
//!
//! Receivers subscribe to (signal, sender) pairs on a [`Registry`]. The
//! registry never keeps a weakly connected receiver or a tracked sender
//! alive; when either is dropped, its connections go away with it.
//!
//! ```rust
//! use relay::prelude::*;
//!
//! #[receiver]
//! fn on_saved(path: String) -> usize {
//!     path.len()
//! }
//!
//! let registry = Registry::new();
//! let document = Tracked::new(String::from("notes"));
//! registry.connect(on_saved(), "saved", &document).unwrap();
//!
//! let responses = registry
//!     .send("saved", &document, Args::new().with("path", String::from("a.txt")))
//!     .unwrap();
//! assert_eq!(responses[0].1.downcast_ref::<usize>(), Some(&5));
//!
//! drop(document);
//! assert!(registry.is_clean());
//! assert_eq!(registry.stats().connections, 0);
//! ```

pub use relay_core::*;

#[cfg(feature = "macros")]
pub use relay_core_macros::receiver;

pub mod prelude {
    pub use super::*;
    pub use relay_core::dispatcher::global;
}
