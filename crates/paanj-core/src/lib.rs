//! Core systems for the Paanj client SDK.
//!
//! This crate provides the pieces of the SDK that do not touch the network:
//!
//! - **Event Registry**: named, ordered handler lists with fire-and-forget dispatch
//! - **Dispatch Policy**: unbounded or semaphore-bounded handler execution
//! - **Logging**: `tracing` target names used across the workspace
//!
//! # Event Registry Example
//!
//! ```
//! use paanj_core::EventRegistry;
//!
//! let registry = EventRegistry::<String>::new();
//!
//! registry.on("greeting", |name| {
//!     println!("Hello, {name}!");
//! });
//!
//! // Outside a tokio runtime handlers run inline on the calling thread.
//! let dispatched = registry.emit("greeting", "world".to_string());
//! assert_eq!(dispatched, 1);
//!
//! // Unknown events are a no-op.
//! assert_eq!(registry.emit("unknown", String::new()), 0);
//! ```

mod error;
pub mod logging;
pub mod registry;

pub use error::{CoreError, Result};
pub use registry::{DispatchPolicy, EventRegistry, Handler};
