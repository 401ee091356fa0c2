//! Beacon Client Library
//!
//! The runtime an instrumented process embeds to publish observations:
//!
//! ```ignore
//! use beacon_client::Runtime;
//! use beacon_config::Config;
//! use beacon_protocol::{Metadata, ValueType};
//!
//! let runtime = Runtime::connect(Config::from_file("beacon.toml")?).await?;
//!
//! let timings = runtime.new_pub("solver.timings")?;
//! timings.add_element("iteration", ValueType::Integer, Metadata::default())?;
//! timings.add_element("residual", ValueType::Double, Metadata::default())?;
//! timings.announce()?;
//!
//! timings.publish("iteration", 42i64)?;
//! timings.publish("residual", 1.5e-9)?;
//! // values travel on the next flush tick; or force one:
//! timings.publish_immediately("residual", 2.0e-9)?;
//!
//! runtime.finalize().await;
//! ```
//!
//! # Architecture
//!
//! - [`Runtime`] - process-wide state: role, config, id allocator, socket
//!   set, publication table, background tasks. An explicit context object;
//!   create as many as you like (tests run several side by side)
//! - [`PubHandle`] - cloneable handle to one publication; `publish` only
//!   touches memory, background tasks do all I/O
//! - [`UidAllocator`] - collision-free id issue, seeded from the daemon's
//!   guid block grant when connected

mod error;
mod handle;
mod runtime;
mod uid;

pub use error::{ClientError, Result};
pub use handle::PubHandle;
pub use runtime::{LifecycleState, Runtime};
pub use uid::UidAllocator;

// Re-export the types callers need to describe publications
pub use beacon_protocol::{
    Class, Layer, Metadata, Nature, Priority, Retention, Scope, Semantic, Value, ValueData,
    ValueType,
};

// Test modules - only compiled during testing
#[cfg(test)]
mod runtime_test;
