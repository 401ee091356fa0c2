//! Beacon Daemon - the aggregating tier of the bus
//!
//! A daemon mirrors the publications of the clients on its node and
//! relays their traffic: schema frames rebuild mirrors, value frames are
//! applied to them and forwarded unchanged both upward (daemon to
//! leader) and outward to matching subscriptions. The leader runs the
//! same service without an upstream.
//!
//! ```text
//! [clients] --> TCP server --> DaemonService --> upstream ring --> leader
//!                                   |
//!                             SubTable fan-out --> subscribers
//! ```

mod error;
mod mirror;
mod server;
mod service;
mod subscription;

pub use error::{DaemonError, Result};
pub use mirror::{ApplyOutcome, MirrorTable};
pub use server::DaemonServer;
pub use service::{DaemonService, ServiceMetrics};
pub use subscription::{Pattern, SubHandle, SubTable};

#[cfg(test)]
mod service_test;
