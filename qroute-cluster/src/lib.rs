//! qroute cluster - job dispatch across cooperating server instances
//!
//! Jobs in a sharded cluster may live on any instance and may move between
//! instances at any time. This crate locates, moves and reorders jobs across
//! such a cluster.
//!
//! # Architecture
//!
//! - **Transport**: request/reply primitive over one connection (framed TCP, or any
//!   implementation of [`Transport`])
//! - **ServerInstance**: one cluster member; serializes requests on its connection
//! - **LocationHint**: advisory cache of the instance that last answered for a job
//! - **ClusterDispatcher**: locate / move / order with round-robin fan-out and
//!   relocate-and-retry on "unknown job id"
//! - **InstanceServer**: instance-side request loop over a [`BatchHandler`]

pub mod config;
pub mod cycle;
pub mod error;
pub mod hint;
pub mod metrics;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

mod dispatcher;
mod instance;
mod server;

pub use config::{ConfigError, DispatchConfig};
pub use cycle::CyclicIndices;
pub use dispatcher::{Cluster, ClusterDispatcher};
pub use error::{DispatchError, Result, StatusCode};
pub use hint::LocationHint;
pub use instance::ServerInstance;
pub use server::{BatchHandler, InstanceServer};
pub use transport::{FramedTransport, Transport, TransportError};
pub use types::*;
