//! The simulated network fabric.
//!
//! Modules, leaves first:
//!
//! - [`coord`]: grid coordinates, node ids, port directions
//! - [`flit`]: flits and packets
//! - [`buffer`]: bounded input FIFOs
//! - [`channel`]: double-buffered channel bundles and the link arena
//! - [`routing`]: the routing functions
//! - [`selection`]: the selection functions
//! - [`routing_table`] / [`traffic_table`]: file-driven tables
//! - [`stats`]: per-router delivery statistics
//! - [`router`]: the five-port wormhole router
//! - [`pe`]: the processing element on each local port
//! - [`mesh`]: grid assembly and the cycle driver

pub mod buffer;
pub mod channel;
pub mod coord;
pub mod flit;
pub mod mesh;
pub mod pe;
pub mod router;
pub mod routing;
pub mod routing_table;
pub mod selection;
pub mod stats;
pub mod traffic_table;

use thiserror::Error;

use self::coord::NodeId;

/// Simulation errors.
///
/// Configuration and table problems surface before the first cycle;
/// invariant violations abort the run with the offending router and
/// cycle. Back-pressure and output-busy stalls are not errors, they
/// simply retry next cycle.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read table {path}: {source}")]
    TableIo {
        path: String,
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    TableParse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("router {current}: no admissible output toward node {destination}")]
    EmptyRouting {
        current: NodeId,
        destination: NodeId,
    },

    #[error("router {router} at cycle {cycle}: {message}")]
    Invariant {
        router: NodeId,
        cycle: u64,
        message: String,
    },
}
