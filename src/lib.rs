//! nocsim: a cycle-accurate simulator for 2-D mesh networks-on-chip.
//!
//! The mesh is a grid of tiles, each holding a five-port wormhole
//! router and a processing element. Flits cross inter-router links
//! under an alternating-bit handshake, heads are steered by pluggable
//! routing and selection functions, and per-router statistics track
//! throughput and latency.
//!
//! # Module Organization
//!
//! - [`config`]: simulation parameters, file/env layering, validation
//! - [`network`]: the fabric itself: channels, routers, PEs, the mesh
//!
//! # Example
//!
//! ```
//! use nocsim::config::SimConfig;
//! use nocsim::network::mesh::Mesh;
//!
//! let config = SimConfig {
//!     mesh_dim_x: 2,
//!     mesh_dim_y: 2,
//!     packet_injection_rate: 0.0,
//!     ..SimConfig::default()
//! };
//! let mut mesh = Mesh::new(&config).unwrap();
//! mesh.inject(0, 3, 4);
//! mesh.run(20).unwrap();
//! assert_eq!(mesh.summary().received_packets, 1);
//! ```

pub mod config;
pub mod network;
