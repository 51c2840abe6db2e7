//! Mesh assembly and the per-cycle simulation driver.
//!
//! The mesh owns every tile (router plus PE) and the arena of channel
//! bundles that wire them together. Each undirected link between
//! neighbors is two directed channels, one per way; border ports read
//! dedicated channels that nothing ever writes, so they observe the
//! tied-off reset values. The routing functions never select a border
//! direction, so those channels stay idle.
//!
//! A simulated cycle runs three phases over all tiles in a fixed
//! order: receive, transmit, buffer monitor. Channel reads during a
//! phase observe the values latched at the start of the cycle, and all
//! writes are latched together at the end, so any ordering of tiles
//! within a phase produces the same result.

use std::sync::Arc;

use log::{debug, info};

use crate::config::{RoutingAlgorithm, SimConfig, TrafficDistribution};

use super::channel::{LinkArena, LinkId};
use super::coord::{Direction, NodeId, Topology, PORTS};
use super::pe::{PePorts, ProcessingElement};
use super::router::{Router, RouterPorts};
use super::routing_table::GlobalRoutingTable;
use super::traffic_table::GlobalTrafficTable;
use super::SimError;

/// One grid cell: a router and the processing element on its local
/// port.
pub struct Tile {
    pub router: Router,
    pub pe: ProcessingElement,
}

/// Mesh-wide totals, aggregated from the per-router statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshStats {
    pub cycles: u64,
    pub received_flits: u64,
    pub received_packets: u64,
    pub average_delay: f64,
}

impl std::fmt::Display for MeshStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Simulated cycles:  {}", self.cycles)?;
        writeln!(f, "Received flits:    {}", self.received_flits)?;
        writeln!(f, "Received packets:  {}", self.received_packets)?;
        write!(f, "Average delay:     {:.2} cycles", self.average_delay)
    }
}

pub struct Mesh {
    topology: Topology,
    tiles: Vec<Tile>,
    links: LinkArena,
    cycle: u64,
}

impl Mesh {
    /// Validate the configuration, load any tables, and wire the grid.
    pub fn new(config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let topology = Topology::new(config.mesh_dim_x, config.mesh_dim_y);

        let routing_table = match config.routing_algorithm {
            RoutingAlgorithm::TableBased => {
                let path = config.routing_table_path.as_ref().ok_or_else(|| {
                    SimError::Config("table-based routing needs a routing table file".into())
                })?;
                let table = GlobalRoutingTable::load(path)?;
                if !table.is_valid() {
                    return Err(SimError::Config(format!(
                        "routing table {} has no entries",
                        path.display()
                    )));
                }
                Some(table)
            }
            _ => None,
        };

        let traffic_table = match config.traffic_distribution {
            TrafficDistribution::TableBased => {
                let path = config.traffic_table_path.as_ref().ok_or_else(|| {
                    SimError::Config("table-based traffic needs a traffic table file".into())
                })?;
                let table = GlobalTrafficTable::load(path)?;
                if !table.is_valid() {
                    return Err(SimError::Config(format!(
                        "traffic table {} has no entries",
                        path.display()
                    )));
                }
                Some(Arc::new(table))
            }
            _ => None,
        };

        let n = topology.num_tiles();
        let mut links = LinkArena::new();
        let mut tx_links: Vec<[Option<LinkId>; PORTS]> = vec![[None; PORTS]; n];
        let mut rx_links: Vec<[Option<LinkId>; PORTS]> = vec![[None; PORTS]; n];
        let mut pe_tx: Vec<LinkId> = Vec::with_capacity(n);

        // One outgoing channel per router port. The neighbor on the far
        // side receives it on the reflex direction; the local channel is
        // received by this tile's PE.
        for id in 0..n {
            for dir in Direction::ALL {
                let link = links.add();
                tx_links[id][dir.index()] = Some(link);
                if dir == Direction::Local {
                    continue;
                }
                if let Some(neighbor) = topology.neighbor(id, dir) {
                    rx_links[neighbor][dir.reflex().index()] = Some(link);
                }
            }
        }
        // PE-to-router channels close the local loop.
        for id in 0..n {
            let link = links.add();
            rx_links[id][Direction::Local.index()] = Some(link);
            pe_tx.push(link);
        }
        // Border ports read channels nothing writes: req and ack stay
        // low, buffer level zero, NoP sender invalid.
        for ports in rx_links.iter_mut() {
            for dir in Direction::CARDINALS {
                if ports[dir.index()].is_none() {
                    ports[dir.index()] = Some(links.add());
                }
            }
        }

        let mut tiles = Vec::with_capacity(n);
        for id in 0..n {
            let ports = RouterPorts {
                rx: std::array::from_fn(|d| rx_links[id][d].expect("every port is wired")),
                tx: std::array::from_fn(|d| tx_links[id][d].expect("every port is wired")),
            };
            let mut router = Router::new(topology, ports, config);
            router.configure(id, config.stats_warm_up_time, routing_table.as_ref());

            let pe_ports = PePorts {
                tx: pe_tx[id],
                rx: ports.tx[Direction::Local.index()],
            };
            let mut pe = ProcessingElement::new(topology, pe_ports, config);
            pe.configure(id, traffic_table.clone());

            tiles.push(Tile { router, pe });
        }

        info!(
            "built {}x{} mesh: {} tiles, {} channels",
            topology.dim_x(),
            topology.dim_y(),
            n,
            links.len()
        );

        Ok(Self {
            topology,
            tiles,
            links,
            cycle: 0,
        })
    }

    /// Advance one cycle: receive, transmit, monitor, latch.
    pub fn step(&mut self) -> Result<(), SimError> {
        let cycle = self.cycle;

        for tile in &mut self.tiles {
            tile.router.rx_process(&mut self.links, cycle);
            tile.pe.rx_process(&mut self.links, cycle);
        }
        for tile in &mut self.tiles {
            tile.router.tx_process(&mut self.links, cycle)?;
            tile.pe.tx_process(&mut self.links, cycle);
        }
        for tile in &mut self.tiles {
            tile.router.buffer_monitor(&mut self.links);
        }

        self.links.latch_all();
        self.cycle += 1;
        Ok(())
    }

    /// Run for `cycles` more cycles.
    pub fn run(&mut self, cycles: u64) -> Result<(), SimError> {
        debug!("running {cycles} cycles from cycle {}", self.cycle);
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }

    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn router(&self, id: NodeId) -> &Router {
        &self.tiles[id].router
    }

    pub fn pe(&self, id: NodeId) -> &ProcessingElement {
        &self.tiles[id].pe
    }

    pub fn pe_mut(&mut self, id: NodeId) -> &mut ProcessingElement {
        &mut self.tiles[id].pe
    }

    /// Queue a packet at a source PE, stamped with the current cycle.
    pub fn inject(&mut self, src_id: NodeId, dst_id: NodeId, size: usize) {
        let cycle = self.cycle;
        self.tiles[src_id].pe.queue_packet(dst_id, size, cycle);
    }

    /// Aggregate the per-router statistics.
    pub fn summary(&self) -> MeshStats {
        let mut received_flits = 0u64;
        let mut received_packets = 0u64;
        let mut weighted_delay = 0.0f64;
        for tile in &self.tiles {
            let stats = tile.router.stats();
            received_flits += stats.received_flits();
            received_packets += stats.received_packets();
            weighted_delay += stats.average_delay() * stats.received_flits() as f64;
        }
        let average_delay = if received_flits == 0 {
            0.0
        } else {
            weighted_delay / received_flits as f64
        };
        MeshStats {
            cycles: self.cycle,
            received_flits,
            received_packets,
            average_delay,
        }
    }
}
