//! The processing element behind each router's local port.
//!
//! The PE is just another link peer: it injects packets flit by flit
//! over its outbound channel under the alternating-bit handshake, and
//! sinks whatever the router delivers on the inbound one. Traffic is
//! generated by a Bernoulli trial per cycle at the configured injection
//! rate, with destinations drawn uniformly or from the traffic table.

use std::collections::VecDeque;
use std::sync::Arc;

use log::trace;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::{SimConfig, TrafficDistribution};

use super::channel::{LinkArena, LinkId};
use super::coord::{NodeId, Topology};
use super::flit::{Flit, Packet};
use super::traffic_table::GlobalTrafficTable;

/// Seed stream tag so a PE never shares its router's RNG sequence.
const PE_SEED_STREAM: u64 = 1 << 63;

/// Channel indices of the PE's two local links.
#[derive(Debug, Clone, Copy)]
pub struct PePorts {
    /// PE-to-router channel; the PE is the transmitter.
    pub tx: LinkId,
    /// Router-to-PE channel; the PE is the receiver.
    pub rx: LinkId,
}

pub struct ProcessingElement {
    id: NodeId,
    topology: Topology,
    ports: PePorts,
    current_level_tx: bool,
    current_level_rx: bool,
    queue: VecDeque<Packet>,
    injection_rate: f64,
    min_packet_size: usize,
    max_packet_size: usize,
    traffic: TrafficDistribution,
    traffic_table: Option<Arc<GlobalTrafficTable>>,
    occurrences_as_source: usize,
    seed: u64,
    rng: Xoshiro256PlusPlus,
    /// When false the PE stops accepting deliveries, which backs
    /// pressure up into the mesh.
    sink_enabled: bool,
    received: Vec<(u64, Flit)>,
}

impl ProcessingElement {
    pub fn new(topology: Topology, ports: PePorts, config: &SimConfig) -> Self {
        Self {
            id: 0,
            topology,
            ports,
            current_level_tx: false,
            current_level_rx: false,
            queue: VecDeque::new(),
            injection_rate: config.packet_injection_rate,
            min_packet_size: config.min_packet_size,
            max_packet_size: config.max_packet_size,
            traffic: config.traffic_distribution,
            traffic_table: None,
            occurrences_as_source: 0,
            seed: config.rnd_seed,
            rng: Xoshiro256PlusPlus::seed_from_u64(config.rnd_seed ^ PE_SEED_STREAM),
            sink_enabled: true,
            received: Vec::new(),
        }
    }

    /// Give the PE its identity and, for table-driven traffic, the
    /// shared traffic table.
    pub fn configure(&mut self, id: NodeId, traffic_table: Option<Arc<GlobalTrafficTable>>) {
        self.id = id;
        self.rng = Xoshiro256PlusPlus::seed_from_u64(self.seed ^ id as u64 ^ PE_SEED_STREAM);
        self.occurrences_as_source = traffic_table
            .as_deref()
            .map(|table| table.occurrences_as_source(id))
            .unwrap_or(0);
        self.traffic_table = traffic_table;
    }

    /// Queue a packet directly, bypassing the traffic generator.
    pub fn queue_packet(&mut self, dst_id: NodeId, size: usize, cycle: u64) {
        self.queue.push_back(Packet::new(self.id, dst_id, cycle, size));
    }

    /// Whether this cycle injects a new packet.
    fn can_shot(&mut self) -> bool {
        if self.injection_rate <= 0.0 {
            return false;
        }
        if self.traffic == TrafficDistribution::TableBased && self.occurrences_as_source == 0 {
            return false;
        }
        self.rng.gen::<f64>() < self.injection_rate
    }

    fn pick_destination(&mut self) -> Option<NodeId> {
        match self.traffic {
            TrafficDistribution::Random => {
                let n = self.topology.num_tiles();
                if n < 2 {
                    return None;
                }
                // uniform over all other nodes
                let mut dst = self.rng.gen_range(0..n - 1);
                if dst >= self.id {
                    dst += 1;
                }
                Some(dst)
            }
            TrafficDistribution::TableBased => self
                .traffic_table
                .as_deref()
                .and_then(|table| table.sample_destination(self.id, &mut self.rng)),
        }
    }

    fn pick_size(&mut self) -> usize {
        self.rng.gen_range(self.min_packet_size..=self.max_packet_size)
    }

    /// Transmit process: maybe inject a packet, then offer the next
    /// flit once the previous transfer completed.
    pub fn tx_process(&mut self, links: &mut LinkArena, cycle: u64) {
        if self.can_shot() {
            if let Some(dst) = self.pick_destination() {
                let size = self.pick_size();
                trace!("cycle {cycle}: pe {} injects {size}-flit packet to {dst}", self.id);
                self.queue.push_back(Packet::new(self.id, dst, cycle, size));
            }
        }

        if links.rev(self.ports.tx).ack != self.current_level_tx {
            // previous transfer not acknowledged yet
            return;
        }
        if let Some(packet) = self.queue.front_mut() {
            let flit = packet.next_flit();
            if packet.exhausted() {
                self.queue.pop_front();
            }
            self.current_level_tx = !self.current_level_tx;
            let out = links.fwd_mut(self.ports.tx);
            out.flit = Some(flit);
            out.req = self.current_level_tx;
            trace!("cycle {cycle}: pe {} sent {flit}", self.id);
        }
    }

    /// Receive process: sink one delivered flit per cycle.
    pub fn rx_process(&mut self, links: &mut LinkArena, cycle: u64) {
        let fwd = *links.fwd(self.ports.rx);
        if self.sink_enabled && fwd.req == !self.current_level_rx {
            if let Some(flit) = fwd.flit {
                trace!("cycle {cycle}: pe {} consumed {flit}", self.id);
                self.received.push((cycle, flit));
                self.current_level_rx = !self.current_level_rx;
            }
        }
        links.rev_mut(self.ports.rx).ack = self.current_level_rx;
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Flits consumed so far, with the cycle each arrived.
    pub fn received(&self) -> &[(u64, Flit)] {
        &self.received
    }

    /// Packets queued or in flight at this PE.
    pub fn pending_packets(&self) -> usize {
        self.queue.len()
    }

    /// Stop or resume draining deliveries.
    pub fn set_sink_enabled(&mut self, enabled: bool) {
        self.sink_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::flit::FlitKind;

    fn harness(config: &SimConfig) -> (ProcessingElement, LinkArena) {
        let topology = Topology::new(config.mesh_dim_x, config.mesh_dim_y);
        let mut links = LinkArena::new();
        let ports = PePorts {
            tx: links.add(),
            rx: links.add(),
        };
        let mut pe = ProcessingElement::new(topology, ports, config);
        pe.configure(0, None);
        (pe, links)
    }

    #[test]
    fn test_sends_queued_packet_flit_by_flit() {
        let config = SimConfig {
            packet_injection_rate: 0.0,
            ..SimConfig::default()
        };
        let (mut pe, mut links) = harness(&config);
        pe.queue_packet(3, 2, 0);

        pe.tx_process(&mut links, 0);
        links.latch_all();
        let head = links.fwd(pe.ports.tx).flit.unwrap();
        assert_eq!(head.kind, FlitKind::Head);
        assert!(links.fwd(pe.ports.tx).req);

        // Without an ack the tail waits.
        pe.tx_process(&mut links, 1);
        links.latch_all();
        assert_eq!(links.fwd(pe.ports.tx).flit.unwrap().kind, FlitKind::Head);

        links.rev_mut(pe.ports.tx).ack = true;
        links.latch_all();
        pe.tx_process(&mut links, 2);
        links.latch_all();
        assert_eq!(links.fwd(pe.ports.tx).flit.unwrap().kind, FlitKind::Tail);
        assert_eq!(pe.pending_packets(), 0);
    }

    #[test]
    fn test_sink_records_and_acks() {
        let config = SimConfig::default();
        let (mut pe, mut links) = harness(&config);

        let flit = Packet::new(3, 0, 5, 1).next_flit();
        let fwd = links.fwd_mut(pe.ports.rx);
        fwd.flit = Some(flit);
        fwd.req = true;
        links.latch_all();

        pe.rx_process(&mut links, 7);
        links.latch_all();

        assert_eq!(pe.received(), &[(7, flit)]);
        assert!(links.rev(pe.ports.rx).ack);
    }

    #[test]
    fn test_disabled_sink_holds_ack() {
        let config = SimConfig::default();
        let (mut pe, mut links) = harness(&config);
        pe.set_sink_enabled(false);

        let flit = Packet::new(3, 0, 5, 1).next_flit();
        let fwd = links.fwd_mut(pe.ports.rx);
        fwd.flit = Some(flit);
        fwd.req = true;
        links.latch_all();

        pe.rx_process(&mut links, 7);
        links.latch_all();

        assert!(pe.received().is_empty());
        assert!(!links.rev(pe.ports.rx).ack);
    }

    #[test]
    fn test_random_traffic_never_targets_self() {
        let config = SimConfig {
            packet_injection_rate: 1.0,
            min_packet_size: 1,
            max_packet_size: 1,
            ..SimConfig::default()
        };
        let (mut pe, mut links) = harness(&config);
        for cycle in 0..64 {
            pe.tx_process(&mut links, cycle);
            links.latch_all();
            // absorb the transfer so the next one can start
            let ack = links.fwd(pe.ports.tx).req;
            links.rev_mut(pe.ports.tx).ack = ack;
            links.latch_all();
            if let Some(flit) = links.fwd(pe.ports.tx).flit {
                assert_ne!(flit.dst_id, 0);
                assert!(flit.dst_id < pe.topology.num_tiles());
            }
        }
    }

    #[test]
    fn test_zero_rate_stays_silent() {
        let config = SimConfig {
            packet_injection_rate: 0.0,
            ..SimConfig::default()
        };
        let (mut pe, mut links) = harness(&config);
        for cycle in 0..32 {
            pe.tx_process(&mut links, cycle);
            links.latch_all();
        }
        assert!(links.fwd(pe.ports.tx).flit.is_none());
        assert_eq!(pe.pending_packets(), 0);
    }
}
