//! The five-port wormhole router.
//!
//! Each cycle a router runs three processes in mesh-wide phase order:
//!
//! 1. **receive**: independently per input port, accept an incoming
//!    flit when the alternating-bit request matches and the port's
//!    buffer has room, then drive the acknowledge level back.
//! 2. **transmit**: walk the input ports starting from a direction that
//!    rotates every cycle, route head flits, reserve crossbar outputs,
//!    and forward one flit per free output whose previous transfer has
//!    completed. The head of a packet reserves an output; body flits
//!    follow the recorded short-circuit; the tail releases it.
//! 3. **buffer monitor**: publish input buffer occupancy and the NoP
//!    advertisement for neighbors, when the selection strategy uses
//!    them.
//!
//! All channel reads observe values latched at the start of the cycle;
//! all channel writes become visible the next cycle.

use log::trace;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::{RoutingAlgorithm, SelectionStrategy, SimConfig};

use super::buffer::InputBuffer;
use super::channel::{ChannelStatus, LinkArena, LinkId, NopAdvertisement};
use super::coord::{Direction, NodeId, Topology, DIRECTIONS, PORTS};
use super::flit::Flit;
use super::routing::{self, RouteData};
use super::routing_table::{GlobalRoutingTable, LocalRoutingTable};
use super::selection::{self, SelectionView};
use super::stats::RouterStats;
use super::SimError;

/// Channel indices for the five input and five output ports, assigned
/// by the mesh at wiring time.
#[derive(Debug, Clone, Copy)]
pub struct RouterPorts {
    /// Inbound channel per direction; the router is the receiver.
    pub rx: [LinkId; PORTS],
    /// Outbound channel per direction; the router is the transmitter.
    pub tx: [LinkId; PORTS],
}

pub struct Router {
    local_id: NodeId,
    topology: Topology,
    algorithm: RoutingAlgorithm,
    strategy: SelectionStrategy,
    buffer_depth: usize,
    seed: u64,
    ports: RouterPorts,
    buffers: [InputBuffer; PORTS],
    /// Alternating-bit receive level per input port.
    current_level_rx: [bool; PORTS],
    /// Alternating-bit transmit level per output port.
    current_level_tx: [bool; PORTS],
    /// Which input direction holds each output, if any.
    reservation_table: [Option<Direction>; PORTS],
    /// The output each input's open wormhole was routed to.
    short_circuit: [Option<Direction>; PORTS],
    /// Rotating arbitration start, one step per transmit cycle.
    start_from_port: usize,
    local_table: Option<LocalRoutingTable>,
    stats: RouterStats,
    rng: Xoshiro256PlusPlus,
}

impl Router {
    pub fn new(topology: Topology, ports: RouterPorts, config: &SimConfig) -> Self {
        let buffers = std::array::from_fn(|_| InputBuffer::new(config.buffer_depth));
        Self {
            local_id: 0,
            topology,
            algorithm: config.routing_algorithm,
            strategy: config.selection_strategy,
            buffer_depth: config.buffer_depth,
            seed: config.rnd_seed,
            ports,
            buffers,
            current_level_rx: [false; PORTS],
            current_level_tx: [false; PORTS],
            reservation_table: [None; PORTS],
            short_circuit: [None; PORTS],
            start_from_port: 0,
            local_table: None,
            stats: RouterStats::default(),
            rng: Xoshiro256PlusPlus::seed_from_u64(config.rnd_seed),
        }
    }

    /// Give the router its identity, warm-up time, and routing table
    /// slice. Reseeds the selection RNG so runs are reproducible per
    /// router.
    pub fn configure(
        &mut self,
        local_id: NodeId,
        warm_up_time: u64,
        routing_table: Option<&GlobalRoutingTable>,
    ) {
        self.local_id = local_id;
        self.stats.configure(local_id, warm_up_time);
        self.rng = Xoshiro256PlusPlus::seed_from_u64(self.seed ^ local_id as u64);
        self.local_table = routing_table
            .filter(|table| table.is_valid())
            .map(|table| table.local_table(local_id));
    }

    /// Return to the power-on state and drive all output lines low.
    pub fn reset(&mut self, links: &mut LinkArena) {
        for i in 0..PORTS {
            self.buffers[i].clear();
            self.current_level_rx[i] = false;
            self.current_level_tx[i] = false;
            self.reservation_table[i] = None;
            self.short_circuit[i] = None;
            links.rev_mut(self.ports.rx[i]).ack = false;
            links.rev_mut(self.ports.rx[i]).buffer_level = 0;
            let fwd = links.fwd_mut(self.ports.tx[i]);
            fwd.req = false;
            fwd.flit = None;
        }
        self.start_from_port = 0;
    }

    /// Receive process: accept at most one flit per input port.
    ///
    /// The ports are independent; all arbitration happens on the
    /// transmit side.
    pub fn rx_process(&mut self, links: &mut LinkArena, cycle: u64) {
        for i in 0..PORTS {
            let link = self.ports.rx[i];
            let fwd = *links.fwd(link);

            // Accept when there is a new request and the buffer has room.
            if fwd.req == !self.current_level_rx[i] && !self.buffers[i].is_full() {
                if let Some(mut flit) = fwd.flit {
                    trace!(
                        "cycle {cycle}: router {} received {flit} on {}",
                        self.local_id,
                        Direction::from_index(i)
                    );
                    flit.hop_no += 1;
                    let pushed = self.buffers[i].push(flit);
                    debug_assert!(pushed);
                    self.current_level_rx[i] = !self.current_level_rx[i];
                }
            }
            links.rev_mut(link).ack = self.current_level_rx[i];
        }
    }

    /// Transmit process: crossbar arbitration and wormhole forwarding.
    pub fn tx_process(&mut self, links: &mut LinkArena, cycle: u64) -> Result<(), SimError> {
        for j in 0..PORTS {
            let i = (self.start_from_port + j) % PORTS;
            let Some(&flit) = self.buffers[i].front() else {
                continue;
            };
            let dir_in = Direction::from_index(i);

            let dest = if flit.kind.is_head() {
                match self.open_wormhole(dir_in) {
                    // Reserved in an earlier cycle; still waiting on the link.
                    Some(dest) => dest,
                    None => {
                        let dest = self.route(links, &flit, dir_in, cycle)?;
                        if self.reservation_table[dest.index()].is_none() {
                            self.short_circuit[i] = Some(dest);
                            self.reservation_table[dest.index()] = Some(dir_in);
                        }
                        dest
                    }
                }
            } else {
                self.short_circuit[i].ok_or_else(|| SimError::Invariant {
                    router: self.local_id,
                    cycle,
                    message: format!("{flit} on input {dir_in} outside any wormhole"),
                })?
            };

            // Forward only through an output this input holds, and only
            // once the previous transfer on it completed.
            if self.reservation_table[dest.index()] != Some(dir_in) {
                continue;
            }
            let out_link = self.ports.tx[dest.index()];
            if links.rev(out_link).ack != self.current_level_tx[dest.index()] {
                continue;
            }

            let level = !self.current_level_tx[dest.index()];
            self.current_level_tx[dest.index()] = level;
            let out = links.fwd_mut(out_link);
            out.flit = Some(flit);
            out.req = level;
            self.buffers[i].pop();
            trace!(
                "cycle {cycle}: router {} sent {flit} from {dir_in} to {dest}",
                self.local_id
            );

            if flit.kind.is_tail() {
                self.reservation_table[dest.index()] = None;
                self.short_circuit[i] = None;
            }
            if dest == Direction::Local {
                self.stats.received_flit(cycle, &flit);
            }
        }
        self.start_from_port = (self.start_from_port + 1) % PORTS;
        Ok(())
    }

    /// Publish buffer occupancy and the NoP advertisement.
    ///
    /// Only meaningful for selection strategies that read them; with
    /// random selection the lines stay at their reset values.
    pub fn buffer_monitor(&mut self, links: &mut LinkArena) {
        if !matches!(
            self.strategy,
            SelectionStrategy::BufferLevel | SelectionStrategy::Nop
        ) {
            return;
        }

        for i in 0..PORTS {
            links.rev_mut(self.ports.rx[i]).buffer_level = self.buffers[i].len() as u32;
        }

        let advert = self.current_nop_data(links);
        for i in 0..DIRECTIONS {
            links.rev_mut(self.ports.rx[i]).nop = advert;
        }
    }

    /// The NoP advertisement for this cycle: per external output, the
    /// downstream occupancy last advertised by that neighbor and
    /// whether the output is unreserved.
    pub fn current_nop_data(&self, links: &LinkArena) -> NopAdvertisement {
        let mut channels = [ChannelStatus::default(); DIRECTIONS];
        for (j, status) in channels.iter_mut().enumerate() {
            *status = ChannelStatus {
                buffer_level: links.rev(self.ports.tx[j]).buffer_level,
                available: self.reservation_table[j].is_none(),
            };
        }
        NopAdvertisement {
            sender_id: Some(self.local_id),
            channels,
        }
    }

    /// The output already held by an active wormhole on `dir_in`.
    fn open_wormhole(&self, dir_in: Direction) -> Option<Direction> {
        self.short_circuit[dir_in.index()]
            .filter(|dest| self.reservation_table[dest.index()] == Some(dir_in))
    }

    /// Route a head flit: local delivery short-circuit, then routing
    /// function plus selection function.
    fn route(
        &mut self,
        links: &LinkArena,
        flit: &Flit,
        dir_in: Direction,
        cycle: u64,
    ) -> Result<Direction, SimError> {
        if flit.dst_id == self.local_id {
            return Ok(Direction::Local);
        }

        let data = RouteData {
            current_id: self.local_id,
            src_id: flit.src_id,
            dst_id: flit.dst_id,
            dir_in,
        };
        let candidates = routing::admissible_outputs(
            &self.topology,
            self.algorithm,
            self.local_table.as_ref(),
            &data,
        )
        .map_err(|error| SimError::Invariant {
            router: self.local_id,
            cycle,
            message: error.to_string(),
        })?;

        let view = self.selection_view(links);
        Ok(selection::select(
            self.strategy,
            &candidates,
            &data,
            &view,
            &mut self.rng,
        ))
    }

    fn selection_view(&self, links: &LinkArena) -> SelectionView {
        let mut output_free = [false; PORTS];
        for (d, free) in output_free.iter_mut().enumerate() {
            *free = self.reservation_table[d].is_none();
        }

        let mut neighbor_buffer_level = [0u32; DIRECTIONS];
        let mut nop = [NopAdvertisement::default(); DIRECTIONS];
        for d in 0..DIRECTIONS {
            let rev = links.rev(self.ports.tx[d]);
            neighbor_buffer_level[d] = rev.buffer_level;
            nop[d] = rev.nop;
        }

        SelectionView {
            topology: self.topology,
            algorithm: self.algorithm,
            buffer_depth: self.buffer_depth,
            output_free,
            neighbor_buffer_level,
            nop,
        }
    }

    #[inline]
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn ports(&self) -> &RouterPorts {
        &self.ports
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// The input buffer of one port.
    pub fn buffer(&self, direction: Direction) -> &InputBuffer {
        &self.buffers[direction.index()]
    }

    /// Which input currently holds the given output, if any.
    pub fn reservation(&self, output: Direction) -> Option<Direction> {
        self.reservation_table[output.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::flit::{FlitKind, Packet};

    /// A lone router with freshly allocated channels on every port.
    fn harness(buffer_depth: usize) -> (Router, LinkArena) {
        let config = SimConfig {
            mesh_dim_x: 3,
            mesh_dim_y: 3,
            buffer_depth,
            ..SimConfig::default()
        };
        let topology = Topology::new(3, 3);
        let mut links = LinkArena::new();
        let rx = std::array::from_fn(|_| links.add());
        let tx = std::array::from_fn(|_| links.add());
        let mut router = Router::new(topology, RouterPorts { rx, tx }, &config);
        // center tile of the 3x3 mesh
        router.configure(4, 0, None);
        (router, links)
    }

    fn flit_to(dst: NodeId) -> Flit {
        Packet::new(0, dst, 0, 1).next_flit()
    }

    /// Drive a flit onto an input port's channel, as the upstream
    /// transmitter would, and latch.
    fn offer(links: &mut LinkArena, router: &Router, dir: Direction, flit: Flit, level: bool) {
        let link = router.ports.rx[dir.index()];
        let fwd = links.fwd_mut(link);
        fwd.flit = Some(flit);
        fwd.req = level;
        links.latch_all();
    }

    #[test]
    fn test_rx_accepts_and_toggles_ack() {
        let (mut router, mut links) = harness(4);
        offer(&mut links, &router, Direction::West, flit_to(4), true);

        router.rx_process(&mut links, 0);
        links.latch_all();

        assert_eq!(router.buffer(Direction::West).len(), 1);
        assert!(links.rev(router.ports.rx[Direction::West.index()]).ack);
    }

    #[test]
    fn test_rx_ignores_stale_request() {
        let (mut router, mut links) = harness(4);
        offer(&mut links, &router, Direction::West, flit_to(4), true);
        router.rx_process(&mut links, 0);
        links.latch_all();

        // Same request level again: no new transfer.
        router.rx_process(&mut links, 1);
        assert_eq!(router.buffer(Direction::West).len(), 1);
    }

    #[test]
    fn test_rx_full_buffer_holds_ack() {
        let (mut router, mut links) = harness(1);
        offer(&mut links, &router, Direction::West, flit_to(4), true);
        router.rx_process(&mut links, 0);
        links.latch_all();
        assert!(router.buffer(Direction::West).is_full());

        // Second transfer arrives while the buffer is full.
        offer(&mut links, &router, Direction::West, flit_to(4), false);
        router.rx_process(&mut links, 1);
        links.latch_all();

        assert_eq!(router.buffer(Direction::West).len(), 1);
        // Ack stays at the level of the first accept.
        assert!(links.rev(router.ports.rx[Direction::West.index()]).ack);

        // Drain and retry: now it goes through.
        let _ = router.buffers[Direction::West.index()].pop();
        router.rx_process(&mut links, 2);
        links.latch_all();
        assert_eq!(router.buffer(Direction::West).len(), 1);
        assert!(!links.rev(router.ports.rx[Direction::West.index()]).ack);
    }

    #[test]
    fn test_tx_delivers_locally_and_counts() {
        let (mut router, mut links) = harness(4);
        router.buffers[Direction::West.index()].push(flit_to(4));

        router.tx_process(&mut links, 5).unwrap();
        links.latch_all();

        let out = links.fwd(router.ports.tx[Direction::Local.index()]);
        assert!(out.req);
        assert_eq!(out.flit.map(|f| f.dst_id), Some(4));
        assert_eq!(router.stats().received_flits(), 1);
        assert_eq!(router.stats().received_packets(), 1);
        // single-flit packet: reservation released immediately
        assert_eq!(router.reservation(Direction::Local), None);
    }

    #[test]
    fn test_tx_routes_xy_east() {
        let (mut router, mut links) = harness(4);
        // from center (1,1) toward (2,1) = id 5
        router.buffers[Direction::Local.index()].push(flit_to(5));

        router.tx_process(&mut links, 0).unwrap();
        links.latch_all();

        let out = links.fwd(router.ports.tx[Direction::East.index()]);
        assert_eq!(out.flit.map(|f| f.dst_id), Some(5));
    }

    #[test]
    fn test_tx_waits_for_ack_before_next_transfer() {
        let (mut router, mut links) = harness(4);
        let mut packet = Packet::new(0, 5, 0, 2);
        router.buffers[Direction::West.index()].push(packet.next_flit());
        router.buffers[Direction::West.index()].push(packet.next_flit());

        router.tx_process(&mut links, 0).unwrap();
        links.latch_all();
        assert_eq!(router.buffer(Direction::West).len(), 1);

        // No ack yet: the tail must wait.
        router.tx_process(&mut links, 1).unwrap();
        links.latch_all();
        assert_eq!(router.buffer(Direction::West).len(), 1);
        // Wormhole still open across the stall.
        assert_eq!(router.reservation(Direction::East), Some(Direction::West));

        // Downstream acknowledges; the tail goes and the hole closes.
        links.rev_mut(router.ports.tx[Direction::East.index()]).ack = true;
        links.latch_all();
        router.tx_process(&mut links, 2).unwrap();
        assert_eq!(router.buffer(Direction::West).len(), 0);
        assert_eq!(router.reservation(Direction::East), None);
    }

    #[test]
    fn test_tx_head_stalls_on_busy_output() {
        let (mut router, mut links) = harness(4);
        // A worm from West holds the East output...
        let mut worm = Packet::new(0, 5, 0, 3);
        router.buffers[Direction::West.index()].push(worm.next_flit());
        router.tx_process(&mut links, 0).unwrap();
        assert_eq!(router.reservation(Direction::East), Some(Direction::West));

        // ...so a head from Local wanting East must stall.
        router.buffers[Direction::Local.index()].push(flit_to(5));
        router.tx_process(&mut links, 1).unwrap();
        assert_eq!(router.buffer(Direction::Local).len(), 1);
        assert_eq!(router.reservation(Direction::East), Some(Direction::West));
    }

    #[test]
    fn test_body_follows_short_circuit_not_routing() {
        let (mut router, mut links) = harness(4);
        let mut packet = Packet::new(0, 5, 0, 3);
        let head = packet.next_flit();
        let body = packet.next_flit();
        let tail = packet.next_flit();

        router.buffers[Direction::West.index()].push(head);
        router.tx_process(&mut links, 0).unwrap();
        links.latch_all();

        // ack each transfer so the worm advances one flit per call
        for (cycle, flit) in [(1, body), (2, tail)] {
            let link = router.ports.tx[Direction::East.index()];
            let req = links.fwd(link).req;
            links.rev_mut(link).ack = req;
            links.latch_all();
            router.buffers[Direction::West.index()].push(flit);
            router.tx_process(&mut links, cycle).unwrap();
            links.latch_all();
            let sent = links.fwd(link).flit.unwrap();
            assert_eq!(sent.sequence_no, flit.sequence_no);
        }
        assert_eq!(router.reservation(Direction::East), None);
    }

    #[test]
    fn test_body_without_wormhole_is_fatal() {
        let (mut router, mut links) = harness(4);
        let mut packet = Packet::new(0, 5, 0, 3);
        let _head = packet.next_flit();
        let body = packet.next_flit();
        router.buffers[Direction::West.index()].push(body);

        let err = router.tx_process(&mut links, 9).unwrap_err();
        match err {
            SimError::Invariant { router: id, cycle, .. } => {
                assert_eq!(id, 4);
                assert_eq!(cycle, 9);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_round_robin_start_rotates() {
        let (mut router, mut links) = harness(4);
        // Two single-flit packets from different inputs race for East.
        router.buffers[Direction::West.index()].push(flit_to(5));
        router.buffers[Direction::Local.index()].push(Packet::new(4, 5, 0, 1).next_flit());

        // cycle 0 starts at port 0 (North): West (index 3) wins East,
        // and the Local head stalls on the pending transfer.
        router.tx_process(&mut links, 0).unwrap();
        links.latch_all();
        assert_eq!(
            links.fwd(router.ports.tx[Direction::East.index()])
                .flit
                .unwrap()
                .src_id,
            0
        );
        assert_eq!(router.buffer(Direction::West).len(), 0);
        assert_eq!(router.buffer(Direction::Local).len(), 1);
    }

    #[test]
    fn test_nop_advertisement_reflects_reservations() {
        let (mut router, mut links) = harness(4);
        links
            .rev_mut(router.ports.tx[Direction::East.index()])
            .buffer_level = 3;
        links.latch_all();

        let mut worm = Packet::new(0, 5, 0, 2);
        router.buffers[Direction::West.index()].push(worm.next_flit());
        router.tx_process(&mut links, 0).unwrap();

        let advert = router.current_nop_data(&links);
        assert_eq!(advert.sender_id, Some(4));
        assert!(!advert.channels[Direction::East.index()].available);
        assert_eq!(advert.channels[Direction::East.index()].buffer_level, 3);
        assert!(advert.channels[Direction::North.index()].available);
    }

    #[test]
    fn test_buffer_monitor_publishes_levels() {
        let config = SimConfig {
            mesh_dim_x: 3,
            mesh_dim_y: 3,
            selection_strategy: SelectionStrategy::BufferLevel,
            ..SimConfig::default()
        };
        let topology = Topology::new(3, 3);
        let mut links = LinkArena::new();
        let rx = std::array::from_fn(|_| links.add());
        let tx = std::array::from_fn(|_| links.add());
        let mut router = Router::new(topology, RouterPorts { rx, tx }, &config);
        router.configure(4, 0, None);

        router.buffers[Direction::North.index()].push(flit_to(5));
        router.buffers[Direction::North.index()].push(flit_to(5));
        router.buffer_monitor(&mut links);
        links.latch_all();

        assert_eq!(links.rev(router.ports.rx[Direction::North.index()]).buffer_level, 2);
        assert_eq!(links.rev(router.ports.rx[Direction::East.index()]).buffer_level, 0);
        let advert = links.rev(router.ports.rx[Direction::West.index()]).nop;
        assert_eq!(advert.sender_id, Some(4));
    }
}
