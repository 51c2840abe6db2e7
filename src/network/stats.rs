//! Per-router delivery statistics.
//!
//! A router records an event whenever it forwards a flit to its local
//! port. Events before the configured warm-up time are discarded so
//! measurements exclude the cold start.

use super::coord::NodeId;
use super::flit::Flit;

/// Delivery counters for one router.
#[derive(Debug, Clone, Default)]
pub struct RouterStats {
    local_id: NodeId,
    warm_up_time: u64,
    received_flits: u64,
    received_packets: u64,
    total_flit_delay: u64,
    last_received_cycle: u64,
}

impl RouterStats {
    pub fn configure(&mut self, local_id: NodeId, warm_up_time: u64) {
        self.local_id = local_id;
        self.warm_up_time = warm_up_time;
    }

    /// Account a flit delivered to the local port at `cycle`.
    pub fn received_flit(&mut self, cycle: u64, flit: &Flit) {
        if cycle < self.warm_up_time {
            return;
        }
        self.received_flits += 1;
        self.total_flit_delay += cycle.saturating_sub(flit.timestamp);
        self.last_received_cycle = cycle;
        if flit.kind.is_tail() {
            self.received_packets += 1;
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn received_flits(&self) -> u64 {
        self.received_flits
    }

    pub fn received_packets(&self) -> u64 {
        self.received_packets
    }

    pub fn last_received_cycle(&self) -> u64 {
        self.last_received_cycle
    }

    /// Mean injection-to-delivery delay per flit, in cycles.
    pub fn average_delay(&self) -> f64 {
        if self.received_flits == 0 {
            0.0
        } else {
            self.total_flit_delay as f64 / self.received_flits as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::flit::Packet;

    #[test]
    fn test_counts_and_delay() {
        let mut stats = RouterStats::default();
        stats.configure(3, 0);

        let mut packet = Packet::new(0, 3, 10, 2);
        stats.received_flit(14, &packet.next_flit());
        stats.received_flit(16, &packet.next_flit());

        assert_eq!(stats.received_flits(), 2);
        assert_eq!(stats.received_packets(), 1);
        assert_eq!(stats.average_delay(), 5.0);
        assert_eq!(stats.last_received_cycle(), 16);
    }

    #[test]
    fn test_warm_up_discards_events() {
        let mut stats = RouterStats::default();
        stats.configure(0, 100);

        let mut early = Packet::new(0, 1, 5, 1);
        stats.received_flit(50, &early.next_flit());
        assert_eq!(stats.received_flits(), 0);
        assert_eq!(stats.received_packets(), 0);

        let mut late = Packet::new(0, 1, 120, 1);
        stats.received_flit(130, &late.next_flit());
        assert_eq!(stats.received_flits(), 1);
        assert_eq!(stats.received_packets(), 1);
    }

    #[test]
    fn test_average_delay_empty() {
        let stats = RouterStats::default();
        assert_eq!(stats.average_delay(), 0.0);
    }
}
