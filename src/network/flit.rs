//! Flits and packets.
//!
//! A flit is the atomic unit transferred over a link in one cycle.
//! A packet is a head flit, zero or more body flits, and a tail flit;
//! a single-flit packet is carried by one flit that acts as both head
//! and tail. Routers route on the head and release on the tail, so the
//! combined kind routes and releases in the same forwarding step.

use super::coord::NodeId;

/// Position of a flit within its packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlitKind {
    /// First flit: carries routing information, reserves the output.
    Head,
    /// Middle flit: follows the head's reservation.
    Body,
    /// Last flit: releases the reservation.
    Tail,
    /// Sole flit of a single-flit packet.
    HeadTail,
}

impl FlitKind {
    /// True if this flit routes and reserves an output.
    #[inline]
    pub fn is_head(self) -> bool {
        matches!(self, FlitKind::Head | FlitKind::HeadTail)
    }

    /// True if this flit releases the reservation when forwarded.
    #[inline]
    pub fn is_tail(self) -> bool {
        matches!(self, FlitKind::Tail | FlitKind::HeadTail)
    }
}

/// A flow-control unit travelling through the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flit {
    pub kind: FlitKind,
    /// Injecting node.
    pub src_id: NodeId,
    /// Destination node.
    pub dst_id: NodeId,
    /// Position within the packet, starting at 0 for the head.
    pub sequence_no: u32,
    /// Cycle at which the packet was injected; used by statistics.
    pub timestamp: u64,
    /// Routers traversed so far.
    pub hop_no: u32,
    /// Opaque payload word.
    pub payload: u32,
}

impl std::fmt::Display for Flit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            FlitKind::Head => "H",
            FlitKind::Body => "B",
            FlitKind::Tail => "T",
            FlitKind::HeadTail => "HT",
        };
        write!(
            f,
            "{}[{}->{} #{} t{}]",
            kind, self.src_id, self.dst_id, self.sequence_no, self.timestamp
        )
    }
}

/// A packet queued at a processing element, emitted flit by flit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub src_id: NodeId,
    pub dst_id: NodeId,
    /// Injection cycle, stamped onto every flit.
    pub timestamp: u64,
    /// Total number of flits.
    pub size: usize,
    /// Flits not yet emitted.
    pub flits_left: usize,
}

impl Packet {
    pub fn new(src_id: NodeId, dst_id: NodeId, timestamp: u64, size: usize) -> Self {
        debug_assert!(size >= 1);
        Self {
            src_id,
            dst_id,
            timestamp,
            size,
            flits_left: size,
        }
    }

    /// Produce the next flit of this packet and account for it.
    pub fn next_flit(&mut self) -> Flit {
        debug_assert!(self.flits_left > 0);
        let sequence_no = (self.size - self.flits_left) as u32;
        let kind = if self.size == 1 {
            FlitKind::HeadTail
        } else if sequence_no == 0 {
            FlitKind::Head
        } else if self.flits_left == 1 {
            FlitKind::Tail
        } else {
            FlitKind::Body
        };
        self.flits_left -= 1;
        Flit {
            kind,
            src_id: self.src_id,
            dst_id: self.dst_id,
            sequence_no,
            timestamp: self.timestamp,
            hop_no: 0,
            payload: 0,
        }
    }

    /// True once every flit has been emitted.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.flits_left == 0
    }
}
