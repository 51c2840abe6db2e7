//! Inter-router channel bundles with clock-edge latching.
//!
//! Every link between two ports is a directed channel bundle. The
//! transmitter drives the forward half (`req`, the flit line); the
//! receiver drives the reverse half (`ack`, its buffer occupancy, and
//! its NoP advertisement). Each half is double-buffered: writes land in
//! a `next` value that becomes visible only when the mesh latches all
//! channels at the end of the cycle, so every process in a cycle reads
//! the values that were current when the cycle started.
//!
//! Channels live in a flat arena owned by the mesh; routers and PEs
//! hold `LinkId` indices into it rather than references to each other.

use super::coord::{NodeId, DIRECTIONS};
use super::flit::Flit;

/// A double-buffered value cell.
///
/// `read` observes the value latched at the start of the cycle; `write`
/// stages a value for the next cycle. An unwritten cell keeps its value
/// across latches, like a wire holding its level.
#[derive(Debug, Clone, Default)]
pub struct Signal<T: Clone> {
    current: T,
    next: T,
}

impl<T: Clone> Signal<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: initial.clone(),
            next: initial,
        }
    }

    #[inline]
    pub fn read(&self) -> &T {
        &self.current
    }

    #[inline]
    pub fn write(&mut self) -> &mut T {
        &mut self.next
    }

    /// Make staged writes visible.
    pub fn latch(&mut self) {
        self.current = self.next.clone();
    }
}

/// Occupancy and availability of one router output, as advertised to
/// neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Occupancy of the input buffer downstream of that output.
    pub buffer_level: u32,
    /// True when the output's reservation slot is free.
    pub available: bool,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            buffer_level: 0,
            available: false,
        }
    }
}

/// Neighbors-on-Path advertisement: one status per external output of
/// the sender, published to every neighbor each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NopAdvertisement {
    /// Advertising node, or None for the tied-off border value.
    pub sender_id: Option<NodeId>,
    /// Status of the sender's four external outputs, by direction index.
    pub channels: [ChannelStatus; DIRECTIONS],
}

impl NopAdvertisement {
    /// True when this came from a real neighbor rather than a border tie-off.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.sender_id.is_some()
    }
}

/// Transmitter-driven lines of a channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct FwdSignals {
    /// Alternating-bit request level.
    pub req: bool,
    /// The flit line; meaningful while a transfer is pending.
    pub flit: Option<Flit>,
}

/// Receiver-driven lines of a channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevSignals {
    /// Alternating-bit acknowledge level.
    pub ack: bool,
    /// Occupancy of the receiver's input buffer on this link.
    pub buffer_level: u32,
    /// The receiver's NoP advertisement.
    pub nop: NopAdvertisement,
}

/// One directed channel bundle.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    fwd: Signal<FwdSignals>,
    rev: Signal<RevSignals>,
}

/// Index of a channel in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkId(usize);

/// Arena of all channel bundles in a mesh.
///
/// Border ports get their own channels whose unwritten halves keep the
/// reset values: `req`/`ack` low, zero buffer level, invalid NoP sender.
#[derive(Debug, Default)]
pub struct LinkArena {
    channels: Vec<Channel>,
}

impl LinkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh channel with all lines at their reset values.
    pub fn add(&mut self) -> LinkId {
        self.channels.push(Channel::default());
        LinkId(self.channels.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Forward lines as latched at the start of the cycle.
    #[inline]
    pub fn fwd(&self, link: LinkId) -> &FwdSignals {
        self.channels[link.0].fwd.read()
    }

    /// Reverse lines as latched at the start of the cycle.
    #[inline]
    pub fn rev(&self, link: LinkId) -> &RevSignals {
        self.channels[link.0].rev.read()
    }

    /// Stage writes to the forward lines for the next cycle.
    #[inline]
    pub fn fwd_mut(&mut self, link: LinkId) -> &mut FwdSignals {
        self.channels[link.0].fwd.write()
    }

    /// Stage writes to the reverse lines for the next cycle.
    #[inline]
    pub fn rev_mut(&mut self, link: LinkId) -> &mut RevSignals {
        self.channels[link.0].rev.write()
    }

    /// Latch every channel: staged writes become the next cycle's values.
    pub fn latch_all(&mut self) {
        for channel in &mut self.channels {
            channel.fwd.latch();
            channel.rev.latch();
        }
    }

    /// True while the transmitter has a transfer the receiver has not
    /// yet acknowledged.
    pub fn transfer_pending(&self, link: LinkId) -> bool {
        let channel = &self.channels[link.0];
        channel.fwd.read().req != channel.rev.read().ack
    }
}
