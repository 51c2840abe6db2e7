//! Selection functions.
//!
//! When the routing function offers more than one admissible output,
//! the selection function picks one using local congestion knowledge:
//! nothing (random), the neighbors' advertised buffer occupancy, or
//! the Neighbors-on-Path advertisements that look one hop further.
//!
//! All randomness draws from the caller's seeded generator so a run is
//! reproducible from its seed.

use log::trace;
use rand::Rng;

use crate::config::{RoutingAlgorithm, SelectionStrategy};

use super::channel::NopAdvertisement;
use super::coord::{Direction, Topology, DIRECTIONS, PORTS};
use super::routing::{algorithmic_outputs, RouteData};

/// The congestion view a router exposes to its selection function.
#[derive(Debug, Clone, Copy)]
pub struct SelectionView {
    pub topology: Topology,
    pub algorithm: RoutingAlgorithm,
    /// Capacity of every input buffer in the mesh.
    pub buffer_depth: usize,
    /// True where this router's reservation slot for the output is free.
    pub output_free: [bool; PORTS],
    /// Occupancy the downstream neighbor advertises for each cardinal
    /// output.
    pub neighbor_buffer_level: [u32; DIRECTIONS],
    /// NoP advertisement received from the neighbor at each cardinal
    /// output.
    pub nop: [NopAdvertisement; DIRECTIONS],
}

/// Pick one direction from a non-empty candidate set.
pub fn select<R: Rng>(
    strategy: SelectionStrategy,
    candidates: &[Direction],
    route: &RouteData,
    view: &SelectionView,
    rng: &mut R,
) -> Direction {
    debug_assert!(!candidates.is_empty());
    if candidates.len() == 1 {
        return candidates[0];
    }

    match strategy {
        SelectionStrategy::Random => random(candidates, rng),
        SelectionStrategy::BufferLevel => buffer_level(candidates, view, rng),
        SelectionStrategy::Nop => neighbors_on_path(candidates, route, view, rng),
    }
}

fn random<R: Rng>(candidates: &[Direction], rng: &mut R) -> Direction {
    candidates[rng.gen_range(0..candidates.len())]
}

/// Prefer the candidate whose downstream buffer has the most free
/// slots, skipping outputs that are already reserved. Ties keep the
/// first candidate found; with every candidate reserved, fall back to
/// a random pick.
fn buffer_level<R: Rng>(
    candidates: &[Direction],
    view: &SelectionView,
    rng: &mut R,
) -> Direction {
    let mut best: Option<(Direction, u32)> = None;

    for &dir in candidates {
        if !view.output_free[dir.index()] {
            continue;
        }
        let level = view.neighbor_buffer_level[dir.index()];
        let free = (view.buffer_depth as u32).saturating_sub(level);
        match best {
            Some((_, best_free)) if free <= best_free => {}
            _ => best = Some((dir, free)),
        }
    }

    match best {
        Some((dir, free)) => {
            trace!("buffer-level selection: {dir} with {free} free slots");
            dir
        }
        None => random(candidates, rng),
    }
}

/// Score a candidate by what lies one hop beyond it: ask the routing
/// function which outputs the neighbor would use for this destination
/// and add up the free slots of those the neighbor advertises as
/// available. A neighbor that is the destination scores maximal.
fn nop_score(
    candidate: Direction,
    route: &RouteData,
    view: &SelectionView,
) -> Option<u64> {
    let neighbor = view.topology.neighbor(route.current_id, candidate)?;
    if neighbor == route.dst_id {
        return Some(u64::MAX);
    }

    let advert = &view.nop[candidate.index()];
    if !advert.is_valid() {
        return None;
    }

    let next_hop = RouteData {
        current_id: neighbor,
        src_id: route.src_id,
        dst_id: route.dst_id,
        dir_in: candidate.reflex(),
    };
    let next_dirs = algorithmic_outputs(&view.topology, view.algorithm, &next_hop)?;

    let mut score = 0u64;
    for dir in next_dirs {
        let status = &advert.channels[dir.index()];
        if status.available {
            score += (view.buffer_depth as u64).saturating_sub(status.buffer_level as u64);
        }
    }
    Some(score)
}

/// Neighbors-on-Path: highest lookahead score wins, ties keep the
/// first candidate. Without any valid advertisement (borders, warm-up,
/// table-based routing) the choice degrades to random.
fn neighbors_on_path<R: Rng>(
    candidates: &[Direction],
    route: &RouteData,
    view: &SelectionView,
    rng: &mut R,
) -> Direction {
    let mut best: Option<(Direction, u64)> = None;

    for &dir in candidates {
        let Some(score) = nop_score(dir, route, view) else {
            continue;
        };
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((dir, score)),
        }
    }

    match best {
        Some((dir, score)) => {
            trace!("NoP selection: {dir} scored {score}");
            dir
        }
        None => random(candidates, rng),
    }
}
