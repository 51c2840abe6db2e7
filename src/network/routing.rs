//! Routing functions.
//!
//! A routing function maps (current tile, source, destination, input
//! direction) to the non-empty set of external directions a head flit
//! may take next. The deterministic XY function always returns one
//! direction; the turn-model and adaptive functions may return two and
//! leave the final choice to the selection function.
//!
//! Directions returned here never point off the mesh: every candidate
//! is produced from a coordinate comparison that guarantees a neighbor
//! exists on that side. The local direction is never returned; it is
//! short-circuited by the router when the destination is the current
//! tile.

use crate::config::RoutingAlgorithm;

use super::coord::{Coord, Direction, NodeId, Topology};
use super::routing_table::LocalRoutingTable;
use super::SimError;

/// Inputs to a routing decision.
#[derive(Debug, Clone, Copy)]
pub struct RouteData {
    pub current_id: NodeId,
    pub src_id: NodeId,
    pub dst_id: NodeId,
    pub dir_in: Direction,
}

/// Dispatch to the configured routing function.
///
/// Returns the admissible external outputs, guaranteed non-empty.
pub fn admissible_outputs(
    topology: &Topology,
    algorithm: RoutingAlgorithm,
    table: Option<&LocalRoutingTable>,
    data: &RouteData,
) -> Result<Vec<Direction>, SimError> {
    let directions = match algorithm {
        RoutingAlgorithm::TableBased => {
            let table = table.ok_or_else(|| {
                SimError::Config("table-based routing selected but no routing table loaded".into())
            })?;
            table
                .admissible_outputs(data.dir_in, data.dst_id)
                .map(|dirs| dirs.to_vec())
                .unwrap_or_default()
        }
        // Rejected by configuration validation before any router runs.
        RoutingAlgorithm::Dyad => Vec::new(),
        algorithm => algorithmic_outputs(topology, algorithm, data).unwrap_or_default(),
    };

    if directions.is_empty() {
        return Err(SimError::EmptyRouting {
            current: data.current_id,
            destination: data.dst_id,
        });
    }
    Ok(directions)
}

/// The purely coordinate-based routing functions, without table access.
///
/// Returns None for the table-based and unimplemented algorithms; used
/// by NoP selection to look one hop ahead without a neighbor's table.
pub fn algorithmic_outputs(
    topology: &Topology,
    algorithm: RoutingAlgorithm,
    data: &RouteData,
) -> Option<Vec<Direction>> {
    let current = topology.coord_of(data.current_id);
    let source = topology.coord_of(data.src_id);
    let destination = topology.coord_of(data.dst_id);

    match algorithm {
        RoutingAlgorithm::Xy => Some(xy(current, destination)),
        RoutingAlgorithm::WestFirst => Some(west_first(current, destination)),
        RoutingAlgorithm::NorthLast => Some(north_last(current, destination)),
        RoutingAlgorithm::NegativeFirst => Some(negative_first(current, destination)),
        RoutingAlgorithm::OddEven => Some(odd_even(current, source, destination)),
        RoutingAlgorithm::FullyAdaptive => Some(fully_adaptive(current, destination)),
        RoutingAlgorithm::TableBased | RoutingAlgorithm::Dyad => None,
    }
}

/// Dimension-ordered XY: resolve the x offset first, then y.
/// Deterministic, always a single direction.
pub fn xy(current: Coord, destination: Coord) -> Vec<Direction> {
    let direction = if destination.x > current.x {
        Direction::East
    } else if destination.x < current.x {
        Direction::West
    } else if destination.y > current.y {
        Direction::South
    } else {
        Direction::North
    };
    vec![direction]
}

/// West-first turn model: westward moves must happen first, so only
/// eastbound traffic with a y offset gets a choice.
pub fn west_first(current: Coord, destination: Coord) -> Vec<Direction> {
    if destination.x <= current.x || destination.y == current.y {
        return xy(current, destination);
    }
    if destination.y < current.y {
        vec![Direction::North, Direction::East]
    } else {
        vec![Direction::South, Direction::East]
    }
}

/// North-last turn model: a northward move ends the route, so only
/// southbound traffic with an x offset gets a choice.
pub fn north_last(current: Coord, destination: Coord) -> Vec<Direction> {
    if destination.x == current.x || destination.y <= current.y {
        return xy(current, destination);
    }
    if destination.x < current.x {
        vec![Direction::South, Direction::West]
    } else {
        vec![Direction::South, Direction::East]
    }
}

/// Negative-first turn model: adaptivity only when the two offsets
/// disagree in sign.
pub fn negative_first(current: Coord, destination: Coord) -> Vec<Direction> {
    let same_sign = (destination.x <= current.x && destination.y <= current.y)
        || (destination.x >= current.x && destination.y >= current.y);
    if same_sign {
        return xy(current, destination);
    }
    if destination.x > current.x && destination.y < current.y {
        vec![Direction::North, Direction::East]
    } else {
        vec![Direction::South, Direction::West]
    }
}

/// Odd-even turn model (Chiu): east-west turns are restricted by the
/// parity of the current and destination columns.
pub fn odd_even(current: Coord, source: Coord, destination: Coord) -> Vec<Direction> {
    let c0 = current.x as i32;
    let c1 = current.y as i32;
    let s0 = source.x as i32;
    let d0 = destination.x as i32;
    let d1 = destination.y as i32;

    let e0 = d0 - c0;
    let e1 = c1 - d1;

    let mut directions = Vec::with_capacity(2);

    if e0 == 0 {
        if e1 > 0 {
            directions.push(Direction::North);
        } else {
            directions.push(Direction::South);
        }
    } else if e0 > 0 {
        if e1 == 0 {
            directions.push(Direction::East);
        } else {
            if c0 % 2 == 1 || c0 == s0 {
                if e1 > 0 {
                    directions.push(Direction::North);
                } else {
                    directions.push(Direction::South);
                }
            }
            if d0 % 2 == 1 || e0 != 1 {
                directions.push(Direction::East);
            }
        }
    } else {
        directions.push(Direction::West);
        if c0 % 2 == 0 {
            if e1 > 0 {
                directions.push(Direction::North);
            } else if e1 < 0 {
                directions.push(Direction::South);
            }
        }
    }

    debug_assert!(!directions.is_empty() && directions.len() <= 2);
    directions
}

/// Minimal fully-adaptive: any productive direction toward the
/// destination quadrant.
pub fn fully_adaptive(current: Coord, destination: Coord) -> Vec<Direction> {
    if destination.x == current.x || destination.y == current.y {
        return xy(current, destination);
    }
    if destination.x > current.x && destination.y < current.y {
        vec![Direction::North, Direction::East]
    } else if destination.x > current.x && destination.y > current.y {
        vec![Direction::South, Direction::East]
    } else if destination.x < current.x && destination.y > current.y {
        vec![Direction::South, Direction::West]
    } else {
        vec![Direction::North, Direction::West]
    }
}
