//! Table-based routing support.
//!
//! The global routing table is loaded once from a text file and handed
//! to every router; each router keeps only its own slice of it. A line
//! of the file reads
//!
//! ```text
//! # node  in   dst  outputs
//!   0     L    3    E,S
//! ```
//!
//! where directions are `N`, `E`, `S`, `W` (and `L` for the local input
//! of the injecting node). Blank lines and `#` comments are skipped.

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use super::coord::{Direction, NodeId};
use super::SimError;

fn parse_direction(token: &str, path: &Path, line_no: usize) -> Result<Direction, SimError> {
    match token {
        "N" | "n" => Ok(Direction::North),
        "E" | "e" => Ok(Direction::East),
        "S" | "s" => Ok(Direction::South),
        "W" | "w" => Ok(Direction::West),
        "L" | "l" => Ok(Direction::Local),
        other => Err(SimError::TableParse {
            path: path.display().to_string(),
            line: line_no,
            message: format!("unknown direction {other:?}"),
        }),
    }
}

/// The routing entries of a single router: admissible outputs keyed by
/// (input direction, destination id).
#[derive(Debug, Clone, Default)]
pub struct LocalRoutingTable {
    entries: HashMap<(Direction, NodeId), Vec<Direction>>,
}

impl LocalRoutingTable {
    /// Admissible outputs for a flit entering on `dir_in` bound for
    /// `dst_id`, or None when the table has no entry.
    pub fn admissible_outputs(&self, dir_in: Direction, dst_id: NodeId) -> Option<&[Direction]> {
        self.entries
            .get(&(dir_in, dst_id))
            .map(|dirs| dirs.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Routing entries for every router in the mesh.
#[derive(Debug, Clone, Default)]
pub struct GlobalRoutingTable {
    nodes: HashMap<NodeId, LocalRoutingTable>,
}

impl GlobalRoutingTable {
    /// Load a table from the text format above.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::TableIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, SimError> {
        let mut nodes: HashMap<NodeId, LocalRoutingTable> = HashMap::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (node, dir_in, dst, outputs) = match (
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
            ) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => {
                    return Err(SimError::TableParse {
                        path: path.display().to_string(),
                        line: line_no,
                        message: "expected: node in_dir dst_id outputs".into(),
                    })
                }
            };

            let node: NodeId = node.parse().map_err(|_| SimError::TableParse {
                path: path.display().to_string(),
                line: line_no,
                message: format!("bad node id {node:?}"),
            })?;
            let dir_in = parse_direction(dir_in, path, line_no)?;
            let dst: NodeId = dst.parse().map_err(|_| SimError::TableParse {
                path: path.display().to_string(),
                line: line_no,
                message: format!("bad destination id {dst:?}"),
            })?;

            let mut out_dirs = Vec::new();
            for token in outputs.split(',') {
                let dir = parse_direction(token, path, line_no)?;
                if dir == Direction::Local {
                    return Err(SimError::TableParse {
                        path: path.display().to_string(),
                        line: line_no,
                        message: "local is not a valid output direction".into(),
                    });
                }
                out_dirs.push(dir);
            }
            if out_dirs.is_empty() {
                return Err(SimError::TableParse {
                    path: path.display().to_string(),
                    line: line_no,
                    message: "no output directions".into(),
                });
            }

            nodes
                .entry(node)
                .or_default()
                .entries
                .insert((dir_in, dst), out_dirs);
        }

        debug!("routing table: {} nodes with entries", nodes.len());
        Ok(Self { nodes })
    }

    /// True once at least one entry was loaded.
    pub fn is_valid(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// The entries of one router, cloned for its private use.
    pub fn local_table(&self, node: NodeId) -> LocalRoutingTable {
        self.nodes.get(&node).cloned().unwrap_or_default()
    }
}
