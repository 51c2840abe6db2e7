//! Table-driven traffic description.
//!
//! Each line of the traffic table names a source/destination pair and
//! the relative weight with which the source picks that destination:
//!
//! ```text
//! # src  dst  weight
//!   0    3    0.8
//!   0    1    0.2
//! ```
//!
//! Blank lines and `#` comments are skipped. A processing element
//! samples among its own rows on every injection.

use std::path::Path;

use log::debug;
use rand::Rng;

use super::coord::NodeId;
use super::SimError;

/// One source/destination pair with its sampling weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficEntry {
    pub src: NodeId,
    pub dst: NodeId,
    pub weight: f64,
}

/// All traffic table rows, shared read-only by every PE.
#[derive(Debug, Clone, Default)]
pub struct GlobalTrafficTable {
    entries: Vec<TrafficEntry>,
}

impl GlobalTrafficTable {
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::TableIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, SimError> {
        let mut entries = Vec::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (src, dst, weight) = match (fields.next(), fields.next(), fields.next()) {
                (Some(a), Some(b), Some(c)) => (a, b, c),
                _ => {
                    return Err(SimError::TableParse {
                        path: path.display().to_string(),
                        line: line_no,
                        message: "expected: src_id dst_id weight".into(),
                    })
                }
            };

            let src: NodeId = src.parse().map_err(|_| SimError::TableParse {
                path: path.display().to_string(),
                line: line_no,
                message: format!("bad source id {src:?}"),
            })?;
            let dst: NodeId = dst.parse().map_err(|_| SimError::TableParse {
                path: path.display().to_string(),
                line: line_no,
                message: format!("bad destination id {dst:?}"),
            })?;
            let weight: f64 = weight.parse().map_err(|_| SimError::TableParse {
                path: path.display().to_string(),
                line: line_no,
                message: format!("bad weight {weight:?}"),
            })?;
            if !weight.is_finite() || weight <= 0.0 {
                return Err(SimError::TableParse {
                    path: path.display().to_string(),
                    line: line_no,
                    message: "weight must be positive".into(),
                });
            }

            entries.push(TrafficEntry { src, dst, weight });
        }

        debug!("traffic table: {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn is_valid(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Number of rows naming `id` as their source.
    pub fn occurrences_as_source(&self, id: NodeId) -> usize {
        self.entries.iter().filter(|e| e.src == id).count()
    }

    /// Sample a destination for `src`, weighted by the table rows.
    /// None when the table has no row for this source.
    pub fn sample_destination<R: Rng>(&self, src: NodeId, rng: &mut R) -> Option<NodeId> {
        let total: f64 = self
            .entries
            .iter()
            .filter(|e| e.src == src)
            .map(|e| e.weight)
            .sum();
        if total <= 0.0 {
            return None;
        }

        let mut remaining = rng.gen::<f64>() * total;
        for entry in self.entries.iter().filter(|e| e.src == src) {
            remaining -= entry.weight;
            if remaining <= 0.0 {
                return Some(entry.dst);
            }
        }
        // floating point slack: fall back to the last matching row
        self.entries
            .iter()
            .rev()
            .find(|e| e.src == src)
            .map(|e| e.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn parse(text: &str) -> Result<GlobalTrafficTable, SimError> {
        GlobalTrafficTable::parse(text, Path::new("test.tt"))
    }

    #[test]
    fn test_parse_and_occurrences() {
        let table = parse(
            "# weighted pairs\n\
             0 3 0.8\n\
             0 1 0.2\n\
             2 0 1.0\n",
        )
        .unwrap();
        assert!(table.is_valid());
        assert_eq!(table.occurrences_as_source(0), 2);
        assert_eq!(table.occurrences_as_source(2), 1);
        assert_eq!(table.occurrences_as_source(5), 0);
    }

    #[test]
    fn test_sample_follows_weights() {
        let table = parse("0 3 0.9\n0 1 0.1\n").unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut hits_3 = 0;
        for _ in 0..1000 {
            match table.sample_destination(0, &mut rng) {
                Some(3) => hits_3 += 1,
                Some(1) => {}
                other => panic!("unexpected destination {other:?}"),
            }
        }
        assert!(hits_3 > 800, "weighting ignored: {hits_3}/1000");
    }

    #[test]
    fn test_sample_unknown_source() {
        let table = parse("0 3 1.0\n").unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        assert_eq!(table.sample_destination(4, &mut rng), None);
    }

    #[test]
    fn test_bad_weight_rejected() {
        assert!(matches!(
            parse("0 1 zero\n").unwrap_err(),
            SimError::TableParse { .. }
        ));
        assert!(matches!(
            parse("0 1 -0.5\n").unwrap_err(),
            SimError::TableParse { .. }
        ));
    }
}
