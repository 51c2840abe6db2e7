//! Simulation configuration.
//!
//! Configuration is assembled from several sources in priority order:
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (`NOCSIM_*`)
//! 3. Project-local config file (`./nocsim.toml`)
//! 4. User config file (`~/.config/nocsim/config.toml`)
//! 5. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # nocsim.toml
//! mesh_dim_x = 8
//! mesh_dim_y = 8
//! buffer_depth = 4
//! routing_algorithm = "odd-even"
//! selection_strategy = "buffer-level"
//! packet_injection_rate = 0.02
//! ```

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::network::SimError;

/// Which routing function head flits are routed with.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingAlgorithm {
    /// Deterministic dimension-ordered routing.
    #[default]
    Xy,
    /// West-first turn model.
    WestFirst,
    /// North-last turn model.
    NorthLast,
    /// Negative-first turn model.
    NegativeFirst,
    /// Odd-even turn model.
    OddEven,
    /// Declared for compatibility; not implemented.
    Dyad,
    /// Minimal fully-adaptive routing.
    FullyAdaptive,
    /// Routes looked up in a table loaded from disk.
    TableBased,
}

impl std::fmt::Display for RoutingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoutingAlgorithm::Xy => "xy",
            RoutingAlgorithm::WestFirst => "west-first",
            RoutingAlgorithm::NorthLast => "north-last",
            RoutingAlgorithm::NegativeFirst => "negative-first",
            RoutingAlgorithm::OddEven => "odd-even",
            RoutingAlgorithm::Dyad => "dyad",
            RoutingAlgorithm::FullyAdaptive => "fully-adaptive",
            RoutingAlgorithm::TableBased => "table-based",
        };
        write!(f, "{name}")
    }
}

/// How one output is picked when routing returns several.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Uniform pick among the candidates.
    #[default]
    Random,
    /// Prefer the candidate with the most free downstream slots.
    BufferLevel,
    /// Neighbors-on-Path: look one hop past each candidate.
    Nop,
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SelectionStrategy::Random => "random",
            SelectionStrategy::BufferLevel => "buffer-level",
            SelectionStrategy::Nop => "nop",
        };
        write!(f, "{name}")
    }
}

/// How processing elements pick packet destinations.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficDistribution {
    /// Uniformly random destinations.
    #[default]
    Random,
    /// Destinations sampled from the traffic table.
    TableBased,
}

/// All simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Mesh width in tiles.
    pub mesh_dim_x: u16,
    /// Mesh height in tiles.
    pub mesh_dim_y: u16,
    /// Capacity of each router input FIFO, in flits.
    pub buffer_depth: usize,
    pub routing_algorithm: RoutingAlgorithm,
    pub selection_strategy: SelectionStrategy,
    pub traffic_distribution: TrafficDistribution,
    /// Probability a PE injects a packet in a given cycle.
    pub packet_injection_rate: f64,
    pub min_packet_size: usize,
    pub max_packet_size: usize,
    /// Cycles before statistics start counting.
    pub stats_warm_up_time: u64,
    /// Total cycles to simulate.
    pub simulation_time: u64,
    /// Extra console tracing; 0 follows the log filter alone.
    pub verbose_mode: u8,
    /// Seed for every random choice in the run.
    pub rnd_seed: u64,
    /// Routing table file, required for table-based routing.
    pub routing_table_path: Option<PathBuf>,
    /// Traffic table file, required for table-based traffic.
    pub traffic_table_path: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mesh_dim_x: 4,
            mesh_dim_y: 4,
            buffer_depth: 4,
            routing_algorithm: RoutingAlgorithm::default(),
            selection_strategy: SelectionStrategy::default(),
            traffic_distribution: TrafficDistribution::default(),
            packet_injection_rate: 0.01,
            min_packet_size: 2,
            max_packet_size: 10,
            stats_warm_up_time: 0,
            simulation_time: 10_000,
            verbose_mode: 0,
            rnd_seed: 1,
            routing_table_path: None,
            traffic_table_path: None,
        }
    }
}

/// A partial configuration as read from a file: only the keys present
/// override anything.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigOverlay {
    pub mesh_dim_x: Option<u16>,
    pub mesh_dim_y: Option<u16>,
    pub buffer_depth: Option<usize>,
    pub routing_algorithm: Option<RoutingAlgorithm>,
    pub selection_strategy: Option<SelectionStrategy>,
    pub traffic_distribution: Option<TrafficDistribution>,
    pub packet_injection_rate: Option<f64>,
    pub min_packet_size: Option<usize>,
    pub max_packet_size: Option<usize>,
    pub stats_warm_up_time: Option<u64>,
    pub simulation_time: Option<u64>,
    pub verbose_mode: Option<u8>,
    pub rnd_seed: Option<u64>,
    pub routing_table_path: Option<PathBuf>,
    pub traffic_table_path: Option<PathBuf>,
}

impl ConfigOverlay {
    /// Apply the keys present in this overlay onto a config.
    pub fn apply(self, config: &mut SimConfig) {
        macro_rules! merge {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })+
            };
        }
        merge!(
            mesh_dim_x,
            mesh_dim_y,
            buffer_depth,
            routing_algorithm,
            selection_strategy,
            traffic_distribution,
            packet_injection_rate,
            min_packet_size,
            max_packet_size,
            stats_warm_up_time,
            simulation_time,
            verbose_mode,
            rnd_seed,
        );
        if self.routing_table_path.is_some() {
            config.routing_table_path = self.routing_table_path;
        }
        if self.traffic_table_path.is_some() {
            config.traffic_table_path = self.traffic_table_path;
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(overlay) => {
                    info!("loaded config from {}", path.display());
                    Some(overlay)
                }
                Err(e) => {
                    warn!("failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("failed to read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl SimConfig {
    /// Assemble a configuration from files and the environment.
    /// Command-line overrides are applied by the caller afterwards.
    pub fn load() -> Self {
        let mut config = Self::default();

        // user config first, so the project-local file wins
        if let Some(path) = Self::user_config_path() {
            if let Some(overlay) = ConfigOverlay::load_from_file(&path) {
                overlay.apply(&mut config);
            }
        }
        if let Some(overlay) = ConfigOverlay::load_from_file(Path::new("nocsim.toml")) {
            overlay.apply(&mut config);
        }

        config.apply_env_overrides();
        config
    }

    /// Path of the user config file, when a config directory exists.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("nocsim").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(seed) = std::env::var("NOCSIM_SEED") {
            match seed.parse() {
                Ok(seed) => {
                    info!("using NOCSIM_SEED from environment: {seed}");
                    self.rnd_seed = seed;
                }
                Err(_) => warn!("ignoring unparsable NOCSIM_SEED {seed:?}"),
            }
        }
        if let Ok(path) = std::env::var("NOCSIM_ROUTING_TABLE") {
            self.routing_table_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("NOCSIM_TRAFFIC_TABLE") {
            self.traffic_table_path = Some(PathBuf::from(path));
        }
    }

    /// Reject configurations the mesh cannot be built from.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.mesh_dim_x < 1 || self.mesh_dim_y < 1 {
            return Err(SimError::Config(format!(
                "mesh dimensions must be positive, got {}x{}",
                self.mesh_dim_x, self.mesh_dim_y
            )));
        }
        if (self.mesh_dim_x as usize) * (self.mesh_dim_y as usize) < 2 {
            return Err(SimError::Config("mesh needs at least two tiles".into()));
        }
        if self.buffer_depth < 1 {
            return Err(SimError::Config("buffer depth must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.packet_injection_rate) {
            return Err(SimError::Config(format!(
                "packet injection rate must be within [0, 1], got {}",
                self.packet_injection_rate
            )));
        }
        if self.min_packet_size < 1 || self.min_packet_size > self.max_packet_size {
            return Err(SimError::Config(format!(
                "bad packet size range {}..={}",
                self.min_packet_size, self.max_packet_size
            )));
        }
        if self.routing_algorithm == RoutingAlgorithm::Dyad {
            return Err(SimError::Config(
                "routing algorithm dyad is declared but not implemented".into(),
            ));
        }
        if self.routing_algorithm == RoutingAlgorithm::TableBased
            && self.routing_table_path.is_none()
        {
            return Err(SimError::Config(
                "table-based routing needs a routing table file".into(),
            ));
        }
        if self.traffic_distribution == TrafficDistribution::TableBased
            && self.traffic_table_path.is_none()
        {
            return Err(SimError::Config(
                "table-based traffic needs a traffic table file".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_degenerate_mesh() {
        let config = SimConfig {
            mesh_dim_x: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            mesh_dim_x: 1,
            mesh_dim_y: 1,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_buffer_depth() {
        let config = SimConfig {
            buffer_depth: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_injection_rate() {
        let config = SimConfig {
            packet_injection_rate: 1.5,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_packet_sizes() {
        let config = SimConfig {
            min_packet_size: 8,
            max_packet_size: 4,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SimConfig {
            min_packet_size: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dyad_is_rejected() {
        let config = SimConfig {
            routing_algorithm: RoutingAlgorithm::Dyad,
            ..SimConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }

    #[test]
    fn test_table_based_requires_paths() {
        let config = SimConfig {
            routing_algorithm: RoutingAlgorithm::TableBased,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            traffic_distribution: TrafficDistribution::TableBased,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlay_merges_only_present_keys() {
        let overlay: ConfigOverlay = toml::from_str(
            "mesh_dim_x = 8\n\
             routing_algorithm = \"odd-even\"\n",
        )
        .unwrap();

        let mut config = SimConfig::default();
        overlay.apply(&mut config);

        assert_eq!(config.mesh_dim_x, 8);
        assert_eq!(config.mesh_dim_y, 4);
        assert_eq!(config.routing_algorithm, RoutingAlgorithm::OddEven);
        assert_eq!(config.selection_strategy, SelectionStrategy::Random);
    }

    #[test]
    fn test_full_overlay_round_trips() {
        let text = toml::to_string(&ConfigOverlay {
            mesh_dim_x: Some(6),
            selection_strategy: Some(SelectionStrategy::Nop),
            packet_injection_rate: Some(0.25),
            ..ConfigOverlay::default()
        })
        .unwrap();
        let parsed: ConfigOverlay = toml::from_str(&text).unwrap();
        assert_eq!(parsed.mesh_dim_x, Some(6));
        assert_eq!(parsed.selection_strategy, Some(SelectionStrategy::Nop));
        assert_eq!(parsed.packet_injection_rate, Some(0.25));
        assert_eq!(parsed.mesh_dim_y, None);
    }
}
