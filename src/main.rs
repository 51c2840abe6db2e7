//! nocsim command-line front-end.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use nocsim::config::{RoutingAlgorithm, SelectionStrategy, SimConfig, TrafficDistribution};
use nocsim::network::mesh::Mesh;

/// Cycle-accurate 2-D mesh network-on-chip simulator.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Mesh width in tiles.
    #[arg(long)]
    dim_x: Option<u16>,

    /// Mesh height in tiles.
    #[arg(long)]
    dim_y: Option<u16>,

    /// Capacity of each router input FIFO, in flits.
    #[arg(long)]
    buffer_depth: Option<usize>,

    /// Routing algorithm.
    #[arg(long, value_enum)]
    routing: Option<RoutingAlgorithm>,

    /// Selection strategy for adaptive routing.
    #[arg(long, value_enum)]
    selection: Option<SelectionStrategy>,

    /// Traffic distribution used by the processing elements.
    #[arg(long, value_enum)]
    traffic: Option<TrafficDistribution>,

    /// Probability a PE injects a packet in a given cycle.
    #[arg(long)]
    injection_rate: Option<f64>,

    /// Smallest generated packet, in flits.
    #[arg(long)]
    min_packet_size: Option<usize>,

    /// Largest generated packet, in flits.
    #[arg(long)]
    max_packet_size: Option<usize>,

    /// Cycles to simulate.
    #[arg(long)]
    cycles: Option<u64>,

    /// Cycles before statistics start counting.
    #[arg(long)]
    warm_up: Option<u64>,

    /// Seed for the random number generators.
    #[arg(long)]
    seed: Option<u64>,

    /// Routing table file (for table-based routing).
    #[arg(long)]
    routing_table: Option<PathBuf>,

    /// Traffic table file (for table-based traffic).
    #[arg(long)]
    traffic_table: Option<PathBuf>,

    /// Print per-router statistics after the run.
    #[arg(long)]
    per_router: bool,

    /// Increase tracing (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut SimConfig) {
        macro_rules! merge {
            ($($cli:ident => $field:ident),+ $(,)?) => {
                $(if let Some(value) = self.$cli {
                    config.$field = value;
                })+
            };
        }
        merge!(
            dim_x => mesh_dim_x,
            dim_y => mesh_dim_y,
            buffer_depth => buffer_depth,
            routing => routing_algorithm,
            selection => selection_strategy,
            traffic => traffic_distribution,
            injection_rate => packet_injection_rate,
            min_packet_size => min_packet_size,
            max_packet_size => max_packet_size,
            cycles => simulation_time,
            warm_up => stats_warm_up_time,
            seed => rnd_seed,
        );
        if let Some(path) = &self.routing_table {
            config.routing_table_path = Some(path.clone());
        }
        if let Some(path) = &self.traffic_table {
            config.traffic_table_path = Some(path.clone());
        }
        if self.verbose > 0 {
            config.verbose_mode = self.verbose;
        }
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = SimConfig::load();
    cli.apply(&mut config);

    info!(
        "{}x{} mesh, routing {}, selection {}, injection rate {}, seed {}",
        config.mesh_dim_x,
        config.mesh_dim_y,
        config.routing_algorithm,
        config.selection_strategy,
        config.packet_injection_rate,
        config.rnd_seed,
    );

    let mut mesh = Mesh::new(&config)?;
    mesh.run(config.simulation_time)?;

    println!("{}", mesh.summary());

    if cli.per_router || config.verbose_mode > 0 {
        println!();
        println!("Per-router deliveries:");
        for id in mesh.topology().node_ids() {
            let stats = mesh.router(id).stats();
            if stats.received_flits() == 0 {
                continue;
            }
            println!(
                "  router {:3}: {:6} flits, {:5} packets, avg delay {:.2}",
                id,
                stats.received_flits(),
                stats.received_packets(),
                stats.average_delay()
            );
        }
    }

    Ok(())
}
