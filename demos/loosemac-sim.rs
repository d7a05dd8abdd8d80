//! LooseMAC simulator example application
//
// https://github.com/rust-iot/rust-loosemac
// Copyright 2021 Ryan Kurte

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use log::{debug, info};

use structopt::StructOpt;

use rand::rngs::StdRng;
use rand::SeedableRng;

use loosemac::prelude::*;
use loosemac::report;

#[derive(Debug, StructOpt)]
struct Options {
    /// Topology input file (stdin if omitted)
    #[structopt(long, short)]
    pub input: Option<PathBuf>,

    /// Seed for the slot-selection RNG (random if omitted)
    #[structopt(long)]
    pub seed: Option<u64>,

    /// Abort and report non-convergence after this many ticks
    #[structopt(long, default_value = "10000")]
    pub max_ticks: u64,

    /// Suppress the per-tick status report
    #[structopt(long)]
    pub quiet: bool,

    #[structopt(long, default_value = "info")]
    /// Configure log level
    pub log_level: simplelog::LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Load options
    let opts = Options::from_args();

    // Initialise logging
    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    info!("Starting loosemac-sim");

    // Read the topology description
    let input = match &opts.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            debug!("Reading topology from stdin");
            let mut s = String::new();
            io::stdin().read_to_string(&mut s)?;
            s
        }
    };

    let graph = match Graph::parse(&input) {
        Ok(g) => g,
        Err(e) => {
            return Err(anyhow::anyhow!("Topology error: {}", e));
        }
    };

    info!(
        "Loaded {} nodes with frame length {}",
        graph.len(),
        graph.lambda()
    );

    // Seed the slot-selection RNG; a fixed seed reproduces the run exactly
    let seed = match opts.seed {
        Some(s) => s,
        None => rand::random(),
    };
    info!("Using RNG seed {}", seed);

    let mut config = Config::new(graph.lambda());
    config.max_ticks = opts.max_ticks;

    let mut sim = Sim::with_config(&graph, config, StdRng::seed_from_u64(seed));

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !opts.quiet {
        report::write_status(&mut out, &sim)?;
    }

    // Drive the simulation to convergence or the tick bound
    while !sim.converged() {
        if sim.tick() >= opts.max_ticks {
            return Err(anyhow::anyhow!(
                "No convergence after {} ticks ({}/{} nodes ready)",
                sim.tick(),
                sim.ready_count(),
                sim.len()
            ));
        }

        sim.step();

        if !opts.quiet {
            report::write_status(&mut out, &sim)?;
        }
    }

    out.flush()?;

    info!(
        "All {} nodes READY after {} ticks",
        sim.len(),
        sim.tick()
    );

    let stats = sim.stats();
    info!(
        "Stats: {} beacons, {} reports, {} combined, {} collisions, {} conflicts, {} resets",
        stats.beacons_tx,
        stats.conflict_reports_tx,
        stats.combined_tx,
        stats.collisions_rx,
        stats.marking_conflicts,
        stats.slot_resets
    );

    Ok(())
}
