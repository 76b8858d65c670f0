//! OPP Token Bucket
//!
//! Provisioning and offline simulation for the XFSM token-bucket classifier.
//!
//! # Usage
//!
//! ```bash
//! opp-tokenbucket rules --output rules.json
//! opp-tokenbucket simulate --rate 20 --duration-secs 10 --sources 4
//! opp-tokenbucket --config classifier.json simulate --rules rules.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use opp_common::{ipv4_frame, Clock, ManualClock};
use opp_xfsm::{
    provision, token_bucket_rules, Classifier, ClassifierConfig, FlowStateMap, MapRegistry,
    RuleSet, StatsSnapshot, TransitionKey, TransitionLeaf, Verdict, XfsmTable,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[derive(Parser)]
#[command(name = "opp-tokenbucket")]
#[command(version)]
#[command(about = "XFSM token bucket provisioning and simulation", long_about = None)]
struct Cli {
    /// Classifier configuration (JSON)
    #[arg(long, short, env = "OPP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or write the reference token-bucket rule set
    Rules {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Drive synthetic IPv4 traffic through a classifier
    Simulate {
        /// Packets per second per source
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=NANOS_PER_SEC))]
        rate: u64,

        /// Simulated duration in seconds
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,

        /// Number of distinct source addresses
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        sources: u16,

        /// Rule file to provision instead of the reference rules
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Serialize)]
struct SourceSummary {
    forwarded: u64,
    dropped: u64,
    unclassified: u64,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    transitions: Vec<String>,
    packets_per_source: u64,
    sources: BTreeMap<String, SourceSummary>,
    stats: StatsSnapshot,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Rules { output } => {
            let rules = token_bucket_rules();
            match output {
                Some(path) => {
                    rules
                        .save(&path)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "rules written");
                }
                None => println!("{}", rules.to_json()?),
            }
        }
        Commands::Simulate {
            rate,
            duration_secs,
            sources,
            rules,
        } => {
            let rules = match rules {
                Some(path) => RuleSet::load(&path)
                    .with_context(|| format!("loading rules from {}", path.display()))?,
                None => token_bucket_rules(),
            };
            let report = simulate(&config, &rules, rate, duration_secs, sources)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ClassifierConfig> {
    match path {
        Some(path) => ClassifierConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => {
            tracing::warn!("no config given, using defaults");
            Ok(ClassifierConfig::default())
        }
    }
}

fn simulate(
    config: &ClassifierConfig,
    rules: &RuleSet,
    rate: u64,
    duration_secs: u64,
    sources: u16,
) -> anyhow::Result<SimulationReport> {
    // Provisioning step: seed and pin both stores before any traffic
    let registry = MapRegistry::new();
    let table = Arc::new(XfsmTable::new(config.table_capacity));
    provision(table.as_ref(), rules)?;
    let transitions = table.entries().iter().map(describe).collect();
    registry.pin_table(&config.xfsm_table_name, table)?;
    registry.pin_flow_store(
        &config.state_table_name,
        Arc::new(FlowStateMap::new(config.flow_capacity)),
    )?;

    // Classifier attaches by name only
    let clock = Arc::new(ManualClock::new(0));
    let classifier = Classifier::from_config(
        config,
        registry.open_flow_store(&config.state_table_name)?,
        registry.open_table(&config.xfsm_table_name)?,
    )?
    .with_clock(clock.clone());

    let frames: Vec<_> = (0..sources)
        .map(|i| {
            let [hi, lo] = i.to_be_bytes();
            ipv4_frame(Ipv4Addr::new(10, 1, hi, lo), Ipv4Addr::new(10, 0, 0, 1))
        })
        .collect();

    let step = NANOS_PER_SEC / rate;
    let packets = rate.saturating_mul(duration_secs);
    let mut summary: Vec<SourceSummary> = frames.iter().map(|_| SourceSummary::default()).collect();

    tracing::info!(rate, duration_secs, sources, packets, "simulation started");
    for i in 0..packets {
        clock.set(i * step);
        for (frame, counts) in frames.iter().zip(summary.iter_mut()) {
            match classifier.verdict(frame, clock.now_ns()) {
                Verdict::Forward => counts.forwarded += 1,
                Verdict::Drop => counts.dropped += 1,
                Verdict::PassThrough | Verdict::Unclassified => counts.unclassified += 1,
            }
        }
    }

    let sources = frames
        .iter()
        .zip(summary)
        .map(|(frame, counts)| {
            let src = Ipv4Addr::new(frame[26], frame[27], frame[28], frame[29]);
            (src.to_string(), counts)
        })
        .collect();

    Ok(SimulationReport {
        transitions,
        packets_per_source: packets,
        sources,
        stats: classifier.stats(),
    })
}

/// One provisioned rule as `(state, proto, c1, c2) -> next action update`
fn describe((key, leaf): &(TransitionKey, TransitionLeaf)) -> String {
    let action = leaf
        .decode_action()
        .map_or_else(|| format!("action#{}", leaf.action), |a| a.to_string());
    let update = leaf
        .decode_update()
        .map_or_else(|| format!("update#{}", leaf.update_function), |u| format!("{u:?}"));
    format!("{key} -> {} {action} {update}", leaf.next_state)
}
