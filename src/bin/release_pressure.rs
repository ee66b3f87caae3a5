use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use valves::{solve, Config, Strategy, TIME_LIMIT};

/// Work out the most pressure that can be released from a network of valves.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Valve descriptions, one per line. Read from stdin when omitted.
    input: Option<PathBuf>,

    /// Minutes available.
    #[arg(short, long, default_value_t = TIME_LIMIT, allow_negative_numbers = true)]
    minutes: i64,

    /// Valve to start at. Defaults to AA, or the first valve listed if there is no AA.
    #[arg(short, long)]
    start: Option<String>,

    #[arg(long, value_enum, default_value_t = Strategy::default())]
    strategy: Strategy,

    /// Also print the order the valves are opened in.
    #[arg(long)]
    plan: bool,
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("valves=info,release_pressure=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let input = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let config = Config {
        minutes: args.minutes,
        start: args.start,
        strategy: args.strategy,
    };

    let outcome = solve(&input, &config)?;

    info!(
        visited = outcome.stats.visited,
        pruned = outcome.stats.pruned,
        plan = %outcome.plan,
        "done"
    );

    println!("{}", outcome.released());
    if args.plan {
        for opening in &outcome.plan.openings {
            println!(
                "{} {} {}",
                opening.valve, opening.remaining, opening.released
            );
        }
    }

    Ok(())
}
