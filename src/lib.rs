pub mod distance;
pub mod error;
pub mod network;
pub mod parser;
pub mod search;

pub use distance::DistanceTable;
pub use error::{Error, GraphError, InvariantError, ParseError};
pub use network::{Valve, ValveNetwork};
pub use search::{Opening, Outcome, Plan, SearchEngine, SearchState, SearchStats, Strategy};

pub const TIME_LIMIT: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub minutes: i64,
    /// Overrides the default start of `AA`, or the first valve listed when there's no `AA`.
    pub start: Option<String>,
    pub strategy: Strategy,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            minutes: TIME_LIMIT,
            start: None,
            strategy: Strategy::default(),
        }
    }
}

/// Parse a network description and find the best set of valves to open in it.
pub fn solve(input: &str, config: &Config) -> Result<Outcome, Error> {
    let mut network = ValveNetwork::parse(input)?;
    if let Some(start) = &config.start {
        network = network.with_start(start)?;
    }

    let table = DistanceTable::build(&network)?;
    let engine = SearchEngine::new(&table).with_strategy(config.strategy);

    engine.search(config.minutes)
}

pub fn max_pressure(input: &str, minutes: i64) -> Result<u64, Error> {
    let config = Config {
        minutes,
        ..Config::default()
    };

    solve(input, &config).map(|outcome| outcome.released())
}
