use thiserror::Error;

/// Anything that can go wrong between reading the network and finishing a search.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: {source}")]
    Syntax {
        line: usize,
        #[source]
        source: nom::error::Error<String>,
    },

    #[error("line {line}: valve {valve} is defined more than once")]
    DuplicateValve { line: usize, valve: String },

    #[error("valve {valve} has a tunnel to undefined valve {neighbor}")]
    UnknownNeighbor { valve: String, neighbor: String },

    #[error("input does not describe any valves")]
    Empty,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("start valve {0} is not in the network")]
    MissingStart(String),

    #[error("valve {to} cannot be reached from valve {from}")]
    Unreachable { from: String, to: String },

    #[error("{count} valves have a positive flow rate, at most {max} are supported")]
    TooManyValves { count: usize, max: usize },

    #[error("total pressure over {minutes} minutes can exceed a 64-bit integer")]
    PressureOverflow { minutes: u64 },
}

// These only surface if the engine itself is broken, or a caller hands it a made up state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("search state has negative remaining time ({0} minutes)")]
    NegativeTime(i64),

    #[error("opened set {opened:#b} names valves without flow (valid mask {valid:#b})")]
    OpenedWithoutFlow { opened: u64, valid: u64 },

    #[error("search state position {position} is outside the distance table ({len} entries)")]
    UnknownPosition { position: usize, len: usize },
}
