use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use im::Vector;
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, info_span};

use crate::distance::DistanceTable;
use crate::error::{Error, GraphError, InvariantError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Strategy {
    /// Plain depth first search over every ordering. Only practical for small networks.
    Exhaustive,
    /// Depth first search with a cache keyed by position, time left and opened valves.
    Memoized,
    /// Work stack search that drops branches which can't beat the best total so far.
    #[default]
    BranchAndBound,
    /// Branch and bound with the first move of each branch fanned out over rayon.
    Parallel,
}

/// Where the search is, how long is left, and which valves are already open.
///
/// `opened` is a bitmask over the flow valve positions of a [`DistanceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchState {
    pub position: usize,
    pub remaining: u64,
    pub opened: u64,
}

impl SearchState {
    pub fn new(
        position: usize,
        remaining: i64,
        opened: u64,
    ) -> Result<SearchState, InvariantError> {
        let remaining =
            u64::try_from(remaining).map_err(|_| InvariantError::NegativeTime(remaining))?;

        Ok(SearchState {
            position,
            remaining,
            opened,
        })
    }

    pub fn is_open(&self, valve: usize) -> bool {
        self.opened & (1u64 << valve) != 0
    }

    // Walk to `valve` and spend a minute opening it. The returned state's `remaining` is also
    // how many minutes the valve will flow for.
    fn open(self, valve: usize, distance: u32) -> Option<SearchState> {
        let remaining = self.remaining.checked_sub(u64::from(distance) + 1)?;

        Some(SearchState {
            position: valve,
            remaining,
            opened: self.opened | (1u64 << valve),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opening {
    pub valve: String,
    /// Minutes left once the valve is open.
    pub remaining: u64,
    pub released: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    pub openings: Vec<Opening>,
    pub total: u64,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.openings.is_empty() {
            return f.write_str("open nothing");
        }

        let steps = self
            .openings
            .iter()
            .map(|o| format!("{} ({} min, {})", o.valve, o.remaining, o.released))
            .join(" -> ");

        write!(f, "{} = {}", steps, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchStats {
    pub visited: u64,
    pub pruned: u64,
}

impl std::ops::Add for SearchStats {
    type Output = SearchStats;

    fn add(self, other: SearchStats) -> SearchStats {
        SearchStats {
            visited: self.visited + other.visited,
            pruned: self.pruned + other.pruned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub plan: Plan,
    pub stats: SearchStats,
}

impl Outcome {
    pub fn released(&self) -> u64 {
        self.plan.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    valve: usize,
    remaining: u64,
    released: u64,
}

// A partial solution on the branch and bound work stack. The path is a persistent vector, so
// siblings share everything up to where they diverge.
#[derive(Debug, Clone)]
struct Branch {
    state: SearchState,
    released: u64,
    path: Vector<Step>,
}

impl Branch {
    fn root(state: SearchState) -> Branch {
        Branch {
            state,
            released: 0,
            path: Vector::new(),
        }
    }

    fn advance(&self, next: SearchState, gain: u64) -> Branch {
        let mut path = self.path.clone();
        path.push_back(Step {
            valve: next.position,
            remaining: next.remaining,
            released: gain,
        });

        Branch {
            state: next,
            released: self.released + gain,
            path,
        }
    }
}

pub struct SearchEngine<'t> {
    table: &'t DistanceTable,
    strategy: Strategy,
}

impl<'t> SearchEngine<'t> {
    pub fn new(table: &'t DistanceTable) -> SearchEngine<'t> {
        SearchEngine {
            table,
            strategy: Strategy::default(),
        }
    }

    pub fn with_strategy(self, strategy: Strategy) -> SearchEngine<'t> {
        SearchEngine { strategy, ..self }
    }

    /// The state at the start valve with nothing open. A budget of zero or less leaves no time
    /// to do anything.
    pub fn initial(&self, minutes: i64) -> SearchState {
        SearchState {
            position: self.table.start(),
            remaining: minutes.max(0).unsigned_abs(),
            opened: 0,
        }
    }

    pub fn max_pressure(&self, minutes: i64) -> Result<u64, Error> {
        self.search(minutes).map(|outcome| outcome.released())
    }

    pub fn search(&self, minutes: i64) -> Result<Outcome, Error> {
        let state = self.initial(minutes);
        self.check_capacity(state)?;
        Ok(self.run(state))
    }

    /// Continue from an arbitrary state, which is checked against the table first.
    pub fn best_from(&self, state: SearchState) -> Result<Outcome, Error> {
        self.check(state)?;
        self.check_capacity(state)?;
        Ok(self.run(state))
    }

    // No total, gain or bound can exceed every valve flowing for the whole of the remaining
    // time, so once that fits in a u64 the search itself can't overflow.
    fn check_capacity(&self, state: SearchState) -> Result<(), GraphError> {
        self.table
            .valves()
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(v.flow_rate))
            .and_then(|flow| flow.checked_mul(state.remaining))
            .map(|_| ())
            .ok_or(GraphError::PressureOverflow {
                minutes: state.remaining,
            })
    }

    fn check(&self, state: SearchState) -> Result<(), InvariantError> {
        let len = self.table.positions();
        if state.position >= len {
            return Err(InvariantError::UnknownPosition {
                position: state.position,
                len,
            });
        }

        let valid = self.table.flow_mask();
        if state.opened & !valid != 0 {
            return Err(InvariantError::OpenedWithoutFlow {
                opened: state.opened,
                valid,
            });
        }

        Ok(())
    }

    fn run(&self, state: SearchState) -> Outcome {
        let span = info_span!("search", strategy = ?self.strategy, remaining = state.remaining);
        let _enter = span.enter();

        let outcome = match self.strategy {
            Strategy::Exhaustive => {
                let mut stats = SearchStats::default();
                let plan = self.reconstruct(state, |s| self.exhaustive(s, &mut stats));
                Outcome { plan, stats }
            }
            Strategy::Memoized => {
                let mut stats = SearchStats::default();
                let mut cache = HashMap::new();
                let plan = self.reconstruct(state, |s| self.memoized(s, &mut cache, &mut stats));
                debug!(cached = cache.len(), "memo cache filled");
                Outcome { plan, stats }
            }
            Strategy::BranchAndBound => {
                let mut stats = SearchStats::default();
                let floor = AtomicU64::new(0);
                let best = self.branch_and_bound(Branch::root(state), &floor, &mut stats);
                Outcome {
                    plan: self.plan_of(&best),
                    stats,
                }
            }
            Strategy::Parallel => {
                let (best, stats) = self.parallel(Branch::root(state));
                Outcome {
                    plan: self.plan_of(&best),
                    stats,
                }
            }
        };

        debug!(
            visited = outcome.stats.visited,
            pruned = outcome.stats.pruned,
            released = outcome.released(),
            "search finished"
        );

        outcome
    }

    /// Every valve that can still be reached and opened in time, with what opening it releases.
    fn moves(&self, state: SearchState) -> impl Iterator<Item = (SearchState, u64)> + '_ {
        let table = self.table;

        (0..table.len())
            .filter(move |&v| !state.is_open(v))
            .filter_map(move |v| {
                let next = state.open(v, table.distance(state.position, v))?;
                Some((next, table.flow_rate(v) * next.remaining))
            })
    }

    // Pretends every reachable closed valve gets opened straight from here. Any real sequence
    // reaches each valve no sooner than its direct distance, so this never undershoots.
    fn upper_bound(&self, state: SearchState) -> u64 {
        self.moves(state).map(|(_, gain)| gain).sum()
    }

    fn exhaustive(&self, state: SearchState, stats: &mut SearchStats) -> u64 {
        stats.visited += 1;

        self.moves(state)
            .map(|(next, gain)| gain + self.exhaustive(next, stats))
            .max()
            .unwrap_or(0)
    }

    fn memoized(
        &self,
        state: SearchState,
        cache: &mut HashMap<SearchState, u64>,
        stats: &mut SearchStats,
    ) -> u64 {
        if let Some(&best) = cache.get(&state) {
            return best;
        }

        stats.visited += 1;

        let best = self
            .moves(state)
            .map(|(next, gain)| gain + self.memoized(next, cache, stats))
            .max()
            .unwrap_or(0);

        cache.insert(state, best);
        best
    }

    // Follows the moves whose value adds up to the best total. Each chosen move releases
    // something, so the remaining target strictly shrinks.
    fn reconstruct<F>(&self, mut state: SearchState, mut value: F) -> Plan
    where
        F: FnMut(SearchState) -> u64,
    {
        let total = value(state);
        let mut target = total;
        let mut openings = vec![];

        while target > 0 {
            let Some((next, gain)) = self
                .moves(state)
                .find(|&(next, gain)| gain > 0 && gain + value(next) == target)
            else {
                break;
            };

            openings.push(Opening {
                valve: self.table.name(next.position).to_owned(),
                remaining: next.remaining,
                released: gain,
            });

            target -= gain;
            state = next;
        }

        Plan { openings, total }
    }

    fn branch_and_bound(&self, root: Branch, floor: &AtomicU64, stats: &mut SearchStats) -> Branch {
        floor.fetch_max(root.released, Ordering::Relaxed);

        let mut best = root.clone();
        let mut current = vec![root];

        while let Some(branch) = current.pop() {
            stats.visited += 1;

            if branch.released > best.released {
                floor.fetch_max(branch.released, Ordering::Relaxed);
                best = branch.clone();
            }

            // Highest gain ends up on top of the stack, which tends to raise the floor early.
            let children = self
                .moves(branch.state)
                .map(|(next, gain)| branch.advance(next, gain))
                .filter(|child| {
                    let bound = child.released + self.upper_bound(child.state);
                    let keep = bound > floor.load(Ordering::Relaxed);
                    if !keep {
                        stats.pruned += 1;
                    }
                    keep
                })
                .sorted_by_key(|child| child.released);

            current.extend(children);
        }

        best
    }

    fn parallel(&self, root: Branch) -> (Branch, SearchStats) {
        let floor = AtomicU64::new(0);

        let children: Vec<Branch> = self
            .moves(root.state)
            .map(|(next, gain)| root.advance(next, gain))
            .collect();

        let (best, stats) = children
            .into_par_iter()
            .map(|child| {
                let mut stats = SearchStats::default();
                let best = self.branch_and_bound(child, &floor, &mut stats);
                (best, stats)
            })
            .reduce(
                || (root.clone(), SearchStats::default()),
                |(a, a_stats), (b, b_stats)| {
                    let best = if b.released > a.released { b } else { a };
                    (best, a_stats + b_stats)
                },
            );

        let root_visit = SearchStats {
            visited: 1,
            pruned: 0,
        };

        (best, stats + root_visit)
    }

    fn plan_of(&self, branch: &Branch) -> Plan {
        Plan {
            openings: branch
                .path
                .iter()
                .map(|step| Opening {
                    valve: self.table.name(step.valve).to_owned(),
                    remaining: step.remaining,
                    released: step.released,
                })
                .collect(),
            total: branch.released,
        }
    }
}
