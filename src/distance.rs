use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::GraphError;
use crate::network::{ValveId, ValveNetwork};

/// Opened valves are tracked as bits of a `u64`.
pub const MAX_FLOW_VALVES: usize = u64::BITS as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowValve {
    pub id: ValveId,
    pub name: String,
    pub flow_rate: u64,
}

/// Minute counts between the start valve and every valve worth opening.
///
/// Positions `0..len()` are the flow-positive valves in input order, and double as their bit in
/// an opened mask. Position `len()` is the start valve, which only ever appears as a source: the
/// search leaves it and never comes back, so nothing needs a path into it. If the start valve
/// itself has flow it also appears as a target, at distance zero from the start row.
#[derive(Debug)]
pub struct DistanceTable {
    valves: Vec<FlowValve>,
    start: String,
    distances: Vec<Vec<u32>>,
}

impl DistanceTable {
    pub fn build(network: &ValveNetwork) -> Result<DistanceTable, GraphError> {
        let valves: Vec<FlowValve> = network
            .flow_valves()
            .map(|v| FlowValve {
                id: v.id,
                name: v.name.clone(),
                flow_rate: v.flow_rate,
            })
            .collect();

        if valves.len() > MAX_FLOW_VALVES {
            return Err(GraphError::TooManyValves {
                count: valves.len(),
                max: MAX_FLOW_VALVES,
            });
        }

        let start = network.start();
        let targets: Vec<(ValveId, &str)> =
            valves.iter().map(|v| (v.id, v.name.as_str())).collect();
        let sources = targets
            .iter()
            .copied()
            .chain(std::iter::once((start.id, start.name.as_str())));

        let distances = sources
            .map(|(from, from_name)| {
                let reached = walk_distances(network, from);

                targets
                    .iter()
                    .map(|&(to, to_name)| {
                        reached
                            .get(&to)
                            .copied()
                            .ok_or_else(|| GraphError::Unreachable {
                                from: from_name.to_owned(),
                                to: to_name.to_owned(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(flowing = valves.len(), start = %start.name, "built distance table");

        Ok(DistanceTable {
            valves,
            start: start.name.clone(),
            distances,
        })
    }

    /// Number of flow-positive valves.
    pub fn len(&self) -> usize {
        self.valves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valves.is_empty()
    }

    /// Number of rows, including the start. There are only `len()` columns.
    pub fn positions(&self) -> usize {
        self.valves.len() + 1
    }

    pub fn start(&self) -> usize {
        self.valves.len()
    }

    pub fn distance(&self, from: usize, to: usize) -> u32 {
        self.distances[from][to]
    }

    pub fn flow_rate(&self, position: usize) -> u64 {
        self.valves.get(position).map_or(0, |v| v.flow_rate)
    }

    pub fn name(&self, position: usize) -> &str {
        self.valves
            .get(position)
            .map_or(self.start.as_str(), |v| v.name.as_str())
    }

    pub fn valves(&self) -> &[FlowValve] {
        &self.valves
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        if name == self.start {
            Some(self.start())
        } else {
            self.valves.iter().position(|v| v.name == name)
        }
    }

    /// Every bit that names a flow-positive valve.
    pub fn flow_mask(&self) -> u64 {
        match self.valves.len() {
            MAX_FLOW_VALVES => u64::MAX,
            n => (1u64 << n) - 1,
        }
    }
}

// Breadth first, a whole frontier at a time. Every valve reachable from `from` ends up in the
// result, including `from` itself at zero.
fn walk_distances(network: &ValveNetwork, from: ValveId) -> HashMap<ValveId, u32> {
    let mut out = HashMap::from([(from, 0)]);
    let mut current = HashSet::from([from]);

    for cost in 1.. {
        current = current
            .into_iter()
            .flat_map(|id| network.get(id).neighbors.iter())
            .copied()
            .filter(|id| !out.contains_key(id))
            .collect();

        if current.is_empty() {
            break;
        }

        out.extend(current.iter().map(|&id| (id, cost)));
    }

    out
}
