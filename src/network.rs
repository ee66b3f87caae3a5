use std::collections::HashMap;
use std::str::FromStr;

use id_arena::{Arena, Id};
use itertools::Itertools;
use tracing::debug;

use crate::error::{GraphError, ParseError};
use crate::parser::nom_parse_to_owned;

pub const DEFAULT_START: &str = "AA";

pub type ValveId = Id<Valve>;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Valve {
    pub id: ValveId,
    pub name: String,
    pub flow_rate: u64,
    pub neighbors: Vec<ValveId>,
}

/// A read-only tunnel network. Valves live in an arena and refer to each other by id, so the
/// graph can be cyclic without any shared ownership.
#[derive(Debug)]
pub struct ValveNetwork {
    arena: Arena<Valve>,
    ids: HashMap<String, ValveId>,
    order: Vec<ValveId>,
    start: ValveId,
}

impl ValveNetwork {
    /// Parses one valve per line. The start is `AA` when present, otherwise the first valve in
    /// the input.
    pub fn parse(input: &str) -> Result<ValveNetwork, ParseError> {
        let mut records = vec![];

        for (i, line) in input.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let record = nom_parse_to_owned(parser::valve_line, line)
                .map_err(|source| ParseError::Syntax { line: i + 1, source })?;
            records.push((i + 1, record));
        }

        let network = records
            .into_iter()
            .try_fold(ValveNetworkBuilder::default(), ValveNetworkBuilder::accumulate)?
            .finish()?;

        if network.find(DEFAULT_START).is_none() {
            debug!(
                start = %network.first().name,
                "no {} valve, starting at the first one listed",
                DEFAULT_START
            );
        }

        debug!(
            valves = network.len(),
            flowing = network.flow_valves().count(),
            start = %network.start().name,
            "parsed valve network"
        );

        Ok(network)
    }

    pub fn with_start(self, name: &str) -> Result<ValveNetwork, GraphError> {
        let start = *self
            .ids
            .get(name)
            .ok_or_else(|| GraphError::MissingStart(name.to_owned()))?;

        Ok(ValveNetwork { start, ..self })
    }

    pub fn start(&self) -> &Valve {
        self.get(self.start)
    }

    /// The valve listed first in the input.
    pub fn first(&self) -> &Valve {
        self.get(self.order[0])
    }

    pub fn get(&self, id: ValveId) -> &Valve {
        &self.arena[id]
    }

    pub fn find(&self, name: &str) -> Option<&Valve> {
        self.ids.get(name).map(|&id| self.get(id))
    }

    /// All valves, in input order.
    pub fn valves(&self) -> impl Iterator<Item = &Valve> + '_ {
        self.order.iter().map(|&id| self.get(id))
    }

    pub fn flow_valves(&self) -> impl Iterator<Item = &Valve> + '_ {
        self.valves().filter(|v| v.flow_rate > 0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromStr for ValveNetwork {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValveNetwork::parse(s)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ValveRecord {
    name: String,
    flow_rate: u64,
    tunnels: Vec<String>,
}

#[derive(Default)]
struct ValveNetworkBuilder {
    arena: Arena<Valve>,
    ids: HashMap<String, ValveId>,
    order: Vec<ValveId>,
    tunnels: Vec<(ValveId, Vec<String>)>,
}

impl ValveNetworkBuilder {
    fn accumulate(
        mut self,
        (line, record): (usize, ValveRecord),
    ) -> Result<ValveNetworkBuilder, ParseError> {
        let ValveRecord {
            name,
            flow_rate,
            tunnels,
        } = record;

        if self.ids.contains_key(&name) {
            return Err(ParseError::DuplicateValve { line, valve: name });
        }

        let id = self.arena.alloc_with_id(|id| Valve {
            id,
            name: name.clone(),
            flow_rate,
            neighbors: vec![],
        });

        self.ids.insert(name, id);
        self.order.push(id);
        self.tunnels.push((id, tunnels));

        Ok(self)
    }

    // Tunnels can point forward to valves defined later, so they're resolved once everything
    // has an id.
    fn finish(self) -> Result<ValveNetwork, ParseError> {
        let ValveNetworkBuilder {
            mut arena,
            ids,
            order,
            tunnels,
        } = self;

        for (id, names) in tunnels {
            let neighbors = names
                .into_iter()
                .unique()
                .map(|n| match ids.get(&n) {
                    Some(&target) => Ok(target),
                    None => Err(ParseError::UnknownNeighbor {
                        valve: arena[id].name.clone(),
                        neighbor: n,
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;

            arena[id].neighbors = neighbors;
        }

        let start = ids
            .get(DEFAULT_START)
            .copied()
            .or_else(|| order.first().copied())
            .ok_or(ParseError::Empty)?;

        Ok(ValveNetwork {
            arena,
            ids,
            order,
            start,
        })
    }
}

mod parser {
    use super::*;

    use crate::parser::base10_numeric;

    use nom::{
        branch::alt,
        bytes::complete::tag,
        character::complete::alpha1,
        combinator::eof,
        multi::separated_list1,
        sequence::{preceded, terminated, tuple},
        IResult, Parser,
    };

    fn tunnels_marker(input: &str) -> IResult<&str, &str> {
        alt((
            tag("; tunnels lead to valves "),
            tag("; tunnel leads to valve "),
        ))
        .parse(input)
    }

    pub(super) fn valve_record(input: &str) -> IResult<&str, ValveRecord> {
        tuple((
            preceded(tag("Valve "), alpha1),
            preceded(tag(" has flow rate="), base10_numeric),
            preceded(tunnels_marker, separated_list1(tag(", "), alpha1)),
        ))
        .map(|(name, flow_rate, tunnels)| ValveRecord {
            name: name.to_owned(),
            flow_rate,
            tunnels: tunnels.into_iter().map(|t: &str| t.to_owned()).collect(),
        })
        .parse(input)
    }

    pub(super) fn valve_line(input: &str) -> IResult<&str, ValveRecord> {
        terminated(valve_record, eof).parse(input)
    }

}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = "\
        Valve AA has flow rate=0; tunnels lead to valves DD, II, BB\n\
        Valve BB has flow rate=13; tunnels lead to valves CC, AA\n\
        Valve CC has flow rate=2; tunnels lead to valves DD, BB\n\
        Valve DD has flow rate=20; tunnels lead to valves CC, AA, EE\n\
        Valve EE has flow rate=3; tunnels lead to valves FF, DD\n\
        Valve FF has flow rate=0; tunnels lead to valves EE, GG\n\
        Valve GG has flow rate=0; tunnels lead to valves FF, HH\n\
        Valve HH has flow rate=22; tunnel leads to valve GG\n\
        Valve II has flow rate=0; tunnels lead to valves AA, JJ\n\
        Valve JJ has flow rate=21; tunnel leads to valve II\n";

    fn ring_name(i: usize) -> String {
        format!("{}{}", (b'A' + (i / 26) as u8) as char, (b'A' + (i % 26) as u8) as char)
    }

    /// A loop of `len` valves named `AA`, `AB`, ... with each one's flow rate given by `flow`.
    pub(crate) fn ring(len: usize, flow: impl Fn(usize) -> u64) -> String {
        (0..len)
            .map(|i| {
                format!(
                    "Valve {} has flow rate={}; tunnels lead to valves {}, {}",
                    ring_name(i),
                    flow(i),
                    ring_name((i + len - 1) % len),
                    ring_name((i + 1) % len)
                )
            })
            .join("\n")
    }

    fn neighbor_names<'a>(network: &'a ValveNetwork, name: &str) -> Vec<&'a str> {
        let valve = network.find(name).expect(name);
        valve
            .neighbors
            .iter()
            .map(|&id| network.get(id).name.as_str())
            .collect()
    }

    #[test]
    fn test_parse_sample() {
        let network = ValveNetwork::parse(SAMPLE).unwrap();

        assert_eq!(network.len(), 10);
        assert_eq!(network.start().name, "AA");
        assert_eq!(network.first().name, "AA");
        assert_eq!(
            network
                .flow_valves()
                .map(|v| (v.name.as_str(), v.flow_rate))
                .collect::<Vec<_>>(),
            vec![
                ("BB", 13),
                ("CC", 2),
                ("DD", 20),
                ("EE", 3),
                ("HH", 22),
                ("JJ", 21)
            ]
        );
        assert_eq!(neighbor_names(&network, "AA"), vec!["DD", "II", "BB"]);
        assert_eq!(neighbor_names(&network, "HH"), vec!["GG"]);
    }

    #[test]
    fn test_parse_crlf_and_blank_lines() {
        let input = "Valve AA has flow rate=0; tunnel leads to valve BB\r\n\
                     \r\n\
                     Valve BB has flow rate=5; tunnel leads to valve AA\r\n";

        let network: ValveNetwork = input.parse().unwrap();
        assert_eq!(network.len(), 2);
        assert_eq!(network.find("BB").map(|v| v.flow_rate), Some(5));
    }

    #[test]
    fn test_start_falls_back_to_first_valve() {
        let input = "Valve ZZ has flow rate=0; tunnel leads to valve QQ\n\
                     Valve QQ has flow rate=7; tunnel leads to valve ZZ";

        let network = ValveNetwork::parse(input).unwrap();
        assert_eq!(network.start().name, "ZZ");

        let network = network.with_start("QQ").unwrap();
        assert_eq!(network.start().name, "QQ");
        assert_eq!(network.first().name, "ZZ");
    }

    #[test]
    fn test_missing_start() {
        let network = ValveNetwork::parse(SAMPLE).unwrap();
        match network.with_start("XX") {
            Err(GraphError::MissingStart(name)) => assert_eq!(name, "XX"),
            other => panic!("unexpected: {:?}", other.map(|n| n.start().name.clone())),
        }
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let input = "Valve AA has flow rate=0; tunnel leads to valve BB\n\
                     Valve BB has flow rate=five; tunnel leads to valve AA";

        match ValveNetwork::parse(input) {
            Err(ParseError::Syntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other.map(|n| n.len())),
        }
    }

    #[test]
    fn test_unknown_neighbor() {
        let input = "Valve AA has flow rate=0; tunnels lead to valves BB, CC\n\
                     Valve BB has flow rate=1; tunnel leads to valve AA";

        match ValveNetwork::parse(input) {
            Err(ParseError::UnknownNeighbor { valve, neighbor }) => {
                assert_eq!(valve, "AA");
                assert_eq!(neighbor, "CC");
            }
            other => panic!("unexpected: {:?}", other.map(|n| n.len())),
        }
    }

    #[test]
    fn test_duplicate_valve() {
        let input = "Valve AA has flow rate=0; tunnel leads to valve BB\n\
                     Valve BB has flow rate=1; tunnel leads to valve AA\n\
                     Valve AA has flow rate=3; tunnel leads to valve BB";

        match ValveNetwork::parse(input) {
            Err(ParseError::DuplicateValve { line, valve }) => {
                assert_eq!(line, 3);
                assert_eq!(valve, "AA");
            }
            other => panic!("unexpected: {:?}", other.map(|n| n.len())),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(ValveNetwork::parse(""), Err(ParseError::Empty)));
        assert!(matches!(ValveNetwork::parse("\n\n"), Err(ParseError::Empty)));
    }
}
