//! Reduced ordered MDD construction (§4.A.2).
//!
//! [`MddFactory`] builds a [`MddGraph`] either from an explicit tuple set
//! (top-down trie, then bottom-up `Reduce` with hash-consing) or from a
//! transition automaton ([`RegularSpec`]), trimming states with no path to
//! an accepting state before the same `Reduce` pass. Grounded on
//! `examples/original_source/ortools/constraint_solver/ac4_mdd_reset_table.cc`'s
//! node/edge model, expressed here as a flat arena rather than raw pointers
//! (§9's "raw pointer graphs" redesign note).

use std::collections::HashMap;

use crate::table::tuple_table::IntTupleSet;

/// A transition-automaton specification for [`MddFactory::from_regular`].
#[derive(Clone, Debug)]
pub struct RegularSpec {
    pub initial_state: u32,
    pub final_states: Vec<u32>,
    /// `(from_state, value, to_state)` triples; applied identically at every
    /// position of the length-`length` sequence.
    pub transitions: Vec<(u32, i64, u32)>,
    pub length: usize,
}

#[derive(Clone, Copy, Debug)]
enum RawChild {
    Terminal,
    Node(u32),
}

/// A flat, reduced ordered MDD: dense node and edge ids, immutable topology
/// (out/in edge lists per node, nodes per level), ready for a propagator to
/// lay reversible structures on top of (§3.2).
#[derive(Clone, Debug)]
pub struct MddGraph {
    arity: usize,
    value_to_index: Vec<HashMap<i64, u32>>,
    index_to_value: Vec<Vec<i64>>,
    /// `node_level[0]` is always the unique terminal, at level `arity`.
    node_level: Vec<u32>,
    levels: Vec<Vec<u32>>,
    out_topology: Vec<Vec<u32>>,
    in_topology: Vec<Vec<u32>>,
    /// `(start_node, end_node, value_index)` per edge.
    edges: Vec<(u32, u32, u32)>,
    root: u32,
}

const TERMINAL: u32 = 0;

impl MddGraph {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn num_nodes(&self) -> usize {
        self.node_level.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn terminal(&self) -> u32 {
        TERMINAL
    }

    pub fn node_level(&self, node: u32) -> u32 {
        self.node_level[node as usize]
    }

    pub fn nodes_at_level(&self, level: usize) -> &[u32] {
        &self.levels[level]
    }

    pub fn out_edges(&self, node: u32) -> &[u32] {
        &self.out_topology[node as usize]
    }

    pub fn in_edges(&self, node: u32) -> &[u32] {
        &self.in_topology[node as usize]
    }

    pub fn edge_start(&self, edge: u32) -> u32 {
        self.edges[edge as usize].0
    }

    pub fn edge_end(&self, edge: u32) -> u32 {
        self.edges[edge as usize].1
    }

    pub fn edge_value_index(&self, edge: u32) -> u32 {
        self.edges[edge as usize].2
    }

    pub fn num_value_indices(&self, level: usize) -> usize {
        self.index_to_value[level].len()
    }

    pub fn value_index(&self, level: usize, value: i64) -> Option<u32> {
        self.value_to_index[level].get(&value).copied()
    }

    pub fn value_of(&self, level: usize, value_index: u32) -> i64 {
        self.index_to_value[level][value_index as usize]
    }
}

/// Builds [`MddGraph`]s from explicit tuples or a regular-language spec.
pub struct MddFactory;

impl MddFactory {
    /// §4.A.2.1: top-down trie from explicit tuples, then bottom-up reduce.
    pub fn from_tuples(tuples: &dyn IntTupleSet) -> MddGraph {
        let arity = tuples.arity();
        let (value_to_index, index_to_value) = build_value_bijections(tuples);

        let mut raw_nodes: Vec<Vec<HashMap<u32, RawChild>>> = vec![Vec::new(); arity];
        raw_nodes[0].push(HashMap::new());
        let root_raw = 0u32;

        for t in 0..tuples.num_tuples() {
            let mut cur = root_raw;
            for level in 0..arity {
                let val = tuples.value(t, level);
                let vi = value_to_index[level][&val];
                let existing = raw_nodes[level][cur as usize].get(&vi).copied();
                let child = match existing {
                    Some(c) => c,
                    None => {
                        let child = if level + 1 == arity {
                            RawChild::Terminal
                        } else {
                            let new_id = raw_nodes[level + 1].len() as u32;
                            raw_nodes[level + 1].push(HashMap::new());
                            RawChild::Node(new_id)
                        };
                        raw_nodes[level][cur as usize].insert(vi, child);
                        child
                    }
                };
                if let RawChild::Node(next) = child {
                    cur = next;
                }
            }
        }

        let raw_nodes: Vec<Vec<Vec<(u32, RawChild)>>> = raw_nodes
            .into_iter()
            .map(|level_nodes| level_nodes.into_iter().map(|m| m.into_iter().collect()).collect())
            .collect();

        reduce_bottom_up(arity, value_to_index, index_to_value, raw_nodes, root_raw)
    }

    /// §4.A.2.2: grid `(level, state)` from a transition automaton, pruning
    /// states with no forward path to an accepting state at the final
    /// level, then the same bottom-up reduce.
    pub fn from_regular(spec: &RegularSpec) -> MddGraph {
        let arity = spec.length;
        let mut values: Vec<i64> = spec.transitions.iter().map(|&(_, v, _)| v).collect();
        values.sort_unstable();
        values.dedup();
        let index_to_value: Vec<Vec<i64>> = (0..arity).map(|_| values.clone()).collect();
        let value_to_index: Vec<HashMap<i64, u32>> = (0..arity)
            .map(|_| values.iter().enumerate().map(|(i, &v)| (v, i as u32)).collect())
            .collect();

        let mut raw_nodes: Vec<Vec<HashMap<u32, RawChild>>> = vec![Vec::new(); arity];
        let mut state_at_level: Vec<HashMap<u32, u32>> = vec![HashMap::new(); arity + 1];
        raw_nodes[0].push(HashMap::new());
        state_at_level[0].insert(spec.initial_state, 0);
        let root_raw = 0u32;

        for level in 0..arity {
            let frontier: Vec<(u32, u32)> =
                state_at_level[level].iter().map(|(&s, &r)| (s, r)).collect();
            for (state, raw) in frontier {
                for &(from, val, to) in &spec.transitions {
                    if from != state {
                        continue;
                    }
                    let vi = value_to_index[level][&val];
                    if level + 1 == arity {
                        if spec.final_states.contains(&to) {
                            raw_nodes[level][raw as usize].insert(vi, RawChild::Terminal);
                        }
                        continue;
                    }
                    let child_raw = *state_at_level[level + 1].entry(to).or_insert_with(|| {
                        let id = raw_nodes[level + 1].len() as u32;
                        raw_nodes[level + 1].push(HashMap::new());
                        id
                    });
                    raw_nodes[level][raw as usize].insert(vi, RawChild::Node(child_raw));
                }
            }
        }

        let raw_nodes: Vec<Vec<Vec<(u32, RawChild)>>> = raw_nodes
            .into_iter()
            .map(|level_nodes| level_nodes.into_iter().map(|m| m.into_iter().collect()).collect())
            .collect();

        reduce_bottom_up(arity, value_to_index, index_to_value, raw_nodes, root_raw)
    }
}

fn build_value_bijections(tuples: &dyn IntTupleSet) -> (Vec<HashMap<i64, u32>>, Vec<Vec<i64>>) {
    let arity = tuples.arity();
    let mut value_to_index: Vec<HashMap<i64, u32>> = vec![HashMap::new(); arity];
    let mut index_to_value: Vec<Vec<i64>> = vec![Vec::new(); arity];
    for col in 0..arity {
        let mut values: Vec<i64> = (0..tuples.num_tuples()).map(|t| tuples.value(t, col)).collect();
        values.sort_unstable();
        values.dedup();
        for v in values {
            let idx = index_to_value[col].len() as u32;
            index_to_value[col].push(v);
            value_to_index[col].insert(v, idx);
        }
    }
    (value_to_index, index_to_value)
}

/// §4.A.2 `Reduce`: bottom-up hash-consing of equivalent subtrees, deleting
/// nodes whose children all turned out dead (cascades upward through
/// however many levels are affected).
fn reduce_bottom_up(
    arity: usize,
    value_to_index: Vec<HashMap<i64, u32>>,
    index_to_value: Vec<Vec<i64>>,
    raw_nodes: Vec<Vec<Vec<(u32, RawChild)>>>,
    root_raw: u32,
) -> MddGraph {
    const DEAD: u32 = u32::MAX;

    let mut node_level: Vec<u32> = vec![arity as u32]; // index 0: terminal
    let mut out_children: Vec<Vec<(u32, u32)>> = vec![Vec::new()];
    let mut canon_id_of_raw: Vec<Vec<u32>> = vec![Vec::new(); arity];
    let mut canon_map_per_level: Vec<HashMap<Vec<(u32, u32)>, u32>> = vec![HashMap::new(); arity];

    for level in (0..arity).rev() {
        canon_id_of_raw[level] = vec![DEAD; raw_nodes[level].len()];
        for (raw_id, children) in raw_nodes[level].iter().enumerate() {
            let mut sig: Vec<(u32, u32)> = Vec::with_capacity(children.len());
            for &(vi, rc) in children {
                let cid = match rc {
                    RawChild::Terminal => Some(TERMINAL),
                    RawChild::Node(r) => {
                        let c = canon_id_of_raw[level + 1][r as usize];
                        (c != DEAD).then_some(c)
                    }
                };
                if let Some(cid) = cid {
                    sig.push((vi, cid));
                }
            }
            if sig.is_empty() {
                continue;
            }
            sig.sort_unstable();
            sig.dedup();

            let canon = *canon_map_per_level[level].entry(sig.clone()).or_insert_with(|| {
                let id = node_level.len() as u32;
                node_level.push(level as u32);
                out_children.push(sig.clone());
                id
            });
            canon_id_of_raw[level][raw_id] = canon;
        }
    }

    let root = canon_id_of_raw[0].get(root_raw as usize).copied().unwrap_or(TERMINAL);

    let num_nodes = node_level.len();
    let mut out_topology: Vec<Vec<u32>> = vec![Vec::new(); num_nodes];
    let mut in_topology: Vec<Vec<u32>> = vec![Vec::new(); num_nodes];
    let mut edges: Vec<(u32, u32, u32)> = Vec::new();
    for (n, children) in out_children.iter().enumerate() {
        for &(vi, child) in children {
            let eid = edges.len() as u32;
            edges.push((n as u32, child, vi));
            out_topology[n].push(eid);
            in_topology[child as usize].push(eid);
        }
    }

    let mut levels: Vec<Vec<u32>> = vec![Vec::new(); arity + 1];
    for (id, &lvl) in node_level.iter().enumerate() {
        levels[lvl as usize].push(id as u32);
    }

    MddGraph {
        arity,
        value_to_index,
        index_to_value,
        node_level,
        levels,
        out_topology,
        in_topology,
        edges,
        root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tuple_table::VecTupleSet;

    #[test]
    fn from_tuples_shares_a_single_terminal() {
        let set = VecTupleSet::new(vec![vec![1, 1], vec![1, 2], vec![2, 2]]);
        let g = MddFactory::from_tuples(&set);
        assert_eq!(g.arity(), 2);
        assert_eq!(g.num_edges(), 3);
        // every edge ends either at an intermediate node or the shared terminal.
        for e in 0..g.num_edges() as u32 {
            if g.node_level(g.edge_start(e)) + 1 == g.arity() as u32 {
                assert_eq!(g.edge_end(e), g.terminal());
            }
        }
    }

    #[test]
    fn from_tuples_hash_conses_equivalent_suffixes() {
        // (1,1,9) and (2,1,9): the level-1 "value=1 -> terminal-via-9" suffix
        // is identical in both branches and must collapse to one node.
        let set = VecTupleSet::new(vec![vec![1, 1, 9], vec![2, 1, 9]]);
        let g = MddFactory::from_tuples(&set);
        assert_eq!(g.nodes_at_level(1).len(), 1);
    }

    #[test]
    fn from_regular_accepts_e2_language() {
        // alphabet 0='a', 1='b'; s0 -a-> s1 -b-> s2 -a-> s2; final {s2}; length 3.
        let spec = RegularSpec {
            initial_state: 0,
            final_states: vec![2],
            transitions: vec![(0, 0, 1), (1, 1, 2), (2, 0, 2)],
            length: 3,
        };
        let g = MddFactory::from_regular(&spec);
        assert_eq!(g.arity(), 3);
        // exactly one accepted word: a,b,a -> each level has exactly one
        // value index with a surviving edge, even though the alphabet (and
        // hence num_value_indices) spans both letters.
        let expected = [0i64, 1, 0];
        for level in 0..3 {
            let alive_values: Vec<i64> = (0..g.num_edges() as u32)
                .filter(|&e| g.node_level(g.edge_start(e)) as usize == level)
                .map(|e| g.value_of(level, g.edge_value_index(e)))
                .collect();
            assert_eq!(alive_values, vec![expected[level]]);
        }
    }
}
