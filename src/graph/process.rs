use std::collections::BTreeSet;

use log::debug;
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;

use super::{Graph, NodeRef, State};
use crate::boolean::{Cover, Cube};
use crate::variable::VariableSet;

impl Graph {
    /// Normalizes the graph and derives local and remote actions.
    ///
    /// Place and transition indices change; nothing computed against the old
    /// numbering stays valid.
    pub fn post_process(&mut self, variables: &VariableSet, aggressive: bool) {
        let before = (self.places.len(), self.transitions.len());

        while let Some(t) = self.find_removable_skip() {
            self.collapse_skip(t);
        }

        if aggressive {
            self.fold_duplicates();
            self.remove_unreachable();
        }

        self.remove_isolated_places();
        self.update_actions(variables);
        self.update_regions();
        self.clear_annotations();

        debug!(
            "post-process: {} places, {} transitions -> {} places, {} transitions",
            before.0,
            before.1,
            self.places.len(),
            self.transitions.len()
        );
    }

    pub(crate) fn update_actions(&mut self, variables: &VariableSet) {
        for transition in &mut self.transitions {
            let region = transition.region;

            let local = transition
                .action
                .cubes()
                .iter()
                .filter_map(|c| {
                    Cube::from_literals(
                        c.literals()
                            .map(|(v, b)| (variables.copy_in(v, region).unwrap_or(v), b)),
                    )
                })
                .collect();

            let remote = transition
                .action
                .cubes()
                .iter()
                .filter_map(|c| {
                    Cube::from_literals(c.literals().flat_map(|(v, b)| {
                        let copies = variables.copies(v);
                        if copies.is_empty() {
                            vec![(v, b)]
                        } else {
                            copies.into_iter().map(|c| (c, b)).collect()
                        }
                    }))
                })
                .collect();

            transition.local_action = Cover::from_terms(local);
            transition.remote_action = Cover::from_terms(remote);
        }
    }

    fn update_regions(&mut self) {
        for p in 0..self.places.len() {
            let regions: BTreeSet<usize> = self
                .place_inputs(p)
                .into_iter()
                .chain(self.place_outputs(p))
                .map(|t| self.transitions[t].region)
                .collect();
            self.places[p].regions = regions;
        }
    }

    fn find_removable_skip(&self) -> Option<usize> {
        (0..self.transitions.len()).find(|&t| {
            if !self.transitions[t].is_skip() {
                return false;
            }

            let (inputs, outputs) = (self.inputs(t), self.outputs(t));
            let ([p], [q]) = (inputs.as_slice(), outputs.as_slice()) else {
                return false;
            };
            p == q || self.place_outputs(*p).len() == 1 || self.place_inputs(*q).len() == 1
        })
    }

    fn collapse_skip(&mut self, t: usize) {
        let p = self.inputs(t)[0];
        let q = self.outputs(t)[0];
        self.remove_transition(t);
        if p != q {
            self.merge_places(p.min(q), p.max(q));
        }
    }

    fn fold_duplicates(&mut self) {
        loop {
            let duplicate = (0..self.transitions.len()).find_map(|j| {
                (0..j)
                    .find(|&i| self.same_transition(i, j))
                    .map(|_| j)
            });

            let Some(j) = duplicate else {
                break;
            };
            debug!("post-process: folding duplicate transition T{j}");
            self.remove_transition(j);
        }
    }

    fn same_transition(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.transitions[i], &self.transitions[j]);
        a.guard == b.guard
            && a.action == b.action
            && a.region == b.region
            && self.inputs(i) == self.inputs(j)
            && self.outputs(i) == self.outputs(j)
    }

    fn remove_unreachable(&mut self) {
        let seeds: BTreeSet<usize> = self
            .initial_states()
            .iter()
            .chain(&self.source)
            .flat_map(|s| s.tokens.iter().copied())
            .collect();
        if seeds.is_empty() {
            return;
        }

        let graph = self.to_petgraph();
        let mut reached = BTreeSet::new();
        let mut dfs = Dfs::empty(&graph);
        for seed in seeds {
            dfs.move_to(NodeIndex::new(seed));
            while let Some(node) = dfs.next(&graph) {
                reached.insert(graph[node]);
            }
        }

        let transitions: Vec<usize> = (0..self.transitions.len())
            .filter(|t| !reached.contains(&NodeRef::Transition(*t)))
            .collect();
        let places: Vec<usize> = (0..self.places.len())
            .filter(|p| !reached.contains(&NodeRef::Place(*p)))
            .collect();

        for t in transitions.into_iter().rev() {
            self.remove_transition(t);
        }
        for p in places.into_iter().rev() {
            self.remove_place(p);
        }
    }

    fn remove_isolated_places(&mut self) {
        let isolated: Vec<usize> = (0..self.places.len())
            .filter(|p| {
                let node = NodeRef::Place(*p);
                !self.arcs.iter().any(|(a, b)| *a == node || *b == node)
                    && !self.states().any(|s| s.tokens.contains(p))
            })
            .collect();

        for p in isolated.into_iter().rev() {
            self.remove_place(p);
        }
    }

    fn remove_transition(&mut self, t: usize) {
        let node = NodeRef::Transition(t);
        self.arcs.retain(|(a, b)| *a != node && *b != node);
        for (a, b) in &mut self.arcs {
            for n in [a, b] {
                if let NodeRef::Transition(i) = n
                    && *i > t
                {
                    *i -= 1;
                }
            }
        }
        self.transitions.remove(t);
    }

    /// Redirects every arc and token of `drop` onto `keep`, then deletes `drop`.
    fn merge_places(&mut self, keep: usize, drop: usize) {
        for (a, b) in &mut self.arcs {
            for n in [a, b] {
                if *n == NodeRef::Place(drop) {
                    *n = NodeRef::Place(keep);
                }
            }
        }
        let mut seen = BTreeSet::new();
        self.arcs.retain(|arc| seen.insert(*arc));

        for state in self.states_mut() {
            let tokens = state
                .tokens
                .iter()
                .map(|p| if *p == drop { keep } else { *p })
                .collect();
            *state = State::new(tokens, std::mem::take(&mut state.encoding));
        }

        self.remove_place(drop);
    }

    fn remove_place(&mut self, p: usize) {
        let node = NodeRef::Place(p);
        self.arcs.retain(|(a, b)| *a != node && *b != node);
        for (a, b) in &mut self.arcs {
            for n in [a, b] {
                if let NodeRef::Place(i) = n
                    && *i > p
                {
                    *i -= 1;
                }
            }
        }

        for state in self.states_mut() {
            state.tokens.retain(|i| *i != p);
            for i in &mut state.tokens {
                if *i > p {
                    *i -= 1;
                }
            }
        }
        self.places.remove(p);
    }

    fn states(&self) -> impl Iterator<Item = &State> {
        self.source.iter().chain(&self.sink).chain(&self.reset)
    }

    fn states_mut(&mut self) -> impl Iterator<Item = &mut State> {
        self.source
            .iter_mut()
            .chain(self.sink.iter_mut())
            .chain(self.reset.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::Cube;
    use crate::graph::{Composition, Transition};
    use crate::variable::VariableKind;

    #[test]
    fn test_sequence_skips_collapse() {
        let mut vars = VariableSet::new();
        let x = vars.define("x", 0, VariableKind::Boolean);

        let mut graph = Graph::assignment(Cube::literal(x, true), 0);
        graph.merge(
            Composition::Sequence,
            Graph::assignment(Cube::literal(x, false), 0),
        );
        graph.repeat();
        graph.post_process(&vars, false);

        assert_eq!(graph.transitions.len(), 2);
        assert_eq!(graph.places.len(), 2);
        assert!(graph.transitions.iter().all(Transition::assigns));
        assert_eq!(graph.source[0].tokens, vec![0]);
        assert_eq!(graph.outputs(1), vec![0]);
    }

    #[test]
    fn test_choice_entry_feeds_guards() {
        let mut vars = VariableSet::new();
        let a = vars.define("a", 0, VariableKind::Boolean);

        let mut graph = Graph::guard(Cover::from(Cube::literal(a, true)), 0);
        graph.merge(
            Composition::Choice,
            Graph::guard(Cover::from(Cube::literal(a, false)), 0),
        );
        graph.post_process(&vars, false);

        let entry = graph.source[0].tokens[0];
        let outputs = graph.place_outputs(entry);
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|t| !graph.transitions[*t].is_skip()));
    }

    #[test]
    fn test_remote_action_reaches_every_copy() {
        let mut vars = VariableSet::new();
        let a0 = vars.define("a", 0, VariableKind::Boolean);
        let a1 = vars.define("a", 1, VariableKind::Boolean);

        let mut graph = Graph::assignment(Cube::literal(a1, true), 1);
        graph.post_process(&vars, false);

        let t = &graph.transitions[0];
        assert_eq!(t.local_action, Cover::from(Cube::literal(a1, true)));
        let both = Cube::from_literals([(a0, true), (a1, true)]).unwrap();
        assert_eq!(t.remote_action, Cover::from(both));
        assert_eq!(graph.places[0].regions, BTreeSet::from([1]));
    }

    #[test]
    fn test_aggressive_folds_duplicates() {
        let vars = VariableSet::new();
        let mut graph = Graph::new();
        let p = graph.create_place();
        let q = graph.create_place();
        for _ in 0..2 {
            let t = graph.create_transition(Transition::new(
                Cover::from(Cube::literal(0, true)),
                Cover::tautology(),
                0,
            ));
            graph.arc(NodeRef::Place(p), NodeRef::Transition(t));
            graph.arc(NodeRef::Transition(t), NodeRef::Place(q));
        }
        let orphan = graph.create_place();
        let dead = graph.create_transition(Transition::skip(0));
        graph.arc(NodeRef::Place(orphan), NodeRef::Transition(dead));
        graph.reset.push(State::new(vec![p], Cube::new()));

        graph.post_process(&vars, true);
        assert_eq!(graph.transitions.len(), 1);
        assert_eq!(graph.places.len(), 2);
    }
}
