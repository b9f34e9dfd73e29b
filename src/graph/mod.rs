use std::collections::BTreeSet;

use petgraph::algo::has_path_connecting;
use petgraph::graph::NodeIndex;

use crate::Error;
use crate::boolean::{Cover, Cube};
use crate::variable::{VarId, VariableSet};

pub mod compose;
mod process;

pub use compose::Composition;

/// A node of the bipartite token-flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    Place(usize),
    Transition(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    /// Encodings reachable while the place holds a token.
    pub predicate: Cover,
    /// Encodings reachable while the place holds a token and can pass it on.
    pub effective: Cover,
    /// Encodings in which the token waits here: no satisfied wait lets it pass.
    pub resting: Cover,
    /// Branches taken at choice places on the way here, keyed by transition index.
    pub ghost: Cover,
    pub regions: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub guard: Cover,
    /// Alternative assignments; the tautology assigns nothing.
    pub action: Cover,
    pub region: usize,
    pub local_action: Cover,
    pub remote_action: Cover,
    /// Encodings in which the transition was found enabled.
    pub implicant: Cover,
}

impl Transition {
    pub fn new(guard: Cover, action: Cover, region: usize) -> Self {
        Self {
            local_action: action.clone(),
            remote_action: action.clone(),
            guard,
            action,
            region,
            implicant: Cover::new(),
        }
    }

    pub fn skip(region: usize) -> Self {
        Self::new(Cover::tautology(), Cover::tautology(), region)
    }

    pub fn assigns(&self) -> bool {
        self.action.cubes().iter().any(|c| !c.is_tautology())
    }

    pub fn is_skip(&self) -> bool {
        self.guard.is_tautology() && !self.assigns()
    }

    pub fn label(&self, variables: &VariableSet) -> String {
        let mut label = String::new();
        if !self.guard.is_tautology() {
            label.push_str(&format!("[{}]", self.guard.display(variables)));
        }

        let terms = self
            .action
            .cubes()
            .iter()
            .filter(|c| !c.is_tautology())
            .map(|c| {
                c.literals()
                    .map(|(var, value)| {
                        format!("{}{}", variables.label(var), if value { '+' } else { '-' })
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>();

        if !terms.is_empty() {
            if !label.is_empty() {
                label.push(' ');
            }
            label.push_str(&terms.join(" : "));
        }

        if label.is_empty() {
            label.push_str("skip");
        }
        label
    }
}

/// A set of marked places paired with the encoding that holds there.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State {
    pub tokens: Vec<usize>,
    pub encoding: Cube,
}

impl State {
    pub fn new(mut tokens: Vec<usize>, encoding: Cube) -> Self {
        tokens.sort_unstable();
        tokens.dedup();
        Self { tokens, encoding }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    arcs: Vec<(NodeRef, NodeRef)>,
    pub source: Vec<State>,
    pub sink: Vec<State>,
    pub reset: Vec<State>,
    concurrency: BTreeSet<(usize, usize)>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty() && self.transitions.is_empty()
    }

    pub fn create_place(&mut self) -> usize {
        self.places.push(Place::default());
        self.places.len() - 1
    }

    pub fn create_transition(&mut self, transition: Transition) -> usize {
        self.transitions.push(transition);
        self.transitions.len() - 1
    }

    pub fn connect(&mut self, from: NodeRef, to: NodeRef) -> Result<(), Error> {
        match (from, to) {
            (NodeRef::Place(p), NodeRef::Transition(t)) | (NodeRef::Transition(t), NodeRef::Place(p))
                if p < self.places.len() && t < self.transitions.len() =>
            {
                self.arc(from, to);
                Ok(())
            }
            _ => Err(Error::MalformedGraph(format!(
                "cannot connect {from:?} to {to:?}"
            ))),
        }
    }

    pub(crate) fn arc(&mut self, from: NodeRef, to: NodeRef) {
        if !self.arcs.contains(&(from, to)) {
            self.arcs.push((from, to));
        }
    }

    pub fn arcs(&self) -> &[(NodeRef, NodeRef)] {
        &self.arcs
    }

    /// A single transition between a fresh source place and a fresh sink place.
    pub fn single(transition: Transition) -> Self {
        let mut graph = Graph::new();
        let start = graph.create_place();
        let end = graph.create_place();
        let t = graph.create_transition(transition);
        graph.arc(NodeRef::Place(start), NodeRef::Transition(t));
        graph.arc(NodeRef::Transition(t), NodeRef::Place(end));
        graph.source.push(State::new(vec![start], Cube::new()));
        graph.sink.push(State::new(vec![end], Cube::new()));
        graph
    }

    pub fn assignment(action: Cube, region: usize) -> Self {
        Self::single(Transition::new(
            Cover::tautology(),
            Cover::from(action),
            region,
        ))
    }

    pub fn guard(guard: Cover, region: usize) -> Self {
        Self::single(Transition::new(guard, Cover::tautology(), region))
    }

    pub fn skip(region: usize) -> Self {
        Self::single(Transition::skip(region))
    }

    pub fn next(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut next: Vec<_> = self
            .arcs
            .iter()
            .filter(|(from, _)| *from == node)
            .map(|(_, to)| *to)
            .collect();
        next.sort_unstable();
        next
    }

    pub fn prev(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut prev: Vec<_> = self
            .arcs
            .iter()
            .filter(|(_, to)| *to == node)
            .map(|(from, _)| *from)
            .collect();
        prev.sort_unstable();
        prev
    }

    /// Input places of transition `t`.
    pub fn inputs(&self, t: usize) -> Vec<usize> {
        self.prev(NodeRef::Transition(t))
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Place(p) => Some(p),
                NodeRef::Transition(_) => None,
            })
            .collect()
    }

    /// Output places of transition `t`.
    pub fn outputs(&self, t: usize) -> Vec<usize> {
        self.next(NodeRef::Transition(t))
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Place(p) => Some(p),
                NodeRef::Transition(_) => None,
            })
            .collect()
    }

    /// Transitions that deposit a token in place `p`.
    pub fn place_inputs(&self, p: usize) -> Vec<usize> {
        self.prev(NodeRef::Place(p))
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Transition(t) => Some(t),
                NodeRef::Place(_) => None,
            })
            .collect()
    }

    /// Transitions that consume a token from place `p`.
    pub fn place_outputs(&self, p: usize) -> Vec<usize> {
        self.next(NodeRef::Place(p))
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Transition(t) => Some(t),
                NodeRef::Place(_) => None,
            })
            .collect()
    }

    /// Whether the two places were ever marked together by the last elaboration.
    pub fn is_concurrent(&self, a: usize, b: usize) -> bool {
        let key = if a < b { (a, b) } else { (b, a) };
        self.concurrency.contains(&key)
    }

    pub(crate) fn mark_concurrent(&mut self, a: usize, b: usize) {
        if a != b {
            self.concurrency.insert(if a < b { (a, b) } else { (b, a) });
        }
    }

    pub(crate) fn clear_annotations(&mut self) {
        for place in &mut self.places {
            place.predicate = Cover::new();
            place.effective = Cover::new();
            place.resting = Cover::new();
            place.ghost = Cover::new();
        }
        for transition in &mut self.transitions {
            transition.implicant = Cover::new();
        }
        self.concurrency.clear();
    }

    /// Markings elaboration starts from.
    pub fn initial_states(&self) -> &[State] {
        if self.reset.is_empty() {
            &self.source
        } else {
            &self.reset
        }
    }

    /// Every variable a guard, an action or a reset state refers to.
    pub fn referenced_variables(&self) -> BTreeSet<VarId> {
        let mut vars = BTreeSet::new();
        for transition in &self.transitions {
            vars.extend(transition.guard.vars());
            vars.extend(transition.action.vars());
        }
        for state in self.reset.iter().chain(&self.source) {
            vars.extend(state.encoding.vars());
        }
        vars
    }

    fn node_index(&self, node: NodeRef) -> NodeIndex {
        match node {
            NodeRef::Place(p) => NodeIndex::new(p),
            NodeRef::Transition(t) => NodeIndex::new(self.places.len() + t),
        }
    }

    /// Places first, then transitions, so node indices follow graph indices.
    pub fn to_petgraph(&self) -> petgraph::Graph<NodeRef, ()> {
        let mut graph = petgraph::Graph::new();
        for p in 0..self.places.len() {
            graph.add_node(NodeRef::Place(p));
        }
        for t in 0..self.transitions.len() {
            graph.add_node(NodeRef::Transition(t));
        }
        for (from, to) in &self.arcs {
            graph.add_edge(self.node_index(*from), self.node_index(*to), ());
        }
        graph
    }

    pub fn is_reachable(&self, from: NodeRef, to: NodeRef) -> bool {
        let in_range = |n: NodeRef| match n {
            NodeRef::Place(p) => p < self.places.len(),
            NodeRef::Transition(t) => t < self.transitions.len(),
        };
        if !in_range(from) || !in_range(to) {
            return false;
        }

        let graph = self.to_petgraph();
        has_path_connecting(&graph, self.node_index(from), self.node_index(to), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_transition_shape() {
        let graph = Graph::assignment(Cube::literal(0, true), 0);
        assert_eq!(graph.places.len(), 2);
        assert_eq!(graph.inputs(0), vec![0]);
        assert_eq!(graph.outputs(0), vec![1]);
        assert_eq!(graph.place_outputs(0), vec![0]);
        assert_eq!(graph.place_inputs(1), vec![0]);
        assert!(graph.is_reachable(NodeRef::Place(0), NodeRef::Place(1)));
        assert!(!graph.is_reachable(NodeRef::Place(1), NodeRef::Place(0)));
    }

    #[test]
    fn test_connect_rejects_same_kind() {
        let mut graph = Graph::new();
        let a = graph.create_place();
        let b = graph.create_place();
        assert!(graph.connect(NodeRef::Place(a), NodeRef::Place(b)).is_err());
        assert!(
            graph
                .connect(NodeRef::Place(a), NodeRef::Transition(7))
                .is_err()
        );
    }

    #[test]
    fn test_transition_label() {
        let mut vars = VariableSet::new();
        let a = vars.define("a", 0, crate::variable::VariableKind::Boolean);
        let x = vars.define("x", 0, crate::variable::VariableKind::Boolean);
        let t = Transition::new(
            Cover::from(Cube::literal(a, true)),
            Cover::from(Cube::literal(x, false)),
            0,
        );
        assert_eq!(t.label(&vars), "[a] x-");
        assert_eq!(Transition::skip(0).label(&vars), "skip");
    }
}
