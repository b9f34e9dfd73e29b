use super::{Graph, NodeRef, State, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    Sequence,
    Choice,
    Parallel,
}

impl Graph {
    /// Composes `other` into `self`. Nodes of `other` keep their relative
    /// order and are renumbered after the nodes of `self`.
    pub fn merge(&mut self, op: Composition, other: Graph) {
        if self.is_empty() {
            *self = other;
            return;
        }
        if other.is_empty() {
            return;
        }

        let region = self.default_region();
        let sink = std::mem::take(&mut self.sink);
        let source = std::mem::take(&mut self.source);
        let reset = std::mem::take(&mut self.reset);
        let other = self.absorb(other);

        match op {
            Composition::Sequence => {
                for from in &sink {
                    for to in &other.source {
                        self.bridge(&from.tokens, &to.tokens, region);
                    }
                }
                self.source = source;
                self.sink = other.sink;
                self.reset = reset;
            }
            Composition::Choice => {
                let entry = self.create_place();
                for to in source.iter().chain(&other.source) {
                    self.bridge(&[entry], &to.tokens, region);
                }
                self.source = vec![State::new(vec![entry], Default::default())];

                if !sink.is_empty() || !other.sink.is_empty() {
                    let exit = self.create_place();
                    for from in sink.iter().chain(&other.sink) {
                        self.bridge(&from.tokens, &[exit], region);
                    }
                    self.sink = vec![State::new(vec![exit], Default::default())];
                }
                self.reset = reset;
            }
            Composition::Parallel => {
                self.source = cross(&source, &other.source);
                self.sink = cross(&sink, &other.sink);
                self.reset = match (reset.is_empty(), other.reset.is_empty()) {
                    (true, _) => other.reset,
                    (false, true) => reset,
                    (false, false) => cross(&reset, &other.reset),
                };
            }
        }
    }

    /// Loops the sinks back onto the sources. The result never terminates.
    pub fn repeat(&mut self) {
        let region = self.default_region();
        let sink = std::mem::take(&mut self.sink);
        let source = self.source.clone();
        for from in &sink {
            for to in &source {
                self.bridge(&from.tokens, &to.tokens, region);
            }
        }
    }

    fn default_region(&self) -> usize {
        self.transitions.first().map_or(0, |t| t.region)
    }

    /// Unconditional transition from every place of `from` to every place of `to`.
    fn bridge(&mut self, from: &[usize], to: &[usize], region: usize) {
        let t = self.create_transition(Transition::skip(region));
        for p in from {
            self.arc(NodeRef::Place(*p), NodeRef::Transition(t));
        }
        for p in to {
            self.arc(NodeRef::Transition(t), NodeRef::Place(*p));
        }
    }

    /// Appends the nodes of `other` and returns its state lists renumbered.
    fn absorb(&mut self, other: Graph) -> Graph {
        let place_offset = self.places.len();
        let transition_offset = self.transitions.len();
        let shift = |node: NodeRef| match node {
            NodeRef::Place(p) => NodeRef::Place(p + place_offset),
            NodeRef::Transition(t) => NodeRef::Transition(t + transition_offset),
        };
        let shift_states = |states: Vec<State>| -> Vec<State> {
            states
                .into_iter()
                .map(|s| {
                    State::new(
                        s.tokens.iter().map(|p| p + place_offset).collect(),
                        s.encoding,
                    )
                })
                .collect()
        };

        self.places.extend(other.places);
        self.transitions.extend(other.transitions);
        for (from, to) in other.arcs {
            self.arc(shift(from), shift(to));
        }

        Graph {
            source: shift_states(other.source),
            sink: shift_states(other.sink),
            reset: shift_states(other.reset),
            ..Graph::default()
        }
    }
}

/// Every pairing of one state from each side; contradicting encodings are dropped.
fn cross(left: &[State], right: &[State]) -> Vec<State> {
    let mut result = vec![];
    for l in left {
        for r in right {
            let Some(encoding) = l.encoding.intersect(&r.encoding) else {
                continue;
            };
            let tokens = l.tokens.iter().chain(&r.tokens).copied().collect();
            result.push(State::new(tokens, encoding));
        }
    }
    result
}
