use std::collections::{BTreeSet, HashMap, VecDeque};

use log::{debug, info, warn};

use crate::Error;
use crate::boolean::{Cover, Cube};
use crate::design::{Design, Elaborated, Normalized};
use crate::graph::{Graph, State};
use crate::variable::{VarId, VariableSet};

#[derive(Debug, Clone)]
pub struct ElaborateConfig {
    /// Maximum number of distinct markings to visit (0 = unlimited).
    pub max_states: usize,
    /// Skip branch bookkeeping at choice places.
    pub no_ghosts: bool,
    pub report_progress: bool,
    /// Markings between two progress lines.
    pub progress_interval: usize,
}

impl Default for ElaborateConfig {
    fn default() -> Self {
        Self {
            max_states: 0,
            no_ghosts: false,
            report_progress: false,
            progress_interval: 10_000,
        }
    }
}

/// `transition` was enabled and lost its guard when `interrupted_by` fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instability {
    pub transition: usize,
    pub interrupted_by: usize,
}

/// Two concurrently enabled transitions drive `var` to opposite values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interference {
    pub first: usize,
    pub second: usize,
    pub var: VarId,
}

/// What the traversal found besides the covers written into the graph.
#[derive(Debug, Clone, Default)]
pub struct Elaboration {
    /// Every visited marking, in visiting order.
    pub states: Vec<State>,
    /// Distinct encodings seen at each place.
    pub per_place: Vec<usize>,
    pub deadlocks: Vec<State>,
    pub unsafe_places: BTreeSet<usize>,
    pub vacuous: BTreeSet<usize>,
    pub unstable: BTreeSet<Instability>,
    pub interference: BTreeSet<Interference>,
    pub truncated: bool,
}

impl Elaboration {
    pub fn is_clean(&self) -> bool {
        self.deadlocks.is_empty()
            && self.unsafe_places.is_empty()
            && self.unstable.is_empty()
            && self.interference.is_empty()
    }
}

impl Design<Normalized> {
    pub fn elaborate(
        mut self,
        config: &ElaborateConfig,
    ) -> Result<(Design<Elaborated>, Elaboration), Error> {
        let elaboration = elaborate(&mut self.graph, &self.variables, config)?;
        Ok((self.advance(), elaboration))
    }
}

struct Marking {
    /// Position in `Elaboration::states`.
    index: usize,
    tokens: Vec<usize>,
    encoding: Cube,
}

struct Firing {
    transition: usize,
    refined: Cube,
}

/// Adjacency snapshot and accumulated covers for one traversal.
struct Search<'a> {
    graph: &'a Graph,
    config: &'a ElaborateConfig,
    inputs: Vec<Vec<usize>>,
    outputs: Vec<Vec<usize>>,
    consumers: Vec<Vec<usize>>,
    predicate: Vec<Cover>,
    effective: Vec<Cover>,
    resting: Vec<Cover>,
    ghost: Vec<Cover>,
    implicant: Vec<Cover>,
    encodings: Vec<BTreeSet<Cube>>,
    concurrency: BTreeSet<(usize, usize)>,
    /// `(from, to, transition)` for every firing between visited markings.
    edges: Vec<(usize, usize, usize)>,
    initial: usize,
    result: Elaboration,
}

/// Walks every reachable marking breadth first and annotates `graph` with the
/// encodings found at each place and transition.
///
/// Subject-level problems (deadlocks, unsafe places, instabilities) are
/// reported in the returned [`Elaboration`]; only a graph whose initial
/// markings point outside of it is an error.
pub fn elaborate(
    graph: &mut Graph,
    variables: &VariableSet,
    config: &ElaborateConfig,
) -> Result<Elaboration, Error> {
    for state in graph.initial_states() {
        if let Some(p) = state.tokens.iter().find(|p| **p >= graph.places.len()) {
            return Err(Error::MalformedGraph(format!(
                "initial marking refers to missing place P{p}"
            )));
        }
    }

    graph.clear_annotations();

    let mut search = Search::new(graph, config);
    search.run();
    let Search {
        predicate,
        effective,
        resting,
        ghost,
        implicant,
        concurrency,
        result,
        ..
    } = search;

    let covers = predicate.into_iter().zip(effective).zip(resting).zip(ghost);
    for (place, (((mut predicate, mut effective), mut resting), mut ghost)) in
        graph.places.iter_mut().zip(covers)
    {
        predicate.minimize();
        effective.minimize();
        resting.minimize();
        ghost.minimize();
        place.predicate = predicate;
        place.effective = effective;
        place.resting = resting;
        place.ghost = ghost;
    }
    for (transition, mut implicant) in graph.transitions.iter_mut().zip(implicant) {
        implicant.minimize();
        transition.implicant = implicant;
    }
    for (a, b) in concurrency {
        graph.mark_concurrent(a, b);
    }

    report(&result, variables);
    Ok(result)
}

fn report(result: &Elaboration, variables: &VariableSet) {
    info!(
        "elaborated {} states over {} variables",
        result.states.len(),
        variables.len()
    );

    if result.truncated {
        warn!("state budget exhausted, covers are partial");
    }
    for state in &result.deadlocks {
        warn!(
            "deadlock at {:?} with {}",
            state.tokens,
            state.encoding.display(variables)
        );
    }
    for p in &result.unsafe_places {
        warn!("P{p} can hold two tokens at once");
    }
    for t in &result.vacuous {
        debug!("T{t} fires vacuously");
    }
    for i in &result.unstable {
        warn!("T{} is unstable, interrupted by T{}", i.transition, i.interrupted_by);
    }
    for i in &result.interference {
        warn!(
            "T{} and T{} interfere on {}",
            i.first,
            i.second,
            variables.label(i.var)
        );
    }
}

impl<'a> Search<'a> {
    fn new(graph: &'a Graph, config: &'a ElaborateConfig) -> Self {
        let places = graph.places.len();
        let transitions = graph.transitions.len();

        Self {
            graph,
            config,
            inputs: (0..transitions).map(|t| graph.inputs(t)).collect(),
            outputs: (0..transitions).map(|t| graph.outputs(t)).collect(),
            consumers: (0..places).map(|p| graph.place_outputs(p)).collect(),
            predicate: vec![Cover::new(); places],
            effective: vec![Cover::new(); places],
            resting: vec![Cover::new(); places],
            ghost: vec![Cover::new(); places],
            implicant: vec![Cover::new(); transitions],
            encodings: vec![BTreeSet::new(); places],
            concurrency: BTreeSet::new(),
            edges: vec![],
            initial: 0,
            result: Elaboration::default(),
        }
    }

    fn run(&mut self) {
        // Markings are popped in insertion order, so the value is also the
        // marking's position in `states`.
        let mut visited: HashMap<(Vec<usize>, Cube), usize> = HashMap::new();
        let mut frontier = VecDeque::new();

        for state in self.graph.initial_states() {
            let key = (state.tokens.clone(), state.encoding.clone());
            if !visited.contains_key(&key) {
                let index = visited.len();
                visited.insert(key, index);
                frontier.push_back(Marking {
                    index,
                    tokens: state.tokens.clone(),
                    encoding: state.encoding.clone(),
                });
            }
        }
        self.initial = visited.len();

        while let Some(marking) = frontier.pop_front() {
            self.result
                .states
                .push(State::new(marking.tokens.clone(), marking.encoding.clone()));
            self.record(&marking);

            let firings = self.enabled(&marking);
            self.classify(&marking, &firings);

            for firing in &firings {
                for (tokens, encoding) in self.fire(&marking, firing, &firings) {
                    let key = (tokens, encoding);
                    if let Some(index) = visited.get(&key) {
                        self.edges.push((marking.index, *index, firing.transition));
                        continue;
                    }
                    if self.config.max_states > 0 && visited.len() >= self.config.max_states {
                        self.result.truncated = true;
                        continue;
                    }

                    let index = visited.len();
                    self.edges.push((marking.index, index, firing.transition));
                    let (tokens, encoding) = key.clone();
                    visited.insert(key, index);
                    if self.config.report_progress
                        && visited.len() % self.config.progress_interval.max(1) == 0
                    {
                        info!(
                            "elaborate: {} states visited, {} in frontier",
                            visited.len(),
                            frontier.len()
                        );
                    }
                    frontier.push_back(Marking {
                        index,
                        tokens,
                        encoding,
                    });
                }
            }
        }

        self.result.per_place = self.encodings.iter().map(BTreeSet::len).collect();
        if !self.config.no_ghosts {
            self.spread_ghosts();
        }
    }

    /// Follows every recorded firing until each marking holds all the branch
    /// cubes that can reach it, then unions them into the marked places.
    fn spread_ghosts(&mut self) {
        let count = self.result.states.len();
        let mut successors: Vec<Vec<(usize, usize)>> = vec![vec![]; count];
        for (from, to, t) in &self.edges {
            successors[*from].push((*to, *t));
        }

        let mut ghosts: Vec<BTreeSet<Cube>> = vec![BTreeSet::new(); count];
        let mut queue: VecDeque<usize> = (0..self.initial.min(count)).collect();
        for index in &queue {
            ghosts[*index].insert(Cube::new());
        }

        while let Some(index) = queue.pop_front() {
            let current: Vec<Cube> = ghosts[index].iter().cloned().collect();
            for (to, t) in &successors[index] {
                let mut grown = false;
                for ghost in &current {
                    grown |= ghosts[*to].insert(self.branch(ghost, *t));
                }
                if grown {
                    queue.push_back(*to);
                }
            }
        }

        for (state, cubes) in self.result.states.iter().zip(&ghosts) {
            for p in &state.tokens {
                for cube in cubes.iter().filter(|c| !c.is_tautology()) {
                    self.ghost[*p].push(cube.clone());
                }
            }
        }
    }

    /// `ghost` after `t` leaves its choice places: `t` set, its siblings cleared.
    fn branch(&self, ghost: &Cube, t: usize) -> Cube {
        let mut ghost = ghost.clone();
        for p in &self.inputs[t] {
            let branches = &self.consumers[*p];
            if branches.len() > 1 {
                for u in branches {
                    ghost.set(*u, *u == t);
                }
            }
        }
        ghost
    }

    fn record(&mut self, marking: &Marking) {
        for (i, p) in marking.tokens.iter().enumerate() {
            self.predicate[*p].push(marking.encoding.clone());
            self.encodings[*p].insert(marking.encoding.clone());
            for q in &marking.tokens[i + 1..] {
                self.concurrency.insert((*p, *q));
            }
        }
    }

    /// One firing per guard term that the current encoding can satisfy.
    fn enabled(&self, marking: &Marking) -> Vec<Firing> {
        let mut firings = vec![];
        for (t, transition) in self.graph.transitions.iter().enumerate() {
            let inputs = &self.inputs[t];
            if inputs.is_empty() || !inputs.iter().all(|p| marking.tokens.binary_search(p).is_ok()) {
                continue;
            }
            for term in transition.guard.cubes() {
                if let Some(refined) = marking.encoding.intersect(term) {
                    firings.push(Firing {
                        transition: t,
                        refined,
                    });
                }
            }
        }
        firings
    }

    /// Effective and resting covers, deadlocks and interference for one marking.
    fn classify(&mut self, marking: &Marking, firings: &[Firing]) {
        let transitions = &self.graph.transitions;

        for p in &marking.tokens {
            let consumers = &self.consumers[*p];
            let moves_on = firings
                .iter()
                .any(|f| self.inputs[f.transition].contains(p));
            if consumers.is_empty() || moves_on {
                self.effective[*p].push(marking.encoding.clone());
            }

            // A satisfied wait passes the token on without any signal moving.
            let passes = consumers.iter().any(|t| {
                let transition = &transitions[*t];
                !transition.assigns()
                    && !transition.guard.is_tautology()
                    && self.inputs[*t]
                        .iter()
                        .all(|q| marking.tokens.binary_search(q).is_ok())
                    && transition.guard.covers(&marking.encoding)
            });
            if !passes {
                self.resting[*p].push(marking.encoding.clone());
            }
        }

        if firings.is_empty() && marking.tokens.iter().any(|p| !self.consumers[*p].is_empty()) {
            self.result
                .deadlocks
                .push(State::new(marking.tokens.clone(), marking.encoding.clone()));
        }

        for (i, f) in firings.iter().enumerate() {
            for g in &firings[i + 1..] {
                let (a, b) = (f.transition, g.transition);
                if a == b
                    || self.inputs[a].iter().any(|p| self.inputs[b].contains(p))
                    || !f.refined.intersects(&g.refined)
                {
                    continue;
                }
                if let Some(var) = opposed(&transitions[a].remote_action, &transitions[b].remote_action) {
                    self.result.interference.insert(Interference {
                        first: a,
                        second: b,
                        var,
                    });
                }
            }
        }
    }

    /// Successor markings of one firing as `(tokens, encoding)` pairs.
    fn fire(
        &mut self,
        marking: &Marking,
        firing: &Firing,
        firings: &[Firing],
    ) -> Vec<(Vec<usize>, Cube)> {
        let t = firing.transition;
        let transition = &self.graph.transitions[t];
        self.implicant[t].push(firing.refined.clone());

        if transition
            .local_action
            .cubes()
            .iter()
            .any(|term| !term.is_tautology() && firing.refined.implies(term))
        {
            self.result.vacuous.insert(t);
        }

        let mut tokens: Vec<usize> = marking
            .tokens
            .iter()
            .copied()
            .filter(|p| !self.inputs[t].contains(p))
            .collect();
        for p in &self.outputs[t] {
            if tokens.contains(p) {
                self.result.unsafe_places.insert(*p);
                return vec![];
            }
            tokens.push(*p);
        }
        tokens.sort_unstable();

        let mut encodings = vec![];
        if transition.remote_action.is_null() {
            encodings.push(firing.refined.clone());
        }
        for term in transition.remote_action.cubes() {
            let encoding = firing.refined.assign(term);
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }

        for encoding in &encodings {
            for other in firings {
                let u = other.transition;
                if u == t
                    || !self.inputs[u].iter().all(|p| tokens.binary_search(p).is_ok())
                    || self.graph.transitions[u].guard.intersects_cube(encoding)
                {
                    continue;
                }
                self.result.unstable.insert(Instability {
                    transition: u,
                    interrupted_by: t,
                });
            }
        }

        encodings
            .into_iter()
            .map(|encoding| (tokens.clone(), encoding))
            .collect()
    }
}

/// First variable the two actions drive to opposite values.
fn opposed(a: &Cover, b: &Cover) -> Option<VarId> {
    a.cubes().iter().find_map(|x| {
        b.cubes().iter().find_map(|y| {
            x.literals()
                .find(|(var, value)| y.get(*var).is_some_and(|v| v != *value))
                .map(|(var, _)| var)
        })
    })
}
