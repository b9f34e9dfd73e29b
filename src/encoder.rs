use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use log::{debug, info, warn};

use crate::boolean::{Cover, Cube};
use crate::design::{Design, Elaborated, Encoded};
use crate::elaborate::{ElaborateConfig, Elaboration, elaborate};
use crate::graph::{Graph, NodeRef};
use crate::variable::{VarId, VariableSet};

/// Polarity of the transition a conflict was found for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sense {
    Down = -1,
    Unsigned = 0,
    Up = 1,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Down => write!(f, "-"),
            Sense::Unsigned => write!(f, "~"),
            Sense::Up => write!(f, "+"),
        }
    }
}

/// Places whose states cannot be told apart from the states that enable
/// `transition`, as seen from the transition's region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub transition: usize,
    /// Index of the action term the collision was found on.
    pub term: usize,
    pub sense: Sense,
    pub region: Vec<usize>,
    pub encoding: Cover,
}

impl Conflict {
    pub fn display<'a>(&'a self, variables: &'a VariableSet) -> ConflictDisplay<'a> {
        ConflictDisplay {
            conflict: self,
            variables,
        }
    }
}

pub struct ConflictDisplay<'a> {
    conflict: &'a Conflict,
    variables: &'a VariableSet,
}

impl fmt::Display for ConflictDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.conflict;
        let region = c
            .region
            .iter()
            .map(|p| format!("P{p}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "T{}.{}{} {{{region}}} {}",
            c.transition,
            c.term,
            c.sense,
            c.encoding.display(self.variables)
        )
    }
}

#[derive(Debug, Clone)]
pub struct EncodeConfig {
    pub max_iterations: usize,
    /// Also resolve conflicts that hold for either polarity.
    pub non_inverting: bool,
    pub report_progress: bool,
    /// Log every candidate with its score.
    pub debug: bool,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            non_inverting: false,
            report_progress: false,
            debug: false,
        }
    }
}

/// Every state conflict of an elaborated graph, ordered by transition, term
/// and sense.
pub fn find_conflicts(
    graph: &Graph,
    variables: &VariableSet,
    include_unsigned: bool,
) -> Vec<Conflict> {
    let mut groups: BTreeMap<(usize, usize, Sense), (BTreeSet<usize>, Cover)> = BTreeMap::new();

    for (t, transition) in graph.transitions.iter().enumerate() {
        if transition.implicant.is_null() || !transition.assigns() {
            continue;
        }

        let visible = variables.in_region(transition.region);
        let keep = |v: VarId| visible.contains(&v);
        let implicant = transition.implicant.restrict(keep);
        let inputs = graph.inputs(t);

        for (p, place) in graph.places.iter().enumerate() {
            if inputs.contains(&p)
                || !place.regions.contains(&transition.region)
                || inputs.iter().any(|i| graph.is_concurrent(p, *i))
                || place.resting.is_null()
            {
                continue;
            }

            for (term, action) in transition.local_action.cubes().iter().enumerate() {
                if action.is_tautology() {
                    continue;
                }

                let mut signed = false;
                for (var, value) in action.literals() {
                    let overlap = place
                        .resting
                        .and_cube(&Cube::literal(var, !value))
                        .restrict(keep)
                        .and(&implicant);
                    if overlap.is_null() {
                        continue;
                    }

                    let sense = if value { Sense::Up } else { Sense::Down };
                    let (region, encoding) = groups.entry((t, term, sense)).or_default();
                    region.insert(p);
                    encoding.or(&overlap);
                    signed = true;
                }

                if include_unsigned && !signed {
                    let overlap = place.resting.restrict(keep).and(&implicant);
                    if !overlap.is_null() {
                        let (region, encoding) =
                            groups.entry((t, term, Sense::Unsigned)).or_default();
                        region.insert(p);
                        encoding.or(&overlap);
                    }
                }
            }
        }
    }

    groups
        .into_iter()
        .map(|((transition, term, sense), (region, mut encoding))| {
            encoding.minimize();
            Conflict {
                transition,
                term,
                sense,
                region: region.into_iter().collect(),
                encoding,
            }
        })
        .collect()
}

/// Places a new state variable rises and falls after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cut {
    rise: usize,
    fall: usize,
}

struct Trial {
    graph: Graph,
    variables: VariableSet,
    elaboration: Elaboration,
    conflicts: Vec<Conflict>,
    var: VarId,
}

impl Trial {
    fn score(&self) -> (usize, usize) {
        (self.conflicts.len(), self.elaboration.unstable.len())
    }
}

/// Resolves state conflicts by inserting state variables.
pub struct Encoder {
    graph: Graph,
    variables: VariableSet,
    elaboration: Elaboration,
    config: ElaborateConfig,
    conflicts: Vec<Conflict>,
    inserted: Vec<VarId>,
    iterations: usize,
}

impl Encoder {
    pub fn new(design: Design<Elaborated>, elaboration: Elaboration, config: ElaborateConfig) -> Self {
        let (graph, variables) = design.into_parts();
        Self {
            graph,
            variables,
            elaboration,
            config,
            conflicts: vec![],
            inserted: vec![],
            iterations: 0,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub fn elaboration(&self) -> &Elaboration {
        &self.elaboration
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// State variables added so far, in insertion order.
    pub fn inserted(&self) -> &[VarId] {
        &self.inserted
    }

    /// Iterations run over every call to [`Encoder::insert_state_variables`].
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn check(&mut self, include_unsigned: bool, progress: bool) -> &[Conflict] {
        self.conflicts = find_conflicts(&self.graph, &self.variables, include_unsigned);
        if progress {
            info!("check: {} conflicts", self.conflicts.len());
        }
        for conflict in &self.conflicts {
            debug!("conflict {}", conflict.display(&self.variables));
        }
        &self.conflicts
    }

    /// Greedily inserts one state variable per iteration until no conflict is
    /// left. Returns `false` when an iteration cannot reduce the conflict
    /// count or this call runs out of its `max_iterations`; `conflicts` then
    /// holds what is left.
    pub fn insert_state_variables(
        &mut self,
        max_iterations: usize,
        non_inverting: bool,
        progress: bool,
        debug: bool,
    ) -> bool {
        self.check(non_inverting, progress);

        let mut iterations = 0;
        loop {
            if self.conflicts.is_empty() {
                return true;
            }
            if iterations >= max_iterations {
                warn!(
                    "encoder: {} conflicts left after {} iterations",
                    self.conflicts.len(),
                    iterations
                );
                return false;
            }

            let Some(trial) = self.best_trial(non_inverting, debug) else {
                warn!(
                    "encoder: no state variable reduces the {} conflicts left",
                    self.conflicts.len()
                );
                return false;
            };

            iterations += 1;
            self.iterations += 1;
            if progress {
                info!(
                    "encoder: iteration {} inserted {}, {} conflicts left",
                    self.iterations,
                    trial.variables.label(trial.var),
                    trial.conflicts.len()
                );
            }

            self.inserted.push(trial.var);
            self.graph = trial.graph;
            self.variables = trial.variables;
            self.elaboration = trial.elaboration;
            self.conflicts = trial.conflicts;
        }
    }

    /// Runs the insertion loop with the parameters of `config`.
    pub fn run(&mut self, config: &EncodeConfig) -> bool {
        self.insert_state_variables(
            config.max_iterations,
            config.non_inverting,
            config.report_progress,
            config.debug,
        )
    }

    pub fn into_design(self) -> Design<Encoded> {
        Design::with_stage(self.graph, self.variables)
    }

    pub fn into_parts(self) -> (Design<Encoded>, Elaboration, Vec<Conflict>) {
        let design = Design::with_stage(self.graph, self.variables);
        (design, self.elaboration, self.conflicts)
    }

    fn best_trial(&self, non_inverting: bool, debug: bool) -> Option<Trial> {
        let conflict = self.conflicts.first()?;
        let region = self.graph.transitions[conflict.transition].region;
        let baseline = (
            self.elaboration.deadlocks.len(),
            self.elaboration.unsafe_places.len(),
        );

        let mut best: Option<Trial> = None;
        for cut in self.cuts(conflict) {
            let Some(trial) = self.try_cut(cut, region, non_inverting) else {
                continue;
            };

            if debug {
                debug!(
                    "candidate {} rises after P{} falls after P{}: {} conflicts, {} unstable",
                    trial.variables.label(trial.var),
                    cut.rise,
                    cut.fall,
                    trial.conflicts.len(),
                    trial.elaboration.unstable.len()
                );
            }

            if trial.elaboration.deadlocks.len() > baseline.0
                || trial.elaboration.unsafe_places.len() > baseline.1
                || trial.elaboration.truncated
            {
                continue;
            }
            if best.as_ref().is_none_or(|b| trial.score() < b.score()) {
                best = Some(trial);
            }
        }

        best.filter(|b| b.conflicts.len() < self.conflicts.len())
    }

    /// Candidate cuts for `conflict` in both polarities. The variable must
    /// change on the way from the colliding places to the transition and
    /// change back on the way from the transition to the colliding places.
    fn cuts(&self, conflict: &Conflict) -> Vec<Cut> {
        let enabling: BTreeSet<usize> = self.graph.inputs(conflict.transition).into_iter().collect();
        let colliding: BTreeSet<usize> = conflict.region.iter().copied().collect();
        let stop: BTreeSet<usize> = enabling.union(&colliding).copied().collect();

        let between = |from: &BTreeSet<usize>, to: &BTreeSet<usize>| -> Vec<usize> {
            let ahead = self.walk(from, &stop, true);
            let mut behind = self.walk(to, &stop, false);
            behind.extend(to);
            ahead
                .intersection(&behind)
                .filter(|p| !from.contains(*p))
                .copied()
                .collect()
        };

        let rising = between(&colliding, &enabling);
        let falling = between(&enabling, &colliding);

        let mut cuts = vec![];
        for rise in &rising {
            for fall in &falling {
                if rise != fall {
                    cuts.push(Cut {
                        rise: *rise,
                        fall: *fall,
                    });
                }
            }
        }
        for fall in &rising {
            for rise in &falling {
                if rise != fall {
                    cuts.push(Cut {
                        rise: *rise,
                        fall: *fall,
                    });
                }
            }
        }
        cuts
    }

    /// Places reachable from `start` without passing through `stop`.
    fn walk(&self, start: &BTreeSet<usize>, stop: &BTreeSet<usize>, forward: bool) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = start.iter().copied().collect();

        while let Some(p) = queue.pop_front() {
            let transitions = if forward {
                self.graph.place_outputs(p)
            } else {
                self.graph.place_inputs(p)
            };
            for t in transitions {
                let places = if forward {
                    self.graph.outputs(t)
                } else {
                    self.graph.inputs(t)
                };
                for q in places {
                    if seen.insert(q) && !stop.contains(&q) {
                        queue.push_back(q);
                    }
                }
            }
        }
        seen
    }

    fn try_cut(&self, cut: Cut, region: usize, non_inverting: bool) -> Option<Trial> {
        let rising = self.graph.place_inputs(cut.rise);
        let falling = self.graph.place_inputs(cut.fall);
        if rising.is_empty()
            || falling.is_empty()
            || rising.iter().any(|t| falling.contains(t))
            || rising
                .iter()
                .chain(&falling)
                .any(|t| self.graph.transitions[*t].region != region)
        {
            return None;
        }

        let mut graph = self.graph.clone();
        let mut variables = self.variables.clone();
        let var = variables.insert_state_variable(region);

        for t in &rising {
            annotate(&mut graph, *t, var, true);
        }
        for t in &falling {
            annotate(&mut graph, *t, var, false);
        }
        let initial = !first_reached(&graph, &rising, &falling)?;
        for state in graph.reset.iter_mut().chain(graph.source.iter_mut()) {
            state.encoding.set(var, initial);
        }
        graph.update_actions(&variables);

        let elaboration = match elaborate(&mut graph, &variables, &self.config) {
            Ok(elaboration) => elaboration,
            Err(e) => {
                debug!("candidate rejected: {e}");
                return None;
            }
        };
        let conflicts = find_conflicts(&graph, &variables, non_inverting);

        Some(Trial {
            graph,
            variables,
            elaboration,
            conflicts,
            var,
        })
    }
}

/// Adds `var = value` to every alternative of the action of `t`.
fn annotate(graph: &mut Graph, t: usize, var: VarId, value: bool) {
    let action = &graph.transitions[t].action;
    let terms = if action.is_null() {
        vec![Cube::literal(var, value)]
    } else {
        action
            .cubes()
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.set(var, value);
                c
            })
            .collect()
    };
    graph.transitions[t].action = Cover::from_terms(terms);
}

/// Whether a rising transition comes first on the way from the initial
/// markings. `None` when neither side is reachable.
fn first_reached(graph: &Graph, rising: &[usize], falling: &[usize]) -> Option<bool> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<NodeRef> = graph
        .initial_states()
        .iter()
        .flat_map(|s| s.tokens.iter().map(|p| NodeRef::Place(*p)))
        .collect();

    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        if let NodeRef::Transition(t) = node {
            if rising.contains(&t) {
                return Some(true);
            }
            if falling.contains(&t) {
                return Some(false);
            }
        }
        queue.extend(graph.next(node));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Composition, State, Transition};
    use crate::variable::VariableKind;

    /// `P0 -x+-> P1`, two unconditional branches from `P1` into `P2`, then
    /// `P2 -x-> P0`. Nothing tells `P1` from `P2`.
    fn merge_graph(vars: &mut VariableSet, name: &str, region: usize) -> Graph {
        let x = vars.define(name, region, VariableKind::Boolean);

        let mut graph = Graph::new();
        let p: Vec<usize> = (0..3).map(|_| graph.create_place()).collect();
        let rise = graph.create_transition(Transition::new(
            Cover::tautology(),
            Cover::from(Cube::literal(x, true)),
            region,
        ));
        let left = graph.create_transition(Transition::skip(region));
        let right = graph.create_transition(Transition::skip(region));
        let fall = graph.create_transition(Transition::new(
            Cover::tautology(),
            Cover::from(Cube::literal(x, false)),
            region,
        ));
        let arcs = [
            (NodeRef::Place(p[0]), NodeRef::Transition(rise)),
            (NodeRef::Transition(rise), NodeRef::Place(p[1])),
            (NodeRef::Place(p[1]), NodeRef::Transition(left)),
            (NodeRef::Place(p[1]), NodeRef::Transition(right)),
            (NodeRef::Transition(left), NodeRef::Place(p[2])),
            (NodeRef::Transition(right), NodeRef::Place(p[2])),
            (NodeRef::Place(p[2]), NodeRef::Transition(fall)),
            (NodeRef::Transition(fall), NodeRef::Place(p[0])),
        ];
        for (from, to) in arcs {
            graph.connect(from, to).unwrap();
        }
        graph.reset.push(State::new(vec![p[0]], Cube::literal(x, false)));
        graph
    }

    fn elaborated(graph: Graph, vars: VariableSet) -> (Design<Elaborated>, Elaboration) {
        Design::new(graph, vars)
            .validate(false)
            .unwrap()
            .elaborate(&ElaborateConfig::default())
            .unwrap()
    }

    fn merge_loop() -> (Design<Elaborated>, Elaboration) {
        let mut vars = VariableSet::new();
        let graph = merge_graph(&mut vars, "x", 0);
        elaborated(graph, vars)
    }

    #[test]
    fn test_merge_conflict_is_found() {
        let (design, _) = merge_loop();
        let conflicts = find_conflicts(design.graph(), design.variables(), false);

        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.sense, Sense::Down);
        assert_eq!(conflict.region, vec![1]);
        assert!(design.graph().transitions[conflict.transition]
            .label(design.variables())
            .ends_with("x-"));
        assert_eq!(
            conflict.display(design.variables()).to_string(),
            format!("T{}.0- {{P1}} x", conflict.transition)
        );
    }

    #[test]
    fn test_one_variable_resolves_merge() {
        let (design, elaboration) = merge_loop();
        let mut encoder = Encoder::new(design, elaboration, ElaborateConfig::default());

        assert!(encoder.insert_state_variables(10, false, false, false));
        assert_eq!(encoder.iterations(), 1);
        assert_eq!(encoder.inserted().len(), 1);
        assert!(encoder.check(false, false).is_empty());

        let var = encoder.inserted()[0];
        assert_eq!(encoder.variables().label(var), "v0");
        assert!(encoder.elaboration().deadlocks.is_empty());
    }

    #[test]
    fn test_clean_graph_needs_nothing() {
        let mut vars = VariableSet::new();
        let x = vars.define("x", 0, VariableKind::Boolean);
        let mut graph = Graph::assignment(Cube::literal(x, true), 0);
        graph.reset.push(State::new(vec![0], Cube::literal(x, false)));

        let (design, elaboration) = Design::new(graph, vars)
            .validate(false)
            .unwrap()
            .elaborate(&ElaborateConfig::default())
            .unwrap();
        let mut encoder = Encoder::new(design, elaboration, ElaborateConfig::default());

        assert!(encoder.check(true, false).is_empty());
        assert!(encoder.insert_state_variables(10, false, false, false));
        assert_eq!(encoder.variables().len(), 1);
    }

    #[test]
    fn test_iteration_bound_is_respected() {
        let (design, elaboration) = merge_loop();
        let mut encoder = Encoder::new(design, elaboration, ElaborateConfig::default());

        assert!(!encoder.insert_state_variables(0, false, false, false));
        assert_eq!(encoder.conflicts().len(), 1);
        assert!(encoder.inserted().is_empty());
    }

    #[test]
    fn test_iteration_bound_applies_per_call() {
        let mut vars = VariableSet::new();
        let mut graph = merge_graph(&mut vars, "x", 0);
        let other = merge_graph(&mut vars, "y", 1);
        graph.merge(Composition::Parallel, other);

        let (design, elaboration) = elaborated(graph, vars);
        let mut encoder = Encoder::new(design, elaboration, ElaborateConfig::default());

        assert!(!encoder.insert_state_variables(1, false, false, false));
        assert_eq!(encoder.inserted().len(), 1);
        assert_eq!(encoder.conflicts().len(), 1);

        assert!(encoder.insert_state_variables(1, false, false, false));
        assert_eq!(encoder.inserted().len(), 2);
        assert_eq!(encoder.iterations(), 2);
        assert!(encoder.conflicts().is_empty());
    }

    #[test]
    fn test_unsigned_conflict_on_repeated_assignment() {
        // `x+; x+`: the second assignment fires in the same encoding the
        // final place rests in, with no polarity to tell them apart.
        let mut vars = VariableSet::new();
        let x = vars.define("x", 0, VariableKind::Boolean);
        let mut graph = Graph::assignment(Cube::literal(x, true), 0);
        graph.merge(
            Composition::Sequence,
            Graph::assignment(Cube::literal(x, true), 0),
        );
        let tokens = graph.source[0].tokens.clone();
        graph.reset.push(State::new(tokens, Cube::literal(x, false)));

        let (design, _) = elaborated(graph, vars);
        let graph = design.graph();
        assert!(find_conflicts(graph, design.variables(), false).is_empty());

        let conflicts = find_conflicts(graph, design.variables(), true);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.sense, Sense::Unsigned);
        assert_eq!(
            graph.transitions[conflict.transition].implicant,
            Cover::from(Cube::literal(x, true))
        );
        assert_eq!(conflict.region.len(), 1);
        assert!(graph.place_outputs(conflict.region[0]).is_empty());
        assert!(conflict.display(design.variables()).to_string().contains(".0~ "));
    }
}
