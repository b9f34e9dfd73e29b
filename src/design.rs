use std::fmt;
use std::marker::PhantomData;

use crate::graph::Graph;
use crate::variable::VariableSet;

pub struct Raw;
pub struct Normalized;
pub struct Elaborated;
pub struct Encoded;

/// A graph together with the variables it refers to, tagged with how far
/// through synthesis it has been carried.
pub struct Design<S = Raw> {
    pub graph: Graph,
    pub variables: VariableSet,
    stage: PhantomData<S>,
}

impl<S> Design<S> {
    pub(crate) fn with_stage(graph: Graph, variables: VariableSet) -> Self {
        Self {
            graph,
            variables,
            stage: PhantomData,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub fn into_parts(self) -> (Graph, VariableSet) {
        (self.graph, self.variables)
    }

    pub(crate) fn advance<T>(self) -> Design<T> {
        Design::with_stage(self.graph, self.variables)
    }
}

impl Design<Raw> {
    pub fn new(graph: Graph, variables: VariableSet) -> Self {
        Self::with_stage(graph, variables)
    }
}

impl<S> Clone for Design<S> {
    fn clone(&self) -> Self {
        Self::with_stage(self.graph.clone(), self.variables.clone())
    }
}

impl<S> fmt::Debug for Design<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Design")
            .field("graph", &self.graph)
            .field("variables", &self.variables)
            .finish()
    }
}

/// Plain-text dump of the annotated graph, one node per line.
impl<S> fmt::Display for Design<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars = &self.variables;

        for (id, var) in vars.iter() {
            writeln!(f, "var {} @{} {:?} {:?}", vars.label(id), var.region, var.kind, var.origin)?;
        }

        for (p, place) in self.graph.places.iter().enumerate() {
            writeln!(
                f,
                "P{p} predicate={} effective={}",
                place.predicate.display(vars),
                place.effective.display(vars)
            )?;
        }

        for (t, transition) in self.graph.transitions.iter().enumerate() {
            let inputs = self.graph.inputs(t);
            let outputs = self.graph.outputs(t);
            writeln!(
                f,
                "T{t} @{} {:?} -> {:?} {} implicant={}",
                transition.region,
                inputs,
                outputs,
                transition.label(vars),
                transition.implicant.display(vars)
            )?;
        }

        for state in &self.graph.reset {
            writeln!(f, "reset {:?} {}", state.tokens, state.encoding.display(vars))?;
        }
        Ok(())
    }
}
