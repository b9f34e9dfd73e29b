use log::warn;

use crate::design::{Design, Normalized, Raw};
use crate::error::{ValidationError, ValidationErrorKind};
use crate::graph::{Graph, NodeRef};
use crate::variable::{VariableKind, VariableSet};

pub type ValidationResult<T = ()> = Result<T, Vec<ValidationError>>;

impl Design<Raw> {
    /// Checks the structure and variable references, then normalizes the graph.
    pub fn validate(mut self, aggressive: bool) -> ValidationResult<Design<Normalized>> {
        let mut errors = vec![];

        if let Err(arcs) = check_arcs(&self.graph) {
            errors.extend(arcs);
        }
        if let Err(reset) = check_reset(&self.graph) {
            errors.extend(reset);
        }
        errors.extend(self.graph.check_variables(&self.variables));

        if !errors.is_empty() {
            return Err(errors);
        }

        self.graph.post_process(&self.variables, aggressive);
        Ok(self.advance())
    }
}

impl Graph {
    /// Every reference to a variable that is missing from `variables` or that
    /// still carries an integer width. Callers decide whether to abort.
    pub fn check_variables(&self, variables: &VariableSet) -> Vec<ValidationError> {
        let mut errors = vec![];

        for (t, transition) in self.transitions.iter().enumerate() {
            let used = transition.guard.vars().chain(transition.action.vars());
            for var in used {
                match variables.get(var) {
                    None => errors.push(ValidationError::new(
                        ValidationErrorKind::UndeclaredVariable,
                        format!("T{t} refers to undeclared variable v#{var}"),
                    )),
                    Some(v) => {
                        if let VariableKind::Integer { width } = v.kind {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::UnsupportedWidth,
                                format!(
                                    "T{t} uses '{}' of width {width}, only single wires are elaborated",
                                    v.name
                                ),
                            ));
                        }
                    }
                }
            }
        }

        for state in self.reset.iter().chain(&self.source) {
            for var in state.encoding.vars() {
                if variables.get(var).is_none() {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::UndeclaredVariable,
                        format!("initial state refers to undeclared variable v#{var}"),
                    ));
                }
            }
        }

        for error in &errors {
            warn!("{error}");
        }
        errors.dedup_by(|a, b| a.kind == b.kind && a.message == b.message);
        errors
    }
}

fn check_arcs(graph: &Graph) -> ValidationResult {
    let mut errors = vec![];
    let in_range = |node: NodeRef| match node {
        NodeRef::Place(p) => p < graph.places.len(),
        NodeRef::Transition(t) => t < graph.transitions.len(),
    };

    for (from, to) in graph.arcs() {
        if !in_range(*from) || !in_range(*to) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DanglingArc,
                format!("Arc {from:?} -> {to:?} points outside the graph"),
            ));
        } else if matches!(
            (from, to),
            (NodeRef::Place(_), NodeRef::Place(_)) | (NodeRef::Transition(_), NodeRef::Transition(_))
        ) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidArc,
                format!("Arc {from:?} -> {to:?} joins two nodes of the same kind"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_reset(graph: &Graph) -> ValidationResult {
    let mut errors = vec![];

    for state in graph.reset.iter().chain(&graph.source) {
        for p in &state.tokens {
            if *p >= graph.places.len() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownResetPlace,
                    format!("Initial marking holds a token on missing place P{p}"),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::{Cover, Cube};
    use crate::graph::{State, Transition};

    #[test]
    fn test_undeclared_variable() {
        let vars = VariableSet::new();
        let graph = Graph::assignment(Cube::literal(3, true), 0);

        let errors = graph.check_variables(&vars);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::UndeclaredVariable);
    }

    #[test]
    fn test_integer_variable_is_rejected() {
        let mut vars = VariableSet::new();
        let d = vars.define("d", 0, VariableKind::Integer { width: 8 });
        let graph = Graph::guard(Cover::from(Cube::literal(d, true)), 0);

        let errors = graph.check_variables(&vars);
        assert_eq!(errors[0].kind, ValidationErrorKind::UnsupportedWidth);
    }

    #[test]
    fn test_reset_outside_graph() {
        let mut graph = Graph::skip(0);
        graph.reset.push(State::new(vec![9], Cube::new()));

        let result = Design::new(graph, VariableSet::new()).validate(false);
        let errors = result.err().unwrap();
        assert_eq!(errors[0].kind, ValidationErrorKind::UnknownResetPlace);
    }

    #[test]
    fn test_valid_design() {
        let mut vars = VariableSet::new();
        let x = vars.define("x", 0, VariableKind::Boolean);
        let mut graph = Graph::new();
        let p = graph.create_place();
        let t = graph.create_transition(Transition::new(
            Cover::tautology(),
            Cover::from(Cube::literal(x, true)),
            0,
        ));
        graph.connect(NodeRef::Place(p), NodeRef::Transition(t)).unwrap();
        graph.reset.push(State::new(vec![p], Cube::literal(x, false)));

        let design = Design::new(graph, vars).validate(false);
        assert!(design.is_ok());
    }
}
