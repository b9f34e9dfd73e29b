use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use log::{info, warn};

use crate::Error;
use crate::design::{Design, Raw};
use crate::elaborate::{ElaborateConfig, Elaboration};
use crate::encoder::{Conflict, EncodeConfig, Encoder};
use crate::graph::Graph;
use crate::synthesize::{RuleSet, synthesize};
use crate::variable::VariableSet;

/// Checkpoints of the synthesis flow, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Elab,
    Conflicts,
    Encode,
    Rules,
    Bubble,
    Keepers,
    Size,
    Nets,
    Map,
    Cells,
    Place,
    Route,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Elab,
        Stage::Conflicts,
        Stage::Encode,
        Stage::Rules,
        Stage::Bubble,
        Stage::Keepers,
        Stage::Size,
        Stage::Nets,
        Stage::Map,
        Stage::Cells,
        Stage::Place,
        Stage::Route,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Elab => "elab",
            Stage::Conflicts => "conflicts",
            Stage::Encode => "encode",
            Stage::Rules => "rules",
            Stage::Bubble => "bubble",
            Stage::Keepers => "keepers",
            Stage::Size => "size",
            Stage::Nets => "nets",
            Stage::Map => "map",
            Stage::Cells => "cells",
            Stage::Place => "place",
            Stage::Route => "route",
        }
    }

    /// Stages after production rules are carried out by other tools.
    pub fn is_downstream(&self) -> bool {
        *self > Stage::Rules
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| Error::InvalidType(format!("stage '{s}'")))
    }
}

/// What a halted or persisted stage leaves behind.
#[derive(Debug, Clone)]
pub enum Artifact {
    Hse {
        graph: Graph,
        variables: VariableSet,
    },
    Conflicts(Vec<Conflict>),
    Rules(RuleSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    /// Keep the artifact and go on.
    Persist,
    Halt,
}

#[derive(Debug)]
pub struct Outcome {
    /// Last stage that ran.
    pub reached: Stage,
    /// In the order they were produced. A stage may appear twice: a persisted
    /// `Encode` that did not converge keeps both the graph and the conflicts.
    pub artifacts: Vec<(Stage, Artifact)>,
    pub elaboration: Elaboration,
    /// Conflicts left when the run stopped.
    pub conflicts: Vec<Conflict>,
    pub converged: bool,
    pub variables: VariableSet,
}

impl Outcome {
    /// First artifact kept for `stage`.
    pub fn artifact(&self, stage: Stage) -> Option<&Artifact> {
        self.artifacts_of(stage).next()
    }

    pub fn artifacts_of(&self, stage: Stage) -> impl Iterator<Item = &Artifact> + '_ {
        self.artifacts
            .iter()
            .filter(move |(s, _)| *s == stage)
            .map(|(_, a)| a)
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stop: Stage,
    pub persist: BTreeSet<Stage>,
    pub aggressive: bool,
    pub elaborate: ElaborateConfig,
    pub encode: EncodeConfig,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stop: Stage::Rules,
            persist: BTreeSet::new(),
            aggressive: false,
            elaborate: ElaborateConfig::default(),
            encode: EncodeConfig::default(),
        }
    }
}

impl Pipeline {
    pub fn decide(&self, stage: Stage) -> Decision {
        if stage >= self.stop {
            Decision::Halt
        } else if self.persist.contains(&stage) {
            Decision::Persist
        } else {
            Decision::Continue
        }
    }

    pub fn run(&self, design: Design<Raw>) -> Result<Outcome, Error> {
        let mut pipeline = self.clone();
        if pipeline.stop.is_downstream() {
            warn!(
                "stage '{}' belongs to downstream tools, stopping at '{}'",
                pipeline.stop,
                Stage::Rules
            );
            pipeline.stop = Stage::Rules;
        }
        pipeline.execute(design)
    }

    fn execute(&self, design: Design<Raw>) -> Result<Outcome, Error> {
        let normalized = design.validate(self.aggressive)?;
        let (elaborated, elaboration) = normalized.elaborate(&self.elaborate)?;

        let mut outcome = Outcome {
            reached: Stage::Elab,
            artifacts: vec![],
            elaboration: elaboration.clone(),
            conflicts: vec![],
            converged: false,
            variables: elaborated.variables().clone(),
        };

        let decision = self.checkpoint(Stage::Elab, &mut outcome, || Artifact::Hse {
            graph: elaborated.graph().clone(),
            variables: elaborated.variables().clone(),
        });
        if decision == Decision::Halt {
            return Ok(outcome);
        }

        let mut encoder = Encoder::new(elaborated, elaboration, self.elaborate.clone());
        outcome.conflicts = encoder
            .check(self.encode.non_inverting, self.encode.report_progress)
            .to_vec();
        outcome.converged = outcome.conflicts.is_empty();

        let decision = self.checkpoint(Stage::Conflicts, &mut outcome, || {
            Artifact::Conflicts(encoder.conflicts().to_vec())
        });
        if decision == Decision::Halt {
            return Ok(outcome);
        }

        outcome.converged = encoder.run(&self.encode);
        outcome.conflicts = encoder.conflicts().to_vec();
        outcome.elaboration = encoder.elaboration().clone();
        outcome.variables = encoder.variables().clone();

        let decision = self.checkpoint(Stage::Encode, &mut outcome, || Artifact::Hse {
            graph: encoder.graph().clone(),
            variables: encoder.variables().clone(),
        });
        if !outcome.converged {
            warn!(
                "encoding did not converge, {} conflicts left",
                outcome.conflicts.len()
            );
            if decision != Decision::Halt {
                outcome
                    .artifacts
                    .push((Stage::Encode, Artifact::Conflicts(outcome.conflicts.clone())));
            }
            return Ok(outcome);
        }
        if decision == Decision::Halt {
            return Ok(outcome);
        }

        let design = encoder.into_design();
        let rules = synthesize(&design, self.encode.non_inverting)?;
        self.checkpoint(Stage::Rules, &mut outcome, || Artifact::Rules(rules));
        Ok(outcome)
    }

    fn checkpoint(
        &self,
        stage: Stage,
        outcome: &mut Outcome,
        artifact: impl FnOnce() -> Artifact,
    ) -> Decision {
        outcome.reached = stage;
        let decision = self.decide(stage);
        if decision != Decision::Continue {
            info!("{stage}: keeping artifact");
            outcome.artifacts.push((stage, artifact()));
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::Cube;
    use crate::boolean::Cover;
    use crate::graph::{Composition, NodeRef, State, Transition};
    use crate::variable::VariableKind;

    fn handshake() -> Design<Raw> {
        let mut vars = VariableSet::new();
        let x = vars.define("x", 0, VariableKind::Boolean);
        let y = vars.define("y", 0, VariableKind::Boolean);

        let mut graph = Graph::assignment(Cube::literal(x, true), 0);
        for (var, value) in [(y, true), (x, false), (y, false)] {
            graph.merge(
                Composition::Sequence,
                Graph::assignment(Cube::literal(var, value), 0),
            );
        }
        graph.repeat();
        let tokens = graph.source[0].tokens.clone();
        graph.reset.push(State::new(
            tokens,
            Cube::from_literals([(x, false), (y, false)]).unwrap(),
        ));
        Design::new(graph, vars)
    }

    /// Two unconditional branches out of `x+` that merge again before `x-`.
    fn merge_loop() -> Design<Raw> {
        let mut vars = VariableSet::new();
        let x = vars.define("x", 0, VariableKind::Boolean);

        let mut graph = Graph::new();
        let p: Vec<usize> = (0..3).map(|_| graph.create_place()).collect();
        let rise = graph.create_transition(Transition::new(
            Cover::tautology(),
            Cover::from(Cube::literal(x, true)),
            0,
        ));
        let left = graph.create_transition(Transition::skip(0));
        let right = graph.create_transition(Transition::skip(0));
        let fall = graph.create_transition(Transition::new(
            Cover::tautology(),
            Cover::from(Cube::literal(x, false)),
            0,
        ));
        for (from, to) in [
            (NodeRef::Place(p[0]), NodeRef::Transition(rise)),
            (NodeRef::Transition(rise), NodeRef::Place(p[1])),
            (NodeRef::Place(p[1]), NodeRef::Transition(left)),
            (NodeRef::Place(p[1]), NodeRef::Transition(right)),
            (NodeRef::Transition(left), NodeRef::Place(p[2])),
            (NodeRef::Transition(right), NodeRef::Place(p[2])),
            (NodeRef::Place(p[2]), NodeRef::Transition(fall)),
            (NodeRef::Transition(fall), NodeRef::Place(p[0])),
        ] {
            graph.connect(from, to).unwrap();
        }
        graph.reset.push(State::new(vec![p[0]], Cube::literal(x, false)));
        Design::new(graph, vars)
    }

    #[test]
    fn test_stage_order_and_names() {
        assert!(Stage::Elab < Stage::Conflicts);
        assert!(Stage::Rules < Stage::Bubble);
        assert!(Stage::Route.is_downstream());
        assert!(!Stage::Rules.is_downstream());
        assert_eq!("Encode".parse::<Stage>().unwrap(), Stage::Encode);
        assert!("gds".parse::<Stage>().is_err());
        for stage in Stage::ALL {
            assert_eq!(stage.to_string().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_halts_at_stop_stage() {
        let pipeline = Pipeline {
            stop: Stage::Conflicts,
            ..Default::default()
        };
        let outcome = pipeline.run(handshake()).unwrap();

        assert_eq!(outcome.reached, Stage::Conflicts);
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(matches!(
            outcome.artifact(Stage::Conflicts),
            Some(Artifact::Conflicts(c)) if c.is_empty()
        ));
    }

    #[test]
    fn test_persist_keeps_intermediate() {
        let pipeline = Pipeline {
            stop: Stage::Route,
            persist: BTreeSet::from([Stage::Elab]),
            ..Default::default()
        };
        let outcome = pipeline.run(handshake()).unwrap();

        assert_eq!(outcome.reached, Stage::Rules);
        assert!(outcome.converged);
        assert!(matches!(outcome.artifact(Stage::Elab), Some(Artifact::Hse { .. })));
        assert!(matches!(
            outcome.artifact(Stage::Rules),
            Some(Artifact::Rules(rules)) if rules.len() == 4
        ));
    }

    #[test]
    fn test_unconverged_encode_keeps_graph_and_conflicts() {
        let pipeline = Pipeline {
            persist: BTreeSet::from([Stage::Encode]),
            encode: EncodeConfig {
                max_iterations: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let outcome = pipeline.run(merge_loop()).unwrap();

        assert_eq!(outcome.reached, Stage::Encode);
        assert!(!outcome.converged);
        assert_eq!(outcome.conflicts.len(), 1);

        let kept: Vec<&Artifact> = outcome.artifacts_of(Stage::Encode).collect();
        assert_eq!(kept.len(), 2);
        assert!(matches!(kept[0], Artifact::Hse { .. }));
        assert!(matches!(kept[1], Artifact::Conflicts(c) if c.len() == 1));
        assert!(matches!(outcome.artifact(Stage::Encode), Some(Artifact::Hse { .. })));
    }
}
