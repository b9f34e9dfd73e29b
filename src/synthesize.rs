use std::collections::BTreeMap;
use std::fmt;

use log::info;

use crate::Error;
use crate::boolean::Cover;
use crate::design::{Design, Encoded};
use crate::encoder::find_conflicts;
use crate::variable::{VarId, VariableSet};

/// `guard -> variable+` or `guard -> variable-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionRule {
    pub guard: Cover,
    pub variable: VarId,
    pub value: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub rules: Vec<ProductionRule>,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The pull-up or pull-down of `variable`.
    pub fn rule(&self, variable: VarId, value: bool) -> Option<&ProductionRule> {
        self.rules
            .iter()
            .find(|r| r.variable == variable && r.value == value)
    }

    pub fn display<'a>(&'a self, variables: &'a VariableSet) -> RuleSetDisplay<'a> {
        RuleSetDisplay {
            rules: self,
            variables,
        }
    }
}

pub struct RuleSetDisplay<'a> {
    rules: &'a RuleSet,
    variables: &'a VariableSet,
}

impl fmt::Display for RuleSetDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars = self.variables;
        for rule in &self.rules.rules {
            let guard = if rule.guard.is_null() {
                "0".to_string()
            } else {
                rule.guard
                    .cubes()
                    .iter()
                    .map(|cube| {
                        if cube.is_tautology() {
                            return "1".to_string();
                        }
                        cube.literals()
                            .map(|(v, b)| {
                                let name = vars.label(v);
                                if b { name } else { format!("~{name}") }
                            })
                            .collect::<Vec<_>>()
                            .join(" & ")
                    })
                    .collect::<Vec<_>>()
                    .join(" | ")
            };
            let sign = if rule.value { '+' } else { '-' };
            writeln!(f, "{guard} -> {}{sign}", vars.label(rule.variable))?;
        }
        Ok(())
    }
}

/// Reads one pull-up and one pull-down per driven variable off the
/// implicants of a conflict-free graph. `include_unsigned` should match the
/// mode the design was encoded with.
pub fn synthesize(design: &Design<Encoded>, include_unsigned: bool) -> Result<RuleSet, Error> {
    let graph = design.graph();
    let variables = design.variables();

    let conflicts = find_conflicts(graph, variables, include_unsigned);
    if !conflicts.is_empty() {
        return Err(Error::Unresolved(conflicts));
    }

    let mut guards: BTreeMap<(VarId, bool), Cover> = BTreeMap::new();
    for transition in &graph.transitions {
        let visible = variables.in_region(transition.region);
        for action in transition.local_action.cubes() {
            for (var, value) in action.literals() {
                if !visible.contains(&var) {
                    continue;
                }
                let guard = transition
                    .implicant
                    .restrict(|v| visible.contains(&v) && v != var);
                guards.entry((var, !value)).or_default().or(&guard);
            }
        }
    }

    let rules: Vec<ProductionRule> = guards
        .into_iter()
        .map(|((variable, falling), mut guard)| {
            guard.minimize();
            ProductionRule {
                guard,
                variable,
                value: !falling,
            }
        })
        .collect();

    info!("synthesized {} production rules", rules.len());
    Ok(RuleSet { rules })
}
