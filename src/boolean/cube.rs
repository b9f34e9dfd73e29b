use std::collections::BTreeMap;
use std::fmt;

use crate::variable::{VarId, VariableSet};

/// Conjunction of literals. The empty cube is the tautology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cube(BTreeMap<VarId, bool>);

impl Cube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(var: VarId, value: bool) -> Self {
        Self(BTreeMap::from([(var, value)]))
    }

    /// `None` when two literals contradict each other.
    pub fn from_literals(literals: impl IntoIterator<Item = (VarId, bool)>) -> Option<Self> {
        let mut cube = Self::new();
        for (var, value) in literals {
            match cube.0.insert(var, value) {
                Some(previous) if previous != value => return None,
                _ => {}
            }
        }
        Some(cube)
    }

    pub fn is_tautology(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, var: VarId) -> Option<bool> {
        self.0.get(&var).copied()
    }

    pub fn set(&mut self, var: VarId, value: bool) {
        self.0.insert(var, value);
    }

    pub fn literals(&self) -> impl Iterator<Item = (VarId, bool)> + '_ {
        self.0.iter().map(|(v, b)| (*v, *b))
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.0.keys().copied()
    }

    pub fn intersect(&self, other: &Cube) -> Option<Cube> {
        let mut result = self.clone();
        for (var, value) in other.literals() {
            match result.0.insert(var, value) {
                Some(previous) if previous != value => return None,
                _ => {}
            }
        }
        Some(result)
    }

    pub fn intersects(&self, other: &Cube) -> bool {
        other
            .literals()
            .all(|(var, value)| self.get(var).is_none_or(|v| v == value))
    }

    /// `self ⊆ other`: every literal of `other` appears in `self`.
    pub fn implies(&self, other: &Cube) -> bool {
        other
            .literals()
            .all(|(var, value)| self.get(var) == Some(value))
    }

    /// Overwrites the literals named by `action`.
    pub fn assign(&self, action: &Cube) -> Cube {
        let mut result = self.clone();
        for (var, value) in action.literals() {
            result.0.insert(var, value);
        }
        result
    }

    /// Existential quantification of every variable outside `keep`.
    pub fn restrict(&self, keep: impl Fn(VarId) -> bool) -> Cube {
        Self(
            self.0
                .iter()
                .filter(|(v, _)| keep(**v))
                .map(|(v, b)| (*v, *b))
                .collect(),
        )
    }

    pub fn hide(&self, var: VarId) -> Cube {
        self.restrict(|v| v != var)
    }

    /// Number of variables with opposite values.
    pub fn distance(&self, other: &Cube) -> usize {
        self.literals()
            .filter(|(var, value)| other.get(*var).is_some_and(|v| v != *value))
            .count()
    }

    /// Merges `a & x` with `a & ~x` into `a`.
    pub(crate) fn merge(&self, other: &Cube) -> Option<Cube> {
        if self.len() != other.len() || !self.0.keys().eq(other.0.keys()) {
            return None;
        }
        if self.distance(other) != 1 {
            return None;
        }

        let var = self
            .literals()
            .find(|(var, value)| other.get(*var) != Some(*value))
            .map(|(var, _)| var)?;
        Some(self.hide(var))
    }

    pub fn display<'a>(&'a self, vars: &'a VariableSet) -> CubeDisplay<'a> {
        CubeDisplay {
            cube: self,
            vars: Some(vars),
        }
    }
}

pub struct CubeDisplay<'a> {
    cube: &'a Cube,
    vars: Option<&'a VariableSet>,
}

impl fmt::Display for CubeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cube.is_tautology() {
            return write!(f, "1");
        }

        let literals = self
            .cube
            .literals()
            .map(|(var, value)| {
                let name = match self.vars {
                    Some(vars) => vars.label(var),
                    None => format!("v#{var}"),
                };
                if value { name } else { format!("~{name}") }
            })
            .collect::<Vec<_>>()
            .join("&");
        write!(f, "{literals}")
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = CubeDisplay {
            cube: self,
            vars: None,
        };
        fmt::Display::fmt(&display, f)
    }
}
