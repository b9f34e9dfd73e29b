use std::fmt;

use super::cube::Cube;
use crate::variable::{VarId, VariableSet};

/// Disjunction of cubes. The empty cover is false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cover(Vec<Cube>);

impl Cover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tautology() -> Self {
        Self(vec![Cube::new()])
    }

    /// Keeps every term as given. Actions are lists of alternative
    /// assignments, so containment between terms must not prune them.
    pub fn from_terms(terms: Vec<Cube>) -> Self {
        Self(terms)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_tautology(&self) -> bool {
        self.0.iter().any(Cube::is_tautology)
    }

    pub fn cubes(&self) -> &[Cube] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds `cube` unless an existing cube already contains it.
    pub fn push(&mut self, cube: Cube) {
        if self.0.iter().any(|c| cube.implies(c)) {
            return;
        }
        self.0.retain(|c| !c.implies(&cube));
        self.0.push(cube);
    }

    pub fn or(&mut self, other: &Cover) {
        for cube in &other.0 {
            self.push(cube.clone());
        }
    }

    pub fn and_cube(&self, cube: &Cube) -> Cover {
        let mut result = Cover::new();
        for c in &self.0 {
            if let Some(i) = c.intersect(cube) {
                result.push(i);
            }
        }
        result
    }

    pub fn and(&self, other: &Cover) -> Cover {
        let mut result = Cover::new();
        for cube in &other.0 {
            result.or(&self.and_cube(cube));
        }
        result
    }

    pub fn intersects_cube(&self, cube: &Cube) -> bool {
        self.0.iter().any(|c| c.intersects(cube))
    }

    pub fn intersects(&self, other: &Cover) -> bool {
        other.0.iter().any(|c| self.intersects_cube(c))
    }

    /// True when some cube of the cover contains `cube`.
    pub fn covers(&self, cube: &Cube) -> bool {
        self.0.iter().any(|c| cube.implies(c))
    }

    pub fn restrict(&self, keep: impl Fn(VarId) -> bool) -> Cover {
        let mut result = Cover::new();
        for cube in &self.0 {
            result.push(cube.restrict(&keep));
        }
        result
    }

    pub fn hide(&self, var: VarId) -> Cover {
        self.restrict(|v| v != var)
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.0.iter().flat_map(Cube::vars)
    }

    /// Merges distance-one cubes and drops contained ones until nothing changes.
    /// The result is sorted, so equal functions built in the same way compare equal.
    pub fn minimize(&mut self) {
        loop {
            let mut merged = None;
            'search: for i in 0..self.0.len() {
                for j in (i + 1)..self.0.len() {
                    if let Some(cube) = self.0[i].merge(&self.0[j]) {
                        merged = Some((i, j, cube));
                        break 'search;
                    }
                }
            }

            let Some((i, j, cube)) = merged else {
                break;
            };
            self.0.remove(j);
            self.0.remove(i);
            self.push(cube);
        }

        self.0.sort();
    }

    pub fn display<'a>(&'a self, vars: &'a VariableSet) -> CoverDisplay<'a> {
        CoverDisplay { cover: self, vars }
    }
}

impl From<Cube> for Cover {
    fn from(cube: Cube) -> Self {
        Self(vec![cube])
    }
}

impl FromIterator<Cube> for Cover {
    fn from_iter<I: IntoIterator<Item = Cube>>(iter: I) -> Self {
        let mut cover = Cover::new();
        for cube in iter {
            cover.push(cube);
        }
        cover
    }
}

pub struct CoverDisplay<'a> {
    cover: &'a Cover,
    vars: &'a VariableSet,
}

impl fmt::Display for CoverDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cover.is_null() {
            return write!(f, "0");
        }

        let terms = self
            .cover
            .cubes()
            .iter()
            .map(|c| c.display(self.vars).to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        write!(f, "{terms}")
    }
}

impl fmt::Display for Cover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "0");
        }

        let terms = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ");
        write!(f, "{terms}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(literals: &[(VarId, bool)]) -> Cube {
        Cube::from_literals(literals.iter().copied()).unwrap()
    }

    #[test]
    fn test_push_prunes_contained_cubes() {
        let mut cover = Cover::from(cube(&[(0, true), (1, true)]));
        cover.push(cube(&[(0, true)]));
        assert_eq!(cover.len(), 1);
        assert_eq!(cover.cubes()[0], cube(&[(0, true)]));

        cover.push(cube(&[(0, true), (1, false)]));
        assert_eq!(cover.len(), 1);
    }

    #[test]
    fn test_minimize_to_tautology() {
        let mut cover: Cover = [
            cube(&[(0, false), (1, false)]),
            cube(&[(0, true), (1, false)]),
            cube(&[(0, false), (1, true)]),
            cube(&[(0, true), (1, true)]),
        ]
        .into_iter()
        .collect();

        cover.minimize();
        assert!(cover.is_tautology());
    }

    #[test]
    fn test_and_distributes() {
        let a: Cover = [cube(&[(0, true)]), cube(&[(1, true)])].into_iter().collect();
        let b = Cover::from(cube(&[(0, false)]));
        let mut result = a.and(&b);
        result.minimize();
        assert_eq!(result, Cover::from(cube(&[(0, false), (1, true)])));
        assert!(!Cover::from(cube(&[(0, true)])).intersects(&b));
    }
}
