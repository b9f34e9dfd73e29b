use super::cover::Cover;
use super::cube::Cube;
use crate::variable::VarId;

/// Guard expression as written by a dialect, before conversion to a cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(bool),
    Var(VarId),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn to_cover(&self) -> Cover {
        let mut cover = self.cover(true);
        cover.minimize();
        cover
    }

    fn cover(&self, positive: bool) -> Cover {
        match self {
            Expr::Const(value) if *value == positive => Cover::tautology(),
            Expr::Const(_) => Cover::new(),
            Expr::Var(var) => Cover::from(Cube::literal(*var, positive)),
            Expr::Not(inner) => inner.cover(!positive),
            // De Morgan: a negated conjunction is the disjunction of negations.
            Expr::And(terms) if positive => conjunction(terms, true),
            Expr::And(terms) => disjunction(terms, false),
            Expr::Or(terms) if positive => disjunction(terms, true),
            Expr::Or(terms) => conjunction(terms, false),
        }
    }
}

fn conjunction(terms: &[Expr], positive: bool) -> Cover {
    terms
        .iter()
        .fold(Cover::tautology(), |acc, term| acc.and(&term.cover(positive)))
}

fn disjunction(terms: &[Expr], positive: bool) -> Cover {
    let mut result = Cover::new();
    for term in terms {
        result.or(&term.cover(positive));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negated_conjunction() {
        let expr = Expr::Not(Box::new(Expr::And(vec![Expr::Var(0), Expr::Var(1)])));
        let cover = expr.to_cover();

        assert_eq!(cover.len(), 2);
        assert!(cover.covers(&Cube::literal(0, false)));
        assert!(cover.covers(&Cube::literal(1, false)));
    }

    #[test]
    fn test_constants() {
        assert!(Expr::Const(true).to_cover().is_tautology());
        assert!(Expr::Not(Box::new(Expr::Const(true))).to_cover().is_null());
        let contradiction = Expr::And(vec![Expr::Var(0), Expr::Not(Box::new(Expr::Var(0)))]);
        assert!(contradiction.to_cover().is_null());
    }
}
