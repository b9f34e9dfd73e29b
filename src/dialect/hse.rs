use log::{debug, warn};
use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;

use super::Dialect;
use crate::Error;
use crate::boolean::{Cube, Expr};
use crate::design::{Design, Raw};
use crate::graph::{Composition, Graph, State};
use crate::variable::{VarId, VariableKind, VariableSet};

#[derive(Parser)]
#[grammar = "../grammar/hse.pest"]
pub struct HseParser;

/// Handshaking expansions written as `process name @region { ... }` blocks
/// plus a `reset` line.
pub struct Hse;

impl Dialect for Hse {
    fn name(&self) -> &'static str {
        "hse"
    }

    fn extensions(&self) -> &[&'static str] {
        &["hse"]
    }

    fn import(&self, source: &str) -> Result<Design<Raw>, Error> {
        parse(source)
    }
}

pub fn parse(source: &str) -> Result<Design<Raw>, Error> {
    let program = HseParser::parse(Rule::Program, source)
        .map_err(|e| Error::ParseError(format!("HSE: {e}")))?
        .next()
        .ok_or_else(|| malformed("program"))?;

    let mut importer = Importer::default();
    let mut resets = vec![];
    let mut processes = 0;

    for item in program.into_inner() {
        match item.as_rule() {
            Rule::Process => {
                importer.process(item, processes)?;
                processes += 1;
            }
            Rule::Reset => resets.push(item),
            Rule::EOI => break,
            _ => {}
        }
    }

    let Importer {
        mut graph,
        variables,
    } = importer;

    if resets.is_empty() {
        warn!("HSE: no reset given, elaborating from the source marking");
    } else {
        let mut encoding = Cube::new();
        for reset in resets {
            for assign in reset.into_inner() {
                let (name, value) = literal(assign)?;
                let copies: Vec<VarId> = variables
                    .iter()
                    .filter(|(_, v)| v.name == name)
                    .map(|(id, _)| id)
                    .collect();
                if copies.is_empty() {
                    return Err(Error::ParseError(format!(
                        "HSE: reset names unknown variable '{name}'"
                    )));
                }
                for copy in copies {
                    encoding.set(copy, value);
                }
            }
        }

        graph.reset = graph
            .source
            .iter()
            .filter_map(|s| {
                let encoding = s.encoding.intersect(&encoding)?;
                Some(State::new(s.tokens.clone(), encoding))
            })
            .collect();
    }

    Ok(Design::new(graph, variables))
}

#[derive(Default)]
struct Importer {
    graph: Graph,
    variables: VariableSet,
}

impl Importer {
    fn process(&mut self, pair: Pair<'_, Rule>, index: usize) -> Result<(), Error> {
        let mut inner = pair.into_inner();
        let name = next(&mut inner, "process name")?.as_str().to_string();

        let mut region = index;
        let mut body = next(&mut inner, "process body")?;
        if body.as_rule() == Rule::Region {
            let number = next(&mut body.into_inner(), "region number")?;
            region = number
                .as_str()
                .parse()
                .map_err(|e| Error::ParseError(format!("HSE: region of {name}: {e}")))?;
            body = next(&mut inner, "process body")?;
        }

        let graph = self.sequence(body, region)?;
        debug!(
            "HSE: process {name} @{region} has {} places, {} transitions",
            graph.places.len(),
            graph.transitions.len()
        );
        self.graph.merge(Composition::Parallel, graph);
        Ok(())
    }

    fn sequence(&mut self, pair: Pair<'_, Rule>, region: usize) -> Result<Graph, Error> {
        let mut graph = Graph::new();
        for parallel in pair.into_inner() {
            let next = self.parallel(parallel, region)?;
            graph.merge(Composition::Sequence, next);
        }
        Ok(graph)
    }

    fn parallel(&mut self, pair: Pair<'_, Rule>, region: usize) -> Result<Graph, Error> {
        let mut graph = Graph::new();
        for term in pair.into_inner() {
            let next = self.term(term, region)?;
            graph.merge(Composition::Parallel, next);
        }
        Ok(graph)
    }

    fn term(&mut self, pair: Pair<'_, Rule>, region: usize) -> Result<Graph, Error> {
        match pair.as_rule() {
            Rule::Loop => {
                let body = next(&mut pair.into_inner(), "loop body")?;
                let mut graph = self.sequence(body, region)?;
                graph.repeat();
                Ok(graph)
            }
            Rule::Select => {
                let mut graph = Graph::new();
                for branch in pair.into_inner() {
                    let next = self.branch(branch, region)?;
                    graph.merge(Composition::Choice, next);
                }
                Ok(graph)
            }
            Rule::Guard => {
                let expr = next(&mut pair.into_inner(), "guard")?;
                let guard = self.expr(expr, region)?.to_cover();
                Ok(Graph::guard(guard, region))
            }
            Rule::Group => {
                let body = next(&mut pair.into_inner(), "group body")?;
                self.sequence(body, region)
            }
            Rule::Skip => Ok(Graph::skip(region)),
            Rule::Assign => {
                let (name, value) = literal(pair)?;
                let var = self.variables.define(name, region, VariableKind::Boolean);
                Ok(Graph::assignment(Cube::literal(var, value), region))
            }
            rule => Err(Error::ParseError(format!("HSE: unexpected {rule:?}"))),
        }
    }

    /// `g -> S` is the guard `[g]` followed by `S`.
    fn branch(&mut self, pair: Pair<'_, Rule>, region: usize) -> Result<Graph, Error> {
        let mut inner = pair.into_inner();
        let expr = next(&mut inner, "branch guard")?;
        let guard = self.expr(expr, region)?.to_cover();
        let body = next(&mut inner, "branch body")?;

        let mut graph = Graph::guard(guard, region);
        let body = self.sequence(body, region)?;
        graph.merge(Composition::Sequence, body);
        Ok(graph)
    }

    fn expr(&mut self, pair: Pair<'_, Rule>, region: usize) -> Result<Expr, Error> {
        match pair.as_rule() {
            Rule::Expr | Rule::Conj => {
                let rule = pair.as_rule();
                let mut terms = pair
                    .into_inner()
                    .map(|p| self.expr(p, region))
                    .collect::<Result<Vec<_>, _>>()?;
                if terms.len() == 1 {
                    return terms.pop().ok_or_else(|| malformed("expression"));
                }
                Ok(if rule == Rule::Expr {
                    Expr::Or(terms)
                } else {
                    Expr::And(terms)
                })
            }
            Rule::Unary => {
                let mut negate = false;
                let mut atom = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::Not => negate = !negate,
                        _ => atom = Some(self.expr(p, region)?),
                    }
                }
                let atom = atom.ok_or_else(|| malformed("operand"))?;
                Ok(if negate { Expr::Not(Box::new(atom)) } else { atom })
            }
            Rule::Const => Ok(Expr::Const(pair.as_str() == "1")),
            Rule::Id => Ok(Expr::Var(self.variables.define(
                pair.as_str(),
                region,
                VariableKind::Boolean,
            ))),
            rule => Err(Error::ParseError(format!("HSE: unexpected {rule:?}"))),
        }
    }
}

/// Name and value of an `x+` / `x-` pair.
fn literal(pair: Pair<'_, Rule>) -> Result<(&str, bool), Error> {
    let mut inner = pair.into_inner();
    let name = next(&mut inner, "variable")?.as_str();
    let sign = next(&mut inner, "sign")?.as_str();
    Ok((name, sign == "+"))
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, Error> {
    pairs.next().ok_or_else(|| malformed(what))
}

fn malformed(what: &str) -> Error {
    Error::ParseError(format!("HSE: missing {what}"))
}
