use std::fmt::Write;
use std::path::Path;

use layout::backends::svg::SVGWriter;
use layout::gv::{DotParser, GraphBuilder};
use layout::topo::layout::VisualGraph;
use petgraph::Directed;
use petgraph::dot::{Config, Dot};
use petgraph::graph::Graph as PetGraph;

use crate::Error;
use crate::graph::{Graph, NodeRef};
use crate::variable::VariableSet;

pub type Flow = PetGraph<String, &'static str, Directed>;

/// Labels every node of `graph` for drawing. Places show their effective
/// encoding and, when recorded, the branches taken to reach them.
pub fn to_flow(graph: &Graph, variables: &VariableSet) -> Flow {
    graph.to_petgraph().map(
        |_, node| match node {
            NodeRef::Place(p) => {
                let place = &graph.places[*p];
                let mut label = format!("P{p}");
                if !place.effective.is_null() {
                    write!(label, " {}", place.effective.display(variables)).ok();
                }
                if !place.ghost.is_null() {
                    let ghost = place
                        .ghost
                        .cubes()
                        .iter()
                        .map(|c| {
                            c.literals()
                                .map(|(t, taken)| format!("{}T{t}", if taken { "" } else { "~" }))
                                .collect::<Vec<_>>()
                                .join("&")
                        })
                        .collect::<Vec<_>>()
                        .join(" | ");
                    write!(label, " <{ghost}>").ok();
                }
                label
            }
            NodeRef::Transition(t) => {
                format!("T{t} {}", graph.transitions[*t].label(variables))
            }
        },
        |_, _| "",
    )
}

pub fn render_graph(graph: &Flow) -> Result<String, Error> {
    let mut buffer = String::new();
    write!(
        &mut buffer,
        "{}",
        Dot::with_config(graph, &[Config::EdgeNoLabel])
    )
    .map_err(|e| Error::RenderError(format!("Failed to write DOT: {e}")))?;
    Ok(buffer)
}

pub fn render_to_svg(graph: &Flow) -> Result<String, Error> {
    let dot_string = render_graph(graph)?;
    let mut parser = DotParser::new(&dot_string);

    let tree = parser
        .process()
        .map_err(|e| Error::RenderError(format!("Unable to parse DOT: {e}")))?;
    let mut gb = GraphBuilder::new();
    gb.visit_graph(&tree);
    let mut visual_graph = gb.get();
    Ok(generate_svg(&mut visual_graph))
}

fn generate_svg(graph: &mut VisualGraph) -> String {
    let mut svg = SVGWriter::new();
    graph.do_it(false, false, false, &mut svg);
    svg.finalize()
}

pub fn render_svg_to_pdf(svg: impl AsRef<str>, output: &Path) -> Result<(), Error> {
    use svg2pdf::{ConversionOptions, PageOptions};

    let output = output.with_extension("pdf");

    let mut options = svg2pdf::usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = svg2pdf::usvg::Tree::from_str(svg.as_ref(), &options)
        .map_err(|e| Error::RenderError(format!("Invalid SVG: {e}")))?;

    let pdf = svg2pdf::to_pdf(&tree, ConversionOptions::default(), PageOptions::default())
        .map_err(|e| Error::RenderError(format!("Failed to convert to PDF: {e:?}")))?;
    std::fs::write(output, pdf)?;
    Ok(())
}
