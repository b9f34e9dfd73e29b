pub mod boolean;
pub mod design;
pub mod dialect;
pub mod elaborate;
pub mod encoder;
mod error;
pub mod graph;
pub mod pipeline;
pub mod render;
pub mod synthesize;
mod validate;
pub mod variable;

use std::path::Path;

pub use design::{Design, Elaborated, Encoded, Normalized, Raw};
pub use dialect::{Dialect, Registry};
pub use elaborate::{ElaborateConfig, Elaboration, elaborate};
pub use encoder::{Conflict, EncodeConfig, Encoder, Sense, find_conflicts};
pub use error::{Error, ValidationError, ValidationErrorKind};
pub use graph::{Composition, Graph, NodeRef, Place, State, Transition};
pub use pipeline::{Artifact, Decision, Outcome, Pipeline, Stage};
pub use synthesize::{ProductionRule, RuleSet, synthesize};
pub use validate::ValidationResult;
pub use variable::{VarId, Variable, VariableKind, VariableSet};

/// Imports `input` with the dialect registered for `ext`.
pub fn import(registry: &Registry, input: &str, ext: &str) -> Result<Design<Raw>, Error> {
    registry.import(ext, input)
}

/// Imports, normalizes and elaborates `input`.
pub fn elaborate_source(
    registry: &Registry,
    input: &str,
    ext: &str,
    aggressive: bool,
    config: &ElaborateConfig,
) -> Result<(Design<Elaborated>, Elaboration), Error> {
    let design = import(registry, input, ext)?;
    design.validate(aggressive)?.elaborate(config)
}

pub fn render_to_pdf(svg: &str, path: &Path) -> Result<(), Error> {
    render::render_svg_to_pdf(svg, path)
}

/// Draws the elaborated graph of `input` into a PDF next to `output_path`.
pub fn process_to_pdf(
    registry: &Registry,
    input: &str,
    output_path: &Path,
    ext: &str,
    config: &ElaborateConfig,
) -> Result<(), Error> {
    let (design, _) = elaborate_source(registry, input, ext, false, config)?;
    let flow = render::to_flow(design.graph(), design.variables());
    let svg = render::render_to_svg(&flow)?;
    render_to_pdf(&svg, output_path)
}
