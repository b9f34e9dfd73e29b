mod cli;

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::ArgMatches;
use log::info;

use hse_synth::{
    Artifact, Design, ElaborateConfig, Elaboration, EncodeConfig, Encoder, Error, Pipeline, Raw,
    Registry, Stage, VariableSet,
};

fn main() -> ExitCode {
    let matches = cli::cli();

    let log_level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match run(&matches) {
        Ok(code) => code,
        Err(Error::InvalidGraph(errors)) => {
            eprintln!("❌ Validation errors found:\n");
            for error in errors {
                eprintln!("  • {error}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(matches: &ArgMatches) -> Result<ExitCode, Error> {
    let registry = Registry::with_defaults();

    match matches.subcommand() {
        Some(("elaborate", sub)) => {
            let (design, elaboration) = elaborate(&registry, sub)?;
            print!("{design}");
            summarize(&elaboration);
            Ok(ExitCode::SUCCESS)
        }
        Some(("conflicts", sub)) => {
            let (design, elaboration) = elaborate(&registry, sub)?;
            let mut encoder = Encoder::new(design, elaboration, elaborate_config(sub));
            encoder.check(sub.get_flag("unsigned"), sub.get_flag("progress"));
            let conflicts = encoder.conflicts();
            for conflict in conflicts {
                println!("{}", conflict.display(encoder.variables()));
            }
            Ok(if conflicts.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Some(("encode", sub)) => {
            let (design, elaboration) = elaborate(&registry, sub)?;
            let mut encoder = Encoder::new(design, elaboration, elaborate_config(sub));
            let converged = encoder.run(&encode_config(sub));

            for var in encoder.inserted() {
                println!("inserted {}", encoder.variables().label(*var));
            }
            for conflict in encoder.conflicts() {
                println!("{}", conflict.display(encoder.variables()));
            }
            summarize(encoder.elaboration());
            print!("{}", encoder.into_design());

            Ok(if converged {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Some(("build", sub)) => build(&registry, sub),
        Some(("render", sub)) => match sub.subcommand() {
            Some(("pdf", pdf)) => {
                let (source, ext) = source(pdf)?;
                let output = pdf
                    .get_one::<PathBuf>("output")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from("render/output"));
                hse_synth::process_to_pdf(&registry, &source, &output, &ext, &elaborate_config(pdf))?;
                println!("✅ wrote {}", output.with_extension("pdf").display());
                Ok(ExitCode::SUCCESS)
            }
            _ => Err(Error::InvalidType("render target".to_string())),
        },
        _ => Err(Error::InvalidType("command".to_string())),
    }
}

fn build(registry: &Registry, matches: &ArgMatches) -> Result<ExitCode, Error> {
    let stop = matches
        .get_one::<String>("stop")
        .map(|s| s.parse::<Stage>())
        .transpose()?
        .unwrap_or(Stage::Rules);
    let persist = matches
        .get_many::<String>("persist")
        .into_iter()
        .flatten()
        .map(|s| s.parse::<Stage>())
        .collect::<Result<BTreeSet<_>, _>>()?;

    let pipeline = Pipeline {
        stop,
        persist,
        aggressive: matches.get_flag("aggressive"),
        elaborate: elaborate_config(matches),
        encode: encode_config(matches),
    };
    let outcome = pipeline.run(import(registry, matches)?)?;
    info!("stopped after '{}'", outcome.reached);

    let output = matches.get_one::<PathBuf>("output");
    if let Some(dir) = output {
        std::fs::create_dir_all(dir)?;
    }
    for (stage, artifact) in &outcome.artifacts {
        let text = render_artifact(artifact, &outcome.variables);
        match output {
            Some(dir) => {
                let path = artifact_path(dir, *stage, artifact);
                std::fs::write(&path, text)?;
                println!("✅ {stage}: {}", path.display());
            }
            None => print!("== {stage}\n{text}"),
        }
    }

    Ok(if outcome.converged {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn artifact_path(dir: &Path, stage: Stage, artifact: &Artifact) -> PathBuf {
    let ext = match artifact {
        Artifact::Hse { .. } => "hse.txt",
        Artifact::Conflicts(_) => "conflicts.txt",
        Artifact::Rules(_) => "prs",
    };
    dir.join(format!("{stage}.{ext}"))
}

fn render_artifact(artifact: &Artifact, variables: &VariableSet) -> String {
    let mut text = String::new();
    match artifact {
        Artifact::Hse { graph, variables } => {
            let design = Design::new(graph.clone(), variables.clone());
            write!(text, "{design}").ok();
        }
        Artifact::Conflicts(conflicts) => {
            for conflict in conflicts {
                writeln!(text, "{}", conflict.display(variables)).ok();
            }
        }
        Artifact::Rules(rules) => {
            write!(text, "{}", rules.display(variables)).ok();
        }
    }
    text
}

fn summarize(elaboration: &Elaboration) {
    println!(
        "{} states, {} deadlocks, {} unsafe places, {} unstable, {} interfering{}",
        elaboration.states.len(),
        elaboration.deadlocks.len(),
        elaboration.unsafe_places.len(),
        elaboration.unstable.len(),
        elaboration.interference.len(),
        if elaboration.truncated { " (truncated)" } else { "" }
    );
}

fn elaborate(
    registry: &Registry,
    matches: &ArgMatches,
) -> Result<(Design<hse_synth::Elaborated>, Elaboration), Error> {
    import(registry, matches)?
        .validate(matches.get_flag("aggressive"))?
        .elaborate(&elaborate_config(matches))
}

fn import(registry: &Registry, matches: &ArgMatches) -> Result<Design<Raw>, Error> {
    let (source, ext) = source(matches)?;
    registry.import(&ext, &source)
}

/// Source text and the dialect extension it should be read with.
fn source(matches: &ArgMatches) -> Result<(String, String), Error> {
    let ext = matches
        .get_one::<String>("ext")
        .cloned()
        .unwrap_or_else(|| "hse".to_string());

    if let Some(input) = matches.get_one::<String>("input") {
        return Ok((input.clone(), ext));
    }

    let path = matches
        .get_one::<PathBuf>("file")
        .ok_or_else(|| Error::InvalidType("no input given".to_string()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
        .unwrap_or(ext);
    Ok((std::fs::read_to_string(path)?, ext))
}

fn elaborate_config(matches: &ArgMatches) -> ElaborateConfig {
    ElaborateConfig {
        max_states: matches.get_one::<usize>("max-states").copied().unwrap_or(0),
        no_ghosts: matches.get_flag("no-ghosts"),
        report_progress: matches.get_flag("progress"),
        ..Default::default()
    }
}

fn encode_config(matches: &ArgMatches) -> EncodeConfig {
    EncodeConfig {
        max_iterations: matches
            .get_one::<usize>("max-iterations")
            .copied()
            .unwrap_or(10),
        non_inverting: matches.get_flag("non-inverting"),
        report_progress: matches.get_flag("progress"),
        debug: matches.get_flag("debug"),
    }
}
