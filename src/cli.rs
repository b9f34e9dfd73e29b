use std::path::PathBuf;

use clap::{ArgGroup, ArgMatches, Command, arg, command, value_parser};

fn with_input(cmd: Command) -> Command {
    cmd.arg(arg!(-i --input <INPUT> "Raw input (inline)"))
        .arg(arg!(-f --file <INPUT> "Source file to process").value_parser(value_parser!(PathBuf)))
        .group(
            ArgGroup::new("input-source")
                .args(["input", "file"])
                .required(true)
                .multiple(false),
        )
        .arg(arg!(-x --ext <EXT> "Dialect of inline input").default_value("hse"))
        .arg(arg!(--aggressive "Fold duplicate transitions and drop unreachable nodes"))
}

fn with_elaboration(cmd: Command) -> Command {
    cmd.arg(
        arg!(--"max-states" <N> "Stop elaborating after N markings (0 = unlimited)")
            .value_parser(value_parser!(usize))
            .default_value("0"),
    )
    .arg(arg!(--"no-ghosts" "Do not record the branches taken at choices"))
    .arg(arg!(--progress "Report progress while searching"))
}

fn with_encoding(cmd: Command) -> Command {
    cmd.arg(
        arg!(--"max-iterations" <N> "Give up after N inserted state variables")
            .value_parser(value_parser!(usize))
            .default_value("10"),
    )
    .arg(arg!(--"non-inverting" "Also resolve conflicts of either polarity"))
    .arg(arg!(--debug "Log every candidate considered"))
}

pub(crate) fn cli() -> ArgMatches {
    command!()
        .arg(arg!(-v --verbose ... "More output per occurrence").global(true))
        .subcommand_required(true)
        .subcommand(with_elaboration(with_input(
            command!("elaborate").about("Elaborate the state space and print the annotated graph"),
        )))
        .subcommand(
            with_elaboration(with_input(
                command!("conflicts").about("List the state conflicts of a design"),
            ))
            .arg(arg!(--unsigned "Include conflicts of either polarity")),
        )
        .subcommand(with_encoding(with_elaboration(with_input(
            command!("encode").about("Insert state variables until no conflict is left"),
        ))))
        .subcommand(
            with_encoding(with_elaboration(with_input(
                command!("build").about("Run the synthesis flow up to a stage"),
            )))
            .arg(arg!(-s --stop <STAGE> "Last stage to run").default_value("rules"))
            .arg(
                arg!(-p --persist <STAGE> "Keep the artifact of an intermediate stage")
                    .num_args(1..)
                    .action(clap::ArgAction::Append),
            )
            .arg(
                arg!(-o --output <DIR> "Directory to write artifacts into")
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
        .subcommand(
            command!("render")
                .about("Render the elaborated graph to specified format")
                .subcommand_required(true)
                .subcommand(with_elaboration(with_input(
                    command!("pdf").about("Render to PDF file").arg(
                        arg!(-o --output <OUTPUT> "Output to PDF File")
                            .value_parser(value_parser!(PathBuf))
                            .default_value("render/output"),
                    ),
                ))),
        )
        .get_matches()
}
