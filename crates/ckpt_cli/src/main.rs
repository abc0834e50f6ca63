use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use ckpt_cli::{run, CommandKind};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let command = args[0].as_str();
    let command_args = &args[1..];

    let kind = match command {
        "inspect" => match command_args {
            [path] => CommandKind::Inspect {
                path: PathBuf::from(path),
            },
            _ => return Err("inspect requires exactly one checkpoint path".to_string()),
        },
        "match" => match command_args {
            [checkpoint, names] => CommandKind::Match {
                checkpoint: PathBuf::from(checkpoint),
                names: PathBuf::from(names),
            },
            _ => {
                return Err("match requires a checkpoint path and a names file".to_string());
            }
        },
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "ckpt_cli - offline checkpoint inspection",
        "",
        "Usage:",
        "  ckpt_cli inspect <checkpoint>",
        "  ckpt_cli match <checkpoint> <names-file>",
        "",
        "names-file: one parameter name per line, '#' starts a comment.",
    ]
    .join("\n")
}
