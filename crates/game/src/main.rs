use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

mod app {
    pub(crate) mod bootstrap;
    pub(crate) mod loop_runner;
    pub(crate) mod preview_model;
}

fn main() -> ExitCode {
    let config_override = match parse_args(env::args().skip(1)) {
        Ok(CliAction::Run { config }) => config,
        Ok(CliAction::Help) => {
            println!("{}", usage_text());
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("{message}\n\n{}", usage_text());
            return ExitCode::from(2);
        }
    };

    match app::bootstrap::build_app(config_override) {
        Ok(wiring) => app::loop_runner::run(wiring),
        Err(err) => {
            tracing::error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CliAction {
    Run { config: Option<PathBuf> },
    Help,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliAction, String> {
    let mut config = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config = Some(PathBuf::from(value));
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(CliAction::Run { config })
}

fn usage_text() -> String {
    [
        "worldplay_game - interactive action-conditioned video session",
        "",
        "Usage:",
        "  worldplay_game [--config <path>]",
        "",
        "Config lookup: --config, then $WORLDPLAY_CONFIG, then ./worldplay.json (optional).",
        "Each input line is one round; end input (Ctrl-D) to stop.",
    ]
    .join("\n")
}
