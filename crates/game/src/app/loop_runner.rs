use std::io::{self, Write};
use std::process::ExitCode;

use tracing::{error, info};
use worldplay::{CommandSource, LineCommandSource};

use super::bootstrap::AppWiring;

const PROMPT: &str = "actions (w/a/s/d, blank = stay)> ";

/// Prints a prompt on stdout before every line read from `inner`.
struct PromptedSource<S> {
    inner: S,
}

impl<S: CommandSource> CommandSource for PromptedSource<S> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(PROMPT.as_bytes())?;
        stdout.flush()?;
        drop(stdout);
        self.inner.next_line()
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let stdin = io::stdin();
    let mut source = PromptedSource {
        inner: LineCommandSource::new(stdin.lock()),
    };
    run_with_source(app, &mut source)
}

fn run_with_source<S: CommandSource>(app: AppWiring, source: &mut S) -> ExitCode {
    let mut session = app.started.session;
    match session.run(source) {
        Ok(end) => {
            info!(rounds = session.round(), end = ?end, "session_finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(round = session.round(), state = ?session.state(), error = %err, "session_failed");
            ExitCode::FAILURE
        }
    }
}
