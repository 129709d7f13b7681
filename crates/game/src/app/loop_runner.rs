use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use tracing::{error, info};

use super::bootstrap::INITIAL_SCREEN;
use super::runtime::GameApp;

const PROMPT: &str = "> ";

/// Drives the app from stdin until `quit` or end of input, then persists.
pub(crate) fn run(app: Result<GameApp, String>) -> ExitCode {
    let mut app = match app {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print_lines(&mut stdout, &app.boot(INITIAL_SCREEN));

    let mut last_input = Instant::now();
    let mut lines = stdin.lock().lines();
    while !app.should_quit() {
        let _ = write!(stdout, "{PROMPT}");
        let _ = stdout.flush();
        let Some(line) = lines.next() else {
            break;
        };
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "stdin_read_failed");
                break;
            }
        };

        let now = Instant::now();
        print_lines(&mut stdout, &handle_input(&mut app, &line, now - last_input));
        last_input = now;
    }

    if let Err(err) = app.persist() {
        error!(error = %err, "shutdown_persist_failed");
        return ExitCode::FAILURE;
    }
    info!("shutdown_complete");
    ExitCode::SUCCESS
}

/// Runs `line`, then advances timers by the time spent waiting for it.
///
/// Input typed while a timer was pending wins over that timer.
pub(crate) fn handle_input(app: &mut GameApp, line: &str, waited: Duration) -> Vec<String> {
    let mut output = app.execute_line(line);
    output.extend(app.tick(waited));
    output
}

fn print_lines(out: &mut impl Write, lines: &[String]) {
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
}
