mod analytics;
mod backup;
mod calc;
mod config;
mod db;
mod grouping;
mod ipc;
mod model;
mod presets;
mod roster;
mod store;
mod writer;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Upper bound on how long an idle loop waits before re-checking the write queue.
const IDLE_TICK: Duration = Duration::from_millis(250);

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn write_line(stdout: &mut io::Stdout, resp: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

fn flush_idle(state: &mut ipc::AppState) {
    if state.writes.is_due(Instant::now()) {
        let outcome = ipc::flush_writes(state);
        if outcome.is_ok() {
            tracing::info!(written = outcome.written, "idle flush");
        }
    }
}

fn main() {
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("gradebookd: invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };
    init_tracing(&cfg.log_filter);

    let mut state = ipc::AppState::new(cfg.write_policy);
    if let Some(path) = cfg.workspace.as_ref() {
        match db::open_db(path) {
            Ok(conn) => {
                state.workspace = Some(path.clone());
                state.db = Some(conn);
                tracing::info!(workspace = %path.to_string_lossy(), "workspace opened from environment");
            }
            Err(e) => tracing::error!(error = %format!("{e:#}"), "failed to open configured workspace"),
        }
    }

    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let tick = cfg.write_policy.flush_delay.min(IDLE_TICK).max(Duration::from_millis(10));
    let mut stdout = io::stdout();
    loop {
        let line = match rx.recv_timeout(tick) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                flush_idle(&mut state);
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                write_line(&mut stdout, &ipc::bad_json(e.to_string()));
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }

    let outcome = ipc::flush_writes(&mut state);
    match outcome.error {
        None => tracing::info!(written = outcome.written, "shutdown flush complete"),
        Some(e) => tracing::error!(
            pending = state.writes.pending_len(),
            error = %e,
            "shutdown flush failed"
        ),
    }
}
