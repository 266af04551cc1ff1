//!
//! fleetwatch binary
//! -----------------
//! Interactive shell for the fleet tracker. Runs against the hosted backend when
//! a backend URL and anon key are configured, otherwise against an in-memory
//! backend seeded with a default administrator.

use std::env;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;

use fleetwatch::cli::{shell_from_config, ShellOutput};
use fleetwatch::config::{has_flag, Config};

fn print_usage() {
    println!(
        "fleetwatch\n\nUSAGE:\n  fleetwatch [--config PATH] [--backend-url URL --anon-key KEY] [--memory] [--page-size N]\n             [--settle-timeout-ms N] [--log FILTER] [--no-seed-admin]\n\nOPTIONS:\n  --config PATH           JSON settings file (env: FLEETWATCH_CONFIG)\n  --backend-url URL       hosted backend base URL (env: FLEETWATCH_BACKEND_URL)\n  --anon-key KEY          hosted backend anon key (env: FLEETWATCH_ANON_KEY)\n  --memory                use the in-memory backend even if a URL is configured\n  --page-size N           activity feed page size (env: FLEETWATCH_PAGE_SIZE, default 10)\n  --settle-timeout-ms N   wait for sign-in to resolve (env: FLEETWATCH_SETTLE_TIMEOUT_MS, default 5000)\n  --log FILTER            log filter when RUST_LOG is unset (env: FLEETWATCH_LOG, default info)\n  --no-seed-admin         do not seed admin@fleetwatch.local (env: FLEETWATCH_SEED_ADMIN)\n"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_usage();
        return Ok(());
    }

    let cfg = Config::load(&args)?;
    fleetwatch::logging::init(&cfg.log_filter);
    info!(
        target: "fleetwatch::startup",
        backend = ?cfg.backend_mode(), page_size = cfg.page_size, settle_timeout_ms = cfg.settle_timeout_ms,
        "fleetwatch starting"
    );

    let shell = shell_from_config(&cfg).await?;
    println!("fleetwatch shell. Type 'help' for commands.");

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("fleetwatch> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                match shell.execute_line(&line).await {
                    ShellOutput::Exit => break,
                    ShellOutput::Text(text) if text.is_empty() => {}
                    ShellOutput::Text(text) => println!("{}", text),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    info!(target: "fleetwatch::startup", "fleetwatch stopped");
    Ok(())
}
