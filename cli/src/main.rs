mod console;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pagesh_core::SessionContext;
use pagesh_core::run_shell_session;

use crate::console::ConsoleSurface;

/// Runs a shell command and serves its output as paged, navigable text.
#[derive(Debug, Parser)]
#[command(name = "pagesh", version, about)]
struct PageshCli {
    /// Shell used to interpret the command line (`shell -c command`).
    /// Defaults to $SHELL, then /bin/bash.
    #[arg(long, value_name = "PATH")]
    shell: Option<String>,

    /// Cancel the command after this many seconds without output.
    #[arg(long = "idle-timeout", value_name = "SECONDS", default_value_t = 120)]
    idle_timeout: u64,

    /// Stop serving navigation after this many seconds without viewer
    /// activity or new output.
    #[arg(long = "timeout", value_name = "SECONDS", default_value_t = 7200)]
    interaction_timeout: u64,

    /// Drop the paged output on timeout instead of leaving it on screen.
    #[arg(long)]
    delete_on_close: bool,

    /// Fail on delimiterless lines longer than a page instead of splitting
    /// them at the page boundary.
    #[arg(long)]
    no_force_wrap: bool,

    /// Command line to run.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup_tracing();
    let cli = PageshCli::parse();

    let surface = Arc::new(ConsoleSurface::new());
    surface.spawn_input_reader();

    let mut ctx = SessionContext::new(Arc::clone(&surface));
    if let Some(shell) = cli.shell {
        ctx.shell = shell;
    }
    ctx.owner = Some(ConsoleSurface::operator());
    ctx.idle_timeout = Duration::from_secs(cli.idle_timeout);
    ctx.interaction_timeout = Duration::from_secs(cli.interaction_timeout);
    ctx.delete_on_close = cli.delete_on_close;
    ctx.force_wrap = !cli.no_force_wrap;

    let command = cli.command.join(" ");
    let mut outcome = run_shell_session(&ctx, &command).await?;
    tracing::debug!(summary = %outcome.summary, "session finished");

    if outcome.interface.page_count().await > 1 && !outcome.interface.is_closed() {
        // Keep paging until the viewer quits, Ctrl-C, or the timeout.
        tokio::select! {
            _ = outcome.interface.join() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    outcome.interface.close().await;

    eprintln!("{}", outcome.summary);
    Ok(ExitCode::from(process_exit_code(outcome.exit_code)))
}

/// Maps the subprocess exit code onto the process exit range. Codes the
/// range cannot represent (unknown termination, overflow) report failure.
fn process_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
