use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PagerErr;
use crate::error::Result;
use crate::interface::DEFAULT_INTERACTION_TIMEOUT;
use crate::interface::InterfaceConfig;
use crate::interface::PaginatorInterface;
use crate::paginator::WrappedPaginator;
use crate::shell::DEFAULT_IDLE_TIMEOUT;
use crate::shell::ShellStream;
use crate::surface::ChatSurface;
use crate::surface::UserId;

/// Page capacity: the 2000-unit message cap minus a margin reserved for
/// the page footer and code-fence decoration.
pub const DEFAULT_PAGE_SIZE: usize = 1975;

const PAGE_PREFIX: &str = "```sh";
const PAGE_SUFFIX: &str = "```";
const PS1: &str = "$";

/// Everything a session needs, passed explicitly; no component looks
/// anything up ambiently.
pub struct SessionContext<S> {
    pub surface: Arc<S>,
    /// Shell used to interpret the command line (`shell -c command`).
    pub shell: String,
    pub owner: Option<UserId>,
    pub idle_timeout: Duration,
    pub interaction_timeout: Duration,
    pub delete_on_close: bool,
    /// Split delimiterless oversized lines at the capacity boundary
    /// instead of failing the append.
    pub force_wrap: bool,
}

impl<S> SessionContext<S> {
    pub fn new(surface: Arc<S>) -> Self {
        Self {
            surface,
            shell: default_shell(),
            owner: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            interaction_timeout: DEFAULT_INTERACTION_TIMEOUT,
            delete_on_close: false,
            force_wrap: true,
        }
    }
}

// Not derived: `S` itself never needs to be `Clone` behind the `Arc`.
impl<S> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            surface: Arc::clone(&self.surface),
            shell: self.shell.clone(),
            owner: self.owner,
            idle_timeout: self.idle_timeout,
            interaction_timeout: self.interaction_timeout,
            delete_on_close: self.delete_on_close,
            force_wrap: self.force_wrap,
        }
    }
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Succeeded => write!(f, "succeeded"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one shell session. A non-zero exit code is data, not an
/// error; the subprocess outcome lands in `status`/`exit_code` while the
/// interface keeps serving navigation until its own timeout.
pub struct SessionOutcome<S: ChatSurface> {
    pub status: SessionStatus,
    pub exit_code: i32,
    pub summary: String,
    pub interface: PaginatorInterface<S>,
}

/// Runs `command`, streaming its output into a live paginated message.
///
/// Wires the pipeline end to end: multiplexer lines feed the paginator,
/// paginator mutations raise the interface's live-update signal, and the
/// subprocess is torn down on every exit path (stream end, idle stall,
/// viewer close).
pub async fn run_shell_session<S: ChatSurface + 'static>(
    ctx: &SessionContext<S>,
    command: &str,
) -> Result<SessionOutcome<S>> {
    let mut reader = ShellStream::spawn(command, &ctx.shell, ctx.idle_timeout)?;

    let mut paginator =
        WrappedPaginator::new(PAGE_PREFIX, PAGE_SUFFIX, DEFAULT_PAGE_SIZE)
            .with_force_wrap(ctx.force_wrap);
    paginator.append(&format!("{PS1} {command}\n"))?;

    let mut interface = PaginatorInterface::new(
        Arc::clone(&ctx.surface),
        paginator,
        InterfaceConfig {
            owner: ctx.owner,
            timeout: ctx.interaction_timeout,
            delete_on_close: ctx.delete_on_close,
        },
    )?;
    interface.send_to().await?;

    let mut stalled = false;
    let mut viewer_closed = false;
    loop {
        if interface.is_closed() {
            viewer_closed = true;
            break;
        }
        match reader.next_line().await {
            Ok(Some(line)) => {
                if let Err(err) = interface.add_line(&line).await {
                    let _ = reader.close().await;
                    return Err(err);
                }
            }
            Ok(None) => break,
            Err(PagerErr::IdleTimeout(_)) => {
                stalled = true;
                break;
            }
            Err(err) => {
                let _ = reader.close().await;
                return Err(err);
            }
        }
    }

    let exit_code = reader.close().await?;

    let status = if viewer_closed || stalled {
        SessionStatus::Cancelled
    } else if exit_code == 0 {
        SessionStatus::Succeeded
    } else {
        SessionStatus::Failed
    };

    if !interface.is_closed() {
        let trailer = format!("\n[status] Return code {exit_code}");
        if let Err(err) = interface.add_line(&trailer).await {
            tracing::warn!(error = %err, "failed to append the final status line");
        }
    }

    let summary = if stalled {
        format!("command stalled and was cancelled (return code {exit_code})")
    } else {
        format!("command {status} with return code {exit_code}")
    };

    Ok(SessionOutcome {
        status,
        exit_code,
        summary,
        interface,
    })
}
