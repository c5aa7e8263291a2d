//! Live-paginated shell sessions for a chat surface.
//!
//! A session runs one subprocess, multiplexes its stdout/stderr into a
//! bounded line queue, folds those lines into size-capped pages, and drives
//! a single reaction-navigable message that follows the output live. The
//! chat platform itself stays behind the [`ChatSurface`] trait.

mod error;
mod interface;
mod paginator;
mod session;
mod shell;
mod surface;

pub use error::PagerErr;
pub use error::Result;
pub use interface::DEFAULT_INTERACTION_TIMEOUT;
pub use interface::InterfaceConfig;
pub use interface::NavigationEvent;
pub use interface::PaginatorInterface;
pub use paginator::MAX_MESSAGE_SIZE;
pub use paginator::WrappedPaginator;
pub use session::DEFAULT_PAGE_SIZE;
pub use session::SessionContext;
pub use session::SessionOutcome;
pub use session::SessionStatus;
pub use session::run_shell_session;
pub use shell::DEFAULT_IDLE_TIMEOUT;
pub use shell::ShellStream;
pub use surface::ChatSurface;
pub use surface::MessageId;
pub use surface::ReactionAction;
pub use surface::ReactionEvent;
pub use surface::SurfaceError;
pub use surface::UserId;
