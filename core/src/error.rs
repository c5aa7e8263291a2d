use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = PagerErr> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PagerErr {
    #[error("failed to spawn `{command}`: {error}")]
    Spawn {
        command: String,
        #[source]
        error: io::Error,
    },

    /// No output line arrived within the idle window; the stream is
    /// considered stalled and the consumer sequence ends.
    #[error("no output for {0:?}")]
    IdleTimeout(Duration),

    #[error(
        "line of length {length} had a run of {run} characters (max is {capacity}) that could not be wrapped"
    )]
    UnwrappableLine {
        length: usize,
        run: usize,
        capacity: usize,
    },

    #[error("paginator page size {page_size} exceeds the surface limit of {max_page_size}")]
    PageTooLarge {
        page_size: usize,
        max_page_size: usize,
    },

    #[error("failed to create the paginated message: {0}")]
    SendFailed(crate::surface::SurfaceError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
