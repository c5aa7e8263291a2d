use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;

use crate::error::PagerErr;
use crate::error::Result;
use crate::paginator::MAX_MESSAGE_SIZE;
use crate::paginator::WrappedPaginator;
use crate::surface::ChatSurface;
use crate::surface::MessageId;
use crate::surface::ReactionEvent;
use crate::surface::SurfaceError;
use crate::surface::UserId;

pub const DEFAULT_INTERACTION_TIMEOUT: Duration = Duration::from_secs(7200);

/// Rapid appends within this window coalesce into one redraw.
const CHANGE_DEBOUNCE: Duration = Duration::from_secs(1);

/// A classified viewer action on the navigation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    Start,
    Back,
    Forward,
    End,
    Close,
}

impl NavigationEvent {
    /// Attachment order of the navigation reactions.
    pub const ALL: [NavigationEvent; 5] = [
        NavigationEvent::Start,
        NavigationEvent::Back,
        NavigationEvent::Forward,
        NavigationEvent::End,
        NavigationEvent::Close,
    ];

    pub fn emoji(self) -> char {
        match self {
            NavigationEvent::Start => '⏮',
            NavigationEvent::Back => '◀',
            NavigationEvent::Forward => '▶',
            NavigationEvent::End => '⏭',
            NavigationEvent::Close => '⏹',
        }
    }

    pub fn from_emoji(emoji: char) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.emoji() == emoji)
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    /// When set, only this identity's reactions are processed.
    pub owner: Option<UserId>,
    /// Interaction timeout; resets on every processed navigation event or
    /// content change.
    pub timeout: Duration,
    /// Delete the message on timeout/cancel instead of stripping the
    /// navigation reactions.
    pub delete_on_close: bool,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            owner: None,
            timeout: DEFAULT_INTERACTION_TIMEOUT,
            delete_on_close: false,
        }
    }
}

/// State shared between the interface handle and its navigation loop.
struct Shared {
    display_page: AtomicUsize,
    changed: Notify,
    closed: AtomicBool,
    cleanup_done: AtomicBool,
    cancel: CancellationToken,
}

/// A message-and-reaction interface over a [`WrappedPaginator`].
///
/// Owns the one live message and the single navigation loop mutating it;
/// all edits happen inside the loop, one at a time, so message mutations
/// never race.
pub struct PaginatorInterface<S: ChatSurface> {
    surface: Arc<S>,
    paginator: Arc<Mutex<WrappedPaginator>>,
    shared: Arc<Shared>,
    config: InterfaceConfig,
    message: Option<MessageId>,
    task: Option<JoinHandle<()>>,
}

impl<S: ChatSurface + 'static> PaginatorInterface<S> {
    pub fn new(
        surface: Arc<S>,
        paginator: WrappedPaginator,
        config: InterfaceConfig,
    ) -> Result<Self> {
        let count = paginator.page_count();
        let page_size = paginator.max_size() + format!("\nPage {count}/{count}").len();
        if page_size > MAX_MESSAGE_SIZE {
            return Err(PagerErr::PageTooLarge {
                page_size,
                max_page_size: MAX_MESSAGE_SIZE,
            });
        }

        Ok(Self {
            surface,
            paginator: Arc::new(Mutex::new(paginator)),
            shared: Arc::new(Shared {
                display_page: AtomicUsize::new(0),
                changed: Notify::new(),
                closed: AtomicBool::new(false),
                cleanup_done: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            config,
            message: None,
            task: None,
        })
    }

    /// Creates the live message and starts the navigation loop. Navigation
    /// reactions are attached (in order, asynchronously) only once more
    /// than one page exists.
    pub async fn send_to(&mut self) -> Result<MessageId> {
        let content = {
            let paginator = self.paginator.lock().await;
            render_content(&paginator, &self.shared)
        };
        let message = self
            .surface
            .create_message(&content)
            .await
            .map_err(PagerErr::SendFailed)?;
        self.message = Some(message);

        // Only one loop may ever run against the message.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let wait_loop = WaitLoop {
            surface: Arc::clone(&self.surface),
            paginator: Arc::clone(&self.paginator),
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            message,
            last_sent: content,
            sent_reactions: false,
        };
        self.task = Some(tokio::spawn(wait_loop.run()));
        Ok(message)
    }

    /// Appends a line to the paginator and signals the loop. A viewer
    /// sitting on the last page keeps following the tail.
    pub async fn add_line(&self, line: &str) -> Result<bool> {
        let changed = {
            let mut paginator = self.paginator.lock().await;
            let before = paginator.page_count();
            let cursor = self.shared.display_page.load(Ordering::SeqCst);
            let changed = paginator.append(line)?;
            let after = paginator.page_count();
            if cursor + 1 >= before {
                self.shared.display_page.store(after - 1, Ordering::SeqCst);
            }
            changed
        };
        self.shared.changed.notify_one();
        Ok(changed)
    }

    pub async fn page_count(&self) -> usize {
        self.paginator.lock().await.page_count()
    }

    pub fn display_page(&self) -> usize {
        self.shared.display_page.load(Ordering::SeqCst)
    }

    /// Whether the navigation loop has exited (close, timeout, vanish or
    /// cancellation) and cleanup has run.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Cancels the navigation loop and waits for its cleanup to finish.
    pub async fn close(&mut self) {
        self.shared.cancel.cancel();
        self.join().await;
    }

    /// Waits until the navigation loop has fully exited on its own.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<S: ChatSurface> Drop for PaginatorInterface<S> {
    fn drop(&mut self) {
        // A dropped handle must not leave the loop serving the message
        // until the interaction timeout; cleanup still runs in the task.
        self.shared.cancel.cancel();
    }
}

/// Clamps the cursor into the valid page range and renders the active page
/// plus the page-count footer.
fn render_content(paginator: &WrappedPaginator, shared: &Shared) -> String {
    let pages = paginator.pages();
    let count = pages.len();
    let cursor = shared.display_page.load(Ordering::SeqCst).min(count - 1);
    shared.display_page.store(cursor, Ordering::SeqCst);
    format!("{}\nPage {}/{count}", pages[cursor], cursor + 1)
}

enum LoopExit {
    /// Viewer hit the close reaction.
    Closed,
    /// No activity within the interaction timeout.
    TimedOut,
    /// Owner-initiated cancellation.
    Cancelled,
    /// The message was deleted externally.
    Vanished,
    /// The surface shut down; no further events can arrive.
    SurfaceGone,
}

enum Wake {
    Reaction(ReactionEvent),
    Changed,
}

struct WaitLoop<S: ChatSurface> {
    surface: Arc<S>,
    paginator: Arc<Mutex<WrappedPaginator>>,
    shared: Arc<Shared>,
    config: InterfaceConfig,
    message: MessageId,
    last_sent: String,
    sent_reactions: bool,
}

impl<S: ChatSurface + 'static> WaitLoop<S> {
    async fn run(mut self) {
        self.maybe_send_reactions().await;
        let exit = self.drive().await;
        self.cleanup(exit).await;
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    async fn drive(&mut self) -> LoopExit {
        let mut deadline = Instant::now() + self.config.timeout;
        let mut content_changed = Box::pin(debounced_change(Arc::clone(&self.shared)));

        loop {
            let woke = tokio::select! {
                // Viewer input and fresh content win over the timeout when
                // both complete in the same round.
                biased;
                _ = self.shared.cancel.cancelled() => return LoopExit::Cancelled,
                maybe = self.surface.next_reaction() => {
                    match maybe {
                        Some(event) => Wake::Reaction(event),
                        None => return LoopExit::SurfaceGone,
                    }
                }
                _ = &mut content_changed => {
                    content_changed = Box::pin(debounced_change(Arc::clone(&self.shared)));
                    Wake::Changed
                }
                _ = sleep_until(deadline) => return LoopExit::TimedOut,
            };

            match woke {
                Wake::Reaction(event) => {
                    if !self.relevant(&event) {
                        continue;
                    }
                    let Some(nav) = NavigationEvent::from_emoji(event.emoji) else {
                        continue;
                    };
                    let target = {
                        let count = self.paginator.lock().await.page_count();
                        let cursor = self.shared.display_page.load(Ordering::SeqCst).min(count - 1);
                        match nav {
                            NavigationEvent::Close => return LoopExit::Closed,
                            NavigationEvent::Start => 0,
                            NavigationEvent::End => count - 1,
                            NavigationEvent::Back => cursor.saturating_sub(1),
                            NavigationEvent::Forward => (cursor + 1).min(count - 1),
                        }
                    };
                    self.shared.display_page.store(target, Ordering::SeqCst);
                    deadline = Instant::now() + self.config.timeout;
                }
                Wake::Changed => {
                    deadline = Instant::now() + self.config.timeout;
                }
            }

            self.maybe_send_reactions().await;

            match self.refresh().await {
                Ok(()) => {}
                Err(SurfaceError::NotFound) => return LoopExit::Vanished,
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        message = self.message.0,
                        "failed to refresh paginated message; continuing"
                    );
                }
            }
        }
    }

    /// Owner filter plus self-filter: a configured owner's reactions only,
    /// never the surface's own.
    fn relevant(&self, event: &ReactionEvent) -> bool {
        if event.message_id != self.message {
            return false;
        }
        if event.user == self.surface.self_user() {
            return false;
        }
        match self.config.owner {
            Some(owner) => event.user == owner,
            None => true,
        }
    }

    /// Edits the message, but only when the rendered content actually
    /// differs from what was last sent.
    async fn refresh(&mut self) -> std::result::Result<(), SurfaceError> {
        let content = {
            let paginator = self.paginator.lock().await;
            render_content(&paginator, &self.shared)
        };
        if content == self.last_sent {
            return Ok(());
        }
        self.surface.edit_message(self.message, &content).await?;
        self.last_sent = content;
        Ok(())
    }

    /// Attaches the five navigation reactions once, in order, off the loop
    /// so a slow surface cannot stall navigation.
    async fn maybe_send_reactions(&mut self) {
        if self.sent_reactions {
            return;
        }
        if self.paginator.lock().await.page_count() <= 1 {
            return;
        }
        self.sent_reactions = true;

        let surface = Arc::clone(&self.surface);
        let message = self.message;
        tokio::spawn(async move {
            for nav in NavigationEvent::ALL {
                match surface.add_reaction(message, nav.emoji()).await {
                    Ok(()) => {}
                    // The message is already gone; the loop notices on its
                    // next edit.
                    Err(SurfaceError::NotFound) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to attach navigation reaction");
                    }
                }
            }
        });
    }

    /// Runs the close policy exactly once, whichever trigger fired first.
    async fn cleanup(&self, exit: LoopExit) {
        if self.shared.cleanup_done.swap(true, Ordering::SeqCst) {
            return;
        }
        match exit {
            LoopExit::Closed => self.delete_message().await,
            LoopExit::TimedOut | LoopExit::Cancelled => {
                if self.config.delete_on_close {
                    self.delete_message().await;
                } else {
                    self.strip_reactions().await;
                }
            }
            LoopExit::Vanished | LoopExit::SurfaceGone => {}
        }
    }

    async fn delete_message(&self) {
        if let Err(err) = self.surface.delete_message(self.message).await {
            tracing::debug!(error = %err, "failed to delete paginated message on close");
        }
    }

    async fn strip_reactions(&self) {
        for nav in NavigationEvent::ALL {
            match self
                .surface
                .remove_own_reaction(self.message, nav.emoji())
                .await
            {
                Ok(()) => {}
                Err(SurfaceError::NotFound | SurfaceError::Forbidden) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "failed to strip navigation reaction");
                }
            }
        }
    }
}

async fn debounced_change(shared: Arc<Shared>) {
    shared.changed.notified().await;
    tokio::time::sleep(CHANGE_DEBOUNCE).await;
}
