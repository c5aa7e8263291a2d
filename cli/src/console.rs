use std::collections::HashMap;
use std::io::BufRead;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_channel::Receiver;
use async_channel::Sender;
use async_trait::async_trait;
use pagesh_core::ChatSurface;
use pagesh_core::MessageId;
use pagesh_core::NavigationEvent;
use pagesh_core::ReactionAction;
use pagesh_core::ReactionEvent;
use pagesh_core::SurfaceError;
use pagesh_core::UserId;

const SELF_USER: UserId = UserId(0);
const OPERATOR: UserId = UserId(1);

const SEPARATOR: &str = "----------------------------------------";
const KEY_HINT: &str = "keys: [g] first  [b] back  [f] forward  [G] last  [q] quit";

/// Terminal rendition of the messaging boundary: "messages" are reprinted
/// blocks on stdout and "reactions" are single-key commands on stdin.
pub struct ConsoleSurface {
    next_id: AtomicU64,
    messages: Mutex<HashMap<MessageId, String>>,
    /// The message navigation keys currently steer.
    focus: Mutex<Option<MessageId>>,
    events_tx: Sender<ReactionEvent>,
    events_rx: Receiver<ReactionEvent>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        let (events_tx, events_rx) = async_channel::unbounded();
        Self {
            next_id: AtomicU64::new(1),
            messages: Mutex::new(HashMap::new()),
            focus: Mutex::new(None),
            events_tx,
            events_rx,
        }
    }

    pub fn operator() -> UserId {
        OPERATOR
    }

    /// Turns stdin lines into reaction events on a blocking thread. The
    /// thread ends with the event channel, at process exit.
    pub fn spawn_input_reader(self: &Arc<Self>) {
        let surface = Arc::clone(self);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let Some(key) = line.trim().chars().next() else {
                    continue;
                };
                let nav = match key {
                    'g' => NavigationEvent::Start,
                    'b' => NavigationEvent::Back,
                    'f' => NavigationEvent::Forward,
                    'G' => NavigationEvent::End,
                    'q' => NavigationEvent::Close,
                    _ => continue,
                };
                let Some(message) = *lock(&surface.focus) else {
                    continue;
                };
                let event = ReactionEvent {
                    message_id: message,
                    user: OPERATOR,
                    emoji: nav.emoji(),
                    action: ReactionAction::Added,
                };
                if surface.events_tx.send_blocking(event).is_err() {
                    break;
                }
            }
            surface.events_tx.close();
        });
    }

    fn redraw(&self, content: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{SEPARATOR}");
        let _ = writeln!(stdout, "{content}");
        let _ = writeln!(stdout, "{KEY_HINT}");
        let _ = stdout.flush();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ChatSurface for ConsoleSurface {
    async fn create_message(&self, content: &str) -> Result<MessageId, SurfaceError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.messages).insert(id, content.to_string());
        *lock(&self.focus) = Some(id);
        self.redraw(content);
        Ok(id)
    }

    async fn edit_message(&self, message: MessageId, content: &str) -> Result<(), SurfaceError> {
        let mut messages = lock(&self.messages);
        let Some(slot) = messages.get_mut(&message) else {
            return Err(SurfaceError::NotFound);
        };
        *slot = content.to_string();
        drop(messages);
        self.redraw(content);
        Ok(())
    }

    async fn delete_message(&self, message: MessageId) -> Result<(), SurfaceError> {
        if lock(&self.messages).remove(&message).is_none() {
            return Err(SurfaceError::NotFound);
        }
        let mut focus = lock(&self.focus);
        if *focus == Some(message) {
            *focus = None;
        }
        Ok(())
    }

    async fn add_reaction(&self, message: MessageId, _emoji: char) -> Result<(), SurfaceError> {
        // The printed key hint is the terminal's reaction row; there is
        // nothing to attach per emoji.
        if !lock(&self.messages).contains_key(&message) {
            return Err(SurfaceError::NotFound);
        }
        Ok(())
    }

    async fn remove_own_reaction(
        &self,
        message: MessageId,
        _emoji: char,
    ) -> Result<(), SurfaceError> {
        if !lock(&self.messages).contains_key(&message) {
            return Err(SurfaceError::NotFound);
        }
        Ok(())
    }

    async fn next_reaction(&self) -> Option<ReactionEvent> {
        self.events_rx.recv().await.ok()
    }

    fn self_user(&self) -> UserId {
        SELF_USER
    }
}
