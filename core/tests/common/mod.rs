#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_channel::Receiver;
use async_channel::Sender;
use async_trait::async_trait;
use pagesh_core::ChatSurface;
use pagesh_core::MessageId;
use pagesh_core::ReactionAction;
use pagesh_core::ReactionEvent;
use pagesh_core::SurfaceError;
use pagesh_core::UserId;

pub const BOT: UserId = UserId(0);
pub const OWNER: UserId = UserId(1);
pub const STRANGER: UserId = UserId(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOp {
    Create(MessageId),
    Edit(MessageId, String),
    Delete(MessageId),
    AddReaction(MessageId, char),
    RemoveOwnReaction(MessageId, char),
}

/// In-memory surface double: messages live in a map, every mutation is
/// recorded, and tests inject reaction events through a channel.
pub struct TestSurface {
    next_id: AtomicU64,
    messages: Mutex<HashMap<MessageId, String>>,
    ops: Mutex<Vec<SurfaceOp>>,
    events_tx: Sender<ReactionEvent>,
    events_rx: Receiver<ReactionEvent>,
}

impl TestSurface {
    pub fn new() -> Self {
        let (events_tx, events_rx) = async_channel::unbounded();
        Self {
            next_id: AtomicU64::new(1),
            messages: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            events_tx,
            events_rx,
        }
    }

    pub async fn react(&self, message: MessageId, user: UserId, emoji: char) {
        self.events_tx
            .send(ReactionEvent {
                message_id: message,
                user,
                emoji,
                action: ReactionAction::Added,
            })
            .await
            .expect("event channel open");
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.lock().expect("ops lock").clone()
    }

    pub fn edit_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Edit(..)))
            .count()
    }

    pub fn content(&self, message: MessageId) -> Option<String> {
        self.messages.lock().expect("messages lock").get(&message).cloned()
    }

    pub fn first_message(&self) -> Option<MessageId> {
        self.ops().iter().find_map(|op| match op {
            SurfaceOp::Create(id) => Some(*id),
            _ => None,
        })
    }

    /// Deletes the message behind the interface's back, as an external
    /// moderator would.
    pub fn vanish(&self, message: MessageId) {
        self.messages.lock().expect("messages lock").remove(&message);
    }

    /// Simulates the surface shutting down: no further events will arrive.
    pub fn disconnect(&self) {
        self.events_rx.close();
    }

    fn record(&self, op: SurfaceOp) {
        self.ops.lock().expect("ops lock").push(op);
    }

    fn exists(&self, message: MessageId) -> bool {
        self.messages.lock().expect("messages lock").contains_key(&message)
    }
}

#[async_trait]
impl ChatSurface for TestSurface {
    async fn create_message(&self, content: &str) -> Result<MessageId, SurfaceError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.messages
            .lock()
            .expect("messages lock")
            .insert(id, content.to_string());
        self.record(SurfaceOp::Create(id));
        Ok(id)
    }

    async fn edit_message(&self, message: MessageId, content: &str) -> Result<(), SurfaceError> {
        let mut messages = self.messages.lock().expect("messages lock");
        let Some(slot) = messages.get_mut(&message) else {
            return Err(SurfaceError::NotFound);
        };
        *slot = content.to_string();
        drop(messages);
        self.record(SurfaceOp::Edit(message, content.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: MessageId) -> Result<(), SurfaceError> {
        if self
            .messages
            .lock()
            .expect("messages lock")
            .remove(&message)
            .is_none()
        {
            return Err(SurfaceError::NotFound);
        }
        self.record(SurfaceOp::Delete(message));
        Ok(())
    }

    async fn add_reaction(&self, message: MessageId, emoji: char) -> Result<(), SurfaceError> {
        if !self.exists(message) {
            return Err(SurfaceError::NotFound);
        }
        self.record(SurfaceOp::AddReaction(message, emoji));
        Ok(())
    }

    async fn remove_own_reaction(
        &self,
        message: MessageId,
        emoji: char,
    ) -> Result<(), SurfaceError> {
        if !self.exists(message) {
            return Err(SurfaceError::NotFound);
        }
        self.record(SurfaceOp::RemoveOwnReaction(message, emoji));
        Ok(())
    }

    async fn next_reaction(&self) -> Option<ReactionEvent> {
        self.events_rx.recv().await.ok()
    }

    fn self_user(&self) -> UserId {
        BOT
    }
}
