use async_trait::async_trait;
use thiserror::Error;

/// Identity of a message on the chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

/// Identity of a user on the chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionAction {
    Added,
    Removed,
}

/// A raw reaction notification as delivered by the surface, before the
/// interface applies its owner/emoji filters.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub message_id: MessageId,
    pub user: UserId,
    pub emoji: char,
    pub action: ReactionAction,
}

#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    /// The target message no longer exists. Recoverable: loops terminate
    /// silently instead of retrying.
    #[error("message not found")]
    NotFound,

    /// The surface rejected the mutation. Swallowed during cleanup.
    #[error("missing permission")]
    Forbidden,

    #[error("surface transport failure: {0}")]
    Transport(String),
}

/// The messaging boundary the presentation layer talks to.
///
/// Implementations wrap a chat platform client (or, for the CLI, a
/// terminal). All mutations are fallible I/O; `next_reaction` must be
/// cancel-safe because the navigation loop races it against other wakeups.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn create_message(&self, content: &str) -> Result<MessageId, SurfaceError>;

    /// Full replacement of the message content.
    async fn edit_message(&self, message: MessageId, content: &str) -> Result<(), SurfaceError>;

    async fn delete_message(&self, message: MessageId) -> Result<(), SurfaceError>;

    async fn add_reaction(&self, message: MessageId, emoji: char) -> Result<(), SurfaceError>;

    /// Removes a reaction previously added by the surface's own user.
    async fn remove_own_reaction(
        &self,
        message: MessageId,
        emoji: char,
    ) -> Result<(), SurfaceError>;

    /// Next reaction add/remove event, or `None` once the surface has shut
    /// down and no further events can arrive.
    async fn next_reaction(&self) -> Option<ReactionEvent>;

    /// The surface's own identity, ignored by reaction filters so the
    /// interface never reacts to the reactions it attached itself.
    fn self_user(&self) -> UserId;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Surface whose mutations all succeed and which never delivers a
    /// reaction event.
    pub(crate) struct NullSurface;

    #[async_trait]
    impl ChatSurface for NullSurface {
        async fn create_message(&self, _content: &str) -> Result<MessageId, SurfaceError> {
            Ok(MessageId(1))
        }

        async fn edit_message(
            &self,
            _message: MessageId,
            _content: &str,
        ) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn delete_message(&self, _message: MessageId) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn add_reaction(&self, _message: MessageId, _emoji: char) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn remove_own_reaction(
            &self,
            _message: MessageId,
            _emoji: char,
        ) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn next_reaction(&self) -> Option<ReactionEvent> {
            std::future::pending().await
        }

        fn self_user(&self) -> UserId {
            UserId(0)
        }
    }
}
