//! Direct and broadcast messaging for the residence portal.
//!
//! - [`ConversationDirectory`] resolves a resident/staff pair to one conversation.
//! - [`MessageLog`] is the append-only, ordered record of a conversation.
//! - [`unread`] holds the unread-counter and badge rules.
//! - [`DirectMessagingService`] orchestrates sends, media sends and read-marking.
//! - [`CommunityFeed`] is the shared broadcast stream.
//!
//! Every write is published on the [`Dispatcher`]; the stream handles in
//! [`subscription`] replay a snapshot and then follow those events until dropped.

pub mod attachments;
pub mod clock;
pub mod community;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod log;
pub mod profiles;
pub mod service;
pub mod store;
pub mod subscription;
pub mod unread;

use std::sync::Arc;

use concierge_types::models::MediaKind;

pub use attachments::{AttachmentResolver, DiskAttachmentStore, MediaFile, StoredAttachment};
pub use community::CommunityFeed;
pub use directory::ConversationDirectory;
pub use dispatcher::{Dispatcher, MessagingEvent};
pub use error::MessagingError;
pub use log::MessageLog;
pub use profiles::{ProfileDirectory, SqliteProfiles};
pub use service::DirectMessagingService;
pub use store::{MessagingStore, SharedStore};
pub use subscription::{CommunityStream, InboxStream, MessageStream};

use clock::MonotonicClock;

/// Upper bound for any window or page size requested by a client.
pub const MAX_WINDOW: u32 = 200;

/// How the directory guarantees one conversation per resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryMode {
    /// Query the participant's conversations, create one if none matches.
    /// Concurrent first calls can both create.
    #[default]
    LookupThenCreate,
    /// Derive the id from the participant pair and insert only if absent.
    CanonicalPair,
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub directory_mode: DirectoryMode,
    pub max_image_bytes: usize,
    pub max_video_bytes: usize,
    pub max_content_chars: usize,
    pub community_window: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            directory_mode: DirectoryMode::LookupThenCreate,
            max_image_bytes: 10 * 1024 * 1024,
            max_video_bytes: 50 * 1024 * 1024,
            max_content_chars: 4000,
            community_window: 50,
        }
    }
}

impl MessagingConfig {
    pub fn max_bytes(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Image => self.max_image_bytes,
            MediaKind::Video => self.max_video_bytes,
        }
    }
}

/// Fully wired messaging subsystem over one store.
#[derive(Clone)]
pub struct Messaging {
    pub direct: DirectMessagingService,
    pub community: CommunityFeed,
    pub dispatcher: Dispatcher,
}

impl Messaging {
    pub fn new(
        store: SharedStore,
        attachments: Arc<dyn AttachmentResolver>,
        profiles: Arc<dyn ProfileDirectory>,
        config: MessagingConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new();
        let clock = Arc::new(MonotonicClock::new());
        let config = Arc::new(config);

        let directory = ConversationDirectory::new(
            store.clone(),
            clock.clone(),
            dispatcher.clone(),
            config.directory_mode,
        );
        let log = MessageLog::new(store.clone(), clock.clone(), dispatcher.clone(), config.clone());
        let direct = DirectMessagingService::new(
            directory,
            log,
            store.clone(),
            dispatcher.clone(),
            attachments.clone(),
            profiles.clone(),
            config.clone(),
        );
        let community = CommunityFeed::new(store, clock, dispatcher.clone(), attachments, profiles, config);

        Self {
            direct,
            community,
            dispatcher,
        }
    }
}

/// Validate a text body and return it trimmed.
pub(crate) fn validate_content<'a>(content: &'a str, max_chars: usize) -> Result<&'a str, MessagingError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MessagingError::EmptyContent);
    }
    if trimmed.chars().count() > max_chars {
        return Err(MessagingError::ContentTooLong { max: max_chars });
    }
    Ok(trimmed)
}

/// Clamp a client-supplied window size into `1..=MAX_WINDOW`.
pub(crate) fn clamp_window(limit: u32) -> u32 {
    limit.clamp(1, MAX_WINDOW)
}
