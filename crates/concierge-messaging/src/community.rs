use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use concierge_types::models::{CommunityMessage, MediaAttachment, Party};

use crate::attachments::{AttachmentResolver, MediaFile};
use crate::clock::MonotonicClock;
use crate::dispatcher::{Dispatcher, MessagingEvent};
use crate::error::MessagingError;
use crate::profiles::ProfileDirectory;
use crate::service::upload_media;
use crate::store::{SharedStore, blocking};
use crate::subscription::CommunityStream;
use crate::{MessagingConfig, clamp_window, validate_content};

/// Name recorded for authors the profile directory does not know.
pub const UNKNOWN_AUTHOR: &str = "Résident";

/// The single feed every resident and staff member can post to and read.
/// Posts carry the author's name as it was when they posted.
#[derive(Clone)]
pub struct CommunityFeed {
    store: SharedStore,
    clock: Arc<MonotonicClock>,
    dispatcher: Dispatcher,
    attachments: Arc<dyn AttachmentResolver>,
    profiles: Arc<dyn ProfileDirectory>,
    config: Arc<MessagingConfig>,
    append_lock: Arc<Mutex<()>>,
}

impl CommunityFeed {
    pub fn new(
        store: SharedStore,
        clock: Arc<MonotonicClock>,
        dispatcher: Dispatcher,
        attachments: Arc<dyn AttachmentResolver>,
        profiles: Arc<dyn ProfileDirectory>,
        config: Arc<MessagingConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            dispatcher,
            attachments,
            profiles,
            config,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append a post under the given display name.
    pub async fn post(
        &self,
        sender_id: &str,
        sender_name: &str,
        content: &str,
        media: Option<MediaAttachment>,
    ) -> Result<CommunityMessage, MessagingError> {
        let content = validate_content(content, self.config.max_content_chars)?.to_string();

        let _guard = self.append_lock.lock().await;
        let post = CommunityMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            content,
            media,
            created_at: self.clock.now(),
        };

        let record = post.clone();
        blocking(&self.store, move |s| s.append_community_message(&record)).await?;
        debug!("{} posted {} to the community feed", post.sender_id, post.id);

        self.dispatcher
            .publish(MessagingEvent::CommunityPosted(post.clone()));
        Ok(post)
    }

    /// Post a text message as `author`, naming them from the profile directory.
    pub async fn post_as(&self, author: &Party, content: &str) -> Result<CommunityMessage, MessagingError> {
        validate_content(content, self.config.max_content_chars)?;
        let name = self.author_name(author).await;
        self.post(&author.id, &name, content, None).await
    }

    /// Upload a media file and post it with a placeholder body.
    pub async fn post_media(&self, author: &Party, file: MediaFile) -> Result<CommunityMessage, MessagingError> {
        let name = self.author_name(author).await;
        let media = upload_media(self.attachments.as_ref(), &self.config, file).await?;
        let placeholder = media.media_type.placeholder();
        self.post(&author.id, &name, placeholder, Some(media)).await
    }

    /// The newest `limit` posts, oldest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<CommunityMessage>, MessagingError> {
        let limit = clamp_window(limit);
        let mut recent = blocking(&self.store, move |s| s.recent_community_messages(limit)).await?;
        recent.reverse();
        Ok(recent)
    }

    /// Live window over the newest `limit` posts.
    pub async fn stream_recent(&self, limit: u32) -> Result<CommunityStream, MessagingError> {
        CommunityStream::open(self.store.clone(), &self.dispatcher, clamp_window(limit)).await
    }

    /// Window size used when the client does not ask for one.
    pub fn default_window(&self) -> u32 {
        clamp_window(self.config.community_window)
    }

    async fn author_name(&self, author: &Party) -> String {
        match self.profiles.get(&author.id).await {
            Ok(Some(profile)) => profile.display_name(),
            Ok(None) => {
                warn!("No profile for {}, posting as '{}'", author.id, UNKNOWN_AUTHOR);
                UNKNOWN_AUTHOR.to_string()
            }
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", author.id, e);
                UNKNOWN_AUTHOR.to_string()
            }
        }
    }
}
