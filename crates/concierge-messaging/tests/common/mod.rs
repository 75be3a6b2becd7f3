#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use concierge_db::Database;
use concierge_messaging::{
    AttachmentResolver, Messaging, MessagingConfig, MessagingStore, SqliteProfiles, StoredAttachment,
};
use concierge_types::models::{CommunityMessage, Conversation, Message};

/// Database-backed store with switches for the failure and race scenarios.
pub struct HookedStore {
    pub db: Arc<Database>,
    /// Every conversation lookup waits here, so concurrent callers all finish
    /// their lookup before any of them creates.
    pub lookup_gate: Option<Barrier>,
    pub fail_summary: AtomicBool,
}

impl HookedStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            lookup_gate: None,
            fail_summary: AtomicBool::new(false),
        }
    }
}

impl MessagingStore for HookedStore {
    fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        MessagingStore::conversation(self.db.as_ref(), id)
    }

    fn conversations_for(&self, participant: &str) -> Result<Vec<Conversation>> {
        let found = MessagingStore::conversations_for(self.db.as_ref(), participant);
        if let Some(gate) = &self.lookup_gate {
            gate.wait();
        }
        found
    }

    fn all_conversations(&self) -> Result<Vec<Conversation>> {
        MessagingStore::all_conversations(self.db.as_ref())
    }

    fn create_conversation(&self, conversation: &Conversation) -> Result<bool> {
        MessagingStore::create_conversation(self.db.as_ref(), conversation)
    }

    fn record_last_message(
        &self,
        id: &str,
        preview: &str,
        sender_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable"));
        }
        MessagingStore::record_last_message(self.db.as_ref(), id, preview, sender_id, at)
    }

    fn clear_unread(&self, id: &str, seen_sender_id: Option<&str>) -> Result<Option<Conversation>> {
        MessagingStore::clear_unread(self.db.as_ref(), id, seen_sender_id)
    }

    fn append_message(&self, message: &Message) -> Result<()> {
        MessagingStore::append_message(self.db.as_ref(), message)
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        MessagingStore::messages(self.db.as_ref(), conversation_id)
    }

    fn messages_page(&self, conversation_id: &str, limit: u32, before: Option<&str>) -> Result<Vec<Message>> {
        MessagingStore::messages_page(self.db.as_ref(), conversation_id, limit, before)
    }

    fn append_community_message(&self, message: &CommunityMessage) -> Result<()> {
        MessagingStore::append_community_message(self.db.as_ref(), message)
    }

    fn recent_community_messages(&self, limit: u32) -> Result<Vec<CommunityMessage>> {
        MessagingStore::recent_community_messages(self.db.as_ref(), limit)
    }
}

/// Blob store stand-in that records uploads and can be told to fail.
#[derive(Default)]
pub struct StubAttachments {
    pub fail: AtomicBool,
    pub uploads: AtomicUsize,
    pub names: Mutex<Vec<String>>,
}

#[async_trait]
impl AttachmentResolver for StubAttachments {
    async fn upload(&self, filename: &str, _bytes: Bytes) -> Result<StoredAttachment> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("blob store unreachable"));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(filename.to_string());
        Ok(StoredAttachment {
            url: format!("https://blobs.test/{}/{}", n, filename),
        })
    }
}

pub struct Harness {
    pub messaging: Messaging,
    pub store: Arc<HookedStore>,
    pub attachments: Arc<StubAttachments>,
    pub db: Arc<Database>,
}

pub fn harness(config: MessagingConfig) -> Harness {
    harness_with(config, |store| store)
}

pub fn harness_with(config: MessagingConfig, tweak: impl FnOnce(HookedStore) -> HookedStore) -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.upsert_profile("r-1", "Awa", "Diallo", "resident").unwrap();
    db.upsert_profile("s-1", "Claire", "Martin", "staff").unwrap();

    let store = Arc::new(tweak(HookedStore::new(db.clone())));
    let attachments = Arc::new(StubAttachments::default());
    let messaging = Messaging::new(
        store.clone(),
        attachments.clone(),
        Arc::new(SqliteProfiles::new(db.clone())),
        config,
    );

    Harness {
        messaging,
        store,
        attachments,
        db,
    }
}
