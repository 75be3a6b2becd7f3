use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use concierge_messaging::{Messaging, MessagingError};
use concierge_types::events::{GatewayCommand, GatewayEvent};
use concierge_types::models::Party;

/// What a subscription task is following.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Watch {
    Conversation(String),
    Inbox,
    Community,
}

/// Per-connection state: who is connected and which streams they follow.
/// Each stream runs in its own task; dropping the session aborts them all.
pub struct Session {
    messaging: Messaging,
    party: Party,
    out: mpsc::Sender<GatewayEvent>,
    watches: HashMap<Watch, JoinHandle<()>>,
}

impl Session {
    pub fn new(messaging: Messaging, party: Party, out: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            messaging,
            party,
            out,
            watches: HashMap::new(),
        }
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Number of live subscription tasks.
    pub fn active_watches(&self) -> usize {
        self.watches.values().filter(|h| !h.is_finished()).count()
    }

    pub async fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Identify { .. } => {} // Already handled

            GatewayCommand::OpenConversation { conversation_id } => {
                self.open_conversation(conversation_id).await;
            }

            GatewayCommand::CloseConversation { conversation_id } => {
                if let Some(handle) = self.watches.remove(&Watch::Conversation(conversation_id.clone())) {
                    handle.abort();
                    debug!("{} closed conversation {}", self.party.id, conversation_id);
                }
            }

            GatewayCommand::WatchInbox => self.watch_inbox().await,

            GatewayCommand::WatchCommunity { limit } => self.watch_community(limit).await,

            GatewayCommand::MarkRead { conversation_id } => {
                if let Err(e) = self.messaging.direct.mark_read(&conversation_id, &self.party).await {
                    self.report(e).await;
                }
            }
        }
    }

    async fn open_conversation(&mut self, conversation_id: String) {
        let direct = self.messaging.direct.clone();
        let mut stream = match direct.stream_from(&conversation_id, &self.party).await {
            Ok(stream) => stream,
            Err(e) => return self.report(e).await,
        };

        info!("{} opened conversation {}", self.party.id, conversation_id);
        let out = self.out.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                if out.send(GatewayEvent::MessageCreate { message }).await.is_err() {
                    break;
                }
            }
        });
        self.replace(Watch::Conversation(conversation_id.clone()), task);

        // Opening a conversation counts as reading it.
        if let Err(e) = direct.mark_read(&conversation_id, &self.party).await {
            self.report(e).await;
        }
    }

    async fn watch_inbox(&mut self) {
        let mut stream = match self.messaging.direct.list_for(&self.party).await {
            Ok(stream) => stream,
            Err(e) => return self.report(e).await,
        };

        let direct = self.messaging.direct.clone();
        let party = self.party.clone();
        let out = self.out.clone();
        let task = tokio::spawn(async move {
            while let Some(list) = stream.next().await {
                let conversations = direct.hydrate(&party, list).await;
                let unread = conversations.iter().filter(|e| e.has_unread).count();
                let event = GatewayEvent::InboxUpdate {
                    conversations,
                    unread,
                };
                if out.send(event).await.is_err() {
                    break;
                }
            }
        });
        self.replace(Watch::Inbox, task);
    }

    async fn watch_community(&mut self, limit: Option<u32>) {
        let community = &self.messaging.community;
        let limit = limit.unwrap_or_else(|| community.default_window());
        let mut stream = match community.stream_recent(limit).await {
            Ok(stream) => stream,
            Err(e) => return self.report(e).await,
        };

        let out = self.out.clone();
        let task = tokio::spawn(async move {
            while let Some(messages) = stream.next().await {
                if out.send(GatewayEvent::CommunityUpdate { messages }).await.is_err() {
                    break;
                }
            }
        });
        self.replace(Watch::Community, task);
    }

    fn replace(&mut self, watch: Watch, task: JoinHandle<()>) {
        if let Some(previous) = self.watches.insert(watch, task) {
            previous.abort();
        }
    }

    async fn report(&self, e: MessagingError) {
        let message = if e.is_client_error() {
            warn!("{} command rejected: {}", self.party.id, e);
            e.to_string()
        } else {
            error!("{} command failed: {}", self.party.id, e);
            "internal error".to_string()
        };
        let _ = self.out.send(GatewayEvent::Error { message }).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, handle) in self.watches.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use concierge_db::Database;
    use concierge_messaging::{AttachmentResolver, MessagingConfig, SqliteProfiles, StoredAttachment};

    use super::*;

    struct NoUploads;

    #[async_trait]
    impl AttachmentResolver for NoUploads {
        async fn upload(&self, _filename: &str, _bytes: Bytes) -> anyhow::Result<StoredAttachment> {
            anyhow::bail!("uploads disabled")
        }
    }

    fn messaging() -> Messaging {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_profile("r-1", "Awa", "Diallo", "resident").unwrap();
        Messaging::new(
            db.clone(),
            Arc::new(NoUploads),
            Arc::new(SqliteProfiles::new(db)),
            MessagingConfig::default(),
        )
    }

    async fn next_event(rx: &mut mpsc::Receiver<GatewayEvent>) -> GatewayEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn open_conversation_replays_and_marks_read() {
        let messaging = messaging();
        let resident = Party::resident("r-1");
        let conv = messaging.direct.start_conversation("r-1").await.unwrap();
        messaging.direct.send(&conv.id, &resident, "Fuite d'eau").await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut session = Session::new(messaging.clone(), Party::staff("s-1"), tx);
        session
            .handle(GatewayCommand::OpenConversation {
                conversation_id: conv.id.clone(),
            })
            .await;

        match next_event(&mut rx).await {
            GatewayEvent::MessageCreate { message } => assert_eq!(message.content, "Fuite d'eau"),
            other => panic!("unexpected event: {:?}", other),
        }
        let conv = messaging.direct.directory().get(&conv.id).await.unwrap();
        assert_eq!(conv.unread_count, 0);

        messaging.direct.send(&conv.id, &resident, "Merci").await.unwrap();
        match next_event(&mut rx).await {
            GatewayEvent::MessageCreate { message } => assert_eq!(message.content, "Merci"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn outsiders_get_an_error_event() {
        let messaging = messaging();
        let conv = messaging.direct.start_conversation("r-1").await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut session = Session::new(messaging, Party::resident("r-2"), tx);
        session
            .handle(GatewayCommand::OpenConversation {
                conversation_id: conv.id,
            })
            .await;

        assert!(matches!(next_event(&mut rx).await, GatewayEvent::Error { .. }));
        assert_eq!(session.active_watches(), 0);
    }

    #[tokio::test]
    async fn inbox_updates_carry_the_badge() {
        let messaging = messaging();
        let conv = messaging.direct.start_conversation("r-1").await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut session = Session::new(messaging.clone(), Party::staff("s-1"), tx);
        session.handle(GatewayCommand::WatchInbox).await;

        match next_event(&mut rx).await {
            GatewayEvent::InboxUpdate { conversations, unread } => {
                assert_eq!(conversations.len(), 1);
                assert_eq!(unread, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        messaging
            .direct
            .send(&conv.id, &Party::resident("r-1"), "Bonjour")
            .await
            .unwrap();
        match next_event(&mut rx).await {
            GatewayEvent::InboxUpdate { conversations, unread } => {
                assert_eq!(unread, 1);
                assert_eq!(conversations[0].counterpart_name.as_deref(), Some("Awa Diallo"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropping_the_session_releases_subscriptions() {
        let messaging = messaging();
        let conv = messaging.direct.start_conversation("r-1").await.unwrap();
        let baseline = messaging.dispatcher.subscriber_count();

        let (tx, _rx) = mpsc::channel(16);
        let mut session = Session::new(messaging.clone(), Party::resident("r-1"), tx);
        session
            .handle(GatewayCommand::OpenConversation {
                conversation_id: conv.id.clone(),
            })
            .await;
        session.handle(GatewayCommand::WatchCommunity { limit: Some(10) }).await;
        assert_eq!(session.active_watches(), 2);

        session
            .handle(GatewayCommand::CloseConversation {
                conversation_id: conv.id,
            })
            .await;
        assert_eq!(session.active_watches(), 1);

        drop(session);
        for _ in 0..50 {
            if messaging.dispatcher.subscriber_count() == baseline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(messaging.dispatcher.subscriber_count(), baseline);
    }
}
