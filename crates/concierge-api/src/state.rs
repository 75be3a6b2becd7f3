use std::sync::Arc;

use concierge_messaging::{DiskAttachmentStore, Messaging};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub messaging: Messaging,
    /// Serves the files the attachment store wrote.
    pub media: Arc<DiskAttachmentStore>,
    pub jwt_secret: String,
    /// Request body cap for upload routes; the per-kind limits are checked
    /// again by the messaging core.
    pub max_upload_bytes: usize,
}
