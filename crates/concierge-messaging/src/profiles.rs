use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use concierge_db::Database;
use concierge_types::models::Profile;

/// The portal's user profile directory, consumed read-only.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<Profile>>;
}

/// Reads the `profiles` table the portal keeps in the shared database.
pub struct SqliteProfiles {
    db: Arc<Database>,
}

impl SqliteProfiles {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileDirectory for SqliteProfiles {
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<Profile>> {
        let db = self.db.clone();
        let id = user_id.to_string();
        let row = tokio::task::spawn_blocking(move || db.get_profile(&id)).await??;

        Ok(row.and_then(|row| match row.role.parse() {
            Ok(role) => Some(Profile {
                first_name: row.first_name,
                last_name: row.last_name,
                role,
            }),
            Err(e) => {
                warn!("Ignoring profile '{}': {}", row.id, e);
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_types::models::Role;

    #[tokio::test]
    async fn reads_profiles_from_the_portal_table() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_profile("s-1", "Claire", "Martin", "admin").unwrap();
        db.upsert_profile("x-1", "Broken", "Role", "janitor").unwrap();

        let profiles = SqliteProfiles::new(db);
        let claire = profiles.get("s-1").await.unwrap().unwrap();
        assert_eq!(claire.role, Role::Staff);
        assert_eq!(claire.display_name(), "Claire Martin");
        assert!(profiles.get("x-1").await.unwrap().is_none());
        assert!(profiles.get("nobody").await.unwrap().is_none());
    }
}
