// JSON persistence backend: staff accounts, IP bans, user log.
//
// The core treats persistence as an opaque `load/save` on a named collection.
// Collections are small (human counts) so they are cached fully in memory and
// written through on every mutation.

use crate::errors::AppError;
use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub const STAFF: &str = "staff";
pub const BANS: &str = "bans";
pub const USERS: &str = "users";

/// Opaque persistence contract: load/save a named collection.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load(&self, collection: &str) -> Result<Value, AppError>;
    async fn save(&self, collection: &str, value: &Value) -> Result<(), AppError>;
}

/// One JSON file per collection under a data directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn load(&self, collection: &str) -> Result<Value, AppError> {
        let path = self.path_for(collection);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| AppError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn save(&self, collection: &str, value: &Value) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        tokio::fs::write(self.path_for(collection), text).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffAccount {
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

/// Cached store facade over the persistence backend.
pub struct Stores {
    backend: Box<dyn Persistence>,
    cache: Mutex<HashMap<String, Value>>,
    /// Staff session tokens are process-local, never persisted.
    staff_sessions: Mutex<HashMap<String, String>>,
}

pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl Stores {
    pub fn new(backend: Box<dyn Persistence>) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            staff_sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, collection: &str) -> Value {
        let mut cache = self.cache.lock().await;
        if let Some(v) = cache.get(collection) {
            return v.clone();
        }
        let loaded = self.backend.load(collection).await.unwrap_or_else(|e| {
            tracing::warn!("failed to load collection {collection}: {e}");
            json!({})
        });
        cache.insert(collection.to_string(), loaded.clone());
        loaded
    }

    pub async fn put(&self, collection: &str, value: Value) -> Result<(), AppError> {
        let mut cache = self.cache.lock().await;
        cache.insert(collection.to_string(), value.clone());
        self.backend.save(collection, &value).await
    }

    // ---- staff accounts -------------------------------------------------

    /// Seed the `admin` account on first start when ADMIN_PASSWORD is set.
    pub async fn seed_admin(&self, password: &str) -> Result<(), AppError> {
        let mut staff = self.get(STAFF).await;
        let entries = staff.as_object_mut().ok_or_else(|| {
            AppError::Serialization("staff store is not an object".into())
        })?;
        if entries.contains_key("admin") {
            return Ok(());
        }
        entries.insert(
            "admin".to_string(),
            json!({
                "username": "admin",
                "passwordHash": hash_password(password),
                "role": "admin",
            }),
        );
        tracing::info!("seeded admin staff account");
        self.put(STAFF, staff).await
    }

    pub async fn find_staff(&self, username: &str) -> Option<StaffAccount> {
        let staff = self.get(STAFF).await;
        staff
            .get(username)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn verify_staff(&self, username: &str, password: &str) -> Option<StaffAccount> {
        let account = self.find_staff(username).await?;
        (account.password_hash == hash_password(password)).then_some(account)
    }

    pub async fn upsert_staff(&self, account: &StaffAccount) -> Result<(), AppError> {
        let mut staff = self.get(STAFF).await;
        if let Some(entries) = staff.as_object_mut() {
            entries.insert(
                account.username.clone(),
                serde_json::to_value(account)
                    .map_err(|e| AppError::Serialization(e.to_string()))?,
            );
        }
        self.put(STAFF, staff).await
    }

    pub async fn delete_staff(&self, username: &str) -> Result<bool, AppError> {
        let mut staff = self.get(STAFF).await;
        let removed = staff
            .as_object_mut()
            .map(|entries| entries.remove(username).is_some())
            .unwrap_or(false);
        if removed {
            self.put(STAFF, staff).await?;
        }
        Ok(removed)
    }

    /// Usernames and roles only; hashes stay server-side.
    pub async fn list_staff(&self) -> Vec<Value> {
        let staff = self.get(STAFF).await;
        staff
            .as_object()
            .map(|entries| {
                entries
                    .values()
                    .map(|v| {
                        json!({
                            "username": v.get("username").cloned().unwrap_or(Value::Null),
                            "role": v.get("role").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---- staff sessions -------------------------------------------------

    pub async fn issue_staff_token(&self, username: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut sessions = self.staff_sessions.lock().await;
        sessions.insert(token.clone(), username.to_string());
        token
    }

    pub async fn resolve_staff_token(&self, token: &str) -> Option<StaffAccount> {
        let username = {
            let sessions = self.staff_sessions.lock().await;
            sessions.get(token).cloned()
        }?;
        self.find_staff(&username).await
    }

    // ---- IP bans ---------------------------------------------------------

    pub async fn is_banned(&self, ip: &str) -> bool {
        let bans = self.get(BANS).await;
        bans.get(ip).is_some()
    }

    pub async fn add_ban(&self, ip: &str, reason: &str) -> Result<(), AppError> {
        let mut bans = self.get(BANS).await;
        if let Some(entries) = bans.as_object_mut() {
            entries.insert(
                ip.to_string(),
                json!({
                    "reason": reason,
                    "bannedAt": chrono::Utc::now().timestamp_millis(),
                }),
            );
        }
        self.put(BANS, bans).await
    }

    pub async fn remove_ban(&self, ip: &str) -> Result<bool, AppError> {
        let mut bans = self.get(BANS).await;
        let removed = bans
            .as_object_mut()
            .map(|entries| entries.remove(ip).is_some())
            .unwrap_or(false);
        if removed {
            self.put(BANS, bans).await?;
        }
        Ok(removed)
    }

    pub async fn list_bans(&self) -> Value {
        self.get(BANS).await
    }

    // ---- user log ---------------------------------------------------------

    /// Record a join under the client's IP: names seen, connection count,
    /// last-seen timestamp.
    pub async fn record_user(&self, ip: &str, name: &str) {
        let mut users = self.get(USERS).await;
        if let Some(entries) = users.as_object_mut() {
            let entry = entries
                .entry(ip.to_string())
                .or_insert_with(|| json!({ "names": [], "connections": 0 }));
            if let Some(obj) = entry.as_object_mut() {
                let names = obj
                    .entry("names")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(list) = names.as_array_mut() {
                    if !list.iter().any(|n| n.as_str() == Some(name)) {
                        list.push(Value::String(name.to_string()));
                    }
                }
                let count = obj.get("connections").and_then(Value::as_u64).unwrap_or(0);
                obj.insert("connections".into(), json!(count + 1));
                obj.insert(
                    "lastSeen".into(),
                    json!(chrono::Utc::now().timestamp_millis()),
                );
            }
        }
        if let Err(e) = self.put(USERS, users).await {
            tracing::warn!("user log write failed: {e}");
        }
    }

    pub async fn list_users(&self) -> Value {
        self.get(USERS).await
    }
}

/// In-memory persistence for tests.
#[cfg(test)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Persistence for MemoryStore {
    async fn load(&self, collection: &str) -> Result<Value, AppError> {
        let data = self.data.lock().await;
        Ok(data.get(collection).cloned().unwrap_or_else(|| json!({})))
    }

    async fn save(&self, collection: &str, value: &Value) -> Result<(), AppError> {
        let mut data = self.data.lock().await;
        data.insert(collection.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_admin_is_idempotent() {
        let stores = Stores::new(Box::new(MemoryStore::new()));
        stores.seed_admin("secret").await.unwrap();
        stores.seed_admin("other").await.unwrap();

        let account = stores.find_staff("admin").await.unwrap();
        assert_eq!(account.role, "admin");
        // First seed wins
        assert_eq!(account.password_hash, hash_password("secret"));
    }

    #[tokio::test]
    async fn test_verify_staff() {
        let stores = Stores::new(Box::new(MemoryStore::new()));
        stores.seed_admin("secret").await.unwrap();

        assert!(stores.verify_staff("admin", "secret").await.is_some());
        assert!(stores.verify_staff("admin", "wrong").await.is_none());
        assert!(stores.verify_staff("ghost", "secret").await.is_none());
    }

    #[tokio::test]
    async fn test_staff_token_roundtrip() {
        let stores = Stores::new(Box::new(MemoryStore::new()));
        stores.seed_admin("secret").await.unwrap();

        let token = stores.issue_staff_token("admin").await;
        let account = stores.resolve_staff_token(&token).await.unwrap();
        assert_eq!(account.username, "admin");
        assert!(stores.resolve_staff_token("bogus").await.is_none());
    }

    #[tokio::test]
    async fn test_ban_roundtrip() {
        let stores = Stores::new(Box::new(MemoryStore::new()));
        assert!(!stores.is_banned("1.2.3.4").await);

        stores.add_ban("1.2.3.4", "scraping").await.unwrap();
        assert!(stores.is_banned("1.2.3.4").await);

        assert!(stores.remove_ban("1.2.3.4").await.unwrap());
        assert!(!stores.is_banned("1.2.3.4").await);
        assert!(!stores.remove_ban("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_log_accumulates() {
        let stores = Stores::new(Box::new(MemoryStore::new()));
        stores.record_user("9.9.9.9", "Alice").await;
        stores.record_user("9.9.9.9", "Alice").await;
        stores.record_user("9.9.9.9", "Bob").await;

        let users = stores.list_users().await;
        let entry = users.get("9.9.9.9").unwrap();
        assert_eq!(entry.get("connections").unwrap().as_u64(), Some(3));
        assert_eq!(entry.get("names").unwrap().as_array().unwrap().len(), 2);
    }
}
