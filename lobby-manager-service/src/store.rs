// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    Client as DynamoClient,
    types::{AttributeValue, Put, TransactWriteItem},
};
use chrono::Utc;
use lobby_common::LOBBY_KEY_PREFIX;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::StoreConfig;

/// `lobby:<referenceID>` holds the serialized creation request.
pub fn payload_key(reference_id: &str) -> String {
    format!("{LOBBY_KEY_PREFIX}:{reference_id}")
}

/// `lobby:<referenceID>:status` holds the stored lifecycle literal.
pub fn status_key(reference_id: &str) -> String {
    format!("{LOBBY_KEY_PREFIX}:{reference_id}:status")
}

/// `lobby:<referenceID>:task` holds the launcher's task handle once running.
pub fn task_key(reference_id: &str) -> String {
    format!("{LOBBY_KEY_PREFIX}:{reference_id}:task")
}

/// Key-value persistence for lobby records. No transactions are assumed;
/// `set_many` is atomic only where a back-end overrides it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Writes entries in order. The default falls back to one `set` per entry.
    async fn set_many(&self, entries: &[(String, String)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> anyhow::Result<()> {
        let mut store = self.entries.write().await;
        for (key, value) in entries {
            store.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// One item per key: `pk` (partition key), `value`, `updated_at` and an
/// optional numeric `expires_at` for table TTL.
#[derive(Clone)]
pub struct DynamoStateStore {
    client: DynamoClient,
    table_name: String,
    ttl_seconds: Option<u64>,
}

impl DynamoStateStore {
    pub async fn from_config(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = config.endpoint.as_ref() {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        info!(
            table_name = %config.table_name,
            ttl_seconds = ?config.ttl_seconds,
            "lobby DynamoDB state store enabled"
        );
        Self {
            client: DynamoClient::new(&sdk_config),
            table_name: config.table_name.clone(),
            ttl_seconds: config.ttl_seconds,
        }
    }

    fn item(&self, key: &str, value: &str) -> HashMap<String, AttributeValue> {
        let now = Utc::now();
        item_at(key, value, self.ttl_seconds, now.timestamp(), now.to_rfc3339())
    }
}

fn item_at(
    key: &str,
    value: &str,
    ttl_seconds: Option<u64>,
    now: i64,
    updated_at: String,
) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("pk".to_string(), AttributeValue::S(key.to_string()));
    item.insert("value".to_string(), AttributeValue::S(value.to_string()));
    item.insert("updated_at".to_string(), AttributeValue::S(updated_at));
    if let Some(ttl) = ttl_seconds {
        let expires_at = now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX));
        item.insert(
            "expires_at".to_string(),
            AttributeValue::N(expires_at.to_string()),
        );
    }
    item
}

/// DynamoDB deletes expired items lazily, so reads drop them explicitly.
fn is_expired(item: &HashMap<String, AttributeValue>, now: i64) -> bool {
    item.get("expires_at")
        .and_then(|value| value.as_n().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .is_some_and(|expires_at| expires_at <= now)
}

#[async_trait]
impl StateStore for DynamoStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|error| anyhow::anyhow!("failed to read {key} from DynamoDB: {error}"))?;

        let Some(item) = output.item() else {
            return Ok(None);
        };
        if is_expired(item, Utc::now().timestamp()) {
            return Ok(None);
        }

        match item.get("value") {
            Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
            Some(other) => anyhow::bail!("unexpected DynamoDB attribute for {key}: {other:?}"),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(self.item(key, value)))
            .send()
            .await
            .map_err(|error| anyhow::anyhow!("failed to write {key} to DynamoDB: {error}"))?;
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> anyhow::Result<()> {
        let mut transact_items = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let put = Put::builder()
                .table_name(&self.table_name)
                .set_item(Some(self.item(key, value)))
                .build()
                .map_err(|error| anyhow::anyhow!("invalid DynamoDB put for {key}: {error}"))?;
            transact_items.push(TransactWriteItem::builder().put(put).build());
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(|error| anyhow::anyhow!("DynamoDB transactional write failed: {error}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Only implements `get`/`set`, so `set_many` takes the sequential default.
    #[derive(Default)]
    struct SequentialStore {
        writes: Mutex<Vec<(String, String)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl StateStore for SequentialStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self
                .writes
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(written, _)| written == key)
                .map(|(_, value)| value.clone()))
        }

        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail_on.as_deref() == Some(key) {
                anyhow::bail!("forced write failure for {key}");
            }
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string()));
            Ok(())
        }
    }

    #[test]
    fn keys_follow_lobby_schema() {
        assert_eq!(payload_key("abc123"), "lobby:abc123");
        assert_eq!(status_key("abc123"), "lobby:abc123:status");
        assert_eq!(task_key("abc123"), "lobby:abc123:task");
    }

    #[test]
    fn reference_id_is_not_interpreted() {
        assert_eq!(status_key("a:b/c"), "lobby:a:b/c:status");
    }

    #[tokio::test]
    async fn in_memory_get_of_absent_key_is_none() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get("lobby:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_set_overwrites() {
        let store = InMemoryStateStore::new();
        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn in_memory_set_many_writes_every_entry() {
        let store = InMemoryStateStore::new();
        store
            .set_many(&[
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ])
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn default_set_many_writes_in_order() {
        let store = SequentialStore::default();
        store
            .set_many(&[
                (payload_key("r1"), "{}".to_string()),
                (status_key("r1"), "Creating".to_string()),
            ])
            .await
            .unwrap();

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes[0].0, "lobby:r1");
        assert_eq!(writes[1].0, "lobby:r1:status");
    }

    #[tokio::test]
    async fn default_set_many_stops_at_first_failure() {
        let store = SequentialStore {
            writes: Mutex::new(vec![]),
            fail_on: Some(payload_key("r1")),
        };
        let result = store
            .set_many(&[
                (payload_key("r1"), "{}".to_string()),
                (status_key("r1"), "Creating".to_string()),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn expired_items_are_detected() {
        let mut item = HashMap::new();
        item.insert("expires_at".to_string(), AttributeValue::N("100".to_string()));
        assert!(is_expired(&item, 100));
        assert!(!is_expired(&item, 99));

        item.remove("expires_at");
        assert!(!is_expired(&item, i64::MAX));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_expiring() {
        let item = item_at("k", "v", Some(u64::MAX), 1_000, "now".to_string());
        assert_eq!(item.get("expires_at"), Some(&AttributeValue::N(i64::MAX.to_string())));
        assert!(!is_expired(&item, 1_000));

        let item = item_at("k", "v", Some(60), 1_000, "now".to_string());
        assert_eq!(item.get("expires_at"), Some(&AttributeValue::N("1060".to_string())));
        assert!(item_at("k", "v", None, 1_000, "now".to_string()).get("expires_at").is_none());
    }
}
