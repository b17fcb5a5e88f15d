//! Storage ports for the enrichment pipeline and in-memory implementations
//! for development/testing.
//!
//! The registry store owns the append-only snapshot log and the derived
//! profile cache (one row per entity per source, upserted). The entity
//! store is the write side the apply engine talks to; the in-memory
//! implementation enforces the cross-entity identifier uniqueness
//! constraint the way a relational backend would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EnrichError, Result};
use crate::model::{
    CanonicalProfile, ContactChannel, IdentifierKind, NormalizedAddress, RegistrySnapshot,
    SourceSystem, normalize_identifier_value,
};

/// Cached normalized profile for one (entity, source) pair, pointing back
/// at the snapshot it was derived from. A derived artifact: losing it only
/// costs a re-normalization of the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCacheRow {
    pub entity_id: String,
    pub source: SourceSystem,
    pub profile: CanonicalProfile,
    pub last_snapshot_id: Option<Uuid>,
    pub last_fetched_at: DateTime<Utc>,
}

/// Persistence port for snapshots and the profile cache.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert a snapshot, assigning its id. Snapshots are append-only;
    /// there is deliberately no update or delete operation.
    async fn insert_snapshot(&self, snapshot: &mut RegistrySnapshot) -> Result<Uuid>;

    async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<RegistrySnapshot>>;

    /// Snapshots recorded for an entity, newest first.
    async fn snapshots_for_entity(
        &self,
        entity_id: &str,
        source: Option<SourceSystem>,
        limit: usize,
    ) -> Result<Vec<RegistrySnapshot>>;

    /// Insert or replace the cache row for (entity, source).
    async fn upsert_profile(
        &self,
        entity_id: &str,
        profile: &CanonicalProfile,
        snapshot_id: Option<Uuid>,
    ) -> Result<()>;

    async fn get_profile(
        &self,
        entity_id: &str,
        source: SourceSystem,
    ) -> Result<Option<ProfileCacheRow>>;
}

/// Write port onto the entity records the apply engine mutates.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn update_core_fields(
        &self,
        entity_id: &str,
        updates: &std::collections::BTreeMap<String, String>,
    ) -> Result<()>;

    async fn update_type_fields(
        &self,
        entity_id: &str,
        updates: &std::collections::BTreeMap<String, String>,
    ) -> Result<()>;

    async fn add_identifier(
        &self,
        entity_id: &str,
        kind: IdentifierKind,
        value: &str,
        registry_name: Option<&str>,
    ) -> Result<()>;

    async fn add_contact(
        &self,
        entity_id: &str,
        channel: ContactChannel,
        value: &str,
        label: Option<&str>,
    ) -> Result<()>;

    async fn add_address(&self, entity_id: &str, address: &NormalizedAddress) -> Result<()>;

    async fn update_address(
        &self,
        entity_id: &str,
        address_id: &str,
        address: &NormalizedAddress,
    ) -> Result<()>;
}

/// In-memory registry store.
pub struct InMemoryRegistryStore {
    snapshots: Arc<Mutex<Vec<RegistrySnapshot>>>,
    profiles: Arc<Mutex<HashMap<(String, SourceSystem), ProfileCacheRow>>>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
            profiles: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn insert_snapshot(&self, snapshot: &mut RegistrySnapshot) -> Result<Uuid> {
        let id = Uuid::new_v4();
        snapshot.id = Some(id);

        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push(snapshot.clone());

        debug!(%id, source = %snapshot.source, external_id = %snapshot.external_id,
            "recorded registry snapshot");
        Ok(id)
    }

    async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<RegistrySnapshot>> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .iter()
            .find(|s| s.id == Some(snapshot_id))
            .cloned())
    }

    async fn snapshots_for_entity(
        &self,
        entity_id: &str,
        source: Option<SourceSystem>,
        limit: usize,
    ) -> Result<Vec<RegistrySnapshot>> {
        let snapshots = self.snapshots.lock().unwrap();
        let mut matching: Vec<RegistrySnapshot> = snapshots
            .iter()
            .filter(|s| s.entity_id.as_deref() == Some(entity_id))
            .filter(|s| source.map_or(true, |src| s.source == src))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn upsert_profile(
        &self,
        entity_id: &str,
        profile: &CanonicalProfile,
        snapshot_id: Option<Uuid>,
    ) -> Result<()> {
        let row = ProfileCacheRow {
            entity_id: entity_id.to_string(),
            source: profile.source(),
            profile: profile.without_raw_payload(),
            last_snapshot_id: snapshot_id,
            last_fetched_at: Utc::now(),
        };

        let mut profiles = self.profiles.lock().unwrap();
        profiles.insert((entity_id.to_string(), profile.source()), row);

        debug!(entity_id, source = %profile.source(), "upserted profile cache row");
        Ok(())
    }

    async fn get_profile(
        &self,
        entity_id: &str,
        source: SourceSystem,
    ) -> Result<Option<ProfileCacheRow>> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.get(&(entity_id.to_string(), source)).cloned())
    }
}

/// One entity's stored records in the in-memory entity store.
#[derive(Debug, Clone, Default)]
pub struct EntityRecord {
    pub core_fields: std::collections::BTreeMap<String, String>,
    pub type_fields: std::collections::BTreeMap<String, String>,
    pub identifiers: Vec<(IdentifierKind, String, Option<String>)>,
    pub contacts: Vec<(ContactChannel, String, Option<String>)>,
    pub addresses: HashMap<String, NormalizedAddress>,
}

/// In-memory entity store. Identifier uniqueness is enforced globally per
/// kind, mirroring the relational constraint that backs collision safety.
pub struct InMemoryEntityStore {
    entities: Arc<Mutex<HashMap<String, EntityRecord>>>,
    identifier_index: Arc<Mutex<HashMap<(IdentifierKind, String), String>>>,
    next_address_id: Arc<Mutex<u64>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(Mutex::new(HashMap::new())),
            identifier_index: Arc::new(Mutex::new(HashMap::new())),
            next_address_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Read an entity's records, for assertions and debugging.
    pub fn entity(&self, entity_id: &str) -> Option<EntityRecord> {
        self.entities.lock().unwrap().get(entity_id).cloned()
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn update_core_fields(
        &self,
        entity_id: &str,
        updates: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(entity_id.to_string()).or_default();
        for (name, value) in updates {
            record.core_fields.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn update_type_fields(
        &self,
        entity_id: &str,
        updates: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(entity_id.to_string()).or_default();
        for (name, value) in updates {
            record.type_fields.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn add_identifier(
        &self,
        entity_id: &str,
        kind: IdentifierKind,
        value: &str,
        registry_name: Option<&str>,
    ) -> Result<()> {
        let normalized = normalize_identifier_value(value);

        let mut index = self.identifier_index.lock().unwrap();
        if let Some(owner) = index.get(&(kind, normalized.clone())) {
            if owner != entity_id {
                return Err(EnrichError::Duplicate {
                    kind,
                    value: normalized,
                });
            }
            return Ok(());
        }
        index.insert((kind, normalized.clone()), entity_id.to_string());
        drop(index);

        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(entity_id.to_string()).or_default();
        record
            .identifiers
            .push((kind, normalized, registry_name.map(str::to_string)));

        debug!(entity_id, %kind, "added identifier");
        Ok(())
    }

    async fn add_contact(
        &self,
        entity_id: &str,
        channel: ContactChannel,
        value: &str,
        label: Option<&str>,
    ) -> Result<()> {
        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(entity_id.to_string()).or_default();
        record
            .contacts
            .push((channel, value.to_string(), label.map(str::to_string)));
        Ok(())
    }

    async fn add_address(&self, entity_id: &str, address: &NormalizedAddress) -> Result<()> {
        let mut next_id = self.next_address_id.lock().unwrap();
        let address_id = format!("addr-{}", *next_id);
        *next_id += 1;
        drop(next_id);

        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(entity_id.to_string()).or_default();
        record.addresses.insert(address_id, address.clone());
        Ok(())
    }

    async fn update_address(
        &self,
        entity_id: &str,
        address_id: &str,
        address: &NormalizedAddress,
    ) -> Result<()> {
        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(entity_id.to_string()).or_default();
        match record.addresses.get_mut(address_id) {
            Some(stored) => {
                *stored = address.clone();
                Ok(())
            }
            None => Err(EnrichError::Api {
                message: format!("address {address_id} not found on entity {entity_id}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KrsProfile;

    fn krs_snapshot(entity_id: Option<&str>) -> RegistrySnapshot {
        RegistrySnapshot::capture(
            SourceSystem::Krs,
            "0000012345",
            entity_id.map(str::to_string),
            "{\"odpis\":{}}",
        )
    }

    #[tokio::test]
    async fn snapshots_get_ids_and_are_retrievable() {
        let store = InMemoryRegistryStore::new();
        let mut snapshot = krs_snapshot(Some("E1"));

        let id = store.insert_snapshot(&mut snapshot).await.unwrap();
        assert_eq!(snapshot.id, Some(id));

        let loaded = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(loaded.payload_raw, "{\"odpis\":{}}");
        assert_eq!(loaded.payload_hash, snapshot.payload_hash);
    }

    #[tokio::test]
    async fn snapshot_listing_filters_and_limits() {
        let store = InMemoryRegistryStore::new();
        for _ in 0..3 {
            store
                .insert_snapshot(&mut krs_snapshot(Some("E1")))
                .await
                .unwrap();
        }
        store
            .insert_snapshot(&mut krs_snapshot(Some("E2")))
            .await
            .unwrap();

        let listed = store
            .snapshots_for_entity("E1", Some(SourceSystem::Krs), 2)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let none = store
            .snapshots_for_entity("E1", Some(SourceSystem::Ceidg), 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn profile_upsert_replaces_the_previous_row() {
        let store = InMemoryRegistryStore::new();
        let first = CanonicalProfile::Krs(KrsProfile {
            official_name: Some("OLD".to_string()),
            ..KrsProfile::default()
        });
        let second = CanonicalProfile::Krs(KrsProfile {
            official_name: Some("NEW".to_string()),
            raw_payload: Some(serde_json::json!({"x": 1})),
            ..KrsProfile::default()
        });

        store.upsert_profile("E1", &first, None).await.unwrap();
        store
            .upsert_profile("E1", &second, Some(Uuid::new_v4()))
            .await
            .unwrap();

        let row = store
            .get_profile("E1", SourceSystem::Krs)
            .await
            .unwrap()
            .unwrap();
        match &row.profile {
            CanonicalProfile::Krs(p) => {
                assert_eq!(p.official_name.as_deref(), Some("NEW"));
                // The cache row holds normalized columns only.
                assert!(p.raw_payload.is_none());
            }
            _ => panic!("expected KRS profile"),
        }
        assert!(row.last_snapshot_id.is_some());
    }

    #[tokio::test]
    async fn duplicate_identifiers_are_rejected_across_entities() {
        let store = InMemoryEntityStore::new();
        store
            .add_identifier("E2", IdentifierKind::Nip, "1234567890", None)
            .await
            .unwrap();

        let err = store
            .add_identifier("E1", IdentifierKind::Nip, "123-456-78-90", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Duplicate { .. }));

        // Same entity re-adding the same value is a no-op, not an error.
        store
            .add_identifier("E2", IdentifierKind::Nip, "1234567890", None)
            .await
            .unwrap();
        assert_eq!(store.entity("E2").unwrap().identifiers.len(), 1);
    }

    #[tokio::test]
    async fn address_updates_require_an_existing_record() {
        let store = InMemoryEntityStore::new();
        let address = NormalizedAddress::new(crate::model::AddressKind::Main);

        store.add_address("E1", &address).await.unwrap();
        assert_eq!(store.entity("E1").unwrap().addresses.len(), 1);

        let err = store
            .update_address("E1", "addr-999", &address)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Api { .. }));
    }
}
