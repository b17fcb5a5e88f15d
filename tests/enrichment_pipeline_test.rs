//! End-to-end enrichment scenarios: raw payload through normalization,
//! snapshot capture, proposal generation, selection and apply.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use registry_enrich::apply::{ApplyEngine, ApplySelection};
use registry_enrich::model::{
    AddressKind, CanonicalProfile, EntityState, EntityType, ExistingIdentifier, IdentifierKind,
    ProposalAction, RegistrySnapshot, SourceSystem, payload_sha256,
};
use registry_enrich::pipeline::EnrichmentPipeline;
use registry_enrich::sources::krs;
use registry_enrich::storage::{
    EntityStore, InMemoryEntityStore, InMemoryRegistryStore, RegistryStore,
};

fn krs_payload(with_regon: bool) -> serde_json::Value {
    let identifiers = if with_regon {
        json!({"nip": "1234567890", "regon": "123456785"})
    } else {
        json!({"nip": "1234567890"})
    };
    json!({
        "odpis": {
            "naglowekP": {"numerKRS": "0000012345"},
            "dane": {
                "dzial1": {
                    "danePodmiotu": {
                        "nazwa": "TEST SP. Z O.O.",
                        "identyfikatory": [{"identyfikatory": identifiers}]
                    },
                    "siedzibaIAdres": {
                        "adres": {
                            "miejscowosc": "KRAKÓW",
                            "kodPocztowy": "31-001",
                            "ulica": "FLORIAŃSKA",
                            "nrDomu": "12"
                        }
                    }
                }
            }
        }
    })
}

#[tokio::test]
async fn empty_legal_person_gets_identifiers_names_and_address() -> Result<()> {
    let registry = Arc::new(InMemoryRegistryStore::new());
    let entities = Arc::new(InMemoryEntityStore::new());
    let pipeline = EnrichmentPipeline::new(registry.clone());
    let engine = ApplyEngine::new(entities.clone(), registry.clone());

    let payload = krs_payload(false);
    let raw_text = payload.to_string();
    let profile = krs::normalizer::normalize(&payload);
    let snapshot = RegistrySnapshot::capture(
        SourceSystem::Krs,
        "0000012345",
        Some("E1".to_string()),
        raw_text.clone(),
    );

    let entity = EntityState::new("E1", EntityType::LegalPerson);
    let proposal = pipeline
        .propose_from_krs(&entity, &profile, snapshot, None)
        .await?;

    // Two identifier additions: KRS and NIP.
    let adds: Vec<_> = proposal
        .identifiers
        .iter()
        .filter(|i| i.action == ProposalAction::Add)
        .collect();
    assert_eq!(adds.len(), 2);

    assert_eq!(
        proposal.type_specific_updates.get("registered_name"),
        Some(&"TEST SP. Z O.O.".to_string())
    );
    assert_eq!(
        proposal.core_updates.get("canonical_label"),
        Some(&"TEST SP. Z O.O.".to_string())
    );

    assert_eq!(proposal.addresses.len(), 1);
    assert_eq!(proposal.addresses[0].action, ProposalAction::Add);
    assert_eq!(proposal.addresses[0].address.kind, AddressKind::Main);
    assert_eq!(
        proposal.addresses[0].address.city.as_deref(),
        Some("KRAKÓW")
    );

    // Apply all safe additions and verify the writes landed.
    let selection = ApplySelection::safe_additions(&proposal);
    let canonical = CanonicalProfile::Krs(profile);
    let outcome = engine.apply(&proposal, &selection, &canonical).await;

    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert_eq!(outcome.applied.identifiers, 2);
    assert_eq!(outcome.applied.addresses, 1);

    let record = entities.entity("E1").expect("entity record");
    assert_eq!(record.identifiers.len(), 2);
    assert_eq!(record.addresses.len(), 1);

    // The cache row points back at the snapshot that fed the run.
    let row = registry
        .get_profile("E1", SourceSystem::Krs)
        .await?
        .expect("cache row");
    assert_eq!(row.last_snapshot_id, proposal.snapshot_id);

    let stored = registry
        .get_snapshot(proposal.snapshot_id.unwrap())
        .await?
        .expect("snapshot");
    assert_eq!(stored.payload_hash, payload_sha256(&raw_text));

    Ok(())
}

#[tokio::test]
async fn populated_entity_only_gains_the_missing_identifier() -> Result<()> {
    let registry = Arc::new(InMemoryRegistryStore::new());
    let pipeline = EnrichmentPipeline::new(registry.clone());

    let payload = krs_payload(true);
    let profile = krs::normalizer::normalize(&payload);
    let snapshot = RegistrySnapshot::capture(
        SourceSystem::Krs,
        "0000012345",
        Some("E1".to_string()),
        payload.to_string(),
    );

    let mut entity = EntityState::new("E1", EntityType::LegalPerson);
    entity.identifiers.push(ExistingIdentifier {
        kind: IdentifierKind::Nip,
        value: "1234567890".to_string(),
    });
    entity.identifiers.push(ExistingIdentifier {
        kind: IdentifierKind::Krs,
        value: "0000012345".to_string(),
    });

    let proposal = pipeline
        .propose_from_krs(&entity, &profile, snapshot, None)
        .await?;

    assert_eq!(proposal.identifiers.len(), 1);
    assert_eq!(proposal.identifiers[0].kind, IdentifierKind::Regon);
    assert_eq!(proposal.identifiers[0].action, ProposalAction::Add);

    let infos: Vec<_> = proposal
        .info_messages
        .iter()
        .filter(|m| m.contains("already exists on entity"))
        .collect();
    assert_eq!(infos.len(), 2);

    Ok(())
}

#[tokio::test]
async fn repeated_fetches_of_identical_data_hash_identically() -> Result<()> {
    let registry = Arc::new(InMemoryRegistryStore::new());

    let raw_text = krs_payload(true).to_string();
    let mut first = RegistrySnapshot::capture(
        SourceSystem::Krs,
        "0000012345",
        Some("E1".to_string()),
        raw_text.clone(),
    );
    let mut second = RegistrySnapshot::capture(
        SourceSystem::Krs,
        "0000012345",
        Some("E1".to_string()),
        raw_text,
    );

    registry.insert_snapshot(&mut first).await?;
    registry.insert_snapshot(&mut second).await?;

    // Byte-identical fetches are detectable by hash without comparing
    // payloads; the snapshots stay separate audit records.
    assert_eq!(first.payload_hash, second.payload_hash);
    assert_ne!(first.id, second.id);

    let listed = registry
        .snapshots_for_entity("E1", Some(SourceSystem::Krs), 10)
        .await?;
    assert_eq!(listed.len(), 2);

    Ok(())
}

#[tokio::test]
async fn collision_race_at_apply_time_is_reported_per_item() -> Result<()> {
    let registry = Arc::new(InMemoryRegistryStore::new());
    let entities = Arc::new(InMemoryEntityStore::new());
    let pipeline = EnrichmentPipeline::new(registry.clone());
    let engine = ApplyEngine::new(entities.clone(), registry.clone());

    // E2 grabbed the NIP between proposal generation and apply.
    entities
        .add_identifier("E2", IdentifierKind::Nip, "1234567890", None)
        .await?;

    let payload = krs_payload(false);
    let profile = krs::normalizer::normalize(&payload);
    let snapshot = RegistrySnapshot::capture(
        SourceSystem::Krs,
        "0000012345",
        Some("E1".to_string()),
        payload.to_string(),
    );

    let entity = EntityState::new("E1", EntityType::LegalPerson);
    let proposal = pipeline
        .propose_from_krs(&entity, &profile, snapshot, None)
        .await?;
    let selection = ApplySelection::safe_additions(&proposal);
    let canonical = CanonicalProfile::Krs(profile);

    let outcome = engine.apply(&proposal, &selection, &canonical).await;

    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("NIP"));
    // The KRS identifier, the names and the address still applied.
    assert_eq!(outcome.applied.identifiers, 1);
    assert_eq!(outcome.applied.addresses, 1);
    assert!(outcome.applied.core > 0);

    Ok(())
}
