//! Proposal generation: compares a canonical profile against the current
//! state of an entity and produces the set of safe, non-destructive changes.
//!
//! The generator never proposes a write to a field that already holds a
//! non-empty value; when the registry disagrees with operator-entered data
//! it records a warning instead. Warnings and info messages accumulate in a
//! fixed category order (identifiers, type-specific fields, core fields,
//! contacts, addresses), which callers rely on for reproducible rendering.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::model::{
    AddressProposal, CeidgProfile, ContactChannel, ContactProposal, EnrichmentProposal,
    EntityState, EntityType, IdentifierKind, IdentifierProposal, KrsProfile, NormalizedAddress,
    ProposalAction, SourceSystem, normalize_identifier_value,
};

/// Lookup port answering "which entity already owns this identifier value".
///
/// The backing structure is the caller's concern; when no index is supplied,
/// cross-entity collision detection is simply disabled.
pub trait IdentifierIndex: Send + Sync {
    fn owner_of(&self, kind: IdentifierKind, normalized_value: &str) -> Option<String>;
}

/// In-memory identifier index for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryIdentifierIndex {
    by_kind: HashMap<IdentifierKind, HashMap<String, String>>,
}

impl InMemoryIdentifierIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: IdentifierKind, value: &str, entity_id: impl Into<String>) {
        self.by_kind
            .entry(kind)
            .or_default()
            .insert(normalize_identifier_value(value), entity_id.into());
    }
}

impl IdentifierIndex for InMemoryIdentifierIndex {
    fn owner_of(&self, kind: IdentifierKind, normalized_value: &str) -> Option<String> {
        self.by_kind
            .get(&kind)
            .and_then(|values| values.get(normalized_value))
            .cloned()
    }
}

/// Generate an enrichment proposal from a KRS profile.
pub fn generate_krs_proposal(
    entity: &EntityState,
    profile: &KrsProfile,
    index: Option<&dyn IdentifierIndex>,
) -> EnrichmentProposal {
    let mut builder = ProposalBuilder::new(
        entity,
        SourceSystem::Krs,
        profile.krs.clone().unwrap_or_default(),
    );

    builder.propose_identifier(IdentifierKind::Krs, profile.krs.as_deref(), index);
    builder.propose_identifier(IdentifierKind::Nip, profile.nip.as_deref(), index);
    builder.propose_identifier(IdentifierKind::Regon, profile.regon.as_deref(), index);

    if entity.entity_type == EntityType::LegalPerson {
        builder.propose_type_field(
            "registered_name",
            "Registry name",
            profile.official_name.as_deref(),
            false,
        );
        builder.propose_type_field(
            "short_name",
            "Short name",
            profile.short_name.as_deref(),
            false,
        );
        builder.propose_type_field(
            "legal_form_suffix",
            "Legal form",
            profile.legal_form.as_deref(),
            false,
        );
    }

    builder.propose_core_field(
        "canonical_label",
        "Canonical label",
        profile.official_name.as_deref(),
        false,
    );

    builder.propose_contact(ContactChannel::Email, profile.email.as_deref(), "KRS");
    builder.propose_contact(ContactChannel::Website, profile.website.as_deref(), "KRS");
    builder.propose_contact(ContactChannel::Phone, profile.phone.as_deref(), "KRS");

    if let Some(seat) = &profile.seat_address {
        builder.propose_address(seat);
    }
    if let Some(correspondence) = &profile.correspondence_address {
        builder.propose_address(correspondence);
    }

    builder.finish()
}

/// Generate an enrichment proposal from a CEIDG profile.
pub fn generate_ceidg_proposal(
    entity: &EntityState,
    profile: &CeidgProfile,
    index: Option<&dyn IdentifierIndex>,
) -> EnrichmentProposal {
    let external_id = profile
        .nip
        .clone()
        .or_else(|| profile.regon.clone())
        .unwrap_or_default();
    let mut builder = ProposalBuilder::new(entity, SourceSystem::Ceidg, external_id);

    builder.propose_identifier(IdentifierKind::Nip, profile.nip.as_deref(), index);
    builder.propose_identifier(IdentifierKind::Regon, profile.regon.as_deref(), index);

    match entity.entity_type {
        EntityType::PhysicalPerson => {
            // Person names compare case-insensitively; registries shout in
            // uppercase while operators usually do not.
            builder.propose_type_field(
                "first_name",
                "First name",
                profile.first_name.as_deref(),
                true,
            );
            builder.propose_type_field(
                "last_name",
                "Last name",
                profile.last_name.as_deref(),
                true,
            );
        }
        EntityType::LegalPerson => {
            builder.propose_type_field(
                "registered_name",
                "Business name",
                profile.business_name.as_deref(),
                false,
            );
        }
    }

    let label_candidate = match entity.entity_type {
        EntityType::PhysicalPerson => {
            match (profile.first_name.as_deref(), profile.last_name.as_deref()) {
                (Some(first), Some(last)) => Some(format!("{first} {last}")),
                _ => profile.business_name.clone(),
            }
        }
        EntityType::LegalPerson => profile.business_name.clone(),
    };
    builder.propose_core_field(
        "canonical_label",
        "Canonical label",
        label_candidate.as_deref(),
        false,
    );

    builder.propose_contact(ContactChannel::Email, profile.email.as_deref(), "CEIDG");
    builder.propose_contact(ContactChannel::Website, profile.website.as_deref(), "CEIDG");
    builder.propose_contact(ContactChannel::Phone, profile.phone.as_deref(), "CEIDG");

    if let Some(main) = &profile.main_address {
        builder.propose_address(main);
    }
    if let Some(correspondence) = &profile.correspondence_address {
        builder.propose_address(correspondence);
    }
    for business in &profile.business_addresses {
        builder.propose_address(business);
    }

    builder.finish()
}

/// Accumulates proposal items per category and returns the immutable
/// proposal value at the end of generation.
struct ProposalBuilder<'a> {
    entity: &'a EntityState,
    proposal: EnrichmentProposal,
}

impl<'a> ProposalBuilder<'a> {
    fn new(entity: &'a EntityState, source: SourceSystem, external_id: String) -> Self {
        Self {
            entity,
            proposal: EnrichmentProposal {
                entity_id: entity.id.clone(),
                source,
                external_id,
                core_updates: BTreeMap::new(),
                type_specific_updates: BTreeMap::new(),
                identifiers: Vec::new(),
                contacts: Vec::new(),
                addresses: Vec::new(),
                warnings: Vec::new(),
                info_messages: Vec::new(),
                snapshot_id: None,
            },
        }
    }

    fn propose_identifier(
        &mut self,
        kind: IdentifierKind,
        raw_value: Option<&str>,
        index: Option<&dyn IdentifierIndex>,
    ) {
        let Some(raw) = non_empty(raw_value) else {
            return;
        };
        let value = normalize_identifier_value(raw);
        if value.is_empty() {
            return;
        }

        if self.entity.identifier_values(kind).contains(&value) {
            self.proposal
                .info_messages
                .push(format!("{kind} {value} already exists on entity"));
            return;
        }

        // A hit on the enriched entity itself is not a collision.
        let collision = index
            .and_then(|ix| ix.owner_of(kind, &value))
            .filter(|owner| owner != &self.entity.id);

        match collision {
            Some(owner) => {
                self.proposal.warnings.push(format!(
                    "{kind} {value} already exists on another entity ({owner})"
                ));
                self.proposal.identifiers.push(IdentifierProposal {
                    kind,
                    value,
                    registry_name: None,
                    action: ProposalAction::Skip,
                    reason: format!("Collision with entity {owner}"),
                    collision_entity_id: Some(owner),
                });
            }
            None => {
                self.proposal.identifiers.push(IdentifierProposal {
                    kind,
                    value,
                    registry_name: None,
                    action: ProposalAction::Add,
                    reason: "From registry".to_string(),
                    collision_entity_id: None,
                });
            }
        }
    }

    fn propose_type_field(
        &mut self,
        name: &str,
        label: &str,
        candidate: Option<&str>,
        case_insensitive: bool,
    ) {
        if let Some(update) = self.field_update(name, label, candidate, case_insensitive) {
            self.proposal
                .type_specific_updates
                .insert(name.to_string(), update);
        }
    }

    fn propose_core_field(
        &mut self,
        name: &str,
        label: &str,
        candidate: Option<&str>,
        case_insensitive: bool,
    ) {
        if let Some(update) = self.field_update(name, label, candidate, case_insensitive) {
            self.proposal.core_updates.insert(name.to_string(), update);
        }
    }

    /// Shared empty-field rule: propose into empty fields only; a differing
    /// non-empty value produces a warning and no update.
    fn field_update(
        &mut self,
        name: &str,
        label: &str,
        candidate: Option<&str>,
        case_insensitive: bool,
    ) -> Option<String> {
        let candidate = non_empty(candidate)?;

        match self.entity.field(name) {
            None => Some(candidate.to_string()),
            Some(current) => {
                let differs = if case_insensitive {
                    current.to_lowercase() != candidate.to_lowercase()
                } else {
                    current != candidate
                };
                if differs {
                    self.proposal.warnings.push(format!(
                        "{label} differs: '{candidate}' vs current '{current}'"
                    ));
                }
                None
            }
        }
    }

    fn propose_contact(&mut self, channel: ContactChannel, value: Option<&str>, label: &str) {
        let Some(value) = non_empty(value) else {
            return;
        };

        if self
            .entity
            .contact_values(channel)
            .contains(&value.to_lowercase())
        {
            self.proposal
                .info_messages
                .push(format!("{channel} {value} already exists on entity"));
            return;
        }

        self.proposal.contacts.push(ContactProposal {
            channel,
            value: value.to_string(),
            label: Some(label.to_string()),
            action: ProposalAction::Add,
            reason: "From registry".to_string(),
        });
    }

    fn propose_address(&mut self, address: &NormalizedAddress) {
        match self.entity.address_of_kind(address.kind) {
            None => {
                self.proposal.addresses.push(AddressProposal {
                    address: address.clone(),
                    action: ProposalAction::Add,
                    existing_address_id: None,
                    reason: format!("No {} address exists", address.kind),
                    changes: Vec::new(),
                });
            }
            Some(existing) => {
                let changes = address.changes_against(existing);
                if changes.is_empty() {
                    self.proposal
                        .info_messages
                        .push(format!("{} address matches registry data", address.kind));
                } else {
                    self.proposal.addresses.push(AddressProposal {
                        address: address.clone(),
                        action: ProposalAction::Update,
                        existing_address_id: Some(existing.id.clone()),
                        reason: format!("Update {} address from registry", address.kind),
                        changes,
                    });
                }
            }
        }
    }

    fn finish(self) -> EnrichmentProposal {
        debug!(
            entity_id = %self.proposal.entity_id,
            source = %self.proposal.source,
            proposals = self.proposal.count_proposals(),
            warnings = self.proposal.warnings.len(),
            "generated enrichment proposal"
        );
        self.proposal
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
