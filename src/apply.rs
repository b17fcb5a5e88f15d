//! Applies a user-approved selection of an enrichment proposal.
//!
//! This is a best-effort batch: a failure on one item (for instance a
//! duplicate-identifier race) is reported as an error string and must not
//! abort items in other categories. Counts reflect successful writes only.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::model::{
    AddressProposal, CanonicalProfile, ContactProposal, EnrichmentProposal, IdentifierProposal,
    ProposalAction,
};
use crate::storage::{EntityStore, RegistryStore};

/// Per-category choice of what to apply, as returned by the approval UI.
#[derive(Debug, Clone, Default)]
pub struct ApplySelection {
    pub apply_core: bool,
    pub apply_type_specific: bool,
    pub identifiers: Vec<IdentifierProposal>,
    pub contacts: Vec<ContactProposal>,
    pub addresses: Vec<AddressProposal>,
}

impl ApplySelection {
    /// Select every safe addition: field updates into empty fields, add
    /// identifiers and contacts, and new addresses. Address updates and
    /// skip-tagged identifiers need an explicit selection.
    pub fn safe_additions(proposal: &EnrichmentProposal) -> Self {
        Self {
            apply_core: !proposal.core_updates.is_empty(),
            apply_type_specific: !proposal.type_specific_updates.is_empty(),
            identifiers: proposal
                .identifiers
                .iter()
                .filter(|i| i.action == ProposalAction::Add)
                .cloned()
                .collect(),
            contacts: proposal.contacts.clone(),
            addresses: proposal
                .addresses
                .iter()
                .filter(|a| a.action == ProposalAction::Add)
                .cloned()
                .collect(),
        }
    }
}

/// Counts of successfully applied items per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    pub core: usize,
    pub type_specific: usize,
    pub identifiers: usize,
    pub contacts: usize,
    pub addresses: usize,
}

impl AppliedCounts {
    pub fn total(&self) -> usize {
        self.core + self.type_specific + self.identifiers + self.contacts + self.addresses
    }
}

/// Result of one apply run: what landed, and what failed item by item.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub applied: AppliedCounts,
    pub errors: Vec<String>,
}

pub struct ApplyEngine {
    entities: Arc<dyn EntityStore>,
    registry: Arc<dyn RegistryStore>,
}

impl ApplyEngine {
    pub fn new(entities: Arc<dyn EntityStore>, registry: Arc<dyn RegistryStore>) -> Self {
        Self { entities, registry }
    }

    /// Apply the selected subset of a proposal and refresh the profile
    /// cache for the entity once anything was written.
    #[instrument(skip(self, proposal, selection, profile), fields(entity_id = %proposal.entity_id))]
    pub async fn apply(
        &self,
        proposal: &EnrichmentProposal,
        selection: &ApplySelection,
        profile: &CanonicalProfile,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let entity_id = proposal.entity_id.as_str();

        if selection.apply_core && !proposal.core_updates.is_empty() {
            match self
                .entities
                .update_core_fields(entity_id, &proposal.core_updates)
                .await
            {
                Ok(()) => outcome.applied.core = proposal.core_updates.len(),
                Err(e) => outcome.errors.push(format!("core fields: {e}")),
            }
        }

        if selection.apply_type_specific && !proposal.type_specific_updates.is_empty() {
            match self
                .entities
                .update_type_fields(entity_id, &proposal.type_specific_updates)
                .await
            {
                Ok(()) => {
                    outcome.applied.type_specific = proposal.type_specific_updates.len()
                }
                Err(e) => outcome.errors.push(format!("entity fields: {e}")),
            }
        }

        for identifier in &selection.identifiers {
            if identifier.action != ProposalAction::Add {
                // Skip decisions are recorded, never written.
                debug!(kind = %identifier.kind, "ignoring non-add identifier selection");
                continue;
            }
            match self
                .entities
                .add_identifier(
                    entity_id,
                    identifier.kind,
                    &identifier.value,
                    identifier.registry_name.as_deref(),
                )
                .await
            {
                Ok(()) => outcome.applied.identifiers += 1,
                Err(e) => outcome
                    .errors
                    .push(format!("{} {}: {e}", identifier.kind, identifier.value)),
            }
        }

        for contact in &selection.contacts {
            match self
                .entities
                .add_contact(
                    entity_id,
                    contact.channel,
                    &contact.value,
                    contact.label.as_deref(),
                )
                .await
            {
                Ok(()) => outcome.applied.contacts += 1,
                Err(e) => outcome
                    .errors
                    .push(format!("{} {}: {e}", contact.channel, contact.value)),
            }
        }

        for address in &selection.addresses {
            let result = match (address.action, address.existing_address_id.as_deref()) {
                (ProposalAction::Add, _) => {
                    self.entities.add_address(entity_id, &address.address).await
                }
                (ProposalAction::Update, Some(existing_id)) => {
                    self.entities
                        .update_address(entity_id, existing_id, &address.address)
                        .await
                }
                (ProposalAction::Update, None) => Err(crate::error::EnrichError::Api {
                    message: "address update without an existing address id".to_string(),
                }),
                (ProposalAction::Skip, _) => continue,
            };
            match result {
                Ok(()) => outcome.applied.addresses += 1,
                Err(e) => outcome
                    .errors
                    .push(format!("{} address: {e}", address.address.kind)),
            }
        }

        if outcome.applied.total() > 0 {
            // Two independent persistence steps: the snapshot was written at
            // fetch time and remains valid even if this upsert fails.
            if let Err(e) = self
                .registry
                .upsert_profile(entity_id, profile, proposal.snapshot_id)
                .await
            {
                outcome
                    .errors
                    .push(format!("profile cache update failed: {e}"));
            }
        }

        if outcome.errors.is_empty() {
            info!(
                applied = outcome.applied.total(),
                "applied enrichment proposal"
            );
        } else {
            warn!(
                applied = outcome.applied.total(),
                errors = outcome.errors.len(),
                "applied enrichment proposal with errors"
            );
        }

        outcome
    }
}
