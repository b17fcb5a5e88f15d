//! Orchestration of one enrichment run: persist the audit snapshot, then
//! generate the proposal against the current entity state.
//!
//! Fetching is the source clients' job and selection belongs to the
//! approval UI; this stage sits between them. The snapshot insert and the
//! later profile-cache upsert are two independent persistence calls; a
//! crash in between leaves an orphaned, harmless snapshot (the cache is
//! derived state, the snapshot is the source of truth).

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::Result;
use crate::model::{CeidgProfile, EnrichmentProposal, EntityState, KrsProfile, RegistrySnapshot};
use crate::proposal::{generate_ceidg_proposal, generate_krs_proposal, IdentifierIndex};
use crate::storage::RegistryStore;

pub struct EnrichmentPipeline {
    registry: Arc<dyn RegistryStore>,
}

impl EnrichmentPipeline {
    pub fn new(registry: Arc<dyn RegistryStore>) -> Self {
        Self { registry }
    }

    /// Record the snapshot and build a proposal from a KRS profile.
    #[instrument(skip_all, fields(entity_id = %entity.id))]
    pub async fn propose_from_krs(
        &self,
        entity: &EntityState,
        profile: &KrsProfile,
        mut snapshot: RegistrySnapshot,
        index: Option<&dyn IdentifierIndex>,
    ) -> Result<EnrichmentProposal> {
        snapshot.entity_id.get_or_insert_with(|| entity.id.clone());
        let snapshot_id = self.registry.insert_snapshot(&mut snapshot).await?;

        let mut proposal = generate_krs_proposal(entity, profile, index);
        proposal.snapshot_id = Some(snapshot_id);

        info!(
            %snapshot_id,
            proposals = proposal.count_proposals(),
            warnings = proposal.warnings.len(),
            "prepared KRS enrichment proposal"
        );
        Ok(proposal)
    }

    /// Record the snapshot and build a proposal from a CEIDG profile.
    #[instrument(skip_all, fields(entity_id = %entity.id))]
    pub async fn propose_from_ceidg(
        &self,
        entity: &EntityState,
        profile: &CeidgProfile,
        mut snapshot: RegistrySnapshot,
        index: Option<&dyn IdentifierIndex>,
    ) -> Result<EnrichmentProposal> {
        snapshot.entity_id.get_or_insert_with(|| entity.id.clone());
        let snapshot_id = self.registry.insert_snapshot(&mut snapshot).await?;

        let mut proposal = generate_ceidg_proposal(entity, profile, index);
        proposal.snapshot_id = Some(snapshot_id);

        info!(
            %snapshot_id,
            proposals = proposal.count_proposals(),
            warnings = proposal.warnings.len(),
            "prepared CEIDG enrichment proposal"
        );
        Ok(proposal)
    }
}
