//! Canonical data shapes shared across the enrichment pipeline: source and
//! action tags, normalized addresses, audit snapshots, per-source profiles,
//! proposals, and the current-entity-state inputs the proposal generator
//! diffs against.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// External registry a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceSystem {
    Krs,
    Ceidg,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Krs => "KRS",
            SourceSystem::Ceidg => "CEIDG",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action attached to an individual proposal item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalAction {
    /// Create a new related record.
    Add,
    /// Modify an existing related record.
    Update,
    /// Do not apply; records a decision together with its reason.
    Skip,
}

/// Semantic role of an address on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Main,
    Correspondence,
    Business,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Main => "MAIN",
            AddressKind::Correspondence => "CORRESPONDENCE",
            AddressKind::Business => "BUSINESS",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of official identifiers the registries assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// Court-registry number.
    Krs,
    /// Tax identifier.
    Nip,
    /// Statistical identifier.
    Regon,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Krs => "KRS",
            IdentifierKind::Nip => "NIP",
            IdentifierKind::Regon => "REGON",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact channels tracked on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactChannel {
    Email,
    Website,
    Phone,
}

impl ContactChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactChannel::Email => "EMAIL",
            ContactChannel::Website => "WEBSITE",
            ContactChannel::Phone => "PHONE",
        }
    }
}

impl fmt::Display for ContactChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal nature of the entity being enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    LegalPerson,
    PhysicalPerson,
}

/// Strip spaces and dashes from an identifier so formatting differences
/// never defeat equality checks.
pub fn normalize_identifier_value(raw: &str) -> String {
    raw.trim().replace(['-', ' '], "")
}

/// Normalized postal address extracted from registry data.
///
/// Every field except the kind tag and the country is optional; `country`
/// defaults to "PL" when the source omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub kind: AddressKind,
    pub country: String,
    pub voivodeship: Option<String>,
    pub county: Option<String>,
    pub commune: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub post_office: Option<String>,
    pub street: Option<String>,
    pub building_no: Option<String>,
    pub unit_no: Option<String>,
    pub additional_line: Option<String>,
}

impl NormalizedAddress {
    pub fn new(kind: AddressKind) -> Self {
        Self {
            kind,
            country: "PL".to_string(),
            voivodeship: None,
            county: None,
            commune: None,
            city: None,
            postal_code: None,
            post_office: None,
            street: None,
            building_no: None,
            unit_no: None,
            additional_line: None,
        }
    }

    /// Field names and values in a fixed order, for diffing and persistence.
    pub fn field_entries(&self) -> [(&'static str, Option<&str>); 11] {
        [
            ("country", Some(self.country.as_str())),
            ("voivodeship", self.voivodeship.as_deref()),
            ("county", self.county.as_deref()),
            ("commune", self.commune.as_deref()),
            ("city", self.city.as_deref()),
            ("postal_code", self.postal_code.as_deref()),
            ("post_office", self.post_office.as_deref()),
            ("street", self.street.as_deref()),
            ("building_no", self.building_no.as_deref()),
            ("unit_no", self.unit_no.as_deref()),
            ("additional_line", self.additional_line.as_deref()),
        ]
    }

    /// Human-readable change summary against an existing address record.
    /// Only non-empty new values that differ from the stored value count as
    /// a change. The stored country falls back to "PL", matching the column
    /// default in the entity store.
    pub fn changes_against(&self, existing: &ExistingAddress) -> Vec<String> {
        let mut changes = Vec::new();
        for (name, new_value) in self.field_entries() {
            let Some(new_value) = new_value.map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let old_value = existing.field(name);
            let old_effective = if name == "country" {
                Some(old_value.unwrap_or("PL"))
            } else {
                old_value
            };
            if old_effective != Some(new_value) {
                changes.push(format!(
                    "{name}: {} → {new_value}",
                    old_effective.unwrap_or("(empty)")
                ));
            }
        }
        changes
    }

    /// Single-line display form, used in logs and rendered proposals.
    pub fn format_oneline(&self) -> String {
        let mut parts = Vec::new();
        if let Some(street) = &self.street {
            let mut line = street.clone();
            if let Some(building) = &self.building_no {
                line.push(' ');
                line.push_str(building);
                if let Some(unit) = &self.unit_no {
                    line.push('/');
                    line.push_str(unit);
                }
            }
            parts.push(line);
        }
        if self.postal_code.is_some() || self.city.is_some() {
            parts.push(
                format!(
                    "{} {}",
                    self.postal_code.as_deref().unwrap_or(""),
                    self.city.as_deref().unwrap_or("")
                )
                .trim()
                .to_string(),
            );
        }
        if parts.is_empty() {
            "(no address)".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// SHA-256 hex digest of a raw payload text, the snapshot content hash.
pub fn payload_sha256(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Immutable audit record of one registry fetch.
///
/// Once persisted, the raw payload and its hash never change; snapshots are
/// append-only and survive independently of any derived profile cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub id: Option<Uuid>,
    pub entity_id: Option<String>,
    pub source: SourceSystem,
    pub external_id: String,
    pub fetched_at: DateTime<Utc>,
    pub effective_date: Option<NaiveDate>,
    pub payload_format: String,
    pub payload_raw: String,
    pub payload_hash: String,
    pub fetched_by: Option<String>,
    pub purpose_ref: Option<String>,
}

impl RegistrySnapshot {
    /// Capture a snapshot of the exact response text; the hash is computed
    /// over the same bytes that are stored.
    pub fn capture(
        source: SourceSystem,
        external_id: impl Into<String>,
        entity_id: Option<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        let payload_raw = raw_text.into();
        let payload_hash = payload_sha256(&payload_raw);
        Self {
            id: None,
            entity_id,
            source,
            external_id: external_id.into(),
            fetched_at: Utc::now(),
            effective_date: None,
            payload_format: "json".to_string(),
            payload_raw,
            payload_hash,
            fetched_by: None,
            purpose_ref: None,
        }
    }
}

/// A person authorized to represent a company, from the court registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    pub name: String,
    pub function: Option<String>,
    pub pesel: Option<String>,
}

/// Normalized data extracted from a KRS (court registry) payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KrsProfile {
    pub krs: Option<String>,
    pub nip: Option<String>,
    pub regon: Option<String>,
    pub official_name: Option<String>,
    pub short_name: Option<String>,
    pub legal_form: Option<String>,
    pub legal_form_code: Option<String>,
    pub registry_status: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub seat_address: Option<NormalizedAddress>,
    pub correspondence_address: Option<NormalizedAddress>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub share_capital: Option<String>,
    pub share_capital_currency: Option<String>,
    pub pkd_main: Option<String>,
    pub pkd_codes: Vec<String>,
    pub representatives: Vec<Representative>,
    /// Decoded payload kept for downstream debugging; the durable raw text
    /// lives on the snapshot.
    pub raw_payload: Option<Value>,
}

/// Normalized data extracted from a CEIDG (sole-proprietor registry) payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CeidgProfile {
    pub ceidg_id: Option<String>,
    pub nip: Option<String>,
    pub regon: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub business_name: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub suspension_date: Option<NaiveDate>,
    pub resume_date: Option<NaiveDate>,
    pub main_address: Option<NormalizedAddress>,
    pub correspondence_address: Option<NormalizedAddress>,
    pub business_addresses: Vec<NormalizedAddress>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub pkd_main: Option<String>,
    pub pkd_codes: Vec<String>,
    pub raw_payload: Option<Value>,
}

/// A source-tagged canonical profile. The two variants share one capability
/// set: identifiers, addresses, contacts, and a raw payload back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CanonicalProfile {
    Krs(KrsProfile),
    Ceidg(CeidgProfile),
}

impl CanonicalProfile {
    pub fn source(&self) -> SourceSystem {
        match self {
            CanonicalProfile::Krs(_) => SourceSystem::Krs,
            CanonicalProfile::Ceidg(_) => SourceSystem::Ceidg,
        }
    }

    /// The lookup key this profile answers to in its source registry.
    pub fn external_id(&self) -> Option<&str> {
        match self {
            CanonicalProfile::Krs(p) => p.krs.as_deref(),
            CanonicalProfile::Ceidg(p) => p.ceidg_id.as_deref().or(p.nip.as_deref()),
        }
    }

    pub fn nip(&self) -> Option<&str> {
        match self {
            CanonicalProfile::Krs(p) => p.nip.as_deref(),
            CanonicalProfile::Ceidg(p) => p.nip.as_deref(),
        }
    }

    pub fn regon(&self) -> Option<&str> {
        match self {
            CanonicalProfile::Krs(p) => p.regon.as_deref(),
            CanonicalProfile::Ceidg(p) => p.regon.as_deref(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            CanonicalProfile::Krs(p) => p.email.as_deref(),
            CanonicalProfile::Ceidg(p) => p.email.as_deref(),
        }
    }

    pub fn website(&self) -> Option<&str> {
        match self {
            CanonicalProfile::Krs(p) => p.website.as_deref(),
            CanonicalProfile::Ceidg(p) => p.website.as_deref(),
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            CanonicalProfile::Krs(p) => p.phone.as_deref(),
            CanonicalProfile::Ceidg(p) => p.phone.as_deref(),
        }
    }

    pub fn raw_payload(&self) -> Option<&Value> {
        match self {
            CanonicalProfile::Krs(p) => p.raw_payload.as_ref(),
            CanonicalProfile::Ceidg(p) => p.raw_payload.as_ref(),
        }
    }

    /// Copy of this profile with the raw payload dropped, the shape cached
    /// in the profile store (the snapshot owns the raw text).
    pub fn without_raw_payload(&self) -> CanonicalProfile {
        let mut copy = self.clone();
        match &mut copy {
            CanonicalProfile::Krs(p) => p.raw_payload = None,
            CanonicalProfile::Ceidg(p) => p.raw_payload = None,
        }
        copy
    }
}

/// Proposal to add (or explicitly skip) an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierProposal {
    pub kind: IdentifierKind,
    pub value: String,
    pub registry_name: Option<String>,
    pub action: ProposalAction,
    pub reason: String,
    /// Set when another entity already owns this value.
    pub collision_entity_id: Option<String>,
}

/// Proposal to add a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactProposal {
    pub channel: ContactChannel,
    pub value: String,
    pub label: Option<String>,
    pub action: ProposalAction,
    pub reason: String,
}

/// Proposal to add or update an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressProposal {
    pub address: NormalizedAddress,
    pub action: ProposalAction,
    /// Id of the address being updated, for `Update` actions.
    pub existing_address_id: Option<String>,
    pub reason: String,
    /// Per-field change summary, populated for `Update` actions.
    pub changes: Vec<String>,
}

/// Complete enrichment proposal for one entity from one registry fetch.
///
/// The proposal never contains a change to a field that already holds a
/// non-empty value on the target entity; at most a warning is recorded when
/// the registry value differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentProposal {
    pub entity_id: String,
    pub source: SourceSystem,
    pub external_id: String,
    pub core_updates: BTreeMap<String, String>,
    pub type_specific_updates: BTreeMap<String, String>,
    pub identifiers: Vec<IdentifierProposal>,
    pub contacts: Vec<ContactProposal>,
    pub addresses: Vec<AddressProposal>,
    pub warnings: Vec<String>,
    pub info_messages: Vec<String>,
    pub snapshot_id: Option<Uuid>,
}

impl EnrichmentProposal {
    pub fn has_any_proposals(&self) -> bool {
        !self.core_updates.is_empty()
            || !self.type_specific_updates.is_empty()
            || !self.identifiers.is_empty()
            || !self.contacts.is_empty()
            || !self.addresses.is_empty()
    }

    pub fn count_proposals(&self) -> usize {
        self.core_updates.len()
            + self.type_specific_updates.len()
            + self.identifiers.len()
            + self.contacts.len()
            + self.addresses.len()
    }
}

/// An identifier already present on the target entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

/// A contact already present on the target entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingContact {
    pub channel: ContactChannel,
    pub value: String,
}

/// An address already present on the target entity, with the id the update
/// path needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingAddress {
    pub id: String,
    pub kind: AddressKind,
    pub fields: HashMap<String, String>,
}

impl ExistingAddress {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Current state of the entity being enriched, as read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub id: String,
    pub entity_type: EntityType,
    /// Core and type-specific field values, keyed by field name.
    pub fields: HashMap<String, String>,
    pub identifiers: Vec<ExistingIdentifier>,
    pub contacts: Vec<ExistingContact>,
    pub addresses: Vec<ExistingAddress>,
}

impl EntityState {
    pub fn new(id: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            entity_type,
            fields: HashMap::new(),
            identifiers: Vec::new(),
            contacts: Vec::new(),
            addresses: Vec::new(),
        }
    }

    /// Current value of a field; blank values read as absent, since callers
    /// must distinguish "unknown" from "operator entered something".
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Normalized values of all identifiers of the given kind.
    pub fn identifier_values(&self, kind: IdentifierKind) -> HashSet<String> {
        self.identifiers
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| normalize_identifier_value(&i.value))
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Lowercased values of all contacts on the given channel.
    pub fn contact_values(&self, channel: ContactChannel) -> HashSet<String> {
        self.contacts
            .iter()
            .filter(|c| c.channel == channel)
            .map(|c| c.value.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn address_of_kind(&self, kind: AddressKind) -> Option<&ExistingAddress> {
        self.addresses.iter().find(|a| a.kind == kind)
    }
}
