// ⚖️ Reconciliation Engine - remote batch → idempotent upsert batch
//
// Pipeline for one batch:
//   normalize  →  resolve franchise  →  collapse by natural key  →  UpsertBatch
//
// Collapsing keeps the LAST occurrence of a key at the position of its FIRST
// occurrence, so replaying the same batch always produces the same rows.
// Nothing here deletes: keys missing from a batch are left alone downstream.

use crate::entities::{FranchiseLookup, NaturalKey, StoreCandidate, StoreField};
use crate::normalizer::{normalize_cigam_store, normalize_ecomm_store};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// FEEDS
// ============================================================================

/// Where a batch comes from. Each feed owns its normalizer and the columns it
/// is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFeed {
    Cigam,
    Ecommerce,
}

impl StoreFeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreFeed::Cigam => "cigam",
            StoreFeed::Ecommerce => "ecommerce",
        }
    }

    /// Columns written when a row is inserted.
    pub fn insert_fields(&self) -> &'static [StoreField] {
        match self {
            StoreFeed::Cigam => &[StoreField::Cnpj, StoreField::CigamId, StoreField::Name, StoreField::FranchiseId],
            StoreFeed::Ecommerce => &[StoreField::Cnpj, StoreField::Status],
        }
    }

    /// Columns overwritten when the natural key already exists.
    pub fn update_fields(&self) -> &'static [StoreField] {
        match self {
            StoreFeed::Cigam => &[StoreField::Name, StoreField::FranchiseId],
            StoreFeed::Ecommerce => &[StoreField::Status],
        }
    }

    pub fn normalize(&self, raw: &Value) -> Option<StoreCandidate> {
        match self {
            StoreFeed::Cigam => normalize_cigam_store(raw),
            StoreFeed::Ecommerce => normalize_ecomm_store(raw),
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Rows plus the conflict policy the repository must apply to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertBatch {
    pub natural_key: NaturalKey,
    pub insert_fields: Vec<StoreField>,
    pub update_fields: Vec<StoreField>,
    pub rows: Vec<StoreCandidate>,
}

impl UpsertBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Raw records received.
    pub received: usize,
    /// Dropped by the normalizer.
    pub invalid: usize,
    /// Normalized but without a value for the natural key.
    pub missing_key: usize,
    /// Collapsed into a later record with the same key.
    pub duplicates: usize,
    /// Emitted rows whose alias has no registered franchise.
    pub unresolved_franchise: usize,
    /// Rows in the emitted batch.
    pub emitted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub batch: UpsertBatch,
    /// Natural-key values present in this batch, in batch order.
    pub active_keys: Vec<String>,
    pub stats: ReconcileStats,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    feed: StoreFeed,
    natural_key: NaturalKey,
}

impl ReconciliationEngine {
    pub fn new(feed: StoreFeed) -> Self {
        ReconciliationEngine {
            feed,
            natural_key: NaturalKey::default(),
        }
    }

    pub fn with_natural_key(mut self, natural_key: NaturalKey) -> Self {
        self.natural_key = natural_key;
        self
    }

    pub fn feed(&self) -> StoreFeed {
        self.feed
    }

    pub fn natural_key(&self) -> NaturalKey {
        self.natural_key
    }

    pub fn reconcile(&self, raw_batch: &[Value], franchises: &FranchiseLookup) -> ReconcileOutcome {
        let mut stats = ReconcileStats {
            received: raw_batch.len(),
            ..Default::default()
        };

        let mut rows: Vec<StoreCandidate> = Vec::with_capacity(raw_batch.len());
        let mut active_keys: Vec<String> = Vec::with_capacity(raw_batch.len());
        let mut position: HashMap<String, usize> = HashMap::new();

        for raw in raw_batch {
            let Some(mut candidate) = self.feed.normalize(raw) else {
                stats.invalid += 1;
                continue;
            };

            if let Some(alias) = candidate.franchise_alias {
                candidate.franchise_id = franchises.resolve(alias);
            }

            let Some(key) = candidate.natural_key(self.natural_key).map(str::to_string) else {
                stats.missing_key += 1;
                continue;
            };

            match position.get(&key) {
                Some(&index) => {
                    stats.duplicates += 1;
                    rows[index] = candidate;
                }
                None => {
                    position.insert(key.clone(), rows.len());
                    active_keys.push(key);
                    rows.push(candidate);
                }
            }
        }

        // Counted on surviving rows so collapsed duplicates count once.
        for row in rows.iter().filter(|r| r.franchise_alias.is_some() && r.franchise_id.is_none()) {
            stats.unresolved_franchise += 1;
            debug!(cnpj = %row.cnpj, alias = ?row.franchise_alias, "no franchise registered for alias");
        }

        stats.emitted = rows.len();
        if stats.invalid > 0 || stats.missing_key > 0 {
            debug!(
                feed = self.feed.as_str(),
                invalid = stats.invalid,
                missing_key = stats.missing_key,
                "dropped records during reconciliation"
            );
        }

        ReconcileOutcome {
            batch: UpsertBatch {
                natural_key: self.natural_key,
                insert_fields: self.feed.insert_fields().to_vec(),
                update_fields: self.feed.update_fields().to_vec(),
                rows,
            },
            active_keys,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Franchise, FranchiseAlias};
    use serde_json::json;

    fn lookup() -> FranchiseLookup {
        FranchiseLookup::from_franchises(vec![
            Franchise::new(1, "LPF"),
            Franchise::new(2, "FRQ"),
            Franchise::new(3, "STD"),
        ])
    }

    #[test]
    fn test_duplicate_cnpj_collapses_to_later_record() {
        let raw = vec![
            json!({"cnpj": "12.345.678/0001-99", "name": "Loja STD Centro"}),
            json!({"cnpj": "12345678000199", "name": "Loja STD Centro V2"}),
        ];

        let outcome = ReconciliationEngine::new(StoreFeed::Cigam).reconcile(&raw, &lookup());

        assert_eq!(outcome.batch.len(), 1);
        let row = &outcome.batch.rows[0];
        assert_eq!(row.cnpj, "12345678000199");
        assert_eq!(row.display_name.as_deref(), Some("Loja STD Centro V2"));
        assert_eq!(row.franchise_alias, Some(FranchiseAlias::Std));
        assert_eq!(row.franchise_id, Some(3));
        assert_eq!(outcome.active_keys, vec!["12345678000199".to_string()]);
        assert_eq!(outcome.stats.duplicates, 1);

        println!("✅ Last occurrence wins for duplicate CNPJ");
    }

    #[test]
    fn test_unresolved_alias_keeps_record() {
        let raw = vec![json!({"numcnpj": "11222333000181", "nomfantasia": "XYZ Store"})];

        let outcome = ReconciliationEngine::new(StoreFeed::Cigam).reconcile(&raw, &lookup());

        assert_eq!(outcome.batch.len(), 1);
        assert_eq!(outcome.batch.rows[0].franchise_alias, Some(FranchiseAlias::Out));
        assert_eq!(outcome.batch.rows[0].franchise_id, None);
        assert_eq!(outcome.stats.unresolved_franchise, 1);
    }

    #[test]
    fn test_unresolved_counted_once_per_surviving_row() {
        let raw = vec![
            json!({"numcnpj": "11222333000181", "nomfantasia": "XYZ Store"}),
            json!({"numcnpj": "11.222.333/0001-81", "nomfantasia": "XYZ Store Shopping"}),
            json!({"numcnpj": "22222222000122", "nomfantasia": "Loja FRQ Sul"}),
        ];

        let outcome = ReconciliationEngine::new(StoreFeed::Cigam).reconcile(&raw, &lookup());

        assert_eq!(outcome.stats.duplicates, 1);
        assert_eq!(outcome.stats.emitted, 2);
        assert_eq!(outcome.stats.unresolved_franchise, 1);
    }

    #[test]
    fn test_duplicate_keeps_first_position() {
        let raw = vec![
            json!({"numcnpj": "11111111000111", "nomfantasia": "A"}),
            json!({"numcnpj": "22222222000122", "nomfantasia": "B"}),
            json!({"numcnpj": "11111111000111", "nomfantasia": "A2"}),
        ];

        let outcome = ReconciliationEngine::new(StoreFeed::Cigam).reconcile(&raw, &lookup());

        let names: Vec<_> = outcome.batch.rows.iter().map(|r| r.display_name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["A2", "B"]);
        assert_eq!(outcome.active_keys, vec!["11111111000111", "22222222000122"]);
    }

    #[test]
    fn test_invalid_records_are_counted_not_fatal() {
        let raw = vec![
            json!({"numcnpj": "123", "nomfantasia": "Too short"}),
            json!("garbage"),
            json!({"numcnpj": "11222333000181", "nomfantasia": "Loja LPF"}),
        ];

        let outcome = ReconciliationEngine::new(StoreFeed::Cigam).reconcile(&raw, &lookup());

        assert_eq!(outcome.stats.received, 3);
        assert_eq!(outcome.stats.invalid, 2);
        assert_eq!(outcome.stats.emitted, 1);
        assert_eq!(outcome.batch.rows[0].franchise_id, Some(1));
    }

    #[test]
    fn test_cigam_id_key_drops_rows_without_code() {
        let raw = vec![
            json!({"numcnpj": "11111111000111", "nomfantasia": "A", "codempresa": "7"}),
            json!({"numcnpj": "22222222000122", "nomfantasia": "B"}),
            json!({"numcnpj": "33333333000133", "nomfantasia": "A moved", "codempresa": 7}),
        ];

        let outcome = ReconciliationEngine::new(StoreFeed::Cigam)
            .with_natural_key(NaturalKey::CigamId)
            .reconcile(&raw, &lookup());

        assert_eq!(outcome.batch.natural_key, NaturalKey::CigamId);
        assert_eq!(outcome.stats.missing_key, 1);
        assert_eq!(outcome.active_keys, vec!["7"]);
        assert_eq!(outcome.batch.rows[0].cnpj, "33333333000133");
    }

    #[test]
    fn test_feed_policies() {
        let cigam = ReconciliationEngine::new(StoreFeed::Cigam).reconcile(&[], &lookup());
        assert_eq!(cigam.batch.natural_key, NaturalKey::Cnpj);
        assert_eq!(
            cigam.batch.insert_fields,
            vec![StoreField::Cnpj, StoreField::CigamId, StoreField::Name, StoreField::FranchiseId]
        );
        assert_eq!(cigam.batch.update_fields, vec![StoreField::Name, StoreField::FranchiseId]);
        assert!(cigam.batch.is_empty());

        let ecomm = ReconciliationEngine::new(StoreFeed::Ecommerce).reconcile(&[], &lookup());
        assert_eq!(ecomm.batch.insert_fields, vec![StoreField::Cnpj, StoreField::Status]);
        assert_eq!(ecomm.batch.update_fields, vec![StoreField::Status]);
    }

    #[test]
    fn test_ecommerce_batch() {
        let raw = vec![
            json!({"cnpj": "11222333000181", "status": true}),
            json!({"cnpj": "11.222.333/0001-81", "status": 0}),
            json!({"cnpj": null, "status": true}),
        ];

        let outcome = ReconciliationEngine::new(StoreFeed::Ecommerce).reconcile(&raw, &FranchiseLookup::new());

        assert_eq!(outcome.batch.len(), 1);
        assert_eq!(outcome.batch.rows[0].status, Some(false));
        assert_eq!(outcome.batch.rows[0].franchise_id, None);
        assert_eq!(outcome.stats.unresolved_franchise, 0);
        assert_eq!(outcome.stats.invalid, 1);
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let raw = vec![
            json!({"numcnpj": "11111111000111", "nomfantasia": "Loja FRQ"}),
            json!({"numcnpj": "11111111000111", "nomfantasia": "Loja FRQ 2"}),
        ];
        let engine = ReconciliationEngine::new(StoreFeed::Cigam);

        assert_eq!(engine.reconcile(&raw, &lookup()), engine.reconcile(&raw, &lookup()));
    }
}
