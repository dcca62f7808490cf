// 🏬 Store Entity - candidates from remote feeds and persisted rows
//
// A StoreCandidate is what one remote record becomes after cleaning. It only
// lives for one import run. A StoreRecord is a row of the `stores` table.

use super::franchise::FranchiseAlias;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// NATURAL KEY & COLUMNS
// ============================================================================

/// Business identifier used to match incoming rows with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalKey {
    #[default]
    Cnpj,
    CigamId,
}

impl NaturalKey {
    pub fn field(&self) -> StoreField {
        match self {
            NaturalKey::Cnpj => StoreField::Cnpj,
            NaturalKey::CigamId => StoreField::CigamId,
        }
    }

    pub fn column(&self) -> &'static str {
        self.field().column()
    }
}

/// Columns of `stores` an import may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreField {
    Cnpj,
    CigamId,
    Name,
    FranchiseId,
    Status,
}

impl StoreField {
    pub fn column(&self) -> &'static str {
        match self {
            StoreField::Cnpj => "cnpj",
            StoreField::CigamId => "cigam_id",
            StoreField::Name => "name",
            StoreField::FranchiseId => "franchise_id",
            StoreField::Status => "status",
        }
    }
}

impl fmt::Display for StoreField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ============================================================================
// CANDIDATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreCandidate {
    /// Cigam company code (`codempresa`).
    pub external_id: Option<String>,
    /// 14 digits, no punctuation.
    pub cnpj: String,
    pub display_name: Option<String>,
    pub franchise_alias: Option<FranchiseAlias>,
    pub franchise_id: Option<i64>,
    pub status: Option<bool>,
}

impl StoreCandidate {
    pub fn new(cnpj: impl Into<String>) -> Self {
        StoreCandidate {
            cnpj: cnpj.into(),
            ..Default::default()
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_alias(mut self, alias: Option<FranchiseAlias>) -> Self {
        self.franchise_alias = alias;
        self
    }

    pub fn with_status(mut self, status: Option<bool>) -> Self {
        self.status = status;
        self
    }

    /// Value of `key` for this candidate, if present.
    pub fn natural_key(&self, key: NaturalKey) -> Option<&str> {
        match key {
            NaturalKey::Cnpj => Some(self.cnpj.as_str()).filter(|c| !c.is_empty()),
            NaturalKey::CigamId => self.external_id.as_deref().filter(|id| !id.is_empty()),
        }
    }
}

// ============================================================================
// PERSISTED ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: i64,
    pub cnpj: String,
    pub cigam_id: Option<String>,
    pub franchise_id: Option<i64>,
    pub status: Option<bool>,
    pub name: Option<String>,
    pub name_legal: Option<String>,
    pub inaugurated_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl StoreRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_columns() {
        assert_eq!(NaturalKey::default(), NaturalKey::Cnpj);
        assert_eq!(NaturalKey::Cnpj.column(), "cnpj");
        assert_eq!(NaturalKey::CigamId.column(), "cigam_id");
        assert_eq!(StoreField::FranchiseId.to_string(), "franchise_id");
    }

    #[test]
    fn test_candidate_natural_key() {
        let candidate = StoreCandidate::new("12345678000199").with_name("Loja STD Centro");

        assert_eq!(candidate.natural_key(NaturalKey::Cnpj), Some("12345678000199"));
        assert_eq!(candidate.natural_key(NaturalKey::CigamId), None);

        let with_code = candidate.with_external_id("042");
        assert_eq!(with_code.natural_key(NaturalKey::CigamId), Some("042"));
    }
}
