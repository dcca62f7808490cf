// 🏷️ Franchise Entity - alias codes and the per-run lookup
//
// Store names carry a marker telling who operates the store. The marker maps
// to a franchise row by alias:
//   LPF → LPF-operated, FRQ → franchisee, STD → standard, OUT → anything else

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// FRANCHISE ALIAS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FranchiseAlias {
    Lpf,
    Frq,
    Std,
    Out,
}

impl FranchiseAlias {
    /// Markers searched in a store name, highest precedence first.
    pub const MARKERS: [FranchiseAlias; 3] = [FranchiseAlias::Lpf, FranchiseAlias::Frq, FranchiseAlias::Std];

    pub fn as_str(&self) -> &'static str {
        match self {
            FranchiseAlias::Lpf => "LPF",
            FranchiseAlias::Frq => "FRQ",
            FranchiseAlias::Std => "STD",
            FranchiseAlias::Out => "OUT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LPF" => Some(FranchiseAlias::Lpf),
            "FRQ" => Some(FranchiseAlias::Frq),
            "STD" => Some(FranchiseAlias::Std),
            "OUT" => Some(FranchiseAlias::Out),
            _ => None,
        }
    }
}

impl fmt::Display for FranchiseAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FRANCHISE
// ============================================================================

/// Row of the `franchises` table, as far as imports care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Franchise {
    pub id: i64,
    pub alias: Option<String>,
    pub name: Option<String>,
    pub status: Option<bool>,
}

impl Franchise {
    pub fn new(id: i64, alias: &str) -> Self {
        Franchise {
            id,
            alias: Some(alias.to_string()),
            name: None,
            status: Some(true),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

// ============================================================================
// LOOKUP
// ============================================================================

/// Alias → franchise map, loaded once per import run.
#[derive(Debug, Clone, Default)]
pub struct FranchiseLookup {
    by_alias: HashMap<String, Franchise>,
}

impl FranchiseLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index franchises by alias. Rows without an alias are skipped and a
    /// later row with the same alias replaces an earlier one.
    pub fn from_franchises(franchises: impl IntoIterator<Item = Franchise>) -> Self {
        let mut by_alias = HashMap::new();
        for franchise in franchises {
            let Some(alias) = franchise.alias.as_deref().map(str::trim).filter(|a| !a.is_empty()) else {
                continue;
            };
            by_alias.insert(alias.to_ascii_uppercase(), franchise);
        }
        FranchiseLookup { by_alias }
    }

    pub fn get(&self, alias: &str) -> Option<&Franchise> {
        self.by_alias.get(&alias.trim().to_ascii_uppercase())
    }

    /// Franchise id for a detected alias, if one is registered.
    pub fn resolve(&self, alias: FranchiseAlias) -> Option<i64> {
        self.by_alias.get(alias.as_str()).map(|f| f.id)
    }

    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}
