// 🧹 Record Normalizer - raw feed rows → StoreCandidate
//
// A record either comes out fully clean or not at all: a CNPJ that does not
// reduce to exactly 14 digits drops the record. Dropping is not an error; the
// caller only counts it.

use crate::entities::{FranchiseAlias, StoreCandidate};
use serde_json::Value;

pub const CNPJ_LENGTH: usize = 14;

// Field names, first match wins.
const CIGAM_CNPJ_FIELDS: [&str; 2] = ["numcnpj", "cnpj"];
const CIGAM_NAME_FIELDS: [&str; 2] = ["nomfantasia", "name"];
const CIGAM_CODE_FIELDS: [&str; 2] = ["codempresa", "cigam_id"];

/// Keep only ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Canonical 14-digit CNPJ from a string or number, or `None`.
///
/// ```
/// use serde_json::json;
/// use store_sync::normalizer::normalize_cnpj;
///
/// assert_eq!(normalize_cnpj(&json!("12.345.678/0001-99")).as_deref(), Some("12345678000199"));
/// assert_eq!(normalize_cnpj(&json!("123")), None);
/// ```
pub fn normalize_cnpj(raw: &Value) -> Option<String> {
    let text = scalar_text(raw)?;
    let digits = digits_only(&text);
    (digits.len() == CNPJ_LENGTH).then_some(digits)
}

/// Classify a store name by the first marker found, in `LPF > FRQ > STD`
/// order. Names with no marker are `OUT`, whitespace-only ones included;
/// only an absent or empty name has no alias.
pub fn detect_franchise_alias(name: Option<&str>) -> Option<FranchiseAlias> {
    let name = name.filter(|n| !n.is_empty())?;
    let upper = name.to_uppercase();

    let alias = FranchiseAlias::MARKERS
        .into_iter()
        .find(|marker| upper.contains(marker.as_str()))
        .unwrap_or(FranchiseAlias::Out);
    Some(alias)
}

/// Cigam store row (`numcnpj`, `nomfantasia`, `codempresa`).
pub fn normalize_cigam_store(raw: &Value) -> Option<StoreCandidate> {
    let cnpj = first_field(raw, &CIGAM_CNPJ_FIELDS).and_then(normalize_cnpj)?;
    // Stored as Cigam sends it.
    let name = first_field(raw, &CIGAM_NAME_FIELDS)
        .and_then(scalar_text)
        .filter(|n| !n.is_empty());
    let external_id = first_field(raw, &CIGAM_CODE_FIELDS)
        .and_then(scalar_text)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut candidate = StoreCandidate::new(cnpj).with_alias(detect_franchise_alias(name.as_deref()));
    candidate.display_name = name;
    candidate.external_id = external_id;
    Some(candidate)
}

/// E-commerce catalog row (`cnpj`, `status`).
pub fn normalize_ecomm_store(raw: &Value) -> Option<StoreCandidate> {
    let cnpj = raw.get("cnpj").and_then(normalize_cnpj)?;
    let status = raw.get("status").and_then(parse_status);
    Some(StoreCandidate::new(cnpj).with_status(status))
}

/// Boolean status from `true/false`, `0/1` or common spellings.
pub fn parse_status(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "t" | "active" => Some(true),
            "false" | "0" | "f" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn first_field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| raw.get(*name).filter(|v| !v.is_null()))
}

fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_cnpj_formats() {
        assert_eq!(normalize_cnpj(&json!("12.345.678/0001-99")).as_deref(), Some("12345678000199"));
        assert_eq!(normalize_cnpj(&json!("12345678000199")).as_deref(), Some("12345678000199"));
        assert_eq!(normalize_cnpj(&json!(" 12 345 678 0001 99 ")).as_deref(), Some("12345678000199"));
        assert_eq!(normalize_cnpj(&json!(12345678000199_i64)).as_deref(), Some("12345678000199"));
    }

    #[test]
    fn test_normalize_cnpj_all_or_nothing() {
        let samples = [
            json!(""),
            json!("123"),
            json!("12.345.678/0001-9"),
            json!("12.345.678/0001-999"),
            json!("abc"),
            json!(null),
            json!(true),
            json!(["12345678000199"]),
            json!(1234567800019_i64),
        ];

        for raw in &samples {
            assert_eq!(normalize_cnpj(raw), None, "{raw}");
        }
        println!("✅ Partial CNPJs are dropped");
    }

    #[test]
    fn test_alias_precedence() {
        assert_eq!(detect_franchise_alias(Some("Loja FRQ LPF Shopping")), Some(FranchiseAlias::Lpf));
        assert_eq!(detect_franchise_alias(Some("std frq")), Some(FranchiseAlias::Frq));
        assert_eq!(detect_franchise_alias(Some("Loja STD Centro")), Some(FranchiseAlias::Std));
        assert_eq!(detect_franchise_alias(Some("XYZ Store")), Some(FranchiseAlias::Out));
        assert_eq!(detect_franchise_alias(Some("")), None);
        assert_eq!(detect_franchise_alias(Some("   ")), Some(FranchiseAlias::Out));
        assert_eq!(detect_franchise_alias(None), None);
    }

    #[test]
    fn test_normalize_cigam_store() {
        let raw = json!({
            "numcnpj": "12.345.678/0001-99",
            "nomfantasia": "  Loja LPF Paulista ",
            "codempresa": 42
        });

        let candidate = normalize_cigam_store(&raw).unwrap();
        assert_eq!(candidate.cnpj, "12345678000199");
        assert_eq!(candidate.display_name.as_deref(), Some("  Loja LPF Paulista "));
        assert_eq!(candidate.external_id.as_deref(), Some("42"));
        assert_eq!(candidate.franchise_alias, Some(FranchiseAlias::Lpf));
        assert_eq!(candidate.franchise_id, None);
    }

    #[test]
    fn test_normalize_cigam_store_generic_fields() {
        let candidate = normalize_cigam_store(&json!({"cnpj": "12345678000199", "name": "Loja STD Centro"})).unwrap();

        assert_eq!(candidate.display_name.as_deref(), Some("Loja STD Centro"));
        assert_eq!(candidate.franchise_alias, Some(FranchiseAlias::Std));
        assert_eq!(candidate.external_id, None);
    }

    #[test]
    fn test_normalize_cigam_store_drops_bad_cnpj() {
        assert_eq!(normalize_cigam_store(&json!({"numcnpj": "999", "nomfantasia": "Loja"})), None);
        assert_eq!(normalize_cigam_store(&json!({"nomfantasia": "Loja"})), None);
        assert_eq!(normalize_cigam_store(&json!("not an object")), None);
    }

    #[test]
    fn test_normalize_cigam_store_without_name() {
        let candidate = normalize_cigam_store(&json!({"numcnpj": "12345678000199", "nomfantasia": ""})).unwrap();

        assert_eq!(candidate.display_name, None);
        assert_eq!(candidate.franchise_alias, None);
    }

    #[test]
    fn test_normalize_cigam_store_whitespace_name() {
        let candidate = normalize_cigam_store(&json!({"numcnpj": "12345678000199", "nomfantasia": "   "})).unwrap();

        assert_eq!(candidate.display_name.as_deref(), Some("   "));
        assert_eq!(candidate.franchise_alias, Some(FranchiseAlias::Out));
    }

    #[test]
    fn test_normalize_ecomm_store() {
        let active = normalize_ecomm_store(&json!({"cnpj": "12.345.678/0001-99", "status": 1})).unwrap();
        assert_eq!(active.cnpj, "12345678000199");
        assert_eq!(active.status, Some(true));
        assert_eq!(active.display_name, None);

        let unknown = normalize_ecomm_store(&json!({"cnpj": "12345678000199", "status": "maybe"})).unwrap();
        assert_eq!(unknown.status, None);

        assert_eq!(normalize_ecomm_store(&json!({"cnpj": null, "status": true})), None);
    }

    #[test]
    fn test_parse_status_spellings() {
        for raw in [json!(true), json!(1), json!("TRUE"), json!("t"), json!("Active"), json!("1")] {
            assert_eq!(parse_status(&raw), Some(true), "{raw}");
        }
        for raw in [json!(false), json!(0), json!("false"), json!("F"), json!("inactive"), json!("0")] {
            assert_eq!(parse_status(&raw), Some(false), "{raw}");
        }
        for raw in [json!(2), json!("yes?"), json!(null), json!(0.5)] {
            assert_eq!(parse_status(&raw), None, "{raw}");
        }
    }
}
