// src/services/mapper.rs

use serde_json::{json, Value};

use crate::types::{EntityType, LookupMap, MappedRecord, SourceRecord};
use crate::utils::helpers::{inactive_to_is_active, non_empty_str, safe_parse_float, safe_parse_u32};
use crate::EXTERNAL_SOURCE;

/// Default table type when the source omits one.
const DEFAULT_TABLE_TYPE: &str = "standard";

/// A record that could not be mapped or failed validation. Carries the
/// batch index and source id so operators can find the offending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingError {
    pub index: usize,
    pub external_id: String,
    pub messages: Vec<String>,
}

/// Outcome of mapping and validating one batch. Invariant:
/// `results.len() + errors.len() == total_processed`.
#[derive(Debug, Clone, Default)]
pub struct MapBatchOutcome {
    pub results: Vec<MappedRecord>,
    pub errors: Vec<MappingError>,
    pub success_count: usize,
    pub error_count: usize,
    pub total_processed: usize,
}

/// Reads a display-string field. Strings and numbers are accepted; other
/// present types are a structural surprise worth failing the record over.
fn string_field(record: &SourceRecord, key: &str) -> Result<String, String> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(format!("field {} has unsupported type: {}", key, other)),
    }
}

/// Resolves a relationship through a lookup map. Absence from the map is
/// not an error; the relationship field is simply omitted.
fn resolve_relation(
    mapped: &mut MappedRecord,
    target_field: &str,
    record: &SourceRecord,
    source_field: &str,
    lookup: &LookupMap,
) {
    let Some(source_id) = non_empty_str(record.get(source_field)) else {
        return;
    };
    if let Some(target_key) = lookup.get(&source_id) {
        mapped.insert(target_field, json!(target_key));
    }
}

/// Transforms one source record into its target-store representation for
/// the given entity type.
pub fn map_record(
    record: &SourceRecord,
    entity: EntityType,
    branch_lookup: &LookupMap,
    category_lookup: &LookupMap,
) -> Result<MappedRecord, String> {
    let mut mapped = MappedRecord::new();
    mapped.insert("external_id", json!(record.external_id));
    mapped.insert("external_source", json!(EXTERNAL_SOURCE));
    mapped.insert("name", json!(string_field(record, "Name")?));
    mapped.insert(
        "is_active",
        json!(inactive_to_is_active(record.get("Inactive"))),
    );

    match entity {
        EntityType::Branches => {
            mapped.insert("code", json!(string_field(record, "Code")?));
            mapped.insert("address", json!(string_field(record, "Address")?));
        }
        EntityType::Categories => {
            mapped.insert("code", json!(string_field(record, "Code")?));
            mapped.insert("description", json!(string_field(record, "Description")?));
        }
        EntityType::MenuItems => {
            mapped.insert("code", json!(string_field(record, "Code")?));
            mapped.insert("description", json!(string_field(record, "Description")?));
            mapped.insert("unit", json!(string_field(record, "UnitName")?));
            let price = record
                .get("Price")
                .map(|v| safe_parse_float(v, 0.0))
                .unwrap_or(0.0);
            mapped.insert("price", json!(price));
            let preparation = record
                .get("PreparationTime")
                .map(|v| safe_parse_u32(v, 0))
                .unwrap_or(0);
            mapped.insert("preparation_time", json!(preparation));
            resolve_relation(&mut mapped, "branch", record, "BranchId", branch_lookup);
            resolve_relation(
                &mut mapped,
                "category",
                record,
                "CategoryId",
                category_lookup,
            );
        }
        EntityType::Tables => {
            let capacity = record
                .get("Capacity")
                .map(|v| safe_parse_u32(v, 0))
                .unwrap_or(0);
            mapped.insert("capacity", json!(capacity));
            let table_type = non_empty_str(record.get("TableType"))
                .unwrap_or_else(|| DEFAULT_TABLE_TYPE.to_string());
            mapped.insert("table_type", json!(table_type));
            resolve_relation(&mut mapped, "branch", record, "BranchId", branch_lookup);
        }
    }

    Ok(mapped)
}

/// Entity-specific required-field and numeric-sign checks. Purely inspects
/// the record; returns the violated rules.
pub fn validate(record: &MappedRecord, entity: EntityType) -> Vec<String> {
    let mut errors = Vec::new();

    if record.external_id().is_empty() {
        errors.push("external_id must not be empty".to_string());
    }
    if record.get_str("name").unwrap_or_default().is_empty() {
        errors.push("name must not be empty".to_string());
    }

    match entity {
        EntityType::MenuItems => {
            if record.get_f64("price").unwrap_or(0.0) < 0.0 {
                errors.push("price must be >= 0".to_string());
            }
        }
        EntityType::Tables => {
            if record.get_f64("capacity").unwrap_or(0.0) < 1.0 {
                errors.push("capacity must be >= 1".to_string());
            }
        }
        _ => {}
    }

    errors
}

/// Maps then validates every record independently. One record's failure is
/// captured into `errors` and does not stop the remaining records.
pub fn map_batch(
    records: &[SourceRecord],
    entity: EntityType,
    branch_lookup: &LookupMap,
    category_lookup: &LookupMap,
) -> MapBatchOutcome {
    let mut outcome = MapBatchOutcome {
        total_processed: records.len(),
        ..Default::default()
    };

    for (index, record) in records.iter().enumerate() {
        match map_record(record, entity, branch_lookup, category_lookup) {
            Ok(mapped) => {
                let violations = validate(&mapped, entity);
                if violations.is_empty() {
                    outcome.results.push(mapped);
                } else {
                    outcome.errors.push(MappingError {
                        index,
                        external_id: record.external_id.clone(),
                        messages: violations,
                    });
                }
            }
            Err(message) => {
                outcome.errors.push(MappingError {
                    index,
                    external_id: record.external_id.clone(),
                    messages: vec![message],
                });
            }
        }
    }

    outcome.success_count = outcome.results.len();
    outcome.error_count = outcome.errors.len();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::collections::HashMap;

    fn record(pairs: &[(&str, Value)]) -> SourceRecord {
        let mut fields = Map::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v.clone());
        }
        let external_id = fields
            .get("Id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        SourceRecord::new(external_id, fields)
    }

    fn empty_lookup() -> LookupMap {
        HashMap::new()
    }

    #[test]
    fn test_menu_item_mapping_pho_scenario() {
        let source = record(&[
            ("Id", json!("M1")),
            ("Name", json!("Pho")),
            ("Price", json!("95000")),
        ]);
        let mapped =
            map_record(&source, EntityType::MenuItems, &empty_lookup(), &empty_lookup()).unwrap();
        assert_eq!(mapped.external_id(), "M1");
        assert_eq!(mapped.get_str("name"), Some("Pho"));
        assert_eq!(mapped.get_f64("price"), Some(95000.0));
        assert_eq!(mapped.get_str("external_source"), Some("cukcuk"));
        assert_eq!(mapped.get("is_active"), Some(&json!(true)));
        assert!(validate(&mapped, EntityType::MenuItems).is_empty());
    }

    #[test]
    fn test_defaults_for_absent_fields() {
        let source = record(&[("Id", json!("M2")), ("Name", json!("Bun Cha"))]);
        let mapped =
            map_record(&source, EntityType::MenuItems, &empty_lookup(), &empty_lookup()).unwrap();
        assert_eq!(mapped.get_f64("price"), Some(0.0));
        assert_eq!(mapped.get_str("code"), Some(""));
        assert_eq!(mapped.get("preparation_time"), Some(&json!(0)));

        let table = record(&[("Id", json!("T1")), ("Name", json!("Table 1"))]);
        let mapped = map_record(&table, EntityType::Tables, &empty_lookup(), &empty_lookup()).unwrap();
        assert_eq!(mapped.get_str("table_type"), Some("standard"));
        assert_eq!(mapped.get("capacity"), Some(&json!(0)));
    }

    #[test]
    fn test_inactive_inversion_both_representations() {
        for inactive in [json!(true), json!(1), json!("1")] {
            let source = record(&[("Id", json!("B1")), ("Name", json!("Main")), ("Inactive", inactive)]);
            let mapped =
                map_record(&source, EntityType::Branches, &empty_lookup(), &empty_lookup()).unwrap();
            assert_eq!(mapped.get("is_active"), Some(&json!(false)));
        }
        for active in [json!(false), json!(0), json!("0")] {
            let source = record(&[("Id", json!("B1")), ("Name", json!("Main")), ("Inactive", active)]);
            let mapped =
                map_record(&source, EntityType::Branches, &empty_lookup(), &empty_lookup()).unwrap();
            assert_eq!(mapped.get("is_active"), Some(&json!(true)));
        }
    }

    #[test]
    fn test_relationship_resolution_and_omission() {
        let mut branch_lookup = HashMap::new();
        branch_lookup.insert("B1".to_string(), "uuid-branch-1".to_string());
        let category_lookup = empty_lookup();

        let source = record(&[
            ("Id", json!("M1")),
            ("Name", json!("Pho")),
            ("BranchId", json!("B1")),
            ("CategoryId", json!("C9")), // not in lookup
        ]);
        let mapped =
            map_record(&source, EntityType::MenuItems, &branch_lookup, &category_lookup).unwrap();
        assert_eq!(mapped.get_str("branch"), Some("uuid-branch-1"));
        assert!(mapped.get("category").is_none());
    }

    #[test]
    fn test_validation_rules() {
        let nameless = record(&[("Id", json!("M3")), ("Name", json!(""))]);
        let mapped =
            map_record(&nameless, EntityType::MenuItems, &empty_lookup(), &empty_lookup()).unwrap();
        let violations = validate(&mapped, EntityType::MenuItems);
        assert!(violations.iter().any(|v| v.contains("name")));

        let negative = record(&[("Id", json!("M4")), ("Name", json!("Pho")), ("Price", json!(-5))]);
        let mapped =
            map_record(&negative, EntityType::MenuItems, &empty_lookup(), &empty_lookup()).unwrap();
        assert!(validate(&mapped, EntityType::MenuItems)
            .iter()
            .any(|v| v.contains("price")));

        let tiny_table = record(&[("Id", json!("T2")), ("Name", json!("Bar")), ("Capacity", json!(0))]);
        let mapped =
            map_record(&tiny_table, EntityType::Tables, &empty_lookup(), &empty_lookup()).unwrap();
        assert!(validate(&mapped, EntityType::Tables)
            .iter()
            .any(|v| v.contains("capacity")));
    }

    #[test]
    fn test_map_batch_total_function_property() {
        let records = vec![
            record(&[("Id", json!("M1")), ("Name", json!("Pho")), ("Price", json!("95000"))]),
            record(&[("Id", json!("M2")), ("Name", json!(""))]), // validation failure
            record(&[("Id", json!("M3")), ("Name", json!({"bad": "shape"}))]), // mapping failure
            record(&[("Id", json!("M4")), ("Name", json!("Com Tam"))]),
        ];
        let outcome = map_batch(&records, EntityType::MenuItems, &empty_lookup(), &empty_lookup());

        assert_eq!(outcome.total_processed, 4);
        assert_eq!(outcome.results.len() + outcome.errors.len(), 4);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.error_count, 2);
        assert_eq!(outcome.errors[0].index, 1);
        assert_eq!(outcome.errors[1].index, 2);
        assert_eq!(outcome.errors[1].external_id, "M3");

        // Every surviving record satisfies the validation invariants
        for mapped in &outcome.results {
            assert!(!mapped.external_id().is_empty());
            assert!(!mapped.get_str("name").unwrap_or_default().is_empty());
            assert!(mapped.get_f64("price").unwrap_or(0.0) >= 0.0);
        }
    }

    #[test]
    fn test_malformed_price_coerces_to_zero() {
        let source = record(&[("Id", json!("M5")), ("Name", json!("Tea")), ("Price", json!("free"))]);
        let mapped =
            map_record(&source, EntityType::MenuItems, &empty_lookup(), &empty_lookup()).unwrap();
        assert_eq!(mapped.get_f64("price"), Some(0.0));
    }
}
