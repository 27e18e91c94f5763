//! Canonical JSON for model artifacts
//!
//! Registered artifacts are written with sorted object keys and no
//! whitespace, so the BLAKE3 hash of a model is stable across runs and
//! machines. The same helpers fingerprint training data for provenance.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json_value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Serialization(e.to_string()))?;

    let canonical = canonicalize_value(&json_value);
    serde_json::to_string(&canonical).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut btree = BTreeMap::new();
            for (k, v) in map {
                btree.insert(k.clone(), canonicalize_value(v));
            }
            serde_json::Value::Object(btree.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

/// BLAKE3 hash of the canonical JSON representation, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Artifact {
        trees: usize,
        feature_names: Vec<String>,
        params: HashMap<String, String>,
    }

    fn artifact(n_estimators: &str) -> Artifact {
        let mut params = HashMap::new();
        params.insert("n_estimators".to_string(), n_estimators.to_string());
        params.insert("max_depth".to_string(), "8".to_string());
        params.insert("bootstrap".to_string(), "true".to_string());
        Artifact {
            trees: 3,
            feature_names: vec!["HouseAge".to_string(), "MedInc_log".to_string()],
            params,
        }
    }

    #[test]
    fn test_keys_sorted_and_compact() {
        let json = to_canonical_json(&artifact("10")).unwrap();

        assert!(!json.contains('\n'));
        let feature_pos = json.find("feature_names").unwrap();
        let params_pos = json.find("params").unwrap();
        let trees_pos = json.find("trees").unwrap();
        assert!(feature_pos < params_pos && params_pos < trees_pos);

        let bootstrap_pos = json.find("bootstrap").unwrap();
        let depth_pos = json.find("max_depth").unwrap();
        assert!(bootstrap_pos < depth_pos);
    }

    #[test]
    fn test_hash_ignores_map_insertion_order() {
        let hash1 = hash_canonical_hex(&artifact("10")).unwrap();
        let hash2 = hash_canonical_hex(&artifact("10")).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_params() {
        let hash1 = hash_canonical_hex(&artifact("10")).unwrap();
        let hash2 = hash_canonical_hex(&artifact("11")).unwrap();
        assert_ne!(hash1, hash2);
    }
}
