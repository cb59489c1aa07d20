mod error;
mod grid;
mod index;

pub use error::{valid_range, Result, SweepError};
pub use grid::{Condition, Grid, GridSpec, ParameterTuple, IGNORED_ALPHA};
pub use index::{resolve_array_index, resolve_indices};

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Idempotent `mkdir -p`.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Digest of a JSON value with object keys in sorted order.
pub fn canonical_json_digest(value: &Value) -> String {
    let bytes = serde_json::to_vec(&sort_keys(value)).unwrap_or_default();
    sha256_bytes(&bytes)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
