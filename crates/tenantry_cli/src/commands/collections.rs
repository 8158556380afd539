//! Collections command implementation.

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tenantry_storage::{FileStore, LocalStore};
use tenantry_sync_protocol::{is_provisional, record_id_of, EntityType};

/// Statistics for a single collection snapshot.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Entity type.
    pub entity_type: EntityType,
    /// Store key of the snapshot.
    pub key: &'static str,
    /// Whether a snapshot has been stored.
    pub present: bool,
    /// Number of records.
    pub records: usize,
    /// Records still carrying a provisional id.
    pub provisional: usize,
}

/// Runs the collections command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stats = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => {
            println!("Offline Store: {}", path.display());
            println!();
            println!("{:<14} {:>8} {:>12}", "Collection", "Records", "Provisional");
            println!("{:-<14} {:->8} {:->12}", "", "", "");
            for s in &stats {
                if s.present {
                    println!("{:<14} {:>8} {:>12}", s.key, s.records, s.provisional);
                } else {
                    println!("{:<14} {:>8} {:>12}", s.key, "-", "-");
                }
            }
        }
    }

    Ok(())
}

/// Counts the records of every collection snapshot.
pub fn collect(path: &Path) -> Result<Vec<CollectionStats>, Box<dyn std::error::Error>> {
    let store = FileStore::open_unlocked(path)?;

    let mut stats = Vec::with_capacity(EntityType::ALL.len());
    for entity_type in EntityType::ALL {
        let key = entity_type.collection_key();
        let records = match store.get(key)? {
            Some(Value::Array(records)) => Some(records),
            Some(_) => {
                tracing::warn!(key, "collection snapshot is not an array");
                Some(Vec::new())
            }
            None => None,
        };

        stats.push(CollectionStats {
            entity_type,
            key,
            present: records.is_some(),
            records: records.as_ref().map_or(0, Vec::len),
            provisional: records.as_ref().map_or(0, |r| {
                r.iter()
                    .filter_map(record_id_of)
                    .filter(|id| is_provisional(id))
                    .count()
            }),
        });
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_records_and_provisional_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .set(
                "properties",
                &json!([{"id": "p1"}, {"id": "local-1f2e"}, {"id": 7}]),
            )
            .unwrap();

        let stats = collect(dir.path()).unwrap();
        let properties = stats
            .iter()
            .find(|s| s.entity_type == EntityType::Property)
            .unwrap();
        assert!(properties.present);
        assert_eq!(properties.records, 3);
        assert_eq!(properties.provisional, 1);

        let tenants = stats
            .iter()
            .find(|s| s.entity_type == EntityType::Tenant)
            .unwrap();
        assert!(!tenants.present);
    }
}
