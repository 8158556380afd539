//! Pending command implementation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tenantry_storage::FileStore;
use tenantry_sync_engine::{QueueStore, DEFAULT_QUEUE_KEY};
use tenantry_sync_protocol::{EntityType, PendingChange};

/// Queue listing result.
#[derive(Debug, Serialize)]
pub struct PendingReport {
    /// Store path.
    pub path: String,
    /// Number of queued changes.
    pub total: usize,
    /// Queued changes per entity type.
    pub by_entity: BTreeMap<EntityType, usize>,
    /// Queued changes in replay order.
    pub changes: Vec<PendingChange>,
}

/// Runs the pending command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Reads the queue without taking the store lock.
pub fn collect(path: &Path) -> Result<PendingReport, Box<dyn std::error::Error>> {
    let store = Arc::new(FileStore::open_unlocked(path)?);
    let queue = QueueStore::new(store, DEFAULT_QUEUE_KEY).load()?;

    Ok(PendingReport {
        path: path.display().to_string(),
        total: queue.len(),
        by_entity: queue.counts_by_entity(),
        changes: queue.drain_order(),
    })
}

fn print_text_output(report: &PendingReport) {
    println!("Offline Store: {}", report.path);
    println!();
    println!("Pending changes: {}", report.total);
    for (entity, count) in &report.by_entity {
        println!("  {entity:<14} {count}");
    }

    if report.changes.is_empty() {
        return;
    }

    println!();
    println!("{:<4} {:<22} {:<38} {:>14}", "#", "Change", "Record", "Created");
    println!("{:-<4} {:-<22} {:-<38} {:->14}", "", "", "", "");
    for (i, change) in report.changes.iter().enumerate() {
        println!(
            "{:<4} {:<22} {:<38} {:>14}",
            i + 1,
            change.label(),
            change.record_id,
            change.created_at
        );
    }
}
