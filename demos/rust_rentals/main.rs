//! Tenantry Example - Offline Rentals
//!
//! This example walks through a client losing and regaining its backend:
//! - Writing properties and tenants while offline
//! - Deduplicating repeated edits in the pending queue
//! - Cancelling an offline create with a delete
//! - Automatic sync after the network comes back
//! - Refetching collections that received backend ids
//!
//! Run with: cargo run -p rust_rentals

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tenantry_storage::FileStore;
use tenantry_sync_engine::{
    ManualNetworkSignal, MockProbe, MockRemote, RemoteRegistry, SyncConfig, SyncManager,
    SyncStatus, WriteOutcome,
};
use tenantry_sync_protocol::EntityType;
use tracing_subscriber::EnvFilter;

fn print_status(label: &str, status: &SyncStatus) {
    println!(
        "[{label}] online={} syncing={} pending={} errors={:?}",
        status.is_online, status.is_syncing, status.pending_count, status.errors
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Tenantry Offline Rentals Example ===\n");

    let dir = tempfile::tempdir()?;
    let store = Arc::new(FileStore::open(dir.path())?);
    println!("Offline store at {:?}\n", dir.path());

    // In-process stand-ins for the hosted backend
    let properties_backend = Arc::new(MockRemote::new(EntityType::Property));
    let tenants_backend = Arc::new(MockRemote::new(EntityType::Tenant));
    let probe = Arc::new(MockProbe::new(false));
    let network = Arc::new(ManualNetworkSignal::new(false));

    let registry = RemoteRegistry::new()
        .with(EntityType::Property, properties_backend.clone())
        .with(EntityType::Tenant, tenants_backend.clone());

    let config = SyncConfig::default()
        .with_settle_delay(Duration::from_millis(300))
        .with_probe_interval(Duration::from_secs(5));

    let manager = SyncManager::new(config, store, registry, probe.clone(), network.clone());
    manager.start();
    print_status("start", &manager.status());

    // Offline writes
    println!("\n--- Writing while offline ---");
    let properties = manager.collection(EntityType::Property);
    let tenants = manager.collection(EntityType::Tenant);

    let (elm, _) = properties
        .create(json!({"name": "12 Elm Street", "rent": 950}))
        .await?;
    let elm_id = elm["id"].as_str().unwrap_or_default().to_string();
    println!("Created property {elm_id}");

    let (scratch, _) = properties.create(json!({"name": "Scratch entry"})).await?;
    let scratch_id = scratch["id"].as_str().unwrap_or_default().to_string();

    tenants.replace_all(vec![json!({"id": "t-17", "name": "Ana", "phone": "555-0100"})]);
    tenants.update("t-17", json!({"name": "Ana", "phone": "555-0101"})).await?;
    tenants.update("t-17", json!({"name": "Ana", "phone": "555-0199"})).await?;
    println!("Edited tenant t-17 twice (one queue entry expected)");

    match properties.delete(&scratch_id).await? {
        WriteOutcome::Queued(recorded) => println!("Deleted {scratch_id}: {recorded:?}"),
        WriteOutcome::Confirmed => println!("Deleted {scratch_id} on the backend"),
    }

    for change in manager.pending_changes()? {
        println!("  queued: {} {}", change.label(), change.record_id);
    }
    print_status("offline", &manager.status());

    // Reconnect
    println!("\n--- Network restored ---");
    let mut rx = manager.subscribe_status();
    probe.set_reachable(true);
    network.go_online();

    let status = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = rx.borrow_and_update().clone();
            if status.last_sync_time.is_some() && !status.is_syncing {
                return status;
            }
            if rx.changed().await.is_err() {
                return status;
            }
        }
    })
    .await?;
    print_status("synced", &status);

    if let Some(cycle) = &status.last_cycle {
        println!(
            "Cycle: {:?}, {} attempted, {} delivered, refetch {:?}",
            cycle.outcome, cycle.attempted, cycle.succeeded, cycle.refetch
        );
        if cycle.refetch.contains(&EntityType::Property) {
            properties.replace_all(properties_backend.records().into_values().collect());
        }
    }

    println!("\n--- Local properties after refetch ---");
    for record in properties.list() {
        println!("  {} {}", record["id"], record["name"]);
    }
    println!("Backend tenant t-17: {:?}", tenants_backend.records().get("t-17"));

    manager.stop();
    println!("\n=== Example Complete ===");
    Ok(())
}
