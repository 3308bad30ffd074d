//! # Seed Queue Generator
//!
//! Populates a local queue database with field work-order mutations for
//! development of the portal's sync status views.
//!
//! ## Usage
//! ```bash
//! # Queue 50 mutations (default)
//! cargo run -p fieldops-sync --bin seed
//!
//! # Queue a custom amount
//! cargo run -p fieldops-sync --bin seed -- --count 500
//!
//! # Specify database path
//! cargo run -p fieldops-sync --bin seed -- --db ./data/queue.db
//! ```
//!
//! ## Generated Mutations
//! Cycles over utility asset classes (poles, meters, valves, hydrants,
//! transformers). Each asset gets a create, then an update keyed on the
//! asset tag, and every fifth asset is later deleted.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use fieldops_core::Action;
use fieldops_db::{Database, DbConfig};
use fieldops_sync::{
    init_tracing, ConnectivityMonitor, ConnectivityState, QueueFacade, RemoteFailure,
    RemoteOutcome, RemoteStore, SyncConfig,
};

/// Asset classes and the field crews that service them.
const ASSETS: &[(&str, &str)] = &[
    ("POLE", "line-crew-3"),
    ("MTR", "meter-crew-1"),
    ("VLV", "water-crew-2"),
    ("HYD", "water-crew-5"),
    ("XFMR", "substation-crew-4"),
];

/// Work-order statuses cycled through on updates.
const STATUSES: &[&str] = &["inspected", "repaired", "replaced", "flagged"];

/// Stand-in remote. The seeded queue is never synced.
struct DetachedRemote;

#[async_trait]
impl RemoteStore for DetachedRemote {
    async fn apply(
        &self,
        _action: Action,
        _target_key: Option<&str>,
        _record: &Value,
        _timeout: Duration,
    ) -> RemoteOutcome {
        RemoteOutcome::TransientFailure(RemoteFailure::network("seed queue has no remote"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./fieldops_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("FieldOps Offline Queue Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of mutations to queue (default: 50)");
                println!("  -d, --db <PATH>    Database file path (default: ./fieldops_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("FieldOps Offline Queue Seeder");
    println!("=============================");
    println!("Database:  {}", db_path);
    println!("Mutations: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let config = SyncConfig::default();

    let queue = QueueFacade::open(
        Arc::new(db.kv()),
        Arc::new(DetachedRemote),
        ConnectivityMonitor::new(ConnectivityState::Offline),
        &config,
    )
    .await?;

    let existing = queue.counts().await.total();
    if existing > 0 {
        println!("⚠ Queue already has {} pending operations", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Queueing mutations...");

    let start = std::time::Instant::now();
    let mut queued = 0;
    let mut asset = 0;

    while queued < count {
        let (class, crew) = ASSETS[asset % ASSETS.len()];
        let tag = format!("{}-{:05}", class, 10_000 + asset);

        for (action, target, record) in mutations_for(asset, &tag, crew) {
            if queued >= count {
                break;
            }
            queue.enqueue(action, target, record).await?;
            queued += 1;
        }

        asset += 1;
    }

    let elapsed = start.elapsed();
    let counts = queue.counts().await;
    println!();
    println!("✓ Queued {} mutations in {:?}", queued, elapsed);
    println!(
        "  create: {}  update: {}  delete: {}",
        counts.create, counts.update, counts.delete
    );

    db.close().await;

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// The mutations a technician would record against one asset.
fn mutations_for(index: usize, tag: &str, crew: &str) -> Vec<(Action, Option<String>, Value)> {
    let mut ops = vec![
        (
            Action::Create,
            None,
            json!({
                "asset_tag": tag,
                "crew": crew,
                "lat": 41.0 + (index % 100) as f64 * 0.001,
                "lon": -87.0 - (index % 50) as f64 * 0.001,
            }),
        ),
        (
            Action::Update,
            Some(tag.to_string()),
            json!({
                "status": STATUSES[index % STATUSES.len()],
                "notes": format!("visit {} by {}", index + 1, crew),
            }),
        ),
    ];

    if index % 5 == 4 {
        ops.push((Action::Delete, Some(tag.to_string()), json!({})));
    }

    ops
}
