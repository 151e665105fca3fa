//! Quick connection check against the database named in the environment
//! Run with: cargo run --package berth-state --example check_connection

use berth_state::{StateStore, SurrealHandle, SurrealStateStore};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    println!("Testing SurrealDB connection...");

    let handle = match SurrealHandle::setup_from_env().await {
        Ok(handle) => Arc::new(handle),
        Err(e) => {
            eprintln!("\n✗ Connection failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("✓ Connected, schema initialized");

    let store = match SurrealStateStore::new(handle, "connection-check") {
        Ok(store) => store,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    let marker = serde_json::json!({ "roundtrip": true });
    if let Err(e) = store.put("roundtrip", marker.clone()).await {
        eprintln!("✗ Write failed: {}", e);
        std::process::exit(1);
    }
    match store.get("roundtrip").await {
        Ok(Some(value)) if value == marker => println!("✓ Round trip succeeded"),
        Ok(other) => {
            eprintln!("✗ Unexpected read-back: {:?}", other);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("✗ Read failed: {}", e);
            std::process::exit(1);
        }
    }
}
