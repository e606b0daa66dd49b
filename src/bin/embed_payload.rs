//! Embedded Payload Normalizer
//!
//! Reads a schema and a nested API response from disk, flattens the
//! response and prints the normalized JSON (root plus sideload buckets).
//!
//! ## Configuration
//!
//! Environment variables:
//! - `EMBED_SCHEMA`: path to a JSON array of type descriptors (required)
//! - `EMBED_PAYLOAD`: path to the response JSON (required)
//! - `EMBED_ROOT_TYPE`: type name of the root record(s) (required)
//! - `EMBED_MANY`: "1"/"true" to read a multi-root payload (default: false)
//! - `EMBED_CLIENT_ID_KEY`, `EMBED_MAX_DEPTH`: see [`EmbedConfig`]
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! EMBED_SCHEMA=schema.json EMBED_PAYLOAD=response.json EMBED_ROOT_TYPE=homePlanet \
//!     cargo run --bin embed_payload --features cli
//! ```

use std::path::PathBuf;
use std::time::Instant;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use embedded_records::{
    EmbedConfig, EmbeddedSerializer, InMemoryRecordStore, KeyTransform, PayloadNode, SchemaRegistry,
    UnderscoreKeys,
};

/// Initialize the tracing subscriber with JSON or pretty format.
///
/// Logs go to stderr so stdout carries only the normalized payload.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "embed_payload=info,embedded_records=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn required_var(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            tracing::error!(var = name, "required environment variable not set");
            Err(format!("{name} must be set").into())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let schema_path = PathBuf::from(required_var("EMBED_SCHEMA")?);
    let payload_path = PathBuf::from(required_var("EMBED_PAYLOAD")?);
    let root_type = required_var("EMBED_ROOT_TYPE")?;
    let many = matches!(
        std::env::var("EMBED_MANY").as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    );
    let config = EmbedConfig::from_env()?;

    let schema: SchemaRegistry = serde_json::from_slice(&std::fs::read(&schema_path)?)?;
    schema.validate()?;
    info!(
        types = schema.len(),
        schema_fingerprint = %schema.fingerprint(),
        client_id_key = %config.client_id_key,
        max_depth = config.max_depth,
        "Schema loaded"
    );

    let payload: PayloadNode = serde_json::from_slice(&std::fs::read(&payload_path)?)?;

    let start = Instant::now();
    let serializer = EmbeddedSerializer::new(schema).with_config(config);
    let mut store = InMemoryRecordStore::new();
    let keys = UnderscoreKeys;

    let output = if many {
        let normalized = serializer.extract_collection(&mut store, &root_type, payload)?;
        info!(
            roots = normalized.roots.len(),
            sideloaded = normalized.sideloads.len(),
            "Payload normalized"
        );
        normalized.to_json(&keys)
    } else {
        let normalized = serializer.extract(&mut store, &root_type, payload)?;
        info!(
            root_key = %keys.root_key(&root_type),
            sideloaded = normalized.sideloads.len(),
            "Payload normalized"
        );
        normalized.to_json(&keys)
    };

    info!(
        latency_ms = start.elapsed().as_millis() as u64,
        records = store.len(),
        "done"
    );

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
