//! Preferences persisted to a JSON file between runs.
//!
//! Run it twice: the second run starts from what the first one saved.

use serde::{Deserialize, Serialize};
use stowage::storage::FileStore;
use stowage::{Config, Hub};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Window {
    width: u32,
    height: u32,
}

fn main() -> stowage::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stowage=info")),
        )
        .init();

    let path = std::env::temp_dir().join("stowage-demo.json");
    let config = Config::from_json(r#"{ "namespace": "demo" }"#)?;
    let hub = Hub::with_config(FileStore::open(&path)?, config);

    let runs = hub.number("runs", Some(0.0));
    let window = hub.object(
        "window",
        Some(Window {
            width: 800,
            height: 600,
        }),
    );

    println!("store: {}", path.display());
    println!("previous runs: {:?}", runs.get());
    println!("window: {:?}", window.get());

    runs.update(|n| *n = Some(n.unwrap_or(0.0) + 1.0));
    window.update(|w| {
        if let Some(w) = w {
            w.width += 10;
        }
    });

    Ok(())
}
