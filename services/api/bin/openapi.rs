//! Writes the API's OpenAPI document, by default to `openapi.json`.

use anyhow::Context;
use std::path::PathBuf;
use utoipa::OpenApi;
use workky_api::router::ApiDoc;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("openapi.json"));

    let document = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialize the OpenAPI document")?;
    std::fs::write(&path, document)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(())
}
