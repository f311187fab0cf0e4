//! CLI `embed` command: run the pipeline once and print the result as JSON.

use anyhow::{Context, Result};

use embedviz::config::EmbedvizConfig;

/// Embed `text` with `model` and write the pipeline result to stdout.
pub async fn embed(config: &EmbedvizConfig, model: &str, text: &str, pretty: bool) -> Result<()> {
    let pipeline = embedviz::server::build_pipeline(config)?;

    let result = pipeline
        .run(model, text)
        .await
        .with_context(|| format!("embedding with {model} failed"))?;

    let json = if pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    }
    .context("failed to serialize result")?;

    println!("{json}");
    Ok(())
}
