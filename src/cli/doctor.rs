//! CLI `doctor` command: report which providers are usable without printing secrets.

use std::path::Path;

use anyhow::Result;

use embedviz::config::{default_config_path, EmbedvizConfig};
use embedviz::embedding::{EmbeddingService, ProviderSelector};

/// Print a configuration report. `config_path` is the `--config` override, if any.
pub fn doctor(config: &EmbedvizConfig, config_path: Option<&Path>) -> Result<()> {
    println!("embedviz configuration report");
    println!("=============================");
    println!();
    match config_path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) if path.exists() => println!("Config file:       {}", path.display()),
        Some(path) => println!("Config file:       {} (not found, using defaults)", path.display()),
        None => println!("Config file:       (no home directory)"),
    }
    println!("Listen address:    {}", config.bind_addr());
    println!("Log level:         {}", config.server.log_level);
    println!("Delimiter:         {:?}", config.pipeline.delimiter);
    println!("Empty labels:      {:?}", config.pipeline.empty_labels);
    println!();

    let providers = &config.providers;
    println!("Providers:");
    for selector in ProviderSelector::ALL {
        let (model, missing) = match selector {
            ProviderSelector::OpenAi => (
                providers.openai.model.as_str(),
                missing(&[("OPENAI_API_KEY", providers.openai.api_key.is_some())]),
            ),
            ProviderSelector::Gemini => (
                providers.gemini.model.as_str(),
                missing(&[("GOOGLE_API_KEY", providers.gemini.api_key.is_some())]),
            ),
            ProviderSelector::Cloudflare => (
                providers.cloudflare.model.as_str(),
                missing(&[
                    ("CLOUDFLARE_API_KEY", providers.cloudflare.api_key.is_some()),
                    ("CLOUDFLARE_ACCOUNT_ID", providers.cloudflare.account_id.is_some()),
                ]),
            ),
        };

        if missing.is_empty() {
            println!("  {:<12} {:<32} configured", selector.as_str(), model);
        } else {
            println!(
                "  {:<12} {:<32} missing {}",
                selector.as_str(),
                model,
                missing.join(", ")
            );
        }
    }
    println!();

    match EmbeddingService::from_config(providers) {
        Ok(service) if service.available().is_empty() => {
            println!("Status:            no provider is usable");
        }
        Ok(service) => {
            let names: Vec<&str> = service.available().iter().map(|s| s.as_str()).collect();
            println!("Status:            OK ({})", names.join(", "));
        }
        Err(e) => println!("Status:            FAILED ({e})"),
    }

    Ok(())
}

fn missing<'a>(checks: &[(&'a str, bool)]) -> Vec<&'a str> {
    checks
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
}
