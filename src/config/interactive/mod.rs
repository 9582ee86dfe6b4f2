
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password};
use std::path::Path;

use super::{Config, ConfigError, LlmConfig, WikiConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 ops-rag Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Wiki").bold().yellow());
    eprintln!("Where documentation pages are fetched from.");
    eprintln!();
    configure_wiki(&mut config.wiki)?;

    eprintln!();
    eprintln!("{}", style("Model provider").bold().yellow());
    eprintln!("OpenAI-compatible endpoint used for embeddings and chat completions.");
    eprintln!();
    configure_llm(&mut config.llm)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Wiki:").bold().yellow());
    eprintln!("  Domain: {}", style(&config.wiki.domain).cyan());
    eprintln!("  Username: {}", style(&config.wiki.username).cyan());
    eprintln!("  Password: {}", style(mask(&config.wiki.password)).cyan());

    eprintln!();
    eprintln!("{}", style("Models:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.llm.base_url).cyan());
    eprintln!("  API key: {}", style(mask(&config.llm.api_key)).cyan());
    eprintln!(
        "  Embedding: {} ({} dimensions)",
        style(&config.embedding.model).cyan(),
        style(config.embedding.dimension).cyan()
    );
    eprintln!("  Chat: {}", style(&config.chat.model).cyan());

    eprintln!();
    eprintln!("{}", style("Vector database:").bold().yellow());
    eprintln!(
        "  Path: {}",
        style(config.vector_database_path().display()).cyan()
    );
    eprintln!("  Collection: {}", style(&config.vector_db.collection).cyan());
    eprintln!(
        "  Chunking: {} tokens, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.overlap).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_wiki(wiki: &mut WikiConfig) -> Result<()> {
    let domain: String = Input::new()
        .with_prompt("Wiki URL")
        .default(wiki.domain.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = WikiConfig {
                domain: input.clone(),
                ..WikiConfig::default()
            };
            candidate.base_url().map(|_| ())
        })
        .interact_text()?;

    let username: String = Input::new()
        .with_prompt("Wiki username")
        .default(wiki.username.clone())
        .interact_text()?;

    let password = Password::new()
        .with_prompt("Wiki password (leave empty to keep current)")
        .allow_empty_password(true)
        .interact()?;

    wiki.domain = domain;
    wiki.username = username;
    if !password.is_empty() {
        wiki.password = password;
    }

    Ok(())
}

fn configure_llm(llm: &mut LlmConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(llm.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = LlmConfig {
                base_url: input.clone(),
                ..LlmConfig::default()
            };
            candidate.url().map(|_| ())
        })
        .interact_text()?;

    let api_key = Password::new()
        .with_prompt("API key (leave empty to keep current)")
        .allow_empty_password(true)
        .interact()?;

    llm.base_url = base_url;
    if !api_key.is_empty() {
        llm.api_key = api_key;
    }

    Ok(())
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "(not set)".to_string()
    } else {
        "********".to_string()
    }
}
