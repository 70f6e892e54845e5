//! Config command

use crate::app::OutputFormat;
use anyhow::Result;
use ragguard_core::Config;

const REDACTED: &str = "<redacted>";

pub fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let shown = redacted(config);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Cli => print!("{}", serde_yaml::to_string(&shown)?),
    }
    Ok(())
}

fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    for secret in [
        &mut shown.llm_service.api_key,
        &mut shown.search_service.api_key,
        &mut shown.audit.hash_key,
    ] {
        if secret.is_some() {
            *secret = Some(REDACTED.to_string());
        }
    }
    shown
}
