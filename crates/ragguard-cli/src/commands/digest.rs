//! Digest command

use crate::app::{DigestArgs, OutputFormat};
use anyhow::Result;
use ragguard_core::{AuditDigest, Config};

pub fn run(args: DigestArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let digest = AuditDigest::new(config.audit.hash_key.as_deref()).digest(args.text.trim());

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "digest": digest,
                "keyed": config.audit.hash_key.as_deref().is_some_and(|k| !k.is_empty()),
            })
        ),
        OutputFormat::Cli => println!("{}", digest),
    }
    Ok(())
}
