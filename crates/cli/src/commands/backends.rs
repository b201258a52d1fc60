//! `ada backends`: list the configured backends.

use ada_config::{AppConfig, BackendConfig};
use ada_providers::BackendRegistry;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let registry = BackendRegistry::from_config(config)?;
    for name in registry.names() {
        let marker = if name == registry.active() { "*" } else { " " };
        println!("{marker} {name}: {}", registry.describe(name).unwrap_or_default());
    }

    let has_llama = config
        .backends
        .values()
        .any(|b| matches!(b, BackendConfig::Llama(_)));
    if has_llama && cfg!(not(feature = "local")) {
        println!();
        println!("  llama backends need a build with `--features local`");
    }
    Ok(())
}
