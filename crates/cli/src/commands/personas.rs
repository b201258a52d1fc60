//! `ada personas`: list the built-in personas.

use ada_config::AppConfig;
use ada_core::personas::Personas;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let personas = Personas::builtin(&config.memory_path(), config.memory_limit_bytes);
    for persona in personas.all() {
        let marker = if persona.name() == config.persona { "*" } else { " " };
        println!("{marker} {persona}");
        println!("    memories: {}", persona.memory_dir().display());
    }
    Ok(())
}
