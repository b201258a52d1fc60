//! Interactive chat, the default command.

use std::sync::Arc;

use ada_agent::{Agent, AgentSettings, StdConsole, run_session};
use ada_config::AppConfig;
use ada_core::backend::BackendInfo;
use ada_core::banner;
use ada_core::conversation::Conversation;
use ada_core::personas::Personas;
use ada_providers::BackendRegistry;
use anyhow::Context;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let registry = BackendRegistry::from_config(&config).context("Invalid backend configuration")?;

    let personas = Arc::new(Personas::builtin(&config.memory_path(), config.memory_limit_bytes));
    let persona = personas.require(&config.persona)?;

    let conversation = if config.history {
        Conversation::persistent(config.history_path())?
    } else {
        Conversation::new()
    };

    let backend = registry
        .connect()
        .await
        .with_context(|| format!("Failed to start backend '{}'", registry.active()))?;
    let info = BackendInfo::probe(backend.as_ref()).await;
    let tools = Arc::new(ada_tools::default_registry());

    println!("{}", banner(&config.assistant));
    println!("  Persona:   {persona}");
    println!("  Backend:   {}", registry.active());
    println!("  Model:     {}", info.current_model);
    println!("  Context:   {} tokens", info.context_window());
    if let Some(path) = conversation.record_path() {
        println!("  History:   {}", path.display());
    }
    println!();

    let agent = Agent::new(
        AgentSettings::from_config(&config),
        backend,
        info,
        tools,
        personas,
        persona,
    )
    .with_conversation(conversation)
    .with_backend_catalog(&registry);

    run_session(agent, StdConsole).await?;
    Ok(())
}
