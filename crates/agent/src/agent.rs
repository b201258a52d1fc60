//! The conversation orchestrator.
//!
//! [`Agent`] owns the conversation and turns each line of operator input
//! into either a command result or one backend round trip:
//!
//! 1. Append the operator's entry
//! 2. Build `[system] + history`, the system prompt being the active
//!    persona's prompt followed by the tool signatures
//! 3. Call the backend with every tool offered and JSON output requested
//! 4. Interpret the completion, append it, and report the body

use std::sync::Arc;

use ada_config::AppConfig;
use ada_core::backend::{Backend, BackendInfo, ChatRequest, ResponseFormat, ToolChoice};
use ada_core::conversation::Conversation;
use ada_core::error::{ConversationError, PersonaError};
use ada_core::message::ChatMessage;
use ada_core::persona::Persona;
use ada_core::personas::Personas;
use ada_core::response::Response;
use ada_core::tool::ToolRegistry;
use ada_providers::BackendRegistry;
use tracing::{debug, error, info, warn};

use crate::active::{ActivePersona, PersonaWatch};
use crate::command::{Command, HELP};
use crate::error::AgentError;

/// Labels and sampling settings for a session.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub operator: String,
    pub assistant: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            operator: config.operator.clone(),
            assistant: config.assistant.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One completed message round trip.
#[derive(Debug, Clone)]
pub struct Turn {
    pub response: Response,
    /// The turn used at least three quarters of the context window.
    pub usage_warning: bool,
}

/// What the chat loop should do after a line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep reading; print the text if there is any.
    Continue(Option<String>),
    Exit,
}

/// True when `tokens` is at or above 75% of `context_window`.
pub fn exceeds_usage(tokens: u32, context_window: u32) -> bool {
    context_window > 0 && u64::from(tokens) * 4 >= u64::from(context_window) * 3
}

pub struct Agent {
    settings: AgentSettings,
    backend: Arc<dyn Backend>,
    info: BackendInfo,
    backends: Vec<String>,
    tools: Arc<ToolRegistry>,
    personas: Arc<Personas>,
    active: Arc<ActivePersona>,
    watch: Option<PersonaWatch>,
    conversation: Conversation,
}

impl Agent {
    /// Create an agent speaking through `backend` as `persona`.
    pub fn new(
        settings: AgentSettings,
        backend: Arc<dyn Backend>,
        info: BackendInfo,
        tools: Arc<ToolRegistry>,
        personas: Arc<Personas>,
        persona: Arc<Persona>,
    ) -> Self {
        info!(
            backend = %backend.describe(),
            persona = %persona.name(),
            tools = tools.len(),
            context_window = info.context_window(),
            "Initializing agent"
        );
        let backends = vec![backend.describe()];
        Self {
            settings,
            backend,
            info,
            backends,
            tools,
            personas,
            active: Arc::new(ActivePersona::new(persona)),
            watch: None,
            conversation: Conversation::new(),
        }
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    /// List every configured backend for `/backends`, marking the active one.
    pub fn with_backend_catalog(mut self, registry: &BackendRegistry) -> Self {
        self.backends = registry
            .names()
            .into_iter()
            .map(|name| {
                let marker = if name == registry.active() { "*" } else { " " };
                let description = registry.describe(name).unwrap_or_default();
                format!("{marker} {name}: {description}")
            })
            .collect();
        self
    }

    /// Hand persona watching to the agent so `/switch` can move it.
    pub fn attach_watch(&mut self, watch: PersonaWatch) {
        self.watch = Some(watch);
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn persona(&self) -> Arc<Persona> {
        self.active.get()
    }

    pub fn active_persona(&self) -> Arc<ActivePersona> {
        Arc::clone(&self.active)
    }

    /// The full system prompt: persona prompt plus available tools.
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.active.get().get_prompt();
        if !self.tools.is_empty() {
            prompt.push_str("\n\nYou can use the following tools:\n");
            prompt.push_str(&self.tool_list());
        }
        prompt
    }

    fn tool_list(&self) -> String {
        self.tools
            .signatures()
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Handle one line of operator input.
    ///
    /// Backend failures are reported as output; the session goes on.
    pub async fn handle_input(&mut self, line: &str) -> Result<Step, AgentError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Step::Continue(None));
        }

        if let Some(command) = Command::parse(line) {
            debug!(command = ?command, "Handling command");
            return self.handle_command(command);
        }

        match self.handle_message(line).await {
            Ok(turn) => Ok(Step::Continue(Some(format!(
                "{}: {}",
                self.settings.assistant, turn.response.body
            )))),
            Err(AgentError::Backend(e)) => {
                error!(backend = %self.backend.name(), error = %e, "Backend call failed");
                Ok(Step::Continue(Some(format!("[Error] {e}"))))
            }
            Err(e) => Err(e),
        }
    }

    /// Send one message to the backend and record the reply.
    pub async fn handle_message(&mut self, text: &str) -> Result<Turn, AgentError> {
        let operator = self.settings.operator.clone();
        keep_going(self.conversation.append(&operator, text));

        let request = self.build_request();
        debug!(messages = request.messages.len(), "Sending request to backend");
        let completion = self.backend.chat_completion(request).await?;
        let response = Response::interpret(&completion, &self.tools).await;

        let assistant = self.settings.assistant.clone();
        keep_going(self.conversation.append_response(&assistant, &response));

        let context_window = self.info.context_window();
        let usage_warning = exceeds_usage(response.tokens, context_window);
        if usage_warning {
            warn!(
                tokens = response.tokens,
                context_window,
                "Context window is at least 75% full; older turns may be truncated"
            );
        }

        Ok(Turn {
            response,
            usage_warning,
        })
    }

    fn build_request(&self) -> ChatRequest {
        let mut messages = Vec::with_capacity(self.conversation.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt()));
        messages.extend(self.conversation.messages());

        ChatRequest::new(messages)
            .with_tools(self.tools.definitions())
            .with_tool_choice(ToolChoice::Auto)
            .with_response_format(ResponseFormat::JsonObject)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_stop(vec![format!("{}:", self.settings.operator)])
    }

    fn handle_command(&mut self, command: Command) -> Result<Step, AgentError> {
        let output = match command {
            Command::Help => HELP.to_string(),
            Command::Clear => {
                keep_going(self.conversation.clear());
                "Conversation cleared.".to_string()
            }
            Command::History => self.conversation.to_string(),
            Command::Tools => {
                if self.tools.is_empty() {
                    "No tools available.".to_string()
                } else {
                    self.tool_list()
                }
            }
            Command::Prompt => self.system_prompt(),
            Command::Personas => self.persona_list(),
            Command::Switch(None) => "Usage: /switch <persona>".to_string(),
            Command::Switch(Some(name)) => match self.switch_persona(&name) {
                Ok(persona) => format!("Switched to {persona}"),
                Err(AgentError::Persona(PersonaError::NotFound(name))) => format!(
                    "Unknown persona '{name}'. Available: {}",
                    self.personas.names().join(", ")
                ),
                Err(e) => return Err(e),
            },
            Command::Backends => self.backends.join("\n"),
            Command::Models => self.model_list(),
            Command::Exit => return Ok(Step::Exit),
        };
        Ok(Step::Continue(Some(output)))
    }

    /// Make `name` the active persona and move the memory watch to it.
    ///
    /// Memories are reread on activation; the directory may have changed
    /// while it was not watched.
    pub fn switch_persona(&mut self, name: &str) -> Result<Arc<Persona>, AgentError> {
        let persona = self.personas.require(name)?;
        if let Some(watch) = self.watch.as_mut() {
            watch.stop();
        }
        persona.clear_cached_memories();
        self.active.set(Arc::clone(&persona));
        if let Some(watch) = self.watch.as_mut() {
            watch.start(Arc::clone(&persona))?;
        }
        info!(persona = %persona.name(), "Switched persona");
        Ok(persona)
    }

    fn persona_list(&self) -> String {
        let current = self.active.get();
        self.personas
            .all()
            .iter()
            .map(|p| {
                let marker = if p.name() == current.name() { "*" } else { " " };
                format!("{marker} {p}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn model_list(&self) -> String {
        if self.info.available_models.is_empty() {
            return format!("* {}", self.info.current_model);
        }
        self.info
            .available_models
            .iter()
            .map(|m| {
                let marker = if *m == self.info.current_model { "*" } else { " " };
                format!("{marker} {m}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// History is kept in memory even when saving it fails.
fn keep_going(result: Result<(), ConversationError>) {
    if let Err(e) = result {
        warn!(error = %e, "Conversation record not saved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ada_core::backend::{Completion, CompletionMessage, Usage};
    use ada_core::error::BackendError;
    use ada_core::message::Role;
    use ada_core::personas::Personas;
    use ada_core::response::NULL_OUTPUT;
    use std::sync::Mutex;

    /// Replies with canned content and records every request.
    struct MockBackend {
        content: String,
        total_tokens: u32,
        context_window: u32,
        fail: bool,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockBackend {
        fn new(content: &str, total_tokens: u32, context_window: u32) -> Self {
            Self {
                content: content.into(),
                total_tokens,
                context_window,
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new("", 0, 1024)
            }
        }
    }

    #[async_trait::async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn chat_completion(&self, request: ChatRequest) -> Result<Completion, BackendError> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err(BackendError::Network("connection refused".into()));
            }
            let usage = Usage {
                total_tokens: self.total_tokens,
                ..Usage::default()
            };
            Ok(Completion::single(CompletionMessage::text(&self.content), usage))
        }

        fn current_model(&self) -> &str {
            "mock-model"
        }

        async fn available_models(&self) -> Vec<String> {
            vec!["mock-model".into(), "other-model".into()]
        }

        async fn context_window(&self) -> u32 {
            self.context_window
        }
    }

    async fn agent_with(backend: Arc<MockBackend>, memory_root: &std::path::Path) -> Agent {
        let info = BackendInfo::probe(backend.as_ref()).await;
        let personas = Arc::new(Personas::builtin(memory_root, 32 * 1024));
        let persona = personas.require("default").unwrap();
        Agent::new(
            AgentSettings::default(),
            backend,
            info,
            Arc::new(ToolRegistry::new()),
            personas,
            persona,
        )
    }

    #[test]
    fn usage_threshold() {
        assert!(!exceeds_usage(12, 1024));
        assert!(!exceeds_usage(767, 1024));
        assert!(exceeds_usage(768, 1024));
        assert!(exceeds_usage(2000, 1024));
        assert!(!exceeds_usage(10, 0));
    }

    #[tokio::test]
    async fn message_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new(r#"{"text":"hi there"}"#, 12, 1024));
        let mut agent = agent_with(backend.clone(), tmp.path()).await;

        let step = agent.handle_input("hello").await.unwrap();
        assert_eq!(step, Step::Continue(Some("ADA: hi there".into())));

        let history = agent.conversation().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].author(), "USER");
        assert_eq!(history[0].role(), Role::User);
        assert_eq!(history[1].body(), "hi there");
        assert_eq!(history[1].role(), Role::Assistant);

        let requests = backend.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "hello");
        assert_eq!(request.stop, vec!["USER:".to_string()]);
        assert!(request.wants_json());
        assert_eq!(request.tool_choice, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn usage_warning_does_not_block_turn() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new(r#"{"text":"long"}"#, 800, 1024));
        let mut agent = agent_with(backend, tmp.path()).await;

        let turn = agent.handle_message("tell me a story").await.unwrap();
        assert!(turn.usage_warning);
        assert_eq!(turn.response.body, "long");
        assert_eq!(agent.conversation().len(), 2);
    }

    #[tokio::test]
    async fn backend_failure_keeps_user_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = agent_with(Arc::new(MockBackend::failing()), tmp.path()).await;

        let step = agent.handle_input("hello?").await.unwrap();
        match step {
            Step::Continue(Some(out)) => assert!(out.contains("connection refused")),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(agent.conversation().len(), 1);
        assert_eq!(agent.conversation().history()[0].body(), "hello?");
    }

    #[tokio::test]
    async fn unrecognised_content_is_null_output() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new(r#"{"foo":"bar"}"#, 5, 1024));
        let mut agent = agent_with(backend, tmp.path()).await;

        let turn = agent.handle_message("hi").await.unwrap();
        assert_eq!(turn.response.body, NULL_OUTPUT);
    }

    #[tokio::test]
    async fn commands_do_not_reach_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new(r#"{"text":"x"}"#, 1, 1024));
        let mut agent = agent_with(backend.clone(), tmp.path()).await;

        let Step::Continue(Some(help)) = agent.handle_input("/HELP").await.unwrap() else {
            panic!("help produced no output");
        };
        assert!(help.contains("/switch <name>"));

        let Step::Continue(Some(models)) = agent.handle_input("/models").await.unwrap() else {
            panic!("models produced no output");
        };
        assert_eq!(models, "* mock-model\n  other-model");

        let Step::Continue(Some(backends)) = agent.handle_input("/backend").await.unwrap() else {
            panic!("backends produced no output");
        };
        assert_eq!(backends, "mock(model=mock-model)");

        assert_eq!(agent.handle_input("   ").await.unwrap(), Step::Continue(None));
        assert_eq!(agent.handle_input("/bye").await.unwrap(), Step::Exit);
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_and_history() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new("plain answer", 3, 1024));
        let mut agent = agent_with(backend, tmp.path()).await;
        agent.handle_input("question").await.unwrap();

        let Step::Continue(Some(history)) = agent.handle_input("/history").await.unwrap() else {
            panic!("history produced no output");
        };
        assert!(history.contains("USER: question"));
        assert!(history.contains("ADA: plain answer"));
        assert!(history.contains("HISTORY END"));

        agent.handle_input("/clear").await.unwrap();
        assert!(agent.conversation().is_empty());
    }

    #[tokio::test]
    async fn switching_persona_changes_prompt() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new(r#"{"text":"ok"}"#, 1, 1024));
        let mut agent = agent_with(backend, tmp.path()).await;
        assert!(!agent.system_prompt().contains("Respond only in rhyme."));

        let Step::Continue(Some(out)) = agent.handle_input("/switch jester").await.unwrap() else {
            panic!("switch produced no output");
        };
        assert!(out.starts_with("Switched to jester"));
        assert_eq!(agent.persona().name(), "jester");
        assert!(agent.system_prompt().contains("Respond only in rhyme."));

        let Step::Continue(Some(list)) = agent.handle_input("/personas").await.unwrap() else {
            panic!("personas produced no output");
        };
        assert!(list.contains("* jester"));
        assert!(list.contains("  default"));

        let Step::Continue(Some(out)) = agent.handle_input("/switch nobody").await.unwrap() else {
            panic!("switch produced no output");
        };
        assert!(out.contains("Unknown persona 'nobody'"));
        assert_eq!(agent.persona().name(), "jester");
    }

    #[tokio::test]
    async fn switching_back_rereads_memories() {
        let tmp = tempfile::tempdir().unwrap();
        let memories = tmp.path().join("default");
        std::fs::create_dir_all(&memories).unwrap();
        std::fs::write(memories.join("001.txt"), "OLD").unwrap();

        let backend = Arc::new(MockBackend::new(r#"{"text":"ok"}"#, 1, 1024));
        let mut agent = agent_with(backend, tmp.path()).await;
        assert!(agent.system_prompt().contains("OLD"));

        agent.switch_persona("jester").unwrap();
        std::fs::write(memories.join("001.txt"), "NEW").unwrap();
        agent.switch_persona("default").unwrap();

        let prompt = agent.system_prompt();
        assert!(prompt.contains("<memory>\nNEW\n</memory>"));
        assert!(!prompt.contains("OLD"));
    }

    #[tokio::test]
    async fn system_prompt_lists_tools() {
        struct Noop;

        #[async_trait::async_trait]
        impl ada_core::tool::Tool for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn description(&self) -> &str {
                "Does nothing"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({ "type": "object", "properties": { "x": {}, "y": {} } })
            }
            async fn execute(
                &self,
                _arguments: serde_json::Value,
            ) -> Result<String, ada_core::error::ToolError> {
                unreachable!()
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new("x", 1, 1024));
        let info = BackendInfo::probe(backend.as_ref()).await;
        let personas = Arc::new(Personas::builtin(tmp.path(), 1024));
        let persona = personas.require("default").unwrap();
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(Noop));
        let agent = Agent::new(
            AgentSettings::default(),
            backend,
            info,
            Arc::new(tools),
            personas,
            persona,
        );

        let prompt = agent.system_prompt();
        assert!(prompt.ends_with("- noop(x, y): Does nothing"));
    }
}
