//! Assistant sessions: one conversation with one Reactor.
//!
//! An [`Assistant`] owns the conversation history, the transcript logger
//! and the bookkeeping for files the model generates. Each call to
//! [`Assistant::process`] is one turn: session commands are answered
//! directly, questions addressed to a model by name go to the provider in
//! a single request, and everything else goes through the Reactor.

pub mod commands;

pub use commands::{AutoSaveSetting, SessionCommand};

use crate::files::FileManager;
use crate::logger::ConversationLogger;
use crate::reactor::{Reactor, ToolInvocation};
use crate::stream_event::ReactorEvent;
use chrono::{Local, Utc};
use miniluma_config::AppConfig;
use miniluma_core::assistant::AssistantInfo;
use miniluma_core::error::MemoryError;
use miniluma_core::event::{DomainEvent, EventBus};
use miniluma_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use miniluma_core::message::{Conversation, ConversationId, Message, Role};
use miniluma_core::provider::{Provider, ProviderRequest};
use miniluma_core::tool::ToolRegistry;
use miniluma_memory::MemoryLog;
use miniluma_memory::log::truncate;
use miniluma_tools::{PathPolicy, PathViolation};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Extensions searched when looking for generated files.
const GENERATED_EXTENSIONS: &[&str] = &["html", "js", "css", "py", "json", "md"];

/// Workspace files younger than this count as freshly generated.
const RECENT_FILE_WINDOW: Duration = Duration::from_secs(600);

const WRITE_TOOL_NAMES: &[&str] = &["write_file", "write_to_file", "writefile", "write-file", "write-to-file"];
const PATH_ARGUMENTS: &[&str] = &["path", "file_path", "filepath", "file", "filename", "target_file", "targetFile"];

const EMPTY_INPUT_REPLY: &str = "Please enter a message.";
const MODEL_QUESTION_PROMPT: &str = "You are a helpful AI assistant.";
const PENDING: &str = "pending";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// What one turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub response: String,
    /// Files archived during this turn.
    pub saved_files: Vec<PathBuf>,
    pub tool_invocations: Vec<ToolInvocation>,
    /// Reactor passes used; zero for session commands.
    pub iterations: usize,
}

pub struct Assistant {
    id: String,
    name: String,
    history: Conversation,
    provider_name: String,
    model: String,
    provider: Arc<dyn Provider>,
    temperature: f32,
    reactor: Reactor,
    memory: Arc<dyn MemoryBackend>,
    memory_log: MemoryLog,
    files: FileManager,
    results_dir: PathBuf,
    workspace: PathBuf,
    path_policy: PathPolicy,
    log_dir: PathBuf,
    logger: ConversationLogger,
    event_bus: Option<Arc<EventBus>>,
    pending_files: Vec<String>,
    auto_saved_files: BTreeMap<String, String>,
    auto_save_enabled: bool,
    auto_save_interval: u64,
    save_code_blocks: bool,
    memory_limit: usize,
    max_history: usize,
    last_response: Option<String>,
}

impl Assistant {
    /// A fresh session using the agent, tools, files and logging settings
    /// of `config`. The model defaults to the provider's configured model.
    pub fn new(
        config: &AppConfig,
        provider_name: impl Into<String>,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        let provider_name = provider_name.into();
        let provider_config = config.provider(&provider_name);
        let model = provider_config
            .map(|p| p.model.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "mock-model".into());
        let temperature = provider_config.map_or(0.7, |p| p.temperature);

        let history = Conversation::new();
        let agent = &config.agent;
        let reactor = Reactor::new(provider.clone(), &model, tools)
            .with_system_prompt(&agent.system_prompt)
            .with_max_iterations(agent.max_iterations)
            .with_temperature(temperature)
            .with_reasoning_max_tokens(agent.reasoning_max_tokens)
            .with_conversation_id(history.id.0.clone());

        let log_dir = PathBuf::from(&config.logging.conversation_log_dir);
        let results_dir = PathBuf::from(&config.files.results_dir);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: agent.name.clone(),
            logger: ConversationLogger::new(&log_dir, &history.id.0),
            history,
            provider_name,
            model,
            provider,
            temperature,
            reactor,
            memory,
            memory_log: MemoryLog::default(),
            files: FileManager::new(&results_dir),
            results_dir,
            workspace: PathBuf::from(&config.tools.workspace_dir),
            path_policy: miniluma_tools::policy_from_config(&config.tools),
            log_dir,
            event_bus: None,
            pending_files: Vec::new(),
            auto_saved_files: BTreeMap::new(),
            auto_save_enabled: true,
            auto_save_interval: agent.auto_save_interval_secs,
            save_code_blocks: agent.auto_save_files,
            memory_limit: agent.memory_limit,
            max_history: agent.max_history,
            last_response: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.reactor = self.reactor.with_model(&self.model);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.reactor = self.reactor.with_system_prompt(prompt);
        self
    }

    /// Continue under a known conversation ID.
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        let id = ConversationId(id.into());
        self.logger = ConversationLogger::new(&self.log_dir, &id.0);
        self.reactor = self.reactor.with_conversation_id(id.0.clone());
        self.history = Conversation::with_id(id);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.reactor = self.reactor.with_event_bus(bus.clone());
        self.event_bus = Some(bus);
        self
    }

    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save_enabled = enabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.history.id
    }

    pub fn info(&self) -> AssistantInfo {
        AssistantInfo {
            assistant_id: self.id.clone(),
            name: self.name.clone(),
            conversation_id: self.history.id.0.clone(),
            provider: self.provider_name.clone(),
            model: self.model.clone(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history.messages
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    pub fn memory_log(&self) -> &MemoryLog {
        &self.memory_log
    }

    pub fn logger(&self) -> &ConversationLogger {
        &self.logger
    }

    pub fn auto_save_enabled(&self) -> bool {
        self.auto_save_enabled
    }

    pub fn auto_save_interval(&self) -> u64 {
        self.auto_save_interval
    }

    /// Archived files keyed by their original path, plus files still
    /// waiting to be archived (mapped to `"pending"`).
    pub fn files(&self) -> BTreeMap<String, String> {
        let mut files = self.auto_saved_files.clone();
        for pending in &self.pending_files {
            files.entry(pending.clone()).or_insert_with(|| PENDING.to_string());
        }
        files
    }

    /// An archived file by name, if it still exists.
    pub fn find_saved_file(&self, name: &str) -> Option<PathBuf> {
        let wanted = Path::new(name).file_name()?;
        self.auto_saved_files
            .values()
            .map(PathBuf::from)
            .find(|saved| saved.file_name() == Some(wanted) && saved.is_file())
    }

    /// Where generated files of this conversation are archived.
    pub fn conversation_results_dir(&self) -> PathBuf {
        self.results_dir
            .join(Local::now().format("%Y%m%d").to_string())
            .join(self.history.id.short())
    }

    pub fn clear_conversation(&mut self) {
        self.history.replace_messages(Vec::new());
        self.memory_log.clear_all();
        self.last_response = None;
        info!(assistant_id = %self.id, "Conversation cleared");
    }

    /// Run one turn.
    pub async fn process(
        &mut self,
        input: &str,
        add_to_memory: bool,
        memory_metadata: Option<Map<String, Value>>,
    ) -> Result<String> {
        Ok(self.turn(input, add_to_memory, memory_metadata, None).await?.response)
    }

    /// Run one turn, with the saved files and tool calls it produced.
    pub async fn process_turn(
        &mut self,
        input: &str,
        add_to_memory: bool,
        memory_metadata: Option<Map<String, Value>>,
    ) -> Result<TurnOutcome> {
        self.turn(input, add_to_memory, memory_metadata, None).await
    }

    /// Run one turn, reporting progress on `events`.
    ///
    /// The stream ends with `response` + `done`, or with `error` if the
    /// Reactor failed.
    pub async fn process_streaming(
        &mut self,
        input: &str,
        add_to_memory: bool,
        memory_metadata: Option<Map<String, Value>>,
        events: &mpsc::Sender<ReactorEvent>,
    ) -> Result<TurnOutcome> {
        self.turn(input, add_to_memory, memory_metadata, Some(events)).await
    }

    async fn turn(
        &mut self,
        input: &str,
        add_to_memory: bool,
        memory_metadata: Option<Map<String, Value>>,
        events: Option<&mpsc::Sender<ReactorEvent>>,
    ) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            let outcome = TurnOutcome {
                response: EMPTY_INPUT_REPLY.into(),
                ..Default::default()
            };
            announce(events, &outcome).await;
            return Ok(outcome);
        }

        info!(assistant_id = %self.id, conversation_id = %self.history.id, "Processing input");
        self.history.push(Message::user(input));
        self.logger.log("user", input, None).await;

        let command = SessionCommand::parse(input);
        let answered_by_reactor = command.is_none();
        let finishes_turn = matches!(
            command,
            None | Some(SessionCommand::SaveConversation | SessionCommand::AskModel(_))
        );
        let memory_kind = match &command {
            None => None,
            Some(SessionCommand::AskModel(_)) => Some("ai_dialog"),
            Some(_) => Some("file_save"),
        };

        let mut outcome = match command {
            Some(SessionCommand::RestoreMemory(id)) => TurnOutcome {
                response: self.restore_from_memory(&id).await?,
                ..Default::default()
            },
            Some(SessionCommand::SaveFiles(target)) => {
                let (response, saved_files) = self.archive_generated_files(target.as_deref()).await;
                TurnOutcome {
                    response,
                    saved_files,
                    ..Default::default()
                }
            }
            Some(SessionCommand::AutoSave(setting)) => TurnOutcome {
                response: self.configure_auto_save(setting),
                ..Default::default()
            },
            Some(SessionCommand::SaveConversation) => {
                let path = self.save_conversation().await?;
                TurnOutcome {
                    response: format!("Conversation saved to: {}", path.display()),
                    saved_files: vec![path],
                    ..Default::default()
                }
            }
            Some(SessionCommand::AskModel(question)) => TurnOutcome {
                response: self.ask_model(&question).await,
                ..Default::default()
            },
            None => self.run_reactor(input, events).await,
        };

        if finishes_turn {
            self.history.push(Message::assistant(&outcome.response));
            self.logger.log("assistant", &outcome.response, Some(self.name.as_str())).await;
            self.memory_log
                .record(json!({ "input": input }), json!({ "response": outcome.response }));
            self.last_response = Some(outcome.response.clone());

            if add_to_memory {
                let metadata = memory_metadata.unwrap_or_else(|| {
                    let mut m = Map::new();
                    if let Some(kind) = memory_kind {
                        m.insert("type".into(), json!(kind));
                    }
                    m
                });
                self.remember(input, &outcome.response, metadata).await;
            }
        }

        if answered_by_reactor {
            if self.auto_save_enabled && !self.pending_files.is_empty() {
                outcome.saved_files.extend(self.flush_pending_files().await);
            }
            if self.save_code_blocks {
                outcome.saved_files.extend(self.save_code_blocks(&outcome.response).await);
            }
        } else {
            announce(events, &outcome).await;
        }

        Ok(outcome)
    }

    async fn run_reactor(&mut self, input: &str, events: Option<&mpsc::Sender<ReactorEvent>>) -> TurnOutcome {
        let memories = self.recall(input).await;
        let reactor = self.reactor.with_recalled_memories(&memories);

        // Everything before the message just pushed.
        let earlier = &self.history.messages[..self.history.messages.len() - 1];
        let context = &earlier[earlier.len().saturating_sub(self.max_history)..];

        let result = match events {
            Some(tx) => reactor.process_with_events(input, context, tx).await,
            None => reactor.process(input, context).await,
        };

        match result {
            Ok(reactor_outcome) => {
                for invocation in &reactor_outcome.tool_invocations {
                    self.record_tool_invocation(invocation).await;
                }
                TurnOutcome {
                    response: reactor_outcome.response,
                    saved_files: Vec::new(),
                    tool_invocations: reactor_outcome.tool_invocations,
                    iterations: reactor_outcome.iterations,
                }
            }
            Err(e) => {
                warn!(assistant_id = %self.id, error = %e, "Reactor failed");
                self.history.push(Message::system(format!("Error: {e}")));
                self.logger.log_system_event("Error", &e.to_string()).await;
                self.publish(DomainEvent::ErrorOccurred {
                    context: "reactor".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                TurnOutcome {
                    response: format!("Error processing request: {e}"),
                    ..Default::default()
                }
            }
        }
    }

    /// One request to the session's provider, without tools or history.
    async fn ask_model(&self, question: &str) -> String {
        info!(assistant_id = %self.id, provider = %self.provider_name, "Question addressed to the model");
        let messages = vec![Message::system(MODEL_QUESTION_PROMPT), Message::user(question)];
        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = self.temperature;

        match self.provider.complete(request).await {
            Ok(response) => response.message.content,
            Err(e) => {
                warn!(assistant_id = %self.id, error = %e, "Model question failed");
                self.logger.log_system_event("Error", &e.to_string()).await;
                self.publish(DomainEvent::ErrorOccurred {
                    context: "ask_model".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                format!("Error while asking the AI model: {e}")
            }
        }
    }

    async fn recall(&self, input: &str) -> Vec<MemoryEntry> {
        if self.memory_limit == 0 {
            return Vec::new();
        }
        match self.memory.search(MemoryQuery::new(input).with_limit(self.memory_limit)).await {
            Ok(entries) => {
                if !entries.is_empty() {
                    debug!(count = entries.len(), "Recalled memories for context");
                    self.publish(DomainEvent::MemoryAccessed {
                        operation: "search".into(),
                        count: entries.len(),
                        timestamp: Utc::now(),
                    });
                }
                entries
            }
            Err(e) => {
                warn!(error = %e, "Memory recall failed");
                Vec::new()
            }
        }
    }

    async fn record_tool_invocation(&mut self, invocation: &ToolInvocation) {
        let content = format!(
            "Tool: {}\nArguments: {}\nResult: {}",
            invocation.name, invocation.arguments, invocation.result
        );
        self.history.push(Message::tool_result("", content).with_name(&invocation.name));
        self.logger
            .log_system_event(
                &format!("Tool used: {}", invocation.name),
                &format!("Arguments: {}\nResult: {}", invocation.arguments, truncate(&invocation.result, 500)),
            )
            .await;
        self.memory_log.record(
            json!({ "tool": invocation.name, "arguments": invocation.arguments }),
            json!({ "result": invocation.result, "success": invocation.success }),
        );

        if let Some(path) = written_path(invocation) {
            let resolved = self.resolve_workspace_path(&path).display().to_string();
            if !self.pending_files.contains(&resolved) {
                debug!(path = %resolved, "Queued generated file for archiving");
                self.pending_files.push(resolved);
            }
        }
    }

    async fn remember(&self, input: &str, response: &str, mut metadata: Map<String, Value>) {
        let history: Vec<Value> = self
            .history
            .messages
            .iter()
            .map(|m| {
                let mut item = json!({ "role": m.role.as_str(), "content": m.content });
                if let Some(name) = &m.name {
                    item["name"] = json!(name);
                }
                item
            })
            .collect();
        metadata.insert("conversation_history".into(), Value::Array(history));

        let entry = MemoryEntry::new(format!("{input} -> {response}"))
            .with_tags(&["conversation"])
            .with_source(self.history.id.0.clone())
            .with_metadata(metadata);

        match self.memory.store(entry).await {
            Ok(id) => {
                info!(memory_id = %id, "Turn stored in memory");
                self.publish(DomainEvent::MemoryAccessed {
                    operation: "store".into(),
                    count: 1,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => warn!(error = %e, "Failed to store turn in memory"),
        }
    }

    /// Restore the conversation saved with memory `id`.
    pub async fn restore_from_memory(&mut self, id: &str) -> Result<String> {
        info!(memory_id = %id, "Restoring conversation from memory");
        let Some(entry) = self.memory.get(id).await? else {
            let reply = format!("Failed to restore conversation: memory {id} not found");
            warn!(memory_id = %id, "Memory not found");
            return Ok(reply);
        };

        self.publish(DomainEvent::MemoryAccessed {
            operation: "restore".into(),
            count: 1,
            timestamp: Utc::now(),
        });

        let history = match entry.metadata.get("conversation_history") {
            Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok(),
            Some(other) => Some(other.clone()),
            None => None,
        };

        if let Some(Value::Array(items)) = history {
            let messages: Vec<Message> = items.iter().map(message_from_value).collect();
            let count = messages.len();
            self.history.replace_messages(messages);
            self.history
                .push(Message::system(format!("Restored conversation from memory {id}")));
            self.logger
                .log_system_event("Conversation restored", &format!("memory {id}, {count} messages"))
                .await;
            info!(memory_id = %id, count, "Conversation restored");
            return Ok(format!("Restored conversation from memory {id} ({count} messages)."));
        }

        self.history.push(Message::system(format!(
            "Tried to restore memory {id}, but it holds no conversation history.\nMemory content: {}",
            entry.content
        )));
        self.logger
            .log_system_event("Conversation partially restored", &format!("memory {id} has no history"))
            .await;
        Ok(format!(
            "Memory {id} holds no full conversation; only partial content was restored.\nMemory content: {}",
            truncate(&entry.content, 100)
        ))
    }

    /// `-save [file]`: copy generated files into the conversation's
    /// results directory. Returns the reply and the archived paths.
    pub async fn archive_generated_files(&mut self, target: Option<&str>) -> (String, Vec<PathBuf>) {
        let candidates = match target {
            Some(name) => match self.find_named_file(name) {
                Ok(found) => found,
                Err(violation) => {
                    warn!(target = %name, %violation, "Refused to archive file outside the workspace");
                    let reply = format!("Cannot save '{name}': {violation}");
                    self.logger.log_system_event("File save refused", &reply).await;
                    return (reply, Vec::new());
                }
            },
            None => self.find_generated_files().await,
        };

        if candidates.is_empty() {
            warn!(target = ?target, "No generated files found");
            return (
                "No generated files found. Make sure the file exists or give its exact name.".into(),
                Vec::new(),
            );
        }

        let dest_dir = self.conversation_results_dir();
        let mut saved = Vec::new();
        for source in candidates {
            match copy_into(&source, &dest_dir).await {
                Ok(dest) => {
                    info!(source = %source.display(), dest = %dest.display(), "Archived file");
                    self.auto_saved_files
                        .insert(source.display().to_string(), dest.display().to_string());
                    saved.push(dest);
                }
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "Failed to archive file");
                    let reply = format!("Failed to save files: {e}");
                    self.logger.log_system_event("File save error", &reply).await;
                    return (reply, saved);
                }
            }
        }

        self.announce_archived(&saved);
        let reply = if let [only] = saved.as_slice() {
            format!("Saved file to: {}", only.display())
        } else {
            let mut reply = format!("Saved {} files to: {}\n", saved.len(), dest_dir.display());
            for (i, path) in saved.iter().enumerate() {
                let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                reply.push_str(&format!("{}. {name}\n", i + 1));
            }
            reply
        };
        self.logger.log_system_event("Files saved", &reply).await;
        (reply, saved)
    }

    /// Resolve a `-save` target inside the workspace sandbox.
    pub fn resolve_save_target(&self, name: &str) -> std::result::Result<PathBuf, PathViolation> {
        self.path_policy.check(name)
    }

    /// `name` itself, or `name` with each generated extension when it has
    /// none. Anything outside the sandbox is refused.
    fn find_named_file(&self, name: &str) -> std::result::Result<Vec<PathBuf>, PathViolation> {
        let direct = self.resolve_save_target(name)?;
        if direct.is_file() {
            return Ok(vec![direct]);
        }
        if name.contains('.') {
            return Ok(Vec::new());
        }
        Ok(GENERATED_EXTENSIONS
            .iter()
            .filter_map(|ext| self.path_policy.check(&format!("{name}.{ext}")).ok())
            .filter(|p| p.is_file())
            .collect())
    }

    async fn find_generated_files(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = Vec::new();
        for known in self.pending_files.iter().chain(self.auto_saved_files.values()) {
            push_existing(&mut found, PathBuf::from(known));
        }

        let Ok(mut entries) = tokio::fs::read_dir(&self.workspace).await else {
            return found;
        };
        let now = SystemTime::now();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let generated = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| GENERATED_EXTENSIONS.contains(&e));
            if !generated {
                continue;
            }
            let recent = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age < RECENT_FILE_WINDOW);
            if recent {
                push_existing(&mut found, path);
            }
        }
        found
    }

    fn configure_auto_save(&mut self, setting: AutoSaveSetting) -> String {
        match setting {
            AutoSaveSetting::On => {
                self.auto_save_enabled = true;
                info!("Auto-save enabled");
                "Auto-save enabled".into()
            }
            AutoSaveSetting::Off => {
                self.auto_save_enabled = false;
                info!("Auto-save disabled");
                "Auto-save disabled".into()
            }
            AutoSaveSetting::Interval(secs) if secs < 10 => "Auto-save interval must be at least 10 seconds".into(),
            AutoSaveSetting::Interval(secs) => {
                self.auto_save_interval = secs;
                info!(interval_secs = secs, "Auto-save interval changed");
                format!("Auto-save interval set to {secs} seconds")
            }
            AutoSaveSetting::Invalid => "Usage: -autosave on|off|interval <seconds>".into(),
        }
    }

    /// Move every pending file that exists into the results directory.
    async fn flush_pending_files(&mut self) -> Vec<PathBuf> {
        let dest_dir = self.conversation_results_dir();
        let mut saved = Vec::new();

        // A pending path may already be archived; a rewrite replaces the copy.
        for original in std::mem::take(&mut self.pending_files) {
            let source = PathBuf::from(&original);
            if !source.is_file() {
                warn!(path = %original, "Pending file does not exist yet");
                self.pending_files.push(original);
                continue;
            }
            match copy_into(&source, &dest_dir).await {
                Ok(dest) => {
                    info!(source = %original, dest = %dest.display(), "Auto-saved file");
                    if let Err(e) = tokio::fs::remove_file(&source).await {
                        warn!(path = %original, error = %e, "Failed to remove original file");
                    }
                    self.auto_saved_files.insert(original, dest.display().to_string());
                    saved.push(dest);
                }
                Err(e) => {
                    warn!(path = %original, error = %e, "Auto-save failed");
                    self.pending_files.push(original);
                }
            }
        }

        if !saved.is_empty() {
            self.logger
                .log_system_event("Auto-save complete", &format!("{} file(s) saved", saved.len()))
                .await;
            self.announce_archived(&saved);
        }
        saved
    }

    async fn save_code_blocks(&mut self, response: &str) -> Vec<PathBuf> {
        let saved = self.files.save_files_from_markdown(response, None).await;
        for path in &saved {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.auto_saved_files.insert(name, path.display().to_string());
        }
        saved
    }

    /// Write the history as markdown into the conversation's results dir.
    pub async fn save_conversation(&self) -> Result<PathBuf> {
        let dir = self.conversation_results_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("conversation_{}.md", Local::now().format("%H%M%S")));
        tokio::fs::write(&path, self.conversation_markdown()).await?;
        info!(path = %path.display(), "Conversation saved");
        self.logger
            .log_system_event("Conversation saved", &path.display().to_string())
            .await;
        Ok(path)
    }

    pub fn conversation_markdown(&self) -> String {
        let mut lines = vec![
            format!("# Conversation - {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            format!("Session ID: {}", self.history.id),
            format!("Assistant: {}", self.name),
            format!("Model: {}", self.model),
            String::new(),
            "## Messages".to_string(),
            String::new(),
        ];
        for message in &self.history.messages {
            let heading = match message.role {
                Role::User => "### User".to_string(),
                Role::Assistant => "### Assistant".to_string(),
                Role::System => "### System".to_string(),
                Role::Tool => format!("### Tool: {}", message.name.as_deref().unwrap_or("unknown")),
            };
            lines.push(heading);
            lines.push(message.content.clone());
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Archive anything still pending and close the transcript.
    pub async fn end_session(&mut self) -> String {
        let saved = self.flush_pending_files().await;
        let summary = format!(
            "Session {} ended after {} messages. {} file(s) archived in total, {} saved now.",
            self.history.id,
            self.history.messages.len(),
            self.auto_saved_files.len(),
            saved.len()
        );
        self.logger.log_system_event("Session ended", &summary).await;
        self.publish(DomainEvent::SessionEnded {
            conversation_id: self.history.id.0.clone(),
            message_count: self.history.messages.len(),
            timestamp: Utc::now(),
        });
        info!(assistant_id = %self.id, conversation_id = %self.history.id, "Session ended");
        summary
    }

    fn resolve_workspace_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    fn announce_archived(&self, saved: &[PathBuf]) {
        if saved.is_empty() {
            return;
        }
        self.publish(DomainEvent::FilesArchived {
            conversation_id: self.history.id.0.clone(),
            files: saved.iter().map(|p| p.display().to_string()).collect(),
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Send the closing events for a turn the Reactor did not run.
async fn announce(events: Option<&mpsc::Sender<ReactorEvent>>, outcome: &TurnOutcome) {
    if let Some(tx) = events {
        let _ = tx
            .send(ReactorEvent::Response {
                content: outcome.response.clone(),
            })
            .await;
        let _ = tx.send(ReactorEvent::Done { iterations: 0 }).await;
    }
}

/// The target path of a file-writing tool call.
fn written_path(invocation: &ToolInvocation) -> Option<String> {
    if !invocation.success {
        return None;
    }
    let name = invocation.name.to_lowercase();
    if !WRITE_TOOL_NAMES.iter().any(|w| name.contains(w)) {
        return None;
    }
    PATH_ARGUMENTS
        .iter()
        .find_map(|key| invocation.arguments.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn message_from_value(value: &Value) -> Message {
    let role = value.get("role").and_then(Value::as_str).unwrap_or("system");
    let content = value.get("content").and_then(Value::as_str).unwrap_or_default();
    let mut message = match Role::parse_lossy(role) {
        Role::User => Message::user(content),
        Role::Assistant => Message::assistant(content),
        Role::Tool => Message::tool_result("", content),
        Role::System => Message::system(content),
    };
    message.name = value.get("name").and_then(Value::as_str).map(str::to_string);
    message
}

fn push_existing(found: &mut Vec<PathBuf>, path: PathBuf) {
    if path.is_file() && !found.contains(&path) {
        found.push(path);
    }
}

async fn copy_into(source: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    tokio::fs::create_dir_all(dir).await?;
    let dest = dir.join(name);
    if dest.as_path() != source {
        tokio::fs::copy(source, &dest).await?;
    }
    Ok(dest)
}
