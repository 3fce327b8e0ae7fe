//! Inline session commands typed into the chat box.
//!
//! - `-m<id>` restores a conversation from memory
//! - `-save [file]` archives generated files
//! - `-autosave on|off|interval N` configures auto-save
//! - "save this conversation" (in plain words) writes the transcript
//! - "ask Claude: ..." or "问GPT ..." puts the question straight to the model

use regex_lite::Regex;
use std::sync::LazyLock;

static RESTORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-m([A-Za-z0-9_-]+)$").expect("valid regex"));
static SAVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-save(?:\s+(.+))?$").expect("valid regex"));
static AUTOSAVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-autosave\s+(on|off|interval\s+(\d+))$").expect("valid regex"));

static SAVE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsave\b").expect("valid regex"));
static CONVERSATION_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:conversation|chat)\b").expect("valid regex"));

// CJK has no word boundaries, so these match as substrings.
const SAVE_WORDS_CJK: &[&str] = &["保存"];
const CONVERSATION_WORDS_CJK: &[&str] = &["对话", "聊天", "内容"];

/// Names that mark a message as addressed to a model by name.
const MODEL_NAMES: &[&str] = &["openai", "gpt", "azure", "anthropic", "claude", "gemini", "baidu", "文心", "智谱", "glm"];
const ASK_WORDS_CJK: &[&str] = &["问", "询问", "请教"];

static ASK_MODEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ask\s+(?:openai|gpt[\w.-]*|azure|anthropic|claude|gemini|baidu|glm[\w.-]*)\b\s*[,:]?\s*(.+)$")
        .expect("valid regex")
});
static CJK_QUESTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"问\s*([^：]+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    RestoreMemory(String),
    SaveFiles(Option<String>),
    AutoSave(AutoSaveSetting),
    SaveConversation,
    /// A question addressed to a model by name, with the question text.
    AskModel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSaveSetting {
    On,
    Off,
    Interval(u64),
    /// `-autosave` with an argument it does not understand.
    Invalid,
}

impl SessionCommand {
    /// Recognize a command, or `None` for an ordinary message.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();

        if let Some(caps) = RESTORE.captures(input) {
            return Some(Self::RestoreMemory(caps[1].to_string()));
        }

        if let Some(caps) = SAVE.captures(input) {
            let target = caps.get(1).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty());
            return Some(Self::SaveFiles(target));
        }

        if let Some(caps) = AUTOSAVE.captures(input) {
            let setting = match &caps[1] {
                "on" => AutoSaveSetting::On,
                "off" => AutoSaveSetting::Off,
                _ => caps
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .map_or(AutoSaveSetting::Invalid, AutoSaveSetting::Interval),
            };
            return Some(Self::AutoSave(setting));
        }
        if input.starts_with("-autosave") {
            return Some(Self::AutoSave(AutoSaveSetting::Invalid));
        }

        if is_save_conversation_request(input) {
            return Some(Self::SaveConversation);
        }

        if let Some(question) = model_question(input) {
            return Some(Self::AskModel(question));
        }

        None
    }
}

/// The question in "ask Claude: ..." or in a Chinese request naming a
/// model, such as "问GPT 今天是星期几".
fn model_question(input: &str) -> Option<String> {
    if let Some(caps) = ASK_MODEL.captures(input) {
        return Some(caps[1].trim().to_string());
    }

    let lower = input.to_lowercase();
    let names_model = MODEL_NAMES.iter().any(|name| lower.contains(name));
    if !names_model || !ASK_WORDS_CJK.iter().any(|w| input.contains(w)) {
        return None;
    }
    let question = CJK_QUESTION
        .captures(input)
        .map(|caps| caps[1].trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| input.to_string());
    Some(question)
}

/// Plain-language request to save the transcript. Never matches `-save`.
fn is_save_conversation_request(input: &str) -> bool {
    if input.contains("-save") {
        return false;
    }
    let save = SAVE_WORD.is_match(input) || SAVE_WORDS_CJK.iter().any(|w| input.contains(w));
    let conversation =
        CONVERSATION_WORD.is_match(input) || CONVERSATION_WORDS_CJK.iter().any(|w| input.contains(w));
    save && conversation
}
