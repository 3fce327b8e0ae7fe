//! `miniluma chat`: interactive or single-message chat mode.

use anyhow::{Context, Result};
use miniluma_agent::{Assistant, ReactorEvent, TurnOutcome};
use miniluma_config::AppConfig;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

pub struct ChatOptions {
    pub message: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

pub async fn run(config: AppConfig, options: ChatOptions) -> Result<()> {
    let mut assistant = build_assistant(&config, &options).await?;

    if let Some(message) = options.message {
        let reply = assistant
            .process(&message, true, None)
            .await
            .context("Failed to process message")?;
        println!("{reply}");
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    print_banner(&assistant, &mut stdout)?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl(&mut assistant, stdin, &mut stdout).await
}

async fn build_assistant(config: &AppConfig, options: &ChatOptions) -> Result<Assistant> {
    let providers = Arc::new(miniluma_providers::build_from_config(config));
    let (provider_name, provider) = providers
        .resolve(options.provider.as_deref())
        .with_context(|| format!("Available providers: {}", providers.list().join(", ")))?;
    let tools = Arc::new(miniluma_tools::registry_with_providers(&config.tools, providers.clone()));
    let memory = miniluma_memory::create_backend(&config.memory)
        .await
        .context("Failed to open the memory store")?;

    let mut assistant = Assistant::new(config, provider_name, provider, tools, memory);
    if let Some(model) = options.model.as_deref().filter(|m| !m.is_empty()) {
        assistant = assistant.with_model(model);
    }
    Ok(assistant)
}

fn print_banner(assistant: &Assistant, out: &mut impl Write) -> std::io::Result<()> {
    let info = assistant.info();
    writeln!(out)?;
    writeln!(out, "  MiniLuma - {}", info.name)?;
    writeln!(out, "  ===================================")?;
    writeln!(out, "  Provider:  {}", info.provider)?;
    writeln!(out, "  Model:     {}", info.model)?;
    writeln!(out, "  Session:   {}", info.conversation_id)?;
    writeln!(out)?;
    writeln!(out, "  Commands:  -m<id>  restore a conversation from memory")?;
    writeln!(out, "             -save [file]  archive generated files")?;
    writeln!(out, "             -autosave on|off|interval N")?;
    writeln!(out, "  Type 'exit' or 'quit' to leave.")?;
    writeln!(out)
}

/// Read lines from `input` until EOF or `exit`/`quit`, answering each one.
pub async fn repl<R, W>(assistant: &mut Assistant, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    prompt(out)?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt(out)?;
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match run_turn(assistant, line, out).await {
            Ok(outcome) => {
                writeln!(out)?;
                for reply_line in outcome.response.lines() {
                    writeln!(out, "  Assistant > {reply_line}")?;
                }
                for saved in &outcome.saved_files {
                    writeln!(out, "  Saved: {}", saved.display())?;
                }
                writeln!(out)?;
            }
            Err(e) => {
                writeln!(out, "  [Error] {e}")?;
                writeln!(out)?;
            }
        }
        prompt(out)?;
    }

    let summary = assistant.end_session().await;
    writeln!(out)?;
    writeln!(out, "  {summary}")?;
    writeln!(out, "  Goodbye!")?;
    Ok(())
}

fn prompt(out: &mut impl Write) -> std::io::Result<()> {
    write!(out, "  You > ")?;
    out.flush()
}

/// One streamed turn; tool activity is shown while the Reactor works.
async fn run_turn<W: Write>(
    assistant: &mut Assistant,
    line: &str,
    out: &mut W,
) -> Result<TurnOutcome> {
    let (tx, mut rx) = mpsc::channel::<ReactorEvent>(32);

    let turn = async {
        let result = assistant.process_streaming(line, true, None, &tx).await;
        drop(tx);
        result
    };
    let progress = async {
        while let Some(event) = rx.recv().await {
            let shown = match &event {
                ReactorEvent::ToolCall { name, arguments } => writeln!(out, "  . {name} {arguments}"),
                ReactorEvent::ToolResult {
                    name,
                    success: false,
                    ..
                } => writeln!(out, "  . {name} failed"),
                _ => Ok(()),
            };
            if shown.is_err() {
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(turn, progress);
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniluma_memory::InMemoryBackend;
    use miniluma_providers::MockProvider;

    fn assistant(root: &std::path::Path) -> Assistant {
        let mut config = AppConfig::default();
        config.tools.workspace_dir = root.join("workspace").display().to_string();
        config.files.results_dir = root.join("results").display().to_string();
        config.logging.conversation_log_dir = root.join("logs").display().to_string();
        config.agent.auto_save_files = false;

        let tools = Arc::new(miniluma_tools::registry_from_config(&config.tools));
        Assistant::new(
            &config,
            "mock",
            Arc::new(MockProvider::new()),
            tools,
            Arc::new(InMemoryBackend::new()),
        )
    }

    #[tokio::test]
    async fn repl_answers_until_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = assistant(dir.path());
        let input: &[u8] = b"hello there\n\n-autosave off\nQUIT\nnever read\n";
        let mut out = Vec::new();

        repl(&mut assistant, input, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Assistant > "));
        assert!(text.contains("hello there"));
        assert!(text.contains("Assistant > Auto-save disabled"));
        assert!(text.contains("Goodbye!"));
        assert!(!text.contains("never read"));
        assert!(!assistant.auto_save_enabled());
    }

    #[tokio::test]
    async fn repl_ends_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = assistant(dir.path());
        let input: &[u8] = b"first message\n";
        let mut out = Vec::new();

        repl(&mut assistant, input, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ended after"));
        assert_eq!(assistant.history().first().unwrap().content, "first message");
    }

    #[tokio::test]
    async fn unknown_provider_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.memory.backend = "in_memory".into();
        config.logging.conversation_log_dir = dir.path().join("logs").display().to_string();
        let options = ChatOptions {
            message: None,
            provider: Some("nope".into()),
            model: None,
        };

        let err = build_assistant(&config, &options).await.err().unwrap();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("Available providers"));
        assert!(rendered.contains("nope"));
    }
}
