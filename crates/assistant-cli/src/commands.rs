use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use assistant_core::{
    collect_stream, Attachment, ChatClient, ChatOptions, ChatSession, Config, ConversationStore,
    ExportFormat, FileStorage, SettingsPatch, SettingsStore, Theme,
};

/// Loaded configuration plus the client and storage built from it
pub struct App {
    config: Config,
    client: ChatClient,
    storage: FileStorage,
}

impl App {
    pub fn load() -> Result<Self> {
        let config = Config::load()?;

        let client = match config.connect_timeout_secs {
            Some(secs) => ChatClient::with_connect_timeout(&config.api_url, Duration::from_secs(secs))?,
            None => ChatClient::new(&config.api_url),
        };
        let storage = FileStorage::new(config.resolve_data_dir()?);

        tracing::debug!(api_url = %config.api_url, data_dir = ?storage.dir(), "configuration loaded");

        Ok(Self {
            config,
            client,
            storage,
        })
    }

    fn conversations(&self) -> ConversationStore<&FileStorage> {
        ConversationStore::new(&self.storage)
    }

    fn settings(&self) -> SettingsStore<&FileStorage> {
        SettingsStore::new(&self.storage)
    }
}

pub struct ChatArgs {
    pub message: String,
    pub file: Option<PathBuf>,
    pub conversation: Option<String>,
    pub model: Option<String>,
    pub no_stream: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

pub async fn chat(app: &App, args: ChatArgs) -> Result<()> {
    let settings = app.settings().read();
    let store = app.conversations();

    let mut session = match &args.conversation {
        Some(id) => ChatSession::resume(
            store
                .get(id)
                .ok_or_else(|| anyhow!("No saved conversation with id {}", id))?,
        ),
        None => ChatSession::new(),
    };

    let attachment = args
        .file
        .as_deref()
        .map(Attachment::from_path)
        .transpose()?;
    session.push_user(args.message, attachment);

    if settings.is_demo_mode() {
        eprintln!("No API key configured; running in demo mode.");
        eprintln!("Set one with: assistant set --api-key <KEY>");
        return Ok(());
    }

    let options = ChatOptions {
        model: Some(args.model.unwrap_or(settings.model)),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
    };
    let messages = session.request_messages(app.config.system_prompt.as_deref());

    let reply = if settings.streaming_enabled && !args.no_stream {
        let stream = app
            .client
            .stream(&messages, &options)
            .await
            .context("Completion service unavailable")?;

        let mut stdout = io::stdout();
        let result = collect_stream(stream, |fragment| {
            echo_fragment(&mut stdout, fragment);
        })
        .await;
        println!();

        match result {
            Ok(text) => text,
            Err(partial) => {
                eprintln!("Warning: {}", partial);
                partial.text
            }
        }
    } else {
        let response = app
            .client
            .send(&messages, &options)
            .await
            .context("Completion service unavailable")?;
        println!("{}", response.content);
        tracing::debug!(
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "usage"
        );
        response.content
    };

    if reply.is_empty() {
        return Err(anyhow!("The completion service returned an empty reply"));
    }

    session.push_assistant(reply);
    store.save(&session.to_conversation())?;
    tracing::info!(id = session.id(), turns = session.len(), "conversation saved");
    eprintln!("[{}]", session.id());

    Ok(())
}

pub fn history(app: &App) {
    let conversations = app.conversations().read_all();
    if conversations.is_empty() {
        println!("No saved conversations.");
        return;
    }

    for conversation in conversations {
        println!(
            "{}  {}  {:>3} msgs  {}",
            conversation.id,
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
            conversation.messages.len(),
            conversation.title
        );
    }
}

pub fn show(app: &App, id: &str) -> Result<()> {
    let conversation = app
        .conversations()
        .get(id)
        .ok_or_else(|| anyhow!("No saved conversation with id {}", id))?;

    println!("{}\n", conversation.title);
    for message in &conversation.messages {
        let attached = message
            .file_name
            .as_ref()
            .map(|f| format!(" [{}]", f))
            .unwrap_or_default();
        println!(
            "{} ({}){}:",
            message.role.display_name(),
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            attached
        );
        println!("{}\n", message.content);
    }
    Ok(())
}

pub fn delete(app: &App, id: &str) -> Result<()> {
    app.conversations().delete(id)?;
    println!("Deleted {}", id);
    Ok(())
}

pub fn clear(app: &App) -> Result<()> {
    app.conversations().clear_all()?;
    println!("Conversation history cleared.");
    Ok(())
}

pub fn export(app: &App, id: &str, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let conversation = app
        .conversations()
        .get(id)
        .ok_or_else(|| anyhow!("No saved conversation with id {}", id))?;
    let rendered = format.render(&conversation);

    match output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Failed to write {:?}", path))?;
            println!("Exported {} as {} to {}", id, format, path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", visible)
}

pub fn print_settings(app: &App) {
    let settings = app.settings().read();
    println!("theme:      {}", settings.theme);
    println!("model:      {}", settings.model);
    println!(
        "api key:    {}",
        settings
            .api_key
            .as_deref()
            .map(mask)
            .unwrap_or_else(|| "(none, demo mode)".to_string())
    );
    println!("streaming:  {}", settings.streaming_enabled);
    println!("endpoint:   {}", app.client.base_url());
}

pub struct SetArgs {
    pub theme: Option<Theme>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub clear_api_key: bool,
    pub streaming: Option<bool>,
}

pub fn set(app: &App, args: SetArgs) -> Result<()> {
    let api_key = if args.clear_api_key {
        Some(None)
    } else {
        args.api_key.map(Some)
    };
    let patch = SettingsPatch {
        theme: args.theme,
        model: args.model,
        api_key,
        streaming_enabled: args.streaming,
    };

    if patch.is_empty() {
        return Err(anyhow!("Nothing to change; see `assistant set --help`"));
    }

    app.settings().write(patch)?;
    print_settings(app);
    Ok(())
}

pub async fn models(app: &App) -> Result<()> {
    let current = app.settings().read().model;
    let models = app
        .client
        .list_models()
        .await
        .context("Failed to list models")?;

    for model in models {
        let marker = if model.id == current { "*" } else { " " };
        println!("{} {:<20} {:<24} {}", marker, model.id, model.name, model.provider);
    }
    Ok(())
}

pub async fn health(app: &App) -> Result<()> {
    if app.client.health_check().await {
        println!("{} is healthy", app.client.base_url());
        Ok(())
    } else {
        Err(anyhow!("{} is unreachable or unhealthy", app.client.base_url()))
    }
}

pub async fn upload(app: &App, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Not a file path: {:?}", path))?;
    let content = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

    let document = app
        .client
        .upload_document(&file_name, content)
        .await
        .context("Upload failed")?;

    println!("{}  {}  {}", document.id, document.filename, document.status);
    Ok(())
}

/// Print a fragment as soon as it arrives; a broken terminal does not stop the reply.
fn echo_fragment(out: &mut impl Write, fragment: &str) -> bool {
    match out.write_all(fragment.as_bytes()).and_then(|_| out.flush()) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "failed to echo streamed fragment");
            false
        }
    }
}
