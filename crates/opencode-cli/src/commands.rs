use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use opencode_client::{
    normalize_base_url, AccumulatorUpdate, ModelSelection, OpenCodeApi, OpenCodeClient,
    PreferenceStore, Preferences, PromptRequest, ProvidersResponse, Session, StreamAccumulator,
    StreamEvent, StreamUpdate,
};
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;

/// How long `send` waits for the event stream before prompting
const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a server and remember it for later commands
    Connect { url: String },

    /// Show server health
    Health,

    /// List sessions, most recently updated first
    Sessions,

    /// Create a session
    Create {
        #[arg(long)]
        title: Option<String>,
    },

    /// Delete a session
    Delete { session_id: String },

    /// Print the messages of a session
    Messages { session_id: String },

    /// List providers and their models
    Providers,

    /// Remember the provider and model used by `send`
    Select {
        provider: String,
        model: Option<String>,
    },

    /// Send a prompt and stream the reply until the session goes idle
    Send {
        session_id: String,
        text: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },

    /// Print live events until Ctrl-C
    Watch {
        #[arg(long)]
        session: Option<String>,
    },

    /// Forget the saved server and selection
    Disconnect,
}

/// Run one command against the configured server
pub async fn run(command: Command, config: &Config, store: &dyn PreferenceStore) -> Result<()> {
    match command {
        Command::Connect { url } => connect(&url, config, store).await,
        Command::Disconnect => {
            store.clear().context("Failed to clear preferences")?;
            println!("Forgot saved server");
            Ok(())
        }
        command => {
            let client = client_for(config)?;
            run_with_client(command, &client, store).await
        }
    }
}

fn client_for(config: &Config) -> Result<OpenCodeClient> {
    if config.client.base_url.is_empty() {
        bail!("No server configured; run `opencode-cli connect <url>` or pass --url");
    }
    OpenCodeClient::from_config(&config.client).context("Invalid server address")
}

async fn connect(url: &str, config: &Config, store: &dyn PreferenceStore) -> Result<()> {
    let base_url = normalize_base_url(url).ok_or_else(|| anyhow!("Server address is empty"))?;
    let client_config = config.client.clone().with_base_url(base_url.clone());
    let client = OpenCodeClient::from_config(&client_config).context("Invalid server address")?;

    let health = client
        .health_check()
        .await
        .with_context(|| format!("Could not reach {}", base_url))?;
    if !health.healthy {
        bail!("{} reports unhealthy", base_url);
    }

    store
        .update(&mut |prefs| {
            prefs.base_url = base_url.clone();
            prefs.has_completed_setup = true;
        })
        .context("Failed to save preferences")?;

    tracing::info!(base_url = %base_url, version = %health.version, "Connected to server");
    println!("Connected to {} (version {})", base_url, health.version);
    Ok(())
}

async fn run_with_client(
    command: Command,
    client: &OpenCodeClient,
    store: &dyn PreferenceStore,
) -> Result<()> {
    match command {
        Command::Health => {
            let health = client.health_check().await.context("Health check failed")?;
            println!(
                "{} {}",
                if health.healthy { "healthy" } else { "unhealthy" },
                health.version
            );
            if let Some(project) = client.get_current_project().await {
                println!("project   {} ({})", project.display_name(), project.worktree);
            }
            if let Some(paths) = client.get_path_info().await {
                println!("directory {}", paths.directory);
            }
        }
        Command::Sessions => {
            let mut sessions = client.list_sessions().await.context("Failed to list sessions")?;
            sessions.sort_by(|a, b| b.time.updated.cmp(&a.time.updated));
            for session in &sessions {
                println!("{}", session_line(session));
            }
        }
        Command::Create { title } => {
            let session = client
                .create_session(title.as_deref())
                .await
                .context("Failed to create session")?;
            println!("{}", session_line(&session));
        }
        Command::Delete { session_id } => {
            let deleted = client
                .delete_session(&session_id)
                .await
                .with_context(|| format!("Failed to delete session {}", session_id))?;
            if !deleted {
                bail!("Server refused to delete session {}", session_id);
            }
            println!("Deleted {}", session_id);
        }
        Command::Messages { session_id } => {
            let messages = client
                .get_session_messages(&session_id)
                .await
                .with_context(|| format!("Failed to load messages for {}", session_id))?;
            for message in &messages {
                println!("[{}] {}", message.role().as_str(), message.text());
            }
        }
        Command::Providers => {
            let providers = client.get_providers().await.context("Failed to load providers")?;
            print!("{}", providers_listing(&providers));
        }
        Command::Select { provider, model } => {
            let providers = client.get_providers().await.context("Failed to load providers")?;
            let selection = choose_model(&providers, &provider, model.as_deref())?;
            remember_selection(store, &selection)?;
            println!("Selected {}/{}", selection.provider_id, selection.model_id);
        }
        Command::Send {
            session_id,
            text,
            provider,
            model,
        } => {
            let preferences = store.load().unwrap_or_default();
            let selection = pick_selection(
                client,
                &preferences,
                provider.as_deref(),
                model.as_deref(),
            )
            .await;
            send(client, &session_id, &text, selection).await?;
        }
        Command::Watch { session } => watch(client, session.as_deref()).await?,
        // Handled in `run` without a client
        Command::Connect { .. } | Command::Disconnect => {}
    }
    Ok(())
}

fn session_line(session: &Session) -> String {
    let updated = session
        .updated_at()
        .or_else(|| session.created_at())
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{}  {}  {}", session.id, updated, session.display_title())
}

/// One provider per line followed by its indented models
pub fn providers_listing(providers: &ProvidersResponse) -> String {
    let mut out = String::new();
    for provider in &providers.all {
        let marker = if providers.is_connected(&provider.id) { "*" } else { " " };
        out.push_str(&format!("{} {} ({})\n", marker, provider.id, provider.display_name()));
        for model in provider.models.values() {
            let context = model
                .context_window()
                .map(|c| format!("  ctx {}", c))
                .unwrap_or_default();
            out.push_str(&format!("    {}  {}{}\n", model.id, model.display_name(), context));
        }
    }
    out
}

/// Validate an explicit choice; a missing model falls back to the server
/// default for that provider, then its first model
pub fn choose_model(
    providers: &ProvidersResponse,
    provider_id: &str,
    model_id: Option<&str>,
) -> Result<ModelSelection> {
    let provider = providers
        .provider(provider_id)
        .ok_or_else(|| anyhow!("Unknown provider '{}'", provider_id))?;

    match model_id {
        Some(model_id) if provider.models.contains_key(model_id) => {
            Ok(ModelSelection::new(provider_id, model_id))
        }
        Some(model_id) => bail!("Provider '{}' has no model '{}'", provider_id, model_id),
        None => providers
            .resolve_selection(Some(provider_id), None)
            .filter(|selection| selection.provider_id == provider_id)
            .ok_or_else(|| anyhow!("Provider '{}' has no models", provider_id)),
    }
}

pub fn remember_selection(store: &dyn PreferenceStore, selection: &ModelSelection) -> Result<()> {
    store
        .update(&mut |prefs| {
            prefs.last_provider_id = selection.provider_id.clone();
            prefs.last_model_id = selection.model_id.clone();
        })
        .context("Failed to save selection")?;
    Ok(())
}

/// Flags win; otherwise the saved selection is checked against the server's
/// provider list. Without a provider list the prompt goes out with no model.
async fn pick_selection(
    client: &OpenCodeClient,
    preferences: &Preferences,
    provider: Option<&str>,
    model: Option<&str>,
) -> Option<ModelSelection> {
    if let (Some(provider), Some(model)) = (provider, model) {
        return Some(ModelSelection::new(provider, model));
    }

    match client.get_providers().await {
        Ok(providers) => providers.resolve_selection(
            provider.or(preferences.last_provider()),
            model.or(preferences.last_model()),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Could not load providers; sending without a model");
            None
        }
    }
}

async fn send(
    client: &OpenCodeClient,
    session_id: &str,
    text: &str,
    selection: Option<ModelSelection>,
) -> Result<()> {
    let mut updates = client
        .connect_event_channel()
        .context("Failed to open event stream")?;
    wait_for_stream(&mut updates).await?;

    let mut request = PromptRequest::new(text);
    if let Some(selection) = selection {
        request = request.with_selection(selection);
    }

    let message_id = client
        .send_message_async(session_id, request)
        .await
        .context("Failed to send prompt")?;
    tracing::debug!(session_id, message_id = %message_id, "Prompt accepted");

    let mut accumulator = StreamAccumulator::new(session_id);
    accumulator.begin(message_id);

    let mut stdout = std::io::stdout();
    while let Some(update) = updates.recv().await {
        let event = match update {
            StreamUpdate::Event(event) => event,
            StreamUpdate::Disconnected => {
                eprintln!("(connection lost, reconnecting)");
                continue;
            }
            StreamUpdate::Connected => continue,
        };

        match accumulator.apply(&event) {
            Some(AccumulatorUpdate::Updated { .. }) => {
                if let StreamEvent::Delta { delta, .. } = &event {
                    print!("{}", delta);
                    stdout.flush().ok();
                }
            }
            Some(AccumulatorUpdate::Completed { .. }) => {
                println!();
                break;
            }
            Some(AccumulatorUpdate::Failed { message }) => {
                println!();
                client.disconnect_event_source();
                bail!("Session error: {}", message);
            }
            None => {}
        }
    }

    client.disconnect_event_source();
    Ok(())
}

async fn wait_for_stream(updates: &mut UnboundedReceiver<StreamUpdate>) -> Result<()> {
    let ready = async {
        while let Some(update) = updates.recv().await {
            if update == StreamUpdate::Connected {
                return true;
            }
        }
        false
    };

    match tokio::time::timeout(STREAM_READY_TIMEOUT, ready).await {
        Ok(true) => Ok(()),
        Ok(false) => bail!("Event stream closed before it connected"),
        Err(_) => bail!("Timed out waiting for the event stream"),
    }
}

async fn watch(client: &OpenCodeClient, session: Option<&str>) -> Result<()> {
    let mut updates = client
        .connect_event_channel()
        .context("Failed to open event stream")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => {
                let Some(update) = update else { break };
                if let Some(line) = watch_line(&update, session) {
                    println!("{}", line);
                }
            }
        }
    }

    client.disconnect_event_source();
    Ok(())
}

/// Render one update for `watch`; `None` when filtered out
pub fn watch_line(update: &StreamUpdate, session: Option<&str>) -> Option<String> {
    match update {
        StreamUpdate::Connected => Some("-- connected".to_string()),
        StreamUpdate::Disconnected => Some("-- disconnected".to_string()),
        StreamUpdate::Event(event) => {
            if session.is_some_and(|s| s != event.session_id()) {
                return None;
            }
            Some(match event {
                StreamEvent::Delta {
                    session_id,
                    message_id,
                    delta,
                } => format!("{} {} delta {:?}", session_id, message_id, delta),
                StreamEvent::Idle { session_id } => format!("{} idle", session_id),
                StreamEvent::Error {
                    session_id,
                    message,
                } => format!("{} error {}", session_id, message),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencode_client::MemoryPreferenceStore;
    use serde_json::json;

    fn providers() -> ProvidersResponse {
        serde_json::from_value(json!({
            "all": [
                {"id": "anthropic", "name": "Anthropic", "models": {
                    "haiku": {"name": "Haiku"},
                    "sonnet": {"name": "Sonnet", "limit": {"context": 200000}}
                }},
                {"id": "openai", "models": {"gpt-4o": {}}}
            ],
            "default": {"providerID": "anthropic", "modelID": "sonnet"},
            "connected": ["anthropic"]
        }))
        .unwrap()
    }

    #[test]
    fn test_choose_model_explicit() {
        let selection = choose_model(&providers(), "openai", Some("gpt-4o")).unwrap();
        assert_eq!(selection, ModelSelection::new("openai", "gpt-4o"));
    }

    #[test]
    fn test_choose_model_defaults() {
        let selection = choose_model(&providers(), "anthropic", None).unwrap();
        assert_eq!(selection.model_id, "sonnet");

        // Server default model belongs to another provider
        let selection = choose_model(&providers(), "openai", None).unwrap();
        assert_eq!(selection.model_id, "gpt-4o");
    }

    #[test]
    fn test_choose_model_rejects_unknown() {
        assert!(choose_model(&providers(), "mistral", None).is_err());
        assert!(choose_model(&providers(), "anthropic", Some("opus")).is_err());
    }

    #[test]
    fn test_remember_selection_keeps_server() {
        let store = MemoryPreferenceStore::new(Preferences {
            base_url: "http://host:4096".to_string(),
            ..Default::default()
        });

        remember_selection(&store, &ModelSelection::new("openai", "gpt-4o")).unwrap();

        let saved = store.load().unwrap();
        assert_eq!(saved.base_url, "http://host:4096");
        assert_eq!(saved.last_provider(), Some("openai"));
        assert_eq!(saved.last_model(), Some("gpt-4o"));
    }

    #[test]
    fn test_providers_listing_marks_connected() {
        let listing = providers_listing(&providers());
        assert!(listing.starts_with("* anthropic (Anthropic)\n"));
        assert!(listing.contains("    sonnet  Sonnet  ctx 200000\n"));
        assert!(listing.contains("  openai (openai)\n"));
    }

    #[test]
    fn test_models_listed_in_server_order() {
        let providers: ProvidersResponse = serde_json::from_str(
            r#"{"all":[{"id":"local","models":{"zeta":{},"alpha":{}}}],"connected":[]}"#,
        )
        .unwrap();

        assert_eq!(
            providers_listing(&providers),
            "  local (local)\n    zeta  zeta\n    alpha  alpha\n"
        );
        assert_eq!(choose_model(&providers, "local", None).unwrap().model_id, "zeta");
    }

    #[test]
    fn test_watch_line_filters_by_session() {
        let delta = StreamUpdate::Event(StreamEvent::Delta {
            session_id: "s1".to_string(),
            message_id: "m1".to_string(),
            delta: "hi".to_string(),
        });

        assert_eq!(watch_line(&delta, Some("s2")), None);
        assert_eq!(watch_line(&delta, Some("s1")).unwrap(), "s1 m1 delta \"hi\"");
        assert_eq!(watch_line(&StreamUpdate::Connected, Some("s2")).unwrap(), "-- connected");
    }
}
