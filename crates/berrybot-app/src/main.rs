//! Berrybot application binary - composition root.
//!
//! Loads configuration, installs logging and dispatches the subcommand:
//! the local gateway server, the interactive chat client, or one of the
//! admin commands.

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use berrybot_admin::{AdminClient, AdminError, AnalyticsView, UserDirectoryAuth};
use berrybot_api::auth::load_or_generate_token;
use berrybot_api::{start_server, AppState};
use berrybot_chat::{ChatClient, ChatError, ChatEvent, SendOutcome, WebSocketGateway};
use berrybot_core::config::{expand_home, BerrybotConfig, ChatConfig};
use berrybot_core::credentials::CredentialProvider;

use crate::cli::{CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match BerrybotConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (BerrybotConfig::default(), Some(e)),
    };
    args.apply_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config. Using defaults."
        ),
    }

    let credentials = args.resolve_credentials(&config);
    let result = match args.command {
        Command::Serve { .. } => serve(config).await,
        Command::Chat => chat(&config, credentials).await,
        Command::Login { username, password } => login(&config, &username, password).await,
        Command::Refresh => {
            UserDirectoryAuth::from_config(&config.auth).refresh().await?;
            println!("Access token refreshed.");
            Ok(())
        }
        Command::Logout => {
            UserDirectoryAuth::from_config(&config.auth).logout()?;
            println!("Logged out.");
            Ok(())
        }
        Command::Files => list_files(&admin_client(&config, credentials)?).await,
        Command::Upload {
            path,
            name,
            content_type,
        } => {
            let admin = admin_client(&config, credentials)?;
            let stored = upload(&admin, &path, name.as_deref(), content_type.as_deref()).await?;
            println!("Uploaded {}. Knowledge base sync initiated.", stored);
            Ok(())
        }
        Command::Download { key, output } => {
            let admin = admin_client(&config, credentials)?;
            let bytes = admin.download_file(&key).await.map_err(explain)?;
            let output = output.unwrap_or_else(|| {
                key.rsplit('/').next().unwrap_or(key.as_str()).into()
            });
            std::fs::write(&output, &bytes)?;
            println!("Saved {} ({} bytes) to {}", key, bytes.len(), output.display());
            Ok(())
        }
        Command::Delete { key } => {
            let admin = admin_client(&config, credentials)?;
            let resp = admin.delete_file(&key).await.map_err(explain)?;
            println!("{}: {}", resp.message, resp.deleted_file);
            Ok(())
        }
        Command::Sync => {
            let admin = admin_client(&config, credentials)?;
            let resp = admin.sync_knowledge_base().await.map_err(explain)?;
            match resp.details.job_id {
                Some(job) => println!("{} (job {})", resp.message, job),
                None => println!(
                    "{} ({})",
                    resp.message,
                    resp.details.message.unwrap_or(resp.details.status)
                ),
            }
            Ok(())
        }
        Command::Analytics { timeframe } => {
            let admin = admin_client(&config, credentials)?;
            let report = admin.fetch_analytics(timeframe).await.map_err(explain)?;
            print!("{}", AnalyticsView::from_report(&report));
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

/// Turn "log in again" errors into an actionable message.
fn explain(err: AdminError) -> Box<dyn std::error::Error> {
    if err.needs_login() {
        format!("{}. Run `berrybot login` first.", err).into()
    } else {
        err.into()
    }
}

fn admin_client(
    config: &BerrybotConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> AppResult<AdminClient> {
    Ok(AdminClient::from_config(&config.gateway, credentials)?)
}

async fn serve(config: BerrybotConfig) -> AppResult<()> {
    tracing::info!("Starting Berrybot v{}", env!("CARGO_PKG_VERSION"));
    let token_path = expand_home(&config.server.api_token_file);
    let mut state = AppState::from_config(config)?;
    state.api_token = load_or_generate_token(&token_path);
    tracing::info!(
        "Clients authenticate with the token in {}",
        token_path.display()
    );
    start_server(state).await?;
    Ok(())
}

async fn login(config: &BerrybotConfig, username: &str, password: Option<String>) -> AppResult<()> {
    let password = match password.or_else(|| std::env::var("BERRYBOT_PASSWORD").ok()) {
        Some(password) => password,
        None => {
            print!("Password: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    let auth = UserDirectoryAuth::from_config(&config.auth);
    auth.login(username, &password).await?;
    println!("Logged in as {}.", username);
    Ok(())
}

async fn list_files(admin: &AdminClient) -> AppResult<()> {
    let listing = admin.list_files().await.map_err(explain)?;
    if listing.files.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for file in &listing.files {
        println!("{:>10}  {}  {}", file.size, file.last_modified, file.key);
    }
    Ok(())
}

async fn upload(
    admin: &AdminClient,
    path: &Path,
    name: Option<&str>,
    content_type: Option<&str>,
) -> AppResult<String> {
    let bytes = std::fs::read(path)?;
    let name = name
        .map(str::to_string)
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().to_string()));
    let resp = admin
        .upload_file(name.as_deref(), content_type, &bytes)
        .await
        .map_err(explain)?;
    Ok(resp.file.name)
}

fn print_bot(text: &str) {
    println!("bot> {}", text);
}

/// Interactive chat on stdin/stdout. `/upload <path>` attaches a document,
/// `/quit` or end of input leaves.
async fn chat(config: &BerrybotConfig, credentials: Arc<dyn CredentialProvider>) -> AppResult<()> {
    let gateway = WebSocketGateway::new(&config.gateway.websocket_url)?;
    let chat_config: ChatConfig = config.chat.clone();
    let (client, mut events) = ChatClient::new(
        chat_config.clone(),
        Arc::new(gateway),
        Arc::clone(&credentials),
    );

    for message in client.messages()? {
        print_bot(&message.content);
    }

    let printer_config = chat_config.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::Resolved { text, .. } => print_bot(&text),
                ChatEvent::ParseFailed { .. } => print_bot(&printer_config.parse_error_text),
                ChatEvent::EmailRequested => print_bot(&printer_config.email_request_text),
                ChatEvent::ConnectionError { message, .. } => {
                    eprintln!("[connection error: {}]", message)
                }
                ChatEvent::ConnectionClosed { code, reason, .. } => {
                    eprintln!("[connection closed: {} {}]", code, reason)
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if let Some(path) = line.strip_prefix("/upload ") {
            let admin = admin_client(config, Arc::clone(&credentials))?;
            match upload(&admin, Path::new(path.trim()), None, None).await {
                Ok(name) => {
                    client.note_file_upload(&name)?;
                    print_bot(&format!("File uploaded: {}", name));
                }
                Err(e) => eprintln!("[upload failed: {}]", e),
            }
            continue;
        }

        match client.send(line).await {
            Ok(SendOutcome::LocationCaptured) => print_bot(&chat_config.location_ack),
            Ok(SendOutcome::EmailCaptured { .. }) => {
                print_bot(&chat_config.email_confirmation_text)
            }
            Ok(SendOutcome::Dispatched { .. }) => {}
            Err(ChatError::EmptyMessage) => {}
            // Already reported through the event stream.
            Err(ChatError::Gateway(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    drop(client);
    printer.abort();
    Ok(())
}
