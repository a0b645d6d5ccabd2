//! docchat - terminal client for a document question-answering service
//!
//! Keeps the active conversation in a client-side store with optimistic
//! send, retry and edit, and talks to the backend over its JSON API.

mod api;
mod chat;
mod config;
mod conversations;
mod documents;
mod render;
mod repl;

use api::{HttpTransport, LoggingTransport};
use config::{ClientConfig, Preferences};
use repl::{parse, Repl, HELP};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env();
    let preferences = Preferences::load(&config.preferences_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring saved preferences");
        Preferences::default()
    });

    tracing::info!(
        api_url = %config.api_url,
        timeout_secs = config.timeout.as_secs(),
        "Starting docchat"
    );
    let transport = Arc::new(LoggingTransport::new(HttpTransport::new(
        &config.api_url,
        config.timeout,
    )?));
    let mut repl = Repl::new(transport, &config, preferences);

    // Loading indicator driven by store updates
    let mut updates = repl.session().subscribe();
    tokio::spawn(async move {
        let mut was_loading = false;
        while updates.changed().await.is_ok() {
            let loading = updates.borrow_and_update().is_loading;
            if loading && !was_loading {
                let mut stdout = tokio::io::stdout();
                let _ = stdout.write_all(b"...\n").await;
                let _ = stdout.flush().await;
            }
            was_loading = loading;
        }
    });

    let mut stdout = tokio::io::stdout();
    stdout.write_all(HELP.as_bytes()).await?;
    stdout.write_all(b"\n> ").await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut out = String::new();
        let flow = match parse(&line) {
            Ok(Some(command)) => repl.execute(command, &mut out).await,
            Ok(None) => ControlFlow::Continue(()),
            Err(e) => {
                out = format!("{e}\n");
                ControlFlow::Continue(())
            }
        };
        stdout.write_all(out.as_bytes()).await?;
        if flow.is_break() {
            break;
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    stdout.flush().await?;
    Ok(())
}
