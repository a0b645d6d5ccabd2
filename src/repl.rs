//! Line-oriented front end
//!
//! Parses one input line into a [`Command`] and runs it against the
//! stores. Output is collected into a string so the caller decides where
//! it goes.

use crate::api::{ContextMode, HistoryPage, ResponseFormat, Strategy, Transport};
use crate::chat::{export_file_name, ChatError, ChatSession, ExportedMessage, Message, MessageId};
use crate::config::{ClientConfig, Preferences};
use crate::conversations::{self, ConversationIndex, SortKey, SortOrder};
use crate::documents::{self, DocumentLibrary};
use crate::render::{format_timestamp, render_message};
use std::fmt::Write;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HELP: &str = "\
Type a question to send it. Commands:
  /new                      start a new conversation
  /load <id>                switch to a conversation
  /list [recent|messages|title] [asc]
                            list conversations
  /info <id>                show a conversation's summary
  /rename <id> <title>      rename a conversation
  /delete <id>              delete a conversation
  /show                     print the active conversation
  /retry <n> [--drop]       regenerate the answer for message n
  /edit <n> [--drop] <text> edit question n and ask again
  /docs                     list documents
  /upload <path>            upload a document
  /rmdoc <id>               delete a document
  /meta <id> [json]         show or replace document metadata
  /set strategy|format|context <value>
  /export [path]            save the conversation as JSON
  /import <path>            replace the local log with an export
  /help                     show this help
  /quit                     exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    Strategy(Strategy),
    Format(ResponseFormat),
    Context(ContextMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    Load(String),
    List { key: SortKey, order: SortOrder },
    Info(String),
    Rename { conversation_id: String, title: String },
    Delete(String),
    Show,
    /// `position` is 1-based as printed
    Retry { position: usize, drop_history: bool },
    Edit {
        position: usize,
        drop_history: bool,
        text: String,
    },
    Docs,
    Upload(PathBuf),
    RemoveDocument(String),
    Metadata {
        document_id: String,
        replacement: Option<String>,
    },
    Set(SettingChange),
    Export(Option<PathBuf>),
    Import(PathBuf),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: /{0} (try /help)")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Not a message number: {0}")]
    BadPosition(String),
    #[error("{0}")]
    BadValue(String),
}

/// Split off the first whitespace-delimited word
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn required<'a>(word: &'a str, usage: &'static str) -> Result<&'a str, ParseError> {
    if word.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(word)
    }
}

fn position(word: &str, usage: &'static str) -> Result<usize, ParseError> {
    let word = required(word, usage)?;
    match word.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::BadPosition(word.to_string())),
    }
}

/// Parse one input line; blank lines yield `None`
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, rest) = next_word(command);
    let parsed = match name {
        "new" => Command::New,
        "load" => Command::Load(required(rest, "/load <id>")?.to_string()),
        "list" => {
            let usage = "/list [recent|messages|title] [asc]";
            let (column, direction) = next_word(rest);
            let key = match column {
                "" | "recent" => SortKey::LastInteraction,
                "messages" => SortKey::TotalMessages,
                "title" => SortKey::Title,
                _ => return Err(ParseError::Usage(usage)),
            };
            let order = match direction {
                "" | "desc" => SortOrder::Desc,
                "asc" => SortOrder::Asc,
                _ => return Err(ParseError::Usage(usage)),
            };
            Command::List { key, order }
        }
        "info" => Command::Info(required(rest, "/info <id>")?.to_string()),
        "rename" => {
            let (id, title) = next_word(rest);
            let usage = "/rename <id> <title>";
            Command::Rename {
                conversation_id: required(id, usage)?.to_string(),
                title: required(title, usage)?.to_string(),
            }
        }
        "delete" => Command::Delete(required(rest, "/delete <id>")?.to_string()),
        "show" => Command::Show,
        "retry" => {
            let usage = "/retry <n> [--drop]";
            let (n, flag) = next_word(rest);
            let drop_history = match flag {
                "" => false,
                "--drop" => true,
                _ => return Err(ParseError::Usage(usage)),
            };
            Command::Retry {
                position: position(n, usage)?,
                drop_history,
            }
        }
        "edit" => {
            let usage = "/edit <n> [--drop] <text>";
            let (n, rest) = next_word(rest);
            let (drop_history, text) = match next_word(rest) {
                ("--drop", text) => (true, text),
                _ => (false, rest),
            };
            Command::Edit {
                position: position(n, usage)?,
                drop_history,
                text: required(text, usage)?.to_string(),
            }
        }
        "docs" => Command::Docs,
        "upload" => Command::Upload(PathBuf::from(required(rest, "/upload <path>")?)),
        "rmdoc" => Command::RemoveDocument(required(rest, "/rmdoc <id>")?.to_string()),
        "meta" => {
            let (id, json) = next_word(rest);
            Command::Metadata {
                document_id: required(id, "/meta <id> [json]")?.to_string(),
                replacement: (!json.is_empty()).then(|| json.to_string()),
            }
        }
        "set" => {
            let usage = "/set strategy|format|context <value>";
            let (field, value) = next_word(rest);
            let value = required(value, usage)?;
            let change = match field {
                "strategy" => value.parse().map(SettingChange::Strategy),
                "format" => value.parse().map(SettingChange::Format),
                "context" => value.parse().map(SettingChange::Context),
                _ => return Err(ParseError::Usage(usage)),
            };
            Command::Set(change.map_err(ParseError::BadValue)?)
        }
        "export" => Command::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "import" => Command::Import(PathBuf::from(required(rest, "/import <path>")?)),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(parsed))
}

/// The stores behind one terminal session
pub struct Repl<T> {
    session: ChatSession<T>,
    index: ConversationIndex<T>,
    library: DocumentLibrary<T>,
    preferences: Preferences,
    preferences_path: PathBuf,
    page: HistoryPage,
}

impl<T: Transport + Clone> Repl<T> {
    pub fn new(transport: T, config: &ClientConfig, preferences: Preferences) -> Self {
        Self {
            session: ChatSession::new(transport.clone()).with_history_page(config.history_page()),
            index: ConversationIndex::new(transport.clone()),
            library: DocumentLibrary::new(transport),
            preferences,
            preferences_path: config.preferences_path.clone(),
            page: config.history_page(),
        }
    }

    pub fn session(&self) -> &ChatSession<T> {
        &self.session
    }

    /// Run a command, appending what it prints to `out`
    pub async fn execute(&mut self, command: Command, out: &mut String) -> ControlFlow<()> {
        let settings = self.preferences.settings;
        match command {
            Command::Send(text) => {
                if self.session.conversation_id().is_none() {
                    if let Err(e) = self.session.create_conversation().await {
                        report(out, &e);
                        return ControlFlow::Continue(());
                    }
                }
                match self.session.send_message(&text, settings).await {
                    Ok(()) => self.print_last(out),
                    Err(e) => report(out, &e),
                }
            }
            Command::New => match self.session.create_conversation().await {
                Ok(id) => {
                    let _ = writeln!(out, "Started conversation {}", conversations::short_id(&id));
                }
                Err(e) => report(out, &e),
            },
            Command::Load(id) => match self.session.load_conversation(Some(&id)).await {
                Ok(()) => self.print_log(out),
                Err(e) => report(out, &e),
            },
            Command::List { key, order } => self.list_conversations(key, order, out).await,
            Command::Info(id) => match self.index.detail(&id, &self.page).await {
                Ok(detail) => {
                    let summary = &detail.summary;
                    let _ = writeln!(
                        out,
                        "{}  {}\n  {} messages, last active {}",
                        conversations::short_id(&summary.conversation_id),
                        conversations::display_title(summary),
                        summary.total_messages,
                        format_timestamp(summary.last_interaction.as_deref().unwrap_or_default())
                    );
                    for question in &summary.questions_asked {
                        let _ = writeln!(out, "  ? {question}");
                    }
                }
                Err(e) => report(out, &e),
            },
            Command::Rename {
                conversation_id,
                title,
            } => match self.index.rename(&conversation_id, &title, None).await {
                Ok(detail) => {
                    let _ = writeln!(out, "Renamed to {}", conversations::display_title(&detail.summary));
                }
                Err(e) => banner(out, self.index.snapshot().error, &e),
            },
            Command::Delete(id) => match self.index.remove(&id).await {
                Ok(()) => {
                    self.session.conversation_deleted(&id);
                    let _ = writeln!(out, "Deleted {}", conversations::short_id(&id));
                }
                Err(e) => banner(out, self.index.snapshot().error, &e),
            },
            Command::Show => self.print_log(out),
            Command::Retry {
                position,
                drop_history,
            } => match self.message_at(position) {
                Some(id) => match self
                    .session
                    .retry_message(id, None, !drop_history, settings)
                    .await
                {
                    Ok(()) => self.print_log(out),
                    Err(e) => report(out, &e),
                },
                None => missing_position(out, position),
            },
            Command::Edit {
                position,
                drop_history,
                text,
            } => match self.message_at(position) {
                Some(id) => match self
                    .session
                    .edit_message(id, &text, !drop_history, settings)
                    .await
                {
                    Ok(()) => self.print_log(out),
                    Err(e) => report(out, &e),
                },
                None => missing_position(out, position),
            },
            Command::Docs => match self.library.refresh().await {
                Ok(docs) if docs.is_empty() => out.push_str("No documents\n"),
                Ok(docs) => {
                    for doc in &docs {
                        let _ = writeln!(
                            out,
                            "{}  {}",
                            doc.id.as_deref().unwrap_or("-"),
                            documents::display_name(doc)
                        );
                    }
                }
                Err(e) => banner(out, self.library.snapshot().error, &e),
            },
            Command::Upload(path) => match self.library.upload_file(&path, None).await {
                Ok(doc) => {
                    let _ = writeln!(out, "Uploaded {}", documents::display_name(&doc));
                }
                Err(e) => banner(out, self.library.snapshot().error, &e),
            },
            Command::RemoveDocument(id) => match self.library.remove(&id).await {
                Ok(()) => {
                    let _ = writeln!(out, "Deleted document {id}");
                }
                Err(e) => banner(out, self.library.snapshot().error, &e),
            },
            Command::Metadata {
                document_id,
                replacement,
            } => self.document_metadata(&document_id, replacement, out).await,
            Command::Set(change) => self.change_setting(change, out),
            Command::Export(path) => self.export(path, out).await,
            Command::Import(path) => self.import(&path, out).await,
            Command::Help => {
                out.push_str(HELP);
                out.push('\n');
            }
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn message_at(&self, position: usize) -> Option<MessageId> {
        let state = self.session.snapshot();
        state.messages.get(position.checked_sub(1)?).map(|m| m.id)
    }

    fn print_log(&self, out: &mut String) {
        let state = self.session.snapshot();
        if state.messages.is_empty() {
            out.push_str("(no messages)\n");
        }
        for (i, message) in state.messages.iter().enumerate() {
            let pending = state.pending_message_id == Some(message.id);
            out.push_str(&render_message(i + 1, message, pending));
        }
    }

    fn print_last(&self, out: &mut String) {
        let state = self.session.snapshot();
        if let Some(last) = state.messages.last() {
            out.push_str(&render_message(state.messages.len(), last, false));
        }
    }

    async fn list_conversations(&self, key: SortKey, order: SortOrder, out: &mut String) {
        if let Err(e) = self.index.refresh().await {
            banner(out, self.index.snapshot().error, &e);
            return;
        }
        let list = self.index.sorted(key, order);
        if list.is_empty() {
            out.push_str("No conversations\n");
        }
        let active = self.session.conversation_id();
        for summary in &list {
            let marker = if active.as_deref() == Some(summary.conversation_id.as_str()) {
                '*'
            } else {
                ' '
            };
            let _ = writeln!(
                out,
                "{marker} {}  {}  ({} messages, {})",
                summary.conversation_id,
                summary
                    .title
                    .clone()
                    .unwrap_or_else(|| conversations::question_preview(summary)),
                summary.total_messages,
                format_timestamp(summary.last_interaction.as_deref().unwrap_or_default())
            );
        }
    }

    async fn document_metadata(
        &self,
        document_id: &str,
        replacement: Option<String>,
        out: &mut String,
    ) {
        let result = match replacement {
            None => self.library.metadata(document_id).await,
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => self.library.update_metadata(document_id, &value).await,
                Err(e) => {
                    let _ = writeln!(out, "Error: invalid JSON: {e}");
                    return;
                }
            },
        };
        match result.map(|value| serde_json::to_string_pretty(&value)) {
            Ok(Ok(pretty)) => {
                let _ = writeln!(out, "{pretty}");
            }
            Ok(Err(e)) => report(out, &e),
            Err(e) => report(out, &e),
        }
    }

    fn change_setting(&mut self, change: SettingChange, out: &mut String) {
        let settings = &mut self.preferences.settings;
        match change {
            SettingChange::Strategy(v) => settings.strategy = v,
            SettingChange::Format(v) => settings.response_format = v,
            SettingChange::Context(v) => settings.context_mode = v,
        }
        let _ = writeln!(
            out,
            "strategy={} format={} context={}",
            settings.strategy, settings.response_format, settings.context_mode
        );
        if let Err(e) = self.preferences.save(&self.preferences_path) {
            report(out, &e);
        }
    }

    /// Replace the local log with a saved export; the server is not told
    ///
    /// Without an active conversation one is created first, so the first
    /// question asked afterwards does not start over with an empty log.
    async fn import(&self, path: &Path, out: &mut String) {
        let parsed = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|json| {
                serde_json::from_str::<Vec<ExportedMessage>>(&json).map_err(|e| e.to_string())
            });
        let exported = match parsed {
            Ok(exported) => exported,
            Err(e) => {
                let _ = writeln!(out, "Error: {e}");
                return;
            }
        };
        if self.session.conversation_id().is_none() {
            match self.session.create_conversation().await {
                Ok(id) => {
                    let _ = writeln!(out, "Started conversation {}", conversations::short_id(&id));
                }
                Err(e) => {
                    report(out, &e);
                    return;
                }
            }
        }
        // Ids are re-keyed by the store
        let messages = exported
            .into_iter()
            .map(|entry| Message {
                id: MessageId(0),
                role: entry.role,
                content: entry.content,
                timestamp: entry.timestamp,
                metadata: None,
                sources: Vec::new(),
            })
            .collect();
        match self.session.set_messages(messages) {
            Ok(()) => self.print_log(out),
            Err(e) => report(out, &e),
        }
    }

    async fn export(&self, path: Option<PathBuf>, out: &mut String) {
        let Some(conversation_id) = self.session.conversation_id() else {
            report(out, &ChatError::NoActiveConversation);
            return;
        };
        let path = path.unwrap_or_else(|| PathBuf::from(export_file_name(&conversation_id)));
        let written = match serde_json::to_string_pretty(&self.session.export()) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(()) => {
                let _ = writeln!(out, "Saved {}", path.display());
            }
            Err(e) => {
                let _ = writeln!(out, "Error: {e}");
            }
        }
    }
}

/// Store banner first, then the underlying cause
fn banner(out: &mut String, headline: Option<String>, error: &dyn std::error::Error) {
    match headline {
        Some(headline) => {
            let _ = writeln!(out, "Error: {headline} ({error})");
        }
        None => report(out, error),
    }
}

fn missing_position(out: &mut String, position: usize) {
    let _ = writeln!(out, "Error: No message number {position}");
}

fn report(out: &mut String, error: &dyn std::error::Error) {
    let _ = writeln!(out, "Error: {error}");
}
