//! Inbox triage over stdio.
//!
//! - One JSON request per line on stdin, tagged by `"op"`
//! - One JSON reply per line on stdout: `{"ok": true, "result": ...}` or
//!   `{"ok": false, "error": "..."}`
//! - Logs go to stderr

use std::{io::Write, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use triage_core::{
    config::Config,
    domain::{AutomationPatch, MessageId, StylePatch, ToneProfile, UserId},
    service::{IncomingMessage, TriageService},
    store::{MemoryInbox, MessageQuery, StatusPatch},
};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Register {
        username: String,
    },
    Ingest {
        user_id: UserId,
        sender_name: String,
        content: String,
    },
    Import {
        user_id: UserId,
        messages: Vec<IncomingMessage>,
    },
    Open {
        user_id: UserId,
        message_id: MessageId,
    },
    List {
        user_id: UserId,
        #[serde(default)]
        query: MessageQuery,
    },
    UpdateStatus {
        user_id: UserId,
        message_id: MessageId,
        #[serde(default)]
        status: StatusPatch,
    },
    Stats {
        user_id: UserId,
    },
    /// Classify text without storing it.
    Classify {
        content: String,
    },
    /// Current tone and automation settings.
    Account {
        user_id: UserId,
    },
    UpdateStyle {
        user_id: UserId,
        #[serde(default)]
        style: StylePatch,
    },
    UpdateAutomation {
        user_id: UserId,
        #[serde(default)]
        automation: AutomationPatch,
    },
    /// Render a reply without storing it. Uses `tone`, else the account's
    /// tone when `user_id` is given, else the configured default.
    Preview {
        content: String,
        #[serde(default)]
        tone: Option<ToneProfile>,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    Purge,
}

#[derive(Debug, Serialize)]
struct Reply {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Reply {
    fn ok(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn err(error: impl ToString) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

async fn handle(svc: &TriageService, req: Request) -> triage_core::Result<serde_json::Value> {
    let v = match req {
        Request::Register { username } => json!(svc.register_account(&username).await?),
        Request::Ingest {
            user_id,
            sender_name,
            content,
        } => json!(
            svc.ingest(
                user_id,
                IncomingMessage {
                    sender_name,
                    content
                }
            )
            .await?
        ),
        Request::Import { user_id, messages } => {
            let report = svc.import(user_id, messages).await?;
            json!({
                "imported_count": report.imported.len(),
                "auto_responded_count": report.auto_responses.len(),
                "skipped": report.skipped,
                "imported_messages": report.imported,
                "auto_responses": report.auto_responses,
            })
        }
        Request::Open {
            user_id,
            message_id,
        } => json!(svc.open_message(user_id, message_id).await?),
        Request::List { user_id, query } => json!(svc.list(user_id, query).await?),
        Request::UpdateStatus {
            user_id,
            message_id,
            status,
        } => json!(svc.update_status(user_id, message_id, status).await?),
        Request::Stats { user_id } => json!(svc.stats(user_id).await?),
        Request::Classify { content } => json!(svc.classify_text(&content)),
        Request::Account { user_id } => json!(svc.account(user_id).await?),
        Request::UpdateStyle { user_id, style } => json!(svc.update_style(user_id, style).await?),
        Request::UpdateAutomation {
            user_id,
            automation,
        } => json!(svc.update_automation(user_id, automation).await?),
        Request::Preview {
            content,
            tone,
            user_id,
        } => {
            let tone = match (tone, user_id) {
                (Some(t), _) => t,
                (None, Some(id)) => svc.account(id).await?.tone,
                (None, None) => svc.config().default_tone,
            };
            json!(svc.preview_response(&content, &tone).await?)
        }
        Request::Purge => json!(svc.purge_expired().await?),
    };
    Ok(v)
}

/// Handle one input line. Blank lines produce no reply.
async fn handle_line(svc: &TriageService, line: &str) -> Option<Reply> {
    if line.trim().is_empty() {
        return None;
    }

    let req = match serde_json::from_str::<Request>(line) {
        Ok(v) => v,
        Err(e) => return Some(Reply::err(format!("invalid request: {e}"))),
    };

    Some(match handle(svc, req).await {
        Ok(v) => Reply::ok(v),
        Err(e) => {
            tracing::debug!("request failed: {e}");
            Reply::err(e)
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    triage_core::logging::init("triage")?;

    let cfg = Arc::new(Config::load().context("load config")?);
    let svc = TriageService::from_config(cfg, Arc::new(MemoryInbox::new()))
        .context("build triage service")?;

    tracing::info!("triage running on stdio");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    let mut stdout = std::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let Some(reply) = handle_line(&svc, &line).await else {
            continue;
        };

        let out = serde_json::to_string(&reply)?;
        stdout.write_all(out.as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    Ok(())
}
