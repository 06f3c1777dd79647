use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{
    domain::{ClassificationResult, ComposedResponse, MessageId, UserId},
    errors::Error,
    store::PurgeReport,
    Result,
};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_respond: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purged_messages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purged_responses: Option<usize>,
}

impl AuditEvent {
    fn blank(event: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id: None,
            message_id: None,
            tier: None,
            score: None,
            auto_respond: None,
            category: None,
            content: None,
            response: None,
            purged_messages: None,
            purged_responses: None,
        }
    }

    pub fn classified(
        user_id: UserId,
        message_id: MessageId,
        content: &str,
        result: &ClassificationResult,
        auto_respond: bool,
    ) -> Self {
        Self {
            user_id: Some(user_id.0),
            message_id: Some(message_id.0),
            tier: Some(result.tier.to_string()),
            score: Some(result.score),
            auto_respond: Some(auto_respond),
            content: Some(content.to_string()),
            ..Self::blank("classified")
        }
    }

    pub fn auto_response(user_id: UserId, message_id: MessageId, reply: &ComposedResponse) -> Self {
        Self {
            user_id: Some(user_id.0),
            message_id: Some(message_id.0),
            category: Some(reply.category_used.to_string()),
            response: Some(reply.text.clone()),
            ..Self::blank("auto_response")
        }
    }

    pub fn purge(report: &PurgeReport) -> Self {
        Self {
            purged_messages: Some(report.messages),
            purged_responses: Some(report.responses),
            ..Self::blank("purge")
        }
    }
}

/// Append-only audit trail, either JSON lines or readable blocks.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.response {
            event.response = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        file.write_all(render_block(&event)?.as_bytes())?;
        Ok(())
    }
}

/// Readable entry: a `[timestamp] event` header, then one indented line per
/// populated field.
fn render_block(event: &AuditEvent) -> Result<String> {
    let serde_json::Value::Object(fields) = serde_json::to_value(event)? else {
        return Err(Error::External("audit event is not a JSON object".to_string()));
    };

    let mut out = format!("[{}] {}\n", event.timestamp, event.event);
    for (key, value) in fields
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "timestamp" | "event"))
    {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("  {key}: {text}\n"));
    }
    Ok(out)
}

/// Cut to `max_len` chars, appending `...` when anything was dropped.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
