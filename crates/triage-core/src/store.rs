//! Persistence port for triaged messages, responses, and account settings.
//!
//! `MemoryInbox` is the in-process adapter; durable adapters implement the same
//! trait. Records carry their retention deadline, computed by the caller.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{
        AccountSettings, ClassificationResult, MessageId, ResponseId, RiskTier, TemplateCategory,
        ToneProfile, UserId,
    },
    errors::Error,
    retention::is_expired,
    Result,
};

// ============== Records ==============

#[derive(Clone, Debug)]
pub struct NewMessage {
    pub user_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub classification: ClassificationResult,
    pub scheduled_deletion: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub user_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub classification: ClassificationResult,
    pub is_read: bool,
    pub is_archived: bool,
    pub is_flagged: bool,
    pub scheduled_deletion: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewResponse {
    pub user_id: UserId,
    pub message_id: MessageId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_auto_generated: bool,
    pub template_used: Option<TemplateCategory>,
    pub tone: Option<ToneProfile>,
    pub scheduled_deletion: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub id: ResponseId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_auto_generated: bool,
    pub template_used: Option<TemplateCategory>,
    pub tone: Option<ToneProfile>,
    pub scheduled_deletion: DateTime<Utc>,
}

// ============== Queries ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    #[serde(default)]
    pub risk_tier: Option<RiskTier>,
    #[serde(default)]
    pub is_read: Option<bool>,
    /// 1-based.
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn first_page() -> usize {
    1
}

fn default_per_page() -> usize {
    20
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            risk_tier: None,
            is_read: None,
            page: first_page(),
            per_page: default_per_page(),
        }
    }
}

impl MessageQuery {
    fn matches(&self, m: &StoredMessage) -> bool {
        self.risk_tier.map_or(true, |t| m.classification.tier == t)
            && self.is_read.map_or(true, |r| m.is_read == r)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub pages: usize,
    pub current_page: usize,
}

impl<T: Clone> Page<T> {
    /// Slice an already-ordered list. `page` is 1-based; `per_page` of 0 is
    /// treated as 1.
    pub fn slice(all: &[T], page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total = all.len();
        let pages = total.div_ceil(per_page);
        let items = all
            .iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .cloned()
            .collect();
        Self {
            items,
            total,
            pages,
            current_page: page,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub is_flagged: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub messages: usize,
    pub responses: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InboxStats {
    pub total: usize,
    pub safe: usize,
    pub low_risk: usize,
    pub high_risk: usize,
    pub unread: usize,
    pub auto_response_count: usize,
    pub auto_response_percentage: f64,
}

// ============== Port ==============

#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn put_account(&self, settings: AccountSettings) -> Result<()>;
    async fn account(&self, user_id: UserId) -> Result<AccountSettings>;
    async fn next_user_id(&self) -> Result<UserId>;

    async fn insert_message(&self, msg: NewMessage) -> Result<StoredMessage>;
    async fn insert_response(&self, resp: NewResponse) -> Result<StoredResponse>;

    async fn message(&self, user_id: UserId, id: MessageId) -> Result<StoredMessage>;
    async fn responses_for(&self, user_id: UserId, id: MessageId) -> Result<Vec<StoredResponse>>;
    async fn list_messages(&self, user_id: UserId, query: MessageQuery)
        -> Result<Page<StoredMessage>>;
    async fn update_status(
        &self,
        user_id: UserId,
        id: MessageId,
        patch: StatusPatch,
    ) -> Result<StoredMessage>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport>;
    async fn stats(&self, user_id: UserId) -> Result<InboxStats>;
}

// ============== In-memory adapter ==============

#[derive(Debug, Default)]
struct Inner {
    accounts: BTreeMap<UserId, AccountSettings>,
    messages: BTreeMap<MessageId, StoredMessage>,
    responses: BTreeMap<ResponseId, StoredResponse>,
    last_user_id: i64,
    last_message_id: i64,
    last_response_id: i64,
}

impl Inner {
    fn owned_message(&self, user_id: UserId, id: MessageId) -> Result<&StoredMessage> {
        self.messages
            .get(&id)
            .filter(|m| m.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("message {}", id.0)))
    }
}

#[derive(Debug, Default)]
pub struct MemoryInbox {
    inner: Mutex<Inner>,
}

impl MemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InboxStore for MemoryInbox {
    async fn put_account(&self, settings: AccountSettings) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.last_user_id = inner.last_user_id.max(settings.user_id.0);
        inner.accounts.insert(settings.user_id, settings);
        Ok(())
    }

    async fn account(&self, user_id: UserId) -> Result<AccountSettings> {
        self.inner
            .lock()
            .await
            .accounts
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("account {}", user_id.0)))
    }

    async fn next_user_id(&self) -> Result<UserId> {
        let mut inner = self.inner.lock().await;
        inner.last_user_id += 1;
        Ok(UserId(inner.last_user_id))
    }

    async fn insert_message(&self, msg: NewMessage) -> Result<StoredMessage> {
        let mut inner = self.inner.lock().await;
        inner.last_message_id += 1;
        let stored = StoredMessage {
            id: MessageId(inner.last_message_id),
            user_id: msg.user_id,
            sender_name: msg.sender_name,
            content: msg.content,
            created_at: msg.created_at,
            classification: msg.classification,
            is_read: false,
            is_archived: false,
            is_flagged: false,
            scheduled_deletion: msg.scheduled_deletion,
        };
        inner.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn insert_response(&self, resp: NewResponse) -> Result<StoredResponse> {
        let mut inner = self.inner.lock().await;
        inner.owned_message(resp.user_id, resp.message_id)?;
        inner.last_response_id += 1;
        let stored = StoredResponse {
            id: ResponseId(inner.last_response_id),
            user_id: resp.user_id,
            message_id: resp.message_id,
            content: resp.content,
            created_at: resp.created_at,
            is_auto_generated: resp.is_auto_generated,
            template_used: resp.template_used,
            tone: resp.tone,
            scheduled_deletion: resp.scheduled_deletion,
        };
        inner.responses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn message(&self, user_id: UserId, id: MessageId) -> Result<StoredMessage> {
        let inner = self.inner.lock().await;
        inner.owned_message(user_id, id).cloned()
    }

    async fn responses_for(&self, user_id: UserId, id: MessageId) -> Result<Vec<StoredResponse>> {
        let inner = self.inner.lock().await;
        inner.owned_message(user_id, id)?;
        Ok(inner
            .responses
            .values()
            .filter(|r| r.message_id == id)
            .cloned()
            .collect())
    }

    async fn list_messages(
        &self,
        user_id: UserId,
        query: MessageQuery,
    ) -> Result<Page<StoredMessage>> {
        let inner = self.inner.lock().await;
        let mut matching = inner
            .messages
            .values()
            .filter(|m| m.user_id == user_id && query.matches(m))
            .cloned()
            .collect::<Vec<_>>();
        // Newest first; ids break ties between same-instant inserts.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::slice(&matching, query.page, query.per_page))
    }

    async fn update_status(
        &self,
        user_id: UserId,
        id: MessageId,
        patch: StatusPatch,
    ) -> Result<StoredMessage> {
        let mut inner = self.inner.lock().await;
        inner.owned_message(user_id, id)?;
        let Some(msg) = inner.messages.get_mut(&id) else {
            return Err(Error::NotFound(format!("message {}", id.0)));
        };
        if let Some(v) = patch.is_read {
            msg.is_read = v;
        }
        if let Some(v) = patch.is_archived {
            msg.is_archived = v;
        }
        if let Some(v) = patch.is_flagged {
            msg.is_flagged = v;
        }
        Ok(msg.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let mut inner = self.inner.lock().await;
        let before_messages = inner.messages.len();
        let before_responses = inner.responses.len();

        inner
            .messages
            .retain(|_, m| !is_expired(m.scheduled_deletion, now));
        // Responses go with their expired message as well as on their own deadline.
        let Inner {
            messages,
            responses,
            ..
        } = &mut *inner;
        responses.retain(|_, r| {
            !is_expired(r.scheduled_deletion, now) && messages.contains_key(&r.message_id)
        });

        Ok(PurgeReport {
            messages: before_messages - inner.messages.len(),
            responses: before_responses - inner.responses.len(),
        })
    }

    async fn stats(&self, user_id: UserId) -> Result<InboxStats> {
        let inner = self.inner.lock().await;
        let mut stats = InboxStats::default();

        for m in inner.messages.values().filter(|m| m.user_id == user_id) {
            stats.total += 1;
            match m.classification.tier {
                RiskTier::Safe => stats.safe += 1,
                RiskTier::LowRisk => stats.low_risk += 1,
                RiskTier::HighRisk => stats.high_risk += 1,
            }
            if !m.is_read {
                stats.unread += 1;
            }
        }

        stats.auto_response_count = inner
            .responses
            .values()
            .filter(|r| r.user_id == user_id && r.is_auto_generated)
            .count();

        if stats.total > 0 {
            stats.auto_response_percentage =
                stats.auto_response_count as f64 / stats.total as f64 * 100.0;
        }

        Ok(stats)
    }
}
