//! Triage pipeline: classify, persist, and (when the policy allows) auto-reply.
//!
//! The service is the caller the classifier and composer were designed for. It
//! owns retention deadlines and the account lookups; both engines stay pure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    classifier::{should_auto_respond, KeywordTable, RiskClassifier},
    composer::generate_response,
    config::Config,
    domain::{
        AccountSettings, AutomationPatch, AutomationPolicy, ClassificationResult,
        ComposedResponse, MessageId, RiskTier, StylePatch, ToneProfile, UserId,
    },
    errors::Error,
    retention::RetentionPolicy,
    rng::{RandomSource, SeededRandom, ThreadRandom},
    store::{
        InboxStats, InboxStore, MessageQuery, NewMessage, NewResponse, Page, PurgeReport,
        StatusPatch, StoredMessage, StoredResponse,
    },
    templates::TemplateLibrary,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub sender_name: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub message: StoredMessage,
    pub auto_response: Option<StoredResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: Vec<StoredMessage>,
    pub auto_responses: Vec<StoredResponse>,
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageDetail {
    pub message: StoredMessage,
    pub responses: Vec<StoredResponse>,
}

/// Stateless classification with the keyword that decided the tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextClassification {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub matched_keyword: Option<String>,
}

pub struct TriageService {
    cfg: Arc<Config>,
    classifier: RiskClassifier,
    library: Arc<TemplateLibrary>,
    retention: RetentionPolicy,
    rng: Mutex<Box<dyn RandomSource>>,
    store: Arc<dyn InboxStore>,
    audit: Option<AuditLogger>,
}

impl TriageService {
    pub fn new(
        cfg: Arc<Config>,
        classifier: RiskClassifier,
        library: Arc<TemplateLibrary>,
        store: Arc<dyn InboxStore>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let retention = RetentionPolicy::new(cfg.retention_period);
        Self {
            cfg,
            classifier,
            library,
            retention,
            rng: Mutex::new(rng),
            store,
            audit: None,
        }
    }

    /// Wire everything from config: rule data overrides, seed, audit log.
    pub fn from_config(cfg: Arc<Config>, store: Arc<dyn InboxStore>) -> Result<Self> {
        let table = match &cfg.keyword_table_path {
            Some(path) => KeywordTable::load(path)?,
            None => KeywordTable::default(),
        };
        let library = match &cfg.template_library_path {
            Some(path) => TemplateLibrary::load(path)?,
            None => TemplateLibrary::default(),
        };
        let rng: Box<dyn RandomSource> = match cfg.rng_seed {
            Some(seed) => Box::new(SeededRandom::new(seed)),
            None => Box::new(ThreadRandom),
        };
        let audit = cfg
            .audit_log_path
            .as_ref()
            .map(|p| AuditLogger::new(p.clone(), cfg.audit_log_json));

        info!(
            keyword_table_version = table.version,
            seeded = cfg.rng_seed.is_some(),
            audit = audit.is_some(),
            "triage service configured"
        );

        let svc = Self::new(
            cfg,
            RiskClassifier::new(table),
            Arc::new(library),
            store,
            rng,
        );
        Ok(match audit {
            Some(a) => svc.with_audit(a),
            None => svc,
        })
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    // ============== Accounts ==============

    pub async fn register_account(&self, username: &str) -> Result<AccountSettings> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidInput("username is required".to_string()));
        }
        let settings = AccountSettings {
            user_id: self.store.next_user_id().await?,
            username: username.to_string(),
            tone: self.cfg.default_tone,
            policy: self.cfg.default_policy,
        };
        self.store.put_account(settings.clone()).await?;
        info!(user_id = settings.user_id.0, "registered account");
        Ok(settings)
    }

    pub async fn account(&self, user_id: UserId) -> Result<AccountSettings> {
        self.store.account(user_id).await
    }

    pub async fn update_style(&self, user_id: UserId, patch: StylePatch) -> Result<ToneProfile> {
        let mut settings = self.store.account(user_id).await?;
        settings.tone.apply(&patch);
        let tone = settings.tone;
        self.store.put_account(settings).await?;
        Ok(tone)
    }

    pub async fn update_automation(
        &self,
        user_id: UserId,
        patch: AutomationPatch,
    ) -> Result<AutomationPolicy> {
        let mut settings = self.store.account(user_id).await?;
        settings.policy.apply(&patch);
        let policy = settings.policy;
        self.store.put_account(settings).await?;
        Ok(policy)
    }

    // ============== Triage ==============

    pub async fn ingest(&self, user_id: UserId, msg: IncomingMessage) -> Result<TriageOutcome> {
        let settings = self.store.account(user_id).await?;
        self.ingest_at(&settings, msg, Utc::now()).await
    }

    /// Ingest with an explicit clock reading.
    pub async fn ingest_at(
        &self,
        settings: &AccountSettings,
        msg: IncomingMessage,
        now: DateTime<Utc>,
    ) -> Result<TriageOutcome> {
        if msg.sender_name.trim().is_empty() {
            return Err(Error::InvalidInput("sender_name is required".to_string()));
        }

        let classification = self.classifier.classify(&msg.content);
        let auto = should_auto_respond(classification.tier, &settings.policy);
        if auto {
            settings.tone.validate()?;
        }
        let deadline = self.retention.deadline(now);

        let message = self
            .store
            .insert_message(NewMessage {
                user_id: settings.user_id,
                sender_name: msg.sender_name,
                content: msg.content,
                created_at: now,
                classification,
                scheduled_deletion: deadline,
            })
            .await?;

        debug!(
            user_id = settings.user_id.0,
            message_id = message.id.0,
            tier = %classification.tier,
            auto_respond = auto,
            "classified message"
        );
        self.audit(AuditEvent::classified(
            settings.user_id,
            message.id,
            &message.content,
            &classification,
            auto,
        ));

        if !auto {
            return Ok(TriageOutcome {
                message,
                auto_response: None,
            });
        }

        let composed = self.compose(&message.content, &settings.tone).await?;
        let response = self
            .store
            .insert_response(NewResponse {
                user_id: settings.user_id,
                message_id: message.id,
                content: composed.text.clone(),
                created_at: now,
                is_auto_generated: true,
                template_used: Some(composed.category_used),
                tone: Some(composed.tone),
                scheduled_deletion: deadline,
            })
            .await?;

        info!(
            user_id = settings.user_id.0,
            message_id = message.id.0,
            category = %composed.category_used,
            "auto-responded"
        );
        self.audit(AuditEvent::auto_response(
            settings.user_id,
            message.id,
            &composed,
        ));

        Ok(TriageOutcome {
            message,
            auto_response: Some(response),
        })
    }

    /// Ingest a batch; entries without a sender or content are skipped.
    pub async fn import(
        &self,
        user_id: UserId,
        batch: Vec<IncomingMessage>,
    ) -> Result<ImportReport> {
        let settings = self.store.account(user_id).await?;
        if settings.policy.any_enabled() {
            settings.tone.validate()?;
        }
        let now = Utc::now();
        let mut report = ImportReport::default();

        for msg in batch {
            if msg.sender_name.trim().is_empty() || msg.content.is_empty() {
                report.skipped += 1;
                continue;
            }
            let outcome = self.ingest_at(&settings, msg, now).await?;
            report.imported.push(outcome.message);
            report.auto_responses.extend(outcome.auto_response);
        }

        info!(
            user_id = user_id.0,
            imported = report.imported.len(),
            auto_responded = report.auto_responses.len(),
            skipped = report.skipped,
            "import finished"
        );
        Ok(report)
    }

    /// Classify without persisting anything.
    pub fn classify_text(&self, content: &str) -> TextClassification {
        let hit = self.classifier.table().first_match(content);
        let tier = hit.map(|(tier, _)| tier).unwrap_or(RiskTier::Safe);
        TextClassification {
            result: ClassificationResult::for_tier(tier),
            matched_keyword: hit.map(|(_, k)| k.to_string()),
        }
    }

    /// Compose a reply without persisting anything.
    pub async fn preview_response(
        &self,
        content: &str,
        tone: &ToneProfile,
    ) -> Result<ComposedResponse> {
        self.compose(content, tone).await
    }

    async fn compose(&self, content: &str, tone: &ToneProfile) -> Result<ComposedResponse> {
        let mut rng = self.rng.lock().await;
        generate_response(content, tone, &self.library, &mut **rng)
    }

    // ============== Inbox ==============

    /// Fetch a message with its responses, marking it read.
    pub async fn open_message(&self, user_id: UserId, id: MessageId) -> Result<MessageDetail> {
        let mut message = self.store.message(user_id, id).await?;
        if !message.is_read {
            message = self
                .store
                .update_status(
                    user_id,
                    id,
                    StatusPatch {
                        is_read: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
        let responses = self.store.responses_for(user_id, id).await?;
        Ok(MessageDetail { message, responses })
    }

    pub async fn list(&self, user_id: UserId, mut query: MessageQuery) -> Result<Page<StoredMessage>> {
        if query.per_page == 0 {
            query.per_page = self.cfg.default_page_size;
        }
        query.per_page = query.per_page.min(self.cfg.max_page_size);
        query.page = query.page.max(1);
        self.store.list_messages(user_id, query).await
    }

    pub async fn update_status(
        &self,
        user_id: UserId,
        id: MessageId,
        patch: StatusPatch,
    ) -> Result<StoredMessage> {
        self.store.update_status(user_id, id, patch).await
    }

    pub async fn stats(&self, user_id: UserId) -> Result<InboxStats> {
        self.store.stats(user_id).await
    }

    pub async fn purge_expired(&self) -> Result<PurgeReport> {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let report = self.store.purge_expired(now).await?;
        if report.messages > 0 || report.responses > 0 {
            info!(
                messages = report.messages,
                responses = report.responses,
                "purged expired records"
            );
        }
        self.audit(AuditEvent::purge(&report));
        Ok(report)
    }

    fn audit(&self, event: AuditEvent) {
        let Some(log) = &self.audit else {
            return;
        };
        if let Err(e) = log.write(event) {
            warn!(path = %log.path().display(), "failed to write audit event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{RiskTier, TemplateCategory},
        rng::FixedRandom,
        store::MemoryInbox,
    };
    use chrono::TimeDelta;

    fn service_with(cfg: Config) -> TriageService {
        TriageService::new(
            Arc::new(cfg),
            RiskClassifier::default(),
            Arc::new(TemplateLibrary::default()),
            Arc::new(MemoryInbox::new()),
            Box::new(FixedRandom::new(0)),
        )
    }

    fn service() -> TriageService {
        service_with(Config::default())
    }

    fn incoming(sender: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            sender_name: sender.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn safe_message_gets_auto_reply_with_default_policy() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();

        let out = svc
            .ingest(acct.user_id, incoming("fan1", "Just renewed my subscription!"))
            .await
            .unwrap();
        assert_eq!(out.message.classification.tier, RiskTier::Safe);
        let reply = out.auto_response.expect("auto reply");
        assert!(reply.is_auto_generated);
        assert_eq!(reply.template_used, Some(TemplateCategory::Subscription));
        assert_eq!(reply.tone, Some(acct.tone));
        assert_eq!(reply.message_id, out.message.id);
    }

    #[tokio::test]
    async fn high_risk_message_is_held_by_default() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();

        let out = svc
            .ingest(
                acct.user_id,
                incoming("fan2", "Can we meet up privately? I'll pay extra..."),
            )
            .await
            .unwrap();
        assert_eq!(out.message.classification.tier, RiskTier::HighRisk);
        assert_eq!(out.message.classification.score, 0.9);
        assert!(out.auto_response.is_none());
    }

    #[tokio::test]
    async fn automation_patch_enables_low_risk_replies() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        let policy = svc
            .update_automation(
                acct.user_id,
                AutomationPatch {
                    auto_respond_low_risk: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(policy.auto_respond_low_risk);

        let out = svc
            .ingest(acct.user_id, incoming("fan", "Do you offer custom content?"))
            .await
            .unwrap();
        assert_eq!(out.message.classification.tier, RiskTier::LowRisk);
        assert!(out.auto_response.is_some());
    }

    #[tokio::test]
    async fn ingest_sets_retention_deadline_from_config() {
        let svc = service_with(Config {
            retention_period: std::time::Duration::from_secs(3600),
            ..Config::default()
        });
        let acct = svc.register_account("creator").await.unwrap();
        let now = Utc::now();
        let out = svc
            .ingest_at(&acct, incoming("fan", "hello"), now)
            .await
            .unwrap();
        assert_eq!(out.message.scheduled_deletion, now + TimeDelta::hours(1));
        assert_eq!(
            out.auto_response.unwrap().scheduled_deletion,
            now + TimeDelta::hours(1)
        );

        let report = svc
            .purge_expired_at(now + TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(report.messages, 1);
        assert_eq!(report.responses, 1);
    }

    #[tokio::test]
    async fn ingest_requires_sender_and_known_account() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        assert!(matches!(
            svc.ingest(acct.user_id, incoming("  ", "hi")).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            svc.ingest(UserId(999), incoming("fan", "hi")).await,
            Err(Error::NotFound(_))
        ));
        assert!(svc.register_account("").await.is_err());
    }

    #[tokio::test]
    async fn import_skips_incomplete_entries_and_counts_replies() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        let report = svc
            .import(
                acct.user_id,
                vec![
                    incoming("a", "Hey, I really loved your latest photoshoot!"),
                    incoming("", "no sender"),
                    incoming("b", ""),
                    incoming("c", "What's your address?"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.auto_responses.len(), 1);

        let stats = svc.stats(acct.user_id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.high_risk, 1);
        assert_eq!(stats.auto_response_percentage, 50.0);
    }

    #[tokio::test]
    async fn invalid_tone_rejects_ingest_without_storing() {
        let svc = service();
        let mut acct = svc.register_account("creator").await.unwrap();
        acct.tone.flirtiness = 1.5;

        let res = svc
            .ingest_at(&acct, incoming("fan", "hello"), Utc::now())
            .await;
        assert!(matches!(res, Err(Error::InvalidInput(_))));
        assert_eq!(svc.stats(acct.user_id).await.unwrap().total, 0);

        // Held messages never render a reply, so the tone is not consulted.
        let out = svc
            .ingest_at(&acct, incoming("fan", "what's your address?"), Utc::now())
            .await
            .unwrap();
        assert!(out.auto_response.is_none());
    }

    #[tokio::test]
    async fn invalid_tone_rejects_whole_import() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        let mut settings = acct.clone();
        settings.tone.formality = -0.1;
        svc.store.put_account(settings).await.unwrap();

        let res = svc
            .import(
                acct.user_id,
                vec![
                    incoming("a", "what's your address?"),
                    incoming("b", "hello"),
                ],
            )
            .await;
        assert!(matches!(res, Err(Error::InvalidInput(_))));
        assert_eq!(svc.stats(acct.user_id).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn open_marks_read_and_includes_responses() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        let out = svc
            .ingest(acct.user_id, incoming("fan", "thanks for the tip!"))
            .await
            .unwrap();
        assert!(!out.message.is_read);

        let detail = svc.open_message(acct.user_id, out.message.id).await.unwrap();
        assert!(detail.message.is_read);
        assert_eq!(detail.responses.len(), 1);
        assert_eq!(svc.stats(acct.user_id).await.unwrap().unread, 0);
    }

    #[tokio::test]
    async fn list_caps_page_size() {
        let svc = service_with(Config {
            max_page_size: 2,
            default_page_size: 1,
            ..Config::default()
        });
        let acct = svc.register_account("creator").await.unwrap();
        for i in 0..3 {
            svc.ingest(acct.user_id, incoming("fan", &format!("msg {i}")))
                .await
                .unwrap();
        }
        let page = svc
            .list(
                acct.user_id,
                MessageQuery {
                    per_page: 50,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pages, 2);

        let page = svc
            .list(
                acct.user_id,
                MessageQuery {
                    per_page: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn style_update_flows_into_replies() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        let tone = svc
            .update_style(
                acct.user_id,
                StylePatch {
                    flirtiness: Some(0.0),
                    friendliness: Some(0.0),
                    formality: Some(0.9),
                },
            )
            .await
            .unwrap();
        assert_eq!(tone.formality, 0.9);

        let out = svc
            .ingest(acct.user_id, incoming("fan", "nice pics"))
            .await
            .unwrap();
        // No emoji budget: template keeps its own emoji, formal tone drops '!'.
        assert_eq!(
            out.auto_response.unwrap().content,
            "Thanks for your message. I'll get back to you soon. 💖"
        );
    }

    #[tokio::test]
    async fn classify_text_reports_deciding_keyword() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();

        let hit = svc.classify_text("Do you take Venmo?");
        assert_eq!(hit.result.tier, RiskTier::LowRisk);
        assert_eq!(hit.result.score, 0.6);
        assert_eq!(hit.matched_keyword.as_deref(), Some("venmo"));

        let miss = svc.classify_text("love your work");
        assert_eq!(miss.result, ClassificationResult::for_tier(RiskTier::Safe));
        assert!(miss.matched_keyword.is_none());
        assert_eq!(svc.stats(acct.user_id).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn preview_does_not_persist() {
        let svc = service();
        let acct = svc.register_account("creator").await.unwrap();
        let reply = svc
            .preview_response("hello!", &ToneProfile::default())
            .await
            .unwrap();
        assert_eq!(reply.category_used, TemplateCategory::Greeting);
        assert_eq!(svc.stats(acct.user_id).await.unwrap().total, 0);

        let bad = ToneProfile {
            flirtiness: -0.5,
            friendliness: 0.5,
            formality: 0.5,
        };
        assert!(svc.preview_response("hello", &bad).await.is_err());
    }

    #[tokio::test]
    async fn audit_log_records_classification_and_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let svc = service().with_audit(AuditLogger::new(&path, true));
        let acct = svc.register_account("creator").await.unwrap();
        svc.ingest(acct.user_id, incoming("fan", "hello"))
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let events: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "classified");
        assert_eq!(events[1]["event"], "auto_response");
    }

    #[tokio::test]
    async fn from_config_loads_rule_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("keywords.json");
        std::fs::write(
            &table,
            r#"{"version":3,"tiers":[{"tier":"high-risk","keywords":["pineapple"]}]}"#,
        )
        .unwrap();
        let templates = dir.path().join("templates.json");
        std::fs::write(&templates, r#"{"general":["Noted"]}"#).unwrap();

        let cfg = Config {
            keyword_table_path: Some(table),
            template_library_path: Some(templates),
            rng_seed: Some(1),
            ..Config::default()
        };
        let svc = TriageService::from_config(Arc::new(cfg), Arc::new(MemoryInbox::new())).unwrap();
        let acct = svc.register_account("creator").await.unwrap();

        let out = svc
            .ingest(acct.user_id, incoming("fan", "I like PINEAPPLE"))
            .await
            .unwrap();
        assert_eq!(out.message.classification.tier, RiskTier::HighRisk);

        let out = svc
            .ingest(acct.user_id, incoming("fan", "send me your address"))
            .await
            .unwrap();
        assert_eq!(out.message.classification.tier, RiskTier::Safe);
        let reply = out.auto_response.unwrap();
        assert!(reply.content.starts_with("Noted"));
    }
}
