//! Risk classification: keyword-table lookup plus the auto-reply gate.
//!
//! Matching is plain substring containment over the lowercased text, so a
//! keyword embedded in a longer word still matches.

use std::{fs, path::Path, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{AutomationPolicy, ClassificationResult, RiskTier},
    errors::Error,
    Result,
};

const HIGH_RISK_KEYWORDS: &[&str] = &[
    "address",
    "location",
    "phone number",
    "meet up",
    "meetup",
    "personal",
    "private",
    "home",
    "hotel",
    "physical",
    "underage",
    "minor",
    "illegal",
    "drugs",
];

const LOW_RISK_KEYWORDS: &[&str] = &[
    "discount",
    "price",
    "money",
    "payment",
    "venmo",
    "paypal",
    "cash",
    "offer",
    "deal",
    "special request",
    "custom",
    "snapchat",
    "instagram",
    "whatsapp",
];

// ============== Keyword Table ==============

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierKeywords {
    pub tier: RiskTier,
    pub keywords: Vec<String>,
}

/// Versioned keyword table. `tiers` is in priority order: the first tier with
/// any matching keyword wins, and `Safe` is the implicit fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub version: u32,
    pub tiers: Vec<TierKeywords>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            version: 1,
            tiers: vec![
                TierKeywords {
                    tier: RiskTier::HighRisk,
                    keywords: owned(HIGH_RISK_KEYWORDS),
                },
                TierKeywords {
                    tier: RiskTier::LowRisk,
                    keywords: owned(LOW_RISK_KEYWORDS),
                },
            ],
        }
    }
}

impl KeywordTable {
    pub fn from_json(raw: &str) -> Result<Self> {
        let table: KeywordTable = serde_json::from_str(raw)?;
        table.normalized()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn normalized(mut self) -> Result<Self> {
        if self.tiers.is_empty() {
            return Err(Error::InvalidInput(
                "keyword table has no tiers".to_string(),
            ));
        }
        for entry in &mut self.tiers {
            if entry.tier == RiskTier::Safe {
                return Err(Error::InvalidInput(
                    "keyword table must not list keywords for the safe tier".to_string(),
                ));
            }
            entry.keywords = entry
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }
        Ok(self)
    }

    /// First (tier, keyword) hit in priority order.
    pub fn first_match(&self, text: &str) -> Option<(RiskTier, &str)> {
        let lower = text.to_lowercase();
        self.tiers.iter().find_map(|entry| {
            entry
                .keywords
                .iter()
                .find(|k| lower.contains(k.as_str()))
                .map(|k| (entry.tier, k.as_str()))
        })
    }
}

// ============== Classifier ==============

#[derive(Clone, Debug, Default)]
pub struct RiskClassifier {
    table: KeywordTable,
}

impl RiskClassifier {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        let tier = self
            .table
            .first_match(text)
            .map(|(tier, _)| tier)
            .unwrap_or(RiskTier::Safe);
        ClassificationResult::for_tier(tier)
    }
}

/// Classify with the built-in keyword table.
pub fn classify(text: &str) -> ClassificationResult {
    static DEFAULT: OnceLock<RiskClassifier> = OnceLock::new();
    DEFAULT.get_or_init(RiskClassifier::default).classify(text)
}

pub fn should_auto_respond(tier: RiskTier, policy: &AutomationPolicy) -> bool {
    match tier {
        RiskTier::Safe => policy.auto_respond_safe,
        RiskTier::LowRisk => policy.auto_respond_low_risk,
        RiskTier::HighRisk => policy.auto_respond_high_risk,
    }
}
