use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Creator account id (numeric, owned by the account store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Stored subscriber message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

/// Stored outgoing response id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub i64);

// ============== Risk ==============

/// Risk bucket for an incoming message, ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTier {
    Safe,
    LowRisk,
    HighRisk,
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [RiskTier::Safe, RiskTier::LowRisk, RiskTier::HighRisk];

    /// Fixed score reported for every message in this tier.
    pub fn score(self) -> f64 {
        match self {
            RiskTier::Safe => 0.1,
            RiskTier::LowRisk => 0.6,
            RiskTier::HighRisk => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::LowRisk => "low-risk",
            RiskTier::HighRisk => "high-risk",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tier: RiskTier,
    pub score: f64,
}

impl ClassificationResult {
    pub fn for_tier(tier: RiskTier) -> Self {
        Self {
            tier,
            score: tier.score(),
        }
    }
}

/// Per-recipient switches gating auto-replies per tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationPolicy {
    pub auto_respond_safe: bool,
    pub auto_respond_low_risk: bool,
    pub auto_respond_high_risk: bool,
}

impl Default for AutomationPolicy {
    fn default() -> Self {
        Self {
            auto_respond_safe: true,
            auto_respond_low_risk: false,
            auto_respond_high_risk: false,
        }
    }
}

// ============== Tone ==============

/// Three-axis style vector steering reply rendering. Every axis is in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneProfile {
    pub flirtiness: f64,
    pub friendliness: f64,
    pub formality: f64,
}

impl Default for ToneProfile {
    fn default() -> Self {
        Self {
            flirtiness: 0.5,
            friendliness: 0.7,
            formality: 0.3,
        }
    }
}

impl ToneProfile {
    /// Build a profile, rejecting values outside `[0, 1]` (and NaN).
    pub fn new(flirtiness: f64, friendliness: f64, formality: f64) -> Result<Self> {
        let tone = Self {
            flirtiness,
            friendliness,
            formality,
        };
        tone.validate()?;
        Ok(tone)
    }

    /// Build a profile, clamping each axis into `[0, 1]`. NaN becomes 0.
    pub fn clamped(flirtiness: f64, friendliness: f64, formality: f64) -> Self {
        Self {
            flirtiness: clamp_unit(flirtiness),
            friendliness: clamp_unit(friendliness),
            formality: clamp_unit(formality),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("flirtiness", self.flirtiness),
            ("friendliness", self.friendliness),
            ("formality", self.formality),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::InvalidInput(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, patch: &StylePatch) {
        if let Some(v) = patch.flirtiness {
            self.flirtiness = clamp_unit(v);
        }
        if let Some(v) = patch.friendliness {
            self.friendliness = clamp_unit(v);
        }
        if let Some(v) = patch.formality {
            self.formality = clamp_unit(v);
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

/// Partial tone update; absent fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StylePatch {
    #[serde(default)]
    pub flirtiness: Option<f64>,
    #[serde(default)]
    pub friendliness: Option<f64>,
    #[serde(default)]
    pub formality: Option<f64>,
}

/// Partial automation update; absent fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationPatch {
    #[serde(default)]
    pub auto_respond_safe: Option<bool>,
    #[serde(default)]
    pub auto_respond_low_risk: Option<bool>,
    #[serde(default)]
    pub auto_respond_high_risk: Option<bool>,
}

impl AutomationPolicy {
    /// Whether any tier may be answered automatically.
    pub fn any_enabled(&self) -> bool {
        self.auto_respond_safe || self.auto_respond_low_risk || self.auto_respond_high_risk
    }

    pub fn apply(&mut self, patch: &AutomationPatch) {
        if let Some(v) = patch.auto_respond_safe {
            self.auto_respond_safe = v;
        }
        if let Some(v) = patch.auto_respond_low_risk {
            self.auto_respond_low_risk = v;
        }
        if let Some(v) = patch.auto_respond_high_risk {
            self.auto_respond_high_risk = v;
        }
    }
}

/// Recipient-owned settings the core reads but never mutates on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub user_id: UserId,
    pub username: String,
    pub tone: ToneProfile,
    pub policy: AutomationPolicy,
}

// ============== Templates ==============

/// Semantic bucket used to pick a reply skeleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Greeting,
    ThankYou,
    ContentRequest,
    Subscription,
    General,
}

impl TemplateCategory {
    pub const ALL: [TemplateCategory; 5] = [
        TemplateCategory::Greeting,
        TemplateCategory::ThankYou,
        TemplateCategory::ContentRequest,
        TemplateCategory::Subscription,
        TemplateCategory::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateCategory::Greeting => "greeting",
            TemplateCategory::ThankYou => "thank_you",
            TemplateCategory::ContentRequest => "content_request",
            TemplateCategory::Subscription => "subscription",
            TemplateCategory::General => "general",
        }
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComposedResponse {
    pub text: String,
    pub category_used: TemplateCategory,
    pub tone: ToneProfile,
}
