use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{
    domain::{AutomationPolicy, ToneProfile},
    errors::Error,
    retention::DEFAULT_RETENTION,
    Result,
};

/// Typed configuration for the triage service.
#[derive(Clone, Debug)]
pub struct Config {
    // Retention
    pub retention_period: Duration,

    // Defaults for newly registered accounts
    pub default_tone: ToneProfile,
    pub default_policy: AutomationPolicy,

    // Rule data overrides
    pub keyword_table_path: Option<PathBuf>,
    pub template_library_path: Option<PathBuf>,

    // Audit
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,

    // Inbox paging
    pub default_page_size: usize,
    pub max_page_size: usize,

    // Reproducible replies
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retention_period: DEFAULT_RETENTION,
            default_tone: ToneProfile::default(),
            default_policy: AutomationPolicy::default(),
            keyword_table_path: None,
            template_library_path: None,
            audit_log_path: None,
            audit_log_json: false,
            default_page_size: 20,
            max_page_size: 100,
            rng_seed: None,
        }
    }
}

impl Config {
    /// Load from the process environment, merging `.env` first if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; malformed
    /// values are a config error naming the key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).and_then(non_empty);

        let retention_period = parse_opt::<u64>(&get, "MESSAGE_RETENTION_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention_period);

        let default_tone = ToneProfile::clamped(
            parse_opt(&get, "DEFAULT_FLIRTINESS")?.unwrap_or(defaults.default_tone.flirtiness),
            parse_opt(&get, "DEFAULT_FRIENDLINESS")?
                .unwrap_or(defaults.default_tone.friendliness),
            parse_opt(&get, "DEFAULT_FORMALITY")?.unwrap_or(defaults.default_tone.formality),
        );

        let default_policy = AutomationPolicy {
            auto_respond_safe: parse_bool(&get, "DEFAULT_AUTO_RESPOND_SAFE")?
                .unwrap_or(defaults.default_policy.auto_respond_safe),
            auto_respond_low_risk: parse_bool(&get, "DEFAULT_AUTO_RESPOND_LOW_RISK")?
                .unwrap_or(defaults.default_policy.auto_respond_low_risk),
            auto_respond_high_risk: parse_bool(&get, "DEFAULT_AUTO_RESPOND_HIGH_RISK")?
                .unwrap_or(defaults.default_policy.auto_respond_high_risk),
        };

        let keyword_table_path = get("KEYWORD_TABLE_PATH").map(PathBuf::from);
        let template_library_path = get("TEMPLATE_LIBRARY_PATH").map(PathBuf::from);

        let audit_log_path = get("AUDIT_LOG_PATH").map(PathBuf::from);
        let audit_log_json = parse_bool(&get, "AUDIT_LOG_JSON")?.unwrap_or(false);

        let max_page_size = parse_opt::<usize>(&get, "MAX_PAGE_SIZE")?
            .unwrap_or(defaults.max_page_size)
            .max(1);
        let default_page_size = parse_opt::<usize>(&get, "DEFAULT_PAGE_SIZE")?
            .unwrap_or(defaults.default_page_size)
            .clamp(1, max_page_size);

        let rng_seed = parse_opt::<u64>(&get, "RNG_SEED")?;

        Ok(Self {
            retention_period,
            default_tone,
            default_policy,
            keyword_table_path,
            template_library_path,
            audit_log_path,
            audit_log_json,
            default_page_size,
            max_page_size,
            rng_seed,
        })
    }
}

fn parse_opt<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}")))
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(Error::Config(format!("{key} is not a boolean: {raw:?}"))),
    }
}

/// Merge `KEY=value` pairs from a dotenv file. Variables already present in
/// the environment win over the file.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in dotenv_pairs(&contents) {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
        }
    }
}

fn dotenv_pairs(contents: &str) -> impl Iterator<Item = (&str, &str)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.strip_prefix("export ").unwrap_or(line))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), unquote(v.trim())))
        .filter(|(k, _)| !k.is_empty())
}

fn unquote(v: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|q| v.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(v)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
