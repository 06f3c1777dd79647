use std::{collections::BTreeMap, fs, path::Path};

use crate::{domain::TemplateCategory, errors::Error, rng::RandomSource, Result};

/// Immutable reply templates keyed by category.
///
/// Built once at startup and shared by reference. `General` is guaranteed to be
/// non-empty since it is the fallback for every other category.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateLibrary {
    templates: BTreeMap<TemplateCategory, Vec<String>>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        let entries: [(TemplateCategory, &[&str]); 5] = [
            (
                TemplateCategory::Greeting,
                &[
                    "Hey there! Thanks for your message! 💕",
                    "Hi! So happy to hear from you! 😊",
                    "Hello! Thanks for reaching out! 💋",
                ],
            ),
            (
                TemplateCategory::ThankYou,
                &[
                    "Thank you so much for your support! I really appreciate it! 💖",
                    "Thanks for the love! You're amazing! 😘",
                    "Thank you! Fans like you make this all worthwhile! 💕",
                ],
            ),
            (
                TemplateCategory::ContentRequest,
                &[
                    "I'd be happy to create that content for you! Let me know what you have in mind! 😉",
                    "That sounds like a fun request! I'll add it to my list! 💋",
                    "I love custom requests! Let me see what I can do for you! 💖",
                ],
            ),
            (
                TemplateCategory::Subscription,
                &[
                    "Thanks for subscribing! Can't wait to share more exclusive content with you! 💕",
                    "Welcome to my page! So excited to have you here! 😘",
                    "Thank you for subscribing! You're going to love what I have planned! 💋",
                ],
            ),
            (
                TemplateCategory::General,
                &[
                    "Thanks for your message! I'll get back to you soon! 💖",
                    "I appreciate you reaching out! I'll respond as soon as I can! 😊",
                    "Thanks for connecting! I'll reply properly when I have a moment! 💕",
                ],
            ),
        ];

        let templates: BTreeMap<_, Vec<String>> = entries
            .into_iter()
            .map(|(cat, xs)| (cat, xs.iter().map(|s| s.to_string()).collect::<Vec<_>>()))
            .collect();
        Self { templates }
    }
}

impl TemplateLibrary {
    pub fn new(templates: BTreeMap<TemplateCategory, Vec<String>>) -> Result<Self> {
        let has_general = templates
            .get(&TemplateCategory::General)
            .is_some_and(|xs| !xs.is_empty());
        if !has_general {
            return Err(Error::InvalidInput(
                "template library needs at least one general template".to_string(),
            ));
        }
        Ok(Self { templates })
    }

    /// Parse `{"greeting": ["..."], "general": ["..."], ...}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let templates: BTreeMap<TemplateCategory, Vec<String>> = serde_json::from_str(raw)?;
        Self::new(templates)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn templates(&self, category: TemplateCategory) -> &[String] {
        self.templates
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pick a template for `category`, falling back to `General` when the
    /// category is unmapped or empty.
    pub fn select(&self, category: TemplateCategory, rng: &mut dyn RandomSource) -> &str {
        let mut pool = self.templates(category);
        if pool.is_empty() {
            pool = self.templates(TemplateCategory::General);
        }
        // `new` guarantees General is non-empty.
        let idx = rng.draw_uniform(pool.len());
        pool.get(idx).map(String::as_str).unwrap_or_default()
    }
}

pub fn select_template<'a>(
    category: TemplateCategory,
    library: &'a TemplateLibrary,
    rng: &mut dyn RandomSource,
) -> &'a str {
    library.select(category, rng)
}
