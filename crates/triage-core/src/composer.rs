//! Reply composition: category detection, template pick, tone adjustment.

use crate::{
    domain::{ComposedResponse, TemplateCategory, ToneProfile},
    rng::RandomSource,
    templates::TemplateLibrary,
    Result,
};

pub const FLIRTY_EMOJIS: [&str; 6] = ["💋", "😘", "💖", "😉", "🔥", "💕"];
pub const FRIENDLY_EMOJIS: [&str; 6] = ["😊", "💗", "👋", "🤗", "✨", "💯"];

/// Checked in order; the first group with a hit decides the category.
const CATEGORY_KEYWORDS: &[(TemplateCategory, &[&str])] = &[
    (
        TemplateCategory::Subscription,
        &[
            "subscribe",
            "subscribing",
            "subscription",
            "joined",
            "signed up",
            "renewed",
        ],
    ),
    (
        TemplateCategory::ThankYou,
        &["thank", "thanks", "tip", "tipped", "payment"],
    ),
    (
        TemplateCategory::ContentRequest,
        &["request", "custom", "specific", "create", "make"],
    ),
    (
        TemplateCategory::Greeting,
        &["hi", "hello", "hey", "greetings"],
    ),
];

const INFORMAL_BELOW: f64 = 0.3;
const FORMAL_ABOVE: f64 = 0.7;

pub fn detect_category(text: &str) -> TemplateCategory {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(cat, _)| *cat)
        .unwrap_or(TemplateCategory::General)
}

/// `floor((flirtiness + friendliness) * 3)`, at most the palette size.
pub fn emoji_count(tone: &ToneProfile) -> usize {
    let raw = ((tone.flirtiness + tone.friendliness) * 3.0).floor();
    if raw <= 0.0 || raw.is_nan() {
        return 0;
    }
    (raw as usize).min(FLIRTY_EMOJIS.len())
}

pub fn emoji_palette(tone: &ToneProfile) -> &'static [&'static str; 6] {
    if tone.flirtiness > tone.friendliness {
        &FLIRTY_EMOJIS
    } else {
        &FRIENDLY_EMOJIS
    }
}

/// Re-render `template` for the given tone.
///
/// When any emoji is due, palette emoji already in the template are removed
/// and a fresh sample is appended, so repeated adjustment never accumulates.
/// Formality rewrites are blind global substitutions applied afterwards.
pub fn adjust_tone(template: &str, tone: &ToneProfile, rng: &mut dyn RandomSource) -> String {
    let count = emoji_count(tone);
    let mut out = template.to_string();

    if count > 0 {
        for emoji in FLIRTY_EMOJIS.iter().chain(FRIENDLY_EMOJIS.iter()) {
            out = out.replace(emoji, "");
        }

        let palette = emoji_palette(tone);
        let picked = rng
            .sample_without_replacement(count, palette.len())
            .into_iter()
            .filter_map(|i| palette.get(i).copied())
            .collect::<Vec<_>>()
            .join(" ");

        out = format!("{} {picked}", out.trim_end());
    }

    if tone.formality < INFORMAL_BELOW {
        out = out
            .replace('.', "!")
            .replace(" will ", " 'll ")
            .replace(" are ", " 're ");
    } else if tone.formality > FORMAL_ABOVE {
        out = out
            .replace('!', ".")
            .replace(" 'll ", " will ")
            .replace(" 're ", " are ");
    }

    out
}

/// Detect, select, adjust. Rejects tone values outside `[0, 1]`.
pub fn generate_response(
    text: &str,
    tone: &ToneProfile,
    library: &TemplateLibrary,
    rng: &mut dyn RandomSource,
) -> Result<ComposedResponse> {
    tone.validate()?;

    let category = detect_category(text);
    let template = library.select(category, rng);
    let text = adjust_tone(template, tone, rng);

    Ok(ComposedResponse {
        text,
        category_used: category,
        tone: *tone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::Error,
        rng::{FixedRandom, SeededRandom},
    };

    fn tone(f: f64, fr: f64, fo: f64) -> ToneProfile {
        ToneProfile::new(f, fr, fo).unwrap()
    }

    fn palette_hits(s: &str) -> usize {
        FLIRTY_EMOJIS
            .iter()
            .chain(FRIENDLY_EMOJIS.iter())
            .map(|e| s.matches(e).count())
            .sum()
    }

    #[test]
    fn category_priority_order() {
        assert_eq!(
            detect_category("thanks for subscribing"),
            TemplateCategory::Subscription
        );
        assert_eq!(
            detect_category("Just renewed my subscription!"),
            TemplateCategory::Subscription
        );
        assert_eq!(
            detect_category("Thanks, I tipped you"),
            TemplateCategory::ThankYou
        );
        assert_eq!(
            detect_category("Can you create a custom set?"),
            TemplateCategory::ContentRequest
        );
        assert_eq!(detect_category("HELLO there"), TemplateCategory::Greeting);
        assert_eq!(detect_category("nice pics"), TemplateCategory::General);
        assert_eq!(detect_category(""), TemplateCategory::General);
    }

    #[test]
    fn emoji_count_follows_floor_formula() {
        assert_eq!(emoji_count(&tone(0.0, 0.0, 0.5)), 0);
        assert_eq!(emoji_count(&tone(0.3, 0.8, 0.5)), 3);
        assert_eq!(emoji_count(&tone(1.0, 1.0, 0.5)), 6);
        assert_eq!(emoji_count(&tone(0.1, 0.2, 0.5)), 0);
    }

    #[test]
    fn palette_choice_prefers_friendly_on_tie() {
        assert_eq!(emoji_palette(&tone(0.9, 0.1, 0.5)), &FLIRTY_EMOJIS);
        assert_eq!(emoji_palette(&tone(0.5, 0.5, 0.5)), &FRIENDLY_EMOJIS);
    }

    #[test]
    fn emoji_are_replaced_not_accumulated() {
        let t = tone(1.0, 0.5, 0.5);
        let mut rng = SeededRandom::new(3);
        let once = adjust_tone("Hey there! Thanks for your message! 💕", &t, &mut rng);
        let twice = adjust_tone(&once, &t, &mut rng);
        assert_eq!(palette_hits(&once), 4);
        assert_eq!(palette_hits(&twice), palette_hits(&once));
    }

    #[test]
    fn appended_emoji_come_from_chosen_palette_without_repeats() {
        let t = tone(0.3, 0.8, 0.5);
        let mut rng = SeededRandom::new(11);
        let out = adjust_tone("Thanks!", &t, &mut rng);
        let tail = out.strip_prefix("Thanks! ").unwrap();
        let picked: Vec<&str> = tail.split(' ').collect();
        assert_eq!(picked.len(), 3);
        for e in &picked {
            assert!(FRIENDLY_EMOJIS.contains(e));
        }
        let mut uniq = picked.clone();
        uniq.sort_unstable();
        uniq.dedup();
        assert_eq!(uniq.len(), 3);
    }

    #[test]
    fn zero_emoji_leaves_existing_emoji_alone() {
        let t = tone(0.0, 0.0, 0.5);
        let mut rng = FixedRandom::default();
        assert_eq!(adjust_tone("Hi! 😊", &t, &mut rng), "Hi! 😊");
    }

    #[test]
    fn trailing_whitespace_trimmed_before_emoji() {
        let t = tone(0.0, 0.4, 0.5);
        let mut rng = FixedRandom::default();
        assert_eq!(adjust_tone("Hello 💕  ", &t, &mut rng), "Hello 😊");
    }

    #[test]
    fn formality_boundaries_are_strict() {
        let template = "We are here. You will see!";
        let mut rng = FixedRandom::default();
        for fo in [0.3, 0.5, 0.7] {
            assert_eq!(adjust_tone(template, &tone(0.0, 0.0, fo), &mut rng), template);
        }
        assert_eq!(
            adjust_tone(template, &tone(0.0, 0.0, 0.29), &mut rng),
            "We 're here! You 'll see!"
        );
        assert_eq!(
            adjust_tone("We 're here! You 'll see!", &tone(0.0, 0.0, 0.71), &mut rng),
            "We are here. You will see."
        );
    }

    #[test]
    fn informal_rewrites_every_period() {
        let mut rng = FixedRandom::default();
        assert_eq!(
            adjust_tone("Wait...", &tone(0.0, 0.0, 0.0), &mut rng),
            "Wait!!!"
        );
    }

    #[test]
    fn renewed_subscription_end_to_end() {
        let lib = TemplateLibrary::default();
        let t = tone(0.3, 0.8, 0.2);
        let mut rng = FixedRandom::new(0);
        let r = generate_response("Just renewed my subscription!", &t, &lib, &mut rng).unwrap();
        assert_eq!(r.category_used, TemplateCategory::Subscription);
        assert_eq!(r.tone, t);
        assert_eq!(
            r.text,
            "Thanks for subscribing! Can't wait to share more exclusive content with you! 😊 💗 👋"
        );
    }

    #[test]
    fn generate_rejects_out_of_range_tone() {
        let lib = TemplateLibrary::default();
        let bad = ToneProfile {
            flirtiness: 1.5,
            friendliness: 0.5,
            formality: 0.5,
        };
        let mut rng = FixedRandom::default();
        assert!(matches!(
            generate_response("hi", &bad, &lib, &mut rng),
            Err(Error::InvalidInput(_))
        ));
    }
}
