//! Language tag carried by every job.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static UZBEK_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ғқҳў]").expect("static regex"));

static UZBEK_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ha|yo[’']q|iltimos|rahmat|salom|qanday|nima|bugun)\b").expect("static regex")
});

/// Language of a question, and therefore of every user-visible text for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Ru,
    Uz,
    En,
}

impl Lang {
    /// Best-effort guess from the question text.
    ///
    /// Uzbek is recognised by its specific Cyrillic letters or by a few very
    /// common Latin-script words; any other Cyrillic text is Russian.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        if UZBEK_LETTERS.is_match(&lower) || UZBEK_WORDS.is_match(&lower) {
            return Lang::Uz;
        }
        if lower.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c)) {
            return Lang::Ru;
        }
        Lang::En
    }

    pub fn code(self) -> &'static str {
        match self {
            Lang::Ru => "ru",
            Lang::Uz => "uz",
            Lang::En => "en",
        }
    }
}
