//! Post-processing of model output.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static CUTOFF_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)актуал\w*\s+до\s+\w+\s+20\d{2}",
        r"(?i)знан[^.!\n]*до\s+\w+\s+20\d{2}",
        r"(?i)\bknowledge\s+cut-?off\b[^.!\n]*",
        r"(?i)\bmy\s+(training\s+)?data\s+(only\s+)?(goes|extends)\s+up\s+to\s+\w+\s+20\d{2}",
        r"(?i)\bas\s+of\s+\w+\s+20\d{2}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// A sentence: shortest run up to terminal punctuation followed by a space,
/// or up to the end of the line. "12.5%" does not end a sentence.
static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)[^\n]*?(?:[.!?]+(?:[ \t]+|$)|$)").expect("static regex")
});

static KNOWLEDGE_CUTOFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bknowledge\s+cut-?off\b|\bmy\s+training\s+data\b|мо(и|их)\s+знани|bilimlarim")
        .expect("static regex")
});

static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^\s)]+)\)").expect("static regex"));

static BARE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static regex"));

static SOURCES_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\n+\**(источники|sources|manbalar)\**:.*$").expect("static regex")
});

static HSPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("static regex"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Remove every sentence carrying a knowledge-cutoff disclaimer
/// ("as of March 2023", ...).
pub fn strip_cutoff_disclaimers(text: &str) -> String {
    let out = SENTENCE.replace_all(text, |caps: &Captures| {
        let sentence = &caps[0];
        if CUTOFF_PATTERNS.iter().any(|rx| rx.is_match(sentence)) {
            String::new()
        } else {
            sentence.to_string()
        }
    });
    tidy(&out)
}

/// True if the model hedged with its training cutoff instead of answering.
pub fn mentions_knowledge_cutoff(text: &str) -> bool {
    KNOWLEDGE_CUTOFF.is_match(text)
}

/// Drop links unless the mode allows them: markdown links keep their label,
/// bare URLs and a trailing sources block disappear.
pub fn strip_links(text: &str, allow_links: bool) -> String {
    if allow_links {
        return tidy(text);
    }
    let out = MD_LINK.replace_all(text, "$1");
    let out = BARE_LINK.replace_all(&out, "");
    let out = SOURCES_BLOCK.replace(&out, "");
    tidy(&out)
}

/// Full cleanup applied to every successful completion.
pub fn clean_answer(text: &str, allow_links: bool) -> String {
    strip_links(&strip_cutoff_disclaimers(text), allow_links)
}

fn tidy(text: &str) -> String {
    let out = HSPACE.replace_all(text, " ");
    let out = BLANK_LINES.replace_all(&out, "\n\n");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Курс растёт. Информация актуальна до октября 2023.", "Курс растёт.")]
    #[case("The rate is 12 650. As of March 2023 it was lower.", "The rate is 12 650.")]
    #[case("Due to my knowledge cutoff I may be wrong. Answer: 4", "Answer: 4")]
    #[case("Growth was 12.5% as of May 2023. Prices rose.\nKeep this line.", "Prices rose.\nKeep this line.")]
    fn removes_whole_disclaimer_sentences(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_cutoff_disclaimers(input), expected);
    }

    #[test]
    fn decimal_point_does_not_split_a_kept_sentence() {
        assert_eq!(
            strip_cutoff_disclaimers("Inflation is 9.8% this year. Fine."),
            "Inflation is 9.8% this year. Fine."
        );
    }

    #[rstest]
    #[case("My knowledge cutoff is 2023, so I cannot say.", true)]
    #[case("Мои знания ограничены 2023 годом.", true)]
    #[case("The answer is 4.", false)]
    fn detects_knowledge_cutoff_hedging(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(mentions_knowledge_cutoff(text), expected);
    }

    #[test]
    fn keeps_text_without_disclaimers() {
        assert_eq!(strip_cutoff_disclaimers("  4  "), "4");
    }

    #[test]
    fn strips_links_when_not_allowed() {
        let text = "See [the law](https://lex.uz/docs/1) and https://example.com/x for details.";
        assert_eq!(strip_links(text, false), "See the law and for details.");
    }

    #[test]
    fn drops_trailing_sources_block() {
        let text = "Answer body.\n\nSources:\n- one\n- two";
        assert_eq!(strip_links(text, false), "Answer body.");
    }

    #[test]
    fn keeps_links_when_allowed() {
        let text = "See [art. 5](https://lex.uz/docs/1).\n\n\n\nDone";
        assert_eq!(strip_links(text, true), "See [art. 5](https://lex.uz/docs/1).\n\nDone");
    }
}
