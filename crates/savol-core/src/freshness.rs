//! Freshness heuristic.
//!
//! Two pure predicates over text, with no I/O:
//! - [`is_time_sensitive`]: should the first draft be grounded in search?
//! - [`looks_dynamic`]: does a question/draft pair mention facts that go
//!   stale (rates, prices, recent years, officials) and deserve a second,
//!   verifying pass?
//!
//! Both understand Russian, Uzbek and English. The current year is passed in
//! by the caller, who reads it from its [`Clock`](crate::ports::Clock).

use std::sync::LazyLock;

use regex::Regex;

/// How far (in years, either direction) a mentioned year counts as "fresh".
pub const FRESH_YEAR_WINDOW: i32 = 3;

static TIME_SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // temporal adverbs
        r"\b(сегодня|сейчас|на\s+данный\s+момент|актуальн\w*|нынешн\w*|текущ\w*)\b",
        r"\b(bugun|hozir|hozirgi|joriy)\b",
        r"\b(today|tonight|now|currently|current|latest|this\s+(week|month|year))\b",
        // rates, prices, news
        r"\b(курс\w*|зарплат\w*|инфляц\w*|ставк\w*|цен[аыуе]?|стоимост\w*|новост\w*|статистик\w*|прогноз\w*)\b",
        r"\b(narx\w*|kurs\w*|yangilik\w*|stavka\w*|inflyatsiya)\b",
        r"\b(rates?|prices?|costs?|salar(y|ies)|inflation|news|forecast|statistics|weather|stocks?)\b",
        // "who is the current <role>"
        r"\bкто\s+(сейчас\s+)?(является\s+)?(президент|премьер|министр|председател|директор|глав|руководител|хоким)\w*",
        r"\bwho\s+is\s+(the\s+)?(current\s+)?(president|prime\s+minister|ceo|director|chairman|minister|head|mayor|governor)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static DYNAMIC_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    let words = [
        "курс", "ставк", "инфляц", "зарплат", "налог", "цена", "цены", "тариф", "пособи", "пенси",
        "кредит", "новост", "прогноз", "изменени", "обновлени", "президент", "министр",
        "председател", "хоким", "statistika", "narx", "stavka", "yangilik", "soliq", "price",
        "rate", "inflation", "salary", "tax", "tariff", "pension", "loan", "news", "forecast",
        "exchange", "president", "minister", "ceo",
    ];
    Regex::new(&format!(r"\b({})", words.join("|"))).expect("static regex")
});

static FOUR_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("static regex"));

/// Does `text` mention a year within [`FRESH_YEAR_WINDOW`] of `now_year`?
pub fn contains_fresh_year(text: &str, now_year: i32) -> bool {
    FOUR_DIGIT_YEAR
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .any(|y| (now_year - y).abs() <= FRESH_YEAR_WINDOW)
}

pub fn is_time_sensitive(text: &str, now_year: i32) -> bool {
    let lower = text.to_lowercase();
    TIME_SENSITIVE_PATTERNS.iter().any(|rx| rx.is_match(&lower))
        || contains_fresh_year(&lower, now_year)
}

pub fn looks_dynamic(texts: &[&str], now_year: i32) -> bool {
    let joined = texts
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    DYNAMIC_VOCABULARY.is_match(&joined) || contains_fresh_year(&joined, now_year)
}
