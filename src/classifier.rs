//! Language tagging and flagging for free-text evaluation comments.
//!
//! Everything here is pure: callers decide what to persist.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::{FlagReason, Language};

const TAGALOG_MARKERS: &[&str] = &[
    "ang", "mga", "hindi", "naman", "talaga", "siya", "niya", "kasi", "lang", "yung", "guro",
    "napaka", "mabait", "magaling", "salamat", "opo", "ako", "ikaw", "kami", "tayo", "sila",
    "amin", "namin", "nila", "ito", "dahil", "pero", "sobra", "maganda", "masaya", "turo",
    "klase", "maayos", "gusto",
];

const ENGLISH_MARKERS: &[&str] = &[
    "the", "and", "very", "good", "teacher", "class", "lesson", "helpful", "explain", "great",
    "subject", "because", "should", "with", "always", "really", "student",
];

const OFFENSIVE_TERMS: &[&str] = &[
    "stupid", "idiot", "dumb", "worst", "useless", "terrible", "horrible", "awful", "sucks",
    "shit", "fuck", "damn", "crap", "boring", "lazy", "i hate", "hate you", "bobo", "tanga",
    "gago", "ulol", "tangina", "putangina", "bwisit", "leche", "pakyu", "walang kwenta",
    "pangit", "inutil", "hayop ka",
];

const TOPIC_WORDS: &[&str] = &["teacher", "lesson", "class", "subject"];

const MIN_RELATED_LENGTH: usize = 3;
const SHORT_COMMENT_LENGTH: usize = 10;
const MAX_SHOUTING_LENGTH: usize = 10;
const MAX_REPEAT_RUN: usize = 5;
const TAGALOG_MAJORITY_MIN: usize = 2;

/// Flag checks in precedence order; the first predicate that fires names the reason.
const FLAG_RULES: &[(fn(&str) -> bool, FlagReason)] = &[
    (is_offensive, FlagReason::Offensive),
    (is_spam, FlagReason::Spam),
    (is_unrelated, FlagReason::Unrelated),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommentClassification {
    pub language: Language,
    pub is_flagged: bool,
    pub flag_reason: Option<FlagReason>,
}

pub fn classify(text: &str) -> Option<CommentClassification> {
    if text.trim().is_empty() {
        return None;
    }

    let flag_reason = flag_reason(text);
    Some(CommentClassification {
        language: detect_language(text),
        is_flagged: flag_reason.is_some(),
        flag_reason,
    })
}

pub fn detect_language(text: &str) -> Language {
    let lowered = text.to_lowercase();
    let tagalog = count_markers(&lowered, TAGALOG_MARKERS);
    let english = count_markers(&lowered, ENGLISH_MARKERS);

    if tagalog > english && tagalog > TAGALOG_MAJORITY_MIN {
        Language::Tagalog
    } else if tagalog > 0 && english > 0 {
        Language::Taglish
    } else {
        Language::English
    }
}

fn count_markers(lowered: &str, markers: &[&str]) -> usize {
    markers
        .iter()
        .map(|marker| lowered.matches(marker).count())
        .sum()
}

pub fn flag_reason(text: &str) -> Option<FlagReason> {
    FLAG_RULES
        .iter()
        .find(|(check, _)| check(text))
        .map(|(_, reason)| *reason)
}

pub fn is_offensive(text: &str) -> bool {
    let lowered = text.to_lowercase();
    OFFENSIVE_TERMS.iter().any(|term| lowered.contains(term))
}

pub fn is_spam(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let shouting = trimmed.chars().any(char::is_alphabetic)
        && trimmed == trimmed.to_uppercase()
        && trimmed.chars().count() <= MAX_SHOUTING_LENGTH;

    few_letters_re().is_match(trimmed)
        || longest_run(trimmed) >= MAX_REPEAT_RUN
        || shouting
        || digits_only_re().is_match(trimmed)
}

pub fn is_unrelated(text: &str) -> bool {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    if length < MIN_RELATED_LENGTH {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    length < SHORT_COMMENT_LENGTH && !TOPIC_WORDS.iter().any(|word| lowered.contains(word))
}

fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for ch in text.chars() {
        if Some(ch) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(ch);
        }
        longest = longest.max(current);
    }

    longest
}

static FEW_LETTERS_RE: OnceLock<Regex> = OnceLock::new();
static DIGITS_ONLY_RE: OnceLock<Regex> = OnceLock::new();

fn few_letters_re() -> &'static Regex {
    FEW_LETTERS_RE.get_or_init(|| Regex::new(r"^[A-Za-z]{1,3}$").expect("valid regex"))
}

fn digits_only_re() -> &'static Regex {
    DIGITS_ONLY_RE.get_or_init(|| Regex::new(r"^[0-9]+$").expect("valid regex"))
}
