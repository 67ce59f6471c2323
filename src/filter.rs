//! Admin-curated keyword filter, independent of the comment classifier.

use std::collections::BTreeSet;

use regex::{Captures, RegexBuilder};
use tracing::info;

use crate::error::{EvaluationError, Result};
use crate::models::Evaluation;
use crate::store::EvaluationStore;

pub fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Adds a word to the filter list and returns the stored form.
pub async fn add_word<S>(store: &S, word: &str) -> Result<String>
where
    S: EvaluationStore + ?Sized,
{
    let word = normalize(word);
    if word.is_empty() {
        return Err(EvaluationError::validation("Filter word cannot be empty"));
    }

    let existing = store.query_filter_words().await?;
    if existing.contains(&word) {
        return Err(EvaluationError::validation(format!(
            "'{word}' is already in the filter list"
        )));
    }

    store.insert_filter_word(&word).await?;
    info!(word = %word, "filter word added");
    Ok(word)
}

/// Removes a word by its stored value. Unknown words are ignored.
pub async fn remove_word<S>(store: &S, word: &str) -> Result<()>
where
    S: EvaluationStore + ?Sized,
{
    store.delete_filter_word(word).await?;
    info!(word = %word, "filter word removed");
    Ok(())
}

pub fn scan<I>(text: &str, words: I) -> bool
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let lowered = text.to_lowercase();
    words.into_iter().any(|word| {
        let word = word.as_ref().to_lowercase();
        !word.is_empty() && lowered.contains(&word)
    })
}

pub fn is_hidden(evaluation: &Evaluation, words: &BTreeSet<String>) -> bool {
    scan(&evaluation.combined_comments(), words)
}

pub fn hidden_evaluations<'a>(
    evaluations: &'a [Evaluation],
    words: &BTreeSet<String>,
) -> Vec<&'a Evaluation> {
    evaluations
        .iter()
        .filter(|evaluation| is_hidden(evaluation, words))
        .collect()
}

/// Masks every case-insensitive occurrence of each word with asterisks.
///
/// Words are applied one after another in iteration order, each on the output
/// of the previous one. Overlapping words are not reconciled.
pub fn redact<I>(text: &str, words: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    words.into_iter().fold(text.to_string(), |current, word| {
        let word = word.as_ref();
        if word.is_empty() {
            return current;
        }
        let Ok(pattern) = RegexBuilder::new(&regex::escape(word))
            .case_insensitive(true)
            .build()
        else {
            return current;
        };
        pattern
            .replace_all(&current, |caps: &Captures| "*".repeat(caps[0].chars().count()))
            .into_owned()
    })
}
