//! Small numeric and text helpers shared by the feature and skill
//! stages.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static KEYWORD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]{3,}").unwrap());

static STEP_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bstep\s+\d").unwrap());

static NUMBERED_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+[.)]\s").unwrap());

/// Least-squares slope of the values against their indices, normalized
/// by the mean so sessions of different scales compare.
pub(crate) fn linear_trend(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_y = values.iter().sum::<f64>() / n as f64;
    if mean_y == 0.0 {
        return 0.0;
    }
    let mean_x = (n as f64 - 1.0) / 2.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, v) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (v - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        return 0.0;
    }
    (num / den) / mean_y
}

/// Population standard deviation over mean.
pub(crate) fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

/// Fraction of consecutive deltas that change sign.
pub(crate) fn oscillation_score(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let mut changes = 0;
    for i in 2..values.len() {
        let d1 = values[i - 1] - values[i - 2];
        let d2 = values[i] - values[i - 1];
        if d1 * d2 < 0.0 {
            changes += 1;
        }
    }
    changes as f64 / (values.len() - 2) as f64
}

/// Number of texts that contain at least one of the markers.
/// Markers are expected to already be lowercase.
pub(crate) fn count_matching(texts: &[String], markers: &[&str]) -> i64 {
    texts
        .iter()
        .filter(|text| {
            let lower = text.to_lowercase();
            markers.iter().any(|m| lower.contains(m))
        })
        .count() as i64
}

/// Whether any text contains any marker, case-insensitively.
pub(crate) fn contains_any(texts: &[String], markers: &[&str]) -> bool {
    texts.iter().any(|text| {
        let lower = text.to_lowercase();
        markers.iter().any(|m| lower.contains(&m.to_lowercase()))
    })
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "you", "are", "was", "have", "has", "not", "but",
    "can", "from", "they", "been", "will", "would", "could", "should", "about", "into", "more",
    "some", "like", "just", "also", "than", "them", "then", "when", "what", "which", "there",
    "their", "your", "all", "any", "each", "how",
];

fn keywords(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    KEYWORD_REGEX
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Mean Jaccard distance between adjacent sliding windows of prompt
/// keyword sets. High values mean the conversation keeps changing
/// topic; 0.0 when there are too few prompts to compare.
pub(crate) fn topic_keyword_entropy(texts: &[String], window_size: usize) -> f64 {
    if texts.len() < window_size + 1 {
        return 0.0;
    }

    let kw_sets: Vec<HashSet<String>> = texts.iter().map(|t| keywords(t)).collect();
    let mut distances = Vec::new();

    for i in 0..kw_sets.len() - window_size {
        let mut w1: HashSet<&str> = HashSet::new();
        for set in &kw_sets[i..i + window_size] {
            w1.extend(set.iter().map(String::as_str));
        }
        let mut w2: HashSet<&str> = HashSet::new();
        let hi = (i + 1 + window_size).min(kw_sets.len());
        for set in &kw_sets[i + 1..hi] {
            w2.extend(set.iter().map(String::as_str));
        }
        let union: HashSet<&str> = w1.union(&w2).copied().collect();
        if union.is_empty() {
            continue;
        }
        let intersection = w1.intersection(&w2).count();
        distances.push(1.0 - intersection as f64 / union.len() as f64);
    }

    if distances.is_empty() {
        0.0
    } else {
        distances.iter().sum::<f64>() / distances.len() as f64
    }
}

/// Whether any text lays out numbered planning steps. "step N" counts
/// on its own; bare numbered items need at least two to avoid matching
/// casual "1." in prose.
pub(crate) fn has_numbered_steps(texts: &[String]) -> bool {
    texts.iter().any(|text| {
        if STEP_REF_REGEX.is_match(&text.to_lowercase()) {
            return true;
        }
        NUMBERED_ITEM_REGEX.find_iter(text).count() >= 2
    })
}

/// Uppercase the first character, e.g. "morning" to "Morning".
pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Render a 0..1 fraction as a whole percentage, e.g. 0.725 -> "73%".
pub(crate) fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}
