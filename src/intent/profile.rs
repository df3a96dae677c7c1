use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Keywords the heuristic takes from free-text intent
const HEURISTIC_KEYWORDS: usize = 5;

/// Keywords that become priority signals in the heuristic profile
const HEURISTIC_SIGNALS: usize = 3;

/// Coarse kind of information the crawl is after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Admission,
    Research,
    Contact,
    Email,
    Policy,
    News,
    Event,
    Data,
    Content,
    General,
}

/// Category guess table, checked in order; the most matches wins
const CATEGORY_KEYWORDS: &[(IntentCategory, &[&str])] = &[
    (IntentCategory::Admission, &["admission", "apply", "enrollment"]),
    (IntentCategory::Research, &["research", "paper", "lab"]),
    (IntentCategory::Contact, &["contact", "email", "phone"]),
    (IntentCategory::Email, &["email", "mail"]),
    (IntentCategory::Policy, &["policy", "requirement", "rule"]),
    (IntentCategory::News, &["news", "update", "announcement"]),
    (IntentCategory::Event, &["event", "seminar", "conference"]),
    (IntentCategory::Data, &["data", "statistics", "ranking"]),
    (IntentCategory::Content, &["content", "article", "about"]),
];

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Research => "research",
            Self::Contact => "contact",
            Self::Email => "email",
            Self::Policy => "policy",
            Self::News => "news",
            Self::Event => "event",
            Self::Data => "data",
            Self::Content => "content",
            Self::General => "general",
        }
    }

    /// Parses a category label, case-insensitively
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .map(|(c, _)| *c)
            .chain(std::iter::once(Self::General))
            .find(|c| c.as_str() == label)
    }

    /// Picks the category whose keywords occur most often in `text`
    pub fn guess(text: &str) -> Self {
        let text = text.to_lowercase();
        let mut best = (0, Self::General);
        for (category, keywords) in CATEGORY_KEYWORDS {
            let matches = keywords.iter().filter(|k| text.contains(*k)).count();
            if matches > best.0 {
                best = (matches, *category);
            }
        }
        best.1
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of the crawl goal
///
/// Built once per run and shared read-only (behind an `Arc`) with every
/// later stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentProfile {
    /// The free-text intent as given
    pub intent: String,
    pub category: IntentCategory,
    /// Lowercase keywords
    pub keywords: BTreeSet<String>,
    pub focus_phrases: Vec<String>,
    /// Signal word to weight
    pub priority_signals: BTreeMap<String, f32>,
    /// One-paragraph description handed to the analyzer
    #[serde(default)]
    pub background: String,
    /// URL substrings the crawl should not follow
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl IntentProfile {
    /// Builds a profile without a model
    ///
    /// # Examples
    ///
    /// ```
    /// use intent_crawler::intent::{IntentCategory, IntentProfile};
    ///
    /// let profile = IntentProfile::heuristic("Admissions, deadlines");
    /// assert_eq!(profile.category, IntentCategory::Admission);
    /// assert!(profile.keywords.contains("deadlines"));
    /// ```
    pub fn heuristic(intent: &str) -> Self {
        let words = split_keywords(intent);
        let priority_signals = words
            .iter()
            .take(HEURISTIC_SIGNALS)
            .map(|w| (w.clone(), 1.0))
            .collect();

        Self {
            intent: intent.trim().to_string(),
            category: IntentCategory::guess(intent),
            keywords: words.into_iter().take(HEURISTIC_KEYWORDS).collect(),
            focus_phrases: vec![intent.trim().to_string()],
            priority_signals,
            background: format!("Looking for information about: {}", intent.trim()),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Lowercase words longer than one character, first occurrence order
pub(crate) fn split_keywords(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|w| w.trim().to_lowercase())
    {
        if word.chars().count() > 1 && !words.contains(&word) {
            words.push(word);
        }
    }
    words
}
