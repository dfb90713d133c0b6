// crates/core/src/normalizer.rs
//
// Locale-aware query normalization: lowercase, drop stopwords, and add a
// diacritic-free spelling so posts typed without Polish accents still match.

use std::collections::{HashMap, HashSet};

use forum_search_types::SearchQuery;

// ---------------------------------------------------------------------------
// Fixed tables
// ---------------------------------------------------------------------------

/// Logical OR in the engine's extended match syntax.
pub const OR_OPERATOR: &str = " | ";

pub const POLISH_STOPWORDS: &[&str] = &[
    "a", "aby", "ale", "albo", "am", "an", "ani", "bardzo", "bez", "będzie", "by", "być", "ci",
    "co", "czy", "dla", "do", "gdy", "go", "i", "ich", "ile", "im", "ja", "jak", "jako", "je",
    "jego", "jej", "jeden", "jednej", "jedną", "już", "każdy", "która", "które", "której", "lub",
    "ma", "mają", "może", "my", "na", "nad", "nasz", "nasze", "naszego", "nie", "niego", "niej",
    "nim", "nimi", "o", "od", "oraz", "po", "pod", "przez", "się", "są", "ta", "tak", "tam", "te",
    "tej", "tem", "temu", "to", "tu", "ty", "tym", "w", "we", "właśnie", "z", "za", "ze", "że",
    "żeby", "tylko", "także", "więc", "gdzie", "kiedy", "czyli", "dlatego", "jednak", "między",
    "przed", "podczas", "zatem",
];

pub const POLISH_DIACRITICS: &[(char, char)] = &[
    ('ą', 'a'),
    ('ć', 'c'),
    ('ę', 'e'),
    ('ł', 'l'),
    ('ń', 'n'),
    ('ó', 'o'),
    ('ś', 's'),
    ('ź', 'z'),
    ('ż', 'z'),
    ('Ą', 'A'),
    ('Ć', 'C'),
    ('Ę', 'E'),
    ('Ł', 'L'),
    ('Ń', 'N'),
    ('Ó', 'O'),
    ('Ś', 'S'),
    ('Ź', 'Z'),
    ('Ż', 'Z'),
];

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Pure text transform from raw user input to a [`SearchQuery`].
///
/// Holds only immutable lookup tables, so one instance can be shared across
/// tasks without synchronization.
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    stopwords: HashSet<String>,
    folding: HashMap<char, char>,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::polish()
    }
}

impl QueryNormalizer {
    /// Normalizer with the built-in Polish stopword and diacritic tables.
    pub fn polish() -> Self {
        Self::new(POLISH_STOPWORDS.iter().copied(), POLISH_DIACRITICS.iter().copied())
    }

    pub fn new<'a>(
        stopwords: impl IntoIterator<Item = &'a str>,
        folding: impl IntoIterator<Item = (char, char)>,
    ) -> Self {
        Self {
            stopwords: stopwords.into_iter().map(str::to_lowercase).collect(),
            folding: folding.into_iter().collect(),
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Replace accented letters with their base letters.
    pub fn fold_diacritics(&self, text: &str) -> String {
        text.chars()
            .map(|c| self.folding.get(&c).copied().unwrap_or(c))
            .collect()
    }

    pub fn normalize(&self, raw: &str) -> SearchQuery {
        let lowered = raw.to_lowercase();
        let kept: Vec<&str> = lowered
            .split_whitespace()
            .filter(|token| !self.is_stopword(token))
            .collect();

        // Stopword-only (or blank) input keeps the caller's text verbatim.
        let normalized = if kept.is_empty() {
            raw.to_string()
        } else {
            kept.join(" ")
        };

        let diacritic_folded = self.fold_diacritics(&normalized);
        let combined = if diacritic_folded != normalized {
            format!("{normalized}{OR_OPERATOR}{diacritic_folded}")
        } else {
            normalized.clone()
        };

        SearchQuery {
            raw: raw.to_string(),
            normalized,
            diacritic_folded,
            combined,
        }
    }
}
