use serde::{Deserialize, Serialize};

/// A user query after locale normalization.
///
/// Derived per call; carries no identity beyond its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Input exactly as the caller supplied it.
    pub raw: String,
    /// Lowercased and stopword-filtered. Falls back to `raw` when filtering
    /// would leave nothing.
    pub normalized: String,
    /// `normalized` with accented letters folded to their base letters.
    /// Equal to `normalized` when folding changes nothing.
    pub diacritic_folded: String,
    /// Text handed to the engine's match clause.
    pub combined: String,
}

impl SearchQuery {
    /// True when folding produced a distinct spelling, i.e. `combined`
    /// carries an OR between two variants.
    pub fn has_folded_variant(&self) -> bool {
        self.diacritic_folded != self.normalized
    }
}
