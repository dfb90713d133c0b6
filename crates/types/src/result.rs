use serde::{Deserialize, Serialize};

/// One hit returned by the search engine.
///
/// Identifiers belong to the forum database and may be absent when the index
/// does not expose them. `content` and `subject` are only filled when the
/// index stores content and exposed the matching alias; otherwise the caller
/// has to fetch them from the forum database (`needs_content_fetch`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: Option<u64>,
    pub topic_id: Option<u64>,
    pub post_id: Option<u64>,
    pub board_id: Option<u64>,
    /// Relevance score as reported by the engine.
    pub weight: f64,
    pub content_in_index: bool,
    pub needs_content_fetch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl SearchResult {
    /// Relative forum URL for this post.
    ///
    /// `index.php?topic=T.msgP#msgP` when both ids are known,
    /// `index.php?topic=T` with only a topic, `None` otherwise.
    pub fn post_url(&self) -> Option<String> {
        match (self.topic_id, self.post_id) {
            (Some(topic), Some(post)) => {
                Some(format!("index.php?topic={topic}.msg{post}#msg{post}"))
            }
            (Some(topic), None) => Some(format!("index.php?topic={topic}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(topic_id: Option<u64>, post_id: Option<u64>) -> SearchResult {
        SearchResult {
            id: Some(1),
            topic_id,
            post_id,
            board_id: None,
            weight: 1.0,
            content_in_index: false,
            needs_content_fetch: true,
            content: None,
            subject: None,
        }
    }

    #[test]
    fn test_post_url_variants() {
        assert_eq!(
            result(Some(12), Some(340)).post_url().as_deref(),
            Some("index.php?topic=12.msg340#msg340")
        );
        assert_eq!(
            result(Some(12), None).post_url().as_deref(),
            Some("index.php?topic=12")
        );
        assert_eq!(result(None, Some(340)).post_url(), None);
    }

    #[test]
    fn test_serde_omits_missing_content() {
        let json = serde_json::to_value(result(Some(1), Some(2))).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["needsContentFetch"], true);
        assert_eq!(json["topicId"], 1);
    }
}
