use forum_search_types::VersionSettings;

use crate::keys::sha256_hex;

/// Hash of the settings that change what a search returns. Folded into
/// every search key, so a change orphans all earlier entries.
pub fn schema_version(settings: &VersionSettings) -> String {
    let payload = serde_json::json!({
        "max_results": settings.max_results,
        "model_path": settings.model_path,
        "model_type": settings.model_type,
    });
    sha256_hex(&payload.to_string())
}
