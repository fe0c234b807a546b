use crate::pipeline::TrailingSlashPolicy;
use crate::runner::UploadDetector;
use serde::Deserialize;

/// Application settings.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use micro_dispatch::pipeline::TrailingSlashPolicy;
/// use micro_dispatch::Settings;
///
/// let settings: Settings = serde_json::from_str(r#"{"trailing_slash": "permissive"}"#).unwrap();
/// assert_eq!(settings.trailing_slash, TrailingSlashPolicy::Permissive);
/// assert_eq!(settings.default_charset, "utf-8");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trailing_slash: TrailingSlashPolicy,
    /// Appended to textual content types that do not name a charset. Empty disables it.
    pub default_charset: String,
    pub upload_detector: UploadDetector,
    /// Chunk size of file bodies, in bytes.
    pub file_chunk_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trailing_slash: TrailingSlashPolicy::default(),
            default_charset: "utf-8".to_string(),
            upload_detector: UploadDetector::default(),
            file_chunk_size: 8 * 1024,
        }
    }
}
