//! Engine configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default maximum upload size (300 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 300 * 1024 * 1024;

/// Extensions offered to clients as the default "important files" filter.
pub const DEFAULT_FILE_FILTER: &str = "zip|tar.gz|7z|7zip|tar|gz|tgz|tbz|tar.bz2|tar.bz|\
txt|md|doc|docx|otf|ppt|pptx|xls|xlsx|csv|indd|\
jpg|jpeg|heic|heif|png|ps|\
svg|ai|\
avi|mp4|mpg|wav|flac|m4a|aac|mpeg|mov";

/// Mime types offered to clients for file pickers.
pub const DEFAULT_MIME_FILTER: &str = "video/*|audio/*|image/*";

/// Configuration for the file resource engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ManagerConfig {
    /// Directory that every client path is resolved against.
    pub root: PathBuf,

    /// Largest upload accepted, in bytes.
    #[builder(default = "DEFAULT_MAX_UPLOAD_SIZE")]
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// Pipe-delimited extension list returned to clients.
    #[builder(default = "DEFAULT_FILE_FILTER.to_string()")]
    #[serde(default = "default_file_filter")]
    pub file_filter: String,

    /// Pipe-delimited mime list returned to clients.
    #[builder(default = "DEFAULT_MIME_FILTER.to_string()")]
    #[serde(default = "default_mime_filter")]
    pub mime_filter: String,

    /// Initial value of the show-hidden-files toggle.
    #[builder(default = "false")]
    #[serde(default)]
    pub show_hidden: bool,

    /// Status feed polling interval in milliseconds.
    #[builder(default = "1000")]
    #[serde(default = "default_feed_tick_ms")]
    pub feed_tick_ms: u64,

    /// Reconnect delay advertised to feed observers, in milliseconds.
    #[builder(default = "2000")]
    #[serde(default = "default_feed_retry_ms")]
    pub feed_retry_ms: u64,
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_file_filter() -> String {
    DEFAULT_FILE_FILTER.to_string()
}

fn default_mime_filter() -> String {
    DEFAULT_MIME_FILTER.to_string()
}

fn default_feed_tick_ms() -> u64 {
    1000
}

fn default_feed_retry_ms() -> u64 {
    2000
}

impl ManagerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if self.max_upload_size == Some(0) {
            return Err("Maximum upload size must be positive".to_string());
        }
        if self.feed_tick_ms == Some(0) {
            return Err("Feed tick must be positive".to_string());
        }
        Ok(())
    }
}

impl ManagerConfig {
    /// Create a new config builder.
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }

    /// Create a config with defaults for everything but the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            file_filter: default_file_filter(),
            mime_filter: default_mime_filter(),
            show_hidden: false,
            feed_tick_ms: default_feed_tick_ms(),
            feed_retry_ms: default_feed_retry_ms(),
        }
    }

    /// Status feed tick as a duration.
    pub fn feed_tick(&self) -> Duration {
        Duration::from_millis(self.feed_tick_ms)
    }

    /// The advisory filters handed out to clients.
    pub fn filters(&self) -> FileFilter {
        FileFilter {
            file: self.file_filter.clone(),
            mime: self.mime_filter.clone(),
        }
    }
}

/// Advisory client-side filters. Never enforced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    /// Pipe-delimited extension list, e.g. `zip|mp4|txt`.
    pub file: String,
    /// Pipe-delimited mime list, e.g. `video/*|image/*`.
    pub mime: String,
}

impl FileFilter {
    /// The individual extensions of the file filter.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.file
            .split('|')
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
    }

    /// Check whether a file name carries one of the filtered extensions.
    ///
    /// An empty filter matches everything.
    pub fn matches(&self, name: &str) -> bool {
        let mut extensions = self.extensions().peekable();
        if extensions.peek().is_none() {
            return true;
        }
        let lower = name.to_lowercase();
        extensions.any(|ext| {
            lower
                .strip_suffix(&ext.to_lowercase())
                .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ManagerConfig::builder()
            .root("/srv/files")
            .max_upload_size(1024u64)
            .show_hidden(true)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/files"));
        assert_eq!(config.max_upload_size, 1024);
        assert!(config.show_hidden);
        assert_eq!(config.feed_tick(), Duration::from_secs(1));
        assert_eq!(config.mime_filter, DEFAULT_MIME_FILTER);
    }

    #[test]
    fn test_config_builder_requires_root() {
        assert!(ManagerConfig::builder().build().is_err());
        assert!(ManagerConfig::builder().root("").build().is_err());
        assert!(
            ManagerConfig::builder()
                .root("/srv")
                .max_upload_size(0u64)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_filter_matches() {
        let filter = ManagerConfig::new("/srv").filters();
        assert!(!filter.matches("report.pdf"));
        assert!(filter.matches("holiday.jpg"));
        assert!(filter.matches("backup.tar.gz"));
        assert!(!filter.matches("zip"));
        assert!(!filter.matches("notes.rtf"));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = FileFilter {
            file: String::new(),
            mime: String::new(),
        };
        assert!(filter.matches("anything.bin"));
    }
}
