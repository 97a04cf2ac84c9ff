//! Request vocabulary of the file manager API.

use fileroot_core::{FileError, FileFilter, Result};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The `type` selector of a mutating or options request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Move,
    Rename,
    CreateFolder,
    CreateArchive,
    UploadFile,
    ToggleShowAllFiles,
    GetShowAllFiles,
    ShowAllFilesOn,
    ShowAllFilesOff,
    GetFileFilter,
}

impl OperationType {
    /// Parse an optional selector, rejecting a missing or unknown one.
    pub fn parse(selector: Option<&str>) -> Result<Self> {
        let selector = selector
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FileError::invalid_request("missing operation type"))?;
        selector
            .parse()
            .map_err(|_| FileError::invalid_request(format!("unknown operation type {selector:?}")))
    }
}

/// A mutation parsed from a selector and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    /// Move the sources into the request path.
    Move { sources: Vec<String> },
    /// Rename the request path to `target`.
    Rename { target: String },
    /// Create the request path as a directory.
    CreateFolder,
    /// Pack the sources into an archive at the request path.
    CreateArchive {
        sources: Vec<String>,
        embed_dirs: bool,
    },
}

impl FileOperation {
    /// Parse a selector and pick the fields it needs from `body`.
    pub fn parse(selector: Option<&str>, body: &MutationBody) -> Result<Self> {
        match OperationType::parse(selector)? {
            OperationType::Move => Ok(Self::Move {
                sources: body.require_src()?.to_vec(),
            }),
            OperationType::Rename => Ok(Self::Rename {
                target: body.require_target()?.to_string(),
            }),
            OperationType::CreateFolder => Ok(Self::CreateFolder),
            OperationType::CreateArchive => Ok(Self::CreateArchive {
                sources: body.require_src()?.to_vec(),
                embed_dirs: body.embed_dirs,
            }),
            other => Err(FileError::invalid_request(format!(
                "operation type {other} does not take a body"
            ))),
        }
    }

    /// The selector this operation was parsed from.
    pub fn kind(&self) -> OperationType {
        match self {
            Self::Move { .. } => OperationType::Move,
            Self::Rename { .. } => OperationType::Rename,
            Self::CreateFolder => OperationType::CreateFolder,
            Self::CreateArchive { .. } => OperationType::CreateArchive,
        }
    }
}

/// JSON body of move, rename and archive requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MutationBody {
    /// Source paths for MOVE and CREATE_ARCHIVE.
    pub src: Option<Vec<String>>,
    /// New path for RENAME.
    pub target: Option<String>,
    /// Keep parent directories in archive entry names.
    pub embed_dirs: bool,
}

impl MutationBody {
    /// Body carrying only sources.
    pub fn sources<S: Into<String>>(src: impl IntoIterator<Item = S>) -> Self {
        Self {
            src: Some(src.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Body carrying only a rename target.
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub(crate) fn require_src(&self) -> Result<&[String]> {
        self.src
            .as_deref()
            .ok_or_else(|| FileError::invalid_request("missing field `src`"))
    }

    pub(crate) fn require_target(&self) -> Result<&str> {
        self.target
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FileError::invalid_request("missing field `target`"))
    }
}

/// Answer to an options request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OptionResponse {
    /// Current hidden-files setting.
    ShowAllFiles(bool),
    /// Configured upload filters.
    FileFilter(FileFilter),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert_eq!(OperationType::parse(Some("MOVE")).unwrap(), OperationType::Move);
        assert_eq!(
            OperationType::parse(Some("TOGGLE_SHOW_ALL_FILES")).unwrap(),
            OperationType::ToggleShowAllFiles
        );
        assert_eq!(OperationType::CreateArchive.to_string(), "CREATE_ARCHIVE");
        assert!(OperationType::parse(None).is_err());
        assert!(OperationType::parse(Some("")).is_err());
        assert!(OperationType::parse(Some("move")).is_err());
    }

    #[test]
    fn test_file_operation_needs_its_fields() {
        let body = MutationBody::sources(["a.txt"]);
        assert_eq!(
            FileOperation::parse(Some("MOVE"), &body).unwrap(),
            FileOperation::Move {
                sources: vec!["a.txt".to_string()]
            }
        );
        assert!(FileOperation::parse(Some("RENAME"), &body).is_err());
        assert!(FileOperation::parse(Some("GET_FILE_FILTER"), &body).is_err());

        let op = FileOperation::parse(Some("CREATE_FOLDER"), &MutationBody::default()).unwrap();
        assert_eq!(op.kind(), OperationType::CreateFolder);
    }

    #[test]
    fn test_body_is_camel_case() {
        let body: MutationBody =
            serde_json::from_str(r#"{ "src": ["a", "b"], "embedDirs": true }"#).unwrap();
        assert_eq!(body.require_src().unwrap(), ["a", "b"]);
        assert!(body.embed_dirs);
        assert!(body.require_target().is_err());

        let empty: MutationBody = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, MutationBody::default());
    }

    #[test]
    fn test_option_response_wire_format() {
        let json = serde_json::to_value(OptionResponse::ShowAllFiles(true)).unwrap();
        assert_eq!(json, serde_json::json!(true));

        let filter = FileFilter {
            file: "zip|mp4".into(),
            mime: "video/*".into(),
        };
        let json = serde_json::to_value(OptionResponse::FileFilter(filter)).unwrap();
        assert_eq!(json["file"], "zip|mp4");
        assert_eq!(json["mime"], "video/*");
    }
}
