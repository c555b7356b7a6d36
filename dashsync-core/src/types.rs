//! Domain types shared by the reconciliation engine and its collaborators.
//!
//! A dashboard is kept as its raw JSON model; the handful of fields the engine
//! cares about are read and written through typed accessors so the model stays
//! the single source of truth for every write.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DocumentError;

/// JSON keys of the dashboard model that carry engine-relevant metadata.
pub mod fields {
    pub const UID: &str = "uid";
    pub const TITLE: &str = "title";
    pub const TAGS: &str = "tags";
    /// Revision counter, bumped by the live store on every write.
    pub const VERSION: &str = "version";
    /// Primary key local to one live store.
    pub const ID: &str = "id";
    /// Name of the job that exported the versioned copy.
    pub const SYNC_ORIGIN: &str = "syncOrigin";
}

/// Name of the live store's reserved "no folder" folder.
pub const GENERAL_FOLDER: &str = "General";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a commit in the version-control store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A credential value that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ---------------------------------------------------------------------------
// Dashboard document
// ---------------------------------------------------------------------------

/// A dashboard as read from either store, plus the folder it lives in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardDocument {
    /// Folder title in the live store, top-level directory in the VCS.
    pub folder_path: String,
    model: Map<String, Value>,
}

impl DashboardDocument {
    /// Wrap a parsed JSON model. The top level must be an object.
    pub fn from_model(folder_path: impl Into<String>, model: Value) -> Result<Self, DocumentError> {
        match model {
            Value::Object(model) => Ok(Self {
                folder_path: folder_path.into(),
                model,
            }),
            other => Err(DocumentError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    /// Parse a serialized dashboard (a versioned file's content).
    pub fn from_slice(folder_path: impl Into<String>, bytes: &[u8]) -> Result<Self, DocumentError> {
        let model: Value = serde_json::from_slice(bytes)?;
        Self::from_model(folder_path, model)
    }

    /// Pretty JSON with a trailing newline, the on-disk format of versioned copies.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        let mut bytes = serde_json::to_vec_pretty(&self.model)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn model(&self) -> &Map<String, Value> {
        &self.model
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.model.clone())
    }

    /// Relative path of the versioned copy: `folder/title.json`.
    pub fn file_path(&self) -> String {
        format!("{}/{}.json", self.folder_path, self.title())
    }

    pub fn uid(&self) -> &str {
        self.str_field(fields::UID)
    }

    pub fn title(&self) -> &str {
        self.str_field(fields::TITLE)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.model
            .get(fields::TAGS)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter().map(|t| Value::String(t.into())).collect();
        self.model.insert(fields::TAGS.to_owned(), Value::Array(tags));
    }

    /// Remove the first tag equal to `tag`. Later duplicates are kept.
    ///
    /// Returns `true` if a tag was removed.
    pub fn remove_tag_once(&mut self, tag: &str) -> bool {
        let Some(tags) = self.model.get_mut(fields::TAGS).and_then(Value::as_array_mut) else {
            return false;
        };
        match tags.iter().position(|t| t.as_str() == Some(tag)) {
            Some(index) => {
                tags.remove(index);
                true
            }
            None => false,
        }
    }

    /// Revision counter (`version`); `0` when absent.
    pub fn revision(&self) -> i64 {
        self.int_field(fields::VERSION)
    }

    pub fn set_revision(&mut self, revision: i64) {
        self.model
            .insert(fields::VERSION.to_owned(), Value::from(revision));
    }

    /// Store-local primary key (`id`); `0` when absent or null.
    pub fn internal_id(&self) -> i64 {
        self.int_field(fields::ID)
    }

    pub fn set_internal_id(&mut self, id: i64) {
        self.model.insert(fields::ID.to_owned(), Value::from(id));
    }

    pub fn sync_origin(&self) -> &str {
        self.str_field(fields::SYNC_ORIGIN)
    }

    pub fn set_sync_origin(&mut self, origin: &str) {
        self.model
            .insert(fields::SYNC_ORIGIN.to_owned(), Value::String(origin.to_owned()));
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.model.get(key)
    }

    /// Make `key` in this model mirror `source`: copied when present there,
    /// removed when absent.
    pub fn adopt_field(&mut self, source: &DashboardDocument, key: &str) {
        match source.model.get(key) {
            Some(value) => {
                self.model.insert(key.to_owned(), value.clone());
            }
            None => {
                self.model.remove(key);
            }
        }
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.model.remove(key)
    }

    pub fn insert_field(&mut self, key: &str, value: Value) {
        self.model.insert(key.to_owned(), value);
    }

    fn str_field(&self, key: &str) -> &str {
        self.model.get(key).and_then(Value::as_str).unwrap_or("")
    }

    fn int_field(&self, key: &str) -> i64 {
        self.model
            .get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Live-store records
// ---------------------------------------------------------------------------

/// A folder in the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub name: String,
    pub id: i64,
}

impl FolderRef {
    /// The reserved "no folder" folder; it always exists and has id `0`.
    pub fn general() -> Self {
        Self {
            name: GENERAL_FOLDER.to_owned(),
            id: 0,
        }
    }

    pub fn is_reserved(name: &str) -> bool {
        name == GENERAL_FOLDER
    }
}

/// One result of a tag search in the live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardHit {
    pub uid: String,
    pub title: String,
    pub folder_id: i64,
    pub folder_title: String,
}

/// Acknowledgement of a live-store write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteStatus {
    pub uid: String,
    pub version: i64,
    pub status: String,
}

/// Handle on a checked-out branch of the version-control store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub branch: String,
}

// ---------------------------------------------------------------------------
// Job configuration
// ---------------------------------------------------------------------------

/// Import (VCS → live store) settings of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct PullConfig {
    pub enable: bool,
    pub git_branch: String,
    /// Regex over `folder/title`; empty or absent matches everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Export (live store → VCS) settings of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct PushConfig {
    pub enable: bool,
    pub git_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Tag selecting the live dashboards to export.
    pub tag_pattern: String,
    /// Keep the selection tag on exported dashboards instead of removing it.
    #[serde(rename = "push-tags")]
    pub preserve_tags_on_export: bool,
}

/// How to authenticate against the live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveAuth {
    Token(Secret),
    Basic { user: String, password: Secret },
}

/// How to authenticate against the git remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitAuth {
    SshKey(PathBuf),
    UserPass { user: String, password: Secret },
}

/// One synchronization job as read from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SyncJob {
    pub job_name: String,

    pub grafana_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_password: Option<Secret>,

    pub git_repository_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_password: Option<Secret>,

    #[serde(default)]
    pub push_configuration: PushConfig,
    #[serde(default)]
    pub pull_configuration: PullConfig,
}

impl SyncJob {
    /// Token wins over user/password when both are configured. Empty values
    /// count as unset, as in [`SyncJob::git_auth`].
    pub fn live_auth(&self) -> Option<LiveAuth> {
        if let Some(token) = self.grafana_token.as_ref().filter(|t| !t.is_empty()) {
            return Some(LiveAuth::Token(token.clone()));
        }
        match (&self.grafana_user, &self.grafana_password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(LiveAuth::Basic {
                    user: user.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        }
    }

    /// A private key wins over user/password when both are configured.
    pub fn git_auth(&self) -> Option<GitAuth> {
        if let Some(key) = self
            .private_key_file
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            return Some(GitAuth::SshKey(key.clone()));
        }
        match (&self.git_user_name, &self.git_password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(GitAuth::UserPass {
                    user: user.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
