// src/types.rs
//
// Data-transfer types shared by the store client, the transfer pipelines and
// the CLI.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Owner/project scope under which artifact keys are unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub owner: String,
    pub project: String,
}

impl Namespace {
    pub fn new(owner: impl Into<String>, project: impl Into<String>) -> Self {
        Self { owner: owner.into(), project: project.into() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.project)
    }
}

/// Forward-slash relative path identifying a blob inside a namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Normalize an arbitrary key string: `\` becomes `/`, empty and `.`
    /// segments are dropped.
    pub fn new(raw: &str) -> Self {
        let joined = raw
            .replace('\\', "/")
            .split('/')
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .collect::<Vec<_>>()
            .join("/");
        ArtifactKey(joined)
    }

    /// Build a key from a path relative to an upload root, optionally
    /// qualified by `prefix`.
    pub fn from_relative_path(prefix: Option<&str>, relative: &Path) -> Self {
        let mut segments: Vec<String> = prefix
            .map(|p| ArtifactKey::new(p).0)
            .filter(|p| !p.is_empty())
            .into_iter()
            .collect();

        for comp in relative.components() {
            if let Component::Normal(seg) = comp {
                segments.push(seg.to_string_lossy().into_owned());
            }
        }
        ArtifactKey::new(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactKey {
    fn from(s: &str) -> Self {
        ArtifactKey::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Folder,
}

/// Remote-side descriptor returned by a listing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub key: ArtifactKey,
    #[serde(rename = "file_type", alias = "type")]
    pub kind: EntryType,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ArtifactEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryType::Folder
    }
}

/// Single-use presigned upload target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTicket {
    #[serde(rename = "url")]
    pub upload_url: String,
    #[serde(rename = "fields", default)]
    pub form_fields: BTreeMap<String, String>,
}

/// A pending upload: one local file and the key it lands under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub key: ArtifactKey,
}

/// Simulation artifact categories served as bulk archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    Inputs,
    Outputs,
    Logs,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 3] =
        [ArtifactCategory::Inputs, ArtifactCategory::Outputs, ArtifactCategory::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Inputs => "inputs",
            ArtifactCategory::Outputs => "outputs",
            ArtifactCategory::Logs => "logs",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -----------------------------------------------------------------------------
// Account / project / simulation DTOs
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub owner: Option<serde_json::Value>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub public: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Everything else the API reports, kept for the status document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationPage {
    pub resources: Vec<Simulation>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSelection {
    pub owner: String,
    pub name: String,
    pub tag: String,
}

impl std::str::FromStr for RecipeSelection {
    type Err = String;

    /// Parse `owner/name:tag`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || format!("expected recipe reference in format \"owner/name:tag\" not: {s}");
        let (owner, rest) = s.split_once('/').ok_or_else(err)?;
        let (name, tag) = rest.split_once(':').ok_or_else(err)?;
        if owner.is_empty() || name.is_empty() || tag.is_empty() || rest.contains('/') {
            return Err(err());
        }
        Ok(RecipeSelection { owner: owner.into(), name: name.into(), tag: tag.into() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSimulation {
    pub recipe: RecipeSelection,
    #[serde(default)]
    pub inputs: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSimulation {
    pub id: String,
}
