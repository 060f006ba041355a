// src/registry.rs
//
// Recipe and operator registry: read a package folder into the JSON package
// the registry accepts, push it, and pull a tagged package back into a
// folder. The manifest itself is carried as opaque YAML.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{LICENSE_FILES, PACKAGE_MANIFEST_FALLBACK, README_FILES};
use crate::error::{SyncError, SyncResult};
use crate::pollination_client::{Ensured, PollinationClient};

/// The two kinds of registry repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum RepositoryKind {
    Recipe,
    Operator,
}

impl RepositoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryKind::Recipe => "recipe",
            RepositoryKind::Operator => "operator",
        }
    }

    /// Manifest file name inside a package folder.
    pub fn manifest_file(&self) -> &'static str {
        match self {
            RepositoryKind::Recipe => "recipe.yaml",
            RepositoryKind::Operator => "operator.yaml",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            RepositoryKind::Recipe => "Recipe",
            RepositoryKind::Operator => "Operator",
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub latest_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepository {
    pub name: String,
    pub public: bool,
}

/// The body pushed to and pulled from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub manifest: Value,
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub license: String,
}

impl Package {
    fn metadata_str(&self, field: &str) -> Option<String> {
        match self.manifest.get("metadata")?.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<String> {
        self.metadata_str("name")
    }

    pub fn tag(&self) -> Option<String> {
        self.metadata_str("tag")
    }

    /// Overwrite `metadata.tag`, creating `metadata` if needed.
    pub fn set_tag(&mut self, tag: &str) -> SyncResult<()> {
        let Value::Mapping(root) = &mut self.manifest else {
            return Err(SyncError::Decode("manifest is not a mapping".to_string()));
        };
        let metadata = root
            .entry(Value::from("metadata"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        let Value::Mapping(metadata) = metadata else {
            return Err(SyncError::Decode("manifest metadata is not a mapping".to_string()));
        };
        metadata.insert(Value::from("tag"), Value::from(tag));
        Ok(())
    }
}

/// A package read from disk, with the name and tag taken from its manifest.
#[derive(Debug, Clone)]
pub struct LocalPackage {
    pub kind: RepositoryKind,
    pub name: String,
    pub tag: String,
    pub package: Package,
}

fn read_first(folder: &Path, names: &[&str]) -> SyncResult<Option<String>> {
    for name in names {
        let path = folder.join(name);
        if path.is_file() {
            return Ok(Some(fs::read_to_string(path)?));
        }
    }
    Ok(None)
}

/// Read a package folder. `tag` replaces the manifest's `metadata.tag`.
/// README and LICENSE are optional and default to empty.
pub fn read_package(kind: RepositoryKind, folder: &Path, tag: Option<&str>) -> SyncResult<LocalPackage> {
    if !folder.is_dir() {
        return Err(SyncError::InvalidPath(folder.to_path_buf()));
    }
    let manifest_text = read_first(folder, &[kind.manifest_file(), PACKAGE_MANIFEST_FALLBACK])?
        .ok_or_else(|| SyncError::InvalidPath(folder.join(kind.manifest_file())))?;
    let manifest: Value = serde_yaml::from_str(&manifest_text)
        .map_err(|e| SyncError::Decode(format!("{} manifest: {e}", kind)))?;

    let mut package = Package {
        manifest,
        readme: read_first(folder, README_FILES)?.unwrap_or_default(),
        license: read_first(folder, LICENSE_FILES)?.unwrap_or_default(),
    };
    if let Some(tag) = tag {
        package.set_tag(tag)?;
    }

    let name = package
        .name()
        .ok_or_else(|| SyncError::Decode(format!("{} manifest has no metadata.name", kind)))?;
    let tag = package
        .tag()
        .ok_or_else(|| SyncError::Decode(format!("{} manifest has no metadata.tag", kind)))?;
    debug!("read {} package {}:{} from {:?}", kind, name, tag, folder);
    Ok(LocalPackage { kind, name, tag, package })
}

/// Write `package` into `folder`. An existing folder is an error unless
/// `force`, in which case it is replaced.
pub fn write_package(kind: RepositoryKind, package: &Package, folder: &Path, force: bool) -> SyncResult<PathBuf> {
    if folder.exists() {
        if !force {
            return Err(SyncError::AlreadyExists(folder.to_path_buf()));
        }
        debug!("replacing {:?}", folder);
        fs::remove_dir_all(folder)?;
    }
    fs::create_dir_all(folder)?;

    let manifest = serde_yaml::to_string(&package.manifest).map_err(|e| SyncError::Decode(e.to_string()))?;
    fs::write(folder.join(kind.manifest_file()), manifest)?;
    if !package.readme.is_empty() {
        fs::write(folder.join(README_FILES[0]), &package.readme)?;
    }
    if !package.license.is_empty() {
        fs::write(folder.join(LICENSE_FILES[0]), &package.license)?;
    }
    Ok(folder.to_path_buf())
}

impl PollinationClient {
    fn registry_path(kind: RepositoryKind, owner: &str) -> String {
        format!("/registries/{}/{}", owner, kind)
    }

    pub async fn get_repository(&self, kind: RepositoryKind, owner: &str, name: &str) -> SyncResult<Repository> {
        let path = format!("{}/{}", Self::registry_path(kind, owner), name);
        self.send_json(self.request(Method::GET, &path), &format!("{} {owner}/{name}", kind.title()))
            .await
    }

    pub async fn create_repository(
        &self,
        kind: RepositoryKind,
        owner: &str,
        repository: &NewRepository,
    ) -> SyncResult<()> {
        let rb = self.request(Method::POST, &Self::registry_path(kind, owner)).json(repository);
        self.send(rb, &format!("owner {owner}")).await?;
        info!("created {} repository {}/{}", kind, owner, repository.name);
        Ok(())
    }

    /// Look the repository up and create it when missing and allowed to.
    pub async fn ensure_repository(
        &self,
        kind: RepositoryKind,
        owner: &str,
        name: &str,
        public: bool,
        create_if_missing: bool,
    ) -> SyncResult<Ensured> {
        match self.get_repository(kind, owner, name).await {
            Ok(_) => Ok(Ensured::Existing),
            Err(SyncError::NotFound(what)) if !create_if_missing => Err(SyncError::NotFound(what)),
            Err(SyncError::NotFound(_)) => {
                let repository = NewRepository { name: name.to_string(), public };
                self.create_repository(kind, owner, &repository).await?;
                Ok(Ensured::Created)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn push_package(&self, kind: RepositoryKind, owner: &str, local: &LocalPackage) -> SyncResult<()> {
        let path = format!("{}/{}/tags", Self::registry_path(kind, owner), local.name);
        let rb = self.request(Method::POST, &path).json(&local.package);
        self.send(rb, &format!("{} {owner}/{}", kind.title(), local.name)).await?;
        info!("pushed {} {}/{}:{}", kind, owner, local.name, local.tag);
        Ok(())
    }

    pub async fn get_package(
        &self,
        kind: RepositoryKind,
        owner: &str,
        name: &str,
        tag: &str,
    ) -> SyncResult<Package> {
        let path = format!("{}/{}/tags/{}", Self::registry_path(kind, owner), name, tag);
        self.send_json(self.request(Method::GET, &path), &format!("{} {owner}/{name}:{tag}", kind.title()))
            .await
    }

    /// Fetch a package, resolving the repository's latest tag when `tag`
    /// is not given. Returns the tag that was fetched.
    pub async fn pull_package(
        &self,
        kind: RepositoryKind,
        owner: &str,
        name: &str,
        tag: Option<&str>,
    ) -> SyncResult<(String, Package)> {
        let tag = match tag {
            Some(t) => t.to_string(),
            None => self
                .get_repository(kind, owner, name)
                .await?
                .latest_tag
                .ok_or_else(|| SyncError::NotFound(format!("{} {owner}/{name} has no tags", kind.title())))?,
        };
        let package = self.get_package(kind, owner, name, &tag).await?;
        Ok((tag, package))
    }
}
