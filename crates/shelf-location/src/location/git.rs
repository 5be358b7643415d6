//! Git repository location
//!
//! Each remote is mirrored once under `<shelf_path>/git/<hash of uri>` and
//! refreshed at most once per location instance. Versions come from
//! version-like tags and from the metadata at the pinned ref (or the default
//! branch). Content is exported with `git archive`, so no working tree is ever
//! checked out. The revision stamp of a fetched cookbook is its commit sha.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use dashmap::DashMap;
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, CookbookMetadata, GitRef, LocationSpec, Version, METADATA_JSON, METADATA_RB};
use shelf_core::utils::blake3_hash;
use shelf_store::CookbookStore;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::{register, unpack, Location};
use crate::context::ShelfContext;
use crate::http::{with_retry, RetryConfig};
use crate::LocationResult;

/// A cookbook kept in a git repository
pub struct GitLocation {
    spec: LocationSpec,
    uri: String,
    reference: Option<GitRef>,
    executable: String,
    mirror: Utf8PathBuf,
    timeout: Duration,
    retry: RetryConfig,
    ctx: ShelfContext,
    store: Arc<CookbookStore>,
    synced: OnceCell<()>,
    commit: OnceCell<String>,
    /// Version to tag name, filled by the tag listing
    tags: DashMap<Version, String>,
}

impl GitLocation {
    pub fn new(spec: LocationSpec, ctx: &ShelfContext) -> Self {
        let (uri, reference) = match &spec {
            LocationSpec::Git { uri, reference } => (uri.clone(), reference.clone()),
            _ => (String::new(), None),
        };
        let mirror = ctx.config.git_path().join(&blake3_hash(uri.as_bytes())[..16]);

        Self {
            spec,
            uri,
            reference,
            executable: ctx.config.git.executable.clone(),
            mirror,
            timeout: ctx.http.timeout(),
            retry: ctx.http.retry_config().clone(),
            ctx: ctx.clone(),
            store: ctx.store.clone(),
            synced: OnceCell::new(),
            commit: OnceCell::new(),
            tags: DashMap::new(),
        }
    }

    /// Local bare mirror of the remote
    pub fn mirror_path(&self) -> &Utf8PathBuf {
        &self.mirror
    }

    async fn git(&self, args: &[&str]) -> LocationResult<Output> {
        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ShelfError::SourceUnavailable {
                location: self.spec.descriptor(),
                message: format!("failed to run {}", self.executable),
                source: Some(Box::new(e)),
            }),
            Err(_) => Err(ShelfError::unavailable(
                self.spec.descriptor(),
                format!("git {} timed out after {:?}", args.first().copied().unwrap_or_default(), self.timeout),
            )),
        }
    }

    /// Run git in the mirror, failing as unavailable on a non-zero exit
    async fn git_checked(&self, args: &[&str]) -> LocationResult<Vec<u8>> {
        let output = self.git(args).await?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        Err(ShelfError::unavailable(
            self.spec.descriptor(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }

    fn in_mirror<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = vec!["--git-dir", self.mirror.as_str()];
        full.extend_from_slice(args);
        full
    }

    /// Clone or update the mirror, once per instance
    async fn sync(&self) -> LocationResult<()> {
        self.synced
            .get_or_try_init(|| async {
                let _guard = self.ctx.lock_mirror(&self.mirror).await;
                with_retry(&self.retry, || self.update_mirror()).await
            })
            .await?;
        Ok(())
    }

    async fn update_mirror(&self) -> LocationResult<()> {
        if self.mirror.join("HEAD").is_file() {
            debug!(uri = %self.uri, "updating mirror");
            self.git_checked(&self.in_mirror(&["remote", "update", "--prune"])).await?;
            return Ok(());
        }

        if self.mirror.exists() {
            std::fs::remove_dir_all(&self.mirror)
                .map_err(|e| ShelfError::io(format!("Failed to remove partial mirror {}", self.mirror), e))?;
        }
        if let Some(parent) = self.mirror.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ShelfError::io(format!("Failed to create {}", parent), e))?;
        }

        info!(uri = %self.uri, mirror = %self.mirror, "cloning");
        self.git_checked(&["clone", "--mirror", "--quiet", &self.uri, self.mirror.as_str()])
            .await?;
        Ok(())
    }

    async fn rev_parse(&self, rev: &str) -> LocationResult<Option<String>> {
        let output = self
            .git(&self.in_mirror(&["rev-parse", "--verify", "--quiet", rev]))
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Commit the configured ref points at
    async fn commit(&self) -> LocationResult<String> {
        self.sync().await?;
        let commit = self
            .commit
            .get_or_try_init(|| async {
                let (rev, label) = match &self.reference {
                    None => ("HEAD^{commit}".to_string(), "HEAD"),
                    Some(GitRef::Branch(name)) => (format!("refs/heads/{}^{{commit}}", name), name.as_str()),
                    Some(GitRef::Tag(name)) => (format!("refs/tags/{}^{{commit}}", name), name.as_str()),
                    Some(GitRef::Rev(rev)) => (format!("{}^{{commit}}", rev), rev.as_str()),
                };
                self.rev_parse(&rev).await?.ok_or_else(|| ShelfError::RefNotFound {
                    uri: self.uri.clone(),
                    reference: label.to_string(),
                })
            })
            .await?;
        Ok(commit.clone())
    }

    /// Version-like tags, recorded for later fetches
    async fn version_tags(&self) -> LocationResult<Vec<Version>> {
        let stdout = self
            .git_checked(&self.in_mirror(&["for-each-ref", "--format=%(refname:short)", "refs/tags"]))
            .await?;

        let mut versions = Vec::new();
        for tag in String::from_utf8_lossy(&stdout).lines().map(str::trim) {
            if let Some(version) = Version::from_tag(tag) {
                self.tags.entry(version.clone()).or_insert_with(|| tag.to_string());
                versions.push(version);
            }
        }
        Ok(versions)
    }

    /// Cookbook metadata at a commit
    async fn metadata_at(&self, commit: &str, name: &str) -> LocationResult<CookbookMetadata> {
        for file in [METADATA_JSON, METADATA_RB] {
            let object = format!("{}:{}", commit, file);
            let output = self.git(&self.in_mirror(&["show", &object])).await?;
            if !output.status.success() {
                continue;
            }

            let content = String::from_utf8_lossy(&output.stdout);
            let parsed = if file == METADATA_JSON {
                CookbookMetadata::from_json_str(&content)
            } else {
                CookbookMetadata::from_ruby_str(&content, Some(name))
            };
            return parsed.map_err(|message| ShelfError::MetadataParse {
                path: format!("{}@{}:{}", self.uri, commit, file),
                message,
            });
        }

        Err(ShelfError::MetadataParse {
            path: format!("{}@{}", self.uri, commit),
            message: format!("neither {} nor {} present", METADATA_JSON, METADATA_RB),
        })
    }

    /// Commit to export for a version
    async fn commit_for(&self, version: &Version) -> LocationResult<String> {
        if self.reference.is_some() {
            return self.commit().await;
        }

        if self.tags.is_empty() {
            self.version_tags().await?;
        }
        let tag = self.tags.get(version).map(|tag| tag.clone());
        match tag {
            Some(tag) => self
                .rev_parse(&format!("refs/tags/{}^{{commit}}", tag))
                .await?
                .ok_or_else(|| ShelfError::RefNotFound {
                    uri: self.uri.clone(),
                    reference: tag,
                }),
            None => self.commit().await,
        }
    }
}

#[async_trait]
impl Location for GitLocation {
    fn spec(&self) -> &LocationSpec {
        &self.spec
    }

    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>> {
        self.sync().await?;

        let mut versions = if self.reference.is_none() {
            self.version_tags().await?
        } else {
            Vec::new()
        };

        let head = match self.commit().await {
            Ok(commit) => self.metadata_at(&commit, name).await,
            Err(e) => Err(e),
        };
        match head {
            Ok(metadata) if metadata.name == name => {
                if !versions.contains(&metadata.version) {
                    versions.push(metadata.version);
                }
            },
            Ok(metadata) => {
                debug!(expected = name, found = %metadata.name, uri = %self.uri, "repository holds another cookbook");
                if versions.is_empty() {
                    return Err(ShelfError::not_found(name, "any", self.spec.descriptor()));
                }
            },
            Err(e) if versions.is_empty() => return Err(e),
            Err(e) => debug!(uri = %self.uri, error = %e, "ignoring unreadable default branch"),
        }

        Ok(versions)
    }

    #[instrument(skip(self), fields(uri = %self.uri))]
    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage> {
        let commit = self.commit_for(version).await?;

        let metadata = self.metadata_at(&commit, name).await?;
        if metadata.name != name || &metadata.version != version {
            return Err(ShelfError::not_found(name, version.to_string(), self.spec.descriptor()));
        }

        let staging = self.store.staging_dir(name)?;
        let archive = self
            .git_checked(&self.in_mirror(&["archive", "--format=tar", &commit]))
            .await?;
        unpack(archive, staging.path().to_path_buf(), false).await?;

        let package = register(
            &self.store,
            staging.path().to_path_buf(),
            name,
            version,
            Some(commit),
            self.is_mutable(),
        )?;
        info!(cookbook = %package.identity, revision = package.revision.as_deref().unwrap_or("-"), "exported from git");
        Ok(package)
    }

    async fn cache_key(&self) -> LocationResult<String> {
        Ok(format!("{}@{}", self.spec.descriptor(), self.commit().await?))
    }

    /// Tagged versions of an unpinned repository live at their tag, not at HEAD
    async fn revision(&self, _name: &str, version: &Version) -> LocationResult<Option<String>> {
        self.sync().await?;
        Ok(Some(self.commit_for(version).await?))
    }
}

impl std::fmt::Debug for GitLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLocation")
            .field("uri", &self.uri)
            .field("reference", &self.reference)
            .field("mirror", &self.mirror)
            .finish()
    }
}
