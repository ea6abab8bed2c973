//! Remote update client
//!
//! Talks to either a GitHub-style release repository or a generic server
//! hosting `latest.json`, downloads the platform artifact with progress
//! reporting and launches it as the installer.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use url::Url;

use shared::{component_debug, component_info, component_warn, Component, Progress, UpdateInfo};

use crate::config::UpdateFeed;
use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::UpdateClient;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GENERIC_MANIFEST: &str = "latest.json";

/// `releases/latest` response, only the fields we read
#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

/// `latest.json` served by a generic feed
#[derive(Debug, Deserialize)]
struct GenericManifest {
    version: String,
    #[serde(default)]
    pub_date: Option<String>,
    url: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Where the artifact for a discovered release lives
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReleaseArtifact {
    url: Url,
    size: Option<u64>,
}

/// A release as seen by the feed, before version comparison
#[derive(Debug)]
struct FeedRelease {
    version: semver::Version,
    info: UpdateInfo,
    artifact: Option<ReleaseArtifact>,
}

/// Real update client over reqwest
pub struct RealUpdateClient {
    client: reqwest::Client,
    feed: Option<UpdateFeed>,
    api_base: String,
    download_dir: PathBuf,

    /// Artifacts discovered by `check`, keyed by version
    artifacts: Mutex<HashMap<String, ReleaseArtifact>>,
}

impl RealUpdateClient {
    pub fn new(feed: Option<UpdateFeed>, download_dir: impl Into<PathBuf>) -> SupervisorResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("qbox-supervisor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            feed,
            api_base: GITHUB_API_BASE.to_string(),
            download_dir: download_dir.into(),
            artifacts: Mutex::new(HashMap::new()),
        })
    }

    /// Point repository lookups at another API host (fluent API)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_release(&self) -> SupervisorResult<FeedRelease> {
        let Some(feed) = &self.feed else {
            return Err(SupervisorError::update_config("no update feed configured"));
        };

        match feed {
            UpdateFeed::Repository { owner, name } => {
                let url = format!("{}/repos/{owner}/{name}/releases/latest", self.api_base);
                let release: GithubRelease = self.get_json(&url).await?;
                release_from_github(release)
            }
            UpdateFeed::Generic { url } => {
                let manifest_url = format!("{}/{GENERIC_MANIFEST}", url.as_str().trim_end_matches('/'));
                let manifest: GenericManifest = self.get_json(&manifest_url).await?;
                release_from_manifest(manifest, url)
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> SupervisorResult<T> {
        component_debug!(Component::Updater, "GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SupervisorError::transport(format!(
                "update feed {url} answered {}",
                response.status()
            )));
        }
        let body = response.json().await?;
        Ok(body)
    }

    fn remember_artifact(&self, version: &str, artifact: ReleaseArtifact) {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        artifacts.insert(version.to_string(), artifact);
    }

    fn artifact_for(&self, version: &str) -> Option<ReleaseArtifact> {
        let artifacts = self.artifacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        artifacts.get(version).cloned()
    }
}

#[async_trait]
impl UpdateClient for RealUpdateClient {
    async fn check(&self, current_version: &semver::Version) -> SupervisorResult<Option<UpdateInfo>> {
        let release = self.fetch_release().await?;

        if release.version <= *current_version {
            component_debug!(
                Component::Updater,
                "Latest release {} is not newer than {}",
                release.version,
                current_version
            );
            return Ok(None);
        }

        let Some(artifact) = release.artifact else {
            component_warn!(
                Component::Updater,
                "Release {} has no artifact for this platform ({})",
                release.version,
                std::env::consts::OS
            );
            return Ok(None);
        };

        self.remember_artifact(&release.info.version, artifact);
        Ok(Some(release.info))
    }

    async fn download(&self, info: &UpdateInfo, progress: mpsc::UnboundedSender<Progress>) -> SupervisorResult<PathBuf> {
        let artifact = self
            .artifact_for(&info.version)
            .ok_or_else(|| SupervisorError::transport(format!("no artifact known for version {}", info.version)))?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let target = self.download_dir.join(artifact_file_name(&artifact.url, &info.version));
        let partial = target.with_extension("part");

        let response = self.client.get(artifact.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(SupervisorError::transport(format!(
                "download of {} answered {}",
                artifact.url,
                response.status()
            )));
        }
        let total = response.content_length().or(artifact.size).unwrap_or(0);

        component_info!(
            Component::Updater,
            "⬇️ Downloading {} ({} bytes) to {}",
            artifact.url,
            total,
            target.display()
        );

        let started = Instant::now();
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut transferred: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            // Receiver may already be gone when the controller shuts down
            let _ = progress.send(Progress::from_transfer(transferred, total, started.elapsed()));
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, &target).await?;
        Ok(target)
    }

    async fn install(&self, artifact: &Path) -> SupervisorResult<()> {
        if !artifact.is_file() {
            return Err(SupervisorError::transport(format!(
                "downloaded artifact {} is missing",
                artifact.display()
            )));
        }

        let mut command = installer_command(artifact)?;
        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let child = command
            .spawn()
            .map_err(|e| SupervisorError::transport(format!("failed to launch installer: {e}")))?;

        component_info!(
            Component::Updater,
            "📦 Launched installer {} (PID: {})",
            artifact.display(),
            child.id()
        );
        Ok(())
    }
}

/// Parse a release version, ignoring a leading `v`
pub fn parse_version(raw: &str) -> Option<semver::Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    semver::Version::parse(trimmed).ok()
}

/// Artifact file suffixes for the running platform, in preference order
pub fn platform_suffixes() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[".dmg", ".zip"]
    } else if cfg!(windows) {
        &[".exe", ".msi"]
    } else {
        &[".AppImage", ".deb"]
    }
}

fn release_from_github(release: GithubRelease) -> SupervisorResult<FeedRelease> {
    let version = parse_version(&release.tag_name)
        .ok_or_else(|| SupervisorError::transport(format!("release tag '{}' is not a version", release.tag_name)))?;

    let artifact = platform_suffixes().iter().find_map(|suffix| {
        release
            .assets
            .iter()
            .find(|asset| asset.name.ends_with(suffix))
            .and_then(|asset| {
                Url::parse(&asset.browser_download_url).ok().map(|url| ReleaseArtifact {
                    url,
                    size: Some(asset.size).filter(|s| *s > 0),
                })
            })
    });

    Ok(FeedRelease {
        info: UpdateInfo {
            version: version.to_string(),
            release_date: release.published_at.unwrap_or_default(),
            release_name: release.name.filter(|n| !n.is_empty()),
            release_notes: release.body.filter(|b| !b.is_empty()),
        },
        version,
        artifact,
    })
}

fn release_from_manifest(manifest: GenericManifest, feed_url: &Url) -> SupervisorResult<FeedRelease> {
    let version = parse_version(&manifest.version)
        .ok_or_else(|| SupervisorError::transport(format!("manifest version '{}' is not a version", manifest.version)))?;

    // Relative artifact URLs resolve against the feed directory
    let base = Url::parse(&format!("{}/", feed_url.as_str().trim_end_matches('/')))
        .map_err(|e| SupervisorError::transport(format!("feed URL: {e}")))?;
    let url = base
        .join(&manifest.url)
        .map_err(|e| SupervisorError::transport(format!("artifact URL '{}': {e}", manifest.url)))?;

    Ok(FeedRelease {
        info: UpdateInfo {
            version: version.to_string(),
            release_date: manifest.pub_date.unwrap_or_default(),
            release_name: manifest.name,
            release_notes: manifest.notes,
        },
        version,
        artifact: Some(ReleaseArtifact { url, size: None }),
    })
}

fn artifact_file_name(url: &Url, version: &str) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("qbox-{version}"))
}

fn installer_command(artifact: &Path) -> SupervisorResult<std::process::Command> {
    if cfg!(target_os = "macos") {
        let mut command = std::process::Command::new("open");
        command.arg(artifact);
        return Ok(command);
    }

    let is_package = artifact.extension().is_some_and(|ext| ext == "deb");
    if is_package {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(artifact);
        return Ok(command);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(artifact, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(std::process::Command::new(artifact))
}
