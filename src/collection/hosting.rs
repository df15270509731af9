//! Hosting-API repo collection.
//!
//! The collection url names a user on an external code-hosting service
//! (e.g. `https://github.com/GoogleCloudPlatform`). Discovery lists the
//! user's repositories through the hosting API and keeps the ones whose
//! names pass the configured heuristic. Population lists one repo's file
//! tree, then fetches every file concurrently (scatter), gathering the
//! results in issuance order; a failed file is warned and skipped so one
//! bad blob never aborts an otherwise-successful import.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::HostingSettings;
use crate::model::Repo;
use crate::tree::Tree;

use super::fetch::{Fetch, FetchResponse};
use super::{CollectionError, RepoCollection, RepoSpec, Result};

// =============================================================================
// API Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiContentsEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    git_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiBlob {
    content: String,
}

// =============================================================================
// Name Filter
// =============================================================================

/// The naming heuristic deciding which of a user's repositories qualify
/// for import.
///
/// A name qualifies only if it starts with `prefix`, its `-`-split
/// tokens contain `required_token`, and none of `excluded_tokens`
/// appear. All checks are case-insensitive.
#[derive(Debug, Clone)]
pub struct RepoNameFilter {
    pub prefix: String,
    pub required_token: String,
    pub excluded_tokens: Vec<String>,
}

impl RepoNameFilter {
    /// Configured values are folded to lowercase; `matches` folds the
    /// candidate name, so the comparison is case-insensitive end to end.
    pub fn from_settings(settings: &HostingSettings) -> Self {
        Self {
            prefix: settings.name_prefix.to_lowercase(),
            required_token: settings.required_token.to_lowercase(),
            excluded_tokens: settings
                .excluded_tokens
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        if !name.starts_with(&self.prefix) {
            return false;
        }
        let tokens: Vec<&str> = name.split('-').collect();
        if !tokens.iter().any(|t| *t == self.required_token) {
            return false;
        }
        !self
            .excluded_tokens
            .iter()
            .any(|excluded| tokens.iter().any(|t| t == excluded))
    }
}

// =============================================================================
// HostingRepoCollection
// =============================================================================

/// A [`RepoCollection`] over an external code-hosting API.
pub struct HostingRepoCollection {
    collection_url: String,
    api_base: String,
    /// Scheme and host of the end-user repo urls, e.g. `https://github.com`.
    web_base: String,
    user: String,
    filter: RepoNameFilter,
    fetcher: Arc<dyn Fetch>,
}

impl HostingRepoCollection {
    /// Parse the collection url and build the variant.
    ///
    /// Accepted shapes: `https://{host}/{user}` and
    /// `https://{host}/users/{user}`, with an optional trailing segment.
    pub fn new(
        collection_url: impl Into<String>,
        api_base: impl Into<String>,
        filter: RepoNameFilter,
        fetcher: Arc<dyn Fetch>,
    ) -> Result<Self> {
        let collection_url = collection_url.into();
        let (web_base, user) = parse_collection_url(&collection_url)?;
        Ok(Self {
            collection_url,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            web_base,
            user,
            filter,
            fetcher,
        })
    }

    fn repos_url(&self) -> String {
        format!("{}/users/{}/repos", self.api_base, self.user)
    }

    fn contents_url(&self, repo_name: &str) -> String {
        format!("{}/repos/{}/{}/contents/", self.api_base, self.user, repo_name)
    }

    /// A required fetch must come back 2xx.
    async fn fetch_required(&self, url: &str) -> Result<FetchResponse> {
        let response = self.fetcher.fetch(url).await?;
        if !response.is_ok() {
            return Err(CollectionError::BadStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }
}

fn parse_collection_url(url: &str) -> Result<(String, String)> {
    let invalid = || CollectionError::InvalidUrl(url.to_string());

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(invalid)?;
    let scheme_len = url.len() - rest.len();

    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let host = segments.next().ok_or_else(invalid)?;
    let mut user = segments.next().ok_or_else(invalid)?;
    if user == "users" {
        user = segments.next().ok_or_else(invalid)?;
    }

    let web_base = format!("{}{}", &url[..scheme_len], host);
    Ok((web_base, user.to_string()))
}

/// Hosting APIs wrap base64 payloads with embedded newlines.
fn decode_blob_content(raw: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = raw.split_whitespace().collect();
    BASE64.decode(compact)
}

#[async_trait]
impl RepoCollection for HostingRepoCollection {
    fn collection_url(&self) -> &str {
        &self.collection_url
    }

    async fn discover(&self) -> Result<Vec<RepoSpec>> {
        let url = self.repos_url();
        let response = self.fetch_required(&url).await?;
        let repos: Vec<ApiRepo> =
            serde_json::from_slice(&response.body).map_err(|source| {
                CollectionError::MalformedPayload {
                    url: url.clone(),
                    source,
                }
            })?;

        let specs = repos
            .into_iter()
            .filter(|repo| self.filter.matches(&repo.name))
            .map(|repo| {
                let repo_url = format!("{}/{}/{}", self.web_base, self.user, repo.name);
                let description = match repo.description {
                    Some(d) if !d.is_empty() => d,
                    _ => repo_url.clone(),
                };
                RepoSpec {
                    url: repo_url,
                    name: repo.name,
                    description,
                }
            })
            .collect();
        Ok(specs)
    }

    async fn populate(&self, tree: &dyn Tree, repo: &Repo) -> Result<()> {
        let repo_name = repo
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CollectionError::InvalidUrl(repo.url.clone()))?;

        // Step 1 has no side effects; a failure here fails the whole job
        // and the task layer may retry it safely.
        let contents_url = self.contents_url(repo_name);
        let response = self.fetch_required(&contents_url).await?;
        let entries: Vec<ApiContentsEntry> =
            serde_json::from_slice(&response.body).map_err(|source| {
                CollectionError::MalformedPayload {
                    url: contents_url.clone(),
                    source,
                }
            })?;

        let files: Vec<ApiContentsEntry> = entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .collect();

        tree.clear().await?;

        // Scatter: every fetch goes out before any result is awaited.
        let mut in_flight = Vec::with_capacity(files.len());
        for entry in files {
            let fetcher = self.fetcher.clone();
            let url = entry.git_url.clone();
            let handle = tokio::spawn(async move { fetcher.fetch(&url).await });
            in_flight.push((entry, handle));
        }

        // Gather in issuance order. A failed file is skipped, never fatal.
        for (entry, handle) in in_flight {
            let response = match handle.await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(path = %entry.path, url = %entry.git_url, error = %e, "skipping file");
                    continue;
                }
                Err(e) => {
                    warn!(path = %entry.path, url = %entry.git_url, error = %e, "skipping file");
                    continue;
                }
            };
            if response.status != 200 {
                warn!(
                    path = %entry.path,
                    url = %entry.git_url,
                    status = response.status,
                    "skipping file"
                );
                continue;
            }

            let blob: ApiBlob = match serde_json::from_slice(&response.body) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!(path = %entry.path, url = %entry.git_url, error = %e, "skipping file");
                    continue;
                }
            };
            let content = match decode_blob_content(&blob.content) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.path, url = %entry.git_url, error = %e, "skipping file");
                    continue;
                }
            };

            info!(path = %entry.path, "importing file");
            tree.set_file(&entry.path, content).await?;
        }

        Ok(())
    }
}
