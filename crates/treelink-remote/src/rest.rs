//! REST implementation of `RemoteStore` against a GitHub-style hosted API.
//!
//! Endpoints consumed (semantic level): contents listing with a `ref`
//! parameter, raw blob fetch by entry URL, contents create/update/delete with
//! an optional `sha` CAS token, branch listing/lookup, and ref creation.
//! Every call carries a bearer credential and a bounded timeout; HTTP
//! statuses are mapped to distinguishable errors so a stale CAS write
//! (409/422) never masquerades as a generic network failure.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use treelink_core::config::RemoteConfig;
use treelink_core::types::{EntryKind, RemoteEntry, RepoId};
use treelink_core::{SyncError, SyncResult};

use crate::store::RemoteStore;

const MEDIA_JSON: &str = "application/vnd.github+json";
const MEDIA_RAW: &str = "application/vnd.github.raw";

pub struct RestRemote {
    http: reqwest::Client,
    api_base: String,
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct BranchInfo {
    name: String,
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

impl RestRemote {
    /// Build a client from config and a bearer credential.
    pub fn new(config: &RemoteConfig, token: &str) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| SyncError::Auth(format!("malformed credential: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_JSON));

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .map_err(http_err)?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn contents_url(&self, repo: &RepoId, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, repo.owner, repo.name, path
        )
    }

    /// Map an unsuccessful response to a distinguishable error.
    async fn check(resp: reqwest::Response, what: &str) -> SyncResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SyncError::Auth(format!("{what}: {status}"))
            }
            StatusCode::NOT_FOUND => SyncError::NotFound(what.to_string()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => SyncError::VersionMismatch {
                path: what.to_string(),
            },
            _ => SyncError::Http(format!("{what}: {status}: {body}")),
        })
    }
}

fn http_err(e: reqwest::Error) -> SyncError {
    SyncError::Http(e.to_string())
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn list_dir(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> SyncResult<Vec<RemoteEntry>> {
        let url = self.contents_url(repo, path);
        let resp = self
            .http
            .get(&url)
            .query(&[("ref", branch)])
            .send()
            .await
            .map_err(http_err)?;
        let resp = Self::check(resp, path).await?;

        let raw: Vec<ContentEntry> = resp.json().await.map_err(http_err)?;
        let mut entries = Vec::with_capacity(raw.len());
        for entry in raw {
            let kind = match entry.kind.as_str() {
                "file" => EntryKind::File,
                "dir" => EntryKind::Dir,
                other => {
                    // Symlinks and submodules are outside the sync contract.
                    debug!(path = %entry.path, kind = %other, "skipping unsupported entry");
                    continue;
                }
            };
            entries.push(RemoteEntry {
                path: entry.path,
                kind,
                version: entry.sha,
                fetch_handle: entry.url,
            });
        }
        Ok(entries)
    }

    async fn fetch_content(&self, _repo: &RepoId, handle: &str) -> SyncResult<Bytes> {
        let resp = self
            .http
            .get(handle)
            .header(ACCEPT, MEDIA_RAW)
            .send()
            .await
            .map_err(http_err)?;
        let resp = Self::check(resp, handle).await?;
        resp.bytes().await.map_err(http_err)
    }

    async fn write_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        content: Bytes,
        expected_version: Option<&str>,
    ) -> SyncResult<String> {
        let mut body = serde_json::json!({
            "message": format!("sync: update {path}"),
            "content": BASE64.encode(&content),
            "branch": branch,
        });
        if let Some(sha) = expected_version {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let url = self.contents_url(repo, path);
        let resp = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(http_err)?;
        let resp = Self::check(resp, path).await?;

        let written: WriteResponse = resp.json().await.map_err(http_err)?;
        debug!(path = %path, version = %written.content.sha, "remote write accepted");
        Ok(written.content.sha)
    }

    async fn delete_file(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
        expected_version: &str,
    ) -> SyncResult<()> {
        let body = serde_json::json!({
            "message": format!("sync: delete {path}"),
            "sha": expected_version,
            "branch": branch,
        });

        let url = self.contents_url(repo, path);
        let resp = self
            .http
            .delete(&url)
            .json(&body)
            .send()
            .await
            .map_err(http_err)?;
        Self::check(resp, path).await?;
        debug!(path = %path, "remote delete accepted");
        Ok(())
    }

    async fn list_branches(&self, repo: &RepoId) -> SyncResult<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/branches",
            self.api_base, repo.owner, repo.name
        );
        let resp = self.http.get(&url).send().await.map_err(http_err)?;
        let resp = Self::check(resp, "branches").await?;
        let branches: Vec<BranchInfo> = resp.json().await.map_err(http_err)?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn branch_head(&self, repo: &RepoId, branch: &str) -> SyncResult<String> {
        let url = format!(
            "{}/repos/{}/{}/branches/{}",
            self.api_base, repo.owner, repo.name, branch
        );
        let resp = self.http.get(&url).send().await.map_err(http_err)?;
        let resp = match Self::check(resp, branch).await {
            Err(SyncError::NotFound(_)) => {
                return Err(SyncError::BranchNotFound(branch.to_string()))
            }
            other => other?,
        };
        let info: BranchInfo = resp.json().await.map_err(http_err)?;
        Ok(info.commit.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        name: &str,
        from_version: &str,
    ) -> SyncResult<()> {
        let url = format!(
            "{}/repos/{}/{}/git/refs",
            self.api_base, repo.owner, repo.name
        );
        let body = serde_json::json!({
            "ref": format!("refs/heads/{name}"),
            "sha": from_version,
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(http_err)?;
        Self::check(resp, name).await?;
        debug!(branch = %name, from = %from_version, "branch created");
        Ok(())
    }
}
