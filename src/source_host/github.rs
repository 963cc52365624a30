//! GitHub REST API source host

use super::{SourceHost, TreeEntry, looks_binary};
use crate::config::SourceHostConfig;
use crate::error::SourceHostError;
use crate::types::{ChangeRecord, ChangeStatus, CommitInfo, CommitSource};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Files per compare page (the API maximum)
const COMPARE_PAGE_SIZE: usize = 100;
/// The compare API never returns more files than this across all pages
const COMPARE_FILE_LIMIT: usize = 300;

#[derive(Deserialize, Debug)]
struct CommitResponse {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize, Debug)]
struct CommitDetail {
    author: Option<CommitAuthor>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct CommitAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    date: String,
}

#[derive(Deserialize, Debug)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Deserialize, Debug)]
struct CompareFile {
    filename: String,
    status: String,
    #[serde(default)]
    additions: usize,
    #[serde(default)]
    deletions: usize,
    previous_filename: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize, Debug)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

/// GitHub API client, either authenticated with a token or anonymous
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    user_agent: String,
    source: CommitSource,
    label: &'static str,
}

impl GitHubClient {
    /// Client that sends `Authorization: Bearer <token>`
    pub fn authenticated(
        config: &SourceHostConfig,
        token: impl Into<String>,
    ) -> Result<Self, SourceHostError> {
        Self::build(config, Some(token.into()), CommitSource::RemoteApi, "github-auth")
    }

    /// Anonymous client, subject to the public rate limit
    pub fn public(config: &SourceHostConfig) -> Result<Self, SourceHostError> {
        Self::build(config, None, CommitSource::PublicApi, "github-public")
    }

    fn build(
        config: &SourceHostConfig,
        token: Option<String>,
        source: CommitSource,
        label: &'static str,
    ) -> Result<Self, SourceHostError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SourceHostError::Http(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            user_agent: config.user_agent.clone(),
            source,
            label,
        })
    }

    async fn get(&self, url: &str, accept: &str) -> Result<Response, SourceHostError> {
        debug!("GitHub API ({}): GET {}", self.label, url);

        let mut request = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let remaining = header_value(&response, "x-ratelimit-remaining");
        let reset_at = header_value(&response, "x-ratelimit-reset").and_then(|v| v.parse().ok());
        let error = status_error(status, remaining.as_deref(), reset_at, url);
        warn!("GitHub API ({}) error for {}: {}", self.label, url, error);
        Err(error)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceHostError> {
        self.get(url, JSON_MEDIA_TYPE)
            .await?
            .json::<T>()
            .await
            .map_err(|e| SourceHostError::Decode(e.to_string()))
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, owner, repo)
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map a failed response to the error kinds the strategy chain distinguishes
fn status_error(
    status: StatusCode,
    rate_remaining: Option<&str>,
    reset_at: Option<i64>,
    url: &str,
) -> SourceHostError {
    match status {
        StatusCode::UNAUTHORIZED => SourceHostError::AuthFailed(format!("401 for {}", url)),
        StatusCode::TOO_MANY_REQUESTS => SourceHostError::RateLimited { reset_at },
        StatusCode::FORBIDDEN if rate_remaining == Some("0") => {
            SourceHostError::RateLimited { reset_at }
        }
        StatusCode::FORBIDDEN => SourceHostError::AuthFailed(format!("403 for {}", url)),
        StatusCode::NOT_FOUND => SourceHostError::NotFound(url.to_string()),
        other => SourceHostError::Http(format!("{} for {}", other, url)),
    }
}

fn change_records(files: Vec<CompareFile>) -> Vec<ChangeRecord> {
    let mut records = Vec::with_capacity(files.len());
    for file in files {
        let record = |filename: String, status| ChangeRecord {
            filename,
            status,
            additions: file.additions,
            deletions: file.deletions,
        };
        match file.status.as_str() {
            "added" | "copied" => records.push(record(file.filename.clone(), ChangeStatus::Added)),
            "removed" => records.push(record(file.filename.clone(), ChangeStatus::Removed)),
            "renamed" => {
                if let Some(previous) = file.previous_filename.clone() {
                    records.push(record(previous, ChangeStatus::Removed));
                }
                records.push(record(file.filename.clone(), ChangeStatus::Added));
            }
            "unchanged" => {}
            _ => records.push(record(file.filename.clone(), ChangeStatus::Modified)),
        }
    }
    records
}

/// Whether another compare page is needed after one that held `received`
/// files. Reaching the API's file limit means the list may be cut short.
fn more_compare_pages(collected: usize, received: usize) -> Result<bool, SourceHostError> {
    if collected >= COMPARE_FILE_LIMIT {
        return Err(SourceHostError::Truncated(format!(
            "comparison reached the {} file limit",
            COMPARE_FILE_LIMIT
        )));
    }
    Ok(received == COMPARE_PAGE_SIZE)
}

/// Blobs of a tree listing; a truncated listing is refused so callers never
/// mistake it for the whole tree
fn tree_entries(body: TreeResponse) -> Result<Vec<TreeEntry>, SourceHostError> {
    if body.truncated {
        return Err(SourceHostError::Truncated(format!(
            "tree listing stopped after {} entries",
            body.tree.len()
        )));
    }
    Ok(body
        .tree
        .into_iter()
        .filter(|item| item.kind == "blob")
        .map(|item| TreeEntry::new(item.path, item.size))
        .collect())
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or("").to_string()
}

#[async_trait]
impl SourceHost for GitHubClient {
    fn name(&self) -> &str {
        self.label
    }

    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<CommitInfo, SourceHostError> {
        let url = format!("{}/commits/{}", self.repo_url(owner, repo), branch);
        let body: CommitResponse = self.get_json(&url).await?;
        let author = body.commit.author;

        Ok(CommitInfo {
            hash: body.sha,
            author: author.as_ref().map(|a| a.name.clone()).unwrap_or_default(),
            email: author.as_ref().map(|a| a.email.clone()).unwrap_or_default(),
            date: author.map(|a| a.date).unwrap_or_default(),
            subject: first_line(&body.commit.message),
            source: self.source,
        })
    }

    async fn compare(
        &self,
        owner: &str,
        repo: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<ChangeRecord>, SourceHostError> {
        let base = format!("{}/compare/{}...{}", self.repo_url(owner, repo), from, to);
        let mut files = Vec::new();
        for page in 1.. {
            let url = format!("{}?per_page={}&page={}", base, COMPARE_PAGE_SIZE, page);
            let body: CompareResponse = self.get_json(&url).await?;
            let received = body.files.len();
            files.extend(body.files);
            if !more_compare_pages(files.len(), received)? {
                break;
            }
        }
        debug!("Compare {}...{} listed {} files", from, to, files.len());
        Ok(change_records(files))
    }

    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>, SourceHostError> {
        let mut url = format!("{}/git/trees/{}", self.repo_url(owner, repo), git_ref);
        if recursive {
            url.push_str("?recursive=1");
        }
        let body: TreeResponse = self.get_json(&url).await?;
        tree_entries(body)
            .inspect_err(|e| warn!("Tree listing for {}/{}@{}: {}", owner, repo, git_ref, e))
    }

    async fn fetch_file(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, SourceHostError> {
        let url = format!(
            "{}/contents/{}?ref={}",
            self.repo_url(owner, repo),
            path,
            git_ref
        );
        let bytes = self
            .get(&url, RAW_MEDIA_TYPE)
            .await?
            .bytes()
            .await
            .map_err(|e| SourceHostError::Http(e.to_string()))?;

        if looks_binary(&bytes) {
            return Err(SourceHostError::Decode(format!("{} is binary", path)));
        }
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SourceHostError::Decode(format!("{} is not valid UTF-8", path)))
    }
}
