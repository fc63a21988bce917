//! GitLab blob search backend

use super::traits::*;
use crate::config::BackendParams;
use crate::error::{Result, SearchError};
use crate::network::{check_response, retry_rate_limited, HttpClient};
use crate::results::{split_lines, ResultContext, SearchResult};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_HOST: &str = "gitlab.com";
const DEFAULT_API_PATH: &str = "/api/v4";
const PER_PAGE: u32 = 100;

/// Id used when a configured project cannot be found
const UNKNOWN_PROJECT_ID: u64 = 0;

/// Where blob searches run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Instance,
    Group(String),
    Project(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeId {
    Instance,
    Group(u64),
    Project(u64),
}

/// GitLab blob search backend
pub struct Gitlab {
    name: String,
    api_url: Url,
    token: String,
    scope: Scope,
    client: HttpClient,
}

impl Gitlab {
    /// Build from backend parameters: `token` (required), `api_endpoint`,
    /// and at most one of `group` / `project`
    pub fn from_params(name: &str, params: &BackendParams, client: HttpClient) -> Result<Self> {
        let group = params.get_str("group")?;
        let project = params.get_str("project")?;
        let scope = match (group, project) {
            (Some(_), Some(_)) => {
                return Err(SearchError::Config(
                    "cannot specify both 'project' and 'group'".to_string(),
                ))
            }
            (Some(group), None) => Scope::Group(group.to_string()),
            (None, Some(project)) => Scope::Project(project.to_string()),
            (None, None) => Scope::Instance,
        };
        let token = params.require_str("token")?.to_string();
        let api_url = api_base(params.get_str("api_endpoint")?.unwrap_or_default())?;

        Ok(Self {
            name: name.to_string(),
            api_url,
            token,
            scope,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SearchError::Config(format!("invalid 'api_endpoint' parameter: {}", self.api_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: &Url) -> EngineRequest {
        EngineRequest::get(url.as_str()).header("PRIVATE-TOKEN", self.token.as_str())
    }

    async fn fetch_page<T>(&self, request: &EngineRequest, page: u32, what: &str) -> Result<(Vec<T>, u32)>
    where
        T: DeserializeOwned + Send,
    {
        let request = request
            .clone()
            .param("per_page", PER_PAGE)
            .param("page", page);
        let response = check_response(self.client.execute(request).await?, what)?;
        let next = response
            .header("x-next-page")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        Ok((response.json()?, next))
    }

    /// Collect every page, following `X-Next-Page` until it is empty or zero
    async fn fetch_all<T>(&self, request: EngineRequest, what: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let (batch, next) =
                retry_rate_limited(what, || self.fetch_page::<T>(&request, page, what)).await?;
            debug!("{}: {} page {} returned {} entries", self.name, what, page, batch.len());
            items.extend(batch);

            if next <= page {
                break;
            }
            page = next;
        }

        Ok(items)
    }

    /// Id of the group or project called exactly `name`
    async fn find_id(&self, collection: &str, name: &str) -> Result<Option<u64>> {
        let url = self.endpoint(&[collection])?;
        let request = self.request(&url).param("search", name);
        let entries: Vec<Named> = self
            .fetch_all(request, &format!("{} listing", collection))
            .await?;
        Ok(entries.into_iter().find(|e| e.name == name).map(|e| e.id))
    }

    async fn resolve_scope(&self) -> Result<ScopeId> {
        match &self.scope {
            Scope::Instance => Ok(ScopeId::Instance),
            Scope::Group(group) => match self.find_id("groups", group).await? {
                Some(id) => Ok(ScopeId::Group(id)),
                None => Err(SearchError::RemoteApi(format!("group {:?} not found", group))),
            },
            Scope::Project(project) => {
                let id = match self.find_id("projects", project).await? {
                    Some(id) => id,
                    None => {
                        warn!(
                            "{}: project {:?} not found, searching project id {}",
                            self.name, project, UNKNOWN_PROJECT_ID
                        );
                        UNKNOWN_PROJECT_ID
                    }
                };
                Ok(ScopeId::Project(id))
            }
        }
    }

    async fn search_blobs(&self, scope: ScopeId, query: &str) -> Result<Vec<Blob>> {
        let url = match scope {
            ScopeId::Instance => self.endpoint(&["search"])?,
            ScopeId::Group(id) => self.endpoint(&["groups", &id.to_string(), "search"])?,
            ScopeId::Project(id) => self.endpoint(&["projects", &id.to_string(), "search"])?,
        };
        let request = self
            .request(&url)
            .param("scope", "blobs")
            .param("search", query);
        self.fetch_all(request, "blob search").await
    }

    async fn fetch_project_once(&self, url: &Url) -> Result<Project> {
        let response = check_response(
            self.client.execute(self.request(url)).await?,
            "project lookup",
        )?;
        response.json()
    }

    async fn fetch_project(&self, id: u64) -> Result<Project> {
        let url = self.endpoint(&["projects", &id.to_string()])?;
        retry_rate_limited("project lookup", || self.fetch_project_once(&url))
            .await
            .map_err(|e| match e {
                SearchError::RemoteApi(msg) => SearchError::RemoteApi(format!(
                    "failed to get project with ID {}: {}",
                    id, msg
                )),
                other => other,
            })
    }

    async fn to_results(
        &self,
        query: &str,
        blobs: Vec<Blob>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let needle = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()?;
        let mut projects: HashMap<u64, Project> = HashMap::new();
        let mut results = Vec::with_capacity(blobs.len());

        for blob in blobs {
            let project = match projects.entry(blob.project_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.fetch_project(blob.project_id).await?),
            };

            let branch = if blob.git_ref.is_empty() {
                project.default_branch.as_str()
            } else {
                blob.git_ref.as_str()
            };
            let file_url = format!("{}/-/blob/{}/{}", project.web_url, branch, blob.path);

            let Some(found) = needle.find(&blob.data) else {
                results.push(
                    SearchResult::filename(&self.name, &blob.path)
                        .with_repo(&project.web_url, &project.namespace.path, &project.path)
                        .with_file_url(file_url)
                        .with_branch(branch),
                );
                continue;
            };

            let (offset, end) = (found.start(), found.end());
            let data = blob.data.as_str();
            let bytes = data.as_bytes();
            let idx = bytes[..offset].iter().filter(|&&b| b == b'\n').count();
            let line_start = bytes[..offset]
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |p| p + 1);
            let line_end = bytes[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(data.len(), |p| offset + p);
            let line = &data[line_start..line_end];
            let start = offset - line_start;
            let lineno = blob.startline + idx;

            let lines = split_lines(data);
            let context =
                ResultContext::around(&lines, idx, options.lines_before, options.lines_after);

            results.push(
                SearchResult::line_match(
                    &self.name,
                    &blob.path,
                    lineno,
                    line,
                    start,
                    end - line_start,
                )
                .with_repo(&project.web_url, &project.namespace.path, &project.path)
                .with_file_url(format!("{}#L{}", file_url, lineno))
                .with_branch(branch)
                .with_context(context),
            );
        }

        Ok(results)
    }
}

#[async_trait]
impl Backend for Gitlab {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Gitlab
    }

    fn supports_context(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let scope = self.resolve_scope().await?;
        debug!("{}: searching blobs in {:?}", self.name, scope);

        let blobs = self.search_blobs(scope, query).await?;
        debug!("{}: {} matching blobs", self.name, blobs.len());

        self.to_results(query, blobs, options).await
    }
}

/// API base URL with scheme, host and path defaults filled in
fn api_base(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    let full = if endpoint.contains("://") {
        endpoint.to_string()
    } else if endpoint.is_empty() || endpoint.starts_with('/') {
        format!("https://{}{}", DEFAULT_HOST, endpoint)
    } else {
        format!("https://{}", endpoint)
    };

    let mut url = Url::parse(&full)
        .map_err(|e| SearchError::Config(format!("invalid 'api_endpoint' parameter: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(SearchError::Config(format!(
            "invalid 'api_endpoint' parameter: {}",
            endpoint
        )));
    }
    if url.path() == "/" {
        url.set_path(DEFAULT_API_PATH);
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct Named {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Blob {
    #[serde(default)]
    data: String,
    path: String,
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    startline: usize,
    project_id: u64,
}

#[derive(Debug, Deserialize)]
struct Project {
    #[serde(default)]
    path: String,
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    default_branch: String,
    #[serde(default)]
    namespace: Namespace,
}

#[derive(Debug, Default, Deserialize)]
struct Namespace {
    #[serde(default)]
    path: String,
}
