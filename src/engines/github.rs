//! GitHub code search backend
//!
//! Uses GitHub's code search API with text-match metadata. Match offsets are
//! relative to a fragment, so the full file is fetched to place each match
//! on its real line.

use super::traits::*;
use crate::config::BackendParams;
use crate::error::{Result, SearchError};
use crate::network::{check_response, retry_rate_limited, HttpClient};
use crate::results::{split_lines, ResultContext, SearchResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::debug;
use url::Url;

const DEFAULT_API_ENDPOINT: &str = "https://api.github.com";
const PUBLIC_API_HOST: &str = "api.github.com";
const TEXT_MATCH_MEDIA_TYPE: &str = "application/vnd.github.text-match+json";
const PER_PAGE: u32 = 100;

/// GitHub code search backend
pub struct Github {
    name: String,
    api_url: Url,
    token: String,
    org: Option<String>,
    client: HttpClient,
}

impl Github {
    /// Build from backend parameters: `token` (required), `org` and
    /// `api_endpoint` (optional)
    pub fn from_params(name: &str, params: &BackendParams, client: HttpClient) -> Result<Self> {
        let token = params.require_str("token")?.to_string();
        let org = params
            .get_str("org")?
            .filter(|org| !org.is_empty())
            .map(String::from);
        let endpoint = params
            .get_str("api_endpoint")?
            .unwrap_or(DEFAULT_API_ENDPOINT);

        Ok(Self {
            name: name.to_string(),
            api_url: api_base(endpoint)?,
            token,
            org,
            client,
        })
    }

    /// Prefix the organization scope operator when an org is configured
    fn scoped_query(&self, query: &str) -> String {
        match &self.org {
            Some(org) => format!("org:{} {}", org, query),
            None => query.to_string(),
        }
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

    fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Fetch one page of code search results and the next page cursor
    async fn fetch_page(&self, query: &str, page: u32) -> Result<(CodeSearchPage, Option<u32>)> {
        let url = self.endpoint(&["search", "code"])?;
        let request = EngineRequest::get(url.as_str())
            .header("Accept", TEXT_MATCH_MEDIA_TYPE)
            .header("Authorization", self.authorization())
            .param("q", query)
            .param("per_page", PER_PAGE)
            .param("page", page);

        let response = check_response(self.client.execute(request).await?, "code search")?;
        let next = next_page(response.header("link"));
        Ok((response.json()?, next))
    }

    async fn fetch_content_once(&self, url: &Url, git_ref: &str) -> Result<FileContent> {
        let mut request =
            EngineRequest::get(url.as_str()).header("Authorization", self.authorization());
        if !git_ref.is_empty() {
            request = request.param("ref", git_ref);
        }
        let response = check_response(self.client.execute(request).await?, "file content")?;
        response.json()
    }

    /// Fetch and decode the full content of a matched file
    async fn fetch_content(&self, item: &CodeItem, git_ref: &str) -> Result<String> {
        let owner = item.repository.owner.login.as_str();
        let repo = item.repository.name.as_str();
        let full_path = format!("{}/{}/{}", owner, repo, item.path);
        debug!("Fetching file content of {}", full_path);

        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(item.path.split('/'));
        let url = self.endpoint(&segments)?;

        let file = retry_rate_limited("file content", || self.fetch_content_once(&url, git_ref))
            .await
            .map_err(|e| match e {
                SearchError::RemoteApi(msg) => SearchError::RemoteApi(format!(
                    "failed to get content of file {:?}: {}",
                    full_path, msg
                )),
                other => other,
            })?;

        decode_content(&file, &full_path)
    }

    async fn to_results(
        &self,
        items: Vec<CodeItem>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();

        for item in items {
            let branch = ref_from_html_url(&item.html_url).unwrap_or_default();
            let repo = &item.repository;
            let mut content: Option<String> = None;

            for text_match in &item.text_matches {
                if text_match.property == "path" {
                    results.push(
                        SearchResult::filename(&self.name, &item.path)
                            .with_repo(&repo.html_url, &repo.owner.login, &repo.name)
                            .with_file_url(&item.html_url)
                            .with_branch(&branch),
                    );
                    continue;
                }

                if content.is_none() {
                    content = Some(self.fetch_content(&item, &branch).await?);
                }
                let text = content.as_deref().unwrap_or_default();

                let fragment_start = text.find(&text_match.fragment).ok_or_else(|| {
                    SearchError::Parse(format!(
                        "code fragment not found in full content of {}/{}/{}",
                        repo.owner.login, repo.name, item.path
                    ))
                })?;
                let lines = split_lines(text);

                for fragment_match in &text_match.matches {
                    let [from, to] = fragment_match.indices;
                    let located = locate(text, fragment_start + from, fragment_start + to);
                    let context = ResultContext::around(
                        &lines,
                        located.lineno - 1,
                        options.lines_before,
                        options.lines_after,
                    );

                    results.push(
                        SearchResult::line_match(
                            &self.name,
                            &item.path,
                            located.lineno,
                            located.line,
                            located.start,
                            located.end,
                        )
                        .with_repo(&repo.html_url, &repo.owner.login, &repo.name)
                        .with_file_url(anchored(&item.html_url, located.lineno)?)
                        .with_branch(&branch)
                        .with_context(context),
                    );
                }
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl Backend for Github {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Github
    }

    fn supports_context(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = self.scoped_query(query);
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            debug!("{}: fetching code search page {}", self.name, page);
            let (batch, next) =
                retry_rate_limited("code search", || self.fetch_page(&query, page)).await?;
            items.extend(batch.items);

            match next {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        debug!("{}: {} matching files", self.name, items.len());
        self.to_results(items, options).await
    }
}

/// API base URL. Hosts other than the public API use the enterprise
/// `/api/v3` layout.
fn api_base(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| SearchError::Config(format!("invalid 'api_endpoint' parameter: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(SearchError::Config(format!(
            "invalid 'api_endpoint' parameter: {}",
            endpoint
        )));
    }
    if url.host_str() != Some(PUBLIC_API_HOST) {
        let path = url.path().trim_end_matches('/').to_string();
        if !path.ends_with("/api/v3") {
            url.set_path(&format!("{}/api/v3", path));
        }
    }
    Ok(url)
}

/// Page number of the `rel="next"` entry of a `Link` header
fn next_page(link: Option<&str>) -> Option<u32> {
    link?.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
        if !parts.any(|p| p.trim() == "rel=\"next\"") {
            return None;
        }
        let url = Url::parse(target).ok()?;
        let page = url.query_pairs().find(|(key, _)| key == "page")?;
        page.1.parse().ok()
    })
}

/// Ref segment of a `.../blob/<ref>/<path>` URL
fn ref_from_html_url(html_url: &str) -> Option<String> {
    let url = Url::parse(html_url).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "blob")?;
    segments.next().map(String::from)
}

fn anchored(html_url: &str, lineno: usize) -> Result<String> {
    let mut url = Url::parse(html_url)
        .map_err(|e| SearchError::Parse(format!("invalid file URL {:?}: {}", html_url, e)))?;
    url.set_fragment(Some(&format!("L{}", lineno)));
    Ok(url.to_string())
}

fn decode_content(file: &FileContent, full_path: &str) -> Result<String> {
    if file.encoding != "base64" {
        return Err(SearchError::RemoteApi(format!(
            "content of file {:?} is not available (encoding {:?})",
            full_path, file.encoding
        )));
    }
    let cleaned: String = file
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(cleaned).map_err(|e| {
        SearchError::Parse(format!(
            "failed to base64-decode content of file {:?}: {}",
            full_path, e
        ))
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A match placed on its line
#[derive(Debug, PartialEq, Eq)]
struct Located<'a> {
    lineno: usize,
    line: &'a str,
    start: usize,
    end: usize,
}

/// Place the absolute byte span `[start, end)` of `text` on its line. The
/// end is clipped to the line when the span crosses a newline.
fn locate(text: &str, start: usize, end: usize) -> Located<'_> {
    let bytes = text.as_bytes();
    let start = start.min(text.len());
    let end = end.max(start).min(text.len());

    let newlines_before = bytes[..start].iter().filter(|&&b| b == b'\n').count();
    let line_start = bytes[..start]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |p| p + 1);
    let line_end = bytes[line_start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(text.len(), |p| line_start + p);

    Located {
        lineno: newlines_before + 1,
        line: &text[line_start..line_end],
        start: start - line_start,
        end: end.min(line_end) - line_start,
    }
}

#[derive(Debug, Deserialize)]
struct CodeSearchPage {
    #[serde(default)]
    items: Vec<CodeItem>,
}

#[derive(Debug, Deserialize)]
struct CodeItem {
    path: String,
    html_url: String,
    repository: Repository,
    #[serde(default)]
    text_matches: Vec<TextMatch>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    html_url: String,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct TextMatch {
    #[serde(default)]
    property: String,
    #[serde(default)]
    fragment: String,
    #[serde(default)]
    matches: Vec<FragmentMatch>,
}

#[derive(Debug, Deserialize)]
struct FragmentMatch {
    indices: [usize; 2],
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SOURCE: &str = "package main\n\nfunc main() {\n\tfmt.Println(\"hello\")\n}\n";
    const FRAGMENT: &str = "func main() {\n\tfmt.Println(\"hello\")";

    fn backend(server: &MockServer, org: Option<&str>) -> Github {
        let mut params = BackendParams::new()
            .with("token", "t0k")
            .with("api_endpoint", format!("{}/api/v3", server.uri()));
        if let Some(org) = org {
            params = params.with("org", org);
        }
        Github::from_params("gh", &params, HttpClient::new().unwrap()).unwrap()
    }

    fn item(server: &MockServer, file: &str, fragment: &str, indices: [usize; 2]) -> serde_json::Value {
        json!({
            "name": file.rsplit('/').next().unwrap(),
            "path": file,
            "sha": "f00",
            "html_url": format!("https://github.com/acme/widgets/blob/abc123/{}", file),
            "repository": {
                "name": "widgets",
                "html_url": "https://github.com/acme/widgets",
                "owner": { "login": "acme" },
                "url": format!("{}/api/v3/repos/acme/widgets", server.uri())
            },
            "text_matches": [{
                "object_type": "FileContent",
                "property": "content",
                "fragment": fragment,
                "matches": [{ "text": "Println", "indices": indices }]
            }]
        })
    }

    fn encoded(source: &str) -> String {
        let b64 = STANDARD.encode(source);
        // the API wraps base64 content with newlines
        let (head, tail) = b64.split_at(b64.len() / 2);
        format!("{}\n{}", head, tail)
    }

    async fn mount_content(server: &MockServer, file: &str, source: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v3/repos/acme/widgets/contents/{}", file)))
            .and(query_param("ref", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "encoding": "base64",
                "content": encoded(source)
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_locate() {
        let located = locate(SOURCE, 33, 40);
        assert_eq!(
            located,
            Located {
                lineno: 4,
                line: "\tfmt.Println(\"hello\")",
                start: 5,
                end: 12
            }
        );

        // spans past the line end are clipped
        let located = locate("ab\ncd", 1, 5);
        assert_eq!((located.lineno, located.line, located.start, located.end), (1, "ab", 1, 2));

        let located = locate("ab\ncd", 3, 4);
        assert_eq!((located.lineno, located.line, located.start, located.end), (2, "cd", 0, 1));
    }

    #[test]
    fn test_next_page() {
        let link = r#"<https://api.github.com/search/code?q=x&page=2>; rel="next", <https://api.github.com/search/code?q=x&page=7>; rel="last""#;
        assert_eq!(next_page(Some(link)), Some(2));

        let link = r#"<https://api.github.com/search/code?q=x&page=1>; rel="prev""#;
        assert_eq!(next_page(Some(link)), None);
        assert_eq!(next_page(None), None);
    }

    #[test]
    fn test_api_base() {
        assert_eq!(
            api_base("https://api.github.com").unwrap().as_str(),
            "https://api.github.com/"
        );
        assert_eq!(
            api_base("https://ghe.example.com").unwrap().as_str(),
            "https://ghe.example.com/api/v3"
        );
        assert_eq!(
            api_base("https://ghe.example.com/api/v3/").unwrap().as_str(),
            "https://ghe.example.com/api/v3/"
        );
        assert!(api_base("not a url").is_err());
    }

    #[test]
    fn test_ref_from_html_url() {
        assert_eq!(
            ref_from_html_url("https://github.com/acme/widgets/blob/main/src/lib.rs"),
            Some("main".to_string())
        );
        assert_eq!(ref_from_html_url("https://github.com/acme/widgets"), None);
    }

    #[test]
    fn test_missing_token() {
        let err = Github::from_params("gh", &BackendParams::new(), HttpClient::new().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "config error: missing 'token' parameter");
    }

    #[tokio::test]
    async fn test_search_paginates_and_places_matches() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .and(query_param("q", "org:acme Println"))
            .and(query_param("page", "1"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "link",
                        format!(
                            "<{}/api/v3/search/code?q=org%3Aacme+Println&page=2>; rel=\"next\"",
                            server.uri()
                        )
                        .as_str(),
                    )
                    .set_body_json(json!({
                        "total_count": 2,
                        "items": [item(&server, "cmd/main.go", FRAGMENT, [19, 26])]
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 2,
                "items": [item(&server, "main.go", FRAGMENT, [19, 26])]
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_content(&server, "cmd/main.go", SOURCE).await;
        mount_content(&server, "main.go", SOURCE).await;

        let gh = backend(&server, Some("acme"));
        let options = SearchOptions::new().with_context(1);
        let results = gh.search("Println", &options).await.unwrap();

        assert_eq!(results.len(), 2);
        let first = &results[0];
        assert_eq!(first.backend, "gh");
        assert_eq!(first.path, "cmd/main.go");
        assert_eq!(first.lineno, 4);
        assert_eq!(first.line, "\tfmt.Println(\"hello\")");
        assert_eq!(first.highlighted(), "Println");
        assert_eq!(first.owner, "acme");
        assert_eq!(first.repo_name, "widgets");
        assert_eq!(first.branch, "abc123");
        assert_eq!(first.context.before, vec!["func main() {"]);
        assert_eq!(first.context.after, vec!["}"]);
        assert_eq!(
            first.file_url,
            "https://github.com/acme/widgets/blob/abc123/cmd/main.go#L4"
        );
        assert_eq!(results[1].path, "main.go");
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp().to_string();

        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset.as_str())
                    .set_body_json(json!({ "message": "API rate limit exceeded" })),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(&server, "main.go", FRAGMENT, [19, 26])]
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_content(&server, "main.go", SOURCE).await;

        let gh = backend(&server, None);
        let results = gh.search("Println", &SearchOptions::new()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].context.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_content_fetch_is_retried() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp().to_string();

        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .and(header("accept", TEXT_MATCH_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(&server, "main.go", FRAGMENT, [19, 26])]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/widgets/contents/main.go"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset.as_str()),
            )
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        mount_content(&server, "main.go", SOURCE).await;

        let results = backend(&server, None)
            .search("Println", &SearchOptions::new().with_context(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lineno, 4);
        assert_eq!(results[0].context.after, vec!["}"]);
    }

    #[tokio::test]
    async fn test_rate_limited_content_fetch_gives_up() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp().to_string();

        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(&server, "main.go", FRAGMENT, [19, 26])]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/repos/acme/widgets/contents/main.go"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("x-ratelimit-reset", reset.as_str()),
            )
            .expect(3)
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .search("Println", &SearchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::RemoteApi(_)));
        assert!(err.to_string().contains("failed to get content of file"));
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_fails() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp().to_string();

        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("x-ratelimit-reset", reset.as_str()),
            )
            .expect(3)
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .search("Println", &SearchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::RemoteApi(_)));
    }

    #[tokio::test]
    async fn test_server_error_aborts_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .search("Println", &SearchOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_missing_fragment_fails_whole_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item(&server, "main.go", "not in the file", [0, 3])]
            })))
            .mount(&server)
            .await;
        mount_content(&server, "main.go", SOURCE).await;

        let err = backend(&server, None)
            .search("Println", &SearchOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_path_matches_become_filename_results() {
        let server = MockServer::start().await;
        let mut path_item = item(&server, "println/doc.go", "println/doc.go", [0, 7]);
        path_item["text_matches"][0]["property"] = json!("path");

        Mock::given(method("GET"))
            .and(path("/api/v3/search/code"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "items": [path_item] })),
            )
            .mount(&server)
            .await;

        let results = backend(&server, None)
            .search("println", &SearchOptions::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_filename);
        assert_eq!(results[0].lineno, 0);
        assert_eq!(results[0].path, "println/doc.go");
    }
}
