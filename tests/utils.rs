#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hash as _;
use std::hash::Hasher as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use operator_release::ops::http::HttpOps;
use operator_release::ops::http::HttpRequest;
use operator_release::ops::http::HttpResponse;
use operator_release::ops::http::Method;
use serde_json::Value;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const API_BASE: &str = "https://api.github.com";

pub fn setup_logging() -> anyhow::Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_test_writer()
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}

/// Writes the two release artifacts into a temp dir.
pub struct Artifacts {
    pub dir: tempfile::TempDir,
}

impl Artifacts {
    pub fn new(csv: &str, package: &str) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("csv.yaml"), csv)?;
        std::fs::write(dir.path().join("package.yaml"), package)?;
        Ok(Self { dir })
    }

    pub fn csv_path(&self) -> std::path::PathBuf {
        self.dir.path().join("csv.yaml")
    }

    pub fn package_path(&self) -> std::path::PathBuf {
        self.dir.path().join("package.yaml")
    }
}

// -----------------------------------------------------------------------------
// FakeGithub

/// In-memory stand-in for the parts of the GitHub REST API the release uses.
///
/// All repos share one commit graph, the way a fork network does on GitHub.
/// Commits hold a full tree of files; writing a file creates a child commit
/// and moves the branch.
#[derive(Default)]
pub struct FakeGithub {
    state: RefCell<State>,
}

#[derive(Default)]
struct State {
    commits: HashMap<String, Commit>,
    /// (repo, branch) -> commit sha
    refs: HashMap<(String, String), String>,
    default_branches: HashMap<String, String>,
    pulls: Vec<Pull>,
    requests: Vec<String>,
    hooks: Vec<Hook>,
    next_commit: usize,
}

/// Fires once, on the first request whose method matches and whose
/// "/path?query" contains `target`.
struct Hook {
    method: Method,
    target: String,
    action: HookAction,
}

enum HookAction {
    /// Answer with this status instead of handling the request.
    Fail { status: u16, message: String },
    /// Handle the request, then commit a file as another writer would.
    PushFile {
        repo: String,
        branch: String,
        path: String,
        content: String,
    },
}

#[derive(Clone)]
struct Commit {
    parent: Option<String>,
    tree: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pull {
    pub repo: String,
    pub number: u64,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

impl Pull {
    pub fn url(&self) -> String {
        format!("https://github.com/{}/pull/{}", self.repo, self.number)
    }
}

pub fn blob_sha(content: &[u8]) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    content.hash(&mut hasher);
    format!("blob{:016x}", hasher.finish())
}

impl FakeGithub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit with an explicit sha and full file tree.
    pub fn commit(&self, sha: &str, parent: Option<&str>, files: &[(&str, &str)]) {
        let tree = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.as_bytes().to_vec()))
            .collect();
        self.state.borrow_mut().commits.insert(
            sha.to_string(),
            Commit {
                parent: parent.map(str::to_string),
                tree,
            },
        );
    }

    /// Create a repo whose default branch points at `sha`.
    pub fn repo(&self, repo: &str, default_branch: &str, sha: &str) {
        let mut state = self.state.borrow_mut();
        state
            .default_branches
            .insert(repo.to_string(), default_branch.to_string());
        state
            .refs
            .insert((repo.to_string(), default_branch.to_string()), sha.to_string());
    }

    pub fn branch_tip(&self, repo: &str, branch: &str) -> Option<String> {
        self.state
            .borrow()
            .refs
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
    }

    pub fn branches(&self, repo: &str) -> Vec<String> {
        let mut branches: Vec<String> = self
            .state
            .borrow()
            .refs
            .keys()
            .filter(|(r, _)| r == repo)
            .map(|(_, b)| b.clone())
            .collect();
        branches.sort();
        branches
    }

    pub fn file(&self, repo: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let tip = state.refs.get(&(repo.to_string(), branch.to_string()))?;
        state.commits.get(tip)?.tree.get(path).cloned()
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.state.borrow().is_ancestor(ancestor, descendant)
    }

    /// Commit a file change directly on a branch, as another writer would.
    pub fn push_file(&self, repo: &str, branch: &str, path: &str, content: &str) {
        self.state
            .borrow_mut()
            .write_file(repo, branch, path, content.as_bytes().to_vec());
    }

    /// Make the next matching request fail with `status`.
    pub fn fail_on(&self, method: Method, target: &str, status: u16, message: &str) {
        self.state.borrow_mut().hooks.push(Hook {
            method,
            target: target.to_string(),
            action: HookAction::Fail {
                status,
                message: message.to_string(),
            },
        });
    }

    /// Commit a file change right after the next matching request is served.
    pub fn push_file_after(
        &self,
        method: Method,
        target: &str,
        repo: &str,
        branch: &str,
        path: &str,
        content: &str,
    ) {
        self.state.borrow_mut().hooks.push(Hook {
            method,
            target: target.to_string(),
            action: HookAction::PushFile {
                repo: repo.to_string(),
                branch: branch.to_string(),
                path: path.to_string(),
                content: content.to_string(),
            },
        });
    }

    pub fn open_pull(&self, repo: &str, head: &str, base: &str) -> Pull {
        let mut state = self.state.borrow_mut();
        state.add_pull(repo, head, base, "existing", "", false)
    }

    pub fn pulls(&self) -> Vec<Pull> {
        self.state.borrow().pulls.clone()
    }

    /// Every request seen so far as "METHOD /path?query".
    pub fn requests(&self) -> Vec<String> {
        self.state.borrow().requests.clone()
    }

    pub fn request_log(&self) -> String {
        self.requests().join("\n")
    }
}

impl State {
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(descendant.to_string());
        while let Some(sha) = current {
            if sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                return false;
            }
            current = self.commits.get(&sha).and_then(|c| c.parent.clone());
        }
        false
    }

    fn tip(&self, repo: &str, branch: &str) -> Option<&String> {
        self.refs.get(&(repo.to_string(), branch.to_string()))
    }

    /// Commit `content` at `path` on top of the branch tip. Returns the new
    /// commit sha.
    fn write_file(&mut self, repo: &str, branch: &str, path: &str, content: Vec<u8>) -> String {
        let parent = self.tip(repo, branch).cloned();
        let mut tree = parent
            .as_ref()
            .and_then(|p| self.commits.get(p))
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        tree.insert(path.to_string(), content);

        self.next_commit += 1;
        let sha = format!("commit{}", self.next_commit);
        self.commits.insert(sha.clone(), Commit { parent, tree });
        self.refs
            .insert((repo.to_string(), branch.to_string()), sha.clone());
        sha
    }

    fn add_pull(&mut self, repo: &str, head: &str, base: &str, title: &str, body: &str, draft: bool) -> Pull {
        let number = self.pulls.iter().filter(|p| p.repo == repo).count() as u64 + 1;
        let pull = Pull {
            repo: repo.to_string(),
            number,
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            draft,
        };
        self.pulls.push(pull.clone());
        pull
    }

    fn take_hook(&mut self, method: Method, target: &str, fail: bool) -> Option<HookAction> {
        let index = self.hooks.iter().position(|hook| {
            hook.method == method
                && target.contains(&hook.target)
                && matches!(hook.action, HookAction::Fail { .. }) == fail
        })?;
        Some(self.hooks.remove(index).action)
    }

    fn handle(&mut self, request: &HttpRequest) -> (u16, Value) {
        let Some(target) = request.url.strip_prefix(API_BASE) else {
            return (400, json!({"message": "wrong host"}));
        };
        self.requests.push(format!("{} {}", request.method, target));

        if let Some(HookAction::Fail { status, message }) =
            self.take_hook(request.method, target, true)
        {
            return (status, json!({ "message": message }));
        }
        let response = self.serve(request, target);
        if let Some(HookAction::PushFile {
            repo,
            branch,
            path,
            content,
        }) = self.take_hook(request.method, target, false)
        {
            self.write_file(&repo, &branch, &path, content.into_bytes());
        }
        response
    }

    fn serve(&mut self, request: &HttpRequest, target: &str) -> (u16, Value) {
        if request.header("Authorization").is_none_or(|v| !v.starts_with("Bearer ")) {
            return (401, json!({"message": "Requires authentication"}));
        }

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let query: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let body: Value = request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
            .unwrap_or(Value::Null);

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let ["repos", owner, name, rest @ ..] = segments.as_slice() else {
            return (404, json!({"message": "Not Found"}));
        };
        let repo = format!("{}/{}", owner, name);
        if !self.default_branches.contains_key(&repo) {
            return (404, json!({"message": "Not Found"}));
        }

        match (request.method, rest) {
            (Method::Get, ["git", "ref", "heads", branch @ ..]) => {
                match self.tip(&repo, &branch.join("/")) {
                    Some(sha) => (
                        200,
                        json!({
                            "ref": format!("refs/heads/{}", branch.join("/")),
                            "object": {"sha": sha, "type": "commit"},
                        }),
                    ),
                    None => (404, json!({"message": "Not Found"})),
                }
            }
            (Method::Post, ["git", "refs"]) => self.create_ref(&repo, &body),
            (Method::Patch, ["git", "refs", "heads", branch @ ..]) => {
                self.update_ref(&repo, &branch.join("/"), &body)
            }
            (Method::Get, ["contents", file @ ..]) => {
                self.get_contents(&repo, &file.join("/"), query.get("ref").map(String::as_str))
            }
            (Method::Put, ["contents", file @ ..]) => self.put_contents(&repo, &file.join("/"), &body),
            (Method::Get, ["pulls"]) => {
                let open: Vec<Value> = self
                    .pulls
                    .iter()
                    .filter(|p| p.repo == repo)
                    .filter(|p| query.get("head").is_none_or(|h| *h == p.head))
                    .filter(|p| query.get("base").is_none_or(|b| *b == p.base))
                    .map(|p| json!({"number": p.number, "html_url": p.url(), "state": "open"}))
                    .collect();
                (200, Value::Array(open))
            }
            (Method::Post, ["pulls"]) => self.create_pull(&repo, &body),
            _ => (404, json!({"message": "Not Found"})),
        }
    }

    fn create_ref(&mut self, repo: &str, body: &Value) -> (u16, Value) {
        let (Some(full_ref), Some(sha)) = (body["ref"].as_str(), body["sha"].as_str()) else {
            return (422, json!({"message": "Invalid request."}));
        };
        let Some(branch) = full_ref.strip_prefix("refs/heads/") else {
            return (422, json!({"message": "Reference name must start with refs/"}));
        };
        if self.tip(repo, branch).is_some() {
            return (422, json!({"message": "Reference already exists"}));
        }
        if !self.commits.contains_key(sha) {
            return (422, json!({"message": "Object does not exist"}));
        }
        self.refs
            .insert((repo.to_string(), branch.to_string()), sha.to_string());
        (201, json!({"ref": full_ref, "object": {"sha": sha}}))
    }

    fn update_ref(&mut self, repo: &str, branch: &str, body: &Value) -> (u16, Value) {
        let Some(sha) = body["sha"].as_str() else {
            return (422, json!({"message": "Invalid request."}));
        };
        let force = body["force"].as_bool().unwrap_or(false);
        let Some(current) = self.tip(repo, branch).cloned() else {
            return (422, json!({"message": "Reference does not exist"}));
        };
        if !self.commits.contains_key(sha) {
            return (422, json!({"message": "Object does not exist"}));
        }
        if !force && !self.is_ancestor(&current, sha) {
            return (422, json!({"message": "Update is not a fast forward"}));
        }
        self.refs
            .insert((repo.to_string(), branch.to_string()), sha.to_string());
        (200, json!({"ref": format!("refs/heads/{}", branch), "object": {"sha": sha}}))
    }

    fn get_contents(&self, repo: &str, path: &str, git_ref: Option<&str>) -> (u16, Value) {
        let branch = git_ref
            .map(str::to_string)
            .unwrap_or_else(|| self.default_branches[repo].clone());
        let Some(tree) = self
            .tip(repo, &branch)
            .and_then(|sha| self.commits.get(sha))
            .map(|c| &c.tree)
        else {
            return (404, json!({"message": "No commit found for the ref"}));
        };

        if let Some(content) = tree.get(path) {
            // GitHub wraps base64 at 60 columns
            let encoded = BASE64.encode(content);
            let wrapped: Vec<String> = encoded
                .as_bytes()
                .chunks(60)
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect();
            return (
                200,
                json!({
                    "type": "file",
                    "path": path,
                    "sha": blob_sha(content),
                    "encoding": "base64",
                    "content": wrapped.join("\n") + "\n",
                }),
            );
        }

        let prefix = format!("{}/", path);
        let listing: Vec<Value> = tree
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .map(|p| json!({"type": "file", "path": p}))
            .collect();
        if listing.is_empty() {
            (404, json!({"message": "Not Found"}))
        } else {
            (200, Value::Array(listing))
        }
    }

    fn put_contents(&mut self, repo: &str, path: &str, body: &Value) -> (u16, Value) {
        let (Some(message), Some(encoded)) = (body["message"].as_str(), body["content"].as_str())
        else {
            return (422, json!({"message": "Invalid request."}));
        };
        let Ok(content) = BASE64.decode(encoded) else {
            return (422, json!({"message": "content is not valid Base64"}));
        };
        let branch = body["branch"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| self.default_branches[repo].clone());
        let Some(tip) = self.tip(repo, &branch).cloned() else {
            return (404, json!({"message": format!("Branch {} not found", branch)}));
        };

        let existing = self.commits[&tip].tree.get(path).map(|c| blob_sha(c));
        match (existing, body["sha"].as_str()) {
            (Some(_), None) => {
                return (
                    422,
                    json!({"message": "Invalid request.\n\n\"sha\" wasn't supplied."}),
                );
            }
            (Some(current), Some(given)) if current != given => {
                return (409, json!({"message": format!("{} does not match {}", path, given)}));
            }
            _ => {}
        }

        let created = !self.commits[&tip].tree.contains_key(path);
        let sha = blob_sha(&content);
        let commit = self.write_file(repo, &branch, path, content);
        (
            if created { 201 } else { 200 },
            json!({
                "content": {"path": path, "sha": sha},
                "commit": {"sha": commit, "message": message},
            }),
        )
    }

    fn create_pull(&mut self, repo: &str, body: &Value) -> (u16, Value) {
        let (Some(head), Some(base), Some(title)) = (
            body["head"].as_str(),
            body["base"].as_str(),
            body["title"].as_str(),
        ) else {
            return (422, json!({"message": "Validation Failed"}));
        };
        if self.pulls.iter().any(|p| p.repo == repo && p.head == head && p.base == base) {
            return (
                422,
                json!({"message": format!("A pull request already exists for {}.", head)}),
            );
        }

        // Head is `owner:branch` in a fork of `repo`
        let (head_owner, head_branch) = head.split_once(':').unwrap_or(("", head));
        let head_repo = match head_owner {
            "" => repo.to_string(),
            owner => format!("{}/{}", owner, repo.split('/').nth(1).unwrap_or_default()),
        };
        if self.tip(&head_repo, head_branch).is_none() {
            return (422, json!({"message": "Validation Failed", "errors": [{"field": "head"}]}));
        }

        let pull = self.add_pull(
            repo,
            head,
            base,
            title,
            body["body"].as_str().unwrap_or_default(),
            body["draft"].as_bool().unwrap_or(false),
        );
        (201, json!({"number": pull.number, "html_url": pull.url()}))
    }
}

impl HttpOps for FakeGithub {
    async fn execute(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let (status, body) = self.state.borrow_mut().handle(&request);
        Ok(HttpResponse {
            status,
            body: serde_json::to_vec(&body)?,
        })
    }
}

impl HttpOps for &FakeGithub {
    async fn execute(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        (**self).execute(request).await
    }
}
