use crate::config::Config;
use crate::ops::github::GithubClient;
use crate::ops::http::HttpOps;
use crate::release::TargetRepo;
use crate::release::target_repos;

pub struct App<H: HttpOps> {
    pub config: Config,
    pub gh: GithubClient<H>,
    pub targets: Vec<TargetRepo>,
}

impl<H: HttpOps> App<H> {
    /// Builds the client only; nothing is sent until a command runs.
    pub fn new(config: Config, http: H) -> Self {
        let gh = GithubClient::new(http, config.github_token.clone());
        Self {
            config,
            gh,
            targets: target_repos(),
        }
    }
}
