use std::path::PathBuf;

use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use operator_release::App;
use operator_release::Config;
use operator_release::ops::http::RealHttp;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Parser)]
#[command(name = "operator-release")]
#[command(about = "Publish an IBM Cloud Operator release to the community operator catalogs", long_about = None)]
pub struct Cli {
    /// Release version, with or without the leading v (e.g. 1.2.3)
    #[arg(long)]
    pub version: String,

    /// GitHub token with contents and pull request access to the fork
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Organization or user that owns the catalog forks
    #[arg(long)]
    pub fork_org: String,

    /// Cluster service version file to publish
    #[arg(long)]
    pub csv: PathBuf,

    /// Package index file to publish
    #[arg(long)]
    pub package: PathBuf,

    /// Open the pull requests as drafts
    #[arg(long)]
    pub draft: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            version: cli.version,
            fork_org: cli.fork_org,
            github_token: cli.github_token,
            csv_path: cli.csv,
            package_path: cli.package,
            draft: cli.draft,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let cli = Cli::parse();
    let app = App::new(Config::from(cli), RealHttp);
    let mut stdout = std::io::stdout();

    tokio::select! {
        result = app.cmd_release(&mut stdout) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            bail!("release cancelled; changes already made to the remote repositories were left in place");
        }
    }

    Ok(())
}

fn setup_logging() -> Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}
