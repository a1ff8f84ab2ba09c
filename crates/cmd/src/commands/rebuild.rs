use anyhow::{Context, Result};
use clap::Args;
use dronetrigger_core::{Build, Rebuilder};
use tracing::info;

#[derive(Args, Debug)]
pub struct RebuildArgs {
    /// Repository to build (i.e. octocat/awesome)
    #[arg(long)]
    pub repo: String,
    /// Git branch to rebuild, the last push build of any branch if unset
    #[arg(long, alias = "ref")]
    pub branch: Option<String>,
    /// Rebuild the last release tag
    #[arg(long, conflicts_with = "branch")]
    pub release: bool,
}

pub async fn execute(drone: &impl Rebuilder, args: &RebuildArgs) -> Result<Build> {
    if args.repo.is_empty() {
        anyhow::bail!("please specify a repository");
    }

    let build = if args.release {
        drone
            .rebuild_last_tag(&args.repo)
            .await
            .with_context(|| format!("unable to rebuild last tag of {}", args.repo))?
    } else {
        let branch = args.branch.as_deref().unwrap_or_default();
        drone
            .rebuild_last_build(&args.repo, branch)
            .await
            .with_context(|| format!("unable to rebuild last build of {}", args.repo))?
    };

    info!(number = build.number, repo = %args.repo, "started build");
    Ok(build)
}
