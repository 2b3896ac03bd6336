use super::Host;
use super::common::{CommonArgs, InputArgs, Session, write_output};
use crate::index::{IndexApi, find_new_packages};
use crate::reconcile::{merge_with_existing, sort_normalized};
use crate::{Result, ValidatorError};
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::Write;

const LOG_TARGET: &str = " reconcile";

#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub input: InputArgs,

    /// Token for the package index API
    #[arg(long, value_name = "TOKEN", env = "SPI_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Where to write the updated list (`-` or omitted for stdout)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Stop after finding this many new packages
    #[arg(long, short = 'l', value_name = "N")]
    pub limit: Option<usize>,
}

/// Add the dependencies the package index knows about but doesn't index yet.
pub async fn reconcile<H: Host>(host: &mut H, args: &ReconcileArgs) -> Result<()> {
    let _ = args.input.source()?;
    let Some(api_token) = args.api_token.as_deref().filter(|t| !t.is_empty()) else {
        return Err(ValidatorError::TokenRequired.into());
    };

    let session = Session::new(host, &args.common).await?;
    let input = args.input.load(&session.config).await?;

    let api = IndexApi::new(session.config.index_api_base_url.as_str(), api_token, session.config.request_timeout)?;
    let records = api.fetch_dependencies().await?;

    let _ = writeln!(host.error(), "Reconciling {} package records ...", records.len());

    let found = find_new_packages(
        &records,
        &session.github,
        session.resolver.as_ref(),
        args.limit,
        session.config.drop_forks,
    )
    .await;

    log::info!(
        target: LOG_TARGET,
        "{} indexed, {} missing, {} new, {} forks dropped",
        found.indexed,
        found.missing,
        found.new_packages.len(),
        found.dropped_forks
    );

    let mut updated = merge_with_existing(&input, found.new_packages);
    sort_normalized(&mut updated);

    session.finish()?;
    write_output(host, args.output.as_ref(), &updated)
}
