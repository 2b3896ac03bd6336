use super::Host;
use super::common::{CommonArgs, InputArgs, Session, write_output};
use crate::Result;
use crate::progress::Progress;
use crate::redirect::{Redirect, ResolveRedirects};
use crate::reconcile::{NormalizedSet, sort_normalized};
use crate::urls::PackageUrl;
use camino::Utf8PathBuf;
use clap::Parser;
use core::sync::atomic::{AtomicU64, Ordering};
use futures_util::future::join_all;
use std::io::Write;
use std::sync::Arc;

const LOG_TARGET: &str = "  redirect";

#[derive(Parser, Debug)]
pub struct CheckRedirectsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub input: InputArgs,

    /// Where to write the updated list (`-` or omitted for stdout)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Only check the first N input packages; the rest pass through unchanged
    #[arg(long, short = 'l', value_name = "N")]
    pub limit: Option<usize>,
}

/// Replace every package URL that redirects with its target, and drop packages
/// that no longer exist.
pub async fn check_redirects<H: Host>(host: &mut H, args: &CheckRedirectsArgs) -> Result<()> {
    let _ = args.input.source()?;

    let session = Session::new(host, &args.common).await?;
    let input = args.input.load(&session.config).await?;
    let limit = args.limit.map_or(input.len(), |l| l.min(input.len()));

    let _ = writeln!(host.error(), "Checking for redirects ({limit} packages) ...");

    let done = Arc::new(AtomicU64::new(0));
    session.progress.set_phase("Redirects");
    session.progress.set_determinate(Box::new({
        let done = Arc::clone(&done);
        let total = limit as u64;
        move || (total, done.load(Ordering::Relaxed), String::new())
    }));

    let updated = redirected_list(session.resolver.as_ref(), &session, &input, limit, &done).await;

    session.finish()?;
    write_output(host, args.output.as_ref(), &updated)
}

async fn redirected_list<R: ResolveRedirects>(
    resolver: &R,
    session: &Session,
    input: &[PackageUrl],
    limit: usize,
    done: &AtomicU64,
) -> Vec<PackageUrl> {
    let (checked, unchecked) = input.split_at(limit);
    let known = NormalizedSet::new(input);

    let resolutions = join_all(checked.iter().map(|url| async move {
        let permit = session.limiter.acquire().await;
        let outcome = resolver.resolve_package_redirects(url).await;
        permit.release();

        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if finished.is_multiple_of(session.config.progress_interval) {
            log::info!(target: LOG_TARGET, "Checked {finished} of {limit} packages");
        }

        (url, outcome)
    }))
    .await;

    let mut updated: Vec<PackageUrl> = resolutions
        .into_iter()
        .filter_map(|(url, outcome)| apply_outcome(&known, url, outcome))
        .collect();

    updated.extend(unchecked.iter().cloned());
    sort_normalized(&mut updated);
    updated
}

/// What a single redirect check leaves in the list in place of `url`.
fn apply_outcome(known: &NormalizedSet, url: &PackageUrl, outcome: Result<Redirect, crate::ValidatorError>) -> Option<PackageUrl> {
    match outcome {
        Ok(Redirect::Initial(_)) => Some(url.clone()),
        Ok(Redirect::NotFound(_)) => {
            log::info!(target: LOG_TARGET, "NOT FOUND:  {url}");
            None
        }
        Ok(Redirect::Redirected(to)) => {
            if known.insert(&to) {
                log::info!(target: LOG_TARGET, "ADD:        {url} -> {to}");
                Some(to)
            } else {
                log::info!(target: LOG_TARGET, "DELETE:     {url} -> {to} (exists)");
                None
            }
        }
        Ok(other) => {
            log::warn!(target: LOG_TARGET, "Keeping '{url}': {other:?}");
            Some(url.clone())
        }
        Err(e) => {
            log::warn!(target: LOG_TARGET, "Keeping '{url}': {e}");
            Some(url.clone())
        }
    }
}
