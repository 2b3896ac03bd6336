use super::Host;
use super::common::{CommonArgs, InputArgs, Session, write_output};
use crate::Result;
use crate::reconcile::{merge_with_existing, sort_normalized};
use camino::Utf8PathBuf;
use clap::Parser;
use ohno::bail;
use std::io::Write;

const LOG_TARGET: &str = "   crawler";

#[derive(Parser, Debug)]
pub struct CheckDependenciesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub input: InputArgs,

    /// Where to write the expanded list (`-` or omitted for stdout)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Only crawl the first N input packages
    #[arg(long, short = 'l', value_name = "N")]
    pub limit: Option<usize>,

    /// Stop discovering packages once the list holds this many
    #[arg(long, value_name = "N")]
    pub max_packages: Option<usize>,

    /// How often a package is retried after a transient failure (overrides the configuration)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Index of the chunk to crawl (0..number-of-chunks)
    #[arg(long, value_name = "INDEX", requires = "number_of_chunks")]
    pub chunk: Option<usize>,

    /// Number of chunks to split the input into
    #[arg(long, value_name = "N", requires = "chunk")]
    pub number_of_chunks: Option<usize>,

    /// Exit with status 1 if any package had to be given up on
    #[arg(long)]
    pub strict: bool,
}

/// Crawl the dependency manifests of the input packages and add every repository
/// they lead to.
pub async fn check_dependencies<H: Host>(host: &mut H, args: &CheckDependenciesArgs) -> Result<()> {
    let _ = args.input.source()?;
    if let (Some(index), Some(count)) = (args.chunk, args.number_of_chunks)
        && count > 0
        && index >= count
    {
        bail!("--chunk must be less than --number-of-chunks ({count})");
    }

    let session = Session::new(host, &args.common).await?;
    let input = args.input.load(&session.config).await?;

    let limited = &input[..args.limit.map_or(input.len(), |l| l.min(input.len()))];
    let seeds = chunk(limited, args.chunk, args.number_of_chunks);

    let _ = writeln!(host.error(), "Checking dependencies ({} packages) ...", seeds.len());
    if let (Some(index), Some(count)) = (args.chunk, args.number_of_chunks) {
        let _ = writeln!(host.error(), "Chunk {index} of {count}");
    }

    let crawler = session.crawler()?;
    let retries = args.retries.unwrap_or(session.config.retries);
    let expanded = crawler.expand(seeds, args.max_packages, retries).await;

    let mut updated = merge_with_existing(&input, expanded);
    sort_normalized(&mut updated);

    let stats = crawler.stats();
    log::info!(
        target: LOG_TARGET,
        "{} packages in, {} out ({} processed, {} skipped, {} failed)",
        input.len(),
        updated.len(),
        stats.processed,
        stats.skipped,
        stats.failed
    );

    session.finish()?;
    write_output(host, args.output.as_ref(), &updated)?;

    if args.strict && stats.failed > 0 {
        let _ = writeln!(host.error(), "Gave up on {} packages", stats.failed);
        host.exit(1);
    }

    Ok(())
}

/// Contiguous chunk `index` of `count`, each `ceil(len / count)` long.
///
/// Without both values, or with zero chunks, the whole slice is the chunk.
fn chunk<T>(items: &[T], index: Option<usize>, count: Option<usize>) -> &[T] {
    let (Some(index), Some(count)) = (index, count) else {
        return items;
    };

    if count == 0 {
        return items;
    }

    let size = items.len().div_ceil(count);
    let start = index.saturating_mul(size).min(items.len());
    let end = start.saturating_add(size).min(items.len());
    &items[start..end]
}
