use super::Host;
use super::common::{LogLevel, init_logging, write_output};
use crate::Result;
use crate::package_list;
use crate::reconcile::merge_lists;
use crate::urls::PackageUrl;
use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct MergeListsArgs {
    /// Package list files to merge
    #[arg(value_name = "PATH", required = true)]
    pub inputs: Vec<Utf8PathBuf>,

    /// Where to write the merged list (`-` or omitted for stdout)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: LogLevel,
}

/// Union of several package lists, ignoring case.
pub fn merge_list_files<H: Host>(host: &mut H, args: &MergeListsArgs) -> Result<()> {
    init_logging(args.log_level);

    let lists = args
        .inputs
        .iter()
        .map(|path| package_list::load(path.as_std_path()))
        .collect::<Result<Vec<Vec<PackageUrl>>>>()?;

    let merged = merge_lists(lists.iter().map(Vec::as_slice));
    write_output(host, args.output.as_ref(), &merged)
}
