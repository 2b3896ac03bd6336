use super::Host;
use super::common::{LogLevel, init_logging, write_output};
use crate::Result;
use crate::package_list;
use crate::reconcile::apply_deny_list;
use camino::Utf8PathBuf;
use clap::Parser;

const LOG_TARGET: &str = "      list";

#[derive(Parser, Debug)]
pub struct ApplyDenyListArgs {
    /// Package list to filter
    #[arg(long, short = 'p', value_name = "PATH")]
    pub packages_file: Utf8PathBuf,

    /// Deny list of `{ "package_url": ... }` entries
    #[arg(long, short = 'd', value_name = "PATH")]
    pub deny_file: Utf8PathBuf,

    /// Where to write the filtered list (default is to overwrite the package list; `-` for stdout)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: LogLevel,
}

/// Remove every denied package from a package list.
pub fn apply_deny_list_file<H: Host>(host: &mut H, args: &ApplyDenyListArgs) -> Result<()> {
    init_logging(args.log_level);

    let packages = package_list::load(args.packages_file.as_std_path())?;
    let denied = package_list::load_deny_list(args.deny_file.as_std_path())?;

    let kept = apply_deny_list(&packages, &denied);
    log::info!(target: LOG_TARGET, "Removed {} of {} packages", packages.len() - kept.len(), packages.len());

    write_output(host, Some(args.output.as_ref().unwrap_or(&args.packages_file)), &kept)
}
