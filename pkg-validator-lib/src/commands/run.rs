//! Command dispatch logic for pkg-validator

use super::{
    ApplyDenyListArgs, CheckDependenciesArgs, CheckRedirectsArgs, InitArgs, MergeListsArgs, ReconcileArgs, apply_deny_list_file,
    check_dependencies, check_redirects, init_config, merge_list_files, reconcile,
};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "pkg-validator", version, author, long_about = None)]
#[command(about = "Keep a package index's repository list canonical, deduplicated, and complete")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: ValidatorSubcommand,
}

#[derive(Subcommand, Debug)]
enum ValidatorSubcommand {
    /// Add every repository the input packages depend on
    CheckDependencies(Box<CheckDependenciesArgs>),
    /// Replace moved repositories with their new location and drop missing ones
    CheckRedirects(Box<CheckRedirectsArgs>),
    /// Merge several package lists, ignoring case
    MergeLists(MergeListsArgs),
    /// Remove denied packages from a package list
    ApplyDenyList(ApplyDenyListArgs),
    /// Add dependencies the package index knows about but doesn't index yet
    Reconcile(Box<ReconcileArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand. It's designed to be called from main.rs with the program arguments.
///
/// # Arguments
///
/// * `args` - An iterator of command-line arguments (typically from `std::env::args()`)
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        ValidatorSubcommand::CheckDependencies(args) => check_dependencies(host, args).await,
        ValidatorSubcommand::CheckRedirects(args) => check_redirects(host, args).await,
        ValidatorSubcommand::MergeLists(args) => merge_list_files(host, args),
        ValidatorSubcommand::ApplyDenyList(args) => apply_deny_list_file(host, args),
        ValidatorSubcommand::Reconcile(args) => reconcile(host, args).await,
        ValidatorSubcommand::Init(args) => init_config(host, args),
    }
}
