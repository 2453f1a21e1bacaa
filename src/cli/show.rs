//! Show subcommand: print one project's stored snapshot.

use clap::Args;

/// Arguments for the show subcommand
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Project code, e.g. GMP-P1
    #[arg(value_name = "CODE")]
    pub code: String,
}
