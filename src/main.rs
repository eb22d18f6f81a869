use clap::Parser as _;

use wabbit::cli::{Subcommand, WabbitCommand as _};

/// The command-line arguments for the `wabbit` binary.
#[derive(clap::Parser)]
pub struct WabbitArguments {
	/// The subcommand to run, such as `interpret` or `wvm`.
	#[command(subcommand)]
	pub command: Subcommand,
}

fn main() -> anyhow::Result<()> {
	WabbitArguments::parse().command.execute()
}
