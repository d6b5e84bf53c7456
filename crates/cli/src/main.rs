mod cmd;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// pkgpress - build a package recipe in a clean chroot and publish it to a local repository
#[derive(Parser)]
#[command(name = "pkgpress")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Package name (expanded against the default namespace) or recipe git URL
  package: String,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,

  /// Output format for the publish report
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let code = match cmd::cmd_build(&cli.package, cli.output) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{:#}", err));
      cmd::exit_code_for(&err)
    }
  };

  std::process::exit(code);
}
