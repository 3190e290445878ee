use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "powertop",
    about = "Find the software that makes your laptop use more power than necessary",
    version
)]
pub struct Cli {
    /// Measure one interval, print every suggestion and USB activity, then exit
    #[arg(short, long)]
    pub dump: bool,

    /// Length of the dump-mode interval in seconds
    #[arg(short, long, value_name = "SECS", requires = "dump", value_parser = parse_secs)]
    pub time: Option<f64>,

    /// With --dump, print the report as JSON
    #[arg(long, requires = "dump")]
    pub json: bool,

    /// Use only this config file instead of /etc and ~/.config
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print shell completions and exit (shell auto-detected if omitted)
    #[arg(long, value_name = "SHELL", num_args = 0..=1, default_missing_value = "auto")]
    pub completions: Option<String>,
}

/// A positive, finite number of seconds.
fn parse_secs(value: &str) -> Result<f64, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(format!("'{}' is not a positive number of seconds", value))
    }
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) {
    let shell = shell.or_else(Shell::from_env).unwrap_or_else(|| {
        eprintln!(
            "Could not detect shell. Specify one: powertop --completions bash|zsh|fish|elvish|powershell"
        );
        std::process::exit(1);
    });
    clap_complete::generate(shell, &mut Cli::command(), "powertop", &mut std::io::stdout());
}
