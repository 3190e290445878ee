use anyhow::{Context, Result};
use clap::Parser;
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use powertop::cli::Cli;
use powertop::display::{Display, TerminalDisplay};
use powertop::input::{NoInput, TerminalInput};
use powertop::session::{Session, SessionOptions};
use powertop::sysfs::SysfsRoot;
use std::process::Command;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Some(shell) = cli.completions.as_deref() {
        let shell = match shell {
            "auto" => None,
            name => Some(name.parse::<Shell>().map_err(|e| anyhow::anyhow!(e))?),
        };
        powertop::cli::print_completions(shell);
        return Ok(());
    }

    let config = powertop::config::load(cli.config.as_ref());
    let options = SessionOptions::from_config(&config, cli.dump, cli.time);

    if nix::unistd::geteuid().is_root() {
        load_cpufreq_stats();
    } else {
        eprintln!(
            "{}",
            "PowerTOP needs to be run as root to collect enough information".yellow()
        );
    }

    let interval_secs = options.interval_secs;
    let mut session = Session::new(SysfsRoot::system(), options);
    if cli.dump {
        cmd_dump(&mut session, interval_secs, cli.json)
    } else {
        cmd_interactive(&mut session, config.display.top_lines)
    }
}

/// P-state statistics live in a module on older kernels.
fn load_cpufreq_stats() {
    match Command::new("modprobe").args(["-q", "cpufreq_stats"]).status() {
        Ok(status) if !status.success() => log::debug!("modprobe cpufreq_stats: {}", status),
        Ok(_) => {}
        Err(e) => log::debug!("modprobe not runnable: {}", e),
    }
}

fn cmd_dump(session: &mut Session, interval_secs: f64, json: bool) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Collecting data for {} seconds", interval_secs.round() as u64));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let report = session.dump(&mut NoInput);
    spinner.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut display = TerminalDisplay::stdout(false, usize::MAX);
    display.show_report(&report)?;
    Ok(())
}

fn cmd_interactive(session: &mut Session, top_lines: usize) -> Result<()> {
    let mut keys = TerminalInput::new().context("failed to set up terminal input")?;
    let mut display = TerminalDisplay::stdout(true, top_lines);
    session.run(&mut keys, &mut display)?;
    Ok(())
}
