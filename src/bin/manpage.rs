//! Render `powertop.1` into the directory given as the first argument
//! (default `man/`).

use clap::CommandFactory;
use std::fs;
use std::io;
use std::path::PathBuf;

fn main() -> io::Result<()> {
    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&out_dir)?;

    let cmd = powertop::cli::Cli::command();
    let page = out_dir.join(format!("{}.1", cmd.get_name()));
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    fs::write(&page, buffer)?;

    println!("Generated {}", page.display());
    Ok(())
}
