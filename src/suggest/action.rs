use super::Activate;
use crate::error::{Error, Result};
use crate::sysfs::SysfsRoot;
use std::process::Command;

/// Write a fixed value to a tunable, e.g. `proc/sys/vm/laptop_mode`.
#[derive(Debug, Clone)]
pub struct SysfsWrite {
    sysfs: SysfsRoot,
    path: String,
    value: String,
}

impl SysfsWrite {
    pub fn new(sysfs: &SysfsRoot, path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sysfs: sysfs.clone(),
            path: path.into(),
            value: value.into(),
        }
    }
}

impl Activate for SysfsWrite {
    fn activate(&self) -> Result<()> {
        log::info!("writing '{}' to {}", self.value.trim_end(), self.path);
        self.sysfs.write(&self.path, &self.value)
    }
}

/// Run an external program and wait for it.
#[derive(Debug, Clone)]
pub struct RunCommand {
    program: String,
    args: Vec<String>,
}

impl RunCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Activate for RunCommand {
    fn activate(&self) -> Result<()> {
        log::info!("running {}", self.command_line());
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|e| Error::Command {
                command: self.command_line(),
                detail: e.to_string(),
            })?;

        if !status.success() {
            return Err(Error::Command {
                command: self.command_line(),
                detail: format!("exited with {}", status),
            });
        }
        Ok(())
    }
}

/// Several actions behind one hotkey. One failure does not stop the rest;
/// the last error is returned.
#[derive(Debug, Clone)]
pub struct Batch<A>(pub Vec<A>);

impl<A: Activate> Activate for Batch<A> {
    fn activate(&self) -> Result<()> {
        let mut outcome = Ok(());
        for action in &self.0 {
            if let Err(e) = action.activate() {
                log::warn!("{}", e);
                outcome = Err(e);
            }
        }
        outcome
    }
}
