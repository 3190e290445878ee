use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sysfs read failed: {path}: {source}")]
    SysfsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sysfs write failed: {path}: {source}")]
    SysfsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("terminal error: {0}")]
    Terminal(#[from] nix::Error),

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
