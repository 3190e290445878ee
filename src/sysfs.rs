use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Root of the pseudo-filesystems PowerTOP samples (`/proc`, `/sys`, `/boot`).
/// Defaults to `/`; tests point it at a temp directory holding a fake tree.
#[derive(Debug, Clone)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl SysfsRoot {
    /// The live system.
    pub fn system() -> Self {
        Self::default()
    }

    /// A fake tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a root-relative path, e.g. `proc/interrupts`.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Read a whole file with surrounding whitespace trimmed.
    pub fn read(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.path(relative);
        std::fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|source| Error::SysfsRead { path, source })
    }

    /// Like [`read`](Self::read), but a missing or unreadable file is `None`.
    /// Counters under `/proc` and `/sys` come and go with modules and
    /// hotplug; callers treat absence as "no data this interval".
    pub fn read_optional(&self, relative: impl AsRef<Path>) -> Result<Option<String>> {
        let path = self.path(relative);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(None),
            Err(e) => Err(Error::SysfsRead { path, source: e }),
        }
    }

    /// First line of a file, trimmed. Empty files give `None`.
    pub fn read_first_line(&self, relative: impl AsRef<Path>) -> Option<String> {
        self.read_optional(relative)
            .unwrap_or(None)
            .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
    }

    /// Leading decimal number of a counter file (`strtoull` semantics:
    /// trailing junk is ignored, no digits means `None`).
    pub fn read_u64(&self, relative: impl AsRef<Path>) -> Option<u64> {
        self.read_first_line(relative)
            .and_then(|line| parse_leading_u64(&line))
    }

    pub fn write(&self, relative: impl AsRef<Path>, value: &str) -> Result<()> {
        let path = self.path(relative);
        std::fs::write(&path, value).map_err(|source| Error::SysfsWrite { path, source })
    }

    /// Directory entries, sorted by name, hidden entries skipped.
    pub fn list_dir(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.path(relative);
        let entries = std::fs::read_dir(&path).map_err(|e| Error::SysfsRead {
            path: path.clone(),
            source: e,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::SysfsRead {
                path: path.clone(),
                source: e,
            })?;
            if let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }

    /// `cpuN` directories under `sys/devices/system/cpu`, in numeric order.
    pub fn cpu_dirs(&self) -> Vec<String> {
        let mut cpus: Vec<(u32, String)> = self
            .list_dir("sys/devices/system/cpu")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| {
                let n = e.strip_prefix("cpu")?.parse::<u32>().ok()?;
                Some((n, e))
            })
            .collect();
        cpus.sort_by_key(|(n, _)| *n);
        cpus.into_iter().map(|(_, e)| e).collect()
    }

    /// Online CPU count, never less than one.
    pub fn num_cpus(&self) -> u32 {
        (self.cpu_dirs().len() as u32).max(1)
    }
}

/// Parse the leading run of ASCII digits, skipping leading blanks.
pub fn parse_leading_u64(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_write() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());

        fs::create_dir_all(tmp.path().join("proc/sys/vm")).unwrap();
        fs::write(tmp.path().join("proc/sys/vm/laptop_mode"), "0\n").unwrap();

        assert_eq!(sysfs.read("proc/sys/vm/laptop_mode").unwrap(), "0");
        sysfs.write("proc/sys/vm/laptop_mode", "5\n").unwrap();
        assert_eq!(sysfs.read_u64("proc/sys/vm/laptop_mode"), Some(5));
    }

    #[test]
    fn test_read_optional_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());

        assert_eq!(sysfs.read_optional("sys/nonexistent").unwrap(), None);
        assert_eq!(sysfs.read_u64("sys/nonexistent"), None);
    }

    #[test]
    fn test_read_u64_ignores_trailing_text() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        fs::write(tmp.path().join("urbnum"), "  1234 extra\nsecond line\n").unwrap();

        assert_eq!(sysfs.read_u64("urbnum"), Some(1234));
        assert_eq!(parse_leading_u64("abc"), None);
    }

    #[test]
    fn test_cpu_dirs_numeric_order() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        for name in ["cpu10", "cpu2", "cpu0", "cpufreq", "cpuidle", ".hidden"] {
            fs::create_dir_all(tmp.path().join("sys/devices/system/cpu").join(name)).unwrap();
        }

        assert_eq!(sysfs.cpu_dirs(), vec!["cpu0", "cpu2", "cpu10"]);
        assert_eq!(sysfs.num_cpus(), 3);
    }

    #[test]
    fn test_num_cpus_defaults_to_one() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(SysfsRoot::new(tmp.path()).num_cpus(), 1);
    }
}
