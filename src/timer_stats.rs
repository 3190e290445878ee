//! Timer wakeups per process from `/proc/timer_stats`.
//!
//! The file only exists on kernels built with `CONFIG_TIMER_STATS`. Writing
//! `1` starts collection, `0` stops it; reading lists one line per timer
//! site. A failed write marks the source unavailable for the rest of the run.

use crate::samples::SampleStore;
use crate::sysfs::{SysfsRoot, parse_leading_u64};

const TIMER_STATS: &str = "proc/timer_stats";
const OWN_COMM: &str = "powertop";

#[derive(Debug)]
pub struct TimerStats {
    available: bool,
}

impl Default for TimerStats {
    fn default() -> Self {
        Self { available: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TimerLine {
    count: u64,
    deferrable: bool,
    pid: String,
    process: String,
    func: String,
}

impl TimerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn start(&mut self, sysfs: &SysfsRoot) {
        self.control(sysfs, "1\n");
    }

    pub fn stop(&mut self, sysfs: &SysfsRoot) {
        self.control(sysfs, "0\n");
    }

    fn control(&mut self, sysfs: &SysfsRoot, value: &str) {
        if !self.available {
            return;
        }
        if let Err(e) = sysfs.write(TIMER_STATS, value) {
            log::debug!("timer_stats unavailable: {}", e);
            self.available = false;
        }
    }

    /// Push one line per timer site and return the `total events` figure.
    pub fn collect(&self, sysfs: &SysfsRoot, samples: &mut SampleStore) -> Option<u64> {
        if !self.available {
            return None;
        }
        let content = sysfs.read_optional(TIMER_STATS).unwrap_or(None)?;

        for line in content.lines() {
            if line.contains("total events") {
                return parse_leading_u64(line);
            }
            let Some(entry) = parse_line(line) else {
                continue;
            };
            if entry.deferrable || skip_func(&entry.func) || entry.process == OWN_COMM {
                continue;
            }
            let label = format!("{:>15} : {}", display_process(&entry.process), entry.func);
            samples.add_occurrence(&label, entry.count, Some(&entry.pid));
        }
        None
    }
}

fn skip_func(func: &str) -> bool {
    func.starts_with("tick_nohz_") || func.starts_with("tick_setup_sched_timer")
}

fn display_process(process: &str) -> &str {
    match process {
        "insmod" | "modprobe" => "<kernel module>",
        "swapper" => "<kernel core>",
        other => other,
    }
}

fn parse_line(line: &str) -> Option<TimerLine> {
    let (count_field, rest) = line.split_once(',')?;
    let count_field = count_field.trim();
    let count = parse_leading_u64(count_field)?;
    let deferrable = count_field.contains('D');

    let rest = rest.trim_start();
    let (pid, rest) = rest.split_once(' ')?;
    let rest = rest.trim_start();
    let (process, func) = rest.split_once(' ')?;

    Some(TimerLine {
        count,
        deferrable,
        pid: pid.to_string(),
        process: process.to_string(),
        func: func.trim().to_string(),
    })
}
