//! CPU frequency (P-state) residency from `cpufreq/stats/time_in_state`.

use crate::sysfs::{SysfsRoot, parse_leading_u64};
use serde::Serialize;

/// Frequency slots read per CPU.
pub const MAX_PSTATES: usize = 16;

/// Frequencies shown after ranking by residency.
const SHOWN_PSTATES: usize = 5;

const DOMINANT_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FreqBucket {
    /// kHz, as the kernel reports it.
    pub frequency: u64,
    /// Cumulative residency, summed over CPUs.
    pub count: u64,
}

/// One read of every CPU's frequency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreqSample {
    Unavailable,
    /// CPUs list different frequencies; the data cannot be combined.
    Mismatch,
    Buckets(Vec<FreqBucket>),
}

impl FreqSample {
    pub fn read(sysfs: &SysfsRoot) -> Self {
        let mut buckets: Option<Vec<FreqBucket>> = None;

        for cpu in sysfs.cpu_dirs() {
            let path = format!("sys/devices/system/cpu/{}/cpufreq/stats/time_in_state", cpu);
            let Some(content) = sysfs.read_optional(&path).unwrap_or(None) else {
                continue;
            };
            let table: Vec<FreqBucket> = content
                .lines()
                .filter_map(parse_time_in_state)
                .take(MAX_PSTATES)
                .collect();

            match buckets.as_mut() {
                None => buckets = Some(table),
                Some(acc) => {
                    let same = acc.len() == table.len()
                        && acc.iter().zip(&table).all(|(a, b)| a.frequency == b.frequency);
                    if !same {
                        log::debug!("{} frequency table differs from the first CPU", cpu);
                        return FreqSample::Mismatch;
                    }
                    for (a, b) in acc.iter_mut().zip(table) {
                        a.count += b.count;
                    }
                }
            }
        }

        match buckets {
            Some(b) if !b.is_empty() => FreqSample::Buckets(b),
            _ => FreqSample::Unavailable,
        }
    }
}

fn parse_time_in_state(line: &str) -> Option<FreqBucket> {
    let mut fields = line.split_whitespace();
    let frequency = parse_leading_u64(fields.next()?)?;
    let count = parse_leading_u64(fields.next()?)?;
    Some(FreqBucket { frequency, count })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreqLine {
    pub frequency: u64,
    pub label: String,
    pub percent: f64,
    pub dominant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreqReport {
    /// At most five frequencies, highest first.
    pub lines: Vec<FreqLine>,
}

impl FreqReport {
    pub fn lines(&self) -> Vec<String> {
        let mut out = vec!["P-states (frequencies)".to_string()];
        out.extend(
            self.lines
                .iter()
                .map(|l| format!("{:>10}   {:5.1}%", l.label, l.percent)),
        );
        out
    }

    pub fn dominant(&self) -> Option<&FreqLine> {
        self.lines.iter().find(|l| l.dominant)
    }
}

/// Keeps the previous cumulative table between intervals.
#[derive(Debug, Default)]
pub struct CpuFreqTracker {
    previous: Vec<FreqBucket>,
}

impl CpuFreqTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a new sample. `None` means nothing to show this interval:
    /// no data, a baseline was (re)established, or no time elapsed.
    pub fn update(&mut self, sample: FreqSample) -> Option<FreqReport> {
        let current = match sample {
            FreqSample::Unavailable => {
                self.previous.clear();
                return None;
            }
            FreqSample::Mismatch => {
                self.previous.clear();
                return None;
            }
            FreqSample::Buckets(b) => b,
        };

        let comparable = self.previous.len() == current.len()
            && self
                .previous
                .iter()
                .zip(&current)
                .all(|(p, c)| p.frequency == c.frequency && p.count <= c.count);
        if !comparable {
            self.previous = current;
            return None;
        }

        let mut delta: Vec<FreqBucket> = self
            .previous
            .iter()
            .zip(&current)
            .map(|(p, c)| FreqBucket {
                frequency: c.frequency,
                count: c.count - p.count,
            })
            .collect();
        self.previous = current;

        let total: u64 = delta.iter().map(|b| b.count).sum();
        if total == 0 {
            return None;
        }

        delta.sort_by(|a, b| b.count.cmp(&a.count));
        delta.truncate(SHOWN_PSTATES);
        delta.sort_by(|a, b| b.frequency.cmp(&a.frequency));

        let lines = delta
            .into_iter()
            .map(|b| {
                let percent = b.count as f64 * 100.0 / total as f64;
                FreqLine {
                    frequency: b.frequency,
                    label: format_frequency(b.frequency),
                    percent,
                    dominant: percent > DOMINANT_PERCENT,
                }
            })
            .collect();

        Some(FreqReport { lines })
    }
}

/// Human-readable frequency for a kHz value from `time_in_state`.
pub fn format_frequency(value: u64) -> String {
    if value > 1_500_000 {
        format!("{:.2} Ghz", value as f64 / 1_000_000.0)
    } else if value > 1000 {
        format!("{} Mhz", (value + 500) / 1000)
    } else {
        value.to_string()
    }
}
