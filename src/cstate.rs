//! CPU idle-state (C-state) residency.
//!
//! Cumulative usage/duration counters are summed over all CPUs into at most
//! [`MAX_CSTATES`] slots. Two snapshots, taken at the start and end of an
//! interval, give the residency percentages shown to the user.

use crate::sysfs::{SysfsRoot, parse_leading_u64};
use serde::Serialize;

/// Idle-state slots tracked per snapshot. Slot 0 is polling, slot 1 is C1.
pub const MAX_CSTATES: usize = 8;

/// cpuidle reports durations in microseconds: 1000 units per millisecond.
pub const CPUIDLE_TIMER_FREQ: f64 = 1000.0;

/// The ACPI PM timer runs at 3.579545 MHz: 3579.545 ticks per millisecond.
pub const ACPI_TIMER_FREQ: f64 = 3579.545;

/// A state above this share of the interval is highlighted.
const DOMINANT_PERCENT: f64 = 50.0;

const CPU_BASE: &str = "sys/devices/system/cpu";
const ACPI_PROCESSOR: &str = "proc/acpi/processor";

#[derive(Debug, Clone, PartialEq)]
pub struct IdleSnapshot {
    pub usage: [u64; MAX_CSTATES],
    pub duration: [u64; MAX_CSTATES],
    pub names: [Option<String>; MAX_CSTATES],
    /// Highest slot count seen on any CPU.
    pub max_cstate: usize,
    /// Duration units per millisecond.
    pub timer_freq: f64,
    /// False when CPUs disagreed on what a slot means.
    pub consistent: bool,
}

impl Default for IdleSnapshot {
    fn default() -> Self {
        Self {
            usage: [0; MAX_CSTATES],
            duration: [0; MAX_CSTATES],
            names: Default::default(),
            max_cstate: 0,
            timer_freq: CPUIDLE_TIMER_FREQ,
            consistent: true,
        }
    }
}

impl IdleSnapshot {
    /// Read cpuidle if the kernel has it, else the legacy ACPI processor
    /// files, else an empty snapshot.
    pub fn read(sysfs: &SysfsRoot) -> Self {
        if sysfs.exists(format!("{}/cpu0/cpuidle", CPU_BASE)) {
            return read_cpuidle(sysfs);
        }
        if sysfs.exists(ACPI_PROCESSOR) {
            return read_acpi(sysfs);
        }
        log::debug!("no idle-state source found");
        Self::default()
    }

    fn record(&mut self, slot: usize, usage: u64, duration: u64) {
        self.usage[slot] += 1 + usage;
        self.duration[slot] += duration;
        self.max_cstate = self.max_cstate.max(slot + 1);
    }

    fn name(&self, slot: usize) -> String {
        self.names[slot]
            .clone()
            .unwrap_or_else(|| format!("C{}", slot + 1))
    }
}

/// Map a cpuidle `desc` string to a slot and display name.
fn classify_desc(desc: &str, running: usize) -> (usize, String) {
    if desc.contains("POLL IDLE") {
        return (0, "polling".to_string());
    }
    if desc.contains("ACPI HLT") {
        return (1, "C1 halt".to_string());
    }
    if let Some(pos) = desc.find("MWAIT ") {
        let hint = desc[pos + 6..].trim_start();
        let hint = hint.trim_start_matches("0x");
        let digits: String = hint.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
        if let Ok(value) = u64::from_str_radix(&digits, 16) {
            let slot = (value >> 4) as usize + 1;
            return (slot, format!("C{} mwait", slot));
        }
    }
    (running, format!("C{}", running))
}

fn state_number(entry: &str) -> Option<u32> {
    entry.strip_prefix("state")?.parse().ok()
}

fn read_cpuidle(sysfs: &SysfsRoot) -> IdleSnapshot {
    let mut snap = IdleSnapshot {
        timer_freq: CPUIDLE_TIMER_FREQ,
        ..Default::default()
    };
    let mut reference: [Option<String>; MAX_CSTATES] = Default::default();
    let mut first_cpu = true;

    for cpu in sysfs.cpu_dirs() {
        let base = format!("{}/{}/cpuidle", CPU_BASE, cpu);
        let mut states: Vec<(u32, String)> = match sysfs.list_dir(&base) {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|e| state_number(&e).map(|n| (n, e)))
                .collect(),
            Err(_) => continue,
        };
        states.sort_by_key(|(n, _)| *n);

        let mut local: [Option<String>; MAX_CSTATES] = Default::default();
        let mut slot = 0usize;
        for (_, state) in &states {
            let dir = format!("{}/{}", base, state);
            let mut name = None;
            if let Some(desc) = sysfs.read_first_line(format!("{}/desc", dir)) {
                let (s, n) = classify_desc(&desc, slot);
                slot = s;
                name = Some(n);
            }
            if slot >= MAX_CSTATES {
                log::debug!("{}: slot {} beyond {} idle states", dir, slot, MAX_CSTATES);
                break;
            }

            let (Some(usage), Some(time)) = (
                sysfs.read_u64(format!("{}/usage", dir)),
                sysfs.read_u64(format!("{}/time", dir)),
            ) else {
                continue;
            };
            // cpuidle durations also get the +1 so an idle-but-present
            // state is distinguishable from an absent one
            snap.record(slot, usage, 1 + time);
            if let Some(name) = name {
                local[slot] = Some(name);
            }
            slot += 1;
        }

        if first_cpu {
            reference = local;
            first_cpu = false;
            continue;
        }
        for (i, name) in local.into_iter().enumerate() {
            match (&reference[i], name) {
                (Some(a), Some(b)) if *a != b => {
                    log::debug!("{}: slot {} is '{}' but cpu0 says '{}'", cpu, i, b, a);
                    snap.consistent = false;
                }
                (None, Some(b)) => reference[i] = Some(b),
                _ => {}
            }
        }
    }

    snap.names = reference;
    snap
}

fn read_acpi(sysfs: &SysfsRoot) -> IdleSnapshot {
    let mut snap = IdleSnapshot {
        timer_freq: ACPI_TIMER_FREQ,
        ..Default::default()
    };

    for cpu in sysfs.list_dir(ACPI_PROCESSOR).unwrap_or_default() {
        if cpu.len() < 3 {
            continue;
        }
        let Some(power) = sysfs
            .read_optional(format!("{}/{}/power", ACPI_PROCESSOR, cpu))
            .unwrap_or(None)
        else {
            continue;
        };

        let mut slot = 0usize;
        for line in power.lines() {
            let Some(usage) = field_after(line, "age[") else {
                continue;
            };
            let Some(duration) = field_after(line, "ation[") else {
                continue;
            };
            if slot >= MAX_CSTATES {
                break;
            }
            snap.record(slot, usage, duration);
            slot += 1;
        }
    }

    snap
}

fn field_after(line: &str, marker: &str) -> Option<u64> {
    let pos = line.find(marker)?;
    parse_leading_u64(&line[pos + marker.len()..])
}

/// Which state held the CPUs for more than half the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TopState {
    Running,
    Slot(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdleStateLine {
    pub slot: usize,
    pub name: String,
    pub avg_residency_ms: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdleReport {
    pub c0_percent: f64,
    pub states: Vec<IdleStateLine>,
    pub top: Option<TopState>,
    /// Longest average residency of any state, in milliseconds.
    pub max_sleep_ms: f64,
    pub total_events: u64,
}

impl IdleReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            "Cn                Avg residency".to_string(),
            format!("C0 (cpu running)        ({:4.1}%)", self.c0_percent),
        ];
        for state in &self.states {
            lines.push(format!(
                "{:<16}{:>7.1}ms ({:4.1}%)",
                state.name, state.avg_residency_ms, state.percent
            ));
        }
        lines
    }

    /// Index into [`lines`](Self::lines) of the state that held the CPUs.
    pub fn top_line(&self) -> Option<usize> {
        match self.top? {
            TopState::Running => Some(1),
            TopState::Slot(slot) => self.states.iter().position(|s| s.slot == slot).map(|i| i + 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IdleSummary {
    /// Kernel gives no per-state data.
    NoDetail,
    /// Slots changed meaning; nothing is reported this interval.
    Inconsistent,
    Report(IdleReport),
}

impl IdleSummary {
    pub fn report(&self) -> Option<&IdleReport> {
        match self {
            IdleSummary::Report(r) => Some(r),
            _ => None,
        }
    }

    pub fn max_sleep_ms(&self) -> f64 {
        self.report().map(|r| r.max_sleep_ms).unwrap_or(0.0)
    }

    pub fn total_events(&self) -> u64 {
        self.report().map(|r| r.total_events).unwrap_or(0)
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            IdleSummary::NoDetail => {
                vec!["< Detailed C-state information is not available.>".to_string()]
            }
            IdleSummary::Inconsistent => {
                vec!["< C-state information changed during measurement.>".to_string()]
            }
            IdleSummary::Report(r) => r.lines(),
        }
    }
}

/// Residency over one interval from the `last` and `cur` snapshots.
pub fn summarize(
    last: &IdleSnapshot,
    cur: &IdleSnapshot,
    num_cpus: u32,
    interval_secs: f64,
) -> IdleSummary {
    if !last.consistent || !cur.consistent {
        return IdleSummary::Inconsistent;
    }

    let mut total_ticks: u64 = 0;
    let mut total_events: u64 = 0;
    for i in 0..MAX_CSTATES {
        let present = (last.usage[i] > 0, cur.usage[i] > 0);
        match present {
            (false, false) => continue,
            (true, true) => {}
            _ => {
                log::debug!("idle slot {} appeared or vanished", i);
                return IdleSummary::Inconsistent;
            }
        }
        let renamed = matches!((&last.names[i], &cur.names[i]), (Some(a), Some(b)) if a != b);
        if renamed || cur.usage[i] < last.usage[i] || cur.duration[i] < last.duration[i] {
            log::debug!("idle slot {} changed identity between snapshots", i);
            return IdleSummary::Inconsistent;
        }
        total_ticks += cur.duration[i] - last.duration[i];
        total_events += cur.usage[i] - last.usage[i];
    }

    let budget = num_cpus.max(1) as f64 * interval_secs * 1000.0 * cur.timer_freq;
    if (total_events == 0 && cur.max_cstate <= 1) || budget <= 0.0 {
        return IdleSummary::NoDetail;
    }

    // rounding in the kernel counters can push C0 slightly negative
    let c0 = (budget - total_ticks as f64).max(0.0);
    let c0_percent = c0 * 100.0 / budget;

    let mut best = (c0_percent > DOMINANT_PERCENT).then_some((TopState::Running, c0_percent));
    let mut states = Vec::new();
    let mut max_sleep_ms: f64 = 0.0;
    for i in 0..MAX_CSTATES {
        if cur.usage[i] == 0 {
            continue;
        }
        let d_duration = (cur.duration[i] - last.duration[i]) as f64;
        let d_usage = (cur.usage[i] - last.usage[i]) as f64;
        let avg_residency_ms = d_duration / (d_usage + 0.1) / cur.timer_freq;
        let percent = d_duration * 100.0 / budget;

        max_sleep_ms = max_sleep_ms.max(avg_residency_ms);
        if percent > DOMINANT_PERCENT && best.is_none_or(|(_, p)| percent > p) {
            best = Some((TopState::Slot(i), percent));
        }
        states.push(IdleStateLine {
            slot: i,
            name: cur.name(i),
            avg_residency_ms,
            percent,
        });
    }

    IdleSummary::Report(IdleReport {
        c0_percent,
        states,
        top: best.map(|(t, _)| t),
        max_sleep_ms,
        total_events,
    })
}
