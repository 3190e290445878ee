//! The measurement loop.
//!
//! A [`Session`] owns every per-interval buffer: the wakeup samples, the
//! suggestion registry, the selection memory and the cumulative-counter
//! trackers. One call to [`Session::run_interval`] takes the session through
//! `Sampling → Aggregating → Selecting → Displaying` and back to `Idle`.

use crate::battery::{BatteryReading, BatteryTracker, PowerEstimate};
use crate::config::{IntervalConfig, PowertopConfig};
use crate::cpufreq::{CpuFreqTracker, FreqReport, FreqSample};
use crate::cstate::{self, IdleSnapshot, IdleSummary};
use crate::display::Display;
use crate::error::Result;
use crate::input::{Key, KeySource};
use crate::irq::{IrqTotals, IrqTracker};
use crate::probes::{self, Probe, ProbeContext, SystemTools, ToolOutput};
use crate::samples::{SampleStore, WakeupLine};
use crate::suggest::{Registry, SelectionMemory, Selector, SuggestionSummary};
use crate::sysfs::SysfsRoot;
use crate::timer_stats::TimerStats;
use crate::usb::{UsbActivity, UsbTracker};
use serde::Serialize;
use std::time::{Duration, Instant};

const EXTRA_TIMER_LABEL: &str = "    <interrupt> : extra timer interrupt";

/// Interval after `R`.
const REFRESH_SECS: f64 = 3.0;
/// Interval after a suggestion was activated.
const ACTIVATED_SECS: f64 = 2.0;
/// Quiet time after drawing so terminal output does not show up as wakeups.
const SETTLE_SECS: f64 = 3.0;
const SETTLE_MIN_INTERVAL: f64 = 4.8;
/// Bounds for configured and `--time` intervals.
const MIN_INTERVAL_SECS: f64 = 0.1;
const MAX_INTERVAL_SECS: f64 = 3600.0;

/// Everything the display needs for one interval.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalReport {
    pub timestamp: String,
    /// Measured length of the interval.
    pub interval_secs: f64,
    pub num_cpus: u32,
    pub idle: IdleSummary,
    pub frequencies: Option<FreqReport>,
    pub wakeups_per_sec: Option<f64>,
    pub wakeups: Vec<WakeupLine>,
    pub power: PowerEstimate,
    /// `/proc/timer_stats` could be used this interval.
    pub timer_stats: bool,
    #[serde(skip)]
    pub show_pids: bool,
    pub usb: Vec<UsbActivity>,
    pub suggestions: Vec<SuggestionSummary>,
}

impl IntervalReport {
    pub fn wakeup_total(&self) -> u64 {
        self.wakeups.iter().map(|l| l.count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Aggregating,
    Selecting,
    Displaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Next interval length from the longest average idle residency.
/// Deep sleepers get long intervals so the percentages have enough events.
pub fn next_interval(max_sleep_ms: f64) -> f64 {
    if max_sleep_ms < 5.0 {
        10.0
    } else if max_sleep_ms < 30.0 {
        15.0
    } else if max_sleep_ms < 100.0 {
        20.0
    } else if max_sleep_ms < 400.0 {
        30.0
    } else {
        45.0
    }
}

/// Wakeup count for the interval. Without idle-state data the timer_stats
/// `total events` figure plus device interrupts stands in.
fn wakeup_events(idle_events: u64, timer_total: Option<u64>, irq: IrqTotals, num_cpus: u32) -> u64 {
    let Some(total) = timer_total else {
        return idle_events;
    };
    if idle_events > 0 {
        return idle_events;
    }
    let ncpus = u64::from(num_cpus.max(1));
    let per_cpu = total / ncpus;
    let mut events = per_cpu * ncpus + irq.total;
    if per_cpu < irq.interrupt_0 {
        events += irq.interrupt_0 - per_cpu;
    }
    events
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub interval_secs: f64,
    pub selector: Selector,
    pub show_pids: bool,
    pub disabled_probes: Vec<String>,
}

impl SessionOptions {
    /// Interactive settings, or dump settings when `dump` is set.
    /// `time` overrides the configured dump interval.
    pub fn from_config(config: &PowertopConfig, dump: bool, time: Option<f64>) -> Self {
        let interval_secs = if dump {
            time.unwrap_or(config.interval.dump_secs)
        } else {
            config.interval.interactive_secs
        };
        let interval_secs = if interval_secs.is_finite() {
            interval_secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS)
        } else {
            log::warn!("ignoring non-finite interval {}", interval_secs);
            let defaults = IntervalConfig::default();
            if dump {
                defaults.dump_secs
            } else {
                defaults.interactive_secs
            }
        };
        Self {
            interval_secs,
            selector: config.selection.selector(),
            show_pids: config.display.show_pids,
            disabled_probes: config.probes.disabled.clone(),
        }
    }
}

pub struct Session {
    sysfs: SysfsRoot,
    samples: SampleStore,
    registry: Registry,
    selector: Selector,
    memory: SelectionMemory,
    irq: IrqTracker,
    timer_stats: TimerStats,
    cpufreq: CpuFreqTracker,
    usb: UsbTracker,
    battery: BatteryTracker,
    baseline: IdleSnapshot,
    probes: Vec<Box<dyn Probe>>,
    tools: Box<dyn ToolOutput>,
    num_cpus: u32,
    interval: f64,
    show_pids: bool,
    phase: Phase,
    pending_key: Option<Key>,
}

impl Session {
    pub fn new(sysfs: SysfsRoot, options: SessionOptions) -> Self {
        let num_cpus = sysfs.num_cpus();
        Self {
            sysfs,
            samples: SampleStore::new(),
            registry: Registry::new(),
            selector: options.selector,
            memory: SelectionMemory::default(),
            irq: IrqTracker::new(),
            timer_stats: TimerStats::new(),
            cpufreq: CpuFreqTracker::new(),
            usb: UsbTracker::new(),
            battery: BatteryTracker::new(),
            baseline: IdleSnapshot::default(),
            probes: probes::enabled_probes(&options.disabled_probes),
            tools: Box::new(SystemTools),
            num_cpus,
            interval: options.interval_secs,
            show_pids: options.show_pids,
            phase: Phase::Idle,
            pending_key: None,
        }
    }

    /// Replace the helper-program runner used by the probes.
    pub fn with_tools(mut self, tools: Box<dyn ToolOutput>) -> Self {
        self.tools = tools;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval
    }

    pub fn show_pids(&self) -> bool {
        self.show_pids
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn memory(&self) -> &SelectionMemory {
        &self.memory
    }

    /// Take the first readings so the first interval reports deltas.
    pub fn prime(&mut self) {
        self.baseline = IdleSnapshot::read(&self.sysfs);
        self.irq.refresh(&self.sysfs);
        self.cpufreq.update(FreqSample::read(&self.sysfs));
        self.usb.scan(&self.sysfs, &mut self.samples);
        self.samples.clear();
        self.timer_stats.stop(&self.sysfs);
        log::debug!(
            "primed: {} cpus, {} USB devices, max C-state {}",
            self.num_cpus,
            self.usb.devices().len(),
            self.baseline.max_cstate
        );
    }

    /// Start counting wakeups for a new interval.
    pub fn begin_interval(&mut self) {
        self.phase = Phase::Sampling;
        self.irq.refresh(&self.sysfs);
        self.timer_stats.start(&self.sysfs);
    }

    /// Stop the timer_stats collection started by `begin_interval`.
    pub fn end_sampling(&mut self) {
        self.timer_stats.stop(&self.sysfs);
    }

    /// Read every source and turn the counters into an interval report.
    /// `elapsed_secs` is the measured, not the requested, interval length.
    pub fn collect(&mut self, elapsed_secs: f64) -> IntervalReport {
        self.phase = Phase::Aggregating;
        self.samples.clear();

        let irq = self.irq.collect(&self.sysfs, &mut self.samples);
        let current = IdleSnapshot::read(&self.sysfs);
        let idle = cstate::summarize(&self.baseline, &current, self.num_cpus, elapsed_secs);
        let frequencies = self.cpufreq.update(FreqSample::read(&self.sysfs));

        let timer_total = self.timer_stats.collect(&self.sysfs, &mut self.samples);
        if let Some(total) = timer_total {
            let per_cpu = total / u64::from(self.num_cpus.max(1));
            if per_cpu > 0 && per_cpu < irq.interrupt_0 {
                self.samples
                    .add_occurrence(EXTRA_TIMER_LABEL, irq.interrupt_0 - per_cpu, None);
            }
        }
        let events = wakeup_events(idle.total_events(), timer_total, irq, self.num_cpus);
        let wakeups_per_sec = (events > 0 && elapsed_secs > 0.0)
            .then(|| events as f64 / elapsed_secs / f64::from(self.num_cpus.max(1)));

        self.usb.scan(&self.sysfs, &mut self.samples);

        let now = chrono::Local::now();
        let power = self
            .battery
            .update(&BatteryReading::read(&self.sysfs), now.timestamp());

        self.memory.elapse(elapsed_secs);

        IntervalReport {
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            interval_secs: elapsed_secs,
            num_cpus: self.num_cpus,
            idle,
            frequencies,
            wakeups_per_sec,
            wakeups: self.samples.sorted_descending().cloned().collect(),
            power,
            timer_stats: self.timer_stats.available(),
            show_pids: self.show_pids,
            usb: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Act on a keypress. Runs before the registry is rebuilt, so the
    /// hotkey armed last interval is still live.
    pub fn handle_key(&mut self, key: Key) -> Flow {
        let Key::Char(c) = key else {
            return Flow::Quit;
        };
        match c.to_ascii_uppercase() {
            'Q' => return Flow::Quit,
            'R' => self.interval = REFRESH_SECS,
            _ if self.registry.activate(c) => {
                self.interval = ACTIVATED_SECS;
                self.memory.release();
            }
            'P' => self.show_pids = !self.show_pids,
            _ => log::debug!("ignoring key {:?}", c),
        }
        Flow::Continue
    }

    /// Rebuild the registry from every enabled probe.
    pub fn suggest(&mut self, max_sleep_ms: f64) {
        self.phase = Phase::Selecting;
        self.registry.reset();
        let ctx = ProbeContext {
            sysfs: &self.sysfs,
            samples: &self.samples,
            usb: &self.usb,
            tools: self.tools.as_ref(),
            max_sleep_ms,
            num_cpus: self.num_cpus,
        };
        probes::run_all(&self.probes, &ctx, &mut self.registry);
    }

    /// Weighted-random pick; arms the chosen suggestion's hotkey.
    pub fn select(&mut self) -> Option<&str> {
        let index = self
            .selector
            .pick_random(&mut self.registry, &mut self.memory, &mut rand::rng())?;
        self.registry.get(index).map(|s| s.text.as_str())
    }

    /// Status bar labels: the fixed keys plus the armed suggestion's.
    pub fn status_labels(&self) -> Vec<String> {
        let mut labels = vec![" Q - Quit ".to_string(), " R - Refresh ".to_string()];
        if let Some(label) = self.registry.armed_label() {
            labels.push(label.to_string());
        }
        labels
    }

    /// Re-read idle states as the baseline of the next interval.
    pub fn finish_interval(&mut self) {
        self.baseline = IdleSnapshot::read(&self.sysfs);
        self.phase = Phase::Idle;
    }

    /// One interactive interval.
    pub fn run_interval(
        &mut self,
        keys: &mut dyn KeySource,
        display: &mut dyn Display,
    ) -> Result<Flow> {
        // a key that arrived while the last interval settled
        if let Some(key) = self.pending_key.take()
            && self.handle_key(key) == Flow::Quit
        {
            return Ok(Flow::Quit);
        }

        self.begin_interval();
        let started = Instant::now();
        let key = keys.wait(Duration::from_secs_f64(self.interval))?;
        self.end_sampling();
        let mut report = self.collect(started.elapsed().as_secs_f64());
        let max_sleep_ms = report.idle.max_sleep_ms();
        self.interval = next_interval(max_sleep_ms);

        if let Some(key) = key
            && self.handle_key(key) == Flow::Quit
        {
            return Ok(Flow::Quit);
        }

        self.suggest(max_sleep_ms);

        self.phase = Phase::Displaying;
        report.show_pids = self.show_pids;
        display.show_report(&report)?;
        let picked = if key.is_none() { self.select() } else { None };
        display.show_suggestion(picked)?;
        display.show_status_bar(&self.status_labels())?;

        if key.is_none() && self.interval >= SETTLE_MIN_INTERVAL {
            self.pending_key = keys.wait(Duration::from_secs_f64(SETTLE_SECS))?;
        }

        self.finish_interval();
        Ok(Flow::Continue)
    }

    /// Interactive loop until `Q` or end of input.
    pub fn run(&mut self, keys: &mut dyn KeySource, display: &mut dyn Display) -> Result<()> {
        self.prime();
        while self.run_interval(keys, display)? == Flow::Continue {}
        Ok(())
    }

    /// Dump mode: a single interval with every suggestion and the USB
    /// activity table in the report.
    pub fn dump(&mut self, keys: &mut dyn KeySource) -> Result<IntervalReport> {
        self.prime();
        self.begin_interval();
        let started = Instant::now();
        keys.wait(Duration::from_secs_f64(self.interval))?;
        self.end_sampling();
        let mut report = self.collect(started.elapsed().as_secs_f64());

        self.suggest(report.idle.max_sleep_ms());
        report.suggestions = self.registry.summaries();
        report.usb = self.usb.activity();
        self.phase = Phase::Idle;
        Ok(report)
    }
}
