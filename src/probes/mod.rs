//! Probes look at the system after each interval and may add suggestions.
//!
//! Each probe is independent: it reads whatever it needs from the context,
//! adds zero or more suggestions, and never fails. Read errors mean "nothing
//! to suggest".

pub mod cpu;
pub mod devices;
pub mod kernel_config;
pub mod network;
pub mod process;
pub mod storage;
pub mod sysctl;
pub mod usb;

use crate::samples::SampleStore;
use crate::suggest::Registry;
use crate::sysfs::SysfsRoot;
use crate::usb::UsbTracker;
use std::process::Command;

/// Runs helper programs (`iw`, `ethtool`) and hands back their stdout.
pub trait ToolOutput {
    /// `None` when the program could not be started.
    fn output(&self, program: &str, args: &[&str]) -> Option<String>;
}

/// Runs the real binaries from `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTools;

impl ToolOutput for SystemTools {
    fn output(&self, program: &str, args: &[&str]) -> Option<String> {
        match Command::new(program).args(args).output() {
            Ok(out) => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
            Err(e) => {
                log::debug!("{} not runnable: {}", program, e);
                None
            }
        }
    }
}

/// What the probes get to look at for one interval.
pub struct ProbeContext<'a> {
    pub sysfs: &'a SysfsRoot,
    pub samples: &'a SampleStore,
    pub usb: &'a UsbTracker,
    pub tools: &'a dyn ToolOutput,
    /// Longest average idle residency this interval, in milliseconds.
    pub max_sleep_ms: f64,
    pub num_cpus: u32,
}

pub trait Probe {
    /// Short name used in the `[probes] disabled` config list.
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry);
}

/// Every probe, in the order they add to the registry.
pub fn all_probes() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(kernel_config::KernelConfig),
        Box::new(process::ProcessDeath),
        Box::new(sysctl::NmiWatchdog),
        Box::new(sysctl::LaptopMode),
        Box::new(devices::Hpet),
        Box::new(devices::AudioPowerSave),
        Box::new(network::WirelessPowerSave),
        Box::new(cpu::OndemandGovernor),
        Box::new(storage::NoAtime),
        Box::new(storage::SataAlpm),
        Box::new(cpu::PowerScheduler),
        Box::new(network::WakeOnLan),
        Box::new(sysctl::WritebackTime),
        Box::new(usb::Autosuspend),
        Box::new(usb::ActivityHint),
    ]
}

/// The probes not named in `disabled`.
pub fn enabled_probes(disabled: &[String]) -> Vec<Box<dyn Probe>> {
    all_probes()
        .into_iter()
        .filter(|p| {
            let off = disabled.iter().any(|d| d == p.name());
            if off {
                log::debug!("probe {} disabled by config", p.name());
            }
            !off
        })
        .collect()
}

pub fn run_all(probes: &[Box<dyn Probe>], ctx: &ProbeContext<'_>, registry: &mut Registry) {
    for probe in probes {
        let before = registry.len();
        probe.run(ctx, registry);
        if registry.len() > before {
            log::debug!("probe {} added {} suggestion(s)", probe.name(), registry.len() - before);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_names_are_unique() {
        let probes = all_probes();
        let mut names: Vec<&str> = probes.iter().map(|p| p.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), probes.len());
    }

    #[test]
    fn test_disabled_probes_are_skipped() {
        let disabled = vec!["nmi-watchdog".to_string(), "usb-activity".to_string()];
        let probes = enabled_probes(&disabled);
        assert_eq!(probes.len(), all_probes().len() - 2);
        assert!(probes.iter().all(|p| p.name() != "nmi-watchdog"));
    }

    #[test]
    fn test_empty_tree_suggests_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        let samples = SampleStore::new();
        let usb = UsbTracker::new();
        let tools = testutil::FakeTools::default();
        let ctx = ProbeContext {
            sysfs: &sysfs,
            samples: &samples,
            usb: &usb,
            tools: &tools,
            max_sleep_ms: 100.0,
            num_cpus: 1,
        };
        let mut registry = Registry::new();
        run_all(&all_probes(), &ctx, &mut registry);
        assert!(registry.is_empty(), "{:?}", registry.print_all().collect::<Vec<_>>());
    }
}
