use super::{Probe, ProbeContext};
use crate::suggest::{Batch, Registry, Suggestion, SysfsWrite};

const CPU_BASE: &str = "sys/devices/system/cpu";
const SCHED_MC: &str = "sys/devices/system/cpu/sched_mc_power_savings";

/// Governors that already scale the clock down when idle.
const POWER_AWARE: [&str; 4] = ["ondemand", "conservative", "schedutil", "powersave"];

/// Preferred replacements, best first.
const TARGETS: [&str; 3] = ["ondemand", "schedutil", "conservative"];

/// A CPU pinned to a fixed-speed governor (`performance`, `userspace`).
pub struct OndemandGovernor;

impl Probe for OndemandGovernor {
    fn name(&self) -> &'static str {
        "ondemand-governor"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let mut paths = Vec::new();
        let mut fixed = false;
        for cpu in ctx.sysfs.cpu_dirs() {
            let path = format!("{}/{}/cpufreq/scaling_governor", CPU_BASE, cpu);
            let Some(governor) = ctx.sysfs.read_first_line(&path) else {
                continue;
            };
            if !POWER_AWARE.contains(&governor.as_str()) {
                fixed = true;
            }
            paths.push(path);
        }
        if !fixed {
            return;
        }

        let available = ctx
            .sysfs
            .read_first_line(format!("{}/cpu0/cpufreq/scaling_available_governors", CPU_BASE))
            .unwrap_or_default();
        let Some(target) = TARGETS
            .iter()
            .find(|t| available.split_whitespace().any(|a| a == **t))
        else {
            return;
        };

        let text = format!(
            "Suggestion: Enable the {} cpu speed governor for all processors via: \n \
             echo {} > /sys/devices/system/cpu/cpu0/cpufreq/scaling_governor \n",
            target, target
        );
        let writes: Vec<SysfsWrite> = paths
            .iter()
            .map(|p| SysfsWrite::new(ctx.sysfs, p.as_str(), *target))
            .collect();
        registry.add(Suggestion::new(text, 15).hotkey(
            'O',
            " O - enable Ondemand governor ",
            Batch(writes),
        ));
    }
}

/// Multi-package machines with the power-aware scheduler switched off.
pub struct PowerScheduler;

impl Probe for PowerScheduler {
    fn name(&self) -> &'static str {
        "power-scheduler"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let Some(value) = ctx.sysfs.read_first_line(SCHED_MC) else {
            return;
        };
        if !value.starts_with('0') || ctx.num_cpus < 2 {
            return;
        }
        let Some(cpuinfo) = ctx.sysfs.read_optional("proc/cpuinfo").unwrap_or(None) else {
            return;
        };
        // one package holding every CPU gains nothing from package packing
        let single_package = cpuinfo
            .lines()
            .filter(|l| l.starts_with("cpu cores"))
            .filter_map(|l| l.split_once(':'))
            .filter_map(|(_, v)| v.trim().parse::<u32>().ok())
            .any(|cores| cores >= ctx.num_cpus);
        if single_package {
            return;
        }

        registry.add(
            Suggestion::new(
                "Suggestion: enable the power aware CPU scheduler with the following command:\n  \
                 echo 1 > /sys/devices/system/cpu/sched_mc_power_savings\n\
                 or by pressing the C key.",
                5,
            )
            .hotkey(
                'C',
                " C - Power aware CPU scheduler ",
                SysfsWrite::new(ctx.sysfs, SCHED_MC, "1"),
            ),
        );
    }
}
