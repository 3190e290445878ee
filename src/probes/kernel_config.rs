//! Kernel build options that matter for idle power.
//!
//! The running kernel's config comes from `/proc/config.gz` when the kernel
//! exports it, otherwise from `/boot/config-<release>`.

use super::{Probe, ProbeContext};
use crate::suggest::Registry;
use crate::sysfs::SysfsRoot;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;

const AC97_MODULE: &str = "sys/module/snd_ac97_codec";
const AC97_POWER_SAVE: &str = "sys/module/snd_ac97_codec/parameters/power_save";

/// `CONFIG_*` name to value (`y`, `m`, a number or a string).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KernelConfigMap {
    options: HashMap<String, String>,
}

impl KernelConfigMap {
    pub fn parse(content: &str) -> Self {
        let options = content
            .lines()
            .filter(|l| l.starts_with("CONFIG_"))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_string(), v.trim().to_string()))
            .collect();
        Self { options }
    }

    /// Load the config of the running kernel, if any copy is readable.
    pub fn load(sysfs: &SysfsRoot) -> Option<Self> {
        if let Some(content) = read_gz(sysfs) {
            return Some(Self::parse(&content));
        }
        let release = sysfs.read_first_line("proc/sys/kernel/osrelease")?;
        let content = sysfs
            .read_optional(format!("boot/config-{}", release))
            .unwrap_or(None)?;
        Some(Self::parse(&content))
    }

    /// Built in or built as a module.
    pub fn enabled(&self, option: &str) -> bool {
        self.options
            .get(option)
            .is_some_and(|v| v == "y" || v == "m")
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

fn read_gz(sysfs: &SysfsRoot) -> Option<String> {
    let path = sysfs.path("proc/config.gz");
    let file = std::fs::File::open(&path).ok()?;
    let mut decoder = GzDecoder::new(file);
    let mut content = String::new();
    match decoder.read_to_string(&mut content) {
        Ok(_) => Some(content),
        Err(e) => {
            log::debug!("{} unreadable: {}", path.display(), e);
            None
        }
    }
}

struct Rule {
    option: &'static str,
    want: bool,
    text: &'static str,
    weight: u32,
}

const RULES: &[Rule] = &[
    Rule {
        option: "CONFIG_USB_SUSPEND",
        want: true,
        text: "Suggestion: Enable the CONFIG_USB_SUSPEND kernel configuration option.\n\
               This option will automatically disable UHCI USB when not in use, and may\n\
               save approximately 1 Watt of power.",
        weight: 20,
    },
    Rule {
        option: "CONFIG_CPU_FREQ_GOV_ONDEMAND",
        want: true,
        text: "Suggestion: Enable the CONFIG_CPU_FREQ_GOV_ONDEMAND kernel configuration option.\n\
               The 'ondemand' CPU speed governor will minimize the CPU power usage while\n\
               giving you performance when it is needed.",
        weight: 5,
    },
    Rule {
        option: "CONFIG_NO_HZ",
        want: true,
        text: "Suggestion: Enable the CONFIG_NO_HZ kernel configuration option.\n\
               This option is required to get any kind of longer sleep times in the CPU.",
        weight: 50,
    },
    Rule {
        option: "CONFIG_ACPI_BATTERY",
        want: true,
        text: "Suggestion: Enable the CONFIG_ACPI_BATTERY kernel configuration option.\n \
               This option is required to get power estimates from PowerTOP",
        weight: 5,
    },
    Rule {
        option: "CONFIG_HPET_TIMER",
        want: true,
        text: "Suggestion: Enable the CONFIG_HPET_TIMER kernel configuration option.\n\
               Without HPET support the kernel needs to wake up every 20 milliseconds for \n\
               some housekeeping tasks.",
        weight: 10,
    },
    Rule {
        option: "CONFIG_SND_AC97_POWER_SAVE",
        want: true,
        text: "Suggestion: Enable the CONFIG_SND_AC97_POWER_SAVE kernel configuration option.\n\
               This option will automatically power down your sound codec when not in use,\n\
               and can save approximately half a Watt of power.",
        weight: 20,
    },
    Rule {
        option: "CONFIG_IRQBALANCE",
        want: false,
        text: "Suggestion: Disable the CONFIG_IRQBALANCE kernel configuration option.\n\
               The in-kernel irq balancer is obsolete and wakes the CPU up far more than needed.",
        weight: 3,
    },
    Rule {
        option: "CONFIG_CPU_FREQ_STAT",
        want: true,
        text: "Suggestion: Enable the CONFIG_CPU_FREQ_STAT kernel configuration option.\n\
               This option allows PowerTOP to show P-state percentages \n\
               P-states correspond to CPU frequencies.",
        weight: 2,
    },
    Rule {
        option: "CONFIG_INOTIFY",
        want: true,
        text: "Suggestion: Enable the CONFIG_INOTIFY kernel configuration option.\n\
               This option allows programs to wait for changes in files and directories\n\
               instead of having to poll for these changes",
        weight: 5,
    },
];

pub struct KernelConfig;

impl KernelConfig {
    fn applies(rule: &Rule, sysfs: &SysfsRoot) -> bool {
        // only relevant when the AC97 codec is loaded without the knob
        if rule.option == "CONFIG_SND_AC97_POWER_SAVE" {
            return sysfs.exists(AC97_MODULE) && !sysfs.exists(AC97_POWER_SAVE);
        }
        true
    }
}

impl Probe for KernelConfig {
    fn name(&self) -> &'static str {
        "kernel-config"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let Some(config) = KernelConfigMap::load(ctx.sysfs) else {
            log::debug!("kernel config not available");
            return;
        };
        for rule in RULES {
            if Self::applies(rule, ctx.sysfs) && config.enabled(rule.option) != rule.want {
                registry.add_text(rule.text, rule.weight);
            }
        }
    }
}
