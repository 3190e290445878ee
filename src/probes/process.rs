use super::{Probe, ProbeContext};
use crate::suggest::{Registry, RunCommand, Suggestion};

/// A daemon known to wake the machine far more than it needs to.
struct Offender {
    /// Substring of the wakeup label (timer_stats truncates names to 15
    /// characters).
    pattern: &'static str,
    /// Name handed to `killall`.
    process: &'static str,
    /// Only look this far down the ranked wakeup list.
    top: usize,
    /// Wakeups in the interval needed before complaining.
    min_wakeups: u64,
    text: &'static str,
    weight: u32,
}

const BEAGLE_TEXT: &str = "Suggestion: Disable or remove 'beagle' from your system. \n\
    Beagle is the program that indexes for easy desktop search, however it's \n\
    not very efficient and costs a significant amount of battery life.";

const OFFENDERS: &[Offender] = &[
    Offender {
        pattern: "beagled : schedule_timeout",
        process: "beagled",
        top: 20,
        min_wakeups: 10,
        text: BEAGLE_TEXT,
        weight: 30,
    },
    Offender {
        pattern: "beagled : futex_wait (hrtimer_wakeup)",
        process: "beagled",
        top: 20,
        min_wakeups: 10,
        text: BEAGLE_TEXT,
        weight: 30,
    },
    Offender {
        pattern: "gnome-power-man : schedule_timeout (process_timeout)",
        process: "gnome-power-manager",
        top: 10,
        min_wakeups: 10,
        text: "Suggestion: Disable or remove 'gnome-power-manager' from your system. \n\
               Older versions of gnome-power-manager wake up far more often than \n\
               needed costing you some power.",
        weight: 5,
    },
    Offender {
        pattern: "pcscd : ",
        process: "pcscd",
        top: 50,
        min_wakeups: 1,
        text: "Suggestion: Disable or remove 'pcscd' from your system. \n\
               pcscd tends to keep the USB subsystem out of power save mode\n\
               and your processor out of deeper powersave states.",
        weight: 30,
    },
    Offender {
        pattern: "hald-addon-stor : ",
        process: "hald-addon-storage",
        top: 50,
        min_wakeups: 2,
        text: "Suggestion: Disable 'hal' from polling your cdrom with:  \n\
               hal-disable-polling --device /dev/cdrom 'hal' is the component that auto-opens a\n\
               window if you plug in a CD but disables SATA power saving from kicking in.",
        weight: 30,
    },
    Offender {
        pattern: "/usr/bin/sealer : schedule_timeout (process_timeout)",
        process: "sealert",
        top: 20,
        min_wakeups: 20,
        text: "Disable the SE-Alert software by removing the 'setroubleshoot-server' rpm\n\
               SE-Alert alerts you about SELinux policy violations, but also\n\
               has a bug that wakes it up 10 times per second.",
        weight: 20,
    },
];

/// Offer to kill well-known wakeup offenders that rank high this interval.
pub struct ProcessDeath;

impl Probe for ProcessDeath {
    fn name(&self) -> &'static str {
        "process-death"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        for offender in OFFENDERS {
            let hits = ctx
                .samples
                .top(offender.top)
                .filter(|l| l.label.contains(offender.pattern) && l.count >= offender.min_wakeups)
                .count();
            for _ in 0..hits {
                registry.add(Suggestion::new(offender.text, offender.weight).hotkey(
                    'K',
                    format!(" K - kill {} ", offender.process),
                    RunCommand::new("killall", [offender.process]),
                ));
            }
        }
    }
}
