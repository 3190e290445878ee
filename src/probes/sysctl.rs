use super::{Probe, ProbeContext};
use crate::battery;
use crate::suggest::{Registry, Suggestion, SysfsWrite};
use crate::sysfs::parse_leading_u64;

const LAPTOP_MODE: &str = "proc/sys/vm/laptop_mode";
const NMI_WATCHDOG: &str = "proc/sys/kernel/nmi_watchdog";
const WRITEBACK: &str = "proc/sys/vm/dirty_writeback_centisecs";

/// Laptop mode batches disk writes. Only suggested on battery: many
/// distributions switch it off again on AC, which would make the hint
/// keep coming back.
pub struct LaptopMode;

impl Probe for LaptopMode {
    fn name(&self) -> &'static str {
        "laptop-mode"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        if battery::on_ac(ctx.sysfs) != Some(false) {
            return;
        }
        let Some(mode) = ctx.sysfs.read_u64(LAPTOP_MODE) else {
            return;
        };
        if mode >= 1 {
            return;
        }
        registry.add(
            Suggestion::new(
                "Suggestion: Enable laptop-mode by executing the following command:\n   \
                 echo 5 > /proc/sys/vm/laptop_mode \n",
                15,
            )
            .hotkey(
                'L',
                " L - enable Laptop mode ",
                SysfsWrite::new(ctx.sysfs, LAPTOP_MODE, "5\n"),
            ),
        );
    }
}

pub struct NmiWatchdog;

impl Probe for NmiWatchdog {
    fn name(&self) -> &'static str {
        "nmi-watchdog"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        if ctx.sysfs.read_u64(NMI_WATCHDOG).is_none_or(|v| v == 0) {
            return;
        }
        registry.add(
            Suggestion::new(
                "Suggestion: disable the NMI watchdog by executing the following command:\n   \
                 echo 0 > /proc/sys/kernel/nmi_watchdog \n\
                 The NMI watchdog is a kernel debug mechanism to detect deadlocks",
                25,
            )
            .hotkey(
                'N',
                " N - Turn NMI watchdog off ",
                SysfsWrite::new(ctx.sysfs, NMI_WATCHDOG, "0\n"),
            ),
        );
    }
}

/// Dirty page writeback more often than every 14 seconds.
pub struct WritebackTime;

impl Probe for WritebackTime {
    fn name(&self) -> &'static str {
        "writeback"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let Some(line) = ctx.sysfs.read_first_line(WRITEBACK) else {
            return;
        };
        // an unparsable value counts as zero, which is below the threshold
        let centisecs = parse_leading_u64(&line).unwrap_or(0);
        if centisecs >= 1400 {
            return;
        }
        let text = format!(
            "Suggestion: increase the VM dirty writeback time from {:1.2} to 15 seconds with:\n  \
             echo 1500 > /proc/sys/vm/dirty_writeback_centisecs \n\
             This wakes the disk up less frequently for background VM activity",
            centisecs as f64 / 100.0
        );
        registry.add(Suggestion::new(text, 15).hotkey(
            'W',
            " W - Increase Writeback time ",
            SysfsWrite::new(ctx.sysfs, WRITEBACK, "1500"),
        ));
    }
}
