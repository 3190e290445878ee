use super::{Probe, ProbeContext};
use crate::suggest::{Registry, Suggestion, SysfsWrite};

const CLOCKSOURCES: &str = "sys/devices/system/clocksource/clocksource0/available_clocksource";
const AC97_POWER_SAVE: &str = "sys/module/snd_ac97_codec/parameters/power_save";
const HDA_POWER_SAVE: &str = "sys/module/snd_hda_intel/parameters/power_save";

/// Only worth mentioning once the CPU actually sleeps long enough for the
/// periodic timer to matter.
const HPET_MIN_SLEEP_MS: f64 = 15.0;

pub struct Hpet;

impl Probe for Hpet {
    fn name(&self) -> &'static str {
        "hpet"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        if ctx.max_sleep_ms <= HPET_MIN_SLEEP_MS {
            return;
        }
        let Some(sources) = ctx.sysfs.read_first_line(CLOCKSOURCES) else {
            return;
        };
        if sources.contains("hpet") {
            return;
        }
        registry.add_text(
            "Suggestion: enable the HPET (Multimedia Timer) in your BIOS or add \n\
             the kernel patch to force-enable HPET. HPET support allows Linux to \n\
             have much longer sleep intervals.",
            7,
        );
    }
}

/// Sound codec power saving, AC97 or HD audio.
pub struct AudioPowerSave;

impl Probe for AudioPowerSave {
    fn name(&self) -> &'static str {
        "audio-power-save"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        if let Some(value) = ctx.sysfs.read_first_line(AC97_POWER_SAVE)
            && value.starts_with('N')
        {
            registry.add(
                Suggestion::new(
                    "Suggestion: enable AC97 powersave mode by executing the following command:\n   \
                     echo 1 > /sys/module/snd_ac97_codec/parameters/power_save \n\
                     or by passing power_save=1 as module parameter.",
                    25,
                )
                .hotkey(
                    'A',
                    " A - Turn AC97 powersave on ",
                    SysfsWrite::new(ctx.sysfs, AC97_POWER_SAVE, "1"),
                ),
            );
        }

        if let Some(value) = ctx.sysfs.read_first_line(HDA_POWER_SAVE)
            && value == "0"
        {
            registry.add(
                Suggestion::new(
                    "Suggestion: enable HD audio powersave mode by executing the following command:\n   \
                     echo 1 > /sys/module/snd_hda_intel/parameters/power_save \n\
                     or by passing power_save=1 as module parameter.",
                    25,
                )
                .hotkey(
                    'A',
                    " A - Turn HD audio powersave on ",
                    SysfsWrite::new(ctx.sysfs, HDA_POWER_SAVE, "1"),
                ),
            );
        }
    }
}
