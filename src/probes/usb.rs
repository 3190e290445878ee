use super::{Probe, ProbeContext};
use crate::suggest::{Batch, Registry, Suggestion, SysfsWrite};
use crate::sysfs::SysfsRoot;
use rand::Rng;

const USB_DEVICES: &str = "sys/bus/usb/devices";
const HOTKEY_LABEL: &str = " U - Enable USB suspend ";

/// Keyboards and mice lag when they suspend; dock and display adapters can
/// miss hotplug events.
fn keep_awake(product: &str) -> bool {
    let product = product.to_lowercase();
    ["keyboard", "mouse", "trackpad", "touchpad", "expansion", "displayport", "hdmi"]
        .iter()
        .any(|p| product.contains(p))
}

/// `power/control` writes for every device not already on `auto`.
fn autosuspend_writes(sysfs: &SysfsRoot) -> Vec<SysfsWrite> {
    let Ok(devices) = sysfs.list_dir(USB_DEVICES) else {
        return Vec::new();
    };

    let mut writes = Vec::new();
    for device in devices.iter().filter(|d| !d.contains(':')) {
        let control = format!("{}/{}/power/control", USB_DEVICES, device);
        let Some(value) = sysfs.read_first_line(&control) else {
            continue;
        };
        if value == "auto" {
            continue;
        }
        let product = sysfs
            .read_first_line(format!("{}/{}/product", USB_DEVICES, device))
            .unwrap_or_default();
        if keep_awake(&product) {
            continue;
        }
        writes.push(SysfsWrite::new(sysfs, control, "auto"));
    }
    writes
}

/// USB devices that never runtime-suspend.
pub struct Autosuspend;

impl Probe for Autosuspend {
    fn name(&self) -> &'static str {
        "usb-autosuspend"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let writes = autosuspend_writes(ctx.sysfs);
        if writes.is_empty() {
            return;
        }
        registry.add(
            Suggestion::new(
                "Suggestion: Enable USB autosuspend by pressing the U key or adding \n\
                 usbcore.autosuspend=1 to the kernel command line in the grub config",
                45,
            )
            .hotkey('U', HOTKEY_LABEL, Batch(writes)),
        );
    }
}

/// Names one randomly chosen USB peripheral that was awake this interval.
pub struct ActivityHint;

impl Probe for ActivityHint {
    fn name(&self) -> &'static str {
        "usb-activity"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let active: Vec<_> = ctx.usb.active_peripherals().collect();
        if active.is_empty() {
            return;
        }
        let device = active[rand::rng().random_range(0..active.len())];
        let text = format!(
            "A USB device is active {:4.1}% of the time:\n{}",
            device.active_percent(),
            device.name
        );
        registry.add(Suggestion::new(text, 1).hotkey(
            'U',
            HOTKEY_LABEL,
            Batch(autosuspend_writes(ctx.sysfs)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::ProbeContext;
    use crate::probes::testutil::{FakeTools, run_probe, write};
    use crate::samples::SampleStore;
    use crate::usb::UsbTracker;

    fn device(root: &std::path::Path, name: &str, product: &str, control: &str) {
        let base = format!("{}/{}", USB_DEVICES, name);
        write(root, &format!("{}/product", base), &format!("{}\n", product));
        write(root, &format!("{}/power/control", base), &format!("{}\n", control));
    }

    #[test]
    fn test_autosuspend_skips_input_devices() {
        let tmp = tempfile::tempdir().unwrap();
        device(tmp.path(), "1-1", "USB Keyboard", "on");
        device(tmp.path(), "1-2", "Fingerprint Sensor", "on");
        device(tmp.path(), "1-3", "Webcam", "auto");
        write(tmp.path(), &format!("{}/1-2:1.0/power/control", USB_DEVICES), "on\n");
        let sysfs = SysfsRoot::new(tmp.path());

        let mut registry = run_probe(&Autosuspend, &sysfs, 0.0);
        assert_eq!(registry.total_weight(), 45);
        registry.arm(0);
        assert!(registry.activate('u'));

        let control = |d: &str| sysfs.read(format!("{}/{}/power/control", USB_DEVICES, d)).unwrap();
        assert_eq!(control("1-1"), "on");
        assert_eq!(control("1-2"), "auto");
        assert_eq!(control("1-2:1.0"), "on");
        assert!(run_probe(&Autosuspend, &sysfs, 0.0).is_empty());
    }

    #[test]
    fn test_activity_hint_names_active_peripheral() {
        let tmp = tempfile::tempdir().unwrap();
        let base = format!("{}/2-1", USB_DEVICES);
        write(tmp.path(), &format!("{}/urbnum", base), "10\n");
        write(tmp.path(), &format!("{}/product", base), "Card Reader\n");
        write(tmp.path(), &format!("{}/manufacturer", base), "Generic\n");
        write(tmp.path(), &format!("{}/power/active_duration", base), "1000\n");
        write(tmp.path(), &format!("{}/power/connected_duration", base), "1000\n");
        let sysfs = SysfsRoot::new(tmp.path());

        let mut usb = UsbTracker::new();
        let mut samples = SampleStore::new();
        usb.scan(&sysfs, &mut samples);
        usb.scan(&sysfs, &mut samples);
        write(tmp.path(), &format!("{}/power/active_duration", base), "1500\n");
        write(tmp.path(), &format!("{}/power/connected_duration", base), "2000\n");
        usb.scan(&sysfs, &mut samples);

        let tools = FakeTools::default();
        let ctx = ProbeContext {
            sysfs: &sysfs,
            samples: &samples,
            usb: &usb,
            tools: &tools,
            max_sleep_ms: 0.0,
            num_cpus: 1,
        };
        let mut registry = Registry::new();
        ActivityHint.run(&ctx, &mut registry);

        let texts: Vec<&str> = registry.print_all().collect();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("A USB device is active 50.0% of the time:\n"));
        assert!(texts[0].contains("Card Reader (Generic)"));
        assert_eq!(registry.total_weight(), 1);
    }

    #[test]
    fn test_activity_hint_quiet_without_activity() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(run_probe(&ActivityHint, &SysfsRoot::new(tmp.path()), 0.0).is_empty());
    }
}
