//! USB activity from `urbnum` and the runtime-PM duration counters.

use crate::samples::SampleStore;
use crate::sysfs::SysfsRoot;
use serde::Serialize;

const USB_DEVICES: &str = "sys/bus/usb/devices";

/// One USB device, keyed by its sysfs path. Records live for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub path: String,
    pub name: String,
    pub urbs: u64,
    pub active: u64,
    pub connected: u64,
    pub previous_urbs: u64,
    pub previous_active: u64,
    pub previous_connected: u64,
    pub controller: bool,
}

impl UsbDevice {
    /// Share of the connected time the device was not suspended.
    pub fn active_percent(&self) -> f64 {
        let active = self.active.saturating_sub(self.previous_active) as f64;
        let connected = self.connected.saturating_sub(self.previous_connected) as f64;
        100.0 * active / (0.00001 + connected)
    }

    /// Active for more than a millisecond since the last scan.
    pub fn was_active(&self) -> bool {
        self.active > self.previous_active + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsbActivity {
    pub active_percent: f64,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct UsbTracker {
    devices: Vec<UsbDevice>,
}

impl UsbTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &[UsbDevice] {
        &self.devices
    }

    /// Refresh every device and push URB deltas into `samples`.
    pub fn scan(&mut self, sysfs: &SysfsRoot, samples: &mut SampleStore) {
        let Ok(entries) = sysfs.list_dir(USB_DEVICES) else {
            return;
        };

        for dev in &mut self.devices {
            dev.previous_urbs = dev.urbs;
            dev.previous_active = dev.active;
            dev.previous_connected = dev.connected;
        }

        for entry in &entries {
            let path = format!("{}/{}", USB_DEVICES, entry);
            let Some(urbs) = sysfs.read_u64(format!("{}/urbnum", path)) else {
                continue;
            };
            self.update(sysfs, &path, entry, urbs);
        }

        for dev in &self.devices {
            if dev.urbs == dev.previous_urbs {
                continue;
            }
            // re-enumerated at the same path: the counter restarted from zero
            let delta = if dev.urbs < dev.previous_urbs {
                log::debug!("urbnum of {} went backwards, counter reset", dev.path);
                dev.urbs
            } else {
                dev.urbs - dev.previous_urbs
            };
            if delta > 0 {
                samples.add_occurrence(&dev.name, delta, None);
            }
        }
    }

    fn update(&mut self, sysfs: &SysfsRoot, path: &str, short: &str, urbs: u64) {
        if let Some(dev) = self.devices.iter_mut().find(|d| d.path == path) {
            dev.urbs = urbs;
            let (Some(active), Some(connected)) = (
                sysfs.read_u64(format!("{}/power/active_duration", path)),
                sysfs.read_u64(format!("{}/power/connected_duration", path)),
            ) else {
                return;
            };
            dev.active = active;
            dev.connected = connected;
            return;
        }

        let product = sysfs
            .read_first_line(format!("{}/product", path))
            .unwrap_or_default();
        let vendor = sysfs
            .read_first_line(format!("{}/manufacturer", path))
            .unwrap_or_default();
        // some devices report junk product names
        let name = if product.len() < 4 {
            sysfs.path(path).display().to_string()
        } else {
            format!("USB device {:>4} : {} ({})", short, product, vendor)
        };
        let controller = name.contains("Host Controller");

        log::debug!("new USB device {}: {}", path, name);
        self.devices.push(UsbDevice {
            path: path.to_string(),
            name,
            urbs,
            active: 0,
            connected: 0,
            previous_urbs: urbs,
            previous_active: 0,
            previous_connected: 0,
            controller,
        });
    }

    /// Per-device active share since the previous scan.
    pub fn activity(&self) -> Vec<UsbActivity> {
        self.devices
            .iter()
            .map(|d| UsbActivity {
                active_percent: d.active_percent(),
                name: d.name.clone(),
            })
            .collect()
    }

    /// Peripherals (not host controllers) that woke up since the last scan.
    pub fn active_peripherals(&self) -> impl Iterator<Item = &UsbDevice> {
        self.devices.iter().filter(|d| d.was_active() && !d.controller)
    }
}
