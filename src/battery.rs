use crate::sysfs::SysfsRoot;
use serde::Serialize;

const POWER_SUPPLY: &str = "sys/class/power_supply";

/// Window after which the long-term drain estimate rolls over.
const LONG_TERM_WINDOW_SECS: i64 = 400;

/// Summed state of every battery in `sys/class/power_supply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatteryReading {
    /// Discharge rate in watts; zero while charging or full.
    pub rate_w: f64,
    /// Remaining energy in watt-hours.
    pub capacity_wh: f64,
    pub batteries: u32,
}

impl BatteryReading {
    pub fn read(sysfs: &SysfsRoot) -> Self {
        let mut reading = Self::default();
        let Ok(entries) = sysfs.list_dir(POWER_SUPPLY) else {
            return reading;
        };

        for supply in entries.iter().filter(|e| !e.contains("AC")) {
            let base = format!("{}/{}", POWER_SUPPLY, supply);
            if let Some(kind) = sysfs.read_first_line(format!("{}/type", base))
                && kind != "Battery"
            {
                continue;
            }
            match sysfs.read_first_line(format!("{}/present", base)).as_deref() {
                Some("1") => {}
                _ => continue,
            }

            let discharging = sysfs
                .read_first_line(format!("{}/status", base))
                .is_some_and(|s| s.contains("Discharging"));
            let micro = |file: &str| {
                sysfs
                    .read_u64(format!("{}/{}", base, file))
                    .map(|v| v as f64 / 1_000_000.0)
            };
            let voltage = micro("voltage_now").unwrap_or(0.0);

            let capacity = match (micro("energy_now"), micro("charge_now")) {
                (Some(wh), _) => wh,
                (None, Some(ah)) => ah * voltage,
                (None, None) => continue,
            };

            if discharging {
                reading.rate_w += match (micro("power_now"), micro("current_now")) {
                    (Some(w), _) => w,
                    (None, Some(a)) => a * voltage,
                    (None, None) => 0.0,
                };
            }
            reading.capacity_wh += capacity;
            reading.batteries += 1;
        }

        reading
    }
}

/// Whether the machine runs on mains power. `None` when no adapter is
/// visible, which callers treat as "don't know".
pub fn on_ac(sysfs: &SysfsRoot) -> Option<bool> {
    if let Some(state) = sysfs.read_first_line("proc/acpi/ac_adapter/AC/state") {
        return Some(state.contains("on-line"));
    }

    let entries = sysfs.list_dir(POWER_SUPPLY).ok()?;
    entries.iter().find_map(|name| {
        let base = format!("{}/{}", POWER_SUPPLY, name);
        if sysfs.read_first_line(format!("{}/type", base)).as_deref() != Some("Mains") {
            return None;
        }
        Some(sysfs.read_first_line(format!("{}/online", base)).as_deref() == Some("1"))
    })
}

/// Tracks capacity over a rolling window for the long-term estimate.
#[derive(Debug, Default)]
pub struct BatteryTracker {
    last_cap: f64,
    prev_cap: f64,
    last_time: Option<i64>,
    prev_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerEstimate {
    pub rate_w: f64,
    pub capacity_wh: f64,
    /// Capacity lost since the window started.
    pub cap_delta_wh: f64,
    pub window_secs: i64,
}

impl BatteryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a reading taken at `now` (unix seconds).
    pub fn update(&mut self, reading: &BatteryReading, now: i64) -> PowerEstimate {
        let cap = reading.capacity_wh;
        // charging or idle on AC: restart the window
        if self.prev_cap - cap < 0.001 && reading.rate_w < 0.001 {
            self.last_time = None;
        }
        if self.last_time.is_none() {
            self.last_time = Some(now);
            self.prev_time = now;
            self.last_cap = cap;
            self.prev_cap = cap;
        }
        if let Some(last) = self.last_time
            && now - last >= LONG_TERM_WINDOW_SECS
        {
            self.prev_cap = self.last_cap;
            self.prev_time = last;
            self.last_time = Some(now);
            self.last_cap = cap;
        }

        PowerEstimate {
            rate_w: reading.rate_w,
            capacity_wh: cap,
            cap_delta_wh: self.prev_cap - cap,
            window_secs: now - self.prev_time,
        }
    }
}

impl PowerEstimate {
    pub fn line(&self) -> String {
        let long_term_w = 3600.0 * self.cap_delta_wh / self.window_secs.max(1) as f64;
        if self.rate_w > 0.001 {
            let mut line = format!(
                "Power usage (ACPI estimate): {:3.1}W ({:3.1} hours)",
                self.rate_w,
                self.capacity_wh / self.rate_w
            );
            if self.window_secs > 180 && self.cap_delta_wh > 0.0 {
                line.push_str(&format!(
                    " (long term: {:3.1}W,/{:3.1}h)",
                    long_term_w,
                    self.capacity_wh / (long_term_w + 0.01)
                ));
            }
            line
        } else if self.window_secs > 120 && self.cap_delta_wh > 0.001 {
            format!(
                "Power usage (5 minute ACPI estimate) : {:5.1} W ({:3.1} hours left)",
                long_term_w,
                self.capacity_wh / (long_term_w + 0.01)
            )
        } else {
            "no ACPI power usage estimate available".to_string()
        }
    }
}
