use powertop::cstate::IdleSummary;
use powertop::display::{Display, TerminalDisplay};
use powertop::error::Result;
use powertop::input::{Key, KeySource};
use powertop::probes::{self, ToolOutput};
use powertop::session::{Flow, Session, SessionOptions};
use powertop::suggest::Selector;
use powertop::sysfs::SysfsRoot;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn put(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const INTERRUPTS_START: &str = "           CPU0       CPU1\n\
  0:       1000       1000   IO-APIC-edge      timer\n\
  9:         10         10   IO-APIC-fasteoi   acpi\n\
 16:        100        100   IO-APIC-fasteoi   ehci_hcd:usb1, ahci\n\
NMI:          0          0   Non-maskable interrupts\n";

const INTERRUPTS_END: &str = "           CPU0       CPU1\n\
  0:       1500       1500   IO-APIC-edge      timer\n\
  9:         10         10   IO-APIC-fasteoi   acpi\n\
 16:        150        150   IO-APIC-fasteoi   ehci_hcd:usb1, ahci\n\
NMI:          5          5   Non-maskable interrupts\n";

const KERNEL_CONFIG: &str = "# Automatically generated file; DO NOT EDIT.\n\
CONFIG_USB_SUSPEND=y\n\
CONFIG_CPU_FREQ_GOV_ONDEMAND=m\n\
CONFIG_NO_HZ=y\n\
CONFIG_ACPI_BATTERY=y\n\
CONFIG_HPET_TIMER=y\n\
CONFIG_IRQBALANCE=y\n\
CONFIG_CPU_FREQ_STAT=y\n\
CONFIG_INOTIFY=y\n";

fn idle_state(root: &Path, cpu: u32, state: u32, desc: &str, usage: u64, time: u64) {
    let base = format!("sys/devices/system/cpu/cpu{}/cpuidle/state{}", cpu, state);
    put(root, &format!("{}/desc", base), &format!("{}\n", desc));
    put(root, &format!("{}/usage", base), &format!("{}\n", usage));
    put(root, &format!("{}/time", base), &format!("{}\n", time));
}

/// A two-CPU laptop on battery with a handful of power-hungry settings.
fn create_laptop_fixture(root: &Path) {
    for cpu in 0..2 {
        idle_state(root, cpu, 0, "POLL IDLE", 0, 0);
        idle_state(root, cpu, 1, "MWAIT 0x00", 1000, 1_000_000);
        idle_state(root, cpu, 2, "MWAIT 0x20", 500, 5_000_000);

        let freq = format!("sys/devices/system/cpu/cpu{}/cpufreq", cpu);
        put(root, &format!("{}/scaling_governor", freq), "performance\n");
        put(
            root,
            &format!("{}/scaling_available_governors", freq),
            "performance powersave ondemand\n",
        );
        put(
            root,
            &format!("{}/stats/time_in_state", freq),
            "2000000 1000\n1000000 5000\n",
        );
    }
    put(
        root,
        "sys/devices/system/clocksource/clocksource0/available_clocksource",
        "tsc acpi_pm\n",
    );

    put(root, "proc/interrupts", INTERRUPTS_START);
    put(root, "proc/mounts", "proc /proc proc rw 0 0\n/dev/nvme0n1p2 / ext4 rw,errors=remount-ro 0 0\n");
    put(root, "proc/sys/kernel/nmi_watchdog", "1\n");
    put(root, "proc/sys/kernel/osrelease", "6.1.0-mock\n");
    put(root, "proc/sys/vm/laptop_mode", "0\n");
    put(root, "proc/sys/vm/dirty_writeback_centisecs", "500\n");
    put(root, "boot/config-6.1.0-mock", KERNEL_CONFIG);

    put(root, "sys/class/scsi_host/host0/link_power_management_policy", "max_performance\n");

    let bat = "sys/class/power_supply/BAT0";
    put(root, &format!("{}/type", bat), "Battery\n");
    put(root, &format!("{}/present", bat), "1\n");
    put(root, &format!("{}/status", bat), "Discharging\n");
    put(root, &format!("{}/energy_now", bat), "40000000\n");
    put(root, &format!("{}/power_now", bat), "10000000\n");
    put(root, "sys/class/power_supply/AC/type", "Mains\n");
    put(root, "sys/class/power_supply/AC/online", "0\n");

    let hub = "sys/bus/usb/devices/usb1";
    put(root, &format!("{}/urbnum", hub), "50\n");
    put(root, &format!("{}/product", hub), "EHCI Host Controller\n");
    put(root, &format!("{}/manufacturer", hub), "Linux 6.1.0 ehci_hcd\n");
    put(root, &format!("{}/power/control", hub), "auto\n");

    let cam = "sys/bus/usb/devices/1-1";
    put(root, &format!("{}/urbnum", cam), "100\n");
    put(root, &format!("{}/product", cam), "Webcam\n");
    put(root, &format!("{}/manufacturer", cam), "Acme\n");
    put(root, &format!("{}/power/control", cam), "on\n");
    put(root, &format!("{}/power/active_duration", cam), "1000\n");
    put(root, &format!("{}/power/connected_duration", cam), "2000\n");
}

/// Move every cumulative counter to its end-of-interval value.
fn advance_counters(root: &Path) {
    for cpu in 0..2 {
        idle_state(root, cpu, 1, "MWAIT 0x00", 1100, 1_100_000);
        idle_state(root, cpu, 2, "MWAIT 0x20", 510, 5_300_000);
        put(
            root,
            &format!("sys/devices/system/cpu/cpu{}/cpufreq/stats/time_in_state", cpu),
            "2000000 1100\n1000000 5300\n",
        );
    }
    put(root, "proc/interrupts", INTERRUPTS_END);

    let cam = "sys/bus/usb/devices/1-1";
    put(root, &format!("{}/urbnum", cam), "160\n");
    put(root, &format!("{}/power/active_duration", cam), "1500\n");
    put(root, &format!("{}/power/connected_duration", cam), "3000\n");
}

/// Advances the mock counters on the first wait, then sleeps it out.
struct AdvanceCounters<'a> {
    root: &'a Path,
    done: bool,
}

impl KeySource for AdvanceCounters<'_> {
    fn wait(&mut self, timeout: Duration) -> Result<Option<Key>> {
        if !self.done {
            advance_counters(self.root);
            self.done = true;
        }
        std::thread::sleep(timeout);
        Ok(None)
    }
}

struct ScriptedKeys(VecDeque<Option<Key>>);

impl KeySource for ScriptedKeys {
    fn wait(&mut self, _timeout: Duration) -> Result<Option<Key>> {
        Ok(self.0.pop_front().flatten())
    }
}

/// No `iw` or `ethtool` on the mock machine.
struct NoTools;

impl ToolOutput for NoTools {
    fn output(&self, _program: &str, _args: &[&str]) -> Option<String> {
        None
    }
}

fn options(interval_secs: f64, disabled: &[&str]) -> SessionOptions {
    SessionOptions {
        interval_secs,
        selector: Selector::default(),
        show_pids: false,
        disabled_probes: disabled.iter().map(|d| d.to_string()).collect(),
    }
}

fn session(root: &Path, options: SessionOptions) -> Session {
    Session::new(SysfsRoot::new(root), options).with_tools(Box::new(NoTools))
}

#[test]
fn test_dump_session_over_laptop_tree() {
    let tmp = TempDir::new().unwrap();
    create_laptop_fixture(tmp.path());

    let mut session = session(tmp.path(), options(0.5, &[]));
    let mut keys = AdvanceCounters {
        root: tmp.path(),
        done: false,
    };
    let report = session.dump(&mut keys).unwrap();

    assert!(report.interval_secs >= 0.5);
    assert_eq!(report.num_cpus, 2);

    let IdleSummary::Report(idle) = &report.idle else {
        panic!("expected an idle report, got {:?}", report.idle);
    };
    let names: Vec<&str> = idle.states.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["polling", "C1 mwait", "C3 mwait"]);
    assert_eq!(idle.total_events, 220);
    // 2 * 300ms of C3 over 2 * 10 entries
    assert!((idle.max_sleep_ms - 29.85).abs() < 0.01, "{}", idle.max_sleep_ms);
    assert!(report.wakeups_per_sec.is_some());

    let freq = report.frequencies.as_ref().expect("P-state report");
    let labels: Vec<&str> = freq.lines.iter().map(|l| l.label.as_str()).collect();
    assert_eq!(labels, vec!["2.00 Ghz", "1000 Mhz"]);
    assert_eq!(freq.dominant().map(|l| l.frequency), Some(1_000_000));
    assert!((freq.lines[1].percent - 75.0).abs() < 1e-9);

    let count = |label: &str| report.wakeups.iter().find(|l| l.label == label).map(|l| l.count);
    assert_eq!(count("    <interrupt> : ehci_hcd:usb1, ahci"), Some(100));
    assert_eq!(count("   <kernel IPI> : Non-maskable interrupts"), Some(10));
    assert_eq!(count("USB device  1-1 : Webcam (Acme)"), Some(60));
    assert_eq!(count("    <interrupt> : acpi"), None);
    assert_eq!(report.wakeups[0].count, 100);

    assert_eq!(
        report.power.line(),
        "Power usage (ACPI estimate): 10.0W (4.0 hours)"
    );

    let texts: Vec<&str> = report.suggestions.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts.len(), 10, "{:#?}", texts);
    assert!(texts[0].starts_with("A USB device is active 50.0% of the time:"));
    assert!(texts[9].contains("CONFIG_IRQBALANCE"));
    for needle in [
        "NMI watchdog",
        "laptop-mode",
        "HPET",
        "ondemand cpu speed governor",
        "noatime",
        "SATA ALPM",
        "dirty writeback time from 5.00 to 15 seconds",
        "USB autosuspend",
    ] {
        assert!(
            texts.iter().any(|t| t.contains(needle)),
            "no suggestion mentions {:?}",
            needle
        );
    }

    let webcam = report
        .usb
        .iter()
        .find(|u| u.name.contains("Webcam"))
        .expect("webcam in the USB table");
    assert!((webcam.active_percent - 50.0).abs() < 0.01);

    colored::control::set_override(false);
    let mut display = TerminalDisplay::new(Vec::new(), false, usize::MAX);
    display.show_report(&report).unwrap();
    let text = String::from_utf8(display.into_inner()).unwrap();
    assert!(text.contains("C3 mwait"));
    assert!(text.contains("P-states (frequencies)"));
    assert!(text.contains("Top causes for wakeups:"));
    assert!(text.contains("ehci_hcd:usb1, ahci"));
    assert!(text.contains("Recent USB suspend statistics"));
    assert!(text.contains("Suggestion: disable the NMI watchdog"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["num_cpus"], 2);
    assert_eq!(json["suggestions"].as_array().unwrap().len(), 10);
    assert!(json["idle"]["Report"]["states"].is_array());
}

#[test]
fn test_interactive_hotkey_applies_suggestion() {
    let tmp = TempDir::new().unwrap();
    create_laptop_fixture(tmp.path());

    let others: Vec<&str> = probes::all_probes()
        .iter()
        .map(|p| p.name())
        .filter(|n| *n != "nmi-watchdog")
        .collect();
    let mut session = session(tmp.path(), options(5.0, &others));
    let mut display = TerminalDisplay::new(Vec::new(), true, 5);
    // interval, settle, interval with N, interval with q
    let mut keys = ScriptedKeys(VecDeque::from([
        None,
        None,
        Some(Key::Char('n')),
        Some(Key::Char('q')),
    ]));

    colored::control::set_override(false);
    session.prime();
    assert_eq!(session.run_interval(&mut keys, &mut display).unwrap(), Flow::Continue);
    assert_eq!(session.registry().armed().map(|s| s.hotkey), Some(Some('N')));

    assert_eq!(session.run_interval(&mut keys, &mut display).unwrap(), Flow::Continue);
    assert_eq!(
        fs::read_to_string(tmp.path().join("proc/sys/kernel/nmi_watchdog")).unwrap(),
        "0\n"
    );
    assert_eq!(session.interval_secs(), 2.0);
    assert!(session.registry().is_empty());

    assert_eq!(session.run_interval(&mut keys, &mut display).unwrap(), Flow::Quit);

    let text = String::from_utf8(display.into_inner()).unwrap();
    assert!(text.contains(" N - Turn NMI watchdog off "));
    assert_eq!(text.matches("\x1b[2J\x1b[H").count(), 2);
}

#[test]
fn test_cpus_disagreeing_on_idle_states() {
    let tmp = TempDir::new().unwrap();
    create_laptop_fixture(tmp.path());
    idle_state(tmp.path(), 1, 1, "ACPI HLT", 1000, 1_000_000);

    let mut session = session(tmp.path(), options(0.1, &[]));
    let report = session
        .dump(&mut AdvanceCounters {
            root: tmp.path(),
            done: false,
        })
        .unwrap();
    assert_eq!(report.idle, IdleSummary::Inconsistent);
    assert_eq!(report.idle.max_sleep_ms(), 0.0);
    // the rest of the interval is still reported
    assert!(report.frequencies.is_some());
    assert!(!report.wakeups.is_empty());
}

#[test]
fn test_config_file_shapes_session() {
    let tmp = TempDir::new().unwrap();
    create_laptop_fixture(tmp.path());
    let config_path = tmp.path().join("powertop.toml");
    fs::write(
        &config_path,
        "[interval]\ndump_secs = 0.2\n\n[probes]\ndisabled = [\"nmi-watchdog\", \"kernel-config\"]\n",
    )
    .unwrap();

    let config = powertop::config::load(Some(&config_path));
    let options = SessionOptions::from_config(&config, true, None);
    assert_eq!(options.interval_secs, 0.2);

    let mut session = session(tmp.path(), options);
    let report = session
        .dump(&mut AdvanceCounters {
            root: tmp.path(),
            done: false,
        })
        .unwrap();
    assert_eq!(report.suggestions.len(), 8);
    assert!(!report.suggestions.iter().any(|s| s.text.contains("NMI")));
    assert!(!report.suggestions.iter().any(|s| s.text.contains("CONFIG_")));
}

#[test]
fn test_empty_tree_degrades_quietly() {
    let tmp = TempDir::new().unwrap();
    let mut session = session(tmp.path(), options(0.05, &[]));
    let report = session.dump(&mut ScriptedKeys(VecDeque::new())).unwrap();

    assert_eq!(report.idle, IdleSummary::NoDetail);
    assert!(report.frequencies.is_none());
    assert!(report.wakeups.is_empty());
    assert!(report.wakeups_per_sec.is_none());
    assert!(report.suggestions.is_empty());
    assert!(report.usb.is_empty());
    assert_eq!(report.power.line(), "no ACPI power usage estimate available");
}
