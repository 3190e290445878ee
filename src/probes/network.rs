use super::{Probe, ProbeContext};
use crate::suggest::{Registry, RunCommand, Suggestion, SysfsWrite};
use crate::sysfs::SysfsRoot;

const NET_BASE: &str = "sys/class/net";

/// Interfaces with a `wireless` directory.
fn wireless_interfaces(sysfs: &SysfsRoot) -> Vec<String> {
    sysfs
        .list_dir(NET_BASE)
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| sysfs.exists(format!("{}/{}/wireless", NET_BASE, iface)))
        .collect()
}

/// Physical wired interfaces: backed by a device, not wireless.
fn wired_interfaces(sysfs: &SysfsRoot) -> Vec<String> {
    sysfs
        .list_dir(NET_BASE)
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| {
            sysfs.exists(format!("{}/{}/device", NET_BASE, iface))
                && !sysfs.exists(format!("{}/{}/wireless", NET_BASE, iface))
        })
        .collect()
}

/// The interface's rfkill switch, e.g. `sys/class/net/wlan0/phy80211/rfkill0`.
fn rfkill_dir(sysfs: &SysfsRoot, iface: &str) -> Option<String> {
    let phy = format!("{}/{}/phy80211", NET_BASE, iface);
    let entries = sysfs.list_dir(&phy).ok()?;
    entries
        .into_iter()
        .find(|e| e.starts_with("rfkill"))
        .map(|e| format!("{}/{}", phy, e))
}

fn radio_blocked(sysfs: &SysfsRoot, rfkill: &str) -> bool {
    ["soft", "hard"]
        .iter()
        .any(|f| sysfs.read_first_line(format!("{}/{}", rfkill, f)).as_deref() == Some("1"))
}

/// WiFi power saving off, or a radio that is up without an association.
pub struct WirelessPowerSave;

impl Probe for WirelessPowerSave {
    fn name(&self) -> &'static str {
        "wireless"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        for iface in wireless_interfaces(ctx.sysfs) {
            let rfkill = rfkill_dir(ctx.sysfs, &iface);
            if rfkill.as_deref().is_some_and(|r| radio_blocked(ctx.sysfs, r)) {
                continue;
            }

            if let Some(out) = ctx.tools.output("iw", &["dev", iface.as_str(), "get", "power_save"])
                && out.contains("Power save: off")
            {
                let text = format!(
                    "Suggestion: Enable wireless power saving mode by executing the following command:\n  \
                     iw dev {} set power_save on \n\
                     This will sacrifice network performance slightly to save power.",
                    iface
                );
                registry.add(Suggestion::new(text, 20).hotkey(
                    'W',
                    " W - Enable wireless power saving ",
                    RunCommand::new("iw", ["dev", iface.as_str(), "set", "power_save", "on"]),
                ));
            }

            let Some(rfkill) = rfkill else {
                continue;
            };
            if let Some(out) = ctx.tools.output("iw", &["dev", iface.as_str(), "link"])
                && out.contains("Not connected")
            {
                let soft = format!("{}/soft", rfkill);
                let text = format!(
                    "Suggestion: Disable the unused WIFI radio by executing the following command:\n  \
                     echo 1 > /{} \n",
                    soft
                );
                registry.add(Suggestion::new(text, 60).hotkey(
                    'I',
                    " I - disable WIFI Radio ",
                    SysfsWrite::new(ctx.sysfs, soft, "1\n"),
                ));
            }
        }
    }
}

/// Wake-on-LAN keeps the Ethernet PHY powered while suspended or off.
pub struct WakeOnLan;

impl Probe for WakeOnLan {
    fn name(&self) -> &'static str {
        "wake-on-lan"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        for iface in wired_interfaces(ctx.sysfs) {
            let Some(out) = ctx.tools.output("ethtool", &[iface.as_str()]) else {
                continue;
            };
            let wol = out
                .lines()
                .map(str::trim)
                .find_map(|l| l.strip_prefix("Wake-on:"))
                .map(str::trim);
            if wol.is_none_or(|w| w == "d") {
                continue;
            }
            let text = format!(
                "Suggestion: Disable Ethernet Wake-On-Lan with the following command:\n  \
                 ethtool -s {} wol d \n\
                 Wake-on-Lan keeps the phy active, this costs power.",
                iface
            );
            registry.add(Suggestion::new(text, 5).hotkey(
                'E',
                " E - disable wake on lan ",
                RunCommand::new("ethtool", ["-s", iface.as_str(), "wol", "d"]),
            ));
        }
    }
}
