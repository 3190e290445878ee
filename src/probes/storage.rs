use super::{Probe, ProbeContext};
use crate::suggest::{Batch, Registry, RunCommand, Suggestion, SysfsWrite};

const SCSI_HOSTS: &str = "sys/class/scsi_host";

/// Filesystems where access-time updates turn reads into writes.
const ATIME_FILESYSTEMS: [&str; 4] = ["ext3", "ext4", "xfs", "btrfs"];

/// Root filesystem mounted with strict access times.
pub struct NoAtime;

impl Probe for NoAtime {
    fn name(&self) -> &'static str {
        "noatime"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let Some(mounts) = ctx.sysfs.read_optional("proc/mounts").unwrap_or(None) else {
            return;
        };
        let strict = mounts.lines().any(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [_, "/", fstype, options, ..] = fields.as_slice() else {
                return false;
            };
            ATIME_FILESYSTEMS.contains(fstype)
                && !options.contains("noatime")
                && !options.contains("relatime")
        });
        if !strict {
            return;
        }
        registry.add(
            Suggestion::new(
                "Suggestion: enable the noatime filesystem option by executing the following command:\n   \
                 mount -o remount,noatime /          or by pressing the T key \n\
                 noatime disables persistent access time of file accesses, which causes lots of disk IO.",
                5,
            )
            .hotkey(
                'T',
                " T - enable noatime ",
                RunCommand::new("mount", ["-o", "remount,noatime,nodiratime", "/"]),
            ),
        );
    }
}

/// SATA links kept at full power.
pub struct SataAlpm;

impl Probe for SataAlpm {
    fn name(&self) -> &'static str {
        "sata-alpm"
    }

    fn run(&self, ctx: &ProbeContext<'_>, registry: &mut Registry) {
        let Ok(hosts) = ctx.sysfs.list_dir(SCSI_HOSTS) else {
            return;
        };
        let mut writes = Vec::new();
        let mut full_power = false;
        for host in &hosts {
            let path = format!("{}/{}/link_power_management_policy", SCSI_HOSTS, host);
            let Some(policy) = ctx.sysfs.read_first_line(&path) else {
                continue;
            };
            if policy == "max_performance" {
                full_power = true;
            }
            writes.push(SysfsWrite::new(ctx.sysfs, path, "min_power"));
        }
        if !full_power {
            return;
        }
        registry.add(
            Suggestion::new(
                "Suggestion: Enable SATA ALPM link power management via: \n  \
                 echo min_power > /sys/class/scsi_host/host0/link_power_management_policy\n\
                 or press the S key.",
                15,
            )
            .hotkey('S', " S - SATA Link Power Management ", Batch(writes)),
        );
    }
}
