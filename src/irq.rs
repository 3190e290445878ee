//! Interrupt counts from `/proc/interrupts`.

use crate::samples::SampleStore;
use crate::sysfs::{SysfsRoot, parse_leading_u64};
use std::collections::HashMap;

const PS2_NAME: &str = "PS/2 keyboard/mouse/touchpad";

/// Non-numeric rows get numbers far above any real IRQ line.
const SPECIAL_ROWS: [(&str, u32); 7] = [
    ("NMI", 20000),
    ("RES", 20001),
    ("CAL", 20002),
    ("TLB", 20003),
    ("TRM", 20004),
    ("THR", 20005),
    ("SPU", 20006),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqDelta {
    pub number: u32,
    pub label: String,
    pub delta: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqTotals {
    /// Timer interrupt (IRQ 0) count this interval.
    pub interrupt_0: u64,
    /// Every other row.
    pub total: u64,
}

#[derive(Debug, Default)]
pub struct IrqTracker {
    counts: HashMap<u32, u64>,
}

impl IrqTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read `/proc/interrupts` and return the change per row since the
    /// previous read. A row seen for the first time reports its full count.
    pub fn refresh(&mut self, sysfs: &SysfsRoot) -> Vec<IrqDelta> {
        let Some(content) = sysfs.read_optional("proc/interrupts").unwrap_or(None) else {
            return Vec::new();
        };

        let mut deltas = Vec::new();
        for line in content.lines() {
            let Some(row) = parse_row(line) else {
                continue;
            };
            let previous = self.counts.insert(row.number, row.count);
            let delta = match previous {
                Some(old) => row.count.saturating_sub(old),
                None => row.count,
            };
            deltas.push(IrqDelta {
                number: row.number,
                label: row.label,
                delta,
            });
        }
        deltas
    }

    /// Refresh and push wakeup lines into `samples`.
    pub fn collect(&mut self, sysfs: &SysfsRoot, samples: &mut SampleStore) -> IrqTotals {
        let mut totals = IrqTotals::default();
        for irq in self.refresh(sysfs) {
            if irq.number == 0 {
                totals.interrupt_0 = irq.delta;
                continue;
            }
            totals.total += irq.delta;
            if irq.delta > 0 {
                samples.add_occurrence(&irq.label, irq.delta, None);
            }
        }
        totals
    }
}

struct Row {
    number: u32,
    count: u64,
    label: String,
}

fn parse_row(line: &str) -> Option<Row> {
    let (head, rest) = line.split_once(':')?;
    let head = head.trim();

    let (number, special) = match head.parse::<u32>() {
        Ok(n) => (n, false),
        Err(_) => {
            let (_, n) = SPECIAL_ROWS.iter().find(|(name, _)| *name == head)?;
            (*n, true)
        }
    };

    // per-CPU counters, then (for real IRQs) the chip name, then the handlers
    let mut fields = rest.split_whitespace().peekable();
    let mut count = 0u64;
    while let Some(value) = fields.peek().and_then(|f| parse_leading_u64(f)) {
        count += value;
        fields.next();
    }
    if !special {
        fields.next()?;
        // newer kernels split the chip column: `IR-IO-APIC  1-edge  i8042`
        if fields.peek().is_some_and(|f| is_hwirq_trigger(f)) {
            fields.next();
        }
    }
    let name = fields.collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return None;
    }

    let label = if name == "i8042" {
        format!("    <interrupt> : {}", PS2_NAME)
    } else if special {
        format!("   <kernel IPI> : {}", name)
    } else {
        format!("    <interrupt> : {}", name)
    };
    Some(Row {
        number,
        count,
        label,
    })
}

/// `<hwirq>-<trigger>` tokens such as `1-edge` or `327680-fasteoi`.
fn is_hwirq_trigger(token: &str) -> bool {
    token.split_once('-').is_some_and(|(hwirq, trigger)| {
        !hwirq.is_empty()
            && hwirq.bytes().all(|b| b.is_ascii_digit())
            && !trigger.is_empty()
            && trigger.bytes().all(|b| b.is_ascii_alphabetic())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const INTERRUPTS: &str = "           CPU0       CPU1\n\
  0:        120          0   IO-APIC-edge      timer\n\
  1:         10          5   IO-APIC-edge      i8042\n\
 16:        200        100   IO-APIC-fasteoi   ehci_hcd:usb1, ahci\n\
NMI:          3          4   Non-maskable interrupts\n\
LOC:       9999       9999   Local timer interrupts\n\
ERR:          0\n";

    fn write(root: &std::path::Path, content: &str) {
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::write(root.join("proc/interrupts"), content).unwrap();
    }

    #[test]
    fn test_parse_rows() {
        let row = parse_row(" 16:  200  100   IO-APIC-fasteoi   ehci_hcd:usb1, ahci").unwrap();
        assert_eq!(row.number, 16);
        assert_eq!(row.count, 300);
        assert_eq!(row.label, "    <interrupt> : ehci_hcd:usb1, ahci");

        let nmi = parse_row("NMI:  3  4   Non-maskable interrupts").unwrap();
        assert_eq!(nmi.number, 20000);
        assert_eq!(nmi.label, "   <kernel IPI> : Non-maskable interrupts");

        let ps2 = parse_row("  1:  10  5   IO-APIC-edge  i8042").unwrap();
        assert_eq!(ps2.label, "    <interrupt> : PS/2 keyboard/mouse/touchpad");

        let ps2 = parse_row("  1:  10  5  IR-IO-APIC    1-edge      i8042").unwrap();
        assert_eq!(ps2.count, 15);
        assert_eq!(ps2.label, "    <interrupt> : PS/2 keyboard/mouse/touchpad");

        let xhci = parse_row(" 125:  0  77  IR-PCI-MSI 327680-edge      xhci_hcd").unwrap();
        assert_eq!(xhci.count, 77);
        assert_eq!(xhci.label, "    <interrupt> : xhci_hcd");

        assert!(parse_row("LOC:  9999  9999  Local timer interrupts").is_none());
        assert!(parse_row("           CPU0       CPU1").is_none());
        assert!(parse_row("ERR:  0").is_none());
    }

    #[test]
    fn test_first_read_full_then_deltas() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        write(tmp.path(), INTERRUPTS);

        let mut tracker = IrqTracker::new();
        let first = tracker.refresh(&sysfs);
        assert_eq!(first.iter().find(|d| d.number == 16).unwrap().delta, 300);

        write(
            tmp.path(),
            &INTERRUPTS
                .replace("200        100", "250        110")
                .replace("120          0", "170          0"),
        );
        let mut samples = SampleStore::new();
        let totals = tracker.collect(&sysfs, &mut samples);

        assert_eq!(totals.interrupt_0, 50);
        assert_eq!(totals.total, 60);
        assert_eq!(samples.len(), 1);
        assert_eq!(
            samples.get("    <interrupt> : ehci_hcd:usb1, ahci").unwrap().count,
            60
        );
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut tracker = IrqTracker::new();
        assert!(tracker.refresh(&SysfsRoot::new(tmp.path())).is_empty());
    }
}
