use crate::error::Result;
use crate::session::IntervalReport;
use colored::Colorize;
use std::io::Write;

const NO_TIMER_STATS: &str = "No detailed statistics available; please enable the CONFIG_TIMER_STATS kernel option\n\
This option is located in the Kernel Debugging section of menuconfig\n\
(which is CONFIG_DEBUG_KERNEL=y in the config file)";

/// Where a finished interval goes.
pub trait Display {
    fn show_report(&mut self, report: &IntervalReport) -> Result<()>;

    /// The picked suggestion, or `None` to clear the slot.
    fn show_suggestion(&mut self, text: Option<&str>) -> Result<()>;

    fn show_status_bar(&mut self, labels: &[String]) -> Result<()>;
}

/// Plain line printer. Interactive mode clears the screen before each
/// interval and caps the wakeup list.
pub struct TerminalDisplay<W: Write> {
    out: W,
    interactive: bool,
    top_lines: usize,
}

impl TerminalDisplay<std::io::Stdout> {
    pub fn stdout(interactive: bool, top_lines: usize) -> Self {
        Self::new(std::io::stdout(), interactive, top_lines)
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, interactive: bool, top_lines: usize) -> Self {
        Self {
            out,
            interactive,
            top_lines,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn wakeup_lines(&mut self, report: &IntervalReport) -> Result<()> {
        if !report.timer_stats && report.wakeups.is_empty() {
            writeln!(self.out, "{}", NO_TIMER_STATS.dimmed())?;
            return Ok(());
        }

        writeln!(self.out, "{}", "Top causes for wakeups:".bold())?;
        let total = report.wakeup_total().max(1) as f64;
        let interval = report.interval_secs.max(0.001);
        let limit = if self.interactive {
            self.top_lines
        } else {
            usize::MAX
        };
        for line in report.wakeups.iter().take(limit) {
            let share = line.count as f64 * 100.0 / total;
            let rate = line.count as f64 / interval;
            if report.show_pids {
                writeln!(
                    self.out,
                    " {:5.1}% ({:5.1})  [{:>6}] {}",
                    share,
                    rate,
                    line.pid.as_deref().unwrap_or(""),
                    line.label
                )?;
            } else {
                writeln!(self.out, " {:5.1}% ({:5.1})   {}", share, rate, line.label)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn show_report(&mut self, report: &IntervalReport) -> Result<()> {
        if self.interactive {
            write!(self.out, "\x1b[2J\x1b[H")?;
        }
        writeln!(
            self.out,
            "{}   {}",
            format!("PowerTOP {}", env!("CARGO_PKG_VERSION")).bold(),
            report.timestamp.dimmed()
        )?;
        writeln!(self.out)?;

        let top = report.idle.report().and_then(|r| r.top_line());
        for (i, line) in report.idle.lines().into_iter().enumerate() {
            if top == Some(i) {
                writeln!(self.out, "{}", line.green())?;
            } else {
                writeln!(self.out, "{}", line)?;
            }
        }
        if let Some(freq) = &report.frequencies {
            writeln!(self.out)?;
            for (i, line) in freq.lines().into_iter().enumerate() {
                let dominant = i > 0 && freq.lines.get(i - 1).is_some_and(|l| l.dominant);
                if dominant {
                    writeln!(self.out, "{}", line.green())?;
                } else {
                    writeln!(self.out, "{}", line)?;
                }
            }
        }
        writeln!(self.out)?;

        if let Some(rate) = report.wakeups_per_sec {
            writeln!(
                self.out,
                "Wakeups-from-idle per second : {:4.1}\tinterval: {:0.1}s",
                rate, report.interval_secs
            )?;
        }
        writeln!(self.out, "{}", report.power.line())?;
        writeln!(self.out)?;

        self.wakeup_lines(report)?;

        if !report.suggestions.is_empty() {
            writeln!(self.out)?;
            for suggestion in &report.suggestions {
                writeln!(self.out, "{}\n", suggestion.text.yellow())?;
            }
        }
        if !report.usb.is_empty() {
            writeln!(self.out, "{}", "Recent USB suspend statistics".bold())?;
            writeln!(self.out, "Active  Device name")?;
            for device in &report.usb {
                writeln!(self.out, "{:5.1}%\t{}", device.active_percent, device.name)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn show_suggestion(&mut self, text: Option<&str>) -> Result<()> {
        if let Some(text) = text {
            writeln!(self.out)?;
            writeln!(self.out, "{}", text.yellow().bold())?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn show_status_bar(&mut self, labels: &[String]) -> Result<()> {
        let bar: String = labels.iter().map(|l| format!("{}  ", l.reversed())).collect();
        writeln!(self.out)?;
        writeln!(self.out, "{}", bar)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::PowerEstimate;
    use crate::cstate::{IdleReport, IdleStateLine, IdleSummary, TopState};
    use crate::samples::WakeupLine;
    use crate::suggest::SuggestionSummary;
    use crate::usb::UsbActivity;

    fn report() -> IntervalReport {
        IntervalReport {
            timestamp: "2024-01-01T00:00:00+00:00".into(),
            interval_secs: 10.0,
            num_cpus: 2,
            idle: IdleSummary::NoDetail,
            frequencies: None,
            wakeups_per_sec: Some(42.5),
            wakeups: vec![
                WakeupLine {
                    label: "        firefox : futex_wait".into(),
                    count: 300,
                    pid: Some("1200".into()),
                },
                WakeupLine {
                    label: "    <interrupt> : ahci".into(),
                    count: 100,
                    pid: None,
                },
            ],
            power: PowerEstimate {
                rate_w: 0.0,
                capacity_wh: 0.0,
                cap_delta_wh: 0.0,
                window_secs: 0,
            },
            timer_stats: true,
            show_pids: false,
            usb: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn render(display_interactive: bool, top_lines: usize, report: &IntervalReport) -> String {
        colored::control::set_override(false);
        let mut display = TerminalDisplay::new(Vec::new(), display_interactive, top_lines);
        display.show_report(report).unwrap();
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[test]
    fn test_report_lines() {
        let text = render(false, 10, &report());
        assert!(text.contains("< Detailed C-state information is not available.>"));
        assert!(text.contains("Wakeups-from-idle per second : 42.5\tinterval: 10.0s"));
        assert!(text.contains("no ACPI power usage estimate available"));
        assert!(text.contains("  75.0% ( 30.0)           firefox : futex_wait"));
        assert!(text.contains("  25.0% ( 10.0)       <interrupt> : ahci"));
        assert!(!text.contains("\x1b[2J"));
    }

    #[test]
    fn test_dominant_idle_state_is_highlighted() {
        let mut r = report();
        r.idle = IdleSummary::Report(IdleReport {
            c0_percent: 5.0,
            states: vec![
                IdleStateLine {
                    slot: 1,
                    name: "C1 mwait".into(),
                    avg_residency_ms: 0.4,
                    percent: 10.0,
                },
                IdleStateLine {
                    slot: 2,
                    name: "C3 mwait".into(),
                    avg_residency_ms: 12.0,
                    percent: 85.0,
                },
            ],
            top: Some(TopState::Slot(2)),
            max_sleep_ms: 12.0,
            total_events: 400,
        });

        let lines = r.idle.lines();
        let top = r.idle.report().and_then(|i| i.top_line()).unwrap();
        assert!(lines[top].starts_with("C3 mwait"));

        let text = render(false, 10, &r);
        assert!(text.contains("C3 mwait           12.0ms (85.0%)"));
        assert!(text.contains("C0 (cpu running)        ( 5.0%)"));
    }

    #[test]
    fn test_running_cpu_is_the_top_line() {
        let report = IdleReport {
            c0_percent: 90.0,
            states: Vec::new(),
            top: Some(TopState::Running),
            max_sleep_ms: 0.0,
            total_events: 0,
        };
        assert_eq!(report.top_line(), Some(1));
        assert!(report.lines()[1].starts_with("C0 (cpu running)"));
    }

    #[test]
    fn test_pids_and_line_cap() {
        let mut r = report();
        r.show_pids = true;
        let text = render(true, 1, &r);
        assert!(text.starts_with("\x1b[2J\x1b[H"));
        assert!(text.contains("[  1200]         firefox : futex_wait"));
        assert!(!text.contains("ahci"));
    }

    #[test]
    fn test_dump_sections() {
        let mut r = report();
        r.suggestions = vec![SuggestionSummary {
            text: "Suggestion: do the thing".into(),
            weight: 5,
            hotkey: None,
        }];
        r.usb = vec![UsbActivity {
            active_percent: 12.5,
            name: "USB device  1-1 : Webcam (Acme)".into(),
        }];
        let text = render(false, 10, &r);
        assert!(text.contains("Suggestion: do the thing"));
        assert!(text.contains("Recent USB suspend statistics"));
        assert!(text.contains(" 12.5%\tUSB device  1-1 : Webcam (Acme)"));
    }

    #[test]
    fn test_missing_timer_stats_notice() {
        let mut r = report();
        r.timer_stats = false;
        r.wakeups.clear();
        let text = render(false, 10, &r);
        assert!(text.contains("CONFIG_TIMER_STATS"));
    }

    #[test]
    fn test_status_bar_and_suggestion() {
        colored::control::set_override(false);
        let mut display = TerminalDisplay::new(Vec::new(), true, 10);
        display.show_suggestion(Some("Suggestion: x")).unwrap();
        display.show_suggestion(None).unwrap();
        display
            .show_status_bar(&[" Q - Quit ".to_string(), " R - Refresh ".to_string()])
            .unwrap();
        let text = String::from_utf8(display.into_inner()).unwrap();
        assert!(text.contains("Suggestion: x"));
        assert!(text.contains(" Q - Quit    R - Refresh "));
    }
}
