use serde::Serialize;
use std::collections::HashMap;

/// One aggregated wakeup cause for the current interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WakeupLine {
    pub label: String,
    pub count: u64,
    /// Owning process, cleared once two different pids share the label.
    pub pid: Option<String>,
}

/// Wakeup causes gathered over one measurement interval, unique by label.
#[derive(Debug, Default)]
pub struct SampleStore {
    lines: Vec<WakeupLine>,
    index: HashMap<String, usize>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` wakeups for `label`.
    ///
    /// A repeat label accumulates. When the repeat carries a pid that differs
    /// from the stored one, the stored pid is dropped: the cause no longer
    /// belongs to a single process.
    pub fn add_occurrence(&mut self, label: &str, count: u64, pid: Option<&str>) {
        if let Some(&i) = self.index.get(label) {
            let line = &mut self.lines[i];
            line.count += count;
            if let Some(pid) = pid
                && line.pid.as_deref() != Some(pid)
            {
                line.pid = None;
            }
            return;
        }

        self.index.insert(label.to_string(), self.lines.len());
        self.lines.push(WakeupLine {
            label: label.to_string(),
            count,
            pid: pid.filter(|p| !p.is_empty()).map(String::from),
        });
    }

    pub fn total_count(&self) -> u64 {
        self.lines.iter().map(|l| l.count).sum()
    }

    /// Entries by count, highest first; equal counts keep discovery order.
    pub fn sorted_descending(&self) -> impl Iterator<Item = &WakeupLine> {
        let mut sorted: Vec<&WakeupLine> = self.lines.iter().collect();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted.into_iter()
    }

    pub fn top(&self, n: usize) -> impl Iterator<Item = &WakeupLine> {
        self.sorted_descending().take(n)
    }

    pub fn get(&self, label: &str) -> Option<&WakeupLine> {
        self.index.get(label).map(|&i| &self.lines[i])
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.index.clear();
    }
}
