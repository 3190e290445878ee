//! Weighted-random choice of the suggestion to show, with a bias toward
//! repeating the previous one so the display does not flicker.

use super::Registry;
use rand::Rng;

/// Extra weight the previously shown suggestion gets while held.
pub const REPEAT_BIAS: u64 = 50;

/// Seconds a newly shown suggestion stays favoured.
pub const HOLD_SECS: f64 = 30.0;

/// What was shown last and for how much longer it is favoured.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionMemory {
    pub previous: Option<String>,
    /// Seconds left; negative means nothing is held.
    pub hold: f64,
}

impl Default for SelectionMemory {
    fn default() -> Self {
        Self {
            previous: None,
            hold: -1.0,
        }
    }
}

impl SelectionMemory {
    pub fn clear(&mut self) {
        self.previous = None;
        self.hold = -1.0;
    }

    /// Count down by the wall-clock length of an interval.
    pub fn elapse(&mut self, secs: f64) {
        self.hold -= secs;
    }

    /// Stop favouring the current suggestion.
    pub fn release(&mut self) {
        self.hold = -1.0;
    }

    fn holding(&self) -> bool {
        self.previous.is_some() && self.hold > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selector {
    pub repeat_bias: u64,
    pub hold_secs: f64,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            repeat_bias: REPEAT_BIAS,
            hold_secs: HOLD_SECS,
        }
    }
}

impl Selector {
    /// Upper bound (exclusive) for the draw given the current memory.
    pub fn effective_weight(&self, registry: &Registry, memory: &SelectionMemory) -> u64 {
        let mut weight = registry.total_weight();
        if memory.holding() {
            weight += self.repeat_bias;
        }
        weight
    }

    /// Pick with a uniform draw from `rng`. Returns the storage index of the
    /// chosen suggestion.
    pub fn pick_random<R: Rng>(
        &self,
        registry: &mut Registry,
        memory: &mut SelectionMemory,
        rng: &mut R,
    ) -> Option<usize> {
        let bound = self.effective_weight(registry, memory);
        if bound == 0 || registry.is_empty() {
            memory.clear();
            return None;
        }
        let draw = rng.random_range(0..bound);
        self.pick(registry, memory, draw)
    }

    /// Pick for a given draw in `0..effective_weight`.
    ///
    /// Walks the registry in its selection order accumulating weights (plus
    /// the repeat bias at the held suggestion) and takes the first entry
    /// whose running total exceeds `draw`. The winner is armed in the
    /// registry; a winner different from the previous one restarts the hold.
    pub fn pick(
        &self,
        registry: &mut Registry,
        memory: &mut SelectionMemory,
        draw: u64,
    ) -> Option<usize> {
        if registry.total_weight() == 0 || registry.is_empty() {
            memory.clear();
            return None;
        }

        let holding = memory.holding();
        let mut running = 0u64;
        let mut chosen = None;
        for (index, suggestion) in registry.iter() {
            running += u64::from(suggestion.weight);
            if holding && memory.previous.as_deref() == Some(suggestion.text.as_str()) {
                running += self.repeat_bias;
            }
            if running > draw {
                chosen = Some(index);
                break;
            }
        }

        let Some(index) = chosen else {
            memory.clear();
            return None;
        };

        registry.arm(index);
        let text = registry.get(index).map(|s| s.text.clone());
        if text != memory.previous {
            memory.hold = self.hold_secs;
            memory.previous = text;
        }
        Some(index)
    }
}
