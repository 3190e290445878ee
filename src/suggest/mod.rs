pub mod action;
pub mod select;

use crate::error::Result;
use serde::Serialize;
use std::fmt;

pub use action::{Batch, RunCommand, SysfsWrite};
pub use select::{HOLD_SECS, REPEAT_BIAS, SelectionMemory, Selector};

/// Something a suggestion can do when the user presses its hotkey.
pub trait Activate {
    fn activate(&self) -> Result<()>;
}

impl<F> Activate for F
where
    F: Fn() -> Result<()>,
{
    fn activate(&self) -> Result<()> {
        self()
    }
}

/// A candidate recommendation for the current interval.
pub struct Suggestion {
    pub text: String,
    pub weight: u32,
    pub hotkey: Option<char>,
    pub hotkey_label: Option<String>,
    pub action: Option<Box<dyn Activate>>,
}

impl Suggestion {
    pub fn new(text: impl Into<String>, weight: u32) -> Self {
        Self {
            text: text.into(),
            weight,
            hotkey: None,
            hotkey_label: None,
            action: None,
        }
    }

    /// Bind a key, its status-bar label and the action it triggers.
    pub fn hotkey(
        mut self,
        key: char,
        label: impl Into<String>,
        action: impl Activate + 'static,
    ) -> Self {
        self.hotkey = Some(key.to_ascii_uppercase());
        self.hotkey_label = Some(label.into());
        self.action = Some(Box::new(action));
        self
    }
}

impl fmt::Debug for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suggestion")
            .field("text", &self.text)
            .field("weight", &self.weight)
            .field("hotkey", &self.hotkey)
            .field("hotkey_label", &self.hotkey_label)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Serializable view of a suggestion for dump output.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSummary {
    pub text: String,
    pub weight: u32,
    pub hotkey: Option<char>,
}

/// The suggestions gathered for one interval.
///
/// Iteration order is most recently added first. The selection walk and
/// dump output both follow this order, so a probe that runs later gets the
/// earlier slot in the cumulative-weight walk.
#[derive(Debug, Default)]
pub struct Registry {
    suggestions: Vec<Suggestion>,
    total_weight: u64,
    armed: Option<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every suggestion and disarm the hotkey. Runs before the probes
    /// of each interval.
    pub fn reset(&mut self) {
        self.suggestions.clear();
        self.total_weight = 0;
        self.armed = None;
    }

    /// Store a suggestion. Empty text is ignored.
    pub fn add(&mut self, suggestion: Suggestion) {
        if suggestion.text.is_empty() {
            return;
        }
        self.total_weight += u64::from(suggestion.weight);
        self.suggestions.push(suggestion);
    }

    /// Convenience for probes that only have text and a weight.
    pub fn add_text(&mut self, text: impl Into<String>, weight: u32) {
        self.add(Suggestion::new(text, weight));
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    /// Suggestions in selection order (most recently added first), paired
    /// with their storage index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Suggestion)> {
        self.suggestions.iter().enumerate().rev()
    }

    /// Every suggestion's text, for dump mode.
    pub fn print_all(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(_, s)| s.text.as_str())
    }

    pub fn summaries(&self) -> Vec<SuggestionSummary> {
        self.iter()
            .map(|(_, s)| SuggestionSummary {
                text: s.text.clone(),
                weight: s.weight,
                hotkey: s.hotkey,
            })
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&Suggestion> {
        self.suggestions.get(index)
    }

    pub(crate) fn arm(&mut self, index: usize) {
        self.armed = self.suggestions.get(index).map(|_| index);
    }

    pub fn armed(&self) -> Option<&Suggestion> {
        self.armed.and_then(|i| self.suggestions.get(i))
    }

    /// Status-bar label of the armed suggestion, if it has one.
    pub fn armed_label(&self) -> Option<&str> {
        self.armed().and_then(|s| s.hotkey_label.as_deref())
    }

    /// Run the armed action if `key` is its hotkey. Returns whether a key
    /// matched; the action's own failure is logged, not propagated.
    pub fn activate(&self, key: char) -> bool {
        let Some(suggestion) = self.armed() else {
            return false;
        };
        let (Some(hotkey), Some(action)) = (suggestion.hotkey, suggestion.action.as_ref()) else {
            return false;
        };
        if hotkey != key.to_ascii_uppercase() {
            return false;
        }
        if let Err(e) = action.activate() {
            log::warn!("suggestion action failed: {}", e);
        }
        true
    }
}
