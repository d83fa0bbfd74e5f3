use crate::saving::{ANALYTICS_KEY, LocalStorage, load_json, save_json};
use serde::{Deserialize, Serialize};

/// Usage counters. They only grow, except through [`Analytics::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub charts: u64,
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub insights: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Files,
    Charts,
    Rows,
    Insights,
}

impl Analytics {
    pub fn load(storage: &dyn LocalStorage) -> Self {
        load_json(storage, ANALYTICS_KEY).unwrap_or_default()
    }

    pub fn persist(&self, storage: &dyn LocalStorage) {
        save_json(storage, ANALYTICS_KEY, self);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Files => self.files,
            Counter::Charts => self.charts,
            Counter::Rows => self.rows,
            Counter::Insights => self.insights,
        }
    }

    /// Adds `by` to a counter and writes the new totals through.
    pub fn increment(&mut self, counter: Counter, by: u64, storage: &dyn LocalStorage) {
        let slot = match counter {
            Counter::Files => &mut self.files,
            Counter::Charts => &mut self.charts,
            Counter::Rows => &mut self.rows,
            Counter::Insights => &mut self.insights,
        };
        *slot = slot.saturating_add(by);
        self.persist(storage);
    }

    pub fn clear(&mut self, storage: &dyn LocalStorage) {
        *self = Self::default();
        self.persist(storage);
    }
}
