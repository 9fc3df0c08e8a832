//! Topic history and display preferences, persisted as JSON

use crate::chart::{ChartKind, RenderOptions};
use crate::data::PeriodSelector;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, warn};

/// Default number of remembered topics
pub const DEFAULT_HISTORY_CAPACITY: usize = 40;

/// A topic the user forecast successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHistoryItem {
    pub topic: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_selector: Option<String>,
}

/// Most-recent-first list of submitted topics
#[derive(Debug, Clone, PartialEq)]
pub struct TopicHistory {
    items: VecDeque<TopicHistoryItem>,
    capacity: usize,
}

impl Default for TopicHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TopicHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a submission.
    ///
    /// A repeat of the head topic (ignoring case) only refreshes the head.
    /// Otherwise the topic moves to the head, dropping any older copy.
    pub fn record(&mut self, topic: &str, period: Option<PeriodSelector>, at: DateTime<Utc>) {
        let topic = topic.trim();
        if topic.is_empty() {
            return;
        }

        let item = TopicHistoryItem {
            topic: topic.to_string(),
            at,
            period_selector: period.map(|p| p.to_string()),
        };

        if let Some(head) = self.items.front_mut() {
            if same_topic(&head.topic, topic) {
                *head = item;
                return;
            }
        }

        self.items.retain(|existing| !same_topic(&existing.topic, topic));
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    pub fn items(&self) -> impl Iterator<Item = &TopicHistoryItem> {
        self.items.iter()
    }

    pub fn head(&self) -> Option<&TopicHistoryItem> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Load from `path`; a missing or unreadable file gives an empty history
    pub fn load<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let items: Vec<TopicHistoryItem> = read_json_or_default(path.as_ref())?;
        let mut history = Self::new(capacity);
        history.items = items.into_iter().take(history.capacity).collect();
        Ok(history)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let items: Vec<&TopicHistoryItem> = self.items.iter().collect();
        write_json(path.as_ref(), &items)
    }
}

fn same_topic(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Display choices remembered between sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub show_moving_average: bool,
    pub chart_kind: ChartKind,
    pub period: PeriodSelector,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_moving_average: true,
            chart_kind: ChartKind::Line,
            period: PeriodSelector::default(),
        }
    }
}

impl Preferences {
    /// Chart options for these preferences
    pub fn render_options(&self, moving_average_window: usize) -> RenderOptions {
        RenderOptions {
            show_moving_average: self.show_moving_average,
            chart_kind: self.chart_kind,
            moving_average_window,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json_or_default(path.as_ref())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        debug!(path = %path.display(), "No stored file, using defaults");
        return Ok(T::default());
    }

    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Stored file is corrupt, using defaults");
            Ok(T::default())
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}
