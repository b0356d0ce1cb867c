//! Remembers how deep each search phrase has been swept so runs resume where the last
//! one stopped.

use crate::config::CursorMode;
use crate::error::Result;
use crate::store::LeadStore;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Cursor key used when every phrase shares one cursor.
pub(crate) const GLOBAL_CURSOR_KEY: &str = "__global__";

/// Page cursors as of run start, plus the pages completed during this run.
///
/// `last_page` and `advance` always answer from the run-start state, so in global
/// mode every phrase is searched at the same page within one run. Completed pages
/// become visible to the next run once [`PageTracker::flush`] has written them.
#[derive(Debug, Clone)]
pub(crate) struct PageTracker {
    mode: CursorMode,
    ceiling: u32,
    keywords: Vec<String>,
    baseline: HashMap<String, u32>,
    /// Cursor cells as found in the store; `None` when the key has no cell yet.
    stored: HashMap<String, Option<u32>>,
    completed: BTreeMap<String, u32>,
    /// Phrases that finished their page this run (global mode).
    finished: HashSet<String>,
}

impl PageTracker {
    /// Rebuilds cursors from the store. A stored cursor cell wins; a key without a
    /// cell falls back to the highest page stored on rows for the phrase.
    ///
    /// Rows of a page cut short by the quota already carry that page number, so the
    /// rows alone would skip the rest of it.
    pub(crate) async fn load<S: LeadStore + ?Sized>(
        store: &S,
        keywords: &[String],
        mode: CursorMode,
        ceiling: u32,
    ) -> Result<Self> {
        let rows = store.rows().await?;
        let mut tracker = Self {
            mode,
            ceiling,
            keywords: keywords.to_vec(),
            baseline: HashMap::new(),
            stored: HashMap::new(),
            completed: BTreeMap::new(),
            finished: HashSet::new(),
        };

        for keyword in keywords {
            let key = tracker.key_for(keyword);
            if tracker.baseline.contains_key(&key) {
                continue;
            }
            let cell = store.read_cursor(&key).await?;
            let last = match cell {
                Some(page) => page,
                None => rows
                    .iter()
                    .filter(|r| mode == CursorMode::Global || r.keyword == *keyword)
                    .map(|r| r.page)
                    .max()
                    .unwrap_or(0),
            };
            tracing::debug!(
                target: "collector",
                "Cursor '{}': cell={:?} -> {}",
                key,
                cell,
                last
            );
            tracker.baseline.insert(key.clone(), last);
            tracker.stored.insert(key, cell);
        }

        Ok(tracker)
    }

    fn key_for(&self, keyword: &str) -> String {
        match self.mode {
            CursorMode::PerKeyword => keyword.to_string(),
            CursorMode::Global => GLOBAL_CURSOR_KEY.to_string(),
        }
    }

    pub(crate) fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Last page fully processed before this run (0 when never searched).
    pub(crate) fn last_page(&self, keyword: &str) -> u32 {
        self.baseline
            .get(&self.key_for(keyword))
            .copied()
            .unwrap_or(0)
    }

    /// The page this run should search for `keyword`.
    pub(crate) fn advance(&self, keyword: &str) -> u32 {
        self.last_page(keyword).saturating_add(1)
    }

    /// Whether `keyword` has reached the ceiling and must not be searched.
    pub(crate) fn is_exhausted(&self, keyword: &str) -> bool {
        self.advance(keyword) > self.ceiling
    }

    /// Notes that `page` was fully processed. Never lowers a cursor and never
    /// records past the ceiling.
    ///
    /// In global mode the shared cursor only moves once every phrase has finished
    /// the page.
    pub(crate) fn record(&mut self, keyword: &str, page: u32) {
        if page > self.ceiling {
            tracing::warn!(
                target: "collector",
                "Ignoring page {} for '{}': above ceiling {}",
                page,
                keyword,
                self.ceiling
            );
            return;
        }
        if self.mode == CursorMode::Global {
            self.finished.insert(keyword.to_string());
            if !self.keywords.iter().all(|k| self.finished.contains(k)) {
                return;
            }
        }
        let key = self.key_for(keyword);
        let current = self
            .completed
            .get(&key)
            .copied()
            .unwrap_or_else(|| self.baseline.get(&key).copied().unwrap_or(0));
        if page > current {
            self.completed.insert(key, page);
        }
    }

    /// Writes every cursor that is ahead of its stored cell or has none. Keys that did
    /// not complete a page keep their run-start value, which pins a page the run
    /// left unfinished.
    pub(crate) async fn flush<S: LeadStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let completed = std::mem::take(&mut self.completed);
        let mut keys: Vec<&String> = self.baseline.keys().collect();
        keys.sort();
        for key in keys {
            let page = completed
                .get(key)
                .copied()
                .unwrap_or_else(|| self.baseline[key]);
            let cell = self.stored.get(key).copied().flatten();
            if cell.is_some_and(|c| c >= page) {
                continue;
            }
            store.write_cursor(key, page).await?;
            self.stored.insert(key.clone(), Some(page));
            if completed.contains_key(key) {
                tracing::info!(target: "collector", "Cursor '{}' advanced to page {}", key, page);
            } else {
                tracing::info!(target: "collector", "Cursor '{}' kept at page {}", key, page);
            }
        }
        Ok(())
    }
}
