//! Completed work sessions: bounded log, filters, statistics and export.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Local, NaiveDate};
use pomelo_ipc::{ExportFormat, HistoryEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cycle::{HistorySink, Settings};
use crate::persistence::Persistence;

/// Only the most recent sessions are retained.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Work,
}

/// Durations are seconds except the three configured durations, which are
/// kept in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub planned_duration: u64,
    pub actual_duration: u64,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub work_duration: u64,
    pub short_break: u64,
    pub long_break: u64,
}

impl HistoryRecord {
    pub fn work(
        name: &str,
        planned: u64,
        start_time: DateTime<Local>,
        end_time: DateTime<Local>,
        settings: &Settings,
    ) -> Self {
        let elapsed_ms = (end_time - start_time).num_milliseconds().max(0) as u64;
        Self {
            name: name.to_string(),
            kind: RecordKind::Work,
            planned_duration: planned,
            actual_duration: (elapsed_ms + 500) / 1000,
            start_time,
            end_time,
            work_duration: settings.work_duration / 60,
            short_break: settings.short_break / 60,
            long_break: settings.long_break / 60,
        }
    }

    pub fn actual_minutes(&self) -> u64 {
        round_minutes(self.actual_duration)
    }

    pub fn planned_minutes(&self) -> u64 {
        round_minutes(self.planned_duration)
    }

    pub fn to_entry(&self) -> HistoryEntry {
        HistoryEntry {
            name: self.name.clone(),
            start_time: self.start_time,
            planned: self.planned_duration,
            actual: self.actual_duration,
        }
    }
}

fn round_minutes(secs: u64) -> u64 {
    (secs + 30) / 60
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("No session data to export")]
    NothingToExport,

    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: VecDeque<HistoryRecord>,
}

impl History {
    pub fn from_records(records: impl IntoIterator<Item = HistoryRecord>) -> Self {
        let mut history = Self::default();
        for record in records {
            history.append(record);
        }
        history
    }

    /// Appends, evicting the oldest records beyond [`HISTORY_LIMIT`].
    pub fn append(&mut self, record: HistoryRecord) {
        self.records.push_back(record);
        while self.records.len() > HISTORY_LIMIT {
            self.records.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest first, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn newest_first(&self) -> Vec<&HistoryRecord> {
        let mut records: Vec<_> = self.records.iter().collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records
    }

    pub fn filter(&self, filter: &HistoryFilter) -> Vec<&HistoryRecord> {
        self.newest_first()
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect()
    }

    pub fn stats(&self, today: NaiveDate) -> HistoryStats {
        let total_minutes: u64 = self.records.iter().map(|r| r.actual_minutes()).sum();
        let total_sessions = self.records.len();
        let average_minutes = if total_sessions > 0 {
            (total_minutes as f64 / total_sessions as f64).round() as u64
        } else {
            0
        };
        let today_sessions = self
            .records
            .iter()
            .filter(|r| r.start_time.date_naive() == today)
            .count();
        HistoryStats {
            total_sessions,
            total_minutes,
            average_minutes,
            today_sessions,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub date: Option<NaiveDate>,
    pub name: Option<String>,
}

impl HistoryFilter {
    fn matches(&self, record: &HistoryRecord) -> bool {
        let date_ok = self
            .date
            .map_or(true, |date| record.start_time.date_naive() == date);
        let name_ok = match self.name.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => record
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        };
        date_ok && name_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    pub total_sessions: usize,
    pub total_minutes: u64,
    pub average_minutes: u64,
    pub today_sessions: usize,
}

impl HistoryStats {
    pub fn total_time_label(&self) -> String {
        format!("{}h {}m", self.total_minutes / 60, self.total_minutes % 60)
    }
}

pub fn export(records: &[&HistoryRecord], format: ExportFormat) -> Result<String, HistoryError> {
    match format {
        ExportFormat::Json => export_json(records),
        ExportFormat::Csv => export_csv(records),
    }
}

pub fn export_json(records: &[&HistoryRecord]) -> Result<String, HistoryError> {
    if records.is_empty() {
        return Err(HistoryError::NothingToExport);
    }
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn export_csv(records: &[&HistoryRecord]) -> Result<String, HistoryError> {
    if records.is_empty() {
        return Err(HistoryError::NothingToExport);
    }
    let mut rows = vec![String::from(
        "Session Name,Start Time,End Time,Planned Duration (min),Actual Duration (min),Work Duration,Short Break,Long Break",
    )];
    for r in records {
        rows.push(format!(
            "\"{}\",\"{}\",\"{}\",{},{},{},{},{}",
            r.name.replace('"', "\"\""),
            r.start_time.to_rfc3339(),
            r.end_time.to_rfc3339(),
            r.planned_minutes(),
            r.actual_minutes(),
            r.work_duration,
            r.short_break,
            r.long_break
        ));
    }
    Ok(rows.join("\n"))
}

/// History shared between the cycle machine, which appends to it, and the
/// UI, which reads it. Every append is written through to disk.
#[derive(Clone)]
pub struct SharedHistory {
    inner: Rc<RefCell<History>>,
    store: Option<Persistence>,
}

impl SharedHistory {
    pub fn new(history: History, store: Option<Persistence>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(history)),
            store,
        }
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, History> {
        self.inner.borrow()
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.inner.borrow_mut().clear();
        self.persist()
    }

    fn persist(&self) -> anyhow::Result<()> {
        match &self.store {
            Some(store) => store.save_history(&self.inner.borrow()),
            None => Ok(()),
        }
    }
}

impl HistorySink for SharedHistory {
    fn append(&mut self, record: &HistoryRecord) -> anyhow::Result<()> {
        self.inner.borrow_mut().append(record.clone());
        self.persist()
    }
}
