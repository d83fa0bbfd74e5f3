#![cfg(feature = "web")]
//! The client workspace: everything one user session holds and can do.
//!
//! [`Workspace`] owns the current dataset, the upload history, the analytics
//! counters, the auth session and the chart display. Ingestion records every
//! accepted file locally first; syncing its metadata to the server runs in a
//! background task and never blocks or undoes the local record.

use crate::analytics::{Analytics, Counter};
use crate::chart::{ChartKind, build_chart};
use crate::config::ClientConfig;
use crate::dataset::{Preview, RowDataset};
use crate::error::{ChartError, IngestError, RenderError};
use crate::graph::{ChartDisplay, RenderOptions, RenderedChart};
use crate::history::{AnalysisRecord, IdClock, UploadHistoryEntry, UploadHistoryStore};
use crate::insights;
use crate::loader::{self, CandidateFile};
use crate::saving::{FileStorage, LocalStorage};
use crate::session::{AccountView, AuthSession};
use crate::uploads::{NewAnalysis, NewUpload};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const SAMPLE_FILE_NAME: &str = "Sample_Business_Data.xlsx";
pub const AUTOSAVE_PERIOD: Duration = Duration::from_secs(30);
pub const DASHBOARD_RECENT: usize = 5;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn persist_state(
    history: &Mutex<UploadHistoryStore>,
    analytics: &Mutex<Analytics>,
    storage: &dyn LocalStorage,
) {
    lock(history).persist(storage);
    lock(analytics).persist(storage);
}

/// Result of one file in a batch.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file_name: String,
    pub result: Result<UploadHistoryEntry, IngestError>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
}

impl IngestReport {
    pub fn accepted(&self) -> impl Iterator<Item = &UploadHistoryEntry> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &IngestError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSaveOutcome {
    SavedToServer,
    /// Kept locally after the server call failed.
    ServerFailed,
    /// Kept locally; signed out, or the upload never reached the server.
    LocalOnly,
    /// History is empty, so there was nothing to attach the analysis to.
    NoUpload,
}

impl AnalysisSaveOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            AnalysisSaveOutcome::SavedToServer => "Analysis saved to server successfully!",
            AnalysisSaveOutcome::ServerFailed => "Analysis saved locally (server failed).",
            AnalysisSaveOutcome::LocalOnly => {
                "Analysis saved locally. Sign in to persist to server."
            }
            AnalysisSaveOutcome::NoUpload => "Upload a file before saving an analysis.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub analytics: Analytics,
    pub recent: Vec<UploadHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminPanel {
    /// Rough size of the recorded data: one thousandth per row.
    pub storage_estimate: f64,
    pub insights: u64,
    pub account: Option<AccountView>,
}

/// Background autosave; stops when dropped.
#[derive(Debug)]
pub struct AutosaveHandle(JoinHandle<()>);

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Workspace {
    storage: Arc<dyn LocalStorage>,
    session: AuthSession,
    dataset: RowDataset,
    current_file: Option<String>,
    history: Arc<Mutex<UploadHistoryStore>>,
    analytics: Arc<Mutex<Analytics>>,
    clock: IdClock,
    display: ChartDisplay,
    pending_sync: Vec<JoinHandle<()>>,
}

impl Workspace {
    /// Restores history, counters and token from `storage`.
    pub fn new(api_url: &str, storage: Arc<dyn LocalStorage>) -> Self {
        let history = UploadHistoryStore::load(storage.as_ref());
        let analytics = Analytics::load(storage.as_ref());
        let session = AuthSession::new(api_url, Arc::clone(&storage));

        Self {
            storage,
            session,
            dataset: RowDataset::default(),
            current_file: None,
            history: Arc::new(Mutex::new(history)),
            analytics: Arc::new(Mutex::new(analytics)),
            clock: IdClock::default(),
            display: ChartDisplay::new(RenderOptions::default()),
            pending_sync: Vec::new(),
        }
    }

    /// Opens the on-disk workspace described by `config`.
    pub fn open(config: &ClientConfig) -> std::io::Result<Self> {
        let storage = FileStorage::open(&config.home)?;
        Ok(Self::new(&config.api_url, Arc::new(storage)))
    }

    pub fn dataset(&self) -> &RowDataset {
        &self.dataset
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn preview(&self) -> Preview {
        self.dataset.preview()
    }

    pub fn history(&self) -> Vec<UploadHistoryEntry> {
        lock(&self.history).entries().to_vec()
    }

    pub fn analytics(&self) -> Analytics {
        *lock(&self.analytics)
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AuthSession {
        &mut self.session
    }

    pub fn display(&self) -> &ChartDisplay {
        &self.display
    }

    fn count(&self, counter: Counter, by: u64) {
        lock(&self.analytics).increment(counter, by, self.storage.as_ref());
    }

    /// Ingests a batch of files.
    ///
    /// Files are handled one at a time and each one's failure is reported
    /// without stopping the rest. Every accepted file replaces the dataset and
    /// gains a history entry; when signed in its metadata is also sent to the
    /// server in the background (see [`Workspace::wait_for_sync`]).
    pub async fn process_files(&mut self, files: Vec<CandidateFile>) -> IngestReport {
        let mut report = IngestReport::default();

        for file in files {
            let result = match loader::load_records(&file) {
                Ok(records) => {
                    let dataset = RowDataset::from_records(records);
                    let entry = self.adopt_dataset(&file.name, dataset);
                    self.spawn_upload_sync(&entry);
                    Ok(entry)
                }
                Err(e) => {
                    warn!("{}", e);
                    Err(e)
                }
            };
            report.outcomes.push(FileOutcome {
                file_name: file.name,
                result,
            });
        }

        report
    }

    /// Replaces the dataset and records it in history and counters.
    fn adopt_dataset(&mut self, file_name: &str, dataset: RowDataset) -> UploadHistoryEntry {
        let entry = UploadHistoryEntry {
            id: self.clock.next(),
            file_name: file_name.to_string(),
            upload_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            row_count: dataset.len(),
            columns: dataset.columns().to_vec(),
            server_id: None,
            analyses: None,
        };

        {
            let mut history = lock(&self.history);
            history.prepend(entry.clone());
            history.persist(self.storage.as_ref());
        }
        self.count(Counter::Files, 1);
        self.count(Counter::Rows, dataset.len() as u64);

        info!(
            "Loaded {} ({} rows, {} columns)",
            file_name,
            dataset.len(),
            dataset.columns().len()
        );
        self.dataset = dataset;
        self.current_file = Some(file_name.to_string());
        entry
    }

    fn spawn_upload_sync(&mut self, entry: &UploadHistoryEntry) {
        if !self.session.is_authenticated() {
            return;
        }

        let client = self.session.client().clone();
        let history = Arc::clone(&self.history);
        let storage = Arc::clone(&self.storage);
        let entry_id = entry.id;
        let body = NewUpload {
            file_name: Some(entry.file_name.clone()),
            upload_date: DateTime::parse_from_rfc3339(&entry.upload_date)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            row_count: Some(entry.row_count as u64),
            columns: entry.columns.clone(),
        };

        let handle = tokio::spawn(async move {
            match client.create_upload(&body).await {
                Ok(upload) => {
                    let mut history = lock(&history);
                    if history.attach_server_id(entry_id, upload.upload.id.to_string()) {
                        history.persist(storage.as_ref());
                    }
                }
                Err(e) => warn!("Upload persist failed: {}", e),
            }
        });
        self.pending_sync.retain(|h| !h.is_finished());
        self.pending_sync.push(handle);
    }

    /// Waits for every background upload sync started so far.
    pub async fn wait_for_sync(&mut self) {
        for handle in std::mem::take(&mut self.pending_sync) {
            if let Err(e) = handle.await {
                warn!("Upload sync task failed: {}", e);
            }
        }
    }

    /// Loads the built-in demo table. It is recorded like an upload but never
    /// sent to the server.
    pub fn load_sample_data(&mut self) -> UploadHistoryEntry {
        self.adopt_dataset(SAMPLE_FILE_NAME, RowDataset::sample())
    }

    /// Builds and draws a chart, replacing the one on display.
    pub fn generate_chart(
        &mut self,
        x_axis: &str,
        y_axis: &str,
        kind: ChartKind,
    ) -> Result<&RenderedChart, ChartError> {
        let spec = build_chart(&self.dataset, x_axis, y_axis, kind)?;
        let rendered = self.display.show(spec)?;
        lock(&self.analytics).increment(Counter::Charts, 1, self.storage.as_ref());
        Ok(rendered)
    }

    /// PNG bytes of the chart on display.
    pub fn download_chart(&self) -> Result<&[u8], RenderError> {
        self.display.download()
    }

    pub fn generate_insights(&self) -> Vec<String> {
        let insights = insights::analyze(&self.dataset);
        self.count(Counter::Insights, 1);
        insights
    }

    /// Saves the current axis selection as an analysis of the newest upload.
    ///
    /// The analysis is always kept locally. It is sent to the server first
    /// when signed in and that upload has a server id.
    pub async fn save_analysis(
        &mut self,
        x_axis: &str,
        y_axis: &str,
        kind: ChartKind,
    ) -> AnalysisSaveOutcome {
        let server_id = match lock(&self.history).latest() {
            Some(entry) => entry.server_id.clone(),
            None => return AnalysisSaveOutcome::NoUpload,
        };

        let now = Utc::now();
        let record = AnalysisRecord {
            id: self.clock.next(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            x_axis: x_axis.to_string(),
            y_axis: y_axis.to_string(),
            chart_type: kind,
            data_points: self.dataset.len(),
        };

        let outcome = match server_id {
            Some(server_id) if self.session.is_authenticated() => {
                let body = NewAnalysis {
                    x_axis: Some(record.x_axis.clone()),
                    y_axis: Some(record.y_axis.clone()),
                    chart_type: Some(kind.to_string()),
                    data_points: Some(record.data_points as u64),
                    timestamp: Some(now),
                };
                match self.session.client().add_analysis(&server_id, &body).await {
                    Ok(_) => AnalysisSaveOutcome::SavedToServer,
                    Err(e) => {
                        warn!("Failed to save analysis to server: {}", e);
                        AnalysisSaveOutcome::ServerFailed
                    }
                }
            }
            _ => AnalysisSaveOutcome::LocalOnly,
        };

        let mut history = lock(&self.history);
        history.append_analysis(record);
        history.persist(self.storage.as_ref());
        outcome
    }

    pub fn delete_history_item(&self, id: i64) -> bool {
        let mut history = lock(&self.history);
        let removed = history.delete(id);
        if removed {
            history.persist(self.storage.as_ref());
        }
        removed
    }

    /// Forgets history, counters, the dataset and the chart on display.
    pub fn clear_all(&mut self) {
        {
            let mut history = lock(&self.history);
            history.clear();
            history.persist(self.storage.as_ref());
        }
        lock(&self.analytics).clear(self.storage.as_ref());
        self.dataset = RowDataset::default();
        self.current_file = None;
        self.display.release();
        info!("All data cleared");
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard {
            analytics: self.analytics(),
            recent: lock(&self.history).recent(DASHBOARD_RECENT).to_vec(),
        }
    }

    pub async fn admin_panel(&self) -> AdminPanel {
        let storage_estimate = lock(&self.history)
            .entries()
            .iter()
            .map(|e| e.row_count as f64 * 0.001)
            .sum();

        AdminPanel {
            storage_estimate,
            insights: self.analytics().insights,
            account: self.session.account_view().await,
        }
    }

    /// Writes history and counters to storage right now.
    pub fn persist(&self) {
        persist_state(&self.history, &self.analytics, self.storage.as_ref());
    }

    /// Starts a task that writes history and counters every `period`, on top
    /// of the writes every change already does.
    pub fn spawn_autosave(&self, period: Duration) -> AutosaveHandle {
        let history = Arc::clone(&self.history);
        let analytics = Arc::clone(&self.analytics);
        let storage = Arc::clone(&self.storage);

        AutosaveHandle(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                persist_state(&history, &analytics, storage.as_ref());
                debug!("Autosaved history and analytics");
            }
        }))
    }
}
