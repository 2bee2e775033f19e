//! View state and its transitions.
//!
//! [`reduce`] is a pure function from the current state and an [`Action`]
//! to the next state. [`StateStore`] holds the current snapshot and
//! publishes every change over a watch channel. Fetch results carry the
//! context they were requested for and are dropped when it no longer
//! matches the selection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use bullscope_models::{ConnectionState, JobInfo, JobLogs, JobState, QueueInfo};

/// Which screen is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Queues,
    Jobs,
    JobDetail,
}

/// Tabs of the job detail screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailTab {
    #[default]
    Info,
    Data,
    Error,
    Result,
    Logs,
}

impl DetailTab {
    pub const ALL: [DetailTab; 5] = [
        DetailTab::Info,
        DetailTab::Data,
        DetailTab::Error,
        DetailTab::Result,
        DetailTab::Logs,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DetailTab::Info => "Info",
            DetailTab::Data => "Data",
            DetailTab::Error => "Error",
            DetailTab::Result => "Result",
            DetailTab::Logs => "Logs",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Everything the renderer needs, and nothing it may change.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub connection: ConnectionState,
    /// Every known queue name, sorted.
    pub queue_names: Vec<String>,
    pub queues: HashMap<String, QueueInfo>,
    /// Job list of the selected queue and status filter.
    pub jobs: Vec<JobInfo>,
    pub selected_queue: Option<String>,
    pub selected_job: Option<JobInfo>,
    pub screen: Screen,
    pub job_status_filter: JobState,
    pub queue_filter: String,
    pub filtering: bool,
    pub job_logs: Option<JobLogs>,
    pub detail_tab: DetailTab,
}

impl ViewState {
    /// Queue names matching the text filter, case-insensitively.
    pub fn filtered_queue_names(&self) -> Vec<&str> {
        let needle = self.queue_filter.to_lowercase();
        self.queue_names
            .iter()
            .filter(|name| needle.is_empty() || name.to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    pub fn selected_queue_info(&self) -> Option<&QueueInfo> {
        self.selected_queue
            .as_ref()
            .and_then(|name| self.queues.get(name))
    }

    pub fn selected_job_id(&self) -> Option<&str> {
        self.selected_job.as_ref().map(|job| job.id.as_str())
    }

    fn is_current_list(&self, queue: &str, status: JobState) -> bool {
        self.selected_queue.as_deref() == Some(queue) && self.job_status_filter == status
    }

    fn is_current_job(&self, queue: &str, job_id: &str) -> bool {
        self.screen == Screen::JobDetail
            && self.selected_queue.as_deref() == Some(queue)
            && self.selected_job_id() == Some(job_id)
    }
}

/// Every way the view state can change.
#[derive(Debug, Clone)]
pub enum Action {
    SetConnection(ConnectionState),
    SetQueueNames(Vec<String>),
    /// Fresh snapshots for some queues; others keep their prior snapshot.
    UpdateQueues(Vec<QueueInfo>),
    SelectQueue(String),
    ClearQueue,
    SelectJob(JobInfo),
    ClearJob,
    /// Walk one level up: detail to list, list to queues.
    Back,
    SetStatusFilter(JobState),
    JobsLoaded {
        queue: String,
        status: JobState,
        jobs: Vec<JobInfo>,
    },
    JobLoaded {
        queue: String,
        job_id: String,
        job: Option<JobInfo>,
    },
    LogsLoaded {
        queue: String,
        job_id: String,
        logs: JobLogs,
    },
    StartFilter,
    FilterInput(char),
    FilterBackspace,
    ConfirmFilter,
    CancelFilter,
    SetDetailTab(DetailTab),
}

/// Apply `action` to `state`.
pub fn reduce(state: &ViewState, action: Action) -> ViewState {
    let mut next = state.clone();
    match action {
        Action::SetConnection(connection) => next.connection = connection,
        Action::SetQueueNames(names) => next.queue_names = names,
        Action::UpdateQueues(infos) => {
            for info in infos {
                next.queues.insert(info.name.clone(), info);
            }
        }
        Action::SelectQueue(name) => {
            next.selected_queue = Some(name);
            next.screen = Screen::Jobs;
            clear_jobs(&mut next);
        }
        Action::ClearQueue => clear_queue(&mut next),
        Action::SelectJob(job) => {
            if next.selected_queue.is_some() {
                next.selected_job = Some(job);
                next.screen = Screen::JobDetail;
                next.job_logs = None;
                next.detail_tab = DetailTab::Info;
            }
        }
        Action::ClearJob => clear_job(&mut next),
        Action::Back => match next.screen {
            Screen::JobDetail => clear_job(&mut next),
            Screen::Jobs => clear_queue(&mut next),
            Screen::Queues => {}
        },
        Action::SetStatusFilter(status) => {
            if next.job_status_filter != status {
                next.job_status_filter = status;
                next.jobs.clear();
            }
        }
        Action::JobsLoaded { queue, status, jobs } => {
            if next.is_current_list(&queue, status) {
                next.jobs = jobs;
            } else {
                debug!(queue = %queue, status = %status, "Dropped stale job list");
            }
        }
        Action::JobLoaded { queue, job_id, job } => {
            if !next.is_current_job(&queue, &job_id) {
                debug!(queue = %queue, job_id = %job_id, "Dropped stale job");
            } else if let Some(job) = job {
                next.selected_job = Some(job);
            }
        }
        Action::LogsLoaded { queue, job_id, logs } => {
            if next.is_current_job(&queue, &job_id) {
                next.job_logs = Some(logs);
            }
        }
        Action::StartFilter => {
            if next.screen == Screen::Queues {
                next.filtering = true;
            }
        }
        Action::FilterInput(c) => {
            if next.filtering {
                next.queue_filter.push(c);
            }
        }
        Action::FilterBackspace => {
            if next.filtering {
                next.queue_filter.pop();
            }
        }
        Action::ConfirmFilter => next.filtering = false,
        Action::CancelFilter => {
            next.filtering = false;
            next.queue_filter.clear();
        }
        Action::SetDetailTab(tab) => next.detail_tab = tab,
    }
    next
}

fn clear_jobs(state: &mut ViewState) {
    state.jobs.clear();
    clear_job(state);
}

fn clear_job(state: &mut ViewState) {
    state.selected_job = None;
    state.job_logs = None;
    state.detail_tab = DetailTab::Info;
    if state.selected_queue.is_some() {
        state.screen = Screen::Jobs;
    }
}

fn clear_queue(state: &mut ViewState) {
    state.selected_queue = None;
    clear_jobs(state);
    state.screen = Screen::Queues;
}

/// Holder of the current [`ViewState`] snapshot.
pub struct StateStore {
    tx: watch::Sender<Arc<ViewState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(ViewState::default())
    }
}

impl StateStore {
    pub fn new(initial: ViewState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ViewState> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
        self.tx.subscribe()
    }

    /// Apply an action and publish the result.
    pub fn dispatch(&self, action: Action) -> Arc<ViewState> {
        let next = Arc::new(reduce(&self.snapshot(), action));
        self.tx.send_replace(Arc::clone(&next));
        next
    }
}
