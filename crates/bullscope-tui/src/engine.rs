//! Sync engine.
//!
//! The engine is the single owner of the [`StateStore`]. Store calls run on
//! spawned tasks and report back as [`EngineMsg`]s over an unbounded
//! channel; the runtime loop feeds those messages into
//! [`Engine::handle_msg`]. Every message is tagged with the connection epoch
//! it was started under and is discarded once a newer (re)connect began.
//!
//! Push events never change state. For the selected queue they schedule a
//! job-list refetch, coalesced with any fetch already in flight.
//!
//! A store call failing with a connection error while connected moves the
//! view to the error state, from which Enter reconnects.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use bullscope_models::{ConnectionState, JobInfo, JobLogs, JobState, QueueEvent};
use bullscope_queue::{
    poll_queues, split_polls, EventListener, ListenerId, QueueError, QueuePoll, QueueResult,
    QueueStore,
};

use crate::config::EngineConfig;
use crate::state::{Action, DetailTab, Screen, StateStore, ViewState};

/// Result of a spawned store call.
#[derive(Debug)]
pub enum EngineMsg {
    /// Connect followed by discovery.
    Connected {
        epoch: u64,
        result: QueueResult<Vec<String>>,
    },
    Discovered {
        epoch: u64,
        result: QueueResult<Vec<String>>,
    },
    Polled {
        epoch: u64,
        polls: Vec<QueuePoll>,
    },
    JobsFetched {
        epoch: u64,
        queue: String,
        status: JobState,
        result: QueueResult<Vec<JobInfo>>,
    },
    DetailFetched {
        epoch: u64,
        queue: String,
        job_id: String,
        job: QueueResult<Option<JobInfo>>,
        logs: QueueResult<JobLogs>,
    },
    Subscribed {
        epoch: u64,
        queue: String,
        result: QueueResult<ListenerId>,
    },
    Event {
        epoch: u64,
        event: QueueEvent,
    },
}

impl EngineMsg {
    pub fn epoch(&self) -> u64 {
        match self {
            EngineMsg::Connected { epoch, .. }
            | EngineMsg::Discovered { epoch, .. }
            | EngineMsg::Polled { epoch, .. }
            | EngineMsg::JobsFetched { epoch, .. }
            | EngineMsg::DetailFetched { epoch, .. }
            | EngineMsg::Subscribed { epoch, .. }
            | EngineMsg::Event { epoch, .. } => *epoch,
        }
    }
}

fn send(tx: &mpsc::UnboundedSender<EngineMsg>, msg: EngineMsg) {
    // The receiver only goes away at shutdown.
    let _ = tx.send(msg);
}

/// Drives the store and owns the view state.
pub struct Engine<S: QueueStore + ?Sized + 'static> {
    store: Arc<S>,
    state: StateStore,
    config: EngineConfig,
    tx: mpsc::UnboundedSender<EngineMsg>,
    epoch: u64,
    poll_in_flight: bool,
    jobs_in_flight: bool,
    jobs_dirty: bool,
    detail_in_flight: bool,
    detail_dirty: bool,
    subscriptions: HashMap<String, ListenerId>,
    subscribing: HashSet<String>,
}

impl<S: QueueStore + ?Sized + 'static> Engine<S> {
    /// Create an engine and the receiver its results arrive on.
    pub fn new(store: Arc<S>, config: EngineConfig) -> (Self, mpsc::UnboundedReceiver<EngineMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            store,
            state: StateStore::default(),
            config,
            tx,
            epoch: 0,
            poll_in_flight: false,
            jobs_in_flight: false,
            jobs_dirty: false,
            detail_in_flight: false,
            detail_dirty: false,
            subscriptions: HashMap::new(),
            subscribing: HashSet::new(),
        };
        (engine, rx)
    }

    /// Current view state snapshot.
    pub fn state(&self) -> Arc<ViewState> {
        self.state.snapshot()
    }

    pub fn watch_state(&self) -> watch::Receiver<Arc<ViewState>> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply a state-only action.
    pub fn dispatch(&self, action: Action) -> Arc<ViewState> {
        self.state.dispatch(action)
    }

    /// Tear down any connection and connect again, under a new epoch.
    pub fn start_connect(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.poll_in_flight = false;
        self.jobs_in_flight = false;
        self.jobs_dirty = false;
        self.detail_in_flight = false;
        self.detail_dirty = false;
        self.subscriptions.clear();
        self.subscribing.clear();
        self.dispatch(Action::SetConnection(ConnectionState::Connecting));
        info!(epoch, "Starting connection");

        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match store.reconnect().await {
                Ok(()) => store.discover_queues().await,
                Err(e) => Err(e),
            };
            send(&tx, EngineMsg::Connected { epoch, result });
        });
    }

    /// Rediscover queues and poll everything now.
    pub fn refresh(&mut self) {
        let snapshot = self.state.snapshot();
        if !snapshot.connection.is_connected() {
            self.start_connect();
            return;
        }
        debug!("Manual refresh");

        let epoch = self.epoch;
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = store.discover_queues().await;
            send(&tx, EngineMsg::Discovered { epoch, result });
        });

        self.request_jobs();
        self.request_job_detail();
    }

    /// Metadata ticker: poll counts for every known queue.
    pub fn on_metadata_tick(&mut self) {
        let snapshot = self.state.snapshot();
        if !snapshot.connection.is_connected()
            || self.poll_in_flight
            || snapshot.queue_names.is_empty()
        {
            return;
        }
        self.poll_in_flight = true;

        let epoch = self.epoch;
        let names = snapshot.queue_names.clone();
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let polls = poll_queues(store.as_ref(), &names).await;
            send(&tx, EngineMsg::Polled { epoch, polls });
        });
    }

    /// Job ticker: refetch the open list, and the open job in detail view.
    pub fn on_jobs_tick(&mut self) {
        self.request_jobs();
        self.request_job_detail();
    }

    pub fn select_queue(&mut self, name: String) {
        debug!(queue = %name, "Selected queue");
        self.dispatch(Action::SelectQueue(name));
        self.request_jobs();
    }

    pub fn select_job(&mut self, job: JobInfo) {
        debug!(job_id = %job.id, "Selected job");
        self.dispatch(Action::SelectJob(job));
        self.request_job_detail();
    }

    pub fn back(&mut self) {
        self.dispatch(Action::Back);
    }

    pub fn set_status_filter(&mut self, status: JobState) {
        let changed = self.state.snapshot().job_status_filter != status;
        self.dispatch(Action::SetStatusFilter(status));
        if changed {
            self.request_jobs();
        }
    }

    pub fn set_detail_tab(&mut self, tab: DetailTab) {
        self.dispatch(Action::SetDetailTab(tab));
    }

    fn request_jobs(&mut self) {
        let snapshot = self.state.snapshot();
        let Some(queue) = snapshot.selected_queue.clone() else {
            return;
        };
        if !snapshot.connection.is_connected() {
            return;
        }
        if self.jobs_in_flight {
            self.jobs_dirty = true;
            return;
        }
        self.jobs_in_flight = true;

        let epoch = self.epoch;
        let status = snapshot.job_status_filter;
        let end = self.config.job_page_end();
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = store.list_jobs(&queue, status, 0, end).await;
            send(
                &tx,
                EngineMsg::JobsFetched {
                    epoch,
                    queue,
                    status,
                    result,
                },
            );
        });
    }

    fn request_job_detail(&mut self) {
        let snapshot = self.state.snapshot();
        if snapshot.screen != Screen::JobDetail || !snapshot.connection.is_connected() {
            return;
        }
        if self.detail_in_flight {
            self.detail_dirty = true;
            return;
        }
        let (Some(queue), Some(job_id)) = (
            snapshot.selected_queue.clone(),
            snapshot.selected_job_id().map(str::to_string),
        ) else {
            return;
        };
        self.detail_in_flight = true;

        let epoch = self.epoch;
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let (job, logs) = tokio::join!(
                store.get_job(&queue, &job_id),
                store.job_logs(&queue, &job_id)
            );
            send(
                &tx,
                EngineMsg::DetailFetched {
                    epoch,
                    queue,
                    job_id,
                    job,
                    logs,
                },
            );
        });
    }

    /// Move to the error state when `err` means the link is gone. Returns
    /// whether it did.
    fn connection_lost(&mut self, err: &QueueError) -> bool {
        if !err.is_connection_error() || !self.state.snapshot().connection.is_connected() {
            return false;
        }
        warn!(epoch = self.epoch, "Lost connection: {}", err);
        self.poll_in_flight = false;
        self.jobs_dirty = false;
        self.detail_dirty = false;
        self.dispatch(Action::SetConnection(ConnectionState::error(err.to_string())));
        true
    }

    fn event_listener(&self) -> EventListener {
        let tx = self.tx.clone();
        let epoch = self.epoch;
        Arc::new(move |event: &QueueEvent| {
            send(
                &tx,
                EngineMsg::Event {
                    epoch,
                    event: event.clone(),
                },
            );
        })
    }

    fn subscribe_queues(&mut self, names: &[String]) {
        for name in names {
            if self.subscriptions.contains_key(name) || !self.subscribing.insert(name.clone()) {
                continue;
            }
            let listener = self.event_listener();
            let epoch = self.epoch;
            let queue = name.clone();
            let store = Arc::clone(&self.store);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result = store.subscribe(&queue, listener).await;
                send(&tx, EngineMsg::Subscribed { epoch, queue, result });
            });
        }
    }

    fn apply_queue_names(&mut self, names: Vec<String>) {
        self.subscribe_queues(&names);
        self.dispatch(Action::SetQueueNames(names));
        self.on_metadata_tick();
    }

    /// Fold one store result into the view state.
    pub fn handle_msg(&mut self, msg: EngineMsg) {
        if msg.epoch() != self.epoch {
            debug!(
                msg_epoch = msg.epoch(),
                epoch = self.epoch,
                "Discarded result from an earlier connection"
            );
            return;
        }

        match msg {
            EngineMsg::Connected { result, .. } => match result {
                Ok(names) => {
                    info!(queues = names.len(), "Connected");
                    self.dispatch(Action::SetConnection(ConnectionState::Connected));
                    self.apply_queue_names(names);
                    self.request_jobs();
                    self.request_job_detail();
                }
                Err(e) => {
                    warn!("Connection failed: {}", e);
                    self.dispatch(Action::SetConnection(ConnectionState::error(e.to_string())));
                }
            },
            EngineMsg::Discovered { result, .. } => match result {
                Ok(names) => self.apply_queue_names(names),
                Err(e) => {
                    if !self.connection_lost(&e) {
                        warn!("Queue discovery failed: {}", e);
                    }
                }
            },
            EngineMsg::Polled { polls, .. } => {
                self.poll_in_flight = false;
                let (fresh, failed) = split_polls(polls);
                for (queue, e) in &failed {
                    debug!(queue = %queue, "Queue poll failed: {}", e);
                }
                if !fresh.is_empty() {
                    self.dispatch(Action::UpdateQueues(fresh));
                } else if let Some((_, e)) = failed.first() {
                    self.connection_lost(e);
                }
            }
            EngineMsg::JobsFetched {
                queue,
                status,
                result,
                ..
            } => {
                self.jobs_in_flight = false;
                let jobs = match result {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        debug!(queue = %queue, status = %status, "Job list fetch failed: {}", e);
                        if self.connection_lost(&e) {
                            return;
                        }
                        Vec::new()
                    }
                };
                self.dispatch(Action::JobsLoaded { queue, status, jobs });
                if self.jobs_dirty {
                    self.jobs_dirty = false;
                    self.request_jobs();
                }
            }
            EngineMsg::DetailFetched {
                queue,
                job_id,
                job,
                logs,
                ..
            } => {
                self.detail_in_flight = false;
                match job {
                    Ok(job) => {
                        self.dispatch(Action::JobLoaded {
                            queue: queue.clone(),
                            job_id: job_id.clone(),
                            job,
                        });
                    }
                    Err(e) => {
                        debug!(queue = %queue, job_id = %job_id, "Job fetch failed: {}", e);
                        self.connection_lost(&e);
                    }
                }
                match logs {
                    Ok(logs) => {
                        self.dispatch(Action::LogsLoaded { queue, job_id, logs });
                    }
                    Err(e) => debug!(queue = %queue, job_id = %job_id, "Log fetch failed: {}", e),
                }
                if self.detail_dirty {
                    self.detail_dirty = false;
                    self.request_job_detail();
                }
            }
            EngineMsg::Subscribed { queue, result, .. } => {
                self.subscribing.remove(&queue);
                match result {
                    Ok(id) => {
                        self.subscriptions.insert(queue, id);
                    }
                    Err(e) => debug!(queue = %queue, "Event subscription failed: {}", e),
                }
            }
            EngineMsg::Event { event, .. } => self.on_event(event),
        }
    }

    fn on_event(&mut self, event: QueueEvent) {
        debug!(
            queue = %event.queue,
            kind = event.kind.as_str(),
            job_id = %event.job_id,
            "Queue event"
        );
        if !self.config.event_refresh {
            return;
        }
        let snapshot = self.state.snapshot();
        if snapshot.selected_queue.as_deref() != Some(event.queue.as_str()) {
            return;
        }
        self.request_jobs();
        if snapshot.selected_job_id() == Some(event.job_id.as_str()) {
            self.request_job_detail();
        }
    }

    /// Drop listeners and close the connection. Results still in flight are
    /// discarded.
    pub async fn shutdown(&mut self) {
        self.epoch += 1;
        for (queue, id) in self.subscriptions.drain() {
            self.store.unsubscribe(&queue, id).await;
        }
        self.subscribing.clear();
        self.store.disconnect().await;
        self.dispatch(Action::SetConnection(ConnectionState::Disconnected));
        info!("Engine stopped");
    }
}
