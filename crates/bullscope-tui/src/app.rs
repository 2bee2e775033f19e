//! Key handling on top of the engine.
//!
//! [`App`] owns the engine, the two list viewports and the key mapper.
//! Commands only dispatch actions or schedule fetches; nothing here awaits
//! the store.

use crossterm::event::KeyEvent;
use tracing::debug;

use bullscope_queue::QueueStore;

use crate::engine::Engine;
use crate::input::{Command, KeyContext, KeyMapper};
use crate::state::{Action, Screen};
use crate::viewport::Viewport;

pub struct App<S: QueueStore + ?Sized + 'static> {
    pub engine: Engine<S>,
    pub queue_view: Viewport,
    pub job_view: Viewport,
    /// First visible line of the job detail body.
    pub detail_scroll: u16,
    keys: KeyMapper,
    should_quit: bool,
}

impl<S: QueueStore + ?Sized + 'static> App<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine,
            queue_view: Viewport::default(),
            job_view: Viewport::default(),
            detail_scroll: 0,
            keys: KeyMapper::new(),
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Set the number of list rows the screen can show.
    pub fn resize(&mut self, queue_rows: usize, job_rows: usize) {
        self.queue_view.resize(queue_rows);
        self.job_view.resize(job_rows);
    }

    /// Bring the viewports in line with the current list lengths.
    pub fn sync_viewports(&mut self) {
        let state = self.engine.state();
        self.queue_view
            .set_item_count(state.filtered_queue_names().len());
        self.job_view.set_item_count(state.jobs.len());
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let state = self.engine.state();
        let ctx = KeyContext {
            screen: state.screen,
            filtering: state.filtering,
            connection_error: state.connection.is_error(),
        };
        if let Some(command) = self.keys.map(key, ctx) {
            self.apply(command);
        }
    }

    pub fn apply(&mut self, command: Command) {
        debug!(?command, "Key command");
        let state = self.engine.state();
        match command {
            Command::Quit => self.should_quit = true,
            Command::Reconnect => self.engine.start_connect(),
            Command::Refresh => self.engine.refresh(),
            Command::StartFilter => {
                self.engine.dispatch(Action::StartFilter);
            }
            Command::FilterChar(c) => self.filter(Action::FilterInput(c)),
            Command::FilterBackspace => self.filter(Action::FilterBackspace),
            Command::ConfirmFilter => self.filter(Action::ConfirmFilter),
            Command::CancelFilter => self.filter(Action::CancelFilter),
            Command::Select => match state.screen {
                Screen::Queues => {
                    let names = state.filtered_queue_names();
                    if let Some(name) = names.get(self.queue_view.cursor()) {
                        self.engine.select_queue(name.to_string());
                        self.job_view.top();
                    }
                }
                Screen::Jobs => {
                    if let Some(job) = state.jobs.get(self.job_view.cursor()) {
                        self.engine.select_job(job.clone());
                        self.detail_scroll = 0;
                    }
                }
                Screen::JobDetail => {}
            },
            Command::Back => self.engine.back(),
            Command::NextTab | Command::PrevTab => {
                let forward = command == Command::NextTab;
                match state.screen {
                    Screen::Jobs => {
                        let status = if forward {
                            state.job_status_filter.next_tab()
                        } else {
                            state.job_status_filter.prev_tab()
                        };
                        self.engine.set_status_filter(status);
                        self.job_view.top();
                    }
                    Screen::JobDetail => {
                        let tab = if forward {
                            state.detail_tab.next()
                        } else {
                            state.detail_tab.prev()
                        };
                        self.engine.set_detail_tab(tab);
                        self.detail_scroll = 0;
                    }
                    Screen::Queues => {}
                }
            }
            Command::Up
            | Command::Down
            | Command::Top
            | Command::Bottom
            | Command::PageUp
            | Command::PageDown => self.navigate(state.screen, command),
        }
        self.sync_viewports();
    }

    fn filter(&mut self, action: Action) {
        self.engine.dispatch(action);
        self.queue_view.top();
    }

    fn navigate(&mut self, screen: Screen, command: Command) {
        let view = match screen {
            Screen::Queues => &mut self.queue_view,
            Screen::Jobs => &mut self.job_view,
            Screen::JobDetail => {
                self.detail_scroll = match command {
                    Command::Up => self.detail_scroll.saturating_sub(1),
                    Command::Down => self.detail_scroll.saturating_add(1),
                    Command::PageUp => self.detail_scroll.saturating_sub(10),
                    Command::PageDown => self.detail_scroll.saturating_add(10),
                    Command::Top => 0,
                    _ => self.detail_scroll,
                };
                return;
            }
        };
        match command {
            Command::Up => view.move_up(),
            Command::Down => view.move_down(),
            Command::Top => view.top(),
            Command::Bottom => view.bottom(),
            Command::PageUp => view.page_up(),
            Command::PageDown => view.page_down(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use crossterm::event::{KeyCode, KeyModifiers};

    use bullscope_models::{ConnectionState, JobInfo, JobLogs, JobState, QueueInfo};
    use bullscope_queue::{EventListener, ListenerId, QueueError, QueueResult};

    use crate::config::EngineConfig;

    /// Store that is never reached; these tests only exercise local state.
    struct OfflineStore;

    #[async_trait]
    impl QueueStore for OfflineStore {
        async fn connect(&self) -> QueueResult<()> {
            Err(QueueError::NotConnected)
        }
        async fn disconnect(&self) {}
        async fn connection_state(&self) -> ConnectionState {
            ConnectionState::Disconnected
        }
        async fn discover_queues(&self) -> QueueResult<Vec<String>> {
            Err(QueueError::NotConnected)
        }
        async fn queue_info(&self, _queue: &str) -> QueueResult<QueueInfo> {
            Err(QueueError::NotConnected)
        }
        async fn list_jobs(
            &self,
            _queue: &str,
            _state: JobState,
            _start: usize,
            _end: usize,
        ) -> QueueResult<Vec<JobInfo>> {
            Err(QueueError::NotConnected)
        }
        async fn get_job(&self, _queue: &str, _id: &str) -> QueueResult<Option<JobInfo>> {
            Err(QueueError::NotConnected)
        }
        async fn job_logs(&self, _queue: &str, _id: &str) -> QueueResult<JobLogs> {
            Err(QueueError::NotConnected)
        }
        async fn subscribe(&self, _queue: &str, _listener: EventListener) -> QueueResult<ListenerId> {
            Err(QueueError::NotConnected)
        }
        async fn unsubscribe(&self, _queue: &str, _id: ListenerId) -> bool {
            false
        }
    }

    fn app_with_queues(names: &[&str]) -> App<OfflineStore> {
        let (engine, _rx) = Engine::new(Arc::new(OfflineStore), EngineConfig::default());
        engine.dispatch(Action::SetQueueNames(names.iter().map(|n| n.to_string()).collect()));
        let mut app = App::new(engine);
        app.resize(2, 2);
        app.sync_viewports();
        app
    }

    fn press(app: &mut App<OfflineStore>, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_select_uses_cursor_of_filtered_list() {
        let mut app = app_with_queues(&["alpha", "beta", "gamma"]);
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.queue_view.cursor(), 2);
        assert_eq!(app.queue_view.viewport_start(), 1);

        press(&mut app, KeyCode::Enter);
        let state = app.engine.state();
        assert_eq!(state.screen, Screen::Jobs);
        assert_eq!(state.selected_queue.as_deref(), Some("gamma"));
    }

    #[test]
    fn test_filter_typing_does_not_move_cursor() {
        let mut app = app_with_queues(&["alpha", "beta", "gamma"]);
        press(&mut app, KeyCode::Char('/'));
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.engine.state().queue_filter, "jk");
        assert_eq!(app.queue_view.item_count(), 0);
        assert_eq!(app.queue_view.cursor(), 0);

        press(&mut app, KeyCode::Esc);
        assert!(app.engine.state().queue_filter.is_empty());
        assert_eq!(app.queue_view.item_count(), 3);
    }

    #[test]
    fn test_tab_cycles_status_on_job_screen() {
        let mut app = app_with_queues(&["alpha"]);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.engine.state().job_status_filter, JobState::Active);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.engine.state().job_status_filter, JobState::Waiting);
        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.engine.state().job_status_filter, JobState::Delayed);
    }

    #[test]
    fn test_q_backs_out_then_quits() {
        let mut app = app_with_queues(&["alpha"]);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.engine.state().screen, Screen::Queues);
        assert!(!app.should_quit());
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit());
    }
}
