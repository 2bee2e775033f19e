//! Main loop: draw, then wait for a key, a tick or a store result.

use crossterm::event::{Event, EventStream, KeyEventKind};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use bullscope_queue::QueueStore;

use crate::app::App;
use crate::engine::EngineMsg;
use crate::error::TuiResult;
use crate::render::{self, list_rows};
use crate::terminal::TerminalGuard;

/// Run until the user quits. Connects on entry; the caller shuts the
/// engine down afterwards.
pub async fn run<S: QueueStore + ?Sized + 'static>(
    app: &mut App<S>,
    messages: &mut mpsc::UnboundedReceiver<EngineMsg>,
    guard: &mut TerminalGuard,
) -> TuiResult<()> {
    let size = guard.terminal().size()?;
    let (queue_rows, job_rows) = list_rows(size.height);
    app.resize(queue_rows, job_rows);

    let period = app.engine.config().poll_interval;
    let mut metadata_ticker = interval(period);
    metadata_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut jobs_ticker = interval(period);
    jobs_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events = EventStream::new();

    app.engine.start_connect();
    info!(poll_ms = period.as_millis() as u64, "Dashboard running");

    loop {
        app.sync_viewports();
        guard.terminal().draw(|frame| render::draw(frame, app))?;

        let selected_before = app.engine.state().selected_queue.clone();
        tokio::select! {
            _ = metadata_ticker.tick() => app.engine.on_metadata_tick(),
            _ = jobs_ticker.tick() => app.engine.on_jobs_tick(),
            Some(msg) = messages.recv() => app.engine.handle_msg(msg),
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                    app.handle_key(key);
                }
                Some(Ok(Event::Resize(_, height))) => {
                    let (queue_rows, job_rows) = list_rows(height);
                    app.resize(queue_rows, job_rows);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }

        if app.should_quit() {
            debug!("Quit requested");
            break;
        }
        // A new selection gets a full interval before its first poll.
        if app.engine.state().selected_queue != selected_before {
            jobs_ticker.reset();
        }
    }
    Ok(())
}
