//! Stream player.
//!
//! One spawned task owns all mutable state and processes a single typed
//! event stream: connection events from the proxy, completion callbacks
//! from the sink, backoff timer fires, and owner commands. Every handler
//! checks the destroyed flag first, and connection/sink events carry an
//! epoch so nothing from a torn-down pipeline can mutate the current one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::events::{CloseCode, PlayerEvent};
use crate::feed::{DeferredAction, FeedDriver};
use crate::proxy::{ConnEvent, ConnectionProxy};
use crate::reconnect::{ReconnectController, Schedule};
use crate::sink::{SinkAdapter, SinkEvent, SinkFactory, SinkReporter};
use crate::source::StreamSource;

/// Everything entering the dispatch loop.
#[derive(Debug)]
pub(crate) enum Event {
    Conn { epoch: u64, event: ConnEvent },
    Sink { epoch: u64, event: SinkEvent },
    BackoffElapsed { generation: u64 },
    Command(Command),
}

#[derive(Debug)]
pub(crate) enum Command {
    Reset { target: Option<String> },
    Clear,
    Destroy,
    Nudge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Handle to a running player.
///
/// Construction starts the first connection attempt immediately. All
/// methods are fire-and-forget commands into the player task; failures are
/// reported through the [`PlayerEvent`] stream, never as errors here.
/// Dropping the handle destroys the player.
#[derive(Debug)]
pub struct Player {
    tx: mpsc::UnboundedSender<Event>,
}

impl Player {
    /// Spawn a player task. Must be called within a tokio runtime.
    ///
    /// Returns the command handle and the owner notification stream.
    pub fn spawn(
        config: PlayerConfig,
        source: Arc<dyn StreamSource>,
        sink_factory: SinkFactory,
    ) -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (owner_tx, owner_rx) = mpsc::unbounded_channel();

        let reconnect = ReconnectController::new(config.retry_limit, config.reconnect_interval);
        let task = PlayerTask {
            config,
            source,
            sink_factory,
            tx: tx.clone(),
            rx,
            owner_tx,
            reconnect,
            driver: FeedDriver::new(),
            proxy: None,
            sink: None,
            conn_epoch: 0,
            sink_epoch: 0,
            awaiting_first_data: false,
            last_close: CloseCode::ABNORMAL,
            destroyed: false,
            pending_teardown: false,
            pending_sink_clear: false,
        };
        tokio::spawn(task.run());

        (Self { tx }, owner_rx)
    }

    /// Rebuild the pipeline, optionally against a new target. Supplying a
    /// new target resets the attempt counter; retrying the same target
    /// does not.
    pub fn reset(&self, new_target: Option<String>) {
        let _ = self
            .tx
            .send(Event::Command(Command::Reset { target: new_target }));
    }

    /// Tear down sink and connection without destroying the instance.
    pub fn clear(&self) {
        let _ = self.tx.send(Event::Command(Command::Clear));
    }

    /// Terminal teardown. Idempotent; cancels every pending timer.
    pub fn destroy(&self) {
        let _ = self.tx.send(Event::Command(Command::Destroy));
    }

    /// External stall notification: jump playback close to the live edge.
    pub fn nudge(&self) {
        let _ = self.tx.send(Event::Command(Command::Nudge));
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.tx.send(Event::Command(Command::Destroy));
    }
}

struct PlayerTask {
    config: PlayerConfig,
    source: Arc<dyn StreamSource>,
    sink_factory: SinkFactory,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    owner_tx: mpsc::UnboundedSender<PlayerEvent>,
    reconnect: ReconnectController,
    driver: FeedDriver,
    proxy: Option<ConnectionProxy>,
    sink: Option<Box<dyn SinkAdapter>>,
    /// Epoch of the live connection; proxy events from any other are stale.
    conn_epoch: u64,
    /// Epoch of the live sink; adapter reports from any other are stale.
    sink_epoch: u64,
    /// Set between transport open and the first received segment.
    awaiting_first_data: bool,
    /// Last close code observed, surfaced on a terminal disconnect.
    last_close: CloseCode,
    destroyed: bool,
    /// Destroy requested while a sink operation was in flight.
    pending_teardown: bool,
    /// Sink shutdown owed once the in-flight operation completes.
    pending_sink_clear: bool,
}

impl PlayerTask {
    async fn run(mut self) {
        self.start_connection();
        while let Some(event) = self.rx.recv().await {
            if self.handle(event) == Flow::Stop {
                break;
            }
        }
        debug!("player task stopped");
    }

    fn handle(&mut self, event: Event) -> Flow {
        if self.destroyed {
            return self.handle_after_destroy(event);
        }
        match event {
            Event::Conn { epoch, event } => {
                if epoch != self.conn_epoch {
                    return Flow::Continue;
                }
                self.on_conn_event(event)
            }
            Event::Sink { epoch, event } => {
                if epoch != self.sink_epoch {
                    return Flow::Continue;
                }
                self.on_sink_event(event)
            }
            Event::BackoffElapsed { generation } => self.on_backoff_elapsed(generation),
            Event::Command(command) => self.on_command(command),
        }
    }

    /// After destroy, the only thing left to wait for is the completion of
    /// an in-flight sink operation; everything else is a no-op.
    fn handle_after_destroy(&mut self, event: Event) -> Flow {
        if self.pending_teardown
            && let Event::Sink { epoch, .. } = event
            && epoch == self.sink_epoch
        {
            self.driver.operation_complete();
            self.finish_teardown();
            return Flow::Stop;
        }
        Flow::Continue
    }

    // --- commands -------------------------------------------------------

    fn on_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Reset { target } => self.on_reset(target),
            Command::Clear => self.on_clear(),
            Command::Destroy => self.on_destroy(),
            Command::Nudge => self.on_nudge(),
        }
    }

    fn on_reset(&mut self, target: Option<String>) -> Flow {
        self.reconnect.invalidate_timers();
        if let Some(target) = target {
            info!(%target, "reset against new target");
            self.config.target = target;
            self.reconnect.reset_attempts();
        }
        if self.sink_op_pending() {
            self.driver.defer(DeferredAction::Reset);
            return Flow::Continue;
        }
        self.rebuild()
    }

    fn on_clear(&mut self) -> Flow {
        self.reconnect.invalidate_timers();
        self.close_proxy();
        self.teardown_sink();
        Flow::Continue
    }

    fn on_destroy(&mut self) -> Flow {
        self.destroyed = true;
        self.reconnect.destroy();
        self.close_proxy();
        self.notify(PlayerEvent::BeforeClear);
        let busy = self.sink_busy();
        self.driver.clear();
        if busy {
            self.pending_teardown = true;
            return Flow::Continue;
        }
        self.finish_teardown();
        Flow::Stop
    }

    fn on_nudge(&mut self) -> Flow {
        if let Some(sink) = self.sink.as_mut()
            && let Some((_, end)) = sink.retained()
        {
            sink.set_position(end - 0.5);
        }
        Flow::Continue
    }

    // --- connection events ----------------------------------------------

    fn on_conn_event(&mut self, event: ConnEvent) -> Flow {
        match event {
            ConnEvent::Open => {
                self.notify(PlayerEvent::ConnectionOpen);
                Flow::Continue
            }
            ConnEvent::Data(segment) => {
                if self.awaiting_first_data {
                    self.awaiting_first_data = false;
                    if !self.build_sink() {
                        return self.fatal_format_teardown();
                    }
                    debug!("first segment received, attempt counter reset");
                    self.reconnect.on_first_data();
                }
                self.driver.enqueue(segment);
                if let Some(sink) = self.sink.as_mut() {
                    self.driver.try_feed(sink.as_mut());
                }
                Flow::Continue
            }
            ConnEvent::Closed(code) => {
                self.last_close = code;
                self.notify(PlayerEvent::ConnectionClose { code });
                self.proxy = None;
                self.teardown_sink();
                self.schedule_reconnect()
            }
        }
    }

    // --- sink events ----------------------------------------------------

    fn on_sink_event(&mut self, event: SinkEvent) -> Flow {
        match event {
            SinkEvent::WriteComplete | SinkEvent::TrimComplete => {
                self.driver.operation_complete();
                if self.pending_sink_clear {
                    self.shutdown_sink();
                    return self.run_deferred().unwrap_or(Flow::Continue);
                }
                if let Some(flow) = self.run_deferred() {
                    return flow;
                }
                if let Some(sink) = self.sink.as_mut() {
                    self.driver.trim_or_feed(sink.as_mut());
                }
                Flow::Continue
            }
            SinkEvent::Error { reason } => {
                let err = PlayerError::sink_rejected(reason);
                warn!(error = %err, "sink rejected operation, rebuilding pipeline");
                self.on_sink_fatal()
            }
            SinkEvent::Closed => {
                warn!("sink closed unexpectedly, rebuilding pipeline");
                self.on_sink_fatal()
            }
        }
    }

    /// A sink failure is never retried at the write level; the whole
    /// pipeline is rebuilt from a fresh connection.
    fn on_sink_fatal(&mut self) -> Flow {
        self.driver.operation_complete();
        if self.pending_sink_clear {
            self.shutdown_sink();
            return self.run_deferred().unwrap_or(Flow::Continue);
        }
        self.last_close = CloseCode::EXTERNAL;
        self.notify(PlayerEvent::ConnectionClose {
            code: CloseCode::EXTERNAL,
        });
        self.close_proxy();
        self.teardown_sink();
        self.schedule_reconnect()
    }

    // --- reconnection ---------------------------------------------------

    fn on_backoff_elapsed(&mut self, generation: u64) -> Flow {
        if !self.reconnect.is_current(generation) {
            return Flow::Continue;
        }
        if self.sink_op_pending() {
            // Tearing down buffering state mid-operation is not allowed;
            // the reconnect runs at the next completion callback.
            self.driver.defer(DeferredAction::Reconnect);
            return Flow::Continue;
        }
        self.reconnect.on_backoff_elapsed();
        self.rebuild()
    }

    /// Run the parked action, if any. Returns `None` when nothing was
    /// deferred.
    fn run_deferred(&mut self) -> Option<Flow> {
        let action = self.driver.take_deferred()?;
        debug!(?action, "running deferred action after completion");
        if action == DeferredAction::Reconnect {
            self.reconnect.on_backoff_elapsed();
        }
        Some(self.rebuild())
    }

    fn schedule_reconnect(&mut self) -> Flow {
        if !self.config.with_reconnect {
            debug!("reconnect disabled, staying down");
            return Flow::Continue;
        }
        match self.reconnect.schedule() {
            Schedule::Retry {
                attempt,
                delay,
                generation,
            } => {
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.notify(PlayerEvent::ReconnectScheduled { attempt, delay });
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Event::BackoffElapsed { generation });
                });
                Flow::Continue
            }
            Schedule::Exhausted { attempts } => {
                let err = PlayerError::RetriesExhausted { attempts };
                warn!(attempts, "reconnect attempts exhausted, giving up");
                self.terminate(self.last_close, err.to_string())
            }
        }
    }

    /// Tear down whatever part of the old pipeline is still up and open a
    /// fresh connection against the current target.
    fn rebuild(&mut self) -> Flow {
        self.notify(PlayerEvent::ReconnectAttempt {
            attempt: self.reconnect.attempts(),
        });
        self.close_proxy();
        if self.sink.is_some() || self.driver.queue_len() > 0 {
            self.teardown_sink();
        }
        self.start_connection();
        Flow::Continue
    }

    fn start_connection(&mut self) {
        self.reconnect.on_open_requested();
        self.conn_epoch += 1;
        self.awaiting_first_data = true;
        self.proxy = Some(ConnectionProxy::spawn(
            self.source.clone(),
            self.config.target.clone(),
            self.config.sub_protocol.clone(),
            self.config.liveness_timeout,
            self.conn_epoch,
            self.tx.clone(),
        ));
    }

    // --- pipeline build / teardown --------------------------------------

    /// Build a fresh sink for this connection and run the format check.
    /// Returns false when the configured codec tag is unsupported.
    fn build_sink(&mut self) -> bool {
        self.sink_epoch += 1;
        let reporter = SinkReporter::new(self.tx.clone(), self.sink_epoch);
        let mut sink = (self.sink_factory)(&self.config, reporter);
        let supported = sink.is_format_supported(&self.config.codec_tag);
        self.notify(PlayerEvent::FormatCheck { supported });
        if !supported {
            let err = PlayerError::FormatUnsupported {
                tag: self.config.codec_tag.clone(),
            };
            warn!(error = %err, "sink format check failed");
            sink.shutdown();
            return false;
        }
        self.sink = Some(sink);
        self.driver.sink_ready();
        true
    }

    /// Format failure is fatal: surfaced once via the format-check
    /// notification, then the instance is torn down.
    fn fatal_format_teardown(&mut self) -> Flow {
        self.destroyed = true;
        self.reconnect.destroy();
        self.close_proxy();
        self.driver.clear();
        self.finish_teardown();
        Flow::Stop
    }

    /// Give up: tear everything down and surface `Disconnected` exactly
    /// once.
    fn terminate(&mut self, code: CloseCode, detail: String) -> Flow {
        self.destroyed = true;
        self.reconnect.destroy();
        self.close_proxy();
        let busy = self.sink_busy();
        self.driver.clear();
        self.notify(PlayerEvent::Disconnected { code, detail });
        if busy {
            self.pending_teardown = true;
            return Flow::Continue;
        }
        self.finish_teardown();
        Flow::Stop
    }

    /// Clear buffered and sink state, deferring the sink shutdown when an
    /// operation is in flight.
    fn teardown_sink(&mut self) {
        self.notify(PlayerEvent::BeforeClear);
        let busy = self.sink_busy();
        self.driver.clear();
        if self.sink.is_none() {
            return;
        }
        if busy {
            self.pending_sink_clear = true;
        } else {
            self.shutdown_sink();
        }
    }

    fn sink_busy(&self) -> bool {
        self.driver.is_busy() || self.sink.as_ref().is_some_and(|sink| sink.is_busy())
    }

    /// Whether an operation is still pending, on the current sink or on an
    /// outgoing one whose shutdown is owed.
    fn sink_op_pending(&self) -> bool {
        self.driver.is_busy() || self.pending_sink_clear
    }

    fn shutdown_sink(&mut self) {
        // The flag refers to this sink, never to a later one.
        self.pending_sink_clear = false;
        if let Some(mut sink) = self.sink.take() {
            sink.shutdown();
        }
        self.sink_epoch += 1;
    }

    fn finish_teardown(&mut self) {
        self.pending_teardown = false;
        self.pending_sink_clear = false;
        self.shutdown_sink();
    }

    fn close_proxy(&mut self) {
        if let Some(proxy) = self.proxy.take() {
            proxy.close();
        }
        // Anything still in flight from the old connection is stale.
        self.conn_epoch += 1;
    }

    fn notify(&self, event: PlayerEvent) {
        let _ = self.owner_tx.send(event);
    }
}
