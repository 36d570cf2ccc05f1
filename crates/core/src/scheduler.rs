//! Scheduled viewer task.
//!
//! [`spawn_viewer`] moves a [`ViewerSession`] into its own tokio task. The task refreshes on a
//! fixed interval and serves commands sent through the returned [`ViewerHandle`]. Results come
//! back as replies to those commands and as [`ViewerEvent`]s; no state is shared with callers.
//!
//! Store calls are blocking, so each one runs on the blocking pool under `op_timeout`. A fetch
//! that times out is abandoned. A submit that times out keeps running: its writes may still
//! land, so further submits are refused until it finishes. When it does, its report is applied
//! to the session and published as [`ViewerEvent::Submitted`] like any other.

use crate::constants::{DEFAULT_OP_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS};
use crate::reconcile::{PendingEdit, ReconcileReport};
use crate::record::{PatientRecord, Priority, RecordId, Status};
use crate::snapshot::{Snapshot, SnapshotFilter};
use crate::viewer::{RefreshSummary, SubmitReport, ViewerSession};
use crate::{PretriageError, PretriageResult};
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

/// Timing for a scheduled viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewerConfig {
    pub poll_interval: Duration,
    pub op_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            op_timeout: Duration::from_secs(DEFAULT_OP_TIMEOUT_SECS),
        }
    }
}

/// Published by the task as things happen.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    Refreshed(RefreshSummary),
    /// The periodic fetch failed; the previous snapshot is still in use.
    RefreshFailed(String),
    Submitted(SubmitReport),
}

/// What the viewer currently shows.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerView {
    pub taken_at: DateTime<Utc>,
    pub records: Vec<PatientRecord>,
    pub pending: PendingEdit,
}

enum Command {
    SetStatus {
        id: RecordId,
        status: Status,
        reply: oneshot::Sender<PretriageResult<()>>,
    },
    SetPriority {
        id: RecordId,
        priority: Option<Priority>,
        reply: oneshot::Sender<PretriageResult<()>>,
    },
    Refresh {
        reply: oneshot::Sender<PretriageResult<RefreshSummary>>,
    },
    Submit {
        reply: oneshot::Sender<PretriageResult<SubmitReport>>,
    },
    View {
        filter: SnapshotFilter,
        reply: oneshot::Sender<ViewerView>,
    },
    Logout {
        ack: oneshot::Sender<()>,
    },
}

/// Client side of a scheduled viewer.
///
/// Dropping every handle stops the task the same way [`ViewerHandle::logout`] does.
#[derive(Clone)]
pub struct ViewerHandle {
    commands: mpsc::Sender<Command>,
}

impl ViewerHandle {
    pub async fn set_status(&self, id: RecordId, status: Status) -> PretriageResult<()> {
        self.request(|reply| Command::SetStatus { id, status, reply })
            .await?
    }

    pub async fn set_priority(&self, id: RecordId, priority: Option<Priority>) -> PretriageResult<()> {
        self.request(|reply| Command::SetPriority {
            id,
            priority,
            reply,
        })
        .await?
    }

    /// Fetch now instead of waiting for the next tick.
    pub async fn refresh(&self) -> PretriageResult<RefreshSummary> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// # Errors
    ///
    /// - [`PretriageError::SubmitInFlight`] while an earlier submit is still writing,
    /// - [`PretriageError::Timeout`] if this submit outlives `op_timeout`,
    /// - [`PretriageError::SessionClosed`] after logout.
    pub async fn submit(&self) -> PretriageResult<SubmitReport> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    pub async fn view(&self, filter: SnapshotFilter) -> PretriageResult<ViewerView> {
        self.request(|reply| Command::View { filter, reply }).await
    }

    /// Stop polling and discard the session's snapshot and edits.
    pub async fn logout(self) -> PretriageResult<()> {
        self.request(|ack| Command::Logout { ack }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> PretriageResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| PretriageError::SessionClosed)?;
        rx.await.map_err(|_| PretriageError::SessionClosed)
    }
}

/// Run `session` on its own task.
///
/// Must be called from within a tokio runtime. The first scheduled refresh happens one
/// `poll_interval` after spawning; the session already holds a fresh snapshot from `open`.
pub fn spawn_viewer(
    session: ViewerSession,
    config: ViewerConfig,
) -> (ViewerHandle, mpsc::Receiver<ViewerEvent>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let task = ViewerTask {
        session,
        config,
        events: event_tx,
        in_flight: None,
    };
    tokio::spawn(task.run(command_rx));
    (
        ViewerHandle {
            commands: command_tx,
        },
        event_rx,
    )
}

type SubmitOutput = (PendingEdit, ReconcileReport, PretriageResult<Snapshot>);
type SubmitJob = JoinHandle<SubmitOutput>;

/// Resolves when the in-flight submit finishes; never resolves if there is none.
async fn join_in_flight(job: &mut Option<SubmitJob>) -> Result<SubmitOutput, JoinError> {
    match job {
        Some(job) => job.await,
        None => std::future::pending().await,
    }
}

struct ViewerTask {
    session: ViewerSession,
    config: ViewerConfig,
    events: mpsc::Sender<ViewerEvent>,
    in_flight: Option<SubmitJob>,
}

impl ViewerTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let period = self.config.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.refresh().await;
                }
                finished = join_in_flight(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.finish_late_submit(finished);
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
            }
        }

        if self.in_flight.as_ref().is_some_and(|job| !job.is_finished()) {
            tracing::warn!("viewer closed with a submit still writing");
        }
        self.session.logout();
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::SetStatus { id, status, reply } => {
                let _ = reply.send(self.session.set_status(id, status));
            }
            Command::SetPriority {
                id,
                priority,
                reply,
            } => {
                let _ = reply.send(self.session.set_priority(id, priority));
            }
            Command::Refresh { reply } => {
                let _ = reply.send(self.refresh().await);
            }
            Command::Submit { reply } => {
                let _ = reply.send(self.submit().await);
            }
            Command::View { filter, reply } => {
                let _ = reply.send(ViewerView {
                    taken_at: self.session.snapshot().taken_at(),
                    records: self.session.view(&filter),
                    pending: self.session.pending_edit(),
                });
            }
            Command::Logout { ack } => {
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn refresh(&mut self) -> PretriageResult<RefreshSummary> {
        let fetched = self.fetch().await;
        let result = self.session.absorb(fetched);
        let event = match &result {
            Ok(summary) => ViewerEvent::Refreshed(summary.clone()),
            Err(e) => ViewerEvent::RefreshFailed(e.to_string()),
        };
        self.publish(event);
        result
    }

    async fn fetch(&self) -> PretriageResult<Snapshot> {
        let fetcher = self.session.fetcher().clone();
        let job = tokio::task::spawn_blocking(move || fetcher.fetch());
        match time::timeout(self.config.op_timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PretriageError::StoreUnavailable(format!("fetch task failed: {e}"))),
            Err(_) => {
                tracing::warn!(after = ?self.config.op_timeout, "fetch timed out");
                Err(PretriageError::Timeout {
                    operation: "fetch",
                    after: self.config.op_timeout,
                })
            }
        }
    }

    async fn submit(&mut self) -> PretriageResult<SubmitReport> {
        self.reap_in_flight().await?;

        let edit = self.session.pending_edit();
        let reconciler = self.session.reconciler().clone();
        let fetcher = self.session.fetcher().clone();
        let mut job: SubmitJob = tokio::task::spawn_blocking(move || {
            let report = reconciler.apply(edit.clone());
            (edit, report, fetcher.fetch())
        });

        match time::timeout(self.config.op_timeout, &mut job).await {
            Ok(Ok((edit, report, fetched))) => {
                let submitted = self.session.finish_submit(&edit, report, fetched);
                self.publish(ViewerEvent::Submitted(submitted.clone()));
                Ok(submitted)
            }
            Ok(Err(e)) => Err(PretriageError::StoreUnavailable(format!(
                "submit task failed: {e}"
            ))),
            Err(_) => {
                tracing::warn!(after = ?self.config.op_timeout, "submit timed out, writes may still land");
                self.in_flight = Some(job);
                Err(PretriageError::Timeout {
                    operation: "submit",
                    after: self.config.op_timeout,
                })
            }
        }
    }

    /// Refuse while a timed-out submit is still running; settle it if it has just finished.
    async fn reap_in_flight(&mut self) -> PretriageResult<()> {
        match self.in_flight.take() {
            None => Ok(()),
            Some(job) if !job.is_finished() => {
                self.in_flight = Some(job);
                Err(PretriageError::SubmitInFlight)
            }
            Some(job) => {
                self.finish_late_submit(job.await);
                Ok(())
            }
        }
    }

    fn finish_late_submit(&mut self, finished: Result<SubmitOutput, JoinError>) {
        match finished {
            Ok((edit, report, fetched)) => {
                let submitted = self.session.finish_submit(&edit, report, fetched);
                tracing::info!(
                    rejected = submitted.rejections().len(),
                    "late submit finished"
                );
                self.publish(ViewerEvent::Submitted(submitted));
            }
            Err(e) => tracing::error!("late submit task failed: {e}"),
        }
    }

    fn publish(&self, event: ViewerEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::debug!("viewer event dropped: {e}");
        }
    }
}
