//! Session actor — one tokio task per editing session.
//!
//! The actor is the only owner of its [`EditableSurface`]. Handles talk to it
//! over an mpsc command channel with oneshot replies, and the latest surface
//! snapshot is published on a watch channel. Between commands the actor
//! sleeps until the surface's next debounce deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::editor::pagination::{measure_template, Measure, MeasurementTicket};
use crate::editor::surface::{
    EditableSurface, EditorConfig, InputEvent, SurfaceEvent, SurfaceSnapshot,
};
use crate::template::{ResumeData, TemplateKind};

const COMMAND_CHANNEL_CAP: usize = 64;
const MIN_REAP_PERIOD: Duration = Duration::from_secs(1);
const MAX_REAP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is closed")]
    Closed(Uuid),
}

enum Command {
    Input {
        event: InputEvent,
        reply: oneshot::Sender<SurfaceSnapshot>,
    },
    Undo {
        reply: oneshot::Sender<SurfaceSnapshot>,
    },
    Redo {
        reply: oneshot::Sender<SurfaceSnapshot>,
    },
    Save {
        reply: oneshot::Sender<String>,
    },
    Edit {
        reply: oneshot::Sender<SurfaceSnapshot>,
    },
    Preview {
        data: ResumeData,
        template: TemplateKind,
        reply: oneshot::Sender<SurfaceSnapshot>,
    },
    Close,
}

/// A finished template measurement on its way back to the actor.
struct Measured {
    ticket: MeasurementTicket,
    height: f32,
    reply: oneshot::Sender<SurfaceSnapshot>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SurfaceSnapshot>,
}

impl SessionHandle {
    /// Starts a session in edit mode, seeded with `seed`.
    pub fn spawn(config: EditorConfig, measurer: Arc<dyn Measure>, seed: Option<String>) -> Self {
        let id = Uuid::new_v4();
        let mut surface = EditableSurface::new(config, measurer);
        surface.begin_editing(seed.as_deref());

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAP);
        let (measured_tx, measured_rx) = mpsc::channel(COMMAND_CHANNEL_CAP);
        let (snapshot_tx, snapshot_rx) = watch::channel(surface.snapshot());

        let actor = SessionActor {
            id,
            surface,
            commands: command_rx,
            measured_tx,
            measured_rx,
            snapshots: snapshot_tx,
        };
        tokio::spawn(actor.run());

        Self {
            id,
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published state, without a round trip to the actor.
    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn input(&self, event: InputEvent) -> Result<SurfaceSnapshot, SessionError> {
        self.request(|reply| Command::Input { event, reply }).await
    }

    pub async fn undo(&self) -> Result<SurfaceSnapshot, SessionError> {
        self.request(|reply| Command::Undo { reply }).await
    }

    pub async fn redo(&self) -> Result<SurfaceSnapshot, SessionError> {
        self.request(|reply| Command::Redo { reply }).await
    }

    /// Sanitized content, as handed to persistence.
    pub async fn save(&self) -> Result<String, SessionError> {
        self.request(|reply| Command::Save { reply }).await
    }

    /// Re-enters edit mode on the current content.
    pub async fn edit(&self) -> Result<SurfaceSnapshot, SessionError> {
        self.request(|reply| Command::Edit { reply }).await
    }

    /// Leaves edit mode and paginates the rendered template instead.
    pub async fn preview(
        &self,
        data: ResumeData,
        template: TemplateKind,
    ) -> Result<SurfaceSnapshot, SessionError> {
        self.request(|reply| Command::Preview {
            data,
            template,
            reply,
        })
        .await
    }

    pub async fn close(&self) {
        if self.commands.send(Command::Close).await.is_err() {
            debug!(session = %self.id, "session already closed");
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed(self.id))?;
        response.await.map_err(|_| SessionError::Closed(self.id))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actor
// ────────────────────────────────────────────────────────────────────────────

struct SessionActor {
    id: Uuid,
    surface: EditableSurface,
    commands: mpsc::Receiver<Command>,
    measured_tx: mpsc::Sender<Measured>,
    measured_rx: mpsc::Receiver<Measured>,
    snapshots: watch::Sender<SurfaceSnapshot>,
}

impl SessionActor {
    async fn run(mut self) {
        debug!(session = %self.id, "session started");
        loop {
            let deadline = self.surface.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(measured) = self.measured_rx.recv() => self.apply_measurement(measured),
                _ = wait_until(deadline) => {
                    let events = self.surface.run_due(Instant::now());
                    self.publish(&events);
                }
            }
        }
        self.surface.teardown();
        info!(session = %self.id, "session closed");
    }

    fn handle(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Input { event, reply } => {
                let events = self.surface.handle_input(event, now);
                self.reply(&events, reply);
            }
            Command::Undo { reply } => {
                let events = self.surface.undo(now);
                self.reply(&events, reply);
            }
            Command::Redo { reply } => {
                let events = self.surface.redo(now);
                self.reply(&events, reply);
            }
            Command::Save { reply } => {
                let events = self.surface.save();
                self.publish(&events);
                let saved = events
                    .iter()
                    .find_map(|event| match event {
                        SurfaceEvent::Saved(html) => Some(html.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| self.surface.html().to_string());
                info!(session = %self.id, bytes = saved.len(), "content saved");
                let _ = reply.send(saved);
            }
            Command::Edit { reply } => {
                let events = self.surface.resume_editing();
                self.reply(&events, reply);
            }
            Command::Preview {
                data,
                template,
                reply,
            } => {
                self.surface.end_editing();
                let ticket = self.surface.begin_template_measurement();
                let measurer = self.surface.measurer();
                let measured_tx = self.measured_tx.clone();
                let session = self.id;
                tokio::spawn(async move {
                    let height = measure_template(template.renderer(), data, measurer).await;
                    let measured = Measured {
                        ticket,
                        height,
                        reply,
                    };
                    if measured_tx.send(measured).await.is_err() {
                        debug!(%session, "session closed before measurement finished");
                    }
                });
                self.publish(&[]);
            }
            Command::Close => {}
        }
    }

    fn apply_measurement(&mut self, measured: Measured) {
        let events: Vec<SurfaceEvent> = self
            .surface
            .apply_template_measurement(measured.ticket, measured.height)
            .into_iter()
            .collect();
        self.reply(&events, measured.reply);
    }

    fn reply(&self, events: &[SurfaceEvent], reply: oneshot::Sender<SurfaceSnapshot>) {
        self.publish(events);
        // The requester may have gone away; the state is published regardless.
        let _ = reply.send(self.surface.snapshot());
    }

    fn publish(&self, events: &[SurfaceEvent]) {
        for event in events {
            match event {
                SurfaceEvent::Changed(html) => {
                    debug!(session = %self.id, bytes = html.len(), "content changed")
                }
                SurfaceEvent::Saved(_) => {}
                SurfaceEvent::PageCountChanged(pages) => {
                    debug!(session = %self.id, pages, "page count changed")
                }
            }
        }
        self.snapshots.send_replace(self.surface.snapshot());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

struct SessionEntry {
    handle: SessionHandle,
    last_active: Instant,
}

/// Live sessions by id.
///
/// Every lookup counts as activity. Sessions idle for longer than the
/// configured timeout are closed by [`SessionRegistry::expire_idle`], which
/// runs on each create and from the background reaper.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub async fn create(
        &self,
        config: EditorConfig,
        measurer: Arc<dyn Measure>,
        seed: Option<String>,
    ) -> SessionHandle {
        self.expire_idle(config.idle_timeout).await;
        let handle = SessionHandle::spawn(config, measurer, seed);
        let entry = SessionEntry {
            handle: handle.clone(),
            last_active: Instant::now(),
        };
        self.sessions.write().await.insert(handle.id(), entry);
        info!(session = %handle.id(), "session created");
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_active = Instant::now();
        Some(entry.handle.clone())
    }

    /// Removes the session and stops its actor.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Closes every session untouched for at least `idle`. Returns how many.
    pub async fn expire_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_active) >= idle)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for entry in &expired {
            entry.handle.close().await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired idle sessions");
        }
        expired.len()
    }

    /// Sweeps idle sessions on a fixed period for the life of the process.
    pub fn spawn_reaper(&self, idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (idle / 4).clamp(MIN_REAP_PERIOD, MAX_REAP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.expire_idle(idle).await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
