//! Session coordinator: a Tokio task that owns every attached session.
//!
//! Callers talk to it through a [`CoordinatorHandle`]. Anything that
//! mutates session state runs on the coordinator task, one command at a
//! time. Blocking work (action evaluation, gateway calls) is shipped to a
//! [`WorkerPool`] together with a snapshot, and the result comes back as
//! a completion message that the coordinator applies in order with
//! everything else.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use warden_types::{AuthMode, PlayerProfile, UserId};

use crate::persist::{self, SaveOutcome};
use crate::session::ProfileStamp;
use crate::{
    ActionContext, ActionFailure, ActionResponse, ActionResult, AuthAction, GatewayError,
    PlayerSession, SaveReport, SessionConfig, SessionError, TokioWorkerPool, WorkerPool,
};

/// Invoked on the coordinator task with the outcome of an async action.
pub type ActionCallback = Box<dyn FnOnce(ActionResponse) + Send + 'static>;

type SessionTask = Box<dyn FnOnce(Option<&mut PlayerSession>) + Send + 'static>;
type SaveReply = oneshot::Sender<Result<SaveReport, SessionError>>;

/// Commands sent to the coordinator through its channel.
enum Command {
    Attach {
        session: Box<PlayerSession>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Detach {
        user_id: UserId,
        reply: oneshot::Sender<Option<PlayerSession>>,
    },
    /// Run a closure against one session (or `None` if it isn't attached).
    Run { user_id: UserId, task: SessionTask },
    Perform {
        user_id: UserId,
        action: Arc<dyn AuthAction>,
        callback: ActionCallback,
        accepted: oneshot::Sender<Result<(), SessionError>>,
    },
    Save { user_id: UserId, reply: SaveReply },
    Refresh {
        user_id: UserId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Len { reply: oneshot::Sender<usize> },
    Shutdown,
}

/// Results reported back by worker jobs. `Err(())` means the job panicked.
///
/// `generation` names the attachment the job was started for; results for
/// a session that has since been detached (and maybe re-attached) are
/// dropped.
enum Completion {
    Evaluated {
        user_id: UserId,
        generation: u64,
        dispatched: ProfileStamp,
        action: Arc<dyn AuthAction>,
        result: ActionResult,
        callback: ActionCallback,
    },
    Saved {
        user_id: UserId,
        generation: u64,
        epoch: u64,
        outcome: Result<Result<SaveOutcome, SessionError>, ()>,
    },
    Fetched {
        user_id: UserId,
        generation: u64,
        found: Result<Result<Option<PlayerProfile>, GatewayError>, ()>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

// ---------------------------------------------------------------------------
// CoordinatorHandle
// ---------------------------------------------------------------------------

/// Handle to a running coordinator.
///
/// Cheap to clone: it is an `mpsc::Sender` wrapper. Every method fails
/// with [`SessionError::CoordinatorClosed`] once the coordinator stopped.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    async fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| SessionError::CoordinatorClosed)
    }

    /// Hands a session over to the coordinator.
    pub async fn attach(&self, session: PlayerSession) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Attach {
            session: Box::new(session),
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SessionError::CoordinatorClosed)?
    }

    /// Takes a session back. Async work still in flight for it finishes,
    /// but its results are no longer applied, its callbacks are dropped,
    /// and callers waiting on its saves get [`SessionError::NotAttached`].
    /// That holds even if another session for the same player is attached
    /// in the meantime.
    pub async fn detach(&self, user_id: UserId) -> Result<PlayerSession, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Detach {
            user_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SessionError::CoordinatorClosed)?
            .ok_or(SessionError::NotAttached(user_id))
    }

    /// Runs `f` on the coordinator task with exclusive access to the
    /// session and returns what it returns.
    ///
    /// `f` blocks the coordinator while it runs; keep it short. If `f`
    /// panics the coordinator keeps running and the call fails with
    /// [`SessionError::TaskPanicked`].
    pub async fn with_session<R, F>(&self, user_id: UserId, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut PlayerSession) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task: SessionTask = Box::new(move |session| {
            let _ = reply_tx.send(session.map(f).ok_or(SessionError::NotAttached(user_id)));
        });
        self.send(Command::Run { user_id, task }).await?;
        reply_rx.await.map_err(|_| {
            if self.sender.is_closed() {
                SessionError::CoordinatorClosed
            } else {
                SessionError::TaskPanicked(user_id)
            }
        })?
    }

    /// [`perform_action_async`](Self::perform_action_async), awaited.
    ///
    /// # Errors
    /// [`SessionError::NotAttached`] if the session is missing or gets
    /// detached before the action is committed. A response that refuses
    /// the transition because the profile changed meanwhile is not an
    /// error; it comes back as a failed [`ActionResponse`].
    pub async fn perform_action(
        &self,
        user_id: UserId,
        action: Arc<dyn AuthAction>,
    ) -> Result<ActionResponse, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let callback: ActionCallback = Box::new(move |response| {
            let _ = reply_tx.send(response);
        });
        self.perform_action_async(user_id, action, callback).await?;
        reply_rx.await.map_err(|_| {
            if self.sender.is_closed() {
                SessionError::CoordinatorClosed
            } else {
                SessionError::NotAttached(user_id)
            }
        })
    }

    /// Runs the action protocol with evaluation on a worker.
    ///
    /// Returns once the pre-action event has been published. `callback`
    /// later runs on the coordinator task with the response: right away
    /// if a listener cancelled, otherwise after the worker reported back
    /// and the result was committed.
    ///
    /// # Errors
    /// [`SessionError::NotAttached`] if there is no session for
    /// `user_id`; `callback` is dropped unrun in that case.
    pub async fn perform_action_async(
        &self,
        user_id: UserId,
        action: Arc<dyn AuthAction>,
        callback: ActionCallback,
    ) -> Result<(), SessionError> {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        self.send(Command::Perform {
            user_id,
            action,
            callback,
            accepted: accepted_tx,
        })
        .await?;
        accepted_rx
            .await
            .map_err(|_| SessionError::CoordinatorClosed)?
    }

    /// Schedules a save on a worker and returns a receiver for its result.
    ///
    /// Saves of the same session never overlap. A request made while one
    /// is running is folded into a single follow-up save that covers
    /// everything dirty at the time it starts.
    pub async fn save_profile_async(
        &self,
        user_id: UserId,
    ) -> Result<oneshot::Receiver<Result<SaveReport, SessionError>>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Save {
            user_id,
            reply: reply_tx,
        })
        .await?;
        Ok(reply_rx)
    }

    /// [`save_profile_async`](Self::save_profile_async), awaited.
    pub async fn save_profile(&self, user_id: UserId) -> Result<SaveReport, SessionError> {
        self.save_profile_async(user_id)
            .await?
            .await
            .map_err(|_| SessionError::CoordinatorClosed)?
    }

    /// Reloads the session's profile from storage. The lookup runs on a
    /// worker; the result is applied on the coordinator.
    pub async fn refresh_profile(&self, user_id: UserId) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Refresh {
            user_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SessionError::CoordinatorClosed)?
    }

    pub async fn reset_profile(&self, user_id: UserId) -> Result<(), SessionError> {
        self.with_session(user_id, |session| session.reset_profile())
            .await
    }

    pub async fn auth_mode(&self, user_id: UserId) -> Result<AuthMode, SessionError> {
        self.with_session(user_id, |session| session.auth_mode())
            .await
    }

    /// Number of attached sessions.
    pub async fn session_count(&self) -> Result<usize, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Len { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SessionError::CoordinatorClosed)
    }

    /// Stops the coordinator. Pending callbacks are dropped and pending
    /// save waiters see [`SessionError::CoordinatorClosed`].
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }
}

// ---------------------------------------------------------------------------
// Coordinator actor
// ---------------------------------------------------------------------------

/// Save bookkeeping for one session.
struct SaveSlot {
    /// Attachment the running save belongs to.
    generation: u64,
    /// Waiters on the save currently running.
    in_flight: Vec<SaveReply>,
    /// Waiters that arrived while it ran; served by one follow-up save.
    queued: Vec<SaveReply>,
}

/// An attached session, tagged with the attach it came from.
struct Attached {
    session: PlayerSession,
    generation: u64,
}

struct Coordinator {
    sessions: HashMap<UserId, Attached>,
    saves: HashMap<UserId, SaveSlot>,
    next_generation: u64,
    pool: Arc<dyn WorkerPool>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl Coordinator {
    async fn run(mut self) {
        tracing::info!("session coordinator started");

        loop {
            tokio::select! {
                biased;

                Some(done) = self.completions.recv() => self.handle_completion(done),
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
            }
        }

        tracing::info!(
            sessions = self.sessions.len(),
            "session coordinator stopped"
        );
    }

    /// The session for `user_id`, if it is still the attachment
    /// `generation` refers to.
    fn live(&mut self, user_id: UserId, generation: u64) -> Option<&mut PlayerSession> {
        self.sessions
            .get_mut(&user_id)
            .filter(|attached| attached.generation == generation)
            .map(|attached| &mut attached.session)
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Attach { session, reply } => {
                let _ = reply.send(self.handle_attach(*session));
            }
            Command::Detach { user_id, reply } => {
                let _ = reply.send(self.handle_detach(user_id));
            }
            Command::Run { user_id, task } => {
                let session = self.sessions.get_mut(&user_id).map(|a| &mut a.session);
                if panic::catch_unwind(AssertUnwindSafe(|| task(session))).is_err() {
                    tracing::error!(%user_id, "session task panicked");
                }
            }
            Command::Perform {
                user_id,
                action,
                callback,
                accepted,
            } => self.handle_perform(user_id, action, callback, accepted),
            Command::Save { user_id, reply } => self.handle_save(user_id, reply),
            Command::Refresh { user_id, reply } => self.handle_refresh(user_id, reply),
            Command::Len { reply } => {
                let _ = reply.send(self.sessions.len());
            }
            // Handled by the loop.
            Command::Shutdown => {}
        }
    }

    fn handle_attach(&mut self, session: PlayerSession) -> Result<(), SessionError> {
        let user_id = session.user_id();
        if self.sessions.contains_key(&user_id) {
            return Err(SessionError::AlreadyAttached(user_id));
        }
        self.next_generation += 1;
        self.sessions.insert(
            user_id,
            Attached {
                session,
                generation: self.next_generation,
            },
        );
        tracing::info!(%user_id, sessions = self.sessions.len(), "session attached");
        Ok(())
    }

    fn handle_detach(&mut self, user_id: UserId) -> Option<PlayerSession> {
        let attached = self.sessions.remove(&user_id)?;
        if let Some(slot) = self.saves.remove(&user_id) {
            tracing::debug!(%user_id, "session detached with a save in flight");
            reply_all(slot.in_flight, Err(SessionError::NotAttached(user_id)));
            reply_all(slot.queued, Err(SessionError::NotAttached(user_id)));
        }
        tracing::info!(%user_id, sessions = self.sessions.len(), "session detached");
        Some(attached.session)
    }

    fn handle_perform(
        &mut self,
        user_id: UserId,
        action: Arc<dyn AuthAction>,
        callback: ActionCallback,
        accepted: oneshot::Sender<Result<(), SessionError>>,
    ) {
        let Some(Attached {
            session,
            generation,
        }) = self.sessions.get(&user_id)
        else {
            let _ = accepted.send(Err(SessionError::NotAttached(user_id)));
            return;
        };
        let _ = accepted.send(Ok(()));

        if let Err(cancelled) = session.begin_action(action.as_ref()) {
            invoke(callback, cancelled);
            return;
        }

        let generation = *generation;
        let dispatched = session.stamp();
        let snapshot = session.view().clone();
        let gateway = Arc::clone(&session.services().gateway);
        let done = self.completions_tx.clone();
        self.pool.submit(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                action.run(&ActionContext::new(&snapshot, gateway.as_ref()))
            }))
            .unwrap_or_else(|_| {
                tracing::error!(%user_id, action = action.name(), "action panicked");
                Err(ActionFailure::new("action failed unexpectedly"))
            });
            let _ = done.send(Completion::Evaluated {
                user_id,
                generation,
                dispatched,
                action,
                result,
                callback,
            });
        }));
    }

    fn handle_save(&mut self, user_id: UserId, reply: SaveReply) {
        if let Some(slot) = self.saves.get_mut(&user_id) {
            slot.queued.push(reply);
            return;
        }
        self.start_save(user_id, vec![reply]);
    }

    /// Starts a save for `waiters`, or answers them right away if there is
    /// nothing a worker could do.
    fn start_save(&mut self, user_id: UserId, waiters: Vec<SaveReply>) {
        let Some(Attached {
            session,
            generation,
        }) = self.sessions.get(&user_id)
        else {
            reply_all(waiters, Err(SessionError::NotAttached(user_id)));
            return;
        };
        if !session.is_registered() {
            reply_all(waiters, Err(SessionError::NotRegistered(user_id)));
            return;
        }

        let generation = *generation;
        let profile = session.profile().clone();
        let epoch = session.epoch();
        let gateway = Arc::clone(&session.services().gateway);
        let done = self.completions_tx.clone();
        self.saves.insert(
            user_id,
            SaveSlot {
                generation,
                in_flight: waiters,
                queued: Vec::new(),
            },
        );
        self.pool.submit(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                persist::save(gateway.as_ref(), &profile)
            }))
            .map_err(|_| ());
            let _ = done.send(Completion::Saved {
                user_id,
                generation,
                epoch,
                outcome,
            });
        }));
    }

    fn handle_refresh(
        &mut self,
        user_id: UserId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) {
        let Some(Attached {
            session,
            generation,
        }) = self.sessions.get(&user_id)
        else {
            let _ = reply.send(Err(SessionError::NotAttached(user_id)));
            return;
        };
        let generation = *generation;
        let gateway = Arc::clone(&session.services().gateway);
        let done = self.completions_tx.clone();
        self.pool.submit(Box::new(move || {
            let found = panic::catch_unwind(AssertUnwindSafe(|| gateway.find_profile(user_id)))
                .map_err(|_| ());
            let _ = done.send(Completion::Fetched {
                user_id,
                generation,
                found,
                reply,
            });
        }));
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Evaluated {
                user_id,
                generation,
                dispatched,
                action,
                result,
                callback,
            } => {
                let Some(session) = self.live(user_id, generation) else {
                    tracing::warn!(
                        %user_id,
                        action = action.name(),
                        "session detached before commit, dropping action result"
                    );
                    return;
                };
                let response = session.complete_action(action.name(), result, dispatched);
                invoke(callback, response);
            }
            Completion::Saved {
                user_id,
                generation,
                epoch,
                outcome,
            } => self.finish_save(user_id, generation, epoch, outcome),
            Completion::Fetched {
                user_id,
                generation,
                found,
                reply,
            } => {
                let result = match (self.live(user_id, generation), found) {
                    (None, _) => {
                        tracing::warn!(%user_id, "session detached before refresh");
                        Err(SessionError::NotAttached(user_id))
                    }
                    (Some(_), Err(())) => {
                        tracing::error!(%user_id, "profile lookup panicked");
                        Err(SessionError::WorkerLost(user_id))
                    }
                    (Some(session), Ok(found)) => session.apply_refresh(found),
                };
                let _ = reply.send(result);
            }
        }
    }

    fn finish_save(
        &mut self,
        user_id: UserId,
        generation: u64,
        epoch: u64,
        outcome: Result<Result<SaveOutcome, SessionError>, ()>,
    ) {
        // Detaching took the slot (and answered its waiters); a slot under
        // the same id now belongs to a later attachment.
        if self
            .saves
            .get(&user_id)
            .is_none_or(|slot| slot.generation != generation)
        {
            tracing::warn!(%user_id, "session detached during save, dropping result");
            return;
        }

        let result = match outcome {
            Ok(Ok(outcome)) => match self.live(user_id, generation) {
                Some(session) => session.apply_save(epoch, outcome),
                None => outcome.into_result(),
            },
            Ok(Err(err)) => Err(err),
            Err(()) => {
                tracing::error!(%user_id, "profile save panicked");
                Err(SessionError::WorkerLost(user_id))
            }
        };

        let Some(slot) = self.saves.remove(&user_id) else {
            return;
        };
        reply_all(slot.in_flight, result);
        if !slot.queued.is_empty() {
            self.start_save(user_id, slot.queued);
        }
    }
}

fn reply_all(waiters: Vec<SaveReply>, result: Result<SaveReport, SessionError>) {
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}

/// Runs a user callback, keeping a panic in it from taking the
/// coordinator down.
fn invoke(callback: ActionCallback, response: ActionResponse) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(response))).is_err() {
        tracing::error!("action callback panicked");
    }
}

/// Spawns a coordinator on the current runtime, with a
/// [`TokioWorkerPool`] sized by `config.worker_slots`.
///
/// # Panics
/// If called outside a Tokio runtime.
pub fn spawn_coordinator(config: SessionConfig) -> CoordinatorHandle {
    let pool = TokioWorkerPool::current(config.worker_slots);
    spawn_coordinator_with_pool(config, Arc::new(pool))
}

/// Spawns a coordinator that hands blocking work to `pool`.
pub fn spawn_coordinator_with_pool(
    config: SessionConfig,
    pool: Arc<dyn WorkerPool>,
) -> CoordinatorHandle {
    let config = config.validated();
    let (sender, commands) = mpsc::channel(config.command_buffer);
    let (completions_tx, completions) = mpsc::unbounded_channel();

    let coordinator = Coordinator {
        sessions: HashMap::new(),
        saves: HashMap::new(),
        next_generation: 0,
        pool,
        commands,
        completions_tx,
        completions,
    };
    tokio::spawn(coordinator.run());

    CoordinatorHandle { sender }
}
