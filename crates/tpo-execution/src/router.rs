//! Action Router: one per (pool, tranche, investor) context.
//!
//! # Design
//!
//! The router owns the context's single `PendingAction`. `dispatch` is
//! synchronous: it checks preconditions, resolves the backend call, records
//! the action as `creating` and spawns one tracking task. The task signs a
//! permit if needed, submits, then polls the submitter until the transaction
//! is final.
//!
//! ```text
//!   idle ──dispatch──► creating ──submitted──► unconfirmed ──mined──► pending
//!                         │                        │                   │
//!                         └────────────────────────┴──────► failed ◄───┤
//!                                                                      ▼
//!                                                                  succeeded
//! ```
//!
//! # Invariants
//!
//! 1. **At most one in flight.** A dispatch while the current action is not
//!    terminal is refused; the current action is left untouched.
//! 2. **Busy gate.** Order mutations are refused while the pool computes an
//!    epoch. `collect` is exempt.
//! 3. **Approval resubmission.** When an approval with a recorded `resume`
//!    succeeds, the original order is dispatched for the original amount in
//!    the same critical section that marks the approval succeeded. This is
//!    the only automatic resubmission. With a state reader attached, the pool
//!    is re-read before the order goes out; if it turned busy or now needs a
//!    collect, the order fails with that rejection and nothing is submitted.
//! 4. **Single notification per transition.** Observers hear about each
//!    distinct (status, bridging note) pair once; redundant polls are silent.
//! 5. **Bridging never times out.** The confirmation cap only applies until
//!    the transaction is first observed on chain.
//! 6. **Watch mirrors state.** `wait_terminal` reads a watch channel that is
//!    written while the state lock is held, so it never lags behind a
//!    concurrent `dispatch` or `reset`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use tpo_schemas::{
    ActionId, ActionKind, ActionStatus, Address, BackendKind, BridgingNote, ContextKey,
    FailureReason, PendingAction, TransactionHandle,
};

use tpo_snapshot::SnapshotReader;

use crate::aggregator::{OrderState, OrderStateAggregator};
use crate::approval;
use crate::calls::{resolve, ActionRequest, BackendCall, ResolveInputs, ResolveOptions};
use crate::rejection::DispatchRejection;
use crate::submitter::{PermitRequest, PermitSigner, TransactionSubmitter, TxStatus};

const EVENT_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Settings / observers
// ---------------------------------------------------------------------------

/// Confirmation polling: exponential backoff from `initial` doubling up to
/// `max`; fail with "not observed" after `confirmation_timeout` unless the
/// transaction has been seen on chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub initial: Duration,
    pub max: Duration,
    pub confirmation_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1_000),
            max: Duration::from_millis(8_000),
            confirmation_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterSettings {
    pub poll: PollSettings,
    pub approve_unlimited: bool,
}

/// Caller hooks, invoked synchronously from the tracking task.
pub trait ActionObserver: Send + Sync {
    fn on_transition(&self, action: &PendingAction);

    /// Once per succeeded action that is not an approval.
    fn on_success(&self, _kind: ActionKind) {}
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RouterState {
    action: Option<PendingAction>,
    /// Kind of the most recent action, kept across `reset`.
    last_kind: Option<ActionKind>,
}

struct Shared {
    key: ContextKey,
    backend: BackendKind,
    submitter: Arc<dyn TransactionSubmitter>,
    signer: Option<Arc<dyn PermitSigner>>,
    reader: Mutex<Option<Arc<dyn SnapshotReader>>>,
    settings: RouterSettings,
    state: Mutex<RouterState>,
    observers: Mutex<Vec<Arc<dyn ActionObserver>>>,
    events: broadcast::Sender<PendingAction>,
    current: watch::Sender<Option<PendingAction>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Update {
    Changed(PendingAction),
    Unchanged,
    /// The action this task tracks is no longer the context's action.
    Superseded,
}

impl Shared {
    fn observers(&self) -> Vec<Arc<dyn ActionObserver>> {
        lock(&self.observers).clone()
    }

    /// Copies the context's action into the watch channel. Call with the
    /// state lock held.
    fn mirror(&self, st: &RouterState) {
        self.current.send_replace(st.action.clone());
    }

    fn publish(&self, action: &PendingAction) {
        debug!(
            context = %self.key,
            action_id = %action.id,
            kind = %action.kind,
            status = %action.status,
            "action transition"
        );
        let _ = self.events.send(action.clone());
        for obs in self.observers() {
            obs.on_transition(action);
        }
    }

    fn update(&self, id: ActionId, f: impl FnOnce(&mut PendingAction)) -> Update {
        let mut st = lock(&self.state);
        let Some(action) = st.action.as_mut().filter(|a| a.id == id) else {
            return Update::Superseded;
        };
        let before = (action.status, action.bridging.clone());
        f(action);
        if (action.status, action.bridging.clone()) == before {
            return Update::Unchanged;
        }
        action.updated_at = Utc::now();
        let changed = action.clone();
        self.mirror(&st);
        Update::Changed(changed)
    }

    /// Apply an update and publish it. Returns `false` once superseded.
    fn transition(&self, id: ActionId, f: impl FnOnce(&mut PendingAction)) -> bool {
        match self.update(id, f) {
            Update::Changed(a) => {
                self.publish(&a);
                true
            }
            Update::Unchanged => true,
            Update::Superseded => false,
        }
    }

    fn fail(&self, id: ActionId, reason: FailureReason) {
        warn!(context = %self.key, action_id = %id, reason = %reason, "action failed");
        self.transition(id, |a| {
            a.status = ActionStatus::Failed;
            a.bridging = None;
            a.failure = Some(reason);
        });
    }
}

// ---------------------------------------------------------------------------
// Tracking task
// ---------------------------------------------------------------------------

struct Job {
    id: ActionId,
    kind: ActionKind,
    call: BackendCall,
    permit: bool,
    inputs: ResolveInputs,
    /// Re-read the pool before submitting (resumed orders).
    recheck: bool,
}

async fn track(shared: Arc<Shared>, mut job: Job) {
    while let Some(next) = run_job(&shared, job).await {
        job = next;
    }
}

/// Drives one action to a terminal state. Returns the resumed order when an
/// approval succeeded.
async fn run_job(shared: &Shared, mut job: Job) -> Option<Job> {
    if job.recheck {
        if let Err(reason) = recheck_pool(shared, job.kind).await {
            shared.fail(job.id, reason);
            return None;
        }
    }

    if job.permit {
        if let Some(value) = job.call.permit_amount() {
            let Some(signer) = shared.signer.clone() else {
                shared.fail(
                    job.id,
                    FailureReason::PermitSigning {
                        message: "no permit signer is available".to_string(),
                    },
                );
                return None;
            };
            let req = PermitRequest {
                owner: Address::new(shared.key.user.as_str()),
                value,
            };
            match signer.sign(&req).await {
                Ok(permit) => job.call.attach_permit(permit),
                Err(e) => {
                    shared.fail(
                        job.id,
                        FailureReason::PermitSigning {
                            message: e.to_string(),
                        },
                    );
                    return None;
                }
            }
        }
    }

    let handle = match shared.submitter.submit(&job.call).await {
        Ok(h) => h,
        Err(e) => {
            shared.fail(
                job.id,
                FailureReason::Submission {
                    message: e.to_string(),
                },
            );
            return None;
        }
    };
    info!(context = %shared.key, action_id = %job.id, tx = %handle, "transaction submitted");

    let submitted = handle.clone();
    if !shared.transition(job.id, |a| {
        a.status = ActionStatus::Unconfirmed;
        a.handle = Some(submitted);
    }) {
        return None;
    }

    poll_until_final(shared, job, handle).await
}

/// Pool-side gates for a resumed order. The pool may have started computing
/// an epoch, or produced results to collect, while the approval was pending.
async fn recheck_pool(shared: &Shared, kind: ActionKind) -> Result<(), FailureReason> {
    let Some(reader) = lock(&shared.reader).clone() else {
        return Ok(());
    };
    let snapshot = reader
        .read(&shared.key)
        .await
        .map_err(|e| FailureReason::Refused {
            message: format!("pool status could not be re-read: {e}"),
        })?;
    let state = OrderStateAggregator::new(shared.backend).aggregate(&snapshot, None, None);
    let gates = if state.loading {
        Err(DispatchRejection::StateLoading)
    } else {
        pool_gates(kind, &state)
    };
    gates.map_err(|rejection| {
        warn!(
            context = %shared.key,
            kind = %kind,
            code = rejection.code(),
            reason = %rejection,
            "resumed order refused"
        );
        FailureReason::Refused {
            message: rejection.to_string(),
        }
    })
}

async fn poll_until_final(shared: &Shared, job: Job, handle: TransactionHandle) -> Option<Job> {
    let poll = shared.settings.poll;
    let deadline = Instant::now() + poll.confirmation_timeout;
    let mut delay = poll.initial;
    let mut observed = false;

    loop {
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(poll.max);

        match shared.submitter.status(&handle).await {
            Ok(TxStatus::Unconfirmed) => {}
            Ok(TxStatus::Mined) => {
                observed = true;
                if !shared.transition(job.id, |a| {
                    a.status = ActionStatus::Pending;
                    a.bridging = None;
                }) {
                    return None;
                }
            }
            Ok(TxStatus::AwaitingCompanion) => {
                observed = true;
                if !shared.transition(job.id, |a| {
                    a.status = ActionStatus::Pending;
                    a.bridging = Some(BridgingNote::awaiting_companion(a.kind));
                }) {
                    return None;
                }
            }
            Ok(TxStatus::Succeeded) => return succeed(shared, job),
            Ok(TxStatus::Reverted { reason }) => {
                shared.fail(job.id, FailureReason::Reverted { message: reason });
                return None;
            }
            Err(e) => {
                warn!(
                    context = %shared.key,
                    action_id = %job.id,
                    error = %e,
                    "status query failed; retrying"
                );
            }
        }

        if !observed && Instant::now() >= deadline {
            shared.fail(
                job.id,
                FailureReason::NotObserved {
                    waited_secs: poll.confirmation_timeout.as_secs(),
                },
            );
            return None;
        }
    }
}

/// Marks the action succeeded and runs the success hook.
fn succeed(shared: &Shared, job: Job) -> Option<Job> {
    let opts = ResolveOptions {
        approve_unlimited: shared.settings.approve_unlimited,
    };

    let (done, next) = {
        let mut st = lock(&shared.state);
        let Some(action) = st.action.as_mut().filter(|a| a.id == job.id) else {
            return None;
        };
        action.status = ActionStatus::Succeeded;
        action.bridging = None;
        action.updated_at = Utc::now();
        let done = action.clone();

        let resumed = match (done.kind.is_approval(), done.resume) {
            (true, Some(kind)) => ActionRequest::from_parts(kind, done.amount).map(|req| {
                let mut next = PendingAction::new(kind, done.amount);
                let call = match resolve(shared.backend, req, &job.inputs, opts) {
                    Ok(call) => Some(call),
                    Err(rejection) => {
                        next.status = ActionStatus::Failed;
                        next.failure = Some(FailureReason::Submission {
                            message: rejection.to_string(),
                        });
                        None
                    }
                };
                (next, call)
            }),
            _ => None,
        };

        if let Some((next, _)) = &resumed {
            st.action = Some(next.clone());
            st.last_kind = Some(next.kind);
        }
        shared.mirror(&st);
        (done, resumed)
    };

    info!(context = %shared.key, action_id = %done.id, kind = %done.kind, "action succeeded");
    shared.publish(&done);

    match next {
        Some((next, call)) => {
            info!(
                context = %shared.key,
                approval_id = %done.id,
                action_id = %next.id,
                kind = %next.kind,
                "approval succeeded; resubmitting original order"
            );
            shared.publish(&next);
            call.map(|call| Job {
                id: next.id,
                kind: next.kind,
                call,
                permit: false,
                inputs: job.inputs,
                recheck: true,
            })
        }
        None => {
            if !done.kind.is_approval() {
                for obs in shared.observers() {
                    obs.on_success(done.kind);
                }
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ActionRouter
// ---------------------------------------------------------------------------

pub struct ActionRouter {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActionRouter {
    pub fn new(
        key: ContextKey,
        submitter: Arc<dyn TransactionSubmitter>,
        signer: Option<Arc<dyn PermitSigner>>,
        settings: RouterSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (current, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                key,
                backend: submitter.backend(),
                submitter,
                signer,
                reader: Mutex::new(None),
                settings,
                state: Mutex::new(RouterState::default()),
                observers: Mutex::new(Vec::new()),
                events,
                current,
            }),
            task: Mutex::new(None),
        }
    }

    /// Lets the router re-read the pool before resubmitting an order after
    /// its approval. Without a reader the resumed order goes out unchecked.
    pub fn with_state_reader(self, reader: Arc<dyn SnapshotReader>) -> Self {
        *lock(&self.shared.reader) = Some(reader);
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.shared.backend
    }

    pub fn key(&self) -> &ContextKey {
        &self.shared.key
    }

    pub fn add_observer(&self, observer: Arc<dyn ActionObserver>) {
        lock(&self.shared.observers).push(observer);
    }

    /// The context's current (in-flight or last terminal) action.
    pub fn current(&self) -> Option<PendingAction> {
        lock(&self.shared.state).action.clone()
    }

    pub fn last_kind(&self) -> Option<ActionKind> {
        lock(&self.shared.state).last_kind
    }

    /// Every published transition, for async consumers.
    pub fn subscribe(&self) -> BroadcastStream<PendingAction> {
        BroadcastStream::new(self.shared.events.subscribe())
    }

    /// Validate preconditions against `state`, record the action and start
    /// tracking it. Must be called from within a Tokio runtime.
    ///
    /// An invest/redeem whose allowance is too low is replaced by the matching
    /// approval; the order follows automatically once the approval succeeds.
    /// The returned id is that of the action actually started.
    pub fn dispatch(
        &self,
        request: ActionRequest,
        state: &OrderState,
    ) -> Result<ActionId, DispatchRejection> {
        let kind = request.kind();
        let mut st = lock(&self.shared.state);

        if let Some(current) = st.action.as_ref().filter(|a| a.is_in_flight()) {
            return Err(self.refuse(
                kind,
                DispatchRejection::ActionInFlight { kind: current.kind },
            ));
        }
        if state.loading {
            return Err(self.refuse(kind, DispatchRejection::StateLoading));
        }
        pool_gates(kind, state).map_err(|r| self.refuse(kind, r))?;

        let is_order = matches!(kind, ActionKind::Invest | ActionKind::Redeem);
        if is_order {
            let pending = if kind == ActionKind::Invest {
                state.pending_invest
            } else {
                state.pending_redeem
            };
            if !state.can_change_order && !pending.is_zero() {
                return Err(self.refuse(kind, DispatchRejection::OrderChangeUnsupported));
            }
        }

        let Some(inputs) = ResolveInputs::from_state(state) else {
            return Err(self.refuse(kind, DispatchRejection::StateLoading));
        };

        let mut effective = request;
        let mut resume = None;
        let mut permit = false;
        if let (true, Some(amount)) = (is_order, request.amount()) {
            let allowance = if kind == ActionKind::Invest {
                state.allowances.pool_currency
            } else {
                state.allowances.tranche_token
            };
            let req = approval::required(
                self.shared.backend,
                kind,
                amount,
                allowance,
                state.supports_permit && self.shared.signer.is_some(),
                st.last_kind,
            );
            if req.needed {
                effective = match req.approval {
                    Some(ActionKind::ApproveTrancheToken) => {
                        ActionRequest::ApproveTrancheToken { amount }
                    }
                    _ => ActionRequest::ApprovePoolCurrency { amount },
                };
                resume = Some(kind);
            } else {
                permit = req.use_permit;
            }
        }

        let opts = ResolveOptions {
            approve_unlimited: self.shared.settings.approve_unlimited,
        };
        let call = resolve(self.shared.backend, effective, &inputs, opts)
            .map_err(|r| self.refuse(kind, r))?;

        let mut action = PendingAction::new(effective.kind(), effective.amount());
        action.permit = permit;
        action.resume = resume;
        let id = action.id;
        st.action = Some(action.clone());
        st.last_kind = Some(action.kind);
        self.shared.mirror(&st);
        drop(st);

        info!(
            context = %self.shared.key,
            action_id = %id,
            kind = %action.kind,
            requested = %kind,
            permit,
            "action dispatched"
        );
        self.shared.publish(&action);

        let job = Job {
            id,
            kind: action.kind,
            call,
            permit,
            inputs,
            recheck: false,
        };
        let handle = tokio::spawn(track(self.shared.clone(), job));
        *lock(&self.task) = Some(handle);
        Ok(id)
    }

    /// Clear a terminal action. Returns `false` (and does nothing) while an
    /// action is in flight.
    pub fn reset(&self) -> bool {
        let mut st = lock(&self.shared.state);
        match st.action.as_ref() {
            Some(a) if a.is_in_flight() => false,
            _ => {
                st.action = None;
                self.shared.mirror(&st);
                true
            }
        }
    }

    /// Resolves once the current action chain has settled: terminal, and not
    /// an approval about to resubmit its order. `None` when idle.
    pub async fn wait_terminal(&self) -> Option<PendingAction> {
        let mut rx = self.shared.current.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                match current.as_ref() {
                    None => return None,
                    Some(a) if settled(a) => return Some(a.clone()),
                    Some(_) => {}
                }
            }
            if rx.changed().await.is_err() {
                return self.current();
            }
        }
    }

    /// The gates `dispatch` applies before any amount checks: one action in
    /// flight, busy pool, collect before a new order. Lets callers report
    /// these ahead of balance errors.
    pub fn precheck(&self, kind: ActionKind, state: &OrderState) -> Result<(), DispatchRejection> {
        if let Some(current) = lock(&self.shared.state)
            .action
            .as_ref()
            .filter(|a| a.is_in_flight())
        {
            return Err(self.refuse(
                kind,
                DispatchRejection::ActionInFlight { kind: current.kind },
            ));
        }
        pool_gates(kind, state).map_err(|r| self.refuse(kind, r))
    }

    fn refuse(&self, kind: ActionKind, rejection: DispatchRejection) -> DispatchRejection {
        warn!(
            context = %self.shared.key,
            kind = %kind,
            code = rejection.code(),
            reason = %rejection,
            "dispatch refused"
        );
        rejection
    }
}

/// Busy gate for order mutations, then collect-before-order for new orders.
fn pool_gates(kind: ActionKind, state: &OrderState) -> Result<(), DispatchRejection> {
    if kind.mutates_order() && state.busy {
        return Err(DispatchRejection::PoolBusy { kind });
    }
    let is_order = matches!(kind, ActionKind::Invest | ActionKind::Redeem);
    if is_order && state.needs_to_collect_before_order {
        return Err(DispatchRejection::CollectRequired {
            collect_type: state.collectable.collect_type,
        });
    }
    Ok(())
}

fn settled(a: &PendingAction) -> bool {
    match a.status {
        ActionStatus::Succeeded => !(a.kind.is_approval() && a.resume.is_some()),
        ActionStatus::Failed => true,
        _ => false,
    }
}

impl Drop for ActionRouter {
    /// Stops local tracking only; a broadcast transaction is not withdrawn.
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
            debug!(context = %self.shared.key, "router torn down; tracking stopped");
        }
    }
}
