//! Lock-step bug-finding scheduler.
//!
//! Every controlled operation runs on its own thread, but only one of them
//! is ever *active*. Each operation owns an [`OperationSlot`]: a small flag
//! block guarded by its own mutex, plus a condition variable the operation
//! parks on while it is not scheduled. At every scheduling point the active
//! operation asks the strategy who runs next, activates that operation's
//! slot, deactivates its own, and parks.
//!
//! # Tokens
//!
//! Registration hands out an [`OperationToken`]. Every suspension point
//! takes the token, and the scheduler checks that it was issued by this
//! scheduler, names a registered operation, and names the operation that is
//! currently scheduled. A call that fails any of these checks means some
//! concurrency bypassed the scheduler; it is reported as an uncontrolled
//! synchronization bug.
//!
//! # Cancellation
//!
//! [`BugFindingScheduler::stop`] wakes every parked operation with its
//! enabled flag cleared. Each one returns [`ExecutionCanceled`] from the
//! call it was parked in, and the runtime propagates that with `?` until the
//! operation's thread exits.
//!
//! # Lock order
//!
//! scheduler state → strategy → operation slot. Nothing parks while holding
//! the scheduler state lock.

use crate::report::TestReport;
use lockstep_core::{
    BugKind, BugReport, Choice, Configuration, Delivery, EventInfo, IterationOutcome, NextAction,
    OperationId, OperationType, SchedulableOperation, ScheduleTrace, SchedulingStrategy,
    StrategyError, TargetType,
};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Strategy shared between the iteration engine and a run's scheduler.
pub type SharedStrategy = Arc<Mutex<dyn SchedulingStrategy>>;

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// The scheduler stopped while this operation was parked or running.
///
/// This is the single unwinding path for controlled operations: every
/// blocking call returns it once the run is over, and callers propagate it
/// with `?`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("execution canceled by the scheduler")]
pub struct ExecutionCanceled;

/// Proof of registration that a controlled operation presents at every
/// suspension point.
#[derive(Debug)]
pub struct OperationToken {
    scheduler: u64,
    operation: OperationId,
}

impl OperationToken {
    pub fn operation(&self) -> OperationId {
        self.operation
    }
}

// ── Operation slots ─────────────────────────────────────────────────────

#[derive(Debug)]
struct SlotState {
    is_active: bool,
    is_enabled: bool,
    handler_running: bool,
    is_completed: bool,
    is_waiting_to_receive: bool,
    next: NextAction,
    operation_count: u64,
}

/// One operation's private wake lock.
#[derive(Debug)]
struct OperationSlot {
    id: OperationId,
    name: String,
    state: Mutex<SlotState>,
    wake: Condvar,
}

impl OperationSlot {
    fn new(id: OperationId, name: String) -> Self {
        Self {
            id,
            name,
            state: Mutex::new(SlotState {
                is_active: false,
                is_enabled: true,
                handler_running: false,
                is_completed: false,
                is_waiting_to_receive: false,
                next: NextAction::start(id),
                operation_count: 0,
            }),
            wake: Condvar::new(),
        }
    }

    fn snapshot(&self) -> SchedulableOperation {
        let state = self.state.lock();
        SchedulableOperation {
            id: self.id,
            name: self.name.clone(),
            is_enabled: state.is_enabled,
            is_completed: state.is_completed,
            is_waiting_to_receive: state.is_waiting_to_receive,
            next: state.next,
            operation_count: state.operation_count,
        }
    }

    fn declare(&self, next: NextAction) {
        let mut state = self.state.lock();
        state.next = next;
        state.operation_count += 1;
    }

    fn set_active(&self, active: bool) {
        let mut state = self.state.lock();
        state.is_active = active;
        if active {
            self.wake.notify_all();
        }
    }

    /// Wake with the enabled flag cleared, so the owner cancels.
    fn kill(&self) {
        let mut state = self.state.lock();
        state.is_active = true;
        state.is_enabled = false;
        self.wake.notify_all();
    }

    fn is_completed(&self) -> bool {
        self.state.lock().is_completed
    }

    fn update(&self, f: impl FnOnce(&mut SlotState)) {
        let mut state = self.state.lock();
        f(&mut state);
        self.wake.notify_all();
    }

    /// Park until activated. Disabled on wake-up means the run was stopped.
    fn wait_until_active(&self) -> Result<(), ExecutionCanceled> {
        let mut state = self.state.lock();
        while !state.is_active {
            self.wake.wait(&mut state);
        }
        if state.is_enabled {
            Ok(())
        } else {
            Err(ExecutionCanceled)
        }
    }

    fn mark_handler_running(&self) {
        let mut state = self.state.lock();
        state.handler_running = true;
        self.wake.notify_all();
    }

    /// Park until the handler thread has started or the slot was killed.
    fn wait_for_handler(&self) {
        let mut state = self.state.lock();
        while !state.handler_running && !(state.is_active && !state.is_enabled) {
            self.wake.wait(&mut state);
        }
    }
}

// ── Scheduler ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SchedulerState {
    operations: BTreeMap<OperationId, Arc<OperationSlot>>,
    scheduled: Option<OperationId>,
    running: bool,
    completed: bool,
    bug: Option<BugReport>,
    fully_explored: bool,
    step_bound_reached: bool,
    strategy_error: Option<StrategyError>,
    schedule: ScheduleTrace,
    /// Hot monitors and the fair steps they have stayed hot for.
    hot_monitors: BTreeMap<String, usize>,
}

impl SchedulerState {
    fn snapshot(&self) -> Vec<SchedulableOperation> {
        self.operations.values().map(|slot| slot.snapshot()).collect()
    }
}

/// Serializes one run of a concurrent program into a strategy-chosen order.
pub struct BugFindingScheduler {
    id: u64,
    config: Configuration,
    strategy: SharedStrategy,
    state: Mutex<SchedulerState>,
    /// Signaled once the run completes; paired with `state`.
    completion: Condvar,
}

impl BugFindingScheduler {
    pub fn new(config: Configuration, strategy: SharedStrategy) -> Self {
        Self {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            strategy,
            state: Mutex::new(SchedulerState {
                running: true,
                ..Default::default()
            }),
            completion: Condvar::new(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Operation currently holding control.
    pub fn scheduled_operation(&self) -> Option<OperationId> {
        self.state.lock().scheduled
    }

    /// Snapshot of every registered operation, ordered by id.
    pub fn operations(&self) -> Vec<SchedulableOperation> {
        self.state.lock().snapshot()
    }

    pub fn operation(&self, id: OperationId) -> Option<SchedulableOperation> {
        self.state.lock().operations.get(&id).map(|slot| slot.snapshot())
    }

    pub fn has_operations(&self) -> bool {
        !self.state.lock().operations.is_empty()
    }

    // ── Scheduling points ───────────────────────────────────────────────

    /// Yield at a scheduling point, declaring the caller's next action.
    ///
    /// Returns once the caller is scheduled again. Returns
    /// [`ExecutionCanceled`] if the run stops first, including when this
    /// very call detects a bug or exhausts the strategy.
    pub fn schedule_next_operation(
        &self,
        token: &OperationToken,
        operation_type: OperationType,
        target_type: TargetType,
        target_id: OperationId,
    ) -> Result<(), ExecutionCanceled> {
        let current = token.operation;
        let current_slot = {
            let mut st = self.state.lock();
            if !st.running {
                return Err(self.stop_locked(&mut st));
            }
            self.check_controlled(&mut st, token)?;
            self.check_step_bound(&mut st)?;

            let slot = match st.operations.get(&current) {
                Some(slot) => Arc::clone(slot),
                None => return Err(self.stop_locked(&mut st)),
            };
            slot.declare(NextAction::new(operation_type, target_type, target_id));

            let choices = st.snapshot();
            let decision = self.strategy.lock().next_operation(&choices, current);
            let next = match decision {
                Ok(Some(next)) => next,
                Ok(None) => return Err(self.finish_exhausted(&mut st, &choices)),
                Err(e) => return Err(self.abort_session(&mut st, e)),
            };
            if !choices.iter().any(|op| op.id == next && op.is_enabled) {
                return Err(self.abort_session(&mut st, StrategyError::InvalidChoice(next)));
            }

            st.schedule.push_scheduling_choice(next);
            self.heat_monitors(&mut st)?;
            debug!("{} declared {} → scheduling {}", current, operation_type, next);

            if next == current {
                return Ok(());
            }
            slot.set_active(false);
            if let Some(next_slot) = st.operations.get(&next) {
                next_slot.set_active(true);
            }
            st.scheduled = Some(next);
            slot
        };

        // A finished operation hands off control and leaves.
        if current_slot.is_completed() {
            return Ok(());
        }
        current_slot.wait_until_active()
    }

    /// Nondeterministic boolean for the active operation.
    ///
    /// `fairness_id` tags the choice in the schedule trace.
    pub fn next_boolean_choice(
        &self,
        token: &OperationToken,
        max_value: u32,
        fairness_id: Option<&str>,
    ) -> Result<bool, ExecutionCanceled> {
        let mut st = self.state.lock();
        if !st.running {
            return Err(self.stop_locked(&mut st));
        }
        self.check_controlled(&mut st, token)?;
        self.check_step_bound(&mut st)?;

        let decision = {
            let mut strategy = self.strategy.lock();
            let decision = strategy.next_boolean_choice(max_value);
            if let Ok(Some(value)) = decision {
                strategy.on_choice(token.operation, Choice::Boolean(value));
            }
            decision
        };
        match decision {
            Ok(Some(value)) => {
                match fairness_id {
                    Some(uid) => st.schedule.push_fair_boolean_choice(uid, value),
                    None => st.schedule.push_boolean_choice(value),
                }
                Ok(value)
            }
            Ok(None) => {
                st.fully_explored = true;
                Err(self.stop_locked(&mut st))
            }
            Err(e) => Err(self.abort_session(&mut st, e)),
        }
    }

    /// Nondeterministic integer in `0..max_value` for the active operation.
    pub fn next_integer_choice(
        &self,
        token: &OperationToken,
        max_value: u32,
    ) -> Result<u32, ExecutionCanceled> {
        let mut st = self.state.lock();
        if !st.running {
            return Err(self.stop_locked(&mut st));
        }
        self.check_controlled(&mut st, token)?;
        self.check_step_bound(&mut st)?;

        let decision = {
            let mut strategy = self.strategy.lock();
            let decision = match strategy.next_integer_choice(max_value) {
                Ok(Some(value)) if value >= max_value.max(1) => {
                    Err(StrategyError::ChoiceOutOfRange { value, max_value })
                }
                other => other,
            };
            if let Ok(Some(value)) = decision {
                strategy.on_choice(token.operation, Choice::Integer(value));
            }
            decision
        };
        match decision {
            Ok(Some(value)) => {
                st.schedule.push_integer_choice(value);
                Ok(value)
            }
            Ok(None) => {
                st.fully_explored = true;
                Err(self.stop_locked(&mut st))
            }
            Err(e) => Err(self.abort_session(&mut st, e)),
        }
    }

    // ── Registration handshake ──────────────────────────────────────────

    /// Register a new operation. The first one registered becomes active
    /// immediately; later ones park in
    /// [`notify_event_handler_started`](Self::notify_event_handler_started)
    /// until scheduled.
    ///
    /// Registering an id twice keeps the first slot, so a thread already
    /// parked on it can still be woken and canceled.
    pub fn notify_event_handler_created(&self, id: OperationId, name: impl Into<String>) -> OperationToken {
        let mut st = self.state.lock();
        if st.operations.contains_key(&id) {
            warn!("operation {} registered twice; keeping the first registration", id);
        } else {
            let slot = Arc::new(OperationSlot::new(id, name.into()));
            if st.operations.is_empty() {
                slot.set_active(true);
                st.scheduled = Some(id);
            }
            if !st.running {
                slot.kill();
            }
            st.operations.insert(id, slot);
            debug!("registered operation {}", id);
        }
        OperationToken {
            scheduler: self.id,
            operation: id,
        }
    }

    /// Called by the new operation's own thread; parks until scheduled.
    pub fn notify_event_handler_started(&self, token: &OperationToken) -> Result<(), ExecutionCanceled> {
        let slot = {
            let mut st = self.state.lock();
            match st.operations.get(&token.operation) {
                Some(slot) if token.scheduler == self.id => Arc::clone(slot),
                _ => {
                    let message = format!(
                        "Detected uncontrolled synchronization: operation {} started without being registered",
                        token.operation
                    );
                    return Err(self.fail_locked(&mut st, BugKind::UncontrolledSynchronization, message));
                }
            }
        };
        slot.mark_handler_running();
        slot.wait_until_active()
    }

    /// Called by the creator; returns once the new operation's thread has
    /// reached [`notify_event_handler_started`](Self::notify_event_handler_started).
    pub fn wait_for_event_handler_to_start(&self, id: OperationId) {
        let slot = self.state.lock().operations.get(&id).cloned();
        if let Some(slot) = slot {
            slot.wait_for_handler();
        }
    }

    // ── Runtime state changes ───────────────────────────────────────────

    /// The caller is about to wait for a message that has not arrived.
    pub fn notify_operation_blocked_on_receive(&self, token: &OperationToken) {
        self.update_slot(token.operation, |s| {
            s.is_enabled = false;
            s.is_waiting_to_receive = true;
        });
    }

    /// A message arrived for an operation that was waiting to receive.
    pub fn notify_operation_unblocked(&self, id: OperationId) {
        self.update_slot(id, |s| {
            if s.is_waiting_to_receive {
                s.is_waiting_to_receive = false;
                s.is_enabled = true;
            }
        });
    }

    /// The caller's handler finished; it must still yield with
    /// [`OperationType::Stop`] to hand off control.
    pub fn notify_operation_completed(&self, token: &OperationToken) {
        self.update_slot(token.operation, |s| {
            s.is_enabled = false;
            s.is_completed = true;
            s.handler_running = false;
        });
    }

    fn update_slot(&self, id: OperationId, f: impl FnOnce(&mut SlotState)) {
        let slot = self.state.lock().operations.get(&id).cloned();
        match slot {
            Some(slot) => slot.update(f),
            None => warn!("state change for unknown operation {}", id),
        }
    }

    // ── Program notifications ───────────────────────────────────────────

    pub fn notify_create_operation(&self, creator: OperationId, created: OperationId) {
        let st = self.state.lock();
        if st.running {
            self.strategy.lock().on_create(creator, created);
        }
    }

    pub fn notify_start_operation(&self, operation: OperationId, initial: Option<&EventInfo>) {
        let st = self.state.lock();
        if st.running {
            self.strategy.lock().on_start(operation, initial);
        }
    }

    /// Returns whether the event should be enqueued at the target.
    pub fn notify_send_event(&self, sender: OperationId, target: OperationId, event: &EventInfo) -> Delivery {
        let st = self.state.lock();
        if !st.running {
            return Delivery::Deliver;
        }
        let delivery = self.strategy.lock().on_send(sender, target, event);
        if !delivery.is_delivered() {
            debug!("withholding {} from {} to {}", event, sender, target);
        }
        delivery
    }

    pub fn notify_receive_event(&self, receiver: OperationId, event: &EventInfo) {
        let st = self.state.lock();
        if st.running {
            self.strategy.lock().on_receive(receiver, event);
        }
    }

    /// A specification monitor entered a hot (`hot == true`) or cold state.
    pub fn notify_monitor_state(&self, monitor: &str, sender: OperationId, hot: bool) {
        let mut st = self.state.lock();
        if !st.running {
            return;
        }
        if hot {
            st.hot_monitors.entry(monitor.to_string()).or_insert(0);
        } else {
            st.hot_monitors.remove(monitor);
        }
        self.strategy.lock().on_monitor_state(monitor, sender, hot);
    }

    // ── Failure and completion ──────────────────────────────────────────

    /// Report a failed assertion. The first failure wins.
    ///
    /// With `kill_tasks` every operation is disabled and the caller gets
    /// [`ExecutionCanceled`]. Without it the run is marked complete and
    /// the remaining operations cancel at their next scheduling point.
    pub fn notify_assertion_failure(&self, text: impl Into<String>, kill_tasks: bool) -> Result<(), ExecutionCanceled> {
        let mut st = self.state.lock();
        self.record_bug(&mut st, BugReport::new(BugKind::Assertion, text));
        if kill_tasks {
            return Err(self.stop_locked(&mut st));
        }
        st.running = false;
        self.complete_locked(&mut st);
        Ok(())
    }

    /// Stop the run: wake and disable every operation and signal completion.
    ///
    /// Returns the cancellation the caller should propagate.
    pub fn stop(&self) -> ExecutionCanceled {
        let mut st = self.state.lock();
        self.stop_locked(&mut st)
    }

    /// Block until the run completes.
    pub fn wait(&self) {
        let mut st = self.state.lock();
        while !st.completed {
            self.completion.wait(&mut st);
        }
    }

    /// How the run ended. Meaningful after [`wait`](Self::wait) returns.
    pub fn outcome(&self) -> IterationOutcome {
        let st = self.state.lock();
        IterationOutcome {
            bug: st.bug.clone(),
            fully_explored: st.fully_explored,
            step_bound_reached: st.step_bound_reached,
            scheduled_steps: self.strategy.lock().scheduled_steps(),
            schedule: st.schedule.clone(),
            strategy_error: st.strategy_error.clone(),
        }
    }

    /// Statistics for this run.
    pub fn report(&self) -> TestReport {
        let outcome = self.outcome();
        let (fair, reached_max, description) = {
            let strategy = self.strategy.lock();
            (
                strategy.is_fair(),
                strategy.has_reached_max_scheduling_steps(),
                strategy.description(),
            )
        };
        let mut report = TestReport::new(description);
        report.record_run(&outcome, fair, reached_max, &self.config);
        report
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn check_controlled(&self, st: &mut SchedulerState, token: &OperationToken) -> Result<(), ExecutionCanceled> {
        let detail = if token.scheduler != self.id {
            format!("operation {} presented a token issued by another scheduler", token.operation)
        } else if let Some(slot) = st.operations.get(&token.operation) {
            match st.scheduled {
                Some(active) if active == token.operation => return Ok(()),
                Some(active) => format!(
                    "operation '{}' ({}) reached a scheduling point while operation {} is active",
                    slot.name, token.operation, active
                ),
                None => format!("operation '{}' ({}) reached a scheduling point with nothing scheduled", slot.name, token.operation),
            }
        } else {
            format!("operation {} is not controlled by the scheduler", token.operation)
        };
        let message = format!("Detected uncontrolled synchronization: {}", detail);
        Err(self.fail_locked(st, BugKind::UncontrolledSynchronization, message))
    }

    fn check_step_bound(&self, st: &mut SchedulerState) -> Result<(), ExecutionCanceled> {
        let (reached, fair) = {
            let strategy = self.strategy.lock();
            (strategy.has_reached_max_scheduling_steps(), strategy.is_fair())
        };
        if !reached {
            return Ok(());
        }
        st.step_bound_reached = true;
        let message = format!("Scheduling steps bound of {} reached.", self.config.step_bound(fair));
        if self.config.consider_depth_bound_hit_as_bug {
            Err(self.fail_locked(st, BugKind::StepBound, message))
        } else {
            debug!("{}", message);
            Err(self.stop_locked(st))
        }
    }

    /// Raise the temperature of every hot monitor; too hot in a fair run is
    /// a liveness bug.
    fn heat_monitors(&self, st: &mut SchedulerState) -> Result<(), ExecutionCanceled> {
        let threshold = self.config.liveness_temperature_threshold;
        if st.hot_monitors.is_empty() || threshold == 0 || !self.strategy.lock().is_fair() {
            return Ok(());
        }
        let mut overheated = None;
        for (monitor, temperature) in st.hot_monitors.iter_mut() {
            *temperature += 1;
            if *temperature > threshold && overheated.is_none() {
                overheated = Some(monitor.clone());
            }
        }
        match overheated {
            Some(monitor) => {
                let message = format!("Monitor '{}' detected potential liveness bug in hot state.", monitor);
                Err(self.fail_locked(st, BugKind::Liveness { monitor }, message))
            }
            None => Ok(()),
        }
    }

    /// The strategy returned no operation.
    fn finish_exhausted(&self, st: &mut SchedulerState, choices: &[SchedulableOperation]) -> ExecutionCanceled {
        let any_enabled = choices.iter().any(|op| op.is_enabled);
        let waiting: Vec<&str> = choices
            .iter()
            .filter(|op| op.is_waiting_to_receive)
            .map(|op| op.name.as_str())
            .collect();

        if !any_enabled && !waiting.is_empty() {
            let verb = if waiting.len() == 1 { "is" } else { "are" };
            let message = format!(
                "Livelock detected. {} {} waiting to receive an event, but no other controlled operations are enabled.",
                quote_names(&waiting),
                verb
            );
            return self.fail_locked(st, BugKind::Livelock, message);
        }

        let fair = self.strategy.lock().is_fair();
        if !any_enabled && fair {
            if let Some(monitor) = st.hot_monitors.keys().next().cloned() {
                let message = format!(
                    "Monitor '{}' detected liveness bug in hot state at the end of program execution.",
                    monitor
                );
                return self.fail_locked(st, BugKind::Liveness { monitor }, message);
            }
        }

        st.fully_explored = true;
        self.stop_locked(st)
    }

    fn abort_session(&self, st: &mut SchedulerState, err: StrategyError) -> ExecutionCanceled {
        error!("strategy error: {}", err);
        if st.strategy_error.is_none() {
            st.strategy_error = Some(err);
        }
        self.stop_locked(st)
    }

    fn record_bug(&self, st: &mut SchedulerState, bug: BugReport) {
        if st.bug.is_none() {
            error!("bug found: {}", bug.message);
            st.bug = Some(bug);
        }
    }

    fn fail_locked(&self, st: &mut SchedulerState, kind: BugKind, message: String) -> ExecutionCanceled {
        self.record_bug(st, BugReport::new(kind, message));
        self.stop_locked(st)
    }

    fn stop_locked(&self, st: &mut SchedulerState) -> ExecutionCanceled {
        if st.running {
            info!("stopping scheduler after {} decisions", st.schedule.len());
        }
        st.running = false;
        for slot in st.operations.values() {
            slot.kill();
        }
        self.complete_locked(st);
        ExecutionCanceled
    }

    fn complete_locked(&self, st: &mut SchedulerState) {
        if !st.completed {
            st.completed = true;
            self.completion.notify_all();
        }
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b' and 'c'`.
fn quote_names(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{RandomStrategy, ReplayStrategy, ScheduleStep};
    use std::thread;

    fn scheduler_with<S: SchedulingStrategy + 'static>(config: Configuration, strategy: S) -> Arc<BugFindingScheduler> {
        let shared: SharedStrategy = Arc::new(Mutex::new(strategy));
        Arc::new(BugFindingScheduler::new(config, shared))
    }

    fn random_scheduler() -> Arc<BugFindingScheduler> {
        scheduler_with(Configuration::default(), RandomStrategy::new(0, 0))
    }

    #[test]
    fn quote_names_joins_naturally() {
        assert_eq!(quote_names(&["a"]), "'a'");
        assert_eq!(quote_names(&["a", "b"]), "'a' and 'b'");
        assert_eq!(quote_names(&["a", "b", "c"]), "'a', 'b' and 'c'");
    }

    #[test]
    fn first_operation_is_active_immediately() {
        let scheduler = random_scheduler();
        let token = scheduler.notify_event_handler_created(OperationId(0), "harness");
        assert_eq!(scheduler.scheduled_operation(), Some(OperationId(0)));
        assert_eq!(scheduler.notify_event_handler_started(&token), Ok(()));
        // Sole enabled operation keeps control.
        scheduler
            .schedule_next_operation(&token, OperationType::Yield, TargetType::Operation, OperationId(0))
            .unwrap();
        let op = scheduler.operation(OperationId(0)).unwrap();
        assert_eq!(op.operation_count, 1);
        assert_eq!(op.next.operation_type, OperationType::Yield);
    }

    #[test]
    fn duplicate_registration_keeps_parked_waiter() {
        let scheduler = random_scheduler();
        let _harness = scheduler.notify_event_handler_created(OperationId(0), "harness");
        let worker = scheduler.notify_event_handler_created(OperationId(1), "worker");

        let parked = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.notify_event_handler_started(&worker))
        };
        scheduler.wait_for_event_handler_to_start(OperationId(1));

        let _again = scheduler.notify_event_handler_created(OperationId(1), "impostor");
        assert_eq!(scheduler.operation(OperationId(1)).unwrap().name, "worker");
        assert_eq!(scheduler.operations().len(), 2);

        scheduler.stop();
        assert_eq!(parked.join().unwrap(), Err(ExecutionCanceled));
    }

    #[test]
    fn token_from_another_scheduler_is_uncontrolled() {
        let a = random_scheduler();
        let b = random_scheduler();
        let _harness = b.notify_event_handler_created(OperationId(0), "harness");
        let foreign = a.notify_event_handler_created(OperationId(0), "harness");

        let result = b.schedule_next_operation(&foreign, OperationType::Send, TargetType::Inbox, OperationId(0));
        assert_eq!(result, Err(ExecutionCanceled));
        let bug = b.outcome().bug.unwrap();
        assert_eq!(bug.kind, BugKind::UncontrolledSynchronization);
        assert!(bug.message.contains("another scheduler"));
        assert!(!b.is_running());
    }

    #[test]
    fn inactive_operation_yielding_is_uncontrolled() {
        let scheduler = random_scheduler();
        let _harness = scheduler.notify_event_handler_created(OperationId(0), "harness");
        let worker = scheduler.notify_event_handler_created(OperationId(1), "worker");

        let result = scheduler.next_boolean_choice(&worker, 2, None);
        assert_eq!(result, Err(ExecutionCanceled));
        let bug = scheduler.outcome().bug.unwrap();
        assert_eq!(bug.kind, BugKind::UncontrolledSynchronization);
        assert!(bug.message.contains("'worker' (1)"));
    }

    #[test]
    fn blocked_receiver_with_nothing_enabled_is_livelock() {
        let scheduler = random_scheduler();
        let harness = scheduler.notify_event_handler_created(OperationId(0), "harness");
        let server = scheduler.notify_event_handler_created(OperationId(1), "Server");
        scheduler.notify_operation_blocked_on_receive(&server);

        scheduler.notify_operation_completed(&harness);
        let result = scheduler.schedule_next_operation(&harness, OperationType::Stop, TargetType::Operation, OperationId(0));
        assert_eq!(result, Err(ExecutionCanceled));

        let outcome = scheduler.outcome();
        assert!(!outcome.fully_explored, "livelock must not count as fully explored");
        let bug = outcome.bug.unwrap();
        assert_eq!(bug.kind, BugKind::Livelock);
        assert_eq!(
            bug.message,
            "Livelock detected. 'Server' is waiting to receive an event, but no other controlled operations are enabled."
        );
    }

    #[test]
    fn completed_run_is_fully_explored() {
        let scheduler = random_scheduler();
        let harness = scheduler.notify_event_handler_created(OperationId(0), "harness");
        scheduler.notify_operation_completed(&harness);
        let result = scheduler.schedule_next_operation(&harness, OperationType::Stop, TargetType::Operation, OperationId(0));
        assert_eq!(result, Err(ExecutionCanceled));
        scheduler.wait();
        let outcome = scheduler.outcome();
        assert!(outcome.fully_explored);
        assert!(outcome.bug.is_none());
    }

    #[test]
    fn step_bound_truncates_by_default() {
        let scheduler = scheduler_with(Configuration::default(), RandomStrategy::new(0, 2));
        let token = scheduler.notify_event_handler_created(OperationId(0), "harness");
        for _ in 0..2 {
            scheduler
                .schedule_next_operation(&token, OperationType::Yield, TargetType::Operation, OperationId(0))
                .unwrap();
        }
        let third = scheduler.schedule_next_operation(&token, OperationType::Yield, TargetType::Operation, OperationId(0));
        assert_eq!(third, Err(ExecutionCanceled));
        let outcome = scheduler.outcome();
        assert!(outcome.step_bound_reached);
        assert!(outcome.bug.is_none());
    }

    #[test]
    fn step_bound_can_be_a_bug() {
        let config = Configuration {
            consider_depth_bound_hit_as_bug: true,
            max_fair_scheduling_steps: 1,
            ..Default::default()
        };
        let scheduler = scheduler_with(config, RandomStrategy::new(0, 1));
        let token = scheduler.notify_event_handler_created(OperationId(0), "harness");
        scheduler
            .schedule_next_operation(&token, OperationType::Yield, TargetType::Operation, OperationId(0))
            .unwrap();
        assert!(scheduler
            .schedule_next_operation(&token, OperationType::Yield, TargetType::Operation, OperationId(0))
            .is_err());
        let bug = scheduler.outcome().bug.unwrap();
        assert_eq!(bug.kind, BugKind::StepBound);
        assert_eq!(bug.message, "Scheduling steps bound of 1 reached.");
    }

    #[test]
    fn first_assertion_failure_wins() {
        let scheduler = random_scheduler();
        let _token = scheduler.notify_event_handler_created(OperationId(0), "harness");
        assert_eq!(scheduler.notify_assertion_failure("first", false), Ok(()));
        assert_eq!(scheduler.notify_assertion_failure("second", true), Err(ExecutionCanceled));
        assert_eq!(scheduler.outcome().bug.unwrap().message, "first");
    }

    #[test]
    fn choices_are_logged_and_validated() {
        let scheduler = scheduler_with(
            Configuration::default(),
            ReplayStrategy::new(
                ScheduleTrace::from(vec![
                    ScheduleStep::BooleanChoice(true),
                    ScheduleStep::IntegerChoice(9),
                ]),
                false,
            ),
        );
        let token = scheduler.notify_event_handler_created(OperationId(0), "harness");
        assert_eq!(scheduler.next_boolean_choice(&token, 2, Some("coin")), Ok(true));
        // 9 is out of range for max 5.
        assert_eq!(scheduler.next_integer_choice(&token, 5), Err(ExecutionCanceled));
        let outcome = scheduler.outcome();
        assert_eq!(
            outcome.strategy_error,
            Some(StrategyError::ChoiceOutOfRange { value: 9, max_value: 5 })
        );
        assert_eq!(outcome.schedule.get(0), Some(&ScheduleStep::FairBooleanChoice("coin".into(), true)));
    }

    #[test]
    fn stop_cancels_parked_operations() {
        let scheduler = random_scheduler();
        let _harness = scheduler.notify_event_handler_created(OperationId(0), "harness");
        let worker = scheduler.notify_event_handler_created(OperationId(1), "worker");

        let parked = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.notify_event_handler_started(&worker))
        };
        scheduler.wait_for_event_handler_to_start(OperationId(1));
        let _ = scheduler.stop();
        assert_eq!(parked.join().unwrap(), Err(ExecutionCanceled));
        scheduler.wait();
    }

    #[test]
    fn control_passes_between_threads_in_replayed_order() {
        let trace = ScheduleTrace::from(vec![
            ScheduleStep::SchedulingChoice(OperationId(1)),
            ScheduleStep::SchedulingChoice(OperationId(0)),
        ]);
        let scheduler = scheduler_with(Configuration::default(), ReplayStrategy::new(trace, false));
        let harness = scheduler.notify_event_handler_created(OperationId(0), "harness");
        let worker = scheduler.notify_event_handler_created(OperationId(1), "worker");
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            let log = Arc::clone(&log);
            thread::spawn(move || -> Result<(), ExecutionCanceled> {
                scheduler.notify_event_handler_started(&worker)?;
                log.lock().push("worker");
                scheduler.notify_operation_completed(&worker);
                scheduler.schedule_next_operation(&worker, OperationType::Stop, TargetType::Operation, OperationId(1))
            })
        };
        scheduler.wait_for_event_handler_to_start(OperationId(1));

        scheduler
            .schedule_next_operation(&harness, OperationType::Create, TargetType::Operation, OperationId(1))
            .unwrap();
        log.lock().push("harness");

        assert_eq!(handle.join().unwrap(), Ok(()));
        assert_eq!(*log.lock(), vec!["worker", "harness"]);
        assert_eq!(scheduler.scheduled_operation(), Some(OperationId(0)));
    }
}
