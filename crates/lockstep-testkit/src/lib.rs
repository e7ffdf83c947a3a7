//! A small in-process message-passing runtime for driving lockstep in tests.
//!
//! Every operation is a real thread with an inbox. Operations only touch
//! shared state through a [`Context`], and every context action yields to
//! the [`BugFindingScheduler`] first, so the scheduler decides the exact
//! interleaving:
//!
//! | Action                  | Scheduling point declared           | Notification           |
//! |-------------------------|-------------------------------------|------------------------|
//! | [`Context::create`]     | `Create` on the new operation       | `notify_create_operation` |
//! | first activation        | (the operation's `Start`)           | `notify_start_operation`  |
//! | [`Context::send`]       | `Send` to the target's inbox        | `notify_send_event`       |
//! | [`Context::receive`]    | `Receive` on the caller's inbox     | `notify_receive_event`    |
//! | [`Context::nondet_bool`]| none                                | choice hooks           |
//! | operation returns       | `Stop`                              | `notify_operation_completed` |
//!
//! # Example
//!
//! ```rust,ignore
//! use lockstep_testkit::program;
//!
//! let mut harness = program(|ctx| {
//!     let server = ctx.create("server", |ctx| {
//!         let ping = ctx.receive()?;
//!         ctx.send(ping.sender, "Pong", 0)
//!     })?;
//!     ctx.send(server, "Ping", 0)?;
//!     let pong = ctx.receive()?;
//!     ctx.assert(pong.name == "Pong", "expected a pong")
//! });
//! engine.run(&mut harness)?;
//! ```

use lockstep_core::{EventInfo, MessageId, OperationId, OperationType, TargetType};
use lockstep_scheduler::{BugFindingScheduler, ExecutionCanceled, OperationToken};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Body of a controlled operation.
pub type OperationBody = Box<dyn FnOnce(&mut Context) -> Result<(), ExecutionCanceled> + Send>;

/// A message delivered to an inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: OperationId,
    pub name: String,
    pub value: u64,
}

// ═══════════════════════════════════════════════════════════════════════
//  Runtime
// ═══════════════════════════════════════════════════════════════════════

/// Per-run runtime state shared by every operation's context.
struct Runtime {
    scheduler: Arc<BugFindingScheduler>,
    inboxes: Mutex<HashMap<OperationId, VecDeque<Message>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    next_operation: AtomicU64,
    next_message: AtomicU64,
}

impl Runtime {
    fn new(scheduler: Arc<BugFindingScheduler>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            inboxes: Mutex::new(HashMap::new()),
            threads: Mutex::new(Vec::new()),
            next_operation: AtomicU64::new(1),
            next_message: AtomicU64::new(1),
        })
    }

    fn join_all(&self) {
        loop {
            let handle = self.threads.lock().pop();
            match handle {
                Some(handle) => {
                    if handle.join().is_err() {
                        warn!("operation thread panicked");
                    }
                }
                None => break,
            }
        }
    }
}

/// Run `main` as the harness operation (id 0) on the calling thread, then
/// wait for every operation it created to exit.
pub fn run<F>(scheduler: Arc<BugFindingScheduler>, main: F)
where
    F: FnOnce(&mut Context) -> Result<(), ExecutionCanceled>,
{
    let runtime = Runtime::new(Arc::clone(&scheduler));
    let token = scheduler.notify_event_handler_created(OperationId::HARNESS, "harness");
    let mut ctx = Context {
        runtime: Arc::clone(&runtime),
        token,
    };
    let result = scheduler
        .notify_event_handler_started(&ctx.token)
        .and_then(|()| main(&mut ctx))
        .and_then(|()| ctx.finish());
    if result.is_err() {
        debug!("harness canceled");
    }
    runtime.join_all();
}

/// Wrap a harness body as something the testing engine can run.
pub fn program<F>(main: F) -> impl FnMut(Arc<BugFindingScheduler>)
where
    F: Fn(&mut Context) -> Result<(), ExecutionCanceled>,
{
    move |scheduler| run(scheduler, &main)
}

// ═══════════════════════════════════════════════════════════════════════
//  Context
// ═══════════════════════════════════════════════════════════════════════

/// An operation's handle on the runtime.
pub struct Context {
    runtime: Arc<Runtime>,
    token: OperationToken,
}

impl Context {
    pub fn id(&self) -> OperationId {
        self.token.operation()
    }

    pub fn scheduler(&self) -> &Arc<BugFindingScheduler> {
        &self.runtime.scheduler
    }

    fn yield_for(&self, operation_type: OperationType, target_type: TargetType, target: OperationId) -> Result<(), ExecutionCanceled> {
        self.runtime
            .scheduler
            .schedule_next_operation(&self.token, operation_type, target_type, target)
    }

    /// Create and start a new operation running `body`.
    ///
    /// Returns once the new operation's thread is parked waiting to be
    /// scheduled.
    pub fn create<F>(&mut self, name: &str, body: F) -> Result<OperationId, ExecutionCanceled>
    where
        F: FnOnce(&mut Context) -> Result<(), ExecutionCanceled> + Send + 'static,
    {
        let id = OperationId(self.runtime.next_operation.fetch_add(1, Ordering::Relaxed));
        self.yield_for(OperationType::Create, TargetType::Operation, id)?;

        let scheduler = Arc::clone(&self.runtime.scheduler);
        let token = scheduler.notify_event_handler_created(id, name);
        scheduler.notify_create_operation(self.id(), id);
        self.runtime.inboxes.lock().entry(id).or_default();

        let runtime = Arc::clone(&self.runtime);
        let body: OperationBody = Box::new(body);
        let handle = thread::Builder::new()
            .name(format!("lockstep-op-{}", id))
            .spawn(move || {
                let mut ctx = Context { runtime, token };
                let result = ctx
                    .runtime
                    .scheduler
                    .notify_event_handler_started(&ctx.token)
                    .and_then(|()| {
                        ctx.runtime.scheduler.notify_start_operation(id, None);
                        body(&mut ctx)
                    })
                    .and_then(|()| ctx.finish());
                if result.is_err() {
                    debug!("operation {} canceled", id);
                }
            });
        match handle {
            Ok(handle) => self.runtime.threads.lock().push(handle),
            Err(e) => {
                let message = format!("failed to spawn operation {}: {}", id, e);
                return Err(self.fail(message));
            }
        }
        scheduler.wait_for_event_handler_to_start(id);
        Ok(id)
    }

    /// Send `name` carrying `value` to `target`'s inbox.
    pub fn send(&mut self, target: OperationId, name: &str, value: u64) -> Result<(), ExecutionCanceled> {
        self.yield_for(OperationType::Send, TargetType::Inbox, target)?;

        let id = MessageId(self.runtime.next_message.fetch_add(1, Ordering::Relaxed));
        let event = EventInfo::new(name).with_message_id(id).with_payload(&value);
        let delivery = self.runtime.scheduler.notify_send_event(self.id(), target, &event);
        if !delivery.is_delivered() {
            return Ok(());
        }
        self.runtime.inboxes.lock().entry(target).or_default().push_back(Message {
            id,
            sender: self.id(),
            name: name.to_string(),
            value,
        });
        self.runtime.scheduler.notify_operation_unblocked(target);
        Ok(())
    }

    /// Take the next message from the caller's inbox, waiting if it is empty.
    pub fn receive(&mut self) -> Result<Message, ExecutionCanceled> {
        let me = self.id();
        loop {
            let ready = self.runtime.inboxes.lock().get(&me).is_some_and(|q| !q.is_empty());
            if !ready {
                self.runtime.scheduler.notify_operation_blocked_on_receive(&self.token);
            }
            self.yield_for(OperationType::Receive, TargetType::Inbox, me)?;

            let message = self.runtime.inboxes.lock().get_mut(&me).and_then(VecDeque::pop_front);
            if let Some(message) = message {
                let event = EventInfo::new(message.name.as_str())
                    .with_message_id(message.id)
                    .with_payload(&message.value);
                self.runtime.scheduler.notify_receive_event(me, &event);
                return Ok(message);
            }
        }
    }

    pub fn nondet_bool(&mut self) -> Result<bool, ExecutionCanceled> {
        self.runtime.scheduler.next_boolean_choice(&self.token, 2, None)
    }

    /// A boolean the scheduler must eventually answer both ways.
    pub fn fair_bool(&mut self, uid: &str) -> Result<bool, ExecutionCanceled> {
        self.runtime.scheduler.next_boolean_choice(&self.token, 2, Some(uid))
    }

    pub fn nondet_int(&mut self, max_value: u32) -> Result<u32, ExecutionCanceled> {
        self.runtime.scheduler.next_integer_choice(&self.token, max_value)
    }

    /// Fail the run with `message` unless `condition` holds.
    pub fn assert(&mut self, condition: bool, message: &str) -> Result<(), ExecutionCanceled> {
        if condition {
            Ok(())
        } else {
            Err(self.fail(message))
        }
    }

    /// Report a monitor entering a hot or cold state.
    pub fn monitor(&mut self, name: &str, hot: bool) {
        self.runtime.scheduler.notify_monitor_state(name, self.id(), hot);
    }

    fn fail(&self, message: impl Into<String>) -> ExecutionCanceled {
        match self.runtime.scheduler.notify_assertion_failure(message, true) {
            Err(canceled) => canceled,
            Ok(()) => ExecutionCanceled,
        }
    }

    fn finish(&mut self) -> Result<(), ExecutionCanceled> {
        self.runtime.scheduler.notify_operation_completed(&self.token);
        self.yield_for(OperationType::Stop, TargetType::Operation, self.id())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{BugKind, Configuration, RandomStrategy};
    use lockstep_scheduler::TestingEngine;

    fn engine(iterations: usize, seed: u64) -> TestingEngine<RandomStrategy> {
        let config = Configuration::default().with_iterations(iterations).with_seed(seed);
        let strategy = RandomStrategy::from_config(&config);
        TestingEngine::new(config, strategy)
    }

    #[test]
    fn ping_pong_completes() {
        let mut harness = program(|ctx| {
            let server = ctx.create("server", |ctx| {
                let ping = ctx.receive()?;
                ctx.send(ping.sender, "Pong", ping.value + 1)
            })?;
            ctx.send(server, "Ping", 41)?;
            let pong = ctx.receive()?;
            ctx.assert(pong.value == 42, "pong carries the incremented value")
        });
        let mut engine = engine(20, 7);
        let report = engine.run(&mut harness).unwrap();
        assert_eq!(report.num_of_found_bugs, 0);
        assert_eq!(report.explored_fair_schedules, 20);
        assert!(engine.last_outcome().unwrap().fully_explored);
    }

    #[test]
    fn receive_with_no_sender_is_a_livelock() {
        let mut harness = program(|ctx| {
            ctx.create("waiter", |ctx| ctx.receive().map(|_| ()))?;
            Ok(())
        });
        let mut engine = engine(1, 0);
        engine.run(&mut harness).unwrap();
        let bug = engine.last_outcome().unwrap().bug.clone().unwrap();
        assert_eq!(bug.kind, BugKind::Livelock);
        assert!(bug.message.contains("'waiter' is waiting to receive"));
    }

    #[test]
    fn failed_assertion_is_reported() {
        let mut harness = program(|ctx| {
            let coin = ctx.nondet_bool()?;
            ctx.assert(!coin, "coin came up heads")
        });
        let mut engine = engine(50, 3);
        let report = engine.run(&mut harness).unwrap();
        assert_eq!(report.num_of_found_bugs, 1);
        assert!(report.bug_reports.contains("coin came up heads"));
    }

    #[test]
    fn operation_ids_are_deterministic_per_run() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let mut harness = program(move |ctx| {
            let a = ctx.create("a", |_| Ok(()))?;
            let b = ctx.create("b", |_| Ok(()))?;
            record.lock().push((a, b));
            Ok(())
        });
        engine(3, 1).run(&mut harness).unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|&ids| ids == (OperationId(1), OperationId(2))));
    }
}
