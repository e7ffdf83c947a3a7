//! The minimization strategy: drives the trace editor from inside the
//! scheduler.

use crate::editor::{MinimizationConfig, Phase, TraceEditor};
use crate::matching::MatchPolicy;
use crate::report::MinimizationReport;
use lockstep_core::{
    Configuration, Choice, Delivery, EventInfo, IterationOutcome, OperationId, ReplayStrategy, SchedulableOperation,
    SchedulingStrategy, ScheduleTrace, StrategyError, TraceBody, TraceDump, TraceMetadata,
};
use lockstep_model::{EventTree, ModelError, ProgramModel};
use log::debug;

/// Who decides the current iteration's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchMode {
    /// Exact replay of the input schedule.
    Replay,
    /// Following the editor's guide tree.
    Guided,
    /// Guide or schedule exhausted: the suffix strategy, or the first
    /// enabled operation when there is none.
    Free,
}

/// Minimizes a buggy execution over many iterations.
///
/// Each iteration replays either the input schedule or the current best
/// event tree with some edit applied, while a [`ProgramModel`] records what
/// actually happened. At the end of the iteration the editor decides
/// whether the edit still reproduced the bug. Once the editor reaches
/// [`Phase::EpochCompleted`], [`prepare_for_next_iteration`] returns
/// `false` and the session ends.
///
/// [`prepare_for_next_iteration`]: SchedulingStrategy::prepare_for_next_iteration
pub struct MinimizationStrategy {
    editor: TraceEditor,
    schedule: Option<ScheduleTrace>,
    replay: Option<ReplayStrategy>,
    /// Takes over when the guide runs out.
    suffix: Option<Box<dyn SchedulingStrategy>>,
    mode: DispatchMode,
    model: ProgramModel,
    metadata: TraceMetadata,
    original_length: usize,
    max_steps: usize,
    steps: usize,
}

impl MinimizationStrategy {
    /// Minimize starting from a flat schedule.
    pub fn from_schedule(
        schedule: ScheduleTrace,
        metadata: TraceMetadata,
        config: &Configuration,
        min_config: MinimizationConfig,
    ) -> Self {
        let mut editor = TraceEditor::new(min_config);
        editor.start_from_schedule();
        let original_length = schedule.len();
        Self::with_editor(editor, Some(schedule), metadata, config, original_length)
    }

    /// Minimize starting from an event tree (a loaded mintrace).
    pub fn from_tree(
        tree: EventTree,
        metadata: TraceMetadata,
        config: &Configuration,
        min_config: MinimizationConfig,
    ) -> Self {
        let original_length = tree.len();
        let mut editor = TraceEditor::new(min_config);
        editor.start_from_tree(tree);
        Self::with_editor(editor, None, metadata, config, original_length)
    }

    /// Minimize whatever `dump` holds. The dump's header settings are
    /// applied to a copy of `config`.
    pub fn from_dump(
        dump: &TraceDump,
        config: &Configuration,
        min_config: MinimizationConfig,
    ) -> Result<Self, ModelError> {
        let mut config = config.clone();
        dump.metadata.apply_to(&mut config);
        let metadata = TraceMetadata {
            is_mintrace: false,
            bug_found: false,
            bug_step: None,
            liveness_monitor: None,
            ..dump.metadata.clone()
        };
        match &dump.body {
            TraceBody::Schedule(schedule) => Ok(Self::from_schedule(schedule.clone(), metadata, &config, min_config)),
            TraceBody::Mintrace(_) => {
                let tree = EventTree::from_mintrace(dump)?;
                Ok(Self::from_tree(tree, metadata, &config, min_config))
            }
        }
    }

    fn with_editor(
        editor: TraceEditor,
        schedule: Option<ScheduleTrace>,
        metadata: TraceMetadata,
        config: &Configuration,
        original_length: usize,
    ) -> Self {
        let mut strategy = Self {
            editor,
            schedule,
            replay: None,
            suffix: None,
            mode: DispatchMode::Replay,
            model: ProgramModel::new(),
            metadata,
            original_length,
            max_steps: original_length.saturating_add(config.liveness_temperature_threshold),
            steps: 0,
        };
        strategy.plan();
        strategy
    }

    /// Let `suffix` decide once the guide is exhausted.
    pub fn with_suffix(mut self, suffix: Box<dyn SchedulingStrategy>) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn with_match_policy(mut self, policy: Box<dyn MatchPolicy>) -> Self {
        self.editor = self.editor.with_match_policy(policy);
        self
    }

    pub fn editor(&self) -> &TraceEditor {
        &self.editor
    }

    pub fn phase(&self) -> &Phase {
        self.editor.phase()
    }

    pub fn is_completed(&self) -> bool {
        self.editor.is_completed()
    }

    /// Smallest reproducing event tree found so far.
    pub fn best_tree(&self) -> Option<&EventTree> {
        self.editor.best()
    }

    /// The best tree as a mintrace dump.
    pub fn best_mintrace(&self) -> Result<Option<TraceDump>, ModelError> {
        self.editor
            .best()
            .map(|tree| tree.to_mintrace(self.metadata.clone()))
            .transpose()
    }

    pub fn report(&self) -> MinimizationReport {
        MinimizationReport::from_editor(&self.editor, self.description(), &self.metadata, self.original_length)
    }

    /// Set up the iteration the editor planned.
    fn plan(&mut self) {
        self.editor.begin_iteration();
        self.model = ProgramModel::new();
        self.steps = 0;
        self.mode = match (self.editor.phase(), &self.schedule) {
            (Phase::ScheduleTraceReplay, Some(schedule)) => {
                self.replay = Some(ReplayStrategy::new(schedule.clone(), false));
                DispatchMode::Replay
            }
            (phase, _) if phase.is_guided() => DispatchMode::Guided,
            _ => DispatchMode::Free,
        };
        debug!("planned {} iteration in {:?} mode", self.editor.phase(), self.mode);
    }

    fn go_free(&mut self) {
        if self.mode != DispatchMode::Free {
            debug!("guide exhausted after {} steps", self.steps);
            self.mode = DispatchMode::Free;
        }
    }

    fn free_operation(
        &mut self,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError> {
        self.go_free();
        match self.suffix.as_mut() {
            Some(suffix) => suffix.next_operation(choices, current),
            None => Ok(choices.iter().find(|op| op.is_enabled).map(|op| op.id)),
        }
    }

    fn free_boolean(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
        self.go_free();
        match self.suffix.as_mut() {
            Some(suffix) => suffix.next_boolean_choice(max_value),
            None => Ok(Some(false)),
        }
    }

    fn free_integer(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        self.go_free();
        match self.suffix.as_mut() {
            Some(suffix) => suffix.next_integer_choice(max_value),
            None => Ok(Some(0)),
        }
    }
}

impl SchedulingStrategy for MinimizationStrategy {
    fn next_operation(
        &mut self,
        choices: &[SchedulableOperation],
        current: OperationId,
    ) -> Result<Option<OperationId>, StrategyError> {
        self.steps += 1;
        match self.mode {
            DispatchMode::Replay => {
                let decision = match self.replay.as_mut() {
                    Some(replay) => replay.next_operation(choices, current),
                    None => Err(StrategyError::Other("no schedule to replay".into())),
                };
                match decision {
                    Err(StrategyError::TraceExhausted { .. }) => self.free_operation(choices, current),
                    other => other,
                }
            }
            DispatchMode::Guided => match self.editor.next_operation(choices) {
                Some(next) => Ok(Some(next)),
                None => self.free_operation(choices, current),
            },
            DispatchMode::Free => self.free_operation(choices, current),
        }
    }

    fn next_boolean_choice(&mut self, max_value: u32) -> Result<Option<bool>, StrategyError> {
        self.steps += 1;
        match self.mode {
            DispatchMode::Replay => {
                let decision = match self.replay.as_mut() {
                    Some(replay) => replay.next_boolean_choice(max_value),
                    None => Err(StrategyError::Other("no schedule to replay".into())),
                };
                match decision {
                    Err(StrategyError::TraceExhausted { .. }) => self.free_boolean(max_value),
                    other => other,
                }
            }
            DispatchMode::Guided => match self.editor.next_boolean_choice() {
                Some(value) => Ok(Some(value)),
                None => match self.suffix.as_mut() {
                    Some(suffix) => suffix.next_boolean_choice(max_value),
                    None => Ok(Some(false)),
                },
            },
            DispatchMode::Free => self.free_boolean(max_value),
        }
    }

    fn next_integer_choice(&mut self, max_value: u32) -> Result<Option<u32>, StrategyError> {
        self.steps += 1;
        match self.mode {
            DispatchMode::Replay => {
                let decision = match self.replay.as_mut() {
                    Some(replay) => replay.next_integer_choice(max_value),
                    None => Err(StrategyError::Other("no schedule to replay".into())),
                };
                match decision {
                    Err(StrategyError::TraceExhausted { .. }) => self.free_integer(max_value),
                    other => other,
                }
            }
            DispatchMode::Guided => match self.editor.next_integer_choice(max_value)? {
                Some(value) => Ok(Some(value)),
                None => match self.suffix.as_mut() {
                    Some(suffix) => suffix.next_integer_choice(max_value),
                    None => Ok(Some(0)),
                },
            },
            DispatchMode::Free => self.free_integer(max_value),
        }
    }

    fn force_next(
        &mut self,
        _next: OperationId,
        _choices: &[SchedulableOperation],
        _current: OperationId,
    ) -> Result<(), StrategyError> {
        Err(StrategyError::Unsupported("forcing a scheduling decision during minimization"))
    }

    fn force_next_boolean_choice(&mut self, _max_value: u32, _value: bool) -> Result<(), StrategyError> {
        Err(StrategyError::Unsupported("forcing a boolean choice during minimization"))
    }

    fn force_next_integer_choice(&mut self, _max_value: u32, _value: u32) -> Result<(), StrategyError> {
        Err(StrategyError::Unsupported("forcing an integer choice during minimization"))
    }

    fn prepare_for_next_iteration(&mut self) -> Result<bool, StrategyError> {
        if self.editor.is_completed() {
            return Ok(false);
        }
        if let Some(suffix) = self.suffix.as_mut() {
            suffix.prepare_for_next_iteration()?;
        }
        self.plan();
        Ok(true)
    }

    fn reset(&mut self) {
        if let Some(suffix) = self.suffix.as_mut() {
            suffix.reset();
        }
        self.plan();
    }

    fn scheduled_steps(&self) -> usize {
        self.steps
    }

    fn has_reached_max_scheduling_steps(&self) -> bool {
        self.max_steps > 0 && self.steps > self.max_steps
    }

    fn is_fair(&self) -> bool {
        self.suffix.as_ref().is_some_and(|suffix| suffix.is_fair())
    }

    fn description(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("Minimize({})", suffix.description()),
            None => "Minimize".to_string(),
        }
    }

    fn on_create(&mut self, creator: OperationId, created: OperationId) {
        self.model.record_create(creator, created);
    }

    fn on_start(&mut self, operation: OperationId, initial: Option<&EventInfo>) {
        self.model.record_start(operation, initial);
    }

    fn on_send(&mut self, sender: OperationId, target: OperationId, event: &EventInfo) -> Delivery {
        let step = self.model.record_send(sender, target, event);
        let delivery = self.editor.on_send(event);
        if !delivery.is_delivered() {
            self.model.mark_withheld(step);
        }
        delivery
    }

    fn on_receive(&mut self, receiver: OperationId, event: &EventInfo) {
        self.model.record_receive(receiver, event);
    }

    fn on_choice(&mut self, operation: OperationId, choice: Choice) {
        self.model.record_choice(operation, choice);
    }

    fn on_monitor_state(&mut self, monitor: &str, sender: OperationId, hot: bool) {
        self.model.record_monitor_state(monitor, sender, hot);
    }

    fn on_scheduling_ended(&mut self, outcome: &IterationOutcome) -> Result<(), StrategyError> {
        self.model.record_scheduling_ended(outcome.bug.as_ref());
        let tree = std::mem::take(&mut self.model).into_tree();
        debug!(
            "{} iteration ended after {} steps (bug: {})",
            self.editor.phase(),
            tree.len(),
            outcome.bug_found()
        );
        self.editor.on_iteration_end(outcome.bug.as_ref().map(|bug| &bug.kind), tree)?;
        match self.suffix.as_mut() {
            Some(suffix) => suffix.on_scheduling_ended(outcome),
            None => Ok(()),
        }
    }
}
