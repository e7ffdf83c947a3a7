//! Minimization sessions driven end to end through the testkit runtime.

use lockstep_core::{Configuration, OperationId, RandomStrategy, ScheduleTrace, TraceMetadata};
use lockstep_minimize::{
    minimize, DeclaredActionMatch, EditTrial, MinimizationConfig, MinimizationStrategy, MinimizeError, Minimized,
    WithholdSearch,
};
use lockstep_model::{EventTree, StepKind};
use lockstep_scheduler::{BugFindingScheduler, TestingEngine};
use lockstep_testkit::program;
use std::sync::Arc;

/// The harness sends Tick, Tick, Ping, Done to a server that fails on Ping.
/// The ticks are noise.
fn ping_server() -> impl FnMut(Arc<BugFindingScheduler>) {
    program(|ctx| {
        let server = ctx.create("server", |ctx| loop {
            let message = ctx.receive()?;
            match message.name.as_str() {
                "Ping" => ctx.assert(false, "server received a ping")?,
                "Done" => return Ok(()),
                _ => {}
            }
        })?;
        ctx.send(server, "Tick", 1)?;
        ctx.send(server, "Tick", 2)?;
        ctx.send(server, "Ping", 3)?;
        ctx.send(server, "Done", 4)
    })
}

/// Like [`ping_server`], but the harness also starts a logger before it
/// sends anything.
fn ping_server_with_logger() -> impl FnMut(Arc<BugFindingScheduler>) {
    program(|ctx| {
        let server = ctx.create("server", |ctx| loop {
            let message = ctx.receive()?;
            match message.name.as_str() {
                "Ping" => ctx.assert(false, "server received a ping")?,
                "Done" => return Ok(()),
                _ => {}
            }
        })?;
        ctx.create("logger", |_| Ok(()))?;
        ctx.send(server, "Tick", 1)?;
        ctx.send(server, "Tick", 2)?;
        ctx.send(server, "Ping", 3)?;
        ctx.send(server, "Done", 4)
    })
}

/// The server's Progress monitor turns hot on Request and never cools.
fn stalled_server() -> impl FnMut(Arc<BugFindingScheduler>) {
    program(|ctx| {
        let server = ctx.create("server", |ctx| loop {
            let message = ctx.receive()?;
            match message.name.as_str() {
                "Request" => ctx.monitor("Progress", true),
                "Done" => return Ok(()),
                _ => {}
            }
        })?;
        ctx.send(server, "Tick", 1)?;
        ctx.send(server, "Tick", 2)?;
        ctx.send(server, "Request", 3)?;
        ctx.send(server, "Done", 4)
    })
}

/// Same program without the ping.
fn quiet_server() -> impl FnMut(Arc<BugFindingScheduler>) {
    program(|ctx| {
        let server = ctx.create("server", |ctx| loop {
            if ctx.receive()?.name == "Done" {
                return Ok(());
            }
        })?;
        ctx.send(server, "Tick", 1)?;
        ctx.send(server, "Done", 2)
    })
}

fn recorded_schedule(harness: &mut impl FnMut(Arc<BugFindingScheduler>), config: &Configuration) -> ScheduleTrace {
    let mut engine = TestingEngine::new(config.clone(), RandomStrategy::from_config(config));
    engine.run(harness).unwrap();
    engine.last_outcome().unwrap().schedule.clone()
}

fn minimize_ping(search: WithholdSearch) -> Minimized {
    let config = Configuration::default().with_seed(21);
    let mut harness = ping_server();
    let schedule = recorded_schedule(&mut harness, &config);

    let min_config = MinimizationConfig::default()
        .with_droppable(["Tick", "Ping"])
        .with_withhold_search(search);
    let strategy =
        MinimizationStrategy::from_schedule(schedule, TraceMetadata::from_config(&config, true), &config, min_config)
            .with_suffix(Box::new(RandomStrategy::new(5, 0)));
    minimize(&config, strategy, &mut harness).unwrap()
}

fn withheld_names(tree: &EventTree) -> Vec<&str> {
    tree.withheld()
        .iter()
        .filter_map(|&i| tree.get(i).and_then(|step| step.event_name()))
        .collect()
}

#[test]
fn linear_search_withholds_the_noise() {
    let minimized = minimize_ping(WithholdSearch::Linear);
    let report = &minimized.report;
    assert_eq!(
        report.edit_trials,
        vec![
            EditTrial { range: (1, 1), reproduced: true },
            EditTrial { range: (2, 2), reproduced: true },
            EditTrial { range: (3, 3), reproduced: false },
        ]
    );
    assert!(report.critical_transition.is_some());

    let tree = EventTree::from_mintrace(&minimized.mintrace).unwrap();
    assert_eq!(withheld_names(&tree), vec!["Tick", "Tick"]);
    assert!(tree.bug_found());
    let ping = tree.iter().find(|step| step.kind == StepKind::Send && step.event_name() == Some("Ping"));
    assert!(ping.is_some_and(|step| step.created_child.is_some()));
}

#[test]
fn bisect_retries_halves() {
    let minimized = minimize_ping(WithholdSearch::Bisect);
    assert_eq!(
        minimized.report.edit_trials,
        vec![
            EditTrial { range: (1, 3), reproduced: false },
            EditTrial { range: (1, 2), reproduced: true },
            EditTrial { range: (3, 3), reproduced: false },
        ]
    );
    assert_eq!(minimized.report.withheld_sends.len(), 2);
}

#[test]
fn minimized_trace_reproduces_on_its_own() {
    let minimized = minimize_ping(WithholdSearch::Linear);
    let config = Configuration::default();
    let min_config = MinimizationConfig {
        find_critical_transition: false,
        ..MinimizationConfig::default()
    };
    let strategy = MinimizationStrategy::from_dump(&minimized.mintrace, &config, min_config).unwrap();
    let again = minimize(&config, strategy, &mut ping_server()).unwrap();
    assert_eq!(again.report.iterations, 1);
    assert!(again.report.edit_trials.is_empty());
    assert_eq!(again.report.withheld_sends, minimized.report.withheld_sends);
}

#[test]
fn bug_free_schedule_is_not_reproducible() {
    let config = Configuration::default().with_seed(4);
    let mut harness = quiet_server();
    let schedule = recorded_schedule(&mut harness, &config);
    let strategy = MinimizationStrategy::from_schedule(
        schedule,
        TraceMetadata::from_config(&config, true),
        &config,
        MinimizationConfig::default(),
    );
    let err = minimize(&config, strategy, &mut harness).unwrap_err();
    assert!(matches!(err, MinimizeError::NotReproducible(_)));
}

#[test]
fn liveness_bug_keeps_its_monitor() {
    let config = Configuration::default().with_seed(8);
    let mut harness = stalled_server();
    let schedule = recorded_schedule(&mut harness, &config);

    let min_config = MinimizationConfig::default().with_droppable(["Tick", "Request"]);
    let strategy =
        MinimizationStrategy::from_schedule(schedule, TraceMetadata::from_config(&config, true), &config, min_config)
            .with_suffix(Box::new(RandomStrategy::new(2, 0)));
    let minimized = minimize(&config, strategy, &mut harness).unwrap();
    assert_eq!(
        minimized.report.edit_trials,
        vec![
            EditTrial { range: (1, 1), reproduced: true },
            EditTrial { range: (2, 2), reproduced: true },
            EditTrial { range: (3, 3), reproduced: false },
        ]
    );
    assert_eq!(minimized.mintrace.metadata.liveness_monitor.as_deref(), Some("Progress"));

    let tree = EventTree::from_mintrace(&minimized.mintrace).unwrap();
    assert_eq!(tree.liveness_monitor(), Some("Progress"));
    assert_eq!(withheld_names(&tree), vec!["Tick", "Tick"]);
    // The bug is blamed on the step that turned the monitor hot.
    let bug_step = tree.bug_step().and_then(|i| tree.get(i)).unwrap();
    assert_eq!(bug_step.kind, StepKind::Receive);
    assert_eq!(bug_step.event_name(), Some("Request"));
}

#[test]
fn declared_action_match_tolerates_an_extra_operation() {
    // Record the plain program's event tree without editing it.
    let config = Configuration::default().with_seed(21);
    let mut original = ping_server();
    let schedule = recorded_schedule(&mut original, &config);
    let record_only = MinimizationConfig {
        find_critical_transition: false,
        ..MinimizationConfig::default()
    };
    let strategy =
        MinimizationStrategy::from_schedule(schedule, TraceMetadata::from_config(&config, true), &config, record_only);
    let recorded = minimize(&config, strategy, &mut original).unwrap();

    // Replay it against a program whose harness creates a logger first.
    let min_config = MinimizationConfig::default().with_droppable(["Tick", "Ping"]);
    let strategy = MinimizationStrategy::from_dump(&recorded.mintrace, &config, min_config)
        .unwrap()
        .with_match_policy(Box::new(DeclaredActionMatch))
        .with_suffix(Box::new(RandomStrategy::new(5, 0)));
    let minimized = minimize(&config, strategy, &mut ping_server_with_logger()).unwrap();

    assert_eq!(minimized.report.withheld_sends.len(), 2);
    assert!(minimized.report.critical_transition.is_some());
    let tree = EventTree::from_mintrace(&minimized.mintrace).unwrap();
    assert_eq!(withheld_names(&tree), vec!["Tick", "Tick"]);
    assert!(tree
        .iter()
        .any(|step| step.kind == StepKind::Create && step.target == OperationId(2)));
    assert!(tree.bug_found());
}
