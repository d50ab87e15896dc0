// Integration tests for the condition and alarm state machines.

use parking_lot::Mutex;
use sentra::{
    AddressSpace, AlarmOptions, AlarmVariant, AuditAction, Condition, ConditionEvent,
    ConditionField, ConditionOptions, ConditionRegistry, ConditionSetConfig, EventData, Limits,
    NodeId, ShelvingState, StatusCode, TwoState, Variant, VariantKind, MAX_SHELVE_MS,
    MIN_SHELVE_MS,
};
use std::sync::Arc;

fn setup() -> (Arc<AddressSpace>, Arc<ConditionRegistry>, NodeId, NodeId) {
    let space = AddressSpace::new();
    let registry = ConditionRegistry::new(space.clone());
    let tank = NodeId::string(1, "Tank");
    let level = NodeId::string(1, "Tank.Level");
    space.add_object(tank.clone(), "Tank").unwrap();
    space
        .add_variable(level.clone(), "Level", VariantKind::Float, Variant::Float(50.0))
        .unwrap();
    space.register_event_source(&space.server_id(), &tank).unwrap();
    (space, registry, tank, level)
}

fn collect_events(target: &sentra::Alarm) -> Arc<Mutex<Vec<ConditionEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    target.on_event(move |event| sink.lock().push(event.clone()));
    log
}

fn branch_id_of(payload: &EventData) -> Option<NodeId> {
    match &payload.get("BranchId")?.value {
        Variant::NodeId(id) => Some(id.clone()),
        _ => None,
    }
}

/// Raised payloads for branch 0 only
fn branch0_raised(events: &[ConditionEvent]) -> Vec<Arc<EventData>> {
    events
        .iter()
        .filter_map(|event| match event {
            ConditionEvent::Raised(payload) => {
                branch_id_of(payload).filter(NodeId::is_null).map(|_| payload.clone())
            }
            _ => None,
        })
        .collect()
}

fn message_of(payload: &EventData) -> String {
    match &payload.get("Message").unwrap().value {
        Variant::LocalizedText(text) => text.text.clone(),
        other => panic!("unexpected message variant {:?}", other),
    }
}

fn bool_field(payload: &EventData, path: &str) -> bool {
    payload.get(path).unwrap().value.as_bool().unwrap()
}

#[test]
fn scenario_a_non_exclusive_high_alarm_two_events() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    assert!(alarm.active());
    space.set_value_from_source(&level, Variant::Float(50.0)).unwrap();
    assert!(!alarm.active());

    let events = log.lock();
    let raised = branch0_raised(&events);
    assert_eq!(raised.len(), 2, "exactly two current-branch events");

    assert!(bool_field(&raised[0], "ActiveState.Id"));
    assert!(bool_field(&raised[0], "HighState.Id"));

    assert!(!bool_field(&raised[1], "ActiveState.Id"));
    assert!(!bool_field(&raised[1], "HighState.Id"));
    assert_eq!(message_of(&raised[1]), "Back to normal");
}

#[test]
fn repeated_values_do_not_raise_duplicate_events() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    for value in [90.0, 91.0, 95.0] {
        space.set_value_from_source(&level, Variant::Float(value)).unwrap();
    }
    assert_eq!(branch0_raised(&log.lock()).len(), 1);
}

#[test]
fn p1_branch0_values_mirror_into_the_address_space() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();

    let active_id = NodeId::string(1, "LevelHigh.ActiveState.Id");
    assert_eq!(
        space.read_value(&active_id).unwrap().value,
        Variant::Bool(true)
    );
    let severity = NodeId::string(1, "LevelHigh.Severity");
    assert_eq!(space.read_value(&severity).unwrap().value, Variant::Int(150));
    let retain = NodeId::string(1, "LevelHigh.Retain");
    assert_eq!(space.read_value(&retain).unwrap().value, Variant::Bool(true));
    assert_eq!(
        alarm.read_field(ConditionField::Severity).value,
        Variant::Int(150)
    );
}

#[test]
fn p2_disabled_condition_masks_everything_outside_the_allow_list() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    assert_eq!(alarm.disable(), StatusCode::Good);

    assert_eq!(
        alarm.read_field(ConditionField::Message).status,
        StatusCode::BadConditionDisabled
    );
    assert_eq!(
        alarm.read_field(ConditionField::Severity).status,
        StatusCode::BadConditionDisabled
    );
    assert!(alarm.read_field(ConditionField::EventId).status.is_good());
    assert!(alarm.read_field(ConditionField::SourceName).status.is_good());

    // The disable event itself is masked the same way.
    let events = log.lock();
    let last = branch0_raised(&events).last().unwrap().clone();
    assert_eq!(
        last.get("Severity").unwrap().status,
        StatusCode::BadConditionDisabled
    );
    assert_eq!(
        last.get("ActiveState.Id").unwrap().status,
        StatusCode::BadConditionDisabled
    );
    assert!(last.get("EventId").unwrap().status.is_good());
    assert_eq!(
        last.get("EnabledState.Id").unwrap().value,
        Variant::Bool(false)
    );
}

#[test]
fn p3_going_inactive_preserves_the_unacked_state_as_a_branch() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    space.set_value_from_source(&level, Variant::Float(50.0)).unwrap();

    assert_eq!(alarm.branch_count(), 1, "exactly one branch spawned");
    assert_eq!(alarm.state_id(TwoState::Active), Some(false));
    assert_eq!(alarm.state_id(TwoState::Acked), Some(true));
    // Branches keep the alarm retained until they are addressed.
    assert!(alarm.retain());

    let events = log.lock();
    let branch_events: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ConditionEvent::Raised(payload) => {
                branch_id_of(payload).filter(|id| !id.is_null()).map(|_| payload.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(branch_events.len(), 1);
    // The branch carries the prior active, unacknowledged state.
    assert!(bool_field(&branch_events[0], "ActiveState.Id"));
    assert!(!bool_field(&branch_events[0], "AckedState.Id"));
    assert!(bool_field(&branch_events[0], "Retain"));
}

#[test]
fn p4_acknowledge_is_rejected_the_second_time_without_an_audit_event() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(alarm.acknowledge(&event_id, "seen", "operator"), StatusCode::Good);
    assert_eq!(alarm.state_id(TwoState::Acked), Some(true));
    // The alarm is still active, so it stays retained.
    assert!(alarm.retain());

    let renewed = alarm.current_event_id().unwrap();
    assert_eq!(
        alarm.acknowledge(&renewed, "again", "operator"),
        StatusCode::BadConditionBranchAlreadyAcked
    );
    // A stale event id is a different failure.
    assert_eq!(
        alarm.acknowledge(&event_id, "stale", "operator"),
        StatusCode::BadEventIdUnknown
    );

    let events = log.lock();
    let ack_audits = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                ConditionEvent::Audit(audit) if audit.action == AuditAction::Acknowledge
            )
        })
        .count();
    assert_eq!(ack_audits, 1, "no audit event for the rejected call");
}

#[tokio::test]
async fn scenario_b_timed_shelve_bounds() {
    let (_space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .max_time_shelved(10_000)
    .instantiate(&registry)
    .unwrap();

    assert_eq!(alarm.timed_shelve(5_000.0), StatusCode::Good);
    assert_eq!(alarm.shelving_state(), ShelvingState::TimedShelved);

    assert_eq!(
        alarm.timed_shelve(20_000.0),
        StatusCode::BadShelvingTimeOutOfRange
    );
    assert_eq!(alarm.shelving_state(), ShelvingState::TimedShelved);

    // P5: a valid re-shelve is rejected before any timer manipulation.
    assert_eq!(alarm.timed_shelve(5_000.0), StatusCode::BadConditionAlreadyShelved);
    assert_eq!(alarm.shelving_state(), ShelvingState::TimedShelved);

    let remaining = alarm.unshelve_time();
    assert!(remaining.status.is_good());
    assert!(remaining.value.as_f64().unwrap() <= 5_000.0);

    assert_eq!(alarm.unshelve(), StatusCode::Good);
    assert_eq!(alarm.shelving_state(), ShelvingState::Unshelved);
    assert_eq!(alarm.unshelve(), StatusCode::BadConditionNotShelved);
    assert_eq!(
        alarm.unshelve_time().status,
        StatusCode::BadConditionNotShelved
    );
}

#[tokio::test]
async fn timed_shelve_auto_unshelves_when_the_timer_fires() {
    let (_space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    assert_eq!(alarm.timed_shelve(50.0), StatusCode::Good);
    assert_eq!(alarm.shelving_state(), ShelvingState::TimedShelved);

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(alarm.shelving_state(), ShelvingState::Unshelved);
}

#[tokio::test]
async fn manual_unshelve_cancels_the_pending_timer() {
    let (_space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    assert_eq!(alarm.timed_shelve(50.0), StatusCode::Good);
    assert_eq!(alarm.unshelve(), StatusCode::Good);
    // Re-shelve with a long duration; the old timer must not fire into it.
    assert_eq!(alarm.timed_shelve(60_000.0), StatusCode::Good);
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(alarm.shelving_state(), ShelvingState::TimedShelved);
}

#[tokio::test]
async fn one_shot_shelve_uses_max_time_shelved() {
    let (_space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .max_time_shelved(50)
    .instantiate(&registry)
    .unwrap();

    assert_eq!(alarm.one_shot_shelve(), StatusCode::Good);
    assert_eq!(alarm.shelving_state(), ShelvingState::OneShotShelved);
    assert_eq!(alarm.one_shot_shelve(), StatusCode::BadConditionAlreadyShelved);

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(alarm.shelving_state(), ShelvingState::Unshelved);
}

#[test]
fn p6_exclusive_priority_resolves_high_high_over_high() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelExclusive",
        tank,
        level.clone(),
        AlarmVariant::ExclusiveLimit(Limits {
            high_high: Some(100.0),
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(150.0)).unwrap();
    assert!(alarm.active());
    let state = alarm.read_field(ConditionField::LimitStateCurrent);
    match state.value {
        Variant::LocalizedText(text) => assert_eq!(text.text, "HighHigh"),
        other => panic!("unexpected limit state {:?}", other),
    }

    // Dropping between the thresholds transitions to High.
    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let state = alarm.read_field(ConditionField::LimitStateCurrent);
    match state.value {
        Variant::LocalizedText(text) => assert_eq!(text.text, "High"),
        other => panic!("unexpected limit state {:?}", other),
    }
    assert!(alarm.active());
}

#[test]
fn scenario_c_disable_forces_retain_off_and_enable_restores_it() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    assert!(alarm.retain());

    assert_eq!(alarm.disable(), StatusCode::Good);
    assert!(!alarm.retain());
    assert!(!alarm.enabled());
    assert_eq!(alarm.disable(), StatusCode::BadConditionAlreadyDisabled);

    // Input changes while disabled are ignored.
    let before = branch0_raised(&log.lock()).len();
    space.set_value_from_source(&level, Variant::Float(95.0)).unwrap();
    assert_eq!(branch0_raised(&log.lock()).len(), before);

    assert_eq!(alarm.enable(), StatusCode::Good);
    assert!(alarm.enabled());
    assert!(alarm.retain(), "pre-disable retain restored");
    assert_eq!(alarm.enable(), StatusCode::BadConditionAlreadyEnabled);
    assert!(
        branch0_raised(&log.lock()).len() > before,
        "retained state resent on enable"
    );
}

#[test]
fn scenario_d_acknowledge_then_confirm_in_order() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .with_confirmed_state()
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(alarm.acknowledge(&event_id, "seen", "operator"), StatusCode::Good);
    assert_eq!(alarm.state_id(TwoState::Acked), Some(true));
    assert_eq!(alarm.state_id(TwoState::Confirmed), Some(false));
    // Awaiting confirmation keeps the condition retained.
    assert!(alarm.retain());

    // Returning to normal forks the acked-but-unconfirmed state into a
    // branch carrying the event id the client saw after the acknowledge.
    let acked_id = alarm.current_event_id().unwrap();
    space.set_value_from_source(&level, Variant::Float(50.0)).unwrap();
    assert_eq!(alarm.branch_count(), 1);

    assert_eq!(alarm.confirm(&acked_id, "done", "operator"), StatusCode::Good);
    assert_eq!(alarm.branch_count(), 0, "confirmed branch deleted");
    assert!(!alarm.retain());

    let events = log.lock();
    let ack_pos = events
        .iter()
        .position(|e| matches!(e, ConditionEvent::Acknowledged { .. }))
        .expect("acknowledged event");
    let confirm_pos = events
        .iter()
        .position(|e| matches!(e, ConditionEvent::Confirmed { .. }))
        .expect("confirmed event");
    assert!(ack_pos < confirm_pos);

    // The confirm's branch event shows ConfirmedState=true, Retain=false.
    let last_branch = events
        .iter()
        .filter_map(|event| match event {
            ConditionEvent::Raised(payload) => {
                branch_id_of(payload).filter(|id| !id.is_null()).map(|_| payload.clone())
            }
            _ => None,
        })
        .last()
        .unwrap();
    assert!(bool_field(&last_branch, "ConfirmedState.Id"));
    assert!(!bool_field(&last_branch, "Retain"));
    assert!(events
        .iter()
        .any(|e| matches!(e, ConditionEvent::BranchDeleted { .. })));
}

#[test]
fn confirm_is_rejected_when_already_confirmed() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .with_confirmed_state()
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(alarm.acknowledge(&event_id, "", "op"), StatusCode::Good);
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(alarm.confirm(&event_id, "", "op"), StatusCode::Good);
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(
        alarm.confirm(&event_id, "", "op"),
        StatusCode::BadConditionBranchAlreadyConfirmed
    );
}

#[test]
fn add_comment_records_comment_and_user() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    let log = collect_events(&alarm);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    assert_eq!(
        alarm.add_comment(b"not-an-event-id", "lost", "operator"),
        StatusCode::BadEventIdUnknown
    );
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(
        alarm.add_comment(&event_id, "checking the pump", "operator"),
        StatusCode::Good
    );

    match alarm.read_field(ConditionField::Comment).value {
        Variant::LocalizedText(text) => assert_eq!(text.text, "checking the pump"),
        other => panic!("unexpected comment {:?}", other),
    }
    assert_eq!(
        alarm.read_field(ConditionField::ClientUserId).value,
        Variant::String("operator".to_string())
    );
    assert!(log
        .lock()
        .iter()
        .any(|e| matches!(e, ConditionEvent::CommentAdded { .. })));
}

#[test]
fn operations_on_a_disabled_condition_are_rejected() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(alarm.disable(), StatusCode::Good);

    assert_eq!(
        alarm.acknowledge(&event_id, "", "op"),
        StatusCode::BadConditionDisabled
    );
    assert_eq!(
        alarm.add_comment(&event_id, "", "op"),
        StatusCode::BadConditionDisabled
    );
}

#[test]
fn off_normal_alarm_follows_input_and_normal_state() {
    let (space, registry, tank, _level) = setup();
    let state = NodeId::string(1, "Pump.State");
    let normal = NodeId::string(1, "Pump.NormalState");
    space
        .add_variable(state.clone(), "State", VariantKind::Int, Variant::Int(1))
        .unwrap();
    space
        .add_variable(normal.clone(), "NormalState", VariantKind::Int, Variant::Int(1))
        .unwrap();

    let alarm = AlarmOptions::new(
        "PumpOffNormal",
        tank,
        state.clone(),
        AlarmVariant::OffNormal {
            normal_state: normal.clone(),
        },
    )
    .instantiate(&registry)
    .unwrap();

    assert!(!alarm.active());
    space.set_value_from_source(&state, Variant::Int(2)).unwrap();
    assert!(alarm.active());
    space.set_value_from_source(&state, Variant::Int(1)).unwrap();
    assert!(!alarm.active());

    // Moving the goalposts re-evaluates against the live input.
    space.set_value_from_source(&normal, Variant::Int(3)).unwrap();
    assert!(alarm.active());
}

#[test]
fn deviation_alarm_tracks_the_setpoint() {
    let (space, registry, tank, level) = setup();
    let setpoint = NodeId::string(1, "Tank.Setpoint");
    space
        .add_variable(setpoint.clone(), "Setpoint", VariantKind::Float, Variant::Float(50.0))
        .unwrap();

    let alarm = AlarmOptions::new(
        "LevelDrift",
        tank,
        level.clone(),
        AlarmVariant::ExclusiveDeviation {
            limits: Limits {
                high: Some(5.0),
                ..Limits::default()
            },
            setpoint_node: setpoint.clone(),
        },
    )
    .instantiate(&registry)
    .unwrap();

    // Deviation 0 at instantiation.
    assert!(!alarm.active());
    space.set_value_from_source(&level, Variant::Float(60.0)).unwrap();
    assert!(alarm.active(), "deviation of 10 exceeds the limit");

    // Raising the setpoint shrinks the deviation below the limit.
    space.set_value_from_source(&setpoint, Variant::Float(58.0)).unwrap();
    assert!(!alarm.active());
}

#[test]
fn condition_refresh_replays_retained_events() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let before_refresh = alarm.current_event_id().unwrap();

    let server_events = Arc::new(Mutex::new(Vec::new()));
    let sink = server_events.clone();
    space.subscribe_node_events(&space.server_id(), move |event| sink.lock().push(event.clone()));

    assert_eq!(registry.condition_refresh(), StatusCode::Good);
    // Refresh again once finished is fine, in either flavor.
    assert_eq!(registry.condition_refresh(), StatusCode::Good);
    assert_eq!(registry.condition_refresh2(), StatusCode::Good);

    let events = server_events.lock();
    assert!(events
        .iter()
        .any(|e| matches!(e, ConditionEvent::RefreshStarted)));
    assert!(events
        .iter()
        .any(|e| matches!(e, ConditionEvent::RefreshEnded)));
    let replayed = branch0_raised(&events);
    assert!(!replayed.is_empty());
    // Replayed verbatim: the event id did not change.
    assert_eq!(alarm.current_event_id().unwrap(), before_refresh);
}

#[tokio::test]
async fn methods_are_callable_through_the_address_space() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .max_time_shelved(10_000)
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let event_id = alarm.current_event_id().unwrap();

    let ack = NodeId::string(1, "LevelHigh.Acknowledge");
    assert_eq!(
        space.call_method(
            &ack,
            &[Variant::ByteString(event_id), Variant::from("from a client")],
        ),
        StatusCode::Good
    );
    assert_eq!(alarm.state_id(TwoState::Acked), Some(true));

    let shelve = NodeId::string(1, "LevelHigh.TimedShelve");
    assert_eq!(
        space.call_method(&shelve, &[Variant::Float(5_000.0)]),
        StatusCode::Good
    );
    assert_eq!(alarm.shelving_state(), ShelvingState::TimedShelved);
    assert_eq!(
        space.call_method(&shelve, &[]),
        StatusCode::BadTypeMismatch
    );
    assert_eq!(
        space.call_method(&NodeId::string(1, "LevelHigh.NoSuchMethod"), &[]),
        StatusCode::BadMethodInvalid
    );
}

#[test]
fn instantiation_validates_source_and_limits() {
    let (space, registry, _tank, level) = setup();

    // Source not registered in the notifier hierarchy.
    let lonely = NodeId::string(1, "Lonely");
    space.add_object(lonely.clone(), "Lonely").unwrap();
    let err = AlarmOptions::new(
        "Broken",
        lonely,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap_err();
    assert!(err.to_string().contains("event source"));

    // Limit alarms need at least one limit.
    let tank = NodeId::string(1, "Tank");
    let err = AlarmOptions::new(
        "NoLimits",
        tank.clone(),
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits::default()),
    )
    .instantiate(&registry)
    .unwrap_err();
    assert!(err.to_string().contains("at least one limit"));

    // Non-numeric input is rejected for limit alarms.
    let text_input = NodeId::string(1, "Tank.Label");
    space
        .add_variable(text_input.clone(), "Label", VariantKind::String, Variant::from("x"))
        .unwrap();
    let err = AlarmOptions::new(
        "TextInput",
        tank,
        text_input,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(1.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap_err();
    assert!(err.to_string().contains("not numeric"));
}

#[test]
fn max_time_shelved_must_be_a_valid_shelving_duration() {
    let (_space, registry, tank, level) = setup();
    let high = || {
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        })
    };

    // Below the floor every shelving request is held to.
    let err = AlarmOptions::new("TooShort", tank.clone(), level.clone(), high())
        .max_time_shelved(MIN_SHELVE_MS - 1)
        .instantiate(&registry)
        .unwrap_err();
    assert!(err.to_string().contains("MaxTimeShelved"));

    // Above the indefinite sentinel.
    let err = AlarmOptions::new("TooLong", tank.clone(), level.clone(), high())
        .max_time_shelved(MAX_SHELVE_MS + 1)
        .instantiate(&registry)
        .unwrap_err();
    assert!(err.to_string().contains("MaxTimeShelved"));

    // The bounds themselves are accepted.
    AlarmOptions::new("Floor", tank.clone(), level.clone(), high())
        .max_time_shelved(MIN_SHELVE_MS)
        .instantiate(&registry)
        .unwrap();
    AlarmOptions::new("Ceiling", tank, level, high())
        .max_time_shelved(MAX_SHELVE_MS)
        .instantiate(&registry)
        .unwrap();
}

#[tokio::test]
async fn suppression_drives_the_suppressed_or_shelved_flag() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .with_suppressed_state()
    .with_shelving_state()
    .instantiate(&registry)
    .unwrap();

    let flag = NodeId::string(1, "LevelHigh.SuppressedOrShelved");
    assert_eq!(space.read_value(&flag).unwrap().value, Variant::Bool(false));

    assert_eq!(alarm.set_suppressed(true), StatusCode::Good);
    assert_eq!(alarm.state_id(TwoState::Suppressed), Some(true));
    assert_eq!(space.read_value(&flag).unwrap().value, Variant::Bool(true));
    // Setting the same value again is a quiet no-op.
    assert_eq!(alarm.set_suppressed(true), StatusCode::Good);

    assert_eq!(alarm.set_suppressed(false), StatusCode::Good);
    assert_eq!(space.read_value(&flag).unwrap().value, Variant::Bool(false));

    // Shelving alone raises the derived flag too.
    assert_eq!(alarm.timed_shelve(60_000.0), StatusCode::Good);
    assert_eq!(space.read_value(&flag).unwrap().value, Variant::Bool(true));

    // Suppressed while shelved: unshelving keeps the flag up until the
    // suppression is also lifted.
    assert_eq!(alarm.set_suppressed(true), StatusCode::Good);
    assert_eq!(alarm.unshelve(), StatusCode::Good);
    assert_eq!(space.read_value(&flag).unwrap().value, Variant::Bool(true));
    assert_eq!(alarm.set_suppressed(false), StatusCode::Good);
    assert_eq!(space.read_value(&flag).unwrap().value, Variant::Bool(false));
}

#[test]
fn set_suppressed_requires_the_optional_state() {
    let (_space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();
    assert_eq!(alarm.set_suppressed(true), StatusCode::BadMethodInvalid);
}

#[test]
fn condition_class_defaults_to_the_base_class() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level,
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    assert_eq!(
        alarm.read_field(ConditionField::ConditionClassId).value,
        Variant::NodeId(NodeId::numeric(0, 11163))
    );
    match alarm.read_field(ConditionField::ConditionClassName).value {
        Variant::LocalizedText(text) => assert_eq!(text.text, "BaseConditionClass"),
        other => panic!("unexpected class name variant {:?}", other),
    }
    // Mirrored into the live variable as well.
    let node = NodeId::string(1, "LevelHigh.ConditionClassName");
    assert!(space.read_value(&node).unwrap().value != Variant::Null);
}

#[test]
fn disposed_alarm_ignores_input_changes() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .instantiate(&registry)
    .unwrap();

    alarm.dispose();
    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    assert!(!alarm.active());
    // Dispose is idempotent.
    alarm.dispose();
}

#[test]
fn plain_condition_enable_disable_and_comment() {
    let (_space, registry, tank, _level) = setup();
    let condition: Condition = ConditionOptions::new("DoorOpen", tank)
        .instantiate(&registry)
        .unwrap();

    assert!(condition.enabled());
    assert_eq!(condition.disable(), StatusCode::Good);
    assert_eq!(condition.enable(), StatusCode::Good);

    let event_id = condition.current_event_id().unwrap();
    assert_eq!(
        condition.add_comment(&event_id, "noted", "operator"),
        StatusCode::Good
    );
    match condition.read_field(ConditionField::Comment).value {
        Variant::LocalizedText(text) => assert_eq!(text.text, "noted"),
        other => panic!("unexpected comment {:?}", other),
    }
}

#[test]
fn non_acknowledgeable_condition_rejects_acknowledge() {
    let (_space, registry, tank, _level) = setup();
    let condition = ConditionOptions::new("Watchdog", tank)
        .not_acknowledgeable()
        .instantiate(&registry)
        .unwrap();
    let event_id = condition.current_event_id().unwrap();
    assert_eq!(
        condition.acknowledge(&event_id, "", "op"),
        StatusCode::BadMethodInvalid
    );
}

#[test]
fn yaml_config_instantiates_working_alarms() {
    let (space, registry, _tank, level) = setup();
    let yaml = r#"
alarms:
  - name: ConfiguredHigh
    source: "ns=1;s=Tank"
    input: "ns=1;s=Tank.Level"
    kind: non_exclusive_limit
    high_limit: 80.0
    confirmed_state: true
"#;
    let config = ConditionSetConfig::from_yaml(yaml).unwrap();
    let alarms = config.instantiate_all(&registry).unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(registry.len(), 1);

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    assert!(alarms[0].active());
    assert_eq!(alarms[0].state_id(TwoState::Confirmed), Some(false));
}

#[test]
fn auto_confirm_settles_the_branch_in_one_call() {
    let (space, registry, tank, level) = setup();
    let alarm = AlarmOptions::new(
        "LevelHigh",
        tank,
        level.clone(),
        AlarmVariant::NonExclusiveLimit(Limits {
            high: Some(80.0),
            ..Limits::default()
        }),
    )
    .with_confirmed_state()
    .instantiate(&registry)
    .unwrap();

    space.set_value_from_source(&level, Variant::Float(90.0)).unwrap();
    let event_id = alarm.current_event_id().unwrap();
    assert_eq!(
        alarm.acknowledge_and_auto_confirm(&event_id, "handled", "supervisor"),
        StatusCode::Good
    );
    assert_eq!(alarm.state_id(TwoState::Acked), Some(true));
    assert_eq!(alarm.state_id(TwoState::Confirmed), Some(true));
}
