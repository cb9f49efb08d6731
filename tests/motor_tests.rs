//! Motor state machine tests through the interrupt wiring and mock hardware

use std::sync::Arc;

use rs_gate::config::GateConfig;
use rs_gate::hal::{MockHardware, MockParts};
use rs_gate::runtime::{motor_init, motor_start_task};
use rs_gate::{
    ActionQueue, ActionSource, ButtonOutcome, DequeueOutcome, GateMotor, InterruptLine,
    LimitSensor, MotorAction, MotorDirectionState, MotorDriver, OutputLine,
};

use MotorDirectionState::*;

fn setup() -> (Arc<GateMotor<MockHardware>>, MockParts) {
    let mock = MockParts::new();
    let motor = motor_init(mock.motor_parts()).unwrap();
    (motor, mock)
}

/// Run the consumer by hand until the queue is empty.
fn drain(motor: &GateMotor<MockHardware>, mock: &MockParts) -> Vec<DequeueOutcome> {
    let mut outcomes = Vec::new();
    while let Some(queued) = mock.queue.try_recv() {
        outcomes.push(motor.process(queued));
    }
    outcomes
}

/// Press the button and let the debounce interval pass.
fn press(mock: &MockParts) -> bool {
    let accepted = mock.button.trigger();
    mock.timer.fire();
    accepted
}

// ============================================================================
// Toggle Law
// ============================================================================

#[test]
fn first_press_opens() {
    let (motor, mock) = setup();
    assert_eq!(motor.current(), Stopped);
    assert_eq!(motor.direction().previous(), CounterClockwise);

    assert!(press(&mock));

    assert_eq!(motor.current(), Clockwise);
}

#[test]
fn press_after_opening_stop_closes() {
    let (motor, mock) = setup();
    press(&mock); // open
    press(&mock); // stop, previous = Clockwise
    assert_eq!(motor.current(), Stopped);
    assert_eq!(motor.direction().previous(), Clockwise);

    press(&mock);

    assert_eq!(motor.current(), CounterClockwise);
}

#[test]
fn full_button_cycle() {
    let (motor, mock) = setup();
    let mut seen = Vec::new();
    for _ in 0..4 {
        press(&mock);
        drain(&motor, &mock);
        seen.push(motor.current());
    }
    assert_eq!(seen, vec![Clockwise, Stopped, CounterClockwise, Stopped]);
}

// ============================================================================
// Stop Law
// ============================================================================

#[test]
fn press_while_clockwise_stops_regardless_of_previous() {
    for previous_action in [MotorAction::Stop, MotorAction::CounterClockwise] {
        let (motor, mock) = setup();
        motor.apply_action(previous_action);
        motor.apply_action(MotorAction::Clockwise);
        drain(&motor, &mock);

        press(&mock);

        assert_eq!(motor.current(), Stopped, "previous {:?}", previous_action);
    }
}

#[test]
fn press_while_counterclockwise_stops_regardless_of_previous() {
    for previous_action in [MotorAction::Stop, MotorAction::Clockwise] {
        let (motor, mock) = setup();
        motor.apply_action(previous_action);
        motor.apply_action(MotorAction::CounterClockwise);
        drain(&motor, &mock);

        press(&mock);

        assert_eq!(motor.current(), Stopped, "previous {:?}", previous_action);
    }
}

// ============================================================================
// Debounce
// ============================================================================

#[test]
fn bounce_is_ignored_until_timer_fires() {
    let (motor, mock) = setup();

    assert!(mock.button.trigger());
    assert!(!mock.button.trigger());
    assert!(!mock.button.trigger());

    assert_eq!(motor.current(), Clockwise);
    assert_eq!(mock.queue.len(), 1);
    assert!(mock.timer.is_armed());

    assert!(mock.timer.fire());
    assert!(mock.button.is_armed());
    assert!(mock.button.trigger());
    assert_eq!(motor.current(), Stopped);
}

#[test]
fn button_masked_and_timer_armed_before_push() {
    let (motor, mock) = setup();
    let outcome = motor.on_button();

    let ButtonOutcome::Queued(item) = outcome else {
        panic!("expected queued, got {:?}", outcome);
    };
    assert_eq!(item.source, ActionSource::Button);
    assert_eq!(item.action, MotorAction::Clockwise);
    assert!(!mock.button.is_armed());
    assert_eq!(mock.timer.arm_count(), 1);
}

// ============================================================================
// Safety Precedence
// ============================================================================

#[test]
fn open_limit_stops_clockwise() {
    let (motor, mock) = setup();
    press(&mock);
    drain(&motor, &mock);
    assert!(mock.open_sensor.is_armed());

    mock.open_sensor.set_asserted(true);
    assert!(mock.open_sensor.trigger());

    assert_eq!(motor.current(), Stopped);
    assert!(!mock.open_sensor.is_armed());
    assert!(!mock.close_sensor.is_armed());
    assert!(mock.led_stopped.is_set());
    assert!(!mock.led_opening.is_set());
    assert!(!mock.led_closing.is_set());
    assert_eq!(mock.driver.current(), MotorAction::Stop);
    assert_eq!(motor.last_limit(), Some(LimitSensor::Open));
}

#[test]
fn close_limit_stops_counterclockwise() {
    let (motor, mock) = setup();
    motor.apply_action(MotorAction::CounterClockwise);
    drain(&motor, &mock);
    assert!(mock.close_sensor.is_armed());

    assert!(mock.close_sensor.trigger());

    assert_eq!(motor.current(), Stopped);
    assert!(!mock.close_sensor.is_armed());
    assert_eq!(motor.last_limit(), Some(LimitSensor::Close));
}

#[test]
fn limit_wins_over_pending_button_action() {
    let (motor, mock) = setup();
    mock.button.trigger(); // Clockwise queued, not yet processed

    motor.on_limit(LimitSensor::Close);
    assert_eq!(motor.current(), Stopped);

    let outcomes = drain(&motor, &mock);
    assert_eq!(
        outcomes,
        vec![DequeueOutcome::Superseded {
            queued: MotorAction::Clockwise,
            applied: MotorAction::Stop,
        }]
    );
    assert!(!mock.open_sensor.is_armed());
    assert!(!mock.close_sensor.is_armed());
    assert!(mock.led_stopped.is_set());
    assert_eq!(mock.driver.current(), MotorAction::Stop);
}

#[test]
fn limit_from_every_direction_yields_stopped() {
    for action in [
        MotorAction::Stop,
        MotorAction::Clockwise,
        MotorAction::CounterClockwise,
    ] {
        let (motor, mock) = setup();
        motor.apply_action(action);
        drain(&motor, &mock);

        motor.on_limit(LimitSensor::Open);

        assert_eq!(motor.current(), Stopped);
        assert!(!mock.open_sensor.is_armed());
        assert!(!mock.close_sensor.is_armed());
    }
}

#[test]
fn limit_does_not_enqueue() {
    let (motor, mock) = setup();
    motor.apply_action(MotorAction::Clockwise);
    drain(&motor, &mock);

    mock.open_sensor.trigger();

    assert!(mock.queue.is_empty());
}

#[test]
fn press_after_limit_reverses() {
    let (motor, mock) = setup();
    press(&mock);
    drain(&motor, &mock);
    mock.open_sensor.trigger();

    press(&mock);
    drain(&motor, &mock);

    assert_eq!(motor.current(), CounterClockwise);
    assert!(mock.close_sensor.is_armed());
    assert_eq!(motor.last_limit(), None);
}

// ============================================================================
// Exclusive Arming Invariant
// ============================================================================

#[test]
fn arming_matches_direction_after_every_step() {
    let (motor, mock) = setup();
    assert!(mock.arming_consistent());

    // Deterministic mix of every stimulus
    let mut seed: u32 = 0x2545_f491;
    for step in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        match seed % 6 {
            0 | 1 => {
                press(&mock);
            }
            2 => {
                mock.open_sensor.trigger();
            }
            3 => {
                mock.close_sensor.trigger();
            }
            4 => {
                motor.apply_action(MotorAction::Clockwise);
            }
            _ => {
                motor.apply_action(MotorAction::CounterClockwise);
            }
        }
        drain(&motor, &mock);

        let armed = mock.open_sensor.is_armed() || mock.close_sensor.is_armed();
        assert!(mock.arming_consistent(), "step {}", step);
        assert_eq!(armed, motor.current() != Stopped, "step {}", step);
        assert_eq!(
            mock.open_sensor.is_armed(),
            motor.current() == Clockwise,
            "step {}",
            step
        );
    }
}

// ============================================================================
// Bounded Queue
// ============================================================================

#[test]
fn eleven_presses_keep_ten_in_order() {
    let (motor, mock) = setup();

    let outcomes: Vec<_> = (0..11).map(|_| motor.on_button()).collect();

    assert!(outcomes[..10]
        .iter()
        .all(|o| matches!(o, ButtonOutcome::Queued(_))));
    assert!(matches!(outcomes[10], ButtonOutcome::Dropped(_)));
    assert_eq!(motor.dropped_actions(), 1);

    let pending = mock.queue.pending();
    assert_eq!(pending.len(), 10);
    let actions: Vec<_> = pending.iter().map(|q| q.action).collect();
    assert_eq!(
        actions,
        vec![
            MotorAction::Clockwise,
            MotorAction::Stop,
            MotorAction::CounterClockwise,
            MotorAction::Stop,
            MotorAction::Clockwise,
            MotorAction::Stop,
            MotorAction::CounterClockwise,
            MotorAction::Stop,
            MotorAction::Clockwise,
            MotorAction::Stop,
        ]
    );
    let generations: Vec<_> = pending.iter().map(|q| q.generation).collect();
    assert_eq!(generations, (1..=10).collect::<Vec<_>>());
}

#[test]
fn dropped_press_still_reaches_outputs() {
    let (motor, mock) = setup();
    for _ in 0..11 {
        motor.on_button();
    }
    assert_eq!(motor.current(), CounterClockwise);

    let outcomes = drain(&motor, &mock);

    assert_eq!(outcomes.len(), 10);
    assert!(outcomes
        .iter()
        .all(|o| o.applied() == MotorAction::CounterClockwise));
    assert!(mock.led_closing.is_set());
    assert!(mock.close_sensor.is_armed());
    assert_eq!(mock.driver.current(), MotorAction::CounterClockwise);
    assert!(mock.arming_consistent());
}

// ============================================================================
// Scenario C
// ============================================================================

#[test]
fn button_from_stopped_opens_through_consumer() {
    let (motor, mock) = setup();

    mock.button.trigger();

    let queued = mock.queue.pending();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].action, MotorAction::Clockwise);
    // Nothing changes on the outputs until the consumer runs
    assert!(!mock.open_sensor.is_armed());
    assert!(mock.led_stopped.is_set());

    let outcomes = drain(&motor, &mock);

    assert_eq!(outcomes, vec![DequeueOutcome::Applied(MotorAction::Clockwise)]);
    assert!(mock.open_sensor.is_armed());
    assert!(!mock.close_sensor.is_armed());
    assert!(mock.led_opening.is_set());
    assert!(!mock.led_stopped.is_set());
    assert_eq!(mock.driver.current(), MotorAction::Clockwise);
}

// ============================================================================
// Consumer Task
// ============================================================================

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    false
}

#[test]
fn consumer_thread_applies_button_press() {
    let (motor, mock) = setup();
    let config = GateConfig::default().with_consumer_stack_size(64 * 1024);
    let consumer = motor_start_task(Arc::clone(&motor), &config).unwrap();

    mock.button.trigger();
    assert!(wait_for(|| mock.open_sensor.is_armed()));
    assert!(mock.led_opening.is_set());

    mock.open_sensor.trigger();
    assert_eq!(motor.current(), Stopped);

    mock.queue.close();
    assert_eq!(consumer.join().unwrap(), 1);
    assert!(mock.arming_consistent());
}

#[test]
fn consumer_thread_applies_remote_action() {
    let (motor, mock) = setup();
    let config = GateConfig::default().with_consumer_stack_size(64 * 1024);
    let consumer = motor_start_task(Arc::clone(&motor), &config).unwrap();

    motor.apply_action(MotorAction::CounterClockwise);
    assert_eq!(mock.driver.current(), MotorAction::CounterClockwise);
    assert!(wait_for(|| mock.close_sensor.is_armed()));
    assert!(mock.led_closing.is_set());

    mock.queue.close();
    assert_eq!(consumer.join().unwrap(), 1);
}
