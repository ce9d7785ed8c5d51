use railcore::signal::{SignalAspect, SignalSpeedCode};

fn signal_with_free(free_sections: i32) -> SignalSpeedCode {
    let mut signal = SignalSpeedCode::new("S1", 500.0);
    signal.set_free_sections(free_sections);
    signal
}

#[test]
fn test_new_signal_shows_red() {
    let signal = SignalSpeedCode::new("S1", 500.0);
    assert_eq!(signal.aspect(), SignalAspect::Red);
    assert_eq!(signal.max_speed(), 0.0);
    assert!(!signal.emergency_brake());
    assert!(signal.is_powered());
    assert!(signal.has_comm_link());
}

#[test]
fn test_free_section_table() {
    let cases = [
        (-2, SignalAspect::Red, 0.0),
        (0, SignalAspect::Red, 0.0),
        (1, SignalAspect::Yellow, 20.0),
        (2, SignalAspect::YellowGreen, 50.0),
        (3, SignalAspect::Green, 80.0),
        (12, SignalAspect::Green, 80.0),
    ];

    for (free, aspect, max_speed) in cases {
        let signal = signal_with_free(free);
        assert_eq!(signal.aspect(), aspect, "free sections {}", free);
        assert_eq!(signal.max_speed(), max_speed, "free sections {}", free);
        assert_eq!(signal.suggested_speed(), max_speed);
    }
}

#[test]
fn test_legacy_codes() {
    assert_eq!(SignalAspect::Red.legacy_code(), 0);
    assert_eq!(SignalAspect::Yellow.legacy_code(), 1);
    assert_eq!(SignalAspect::Green.legacy_code(), 2);
    assert_eq!(SignalAspect::YellowGreen.legacy_code(), 3);

    assert_eq!(SignalAspect::from_legacy_code(3), Some(SignalAspect::YellowGreen));
    assert_eq!(SignalAspect::from_legacy_code(4), None);
}

#[test]
fn test_link_loss_forces_red_and_emergency() {
    let mut signal = signal_with_free(5);
    assert_eq!(signal.aspect(), SignalAspect::Green);

    signal.set_comm_link(false);
    assert_eq!(signal.aspect(), SignalAspect::Red);
    assert!(signal.emergency_brake());
    assert_eq!(signal.suggested_speed(), 0.0);

    signal.set_comm_link(true);
    assert_eq!(signal.aspect(), SignalAspect::Green);
    assert!(!signal.emergency_brake());
}

#[test]
fn test_power_loss_forces_red_and_emergency() {
    let mut signal = signal_with_free(2);
    signal.set_powered(false);
    assert_eq!(signal.aspect(), SignalAspect::Red);
    assert!(signal.emergency_brake());
}

#[test]
fn test_free_sections_ignored_while_link_lost() {
    let mut signal = signal_with_free(0);
    signal.set_comm_link(false);
    signal.set_free_sections(4);
    assert_eq!(signal.aspect(), SignalAspect::Red);
    assert_eq!(signal.free_sections(), 4);
}

#[test]
fn test_near_obstacle_brakes_without_changing_aspect() {
    let mut signal = signal_with_free(3);

    signal.set_obstacle_distance(60.0);
    assert!(signal.emergency_brake());
    assert_eq!(signal.aspect(), SignalAspect::Green);
    assert_eq!(signal.suggested_speed(), 0.0);

    signal.set_obstacle_distance(0.0);
    assert!(signal.emergency_brake());
    assert!(signal.obstacle_latched());

    signal.clear_obstacle_latch();
    assert!(!signal.emergency_brake());
    assert_eq!(signal.suggested_speed(), 80.0);
}

#[test]
fn test_obstacle_latch_survives_later_updates() {
    let mut signal = signal_with_free(3);
    signal.set_obstacle_distance(50.0);
    assert!(signal.emergency_brake());

    signal.set_obstacle_distance(500.0);
    signal.set_free_sections(4);
    signal.set_comm_link(false);
    signal.set_comm_link(true);
    assert!(signal.emergency_brake());
    assert_eq!(signal.suggested_speed(), 0.0);
    assert!(signal.sighting(200.0).emergency_brake);

    signal.clear_obstacle_latch();
    assert!(!signal.emergency_brake());
    assert!(!signal.obstacle_latched());
}

#[test]
fn test_clearing_latch_with_obstacle_still_near_relatches() {
    let mut signal = signal_with_free(3);
    signal.set_obstacle_distance(30.0);
    signal.take_dirty();

    signal.clear_obstacle_latch();
    assert!(signal.emergency_brake());
    assert!(signal.obstacle_latched());
}

#[test]
fn test_route_not_clear_shows_red() {
    let mut signal = signal_with_free(3);
    signal.set_route_clear(false);
    assert_eq!(signal.aspect(), SignalAspect::Red);
    assert!(!signal.emergency_brake());
}

#[test]
fn test_dirty_flag_tracks_changes() {
    let mut signal = SignalSpeedCode::new("S1", 0.0);
    assert!(!signal.take_dirty());

    signal.set_free_sections(2);
    assert!(signal.is_dirty());
    assert!(signal.take_dirty());
    assert!(!signal.take_dirty());

    signal.set_free_sections(2);
    assert!(!signal.is_dirty());

    signal.train_entered();
    assert!(signal.is_occupied());
    assert!(signal.take_dirty());
    signal.train_left();
    signal.train_left();
    assert_eq!(signal.occupancy(), 0);
}

#[test]
fn test_speed_limit_from_aspect() {
    let mut signal = signal_with_free(3);
    signal.set_line_max_speed(100.0);
    assert_eq!(signal.speed_limit_from_aspect(), 100.0);

    signal.set_free_sections(2);
    assert!((signal.speed_limit_from_aspect() - 70.0).abs() < 1e-4);

    signal.set_free_sections(1);
    assert!((signal.speed_limit_from_aspect() - 30.0).abs() < 1e-4);

    signal.set_free_sections(0);
    assert_eq!(signal.speed_limit_from_aspect(), 0.0);
}

#[test]
fn test_sighting_carries_state() {
    let mut signal = signal_with_free(1);
    signal.set_obstacle_distance(40.0);

    let sighting = signal.sighting(320.0);
    assert_eq!(sighting.signal_id, "S1");
    assert_eq!(sighting.aspect, SignalAspect::Yellow);
    assert!(sighting.emergency_brake);
    assert_eq!(sighting.distance_m, 320.0);
    assert_eq!(sighting.max_speed, 20.0);
}
