use railcore::car::TrainCar;
use railcore::consist::TrainConsist;
use railcore::interfaces::SignalLookup;
use railcore::notice::{NoticeChannel, NoticeLevel};
use railcore::physics::CarClass;
use railcore::safety::{SafetyLevel, SafetySupervisor};
use railcore::signal::SignalSpeedCode;

fn consist() -> TrainConsist {
    let mut consist = TrainConsist::new("T1", "L1");
    consist.add_car(TrainCar::new("head", CarClass::HeadCar)).unwrap();
    consist.add_car(TrainCar::new("tail", CarClass::TailCar)).unwrap();
    consist
}

fn sighted(free_sections: i32, distance_m: f32) -> SignalLookup {
    let mut signal = SignalSpeedCode::new("S1", 0.0);
    signal.set_free_sections(free_sections);
    SignalLookup::Sighted(signal.sighting(distance_m))
}

fn emergencies(notices: &mut NoticeChannel) -> Vec<String> {
    notices
        .drain()
        .into_iter()
        .filter(|n| n.level == NoticeLevel::Emergency)
        .map(|n| n.message)
        .collect()
}

#[cfg(test)]
mod latch_tests {
    use super::*;

    #[test]
    fn test_red_in_near_field_latches_once() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &sighted(0, 150.0), &mut notices);
        assert!(actions.apply_emergency_brake);
        assert!(actions.suppress_power);
        assert!(supervisor.is_latched());

        supervisor.evaluate(2, &consist, &sighted(0, 120.0), &mut notices);
        supervisor.evaluate(3, &consist, &sighted(0, 90.0), &mut notices);

        let messages = emergencies(&mut notices);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("red signal ahead"));

        let state = supervisor.get_state();
        assert_eq!(state.latch_count, 1);
        assert_eq!(state.latched_at_tick, 1);
        assert_eq!(state.safety_level, SafetyLevel::Emergency);
    }

    #[test]
    fn test_distant_red_does_not_latch() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &sighted(0, 500.0), &mut notices);
        assert!(!actions.has_actions());
        assert_eq!(supervisor.get_state().safety_level, SafetyLevel::Normal);
    }

    #[test]
    fn test_latch_holds_after_condition_clears() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        supervisor.evaluate(1, &consist, &sighted(0, 50.0), &mut notices);
        let actions = supervisor.evaluate(2, &consist, &SignalLookup::Clear, &mut notices);
        assert!(actions.apply_emergency_brake);
        assert!(supervisor.is_latched());
    }

    #[test]
    fn test_operator_release() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        supervisor.evaluate(1, &consist, &sighted(0, 50.0), &mut notices);
        notices.drain();

        let actions = supervisor.release(5, &mut notices);
        assert!(actions.release_brakes);
        assert!(!supervisor.is_latched());
        assert_eq!(supervisor.get_state().safety_level, SafetyLevel::Normal);
        assert_eq!(supervisor.get_state().active_events, 0);

        let released = notices.drain();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].level, NoticeLevel::Info);

        assert!(!supervisor.release(6, &mut notices).has_actions());
        assert!(notices.is_empty());
    }

    #[test]
    fn test_release_relatches_if_hazard_remains() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        supervisor.evaluate(1, &consist, &sighted(0, 50.0), &mut notices);
        supervisor.release(2, &mut notices);
        supervisor.evaluate(3, &consist, &sighted(0, 40.0), &mut notices);

        assert!(supervisor.is_latched());
        assert_eq!(supervisor.get_state().latch_count, 2);
        assert_eq!(emergencies(&mut notices).len(), 2);
    }

    #[test]
    fn test_missing_signal_data_is_red() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &SignalLookup::Unavailable, &mut notices);
        assert!(actions.apply_emergency_brake);
        assert!(emergencies(&mut notices)[0].contains("no signal data"));
    }

    #[test]
    fn test_signal_emergency_at_any_distance() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let mut signal = SignalSpeedCode::new("S9", 0.0);
        signal.set_free_sections(4);
        signal.set_comm_link(false);
        let lookup = SignalLookup::Sighted(signal.sighting(900.0));

        assert!(supervisor.evaluate(1, &consist, &lookup, &mut notices).apply_emergency_brake);
    }

    #[test]
    fn test_atp_disabled_ignores_signals_but_not_cars() {
        let mut consist = consist();
        consist.set_atp_enabled(false);
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &sighted(0, 10.0), &mut notices);
        assert!(!actions.apply_emergency_brake);

        consist.car_mut("tail").unwrap().set_health(40.0);
        let actions = supervisor.evaluate(2, &consist, &sighted(0, 10.0), &mut notices);
        assert!(actions.apply_emergency_brake);
        assert!(emergencies(&mut notices)[0].contains("health"));
    }

    #[test]
    fn test_failed_car_latches() {
        let mut consist = consist();
        consist.car_mut("head").unwrap().set_health(10.0);
        consist.update(0.05, &railcore::StaticPowerGrid::new(), &mut NoticeChannel::new());

        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();
        supervisor.evaluate(1, &consist, &SignalLookup::Clear, &mut notices);

        let message = &emergencies(&mut notices)[0];
        assert!(message.contains("car failure"));
        assert!(message.contains("car health below limit"));
    }
}

#[cfg(test)]
mod advisory_tests {
    use super::*;

    #[test]
    fn test_caution_advisory_when_ato_enabled() {
        let mut consist = consist();
        consist.set_ato_enabled(true);
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &sighted(1, 600.0), &mut notices);
        assert_eq!(actions.advisory_speed, Some(20.0));
        assert!(!actions.apply_emergency_brake);
        assert_eq!(supervisor.get_state().safety_level, SafetyLevel::Advisory);

        supervisor.evaluate(2, &consist, &sighted(1, 550.0), &mut notices);
        let infos: Vec<_> = notices.drain();
        assert_eq!(infos.len(), 1);
        assert!(infos[0].message.contains("20 km/h"));

        let actions = supervisor.evaluate(3, &consist, &SignalLookup::Clear, &mut notices);
        assert_eq!(actions.advisory_speed, None);
        assert_eq!(supervisor.get_state().safety_level, SafetyLevel::Normal);
    }

    #[test]
    fn test_no_advisory_without_ato() {
        let consist = consist();
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &sighted(1, 600.0), &mut notices);
        assert_eq!(actions.advisory_speed, None);
        assert!(notices.is_empty());
    }

    #[test]
    fn test_distant_caution_is_ignored() {
        let mut consist = consist();
        consist.set_ato_enabled(true);
        let mut supervisor = SafetySupervisor::new();
        let mut notices = NoticeChannel::new();

        let actions = supervisor.evaluate(1, &consist, &sighted(1, 900.0), &mut notices);
        assert_eq!(actions.advisory_speed, None);
    }
}
