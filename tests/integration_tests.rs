use railcore::fault_injection::FaultInjectionConfig;
use railcore::{
    CarClass, DriverInput, NoticeLevel, RecordingNotifier, SafetyLevel, SignalAspect,
    SignalSpeedCode, SimConfig, Simulation, StaticPowerGrid, TrackLayout, TrainCar, TrainConsist,
};

const CAR_IDS: [&str; 4] = ["T1-1", "T1-2", "T1-3", "T1-4"];

fn consist(config: &SimConfig) -> TrainConsist {
    let mut consist = TrainConsist::with_config("T1", "Line 1", &config.consist);
    for (index, id) in CAR_IDS.iter().enumerate() {
        let class = match index {
            0 => CarClass::HeadCar,
            3 => CarClass::TailCar,
            _ => CarClass::MiddleCar,
        };
        consist.add_car(TrainCar::new(*id, class)).unwrap();
    }
    consist
}

fn track_with(signal_id: &str, position_m: f64, free_sections: i32) -> TrackLayout {
    let mut signal = SignalSpeedCode::new(signal_id, position_m);
    signal.set_free_sections(free_sections);
    let mut track = TrackLayout::new();
    track.add_signal(signal);
    track
}

fn electrified() -> StaticPowerGrid {
    StaticPowerGrid::new().with_segment(0.0, 10_000.0, 600)
}

fn simulation(
    config: SimConfig,
    track: TrackLayout,
    grid: StaticPowerGrid,
) -> (Simulation<TrackLayout, StaticPowerGrid>, RecordingNotifier) {
    let recorder = RecordingNotifier::new();
    let consist = consist(&config);
    let sim = Simulation::new(config, consist, track, grid, Box::new(recorder.clone()));
    (sim, recorder)
}

#[cfg(test)]
mod running_tests {
    use super::*;

    #[test]
    fn test_train_accelerates_on_open_line() {
        let (mut sim, recorder) = simulation(SimConfig::default(), TrackLayout::new(), electrified());

        let mut last_speed = 0.0;
        for _ in 0..100 {
            let report = sim.tick(DriverInput::power(50.0));
            assert!(report.speed_kmh >= last_speed);
            assert!(!report.emergency_latched);
            assert_eq!(report.speed_limit_kmh, Some(80.0));
            last_speed = report.speed_kmh;
        }

        assert!(last_speed > 0.0);
        assert!(sim.consist().position_m() > 0.0);
        assert!(sim.consist().using_external_power());
        assert_eq!(recorder.count_at(NoticeLevel::Emergency), 0);
        assert_eq!(sim.tick_count(), 100);
    }

    #[test]
    fn test_driver_brake_cuts_power() {
        let (mut sim, _) = simulation(SimConfig::default(), TrackLayout::new(), electrified());
        for id in CAR_IDS {
            sim.consist_mut().car_mut(id).unwrap().set_speed_kmh(40.0);
        }

        let report = sim.tick(DriverInput {
            power_level: 80.0,
            brake_level: 50.0,
        });

        assert_eq!(report.power.map(|p| p.applied_level), Some(0.0));
        assert_eq!(report.brake_level, 50.0);
        assert!(report.speed_kmh < 40.0);
    }

    #[test]
    fn test_low_power_reaches_notifier_once() {
        let mut config = SimConfig::default();
        config.consist.initial_power = 100.0;
        let (mut sim, recorder) = simulation(config, TrackLayout::new(), StaticPowerGrid::new());

        let mut reports = Vec::new();
        for _ in 0..10 {
            reports.push(sim.tick(DriverInput::power(50.0)));
        }

        assert_eq!(recorder.count_at(NoticeLevel::Warning), 1);
        let last = reports.last().and_then(|r| r.power).unwrap();
        assert!(last.throttled);
        assert_eq!(last.applied_level, 0.0);
    }

    #[test]
    fn test_telemetry_sampled_at_rate() {
        let (mut sim, _) = simulation(SimConfig::default(), TrackLayout::new(), electrified());

        let sampled: Vec<u64> = (0..40)
            .filter_map(|_| sim.tick(DriverInput::power(30.0)).telemetry)
            .map(|frame| frame.tick)
            .collect();

        assert_eq!(sampled, vec![20, 40]);
        assert_eq!(sim.telemetry().get_metrics().frames_collected, 2);
        let latest = sim.telemetry().get_latest_telemetry().unwrap();
        assert_eq!(latest.cars.len(), 4);
        assert_eq!(latest.consist_id, "T1");
    }
}

#[cfg(test)]
mod supervision_tests {
    use super::*;

    #[test]
    fn test_red_signal_latches_until_released() {
        let (mut sim, recorder) = simulation(
            SimConfig::default(),
            track_with("S1", 150.0, 0),
            electrified(),
        );

        let first = sim.tick(DriverInput::power(60.0));
        assert!(first.emergency_latched);
        assert_eq!(first.safety_level, SafetyLevel::Emergency);
        assert_eq!(first.power, None);
        assert_eq!(first.brake_level, 100.0);
        assert_eq!(first.signal.as_ref().map(|s| s.aspect), Some(SignalAspect::Red));

        for _ in 0..10 {
            let report = sim.tick(DriverInput::power(60.0));
            assert!(report.emergency_latched);
            assert_eq!(report.speed_kmh, 0.0);
        }
        assert_eq!(recorder.count_at(NoticeLevel::Emergency), 1);
        assert!(sim.consist().cars().iter().all(|c| c.brake_level() == 100.0));

        if let Some(signal) = sim.track_mut().signal_mut("S1") {
            signal.set_free_sections(3);
        }
        assert!(sim.release_emergency());
        assert!(!sim.release_emergency());
        assert!(recorder
            .notices()
            .iter()
            .any(|n| n.level == NoticeLevel::Info && n.message.contains("released")));

        let report = sim.tick(DriverInput::power(60.0));
        assert!(!report.emergency_latched);
        assert!(report.power.is_some());
        assert!(report.speed_kmh > 0.0);
        assert_eq!(sim.supervisor().get_state().latch_count, 1);
    }

    #[test]
    fn test_stopped_train_stays_latched_without_operator() {
        let (mut sim, recorder) = simulation(
            SimConfig::default(),
            track_with("S1", 150.0, 0),
            electrified(),
        );
        sim.tick(DriverInput::power(60.0));
        if let Some(signal) = sim.track_mut().signal_mut("S1") {
            signal.set_free_sections(3);
        }

        for _ in 0..200 {
            let report = sim.tick(DriverInput::coast());
            assert!(report.emergency_latched);
            assert_eq!(report.speed_kmh, 0.0);
        }
        assert!(sim.supervisor().is_latched());
        assert!(!recorder.notices().iter().any(|n| n.message.contains("released")));
    }

    #[test]
    fn test_release_relatches_while_red() {
        let (mut sim, recorder) = simulation(
            SimConfig::default(),
            track_with("S1", 100.0, 0),
            electrified(),
        );

        sim.tick(DriverInput::power(60.0));
        assert!(sim.release_emergency());
        let report = sim.tick(DriverInput::power(60.0));

        assert!(report.emergency_latched);
        assert_eq!(sim.supervisor().get_state().latch_count, 2);
        assert_eq!(recorder.count_at(NoticeLevel::Emergency), 2);
    }

    #[test]
    fn test_unavailable_signal_data_stops_the_train() {
        let mut track = TrackLayout::new();
        track.set_available(false);
        let (mut sim, recorder) = simulation(SimConfig::default(), track, electrified());

        let report = sim.tick(DriverInput::power(60.0));
        assert!(report.signal_unavailable);
        assert!(report.emergency_latched);
        assert_eq!(recorder.count_at(NoticeLevel::Emergency), 1);
    }

    #[test]
    fn test_caution_aspect_limits_speed() {
        let (mut sim, _) = simulation(
            SimConfig::default(),
            track_with("S1", 600.0, 1),
            electrified(),
        );
        for id in CAR_IDS {
            sim.consist_mut().car_mut(id).unwrap().set_speed_kmh(60.0);
        }

        let report = sim.tick(DriverInput::power(80.0));
        assert!(report.overspeed);
        assert_eq!(report.speed_limit_kmh, Some(20.0));
        assert_eq!(report.brake_level, 100.0);
        assert_eq!(report.power.map(|p| p.applied_level), Some(0.0));
        assert!(!report.emergency_latched);
        assert!(report.speed_kmh < 60.0);
    }

    #[test]
    fn test_ato_advisory_from_caution_aspect() {
        let mut config = SimConfig::default();
        config.consist.ato_enabled = true;
        let (mut sim, recorder) = simulation(config, track_with("S1", 600.0, 1), electrified());

        let report = sim.tick(DriverInput::power(40.0));
        assert_eq!(report.advisory_speed, Some(20.0));
        assert_eq!(report.safety_level, SafetyLevel::Advisory);
        assert_eq!(recorder.count_at(NoticeLevel::Info), 1);
    }

    #[test]
    fn test_atp_disabled_has_no_speed_limit() {
        let mut config = SimConfig::default();
        config.consist.atp_enabled = false;
        let (mut sim, _) = simulation(config, track_with("S1", 100.0, 0), electrified());

        let report = sim.tick(DriverInput::power(40.0));
        assert_eq!(report.speed_limit_kmh, None);
        assert!(!report.emergency_latched);
    }

    #[test]
    fn test_injected_failure_latches_next_tick() {
        let mut config = SimConfig::default();
        config.fault_injection = FaultInjectionConfig {
            enabled: true,
            traction_rate_percent: 100.0,
            brake_rate_percent: 0.0,
            bogie_rate_percent: 0.0,
            degraded_weight: 0,
            failed_weight: 100,
            ..FaultInjectionConfig::default()
        };
        let (mut sim, recorder) = simulation(config, TrackLayout::new(), electrified());

        let first = sim.tick(DriverInput::power(40.0));
        assert_eq!(first.faults_injected, 2);
        assert!(!first.emergency_latched);
        assert!(recorder.count_at(NoticeLevel::Emergency) >= 2);

        let second = sim.tick(DriverInput::power(40.0));
        assert!(second.emergency_latched);
        assert_eq!(second.max_speed_kmh, 40.0);

        sim.fault_injector_mut().set_enabled(false);
        assert_eq!(sim.clear_injected_faults(), 2);
        assert!(sim.release_emergency());

        let third = sim.tick(DriverInput::power(40.0));
        assert!(!third.emergency_latched);
        assert_eq!(third.max_speed_kmh, 80.0);
    }

    #[test]
    fn test_consist_returned_after_run() {
        let (mut sim, _) = simulation(SimConfig::default(), TrackLayout::new(), electrified());
        sim.tick(DriverInput::coast());

        let consist = sim.into_consist();
        assert_eq!(consist.car_count(), 4);
        assert!(consist.cars().iter().all(|c| c.owner() == Some("T1")));
    }
}
