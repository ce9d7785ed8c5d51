use railcore::car::{SubsystemSlot, TrainCar};
use railcore::consist::TrainConsist;
use railcore::error::SimError;
use railcore::interfaces::StaticPowerGrid;
use railcore::notice::NoticeChannel;
use railcore::persistence::{Persist, Record, KIND_KEY, VERSION_KEY};
use railcore::physics::CarClass;
use railcore::signal::SignalSpeedCode;
use railcore::subsystems::{FaultType, SubsystemStatus};
use serde_json::Value;

fn three_car_consist() -> TrainConsist {
    let mut consist = TrainConsist::new("T7", "Line 3");
    consist.set_destination("Airport");
    consist.set_next_station("Museum");
    for (id, class, passengers) in [
        ("T7-1", CarClass::HeadCar, 40),
        ("T7-2", CarClass::MiddleCar, 95),
        ("T7-3", CarClass::TailCar, 12),
    ] {
        consist.add_car(TrainCar::new(id, class)).unwrap();
        consist.set_passengers(id, passengers).unwrap();
    }
    consist
}

#[test]
fn test_consist_round_trip() {
    let consist = three_car_consist();

    let json = consist.save_json().unwrap();
    let restored = TrainConsist::load_json(&json).unwrap();

    assert_eq!(restored, consist);
    assert_eq!(restored.car_count(), 3);
    assert_eq!(restored.total_passengers(), 147);
    assert_eq!(restored.car("T7-2").and_then(|c| c.owner()), Some("T7"));
}

#[test]
fn test_running_consist_round_trip() {
    let mut consist = three_car_consist();
    let grid = StaticPowerGrid::new().with_segment(0.0, 1_000.0, 333);
    let mut notices = NoticeChannel::new();

    consist.check_power_supply(&grid);
    consist.set_power_level(123.4);
    consist.car_mut("T7-2").unwrap().damage(12.5);
    assert!(consist
        .car_mut("T7-3")
        .unwrap()
        .inject_fault(SubsystemSlot::Brake, FaultType::Degraded));
    consist.update(0.05, &grid, &mut notices);
    consist.apply_power(30.0, &mut notices);

    let json = consist.save_json().unwrap();
    let restored = TrainConsist::load_json(&json).unwrap();

    assert_eq!(restored, consist);
    assert!(restored.using_external_power());
    assert_eq!(restored.external_power_level(), consist.external_power_level());
    assert_eq!(restored.power_level(), consist.power_level());
    assert_eq!(restored.car("T7-2").unwrap().health(), 87.5);
    assert_eq!(
        restored.car("T7-3").unwrap().subsystem_status(SubsystemSlot::Brake),
        Some(SubsystemStatus::Warning)
    );
    assert_eq!(restored.car("T7-1").unwrap().power_level(), 30.0);
}

#[test]
fn test_record_carries_kind_and_version() {
    let record = three_car_consist().save().unwrap();
    assert_eq!(record.get(KIND_KEY), Some(&Value::from("train_consist")));
    assert_eq!(record.get(VERSION_KEY), Some(&Value::from(1u32)));
}

#[test]
fn test_faulted_car_round_trip() {
    let mut car = TrainCar::new("c1", CarClass::SpecialPurposeCar);
    car.inject_fault(SubsystemSlot::Brake, FaultType::Failed);
    car.add_warning("wheel flat");

    let restored = TrainCar::load(&car.save().unwrap()).unwrap();
    assert_eq!(restored, car);
    assert!(restored.warnings().contains("wheel flat"));
}

#[test]
fn test_signal_round_trip() {
    let mut signal = SignalSpeedCode::new("S4", 1_250.0);
    signal.set_free_sections(2);
    signal.set_obstacle_distance(300.0);

    let restored = SignalSpeedCode::load_json(&signal.save_json().unwrap()).unwrap();
    assert_eq!(restored, signal);
}

#[test]
fn test_wrong_kind_is_rejected() {
    let record = TrainCar::new("c1", CarClass::HeadCar).save().unwrap();
    let err = SignalSpeedCode::load(&record).unwrap_err();
    assert!(matches!(
        err,
        SimError::WrongRecordKind { expected: "signal_speed_code", found: Some(ref kind) } if kind == "train_car"
    ));
}

#[test]
fn test_missing_kind_is_rejected() {
    let mut record = TrainCar::new("c1", CarClass::HeadCar).save().unwrap();
    record.remove(KIND_KEY);
    assert!(matches!(
        TrainCar::load(&record),
        Err(SimError::WrongRecordKind { found: None, .. })
    ));
}

#[test]
fn test_future_version_is_rejected() {
    let mut record: Record = SignalSpeedCode::new("S1", 0.0).save().unwrap();
    record.insert(VERSION_KEY.to_owned(), Value::from(2u32));

    match SignalSpeedCode::load(&record) {
        Err(SimError::UnsupportedVersion { found, expected, .. }) => {
            assert_eq!(found, 2);
            assert_eq!(expected, 1);
        }
        other => panic!("expected version error, got {:?}", other),
    }
}

#[test]
fn test_malformed_json_is_rejected() {
    assert!(matches!(
        TrainCar::load_json("{not json"),
        Err(SimError::Malformed(_))
    ));

    let mut record = TrainCar::new("c1", CarClass::HeadCar).save().unwrap();
    record.remove("health");
    assert!(matches!(TrainCar::load(&record), Err(SimError::Malformed(_))));
}
