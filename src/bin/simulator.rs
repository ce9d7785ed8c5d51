use clap::{App, Arg};
use colored::*;
use railcore::{
    CarClass, DriverInput, Notice, NoticeLevel, Notifier, SafetyLevel, SignalSpeedCode, SimConfig,
    Simulation, StaticPowerGrid, TickReport, TrackLayout, TrainCar, TrainConsist,
};
use std::time::Duration;
use tokio::time;
use tracing::{error, info, Level};

const DEFAULT_CARS: &str = "4";
const DEFAULT_TICKS: &str = "1200";
const DEFAULT_POWER: &str = "60";
const DEFAULT_PASSENGERS: &str = "60";

/// Prints notices to the terminal as they are delivered.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn deliver(&mut self, notice: &Notice) {
        let car = notice.car_id.as_deref().unwrap_or("consist");
        let line = format!("[{:>5}] {:<8} {}", notice.tick, car, notice.message);
        match notice.level {
            NoticeLevel::Info => println!("{} {}", "ℹ️ ".bright_blue(), line.bright_white()),
            NoticeLevel::Warning => println!("{} {}", "⚠️ ".yellow(), line.yellow()),
            NoticeLevel::Error => println!("{} {}", "❌".red(), line.bright_red()),
            NoticeLevel::Emergency => println!("{} {}", "🛑".red(), line.red().bold()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("railsim")
        .version("0.1.0")
        .author("Rail Systems Engineering Team")
        .about("🚆 Rail consist simulator - car physics, power budget and cab-signal safety")
        .arg(
            Arg::with_name("cars")
                .short("c")
                .long("cars")
                .value_name("COUNT")
                .help("Number of cars in the consist (head and tail included)")
                .takes_value(true)
                .default_value(DEFAULT_CARS)
                .validator(|v| match v.parse::<usize>() {
                    Ok(n) if n >= 2 => Ok(()),
                    _ => Err("Car count must be a number of at least 2".into()),
                }),
        )
        .arg(
            Arg::with_name("ticks")
                .short("n")
                .long("ticks")
                .value_name("TICKS")
                .help("Number of ticks to simulate")
                .takes_value(true)
                .default_value(DEFAULT_TICKS)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Tick count must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("tick-ms")
                .long("tick-ms")
                .value_name("MS")
                .help("Tick period in milliseconds (overrides the config file)")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(n) if n > 0 => Ok(()),
                    _ => Err("Tick period must be a positive number".into()),
                }),
        )
        .arg(
            Arg::with_name("power")
                .short("p")
                .long("power")
                .value_name("LEVEL")
                .help("Driver power demand, 0-100")
                .takes_value(true)
                .default_value(DEFAULT_POWER)
                .validator(|v| match v.parse::<f32>() {
                    Ok(n) if (0.0..=100.0).contains(&n) => Ok(()),
                    _ => Err("Power level must be between 0 and 100".into()),
                }),
        )
        .arg(
            Arg::with_name("passengers")
                .long("passengers")
                .value_name("COUNT")
                .help("Passengers boarded per car")
                .takes_value(true)
                .default_value(DEFAULT_PASSENGERS),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("faults")
                .long("faults")
                .help("Enable random subsystem fault injection"),
        )
        .arg(
            Arg::with_name("operator-ack")
                .long("operator-ack")
                .help("Script the operator acknowledgement: release the emergency brake once the train has stopped"),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print telemetry frames as JSON lines"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match matches.value_of("config") {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(tick_ms) = matches.value_of("tick-ms") {
        config.tick_ms = tick_ms.parse()?;
    }
    if matches.is_present("faults") {
        config.fault_injection.enabled = true;
    }

    let car_count: usize = matches.value_of("cars").unwrap_or(DEFAULT_CARS).parse()?;
    let ticks: u64 = matches.value_of("ticks").unwrap_or(DEFAULT_TICKS).parse()?;
    let power: f32 = matches.value_of("power").unwrap_or(DEFAULT_POWER).parse()?;
    let passengers: u32 = matches
        .value_of("passengers")
        .unwrap_or(DEFAULT_PASSENGERS)
        .parse()?;
    let json = matches.is_present("json");
    let operator_ack = matches.is_present("operator-ack");

    println!("{}", "🚆 railsim - rail consist simulator".bright_blue().bold());
    println!("{}", "===================================".bright_blue());

    let consist = build_consist(&config, car_count, passengers)?;
    println!(
        "   Consist {}: {} cars, {} passengers, max speed {:.0} km/h",
        consist.id().bright_white(),
        consist.car_count(),
        consist.total_passengers(),
        consist.max_speed()
    );

    let tick_ms = config.tick_ms.max(1);
    let mut sim = Simulation::new(
        config,
        consist,
        demo_track(),
        demo_grid(),
        Box::new(ConsoleNotifier),
    );

    let mut interval = time::interval(Duration::from_millis(tick_ms));
    let mut last_report = None;

    for tick in 1..=ticks {
        interval.tick().await;

        // Halfway through, the block ahead of the last signal clears
        if tick == ticks / 2 {
            if let Some(signal) = sim.track_mut().signal_mut("S4") {
                signal.set_free_sections(3);
                info!("Block ahead of S4 cleared");
            }
        }

        let report = sim.tick(DriverInput::power(power));

        if let Some(frame) = &report.telemetry {
            if json {
                match frame.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!("Failed to encode telemetry: {}", e),
                }
            } else {
                print_status(&report);
            }
        }

        // Stands in for the driver pressing release; the core never releases on its own.
        if operator_ack && report.emergency_latched && report.speed_kmh <= 0.0 {
            if sim.release_emergency() {
                println!(
                    "{} {}",
                    "🔓".green(),
                    "Operator acknowledged: emergency brake released".bright_green()
                );
            }
        }

        last_report = Some(report);
    }

    if let Some(report) = last_report {
        print_summary(&report, &sim);
    }

    Ok(())
}

fn build_consist(
    config: &SimConfig,
    car_count: usize,
    passengers: u32,
) -> Result<TrainConsist, railcore::SimError> {
    let mut consist = TrainConsist::with_config("T-101", "Line 1", &config.consist);
    consist.set_destination("Harbour");
    consist.set_next_station("Central");

    for index in 0..car_count {
        let class = if index == 0 {
            CarClass::HeadCar
        } else if index + 1 == car_count {
            CarClass::TailCar
        } else {
            CarClass::MiddleCar
        };

        let id = format!("T-101-{}", index + 1);
        consist.add_car(TrainCar::new(id.clone(), class))?;
        consist.set_passengers(&id, passengers)?;
    }

    Ok(consist)
}

fn demo_track() -> TrackLayout {
    let mut track = TrackLayout::new();
    for (id, position_m, free_sections) in [
        ("S1", 300.0, 5),
        ("S2", 700.0, 2),
        ("S3", 1_100.0, 3),
        ("S4", 1_500.0, 0),
    ] {
        let mut signal = SignalSpeedCode::new(id, position_m);
        signal.set_free_sections(free_sections);
        track.add_signal(signal);
    }
    track
}

fn demo_grid() -> StaticPowerGrid {
    StaticPowerGrid::new()
        .with_segment(0.0, 600.0, 600)
        .with_segment(900.0, 3_000.0, 400)
}

fn print_status(report: &TickReport) {
    let safety = match report.safety_level {
        SafetyLevel::Normal => "NORMAL".green(),
        SafetyLevel::Advisory => "ADVISORY".yellow(),
        SafetyLevel::Emergency => "EMERGENCY".red().bold(),
    };
    let signal = match (&report.signal, report.signal_unavailable) {
        (Some(sighting), _) => format!(
            "{} {:?} @{:.0}m",
            sighting.signal_id, sighting.aspect, sighting.distance_m
        ),
        (None, true) => "no data".to_string(),
        (None, false) => "clear".to_string(),
    };
    let power = report
        .power
        .map_or(0.0, |allocation| allocation.applied_level);

    println!(
        "[{:>5}] {:>8.1} m  {:>5.1} km/h (max {:>4.1})  power {:>5.1}  brake {:>5.1}  {}  {}",
        report.tick,
        report.position_m,
        report.speed_kmh,
        report.max_speed_kmh,
        power,
        report.brake_level,
        signal.bright_cyan(),
        safety
    );
}

fn print_summary(report: &TickReport, sim: &Simulation<TrackLayout, StaticPowerGrid>) {
    let consist = sim.consist();
    println!("\n{}", "📊 Run summary".bright_blue().bold());
    println!("   Ticks:          {}", report.tick);
    println!("   Distance:       {:.1} m", report.position_m);
    println!("   Final speed:    {:.1} km/h", report.speed_kmh);
    println!("   Internal power: {:.0}/{:.0}", consist.power_level(), consist.max_power());
    println!("   Average health: {:.1}%", consist.average_health());
    println!(
        "   Emergency stops: {}",
        sim.supervisor().get_state().latch_count
    );

    let stats = sim.fault_injector().get_stats();
    if sim.fault_injector().is_enabled() {
        println!(
            "   Faults injected: {} ({} degraded, {} failed)",
            stats.total_faults_injected, stats.degraded_faults, stats.failed_faults
        );
    }

    for car in consist.cars() {
        let status = format!("{:?}", car.status());
        let status = match car.status() {
            railcore::CarStatus::Ok => status.green(),
            railcore::CarStatus::Warning => status.yellow(),
            railcore::CarStatus::Error => status.red(),
            railcore::CarStatus::Maintenance => status.blue(),
        };
        println!(
            "   {:<10} {:<18} {:>5.1}%  {:>3} pax  {}",
            car.id(),
            format!("{:?}", car.class()),
            car.health(),
            car.passengers(),
            status
        );
    }
}
