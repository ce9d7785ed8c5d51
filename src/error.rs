use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("car {0} is already coupled to this consist")]
    DuplicateCar(String),

    #[error("car {car_id} belongs to consist {consist_id}")]
    CarOwned { car_id: String, consist_id: String },

    #[error("no car with id {0}")]
    UnknownCar(String),

    #[error("unsupported {kind} record version {found} (expected {expected})")]
    UnsupportedVersion {
        kind: &'static str,
        found: u64,
        expected: u32,
    },

    #[error("expected a {expected} record, found {found:?}")]
    WrongRecordKind {
        expected: &'static str,
        found: Option<String>,
    },

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, SimError>;
