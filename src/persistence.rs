//! Versioned key/value records for cars, consists and signals.
//!
//! A record is a flat JSON object holding the entity's fields plus two
//! reserved keys, `_kind` and `_version`. Loading checks both before
//! decoding, so a record written by an incompatible build is rejected
//! instead of half-read.

use crate::car::TrainCar;
use crate::consist::TrainConsist;
use crate::error::{Result, SimError};
use crate::signal::SignalSpeedCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

pub const KIND_KEY: &str = "_kind";
pub const VERSION_KEY: &str = "_version";

pub trait Persist: Serialize + DeserializeOwned {
    const KIND: &'static str;
    const VERSION: u32;

    fn save(&self) -> Result<Record> {
        let mut record = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            // Only struct-shaped entities implement Persist
            _ => {
                return Err(SimError::WrongRecordKind {
                    expected: Self::KIND,
                    found: None,
                })
            }
        };
        record.insert(KIND_KEY.to_owned(), Value::from(Self::KIND));
        record.insert(VERSION_KEY.to_owned(), Value::from(Self::VERSION));
        Ok(record)
    }

    fn load(record: &Record) -> Result<Self> {
        let kind = record.get(KIND_KEY).and_then(Value::as_str);
        if kind != Some(Self::KIND) {
            return Err(SimError::WrongRecordKind {
                expected: Self::KIND,
                found: kind.map(str::to_owned),
            });
        }

        let version = record.get(VERSION_KEY).and_then(Value::as_u64).unwrap_or(0);
        if version != u64::from(Self::VERSION) {
            return Err(SimError::UnsupportedVersion {
                kind: Self::KIND,
                found: version,
                expected: Self::VERSION,
            });
        }

        let mut fields = record.clone();
        fields.remove(KIND_KEY);
        fields.remove(VERSION_KEY);
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    fn save_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.save()?)?)
    }

    fn load_json(json: &str) -> Result<Self> {
        let record: Record = serde_json::from_str(json)?;
        Self::load(&record)
    }
}

impl Persist for TrainCar {
    const KIND: &'static str = "train_car";
    const VERSION: u32 = 1;
}

impl Persist for TrainConsist {
    const KIND: &'static str = "train_consist";
    const VERSION: u32 = 1;
}

impl Persist for SignalSpeedCode {
    const KIND: &'static str = "signal_speed_code";
    const VERSION: u32 = 1;
}
