use crate::subsystems::{FaultType, SubsystemId};
use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_FAULT_HISTORY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub id: u32,
    pub car_id: String,
    pub subsystem: SubsystemId,
    pub fault_type: FaultType,
    pub tick: u64,
    pub duration_ticks: u64,
    pub resolved: bool,
}

/// Bounded history of per-car subsystem faults. At most one unresolved
/// record exists per (car, subsystem) pair, which is what lets callers
/// notify once per transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultLog {
    fault_history: Vec<FaultRecord, MAX_FAULT_HISTORY>,
    next_fault_id: u32,
}

impl FaultLog {
    pub fn new() -> Self {
        Self {
            fault_history: Vec::new(),
            next_fault_id: 1,
        }
    }

    pub fn find_active(&self, car_id: &str, subsystem: SubsystemId) -> Option<&FaultRecord> {
        self.fault_history
            .iter()
            .find(|f| !f.resolved && f.car_id == car_id && f.subsystem == subsystem)
    }

    /// Records a fault unless one is already open for the pair. Returns the
    /// new record id, or `None` if the fault was already known.
    pub fn record_fault(
        &mut self,
        car_id: &str,
        subsystem: SubsystemId,
        fault_type: FaultType,
        tick: u64,
    ) -> Option<u32> {
        if self.find_active(car_id, subsystem).is_some() {
            return None;
        }

        let fault_id = self.next_fault_id.max(1);
        self.next_fault_id = fault_id.wrapping_add(1);

        let fault_record = FaultRecord {
            id: fault_id,
            car_id: car_id.to_owned(),
            subsystem,
            fault_type,
            tick,
            duration_ticks: 0,
            resolved: false,
        };

        if self.fault_history.is_full() {
            // Prefer evicting a resolved record so open faults stay tracked
            let index = self
                .fault_history
                .iter()
                .position(|f| f.resolved)
                .unwrap_or(0);
            self.fault_history.remove(index);
        }

        let _ = self.fault_history.push(fault_record);
        Some(fault_id)
    }

    /// Closes the open record for the pair, if any.
    pub fn resolve(&mut self, car_id: &str, subsystem: SubsystemId, tick: u64) -> bool {
        if let Some(fault) = self
            .fault_history
            .iter_mut()
            .find(|f| !f.resolved && f.car_id == car_id && f.subsystem == subsystem)
        {
            fault.resolved = true;
            fault.duration_ticks = tick.saturating_sub(fault.tick);
            true
        } else {
            false
        }
    }

    pub fn resolve_car(&mut self, car_id: &str, tick: u64) {
        for fault in self
            .fault_history
            .iter_mut()
            .filter(|f| !f.resolved && f.car_id == car_id)
        {
            fault.resolved = true;
            fault.duration_ticks = tick.saturating_sub(fault.tick);
        }
    }

    pub fn get_active_faults(&self) -> impl Iterator<Item = &FaultRecord> {
        self.fault_history.iter().filter(|f| !f.resolved)
    }

    pub fn get_fault_history(&self) -> &[FaultRecord] {
        &self.fault_history
    }

    pub fn clear_resolved_faults(&mut self) {
        self.fault_history.retain(|f| !f.resolved);
    }
}
