use serde::{Deserialize, Serialize};

use super::unit::UnitStatus;

/// Aggregate work task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    WorkInProgress,
    OnHold,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Document lifecycle status. Submitted and Cancelled tasks are immutable
/// for scan processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocStatus {
    Draft,
    Submitted,
    Cancelled,
}

impl Default for DocStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// Task-local record of one production unit's participation in the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanUnit {
    /// Scan code, matching the production unit's barcode.
    pub code: String,

    pub model: super::unit::UnitModel,

    /// Virtual batch id.
    pub batch_no: u32,

    #[serde(default)]
    pub status: UnitStatus,

    /// Back-reference to the production unit.
    pub unit_ref: String,

    /// Serialized quality assessment, attached when the unit enters
    /// correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_data: Option<String>,
}

/// One time-tracking entry. Open while `to_time` is None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLog {
    pub employee: String,
    pub from_time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_time: Option<String>,

    #[serde(default)]
    pub time_in_mins: i64,

    #[serde(default)]
    pub completed_qty: u32,

    /// Why the task went on hold, when given by the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Planned working window, filled in by scheduling (out of scope here,
/// carried through for the task snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTimeLog {
    pub from_time: String,
    pub to_time: String,

    #[serde(default)]
    pub time_in_mins: i64,
}

/// One operation instance for one production order position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTask {
    /// UUID primary key.
    #[serde(default)]
    pub id: String,

    /// Process-step name (see [`super::ops`]).
    pub operation: String,

    /// Production item reference: `{order}-{poz}` (plus glass stock for
    /// glass items).
    pub production_item: String,

    #[serde(default)]
    pub docstatus: DocStatus,

    #[serde(default)]
    pub status: TaskStatus,

    /// Required quantity for final submission.
    pub for_quantity: u32,

    #[serde(default)]
    pub scan_units: Vec<ScanUnit>,

    #[serde(default)]
    pub time_logs: Vec<TimeLog>,

    #[serde(default)]
    pub scheduled_time_logs: Vec<ScheduledTimeLog>,

    /// True for correction re-runs spawned by a quality failure.
    #[serde(default)]
    pub is_corrective: bool,

    /// The task this correction re-runs, when corrective.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_task: Option<String>,

    /// The quality task that spawned this correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_task: Option<String>,

    /// Restricts the creation pipeline to one virtual batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_batch_no: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_end_date: Option<String>,

    /// Optimistic concurrency version, bumped on every save.
    #[serde(default)]
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<String>,
}

impl WorkTask {
    /// Scan unit entry for the given code, if present.
    pub fn scan_unit(&self, code: &str) -> Option<&ScanUnit> {
        self.scan_units.iter().find(|u| u.code == code)
    }

    pub fn scan_unit_mut(&mut self, code: &str) -> Option<&mut ScanUnit> {
        self.scan_units.iter_mut().find(|u| u.code == code)
    }

    /// All scan units sharing the given virtual batch id.
    pub fn units_in_batch(&self, batch_no: u32) -> Vec<&ScanUnit> {
        self.scan_units
            .iter()
            .filter(|u| u.batch_no == batch_no)
            .collect()
    }

    /// All scan units currently in progress (cloned snapshot).
    pub fn in_progress_units(&self) -> Vec<ScanUnit> {
        self.scan_units
            .iter()
            .filter(|u| u.status == UnitStatus::InProgress)
            .cloned()
            .collect()
    }

    /// Sum of completed quantities across all time logs.
    pub fn total_completed_qty(&self) -> u32 {
        self.time_logs.iter().map(|l| l.completed_qty).sum()
    }

    /// True once the cumulative completed quantity reaches the requirement.
    pub fn is_fully_complete(&self) -> bool {
        self.total_completed_qty() >= self.for_quantity
    }

    /// The open time log, if any.
    pub fn open_time_log_mut(&mut self) -> Option<&mut TimeLog> {
        self.time_logs.iter_mut().find(|l| l.to_time.is_none())
    }
}
