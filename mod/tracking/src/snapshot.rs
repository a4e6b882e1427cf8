use serde::Serialize;

use crate::model::{DocStatus, TaskStatus, UnitModel, UnitStatus, WorkTask};

/// Client-facing view of a work task, returned with scan responses and from
/// the task endpoints. Child rows carry a 1-based `idx` like the documents
/// they mirror.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: String,
    pub operation: String,
    pub production_item: String,
    pub status: TaskStatus,
    pub docstatus: DocStatus,
    pub for_quantity: u32,
    pub total_completed_qty: u32,
    pub is_corrective: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_task: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_task: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_batch_no: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_start_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_end_date: Option<String>,

    pub scan_units: Vec<ScanUnitView>,
    pub time_logs: Vec<TimeLogView>,
    pub scheduled_time_logs: Vec<ScheduledTimeLogView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanUnitView {
    pub idx: usize,
    pub code: String,
    pub model: UnitModel,
    pub batch_no: u32,
    pub status: UnitStatus,
    pub unit_ref: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLogView {
    pub idx: usize,
    pub employee: String,
    pub from_time: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_time: Option<String>,

    pub time_in_mins: i64,
    pub completed_qty: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTimeLogView {
    pub idx: usize,
    pub from_time: String,
    pub to_time: String,
    pub time_in_mins: i64,
}

impl TaskSnapshot {
    pub fn from_task(task: &WorkTask) -> Self {
        Self {
            id: task.id.clone(),
            operation: task.operation.clone(),
            production_item: task.production_item.clone(),
            status: task.status,
            docstatus: task.docstatus,
            for_quantity: task.for_quantity,
            total_completed_qty: task.total_completed_qty(),
            is_corrective: task.is_corrective,
            for_task: task.for_task.clone(),
            quality_task: task.quality_task.clone(),
            target_batch_no: task.target_batch_no,
            remarks: task.remarks.clone(),
            actual_start_date: task.actual_start_date.clone(),
            actual_end_date: task.actual_end_date.clone(),
            expected_start_date: task.expected_start_date.clone(),
            expected_end_date: task.expected_end_date.clone(),
            scan_units: task
                .scan_units
                .iter()
                .enumerate()
                .map(|(i, u)| ScanUnitView {
                    idx: i + 1,
                    code: u.code.clone(),
                    model: u.model,
                    batch_no: u.batch_no,
                    status: u.status,
                    unit_ref: u.unit_ref.clone(),
                })
                .collect(),
            time_logs: task
                .time_logs
                .iter()
                .enumerate()
                .map(|(i, l)| TimeLogView {
                    idx: i + 1,
                    employee: l.employee.clone(),
                    from_time: l.from_time.clone(),
                    to_time: l.to_time.clone(),
                    time_in_mins: l.time_in_mins,
                    completed_qty: l.completed_qty,
                    reason: l.reason.clone(),
                })
                .collect(),
            scheduled_time_logs: task
                .scheduled_time_logs
                .iter()
                .enumerate()
                .map(|(i, l)| ScheduledTimeLogView {
                    idx: i + 1,
                    from_time: l.from_time.clone(),
                    to_time: l.to_time.clone(),
                    time_in_mins: l.time_in_mins,
                })
                .collect(),
        }
    }
}
