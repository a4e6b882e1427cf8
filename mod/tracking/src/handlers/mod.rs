mod corner_weld;
mod default;
mod quality;
mod wing_prep;

pub use corner_weld::CornerWeldHandler;
pub use default::GroupedHandler;
pub use quality::QualityHandler;
pub use wing_prep::WingPrepHandler;

use serde::Serialize;

use mestra_core::ServiceError;

use crate::engine::Completion;
use crate::model::{
    ops, DocStatus, ProductionUnit, QualityAssessment, ScanUnit, TaskStatus, UnitStatus, WorkTask,
};
use crate::pipeline::TaskCreationPipeline;
use crate::store::TrackingStore;

/// Which scan behaviour an operation follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFamily {
    Grouped,
    CornerWeld,
    WingPrep,
    Quality,
}

static GROUPED: GroupedHandler = GroupedHandler;
static CORNER_WELD: CornerWeldHandler = CornerWeldHandler;
static WING_PREP: WingPrepHandler = WingPrepHandler;
static QUALITY: QualityHandler = QualityHandler;

impl StepFamily {
    /// Operations without a dedicated family follow the grouped default.
    pub fn of(operation: &str) -> Self {
        match operation {
            ops::CORNER_WELD => Self::CornerWeld,
            ops::WING_PREP => Self::WingPrep,
            ops::QUALITY => Self::Quality,
            _ => Self::Grouped,
        }
    }

    pub fn handler(&self) -> &'static dyn OperationHandler {
        match self {
            Self::Grouped => &GROUPED,
            Self::CornerWeld => &CORNER_WELD,
            Self::WingPrep => &WING_PREP,
            Self::Quality => &QUALITY,
        }
    }
}

/// Everything a handler needs beyond the task and unit being scanned.
pub struct ScanContext<'a> {
    pub store: &'a TrackingStore,
    pub employee: &'a str,
    pub quality: Option<&'a QualityAssessment>,
    pub pipeline: &'a dyn TaskCreationPipeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    InProgress,
    Failed,
    Error,
    MultipleOptions,
}

/// Result of processing one scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub status: ScanStatus,
    pub message: String,
    /// Codes of the other units moved together with the scanned one.
    pub related_codes: Vec<String>,
    /// Ids of corrective tasks spawned by a failed inspection.
    pub correction_tasks: Vec<String>,
    pub quality: Option<QualityAssessment>,
    pub quality_status: Option<String>,
    /// The task the scan was ultimately applied to.
    pub task_ref: String,
}

impl ScanOutcome {
    fn new(status: ScanStatus, message: impl Into<String>, task_ref: &str) -> Self {
        Self {
            status,
            message: message.into(),
            related_codes: vec![],
            correction_tasks: vec![],
            quality: None,
            quality_status: None,
            task_ref: task_ref.to_string(),
        }
    }

    pub fn completed(message: impl Into<String>, task_ref: &str) -> Self {
        Self::new(ScanStatus::Completed, message, task_ref)
    }

    pub fn in_progress(message: impl Into<String>, task_ref: &str) -> Self {
        Self::new(ScanStatus::InProgress, message, task_ref)
    }

    pub fn failed(message: impl Into<String>, task_ref: &str) -> Self {
        Self::new(ScanStatus::Failed, message, task_ref)
    }

    pub fn error(message: impl Into<String>, task_ref: &str) -> Self {
        Self::new(ScanStatus::Error, message, task_ref)
    }

    fn with_codes(mut self, members: &[ScanUnit]) -> Self {
        self.related_codes = members.iter().map(|u| u.code.clone()).collect();
        self
    }
}

/// Per-family scan behaviour.
///
/// The default `handle` covers the shared scan protocol; families override
/// `related_units` to define which units move together, and the quality
/// family replaces `handle` wholesale.
pub trait OperationHandler: Send + Sync {
    /// The not-yet-completed units that move together with the scanned one.
    fn related_units(
        &self,
        cx: &ScanContext,
        task: &WorkTask,
        current: &ScanUnit,
        unit: &ProductionUnit,
    ) -> Result<Vec<ScanUnit>, ServiceError>;

    /// Whether starting a pending unit force-completes its group's leftovers
    /// on previous stations.
    fn pending_cascades(&self) -> bool {
        false
    }

    fn handle(
        &self,
        cx: &ScanContext,
        task: &WorkTask,
        unit: &ProductionUnit,
    ) -> Result<ScanOutcome, ServiceError> {
        ensure_scannable(task)?;
        let current = current_scan_unit(task, unit)?;
        let engine = Completion::new(cx.store);

        match current.status {
            UnitStatus::Completed => {
                // Roll forward to the next open task of this operation, if
                // one exists (corrective re-runs).
                let next = engine
                    .open_tasks_for_step(unit, &task.operation)?
                    .into_iter()
                    .find(|t| t.id != task.id);
                let Some(next_task) = next else {
                    return Ok(ScanOutcome::error(
                        format!(
                            "'{}' is already completed for {}",
                            unit.barcode, task.operation
                        ),
                        &task.id,
                    ));
                };
                let next_current = current_scan_unit(&next_task, unit)?;
                if next_current.status == UnitStatus::InProgress {
                    engine.force_complete_open_tasks(unit, &next_task.id)?;
                    finish_batch(cx, &next_task.id, next_current.batch_no)
                } else {
                    let related = self.related_units(cx, &next_task, next_current, unit)?;
                    start_batch(cx, &next_task.id, &related)
                }
            }
            UnitStatus::InProgress => {
                engine.force_complete_open_tasks(unit, &task.id)?;
                finish_batch(cx, &task.id, current.batch_no)
            }
            UnitStatus::Pending | UnitStatus::InCorrection => {
                let related = self.related_units(cx, task, current, unit)?;
                if self.pending_cascades() {
                    for member in &related {
                        let member_unit = cx.store.get_unit(&member.unit_ref)?;
                        engine.force_complete_open_tasks(&member_unit, &task.id)?;
                    }
                }
                start_batch(cx, &task.id, &related)
            }
        }
    }
}

pub(crate) fn ensure_scannable(task: &WorkTask) -> Result<(), ServiceError> {
    if task.docstatus == DocStatus::Cancelled {
        return Err(ServiceError::InvalidState(format!(
            "task '{}' ({}) is cancelled",
            task.id, task.operation
        )));
    }
    Ok(())
}

pub(crate) fn current_scan_unit<'t>(
    task: &'t WorkTask,
    unit: &ProductionUnit,
) -> Result<&'t ScanUnit, ServiceError> {
    task.scan_unit(&unit.barcode).ok_or_else(|| {
        ServiceError::NotFound(format!(
            "'{}' is not part of task '{}'",
            unit.barcode, task.id
        ))
    })
}

/// Second scan of an in-progress group: complete it, and when the whole
/// virtual batch is done, book one finished piece and seal or park the task.
pub(crate) fn finish_batch(
    cx: &ScanContext,
    task_id: &str,
    batch_no: u32,
) -> Result<ScanOutcome, ServiceError> {
    let engine = Completion::new(cx.store);
    let task = cx.store.get_task(task_id)?;
    let members: Vec<ScanUnit> = task
        .units_in_batch(batch_no)
        .into_iter()
        .filter(|u| u.status == UnitStatus::InProgress)
        .cloned()
        .collect();
    if !members.is_empty() {
        engine.complete_group(task_id, &members)?;
    }

    if engine.is_batch_complete(task_id, batch_no)? {
        let closed = engine.close_open_entry(task_id, 1)?;
        if closed.is_fully_complete() {
            engine.submit(task_id)?;
        } else {
            engine.set_status(task_id, TaskStatus::OnHold, None, None)?;
        }
        Ok(ScanOutcome::completed(format!("batch {batch_no} completed"), task_id)
            .with_codes(&members))
    } else {
        engine.set_status(task_id, TaskStatus::OnHold, None, None)?;
        Ok(ScanOutcome::completed(
            format!("group completed, batch {batch_no} still open"),
            task_id,
        )
        .with_codes(&members))
    }
}

/// First scan of a pending group: retire any group left in progress on this
/// task, then start the new group and put the task to work.
pub(crate) fn start_batch(
    cx: &ScanContext,
    task_id: &str,
    related: &[ScanUnit],
) -> Result<ScanOutcome, ServiceError> {
    let engine = Completion::new(cx.store);
    let task = cx.store.get_task(task_id)?;

    let active = task.in_progress_units();
    if !active.is_empty() {
        engine.complete_group(task_id, &active)?;
        if engine.is_batch_complete(task_id, active[0].batch_no)? {
            engine.close_open_entry(task_id, 1)?;
        } else {
            engine.set_status(task_id, TaskStatus::OnHold, None, None)?;
        }
    }

    engine.set_group_in_progress(task_id, related)?;
    engine.set_status(
        task_id,
        TaskStatus::WorkInProgress,
        Some(cx.employee),
        None,
    )?;
    Ok(ScanOutcome::in_progress("group started", task_id).with_codes(related))
}
