use mestra_core::{minutes_between, now_rfc3339, ServiceError};

use crate::model::{
    ops, DocStatus, ProductionUnit, ScanUnit, TaskStatus, TimeLog, UnitStatus, WorkTask,
};
use crate::store::TrackingStore;

/// Batch completion engine.
///
/// Every scan funnels through here to move virtual batches between
/// statuses, keeping the task-side (ScanUnit) and unit-side
/// (OperationState) views in sync and the task's time logs consistent.
pub struct Completion<'a> {
    store: &'a TrackingStore,
}

impl<'a> Completion<'a> {
    pub fn new(store: &'a TrackingStore) -> Self {
        Self { store }
    }

    /// True once every scan unit of the batch is completed.
    pub fn is_batch_complete(&self, task_id: &str, batch_no: u32) -> Result<bool, ServiceError> {
        let task = self.store.get_task(task_id)?;
        let members = task.units_in_batch(batch_no);
        Ok(!members.is_empty() && members.iter().all(|u| u.status == UnitStatus::Completed))
    }

    /// Mark a group of units completed on both sides: each unit's operation
    /// state for this task, then the task's scan unit entries.
    pub fn complete_group(&self, task_id: &str, members: &[ScanUnit]) -> Result<(), ServiceError> {
        self.set_group_status(task_id, members, UnitStatus::Completed)
    }

    /// Mark a group of units in progress on both sides.
    pub fn set_group_in_progress(
        &self,
        task_id: &str,
        members: &[ScanUnit],
    ) -> Result<(), ServiceError> {
        self.set_group_status(task_id, members, UnitStatus::InProgress)
    }

    fn set_group_status(
        &self,
        task_id: &str,
        members: &[ScanUnit],
        status: UnitStatus,
    ) -> Result<(), ServiceError> {
        for member in members {
            self.store.update_unit(&member.unit_ref, |unit| {
                if !unit.set_op_status(task_id, status) {
                    return Err(ServiceError::InvalidState(format!(
                        "unit '{}' has no state for task '{}'",
                        unit.barcode, task_id
                    )));
                }
                Ok(())
            })?;
        }
        self.store.update_task(task_id, |task| {
            for member in members {
                if let Some(su) = task.scan_unit_mut(&member.code) {
                    su.status = status;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Close the open time log, crediting the given completed quantity.
    /// A task without an open log is left untouched.
    pub fn close_open_entry(&self, task_id: &str, qty: u32) -> Result<WorkTask, ServiceError> {
        self.store.update_task(task_id, |task| {
            let now = now_rfc3339();
            if let Some(log) = task.open_time_log_mut() {
                log.time_in_mins = minutes_between(&log.from_time, &now);
                log.to_time = Some(now);
                log.completed_qty = qty;
            }
            Ok(())
        })
    }

    /// Transition the task status, maintaining time logs:
    /// WorkInProgress opens a log (and stamps the first actual start);
    /// OnHold closes the open log with the operator's reason.
    pub fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        employee: Option<&str>,
        reason: Option<&str>,
    ) -> Result<WorkTask, ServiceError> {
        self.store.update_task(task_id, |task| {
            let now = now_rfc3339();
            match status {
                TaskStatus::WorkInProgress => {
                    if task.actual_start_date.is_none() {
                        task.actual_start_date = Some(now.clone());
                    }
                    if task.open_time_log_mut().is_none() {
                        task.time_logs.push(TimeLog {
                            employee: employee.unwrap_or_default().to_string(),
                            from_time: now.clone(),
                            to_time: None,
                            time_in_mins: 0,
                            completed_qty: 0,
                            reason: None,
                        });
                    }
                }
                TaskStatus::OnHold => {
                    if let Some(log) = task.open_time_log_mut() {
                        log.time_in_mins = minutes_between(&log.from_time, &now);
                        log.to_time = Some(now.clone());
                        if reason.is_some() {
                            log.reason = reason.map(str::to_string);
                        }
                    }
                }
                TaskStatus::Pending | TaskStatus::Completed => {}
            }
            task.status = status;
            Ok(())
        })
    }

    /// Final submission: the task is completed and sealed against further
    /// scan processing. Callers must have closed the open time log first.
    pub fn submit(&self, task_id: &str) -> Result<WorkTask, ServiceError> {
        self.store.update_task(task_id, |task| {
            task.status = TaskStatus::Completed;
            task.docstatus = DocStatus::Submitted;
            task.actual_end_date = Some(now_rfc3339());
            Ok(())
        })
    }

    /// Draft tasks of the given operation in which this unit is not yet
    /// completed. The unit's own state list drives the lookup, so corrective
    /// re-runs of the same operation are found too.
    pub fn open_tasks_for_step(
        &self,
        unit: &ProductionUnit,
        operation: &str,
    ) -> Result<Vec<WorkTask>, ServiceError> {
        let mut tasks = Vec::new();
        for state in &unit.operation_states {
            if state.operation != operation || state.status == UnitStatus::Completed {
                continue;
            }
            let task = self.store.get_task(&state.task_ref)?;
            if task.docstatus == DocStatus::Draft {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Draft non-quality tasks, other than the one being scanned, in which
    /// this unit is currently in progress.
    pub fn other_open_tasks(
        &self,
        unit: &ProductionUnit,
        exclude_task_id: &str,
    ) -> Result<Vec<WorkTask>, ServiceError> {
        let mut tasks = Vec::new();
        for state in &unit.operation_states {
            if state.status != UnitStatus::InProgress
                || state.task_ref == exclude_task_id
                || state.operation == ops::QUALITY
            {
                continue;
            }
            let task = self.store.get_task(&state.task_ref)?;
            if task.docstatus == DocStatus::Draft {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Force-complete every other task in which this unit is still in
    /// progress. A new scan supersedes a forgotten close-out on a previous
    /// station; failures on individual tasks are logged and do not stop the
    /// current scan.
    pub fn force_complete_open_tasks(
        &self,
        unit: &ProductionUnit,
        exclude_task_id: &str,
    ) -> Result<(), ServiceError> {
        for task in self.other_open_tasks(unit, exclude_task_id)? {
            if let Err(e) = self.force_complete_one(&task, &unit.barcode) {
                tracing::error!(
                    task = %task.id,
                    operation = %task.operation,
                    error = %e,
                    "failed to force-complete open task"
                );
            }
        }
        Ok(())
    }

    fn force_complete_one(&self, task: &WorkTask, barcode: &str) -> Result<(), ServiceError> {
        let su = task.scan_unit(barcode).ok_or_else(|| {
            ServiceError::InvalidState(format!(
                "task '{}' has no scan unit for '{}'",
                task.id, barcode
            ))
        })?;
        let batch_no = su.batch_no;
        let members: Vec<ScanUnit> = task
            .units_in_batch(batch_no)
            .into_iter()
            .filter(|u| u.status == UnitStatus::InProgress)
            .cloned()
            .collect();
        if !members.is_empty() {
            self.complete_group(&task.id, &members)?;
        }

        if self.is_batch_complete(&task.id, batch_no)? {
            let closed = self.close_open_entry(&task.id, 1)?;
            if closed.is_fully_complete() {
                self.submit(&task.id)?;
            } else {
                self.set_status(&task.id, TaskStatus::OnHold, None, None)?;
            }
        } else {
            self.set_status(&task.id, TaskStatus::OnHold, None, None)?;
        }
        Ok(())
    }
}
