use mestra_core::{now_rfc3339, ServiceError};

use crate::correction::CorrectionSpawner;
use crate::engine::Completion;
use crate::model::{
    ops, ProductionUnit, QualityAssessment, ScanUnit, TaskStatus, UnitStatus, WorkTask,
};

use super::{
    current_scan_unit, ensure_scannable, start_batch, OperationHandler, ScanContext, ScanOutcome,
};

/// Quality control: the first scan opens an inspection on the unit's batch,
/// the second closes it with the inspector's assessment. A failed assessment
/// spawns corrective re-run tasks and parks the batch in correction.
pub struct QualityHandler;

impl QualityHandler {
    /// Batch members currently under inspection.
    fn inspected_members(task: &WorkTask, batch_no: u32) -> Vec<ScanUnit> {
        task.units_in_batch(batch_no)
            .into_iter()
            .filter(|u| u.status == UnitStatus::InProgress)
            .cloned()
            .collect()
    }

    fn pass(
        &self,
        cx: &ScanContext,
        task: &WorkTask,
        batch_no: u32,
        assessment: &QualityAssessment,
    ) -> Result<ScanOutcome, ServiceError> {
        let engine = Completion::new(cx.store);
        let members = Self::inspected_members(task, batch_no);
        engine.complete_group(&task.id, &members)?;
        cx.store
            .add_task_note(&task.id, &assessment.audit_note(true, &now_rfc3339()))?;

        if engine.is_batch_complete(&task.id, batch_no)? {
            let closed = engine.close_open_entry(&task.id, 1)?;
            if closed.is_fully_complete() {
                engine.submit(&task.id)?;
            } else {
                engine.set_status(&task.id, TaskStatus::OnHold, None, None)?;
            }
        } else {
            engine.set_status(&task.id, TaskStatus::OnHold, None, None)?;
        }

        let mut outcome =
            ScanOutcome::completed(format!("batch {batch_no} passed inspection"), &task.id);
        outcome.related_codes = members.iter().map(|u| u.code.clone()).collect();
        outcome.quality = Some(assessment.clone());
        outcome.quality_status = Some("passed".to_string());
        Ok(outcome)
    }

    fn fail(
        &self,
        cx: &ScanContext,
        task: &WorkTask,
        unit: &ProductionUnit,
        batch_no: u32,
        assessment: &QualityAssessment,
    ) -> Result<ScanOutcome, ServiceError> {
        if assessment.required_operations.is_empty() {
            return Err(ServiceError::Validation(
                "correction operations are required when a quality check fails".to_string(),
            ));
        }

        let created = CorrectionSpawner::new(cx.store, cx.pipeline)
            .spawn(task, unit, assessment)?;

        let members = Self::inspected_members(task, batch_no);
        let stored = serde_json::to_string(assessment)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        for member in &members {
            cx.store.update_unit(&member.unit_ref, |u| {
                if !u.set_op_status(&task.id, UnitStatus::InCorrection) {
                    return Err(ServiceError::InvalidState(format!(
                        "unit '{}' has no state for task '{}'",
                        u.barcode, task.id
                    )));
                }
                Ok(())
            })?;
        }
        cx.store.update_task(&task.id, |t| {
            for member in &members {
                if let Some(su) = t.scan_unit_mut(&member.code) {
                    su.status = UnitStatus::InCorrection;
                    su.quality_data = Some(stored.clone());
                }
            }
            Ok(())
        })?;

        let engine = Completion::new(cx.store);
        engine.set_status(
            &task.id,
            TaskStatus::OnHold,
            None,
            Some("quality inspection failed"),
        )?;
        cx.store
            .add_task_note(&task.id, &assessment.audit_note(false, &now_rfc3339()))?;

        tracing::warn!(
            task = %task.id,
            batch = batch_no,
            corrections = created.len(),
            "quality inspection failed"
        );

        let mut outcome = ScanOutcome::failed(
            format!("batch {batch_no} failed inspection, corrections created"),
            &task.id,
        );
        outcome.related_codes = members.iter().map(|u| u.code.clone()).collect();
        outcome.correction_tasks = created;
        outcome.quality = Some(assessment.clone());
        outcome.quality_status = Some("failed".to_string());
        Ok(outcome)
    }

    /// Every earlier operation recorded on the unit must be completed before
    /// it can be inspected.
    fn ensure_previous_steps_done(&self, unit: &ProductionUnit) -> Result<(), ServiceError> {
        let open: Vec<&str> = unit
            .operation_states
            .iter()
            .filter(|s| {
                s.operation != ops::QUALITY
                    && s.operation != ops::SHIPPING
                    && s.status != UnitStatus::Completed
            })
            .map(|s| s.operation.as_str())
            .collect();
        if open.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::InvalidState(format!(
                "'{}' has unfinished operations: {}",
                unit.barcode,
                open.join(", ")
            )))
        }
    }
}

impl OperationHandler for QualityHandler {
    fn related_units(
        &self,
        _cx: &ScanContext,
        task: &WorkTask,
        current: &ScanUnit,
        _unit: &ProductionUnit,
    ) -> Result<Vec<ScanUnit>, ServiceError> {
        Ok(task
            .units_in_batch(current.batch_no)
            .into_iter()
            .filter(|u| u.status != UnitStatus::Completed)
            .cloned()
            .collect())
    }

    fn handle(
        &self,
        cx: &ScanContext,
        task: &WorkTask,
        unit: &ProductionUnit,
    ) -> Result<ScanOutcome, ServiceError> {
        ensure_scannable(task)?;
        let current = current_scan_unit(task, unit)?;

        match current.status {
            UnitStatus::Completed => {
                let mut outcome = ScanOutcome::error(
                    format!("'{}' already passed inspection", unit.barcode),
                    &task.id,
                );
                if let Some(data) = &current.quality_data {
                    outcome.quality = serde_json::from_str(data).ok();
                }
                Ok(outcome)
            }
            UnitStatus::InProgress => {
                let assessment = cx.quality.ok_or_else(|| {
                    ServiceError::Validation(
                        "a quality assessment is required to close an inspection".to_string(),
                    )
                })?;
                self.ensure_previous_steps_done(unit)?;
                if assessment.has_failures() {
                    self.fail(cx, task, unit, current.batch_no, assessment)
                } else {
                    self.pass(cx, task, current.batch_no, assessment)
                }
            }
            UnitStatus::Pending | UnitStatus::InCorrection => {
                let was_in_correction = current.status == UnitStatus::InCorrection;
                let fresh = cx.store.get_task(&task.id)?;
                if !fresh.in_progress_units().is_empty() {
                    return Err(ServiceError::InvalidState(format!(
                        "task '{}' already has an open inspection",
                        task.id
                    )));
                }

                let unfinished: Vec<String> = cx
                    .store
                    .open_tasks_for_item(&task.production_item, ops::QUALITY)?
                    .into_iter()
                    .filter(|t| t.operation != ops::SHIPPING)
                    .map(|t| t.operation)
                    .collect();
                if !unfinished.is_empty() {
                    return Err(ServiceError::InvalidState(format!(
                        "cannot inspect while operations are unfinished: {}",
                        unfinished.join(", ")
                    )));
                }

                let related = self.related_units(cx, task, current, unit)?;
                let mut outcome = start_batch(cx, &task.id, &related)?;
                outcome.message = "inspection started".to_string();
                if was_in_correction {
                    if let Some(data) = &current.quality_data {
                        outcome.quality = serde_json::from_str(data).ok();
                        outcome.quality_status = Some("failed".to_string());
                    }
                }
                Ok(outcome)
            }
        }
    }
}
