use mestra_core::ServiceError;

use crate::model::{DocStatus, ProductionUnit, QualityAssessment, WorkTask};
use crate::pipeline::TaskCreationPipeline;
use crate::store::TrackingStore;

/// Creates corrective re-run tasks from a failed quality assessment.
pub struct CorrectionSpawner<'a> {
    store: &'a TrackingStore,
    pipeline: &'a dyn TaskCreationPipeline,
}

impl<'a> CorrectionSpawner<'a> {
    pub fn new(store: &'a TrackingStore, pipeline: &'a dyn TaskCreationPipeline) -> Self {
        Self { store, pipeline }
    }

    /// Spawn one corrective task per required operation, ordered by
    /// priority. Each re-runs the original task of that operation, restricted
    /// to the failing unit's virtual batch. Returns the new task ids in
    /// execution order.
    pub fn spawn(
        &self,
        quality_task: &WorkTask,
        unit: &ProductionUnit,
        assessment: &QualityAssessment,
    ) -> Result<Vec<String>, ServiceError> {
        let mut operations = assessment.required_operations.clone();
        operations.sort_by_key(|op| op.priority);

        let mut created = Vec::with_capacity(operations.len());
        for op in &operations {
            let origin = self
                .store
                .tasks_for(&op.operation, &quality_task.production_item)?
                .into_iter()
                .find(|t| t.docstatus != DocStatus::Cancelled)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "no original task for operation '{}' on '{}'",
                        op.operation, quality_task.production_item
                    ))
                })?;

            let mut task = WorkTask {
                id: String::new(),
                operation: op.operation.clone(),
                production_item: quality_task.production_item.clone(),
                docstatus: DocStatus::Draft,
                status: Default::default(),
                for_quantity: 1,
                scan_units: vec![],
                time_logs: vec![],
                scheduled_time_logs: vec![],
                is_corrective: true,
                for_task: Some(origin.id.clone()),
                quality_task: Some(quality_task.id.clone()),
                target_batch_no: Some(unit.batch_no),
                remarks: Some(
                    op.description
                        .clone()
                        .unwrap_or_else(|| op.reason.clone()),
                ),
                actual_start_date: None,
                actual_end_date: None,
                expected_start_date: None,
                expected_end_date: None,
                version: 0,
                create_at: None,
                update_at: None,
            };
            self.store.insert_task(&mut task)?;
            self.pipeline.attach_units(self.store, &task)?;

            tracing::info!(
                task = %task.id,
                operation = %task.operation,
                for_task = %origin.id,
                batch = unit.batch_no,
                "created corrective task"
            );
            created.push(task.id);
        }
        Ok(created)
    }
}
