use mestra_core::ServiceError;

use crate::model::ScanUnit;
use crate::store::TrackingStore;

/// Hook run after a new (corrective) task document is created, responsible
/// for populating its scan units and the units' operation states.
pub trait TaskCreationPipeline: Send + Sync {
    fn attach_units(
        &self,
        store: &TrackingStore,
        task: &crate::model::WorkTask,
    ) -> Result<(), ServiceError>;
}

/// Default pipeline: attach every unit of the task's production item,
/// restricted to the task's target batch when one is set.
pub struct StorePipeline;

impl TaskCreationPipeline for StorePipeline {
    fn attach_units(
        &self,
        store: &TrackingStore,
        task: &crate::model::WorkTask,
    ) -> Result<(), ServiceError> {
        let mut units = store.units_for_item(&task.production_item)?;
        if let Some(batch) = task.target_batch_no {
            units.retain(|u| u.batch_no == batch);
        }

        store.update_task(&task.id, |t| {
            for unit in &units {
                if t.scan_unit(&unit.barcode).is_some() {
                    continue;
                }
                t.scan_units.push(ScanUnit {
                    code: unit.barcode.clone(),
                    model: unit.model,
                    batch_no: unit.batch_no,
                    status: Default::default(),
                    unit_ref: unit.id.clone(),
                    quality_data: None,
                });
            }
            Ok(())
        })?;

        for unit in &units {
            store.update_unit(&unit.id, |u| {
                u.attach_op_state(&task.operation, &task.id, task.is_corrective);
                Ok(())
            })?;
        }
        Ok(())
    }
}
