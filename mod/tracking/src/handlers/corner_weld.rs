use mestra_core::ServiceError;

use crate::model::{ProductionUnit, ScanUnit, UnitStatus, WorkTask};

use super::{OperationHandler, ScanContext};

/// Corner weld cleaning: frames and wings are welded on separate machines,
/// so only units of the scanned unit's model move with it.
pub struct CornerWeldHandler;

impl OperationHandler for CornerWeldHandler {
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
            .filter(|u| u.model == current.model && u.status != UnitStatus::Completed)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ScanStatus;
    use crate::model::{ops, UnitModel};
    use crate::pipeline::StorePipeline;
    use crate::testutil::{seed_task, seed_unit, test_store};

    #[test]
    fn only_same_model_units_move_together() {
        let store = test_store();
        let f1 = seed_unit(&store, "F1", 1, UnitModel::Frame);
        let f2 = seed_unit(&store, "F2", 1, UnitModel::Frame);
        let w1 = seed_unit(&store, "W1", 1, UnitModel::Wing);
        let task = seed_task(&store, ops::CORNER_WELD, 1, &[&f1, &f2, &w1]);

        let cx = ScanContext {
            store: &store,
            employee: "emp-1",
            quality: None,
            pipeline: &StorePipeline,
        };
        let unit = store.get_unit(&f1.id).unwrap();
        let outcome = CornerWeldHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();

        assert_eq!(outcome.status, ScanStatus::InProgress);
        assert_eq!(outcome.related_codes, vec!["F1", "F2"]);

        let task = store.get_task(&task.id).unwrap();
        assert_eq!(task.scan_unit("F2").unwrap().status, UnitStatus::InProgress);
        assert_eq!(task.scan_unit("W1").unwrap().status, UnitStatus::Pending);
    }

    #[test]
    fn batch_needs_both_models_to_complete() {
        let store = test_store();
        let f1 = seed_unit(&store, "F1", 1, UnitModel::Frame);
        let w1 = seed_unit(&store, "W1", 1, UnitModel::Wing);
        let task = seed_task(&store, ops::CORNER_WELD, 1, &[&f1, &w1]);
        let cx = ScanContext {
            store: &store,
            employee: "emp-1",
            quality: None,
            pipeline: &StorePipeline,
        };

        // Frame side: start and finish.
        for _ in 0..2 {
            let unit = store.get_unit(&f1.id).unwrap();
            CornerWeldHandler
                .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
                .unwrap();
        }
        let t = store.get_task(&task.id).unwrap();
        assert_eq!(t.scan_unit("F1").unwrap().status, UnitStatus::Completed);
        assert_eq!(t.total_completed_qty(), 0);

        // Wing side closes out the batch.
        for _ in 0..2 {
            let unit = store.get_unit(&w1.id).unwrap();
            CornerWeldHandler
                .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
                .unwrap();
        }
        let t = store.get_task(&task.id).unwrap();
        assert!(t.is_fully_complete());
        assert_eq!(t.status, crate::model::TaskStatus::Completed);
    }
}
