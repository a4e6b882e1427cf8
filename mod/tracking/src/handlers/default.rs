use mestra_core::ServiceError;

use crate::model::{ProductionUnit, ScanUnit, UnitStatus, WorkTask};

use super::{OperationHandler, ScanContext};

/// Default behaviour: all units of the scanned unit's virtual batch move
/// together.
pub struct GroupedHandler;

impl OperationHandler for GroupedHandler {
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

    fn pending_cascades(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{ScanStatus, StepFamily};
    use crate::model::{ops, DocStatus, TaskStatus, UnitModel};
    use crate::pipeline::StorePipeline;
    use crate::testutil::{seed_task, seed_unit, test_store};

    fn context(store: &crate::store::TrackingStore) -> ScanContext<'_> {
        ScanContext {
            store,
            employee: "emp-1",
            quality: None,
            pipeline: &StorePipeline,
        }
    }

    #[test]
    fn unknown_operation_falls_back_to_grouped() {
        assert_eq!(StepFamily::of("Sawing"), StepFamily::Grouped);
        assert_eq!(StepFamily::of(ops::GLAZING_BEAD), StepFamily::Grouped);
        assert_eq!(StepFamily::of(ops::CORNER_WELD), StepFamily::CornerWeld);
    }

    #[test]
    fn first_scan_starts_whole_batch() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let b = seed_unit(&store, "B", 1, UnitModel::Wing);
        let c = seed_unit(&store, "C", 2, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 2, &[&a, &b, &c]);

        let cx = context(&store);
        let unit = store.get_unit(&a.id).unwrap();
        let task = store.get_task(&task.id).unwrap();
        let outcome = GroupedHandler.handle(&cx, &task, &unit).unwrap();

        assert_eq!(outcome.status, ScanStatus::InProgress);
        assert_eq!(outcome.related_codes, vec!["A", "B"]);

        let task = store.get_task(&task.id).unwrap();
        assert_eq!(task.status, TaskStatus::WorkInProgress);
        assert_eq!(task.scan_unit("B").unwrap().status, UnitStatus::InProgress);
        assert_eq!(task.scan_unit("C").unwrap().status, UnitStatus::Pending);
        assert_eq!(task.time_logs.len(), 1);
    }

    #[test]
    fn second_scan_completes_batch_and_submits_when_done() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 1, &[&a]);
        let cx = context(&store);

        let unit = store.get_unit(&a.id).unwrap();
        GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();

        let unit = store.get_unit(&a.id).unwrap();
        let outcome = GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Completed);

        let task = store.get_task(&task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.docstatus, DocStatus::Submitted);
        assert_eq!(task.total_completed_qty(), 1);
        assert!(task.time_logs[0].to_time.is_some());
    }

    #[test]
    fn completing_one_batch_of_two_parks_the_task() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let b = seed_unit(&store, "B", 2, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 2, &[&a, &b]);
        let cx = context(&store);

        let unit = store.get_unit(&a.id).unwrap();
        GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();
        let unit = store.get_unit(&a.id).unwrap();
        GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();

        let task = store.get_task(&task.id).unwrap();
        // One piece booked, one batch to go.
        assert_eq!(task.status, TaskStatus::OnHold);
        assert_eq!(task.docstatus, DocStatus::Draft);
        assert_eq!(task.total_completed_qty(), 1);
        assert_eq!(task.scan_unit("B").unwrap().status, UnitStatus::Pending);
    }

    #[test]
    fn starting_a_new_batch_retires_the_active_one() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let b = seed_unit(&store, "B", 2, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 2, &[&a, &b]);
        let cx = context(&store);

        let unit_a = store.get_unit(&a.id).unwrap();
        GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit_a)
            .unwrap();

        // Scanning B while A's batch is active completes A and starts B.
        let unit_b = store.get_unit(&b.id).unwrap();
        let outcome = GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit_b)
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::InProgress);

        let task = store.get_task(&task.id).unwrap();
        assert_eq!(task.scan_unit("A").unwrap().status, UnitStatus::Completed);
        assert_eq!(task.scan_unit("B").unwrap().status, UnitStatus::InProgress);
        assert_eq!(task.total_completed_qty(), 1);
        assert_eq!(task.status, TaskStatus::WorkInProgress);
    }

    #[test]
    fn rescanning_a_completed_unit_reports_error() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 1, &[&a]);
        let cx = context(&store);

        for _ in 0..2 {
            let unit = store.get_unit(&a.id).unwrap();
            GroupedHandler
                .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
                .unwrap();
        }

        let unit = store.get_unit(&a.id).unwrap();
        let outcome = GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Error);
        // Idempotent: the task is untouched.
        let task = store.get_task(&task.id).unwrap();
        assert_eq!(task.total_completed_qty(), 1);
        assert_eq!(task.docstatus, DocStatus::Submitted);
    }

    #[test]
    fn completed_unit_rolls_forward_to_corrective_rerun() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 1, &[&a]);
        let cx = context(&store);

        for _ in 0..2 {
            let unit = store.get_unit(&a.id).unwrap();
            GroupedHandler
                .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
                .unwrap();
        }

        // A corrective re-run of the same operation exists.
        let unit = store.get_unit(&a.id).unwrap();
        let rerun = seed_task(&store, ops::GLAZING_BEAD, 1, &[&unit]);

        let unit = store.get_unit(&a.id).unwrap();
        let outcome = GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::InProgress);
        assert_eq!(outcome.task_ref, rerun.id);

        let rerun = store.get_task(&rerun.id).unwrap();
        assert_eq!(rerun.scan_unit("A").unwrap().status, UnitStatus::InProgress);
    }

    #[test]
    fn cancelled_task_is_rejected() {
        let store = test_store();
        let a = seed_unit(&store, "A", 1, UnitModel::Frame);
        let task = seed_task(&store, ops::GLAZING_BEAD, 1, &[&a]);
        store
            .update_task(&task.id, |t| {
                t.docstatus = DocStatus::Cancelled;
                Ok(())
            })
            .unwrap();

        let cx = context(&store);
        let unit = store.get_unit(&a.id).unwrap();
        let err = GroupedHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
