use mestra_core::ServiceError;

use crate::model::{ProductionUnit, ScanUnit, UnitModel, UnitStatus, WorkTask};

use super::{OperationHandler, ScanContext};

/// Wing preparation: only wings are scanned here. A wing moves together with
/// the wings parked on the same cart slot, and drags the batch's frames and
/// registers along since they are mounted in the same step.
pub struct WingPrepHandler;

impl OperationHandler for WingPrepHandler {
    fn related_units(
        &self,
        cx: &ScanContext,
        task: &WorkTask,
        current: &ScanUnit,
        unit: &ProductionUnit,
    ) -> Result<Vec<ScanUnit>, ServiceError> {
        if current.model != UnitModel::Wing {
            return Err(ServiceError::InvalidState(format!(
                "'{}' is not a wing; only wings are scanned at {}",
                unit.barcode, task.operation
            )));
        }

        let mut related = Vec::new();
        for su in task.units_in_batch(current.batch_no) {
            if su.status == UnitStatus::Completed {
                continue;
            }
            match su.model {
                UnitModel::Wing => {
                    let other = cx.store.get_unit(&su.unit_ref)?;
                    if other.cart_no == unit.cart_no && other.slot_no == unit.slot_no {
                        related.push(su.clone());
                    }
                }
                UnitModel::Frame | UnitModel::Register => related.push(su.clone()),
                _ => {}
            }
        }
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ScanStatus;
    use crate::model::ops;
    use crate::pipeline::StorePipeline;
    use crate::store::TrackingStore;
    use crate::testutil::{seed_task, test_store, unit_fixture};

    fn seed_slotted(
        store: &TrackingStore,
        barcode: &str,
        model: UnitModel,
        cart: Option<u32>,
        slot: Option<u32>,
    ) -> ProductionUnit {
        let mut unit = unit_fixture(barcode, 1, model);
        unit.cart_no = cart;
        unit.slot_no = slot;
        store.insert_unit(&mut unit).unwrap();
        unit
    }

    #[test]
    fn wing_pulls_its_slot_and_the_batch_profiles() {
        let store = test_store();
        let w1 = seed_slotted(&store, "W1", UnitModel::Wing, Some(3), Some(7));
        let w2 = seed_slotted(&store, "W2", UnitModel::Wing, Some(3), Some(7));
        let w3 = seed_slotted(&store, "W3", UnitModel::Wing, Some(3), Some(8));
        let f1 = seed_slotted(&store, "F1", UnitModel::Frame, None, None);
        let r1 = seed_slotted(&store, "R1", UnitModel::Register, None, None);
        let task = seed_task(&store, ops::WING_PREP, 1, &[&w1, &w2, &w3, &f1, &r1]);

        let cx = ScanContext {
            store: &store,
            employee: "emp-1",
            quality: None,
            pipeline: &StorePipeline,
        };
        let unit = store.get_unit(&w1.id).unwrap();
        let outcome = WingPrepHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap();

        assert_eq!(outcome.status, ScanStatus::InProgress);
        assert_eq!(outcome.related_codes, vec!["W1", "W2", "F1", "R1"]);

        let task = store.get_task(&task.id).unwrap();
        // The wing on the other slot stays behind.
        assert_eq!(task.scan_unit("W3").unwrap().status, UnitStatus::Pending);
        assert_eq!(task.scan_unit("F1").unwrap().status, UnitStatus::InProgress);
    }

    #[test]
    fn non_wing_scan_is_rejected() {
        let store = test_store();
        let f1 = seed_slotted(&store, "F1", UnitModel::Frame, None, None);
        let task = seed_task(&store, ops::WING_PREP, 1, &[&f1]);

        let cx = ScanContext {
            store: &store,
            employee: "emp-1",
            quality: None,
            pipeline: &StorePipeline,
        };
        let unit = store.get_unit(&f1.id).unwrap();
        let err = WingPrepHandler
            .handle(&cx, &store.get_task(&task.id).unwrap(), &unit)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
