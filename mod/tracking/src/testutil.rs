//! Shared in-memory fixtures for unit tests.

use std::sync::Arc;

use sql::SqliteStore;

use crate::model::{ProductionUnit, ScanUnit, UnitModel, WorkTask};
use crate::store::TrackingStore;

pub fn test_store() -> TrackingStore {
    let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
    TrackingStore::new(sql).unwrap()
}

/// A unit on order S2026-044 poz 2, not yet persisted.
pub fn unit_fixture(barcode: &str, batch_no: u32, model: UnitModel) -> ProductionUnit {
    ProductionUnit {
        id: String::new(),
        barcode: barcode.to_string(),
        order_no: "S2026-044".to_string(),
        poz_no: 2,
        batch_no,
        model,
        cart_no: None,
        slot_no: None,
        glass_stock: None,
        operation_states: vec![],
        version: 0,
        create_at: None,
        update_at: None,
    }
}

pub fn seed_unit(
    store: &TrackingStore,
    barcode: &str,
    batch_no: u32,
    model: UnitModel,
) -> ProductionUnit {
    let mut unit = unit_fixture(barcode, batch_no, model);
    store.insert_unit(&mut unit).unwrap();
    unit
}

/// Insert a draft task covering the given units and attach the matching
/// operation state to each unit. Returns the task as inserted; callers
/// should reload units they keep using.
pub fn seed_task(
    store: &TrackingStore,
    operation: &str,
    for_quantity: u32,
    units: &[&ProductionUnit],
) -> WorkTask {
    let mut task = WorkTask {
        id: String::new(),
        operation: operation.to_string(),
        production_item: units
            .first()
            .map(|u| u.production_item())
            .unwrap_or_else(|| "S2026-044-2".to_string()),
        docstatus: Default::default(),
        status: Default::default(),
        for_quantity,
        scan_units: units
            .iter()
            .map(|u| ScanUnit {
                code: u.barcode.clone(),
                model: u.model,
                batch_no: u.batch_no,
                status: Default::default(),
                unit_ref: u.id.clone(),
                quality_data: None,
            })
            .collect(),
        time_logs: vec![],
        scheduled_time_logs: vec![],
        is_corrective: false,
        for_task: None,
        quality_task: None,
        target_batch_no: None,
        remarks: None,
        actual_start_date: None,
        actual_end_date: None,
        expected_start_date: None,
        expected_end_date: None,
        version: 0,
        create_at: None,
        update_at: None,
    };
    store.insert_task(&mut task).unwrap();

    for unit in units {
        store
            .update_unit(&unit.id, |u| {
                u.attach_op_state(operation, &task.id, false);
                Ok(())
            })
            .unwrap();
    }
    task
}
