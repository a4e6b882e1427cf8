use serde::{Deserialize, Serialize};

use mestra_core::ServiceError;

use crate::handlers::{ScanContext, ScanOutcome, ScanStatus, StepFamily};
use crate::model::{DocStatus, ProductionUnit, QualityAssessment, UnitModel, UnitStatus, WorkTask};
use crate::pipeline::TaskCreationPipeline;
use crate::positions::PositionSummaryProvider;
use crate::snapshot::TaskSnapshot;
use crate::store::TrackingStore;

/// One scan from a station terminal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub barcode: String,
    pub employee: String,
    pub operation: String,

    /// Inspector's assessment, required when closing a quality inspection.
    #[serde(default)]
    pub quality: Option<QualityAssessment>,

    // Disambiguators for codes reused across orders.
    #[serde(default)]
    pub order_no: Option<String>,
    #[serde(default)]
    pub poz_no: Option<u32>,
    #[serde(default)]
    pub batch_no: Option<u32>,
}

/// One candidate when a code matches several units.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOption {
    pub unit_ref: String,
    pub order_no: String,
    pub poz_no: u32,
    pub batch_no: u32,
    pub model: UnitModel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub status: ScanStatus,
    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_codes: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub correction_tasks: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityAssessment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_status: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<UnitOption>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskSnapshot>,
}

/// Entry point for scan processing: resolves the scanned code to a unit and
/// a task, then dispatches to the operation's step family.
pub struct TrackingService {
    store: TrackingStore,
    positions: Box<dyn PositionSummaryProvider>,
    pipeline: Box<dyn TaskCreationPipeline>,
}

impl TrackingService {
    pub fn new(
        store: TrackingStore,
        positions: Box<dyn PositionSummaryProvider>,
        pipeline: Box<dyn TaskCreationPipeline>,
    ) -> Self {
        Self {
            store,
            positions,
            pipeline,
        }
    }

    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    pub fn process_scan(&self, req: &ScanRequest) -> Result<ScanResponse, ServiceError> {
        if req.barcode.trim().is_empty() {
            return Err(ServiceError::Validation("barcode is required".to_string()));
        }
        if req.employee.trim().is_empty() {
            return Err(ServiceError::Validation("employee is required".to_string()));
        }
        if req.operation.trim().is_empty() {
            return Err(ServiceError::Validation("operation is required".to_string()));
        }

        let units = self.store.find_units_by_barcode(
            &req.barcode,
            req.order_no.as_deref(),
            req.poz_no,
            req.batch_no,
        )?;
        if units.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no production unit matches '{}'",
                req.barcode
            )));
        }
        if units.len() > 1 {
            return Ok(Self::multiple_options(&req.barcode, &units));
        }
        let unit = &units[0];

        let task = self.resolve_task(unit, &req.operation)?;
        let cx = ScanContext {
            store: &self.store,
            employee: &req.employee,
            quality: req.quality.as_ref(),
            pipeline: self.pipeline.as_ref(),
        };
        let outcome = StepFamily::of(&req.operation).handler().handle(&cx, &task, unit)?;

        tracing::info!(
            barcode = %req.barcode,
            operation = %req.operation,
            employee = %req.employee,
            task = %outcome.task_ref,
            status = ?outcome.status,
            "scan processed"
        );

        let snapshot = TaskSnapshot::from_task(&self.store.get_task(&outcome.task_ref)?);
        let position = self.positions.position_summary(&req.barcode)?;
        Ok(Self::respond(outcome, Some(snapshot), position))
    }

    /// Pick the task this scan applies to: the freshest draft task of the
    /// operation in which the unit is not yet done, falling back to the
    /// freshest task containing the unit at all (so re-scans of finished
    /// units still get the idempotent answer).
    fn resolve_task(
        &self,
        unit: &ProductionUnit,
        operation: &str,
    ) -> Result<WorkTask, ServiceError> {
        let tasks = self.store.tasks_for(operation, &unit.production_item())?;
        if let Some(open) = tasks.iter().find(|t| {
            t.docstatus == DocStatus::Draft
                && t.scan_unit(&unit.barcode)
                    .map(|su| su.status != UnitStatus::Completed)
                    .unwrap_or(false)
        }) {
            return Ok(open.clone());
        }
        tasks
            .into_iter()
            .find(|t| t.scan_unit(&unit.barcode).is_some())
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no {} task covers '{}'",
                    operation, unit.barcode
                ))
            })
    }

    fn multiple_options(barcode: &str, units: &[ProductionUnit]) -> ScanResponse {
        ScanResponse {
            status: ScanStatus::MultipleOptions,
            message: format!("'{barcode}' matches {} units, pick one", units.len()),
            related_codes: vec![],
            correction_tasks: vec![],
            quality: None,
            quality_status: None,
            options: units
                .iter()
                .map(|u| UnitOption {
                    unit_ref: u.id.clone(),
                    order_no: u.order_no.clone(),
                    poz_no: u.poz_no,
                    batch_no: u.batch_no,
                    model: u.model,
                })
                .collect(),
            position: None,
            task: None,
        }
    }

    fn respond(
        outcome: ScanOutcome,
        task: Option<TaskSnapshot>,
        position: Option<serde_json::Value>,
    ) -> ScanResponse {
        ScanResponse {
            status: outcome.status,
            message: outcome.message,
            related_codes: outcome.related_codes,
            correction_tasks: outcome.correction_tasks,
            quality: outcome.quality,
            quality_status: outcome.quality_status,
            options: vec![],
            position,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ops, TaskStatus, UnitModel};
    use crate::pipeline::StorePipeline;
    use crate::positions::NoPositionData;
    use crate::testutil::{seed_task, seed_unit, test_store, unit_fixture};

    fn service() -> TrackingService {
        TrackingService::new(test_store(), Box::new(NoPositionData), Box::new(StorePipeline))
    }

    fn scan(barcode: &str, operation: &str) -> ScanRequest {
        ScanRequest {
            barcode: barcode.to_string(),
            employee: "emp-1".to_string(),
            operation: operation.to_string(),
            quality: None,
            order_no: None,
            poz_no: None,
            batch_no: None,
        }
    }

    #[test]
    fn rejects_blank_fields() {
        let svc = service();
        let err = svc.process_scan(&scan("", ops::GLAZING_BEAD)).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let mut req = scan("A", ops::GLAZING_BEAD);
        req.employee = "  ".into();
        assert!(matches!(
            svc.process_scan(&req).unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let svc = service();
        let err = svc.process_scan(&scan("NOPE", ops::GLAZING_BEAD)).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn ambiguous_code_returns_options() {
        let svc = service();
        seed_unit(svc.store(), "DUP", 1, UnitModel::Frame);
        let mut other = unit_fixture("DUP", 1, UnitModel::Frame);
        other.order_no = "S2026-099".into();
        svc.store().insert_unit(&mut other).unwrap();

        let resp = svc.process_scan(&scan("DUP", ops::GLAZING_BEAD)).unwrap();
        assert_eq!(resp.status, ScanStatus::MultipleOptions);
        assert_eq!(resp.options.len(), 2);
        assert!(resp.task.is_none());

        // A disambiguator narrows it down, but the task is still missing.
        let mut req = scan("DUP", ops::GLAZING_BEAD);
        req.order_no = Some("S2026-099".into());
        assert!(matches!(
            svc.process_scan(&req).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn scan_runs_the_step_and_returns_a_snapshot() {
        let svc = service();
        let a = seed_unit(svc.store(), "A", 1, UnitModel::Frame);
        let task = seed_task(svc.store(), ops::GLAZING_BEAD, 1, &[&a]);

        let resp = svc.process_scan(&scan("A", ops::GLAZING_BEAD)).unwrap();
        assert_eq!(resp.status, ScanStatus::InProgress);
        let snap = resp.task.unwrap();
        assert_eq!(snap.id, task.id);
        assert_eq!(snap.status, TaskStatus::WorkInProgress);
        assert_eq!(snap.scan_units[0].idx, 1);
        assert_eq!(snap.scan_units[0].status, crate::model::UnitStatus::InProgress);

        let resp = svc.process_scan(&scan("A", ops::GLAZING_BEAD)).unwrap();
        assert_eq!(resp.status, ScanStatus::Completed);
        assert_eq!(resp.task.unwrap().total_completed_qty, 1);
    }

    #[test]
    fn resolve_prefers_the_open_rerun() {
        let svc = service();
        let a = seed_unit(svc.store(), "A", 1, UnitModel::Frame);
        let done = seed_task(svc.store(), ops::GLAZING_BEAD, 1, &[&a]);
        svc.process_scan(&scan("A", ops::GLAZING_BEAD)).unwrap();
        svc.process_scan(&scan("A", ops::GLAZING_BEAD)).unwrap();

        let a = svc.store().get_unit(&a.id).unwrap();
        let rerun = seed_task(svc.store(), ops::GLAZING_BEAD, 1, &[&a]);

        let resp = svc.process_scan(&scan("A", ops::GLAZING_BEAD)).unwrap();
        assert_eq!(resp.status, ScanStatus::InProgress);
        let snap = resp.task.unwrap();
        assert_eq!(snap.id, rerun.id);
        assert_ne!(snap.id, done.id);
    }
}
