use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use mestra_core::{new_id, now_rfc3339, ListParams, ListResult, ServiceError};
use sql::{SQLStore, Value};

use crate::model::{DocStatus, ProductionUnit, WorkTask};

/// Bounded retry budget for optimistic saves. Reload is immediate, so no
/// backoff between attempts.
pub const MAX_SAVE_ATTEMPTS: u32 = 3;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS work_tasks (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    operation TEXT NOT NULL,
    production_item TEXT NOT NULL,
    status TEXT NOT NULL,
    docstatus TEXT NOT NULL,
    update_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_work_tasks_item
    ON work_tasks (operation, production_item);

CREATE TABLE IF NOT EXISTS production_units (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    barcode TEXT NOT NULL,
    production_item TEXT NOT NULL,
    batch_no INTEGER NOT NULL,
    update_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_production_units_barcode
    ON production_units (barcode);

CREATE TABLE IF NOT EXISTS task_notes (
    id TEXT PRIMARY KEY,
    task_ref TEXT NOT NULL,
    content TEXT NOT NULL,
    create_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_notes_task
    ON task_notes (task_ref);
";

/// A permanent audit note attached to a work task.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNote {
    pub id: String,
    pub task_ref: String,
    pub content: String,
    pub create_at: String,
}

/// Filters for the task listing endpoint.
#[derive(Debug, Default)]
pub struct TaskFilters {
    pub operation: Option<String>,
    pub production_item: Option<String>,
    pub status: Option<String>,
}

/// Document store for work tasks and production units.
///
/// Records are stored as a JSON `data` column plus indexed scalar columns.
/// All saves are version-checked; concurrent scans racing on the same
/// record are resolved by the reload-and-retry wrappers.
pub struct TrackingStore {
    sql: Arc<dyn SQLStore>,
}

impl TrackingStore {
    pub fn new(sql: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        sql.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(Self { sql })
    }

    // ── Work tasks ──

    pub fn insert_task(&self, task: &mut WorkTask) -> Result<(), ServiceError> {
        if task.id.is_empty() {
            task.id = new_id();
        }
        let now = now_rfc3339();
        task.version = 1;
        task.create_at = Some(now.clone());
        task.update_at = Some(now.clone());

        let data = to_json(task)?;
        self.sql
            .exec(
                "INSERT INTO work_tasks
                 (id, data, version, operation, production_item, status, docstatus, update_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                &[
                    Value::from(task.id.as_str()),
                    Value::from(data),
                    Value::Integer(1),
                    Value::from(task.operation.as_str()),
                    Value::from(task.production_item.as_str()),
                    enum_text(&task.status)?,
                    enum_text(&task.docstatus)?,
                    Value::from(now),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<WorkTask, ServiceError> {
        let row = self
            .sql
            .query_one(
                "SELECT data FROM work_tasks WHERE id = ?1",
                &[Value::from(id)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("work task '{id}' not found")))?;
        from_json(row.get_str("data"))
    }

    /// Save a task, checking the version it was loaded at. On success the
    /// in-memory version is bumped to match the stored row.
    pub fn save_task(&self, task: &mut WorkTask) -> Result<(), ServiceError> {
        let expected = task.version;
        task.version = expected + 1;
        task.update_at = Some(now_rfc3339());
        let data = to_json(task)?;

        let affected = self
            .sql
            .exec(
                "UPDATE work_tasks
                 SET data = ?1, version = ?2, operation = ?3, production_item = ?4,
                     status = ?5, docstatus = ?6, update_at = ?7
                 WHERE id = ?8 AND version = ?9",
                &[
                    Value::from(data),
                    Value::Integer(task.version as i64),
                    Value::from(task.operation.as_str()),
                    Value::from(task.production_item.as_str()),
                    enum_text(&task.status)?,
                    enum_text(&task.docstatus)?,
                    Value::from(task.update_at.clone().unwrap_or_default()),
                    Value::from(task.id.as_str()),
                    Value::Integer(expected as i64),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        if affected == 0 {
            task.version = expected;
            return Err(self.stale_save_error("work_tasks", "work task", &task.id)?);
        }
        Ok(())
    }

    /// Retry-with-reload wrapper: load the task fresh, apply the mutation,
    /// save with a version check; on a stale save, reload and retry up to
    /// [`MAX_SAVE_ATTEMPTS`] times. Returns the task as persisted.
    pub fn update_task<F>(&self, id: &str, mut apply: F) -> Result<WorkTask, ServiceError>
    where
        F: FnMut(&mut WorkTask) -> Result<(), ServiceError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut task = self.get_task(id)?;
            apply(&mut task)?;
            match self.save_task(&mut task) {
                Ok(()) => return Ok(task),
                Err(ServiceError::Conflict(msg)) => {
                    if attempt >= MAX_SAVE_ATTEMPTS {
                        return Err(ServiceError::Conflict(msg));
                    }
                    tracing::debug!(task = id, attempt, "stale task save, reloading");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// All tasks for (operation, production item), most recently updated
    /// first.
    pub fn tasks_for(
        &self,
        operation: &str,
        production_item: &str,
    ) -> Result<Vec<WorkTask>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT data FROM work_tasks
                 WHERE operation = ?1 AND production_item = ?2
                 ORDER BY update_at DESC",
                &[Value::from(operation), Value::from(production_item)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get_str("data"))).collect()
    }

    /// Open (non-cancelled, non-completed) non-quality tasks for a
    /// production item, used by the quality handler's entry check.
    pub fn open_tasks_for_item(
        &self,
        production_item: &str,
        exclude_operation: &str,
    ) -> Result<Vec<WorkTask>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT data FROM work_tasks
                 WHERE production_item = ?1 AND operation != ?2
                   AND docstatus != 'CANCELLED' AND status != 'COMPLETED'
                 ORDER BY update_at DESC",
                &[Value::from(production_item), Value::from(exclude_operation)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get_str("data"))).collect()
    }

    pub fn list_tasks(
        &self,
        filters: &TaskFilters,
        params: &ListParams,
    ) -> Result<ListResult<WorkTask>, ServiceError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Value> = Vec::new();
        if let Some(ref op) = filters.operation {
            args.push(Value::from(op.as_str()));
            clauses.push(format!("operation = ?{}", args.len()));
        }
        if let Some(ref item) = filters.production_item {
            args.push(Value::from(item.as_str()));
            clauses.push(format!("production_item = ?{}", args.len()));
        }
        if let Some(ref status) = filters.status {
            args.push(Value::from(status.as_str()));
            clauses.push(format!("status = ?{}", args.len()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let count_rows = self
            .sql
            .query(
                &format!("SELECT COUNT(*) AS cnt FROM work_tasks{where_sql}"),
                &args,
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let total = count_rows
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        args.push(Value::Integer(params.limit.min(500) as i64));
        let limit_idx = args.len();
        args.push(Value::Integer(params.offset as i64));
        let offset_idx = args.len();

        let rows = self
            .sql
            .query(
                &format!(
                    "SELECT data FROM work_tasks{where_sql}
                     ORDER BY update_at DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
                ),
                &args,
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let items: Result<Vec<WorkTask>, _> =
            rows.iter().map(|r| from_json(r.get_str("data"))).collect();
        Ok(ListResult { items: items?, total })
    }

    // ── Production units ──

    pub fn insert_unit(&self, unit: &mut ProductionUnit) -> Result<(), ServiceError> {
        if unit.id.is_empty() {
            unit.id = new_id();
        }
        let now = now_rfc3339();
        unit.version = 1;
        unit.create_at = Some(now.clone());
        unit.update_at = Some(now.clone());

        let data = to_json(unit)?;
        self.sql
            .exec(
                "INSERT INTO production_units
                 (id, data, version, barcode, production_item, batch_no, update_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                &[
                    Value::from(unit.id.as_str()),
                    Value::from(data),
                    Value::Integer(1),
                    Value::from(unit.barcode.as_str()),
                    Value::from(unit.production_item()),
                    Value::from(unit.batch_no),
                    Value::from(now),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get_unit(&self, id: &str) -> Result<ProductionUnit, ServiceError> {
        let row = self
            .sql
            .query_one(
                "SELECT data FROM production_units WHERE id = ?1",
                &[Value::from(id)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("production unit '{id}' not found"))
            })?;
        from_json(row.get_str("data"))
    }

    pub fn save_unit(&self, unit: &mut ProductionUnit) -> Result<(), ServiceError> {
        let expected = unit.version;
        unit.version = expected + 1;
        unit.update_at = Some(now_rfc3339());
        let data = to_json(unit)?;

        let affected = self
            .sql
            .exec(
                "UPDATE production_units
                 SET data = ?1, version = ?2, batch_no = ?3, update_at = ?4
                 WHERE id = ?5 AND version = ?6",
                &[
                    Value::from(data),
                    Value::Integer(unit.version as i64),
                    Value::from(unit.batch_no),
                    Value::from(unit.update_at.clone().unwrap_or_default()),
                    Value::from(unit.id.as_str()),
                    Value::Integer(expected as i64),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        if affected == 0 {
            unit.version = expected;
            return Err(self.stale_save_error("production_units", "production unit", &unit.id)?);
        }
        Ok(())
    }

    /// Retry-with-reload wrapper for production unit mutations.
    pub fn update_unit<F>(&self, id: &str, mut apply: F) -> Result<ProductionUnit, ServiceError>
    where
        F: FnMut(&mut ProductionUnit) -> Result<(), ServiceError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut unit = self.get_unit(id)?;
            apply(&mut unit)?;
            match self.save_unit(&mut unit) {
                Ok(()) => return Ok(unit),
                Err(ServiceError::Conflict(msg)) => {
                    if attempt >= MAX_SAVE_ATTEMPTS {
                        return Err(ServiceError::Conflict(msg));
                    }
                    tracing::debug!(unit = id, attempt, "stale unit save, reloading");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Units matching a scan code, narrowed by the optional disambiguators.
    /// More than one match is surfaced to the caller for selection.
    pub fn find_units_by_barcode(
        &self,
        barcode: &str,
        order_no: Option<&str>,
        poz_no: Option<u32>,
        batch_no: Option<u32>,
    ) -> Result<Vec<ProductionUnit>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT data FROM production_units WHERE barcode = ?1",
                &[Value::from(barcode)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut units = Vec::new();
        for row in &rows {
            let unit: ProductionUnit = from_json(row.get_str("data"))?;
            if let Some(order) = order_no {
                if unit.order_no != order {
                    continue;
                }
            }
            if let Some(poz) = poz_no {
                if unit.poz_no != poz {
                    continue;
                }
            }
            if let Some(batch) = batch_no {
                if unit.batch_no != batch {
                    continue;
                }
            }
            units.push(unit);
        }
        Ok(units)
    }

    /// All units belonging to a production item.
    pub fn units_for_item(
        &self,
        production_item: &str,
    ) -> Result<Vec<ProductionUnit>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT data FROM production_units WHERE production_item = ?1",
                &[Value::from(production_item)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(|r| from_json(r.get_str("data"))).collect()
    }

    // ── Audit notes ──

    pub fn add_task_note(&self, task_ref: &str, content: &str) -> Result<(), ServiceError> {
        self.sql
            .exec(
                "INSERT INTO task_notes (id, task_ref, content, create_at)
                 VALUES (?1, ?2, ?3, ?4)",
                &[
                    Value::from(new_id()),
                    Value::from(task_ref),
                    Value::from(content),
                    Value::from(now_rfc3339()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn list_task_notes(&self, task_ref: &str) -> Result<Vec<TaskNote>, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT id, task_ref, content, create_at FROM task_notes
                 WHERE task_ref = ?1 ORDER BY create_at ASC",
                &[Value::from(task_ref)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| TaskNote {
                id: r.get_str("id").unwrap_or_default().to_string(),
                task_ref: r.get_str("task_ref").unwrap_or_default().to_string(),
                content: r.get_str("content").unwrap_or_default().to_string(),
                create_at: r.get_str("create_at").unwrap_or_default().to_string(),
            })
            .collect())
    }

    // ── Internals ──

    /// Distinguish a stale version from a missing row after a zero-row
    /// UPDATE.
    fn stale_save_error(
        &self,
        table: &str,
        kind: &str,
        id: &str,
    ) -> Result<ServiceError, ServiceError> {
        let exists = self
            .sql
            .query_one(
                &format!("SELECT id FROM {table} WHERE id = ?1"),
                &[Value::from(id)],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?
            .is_some();
        if exists {
            Ok(ServiceError::Conflict(format!(
                "{kind} '{id}' was modified concurrently"
            )))
        } else {
            Ok(ServiceError::NotFound(format!("{kind} '{id}' not found")))
        }
    }
}

fn to_json<T: Serialize>(record: &T) -> Result<String, ServiceError> {
    serde_json::to_string(record).map_err(|e| ServiceError::Internal(e.to_string()))
}

fn from_json<T: DeserializeOwned>(data: Option<&str>) -> Result<T, ServiceError> {
    let data = data.ok_or_else(|| ServiceError::Internal("missing data column".into()))?;
    serde_json::from_str(data).map_err(|e| ServiceError::Internal(e.to_string()))
}

/// Serialize an enum's serde name as a bare string for an indexed column.
fn enum_text<T: Serialize>(value: &T) -> Result<Value, ServiceError> {
    let v = serde_json::to_value(value).map_err(|e| ServiceError::Internal(e.to_string()))?;
    v.as_str()
        .map(Value::from)
        .ok_or_else(|| ServiceError::Internal("expected string-like enum".into()))
}
