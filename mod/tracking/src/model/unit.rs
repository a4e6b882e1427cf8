use serde::{Deserialize, Serialize};

/// Status of one production unit within one work task.
///
/// Used both on the task side (ScanUnit) and on the unit side
/// (OperationState); the two views are kept in sync by the completion
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Pending,
    InProgress,
    InCorrection,
    Completed,
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Physical model tag of a production unit.
///
/// Intake data is not a closed set; unrecognised tags deserialize to
/// `Other` rather than failing the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitModel {
    Frame,
    Wing,
    Register,
    Glass,
    #[serde(other)]
    Other,
}

/// The unit-local record of its status for one specific work task.
///
/// A production unit accumulates one entry per work task ever opened for it,
/// including corrective re-runs of the same operation. At most one entry may
/// exist per (operation, task_ref) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    /// Owning work task.
    pub task_ref: String,

    /// Process-step name.
    pub operation: String,

    #[serde(default)]
    pub status: UnitStatus,

    #[serde(default)]
    pub is_corrective: bool,

    /// Ordinal position within the unit's state list.
    pub idx: u32,
}

/// A single traceable physical piece (profile cut or glass pane).
///
/// Created during order intake; mutated by every scan that touches one of
/// its operation states; never deleted once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionUnit {
    /// UUID primary key.
    #[serde(default)]
    pub id: String,

    /// Scan code printed on the piece.
    pub barcode: String,

    pub order_no: String,
    pub poz_no: u32,

    /// Virtual batch id — units sharing it must complete together.
    pub batch_no: u32,

    pub model: UnitModel,

    /// Cart coordinate on the shop floor, where assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_no: Option<u32>,

    /// Slot coordinate within the cart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_no: Option<u32>,

    /// Glass stock code, set only for glass panes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glass_stock: Option<String>,

    #[serde(default)]
    pub operation_states: Vec<OperationState>,

    /// Optimistic concurrency version, bumped on every save.
    #[serde(default)]
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<String>,
}

impl ProductionUnit {
    /// Production item reference: `{order}-{poz}`, with the glass stock code
    /// appended for glass panes.
    pub fn production_item(&self) -> String {
        match &self.glass_stock {
            Some(stock) => format!("{}-{}-{}", self.order_no, self.poz_no, stock),
            None => format!("{}-{}", self.order_no, self.poz_no),
        }
    }

    /// Operation state owned by the given work task, if any.
    pub fn op_state_for_task(&self, task_ref: &str) -> Option<&OperationState> {
        self.operation_states.iter().find(|s| s.task_ref == task_ref)
    }

    /// Set the status of the operation state owned by the given task.
    /// Returns false if the unit has no state for that task.
    pub fn set_op_status(&mut self, task_ref: &str, status: UnitStatus) -> bool {
        match self
            .operation_states
            .iter_mut()
            .find(|s| s.task_ref == task_ref)
        {
            Some(state) => {
                state.status = status;
                true
            }
            None => false,
        }
    }

    /// Append an operation state, enforcing at most one entry per
    /// (operation, task_ref) pair. Returns false if the pair already exists.
    pub fn attach_op_state(&mut self, operation: &str, task_ref: &str, is_corrective: bool) -> bool {
        let exists = self
            .operation_states
            .iter()
            .any(|s| s.operation == operation && s.task_ref == task_ref);
        if exists {
            return false;
        }
        let idx = self.operation_states.len() as u32 + 1;
        self.operation_states.push(OperationState {
            task_ref: task_ref.to_string(),
            operation: operation.to_string(),
            status: UnitStatus::Pending,
            is_corrective,
            idx,
        });
        true
    }
}
