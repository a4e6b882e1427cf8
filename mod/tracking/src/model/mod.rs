pub mod quality;
pub mod task;
pub mod unit;

pub use quality::{CorrectionOperation, QualityAssessment, QualityCriterion, Severity};
pub use task::{DocStatus, ScanUnit, ScheduledTimeLog, TaskStatus, TimeLog, WorkTask};
pub use unit::{OperationState, ProductionUnit, UnitModel, UnitStatus};

/// Known operation (process-step) names.
///
/// Operation names travel as free-form strings in the data; these constants
/// cover the steps the handlers dispatch on. Anything else falls back to the
/// default grouped handler.
pub mod ops {
    pub const CORNER_WELD: &str = "Corner Weld Cleaning";
    pub const MIDDLE_REGISTER: &str = "Middle Register";
    pub const WING_PREP: &str = "Wing Preparation";
    pub const WING_BINDING: &str = "Wing Binding";
    pub const GLAZING_BEAD: &str = "Glazing Bead";
    pub const QUALITY: &str = "Quality Control";
    pub const SHIPPING: &str = "Shipping";
}
