use mestra_core::ServiceError;

/// Source of cutting-layout position details for a scanned code.
///
/// Layout data lives in an external optimizer export; the scan response
/// carries it through opaquely when a provider is wired in.
pub trait PositionSummaryProvider: Send + Sync {
    fn position_summary(&self, barcode: &str) -> Result<Option<serde_json::Value>, ServiceError>;
}

/// Provider used when no optimizer export is configured.
pub struct NoPositionData;

impl PositionSummaryProvider for NoPositionData {
    fn position_summary(&self, _barcode: &str) -> Result<Option<serde_json::Value>, ServiceError> {
        Ok(None)
    }
}
