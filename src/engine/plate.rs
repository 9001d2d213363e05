use super::error::EngineError;

/// Trims and upper-cases a license plate. Plates are compared in this form
/// everywhere: ticket records, the lot's active-vehicle set, lookups.
pub fn normalize_plate(raw: &str) -> Result<String, EngineError> {
    let plate = raw.trim().to_uppercase();
    if plate.is_empty() {
        return Err(EngineError::Validation(
            "License plate must not be empty".to_string(),
        ));
    }
    Ok(plate)
}
