use std::sync::LazyLock;

use regex::Regex;

use crate::limits::MAX_PLATE_LEN;

use super::EngineError;

/// Regional plate format: province character, one letter, five alphanumerics.
const PLATE_PATTERN: &str = "^[京津沪渝冀豫云辽黑湘皖鲁新苏浙赣鄂桂甘晋蒙陕吉闽贵粤青藏川宁琼使领][A-Z][A-Z0-9]{5}$";

static PLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLATE_PATTERN).expect("plate pattern compiles"));

/// Format check only. The entry path does not call this: recognised plates
/// are recorded even when they miss the formal pattern.
pub fn validate_license_plate(plate: &str) -> bool {
    PLATE_RE.is_match(plate)
}

/// Trim surrounding whitespace and reject input that cannot be a plate at all.
pub(crate) fn normalize_plate(plate: &str) -> Result<&str, EngineError> {
    let plate = plate.trim();
    if plate.is_empty() {
        return Err(EngineError::InvalidPlate("empty plate"));
    }
    if plate.len() > MAX_PLATE_LEN {
        return Err(EngineError::InvalidPlate("plate too long"));
    }
    if plate.contains(|c: char| c.is_control()) {
        return Err(EngineError::InvalidPlate("control characters in plate"));
    }
    Ok(plate)
}
