/// Fraction of the prescribed quantity at or below which a medicine is
/// automatically flagged as needing a refill.
pub const REFILL_THRESHOLD: f64 = 0.2;

/// Decide whether a medicine needs a refill.
///
/// An explicit user-set flag always wins. Otherwise the 20% threshold
/// applies (inclusive), but only when a prescribed quantity exists: with
/// `total_prescribed` of zero there is no baseline to infer low stock from,
/// so the answer is false.
///
/// The quantity threshold is applied one-directionally by callers: taking a
/// pill recomputes the flag with the current flag as `explicit_flag`, so a
/// flag that has turned on stays on until manually cleared, even if the
/// pill count later rises.
pub fn needs_refill(pills_left: i64, total_prescribed: i64, explicit_flag: bool) -> bool {
    if explicit_flag {
        return true;
    }
    if total_prescribed <= 0 {
        return false;
    }
    pills_left as f64 <= REFILL_THRESHOLD * total_prescribed as f64
}
