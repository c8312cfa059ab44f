//! Tuning constants shared by the value model and the graph

/// Tolerance for value equality (`==`, `!=`) on floating point payloads
pub const EPSILON: f64 = 1e-9;

/// Factor applied by `darker()`; `brighter()` divides by it
pub const SHADE_FACTOR: f64 = 0.7;

/// Millimetres per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Typographic points per inch
pub const POINTS_PER_INCH: f64 = 72.0;
