mod engine;
mod types;

pub use engine::{charge_rate_for_year, run_projection};
pub use types::{BreakEven, BreakEvenMethod, Inputs, PROJECTION_YEARS, Projection, YearRecord};
