pub mod error;
pub mod invariants;
pub mod nester;

pub use error::NestingError;
pub use invariants::{check_result, Violation};
pub use nester::{nest_instances, NestConfig, NestingResult, PartInput, Placement, SheetResult, SkippedInstance};
