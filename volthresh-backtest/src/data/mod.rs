pub mod loader;
pub mod prepare;
pub mod types;

pub use loader::{load_csv, load_rate_curve};
pub use prepare::{DataPreparation, FramePreparer, PreparedRecords};
pub use types::{OptionRecord, OptionType};
