mod prints;
mod types;
mod utils;

pub use types::*;
pub use utils::calculate_percentile;
