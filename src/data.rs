//! TIMS crash table preparation.
//!
//! Cleans the raw Crashes, Parties, and Victims extracts, joins them into a
//! victim-level table, and optionally decodes SWITRS category codes.
mod checks;
mod cleaning;
mod decode;
mod table;

pub use checks::{check_years, feature_gaps, ksi_share, ksi_target, YEAR_RANGE};
pub use cleaning::{build_victim_level, clean_crashes, clean_parties, clean_victims, CrashOptions};
pub use decode::decode_switrs;
pub use table::Table;
