pub mod measurement_parser;

pub use self::measurement_parser::{decode, is_aligned, Resync, Resynchronizer};
