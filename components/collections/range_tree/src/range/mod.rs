mod from_excluded;

pub use from_excluded::{RangeFromExcluded, RangeFromExcludedTo, RangeFromExcludedToIncluded};
