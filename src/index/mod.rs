pub mod inverted;
pub mod merge_policy;
pub mod posting;
pub mod segment;
