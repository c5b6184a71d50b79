pub mod analyzer;
pub mod stager;
