//! Small helpers shared by resource acquisition and install steps.
pub mod fs;
