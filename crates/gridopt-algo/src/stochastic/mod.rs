//! Decision making under uncertainty.

pub mod multi_stage;
