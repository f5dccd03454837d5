//! Assembly of global sparse systems from element-local contributions.
pub mod global;
pub mod local;
