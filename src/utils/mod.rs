//! Small shared helpers.

pub mod ids;
pub mod json_ext;
