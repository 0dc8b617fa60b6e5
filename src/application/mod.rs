//! Application layer: the fetch boundary, the dashboard controller and the
//! pure helpers it uses.

pub mod dashboard;
pub mod fetch;
pub mod filter;
