pub mod api;
pub mod core;
pub mod fx;
pub mod report;
