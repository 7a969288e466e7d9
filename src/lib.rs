pub mod data;
pub mod error;
pub mod metric;
pub mod model;
pub mod module;
pub mod predict;
pub mod report;
pub mod training;
