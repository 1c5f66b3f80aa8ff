pub mod aggregation;
pub mod report_catalog;
