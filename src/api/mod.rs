pub mod activity;
pub mod employee;
pub mod format;
pub mod profile;
pub mod report;
pub mod subcontractor;
pub mod supply_labour;
pub mod upload;
pub mod user;
