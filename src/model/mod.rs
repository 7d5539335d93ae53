pub mod activity;
pub mod employee;
pub mod role;
pub mod subcontractor;
pub mod supply_labour;
pub mod upload;
pub mod user;
