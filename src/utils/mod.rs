pub mod activity;
pub mod db_utils;
pub mod pagination;
pub mod role_cache;
