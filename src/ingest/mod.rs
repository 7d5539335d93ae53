pub mod mapping;
pub mod pipeline;
