pub mod id;
pub mod status;
pub mod types;
