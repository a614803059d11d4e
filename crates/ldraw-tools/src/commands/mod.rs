pub mod connections;
pub mod flex;
pub mod info;
pub mod types;
