use clap::ValueEnum;

pub mod commands;
pub mod utils;

pub use ldraw;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}
