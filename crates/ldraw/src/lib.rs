//! LDraw model parsing, part modelling and connection point resolution.
//!
//! The crate reads the LDraw line format into [`PartDefinition`]s, keeps them
//! in a [`PartStore`] and computes, for every placed part, the connection
//! points other parts can attach to using a [`ConnectionCatalog`] loaded from
//! an LDraw connection data bundle.

pub mod catalog;
pub mod color;
pub mod command;
pub mod connection;
mod declared;
pub mod diagnostics;
pub mod flex;
pub mod ids;
pub mod import;
pub mod library;
pub mod parser;
pub mod part;
pub mod resolver;
pub mod session;
pub mod source;
pub mod step;
pub mod store;
pub mod transform;

pub use catalog::{ConnectionCatalog, ConnectionFamily, ConnectionType, ConnectionTypeId};
pub use color::{ColorRef, ColourDefinition, Material, Rgb};
pub use command::{Command, CommandKind, PartReference};
pub use connection::{ConnectionPoint, ResolverConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use flex::{FlexCatalog, FlexKind, FlexPart, FlexSection};
pub use ids::{CommandId, ConnectionId, IdAllocator};
pub use import::{ImportOptions, ImportedModel};
pub use library::{DirectoryLibrary, MemoryLibrary, PartLibrary};
pub use parser::parse_line;
pub use part::{PartDefinition, PartKind};
pub use resolver::ConnectionResolver;
pub use session::Session;
pub use source::{ConnectionSource, DirectorySource, MemorySource, ZipSource};
pub use step::StepSequencer;
pub use store::PartStore;
pub use transform::Transform;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LDrawError {
    #[error("line {line}: {message}: {text}")]
    Format {
        line: usize,
        text: String,
        message: String,
    },

    #[error("unresolved reference to '{0}'")]
    UnresolvedReference(String),

    #[error("{source_name} (line {line}): {message}")]
    Configuration {
        source_name: String,
        line: u32,
        message: String,
    },

    #[error("invalid state: {0}")]
    State(String),

    #[error("cyclic reference through '{0}'")]
    CyclicReference(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl LDrawError {
    pub(crate) fn format(line: usize, text: &str, message: impl Into<String>) -> Self {
        LDrawError::Format {
            line,
            text: text.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn configuration(source_name: &str, line: u32, message: impl Into<String>) -> Self {
        LDrawError::Configuration {
            source_name: source_name.to_string(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LDrawError>;
