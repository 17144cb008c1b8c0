//! # edi-schema
//!
//! Versioned type system and structural schema tree for EDI validation.
//!
//! Simple types carry version-scoped overrides, loops and segments carry
//! discriminated implementations, and a bound [`Schema`] is checked once
//! for ambiguity before it is shared across validations.

pub mod discriminator;
pub mod loader;
pub mod model;
pub mod registry;
pub mod simple;
pub mod structure;
pub mod version;

pub use discriminator::{Discriminator, Implementation, Selection, select};
pub use loader::SchemaLoader;
pub use model::Schema;
pub use registry::ConcurrentSchemaRegistry;
pub use simple::{BaseKind, CodeValues, SimpleType, SimpleTypeBuilder, VersionOverride};
pub use structure::{
    ComponentReference, CompositeType, ElementReference, ElementTarget, Lookup, LoopType,
    MaxOccurs, Reference, SegmentType, Structure,
};
pub use version::{VersionRange, Versioned, compare_versions, resolve};

use edi_ir::Violation;
use thiserror::Error;

/// Errors that can occur when working with schemas
#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema not found: {0}")]
    NotFound(String),

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),

    #[error("Ambiguous schema definition ({} defects)", .0.len())]
    Ambiguous(Vec<Violation>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
