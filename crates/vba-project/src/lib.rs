//! Reader and writer for VBA project containers.
//!
//! A macro-enabled document embeds its VBA project as an OLE compound file
//! (`vbaProject.bin`). Inside it, a compressed `dir` stream describes the
//! project's modules and references, and each module stream carries the
//! compressed, code-page-encoded source text. This crate decodes that
//! whole stack into a [`VbaProject`] and serializes one back out:
//!
//! ```no_run
//! use vba_project::VbaProject;
//!
//! let bytes = std::fs::read("vbaProject.bin").unwrap();
//! let project = VbaProject::parse(&bytes).unwrap();
//! for module in &project.modules {
//!     println!("{}: {} procedures", module.name, module.procedures.len());
//! }
//! ```
//!
//! Parsing is tolerant by default: damaged modules are skipped and
//! reported through [`VbaProject::warnings`]. Strict mode
//! ([`ParseOptions`]) turns those skips into errors. Serialization never
//! substitutes characters the target code page cannot represent; it fails
//! with [`VbaProjectError::Unencodable`] instead.

pub mod codepage;
pub mod compression;
pub mod container;
pub mod dir;
mod error;
mod procedures;
mod project;

pub use compression::{compress_container, decompress_container};
pub use error::VbaProjectError;
pub use procedures::{Parameter, Procedure, ProcedureKind, TypeName, Visibility};
pub use project::{
    Module, ModuleType, ParseOptions, ProjectInfo, Reference, ReferenceKind, SerializeOptions,
    VbaProject, Version,
};
