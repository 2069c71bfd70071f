use thiserror::Error;

/// Errors produced while reading or writing a VBA project container.
#[derive(Debug, Error)]
pub enum VbaProjectError {
    /// The compressed container data is structurally invalid.
    #[error("decompress: {message} at byte {offset}")]
    Decompress {
        message: &'static str,
        offset: usize,
    },

    /// The OLE compound file could not be opened or traversed.
    #[error("container: {0}")]
    Container(#[from] std::io::Error),

    /// A stream named by the project metadata does not exist.
    #[error("stream not found: {path}")]
    StreamNotFound { path: String },

    /// The dir stream is malformed beyond what the tolerant parser accepts.
    #[error("dir stream: {0}")]
    Directory(String),

    /// The project declares a code page outside the supported set.
    #[error("unsupported code page {0}")]
    UnsupportedCodePage(u16),

    /// A character cannot be represented in the target code page on emit.
    #[error("character {character:?} is not representable in code page {code_page}")]
    Unencodable { code_page: u16, character: char },

    /// A per-module failure surfaced in strict mode.
    #[error("module {module}: {message}")]
    Module { module: String, message: String },
}
