//! Thin adapter over the OLE compound-file envelope.
//!
//! The rest of the crate only needs four container capabilities: open a
//! file, read a stream by path, enumerate children of a storage, and build
//! a fresh container from `(path, bytes)` pairs. Everything else about the
//! format is delegated to the `cfb` crate.

use std::io::{Cursor, Read, Write};

use crate::error::VbaProjectError;

/// A child of a storage: its name and whether it is a stream (as opposed
/// to a nested storage).
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub is_stream: bool,
}

/// Read-only view of an existing compound file.
pub struct Container<'a> {
    ole: cfb::CompoundFile<Cursor<&'a [u8]>>,
}

impl<'a> Container<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, VbaProjectError> {
        let ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
        Ok(Self { ole })
    }

    pub fn has_stream(&self, path: &str) -> bool {
        self.ole.is_stream(path)
    }

    /// Read a stream's full contents. An empty stream reads as empty
    /// bytes; a missing path is `StreamNotFound`.
    pub fn read_stream(&mut self, path: &str) -> Result<Vec<u8>, VbaProjectError> {
        if !self.ole.is_stream(path) {
            return Err(VbaProjectError::StreamNotFound { path: path.into() });
        }
        let mut stream = self.ole.open_stream(path)?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Enumerate the direct children of a storage.
    pub fn children(&mut self, storage: &str) -> Result<Vec<EntryInfo>, VbaProjectError> {
        let want = format!("/{}", storage.trim_matches('/'));
        let mut out = Vec::new();
        for entry in self.ole.walk() {
            let path = entry.path().to_string_lossy().replace('\\', "/");
            let Some((parent, name)) = path.rsplit_once('/') else {
                continue;
            };
            let parent = if parent.is_empty() { "/" } else { parent };
            if parent == want {
                out.push(EntryInfo {
                    name: name.to_string(),
                    is_stream: entry.is_stream(),
                });
            }
        }
        Ok(out)
    }
}

/// Accumulates `(path, bytes)` pairs into a new compound file.
pub struct ContainerBuilder {
    ole: cfb::CompoundFile<Cursor<Vec<u8>>>,
}

impl ContainerBuilder {
    pub fn new() -> Result<Self, VbaProjectError> {
        let ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
        Ok(Self { ole })
    }

    /// Write a stream, creating intermediate storages along the path.
    pub fn write_stream(&mut self, path: &str, data: &[u8]) -> Result<(), VbaProjectError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut storage = String::new();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !storage.is_empty() {
                storage.push('/');
            }
            storage.push_str(segment);
            if !self.ole.is_storage(&storage) {
                self.ole.create_storage(&storage)?;
            }
        }
        let mut stream = self.ole.create_stream(path)?;
        stream.write_all(data)?;
        Ok(())
    }

    pub fn build(mut self) -> Result<Vec<u8>, VbaProjectError> {
        self.ole.flush()?;
        Ok(self.ole.into_inner().into_inner())
    }
}
