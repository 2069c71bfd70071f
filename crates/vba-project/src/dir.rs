//! Record codec for the project directory stream (MS-OVBA 2.3.4).
//!
//! The decompressed `dir` stream is a flat run of records, each a 16-bit
//! little-endian id followed by a 32-bit size (a handful of legacy records
//! deviate and are special-cased). String records come in MBCS/UTF-16LE
//! pairs laid out `{size32, mbcs[size], twin_id16, size32, utf16[size]}`;
//! the Unicode half wins on read and both halves are written on encode.
//!
//! The reader is deliberately tolerant: unknown ids are skipped via their
//! size field, a missing record means "end of section", and an oversized
//! size field stops the current section instead of failing the parse.

use crate::codepage::{self, DEFAULT_CODE_PAGE};
use crate::error::VbaProjectError;
use crate::project::{Reference, ReferenceKind};

pub const PROJECT_SYS_KIND: u16 = 0x0001;
pub const PROJECT_LCID: u16 = 0x0002;
pub const PROJECT_CODE_PAGE: u16 = 0x0003;
pub const PROJECT_NAME: u16 = 0x0004;
pub const PROJECT_DOC_STRING: u16 = 0x0005;
pub const PROJECT_HELP_FILE_PATH: u16 = 0x0006;
pub const PROJECT_HELP_CONTEXT: u16 = 0x0007;
pub const PROJECT_LIB_FLAGS: u16 = 0x0008;
pub const PROJECT_VERSION: u16 = 0x0009;
pub const PROJECT_CONSTANTS: u16 = 0x000C;
pub const REFERENCE_REGISTERED: u16 = 0x000D;
pub const REFERENCE_PROJECT: u16 = 0x000E;
pub const PROJECT_MODULES: u16 = 0x000F;
pub const PROJECT_TERMINATOR: u16 = 0x0010;
pub const PROJECT_COOKIE: u16 = 0x0013;
pub const PROJECT_LCID_INVOKE: u16 = 0x0014;
pub const REFERENCE_NAME: u16 = 0x0016;
pub const MODULE_NAME: u16 = 0x0019;
pub const MODULE_STREAM_NAME: u16 = 0x001A;
pub const MODULE_DOC_STRING: u16 = 0x001C;
pub const MODULE_HELP_CONTEXT: u16 = 0x001E;
pub const MODULE_TYPE_PROCEDURAL: u16 = 0x0021;
pub const MODULE_TYPE_DOCUMENT: u16 = 0x0022;
pub const MODULE_READ_ONLY: u16 = 0x0025;
pub const MODULE_PRIVATE: u16 = 0x0028;
pub const MODULE_TERMINATOR: u16 = 0x002B;
pub const MODULE_COOKIE: u16 = 0x002C;
pub const REFERENCE_CONTROL: u16 = 0x002F;
pub const REFERENCE_CONTROL_LIBID: u16 = 0x0030;
pub const MODULE_OFFSET: u16 = 0x0031;
pub const MODULE_STREAM_NAME_UNICODE: u16 = 0x0032;
pub const REFERENCE_ORIGINAL: u16 = 0x0033;
pub const PROJECT_CONSTANTS_UNICODE: u16 = 0x003C;
pub const PROJECT_HELP_FILE_PATH_2: u16 = 0x003D;
pub const REFERENCE_NAME_UNICODE: u16 = 0x003E;
pub const PROJECT_DOC_STRING_UNICODE: u16 = 0x0040;
pub const MODULE_NAME_UNICODE: u16 = 0x0047;
pub const MODULE_DOC_STRING_UNICODE: u16 = 0x0048;
pub const PROJECT_COMPAT_VERSION: u16 = 0x004A;

/// Ids the resync scan recognizes as the start of a plausible record.
const KNOWN_IDS: &[u16] = &[
    PROJECT_SYS_KIND,
    PROJECT_LCID,
    PROJECT_CODE_PAGE,
    PROJECT_NAME,
    PROJECT_DOC_STRING,
    PROJECT_HELP_FILE_PATH,
    PROJECT_HELP_CONTEXT,
    PROJECT_LIB_FLAGS,
    PROJECT_VERSION,
    PROJECT_CONSTANTS,
    REFERENCE_REGISTERED,
    REFERENCE_PROJECT,
    PROJECT_MODULES,
    PROJECT_TERMINATOR,
    PROJECT_COOKIE,
    PROJECT_LCID_INVOKE,
    REFERENCE_NAME,
    MODULE_NAME,
    REFERENCE_CONTROL,
    REFERENCE_ORIGINAL,
    PROJECT_COMPAT_VERSION,
];

/// Project-level fields collected from the information section.
#[derive(Debug, Clone)]
pub struct DirInfo {
    pub code_page: u16,
    pub name: Option<String>,
    pub doc_string: Option<String>,
    pub help_file: Option<String>,
    pub help_context: u32,
    pub version_major: u32,
    pub version_minor: u16,
    pub constants: Option<String>,
}

impl Default for DirInfo {
    fn default() -> Self {
        Self {
            code_page: DEFAULT_CODE_PAGE,
            name: None,
            doc_string: None,
            help_file: None,
            help_context: 0,
            version_major: 1,
            version_minor: 0,
            constants: None,
        }
    }
}

/// One module descriptor as recorded on the wire.
#[derive(Debug, Clone)]
pub struct DirModule {
    pub name: String,
    pub stream_name: String,
    pub text_offset: u32,
    pub module_type: DirModuleType,
}

/// The wire format only distinguishes procedural modules from
/// document-family modules; Class/Form refinement happens later from the
/// module source itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirModuleType {
    Procedural,
    Document,
}

/// Parsed form of the directory stream.
#[derive(Debug, Clone, Default)]
pub struct DirStream {
    pub info: DirInfo,
    pub references: Vec<Reference>,
    pub modules: Vec<DirModule>,
}

struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek_u16(&self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]))
    }

    fn read_u16(&mut self) -> Option<u16> {
        let value = self.peek_u16()?;
        self.pos += 2;
        Some(value)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let value = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Some(value)
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    /// Read a `{size32, bytes[size]}` body. A size field larger than the
    /// remaining input (this covers "negative" sizes read as huge u32s)
    /// yields `None` so the caller can stop the section.
    fn read_sized(&mut self) -> Option<&'a [u8]> {
        let size = self.read_u32()? as usize;
        self.take(size)
    }

    fn skip_sized(&mut self) -> Option<()> {
        self.read_sized().map(|_| ())
    }

    /// Read an MBCS body and, when present, its Unicode twin introduced by
    /// `twin_id`. Returns `(mbcs, utf16)`.
    fn read_paired(&mut self, twin_id: u16) -> Option<(&'a [u8], Option<&'a [u8]>)> {
        let mbcs = self.read_sized()?;
        if self.peek_u16() == Some(twin_id) {
            self.read_u16();
            let unicode = self.read_sized()?;
            Some((mbcs, Some(unicode)))
        } else {
            Some((mbcs, None))
        }
    }

    /// Advance one byte at a time until a known record id lines up.
    /// Returns false when the input ends first.
    fn resync(&mut self) -> bool {
        while self.remaining() >= 2 {
            if let Some(id) = self.peek_u16() {
                if KNOWN_IDS.contains(&id) {
                    return true;
                }
            }
            self.pos += 1;
        }
        false
    }
}

/// Decode a paired string record, preferring the Unicode half. Trailing
/// NULs from reserved padding are stripped.
fn paired_string(
    mbcs: &[u8],
    unicode: Option<&[u8]>,
    code_page: u16,
) -> Result<String, VbaProjectError> {
    let text = match unicode {
        Some(bytes) if !bytes.is_empty() => codepage::decode_utf16le(bytes),
        _ => codepage::decode(mbcs, code_page)?,
    };
    Ok(text.trim_end_matches('\0').to_string())
}

impl DirStream {
    /// Parse a decompressed directory stream.
    pub fn parse(data: &[u8]) -> Result<Self, VbaProjectError> {
        let mut reader = RecordReader::new(data);
        let mut dir = DirStream::default();

        if !parse_information(&mut reader, &mut dir)? {
            return Ok(dir);
        }
        if !parse_references(&mut reader, &mut dir)? {
            return Ok(dir);
        }
        parse_modules(&mut reader, &mut dir)?;
        Ok(dir)
    }

    /// Serialize into the canonical record skeleton. Strings are written
    /// as MBCS + UTF-16LE pairs in the given code page.
    pub fn serialize(&self, code_page: u16) -> Result<Vec<u8>, VbaProjectError> {
        let mut out = Vec::new();

        push_fixed_u32(&mut out, PROJECT_SYS_KIND, 1); // Win32
        push_fixed_u32(&mut out, PROJECT_LCID, 0x0409);
        push_fixed_u32(&mut out, PROJECT_LCID_INVOKE, 0x0409);
        push_record(&mut out, PROJECT_CODE_PAGE, &code_page.to_le_bytes());

        let name = self.info.name.as_deref().unwrap_or("VBAProject");
        push_record(&mut out, PROJECT_NAME, &codepage::encode(name, code_page)?);

        let doc = self.info.doc_string.as_deref().unwrap_or("");
        push_string_pair(&mut out, PROJECT_DOC_STRING, PROJECT_DOC_STRING_UNICODE, doc, code_page)?;

        // The help-file twin repeats the MBCS bytes rather than UTF-16.
        let help = self.info.help_file.as_deref().unwrap_or("");
        let help_mbcs = codepage::encode(help, code_page)?;
        push_record(&mut out, PROJECT_HELP_FILE_PATH, &help_mbcs);
        push_record(&mut out, PROJECT_HELP_FILE_PATH_2, &help_mbcs);

        push_fixed_u32(&mut out, PROJECT_HELP_CONTEXT, self.info.help_context);
        push_fixed_u32(&mut out, PROJECT_LIB_FLAGS, 0);

        // PROJECTVERSION writes a fixed size of 4 followed by six bytes of
        // payload; readers special-case it the same way.
        out.extend_from_slice(&PROJECT_VERSION.to_le_bytes());
        out.extend_from_slice(&4u32.to_le_bytes());
        out.extend_from_slice(&self.info.version_major.to_le_bytes());
        out.extend_from_slice(&self.info.version_minor.to_le_bytes());

        let constants = self.info.constants.as_deref().unwrap_or("");
        push_string_pair(
            &mut out,
            PROJECT_CONSTANTS,
            PROJECT_CONSTANTS_UNICODE,
            constants,
            code_page,
        )?;

        for reference in &self.references {
            serialize_reference(&mut out, reference, code_page)?;
        }

        push_record(&mut out, PROJECT_MODULES, &(self.modules.len() as u16).to_le_bytes());
        push_record(&mut out, PROJECT_COOKIE, &0xFFFFu16.to_le_bytes());

        for module in &self.modules {
            serialize_module(&mut out, module, code_page)?;
        }

        push_record(&mut out, PROJECT_TERMINATOR, &[]);
        Ok(out)
    }
}

fn parse_information(
    reader: &mut RecordReader<'_>,
    dir: &mut DirStream,
) -> Result<bool, VbaProjectError> {
    loop {
        let Some(id) = reader.peek_u16() else {
            return Ok(false);
        };
        match id {
            REFERENCE_NAME | REFERENCE_REGISTERED | REFERENCE_PROJECT | REFERENCE_ORIGINAL
            | REFERENCE_CONTROL | PROJECT_MODULES => return Ok(true),
            PROJECT_TERMINATOR => return Ok(false),
            _ => {}
        }
        let record_start = reader.pos;
        reader.read_u16();
        let code_page = dir.info.code_page;
        match id {
            PROJECT_SYS_KIND | PROJECT_LCID | PROJECT_LCID_INVOKE | PROJECT_LIB_FLAGS
            | PROJECT_COMPAT_VERSION => {
                if reader.skip_sized().is_none() {
                    return Ok(false);
                }
            }
            PROJECT_CODE_PAGE => {
                let Some(body) = reader.read_sized() else {
                    return Ok(false);
                };
                if body.len() >= 2 {
                    dir.info.code_page = u16::from_le_bytes([body[0], body[1]]);
                }
            }
            PROJECT_NAME => {
                let Some(body) = reader.read_sized() else {
                    return Ok(false);
                };
                dir.info.name = Some(codepage::decode(body, code_page)?);
            }
            PROJECT_DOC_STRING => {
                let Some((mbcs, unicode)) = reader.read_paired(PROJECT_DOC_STRING_UNICODE) else {
                    return Ok(false);
                };
                dir.info.doc_string = Some(paired_string(mbcs, unicode, code_page)?);
            }
            PROJECT_HELP_FILE_PATH => {
                let Some((mbcs, _twin)) = reader.read_paired(PROJECT_HELP_FILE_PATH_2) else {
                    return Ok(false);
                };
                dir.info.help_file = Some(codepage::decode(mbcs, code_page)?);
            }
            PROJECT_HELP_CONTEXT => {
                let Some(body) = reader.read_sized() else {
                    return Ok(false);
                };
                if body.len() >= 4 {
                    dir.info.help_context =
                        u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                }
            }
            PROJECT_VERSION => {
                // Fixed size field of 4, then six bytes of version payload.
                if reader.read_u32().is_none() {
                    return Ok(false);
                }
                let (Some(major), Some(minor)) = (reader.read_u32(), reader.read_u16()) else {
                    return Ok(false);
                };
                dir.info.version_major = major;
                dir.info.version_minor = minor;
            }
            PROJECT_CONSTANTS => {
                let Some((mbcs, unicode)) = reader.read_paired(PROJECT_CONSTANTS_UNICODE) else {
                    return Ok(false);
                };
                dir.info.constants = Some(paired_string(mbcs, unicode, code_page)?);
            }
            _ => {
                // Unknown record: skip by size when plausible, otherwise
                // scan forward for the next recognizable id (documents in
                // the wild carry stray bytes before the constants record).
                if reader.skip_sized().is_none() {
                    reader.pos = record_start + 1;
                    if !reader.resync() {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

fn parse_references(
    reader: &mut RecordReader<'_>,
    dir: &mut DirStream,
) -> Result<bool, VbaProjectError> {
    let mut pending_name: Option<String> = None;
    loop {
        let Some(id) = reader.peek_u16() else {
            return Ok(false);
        };
        match id {
            PROJECT_MODULES => return Ok(true),
            PROJECT_TERMINATOR => return Ok(false),
            _ => {}
        }
        reader.read_u16();
        let code_page = dir.info.code_page;
        match id {
            REFERENCE_NAME => {
                let Some((mbcs, unicode)) = reader.read_paired(REFERENCE_NAME_UNICODE) else {
                    return Ok(false);
                };
                pending_name = Some(paired_string(mbcs, unicode, code_page)?);
            }
            REFERENCE_REGISTERED => {
                let Some(libid) = parse_registered_body(reader, code_page)? else {
                    return Ok(false);
                };
                dir.references.push(Reference {
                    name: pending_name.take().unwrap_or_default(),
                    libid,
                    kind: ReferenceKind::Registered,
                });
            }
            REFERENCE_PROJECT => {
                let Some(libid) = parse_project_body(reader, code_page)? else {
                    return Ok(false);
                };
                dir.references.push(Reference {
                    name: pending_name.take().unwrap_or_default(),
                    libid,
                    kind: ReferenceKind::Project,
                });
            }
            REFERENCE_ORIGINAL => {
                let Some(original) = reader.read_sized() else {
                    return Ok(false);
                };
                let original = codepage::decode(original, code_page)?;
                if reader.peek_u16() == Some(REFERENCE_CONTROL) {
                    reader.read_u16();
                    let Some((libid, extended_name)) = parse_control_body(reader, code_page)?
                    else {
                        return Ok(false);
                    };
                    dir.references.push(Reference {
                        name: extended_name
                            .or_else(|| pending_name.take())
                            .unwrap_or_default(),
                        libid,
                        kind: ReferenceKind::Control,
                    });
                } else if let Some(name) = pending_name.take() {
                    dir.references.push(Reference {
                        name,
                        libid: original,
                        kind: ReferenceKind::Control,
                    });
                }
                // An original with no preceding name record is discarded.
            }
            _ => {
                if reader.skip_sized().is_none() {
                    return Ok(false);
                }
            }
        }
    }
}

fn parse_registered_body(
    reader: &mut RecordReader<'_>,
    code_page: u16,
) -> Result<Option<String>, VbaProjectError> {
    if reader.read_u32().is_none() {
        return Ok(None);
    }
    let Some(libid) = reader.read_sized() else {
        return Ok(None);
    };
    let libid = codepage::decode(libid, code_page)?;
    if reader.take(6).is_none() {
        return Ok(None);
    }
    Ok(Some(libid))
}

fn parse_project_body(
    reader: &mut RecordReader<'_>,
    code_page: u16,
) -> Result<Option<String>, VbaProjectError> {
    if reader.read_u32().is_none() {
        return Ok(None);
    }
    let Some(absolute) = reader.read_sized() else {
        return Ok(None);
    };
    let absolute = codepage::decode(absolute, code_page)?;
    if reader.skip_sized().is_none()
        || reader.read_u32().is_none()
        || reader.read_u16().is_none()
    {
        return Ok(None);
    }
    Ok(Some(absolute))
}

/// Body of a control reference following its original record. Returns the
/// extended libid plus the nested extended-name override when present.
fn parse_control_body(
    reader: &mut RecordReader<'_>,
    code_page: u16,
) -> Result<Option<(String, Option<String>)>, VbaProjectError> {
    if reader.read_u32().is_none() {
        return Ok(None);
    }
    let Some(twiddled) = reader.read_sized() else {
        return Ok(None);
    };
    let twiddled = codepage::decode(twiddled, code_page)?;
    if reader.take(6).is_none() {
        return Ok(None);
    }

    let mut extended_name = None;
    if reader.peek_u16() == Some(REFERENCE_NAME) {
        reader.read_u16();
        let Some((mbcs, unicode)) = reader.read_paired(REFERENCE_NAME_UNICODE) else {
            return Ok(None);
        };
        extended_name = Some(paired_string(mbcs, unicode, code_page)?);
    }

    if reader.peek_u16() != Some(REFERENCE_CONTROL_LIBID) {
        // Truncated control body: fall back to the twiddled libid.
        return Ok(Some((twiddled, extended_name)));
    }
    reader.read_u16();
    if reader.read_u32().is_none() {
        return Ok(None);
    }
    let Some(extended) = reader.read_sized() else {
        return Ok(None);
    };
    let extended = codepage::decode(extended, code_page)?;
    // Reserved bytes, class GUID, cookie.
    if reader.take(6).is_none() || reader.take(16).is_none() || reader.read_u32().is_none() {
        return Ok(Some((extended, extended_name)));
    }
    Ok(Some((extended, extended_name)))
}

fn parse_modules(
    reader: &mut RecordReader<'_>,
    dir: &mut DirStream,
) -> Result<(), VbaProjectError> {
    // PROJECTMODULES header with the descriptor count.
    if reader.peek_u16() != Some(PROJECT_MODULES) {
        return Ok(());
    }
    reader.read_u16();
    let Some(body) = reader.read_sized() else {
        return Ok(());
    };
    let count = if body.len() >= 2 {
        u16::from_le_bytes([body[0], body[1]])
    } else {
        0
    };

    if reader.peek_u16() == Some(PROJECT_COOKIE) {
        reader.read_u16();
        if reader.skip_sized().is_none() {
            return Ok(());
        }
    }

    for _ in 0..count {
        match parse_module(reader, dir.info.code_page)? {
            Some(module) => dir.modules.push(module),
            None => break,
        }
    }
    Ok(())
}

fn parse_module(
    reader: &mut RecordReader<'_>,
    code_page: u16,
) -> Result<Option<DirModule>, VbaProjectError> {
    let mut name: Option<String> = None;
    let mut stream_name: Option<String> = None;
    let mut text_offset = 0u32;
    let mut module_type = DirModuleType::Procedural;

    loop {
        let Some(id) = reader.peek_u16() else {
            break;
        };
        if id == PROJECT_TERMINATOR {
            break;
        }
        reader.read_u16();
        match id {
            MODULE_NAME => {
                let Some(body) = reader.read_sized() else {
                    break;
                };
                // The Unicode twin, when present, wins.
                if name.is_none() {
                    name = Some(codepage::decode(body, code_page)?);
                }
            }
            MODULE_NAME_UNICODE => {
                let Some(body) = reader.read_sized() else {
                    break;
                };
                let decoded = codepage::decode_utf16le(body);
                let decoded = decoded.trim_end_matches('\0');
                if !decoded.is_empty() {
                    name = Some(decoded.to_string());
                }
            }
            MODULE_STREAM_NAME => {
                let Some((mbcs, unicode)) = reader.read_paired(MODULE_STREAM_NAME_UNICODE)
                else {
                    break;
                };
                stream_name = Some(paired_string(mbcs, unicode, code_page)?);
            }
            MODULE_DOC_STRING => {
                if reader.read_paired(MODULE_DOC_STRING_UNICODE).is_none() {
                    break;
                }
            }
            MODULE_OFFSET => {
                let Some(body) = reader.read_sized() else {
                    break;
                };
                if body.len() >= 4 {
                    text_offset = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
                }
            }
            MODULE_TYPE_PROCEDURAL => {
                if reader.skip_sized().is_none() {
                    break;
                }
                module_type = DirModuleType::Procedural;
            }
            MODULE_TYPE_DOCUMENT => {
                if reader.skip_sized().is_none() {
                    break;
                }
                module_type = DirModuleType::Document;
            }
            MODULE_HELP_CONTEXT | MODULE_COOKIE | MODULE_READ_ONLY | MODULE_PRIVATE => {
                if reader.skip_sized().is_none() {
                    break;
                }
            }
            MODULE_TERMINATOR => {
                let _ = reader.skip_sized();
                break;
            }
            _ => {
                if reader.skip_sized().is_none() {
                    break;
                }
            }
        }
    }

    let Some(name) = name else {
        return Ok(None);
    };
    let stream_name = match stream_name {
        Some(s) if !s.is_empty() => s,
        // A module without a stream-name record reads from the stream
        // named after the module itself.
        _ => name.clone(),
    };
    Ok(Some(DirModule {
        name,
        stream_name,
        text_offset,
        module_type,
    }))
}

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn push_fixed_u32(out: &mut Vec<u8>, id: u16, value: u32) {
    push_record(out, id, &value.to_le_bytes());
}

fn push_string_pair(
    out: &mut Vec<u8>,
    id: u16,
    twin_id: u16,
    text: &str,
    code_page: u16,
) -> Result<(), VbaProjectError> {
    push_record(out, id, &codepage::encode(text, code_page)?);
    push_record(out, twin_id, &codepage::encode_utf16le(text));
    Ok(())
}

fn serialize_reference(
    out: &mut Vec<u8>,
    reference: &Reference,
    code_page: u16,
) -> Result<(), VbaProjectError> {
    push_string_pair(out, REFERENCE_NAME, REFERENCE_NAME_UNICODE, &reference.name, code_page)?;
    let libid = codepage::encode(&reference.libid, code_page)?;
    match reference.kind {
        ReferenceKind::Registered => {
            out.extend_from_slice(&REFERENCE_REGISTERED.to_le_bytes());
            out.extend_from_slice(&((libid.len() + 10) as u32).to_le_bytes());
            out.extend_from_slice(&(libid.len() as u32).to_le_bytes());
            out.extend_from_slice(&libid);
            out.extend_from_slice(&[0u8; 6]);
        }
        ReferenceKind::Project => {
            out.extend_from_slice(&REFERENCE_PROJECT.to_le_bytes());
            out.extend_from_slice(&((libid.len() + 14) as u32).to_le_bytes());
            out.extend_from_slice(&(libid.len() as u32).to_le_bytes());
            out.extend_from_slice(&libid);
            out.extend_from_slice(&0u32.to_le_bytes()); // empty relative libid
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        ReferenceKind::Control => {
            push_record(out, REFERENCE_ORIGINAL, &libid);
            out.extend_from_slice(&REFERENCE_CONTROL.to_le_bytes());
            out.extend_from_slice(&((libid.len() + 10) as u32).to_le_bytes());
            out.extend_from_slice(&(libid.len() as u32).to_le_bytes());
            out.extend_from_slice(&libid);
            out.extend_from_slice(&[0u8; 6]);
            out.extend_from_slice(&REFERENCE_CONTROL_LIBID.to_le_bytes());
            out.extend_from_slice(&((libid.len() + 4) as u32).to_le_bytes());
            out.extend_from_slice(&(libid.len() as u32).to_le_bytes());
            out.extend_from_slice(&libid);
            out.extend_from_slice(&[0u8; 6]);
            out.extend_from_slice(&[0u8; 16]); // class GUID
            out.extend_from_slice(&0u32.to_le_bytes()); // cookie
        }
    }
    Ok(())
}

fn serialize_module(
    out: &mut Vec<u8>,
    module: &DirModule,
    code_page: u16,
) -> Result<(), VbaProjectError> {
    push_string_pair(out, MODULE_NAME, MODULE_NAME_UNICODE, &module.name, code_page)?;
    push_string_pair(
        out,
        MODULE_STREAM_NAME,
        MODULE_STREAM_NAME_UNICODE,
        &module.stream_name,
        code_page,
    )?;
    push_string_pair(out, MODULE_DOC_STRING, MODULE_DOC_STRING_UNICODE, "", code_page)?;
    push_fixed_u32(out, MODULE_OFFSET, module.text_offset);
    push_fixed_u32(out, MODULE_HELP_CONTEXT, 0);
    push_record(out, MODULE_COOKIE, &0xFFFFu16.to_le_bytes());
    let type_id = match module.module_type {
        DirModuleType::Procedural => MODULE_TYPE_PROCEDURAL,
        DirModuleType::Document => MODULE_TYPE_DOCUMENT,
    };
    push_record(out, type_id, &[]);
    push_record(out, MODULE_TERMINATOR, &[]);
    Ok(())
}
