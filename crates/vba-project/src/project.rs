//! Project assembly: glues the container, compression, directory and
//! code-page layers into a structured project and back.

use crate::codepage::{self, DEFAULT_CODE_PAGE};
use crate::compression::{compress_container, decompress_container};
use crate::container::{Container, ContainerBuilder};
use crate::dir::{DirInfo, DirModule, DirModuleType, DirStream};
use crate::error::VbaProjectError;
use crate::procedures::{scan_procedures, Procedure};

/// `_VBA_PROJECT` stream contents: magic, version, reserved.
const VBA_PROJECT_HEADER: [u8; 7] = [0xCC, 0x61, 0xFF, 0xFF, 0x00, 0x00, 0x00];

/// Designer class id carried by form modules.
const DESIGNER_CLSID: &str = "{C62A69F0-16DC-11CE-9E98-00AA00574A4F}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u16,
}

#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub name: String,
    pub help_file: Option<String>,
    pub help_context: u32,
    /// Conditional-compilation constants, `Key = Value : ...` text.
    pub constants: Option<String>,
    pub version: Version,
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self {
            name: "VBAProject".to_string(),
            help_file: None,
            help_context: 0,
            constants: None,
            version: Version { major: 1, minor: 0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    Standard,
    Class,
    Form,
    Document,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub module_type: ModuleType,
    /// Decoded source text.
    pub code: String,
    /// Offset of the compressed source block within the raw module stream,
    /// kept for diagnostics.
    pub text_offset: u32,
    /// Container stream the source was read from; may differ from `name`.
    pub stream_name: String,
    pub procedures: Vec<Procedure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Registered,
    Project,
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub libid: String,
    pub kind: ReferenceKind,
}

/// A parsed VBA project: metadata, modules with decoded source, and
/// external references. `warnings` collects per-module problems the
/// tolerant parser skipped over.
#[derive(Debug, Clone)]
pub struct VbaProject {
    pub info: ProjectInfo,
    pub modules: Vec<Module>,
    pub references: Vec<Reference>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// When set, any per-module decoding or parsing failure aborts the
    /// parse instead of being downgraded to a warning.
    pub strict: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SerializeOptions {
    pub code_page: u16,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            code_page: DEFAULT_CODE_PAGE,
        }
    }
}

impl VbaProject {
    /// Parse a project container in tolerant mode.
    pub fn parse(bytes: &[u8]) -> Result<Self, VbaProjectError> {
        Self::parse_with_options(bytes, ParseOptions::default())
    }

    pub fn parse_with_options(
        bytes: &[u8],
        options: ParseOptions,
    ) -> Result<Self, VbaProjectError> {
        let mut container = Container::open(bytes)?;
        let mut warnings = Vec::new();

        let project_stream = match container.read_stream("PROJECT") {
            Ok(bytes) => parse_project_stream(&bytes),
            Err(_) => ProjectStreamInfo::default(),
        };

        let dir = match load_dir_stream(&mut container) {
            Ok(dir) => dir,
            Err(err) if options.strict => return Err(err),
            Err(err) => {
                let message = format!("directory stream unreadable: {err}");
                log::warn!("{message}");
                warnings.push(message);
                DirStream::default()
            }
        };
        let code_page = dir.info.code_page;

        let mut modules = Vec::new();
        for entry in &dir.modules {
            match load_module(&mut container, entry, code_page) {
                Ok(module) => modules.push(module),
                Err(err) if options.strict => {
                    return Err(VbaProjectError::Module {
                        module: entry.name.clone(),
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    let message = format!("skipped module '{}': {err}", entry.name);
                    log::warn!("{message}");
                    warnings.push(message);
                }
            }
        }

        if modules.is_empty() {
            modules = recover_modules(&mut container, code_page, &project_stream, &mut warnings);
        }

        let info = ProjectInfo {
            name: project_stream
                .name
                .or(dir.info.name)
                .unwrap_or_else(|| "VBAProject".to_string()),
            help_file: project_stream.help_file.or(dir.info.help_file),
            help_context: project_stream.help_context.unwrap_or(dir.info.help_context),
            constants: dir.info.constants.filter(|c| !c.is_empty()),
            version: Version {
                major: dir.info.version_major,
                minor: dir.info.version_minor,
            },
        };

        Ok(VbaProject {
            info,
            modules,
            references: dir.references,
            warnings,
        })
    }

    /// Serialize into a fresh container. Characters the chosen code page
    /// cannot represent are reported, never replaced.
    pub fn serialize(&self, options: SerializeOptions) -> Result<Vec<u8>, VbaProjectError> {
        let code_page = options.code_page;
        let mut builder = ContainerBuilder::new()?;

        builder.write_stream("PROJECT", self.render_project_stream().as_bytes())?;
        builder.write_stream("VBA/_VBA_PROJECT", &VBA_PROJECT_HEADER)?;

        let mut dir = DirStream {
            info: DirInfo {
                code_page,
                name: Some(self.info.name.clone()),
                doc_string: None,
                help_file: self.info.help_file.clone(),
                help_context: self.info.help_context,
                version_major: self.info.version.major,
                version_minor: self.info.version.minor,
                constants: self.info.constants.clone(),
            },
            references: self.references.clone(),
            modules: Vec::new(),
        };

        for module in &self.modules {
            let stream_name = if module.stream_name.is_empty() {
                module.name.clone()
            } else {
                module.stream_name.clone()
            };
            let source = codepage::encode(&module.code, code_page)?;
            builder.write_stream(&format!("VBA/{stream_name}"), &compress_container(&source))?;
            dir.modules.push(DirModule {
                name: module.name.clone(),
                stream_name,
                text_offset: 0,
                // Class and form modules travel under the document
                // indicator; parse refines them back from the source.
                module_type: match module.module_type {
                    ModuleType::Standard => DirModuleType::Procedural,
                    _ => DirModuleType::Document,
                },
            });
        }

        let dir_bytes = dir.serialize(code_page)?;
        builder.write_stream("VBA/dir", &compress_container(&dir_bytes))?;
        builder.build()
    }

    fn render_project_stream(&self) -> String {
        let mut out = String::new();
        out.push_str("ID=\"{00000000-0000-0000-0000-000000000000}\"\r\n");
        for module in &self.modules {
            match module.module_type {
                ModuleType::Standard => {
                    out.push_str(&format!("Module={}\r\n", module.name));
                }
                ModuleType::Class => {
                    out.push_str(&format!("Class={}\r\n", module.name));
                }
                ModuleType::Form => {
                    out.push_str(&format!("BaseClass={}\r\n", module.name));
                }
                ModuleType::Document => {
                    out.push_str(&format!("Document={}/&H00000000\r\n", module.name));
                }
            }
        }
        out.push_str(&format!("Name=\"{}\"\r\n", self.info.name));
        out.push_str(&format!(
            "HelpFile=\"{}\"\r\n",
            self.info.help_file.as_deref().unwrap_or("")
        ));
        out.push_str(&format!("HelpContext={}\r\n", self.info.help_context));
        out.push_str("VersionCompatible32=\"393222000\"\r\n");
        out.push_str("CMG=\"\"\r\n");
        out.push_str("DPB=\"\"\r\n");
        out.push_str("GC=\"\"\r\n");
        out.push_str("\r\n");
        out.push_str("[Host Extender Info]\r\n");
        out.push_str("&H00000001={3832D640-CF90-11CF-8E43-00A0C911005A};VBE;&H00000000\r\n");
        out.push_str("\r\n");
        out.push_str("[Workspace]\r\n");
        out
    }
}

fn load_dir_stream(container: &mut Container<'_>) -> Result<DirStream, VbaProjectError> {
    let raw = container.read_stream("VBA/dir")?;
    let data = decompress_container(&raw)?;
    DirStream::parse(&data)
}

fn load_module(
    container: &mut Container<'_>,
    entry: &DirModule,
    code_page: u16,
) -> Result<Module, VbaProjectError> {
    let path = format!("VBA/{}", entry.stream_name);
    let raw = container.read_stream(&path)?;
    if entry.text_offset as usize > raw.len() {
        return Err(VbaProjectError::Directory(format!(
            "text offset {} exceeds stream length {}",
            entry.text_offset,
            raw.len()
        )));
    }
    let source_bytes = decompress_container(&raw[entry.text_offset as usize..])?;
    let code = codepage::decode(&source_bytes, code_page)?;
    let module_type = refine_module_type(entry.module_type, &code);
    let procedures = scan_procedures(&code);
    Ok(Module {
        name: entry.name.clone(),
        module_type,
        code,
        text_offset: entry.text_offset,
        stream_name: entry.stream_name.clone(),
        procedures,
    })
}

/// The wire format only separates procedural modules from the document
/// family; class and form modules are recognized from their source.
fn refine_module_type(dir_type: DirModuleType, source: &str) -> ModuleType {
    match dir_type {
        DirModuleType::Procedural => ModuleType::Standard,
        DirModuleType::Document => {
            if is_form_source(source) {
                ModuleType::Form
            } else if is_class_source(source) {
                ModuleType::Class
            } else {
                ModuleType::Document
            }
        }
    }
}

fn is_form_source(source: &str) -> bool {
    let head = source.trim_start();
    (head.starts_with("VERSION") && source.contains("Begin {"))
        || source.contains(DESIGNER_CLSID)
}

fn is_class_source(source: &str) -> bool {
    source.contains("Attribute VB_Creatable") || source.contains("Attribute VB_PredeclaredId")
}

/// Last-resort module discovery for containers whose dir stream named no
/// modules: walk the `VBA` storage and scan each stream for a plausible
/// compressed source block, latest candidate first.
fn recover_modules(
    container: &mut Container<'_>,
    code_page: u16,
    project_stream: &ProjectStreamInfo,
    warnings: &mut Vec<String>,
) -> Vec<Module> {
    let Ok(children) = container.children("VBA") else {
        return Vec::new();
    };
    let mut modules = Vec::new();
    for entry in children {
        if !entry.is_stream || entry.name == "dir" || entry.name.starts_with("_VBA_PROJECT") || entry.name.starts_with("__SRP") {
            continue;
        }
        let declared = project_stream
            .modules
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&entry.name))
            .map(|(_, kind)| *kind);
        if !project_stream.modules.is_empty() && declared.is_none() {
            continue;
        }
        let Ok(raw) = container.read_stream(&format!("VBA/{}", entry.name)) else {
            continue;
        };
        let Some(source_bytes) = scan_compressed_source(&raw) else {
            continue;
        };
        let Ok(code) = codepage::decode(&source_bytes, code_page) else {
            continue;
        };
        let message = format!(
            "recovered module '{}' by scanning its stream for a compressed source block",
            entry.name
        );
        log::warn!("{message}");
        warnings.push(message);
        let module_type = match declared {
            Some(DeclaredKind::Class) => ModuleType::Class,
            Some(DeclaredKind::Form) => ModuleType::Form,
            Some(DeclaredKind::Document) => ModuleType::Document,
            Some(DeclaredKind::Standard) => ModuleType::Standard,
            None => recovered_module_type(&code),
        };
        let procedures = scan_procedures(&code);
        modules.push(Module {
            name: entry.name.clone(),
            module_type,
            code,
            text_offset: 0,
            stream_name: entry.name,
            procedures,
        });
    }
    modules
}

fn recovered_module_type(source: &str) -> ModuleType {
    if is_form_source(source) {
        ModuleType::Form
    } else if is_class_source(source) {
        ModuleType::Class
    } else {
        ModuleType::Standard
    }
}

/// Find candidate compressed starts (signature byte followed by a valid
/// chunk-header signature) and try them from the last one backward.
fn scan_compressed_source(data: &[u8]) -> Option<Vec<u8>> {
    let mut candidates = Vec::new();
    for i in 0..data.len().saturating_sub(2) {
        if data[i] != 0x01 {
            continue;
        }
        let header = u16::from_le_bytes([data[i + 1], data[i + 2]]);
        if (header >> 12) & 0b111 == 0b011 {
            candidates.push(i);
        }
    }
    for &pos in candidates.iter().rev() {
        if let Ok(decoded) = decompress_container(&data[pos..]) {
            if !decoded.is_empty() {
                return Some(decoded);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredKind {
    Standard,
    Class,
    Form,
    Document,
}

#[derive(Debug, Default)]
struct ProjectStreamInfo {
    name: Option<String>,
    help_file: Option<String>,
    help_context: Option<u32>,
    modules: Vec<(String, DeclaredKind)>,
}

/// Parse the INI-like PROJECT stream. Only the leading unnamed section is
/// meaningful; `[Host Extender Info]`, `[Workspace]` and friends are
/// ignored.
fn parse_project_stream(bytes: &[u8]) -> ProjectStreamInfo {
    let text = String::from_utf8_lossy(bytes);
    let mut info = ProjectStreamInfo::default();
    let mut in_section = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            in_section = true;
            continue;
        }
        if in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => info.name = Some(unquote(value).to_string()),
            "helpfile" => {
                let path = unquote(value);
                if !path.is_empty() {
                    info.help_file = Some(path.to_string());
                }
            }
            "helpcontext" | "helpcontextid" => {
                info.help_context = value.parse().ok();
            }
            "module" => info.modules.push((value.to_string(), DeclaredKind::Standard)),
            "class" => info.modules.push((value.to_string(), DeclaredKind::Class)),
            "baseclass" => info.modules.push((value.to_string(), DeclaredKind::Form)),
            "document" => {
                let name = value.split('/').next().unwrap_or(value);
                info.modules.push((name.to_string(), DeclaredKind::Document));
            }
            _ => {}
        }
    }
    info
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}
