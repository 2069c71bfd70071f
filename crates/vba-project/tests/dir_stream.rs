use std::io::{Cursor, Write};

use vba_project::dir::DirStream;
use vba_project::{compress_container, ModuleType, ReferenceKind, VbaProject};

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

fn utf16le_bytes(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

fn minimal_module_records(out: &mut Vec<u8>, name: &str) {
    push_record(out, 0x0019, name.as_bytes()); // MODULENAME
    push_record(out, 0x001A, name.as_bytes()); // MODULESTREAMNAME (no unicode tail)
    push_record(out, 0x0031, &0u32.to_le_bytes()); // MODULEOFFSET
    push_record(out, 0x0021, &[]); // MODULETYPE (procedural)
    push_record(out, 0x002B, &[]); // terminator
}

fn container_with_dir_and_module(
    dir_decompressed: &[u8],
    stream_name: &str,
    module_code: &[u8],
) -> Vec<u8> {
    let dir_container = compress_container(dir_decompressed);
    let module_container = compress_container(module_code);

    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    ole.create_storage("VBA").expect("VBA storage");
    {
        let mut s = ole.create_stream("VBA/dir").expect("dir stream");
        s.write_all(&dir_container).expect("write dir");
    }
    {
        let mut s = ole
            .create_stream(&format!("VBA/{stream_name}"))
            .expect("module stream");
        s.write_all(&module_container).expect("write module");
    }
    ole.into_inner().into_inner()
}

#[test]
fn module_stream_name_is_decoded_with_the_project_code_page() {
    let stream_name = "Модуль1";
    let (stream_name_bytes, _, _) = encoding_rs::WINDOWS_1251.encode(stream_name);

    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1251u16.to_le_bytes()); // PROJECTCODEPAGE
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes()); // PROJECTMODULES
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes()); // PROJECTCOOKIE
    push_record(&mut dir, 0x0019, b"Module1");
    push_record(&mut dir, 0x001A, stream_name_bytes.as_ref());
    push_record(&mut dir, 0x0031, &0u32.to_le_bytes());
    push_record(&mut dir, 0x0021, &[]);
    push_record(&mut dir, 0x002B, &[]);

    let bytes = container_with_dir_and_module(&dir, stream_name, b"Sub Hello()\r\nEnd Sub\r\n");
    let project = VbaProject::parse(&bytes).expect("parse");

    let module = &project.modules[0];
    assert_eq!(module.name, "Module1");
    assert_eq!(module.stream_name, stream_name);
    assert!(module.code.contains("Sub Hello"));
}

#[test]
fn module_stream_name_unicode_tail_wins_over_mbcs() {
    // Spec layout: Id, SizeOfStreamName, MBCS bytes, Reserved=0x0032,
    // SizeOfStreamNameUnicode, UTF-16LE bytes. The MBCS half is
    // deliberately wrong to prove the tail is used for stream lookup.
    let stream_name = "МодульПоток";

    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1251u16.to_le_bytes());
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    push_record(&mut dir, 0x0019, b"Module1");
    dir.extend_from_slice(&0x001Au16.to_le_bytes());
    dir.extend_from_slice(&(b"Wrong".len() as u32).to_le_bytes());
    dir.extend_from_slice(b"Wrong");
    dir.extend_from_slice(&0x0032u16.to_le_bytes());
    let tail = utf16le_bytes(stream_name);
    dir.extend_from_slice(&(tail.len() as u32).to_le_bytes());
    dir.extend_from_slice(&tail);
    push_record(&mut dir, 0x0031, &0u32.to_le_bytes());
    push_record(&mut dir, 0x0021, &[]);
    push_record(&mut dir, 0x002B, &[]);

    let bytes = container_with_dir_and_module(&dir, stream_name, b"Sub Hello()\r\nEnd Sub\r\n");
    let project = VbaProject::parse(&bytes).expect("parse");

    let module = &project.modules[0];
    assert_eq!(module.stream_name, stream_name);
    assert!(module.code.contains("Sub Hello"));
}

#[test]
fn module_without_stream_name_record_uses_the_module_name() {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    push_record(&mut dir, 0x0019, b"Module1");
    push_record(&mut dir, 0x0031, &0u32.to_le_bytes());
    push_record(&mut dir, 0x0021, &[]);
    push_record(&mut dir, 0x002B, &[]);

    let bytes = container_with_dir_and_module(&dir, "Module1", b"Sub A()\r\nEnd Sub\r\n");
    let project = VbaProject::parse(&bytes).expect("parse");
    assert_eq!(project.modules[0].stream_name, "Module1");
}

#[test]
fn unknown_records_are_skipped_and_stray_bytes_resynced() {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x0004, b"MyProject"); // PROJECTNAME
    push_record(&mut dir, 0x00EE, b"future record"); // unknown id, valid size
    dir.extend_from_slice(&[0xDE, 0xAD, 0xBE]); // stray gap before constants
    push_record(&mut dir, 0x000C, b"DebugMode = 1"); // PROJECTCONSTANTS
    push_record(&mut dir, 0x003C, &utf16le_bytes("DebugMode = 1"));
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    minimal_module_records(&mut dir, "Module1");

    let parsed = DirStream::parse(&dir).expect("tolerant parse");
    assert_eq!(parsed.info.name.as_deref(), Some("MyProject"));
    assert_eq!(parsed.info.constants.as_deref(), Some("DebugMode = 1"));
    assert_eq!(parsed.modules.len(), 1);
}

#[test]
fn oversized_record_size_stops_the_section_without_failing() {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x0004, b"Broken");
    // PROJECTCONSTANTS whose size runs far past the input.
    dir.extend_from_slice(&0x000Cu16.to_le_bytes());
    dir.extend_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

    let parsed = DirStream::parse(&dir).expect("tolerant parse");
    assert_eq!(parsed.info.name.as_deref(), Some("Broken"));
    assert!(parsed.modules.is_empty());
}

#[test]
fn references_parse_all_three_kinds() {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());

    // Registered reference.
    push_record(&mut dir, 0x0016, b"stdole");
    push_record(&mut dir, 0x003E, &utf16le_bytes("stdole"));
    let libid = b"*\\G{00020430-0000-0000-C000-000000000046}#2.0#0#stdole2.tlb#OLE";
    dir.extend_from_slice(&0x000Du16.to_le_bytes());
    dir.extend_from_slice(&((libid.len() + 10) as u32).to_le_bytes());
    dir.extend_from_slice(&(libid.len() as u32).to_le_bytes());
    dir.extend_from_slice(libid);
    dir.extend_from_slice(&[0u8; 6]);

    // Project reference.
    push_record(&mut dir, 0x0016, b"OtherProject");
    push_record(&mut dir, 0x003E, &utf16le_bytes("OtherProject"));
    let proj_libid = b"*\\CC:\\other.xlsm";
    dir.extend_from_slice(&0x000Eu16.to_le_bytes());
    dir.extend_from_slice(&((proj_libid.len() + 14) as u32).to_le_bytes());
    dir.extend_from_slice(&(proj_libid.len() as u32).to_le_bytes());
    dir.extend_from_slice(proj_libid);
    dir.extend_from_slice(&0u32.to_le_bytes());
    dir.extend_from_slice(&1u32.to_le_bytes());
    dir.extend_from_slice(&0u16.to_le_bytes());

    // Original without a name record is discarded.
    push_record(&mut dir, 0x0033, b"*\\G{orphan}");

    push_record(&mut dir, 0x000F, &0u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());

    let parsed = DirStream::parse(&dir).expect("parse");
    assert_eq!(parsed.references.len(), 2);
    assert_eq!(parsed.references[0].name, "stdole");
    assert_eq!(parsed.references[0].kind, ReferenceKind::Registered);
    assert!(parsed.references[0].libid.contains("stdole2.tlb"));
    assert_eq!(parsed.references[1].name, "OtherProject");
    assert_eq!(parsed.references[1].kind, ReferenceKind::Project);
}

#[test]
fn serializer_output_reparses_to_the_same_directory() {
    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x0004, b"RoundTrip");
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    minimal_module_records(&mut dir, "Module1");

    let parsed = DirStream::parse(&dir).expect("parse");
    let serialized = parsed.serialize(1252).expect("serialize");
    let reparsed = DirStream::parse(&serialized).expect("reparse");

    assert_eq!(reparsed.info.name.as_deref(), Some("RoundTrip"));
    assert_eq!(reparsed.info.code_page, 1252);
    assert_eq!(reparsed.modules.len(), 1);
    assert_eq!(reparsed.modules[0].name, "Module1");
    assert_eq!(reparsed.modules[0].stream_name, "Module1");
}

#[test]
fn class_modules_travel_under_the_document_indicator() {
    let class_code = "Attribute VB_Name = \"Widget\"\r\n\
                      Attribute VB_Creatable = False\r\n\
                      Attribute VB_PredeclaredId = False\r\n\
                      Public Value As Long\r\n";

    let mut dir = Vec::new();
    push_record(&mut dir, 0x0003, &1252u16.to_le_bytes());
    push_record(&mut dir, 0x000F, &1u16.to_le_bytes());
    push_record(&mut dir, 0x0013, &0xFFFFu16.to_le_bytes());
    push_record(&mut dir, 0x0019, b"Widget");
    push_record(&mut dir, 0x001A, b"Widget");
    push_record(&mut dir, 0x0031, &0u32.to_le_bytes());
    push_record(&mut dir, 0x0022, &[]); // MODULETYPE (document family)
    push_record(&mut dir, 0x002B, &[]);

    let bytes = container_with_dir_and_module(&dir, "Widget", class_code.as_bytes());
    let project = VbaProject::parse(&bytes).expect("parse");
    assert_eq!(project.modules[0].module_type, ModuleType::Class);
}
