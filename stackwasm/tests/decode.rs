mod common;

use common::{assemble, module, HEADER};
use stackwasm::error::DecodeError;
use stackwasm::model::{ConstExpr, Export, ExternalKind, FuncKind, Limits, MemoryType};
use stackwasm::{decode, FuncType, Module, NoImports, ValType};

type Check = fn(&Module);

fn check_empty(m: &Module) {
    assert!(m.types.is_empty());
    assert!(m.functions.is_empty());
    assert!(m.exports.is_empty());
    assert_eq!(m.start, None);
}

fn check_answer(m: &Module) {
    assert_eq!(m.types, vec![FuncType::new(&[], &[ValType::I32])]);
    assert_eq!(m.functions.len(), 1);
    assert!(matches!(m.functions[0].kind, FuncKind::Defined { body: 0 }));
    assert_eq!(m.exported_func("answer"), Some(0));
    assert_eq!(m.bodies[0].code, vec![0x41, 0x2A, 0x0B]);
}

fn check_memory_and_data(m: &Module) {
    assert_eq!(
        m.memories,
        vec![MemoryType {
            limits: Limits::new(1, Some(2))
        }]
    );
    assert_eq!(
        m.export("mem"),
        Some(Export {
            kind: ExternalKind::Memory,
            index: 0
        })
    );
    assert_eq!(m.data.len(), 1);
    assert_eq!(m.data[0].offset, ConstExpr::I32(16));
    assert_eq!(m.data[0].init, b"abc".to_vec());
}

fn check_globals_and_start(m: &Module) {
    assert_eq!(m.globals.len(), 2);
    assert!(m.globals[0].ty.mutable);
    assert_eq!(m.globals[0].init, ConstExpr::I64(-1));
    assert_eq!(m.globals[1].init, ConstExpr::F32(1.5f32.to_bits()));
    assert_eq!(m.start, Some(0));
    assert_eq!(m.bodies[0].locals.len(), 1);
    assert_eq!(m.bodies[0].local_count(), 3);
}

#[test]
fn decodes_known_modules() {
    let answer = assemble(&[
        (1, &[0x01, 0x60, 0x00, 0x01, 0x7F]),
        (3, &[0x01, 0x00]),
        (7, &[0x01, 0x06, b'a', b'n', b's', b'w', b'e', b'r', 0x00, 0x00]),
        (10, &[0x01, 0x04, 0x00, 0x41, 0x2A, 0x0B]),
    ]);
    let memory = assemble(&[
        (5, &[0x01, 0x01, 0x01, 0x02]),
        (7, &[0x01, 0x03, b'm', b'e', b'm', 0x02, 0x00]),
        (11, &[0x01, 0x00, 0x41, 0x10, 0x0B, 0x03, b'a', b'b', b'c']),
    ]);
    let globals = assemble(&[
        (1, &[0x01, 0x60, 0x00, 0x00]),
        (3, &[0x01, 0x00]),
        (
            6,
            &[
                0x02, 0x7E, 0x01, 0x42, 0x7F, 0x0B, 0x7D, 0x00, 0x43, 0x00, 0x00, 0xC0, 0x3F, 0x0B,
            ],
        ),
        (8, &[0x00]),
        (10, &[0x01, 0x04, 0x01, 0x03, 0x7C, 0x0B]),
    ]);

    let table: [(&str, Vec<u8>, Check); 4] = [
        ("empty", HEADER.to_vec(), check_empty),
        ("answer", answer, check_answer),
        ("memory and data", memory, check_memory_and_data),
        ("globals and start", globals, check_globals_and_start),
    ];
    for (name, bytes, check) in table {
        let m = decode(&bytes, &mut NoImports)
            .unwrap_or_else(|e| panic!("{name}: decode failed: {e}"));
        check(&m);
    }
}

#[test]
fn text_format_modules_decode() {
    // the name section wat emits is a custom section and must be skipped
    let m = module(
        r#"(module
            (func $double (export "double") (param $x i32) (result i32)
                local.get $x
                i32.const 2
                i32.mul))"#,
    );
    assert_eq!(m.exported_func("double"), Some(0));
    assert_eq!(
        m.func_type(0),
        Some(&FuncType::new(&[ValType::I32], &[ValType::I32]))
    );
}

#[test]
fn unknown_section_is_rejected() {
    let bytes = assemble(&[(12, &[0x00])]);
    assert!(matches!(
        decode(&bytes, &mut NoImports),
        Err(DecodeError::UnknownSection { id: 12, offset: 8 })
    ));
}

#[test]
fn duplicate_export_is_rejected() {
    let bytes = assemble(&[
        (1, &[0x01, 0x60, 0x00, 0x00]),
        (3, &[0x01, 0x00]),
        (7, &[0x02, 0x01, b'f', 0x00, 0x00, 0x01, b'f', 0x00, 0x00]),
        (10, &[0x01, 0x02, 0x00, 0x0B]),
    ]);
    match decode(&bytes, &mut NoImports) {
        Err(DecodeError::DuplicateExport(name)) => assert_eq!(name, "f"),
        other => panic!("expected duplicate export, got {other:?}"),
    }
}

#[test]
fn function_and_code_counts_must_agree() {
    let bytes = assemble(&[
        (1, &[0x01, 0x60, 0x00, 0x00]),
        (3, &[0x02, 0x00, 0x00]),
        (10, &[0x01, 0x02, 0x00, 0x0B]),
    ]);
    assert!(matches!(
        decode(&bytes, &mut NoImports),
        Err(DecodeError::FunctionCodeMismatch {
            functions: 2,
            bodies: 1
        })
    ));
}

#[test]
fn truncated_input_is_malformed() {
    let mut bytes = assemble(&[(1, &[0x01, 0x60, 0x00, 0x00])]);
    bytes.truncate(bytes.len() - 1);
    let err = decode(&bytes, &mut NoImports).unwrap_err();
    assert!(matches!(err, DecodeError::Binary(_)), "{err}");
}

#[test]
fn missing_import_module_names_the_import() {
    let bytes = assemble(&[
        (1, &[0x01, 0x60, 0x00, 0x00]),
        (2, &[0x01, 0x03, b'e', b'n', b'v', 0x01, b'f', 0x00, 0x00]),
    ]);
    let err = decode(&bytes, &mut NoImports).unwrap_err();
    match &err {
        DecodeError::ImportResolution { index, module, .. } => {
            assert_eq!(*index, 0);
            assert_eq!(module, "env");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn malformed_custom_section_name_is_rejected() {
    let named = assemble(&[(0, &[0x04, b'n', b'a', b'm', b'e', 0xAA])]);
    assert!(decode(&named, &mut NoImports).is_ok());

    // name length runs past the section payload
    let truncated = assemble(&[(0, &[0x05, b'a'])]);
    let err = decode(&truncated, &mut NoImports).unwrap_err();
    assert!(matches!(err, DecodeError::Binary(_)), "{err}");

    let not_utf8 = assemble(&[(0, &[0x02, 0xC3, 0x28])]);
    let err = decode(&not_utf8, &mut NoImports).unwrap_err();
    assert!(matches!(err, DecodeError::Binary(_)), "{err}");
}
