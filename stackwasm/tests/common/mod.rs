#![allow(dead_code)]

use stackwasm::{decode, validate, ImportResolver, Module, NoImports, Vm, VmConfig};

pub const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

pub fn uleb(mut n: u32) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Header followed by `(id, payload)` sections with LEB128 sizes.
pub fn assemble(sections: &[(u8, &[u8])]) -> Vec<u8> {
    let mut out = HEADER.to_vec();
    for (id, payload) in sections {
        out.push(*id);
        out.extend(uleb(payload.len() as u32));
        out.extend_from_slice(payload);
    }
    out
}

pub fn wasm(text: &str) -> Vec<u8> {
    wat::parse_str(text).expect("test module should assemble")
}

pub fn module(text: &str) -> Module {
    decode(&wasm(text), &mut NoImports).expect("test module should decode")
}

pub fn module_with<R: ImportResolver>(text: &str, resolver: &mut R) -> Module {
    decode(&wasm(text), resolver).expect("test module should decode")
}

pub fn vm(text: &str) -> Vm {
    vm_with(text, VmConfig::default())
}

pub fn vm_with(text: &str, config: VmConfig) -> Vm {
    let validated = validate(module(text)).expect("test module should validate");
    Vm::instantiate(validated, config).expect("test module should instantiate")
}
