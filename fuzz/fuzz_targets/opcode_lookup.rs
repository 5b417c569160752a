#![no_main]

use libfuzzer_sys::fuzz_target;

use kasm_core::opcodes::{code_of, name_of, Opcode, TypeClass};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let class = TypeClass::ALL[selector as usize % TypeClass::ALL.len()];

    // Every code either names an operation that maps back to it, or is rejected
    for &code in rest {
        match name_of(class, code) {
            Ok(name) => assert_eq!(code_of(class, name), Ok(code)),
            Err(_) => assert!(Opcode::from_code(class, code).is_err()),
        }
    }

    // Arbitrary text must never resolve to a code whose name differs
    let name = String::from_utf8_lossy(rest);
    if let Ok(code) = code_of(class, &name) {
        assert_eq!(name_of(class, code), Ok(&*name));
    }
});
