fn main() {
    // Tell Cargo to rerun this build script if the trap helper changes
    println!("cargo:rerun-if-changed=src/runtime/helpers.c");

    // The resumption point for traps is a sigsetjmp taken in C: Rust has no
    // way to express a function that returns twice.
    let mut build = cc::Build::new();
    build.file("src/runtime/helpers.c");
    build.warnings(true);
    build.compile("kasm-core-helpers");
}
