//! Build script.
//!
//! No codegen or native toolchain checks are needed; this only re-runs the
//! build when its own source changes.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
