fn main() {
    println!(
        "cargo:rustc-link-search=native={}",
        concat!(env!("CARGO_MANIFEST_DIR"), "/..")
    );
    println!("cargo:rustc-link-arg=-Tkernel/linker.ld");
    println!("cargo:rerun-if-changed=linker.ld");
}
