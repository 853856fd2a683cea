use std::{env, fs, path::PathBuf};

fn main() {
    // Put the memory map where the cortex-m-rt link script can find it
    // when the firmware binary is linked.
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::copy("memory.x", out_dir.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
}
