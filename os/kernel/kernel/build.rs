use kernel_info::memory;
use std::{env, path::PathBuf};

fn main() {
    // Point to the linker script
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let ld = manifest_dir.join("kernel.ld");

    // Sanity checks (fail fast during build)
    let kernel_vma = memory::KERNEL_VMA;
    let phys_load = memory::PHYS_LOAD;
    assert_eq!(
        kernel_vma & (memory::DIRECTORY_ENTRY_SPAN - 1),
        0,
        "KERNEL_VMA must be 4 MiB aligned (got {kernel_vma:#x})"
    );
    assert_eq!(
        phys_load & (memory::PAGE_SIZE - 1),
        0,
        "PHYS_LOAD must be 4 KiB aligned (got {phys_load:#x})"
    );

    // Rebuild when inputs change
    println!("cargo:rerun-if-changed={}", ld.display());

    // Host builds (tests, clippy) link a stub binary without the script.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    // Linker script
    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());

    // Provide symbols to the linker script
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_VMA={kernel_vma:#x}");
    println!("cargo:rustc-link-arg-bins=--defsym=PHYS_LOAD={phys_load:#x}");
}
