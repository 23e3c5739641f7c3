use which::which;

/// Building the BPF object has an undeclared dependency on the
/// `bpf-linker` binary, which `rustc` invokes to link it. Track the
/// linker so the object is relinked when it changes; its absence only
/// matters when actually targeting bpf.
fn main() {
    if let Ok(bpf_linker) = which("bpf-linker") {
        println!("cargo:rerun-if-changed={}", bpf_linker.display());
    }
}
