//! Build script for delsnoop
//!
//! Compiles the `delsnoop-ebpf` package for the BPF target and drops the
//! object in `OUT_DIR`, where the loader embeds it. When `bpf-linker` is
//! not installed an empty object is embedded instead so host builds and
//! unit tests still work; loading it then fails at startup.

use std::{env, fs, path::PathBuf};

use anyhow::{anyhow, Context as _};
use aya_build::cargo_metadata;

fn main() -> anyhow::Result<()> {
    if which::which("bpf-linker").is_err() {
        println!(
            "cargo:warning=bpf-linker not found; embedding an empty eBPF object. \
             Install it with `cargo install bpf-linker` to produce a loadable binary."
        );
        let out = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR not set")?).join("delsnoop");
        fs::write(&out, []).with_context(|| format!("write {}", out.display()))?;
        return Ok(());
    }

    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .no_deps()
        .exec()
        .context("MetadataCommand::exec")?;
    let ebpf_package = packages
        .into_iter()
        .find(|cargo_metadata::Package { name, .. }| name == "delsnoop-ebpf")
        .ok_or_else(|| anyhow!("delsnoop-ebpf package not found"))?;
    aya_build::build_ebpf([ebpf_package])
}
