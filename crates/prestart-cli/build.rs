use std::env;
use std::process::Command;

/// Record the compiler version as the default running version for the
/// compatibility check.
fn main() {
    println!("cargo:rerun-if-env-changed=RUSTC");
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .and_then(|text| {
            let full = text.split_whitespace().nth(1)?;
            // drop `-nightly`, `-beta.N` so ranges match the release line
            full.split('-').next().map(str::to_string)
        })
        .unwrap_or_default();
    println!("cargo:rustc-env=PRESTART_RUSTC_VERSION={version}");
}
