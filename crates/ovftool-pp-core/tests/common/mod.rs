//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// File the fake tool writes its arguments to, next to the source VMX.
pub const ARGS_FILE: &str = "ovftool-args.txt";

/// If present next to the source VMX, the fake tool prints its contents
/// to stderr and exits 1.
pub const FAIL_FILE: &str = "ovftool-fail";

const FAKE_OVFTOOL: &str = r#"#!/bin/sh
src=""
last=""
for arg in "$@"; do
  src="$last"
  last="$arg"
done
dir=$(dirname "$src")
printf '%s\n' "$@" > "$dir/ovftool-args.txt"
if [ -f "$dir/ovftool-fail" ]; then
  cat "$dir/ovftool-fail" >&2
  exit 1
fi
echo "Opening VMX source: $src"
echo "Completed successfully" >&2
exit 0
"#;

/// Path to the fixture VMX.
pub fn fixture_vmx() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/build.vmx")
}

/// A stand-in `ovftool`, written once per test binary.
#[cfg(unix)]
pub fn fake_ovftool() -> &'static Path {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::OnceLock;

    static TOOL: OnceLock<PathBuf> = OnceLock::new();
    TOOL.get_or_init(|| {
        let dir = tempfile::tempdir().expect("create tool dir").keep();
        let path = dir.join("ovftool");
        fs::write(&path, FAKE_OVFTOOL).expect("write fake ovftool");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake ovftool");
        path
    })
}

/// Copy the fixture VMX into `dir` and return the copy's path as a string.
pub fn stage_vmx(dir: &Path) -> String {
    let vmx = dir.join("machine.vmx");
    fs::copy(fixture_vmx(), &vmx).expect("copy fixture VMX");
    vmx.to_string_lossy().into_owned()
}

/// Arguments recorded by the fake tool, if it ran.
pub fn recorded_args(dir: &Path) -> Option<Vec<String>> {
    fs::read_to_string(dir.join(ARGS_FILE))
        .ok()
        .map(|s| s.lines().map(str::to_string).collect())
}
