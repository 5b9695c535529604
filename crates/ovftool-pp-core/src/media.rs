//! Removal of removable-media devices from a VMX file.
//!
//! ovftool refuses or mangles exports that still reference the floppy
//! image and installer ISO used during the build, so those entries are
//! dropped and both devices are marked absent before conversion.

use crate::error::Result;
use crate::vmx::{read_vmx, write_vmx, VmxData};
use std::path::Path;
use tracing::debug;

/// Every key under this prefix describes the floppy drive.
pub const FLOPPY_PREFIX: &str = "floppy0.";

/// Keys under this prefix name the image attached to the CD-ROM drive.
pub const CDROM_FILE_PREFIX: &str = "ide1:0.file";

pub const FLOPPY_PRESENT_KEY: &str = "floppy0.present";
pub const CDROM_PRESENT_KEY: &str = "ide1:0.present";

/// Strip floppy and CD-ROM entries from the VMX at `path`, in place.
///
/// # Arguments
///
/// * `path` - VMX descriptor to rewrite.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read or written back.
pub fn strip_removable_media(path: &Path) -> Result<()> {
    let mut data = read_vmx(path)?;
    let before = data.len();
    strip_removable_media_entries(&mut data);
    debug!(
        path = %path.display(),
        before,
        after = data.len(),
        "stripped removable media from VMX"
    );
    write_vmx(path, &data)
}

/// Strip floppy and CD-ROM entries from an in-memory mapping.
///
/// Deletion runs first and the two `present` flags are set afterwards, so
/// `floppy0.present` survives as `FALSE` even though it matches the floppy
/// prefix.
pub fn strip_removable_media_entries(data: &mut VmxData) {
    data.retain(|key, _| !key.starts_with(FLOPPY_PREFIX) && !key.starts_with(CDROM_FILE_PREFIX));
    data.insert(FLOPPY_PRESENT_KEY, "FALSE");
    data.insert(CDROM_PRESENT_KEY, "FALSE");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VmxData {
        [
            ("floppy0.fileName", "a.flp"),
            ("floppy0.present", "TRUE"),
            ("ide1:0.fileName", "cd.iso"),
            ("ide1:0.present", "TRUE"),
            ("ethernet0.present", "TRUE"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_strip_entries_example() {
        let mut data = sample();
        strip_removable_media_entries(&mut data);

        let expected: VmxData = [
            ("floppy0.present", "FALSE"),
            ("ide1:0.present", "FALSE"),
            ("ethernet0.present", "TRUE"),
        ]
        .into_iter()
        .collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn test_strip_entries_inserts_missing_flags() {
        let mut data: VmxData = [("memsize", "1024")].into_iter().collect();
        strip_removable_media_entries(&mut data);
        assert_eq!(data.get(FLOPPY_PRESENT_KEY), Some("FALSE"));
        assert_eq!(data.get(CDROM_PRESENT_KEY), Some("FALSE"));
        assert_eq!(data.get("memsize"), Some("1024"));
    }

    #[test]
    fn test_strip_entries_keeps_other_ide_devices() {
        let mut data: VmxData = [
            ("ide0:0.fileName", "disk.vmdk"),
            ("ide1:0.deviceType", "cdrom-image"),
            ("ide1:0.fileType", "iso"),
        ]
        .into_iter()
        .collect();
        strip_removable_media_entries(&mut data);
        assert_eq!(data.get("ide0:0.fileName"), Some("disk.vmdk"));
        assert_eq!(data.get("ide1:0.deviceType"), Some("cdrom-image"));
        assert!(!data.contains_key("ide1:0.fileType"));
    }

    #[test]
    fn test_strip_entries_is_idempotent() {
        let mut once = sample();
        strip_removable_media_entries(&mut once);
        let mut twice = once.clone();
        strip_removable_media_entries(&mut twice);

        assert_eq!(once, twice);
        assert_eq!(once.to_vmx_string(), twice.to_vmx_string());
        for (key, _) in twice.iter() {
            assert!(!key.starts_with(FLOPPY_PREFIX) || key == FLOPPY_PRESENT_KEY);
            assert!(!key.starts_with(CDROM_FILE_PREFIX));
        }
    }
}
