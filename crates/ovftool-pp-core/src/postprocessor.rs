//! The post-processor entry points.
//!
//! # Example
//!
//! ```no_run
//! use ovftool_pp_core::{BuildArtifact, LogUi, PostProcessor};
//! use serde_json::json;
//!
//! let pp = PostProcessor::configure(&[json!({"format": "ova", "packer_build_name": "demo"})])?;
//! let artifact = BuildArtifact::vmware("web01", vec!["build/machine.vmx".to_string()]);
//! let (artifact, keep) = pp.post_process(&LogUi, artifact)?;
//! # Ok::<(), ovftool_pp_core::Error>(())
//! ```

use crate::artifact::{Artifact, VMWARE_BUILDER_ID, VMX_SUFFIX};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::strip_removable_media;
use crate::ovftool::{ConversionArgs, OvfTool};
use crate::ui::Ui;
use serde_json::Value;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, info_span, warn};

/// Converts VMware artifacts to OVF/OVA with `ovftool`.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    config: Config,
    tool: OvfTool,
}

impl PostProcessor {
    /// Configure from raw configuration objects, using `ovftool` from the
    /// search path.
    ///
    /// # Arguments
    ///
    /// * `raws` - JSON objects merged in order, later keys winning.
    ///
    /// # Errors
    ///
    /// Returns the decode or validation error from [`Config::configure`].
    pub fn configure(raws: &[Value]) -> Result<Self> {
        Config::configure(raws).map(Self::new)
    }

    /// Configure with an explicit executable name or path.
    ///
    /// # Errors
    ///
    /// Same as [`PostProcessor::configure`].
    pub fn configure_with_executable(raws: &[Value], executable: impl AsRef<OsStr>) -> Result<Self> {
        Config::configure_with_executable(raws, executable).map(Self::new)
    }

    /// Wrap an already validated configuration.
    pub fn new(config: Config) -> Self {
        let tool = OvfTool::new(config.ovftool());
        Self { config, tool }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert `artifact` and hand it back unchanged.
    ///
    /// The appliance is written to disk as a side effect.
    ///
    /// # Arguments
    ///
    /// * `ui` - Receives progress messages and the tool's output.
    /// * `artifact` - Output of a VMware build. Its VMX is rewritten in place.
    ///
    /// # Returns
    ///
    /// The same artifact and a keep flag that is always `false`: this
    /// post-processor never asks for the incoming artifact to be discarded.
    ///
    /// # Errors
    ///
    /// Fails without side effects on a non-VMware artifact or a missing VMX.
    /// Sanitizer, template and tool failures abort the conversion.
    pub fn post_process<A: Artifact>(&self, ui: &dyn Ui, artifact: A) -> Result<(A, bool)> {
        let span = info_span!("post_process", artifact = artifact.id());
        let _enter = span.enter();

        if artifact.builder_id() != VMWARE_BUILDER_ID {
            return Err(Error::UnsupportedArtifact {
                builder_id: artifact.builder_id().to_string(),
            });
        }

        let vmx = find_vmx(artifact.files()).ok_or(Error::DescriptorNotFound)?;

        ui.say("Stripping floppy and CD-ROM drives from VMX");
        strip_removable_media(Path::new(vmx)).map_err(|e| Error::strip_drives(vmx, e))?;

        let target = self.config.render_target_path(artifact.id())?;
        let args = ConversionArgs {
            target_type: self.config.target_type(),
            compression: self.config.compression(),
            source: vmx.to_string(),
            target,
        }
        .to_args();

        ui.message(&format!("Executing ovftool with arguments: [{}]", args.join(" ")));
        let output = self.tool.run(&args).inspect_err(|e| {
            if let Error::ToolFailed { status, .. } = e {
                ui.error(&format!("ovftool exited with {}", status));
            }
        })?;
        ui.message(&output);

        info!(vmx, "conversion finished");
        Ok((artifact, false))
    }
}

/// Pick the VMX among the artifact files. The last match wins.
pub fn find_vmx(files: &[String]) -> Option<&str> {
    let matches: Vec<&str> = files
        .iter()
        .map(String::as_str)
        .filter(|f| f.ends_with(VMX_SUFFIX))
        .collect();

    if matches.len() > 1 {
        warn!(candidates = ?matches, "artifact has several VMX files, using the last");
    }
    matches.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_vmx() {
        let f = files(&["build/disk.vmdk", "build/machine.vmx"]);
        assert_eq!(find_vmx(&f), Some("build/machine.vmx"));
    }

    #[test]
    fn test_find_vmx_none() {
        let f = files(&["build/disk.vmdk", "build/machine.vmxf"]);
        assert_eq!(find_vmx(&f), None);
    }

    #[test]
    fn test_find_vmx_last_wins() {
        let f = files(&["a/first.vmx", "b/disk.vmdk", "c/second.vmx"]);
        assert_eq!(find_vmx(&f), Some("c/second.vmx"));
    }
}
