//! Build artifacts handed to the post-processor.

/// Builder identifier of artifacts produced by the VMware builder.
pub const VMWARE_BUILDER_ID: &str = "mitchellh.vmware";

/// File suffix of the VM descriptor among the artifact's files.
pub const VMX_SUFFIX: &str = ".vmx";

/// Provider name exposed to path templates.
pub const PROVIDER: &str = "vmware";

/// Read-only view of the output of a previous build step.
pub trait Artifact {
    /// Identifier of the builder that produced the artifact.
    fn builder_id(&self) -> &str;

    /// Paths of the files that make up the artifact, in builder order.
    fn files(&self) -> &[String];

    /// Unique identifier of the artifact.
    fn id(&self) -> &str;

    /// Human readable summary.
    fn describe(&self) -> String {
        format!("VM files in build: {}", self.files().join(", "))
    }
}

/// An artifact described by plain owned values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    builder_id: String,
    id: String,
    files: Vec<String>,
}

impl BuildArtifact {
    /// Create an artifact from its builder id, artifact id and files.
    pub fn new(builder_id: impl Into<String>, id: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            builder_id: builder_id.into(),
            id: id.into(),
            files,
        }
    }

    /// Create an artifact attributed to the VMware builder.
    pub fn vmware(id: impl Into<String>, files: Vec<String>) -> Self {
        Self::new(VMWARE_BUILDER_ID, id, files)
    }
}

impl Artifact for BuildArtifact {
    fn builder_id(&self) -> &str {
        &self.builder_id
    }

    fn files(&self) -> &[String] {
        &self.files
    }

    fn id(&self) -> &str {
        &self.id
    }
}
