//! ovftool post-processor core library.
//!
//! This crate turns the output of a VMware build into an OVF or OVA
//! appliance by running VMware's `ovftool`.
//!
//! # Overview
//!
//! Configuration is resolved once with [`PostProcessor::configure`]. Each
//! artifact then goes through [`PostProcessor::post_process`], which strips
//! floppy and CD-ROM references from the VMX, renders the output path and
//! runs `ovftool`.
//!
//! # Modules
//!
//! - [`error`] - Error types and Result alias
//! - [`config`] - Configuration decoding, defaults and validation
//! - [`template`] - Output path templates
//! - [`vmx`] - VMX file reading and writing
//! - [`media`] - Removable-media stripping
//! - [`artifact`] - Build artifact abstraction
//! - [`ui`] - User-facing message sink
//! - [`ovftool`] - Argument construction and process execution
//! - [`postprocessor`] - The post-processor itself

pub mod artifact;
pub mod config;
pub mod error;
pub mod media;
pub mod ovftool;
pub mod postprocessor;
pub mod template;
pub mod ui;
pub mod vmx;

pub use error::{Error, Result, ValidationError, ValidationErrors};

pub use artifact::{Artifact, BuildArtifact, VMWARE_BUILDER_ID};
pub use config::{Config, RawConfig, TargetType, DEFAULT_EXECUTABLE};
pub use media::strip_removable_media;
pub use ovftool::{ConversionArgs, OvfTool};
pub use postprocessor::PostProcessor;
pub use ui::{LogUi, Ui};
