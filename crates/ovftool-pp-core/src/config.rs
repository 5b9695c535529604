//! Post-processor configuration.
//!
//! Raw configuration arrives as a sequence of JSON objects. They are merged
//! in order, decoded into [`RawConfig`], defaulted, and validated into an
//! immutable [`Config`]. Validation collects every failure before
//! reporting, so a user sees all problems with a template at once.

use crate::artifact::PROVIDER;
use crate::error::{Error, Result, ValidationError, ValidationErrors};
use crate::template::{Template, TemplateFields};
use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Name of the conversion executable looked up on the search path.
pub const DEFAULT_EXECUTABLE: &str = "ovftool";

/// Target path used when none is configured. `.ova` is appended for OVA output.
pub const DEFAULT_TARGET_PATH: &str = "packer_{{ .BuildName }}_{{ .Provider }}";

const USER_VARIABLES_KEY: &str = "packer_user_variables";

/// Container format produced by ovftool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    /// Descriptor plus disk files in a directory.
    #[default]
    Ovf,
    /// Single tar archive.
    Ova,
}

impl TargetType {
    /// The value passed to `--targetType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Ovf => "ovf",
            TargetType::Ova => "ova",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ovf" => Ok(TargetType::Ovf),
            "ova" => Ok(TargetType::Ova),
            other => Err(ValidationError::InvalidTargetType {
                value: other.to_string(),
            }),
        }
    }
}

/// Settings the build framework passes to every plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Name of the build this artifact belongs to.
    #[serde(rename = "packer_build_name")]
    pub build_name: String,
    /// Type of the builder that ran.
    #[serde(rename = "packer_builder_type")]
    pub builder_type: String,
    #[serde(rename = "packer_debug", deserialize_with = "weak_bool")]
    pub debug: bool,
    #[serde(rename = "packer_force", deserialize_with = "weak_bool")]
    pub force: bool,
    /// Variables available to templates through `user`.
    #[serde(rename = "packer_user_variables")]
    pub user_variables: HashMap<String, String>,
}

/// Decoded but not yet defaulted or validated configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    #[serde(flatten)]
    pub packer: PackerConfig,
    /// Output path template.
    #[serde(rename = "target")]
    pub target_path: Option<String>,
    /// `ovf` or `ova`.
    #[serde(rename = "format")]
    pub target_type: Option<String>,
    /// ovftool compression level as given, `None` when unset.
    #[serde(deserialize_with = "weak_number")]
    pub compression: Option<Number>,
}

impl RawConfig {
    /// Merge and decode raw configuration objects.
    ///
    /// Later objects override earlier ones key by key; user variable maps
    /// are merged. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a decode error if an input is not an object or a known key
    /// has a value of the wrong type.
    pub fn decode(raws: &[Value]) -> Result<Self> {
        let merged = merge_raw(raws)?;
        serde_json::from_value(merged).map_err(|e| Error::decode(e.to_string()))
    }

    /// Fill in the format and the target path when they are unset.
    ///
    /// The format default is applied first so an OVA target gets the
    /// `.ova` suffix on its default path.
    pub fn apply_defaults(&mut self) {
        if self.target_type.as_deref().map_or(true, str::is_empty) {
            self.target_type = Some(TargetType::Ovf.to_string());
        }

        if self.target_path.as_deref().map_or(true, str::is_empty) {
            let mut path = DEFAULT_TARGET_PATH.to_string();
            if self.target_type.as_deref() == Some(TargetType::Ova.as_str()) {
                path.push_str(".ova");
            }
            self.target_path = Some(path);
        }
    }

    /// Apply defaults and run every check.
    ///
    /// `executable` is resolved against the search path; a path containing
    /// a separator is checked directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every failed check.
    pub fn validate(mut self, executable: &OsStr) -> Result<Config> {
        self.apply_defaults();
        let mut errs = ValidationErrors::new();

        let ovftool = match which::which(executable) {
            Ok(path) => Some(path),
            Err(e) => {
                errs.push(ValidationError::ExecutableNotFound {
                    name: executable.to_string_lossy().into_owned(),
                    reason: e.to_string(),
                });
                None
            }
        };

        let source = self.target_path.unwrap_or_default();
        let template = match Template::parse(&source)
            .and_then(|tpl| tpl.validate_fields(TargetPathData::FIELDS).map(|_| tpl))
        {
            Ok(tpl) => Some(tpl),
            Err(e) => {
                let message = match e {
                    Error::Template { message } => message,
                    other => other.to_string(),
                };
                errs.push(ValidationError::InvalidTemplate { message });
                None
            }
        };

        let target_type = match self.target_type.unwrap_or_default().parse::<TargetType>() {
            Ok(t) => Some(t),
            Err(e) => {
                errs.push(e);
                None
            }
        };

        let compression = match self.compression.as_ref() {
            None => Some(0),
            Some(n) => match compression_level(n) {
                Some(level) => Some(level),
                None => {
                    errs.push(ValidationError::InvalidCompression {
                        level: n.to_string(),
                    });
                    None
                }
            },
        };

        match (ovftool, template, target_type, compression) {
            (Some(ovftool), Some(target_path), Some(target_type), Some(compression))
                if errs.is_empty() =>
            {
                debug!(
                    ovftool = %ovftool.display(),
                    target = target_path.source(),
                    %target_type,
                    compression,
                    "configuration validated"
                );
                Ok(Config {
                    target_path,
                    target_type,
                    compression,
                    packer: self.packer,
                    ovftool,
                })
            }
            _ => Err(Error::Config(errs)),
        }
    }
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct Config {
    target_path: Template,
    target_type: TargetType,
    compression: u8,
    packer: PackerConfig,
    ovftool: PathBuf,
}

impl Config {
    /// Decode, default and validate raw configuration, looking up the
    /// default `ovftool` executable.
    ///
    /// # Arguments
    ///
    /// * `raws` - JSON objects merged in order, later keys winning.
    ///
    /// # Returns
    ///
    /// The validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the objects cannot be decoded, otherwise
    /// [`Error::Config`] listing every failed check.
    pub fn configure(raws: &[Value]) -> Result<Self> {
        Self::configure_with_executable(raws, DEFAULT_EXECUTABLE)
    }

    /// Like [`Config::configure`] with an explicit executable name or path.
    ///
    /// # Arguments
    ///
    /// * `raws` - JSON objects merged in order, later keys winning.
    /// * `executable` - Name looked up on the search path, or a path used as is.
    ///
    /// # Returns
    ///
    /// The validated configuration, with the resolved executable path.
    ///
    /// # Errors
    ///
    /// Same as [`Config::configure`].
    pub fn configure_with_executable(raws: &[Value], executable: impl AsRef<OsStr>) -> Result<Self> {
        RawConfig::decode(raws)?.validate(executable.as_ref())
    }

    /// The parsed output path template.
    pub fn target_path(&self) -> &Template {
        &self.target_path
    }

    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    /// Compression level, 0 when disabled.
    pub fn compression(&self) -> u8 {
        self.compression
    }

    pub fn build_name(&self) -> &str {
        &self.packer.build_name
    }

    pub fn packer(&self) -> &PackerConfig {
        &self.packer
    }

    /// Resolved path of the conversion executable.
    pub fn ovftool(&self) -> &Path {
        &self.ovftool
    }

    /// Render the output path for an artifact.
    pub fn render_target_path(&self, artifact_id: &str) -> Result<String> {
        let data = TargetPathData {
            artifact_id: artifact_id.to_string(),
            build_name: self.packer.build_name.clone(),
            provider: PROVIDER.to_string(),
        };
        self.target_path.render(&data, &self.packer.user_variables)
    }
}

/// Values available to the output path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPathData {
    pub artifact_id: String,
    pub build_name: String,
    pub provider: String,
}

impl TargetPathData {
    /// Field names accepted in the output path template.
    pub const FIELDS: &'static [&'static str] = &["ArtifactId", "BuildName", "Provider"];
}

impl TemplateFields for TargetPathData {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "ArtifactId" => Some(self.artifact_id.clone()),
            "BuildName" => Some(self.build_name.clone()),
            "Provider" => Some(self.provider.clone()),
            _ => None,
        }
    }
}

fn merge_raw(raws: &[Value]) -> Result<Value> {
    let mut merged = Map::new();

    for raw in raws {
        let object = match raw {
            Value::Null => continue,
            Value::Object(object) => object,
            other => {
                return Err(Error::decode(format!(
                    "expected a configuration object, got {}",
                    other
                )))
            }
        };

        for (key, value) in object {
            if key == USER_VARIABLES_KEY {
                if let (Some(Value::Object(existing)), Value::Object(update)) =
                    (merged.get_mut(key), value)
                {
                    existing.extend(update.clone());
                    continue;
                }
            }
            merged.insert(key.clone(), value.clone());
        }
    }

    Ok(Value::Object(merged))
}

/// Compression level in 0..=9. Whole-number floats such as `5.0` count.
fn compression_level(n: &Number) -> Option<u8> {
    let level = match n.as_u64() {
        Some(level) => level,
        None => {
            let f = n.as_f64()?;
            if f.fract() != 0.0 || !(0.0..=9.0).contains(&f) {
                return None;
            }
            f as u64
        }
    };
    u8::try_from(level).ok().filter(|level| *level <= 9)
}

/// Accept any JSON number or a numeric string. `null` and `""` are unset.
fn weak_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Number>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<Number>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("cannot parse {:?} as a number", s))),
        other => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

/// Accept a boolean or one of `"true"`, `"false"`, `"1"`, `"0"`. `null` is false.
fn weak_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("cannot parse {:?} as a boolean", other))),
        },
        other => Err(de::Error::custom(format!("expected a boolean, got {}", other))),
    }
}
