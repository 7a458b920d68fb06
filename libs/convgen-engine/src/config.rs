use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::GenError;

/// Root configuration, parsed from TOML by default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenConfig {
    /// Object model (JSON) to generate from.
    #[serde(default)]
    pub model: Option<PathBuf>,

    /// Directory receiving the emitted files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Generating packages, matched by path suffix. Empty selects every
    /// package carrying a `gen:convert` directive.
    #[serde(default)]
    pub packages: Vec<String>,

    #[serde(default)]
    pub emit: EmitConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_true() -> bool {
    true
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            model: None,
            output_dir: default_output_dir(),
            packages: Vec::new(),
            emit: EmitConfig::default(),
        }
    }
}

/// Which outputs are written per generating package.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmitConfig {
    /// `<package>.plan.json`
    #[serde(default = "default_true")]
    pub json: bool,
    /// `<package>.report.txt`
    #[serde(default = "default_true")]
    pub report: bool,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            json: true,
            report: true,
        }
    }
}

/// A configuration format.
pub trait ConfigParser {
    /// File extensions handled by this parser, without the dot.
    fn extensions(&self) -> &[&str];

    fn parse(&self, content: &str) -> Result<GenConfig, GenError>;
}

pub struct TomlParser;

impl ConfigParser for TomlParser {
    fn extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn parse(&self, content: &str) -> Result<GenConfig, GenError> {
        GenConfig::parse(content)
    }
}

impl GenConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GenError> {
        Self::load_with(path, &[&TomlParser])
    }

    /// Load configuration, picking the parser by file extension.
    pub fn load_with(path: impl AsRef<Path>, parsers: &[&dyn ConfigParser]) -> Result<Self, GenError> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let parser = parsers
            .iter()
            .find(|p| p.extensions().contains(&ext))
            .ok_or_else(|| GenError::Config(format!("{}: unsupported config format", path.display())))?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| GenError::Config(format!("{}: {e}", path.display())))?;
        parser
            .parse(&content)
            .map_err(|e| e.with_context(path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, GenError> {
        toml::from_str(toml_str).map_err(|e| GenError::Config(e.to_string()))
    }
}
