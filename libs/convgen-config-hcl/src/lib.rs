use convgen_engine::config::{ConfigParser, GenConfig};
use convgen_engine::error::GenError;

/// Reads `convgen.hcl` files.
pub struct HclParser;

impl ConfigParser for HclParser {
    fn extensions(&self) -> &[&str] {
        &["hcl"]
    }

    fn parse(&self, content: &str) -> Result<GenConfig, GenError> {
        hcl::from_str(content).map_err(|e| GenError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convgen_engine::config::TomlParser;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn parses_blocks_and_attributes() {
        let config = HclParser
            .parse(
                r#"
model      = "model.json"
output_dir = "out"
packages   = ["example.com/convert", "example.com/tests"]

emit {
  json = false
}
"#,
            )
            .unwrap();
        assert_eq!(config.model, Some(PathBuf::from("model.json")));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.packages.len(), 2);
        assert!(!config.emit.json);
        assert!(config.emit.report);
    }

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(HclParser.parse("").unwrap(), GenConfig::default());
    }

    #[test]
    fn load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convgen.hcl");
        std::fs::write(&path, "output_dir = \"gen\"\n").unwrap();

        let config = GenConfig::load_with(&path, &[&TomlParser, &HclParser]).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("gen"));

        let err = GenConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
