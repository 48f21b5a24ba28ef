//! Compiler configuration
//!
//! Controls the names the generated pack uses and how deep recursion may go.
//! Configuration can be built in code or loaded from a `cascade.toml` file.
//!
//! # Example
//!
//! ```rust,ignore
//! use cascadec::CompilerConfig;
//!
//! let config = CompilerConfig::new()
//!     .with_namespace("mypack")
//!     .with_max_recursion_depth(16);
//!
//! compile_module(&ctx, &config)?;
//! ```

use serde::Deserialize;
use std::path::Path;

/// Largest recursion depth accepted; every level multiplies the emitted files
pub const MAX_SUPPORTED_DEPTH: usize = 64;

/// Configuration for the Cascade compiler
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Datapack namespace every generated function and storage lives in
    pub namespace: String,

    /// Deepest stack level a user function may be entered at.
    ///
    /// Calls made at this level invoke the stack-overflow handler instead.
    pub max_recursion_depth: usize,

    /// Scoreboard objective holding every numeric register
    pub objective: String,

    /// Scoreboard objective holding integer constants
    pub const_objective: String,

    /// Prefix of every entity tag the pack creates
    pub tag_prefix: String,

    /// Name of the command storage (inside `namespace`) used for storage variables
    pub storage: String,

    /// Description written to `pack.mcmeta`
    pub pack_description: String,

    /// `pack_format` written to `pack.mcmeta`
    pub pack_format: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            namespace: "cascade".to_string(),
            max_recursion_depth: 8,
            objective: "cascade".to_string(),
            const_objective: "cascade.const".to_string(),
            tag_prefix: "cascade".to_string(),
            storage: "vars".to_string(),
            pack_description: "Generated by cascadec".to_string(),
            pack_format: 48,
        }
    }
}

impl CompilerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn with_const_objective(mut self, objective: impl Into<String>) -> Self {
        self.const_objective = objective.into();
        self
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn with_pack_description(mut self, description: impl Into<String>) -> Self {
        self.pack_description = description.into();
        self
    }

    pub fn with_pack_format(mut self, format: u32) -> Self {
        self.pack_format = format;
        self
    }

    /// Parse a configuration from TOML text; missing keys keep their defaults
    pub fn from_toml(source: &str) -> Result<Self, String> {
        let config: CompilerConfig =
            toml::from_str(source).map_err(|e| format!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, String> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&source)
    }

    /// Reject names the target cannot express.
    ///
    /// Namespaces and storage names may only contain `a-z0-9_-.`; objectives
    /// and tag prefixes may additionally contain `+`.
    pub fn validate(&self) -> Result<(), String> {
        validate_name("namespace", &self.namespace, false)?;
        validate_name("storage", &self.storage, false)?;
        validate_name("objective", &self.objective, true)?;
        validate_name("const_objective", &self.const_objective, true)?;
        validate_name("tag_prefix", &self.tag_prefix, true)?;

        if self.objective == self.const_objective {
            return Err(format!(
                "objective and const_objective must differ (both are '{}')",
                self.objective
            ));
        }
        if self.max_recursion_depth > MAX_SUPPORTED_DEPTH {
            return Err(format!(
                "max_recursion_depth {} exceeds the supported maximum of {}",
                self.max_recursion_depth, MAX_SUPPORTED_DEPTH
            ));
        }
        Ok(())
    }
}

fn validate_name(field: &str, value: &str, allow_plus: bool) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    for c in value.chars() {
        let ok = c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || matches!(c, '_' | '-' | '.')
            || (allow_plus && c == '+');
        if !ok {
            return Err(format!(
                "Invalid character '{}' in {} '{}'. \
                 Only lowercase letters, digits, '_', '-' and '.' are allowed.",
                c, field, value
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CompilerConfig::new();
        assert_eq!(config.max_recursion_depth, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CompilerConfig::new()
            .with_namespace("demo")
            .with_max_recursion_depth(3)
            .with_tag_prefix("d")
            .with_storage("mem");

        assert_eq!(config.namespace, "demo");
        assert_eq!(config.max_recursion_depth, 3);
        assert_eq!(config.tag_prefix, "d");
        assert_eq!(config.storage, "mem");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_keeps_defaults() {
        let config = CompilerConfig::from_toml(
            r#"
            namespace = "demo"
            max_recursion_depth = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.namespace, "demo");
        assert_eq!(config.max_recursion_depth, 4);
        assert_eq!(config.objective, CompilerConfig::default().objective);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = CompilerConfig::from_toml("namspace = \"typo\"").unwrap_err();
        assert!(err.contains("Invalid configuration"));
    }

    #[test]
    fn test_validation_rejects_bad_names() {
        let err = CompilerConfig::new()
            .with_namespace("My Pack")
            .validate()
            .unwrap_err();
        assert!(err.contains("namespace"));

        assert!(CompilerConfig::new().with_namespace("").validate().is_err());
        assert!(CompilerConfig::new().with_storage("a+b").validate().is_err());
        assert!(CompilerConfig::new().with_objective("a+b").validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_shared_objectives() {
        let config = CompilerConfig::new()
            .with_objective("x")
            .with_const_objective("x");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_huge_depth() {
        let config = CompilerConfig::new().with_max_recursion_depth(MAX_SUPPORTED_DEPTH + 1);
        assert!(config.validate().is_err());
    }
}
