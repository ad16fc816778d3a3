//! Compiler configuration
//!
//! Optional TOML configuration merged over built-in defaults:
//!
//! ```toml
//! output = "a.out"
//!
//! [vm]
//! stack-size = 2048
//! memory-size = 4096
//! ```

use serde::Deserialize;
use std::path::Path;

/// Virtual machine sizing used when running bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct VmLimits {
    pub stack_size: usize,
    pub memory_size: usize,
}

impl Default for VmLimits {
    fn default() -> Self {
        VmLimits {
            stack_size: mica_vm::DEFAULT_STACK_SIZE,
            memory_size: mica_vm::DEFAULT_MEMORY_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompilerConfig {
    /// Output file name; the CLI `-o` flag overrides it.
    pub output: Option<String>,
    pub vm: VmLimits,
}

impl CompilerConfig {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("Invalid configuration: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Couldn't read configuration {}: {}", path.display(), e))?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.output, None);
        assert_eq!(config.vm.stack_size, 1024);
        assert_eq!(config.vm.memory_size, 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CompilerConfig::from_toml("output = \"prog\"").unwrap();
        assert_eq!(config.output.as_deref(), Some("prog"));
        assert_eq!(config.vm.stack_size, 1024);
    }

    #[test]
    fn test_vm_limits_override() {
        let config = CompilerConfig::from_toml(
            "[vm]\nstack-size = 2048\nmemory-size = 4096\n",
        )
        .unwrap();
        assert_eq!(config.vm.stack_size, 2048);
        assert_eq!(config.vm.memory_size, 4096);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CompilerConfig::from_toml("no-such-key = 1").is_err());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = CompilerConfig::load(Path::new("/nonexistent/mica.toml")).unwrap_err();
        assert!(err.contains("Couldn't read configuration"));
    }
}
