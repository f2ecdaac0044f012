//! Finding the diagnostic tool's install directory
//!
//! Lookup happens once per `initialize`. A missing tool is not an error; the
//! keep-alive watchdog just cannot be started.

use std::path::PathBuf;

use crate::core::DebugToolConfig;

/// Registry key holding the runtime install base
pub const RUNTIME_REGISTRY_KEY: &str = r"SOFTWARE\WOW6432Node\Oculus VR, LLC\Oculus";

/// Registry value holding the runtime install base
pub const RUNTIME_REGISTRY_VALUE: &str = "Base";

/// Diagnostic tool directory relative to the runtime install base
pub const DIAGNOSTICS_SUBDIR: &str = r"Support\oculus-diagnostics\";

/// Source of the tool install directory
pub trait ToolLocator: Send + Sync {
    /// Install directory, if this source knows it
    fn locate(&self) -> Option<PathBuf>;

    /// Short description for log output
    fn name(&self) -> &str;
}

/// Directory fixed in configuration
#[derive(Debug, Clone)]
pub struct FixedLocator {
    dir: PathBuf,
}

impl FixedLocator {
    /// Locator that always returns `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ToolLocator for FixedLocator {
    fn locate(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }

    fn name(&self) -> &str {
        "config"
    }
}

/// Directory taken from an environment variable
#[derive(Debug, Clone)]
pub struct EnvLocator {
    var: String,
}

impl EnvLocator {
    /// Locator reading `var`
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl ToolLocator for EnvLocator {
    fn locate(&self) -> Option<PathBuf> {
        std::env::var_os(&self.var)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    fn name(&self) -> &str {
        &self.var
    }
}

/// Tries each locator in turn
#[derive(Default)]
pub struct ChainLocator {
    locators: Vec<Box<dyn ToolLocator>>,
}

impl ChainLocator {
    /// Empty chain; locates nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locator
    pub fn with(mut self, locator: impl ToolLocator + 'static) -> Self {
        self.locators.push(Box::new(locator));
        self
    }

    /// Number of locators in the chain
    pub fn len(&self) -> usize {
        self.locators.len()
    }

    /// True if the chain has no locators
    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }
}

impl ToolLocator for ChainLocator {
    fn locate(&self) -> Option<PathBuf> {
        self.locators.iter().find_map(|locator| {
            let found = locator.locate();
            if let Some(dir) = &found {
                log::debug!("Diagnostic tool located via {}: {}", locator.name(), dir.display());
            }
            found
        })
    }

    fn name(&self) -> &str {
        "chain"
    }
}

/// Config directory, then the environment, then the registry on Windows
pub fn default_locator(config: &DebugToolConfig) -> ChainLocator {
    let mut chain = ChainLocator::new();
    if let Some(dir) = &config.install_dir {
        chain = chain.with(FixedLocator::new(dir.clone()));
    }
    if !config.install_dir_env.is_empty() {
        chain = chain.with(EnvLocator::new(config.install_dir_env.clone()));
    }
    #[cfg(windows)]
    {
        chain = chain.with(super::win32::RegistryLocator);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl ToolLocator for Nothing {
        fn locate(&self) -> Option<PathBuf> {
            None
        }

        fn name(&self) -> &str {
            "nothing"
        }
    }

    #[test]
    fn test_chain_returns_first_hit() {
        let chain = ChainLocator::new()
            .with(Nothing)
            .with(FixedLocator::new("first"))
            .with(FixedLocator::new("second"));
        assert_eq!(chain.locate(), Some(PathBuf::from("first")));
        assert_eq!(ChainLocator::new().locate(), None);
    }

    #[test]
    fn test_env_locator_ignores_unset_variable() {
        let locator = EnvLocator::new("TOUCHLINK_TEST_SURELY_UNSET_VARIABLE");
        assert_eq!(locator.locate(), None);
    }

    #[test]
    fn test_default_locator_prefers_config() {
        let config = DebugToolConfig {
            install_dir: Some(PathBuf::from("/opt/odt")),
            ..DebugToolConfig::default()
        };
        let chain = default_locator(&config);
        assert!(chain.len() >= 2);
        assert_eq!(chain.locate(), Some(PathBuf::from("/opt/odt")));
    }
}
