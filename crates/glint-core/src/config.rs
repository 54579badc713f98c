use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GlintError, GlintResult};
use crate::profile::{Capability, TargetProfile};

pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 256;
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Where a function hook inserts its statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HookPosition {
    #[default]
    Head,
    Tail,
}

/// One structural rewrite pass with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Insert declarations before the first function definition.
    Inject { source: String },
    /// Merge library code, renaming injected symbols that collide.
    Merge {
        source: String,
        #[serde(default)]
        label: Option<String>,
    },
    /// Remove declarations needing capabilities the target lacks.
    StripCapabilities {
        #[serde(default)]
        unsupported: Vec<Capability>,
    },
    /// Insert statements at the head or tail of a function body.
    FunctionHook {
        function: String,
        code: String,
        #[serde(default)]
        position: HookPosition,
        #[serde(default)]
        parameters: Option<usize>,
    },
    /// Raise `#version` to at least `version`.
    RequireVersion {
        version: u32,
        #[serde(default)]
        profile: Option<String>,
    },
    /// Give unlocated `out` declarations the next free `layout(location)`.
    MarkOutputs,
}

impl TransformSpec {
    pub fn name(&self) -> &'static str {
        match self {
            TransformSpec::Inject { .. } => "inject",
            TransformSpec::Merge { .. } => "merge",
            TransformSpec::StripCapabilities { .. } => "strip_capabilities",
            TransformSpec::FunctionHook { .. } => "function_hook",
            TransformSpec::RequireVersion { .. } => "require_version",
            TransformSpec::MarkOutputs => "mark_outputs",
        }
    }
}

fn default_max_expansion_depth() -> usize {
    DEFAULT_MAX_EXPANSION_DEPTH
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

/// Caller-supplied options for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub target_profile: TargetProfile,
    #[serde(default)]
    pub defined_macros: BTreeMap<String, String>,
    #[serde(default)]
    pub enabled_transforms: Vec<TransformSpec>,
    /// Abort on the first error instead of collecting all of them.
    #[serde(default)]
    pub strict_error_recovery: bool,
    #[serde(default = "default_max_expansion_depth")]
    pub max_expansion_depth: usize,
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_profile: TargetProfile::default(),
            defined_macros: BTreeMap::new(),
            enabled_transforms: Vec::new(),
            strict_error_recovery: false,
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

impl PipelineConfig {
    pub fn new(target_profile: TargetProfile) -> Self {
        Self {
            target_profile,
            ..Self::default()
        }
    }

    pub fn with_macro(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defined_macros.insert(name.into(), value.into());
        self
    }

    pub fn with_transform(mut self, transform: TransformSpec) -> Self {
        self.enabled_transforms.push(transform);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_error_recovery = strict;
        self
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> GlintResult<()> {
        for name in self.defined_macros.keys() {
            let mut chars = name.chars();
            let valid_start = chars
                .next()
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false);
            if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(GlintError::Config(format!("invalid macro name '{name}'")));
            }
        }
        if self.max_expansion_depth == 0 {
            return Err(GlintError::Config(
                "max_expansion_depth must be at least 1".to_string(),
            ));
        }
        for transform in &self.enabled_transforms {
            if let TransformSpec::FunctionHook { function, .. } = transform {
                if function.is_empty() {
                    return Err(GlintError::Config(
                        "function_hook requires a function name".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> GlintResult<Self> {
        let config: PipelineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &std::path::Path) -> GlintResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> GlintResult<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.target_profile, TargetProfile::Glsl330);
        assert_eq!(config.max_expansion_depth, 256);
        assert!(!config.strict_error_recovery);
        assert!(config.enabled_transforms.is_empty());
    }

    #[test]
    fn test_transform_list_from_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            target_profile = "glsl150"
            strict_error_recovery = true

            [defined_macros]
            N = "4"

            [[enabled_transforms]]
            kind = "inject"
            source = "uniform vec4 injectedColor;"

            [[enabled_transforms]]
            kind = "strip_capabilities"
            unsupported = ["fp64"]

            [[enabled_transforms]]
            kind = "function_hook"
            function = "main"
            code = "color *= tint;"
            position = "tail"

            [[enabled_transforms]]
            kind = "mark_outputs"
            "#,
        )
        .unwrap();

        assert_eq!(config.target_profile, TargetProfile::Glsl150);
        assert_eq!(config.defined_macros.get("N").map(String::as_str), Some("4"));
        assert_eq!(config.enabled_transforms.len(), 4);
        assert_eq!(
            config.enabled_transforms[0],
            TransformSpec::Inject {
                source: "uniform vec4 injectedColor;".into()
            }
        );
        assert_eq!(config.enabled_transforms[3], TransformSpec::MarkOutputs);
        match &config.enabled_transforms[2] {
            TransformSpec::FunctionHook { position, parameters, .. } => {
                assert_eq!(*position, HookPosition::Tail);
                assert_eq!(*parameters, None);
            }
            other => panic!("expected function hook, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_macro_name_rejected() {
        let config = PipelineConfig::default().with_macro("1BAD", "x");
        assert!(matches!(config.validate(), Err(GlintError::Config(_))));
    }

    #[test]
    fn test_unknown_transform_kind_rejected() {
        let result = PipelineConfig::from_toml_str(
            r#"
            [[enabled_transforms]]
            kind = "obfuscate"
            "#,
        );
        assert!(matches!(result, Err(GlintError::Toml(_))));
    }
}
