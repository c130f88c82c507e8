//! Logic for loading configuration in to an object model

use std::str::FromStr;
use std::time::Duration;

use derivative::Derivative;
use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const DEFAULT_MAX_DEPTH: usize = 512;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of the engine.
///
/// Can be created through `serde::Deserialize` from various formats, or
/// parsed from YAML with [`str::parse`].
#[derive(Clone, Derivative, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Field resolution settings.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Configuration {
    /// JSON schema of the configuration file.
    pub fn json_schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings.into_generator().into_root_schema_for::<Configuration>()
    }

    pub fn validate(self) -> Result<Self, ConfigurationError> {
        if self.execution.max_concurrency == Some(0) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid execution.max_concurrency",
                error: "must be greater than 0".to_string(),
            });
        }
        if self.execution.timeout == Some(Duration::ZERO) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid execution.timeout",
                error: "must not be zero".to_string(),
            });
        }
        Ok(self)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let configuration: Configuration = if s.trim().is_empty() {
            Configuration::default()
        } else {
            serde_yaml::from_str(s).map_err(ConfigurationError::DeserializeConfigError)?
        };
        configuration.validate()
    }
}

/// Field resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionConfig {
    /// Maximum number of sibling resolvers in flight for one selection set.
    /// Unbounded when absent.
    pub max_concurrency: Option<usize>,

    /// Run resolvers as tasks on the runtime's worker pool instead of
    /// polling them on the request's task.
    /// default: true
    pub spawn_resolvers: bool,

    /// Deadline applied to requests that do not carry their own, in
    /// human-readable format (e.g. `5s`).
    #[serde(with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,

    /// Maximum nesting depth of a selection tree.
    /// default: 512
    pub max_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            spawn_resolvers: true,
            timeout: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[buildstructor::buildstructor]
impl ExecutionConfig {
    #[builder(visibility = "pub")]
    fn new(
        max_concurrency: Option<usize>,
        spawn_resolvers: Option<bool>,
        timeout: Option<Duration>,
        max_depth: Option<usize>,
    ) -> Self {
        Self {
            max_concurrency,
            spawn_resolvers: spawn_resolvers.unwrap_or(true),
            timeout,
            max_depth: max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let configuration: Configuration = "".parse().unwrap();
        assert_eq!(configuration, Configuration::default());
        assert!(configuration.execution.spawn_resolvers);
        assert_eq!(configuration.execution.max_depth, 512);
        assert_eq!(configuration.execution.max_concurrency, None);
        assert_eq!(ExecutionConfig::builder().build(), ExecutionConfig::default());
    }

    #[test]
    fn parse_yaml() {
        let configuration: Configuration = r#"
execution:
  max_concurrency: 8
  spawn_resolvers: false
  timeout: 1500ms
"#
        .parse()
        .unwrap();

        assert_eq!(
            configuration.execution,
            ExecutionConfig::builder()
                .max_concurrency(8)
                .spawn_resolvers(false)
                .timeout(Duration::from_millis(1500))
                .build()
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = "execution:\n  max_concurency: 8\n"
            .parse::<Configuration>()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DeserializeConfigError(_)));
        assert!(err.to_string().contains("max_concurency"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = "execution:\n  max_concurrency: 0\n"
            .parse::<Configuration>()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid execution.max_concurrency: must be greater than 0"
        );
    }

    #[test]
    fn schema_lists_execution_settings() {
        let schema = serde_json::to_value(Configuration::json_schema()).unwrap();
        let execution = &schema["properties"]["execution"]["properties"];
        for key in ["max_concurrency", "spawn_resolvers", "timeout", "max_depth"] {
            assert!(execution.get(key).is_some(), "missing {key}");
        }
    }
}
