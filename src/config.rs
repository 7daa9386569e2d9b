//! Flag-removal configuration.
//!
//! Deserializes the YAML ("nearly-JSON") or strict JSON configuration into
//! [`FlagConfig`], then validates semantic constraints the schema cannot
//! express: at least one flag, non-empty names, aliases disjoint across
//! flags. Expired flags produce warnings, never failures. Unknown keys are
//! ignored at every level so configs can carry tooling metadata.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Result, UnflagError};

/// A single flag pinned to its resolved value.
#[derive(Debug, Clone)]
pub struct FlagDefinition {
    /// Canonical flag name (the key in the `flags` mapping).
    pub name: String,
    /// The boolean the flag resolves to everywhere.
    pub value: bool,
    /// Whether matching definition declarations should be deleted.
    pub remove_definition: bool,
    /// Alternative spellings that resolve to this flag.
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub ticket: Option<String>,
    pub owner: Option<String>,
    /// ISO date (`YYYY-MM-DD`) after which the flag counts as expired.
    pub expire: Option<String>,
}

impl FlagDefinition {
    /// Whether `name` is this flag's canonical name or one of its aliases.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    /// Whether the expire date (if any) lies in the past.
    ///
    /// An unparseable date never counts as expired; `load` warns about it.
    pub fn is_expired(&self) -> bool {
        self.expire
            .as_deref()
            .and_then(parse_iso_date)
            .map(|d| Utc::now().date_naive() > d)
            .unwrap_or(false)
    }
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Behavioral settings for the transformation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Keep comments attached to removed declarations.
    #[serde(default = "default_true")]
    pub preserve_comments: bool,
    /// Remove constructs whose surviving branch is empty.
    #[serde(default = "default_true")]
    pub remove_empty_blocks: bool,
    /// Run the formatter over transformed output.
    #[serde(default)]
    pub format_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preserve_comments: true,
            remove_empty_blocks: true,
            format_output: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Call-site and import patterns that identify the flag service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Patterns {
    /// Ordered call patterns; see `pattern` module for the grammar.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Class names identifying flag-service imports.
    #[serde(default)]
    pub classes: Vec<String>,
}

/// Immutable configuration for one removal run, shared across files.
#[derive(Debug, Clone)]
pub struct FlagConfig {
    pub version: String,
    pub patterns: Patterns,
    /// Canonical name -> definition, in declaration order.
    pub flags: BTreeMap<String, FlagDefinition>,
    pub settings: Settings,
    /// Any canonical name or alias -> canonical name.
    index: FxHashMap<String, String>,
}

impl FlagConfig {
    /// Load and validate a configuration file.
    ///
    /// `.json` files are parsed as strict JSON; everything else as YAML
    /// (which accepts JSON content too). Returns the config plus non-fatal
    /// warnings (expired flags, unparseable expiry dates).
    pub fn load(path: &Path) -> Result<(Self, Vec<String>)> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| UnflagError::io_with_path(e, path))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self::parse(&content, is_json)
    }

    /// Parse configuration text. Exposed for tests and embedding.
    ///
    /// Deserialization failures surface as `ConfigParse`; the semantic
    /// checks in `from_raw` surface as `ConfigInvalid`.
    pub fn parse(content: &str, strict_json: bool) -> Result<(Self, Vec<String>)> {
        let raw: RawConfig = if strict_json {
            serde_json::from_str(content).map_err(|e| UnflagError::ConfigParse {
                format: "JSON".to_string(),
                message: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(content).map_err(|e| UnflagError::ConfigParse {
                format: "YAML".to_string(),
                message: e.to_string(),
            })?
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<(Self, Vec<String>)> {
        if raw.flags.is_empty() {
            return Err(UnflagError::config("configuration defines no flags"));
        }

        let mut flags = BTreeMap::new();
        let mut index: FxHashMap<String, String> = FxHashMap::default();
        let mut warnings = Vec::new();

        for (name, spec) in raw.flags {
            if name.trim().is_empty() {
                return Err(UnflagError::config("flag with empty name"));
            }
            let def = spec.into_definition(name.clone());

            for key in std::iter::once(&def.name).chain(def.aliases.iter()) {
                if key.trim().is_empty() {
                    return Err(UnflagError::config(format!(
                        "flag '{}' has an empty alias",
                        def.name
                    )));
                }
                if let Some(existing) = index.get(key) {
                    return Err(UnflagError::config(format!(
                        "name '{}' is claimed by both '{}' and '{}'",
                        key, existing, def.name
                    )));
                }
                index.insert(key.clone(), def.name.clone());
            }

            if let Some(expire) = def.expire.as_deref() {
                if parse_iso_date(expire).is_none() {
                    warnings.push(format!(
                        "flag '{}': unparseable expire date '{}'",
                        def.name, expire
                    ));
                } else if def.is_expired() {
                    warnings.push(format!(
                        "flag '{}' expired on {} and is still configured",
                        def.name, expire
                    ));
                }
            }

            flags.insert(def.name.clone(), def);
        }

        Ok((
            Self {
                version: raw.version,
                patterns: raw.patterns,
                flags,
                settings: raw.settings,
                index,
            },
            warnings,
        ))
    }

    /// Resolve a name or alias to its flag definition.
    pub fn resolve(&self, name: &str) -> Option<&FlagDefinition> {
        self.index.get(name).and_then(|canonical| self.flags.get(canonical))
    }
}

// ---------------------------------------------------------------------------
// Raw serde layer
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    version: String,
    #[serde(default)]
    patterns: Patterns,
    #[serde(default)]
    flags: BTreeMap<String, FlagSpec>,
    #[serde(default)]
    settings: Settings,
}

/// A flag entry: either the `name: true` shorthand or a full mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlagSpec {
    Bare(bool),
    Full(FlagFields),
}

#[derive(Debug, Deserialize)]
struct FlagFields {
    value: bool,
    #[serde(default = "default_true")]
    remove_definition: bool,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    ticket: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    expire: Option<String>,
}

impl FlagSpec {
    fn into_definition(self, name: String) -> FlagDefinition {
        match self {
            FlagSpec::Bare(value) => FlagDefinition {
                name,
                value,
                remove_definition: true,
                aliases: Vec::new(),
                description: None,
                ticket: None,
                owner: None,
                expire: None,
            },
            FlagSpec::Full(f) => FlagDefinition {
                name,
                value: f.value,
                remove_definition: f.remove_definition,
                aliases: f.aliases,
                description: f.description,
                ticket: f.ticket,
                owner: f.owner,
                expire: f.expire,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_bool_shorthand() {
        let (config, warnings) =
            FlagConfig::parse("flags:\n  new_feature: true\n", false).unwrap();
        assert!(warnings.is_empty());
        let def = config.resolve("new_feature").unwrap();
        assert!(def.value);
        assert!(def.remove_definition);
    }

    #[test]
    fn parse_full_definition_with_aliases() {
        let yaml = r#"
version: "2"
patterns:
  methods: ["FeatureFlagService.isEnabled", "*.isEnabled"]
  classes: ["FeatureFlagService"]
flags:
  dark_mode:
    value: false
    remove_definition: false
    aliases: [darkMode, DARK_MODE]
    ticket: PROJ-123
settings:
  format_output: true
"#;
        let (config, warnings) = FlagConfig::parse(yaml, false).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.version, "2");
        assert_eq!(config.patterns.methods.len(), 2);
        assert!(config.settings.format_output);
        assert!(config.settings.preserve_comments);

        let def = config.resolve("DARK_MODE").unwrap();
        assert_eq!(def.name, "dark_mode");
        assert!(!def.value);
        assert!(!def.remove_definition);
        assert!(def.matches("darkMode"));
        assert!(!def.matches("lightMode"));
    }

    #[test]
    fn strict_json_accepted() {
        let json = r#"{"flags": {"x": {"value": true}}}"#;
        let (config, _) = FlagConfig::parse(json, true).unwrap();
        assert!(config.resolve("x").unwrap().value);
    }

    #[test]
    fn yaml_parser_accepts_json_content() {
        let json = r#"{"flags": {"x": true}}"#;
        let (config, _) = FlagConfig::parse(json, false).unwrap();
        assert!(config.resolve("x").unwrap().value);
    }

    #[test]
    fn empty_flags_rejected() {
        let err = FlagConfig::parse("flags: {}\n", false).unwrap_err();
        assert!(matches!(err, UnflagError::ConfigInvalid { .. }));
    }

    #[test]
    fn deserialize_failure_is_config_parse_not_invalid() {
        let err = FlagConfig::parse("flags: [not, a, mapping]\n", false).unwrap_err();
        assert!(matches!(err, UnflagError::ConfigParse { .. }), "got: {err}");

        let err = FlagConfig::parse("{broken json", true).unwrap_err();
        match err {
            UnflagError::ConfigParse { format, .. } => assert_eq!(format, "JSON"),
            other => panic!("expected ConfigParse, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_alias_rejected() {
        let yaml = r#"
flags:
  a:
    value: true
    aliases: [shared]
  b:
    value: false
    aliases: [shared]
"#;
        let err = FlagConfig::parse(yaml, false).unwrap_err();
        assert!(err.to_string().contains("shared"), "got: {err}");
    }

    #[test]
    fn alias_colliding_with_canonical_name_rejected() {
        let yaml = r#"
flags:
  a: true
  b:
    value: false
    aliases: [a]
"#;
        assert!(FlagConfig::parse(yaml, false).is_err());
    }

    #[test]
    fn expired_flag_warns_but_loads() {
        let yaml = "flags:\n  old:\n    value: true\n    expire: 2020-01-01\n";
        let (config, warnings) = FlagConfig::parse(yaml, false).unwrap();
        assert!(config.resolve("old").unwrap().is_expired());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("expired"));
    }

    #[test]
    fn bad_expire_date_warns_but_loads() {
        let yaml = "flags:\n  odd:\n    value: true\n    expire: soonish\n";
        let (config, warnings) = FlagConfig::parse(yaml, false).unwrap();
        assert!(!config.resolve("odd").unwrap().is_expired());
        assert!(warnings[0].contains("unparseable"));
    }

    #[test]
    fn unknown_keys_ignored() {
        let yaml = r#"
version: "1"
rollout_plan: q3
flags:
  x:
    value: true
    jira_board: infra
"#;
        assert!(FlagConfig::parse(yaml, false).is_ok());
    }
}
