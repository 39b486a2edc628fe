//! Schema-driven validation and normalization of configuration
//! snapshots. Fails fast: the first offending entry aborts the walk
//! with a single human-readable message.

use std::str::FromStr;

use regex::Regex;
use strum_macros;
use strum_macros::EnumString;
use thiserror::Error;
use tracing::info;

use sip::message::Uri;

use crate::reload;
use crate::schema::{schema_for, App, CfgType, SchemaEntry};
use crate::value::{Entry, Snapshot, Value, DEFAULT_SOURCE};

/// Keys with this prefix need no schema entry; they belong to the
/// application shell's local extension.
pub const LOCAL_PREFIX: &str = "local_";

#[derive(strum_macros::Display, EnumString, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadMode {
    #[strum(serialize = "soft")]
    Soft,
    #[strum(serialize = "hard")]
    Hard,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown configuration parameter {key} (source: {src})")]
    UnknownKey { key: String, src: String },
    #[error("parameter '{key}' has invalid value ({value}) - expected {expected} : {reason}")]
    TypeMismatch {
        key: String,
        value: String,
        expected: String,
        reason: String,
    },
    #[error("parameter '{key}' has invalid value (#{index} in list ({value})) - expected {expected} : {reason}")]
    ListTypeMismatch {
        key: String,
        index: usize,
        value: String,
        expected: String,
        reason: String,
    },
    #[error("Required parameter '{0}' not set")]
    RequiredNotSet(String),
    #[error("Required parameter '{0}' may not have empty value")]
    RequiredEmpty(String),
    #[error("Could not parse configuration (parameter '{key}', caught {kind})")]
    LocalValidator { key: String, kind: String },
    #[error("parameter '{key}' requires a restart to change (source: {src}, running value ({current}), new value ({requested}))")]
    ReloadRefused {
        key: String,
        src: String,
        current: String,
        requested: String,
    },
    #[error("local parameter '{key}' (source: {src}) can not be soft reloaded")]
    LocalReloadRefused { key: String, src: String },
}

/// Live values of the running application, consulted when a soft
/// reload touches a hard-only parameter.
pub trait LiveEnv: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}

/// Extension point for `local_*` keys, owned by the application shell.
pub trait LocalHooks: Send + Sync {
    fn validate(&self, key: &str, value: &Value, source: &str)
        -> Result<Value, String>;
    fn is_soft_reloadable(&self, key: &str, value: &Value) -> bool;
}

pub struct Checker {
    env: Box<dyn LiveEnv>,
    local: Option<Box<dyn LocalHooks>>,
}

impl Checker {
    pub fn new(env: Box<dyn LiveEnv>) -> Checker {
        Checker { env, local: None }
    }

    pub fn with_local_hooks(mut self, hooks: Box<dyn LocalHooks>) -> Checker {
        self.local = Some(hooks);
        self
    }

    /// Validate and normalize `snapshot` against the schema of `app`.
    /// On success the returned snapshot preserves the input order.
    pub fn check(
        &self,
        snapshot: &[Entry],
        app: App,
        mode: ReloadMode,
    ) -> Result<Snapshot, ConfigError> {
        self.check_with_schema(snapshot, &schema_for(app), mode)
    }

    pub fn check_with_schema(
        &self,
        snapshot: &[Entry],
        schema: &[SchemaEntry],
        mode: ReloadMode,
    ) -> Result<Snapshot, ConfigError> {
        let mut normalized = Vec::with_capacity(snapshot.len());

        for entry in snapshot {
            match schema.iter().find(|def| def.key == entry.key) {
                Some(def) => {
                    let value = validate_entry(entry, def)?;
                    if value != entry.value {
                        if def.no_disclosure {
                            info!(key = entry.key, "normalized configuration parameter");
                        } else {
                            info!(
                                key = entry.key,
                                before = %entry.value,
                                after = %value,
                                "normalized configuration parameter"
                            );
                        }
                    }
                    normalized.push(Entry {
                        key: entry.key.clone(),
                        value,
                        source: entry.source.clone(),
                    });
                }
                None if entry.key.starts_with(LOCAL_PREFIX) => {
                    let hooks = self.local.as_deref().ok_or_else(|| {
                        ConfigError::LocalValidator {
                            key: entry.key.clone(),
                            kind: "no local validator".to_string(),
                        }
                    })?;
                    let value = hooks
                        .validate(&entry.key, &entry.value, &entry.source)
                        .map_err(|kind| ConfigError::LocalValidator {
                            key: entry.key.clone(),
                            kind,
                        })?;
                    normalized.push(Entry {
                        key: entry.key.clone(),
                        value,
                        source: entry.source.clone(),
                    });
                }
                None => {
                    return Err(ConfigError::UnknownKey {
                        key: entry.key.clone(),
                        src: entry.source.clone(),
                    });
                }
            }
        }

        check_required(&normalized, schema)?;
        reload::check_loadable(
            &normalized,
            schema,
            mode,
            self.env.as_ref(),
            self.local.as_deref(),
        )?;

        Ok(normalized)
    }
}

fn check_required(
    snapshot: &[Entry],
    schema: &[SchemaEntry],
) -> Result<(), ConfigError> {
    for def in schema.iter().filter(|def| def.required) {
        match snapshot.iter().find(|entry| entry.key == def.key) {
            None | Some(Entry {
                value: Value::Unset,
                ..
            }) => {
                return Err(ConfigError::RequiredNotSet(def.key.to_string()));
            }
            Some(entry) if entry.value.is_empty_value() => {
                return Err(ConfigError::RequiredEmpty(def.key.to_string()));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_entry(entry: &Entry, def: &SchemaEntry) -> Result<Value, ConfigError> {
    // An unset default marks "not actually configured"; there is
    // nothing to type check.
    if entry.value == Value::Unset && entry.source == DEFAULT_SOURCE {
        return Ok(Value::Unset);
    }

    if def.list {
        match &entry.value {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match check_element(item, def) {
                        Ok(value) => out.push(value),
                        Err(reason) => {
                            return Err(ConfigError::ListTypeMismatch {
                                key: entry.key.clone(),
                                index: index + 1,
                                value: item.to_string(),
                                expected: def.typ.to_string(),
                                reason,
                            });
                        }
                    }
                }
                Ok(Value::List(out))
            }
            other => Err(ConfigError::TypeMismatch {
                key: entry.key.clone(),
                value: other.to_string(),
                expected: format!("list of {}", def.typ),
                reason: "invalid type".to_string(),
            }),
        }
    } else {
        check_element(&entry.value, def).map_err(|reason| {
            ConfigError::TypeMismatch {
                key: entry.key.clone(),
                value: entry.value.to_string(),
                expected: def.typ.to_string(),
                reason,
            }
        })
    }
}

/// Check one element against the schema type, yielding the normalized
/// form. The error arm is the short reason phrase; the caller wraps it
/// with key and position.
fn check_element(value: &Value, def: &SchemaEntry) -> Result<Value, String> {
    match def.typ {
        CfgType::Symbol => match value {
            Value::Symbol(_) => Ok(value.clone()),
            _ => Err("invalid type".to_string()),
        },
        CfgType::Integer => match value {
            Value::Int(_) => Ok(value.clone()),
            _ => Err("invalid type".to_string()),
        },
        CfgType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err("invalid type".to_string()),
        },
        CfgType::Opaque => Ok(value.clone()),
        CfgType::String => match value {
            // A one-character string is almost always a character out
            // of a string passed where a list of strings was meant.
            Value::Str(s) if s.len() == 1 => Err("string too short".to_string()),
            Value::Str(s) => Ok(if def.normalize {
                Value::Str(s.to_lowercase())
            } else {
                value.clone()
            }),
            _ => Err("invalid type".to_string()),
        },
        CfgType::RegexRewrite => match value {
            Value::Pair(lhs, rhs) => match (lhs.as_ref(), rhs.as_ref()) {
                (Value::Str(lhs), Value::Str(rhs)) => {
                    if lhs.len() < 2 || rhs.len() < 2 {
                        return Err("string too short".to_string());
                    }
                    compile_regex(lhs)?;
                    Ok(value.clone())
                }
                _ => Err("invalid type".to_string()),
            },
            _ => Err("invalid type".to_string()),
        },
        CfgType::RegexMatch => match value {
            Value::Pair(lhs, _) => match lhs.as_ref() {
                Value::Str(lhs) => {
                    compile_regex(lhs)?;
                    Ok(value.clone())
                }
                _ => Err("invalid type".to_string()),
            },
            _ => Err("invalid type".to_string()),
        },
        CfgType::SipUrl => check_url(value, def, |s| Uri::from_str(s)),
        CfgType::SipDefaultedUrl => {
            check_url(value, def, |s| Uri::parse_with_default_scheme("sip", s))
        }
        CfgType::SipsDefaultedUrl => {
            check_url(value, def, |s| Uri::parse_with_default_scheme("sips", s))
        }
    }
}

fn compile_regex(pattern: &str) -> Result<(), String> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|_| "could not compile regex".to_string())
}

fn check_url(
    value: &Value,
    def: &SchemaEntry,
    parse: impl Fn(&str) -> anyhow::Result<Uri>,
) -> Result<Value, String> {
    match value {
        Value::Str(s) => match parse(s) {
            Ok(parsed) => Ok(if def.normalize {
                Value::Url {
                    raw: s.clone(),
                    parsed,
                }
            } else {
                value.clone()
            }),
            Err(_) => Err("unparsable url".to_string()),
        },
        // Already normalized; accepted so validation is idempotent.
        Value::Url { .. } => Ok(value.clone()),
        _ => Err("invalid type".to_string()),
    }
}
