//! Reload compatibility: a hard reload restarts the application and
//! accepts anything; a soft reload may only touch keys whose schema
//! permits it.

use tracing::debug;

use crate::check::{ConfigError, LiveEnv, LocalHooks, ReloadMode, LOCAL_PREFIX};
use crate::schema::SchemaEntry;
use crate::value::Entry;

pub fn check_loadable(
    snapshot: &[Entry],
    schema: &[SchemaEntry],
    mode: ReloadMode,
    env: &dyn LiveEnv,
    hooks: Option<&dyn LocalHooks>,
) -> Result<(), ConfigError> {
    if mode == ReloadMode::Hard {
        return Ok(());
    }

    for entry in snapshot {
        match schema.iter().find(|def| def.key == entry.key) {
            Some(def) if def.soft_reload => {}
            Some(_) => match env.get(&entry.key) {
                // No live value recorded, nothing is being changed.
                None => {
                    debug!(key = entry.key, "no live value, permitting soft reload");
                }
                Some(current) if current == entry.value => {}
                Some(current) => {
                    return Err(ConfigError::ReloadRefused {
                        key: entry.key.clone(),
                        src: entry.source.clone(),
                        current: current.to_string(),
                        requested: entry.value.to_string(),
                    });
                }
            },
            None if entry.key.starts_with(LOCAL_PREFIX) => {
                let reloadable = hooks
                    .map(|h| h.is_soft_reloadable(&entry.key, &entry.value))
                    .unwrap_or(false);
                if !reloadable {
                    return Err(ConfigError::LocalReloadRefused {
                        key: entry.key.clone(),
                        src: entry.source.clone(),
                    });
                }
            }
            None => {
                // The validator walk rejects unknown keys before this
                // point; reaching one here is a programming error.
                panic!(
                    "configuration parameter '{}' escaped schema validation",
                    entry.key
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct FixedEnv(Vec<(&'static str, Value)>);

    impl LiveEnv for FixedEnv {
        fn get(&self, key: &str) -> Option<Value> {
            self.0
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        }
    }

    struct NoHooks;

    impl LocalHooks for NoHooks {
        fn validate(
            &self,
            _key: &str,
            value: &Value,
            _source: &str,
        ) -> Result<Value, String> {
            Ok(value.clone())
        }

        fn is_soft_reloadable(&self, key: &str, _value: &Value) -> bool {
            key == "local_tunable"
        }
    }

    fn hard_only(key: &'static str) -> SchemaEntry {
        SchemaEntry {
            key,
            typ: crate::schema::CfgType::Integer,
            soft_reload: false,
            ..Default::default()
        }
    }

    #[test]
    fn hard_mode_accepts_everything() {
        let schema = vec![hard_only("listen_port")];
        let snapshot = vec![Entry::new("listen_port", Value::Int(5070), "file")];
        let env = FixedEnv(vec![("listen_port", Value::Int(5060))]);
        assert!(check_loadable(
            &snapshot,
            &schema,
            ReloadMode::Hard,
            &env,
            None
        )
        .is_ok());
    }

    #[test]
    fn soft_mode_rejects_changing_a_hard_parameter() {
        let schema = vec![hard_only("listen_port")];
        let snapshot = vec![Entry::new("listen_port", Value::Int(5070), "file")];
        let env = FixedEnv(vec![("listen_port", Value::Int(5060))]);
        let err = check_loadable(&snapshot, &schema, ReloadMode::Soft, &env, None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "parameter 'listen_port' requires a restart to change (source: file, running value (5060), new value (5070))"
        );
    }

    #[test]
    fn soft_mode_permits_unchanged_and_unrecorded_values() {
        let schema = vec![hard_only("listen_port"), hard_only("timer_t1_ms")];
        let snapshot = vec![
            Entry::new("listen_port", Value::Int(5060), "file"),
            Entry::new("timer_t1_ms", Value::Int(500), "file"),
        ];
        // listen_port matches the live value; timer_t1_ms has none.
        let env = FixedEnv(vec![("listen_port", Value::Int(5060))]);
        assert!(check_loadable(
            &snapshot,
            &schema,
            ReloadMode::Soft,
            &env,
            None
        )
        .is_ok());
    }

    #[test]
    fn soft_keys_are_always_permitted() {
        let schema = vec![SchemaEntry {
            key: "logging_level",
            typ: crate::schema::CfgType::Symbol,
            ..Default::default()
        }];
        let snapshot =
            vec![Entry::new("logging_level", Value::symbol("error"), "file")];
        let env = FixedEnv(vec![("logging_level", Value::symbol("debug"))]);
        assert!(check_loadable(
            &snapshot,
            &schema,
            ReloadMode::Soft,
            &env,
            None
        )
        .is_ok());
    }

    #[test]
    fn local_keys_ask_the_hooks() {
        let env = FixedEnv(vec![]);
        let ok = vec![Entry::new("local_tunable", Value::Int(1), "file")];
        assert!(check_loadable(&ok, &[], ReloadMode::Soft, &env, Some(&NoHooks))
            .is_ok());

        let refused = vec![Entry::new("local_fixed", Value::Int(1), "file")];
        let err =
            check_loadable(&refused, &[], ReloadMode::Soft, &env, Some(&NoHooks))
                .unwrap_err();
        assert!(matches!(err, ConfigError::LocalReloadRefused { .. }));
    }

    #[test]
    #[should_panic(expected = "escaped schema validation")]
    fn unknown_non_local_key_is_an_invariant_violation() {
        let env = FixedEnv(vec![]);
        let snapshot = vec![Entry::new("bogus", Value::Int(1), "file")];
        let _ = check_loadable(&snapshot, &[], ReloadMode::Soft, &env, None);
    }
}
