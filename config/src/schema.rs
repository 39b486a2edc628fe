//! Declarative schemas for the runtime configuration: one entry per
//! key, merged per application profile.

use lazy_static::lazy_static;
use strum_macros;
use strum_macros::EnumString;

use crate::value::{Entry, Snapshot, Value, DEFAULT_SOURCE};

#[derive(
    strum_macros::Display,
    EnumString,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
)]
pub enum CfgType {
    #[strum(serialize = "symbol")]
    Symbol,
    #[strum(serialize = "integer")]
    Integer,
    #[strum(serialize = "boolean")]
    Boolean,
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "opaque")]
    Opaque,
    #[strum(serialize = "regex-rewrite")]
    RegexRewrite,
    #[strum(serialize = "regex-match")]
    RegexMatch,
    #[strum(serialize = "sip-url")]
    SipUrl,
    #[strum(serialize = "sip-defaulted-url")]
    SipDefaultedUrl,
    #[strum(serialize = "sips-defaulted-url")]
    SipsDefaultedUrl,
}

/// Application profiles this node can run as.
#[derive(strum_macros::Display, EnumString, Clone, Copy, Debug, PartialEq, Eq)]
pub enum App {
    #[strum(serialize = "proxy")]
    Proxy,
    #[strum(serialize = "registrar")]
    Registrar,
    /// Stateless forwarder; runs on the common schema alone.
    #[strum(serialize = "stateless")]
    Stateless,
}

#[derive(Clone, Debug)]
pub struct SchemaEntry {
    pub key: &'static str,
    pub typ: CfgType,
    /// When true the value must be an ordered sequence of `typ`.
    pub list: bool,
    pub default: Option<Value>,
    pub required: bool,
    /// Allow the validator to substitute a canonical form.
    pub normalize: bool,
    /// When false, changing this key demands a hard reload.
    pub soft_reload: bool,
    /// Keep the value out of normalization log lines.
    pub no_disclosure: bool,
}

impl Default for SchemaEntry {
    fn default() -> Self {
        SchemaEntry {
            key: "",
            typ: CfgType::Opaque,
            list: false,
            default: None,
            required: false,
            normalize: false,
            soft_reload: true,
            no_disclosure: false,
        }
    }
}

lazy_static! {
    /// Parameters every application profile understands.
    pub static ref COMMON_DEFAULTS: Vec<SchemaEntry> = vec![
        SchemaEntry {
            key: "allowed_request_methods",
            typ: CfgType::Symbol,
            list: true,
            default: Some(Value::List(vec![
                Value::symbol("invite"),
                Value::symbol("ack"),
                Value::symbol("cancel"),
                Value::symbol("bye"),
                Value::symbol("options"),
                Value::symbol("register"),
            ])),
            ..Default::default()
        },
        SchemaEntry {
            key: "blocked_user_agents",
            typ: CfgType::RegexMatch,
            list: true,
            default: Some(Value::List(vec![])),
            ..Default::default()
        },
        SchemaEntry {
            key: "default_gateway",
            typ: CfgType::SipDefaultedUrl,
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "enable_tls",
            typ: CfgType::Boolean,
            default: Some(Value::Bool(false)),
            soft_reload: false,
            ..Default::default()
        },
        SchemaEntry {
            key: "expiry_sweep_interval",
            typ: CfgType::Integer,
            default: Some(Value::Int(60)),
            ..Default::default()
        },
        SchemaEntry {
            key: "extra_headers",
            typ: CfgType::Opaque,
            ..Default::default()
        },
        SchemaEntry {
            key: "homedomains",
            typ: CfgType::String,
            list: true,
            default: Some(Value::List(vec![Value::str("localhost")])),
            required: true,
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "internal_to_e164",
            typ: CfgType::RegexRewrite,
            list: true,
            default: Some(Value::List(vec![])),
            ..Default::default()
        },
        SchemaEntry {
            key: "listen_port",
            typ: CfgType::Integer,
            default: Some(Value::Int(5060)),
            required: true,
            soft_reload: false,
            ..Default::default()
        },
        SchemaEntry {
            key: "listen_port_tls",
            typ: CfgType::Integer,
            default: Some(Value::Int(5061)),
            soft_reload: false,
            ..Default::default()
        },
        SchemaEntry {
            key: "logging_level",
            typ: CfgType::Symbol,
            default: Some(Value::symbol("debug")),
            ..Default::default()
        },
        SchemaEntry {
            key: "max_forwards",
            typ: CfgType::Integer,
            default: Some(Value::Int(70)),
            ..Default::default()
        },
        SchemaEntry {
            key: "myhostnames",
            typ: CfgType::String,
            list: true,
            default: Some(Value::List(vec![Value::str("localhost")])),
            required: true,
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "number_rewrites",
            typ: CfgType::RegexRewrite,
            list: true,
            default: Some(Value::List(vec![])),
            ..Default::default()
        },
        SchemaEntry {
            key: "record_route",
            typ: CfgType::Boolean,
            default: Some(Value::Bool(true)),
            ..Default::default()
        },
        SchemaEntry {
            key: "record_route_url",
            typ: CfgType::SipUrl,
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "secure_gateway",
            typ: CfgType::SipsDefaultedUrl,
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "sipauth_password",
            typ: CfgType::String,
            no_disclosure: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "sipauth_realm",
            typ: CfgType::String,
            default: Some(Value::str("vega")),
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "stateless_challenge",
            typ: CfgType::Boolean,
            default: Some(Value::Bool(false)),
            ..Default::default()
        },
        SchemaEntry {
            key: "timer_t1_ms",
            typ: CfgType::Integer,
            default: Some(Value::Int(500)),
            soft_reload: false,
            ..Default::default()
        },
        SchemaEntry {
            key: "transaction_lifetime",
            typ: CfgType::Integer,
            default: Some(Value::Int(300)),
            ..Default::default()
        },
        SchemaEntry {
            key: "udp_max_datagram",
            typ: CfgType::Integer,
            default: Some(Value::Int(1200)),
            ..Default::default()
        },
        SchemaEntry {
            key: "user_agent",
            typ: CfgType::String,
            default: Some(Value::str("vega")),
            ..Default::default()
        },
    ];

    static ref PROXY_DEFAULTS: Vec<SchemaEntry> = vec![
        SchemaEntry {
            key: "record_route",
            typ: CfgType::Boolean,
            default: Some(Value::Bool(false)),
            ..Default::default()
        },
        SchemaEntry {
            key: "proxy_authenticate",
            typ: CfgType::Boolean,
            default: Some(Value::Bool(true)),
            ..Default::default()
        },
        SchemaEntry {
            key: "stateless_forward_methods",
            typ: CfgType::Symbol,
            list: true,
            default: Some(Value::List(vec![Value::symbol("options")])),
            ..Default::default()
        },
    ];

    static ref REGISTRAR_DEFAULTS: Vec<SchemaEntry> = vec![
        SchemaEntry {
            key: "sipauth_realm",
            typ: CfgType::String,
            default: Some(Value::str("vega")),
            required: true,
            normalize: true,
            ..Default::default()
        },
        SchemaEntry {
            key: "registrar_min_expires",
            typ: CfgType::Integer,
            default: Some(Value::Int(60)),
            ..Default::default()
        },
        SchemaEntry {
            key: "registrar_max_expires",
            typ: CfgType::Integer,
            default: Some(Value::Int(86400)),
            ..Default::default()
        },
        SchemaEntry {
            key: "registrar_default_expires",
            typ: CfgType::Integer,
            default: Some(Value::Int(3600)),
            ..Default::default()
        },
    ];
}

fn app_overlay(app: App) -> &'static [SchemaEntry] {
    match app {
        App::Proxy => &PROXY_DEFAULTS[..],
        App::Registrar => &REGISTRAR_DEFAULTS[..],
        App::Stateless => &[],
    }
}

/// Merge an application overlay into the common schema: entries with a
/// known key replace the common entry in place, new keys are appended.
/// The result is sorted by key so diagnostics come out deterministic.
pub fn merge(common: &[SchemaEntry], overlay: &[SchemaEntry]) -> Vec<SchemaEntry> {
    let mut merged = common.to_vec();
    for entry in overlay {
        match merged.iter_mut().find(|e| e.key == entry.key) {
            Some(slot) => *slot = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    merged.sort_by(|a, b| a.key.cmp(b.key));
    merged
}

pub fn schema_for(app: App) -> Vec<SchemaEntry> {
    merge(&COMMON_DEFAULTS, app_overlay(app))
}

/// Materialize the schema defaults as a snapshot from the defaults
/// backend. Keys without a default are carried as `Unset` so required
/// checks and diagnostics still see them.
pub fn defaults_snapshot(app: App) -> Snapshot {
    schema_for(app)
        .iter()
        .map(|def| Entry {
            key: def.key.to_string(),
            value: def.default.clone().unwrap_or(Value::Unset),
            source: DEFAULT_SOURCE.to_string(),
        })
        .collect()
}
