use anyhow::{Error, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use strum_macros;
use strum_macros::EnumString;
use thiserror::Error;

lazy_static::lazy_static! {
    static ref URI_REGEX: Regex = Regex::new(
            [
                r"^(?P<scheme>[a-zA-Z][a-zA-Z0-9\+\-\.]*):",
                r"(?:(?:(?P<user>[a-zA-Z0-9\-_\.!\~\*\#'\(\)&=\+\$,;\?/%]+)",
                r"(?::(?P<password>[^:@;\?]+))?)@)?",
                r"(?:(?:(?P<host>[^;\?:]*)(?::(?P<port>[\d]+))?))",
                r"(?:;(?P<params>[^\?]*))?$",
            ]
            .concat()
            .as_ref(),
        ).unwrap();

    static ref SCHEME_REGEX: Regex =
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9\+\-\.]*:").unwrap();
}

#[derive(
    strum_macros::Display,
    EnumString,
    Debug,
    PartialEq,
    Eq,
    Clone,
    Serialize,
    Deserialize,
)]
pub enum Method {
    INVITE,
    REGISTER,
    CANCEL,
    ACK,
    BYE,
    SUBSCRIBE,
    REFER,
    INFO,
    NOTIFY,
    PUBLISH,
    OPTIONS,
}

impl Default for Method {
    fn default() -> Self {
        Method::INVITE
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("via header is not in message")]
    NoVia,
    #[error("invalid uri")]
    InvalidUri,
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cseq {
    pub seq: i32,
    pub method: Method,
}

impl Display for Cseq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    pub host: String,
    pub port: Option<u16>,
    pub branch: String,
    pub received: Option<String>,
    pub rport: Option<u16>,
}

impl Via {
    /// The sent-by value used for transaction matching, with the
    /// default SIP port made explicit.
    pub fn sent_by(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(5060))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: IndexMap<String, Option<String>>,
}

impl Default for Uri {
    fn default() -> Self {
        Uri {
            scheme: "sip".to_string(),
            user: None,
            password: None,
            host: "".to_string(),
            port: None,
            params: IndexMap::new(),
        }
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = URI_REGEX
            .captures(s)
            .ok_or(MessageError::InvalidUri)?;

        let scheme = caps
            .name("scheme")
            .ok_or(MessageError::InvalidUri)?
            .as_str()
            .to_lowercase();
        if scheme != "sip" && scheme != "sips" {
            Err(MessageError::InvalidUri)?;
        }

        let host = caps
            .name("host")
            .ok_or(MessageError::InvalidUri)?
            .as_str()
            .to_lowercase();
        if host.is_empty() {
            Err(MessageError::InvalidUri)?;
        }

        let port = match caps.name("port") {
            Some(port) => Some(port.as_str().parse::<u16>()?),
            None => None,
        };

        let mut params = IndexMap::new();
        if let Some(raw) = caps.name("params") {
            for param in raw.as_str().split(';') {
                if param.is_empty() {
                    continue;
                }
                match param.split_once('=') {
                    Some((key, value)) => {
                        params.insert(key.to_string(), Some(value.to_string()));
                    }
                    None => {
                        params.insert(param.to_string(), None);
                    }
                }
            }
        }

        Ok(Uri {
            scheme,
            user: caps.name("user").map(|u| u.as_str().to_string()),
            password: caps.name("password").map(|p| p.as_str().to_string()),
            host,
            port,
            params,
        })
    }
}

impl Uri {
    /// Parse `s`, prefixing `scheme:` when the input carries no scheme
    /// of its own. Used for configuration values where a bare host or
    /// user@host form implies sip or sips.
    pub fn parse_with_default_scheme(scheme: &str, s: &str) -> Result<Uri> {
        if SCHEME_REGEX.is_match(s) {
            Uri::from_str(s)
        } else {
            Uri::from_str(&[scheme, ":", s].concat())
        }
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;

        if let Some(ref user) = self.user {
            write!(f, "{}", user)?;
            if let Some(ref password) = self.password {
                write!(f, ":{}", password)?;
            }
            write!(f, "@")?;
        }

        write!(f, "{}", self.host)?;
        if let Some(ref port) = self.port {
            write!(f, ":{}", port)?;
        }

        for (key, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", key, value)?,
                None => write!(f, ";{}", key)?,
            }
        }

        Ok(())
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: String,
    pub uri: Uri,
    pub tag: Option<String>,
    pub params: IndexMap<String, Option<String>>,
}

impl Address {
    /// The tag parameter of a To or From header, if present.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

/// A SIP message, request or response. Requests carry `method`,
/// responses carry `code` and `status`.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub method: Option<Method>,
    pub code: Option<i32>,
    pub status: Option<String>,
    pub request_uri: Option<Uri>,
    pub via: Vec<Via>,
    pub from: Address,
    pub to: Address,
    pub callid: String,
    pub cseq: Cseq,
}

impl Message {
    pub fn is_request(&self) -> bool {
        self.method.is_some()
    }

    pub fn top_via(&self) -> Result<&Via, MessageError> {
        self.via.first().ok_or(MessageError::NoVia)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_uri() {
        let uri = Uri::from_str("sip:alice:secret@atlanta.example.com:5070;transport=tcp;lr")
            .unwrap();
        assert_eq!(uri.scheme, "sip");
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.password.as_deref(), Some("secret"));
        assert_eq!(uri.host, "atlanta.example.com");
        assert_eq!(uri.port, Some(5070));
        assert_eq!(
            uri.params.get("transport"),
            Some(&Some("tcp".to_string()))
        );
        assert_eq!(uri.params.get("lr"), Some(&None));
    }

    #[test]
    fn uri_display_round_trips() {
        let s = "sips:bob@biloxi.example.com:5061;transport=tls";
        let uri = Uri::from_str(s).unwrap();
        assert_eq!(uri.to_string(), s);
    }

    #[test]
    fn uri_host_is_lowercased() {
        let uri = Uri::from_str("sip:Example.ORG").unwrap();
        assert_eq!(uri.host, "example.org");
    }

    #[test]
    fn non_sip_scheme_is_rejected() {
        assert!(Uri::from_str("http://example.org").is_err());
        assert!(Uri::from_str("tel:+441234567890").is_err());
    }

    #[test]
    fn default_scheme_applies_only_without_scheme() {
        let uri = Uri::parse_with_default_scheme("sip", "example.org:5070").unwrap();
        assert_eq!(uri.scheme, "sip");
        assert_eq!(uri.host, "example.org");
        assert_eq!(uri.port, Some(5070));

        let uri = Uri::parse_with_default_scheme("sips", "bob@example.org").unwrap();
        assert_eq!(uri.scheme, "sips");
        assert_eq!(uri.user.as_deref(), Some("bob"));

        let uri = Uri::parse_with_default_scheme("sips", "sip:example.org").unwrap();
        assert_eq!(uri.scheme, "sip");
    }

    #[test]
    fn sent_by_defaults_the_port() {
        let via = Via {
            host: "proxy.example.org".to_string(),
            ..Default::default()
        };
        assert_eq!(via.sent_by(), "proxy.example.org:5060");

        let via = Via {
            host: "proxy.example.org".to_string(),
            port: Some(5070),
            ..Default::default()
        };
        assert_eq!(via.sent_by(), "proxy.example.org:5070");
    }

    #[test]
    fn top_via_is_the_first_hop() {
        let message = Message {
            via: vec![
                Via {
                    host: "proxy.example.org".to_string(),
                    branch: "z9hG4bK.top".to_string(),
                    ..Default::default()
                },
                Via {
                    host: "client.example.org".to_string(),
                    branch: "z9hG4bK.below".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(message.top_via().unwrap().branch, "z9hG4bK.top");
        assert!(Message::default().top_via().is_err());
    }

    #[test]
    fn address_tag_access() {
        let address = Address {
            tag: Some("a48s".to_string()),
            ..Default::default()
        };
        assert_eq!(address.tag(), Some("a48s"));
        assert_eq!(Address::default().tag(), None);
    }
}
