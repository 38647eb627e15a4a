//! Typed view of a single Via header value (RFC 3261 Section 20.42).
//!
//! A Via header line may carry several comma-separated values; this type
//! models exactly one of them, i.e. one hop.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{tag_no_case, take_till1, take_while1},
    character::complete::{char, digit1, space0},
    combinator::{map_res, opt},
    sequence::{delimited, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// RFC 3261 branch magic cookie.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    /// Transport token, e.g. `UDP`
    pub transport: String,
    pub host: String,
    pub port: Option<u16>,
    /// Parameters in order; flags have no value
    pub params: Vec<(String, Option<String>)>,
}

impl Via {
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            transport: transport.into(),
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.set_param("branch", Some(branch.into()));
        self
    }

    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// Sets or replaces a parameter, keeping its position if it already exists.
    pub fn set_param(&mut self, name: &str, value: Option<String>) {
        match self.params.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
    }

    pub fn branch(&self) -> Option<&str> {
        self.param("branch").flatten().filter(|b| !b.is_empty())
    }

    pub fn received(&self) -> Option<&str> {
        self.param("received").flatten()
    }

    /// `Some(None)` when the client asked for rport without a value.
    pub fn rport(&self) -> Option<Option<u16>> {
        self.param("rport")
            .map(|v| v.and_then(|port| port.parse::<u16>().ok()))
    }

    /// `host[:port]` as written in the sent-by field.
    pub fn sent_by(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}

fn sent_protocol(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((
            tag_no_case("SIP"),
            space0,
            char('/'),
            space0,
            tag_no_case("2.0"),
            space0,
            char('/'),
            space0,
        )),
        take_while1(is_token_char),
    )(input)
}

fn host(input: &str) -> IResult<&str, &str> {
    if input.starts_with('[') {
        let (rest, inner) = delimited(char('['), take_till1(|c: char| c == ']'), char(']'))(input)?;
        let consumed = inner.len() + 2;
        Ok((rest, &input[..consumed]))
    } else {
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-')(input)
    }
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(
        tuple((space0, char(':'), space0)),
        map_res(digit1, |s: &str| s.parse::<u16>()),
    )(input)
}

fn via_prefix(input: &str) -> IResult<&str, (&str, &str, Option<u16>)> {
    let (input, transport) = sent_protocol(input)?;
    let (input, _) = take_while1(|c: char| c == ' ' || c == '\t')(input)?;
    let (input, host) = host(input)?;
    let (input, port) = opt(port)(input)?;
    Ok((input, (transport, host, port)))
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (rest, (transport, host, port)) =
            via_prefix(trimmed).map_err(|_| Error::InvalidVia(s.to_string()))?;

        let mut params = Vec::new();
        for raw in rest.split(';').skip(1) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.split_once('=') {
                Some((name, value)) => {
                    params.push((name.trim().to_string(), Some(value.trim().to_string())))
                }
                None => params.push((raw.to_string(), None)),
            }
        }
        if !rest.trim().is_empty() && !rest.trim_start().starts_with(';') {
            return Err(Error::InvalidVia(s.to_string()));
        }

        Ok(Via {
            transport: transport.to_ascii_uppercase(),
            host: host.to_string(),
            port,
            params,
        })
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.sent_by())?;
        for (name, value) in &self.params {
            match value {
                Some(v) => write!(f, ";{}={}", name, v)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_via_with_params() {
        let via: Via = "SIP/2.0/UDP 192.168.1.5:5060;branch=z9hG4bK-1;rport"
            .parse()
            .unwrap();
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.host, "192.168.1.5");
        assert_eq!(via.port, Some(5060));
        assert_eq!(via.branch(), Some("z9hG4bK-1"));
        assert_eq!(via.rport(), Some(None));
        assert_eq!(via.received(), None);
    }

    #[test]
    fn test_parse_ipv6_and_spacing() {
        let via: Via = "SIP / 2.0 / tcp [::1] : 5070 ; branch=z9hG4bKabc".parse().unwrap();
        assert_eq!(via.transport, "TCP");
        assert_eq!(via.host, "[::1]");
        assert_eq!(via.port, Some(5070));
        assert_eq!(via.branch(), Some("z9hG4bKabc"));
    }

    #[test]
    fn test_set_param_preserves_order() {
        let mut via: Via = "SIP/2.0/UDP host;rport;branch=z9hG4bKx".parse().unwrap();
        via.set_param("rport", Some("5062".to_string()));
        via.set_param("received", Some("10.0.0.1".to_string()));
        assert_eq!(
            via.to_string(),
            "SIP/2.0/UDP host;rport=5062;branch=z9hG4bKx;received=10.0.0.1"
        );
        assert_eq!(via.rport(), Some(Some(5062)));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("HTTP/1.1 host".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP".parse::<Via>().is_err());
    }
}
