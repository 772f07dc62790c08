//! Client identity as handed to each conversation.
//!
//! MySQL clients can only pass a username and a password to an auth plugin,
//! so extra options ride along in the username as a query string:
//! `alice?source=admin&serviceName=mongosql`. [`Identity::parse`] splits the
//! two apart; the bare name is what goes on the wire.

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroizing;

/// Username parameter overriding the GSSAPI service name.
pub const SERVICE_NAME_PARAM: &str = "serviceName";

#[derive(Clone)]
pub struct Identity {
    username: String,
    password: Zeroizing<String>,
    params: BTreeMap<String, String>,
}

impl Identity {
    /// Split `username` at the first `?` into a bare name and its parameters.
    pub fn parse(username: &str, password: &str) -> Identity {
        let (bare, params) = match username.split_once('?') {
            Some((bare, query)) => (bare, parse_params(query)),
            None => (username, BTreeMap::new()),
        };

        Identity {
            username: bare.to_string(),
            password: Zeroizing::new(password.to_string()),
            params,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("params", &self.params)
            .finish()
    }
}

fn parse_params(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
