//! Startup parameters.

use std::collections::BTreeMap;
use std::ops::Deref;

use super::Error;

/// Parameters the pooler owns and never forwards to the server.
const POOLER_PARAMS: &[&str] = &["user", "database"];

/// Startup parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Parameter value.
    pub value: String,
}

impl<T: ToString> From<(T, T)> for Parameter {
    fn from(value: (T, T)) -> Self {
        Self {
            name: value.0.to_string(),
            value: value.1.to_string(),
        }
    }
}

/// Collection of startup parameters, sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    params: BTreeMap<String, String>,
}

impl Parameters {
    pub fn insert(&mut self, name: impl ToString, value: impl ToString) {
        self.params.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    /// Get a parameter the client is required to send.
    pub fn get_required(&self, name: &str) -> Result<&str, Error> {
        self.get(name)
            .filter(|value| !value.is_empty())
            .ok_or(Error::MissingParameter(name.to_owned()))
    }

    /// Parameters safe to pass through to a server connection.
    pub fn forwarded(&self) -> Vec<Parameter> {
        self.params
            .iter()
            .filter(|(name, _)| !POOLER_PARAMS.contains(&name.as_str()))
            .map(|(name, value)| Parameter::from((name.as_str(), value.as_str())))
            .collect()
    }
}

impl Deref for Parameters {
    type Target = BTreeMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.params
    }
}

impl From<Vec<Parameter>> for Parameters {
    fn from(value: Vec<Parameter>) -> Self {
        Self {
            params: value.into_iter().map(|p| (p.name, p.value)).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_forwarded_skips_pooler_params() {
        let mut params = Parameters::default();
        params.insert("user", "alice");
        params.insert("database", "app");
        params.insert("application_name", "psql");

        let forwarded = params.forwarded();
        assert_eq!(forwarded, vec![Parameter::from(("application_name", "psql"))]);
        assert!(params.get_required("database").is_ok());
        assert!(params.get_required("options").is_err());
    }
}
