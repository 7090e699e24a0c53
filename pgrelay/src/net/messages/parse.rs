//! Parse (F) message.

use crate::net::c_string_buf;

use super::code;
use super::prelude::*;

/// Parse (F) message. Also the definition of a prepared statement:
/// two statements are the same if their Parse messages are equal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parse {
    /// Statement name. Empty for the unnamed statement.
    pub name: String,
    /// Query text.
    pub query: String,
    /// Parameter type OIDs. Zero leaves the type unspecified.
    pub data_types: Vec<i32>,
}

impl Parse {
    /// New named prepared statement.
    pub fn named(name: impl ToString, query: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            data_types: vec![],
        }
    }

    /// New unnamed prepared statement.
    pub fn new_anonymous(query: &str) -> Self {
        Self::named("", query)
    }

    pub fn anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl FromBytes for Parse {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'P');
        let _len = bytes.get_i32();
        let name = c_string_buf(&mut bytes);
        let query = c_string_buf(&mut bytes);
        let params = bytes.get_i16().max(0) as usize;
        let data_types = (0..params).map(|_| bytes.get_i32()).collect();

        Ok(Self {
            name,
            query,
            data_types,
        })
    }
}

impl ToBytes for Parse {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());

        payload.put_string(&self.name);
        payload.put_string(&self.query);
        payload.put_i16(self.data_types.len() as i16);

        for oid in &self.data_types {
            payload.put_i32(*oid);
        }

        Ok(payload.freeze())
    }
}

impl Protocol for Parse {
    fn code(&self) -> char {
        'P'
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let parse = Parse {
            name: "__stmt_1".into(),
            query: "SELECT $1::bigint".into(),
            data_types: vec![20],
        };
        let decoded = Parse::from_bytes(parse.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, parse);
        assert!(!decoded.anonymous());
    }
}
