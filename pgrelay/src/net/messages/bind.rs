//! Bind (F) message.

use crate::net::c_string_buf;

use super::code;
use super::prelude::*;

/// Bound parameter value. `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    pub data: Option<Bytes>,
}

impl Parameter {
    pub fn text(value: &str) -> Self {
        Self {
            data: Some(Bytes::copy_from_slice(value.as_bytes())),
        }
    }

    pub fn null() -> Self {
        Self { data: None }
    }
}

/// Bind (F) message. Also the definition of a portal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bind {
    /// Portal name.
    pub portal: String,
    /// Prepared statement name.
    pub statement: String,
    /// Parameter format codes.
    pub codes: Vec<i16>,
    /// Parameter values.
    pub params: Vec<Parameter>,
    /// Result format codes.
    pub results: Vec<i16>,
}

impl Bind {
    /// Bind a statement to a portal with text parameters.
    pub fn new(portal: &str, statement: &str, params: Vec<Parameter>) -> Self {
        Self {
            portal: portal.into(),
            statement: statement.into(),
            params,
            ..Default::default()
        }
    }

    pub fn anonymous(&self) -> bool {
        self.portal.is_empty()
    }
}

impl FromBytes for Bind {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'B');
        let _len = bytes.get_i32();
        let portal = c_string_buf(&mut bytes);
        let statement = c_string_buf(&mut bytes);

        let num_codes = bytes.get_i16().max(0) as usize;
        let codes = (0..num_codes).map(|_| bytes.get_i16()).collect();

        let num_params = bytes.get_i16().max(0) as usize;
        let mut params = Vec::with_capacity(num_params);
        for _ in 0..num_params {
            let len = bytes.get_i32();
            if len < 0 {
                params.push(Parameter::null());
            } else {
                let len = len as usize;
                if bytes.remaining() < len {
                    return Err(Error::Truncated);
                }
                params.push(Parameter {
                    data: Some(bytes.split_to(len)),
                });
            }
        }

        let num_results = bytes.get_i16().max(0) as usize;
        let results = (0..num_results).map(|_| bytes.get_i16()).collect();

        Ok(Self {
            portal,
            statement,
            codes,
            params,
            results,
        })
    }
}

impl ToBytes for Bind {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());

        payload.put_string(&self.portal);
        payload.put_string(&self.statement);

        payload.put_i16(self.codes.len() as i16);
        for code in &self.codes {
            payload.put_i16(*code);
        }

        payload.put_i16(self.params.len() as i16);
        for param in &self.params {
            match &param.data {
                Some(data) => {
                    payload.put_i32(data.len() as i32);
                    payload.put_slice(data);
                }
                None => payload.put_i32(-1),
            }
        }

        payload.put_i16(self.results.len() as i16);
        for code in &self.results {
            payload.put_i16(*code);
        }

        Ok(payload.freeze())
    }
}

impl Protocol for Bind {
    fn code(&self) -> char {
        'B'
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bind_null_and_text() {
        let bind = Bind {
            portal: "".into(),
            statement: "s1".into(),
            codes: vec![0],
            params: vec![Parameter::text("42"), Parameter::null()],
            results: vec![1],
        };

        let decoded = Bind::from_bytes(bind.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, bind);
        assert!(decoded.anonymous());
        assert_eq!(decoded.params[1].data, None);
    }
}
