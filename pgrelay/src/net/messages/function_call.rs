//! FunctionCall (F) message.

use super::bind::Parameter;
use super::code;
use super::prelude::*;

/// FunctionCall (F). Legacy fast-path function invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionCall {
    /// Function OID.
    pub oid: i32,
    /// Argument format codes.
    pub codes: Vec<i16>,
    pub args: Vec<Parameter>,
    /// Result format code.
    pub result: i16,
}

impl FromBytes for FunctionCall {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'F');
        let _len = bytes.get_i32();
        let oid = bytes.get_i32();

        let num_codes = bytes.get_i16().max(0) as usize;
        let codes = (0..num_codes).map(|_| bytes.get_i16()).collect();

        let num_args = bytes.get_i16().max(0) as usize;
        let mut args = Vec::with_capacity(num_args);
        for _ in 0..num_args {
            let len = bytes.get_i32();
            if len < 0 {
                args.push(Parameter::null());
            } else if bytes.remaining() < len as usize {
                return Err(Error::Truncated);
            } else {
                args.push(Parameter {
                    data: Some(bytes.split_to(len as usize)),
                });
            }
        }

        let result = bytes.get_i16();

        Ok(Self {
            oid,
            codes,
            args,
            result,
        })
    }
}

impl ToBytes for FunctionCall {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_i32(self.oid);

        payload.put_i16(self.codes.len() as i16);
        for code in &self.codes {
            payload.put_i16(*code);
        }

        payload.put_i16(self.args.len() as i16);
        for arg in &self.args {
            match &arg.data {
                Some(data) => {
                    payload.put_i32(data.len() as i32);
                    payload.put_slice(data);
                }
                None => payload.put_i32(-1),
            }
        }

        payload.put_i16(self.result);

        Ok(payload.freeze())
    }
}

impl Protocol for FunctionCall {
    fn code(&self) -> char {
        'F'
    }
}
