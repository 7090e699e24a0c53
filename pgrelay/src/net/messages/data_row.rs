//! DataRow (B) message.

use super::{code, prelude::*};

/// DataRow message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
    columns: Vec<Option<Bytes>>,
}

impl DataRow {
    /// New data row.
    pub fn new() -> Self {
        Self { columns: vec![] }
    }

    /// Add a text column to the data row.
    pub fn add(&mut self, value: impl ToString) -> &mut Self {
        self.columns
            .push(Some(Bytes::from(value.to_string().into_bytes())));
        self
    }

    /// Add a NULL column.
    pub fn add_null(&mut self) -> &mut Self {
        self.columns.push(None);
        self
    }

    /// Get a column as text.
    pub fn get_text(&self, index: usize) -> Option<String> {
        self.columns
            .get(index)
            .and_then(|column| column.as_ref())
            .map(|column| String::from_utf8_lossy(column).to_string())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromBytes for DataRow {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'D');
        let _len = bytes.get_i32();
        let num_columns = bytes.get_i16().max(0) as usize;

        let mut columns = Vec::with_capacity(num_columns);
        for _ in 0..num_columns {
            let len = bytes.get_i32();
            if len < 0 {
                columns.push(None);
            } else if bytes.remaining() < len as usize {
                return Err(Error::Truncated);
            } else {
                columns.push(Some(bytes.split_to(len as usize)));
            }
        }

        Ok(Self { columns })
    }
}

impl ToBytes for DataRow {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_i16(self.columns.len() as i16);

        for column in &self.columns {
            match column {
                Some(data) => {
                    payload.put_i32(data.len() as i32);
                    payload.put_slice(data);
                }
                None => payload.put_i32(-1),
            }
        }

        Ok(payload.freeze())
    }
}

impl Protocol for DataRow {
    fn code(&self) -> char {
        'D'
    }
}
