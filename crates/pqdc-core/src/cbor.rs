use std::io::Cursor;

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to encode CBOR payload: {0}")]
    Serialize(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("failed to decode CBOR payload: {0}")]
    Deserialize(#[from] ciborium::de::Error<std::io::Error>),
    #[error("{0} trailing bytes after CBOR payload")]
    TrailingBytes(usize),
}

pub fn to_vec<T>(value: &T) -> Result<Vec<u8>, Error>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Decode exactly one CBOR item; anything left over is rejected so a frame
/// cannot smuggle a second message behind the first.
pub fn from_slice<T>(bytes: &[u8]) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let mut cursor = Cursor::new(bytes);
    let value = ciborium::de::from_reader(&mut cursor)?;
    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(Error::TrailingBytes(bytes.len() - consumed));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        label: String,
        value: u16,
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut encoded = to_vec(&Probe {
            label: "dc".into(),
            value: 0x0403,
        })
        .expect("encode");
        encoded.push(0x00);
        let err = from_slice::<Probe>(&encoded).expect_err("trailing byte");
        assert!(matches!(err, Error::TrailingBytes(1)));
    }
}
