//! Parses a top-level JSON array without buffering it into a `Vec` first,
//! using `serde_json`'s public `Visitor`/`SeqAccess` API: each element is
//! handed to the callback and dropped before the next one is read.

use serde::de::{DeserializeOwned, Deserializer, SeqAccess, Visitor};
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;

use crate::error::{AppError, Result};

struct StreamingSeqVisitor<T, F> {
    on_record: F,
    _marker: PhantomData<T>,
}

impl<'de, T, F> Visitor<'de> for StreamingSeqVisitor<T, F>
where
    T: DeserializeOwned,
    F: FnMut(T) -> std::result::Result<(), String>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON array of import records")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(record) = seq.next_element::<T>()? {
            (self.on_record)(record).map_err(serde::de::Error::custom)?;
        }
        Ok(())
    }
}

/// Streams a JSON array of `T` off `reader`, invoking `on_record` for each
/// element as it is parsed. Memory use is bounded by one element plus
/// whatever `on_record` itself buffers (the caller's batch).
pub fn stream_json_array<R, T, F>(reader: R, on_record: F) -> Result<()>
where
    R: Read,
    T: DeserializeOwned,
    F: FnMut(T) -> std::result::Result<(), String>,
{
    let visitor = StreamingSeqVisitor {
        on_record,
        _marker: PhantomData,
    };
    let mut de = serde_json::Deserializer::from_reader(reader);
    de.deserialize_seq(visitor)
        .map_err(|e| AppError::UnrecognizedFormat(format!("malformed json array: {e}")))
}
