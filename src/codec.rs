//! Conversions between stored strings and typed values.
//!
//! A key-value store only holds strings, so every synchronizer is paired with
//! a [`Codec`] that encodes its values on write and decodes them on load.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Encode/decode pair for one value type.
pub trait Codec<T>: Send + Sync {
    /// Turn a value into its stored string form.
    fn encode(&self, value: &T) -> Result<String, CodecError>;

    /// Turn a stored string back into a value.
    fn decode(&self, encoded: &str) -> Result<T, CodecError>;
}

/// JSON encoding for any serde type.
///
/// # Examples
///
/// ```
/// use stowage::codec::{Codec, JsonCodec};
///
/// let codec = JsonCodec::<Vec<u8>>::new();
/// assert_eq!(codec.encode(&vec![1, 2]).unwrap(), "[1,2]");
/// assert_eq!(codec.decode("[3]").unwrap(), vec![3]);
/// ```
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Create a JSON codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, encoded: &str) -> Result<T, CodecError> {
        Ok(serde_json::from_str(encoded)?)
    }
}

/// `"true"` / `"false"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl Codec<bool> for BoolCodec {
    fn encode(&self, value: &bool) -> Result<String, CodecError> {
        Ok(value.to_string())
    }

    fn decode(&self, encoded: &str) -> Result<bool, CodecError> {
        match encoded {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(CodecError::Decode(other.to_string())),
        }
    }
}

/// Decimal text for `f64`. Non-finite numbers have no stored form.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberCodec;

impl Codec<f64> for NumberCodec {
    fn encode(&self, value: &f64) -> Result<String, CodecError> {
        if value.is_finite() {
            Ok(value.to_string())
        } else {
            Err(CodecError::Encode(format!("{value} is not a finite number")))
        }
    }

    fn decode(&self, encoded: &str) -> Result<f64, CodecError> {
        encoded
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| CodecError::Decode(encoded.to_string()))
    }
}

/// Stores strings as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<String, CodecError> {
        Ok(value.clone())
    }

    fn decode(&self, encoded: &str) -> Result<String, CodecError> {
        Ok(encoded.to_string())
    }
}

type EncodeFn<T> = Arc<dyn Fn(&T) -> Result<String, CodecError> + Send + Sync>;
type DecodeFn<T> = Arc<dyn Fn(&str) -> Result<T, CodecError> + Send + Sync>;

/// Codec built from a caller-supplied pair of closures.
///
/// # Examples
///
/// ```
/// use stowage::codec::{Codec, FnCodec};
/// use stowage::CodecError;
///
/// let codec = FnCodec::new(
///     |n: &u32| Ok(format!("{n:x}")),
///     |s: &str| u32::from_str_radix(s, 16).map_err(|_| CodecError::Decode(s.to_string())),
/// );
/// assert_eq!(codec.encode(&255).unwrap(), "ff");
/// assert_eq!(codec.decode("10").unwrap(), 16);
/// ```
pub struct FnCodec<T> {
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T> FnCodec<T> {
    /// Wrap an encode and a decode function.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&T) -> Result<String, CodecError> + Send + Sync + 'static,
        D: Fn(&str) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }
}

impl<T> Clone for FnCodec<T> {
    fn clone(&self) -> Self {
        Self {
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> Codec<T> for FnCodec<T> {
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, encoded: &str) -> Result<T, CodecError> {
        (self.decode)(encoded)
    }
}
