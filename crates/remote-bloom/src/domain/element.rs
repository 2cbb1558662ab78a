//! Element encoding
//!
//! A filter hashes the bytes produced here, so the encoding of a given value
//! must never change. Byte-like values hash as their raw bytes. Structured
//! values go through [`Encoded`], which uses bincode's default options.

use std::borrow::Cow;

use serde::Serialize;

use crate::error::EncodingError;

/// Values that can be added to or looked up in a filter
pub trait FilterElement {
    /// Bytes that identify this element
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError>;
}

impl FilterElement for [u8] {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        Ok(Cow::Borrowed(self))
    }
}

impl<const N: usize> FilterElement for [u8; N] {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl FilterElement for Vec<u8> {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl FilterElement for str {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl FilterElement for String {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl<T: FilterElement + ?Sized> FilterElement for &T {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        (**self).to_bytes()
    }
}

/// Wrapper hashing any `Serialize` value through bincode
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize)]
/// struct Visit { user: u64, page: String }
///
/// filter.add(&ctx, &Encoded(Visit { user: 7, page: "/".into() })).await?;
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded<T>(pub T);

impl<T: Serialize> FilterElement for Encoded<T> {
    fn to_bytes(&self) -> Result<Cow<'_, [u8]>, EncodingError> {
        bincode::serialize(&self.0)
            .map(Cow::Owned)
            .map_err(|e| EncodingError::Serialization(e.to_string()))
    }
}

/// Encode an element and reject empty encodings
pub(crate) fn encode<E: FilterElement + ?Sized>(element: &E) -> Result<Cow<'_, [u8]>, EncodingError> {
    let bytes = element.to_bytes()?;
    if bytes.is_empty() {
        return Err(EncodingError::EmptyElement);
    }
    Ok(bytes)
}
