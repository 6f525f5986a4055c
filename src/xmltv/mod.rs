//! XMLTV codec
//!
//! [`decode`] turns a guide document into ordered channel and programme
//! declarations. [`XmltvWriter`] and [`encode`] go the other way with a fixed
//! element order so identical input always produces identical bytes.

pub mod decode;
pub mod encode;

use crate::models::{ChannelDecl, Programme};

pub use decode::{decode, decode_bytes, decode_streaming, XmltvItem};
pub use encode::{encode, EncodeOptions, XmltvWriter};

/// A decoded guide document, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmltvDocument {
    pub channels: Vec<ChannelDecl>,
    pub programmes: Vec<Programme>,
}
