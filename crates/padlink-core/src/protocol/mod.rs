//! Protocol module containing the text encodings of control-pad events.

pub mod encoder;

pub use encoder::{decode, decode_csv, decode_json, DataFormat, DecodeError, EncodeError, EventEncoder};
