// src/core/protocol/mod.rs

//! Wire format: frame splitting, byte escaping, check codes and header parsing.

pub mod bcd;
pub mod builder;
pub mod checksum;
pub mod escape;
pub mod frame;
pub mod header;

pub use builder::{GeneralResult, MessageBuilder};
pub use escape::{escape, unescape};
pub use frame::Jt808FrameCodec;
pub use header::{MessageHeader, MessageProperties, ProtocolVersion, SubPackage, parse_header};
