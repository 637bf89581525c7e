use core::fmt::{Debug, Display};

use alloc::string::{String, ToString};
use wasmparser::Encoding;

/// Errors raised while validating or lowering a WebAssembly binary.
#[derive(Debug)]
pub enum ParseError {
    /// A value type the engine cannot represent (`v128`, references on the operand stack).
    InvalidType(String),
    /// A section that is valid WebAssembly but not supported by the engine.
    UnsupportedSection(String),
    /// A section appeared more than once.
    DuplicateSection(String),
    /// An operator outside of the supported instruction set.
    UnsupportedOperator(String),
    /// Error reported by `wasmparser`, either while decoding or validating.
    ParseError { message: String, offset: usize },
    /// The binary is not a core module.
    InvalidEncoding(Encoding),
    /// A function body or block is too large to address with 32-bit offsets.
    TooLarge(String),
    /// The binary ended before the end of the module.
    EndNotReached,
    Other(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidType(ty) => write!(f, "invalid type: {ty}"),
            Self::UnsupportedSection(section) => write!(f, "unsupported section: {section}"),
            Self::DuplicateSection(section) => write!(f, "duplicate section: {section}"),
            Self::UnsupportedOperator(operator) => write!(f, "unsupported operator: {operator}"),
            Self::ParseError { message, offset } => {
                write!(f, "error parsing module: {message} at offset {offset}")
            }
            Self::InvalidEncoding(encoding) => write!(f, "invalid encoding: {encoding:?}"),
            Self::TooLarge(what) => write!(f, "too large: {what}"),
            Self::EndNotReached => write!(f, "end of module not reached"),
            Self::Other(message) => write!(f, "unknown error: {message}"),
        }
    }
}

impl core::error::Error for ParseError {}

impl From<wasmparser::BinaryReaderError> for ParseError {
    fn from(value: wasmparser::BinaryReaderError) -> Self {
        Self::ParseError { message: value.message().to_string(), offset: value.offset() }
    }
}

pub type Result<T, E = ParseError> = core::result::Result<T, E>;
