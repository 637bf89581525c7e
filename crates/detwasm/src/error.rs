use alloc::string::{String, ToString};
use core::fmt::Display;
use detwasm_types::{FuncType, Import};

#[cfg(feature = "parser")]
pub use detwasm_parser::ParseError;

/// Errors that can occur for `detwasm` operations
#[derive(Debug)]
pub enum Error {
    /// A WebAssembly trap occurred
    Trap(Trap),

    /// A linking error occurred
    Linker(LinkingError),

    /// A WebAssembly feature is not supported
    UnsupportedFeature(String),

    /// An exported function could not be found
    FunctionNotFound {
        /// The namespace the caller asked for
        module: String,
        /// The export name
        name: String,
    },

    /// The arguments of a call do not match the signature of the function
    InvalidArguments(String),

    /// The backend has not been (successfully) initialized
    NotInitialized,

    /// `initialize` was called before a memory allocator was set
    AllocatorNotSet,

    /// The options given to `initialize` cannot be honored
    InvalidOptions(String),

    /// An unknown error occurred
    Other(String),

    #[cfg(feature = "parser")]
    /// A parsing error occurred
    ParseError(ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors that can occur when linking a WebAssembly module
pub enum LinkingError {
    /// An unknown import was encountered
    UnknownImport {
        /// The module name
        module: String,
        /// The import name
        name: String,
    },

    /// A mismatched import type was encountered
    IncompatibleImportType {
        /// The module name
        module: String,
        /// The import name
        name: String,
    },
}

impl LinkingError {
    pub(crate) fn incompatible_import_type(import: &Import) -> Self {
        Self::IncompatibleImportType { module: import.module.to_string(), name: import.name.to_string() }
    }

    pub(crate) fn unknown_import(import: &Import) -> Self {
        Self::UnknownImport { module: import.module.to_string(), name: import.name.to_string() }
    }

    /// Get the message of the linking error
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownImport { .. } => "unknown import",
            Self::IncompatibleImportType { .. } => "incompatible import type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A WebAssembly trap
///
/// See <https://webassembly.github.io/spec/core/intro/overview.html#trap>
pub enum Trap {
    /// An unreachable instruction was executed
    Unreachable,

    /// An out-of-bounds memory access occurred
    MemoryOutOfBounds {
        /// The offset of the access
        offset: usize,
        /// The size of the access
        len: usize,
        /// The size of the memory
        max: usize,
    },

    /// An out-of-bounds table access occurred
    TableOutOfBounds {
        /// The offset of the access
        offset: usize,
        /// The size of the access
        len: usize,
        /// The size of the table
        max: usize,
    },

    /// A division by zero occurred
    DivisionByZero,

    /// Invalid Integer Conversion
    InvalidConversionToInt,

    /// Integer Overflow
    IntegerOverflow,

    /// The configured call depth was exceeded
    CallDepthExceeded {
        /// The ceiling that was hit
        max_depth: u32,
    },

    /// An undefined element was encountered
    UndefinedElement {
        /// The element index
        index: usize,
    },

    /// An uninitialized element was encountered
    UninitializedElement {
        /// The element index
        index: usize,
    },

    /// Indirect call type mismatch
    IndirectCallTypeMismatch {
        /// The expected type
        expected: FuncType,
        /// The actual type
        actual: FuncType,
    },

    /// A host function trapped
    Host {
        /// The message given by the host
        message: String,
    },
}

impl Trap {
    /// Create a trap raised by host code.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host { message: message.into() }
    }

    /// Get the message of the trap
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::MemoryOutOfBounds { .. } => "out of bounds memory access",
            Self::TableOutOfBounds { .. } => "out of bounds table access",
            Self::DivisionByZero => "integer divide by zero",
            Self::InvalidConversionToInt => "invalid conversion to integer",
            Self::IntegerOverflow => "integer overflow",
            Self::CallDepthExceeded { .. } => "call depth exceeded",
            Self::UndefinedElement { .. } => "undefined element",
            Self::UninitializedElement { .. } => "uninitialized element",
            Self::IndirectCallTypeMismatch { .. } => "indirect call type mismatch",
            Self::Host { .. } => "host trap",
        }
    }
}

impl Error {
    /// The trap behind this error, if any.
    pub fn trap(&self) -> Option<&Trap> {
        match self {
            Self::Trap(trap) => Some(trap),
            _ => None,
        }
    }
}

impl From<LinkingError> for Error {
    fn from(value: LinkingError) -> Self {
        Self::Linker(value)
    }
}

impl From<Trap> for Error {
    fn from(value: Trap) -> Self {
        Self::Trap(value)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            #[cfg(feature = "parser")]
            Self::ParseError(err) => write!(f, "error parsing module: {err}"),

            Self::Trap(trap) => write!(f, "trap: {trap}"),
            Self::Linker(err) => write!(f, "linking error: {err}"),
            Self::UnsupportedFeature(feature) => write!(f, "unsupported feature: {feature}"),
            Self::FunctionNotFound { module, name } => write!(f, "function not found: {module}.{name}"),
            Self::InvalidArguments(message) => write!(f, "invalid arguments: {message}"),
            Self::NotInitialized => write!(f, "backend is not initialized"),
            Self::AllocatorNotSet => write!(f, "no memory allocator was set"),
            Self::InvalidOptions(message) => write!(f, "invalid options: {message}"),
            Self::Other(message) => write!(f, "unknown error: {message}"),
        }
    }
}

impl Display for LinkingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownImport { module, name } => write!(f, "unknown import: {module}.{name}"),
            Self::IncompatibleImportType { module, name } => {
                write!(f, "incompatible import type: {module}.{name}")
            }
        }
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MemoryOutOfBounds { offset, len, max } => {
                write!(f, "out of bounds memory access: offset={offset}, len={len}, max={max}")
            }
            Self::TableOutOfBounds { offset, len, max } => {
                write!(f, "out of bounds table access: offset={offset}, len={len}, max={max}")
            }
            Self::CallDepthExceeded { max_depth } => write!(f, "call depth exceeded: max_depth={max_depth}"),
            Self::UndefinedElement { index } => write!(f, "undefined element: index={index}"),
            Self::UninitializedElement { index } => write!(f, "uninitialized element: index={index}"),
            Self::IndirectCallTypeMismatch { expected, actual } => {
                write!(f, "indirect call type mismatch: expected={expected:?}, actual={actual:?}")
            }
            Self::Host { message } => write!(f, "host trap: {message}"),
            other => f.write_str(other.message()),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            #[cfg(feature = "parser")]
            Self::ParseError(err) => Some(err),
            Self::Trap(trap) => Some(trap),
            Self::Linker(err) => Some(err),
            _ => None,
        }
    }
}

impl core::error::Error for Trap {}
impl core::error::Error for LinkingError {}

#[cfg(feature = "parser")]
impl From<detwasm_parser::ParseError> for Error {
    fn from(value: detwasm_parser::ParseError) -> Self {
        Self::ParseError(value)
    }
}

/// A wrapper around [`core::result::Result`] for detwasm operations
pub type Result<T, E = Error> = core::result::Result<T, E>;
