use alloc::format;

use crate::{Error, Result};

/// Limits applied to a [`Backend`](crate::Backend) when it is initialized.
///
/// Options are given to `initialize` (or set up front with
/// [`Backend::with_options`](crate::Backend::with_options)) and stay fixed until the next
/// call to `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Options {
    /// The maximum number of nested calls, counting the entry call, host calls and
    /// re-entrant calls from host functions. At most [`Options::MAX_CALL_DEPTH`].
    pub max_call_depth: u32,

    /// Upper bound for the size of linear memory in 64 KiB pages. A module declaring a
    /// larger maximum is capped to this value.
    pub max_pages: u32,
}

impl Options {
    /// The call depth ceiling used when none is given.
    pub const DEFAULT_MAX_CALL_DEPTH: u32 = 251;

    /// The number of pages a 32-bit memory can address.
    pub const DEFAULT_MAX_PAGES: u32 = 65536;

    /// The highest call depth ceiling any strategy accepts.
    ///
    /// The JIT nests native frames for every wasm call, so its depth is bounded by the native
    /// stack of the calling thread. This bound keeps a full-depth JIT call well inside the
    /// 2 MiB of a spawned thread, even in unoptimized builds, and applies to every strategy so
    /// they all accept and refuse the same options.
    pub const MAX_CALL_DEPTH: u32 = 512;

    /// Options with the given call depth ceiling.
    pub fn with_max_call_depth(max_call_depth: u32) -> Self {
        Self { max_call_depth, ..Self::default() }
    }

    /// Check that the options can be honored by every strategy.
    pub fn validate(&self) -> Result<()> {
        if self.max_call_depth > Self::MAX_CALL_DEPTH {
            return Err(Error::InvalidOptions(format!(
                "max_call_depth of {} is above the supported maximum of {}",
                self.max_call_depth,
                Self::MAX_CALL_DEPTH
            )));
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self { max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH, max_pages: Self::DEFAULT_MAX_PAGES }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_depth_is_bounded() {
        assert!(Options::default().validate().is_ok());
        assert!(Options::with_max_call_depth(0).validate().is_ok());
        assert!(Options::with_max_call_depth(Options::MAX_CALL_DEPTH).validate().is_ok());
        assert!(matches!(
            Options::with_max_call_depth(Options::MAX_CALL_DEPTH + 1).validate(),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn missing_fields_take_their_defaults() {
        let options: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(options, Options { max_call_depth: 251, max_pages: 65536 });

        let options: Options = serde_json::from_str(r#"{"max_call_depth": 51}"#).unwrap();
        assert_eq!(options, Options { max_call_depth: 51, max_pages: 65536 });

        let options: Options = serde_json::from_str(r#"{"max_pages": 16}"#).unwrap();
        assert_eq!(options, Options { max_call_depth: 251, max_pages: 16 });
    }

    #[cfg(feature = "serde")]
    #[test]
    fn unknown_fields_are_ignored() {
        let options: Options = serde_json::from_str(r#"{"max_call_depth": 151, "fuel": 10}"#).unwrap();
        assert_eq!(options, Options::with_max_call_depth(151));
    }
}
