use crate::{unlikely, Result, Trap};

/// Counts nested calls and refuses to go past a ceiling.
///
/// Every call that starts executing takes one unit: the entry call made through the
/// [`Backend`](crate::Backend), every direct and indirect call, every host function
/// invocation and every re-entrant call a host function makes. A unit is returned when the
/// call finishes, whether it returned or trapped, so the depth is zero again after every
/// top-level call.
///
/// With a ceiling of `C`, at most `C` calls can be active at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallGuard {
    depth: u32,
    max_depth: u32,
}

impl CallGuard {
    /// Create a guard with the given ceiling.
    pub fn new(max_depth: u32) -> Self {
        Self { depth: 0, max_depth }
    }

    /// Take one unit of depth, or trap if the ceiling is already reached.
    ///
    /// On error the depth is left unchanged, so the caller must not call [`CallGuard::exit`].
    #[inline]
    pub fn enter(&mut self) -> Result<()> {
        if unlikely(self.depth >= self.max_depth) {
            return Err(Trap::CallDepthExceeded { max_depth: self.max_depth }.into());
        }
        self.depth += 1;
        Ok(())
    }

    /// Return one unit of depth.
    #[inline]
    pub fn exit(&mut self) {
        debug_assert!(self.depth > 0, "call guard exited more often than entered");
        self.depth = self.depth.saturating_sub(1);
    }

    /// Drop all active units and install a new ceiling.
    pub fn reset(&mut self, max_depth: u32) {
        self.depth = 0;
        self.max_depth = max_depth;
    }

    /// The number of currently active calls.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The configured ceiling.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

impl Default for CallGuard {
    fn default() -> Self {
        Self::new(crate::Options::DEFAULT_MAX_CALL_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn ceiling_counts_active_calls() {
        let mut guard = CallGuard::new(3);
        for _ in 0..3 {
            guard.enter().unwrap();
        }
        assert_eq!(guard.depth(), 3);
        assert!(matches!(guard.enter(), Err(Error::Trap(Trap::CallDepthExceeded { max_depth: 3 }))));
        assert_eq!(guard.depth(), 3);

        guard.exit();
        guard.enter().unwrap();
    }

    #[test]
    fn reset_clears_depth() {
        let mut guard = CallGuard::default();
        guard.enter().unwrap();
        guard.reset(1);
        assert_eq!(guard.depth(), 0);
        assert_eq!(guard.max_depth(), 1);
        guard.enter().unwrap();
        assert!(guard.enter().is_err());
    }

    #[test]
    fn zero_ceiling_refuses_everything() {
        let mut guard = CallGuard::new(0);
        assert!(guard.enter().is_err());
        assert_eq!(guard.depth(), 0);
    }
}
