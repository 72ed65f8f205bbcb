//! Pass configuration.

/// Switches controlling iterator lowering.
///
/// Mirrors the driver flags `--no-inline-iterators`, `--no-bounds-checks`,
/// `--no-copy-propagation` and `--no-dead-code-elimination`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LowerConfig {
    /// Allow direct inlining and zip fusion. When off every for-loop goes
    /// through the generic protocol (or CPS for recursive iterators).
    pub inline_iterators: bool,
    /// Emit zippered length-mismatch checks.
    pub bounds_checks: bool,
    pub copy_propagation: bool,
    pub dead_code_elimination: bool,
}

impl Default for LowerConfig {
    fn default() -> Self {
        LowerConfig {
            inline_iterators: true,
            bounds_checks: true,
            copy_propagation: true,
            dead_code_elimination: true,
        }
    }
}

impl LowerConfig {
    #[must_use]
    pub fn with_inline_iterators(mut self, enabled: bool) -> Self {
        self.inline_iterators = enabled;
        self
    }

    #[must_use]
    pub fn with_bounds_checks(mut self, enabled: bool) -> Self {
        self.bounds_checks = enabled;
        self
    }

    #[must_use]
    pub fn with_copy_propagation(mut self, enabled: bool) -> Self {
        self.copy_propagation = enabled;
        self
    }

    #[must_use]
    pub fn with_dead_code_elimination(mut self, enabled: bool) -> Self {
        self.dead_code_elimination = enabled;
        self
    }
}
