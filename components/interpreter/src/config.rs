//! Interpreter configuration.

use thiserror::Error;

/// Default maximum depth of the real call chain.
pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

/// Default initial operand stack reservation per frame.
pub const DEFAULT_STACK_CAPACITY: usize = 16;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The recursion limit must allow at least one frame
    #[error("recursion limit must be at least 1")]
    ZeroRecursionLimit,
}

/// Settings for an [`Interpreter`](crate::Interpreter).
///
/// # Examples
///
/// ```
/// use interpreter::InterpreterConfig;
///
/// let config = InterpreterConfig::new()
///     .with_recursion_limit(200)
///     .with_finalize_eagerly(false);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.recursion_limit, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Frames allowed on the call chain before `RecursionError` is raised
    pub recursion_limit: usize,
    /// Operand stack slots reserved when a frame is created
    pub stack_capacity: usize,
    /// Close dropped generators after every instruction rather than only at
    /// the end of the top-level operation
    pub finalize_eagerly: bool,
}

impl InterpreterConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recursion limit.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Set the initial operand stack reservation.
    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    /// Choose when dropped generators are finalized.
    pub fn with_finalize_eagerly(mut self, eager: bool) -> Self {
        self.finalize_eagerly = eager;
        self
    }

    /// Check the configuration for values the interpreter cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recursion_limit == 0 {
            return Err(ConfigError::ZeroRecursionLimit);
        }
        Ok(())
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            finalize_eagerly: true,
        }
    }
}
