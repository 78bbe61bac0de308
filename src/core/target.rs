//! Execution-context tokens and the explicit affinity context.

use std::borrow::Cow;
use std::fmt;

/// Opaque token naming a logical execution context ("render", "audio", ...).
///
/// Targets compare by id. [`Target::ANY`] means the call may run on whichever
/// context picks it up first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(Cow<'static, str>);

impl Target {
    /// Any execution context will do.
    pub const ANY: Self = Self(Cow::Borrowed("Any"));

    /// A target with a static id, usable in `const` items.
    #[must_use]
    pub const fn named(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// A target with a runtime-built id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// The target id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Whether this is [`Target::ANY`].
    #[must_use]
    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The target the current code is running on, passed explicitly across the
/// dispatch and join boundaries.
///
/// Drain owners hand their bound context to every runnable they execute;
/// pool workers run with an unbound context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    target: Option<Target>,
}

impl CallContext {
    /// A context with no target affinity.
    #[must_use]
    pub const fn unbound() -> Self {
        Self { target: None }
    }

    /// A context bound to `target`.
    #[must_use]
    pub const fn bound(target: Target) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// The bound target, if any.
    #[must_use]
    pub const fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Whether this context is bound to exactly `target`.
    #[must_use]
    pub fn is_bound_to(&self, target: &Target) -> bool {
        self.target.as_ref() == Some(target)
    }

    /// Whether work affine to `target` may run inline here.
    pub(crate) fn may_run(&self, target: &Target) -> bool {
        target.is_any() || self.is_bound_to(target)
    }
}
