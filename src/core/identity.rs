//! Call identity: stable function tokens combined with argument hashes.
//!
//! A [`CallIdentity`] is the only key the caches ever see. It is derived from
//! the [`FunctionId`] assigned when a [`Function`] is created and from the
//! hash of each argument, folded in order.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::core::target::CallContext;

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(1);

const FOLD_FACTOR: u64 = 31;

/// Stable identity of a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    fn next() -> Self {
        Self(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Deterministic structural hash used for arguments without a custom hash.
pub fn value_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Capability of a value to take part in a call identity.
///
/// Plain values hash structurally. Domain types implement this directly to
/// supply a domain-specific hash, so that equal-but-distinct objects collide
/// on purpose.
///
/// ```rust,ignore
/// struct Mesh { asset: AssetId, scratch: Vec<u8> }
///
/// impl CallArg for Mesh {
///     fn call_hash(&self) -> u64 {
///         value_hash(&self.asset)
///     }
/// }
/// ```
pub trait CallArg {
    /// Hash contributed to the call identity.
    fn call_hash(&self) -> u64;
}

/// Implement [`CallArg`] for types whose `Hash` impl is the identity you want.
#[macro_export]
macro_rules! impl_call_arg_via_hash {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::core::identity::CallArg for $ty {
                fn call_hash(&self) -> u64 {
                    $crate::core::identity::value_hash(self)
                }
            }
        )+
    };
}

impl_call_arg_via_hash!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, str, String,
);

impl CallArg for f32 {
    fn call_hash(&self) -> u64 {
        value_hash(&self.to_bits())
    }
}

impl CallArg for f64 {
    fn call_hash(&self) -> u64 {
        value_hash(&self.to_bits())
    }
}

impl<T: CallArg + ?Sized> CallArg for &T {
    fn call_hash(&self) -> u64 {
        (**self).call_hash()
    }
}

impl<T: CallArg + ?Sized> CallArg for Box<T> {
    fn call_hash(&self) -> u64 {
        (**self).call_hash()
    }
}

impl<T: CallArg + ?Sized> CallArg for Arc<T> {
    fn call_hash(&self) -> u64 {
        (**self).call_hash()
    }
}

impl<T: CallArg> CallArg for Option<T> {
    fn call_hash(&self) -> u64 {
        self.as_ref()
            .map_or(0, |value| fold(FOLD_FACTOR, value.call_hash()))
    }
}

impl<T: CallArg> CallArg for [T] {
    fn call_hash(&self) -> u64 {
        self.iter()
            .fold(value_hash(&self.len()), |acc, item| fold(acc, item.call_hash()))
    }
}

impl<T: CallArg> CallArg for Vec<T> {
    fn call_hash(&self) -> u64 {
        self.as_slice().call_hash()
    }
}

const fn fold(acc: u64, hash: u64) -> u64 {
    acc.wrapping_mul(FOLD_FACTOR).wrapping_add(hash)
}

/// Ordered argument list of a call: `()` or a tuple of up to four [`CallArg`]s.
pub trait CallArgs: Send + 'static {
    /// Number of arguments.
    const ARITY: usize;

    /// Fold the argument hashes, in order, onto `seed`.
    fn fold_hash(&self, seed: u64) -> u64;
}

impl CallArgs for () {
    const ARITY: usize = 0;

    fn fold_hash(&self, seed: u64) -> u64 {
        seed
    }
}

macro_rules! impl_call_args {
    ($arity:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name),+> CallArgs for ($($name,)+)
        where
            $($name: CallArg + Send + 'static),+
        {
            const ARITY: usize = $arity;

            fn fold_hash(&self, seed: u64) -> u64 {
                let mut acc = seed;
                $( acc = fold(acc, self.$idx.call_hash()); )+
                acc
            }
        }
    };
}

impl_call_args!(1; A: 0);
impl_call_args!(2; A: 0, B: 1);
impl_call_args!(3; A: 0, B: 1, C: 2);
impl_call_args!(4; A: 0, B: 1, C: 2, D: 3);

/// Memoization key of a call: function identity plus folded argument hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallIdentity {
    function: FunctionId,
    hash: u64,
}

impl CallIdentity {
    /// Identity of `function` applied to `args`.
    pub fn of<A: CallArgs>(function: FunctionId, args: &A) -> Self {
        Self {
            function,
            hash: args.fold_hash(value_hash(&function.0)),
        }
    }

    /// Identity used for results that were never dispatched.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            function: FunctionId(0),
            hash: 0,
        }
    }

    /// The function part of the identity.
    #[must_use]
    pub const fn function(&self) -> FunctionId {
        self.function
    }

    /// The folded hash.
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}:{:016x}", self.function.0, self.hash)
    }
}

type Body<A, R> = dyn Fn(&CallContext, A) -> R + Send + Sync;

/// A call body bound to its arguments, ready to run once.
pub(crate) type BoundCall<R> = Box<dyn FnOnce(&CallContext) -> R + Send>;

/// A dispatchable function with a stable identity.
///
/// The identity is assigned once at construction; clones share it. Two
/// separately constructed functions never share an identity, even with the
/// same name and body.
pub struct Function<A, R> {
    id: FunctionId,
    name: &'static str,
    body: Arc<Body<A, R>>,
}

impl<A, R> Clone for Function<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            body: Arc::clone(&self.body),
        }
    }
}

impl<A, R> fmt::Debug for Function<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<A, R> Function<A, R>
where
    A: CallArgs,
    R: 'static,
{
    /// Register a function whose body ignores the calling context.
    pub fn new<F>(name: &'static str, body: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self::with_context(name, move |_ctx, args| body(args))
    }

    /// Register a function whose body receives the context it runs on, so it
    /// can dispatch and join nested calls with the right affinity.
    pub fn with_context<F>(name: &'static str, body: F) -> Self
    where
        F: Fn(&CallContext, A) -> R + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            name,
            body: Arc::new(body),
        }
    }

    /// Stable identity.
    #[must_use]
    pub const fn id(&self) -> FunctionId {
        self.id
    }

    /// Human-readable name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Call identity of this function applied to `args`.
    pub fn identity(&self, args: &A) -> CallIdentity {
        CallIdentity::of(self.id, args)
    }

    /// Run the body synchronously on the caller.
    pub fn call(&self, ctx: &CallContext, args: A) -> R {
        (self.body)(ctx, args)
    }

    pub(crate) fn bind(&self, args: A) -> BoundCall<R> {
        let body = Arc::clone(&self.body);
        Box::new(move |ctx| body(ctx, args))
    }
}
