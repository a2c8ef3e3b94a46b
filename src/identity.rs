//! Stable identities for cached callables.
//!
//! A [`CallableIdentity`] is the namespace component of every cache key. It is
//! computed once when a callable is wrapped and never re-derived per call, so
//! every lookup, store and invalidation for that callable shares one name.

use crate::{error::Error, Result};
use std::fmt;
use std::sync::Arc;

/// What sort of callable an identity describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
    /// A free function.
    Function,
    /// A method bound to an instance. The instance is keyed through
    /// [`InstanceKey`], never through its position in the argument list.
    Method,
    /// An associated function addressed through its owning type.
    ClassMethod,
}

impl CallableKind {
    /// The tag written into cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            CallableKind::Function => "function",
            CallableKind::Method => "method",
            CallableKind::ClassMethod => "classmethod",
        }
    }
}

impl fmt::Display for CallableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Fully qualified, dotted name of a callable plus its [`CallableKind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallableIdentity {
    qualified_name: Arc<str>,
    kind: CallableKind,
}

impl CallableIdentity {
    /// Identity of a free function declared in `module_path`.
    ///
    /// ```
    /// use callcache::CallableIdentity;
    ///
    /// let id = CallableIdentity::function(module_path!(), "load_user").unwrap();
    /// assert!(id.qualified_name().ends_with(".load_user"));
    /// ```
    pub fn function(module_path: &str, name: &str) -> Result<Self> {
        Self::build(module_path, name, CallableKind::Function)
    }

    /// Identity of a method declared on the type at `owner_path`.
    pub fn method(owner_path: &str, name: &str) -> Result<Self> {
        Self::build(owner_path, name, CallableKind::Method)
    }

    /// Identity of an associated (receiver-less) function on `owner_path`.
    pub fn class_method(owner_path: &str, name: &str) -> Result<Self> {
        Self::build(owner_path, name, CallableKind::ClassMethod)
    }

    /// Identity of a method on `T`, using `T`'s type name as the owner.
    ///
    /// Like [`CallableIdentity::of`], the owner path depends on the compiler's
    /// [`std::any::type_name`] output.
    pub fn method_of<T: ?Sized>(name: &str) -> Result<Self> {
        Self::method(std::any::type_name::<T>(), name)
    }

    /// Identity of an associated function on `T`.
    pub fn class_method_of<T: ?Sized>(name: &str) -> Result<Self> {
        Self::class_method(std::any::type_name::<T>(), name)
    }

    /// Derives the identity of a named `fn` item from its type.
    ///
    /// Only named items have a stable path; closures, function pointers and
    /// trait objects are rejected with [`Error::IdentityResolution`].
    ///
    /// The path is read from [`std::any::type_name`], whose output is not
    /// guaranteed to stay the same across compiler versions. A toolchain
    /// upgrade can therefore rename every key derived this way, which turns
    /// the existing entries into misses. For keys that must survive
    /// upgrades, build the identity from `module_path!()` with
    /// [`CallableIdentity::function`] (which `#[cache_identity]` does for
    /// free functions) or spell out the owner path in
    /// [`CallableIdentity::method`], and pass it to `wrap_as`.
    pub fn of<F>(_callable: &F) -> Result<Self> {
        let type_name = std::any::type_name::<F>();
        let normalized = normalize_path(type_name);
        check_resolvable(type_name, &normalized)?;
        Ok(Self {
            qualified_name: normalized.into(),
            kind: CallableKind::Function,
        })
    }

    /// The dotted, fully qualified name.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// The callable's kind.
    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    fn build(owner: &str, name: &str, kind: CallableKind) -> Result<Self> {
        if name.is_empty() || name.contains("::") || name.contains('.') {
            return Err(Error::IdentityResolution(format!(
                "`{}` is not a simple callable name",
                name
            )));
        }
        let owner = normalize_path(owner);
        if owner.is_empty() {
            return Err(Error::IdentityResolution(format!(
                "callable `{}` has no declaring scope",
                name
            )));
        }
        let qualified = format!("{}.{}", owner, name);
        check_resolvable(&qualified, &qualified)?;
        Ok(Self {
            qualified_name: qualified.into(),
            kind,
        })
    }
}

impl fmt::Display for CallableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.qualified_name, self.kind)
    }
}

fn normalize_path(path: &str) -> String {
    path.trim().replace("::", ".")
}

fn check_resolvable(original: &str, normalized: &str) -> Result<()> {
    let anonymous = ["{{closure}}", "{closure", "{async", "{{constant}}"];
    if anonymous.iter().any(|marker| normalized.contains(marker)) {
        return Err(Error::IdentityResolution(format!(
            "`{}` is anonymous; supply an explicit identity",
            original
        )));
    }

    let unnamed = ["fn(", "fn<", "&", "*", "(", "[", "dyn ", "impl ", "unsafe ", "extern "];
    if normalized.is_empty() || unnamed.iter().any(|prefix| normalized.starts_with(prefix)) {
        return Err(Error::IdentityResolution(format!(
            "`{}` is not a named callable",
            original
        )));
    }

    if normalized.contains('|') || normalized.split('.').any(str::is_empty) {
        return Err(Error::IdentityResolution(format!(
            "`{}` is not a well-formed qualified name",
            original
        )));
    }

    Ok(())
}

/// Stable identity of an instance that methods are bound to.
///
/// The key for a method call includes `instance_key()` of its receiver, so
/// two instances that return the same string share cache entries. Return
/// something that identifies the state the method's result depends on, such
/// as a primary key.
pub trait InstanceKey {
    /// Returns the instance's stable cache identity.
    fn instance_key(&self) -> String;
}

impl<T: InstanceKey + ?Sized> InstanceKey for &T {
    fn instance_key(&self) -> String {
        (**self).instance_key()
    }
}

impl<T: InstanceKey + ?Sized> InstanceKey for Arc<T> {
    fn instance_key(&self) -> String {
        (**self).instance_key()
    }
}

impl<T: InstanceKey + ?Sized> InstanceKey for Box<T> {
    fn instance_key(&self) -> String {
        (**self).instance_key()
    }
}
