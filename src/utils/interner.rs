//! Property Name Interner
//!
//! Interns the human-readable names attached to property keys so that a
//! [`PropertyKey`](crate::material::PropertyKey) stays a small `Copy` value and
//! a decoded cache does not allocate one `String` per property.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier of an interned name.
pub type Symbol = Spur;

/// Interns a string, returning its [`Symbol`].
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("hlms_normal");
        let s2 = intern("hlms_normal");
        let s3 = intern("hlms_skeleton");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "hlms_normal");
        assert_eq!(resolve(s3), "hlms_skeleton");
    }
}
