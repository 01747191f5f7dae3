//! Utility Module
//!
//! - [`interner`]: String interning for property debug names
//!
//! # String Interning
//!
//! Interned strings (Symbols) can be compared in O(1) time and are cheap to
//! copy, which keeps property keys `Copy`.
//!
//! ```rust,ignore
//! use myth_shader_cache::utils::interner;
//!
//! let sym1 = interner::intern("hlms_normal");
//! let sym2 = interner::intern("hlms_normal");
//! assert_eq!(sym1, sym2);
//! ```

pub mod interner;

pub use interner::Symbol;
