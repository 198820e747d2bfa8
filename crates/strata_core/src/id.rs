//! Typed identifiers and content hashing
//!
//! Scene ids, slot ids and scene-local resource handles are all plain
//! integers on the wire. [`typed_id!`](crate::typed_id) wraps each one in its
//! own newtype so they cannot be mixed up.

/// Define a `Copy` newtype identifier over an unsigned integer.
///
/// Extra attributes (for example serde derives) are forwarded to the struct.
///
/// ```
/// strata_core::typed_id! {
///     /// Identifies a widget
///     pub struct WidgetId(u32);
/// }
///
/// let id = WidgetId::new(3);
/// assert_eq!(id.raw(), 3);
/// assert_eq!(id.to_string(), "3");
/// ```
#[macro_export]
macro_rules! typed_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name(pub $inner);

        impl $name {
            /// Wrap a raw value
            #[inline]
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Get the raw value
            #[inline]
            pub const fn raw(&self) -> $inner {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::convert::From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }
    };
}

/// FNV-1a over a byte slice
pub const fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x100000001b3);
        i += 1;
    }
    hash
}

/// Continue an FNV-1a hash with more bytes
pub fn fnv1a_64_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
