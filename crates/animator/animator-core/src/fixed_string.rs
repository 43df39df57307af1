//! Fixed-capacity UTF-8 strings that can live inside Pod blob records.

use bytemuck::{Pod, Zeroable};
use std::fmt;

macro_rules! fixed_string {
    ($(#[$meta:meta])* $name:ident, $cap:literal) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
        pub struct $name {
            len: u16,
            bytes: [u8; $cap],
        }

        impl $name {
            /// Maximum number of UTF-8 bytes the string can hold.
            pub const CAPACITY: usize = $cap;

            /// Copy `s` into a fixed string, or `None` if it does not fit.
            pub fn try_from_str(s: &str) -> Option<Self> {
                if s.len() > Self::CAPACITY {
                    return None;
                }
                let mut out = Self::zeroed();
                out.bytes[..s.len()].copy_from_slice(s.as_bytes());
                out.len = s.len() as u16;
                Some(out)
            }

            pub fn as_str(&self) -> &str {
                let len = (self.len as usize).min(Self::CAPACITY);
                std::str::from_utf8(&self.bytes[..len]).unwrap_or("")
            }

            pub fn len(&self) -> usize {
                self.len as usize
            }

            pub fn is_empty(&self) -> bool {
                self.len == 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zeroed()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self.as_str(), f)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

fixed_string!(
    /// 64-byte record: 2-byte length plus 62 bytes of UTF-8. Used for parameter names.
    FixedString64,
    62
);

fixed_string!(
    /// 128-byte record: 2-byte length plus 126 bytes of UTF-8. Used for layer, state and controller names.
    FixedString128,
    126
);
