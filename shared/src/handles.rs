//! Opaque identifiers for OS objects that may live in another address space.
//!
//! A remote module base or a window handle is only meaningful to the OS, never as a pointer in
//! this process. The wrappers expose equality and a null check; converting back to the raw value
//! is reserved for the FFI layer.

use std::fmt;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(usize);

        impl $name {
            pub const NULL: Self = Self(0);

            /// Wraps a raw OS value. Only the FFI layer should call this.
            pub const fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            /// Raw OS value for handing back to the platform.
            pub const fn into_raw(self) -> usize {
                self.0
            }

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

opaque_handle!(
    /// Process-control handle value owned by the controller.
    ProcessHandle
);
opaque_handle!(
    /// Top-level or child window identity.
    WindowHandle
);
opaque_handle!(
    /// Base of a module loaded inside a (possibly remote) process.
    ModuleHandle
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_equality() {
        assert!(WindowHandle::NULL.is_null());
        assert!(!WindowHandle::from_raw(0x10).is_null());
        assert_eq!(ModuleHandle::from_raw(7), ModuleHandle::from_raw(7));
        assert_ne!(ProcessHandle::from_raw(1), ProcessHandle::from_raw(2));
    }

    #[test]
    fn debug_is_hex() {
        assert_eq!(format!("{:?}", WindowHandle::from_raw(255)), "WindowHandle(0xff)");
    }
}
