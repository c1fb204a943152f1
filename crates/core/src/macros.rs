// SPDX-License-Identifier: MIT

//! Declarative macros for reducing boilerplate.

/// Generate a `Display` impl that maps enum variants to string literals.
///
/// Unit variants match directly; data-carrying variants use `(..)` to ignore fields.
/// Generate a test builder: a struct with one field per entry, a `Default`
/// impl seeded with the given defaults, a setter per field, and `.build()`
/// producing the target type. Gated by the caller behind
/// `#[cfg(any(test, feature = "test-support"))]`.
#[macro_export]
macro_rules! builder_impl {
    ($builder:ident, $target:ident, { $( $field:ident : $ty:ty = $default:expr ),+ $(,)? }) => {
        pub struct $builder {
            $( $field: $ty, )+
        }

        impl Default for $builder {
            fn default() -> Self {
                Self {
                    $( $field: $default, )+
                }
            }
        }

        impl $builder {
            $(
                pub fn $field(mut self, v: $ty) -> Self {
                    self.$field = v;
                    self
                }
            )+

            pub fn build(self) -> $target {
                $target {
                    $( $field: self.$field, )+
                }
            }
        }

        impl $target {
            pub fn builder() -> $builder {
                $builder::default()
            }
        }
    };
}

#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident $(( $($ignore:tt)* ))? => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant $(( $($ignore)* ))? => $str, )+
                })
            }
        }
    };
}
