//! Built-in [`Mapped`] implementations: scalars, strings, wrappers and
//! collections.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use crate::shape::{Mapped, Shape, TypeHandle, Value};

/// A primitive stored as its base-10 textual form.
///
/// Reading an absent key yields `Default::default()`.
pub trait Scalar: Mapped + Default + Sized {
    fn to_text(&self) -> String;

    fn parse_text(text: &str) -> Option<Self>;
}

macro_rules! numeric_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Mapped for $t {
                fn shape() -> Shape {
                    Shape::Primitive
                }

                fn value(&self) -> Value<'_> {
                    Value::Primitive(self.to_text())
                }
            }

            impl Scalar for $t {
                fn to_text(&self) -> String {
                    self.to_string()
                }

                fn parse_text(text: &str) -> Option<Self> {
                    text.parse().ok()
                }
            }
        )*
    };
}

numeric_scalar!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl Mapped for bool {
    fn shape() -> Shape {
        Shape::Primitive
    }

    fn value(&self) -> Value<'_> {
        Value::Primitive(self.to_text())
    }
}

impl Scalar for bool {
    fn to_text(&self) -> String {
        let text = if *self { "true" } else { "false" };
        text.to_string()
    }

    // Accepts any casing so values written as `True`/`False` still load.
    fn parse_text(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("true") {
            Some(true)
        } else if text.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }
}

impl Mapped for char {
    fn shape() -> Shape {
        Shape::Primitive
    }

    fn value(&self) -> Value<'_> {
        Value::Primitive(self.to_text())
    }
}

impl Scalar for char {
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn parse_text(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl Mapped for String {
    fn shape() -> Shape {
        Shape::String
    }

    fn value(&self) -> Value<'_> {
        Value::Text(self.as_str())
    }
}

// ---- Transparent wrappers ----

impl<T: Mapped> Mapped for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn storage_type() -> TypeHandle {
        T::storage_type()
    }

    fn value(&self) -> Value<'_> {
        match self {
            Some(inner) => inner.value(),
            None => Value::Null,
        }
    }
}

impl<T: Mapped> Mapped for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn storage_type() -> TypeHandle {
        T::storage_type()
    }

    fn value(&self) -> Value<'_> {
        (**self).value()
    }
}

impl<T: Mapped> Mapped for Arc<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn storage_type() -> TypeHandle {
        T::storage_type()
    }

    fn value(&self) -> Value<'_> {
        (**self).value()
    }
}

/// Set-once slot; the usual way to close a reference cycle between `Arc`s.
impl<T: Mapped> Mapped for OnceLock<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn storage_type() -> TypeHandle {
        T::storage_type()
    }

    fn value(&self) -> Value<'_> {
        match self.get() {
            Some(inner) => inner.value(),
            None => Value::Null,
        }
    }
}

// ---- Collections ----

impl<T: Mapped> Mapped for Vec<T> {
    fn shape() -> Shape {
        Shape::List {
            element: T::storage_type(),
        }
    }

    fn value(&self) -> Value<'_> {
        Value::List(self.iter().map(Mapped::value).collect())
    }
}

impl<T: Mapped> Mapped for VecDeque<T> {
    fn shape() -> Shape {
        Shape::List {
            element: T::storage_type(),
        }
    }

    fn value(&self) -> Value<'_> {
        Value::List(self.iter().map(Mapped::value).collect())
    }
}

impl<T: Mapped, const N: usize> Mapped for [T; N] {
    fn shape() -> Shape {
        Shape::Array {
            element: T::storage_type(),
        }
    }

    fn value(&self) -> Value<'_> {
        Value::List(self.iter().map(Mapped::value).collect())
    }
}
