/// Implement [`Mapped`](crate::Mapped) and [`Record`](crate::Record) for a
/// plain struct.
///
/// Each field is listed with its Rust type and its stored property name.
/// The field marked `#[key]` becomes the entity key; a struct without one is
/// an embedded object.
///
/// ```rust,ignore
/// struct Address { street: String, city: Option<String> }
///
/// kvmap_schema::mapped_record! {
///     Address as "Address" {
///         street: String => "Street",
///         city: Option<String> => "City",
///     }
/// }
/// ```
#[macro_export]
macro_rules! mapped_record {
    (@field $shape:ident, [key], $fty:ty, $prop:literal) => {
        $shape.key::<$fty>($prop)
    };
    (@field $shape:ident, [], $fty:ty, $prop:literal) => {
        $shape.field::<$fty>($prop)
    };
    (
        $ty:ident as $display:literal {
            $( $(#[$marker:ident])? $field:ident : $fty:ty => $prop:literal ),* $(,)?
        }
    ) => {
        impl $crate::Mapped for $ty {
            fn shape() -> $crate::Shape {
                let shape = $crate::RecordShape::new($display);
                $( let shape = $crate::mapped_record!(@field shape, [$($marker)?], $fty, $prop); )*
                shape.into()
            }

            fn value(&self) -> $crate::Value<'_> {
                $crate::Value::Record(self)
            }
        }

        impl $crate::Record for $ty {
            fn field(&self, name: &str) -> $crate::Value<'_> {
                match name {
                    $( $prop => $crate::Mapped::value(&self.$field), )*
                    _ => $crate::Value::Null,
                }
            }
        }
    };
}
