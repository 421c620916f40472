//! Macros for defining wrapped identifier types.

/// Defines an identifier that the scheduler API wraps as `{"value": "..."}`.
///
/// This generates a newtype over `String` with:
/// - `new()` from anything string-like
/// - a `value()` accessor
/// - `Display` and `From<&str>` implementations
/// - `Serialize` and `Deserialize` through the `{"value": ...}` object
///
/// # Example
///
/// ```ignore
/// define_value_id!(TaskId);
///
/// let id = TaskId::new("7");
/// assert_eq!(serde_json::to_string(&id)?, r#"{"value":"7"}"#);
/// ```
macro_rules! define_value_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub fn value(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use serde::ser::SerializeStruct;

                let mut wrapped = serializer.serialize_struct(stringify!($name), 1)?;
                wrapped.serialize_field("value", &self.0)?;
                wrapped.end()
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                #[derive(serde::Deserialize)]
                struct Wrapped {
                    value: String,
                }

                let wrapped = Wrapped::deserialize(deserializer)?;
                Ok(Self(wrapped.value))
            }
        }
    };
}
