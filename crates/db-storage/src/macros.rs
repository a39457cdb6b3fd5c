/// Allows to create one or more typed ids
///
/// Defines the type and implements a variety of traits for it to be usable with diesel.
/// See <https://stackoverflow.com/a/59948116> for more information.
macro_rules! diesel_newtype {
    ($($(#[$meta:meta])* $name:ident($to_wrap:ty) => $sql_type:ty),+ $(,)?) => {
        pub use __newtype_impl::{$($name),+};

        mod __newtype_impl {
            use diesel::backend::Backend;
            use diesel::deserialize::{self, FromSql};
            use diesel::serialize::{self, Output, ToSql};
            use serde::{Deserialize, Serialize};
            use std::fmt;

            $(

            #[derive(
                Debug,
                Clone,
                PartialEq,
                Eq,
                PartialOrd,
                Ord,
                Hash,
                Serialize,
                Deserialize,
                AsExpression,
                FromSqlRow,
            )]
            $(#[$meta])*
            #[diesel(sql_type = $sql_type)]
            pub struct $name($to_wrap);

            impl $name {
                pub const fn from(inner: $to_wrap) -> Self {
                    Self(inner)
                }

                pub fn inner(&self) -> &$to_wrap {
                    &self.0
                }

                pub fn into_inner(self) -> $to_wrap {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }

            impl<DB> ToSql<$sql_type, DB> for $name
            where
                DB: Backend,
                $to_wrap: ToSql<$sql_type, DB>,
            {
                fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
                    <$to_wrap as ToSql<$sql_type, DB>>::to_sql(&self.0, out)
                }
            }

            impl<DB> FromSql<$sql_type, DB> for $name
            where
                DB: Backend,
                $to_wrap: FromSql<$sql_type, DB>,
            {
                fn from_sql(bytes: diesel::backend::RawValue<'_, DB>) -> deserialize::Result<Self> {
                    <$to_wrap as FromSql<$sql_type, DB>>::from_sql(bytes).map(Self)
                }
            }

            )+
        }
    };
}

/// Defines an enum that is stored as lowercase text in the database
///
/// Implements the diesel `ToSql`/`FromSql` traits for the Pg backend next to
/// the serde traits used by the REST API.
macro_rules! sql_enum {
    ($(#[$meta:meta])* $name:ident, { $($variant:ident => $repr:literal),+ $(,)? }) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            serde::Serialize,
            serde::Deserialize,
            AsExpression,
            FromSqlRow,
        )]
        #[diesel(sql_type = ::diesel::sql_types::Text)]
        #[serde(rename_all = "lowercase")]
        $(#[$meta])*
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $repr),+
                }
            }
        }

        impl ::diesel::serialize::ToSql<::diesel::sql_types::Text, ::diesel::pg::Pg> for $name {
            fn to_sql<'b>(
                &'b self,
                out: &mut ::diesel::serialize::Output<'b, '_, ::diesel::pg::Pg>,
            ) -> ::diesel::serialize::Result {
                use std::io::Write;

                out.write_all(self.as_str().as_bytes())?;
                Ok(::diesel::serialize::IsNull::No)
            }
        }

        impl ::diesel::deserialize::FromSql<::diesel::sql_types::Text, ::diesel::pg::Pg> for $name {
            fn from_sql(
                value: ::diesel::pg::PgValue<'_>,
            ) -> ::diesel::deserialize::Result<Self> {
                match std::str::from_utf8(value.as_bytes())? {
                    $($repr => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("invalid ", stringify!($name), " value: {:?}"),
                        other
                    )
                    .into()),
                }
            }
        }
    };
}
