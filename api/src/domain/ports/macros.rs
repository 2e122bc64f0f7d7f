//! Helper macro generating port error enums with snake_case constructors.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            #[doc = concat!("Build [`Self::", stringify!($variant), "`].")]
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            #[doc = concat!("Build [`Self::", stringify!($variant), "`].")]
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    define_port_error! {
        pub enum LedgerPortError {
            Offline { message: String } => "ledger offline: {message}",
            Overdrawn { missing_cents: i64 } => "overdrawn by {missing_cents}",
            Rejected { message: String, code: u16 } => "rejected ({code}): {message}",
            Closed => "ledger closed",
        }
    }

    #[test]
    fn string_fields_accept_str() {
        assert_eq!(
            LedgerPortError::offline("timeout").to_string(),
            "ledger offline: timeout"
        );
    }

    #[test]
    fn numeric_fields_keep_their_type() {
        assert_eq!(
            LedgerPortError::overdrawn(250_i64).to_string(),
            "overdrawn by 250"
        );
    }

    #[test]
    fn unit_variants_get_constructors() {
        assert_eq!(LedgerPortError::closed(), LedgerPortError::Closed);
        assert_eq!(
            LedgerPortError::rejected("no funds", 402_u16).to_string(),
            "rejected (402): no funds"
        );
    }
}
