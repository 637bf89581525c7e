use alloc::{boxed::Box, format, vec, vec::Vec};
use detwasm_types::{ValType, WasmValue};

use crate::{Error, Result};

/// Turn a tuple of Rust values into WebAssembly arguments.
pub trait IntoWasmValueTuple {
    fn into_wasm_value_tuple(self) -> Vec<WasmValue>;
}

/// Build a tuple of Rust values from WebAssembly results.
pub trait FromWasmValueTuple {
    fn from_wasm_value_tuple(values: Vec<WasmValue>) -> Result<Self>
    where
        Self: Sized;
}

/// The WebAssembly types of a tuple of Rust values.
pub trait ValTypesFromTuple {
    fn val_types() -> Box<[ValType]>;
}

/// A Rust type with a direct WebAssembly counterpart.
pub trait ToValType {
    const VAL_TYPE: ValType;
}

impl ToValType for i32 {
    const VAL_TYPE: ValType = ValType::I32;
}

impl ToValType for i64 {
    const VAL_TYPE: ValType = ValType::I64;
}

impl ToValType for f32 {
    const VAL_TYPE: ValType = ValType::F32;
}

impl ToValType for f64 {
    const VAL_TYPE: ValType = ValType::F64;
}

macro_rules! impl_into_wasm_value_tuple {
    ($($T:ident),*) => {
        impl<$($T),*> IntoWasmValueTuple for ($($T,)*)
        where
            $($T: Into<WasmValue>),*
        {
            #[allow(non_snake_case)]
            fn into_wasm_value_tuple(self) -> Vec<WasmValue> {
                let ($($T,)*) = self;
                vec![$($T.into(),)*]
            }
        }
    }
}

macro_rules! impl_from_wasm_value_tuple {
    ($($T:ident),*) => {
        impl<$($T),*> FromWasmValueTuple for ($($T,)*)
        where
            $($T: TryFrom<WasmValue, Error = ()>),*
        {
            fn from_wasm_value_tuple(values: Vec<WasmValue>) -> Result<Self> {
                let names: &[&str] = &[$(stringify!($T)),*];
                let expected = names.len();
                if values.len() != expected {
                    return Err(Error::InvalidArguments(format!("expected {} values, got {}", expected, values.len())));
                }

                #[allow(unused_variables, unused_mut)]
                let mut iter = values.into_iter();
                Ok((
                    $(
                        match iter.next().map($T::try_from) {
                            Some(Ok(value)) => value,
                            _ => return Err(Error::InvalidArguments(format!("unexpected value for {}", stringify!($T)))),
                        },
                    )*
                ))
            }
        }
    }
}

macro_rules! impl_val_types_from_tuple {
    ($($T:ident),*) => {
        impl<$($T),*> ValTypesFromTuple for ($($T,)*)
        where
            $($T: ToValType),*
        {
            fn val_types() -> Box<[ValType]> {
                vec![$($T::VAL_TYPE,)*].into_boxed_slice()
            }
        }
    }
}

macro_rules! impl_tuples {
    ($($T:ident),*) => {
        impl_into_wasm_value_tuple!($($T),*);
        impl_from_wasm_value_tuple!($($T),*);
        impl_val_types_from_tuple!($($T),*);
    };
}

impl_tuples!();
impl_tuples!(T1);
impl_tuples!(T1, T2);
impl_tuples!(T1, T2, T3);
impl_tuples!(T1, T2, T3, T4);
impl_tuples!(T1, T2, T3, T4, T5);
impl_tuples!(T1, T2, T3, T4, T5, T6);
impl_tuples!(T1, T2, T3, T4, T5, T6, T7);
impl_tuples!(T1, T2, T3, T4, T5, T6, T7, T8);

// single values without the tuple
macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl IntoWasmValueTuple for $t {
                fn into_wasm_value_tuple(self) -> Vec<WasmValue> {
                    vec![self.into()]
                }
            }

            impl FromWasmValueTuple for $t {
                fn from_wasm_value_tuple(values: Vec<WasmValue>) -> Result<Self> {
                    <($t,)>::from_wasm_value_tuple(values).map(|(value,)| value)
                }
            }

            impl ValTypesFromTuple for $t {
                fn val_types() -> Box<[ValType]> {
                    Box::new([<$t>::VAL_TYPE])
                }
            }
        )*
    };
}

impl_scalar!(i32, i64, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_round_trip_through_values() {
        let values = (1i32, 2i64, 0.5f32).into_wasm_value_tuple();
        assert_eq!(values, vec![WasmValue::I32(1), WasmValue::I64(2), WasmValue::F32(0.5)]);
        assert_eq!(<(i32, i64, f32)>::val_types().as_ref(), &[ValType::I32, ValType::I64, ValType::F32]);
        assert!(<(i32, i64, f32)>::from_wasm_value_tuple(values).is_ok());
    }

    #[test]
    fn mismatches_are_rejected() {
        assert!(<(i32,)>::from_wasm_value_tuple(vec![WasmValue::I64(1)]).is_err());
        assert!(<(i32, i32)>::from_wasm_value_tuple(vec![WasmValue::I32(1)]).is_err());
        assert!(<()>::from_wasm_value_tuple(vec![]).is_ok());
        assert_eq!(i64::from_wasm_value_tuple(vec![WasmValue::I64(7)]).unwrap(), 7);
    }
}
