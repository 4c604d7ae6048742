use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// A runtime value. Only numbers exist at this stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
}

impl Value {
    pub fn as_number(self) -> f64 {
        match self {
            Self::Number(n) => n,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl Neg for Value {
    type Output = Value;

    fn neg(self) -> Value {
        Value::Number(-self.as_number())
    }
}

macro_rules! numeric_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for Value {
            type Output = Value;

            fn $method(self, rhs: Value) -> Value {
                Value::Number(self.as_number() $op rhs.as_number())
            }
        }
    };
}

numeric_binary_op!(Add, add, +);
numeric_binary_op!(Sub, sub, -);
numeric_binary_op!(Mul, mul, *);
numeric_binary_op!(Div, div, /);
