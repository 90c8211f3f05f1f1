use std::cmp::Ordering;

use esprof_syntax::BinaryOperator;

use super::Interpreter;
use crate::{
    error::{Result, RuntimeError},
    value::{string_to_number, Value},
};

/// Wrap a number into the signed 32-bit range the bitwise operators work on.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

impl Interpreter {
    pub fn binary(&mut self, operator: BinaryOperator, left: Value, right: Value) -> Result<Value> {
        use BinaryOperator::*;

        let value = match operator {
            Add => {
                let left = self.to_primitive(&left)?;
                let right = self.to_primitive(&right)?;
                if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                    Value::String(format!("{left}{right}"))
                } else {
                    Value::Number(left.to_number_primitive() + right.to_number_primitive())
                }
            }
            Sub | Mul | Div | Rem => {
                let (l, r) = (self.coerce_number(&left)?, self.coerce_number(&right)?);
                Value::Number(match operator {
                    Sub => l - r,
                    Mul => l * r,
                    Div => l / r,
                    _ => l % r,
                })
            }
            Shl | Shr | UShr | BitAnd | BitOr | BitXor => {
                let (l, r) = (self.coerce_number(&left)?, self.coerce_number(&right)?);
                let shift = to_uint32(r) & 31;
                Value::Number(match operator {
                    Shl => f64::from(to_int32(l).wrapping_shl(shift)),
                    Shr => f64::from(to_int32(l) >> shift),
                    UShr => f64::from(to_uint32(l) >> shift),
                    BitAnd => f64::from(to_int32(l) & to_int32(r)),
                    BitOr => f64::from(to_int32(l) | to_int32(r)),
                    _ => f64::from(to_int32(l) ^ to_int32(r)),
                })
            }
            Eq => Value::Boolean(self.loose_equals(&left, &right)?),
            NotEq => Value::Boolean(!self.loose_equals(&left, &right)?),
            StrictEq => Value::Boolean(left.strict_equals(&right)),
            StrictNotEq => Value::Boolean(!left.strict_equals(&right)),
            Lt | LtEq | Gt | GtEq => {
                let ordering = self.compare(&left, &right)?;
                Value::Boolean(match (operator, ordering) {
                    (_, None) => false,
                    (Lt, Some(o)) => o == Ordering::Less,
                    (LtEq, Some(o)) => o != Ordering::Greater,
                    (Gt, Some(o)) => o == Ordering::Greater,
                    (_, Some(o)) => o != Ordering::Less,
                })
            }
            In => {
                let Value::Object(object) = &right else {
                    return Err(RuntimeError::Type(format!(
                        "Cannot use 'in' operator to search for a key in {right}"
                    )));
                };
                let key = self.coerce_string(&left)?;
                Value::Boolean(object.has(&key))
            }
            Instanceof => Value::Boolean(self.instance_of(&left, &right)?),
        };
        Ok(value)
    }

    /// `None` when either side is `NaN`.
    fn compare(&mut self, left: &Value, right: &Value) -> Result<Option<Ordering>> {
        let left = self.to_primitive(left)?;
        let right = self.to_primitive(right)?;
        if let (Value::String(l), Value::String(r)) = (&left, &right) {
            return Ok(Some(l.cmp(r)));
        }
        Ok(left.to_number_primitive().partial_cmp(&right.to_number_primitive()))
    }

    pub fn loose_equals(&mut self, left: &Value, right: &Value) -> Result<bool> {
        use Value::*;

        Ok(match (left, right) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(n), String(s)) | (String(s), Number(n)) => *n == string_to_number(s),
            (Boolean(b), _) => return self.loose_equals(&Number(f64::from(u8::from(*b))), right),
            (_, Boolean(b)) => return self.loose_equals(left, &Number(f64::from(u8::from(*b)))),
            (Object(_), Number(_) | String(_)) => {
                let left = self.to_primitive(left)?;
                return self.loose_equals(&left, right);
            }
            (Number(_) | String(_), Object(_)) => {
                let right = self.to_primitive(right)?;
                return self.loose_equals(left, &right);
            }
            _ => left.strict_equals(right),
        })
    }

    fn instance_of(&mut self, value: &Value, constructor: &Value) -> Result<bool> {
        let Some(constructor) = constructor.as_object().filter(|c| c.is_callable()) else {
            return Err(RuntimeError::Type(
                "Right-hand side of 'instanceof' is not callable".to_string(),
            ));
        };
        let Value::Object(object) = value else {
            return Ok(false);
        };
        match constructor.get("prototype") {
            Some(Value::Object(prototype)) => Ok(object.inherits_from(&prototype)),
            _ => Err(RuntimeError::Type("Function has non-object prototype".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(operator: BinaryOperator, left: impl Into<Value>, right: impl Into<Value>) -> Value {
        Interpreter::new().binary(operator, left.into(), right.into()).unwrap()
    }

    #[test]
    fn test_int32_wrapping() {
        assert_eq!(to_int32(4_294_967_295.0), -1);
        assert_eq!(to_uint32(-255.0), 4_294_967_041);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(2_147_483_648.5), i32::MIN);
    }

    #[test]
    fn test_bitwise_operators() {
        assert_eq!(eval(BinaryOperator::Shl, 23.0, 4.0), Value::Number(368.0));
        assert_eq!(eval(BinaryOperator::Shr, 368.0, 4.0), Value::Number(23.0));
        assert_eq!(eval(BinaryOperator::UShr, -255.0, 20.0), Value::Number(4095.0));
        assert_eq!(eval(BinaryOperator::BitAnd, 7.0, 10.0), Value::Number(2.0));
        assert_eq!(eval(BinaryOperator::BitOr, 21.0, 10.0), Value::Number(31.0));
        assert_eq!(eval(BinaryOperator::BitXor, 23.0, 10.0), Value::Number(29.0));
        assert_eq!(eval(BinaryOperator::Shr, -16.0, 2.0), Value::Number(-4.0));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval(BinaryOperator::Lt, "a", "b"), Value::Boolean(true));
        assert_eq!(eval(BinaryOperator::Lt, "10", "9"), Value::Boolean(true));
        assert_eq!(eval(BinaryOperator::Lt, "10", 9.0), Value::Boolean(false));
        assert_eq!(eval(BinaryOperator::GtEq, f64::NAN, 1.0), Value::Boolean(false));
        assert_eq!(eval(BinaryOperator::Eq, true, "1"), Value::Boolean(true));
        assert_eq!(eval(BinaryOperator::StrictNotEq, 0.0, -0.0), Value::Boolean(false));
    }

    #[test]
    fn test_in_requires_object() {
        let err = Interpreter::new().binary(BinaryOperator::In, "a".into(), 1.0.into()).unwrap_err();
        assert!(matches!(err, RuntimeError::Type(_)));
    }
}
