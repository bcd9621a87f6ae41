use std::fmt;

use crate::types::{ClassId, RegClass, StateId, Type};

/// Pointer payload of a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Null,
    State(StateId),
    Class(ClassId),
}

/// Raw payload. Which member is live follows from the owning constant's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Name(String),
    String(String),
    Pointer(Address),
}

/// A compile-time value together with its semantic type.
///
/// Constructors keep the payload in step with the type's register class:
/// integers, bools, sounds and colors hold `Int`, floats hold `Float`, names
/// hold `Name`, strings hold `String`, and everything pointer-like holds
/// `Pointer`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub ty: Type,
    pub value: Value,
}

impl Constant {
    pub fn int(v: i32) -> Self {
        Constant { ty: Type::INT, value: Value::Int(v) }
    }

    pub fn uint(v: u32) -> Self {
        Constant { ty: Type::UINT, value: Value::Int(v as i32) }
    }

    /// Integer payload stored under an arbitrary integer-register type.
    pub fn typed_int(ty: Type, v: i32) -> Self {
        Constant { ty, value: Value::Int(v) }
    }

    pub fn float(v: f64) -> Self {
        Constant { ty: Type::DOUBLE, value: Value::Float(v) }
    }

    pub fn bool(v: bool) -> Self {
        Constant { ty: Type::Bool, value: Value::Int(v as i32) }
    }

    pub fn name(v: impl Into<String>) -> Self {
        Constant { ty: Type::Name, value: Value::Name(v.into()) }
    }

    pub fn string(v: impl Into<String>) -> Self {
        Constant { ty: Type::String, value: Value::String(v.into()) }
    }

    pub fn sound(id: i32) -> Self {
        Constant { ty: Type::Sound, value: Value::Int(id) }
    }

    pub fn color(rgb: u32) -> Self {
        Constant { ty: Type::Color, value: Value::Int(rgb as i32) }
    }

    pub fn null() -> Self {
        Constant { ty: Type::NullPtr, value: Value::Pointer(Address::Null) }
    }

    /// A state constant; `None` is the null state ("do not jump").
    pub fn state(state: Option<StateId>) -> Self {
        let addr = state.map(Address::State).unwrap_or(Address::Null);
        Constant { ty: Type::State, value: Value::Pointer(addr) }
    }

    pub fn class(class: ClassId, ty: Type) -> Self {
        Constant { ty, value: Value::Pointer(Address::Class(class)) }
    }

    pub fn reg_class(&self) -> RegClass {
        self.ty.reg_class()
    }

    pub fn as_int(&self) -> i32 {
        match &self.value {
            Value::Int(v) => *v,
            Value::Float(v) => *v as i32,
            _ => 0,
        }
    }

    pub fn as_uint(&self) -> u32 {
        match &self.value {
            Value::Int(v) => *v as u32,
            Value::Float(v) => *v as u32,
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match &self.value {
            Value::Int(v) if self.ty.is_unsigned() => *v as u32 as f64,
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            _ => 0.0,
        }
    }

    /// Truthiness: nonzero numbers and non-null pointers are true.
    pub fn as_bool(&self) -> bool {
        match &self.value {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Pointer(a) => *a != Address::Null,
            Value::Name(n) => !n.is_empty() && !n.eq_ignore_ascii_case("none"),
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            Value::Name(s) | Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<Address> {
        match &self.value {
            Value::Pointer(a) => Some(*a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Pointer(Address::Null))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.ty, &self.value) {
            (Type::Bool, Value::Int(v)) => write!(f, "{}", *v != 0),
            (Type::Color, Value::Int(v)) => write!(f, "#{:06x}", *v as u32 & 0xff_ffff),
            (ty, Value::Int(v)) if ty.is_unsigned() => write!(f, "{}", *v as u32),
            (_, Value::Int(v)) => write!(f, "{v}"),
            (_, Value::Float(v)) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            (_, Value::Name(n)) => write!(f, "'{n}'"),
            (_, Value::String(s)) => write!(f, "\"{s}\""),
            (_, Value::Pointer(Address::Null)) => write!(f, "null"),
            (_, Value::Pointer(Address::State(s))) => write!(f, "state#{}", s.0),
            (_, Value::Pointer(Address::Class(c))) => write!(f, "class#{}", c.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_follows_type() {
        assert_eq!(Constant::bool(true).reg_class(), RegClass::Int);
        assert_eq!(Constant::float(1.5).reg_class(), RegClass::Float);
        assert_eq!(Constant::name("Fire").reg_class(), RegClass::Int);
        assert_eq!(Constant::string("x").reg_class(), RegClass::String);
        assert_eq!(Constant::state(None).reg_class(), RegClass::Pointer);
    }

    #[test]
    fn conversions() {
        assert_eq!(Constant::float(-2.9).as_int(), -2);
        assert_eq!(Constant::int(7).as_float(), 7.0);
        assert_eq!(Constant::uint(u32::MAX).as_float(), u32::MAX as f64);
        assert!(Constant::float(0.1).as_bool());
        assert!(!Constant::null().as_bool());
        assert!(!Constant::int(0).as_bool());
    }

    #[test]
    fn display() {
        assert_eq!(Constant::int(11).to_string(), "11");
        assert_eq!(Constant::float(2.0).to_string(), "2.0");
        assert_eq!(Constant::bool(false).to_string(), "false");
        assert_eq!(Constant::color(0xff0000).to_string(), "#ff0000");
        assert_eq!(Constant::name("Death").to_string(), "'Death'");
    }
}
