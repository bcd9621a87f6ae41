pub mod symbols;
pub mod tables;

pub use symbols::{
    ClassDef, ClassId, EnvError, Field, FieldFlags, FunctionDef, FunctionKind, LineSpecial,
    StateId, Symbol, SymbolTable,
};

/// Coarse storage kind of a value. Selects the instruction family and the
/// register pool a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegClass {
    Int,
    Float,
    String,
    Pointer,
    Nil,
}

impl RegClass {
    pub const ALL: [RegClass; 4] = [RegClass::Int, RegClass::Float, RegClass::String, RegClass::Pointer];

    /// Pool index; `Nil` has no pool.
    pub fn index(self) -> Option<usize> {
        match self {
            RegClass::Int => Some(0),
            RegClass::Float => Some(1),
            RegClass::String => Some(2),
            RegClass::Pointer => Some(3),
            RegClass::Nil => None,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            RegClass::Int => 'd',
            RegClass::Float => 'f',
            RegClass::String => 's',
            RegClass::Pointer => 'a',
            RegClass::Nil => '-',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F32,
    F64,
}

/// Semantic type of an expression.
///
/// Types are plain values compared structurally; class identity goes through
/// [`ClassId`] so descendant queries are answered by the [`SymbolTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Placeholder for an expression that already failed.
    Error,
    Void,
    Bool,
    Int(IntKind),
    Float(FloatKind),
    Name,
    String,
    Sound,
    Color,
    State,
    NullPtr,
    /// Pointer to an instance of a class.
    Object(ClassId),
    /// `class<T>`: pointer to a class descriptor.
    ClassPtr(ClassId),
    Struct(String),
    Array { elem: Box<Type>, count: u32 },
}

impl Type {
    pub const INT: Type = Type::Int(IntKind::I32);
    pub const UINT: Type = Type::Int(IntKind::U32);
    pub const DOUBLE: Type = Type::Float(FloatKind::F64);

    pub fn reg_class(&self) -> RegClass {
        match self {
            Type::Bool | Type::Int(_) | Type::Name | Type::Sound | Type::Color => RegClass::Int,
            Type::Float(_) => RegClass::Float,
            Type::String => RegClass::String,
            Type::State | Type::NullPtr | Type::Object(_) | Type::ClassPtr(_) => RegClass::Pointer,
            Type::Error | Type::Void | Type::Struct(_) | Type::Array { .. } => RegClass::Nil,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Type::Error | Type::Void | Type::Struct(_) => 0,
            Type::Bool | Type::Int(IntKind::I8 | IntKind::U8) => 1,
            Type::Int(IntKind::I16 | IntKind::U16) => 2,
            Type::Int(_) | Type::Name | Type::Sound | Type::Color | Type::Float(FloatKind::F32) => 4,
            Type::Float(FloatKind::F64) => 8,
            Type::String | Type::State | Type::NullPtr | Type::Object(_) | Type::ClassPtr(_) => 8,
            Type::Array { elem, count } => elem.size() * count,
        }
    }

    pub fn align(&self) -> u32 {
        match self {
            Type::Array { elem, .. } => elem.align(),
            Type::Error | Type::Void | Type::Struct(_) => 1,
            other => other.size(),
        }
    }

    /// Bool, integers and floats. Names, sounds and colors live in integer
    /// registers but are not arithmetic.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Bool | Type::Int(_) | Type::Float(_))
    }

    pub fn is_pointer(&self) -> bool {
        self.reg_class() == RegClass::Pointer
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Int(IntKind::U8 | IntKind::U16 | IntKind::U32))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }
}
