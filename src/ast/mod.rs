pub mod source_map;
pub use source_map::{Location, SourceMap};

use crate::types::{ClassId, FunctionDef, Type};
use crate::value::Constant;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Index of a local variable slot, assigned by the compiler when the
/// declaration is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

// ---- Operators ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    ApproxEq,
    LtGtEq,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::ApproxEq => "~==",
            BinOp::LtGtEq => "<>=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    BoolNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::BoolNot => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOp {
    Incr,
    Decr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeAlignOp {
    SizeOf,
    AlignOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinMaxOp {
    Min,
    Max,
}

/// Single-argument float library functions, dispatched through `flop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlopOp {
    Exp,
    Log,
    Log10,
    Sqrt,
    Ceil,
    Floor,
    ACos,
    ASin,
    ATan,
    Cos,
    Sin,
    Tan,
    CosH,
    SinH,
    TanH,
}

impl FlopOp {
    pub fn from_name(name: &str) -> Option<FlopOp> {
        let op = match name.to_ascii_lowercase().as_str() {
            "exp" => FlopOp::Exp,
            "log" => FlopOp::Log,
            "log10" => FlopOp::Log10,
            "sqrt" => FlopOp::Sqrt,
            "ceil" => FlopOp::Ceil,
            "floor" => FlopOp::Floor,
            "acos" => FlopOp::ACos,
            "asin" => FlopOp::ASin,
            "atan" => FlopOp::ATan,
            "cos" => FlopOp::Cos,
            "sin" => FlopOp::Sin,
            "tan" => FlopOp::Tan,
            "cosh" => FlopOp::CosH,
            "sinh" => FlopOp::SinH,
            "tanh" => FlopOp::TanH,
            _ => return None,
        };
        Some(op)
    }

    /// Selector passed in the C operand of `flop`.
    pub fn code(self) -> u16 {
        self as u16 + 1
    }

    /// Trigonometric functions take and return degrees.
    pub fn apply(self, v: f64) -> f64 {
        match self {
            FlopOp::Exp => v.exp(),
            FlopOp::Log => v.ln(),
            FlopOp::Log10 => v.log10(),
            FlopOp::Sqrt => v.sqrt(),
            FlopOp::Ceil => v.ceil(),
            FlopOp::Floor => v.floor(),
            FlopOp::ACos => v.acos().to_degrees(),
            FlopOp::ASin => v.asin().to_degrees(),
            FlopOp::ATan => v.atan().to_degrees(),
            FlopOp::Cos => v.to_radians().cos(),
            FlopOp::Sin => v.to_radians().sin(),
            FlopOp::Tan => v.to_radians().tan(),
            FlopOp::CosH => v.cosh(),
            FlopOp::SinH => v.sinh(),
            FlopOp::TanH => v.tanh(),
        }
    }
}

// ---- Expressions ----

/// An expression node. `ty` is filled in by resolution; a node with a type
/// has been resolved and is ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<Type>,
    /// Set by consumers that want the location rather than the value.
    pub address_requested: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Constant),

    // -- produced by the parser, replaced during resolution --
    Identifier(String),
    MemberIdentifier { object: Box<Expr>, name: String },
    FunctionCall { name: String, rng: Option<String>, args: Vec<Expr> },
    MemberFunctionCall { object: Box<Expr>, name: String, args: Vec<Expr> },
    /// `type(expr)` as written in source.
    ExplicitCast { operand: Box<Expr>, to: String },

    // -- casts --
    TypeCast { operand: Box<Expr>, to: Type, no_warn: bool },
    BoolCast(Box<Expr>),
    IntCast { operand: Box<Expr>, no_warn: bool },
    FloatCast(Box<Expr>),
    NameCast(Box<Expr>),
    StringCast(Box<Expr>),
    ColorCast(Box<Expr>),
    SoundCast(Box<Expr>),
    ClassTypeCast { operand: Box<Expr>, target: ClassId },

    // -- operators --
    Unary { op: UnaryOp, operand: Box<Expr> },
    SizeAlign { op: SizeAlignOp, operand: Box<Expr> },
    IncrDecr { op: StepOp, prefix: bool, operand: Box<Expr> },
    Assign { base: Box<Expr>, right: Box<Expr> },
    /// The left side of the enclosing compound assignment.
    AssignSelf,
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    Conditional { cond: Box<Expr>, when_true: Box<Expr>, when_false: Box<Expr> },

    // -- storage --
    SelfRef,
    LocalVariable(LocalId),
    ClassMember { object: Box<Expr>, offset: u32, readonly: bool },
    ArrayElement { array: Box<Expr>, index: Box<Expr> },

    // -- calls and builtins --
    VmCall { object: Option<Box<Expr>>, function: Box<FunctionDef>, args: Vec<Expr>, tail: bool },
    ActionSpecial { special: i32, args: Vec<Expr>, tail: bool },
    Flop { op: FlopOp, arg: Box<Expr> },
    Random { rng: String, min: Box<Expr>, max: Box<Expr>, tail: bool },
    FRandom { rng: String, min: Box<Expr>, max: Box<Expr>, tail: bool },
    Random2 { rng: String, mask: Box<Expr>, tail: bool },
    RandomPick { rng: String, choices: Vec<Expr>, float: bool },
    MinMax { op: MinMaxOp, args: Vec<Expr> },
    Abs(Box<Expr>),
    ATan2 { y: Box<Expr>, x: Box<Expr> },

    // -- states --
    StateByIndex(u32),
    RuntimeStateIndex { index: Box<Expr>, tail: bool },
    /// A state label. `names` is filled in by resolution; until then the
    /// label is held unparsed in `text`. A label left for runtime is always
    /// searched from the owner's own class.
    MultiNameState { text: String, names: Vec<String>, tail: bool },
}

static ERROR_TYPE: Type = Type::Error;

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span, ty: None, address_requested: false }
    }

    /// A node that is already resolved to `ty`.
    pub fn typed(kind: ExprKind, span: Span, ty: Type) -> Self {
        Expr { kind, span, ty: Some(ty), address_requested: false }
    }

    pub fn constant(value: Constant, span: Span) -> Self {
        let ty = value.ty.clone();
        Expr::typed(ExprKind::Constant(value), span, ty)
    }

    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    pub fn is_resolved(&self) -> bool {
        self.ty.is_some()
    }

    pub fn value_type(&self) -> &Type {
        self.ty.as_ref().unwrap_or(&ERROR_TYPE)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ExprKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// A constant whose numeric value is zero.
    pub fn is_zero(&self) -> bool {
        match self.as_constant() {
            Some(c) if c.ty.is_numeric() => c.as_float() == 0.0,
            _ => false,
        }
    }
}

// ---- Statements ----

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
}

impl JumpKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JumpKind::Break => "break",
            JumpKind::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Nop,
    Expr(Expr),
    /// Statements run in order without opening a scope.
    Sequence(Vec<Stmt>),
    /// A braced block. `locals` lists the slots declared directly inside it.
    Compound { body: Vec<Stmt>, locals: Vec<LocalId> },
    If { cond: Expr, then_branch: Option<Box<Stmt>>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Box<Stmt>>, body: Box<Stmt> },
    Jump(JumpKind),
    Return(Option<Expr>),
    LocalDecl { name: String, ty: String, init: Option<Expr>, id: Option<LocalId> },
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }

    pub fn nop(span: Span) -> Self {
        Stmt { kind: StmtKind::Nop, span }
    }

    /// True for statements that produce no code at all.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            StmtKind::Nop => true,
            StmtKind::Sequence(body) | StmtKind::Compound { body, .. } => body.iter().all(Stmt::is_empty),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_unknown_is_zero() {
        assert_eq!(Span::UNKNOWN, Span { start: 0, end: 0 });
        assert_eq!(Span::default(), Span::UNKNOWN);
    }

    #[test]
    fn span_merge_takes_extremes() {
        let a = Span { start: 5, end: 10 };
        let b = Span { start: 2, end: 15 };
        assert_eq!(a.merge(b), Span { start: 2, end: 15 });
        assert_eq!(a.merge(a), a);
    }

    #[test]
    fn constants_are_resolved_on_construction() {
        let e = Expr::constant(Constant::int(3), Span::UNKNOWN);
        assert!(e.is_resolved());
        assert_eq!(e.value_type(), &Type::INT);
        let id = Expr::new(ExprKind::Identifier("health".into()), Span::UNKNOWN);
        assert!(!id.is_resolved());
        assert_eq!(id.value_type(), &Type::Error);
    }

    #[test]
    fn zero_detection() {
        assert!(Expr::constant(Constant::float(0.0), Span::UNKNOWN).is_zero());
        assert!(!Expr::constant(Constant::int(2), Span::UNKNOWN).is_zero());
        assert!(!Expr::constant(Constant::string(""), Span::UNKNOWN).is_zero());
    }

    #[test]
    fn nested_empty_blocks_are_empty() {
        let inner = Stmt::new(StmtKind::Compound { body: vec![Stmt::nop(Span::UNKNOWN)], locals: vec![] }, Span::UNKNOWN);
        let outer = Stmt::new(StmtKind::Sequence(vec![inner]), Span::UNKNOWN);
        assert!(outer.is_empty());
        let ret = Stmt::new(StmtKind::Return(None), Span::UNKNOWN);
        assert!(!Stmt::new(StmtKind::Sequence(vec![ret]), Span::UNKNOWN).is_empty());
    }

    #[test]
    fn flop_names_and_degrees() {
        assert_eq!(FlopOp::from_name("SQRT"), Some(FlopOp::Sqrt));
        assert_eq!(FlopOp::from_name("frob"), None);
        assert!((FlopOp::Sin.apply(90.0) - 1.0).abs() < 1e-12);
        assert!((FlopOp::ATan.apply(1.0) - 45.0).abs() < 1e-12);
    }
}
