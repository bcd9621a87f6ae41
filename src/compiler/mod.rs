//! Semantic resolution and bytecode emission.
//!
//! Resolution consumes an unresolved [`Expr`] tree and returns a typed one:
//! identifiers are bound to storage, implicit conversions are inserted and
//! constant subtrees are folded. A node whose `ty` is set is resolved and
//! passes through [`resolve`] unchanged. Emission walks the typed tree and
//! drives a [`FunctionBuilder`].

mod access;
mod binary;
mod builtins;
mod calls;
mod cast;
pub mod context;
mod operators;
mod states;
mod stmt;

use crate::ast::{Expr, ExprKind, LocalId, Span, Stmt, StmtKind};
use crate::diagnostic::Diagnostic;
use crate::emit::{
    AddrConst, Chunk, EmitError, ExpEmit, FunctionBuilder, NativeFn, load_const_op, move_op, OP_CALL_K, OP_JMP,
    OP_LI, OP_PARAM, OP_PARAMI, OP_RESULT, OP_RET, OP_RETI, OP_TAIL_K, REGT_NIL, RET_FINAL,
};
use crate::types::{FunctionKind, RegClass, SymbolTable, Type};
use crate::value::{Address, Constant, Value};

pub use context::{CompileContext, CompileOptions};

// ── Errors ───────────────────────────────────────────────────────────

/// A resolution failure. Returned through `?`; the subtree that failed is
/// dropped with it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    pub code: &'static str,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl CompileError {
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub type Resolved<T> = Result<T, CompileError>;

/// A compilation that produced at least one fatal diagnostic.
#[derive(Debug, thiserror::Error)]
#[error("failed to compile '{function}'")]
pub struct CompileFailure {
    pub function: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct Compiled {
    pub chunk: Chunk,
    pub returns: Vec<Type>,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Resolution ───────────────────────────────────────────────────────

/// Give a resolved expression a different type without changing its value.
pub(crate) fn retype(mut e: Expr, ty: Type) -> Expr {
    if let ExprKind::Constant(c) = &mut e.kind {
        c.ty = ty.clone();
    }
    e.ty = Some(ty);
    e
}

pub fn resolve(ctx: &mut CompileContext, e: Expr) -> Resolved<Expr> {
    if e.is_resolved() {
        return Ok(e);
    }
    let span = e.span;
    match e.kind {
        ExprKind::Constant(c) => Ok(Expr::constant(c, span)),

        ExprKind::Identifier(name) => access::resolve_identifier(ctx, &name, span),
        ExprKind::MemberIdentifier { object, name } => access::resolve_member_identifier(ctx, *object, &name, span),
        ExprKind::FunctionCall { name, rng, args } => calls::resolve_call(ctx, &name, rng, args, span),
        ExprKind::MemberFunctionCall { object, name, args } => {
            calls::resolve_member_call(ctx, *object, &name, args, span)
        }
        ExprKind::ExplicitCast { operand, to } => cast::resolve_explicit(ctx, *operand, &to, span),

        ExprKind::TypeCast { operand, to, no_warn } => cast::resolve_type_cast(ctx, *operand, to, no_warn, span),
        ExprKind::BoolCast(x) => cast::resolve_bool_cast(ctx, *x, span),
        ExprKind::IntCast { operand, no_warn } => cast::resolve_int_cast(ctx, *operand, no_warn, span),
        ExprKind::FloatCast(x) => cast::resolve_float_cast(ctx, *x, span),
        ExprKind::NameCast(x) => cast::resolve_name_cast(ctx, *x, span),
        ExprKind::StringCast(x) => cast::resolve_string_cast(ctx, *x, span),
        ExprKind::ColorCast(x) => cast::resolve_color_cast(ctx, *x, span),
        ExprKind::SoundCast(x) => cast::resolve_sound_cast(ctx, *x, span),
        ExprKind::ClassTypeCast { operand, target } => states::resolve_class_type_cast(ctx, *operand, target, span),

        ExprKind::Unary { op, operand } => operators::resolve_unary(ctx, op, *operand, span),
        ExprKind::SizeAlign { op, operand } => operators::resolve_size_align(ctx, op, *operand, span),
        ExprKind::IncrDecr { op, prefix, operand } => operators::resolve_incr_decr(ctx, op, prefix, *operand, span),
        ExprKind::Assign { base, right } => operators::resolve_assign(ctx, *base, *right, span),
        ExprKind::AssignSelf => operators::resolve_assign_self(ctx, span),
        ExprKind::Binary { op, left, right } => binary::resolve_binary(ctx, op, *left, *right, span),
        ExprKind::Logical { op, left, right } => binary::resolve_logical(ctx, op, *left, *right, span),
        ExprKind::Conditional { cond, when_true, when_false } => {
            binary::resolve_conditional(ctx, *cond, *when_true, *when_false, span)
        }

        ExprKind::SelfRef => access::resolve_self(ctx, span),
        ExprKind::LocalVariable(id) => Ok(access::local_node(ctx, id, span)),
        ExprKind::ClassMember { .. } => Err(ctx.error(span, "ACT-R008", "Member variable requires a class or object")),
        ExprKind::ArrayElement { array, index } => access::resolve_array_element(ctx, *array, *index, span),

        ExprKind::VmCall { object, function, args, tail } => {
            calls::resolve_vm_call(ctx, object.map(|o| *o), *function, args, tail, span)
        }
        ExprKind::ActionSpecial { special, args, tail } => calls::resolve_action_special(ctx, special, args, tail, span),
        ExprKind::Flop { op, arg } => calls::resolve_flop(ctx, op, *arg, span),
        ExprKind::Random { rng, min, max, tail } => builtins::resolve_random(ctx, rng, *min, *max, tail, false, span),
        ExprKind::FRandom { rng, min, max, tail } => builtins::resolve_random(ctx, rng, *min, *max, tail, true, span),
        ExprKind::Random2 { rng, mask, tail } => builtins::resolve_random2(ctx, rng, *mask, tail, span),
        ExprKind::RandomPick { rng, choices, float } => builtins::resolve_random_pick(ctx, rng, choices, float, span),
        ExprKind::MinMax { op, args } => builtins::resolve_min_max(ctx, op, args, span),
        ExprKind::Abs(x) => builtins::resolve_abs(ctx, *x, span),
        ExprKind::ATan2 { y, x } => builtins::resolve_atan2(ctx, *y, *x, span),

        ExprKind::StateByIndex(index) => states::resolve_state_by_index(ctx, index, span),
        ExprKind::RuntimeStateIndex { index, tail } => states::resolve_runtime_state_index(ctx, *index, tail, span),
        ExprKind::MultiNameState { text, .. } => states::resolve_multi_name_state(ctx, &text, span),
    }
}

// ── Emission ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LoopJumps {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Walks a resolved tree and writes instructions for one function.
pub struct Emitter<'a> {
    pub b: FunctionBuilder,
    symbols: &'a SymbolTable,
    kind: FunctionKind,
    locals: Vec<Option<ExpEmit>>,
    loops: Vec<LoopJumps>,
    assign_addresses: Vec<ExpEmit>,
}

impl<'a> Emitter<'a> {
    pub fn new(symbols: &'a SymbolTable, name: &str, kind: FunctionKind, local_count: usize) -> Self {
        let mut b = FunctionBuilder::new(name);
        // self, invoker and state info occupy the first pointer registers
        for _ in 0..kind.implicit_args() {
            b.alloc(RegClass::Pointer);
        }
        Emitter {
            b,
            symbols,
            kind,
            locals: vec![None; local_count],
            loops: Vec::new(),
            assign_addresses: Vec::new(),
        }
    }

    pub fn emit(&mut self, e: &Expr) -> ExpEmit {
        match &e.kind {
            ExprKind::Constant(c) => self.konst(c),

            ExprKind::BoolCast(x) => cast::emit_bool_cast(self, x),
            ExprKind::IntCast { operand, .. } => cast::emit_int_cast(self, operand, e.value_type()),
            ExprKind::FloatCast(x) => cast::emit_float_cast(self, x),
            ExprKind::NameCast(x) => cast::emit_name_cast(self, x),
            ExprKind::StringCast(x) => cast::emit_string_cast(self, x),
            ExprKind::ColorCast(x) => cast::emit_color_cast(self, x),
            ExprKind::SoundCast(x) => cast::emit_sound_cast(self, x),
            ExprKind::ClassTypeCast { operand, target } => states::emit_class_type_cast(self, operand, *target),

            ExprKind::Unary { op, operand } => operators::emit_unary(self, *op, operand),
            ExprKind::IncrDecr { op, prefix, operand } => operators::emit_incr_decr(self, e, *op, *prefix, operand),
            ExprKind::Assign { base, right } => operators::emit_assign(self, e, base, right),
            ExprKind::AssignSelf => operators::emit_assign_self(self, e),
            ExprKind::Binary { op, left, right } => binary::emit_binary(self, e, *op, left, right),
            ExprKind::Logical { op, left, right } => binary::emit_logical(self, *op, left, right),
            ExprKind::Conditional { cond, when_true, when_false } => {
                binary::emit_conditional(self, e, cond, when_true, when_false)
            }

            ExprKind::SelfRef => self.self_pointer(),
            ExprKind::LocalVariable(id) => ExpEmit { target: e.address_requested, ..self.local(*id) },
            ExprKind::ClassMember { object, offset, .. } => access::emit_class_member(self, e, object, *offset),
            ExprKind::ArrayElement { array, index } => access::emit_array_element(self, e, array, index),

            ExprKind::VmCall { object, function, args, tail } => {
                calls::emit_vm_call(self, object.as_deref(), function, args, *tail)
            }
            ExprKind::ActionSpecial { special, args, tail } => calls::emit_action_special(self, *special, args, *tail),
            ExprKind::Flop { op, arg } => calls::emit_flop(self, *op, arg),
            ExprKind::Random { rng, min, max, tail } => {
                builtins::emit_random(self, rng, min, max, *tail, NativeFn::Random)
            }
            ExprKind::FRandom { rng, min, max, tail } => {
                builtins::emit_random(self, rng, min, max, *tail, NativeFn::FRandom)
            }
            ExprKind::Random2 { rng, mask, tail } => builtins::emit_random2(self, rng, mask, *tail),
            ExprKind::RandomPick { rng, choices, float } => builtins::emit_random_pick(self, rng, choices, *float),
            ExprKind::MinMax { op, args } => builtins::emit_min_max(self, e, *op, args),
            ExprKind::Abs(x) => builtins::emit_abs(self, x),
            ExprKind::ATan2 { y, x } => builtins::emit_atan2(self, y, x),

            ExprKind::RuntimeStateIndex { index, tail } => states::emit_runtime_state_index(self, index, *tail),
            ExprKind::MultiNameState { names, tail, .. } => states::emit_multi_name_state(self, names, *tail),

            ExprKind::Identifier(_) => self.unresolved("identifier"),
            ExprKind::MemberIdentifier { .. } => self.unresolved("member"),
            ExprKind::FunctionCall { .. } | ExprKind::MemberFunctionCall { .. } => self.unresolved("call"),
            ExprKind::ExplicitCast { .. } | ExprKind::TypeCast { .. } => self.unresolved("cast"),
            ExprKind::SizeAlign { .. } => self.unresolved("sizeof"),
            ExprKind::StateByIndex(_) => self.unresolved("state index"),
        }
    }

    fn unresolved(&mut self, what: &'static str) -> ExpEmit {
        self.b.report(EmitError::Unresolved(what));
        ExpEmit::nil()
    }

    /// Constant-pool operand for a folded value.
    pub(crate) fn konst(&mut self, c: &Constant) -> ExpEmit {
        let class = c.reg_class();
        let index = match class {
            RegClass::Int => match &c.value {
                Value::Name(n) => self.b.name_const(n),
                _ => self.b.int_const(c.as_int()),
            },
            RegClass::Float => self.b.float_const(c.as_float()),
            RegClass::String => self.b.string_const(c.as_text().unwrap_or_default()),
            RegClass::Pointer => {
                let addr = self.addr_const(c.address().unwrap_or(Address::Null));
                self.b.addr_const(addr)
            }
            RegClass::Nil => return ExpEmit::nil(),
        };
        ExpEmit::konst(class, index)
    }

    fn addr_const(&self, addr: Address) -> AddrConst {
        match addr {
            Address::Null => AddrConst::Null,
            Address::State(id) => AddrConst::State { id: id.0, label: self.symbols.state(id).label.clone() },
            Address::Class(id) => AddrConst::Class { name: self.symbols.class_name(id).to_string() },
        }
    }

    /// Load a constant operand into a fresh register; registers pass through.
    pub(crate) fn to_reg(&mut self, v: ExpEmit) -> ExpEmit {
        if !v.konst {
            return v;
        }
        let out = ExpEmit::alloc(&mut self.b, v.class);
        self.b.emit_abx(load_const_op(v.class), out.reg, v.reg);
        out
    }

    /// A register the caller may overwrite: constants are loaded and
    /// reserved registers copied.
    pub(crate) fn to_scratch(&mut self, v: ExpEmit) -> ExpEmit {
        if v.konst {
            return self.to_reg(v);
        }
        if !v.fixed {
            return v;
        }
        let out = ExpEmit::alloc(&mut self.b, v.class);
        self.b.emit_abc(move_op(v.class), out.reg, v.reg, 0);
        out
    }

    /// `li to,0; <compare>; jmp +1; li to,1`
    pub(crate) fn bool_idiom(&mut self, to: u16, op: u8, a: u16, b: u16, c: u16) {
        self.b.emit_asbx(OP_LI, to, 0);
        self.b.emit_abc(op, a, b, c);
        self.b.emit_asbx(OP_JMP, 0, 1);
        self.b.emit_asbx(OP_LI, to, 1);
    }

    /// Pass a value to the next call and release it.
    pub(crate) fn param(&mut self, v: ExpEmit) {
        self.b.emit_abx(OP_PARAM, v.tag() as u16, v.reg);
        v.free(&mut self.b);
    }

    pub(crate) fn param_int(&mut self, v: i32) {
        if (i16::MIN as i32..=i16::MAX as i32).contains(&v) {
            self.b.emit_asbx(OP_PARAMI, 0, v);
        } else {
            let k = self.b.int_const(v);
            self.param(ExpEmit::konst(RegClass::Int, k));
        }
    }

    pub(crate) fn param_null(&mut self) {
        let k = self.b.addr_const(AddrConst::Null);
        self.param(ExpEmit::konst(RegClass::Pointer, k));
    }

    /// Call a runtime helper. A tail call produces a final result.
    pub(crate) fn call_native(&mut self, function: NativeFn, nargs: u16, result: RegClass, tail: bool) -> ExpEmit {
        let k = self.b.addr_const(AddrConst::Native { function });
        if tail {
            self.b.emit_abc(OP_TAIL_K, k, nargs, 1);
            return ExpEmit::final_call();
        }
        self.b.emit_abc(OP_CALL_K, k, nargs, 1);
        self.result(result)
    }

    /// Fetch the first result of the preceding call into a new register.
    pub(crate) fn result(&mut self, class: RegClass) -> ExpEmit {
        let out = ExpEmit::alloc(&mut self.b, class);
        self.b.emit_abx(OP_RESULT, out.tag() as u16, out.reg);
        out
    }

    pub(crate) fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub(crate) fn symbols(&self) -> &'a SymbolTable {
        self.symbols
    }

    /// `self` lives in the first pointer register of member and action
    /// functions. Static functions see null.
    pub(crate) fn self_pointer(&mut self) -> ExpEmit {
        match self.kind {
            FunctionKind::Static => {
                let k = self.b.addr_const(AddrConst::Null);
                ExpEmit::konst(RegClass::Pointer, k)
            }
            _ => ExpEmit::fixed(RegClass::Pointer, 0),
        }
    }

    pub(crate) fn local(&mut self, id: LocalId) -> ExpEmit {
        match self.locals.get(id.0 as usize).copied().flatten() {
            Some(reg) => reg,
            None => self.unresolved("local variable"),
        }
    }

    pub(crate) fn bind_local(&mut self, id: LocalId, class: RegClass, reg: u16) {
        if let Some(slot) = self.locals.get_mut(id.0 as usize) {
            *slot = Some(ExpEmit::fixed(class, reg));
        }
    }

    pub(crate) fn release_local(&mut self, id: LocalId) {
        if let Some(Some(v)) = self.locals.get_mut(id.0 as usize).map(Option::take) {
            self.b.release(v.class, v.reg, 1);
        }
    }
}

// ── Entry points ─────────────────────────────────────────────────────

fn failure(name: &str, mut diagnostics: Vec<Diagnostic>, error: Option<&CompileError>) -> CompileFailure {
    if let Some(error) = error {
        diagnostics.push(Diagnostic::from(error));
    }
    CompileFailure { function: name.to_string(), diagnostics }
}

/// Ends in a `return` on every path through its last statement.
fn ends_in_return(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Sequence(body) | StmtKind::Compound { body, .. } => body.last().is_some_and(ends_in_return),
        _ => false,
    }
}

/// Compile a function body. `params` are the declared parameters; the
/// implicit pointer arguments follow from `options.kind`.
pub fn compile_function(
    symbols: &SymbolTable,
    options: &CompileOptions,
    params: &[(String, Type)],
    body: Stmt,
) -> Result<Compiled, CompileFailure> {
    let _span = tracing::debug_span!("compile", function = %options.name).entered();
    let mut ctx = CompileContext::new(symbols, options, true);
    let ids: Vec<LocalId> = params.iter().map(|(name, ty)| ctx.declare_param(name, ty.clone())).collect();

    let body = match stmt::resolve_stmt(&mut ctx, body) {
        Ok(body) => body,
        Err(e) => return Err(failure(&options.name, ctx.diagnostics, Some(&e))),
    };
    if ctx.has_fatal() {
        return Err(failure(&options.name, ctx.diagnostics, None));
    }
    let returns = ctx.return_proto.clone().unwrap_or_default();

    let mut em = Emitter::new(symbols, &options.name, options.kind, ctx.local_count());
    for (id, (_, ty)) in ids.iter().zip(params) {
        let class = ty.reg_class();
        let reg = em.b.alloc(class);
        em.bind_local(*id, class, reg);
    }
    stmt::emit_stmt(&mut em, &body);
    if !ends_in_return(&body) {
        em.b.emit_abc(OP_RET, RET_FINAL, REGT_NIL as u16, 0);
    }
    em.b.set_returns(returns.iter().map(|t| symbols.describe(t)).collect());

    match em.b.finish() {
        Ok(chunk) => {
            tracing::debug!(instructions = chunk.code.len(), "compiled");
            Ok(Compiled { chunk, returns, diagnostics: ctx.diagnostics })
        }
        Err(e) => {
            let mut diagnostics = ctx.diagnostics;
            diagnostics.push(Diagnostic::from(&e));
            Err(failure(&options.name, diagnostics, None))
        }
    }
}

/// Resolve an expression outside any function and require a constant.
pub fn evaluate_constant(
    symbols: &SymbolTable,
    options: &CompileOptions,
    expr: Expr,
) -> Result<(Constant, Vec<Diagnostic>), CompileFailure> {
    let mut ctx = CompileContext::new(symbols, options, false);
    let span = expr.span;
    let resolved = match resolve(&mut ctx, expr) {
        Ok(e) => e,
        Err(e) => return Err(failure(&options.name, ctx.diagnostics, Some(&e))),
    };
    if ctx.has_fatal() {
        return Err(failure(&options.name, ctx.diagnostics, None));
    }
    match resolved.kind {
        ExprKind::Constant(c) => Ok((c, ctx.diagnostics)),
        _ => {
            let e = ctx.error(span, "ACT-T010", "Expression is not a constant");
            Err(failure(&options.name, ctx.diagnostics, Some(&e)))
        }
    }
}

/// Compile a damage expression into a function returning `int`: the value
/// goes to result slot 0 and `true` to slot 1.
pub fn compile_damage(symbols: &SymbolTable, options: &CompileOptions, expr: Expr) -> Result<Compiled, CompileFailure> {
    let mut ctx = CompileContext::new(symbols, options, true);
    let resolved = resolve(&mut ctx, expr).and_then(|v| {
        if !v.value_type().is_numeric() {
            return Err(ctx.error(v.span, "ACT-T002", "Numeric type expected"));
        }
        cast::int_cast(&mut ctx, v, false)
    });
    let value = match resolved {
        Ok(v) => v,
        Err(e) => return Err(failure(&options.name, ctx.diagnostics, Some(&e))),
    };
    if ctx.has_fatal() {
        return Err(failure(&options.name, ctx.diagnostics, None));
    }

    let mut em = Emitter::new(symbols, &options.name, options.kind, ctx.local_count());
    match value.as_constant() {
        Some(c) if (i16::MIN as i32..=i16::MAX as i32).contains(&c.as_int()) => {
            em.b.emit_asbx(OP_RETI, 0, c.as_int());
        }
        _ => {
            let v = em.emit(&value);
            em.b.emit_abc(OP_RET, 0, v.tag() as u16, v.reg);
            v.free(&mut em.b);
        }
    }
    em.b.emit_asbx(OP_RETI, 1 | RET_FINAL, 1);
    em.b.set_returns(vec!["int".into()]);

    match em.b.finish() {
        Ok(chunk) => Ok(Compiled { chunk, returns: vec![Type::INT], diagnostics: ctx.diagnostics }),
        Err(e) => {
            let mut diagnostics = ctx.diagnostics;
            diagnostics.push(Diagnostic::from(&e));
            Err(failure(&options.name, diagnostics, None))
        }
    }
}

// ── Test helpers ─────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::emit::{decode, op_name};
    use crate::parser;

    pub fn symbols() -> SymbolTable {
        SymbolTable::builtin().unwrap()
    }

    /// Action function of `Actor` named `Test`.
    pub fn actor_options() -> CompileOptions {
        let symbols = symbols();
        CompileOptions {
            name: "Test".into(),
            kind: FunctionKind::Action,
            class: symbols.class_by_name("Actor"),
            ..CompileOptions::default()
        }
    }

    pub fn lax_options() -> CompileOptions {
        CompileOptions { lax: true, ..actor_options() }
    }

    pub fn options_for(class: &str, kind: FunctionKind) -> CompileOptions {
        let symbols = symbols();
        CompileOptions { name: "Test".into(), kind, class: symbols.class_by_name(class), ..CompileOptions::default() }
    }

    /// Resolve one expression inside a function of the given context.
    pub fn resolve_with(options: &CompileOptions, src: &str) -> (Resolved<Expr>, Vec<Diagnostic>) {
        let symbols = symbols();
        let expr = parser::parse_expression(src).unwrap_or_else(|e| panic!("parse error in {src:?}: {e:?}"));
        let mut ctx = CompileContext::new(&symbols, options, true);
        let result = resolve(&mut ctx, expr);
        (result, ctx.diagnostics)
    }

    pub fn resolve_src(src: &str) -> Resolved<Expr> {
        resolve_with(&actor_options(), src).0
    }

    /// Resolve and require a folded constant.
    pub fn constant_of(src: &str) -> Constant {
        match resolve_src(src) {
            Ok(Expr { kind: ExprKind::Constant(c), .. }) => c,
            other => panic!("{src:?} did not fold: {other:?}"),
        }
    }

    pub fn compile_with(options: &CompileOptions, src: &str) -> Result<Compiled, CompileFailure> {
        let symbols = symbols();
        let body = parser::parse_body(src).unwrap_or_else(|e| panic!("parse error in {src:?}: {e:?}"));
        compile_function(&symbols, options, &[], body)
    }

    pub fn compile_src(src: &str) -> Compiled {
        compile_with(&actor_options(), src).unwrap_or_else(|f| panic!("{src:?} failed: {:?}", f.diagnostics))
    }

    /// First fatal message of a body that must not compile.
    pub fn compile_error(src: &str) -> String {
        match compile_with(&actor_options(), src) {
            Ok(_) => panic!("{src:?} compiled"),
            Err(f) => f
                .diagnostics
                .iter()
                .find(|d| d.is_fatal(true))
                .map(|d| d.message.clone())
                .unwrap_or_default(),
        }
    }

    pub fn ops(chunk: &Chunk) -> Vec<&'static str> {
        chunk.code.iter().map(|inst| op_name(decode(*inst).0).unwrap_or("???")).collect()
    }
}
