use crate::ast::{Expr, ExprKind, FlopOp, MinMaxOp, Span};
use crate::emit::{AddrConst, ExpEmit, NativeFn, OP_CALL_K, OP_FLOP, OP_TAIL_K};
use crate::types::{FunctionDef, FunctionKind, RegClass, Symbol, Type};
use crate::value::{Constant, Value};

use super::{cast, resolve, CompileContext, CompileError, Emitter, Resolved};

const RNG_FUNCTIONS: [&str; 5] = ["random", "frandom", "random2", "randompick", "frandompick"];

fn check_arg_count(ctx: &CompileContext, name: &str, args: &[Expr], min: usize, max: Option<usize>, span: Span) -> Resolved<()> {
    let got = args.len();
    if got < min {
        return Err(ctx.error(
            span,
            "ACT-F002",
            format!("Insufficient arguments in call to {name}, expected {min}, got {got}"),
        ));
    }
    if max.is_some_and(|max| got > max) {
        return Err(ctx.error(
            span,
            "ACT-F002",
            format!("Too many arguments in call to {name}, expected {}, got {got}", max.unwrap_or(min)),
        ));
    }
    Ok(())
}

fn take2(args: Vec<Expr>) -> Option<(Expr, Expr)> {
    let mut it = args.into_iter();
    Some((it.next()?, it.next()?))
}

// ── Free function calls ──────────────────────────────────────────────

/// Resolution order: member function of the enclosing class, float library,
/// line special, builtin.
pub(super) fn resolve_call(
    ctx: &mut CompileContext,
    name: &str,
    rng: Option<String>,
    args: Vec<Expr>,
    span: Span,
) -> Resolved<Expr> {
    let lower = name.to_ascii_lowercase();
    if rng.is_some() && !RNG_FUNCTIONS.contains(&lower.as_str()) {
        return Err(ctx.error(span, "ACT-F005", format!("Cannot use named RNGs with {name}")));
    }

    let member = ctx.class.and_then(|class| match ctx.symbols.find_symbol(class, name) {
        Some((Symbol::Function(f), _)) => Some(f.clone()),
        _ => None,
    });
    if let Some(function) = member {
        let in_static = matches!(ctx.function_kind(), None | Some(FunctionKind::Static));
        if in_static && function.kind != FunctionKind::Static {
            return Err(ctx.error(
                span,
                "ACT-F003",
                format!("Call to non-static function {} from a static context", function.name),
            ));
        }
        return resolve_vm_call(ctx, None, function, args, false, span);
    }

    if let Some(op) = FlopOp::from_name(name) {
        check_arg_count(ctx, name, &args, 1, Some(1), span)?;
        let Some(arg) = args.into_iter().next() else { return Err(missing(ctx, span)) };
        return resolve_flop(ctx, op, arg, span);
    }

    if let Some(special) = ctx.symbols.line_special(name).cloned() {
        let got = args.len();
        if got < special.min_args as usize {
            return Err(ctx.error(
                span,
                "ACT-F002",
                format!("Not enough parameters for '{}' (expected {}, got {got})", special.name, special.min_args),
            ));
        }
        if got > special.max_args as usize {
            return Err(ctx.error(
                span,
                "ACT-F002",
                format!("Too many parameters for '{}' (expected {}, got {got})", special.name, special.max_args),
            ));
        }
        return resolve_action_special(ctx, special.number, args, false, span);
    }

    let rng = rng.unwrap_or_default();
    let node = match lower.as_str() {
        "random" | "frandom" => {
            check_arg_count(ctx, name, &args, 2, Some(2), span)?;
            let Some((min, max)) = take2(args) else { return Err(missing(ctx, span)) };
            let (min, max) = (min.boxed(), max.boxed());
            if lower == "random" {
                ExprKind::Random { rng, min, max, tail: false }
            } else {
                ExprKind::FRandom { rng, min, max, tail: false }
            }
        }
        "randompick" | "frandompick" => {
            check_arg_count(ctx, name, &args, 1, None, span)?;
            ExprKind::RandomPick { rng, choices: args, float: lower == "frandompick" }
        }
        "random2" => {
            check_arg_count(ctx, name, &args, 0, Some(1), span)?;
            let mask = args.into_iter().next().unwrap_or_else(|| Expr::constant(Constant::int(-1), span));
            ExprKind::Random2 { rng, mask: mask.boxed(), tail: false }
        }
        "min" | "max" => {
            check_arg_count(ctx, name, &args, 2, None, span)?;
            let op = if lower == "min" { MinMaxOp::Min } else { MinMaxOp::Max };
            ExprKind::MinMax { op, args }
        }
        "clamp" => {
            check_arg_count(ctx, name, &args, 3, Some(3), span)?;
            let mut it = args.into_iter();
            let (Some(x), Some(lo), Some(hi)) = (it.next(), it.next(), it.next()) else {
                return Err(missing(ctx, span));
            };
            let floor = Expr::new(ExprKind::MinMax { op: MinMaxOp::Max, args: vec![x, lo] }, span);
            ExprKind::MinMax { op: MinMaxOp::Min, args: vec![floor, hi] }
        }
        "abs" => {
            check_arg_count(ctx, name, &args, 1, Some(1), span)?;
            let Some(x) = args.into_iter().next() else { return Err(missing(ctx, span)) };
            ExprKind::Abs(x.boxed())
        }
        "atan2" | "vectorangle" => {
            check_arg_count(ctx, name, &args, 2, Some(2), span)?;
            let Some((a, b)) = take2(args) else { return Err(missing(ctx, span)) };
            if lower == "atan2" {
                ExprKind::ATan2 { y: a.boxed(), x: b.boxed() }
            } else {
                ExprKind::ATan2 { y: b.boxed(), x: a.boxed() }
            }
        }
        _ => return Err(ctx.error(span, "ACT-F001", format!("Call to unknown function '{name}'"))),
    };
    resolve(ctx, Expr::new(node, span))
}

/// Argument lists are counted before they are destructured.
fn missing(ctx: &CompileContext, span: Span) -> CompileError {
    ctx.error(span, "ACT-F002", "Missing argument")
}

/// `object.name(args)` through an object pointer, or through a class
/// pointer for static functions and qualified calls into an ancestor.
pub(super) fn resolve_member_call(
    ctx: &mut CompileContext,
    object: Expr,
    name: &str,
    args: Vec<Expr>,
    span: Span,
) -> Resolved<Expr> {
    let object = resolve(ctx, object)?;
    let (class, static_only) = match object.value_type() {
        Type::ClassPtr(c) => (*c, true),
        Type::Object(c) => (*c, false),
        t if t.is_pointer() => {
            return Err(ctx.error(span, "ACT-F006", format!("Left hand side of {name} must point to a class object")));
        }
        _ => return Err(ctx.error(span, "ACT-F006", format!("Invalid expression on left hand side of {name}"))),
    };

    let function = match ctx.symbols.find_symbol(class, name) {
        Some((Symbol::Function(f), _)) => f.clone(),
        _ => return Err(ctx.error(span, "ACT-F001", format!("Unknown function {name}"))),
    };

    if function.kind == FunctionKind::Static {
        return resolve_vm_call(ctx, None, function, args, false, span);
    }
    if static_only {
        let inherits = ctx.class.is_some_and(|own| ctx.symbols.is_descendant_of(own, class));
        if !inherits {
            return Err(ctx.error(
                span,
                "ACT-F003",
                format!("Cannot call non-static function {}::{name} from here", ctx.symbols.class_name(class)),
            ));
        }
        // qualified call into an ancestor runs on our own self
        return resolve_vm_call(ctx, None, function, args, false, span);
    }
    resolve_vm_call(ctx, Some(object), function, args, false, span)
}

// ── Script functions ─────────────────────────────────────────────────

pub(super) fn resolve_vm_call(
    ctx: &mut CompileContext,
    object: Option<Expr>,
    function: FunctionDef,
    args: Vec<Expr>,
    tail: bool,
    span: Span,
) -> Resolved<Expr> {
    let object = object.map(|o| resolve(ctx, o)).transpose()?;
    if object.is_none() && function.kind != FunctionKind::Static && ctx.self_class().is_none() {
        return Err(ctx.error(span, "ACT-F003", "Call to non-static function without a self pointer"));
    }

    let (want, got) = (function.params.len(), args.len());
    if got < want {
        return Err(ctx.error(
            span,
            "ACT-F002",
            format!("Not enough parameters for '{}' (expected {want}, got {got})", function.name),
        ));
    }
    if got > want {
        return Err(ctx.error(
            span,
            "ACT-F002",
            format!("Too many parameters for '{}' (expected {want}, got {got})", function.name),
        ));
    }

    let mut resolved = Vec::with_capacity(args.len());
    for (arg, ty) in args.into_iter().zip(&function.params) {
        resolved.push(cast::type_cast(ctx, arg, ty.clone(), false)?);
    }
    let ty = function.returns.first().cloned().unwrap_or(Type::Void);
    let kind = ExprKind::VmCall { object: object.map(Expr::boxed), function: Box::new(function), args: resolved, tail };
    Ok(Expr::typed(kind, span, ty))
}

/// Implicit pointer arguments first: the object for methods and actions,
/// then invoker and state info for actions. Outside an action function the
/// last two are null.
pub(super) fn emit_vm_call(
    em: &mut Emitter,
    object: Option<&Expr>,
    function: &FunctionDef,
    args: &[Expr],
    tail: bool,
) -> ExpEmit {
    let mut count = 0u16;
    if function.kind != FunctionKind::Static {
        let this = match object {
            Some(o) => em.emit(o),
            None => em.self_pointer(),
        };
        em.param(this);
        count += 1;
    }
    if function.kind == FunctionKind::Action {
        if em.kind() == FunctionKind::Action {
            em.param(ExpEmit::fixed(RegClass::Pointer, 1));
            em.param(ExpEmit::fixed(RegClass::Pointer, 2));
        } else {
            em.param_null();
            em.param_null();
        }
        count += 2;
    }
    for arg in args {
        let v = em.emit(arg);
        em.param(v);
        count += 1;
    }

    let owner = em.symbols().class_name(function.owner);
    let k = em.b.addr_const(AddrConst::Function { name: format!("{owner}.{}", function.name) });
    let result = function.returns.first().map(Type::reg_class);
    if tail {
        em.b.emit_abc(OP_TAIL_K, k, count, u16::from(result.is_some()));
        return ExpEmit::final_call();
    }
    match result {
        Some(class) => {
            em.b.emit_abc(OP_CALL_K, k, count, 1);
            em.result(class)
        }
        None => {
            em.b.emit_abc(OP_CALL_K, k, count, 0);
            ExpEmit::nil()
        }
    }
}

// ── Line specials ────────────────────────────────────────────────────

/// A negative special takes a script name as its first argument.
pub(super) fn resolve_action_special(
    ctx: &mut CompileContext,
    special: i32,
    args: Vec<Expr>,
    tail: bool,
    span: Span,
) -> Resolved<Expr> {
    let mut resolved = Vec::with_capacity(args.len());
    for (i, arg) in args.into_iter().enumerate() {
        let arg = resolve(ctx, arg)?;
        if special < 0 && i == 0 {
            if *arg.value_type() != Type::Name || !arg.is_constant() {
                return Err(ctx.error(arg.span, "ACT-F004", format!("Name expected for parameter {i}")));
            }
            resolved.push(arg);
            continue;
        }
        let arg = match arg.value_type().reg_class() {
            RegClass::Int => arg,
            RegClass::Float => {
                let no_warn = ctx.lax;
                cast::int_cast(ctx, arg, no_warn)?
            }
            _ => return Err(ctx.error(arg.span, "ACT-F004", format!("Integer expected for parameter {i}"))),
        };
        resolved.push(arg);
    }
    Ok(Expr::typed(ExprKind::ActionSpecial { special, args: resolved, tail }, span, Type::INT))
}

/// `parami |special|; param self; <args>; call CallLineSpecial`
pub(super) fn emit_action_special(em: &mut Emitter, special: i32, args: &[Expr], tail: bool) -> ExpEmit {
    em.param_int(special.abs());
    let this = em.self_pointer();
    em.param(this);
    for (i, arg) in args.iter().enumerate() {
        match arg.as_constant() {
            Some(Constant { value: Value::Name(name), .. }) if special < 0 && i == 0 => {
                let index = em.b.name_index(name);
                em.param_int(-index);
            }
            Some(c) => em.param_int(c.as_int()),
            None => {
                let v = em.emit(arg);
                em.param(v);
            }
        }
    }
    em.call_native(NativeFn::CallLineSpecial, 2 + args.len() as u16, RegClass::Int, tail)
}

// ── Float library ────────────────────────────────────────────────────

pub(super) fn resolve_flop(ctx: &mut CompileContext, op: FlopOp, arg: Expr, span: Span) -> Resolved<Expr> {
    let arg = resolve(ctx, arg)?;
    if !arg.value_type().is_numeric() {
        return Err(ctx.error(span, "ACT-F004", "numeric value expected for parameter"));
    }
    if let Some(c) = arg.as_constant() {
        return Ok(Expr::constant(Constant::float(op.apply(c.as_float())), span));
    }
    let arg = cast::float_cast(ctx, arg)?.boxed();
    Ok(Expr::typed(ExprKind::Flop { op, arg }, span, Type::DOUBLE))
}

pub(super) fn emit_flop(em: &mut Emitter, op: FlopOp, arg: &Expr) -> ExpEmit {
    let v = em.emit(arg);
    let v = em.to_reg(v);
    v.free(&mut em.b);
    let out = ExpEmit::alloc(&mut em.b, RegClass::Float);
    em.b.emit_abc(OP_FLOP, out.reg, v.reg, op.code());
    out
}
