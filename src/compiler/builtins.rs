use crate::ast::{Expr, ExprKind, MinMaxOp, Span};
use crate::emit::{
    load_const_op, move_op, AddrConst, ExpEmit, NativeFn, FLOP_ABS, OP_ABS, OP_ATAN2, OP_FLOP, OP_IJMP, OP_JMP,
    OP_LEF_RR, OP_LE_RR, OP_LTF_RR, OP_LT_RR,
};
use crate::types::{RegClass, Type};
use crate::value::Constant;

use super::{cast, resolve, CompileContext, Emitter, Resolved};

/// Integer arguments of builtins are narrowed silently in legacy content.
fn int_arg(ctx: &mut CompileContext, x: Expr) -> Resolved<Expr> {
    let no_warn = ctx.lax;
    cast::int_cast(ctx, x, no_warn)
}

fn rng_param(em: &mut Emitter, rng: &str) {
    let k = em.b.addr_const(AddrConst::Rng { name: rng.to_string() });
    em.param(ExpEmit::konst(RegClass::Pointer, k));
}

// ── Random numbers ───────────────────────────────────────────────────

pub(super) fn resolve_random(
    ctx: &mut CompileContext,
    rng: String,
    min: Expr,
    max: Expr,
    tail: bool,
    float: bool,
    span: Span,
) -> Resolved<Expr> {
    if float {
        let min = cast::float_cast(ctx, min)?.boxed();
        let max = cast::float_cast(ctx, max)?.boxed();
        return Ok(Expr::typed(ExprKind::FRandom { rng, min, max, tail }, span, Type::DOUBLE));
    }
    let min = int_arg(ctx, min)?.boxed();
    let max = int_arg(ctx, max)?.boxed();
    Ok(Expr::typed(ExprKind::Random { rng, min, max, tail }, span, Type::INT))
}

pub(super) fn emit_random(em: &mut Emitter, rng: &str, min: &Expr, max: &Expr, tail: bool, function: NativeFn) -> ExpEmit {
    rng_param(em, rng);
    let lo = em.emit(min);
    em.param(lo);
    let hi = em.emit(max);
    em.param(hi);
    let class = if function == NativeFn::FRandom { RegClass::Float } else { RegClass::Int };
    em.call_native(function, 3, class, tail)
}

pub(super) fn resolve_random2(ctx: &mut CompileContext, rng: String, mask: Expr, tail: bool, span: Span) -> Resolved<Expr> {
    let mask = int_arg(ctx, mask)?.boxed();
    Ok(Expr::typed(ExprKind::Random2 { rng, mask, tail }, span, Type::INT))
}

pub(super) fn emit_random2(em: &mut Emitter, rng: &str, mask: &Expr, tail: bool) -> ExpEmit {
    rng_param(em, rng);
    let m = em.emit(mask);
    em.param(m);
    em.call_native(NativeFn::Random2, 2, RegClass::Int, tail)
}

pub(super) fn resolve_random_pick(
    ctx: &mut CompileContext,
    rng: String,
    choices: Vec<Expr>,
    float: bool,
    span: Span,
) -> Resolved<Expr> {
    let choices = choices
        .into_iter()
        .map(|c| if float { cast::float_cast(ctx, c) } else { int_arg(ctx, c) })
        .collect::<Resolved<Vec<_>>>()?;
    let ty = if float { Type::DOUBLE } else { Type::INT };
    Ok(Expr::typed(ExprKind::RandomPick { rng, choices, float }, span, ty))
}

/// Draws an index, then dispatches through a jump table with one entry
/// per choice.
pub(super) fn emit_random_pick(em: &mut Emitter, rng: &str, choices: &[Expr], float: bool) -> ExpEmit {
    let class = if float { RegClass::Float } else { RegClass::Int };

    rng_param(em, rng);
    em.param_int(0);
    em.param_int(choices.len() as i32 - 1);
    let index = em.call_native(NativeFn::Random, 3, RegClass::Int, false);
    em.b.emit_abx(OP_IJMP, index.reg, 0);
    index.free(&mut em.b);

    let table: Vec<usize> = choices.iter().map(|_| em.b.emit_jmp_placeholder()).collect();
    let out = ExpEmit::alloc(&mut em.b, class);
    let mut finishes = Vec::with_capacity(choices.len());
    for (i, (choice, entry)) in choices.iter().zip(table).enumerate() {
        em.b.patch_jump(entry);
        let v = em.emit(choice);
        if v.konst {
            em.b.emit_abx(load_const_op(class), out.reg, v.reg);
        } else {
            em.b.emit_abc(move_op(class), out.reg, v.reg, 0);
            v.free(&mut em.b);
        }
        if i + 1 < choices.len() {
            finishes.push(em.b.emit_jmp_placeholder());
        }
    }
    for jump in finishes {
        em.b.patch_jump(jump);
    }
    out
}

// ── min / max ────────────────────────────────────────────────────────

fn better(op: MinMaxOp, float: bool, candidate: &Constant, best: &Constant) -> bool {
    let ord = if float {
        candidate.as_float().partial_cmp(&best.as_float())
    } else {
        Some(candidate.as_int().cmp(&best.as_int()))
    };
    match op {
        MinMaxOp::Min => ord.is_some_and(|o| o.is_lt()),
        MinMaxOp::Max => ord.is_some_and(|o| o.is_gt()),
    }
}

/// Constant arguments collapse into the slot of the first one.
pub(super) fn resolve_min_max(ctx: &mut CompileContext, op: MinMaxOp, args: Vec<Expr>, span: Span) -> Resolved<Expr> {
    let mut resolved = Vec::with_capacity(args.len());
    for arg in args {
        let arg = resolve(ctx, arg)?;
        let ty = arg.value_type();
        if !ty.is_numeric() {
            return Err(ctx.error(arg.span, "ACT-F004", "Arguments must be of type int or float"));
        }
        resolved.push(arg);
    }

    let float = resolved.iter().any(|a| a.value_type().is_float());
    let ty = if float { Type::DOUBLE } else { Type::INT };
    if float {
        resolved = resolved.into_iter().map(|a| cast::float_cast(ctx, a)).collect::<Resolved<Vec<_>>>()?;
    }

    let mut kept = Vec::with_capacity(resolved.len());
    let mut folded: Option<(usize, Constant)> = None;
    for arg in resolved {
        match (arg.as_constant(), &mut folded) {
            (Some(c), None) => folded = Some((kept.len(), c.clone())),
            (Some(c), Some((_, best))) => {
                if better(op, float, c, best) {
                    *best = c.clone();
                }
            }
            (None, _) => kept.push(arg),
        }
    }
    if let Some((slot, c)) = folded {
        let c = if float { c } else { Constant::int(c.as_int()) };
        kept.insert(slot, Expr::constant(c, span));
    }
    if kept.len() == 1 {
        if let Some(only) = kept.pop() {
            return Ok(only);
        }
    }
    Ok(Expr::typed(ExprKind::MinMax { op, args: kept }, span, ty))
}

/// `best` starts as the first argument and is replaced by every argument
/// that beats it.
pub(super) fn emit_min_max(em: &mut Emitter, e: &Expr, op: MinMaxOp, args: &[Expr]) -> ExpEmit {
    let class = e.value_type().reg_class();
    let float = class == RegClass::Float;
    let (cmp, check) = match (op, float) {
        (MinMaxOp::Min, false) => (OP_LE_RR, 1),
        (MinMaxOp::Min, true) => (OP_LEF_RR, 1),
        (MinMaxOp::Max, false) => (OP_LT_RR, 0),
        (MinMaxOp::Max, true) => (OP_LTF_RR, 0),
    };

    let Some((first, rest)) = args.split_first() else {
        return ExpEmit::nil();
    };
    let best = em.emit(first);
    let best = em.to_scratch(best);
    for arg in rest {
        let v = em.emit(arg);
        em.b.emit_abc(cmp + u8::from(v.konst), check, best.reg, v.reg);
        em.b.emit_asbx(OP_JMP, 0, 1);
        if v.konst {
            em.b.emit_abx(load_const_op(class), best.reg, v.reg);
        } else {
            em.b.emit_abc(move_op(class), best.reg, v.reg, 0);
            v.free(&mut em.b);
        }
    }
    best
}

// ── abs / atan2 ──────────────────────────────────────────────────────

pub(super) fn resolve_abs(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    let ty = match x.value_type() {
        Type::Bool => Type::INT,
        t if t.is_numeric() => t.clone(),
        _ => return Err(ctx.error(span, "ACT-T002", "Numeric type expected")),
    };
    if let Some(c) = x.as_constant() {
        let folded = match ty {
            Type::Float(_) => Constant { ty, ..Constant::float(c.as_float().abs()) },
            _ => Constant::typed_int(ty, c.as_int().wrapping_abs()),
        };
        return Ok(Expr::constant(folded, span));
    }
    Ok(Expr::typed(ExprKind::Abs(x.boxed()), span, ty))
}

pub(super) fn emit_abs(em: &mut Emitter, x: &Expr) -> ExpEmit {
    let v = em.emit(x);
    let v = em.to_reg(v);
    v.free(&mut em.b);
    let out = ExpEmit::alloc(&mut em.b, v.class);
    if v.class == RegClass::Float {
        em.b.emit_abc(OP_FLOP, out.reg, v.reg, FLOP_ABS);
    } else {
        em.b.emit_abc(OP_ABS, out.reg, v.reg, 0);
    }
    out
}

/// Angle of the vector (x, y) in degrees.
pub(super) fn resolve_atan2(ctx: &mut CompileContext, y: Expr, x: Expr, span: Span) -> Resolved<Expr> {
    let y = resolve(ctx, y)?;
    let x = resolve(ctx, x)?;
    if !y.value_type().is_numeric() || !x.value_type().is_numeric() {
        return Err(ctx.error(span, "ACT-F004", "numeric value expected for parameter"));
    }
    if let (Some(cy), Some(cx)) = (y.as_constant(), x.as_constant()) {
        let angle = cy.as_float().atan2(cx.as_float()).to_degrees();
        return Ok(Expr::constant(Constant::float(angle), span));
    }
    let y = cast::float_cast(ctx, y)?.boxed();
    let x = cast::float_cast(ctx, x)?.boxed();
    Ok(Expr::typed(ExprKind::ATan2 { y, x }, span, Type::DOUBLE))
}

pub(super) fn emit_atan2(em: &mut Emitter, y: &Expr, x: &Expr) -> ExpEmit {
    let yv = em.emit(y);
    let yv = em.to_reg(yv);
    let xv = em.emit(x);
    let xv = em.to_reg(xv);
    yv.free(&mut em.b);
    xv.free(&mut em.b);
    let out = ExpEmit::alloc(&mut em.b, RegClass::Float);
    em.b.emit_abc(OP_ATAN2, out.reg, yv.reg, xv.reg);
    out
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn approx(c: Constant, want: f64) -> bool {
        (c.as_float() - want).abs() < 1e-9
    }

    #[test]
    fn random_types_follow_the_flavour() {
        assert_eq!(resolve_src("random(1, 6)").unwrap().value_type(), &Type::INT);
        assert_eq!(resolve_src("frandom(0, 1)").unwrap().value_type(), &Type::DOUBLE);
        assert_eq!(resolve_src("random2()").unwrap().value_type(), &Type::INT);
        assert_eq!(resolve_src("random(\"a\", 2)").unwrap_err().message, "Numeric type expected");
    }

    #[test]
    fn named_rng_lands_in_the_address_pool() {
        let chunk = compile_src("int x = random[Boom](1, 6);").chunk;
        assert!(chunk.addr_consts.contains(&AddrConst::Rng { name: "Boom".into() }));
        let seq = ops(&chunk);
        let call = seq.iter().position(|op| *op == "call_k").unwrap();
        assert_eq!(seq[call + 1], "result");
        assert_eq!(&seq[call - 3..call], &["param", "param", "param"]);
    }

    #[test]
    fn returned_random_is_a_tail_call() {
        let chunk = compile_src("return random(1, 6);").chunk;
        assert_eq!(ops(&chunk), vec!["param", "param", "param", "tail_k"]);
    }

    #[test]
    fn random_pick_builds_a_jump_table() {
        let chunk = compile_src("int x = randompick(1, 2, 3);").chunk;
        let seq = ops(&chunk);
        let ijmp = seq.iter().position(|op| *op == "ijmp").unwrap();
        assert_eq!(&seq[ijmp + 1..ijmp + 4], &["jmp", "jmp", "jmp"]);
        assert_eq!(resolve_src("frandompick(1, 2.5)").unwrap().value_type(), &Type::DOUBLE);
    }

    #[test]
    fn min_max_fold_constants() {
        assert_eq!(constant_of("min(3, 1, 2)"), Constant::int(1));
        assert_eq!(constant_of("max(1, 2.5)"), Constant::float(2.5));
        assert_eq!(constant_of("clamp(15, 0, 10)"), Constant::int(10));
        assert_eq!(constant_of("clamp(-3, 0, 10)"), Constant::int(0));

        let e = resolve_src("min(health, 3, 1)").unwrap();
        let ExprKind::MinMax { args, .. } = &e.kind else { panic!("{e:?}") };
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].as_constant(), Some(&Constant::int(1)));

        let err = resolve_src("min(health, \"x\")").unwrap_err();
        assert_eq!(err.message, "Arguments must be of type int or float");
    }

    #[test]
    fn min_emits_compare_and_conditional_move() {
        let chunk = compile_src("return min(health, tid);").chunk;
        let seq = ops(&chunk);
        let cmp = seq.iter().position(|op| *op == "le_rr").unwrap();
        assert_eq!(&seq[cmp + 1..cmp + 3], &["jmp", "move"]);
        let chunk = compile_src("return max(speed, 1.0);").chunk;
        assert!(ops(&chunk).contains(&"ltf_rk"));
    }

    #[test]
    fn abs_and_atan2_fold() {
        assert_eq!(constant_of("abs(-3)"), Constant::int(3));
        assert_eq!(constant_of("abs(-2.5)"), Constant::float(2.5));
        assert_eq!(resolve_src("abs(\"x\")").unwrap_err().message, "Numeric type expected");
        assert!(approx(constant_of("atan2(1, 1)"), 45.0));
        assert!(approx(constant_of("atan2(1, 0)"), 90.0));
        assert!(approx(constant_of("vectorangle(0, 1)"), 90.0));
        assert_eq!(resolve_src("atan2(tag, 1)").unwrap_err().message, "numeric value expected for parameter");
    }

    #[test]
    fn abs_and_atan2_emit() {
        assert!(ops(&compile_src("return abs(speed);").chunk).contains(&"flop"));
        assert!(ops(&compile_src("return abs(health);").chunk).contains(&"abs"));
        let seq = ops(&compile_src("return atan2(speed, 1);").chunk);
        assert!(seq.contains(&"lkf") && seq.contains(&"atan2"), "{seq:?}");
    }
}
