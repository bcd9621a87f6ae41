use crate::ast::{Expr, ExprKind, SizeAlignOp, Span, StepOp, UnaryOp};
use crate::emit::{
    load_const_op, load_op, move_op, store_op, ExpEmit, FLOP_NEG, OP_ADDF_RK, OP_ADD_RK, OP_AND_RK, OP_FLOP,
    OP_NEG, OP_NOT, OP_SUBF_RK, OP_SUB_RK,
};
use crate::types::{RegClass, Type};
use crate::value::Constant;

use super::access::{request_address, require_writable};
use super::{cast, resolve, retype, states, CompileContext, Emitter, Resolved};

// ── Unary ────────────────────────────────────────────────────────────

pub(super) fn resolve_unary(ctx: &mut CompileContext, op: UnaryOp, operand: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, operand)?;
    match op {
        UnaryOp::Plus => {
            if !x.value_type().is_numeric() {
                return Err(ctx.error(span, "ACT-T002", "Numeric type expected"));
            }
            Ok(x)
        }
        UnaryOp::Minus => {
            let ty = match x.value_type() {
                Type::Bool => Type::INT,
                t if t.is_numeric() => t.clone(),
                _ => return Err(ctx.error(span, "ACT-T002", "Numeric type expected")),
            };
            if let Some(c) = x.as_constant() {
                let folded = match ty {
                    Type::Float(_) => Constant { ty, ..Constant::float(-c.as_float()) },
                    _ => Constant::typed_int(ty, c.as_int().wrapping_neg()),
                };
                return Ok(Expr::constant(folded, span));
            }
            Ok(Expr::typed(ExprKind::Unary { op, operand: x.boxed() }, span, ty))
        }
        UnaryOp::BitNot => {
            let x = if ctx.lax && x.value_type().is_float() { cast::int_cast(ctx, x, true)? } else { x };
            let ty = x.value_type();
            if ty.reg_class() != RegClass::Int || !ty.is_numeric() {
                return Err(ctx.error(span, "ACT-T003", "Integer type expected"));
            }
            let ty = if ty.is_unsigned() { Type::UINT } else { Type::INT };
            if let Some(c) = x.as_constant() {
                return Ok(Expr::constant(Constant::typed_int(ty, !c.as_int()), span));
            }
            Ok(Expr::typed(ExprKind::Unary { op, operand: x.boxed() }, span, ty))
        }
        UnaryOp::BoolNot => {
            let x = cast::bool_cast(ctx, x)?;
            if let Some(c) = x.as_constant() {
                return Ok(Expr::constant(Constant::bool(!c.as_bool()), span));
            }
            Ok(Expr::typed(ExprKind::Unary { op, operand: x.boxed() }, span, Type::Bool))
        }
    }
}

/// Operates in place on a scratch copy of the operand.
pub(super) fn emit_unary(em: &mut Emitter, op: UnaryOp, operand: &Expr) -> ExpEmit {
    let v = em.emit(operand);
    if op == UnaryOp::Plus {
        return v;
    }
    let v = em.to_scratch(v);
    match op {
        UnaryOp::Minus if v.class == RegClass::Float => {
            em.b.emit_abc(OP_FLOP, v.reg, v.reg, FLOP_NEG);
        }
        UnaryOp::Minus => {
            em.b.emit_abc(OP_NEG, v.reg, v.reg, 0);
        }
        UnaryOp::BitNot => {
            em.b.emit_abc(OP_NOT, v.reg, v.reg, 0);
        }
        UnaryOp::BoolNot => {
            let one = em.b.int_const(1);
            em.b.emit_abc(OP_NOT, v.reg, v.reg, 0);
            em.b.emit_abc(OP_AND_RK, v.reg, v.reg, one);
        }
        UnaryOp::Plus => {}
    }
    v
}

// ── sizeof / alignof ─────────────────────────────────────────────────

pub(super) fn resolve_size_align(ctx: &mut CompileContext, op: SizeAlignOp, operand: Expr, span: Span) -> Resolved<Expr> {
    let mut x = resolve(ctx, operand)?;
    let what = match op {
        SizeAlignOp::SizeOf => "size",
        SizeAlignOp::AlignOf => "alignment",
    };
    if x.is_constant() {
        return Err(ctx.error(span, "ACT-R009", format!("cannot determine {what} of a constant")));
    }
    if request_address(&mut x).is_none() {
        return Err(ctx.error(span, "ACT-R005", format!("Operand must be addressable to determine {what}")));
    }
    let ty = x.value_type();
    let v = match op {
        SizeAlignOp::SizeOf => ty.size(),
        SizeAlignOp::AlignOf => ty.align(),
    };
    Ok(Expr::constant(Constant::int(v as i32), span))
}

// ── ++ / -- ──────────────────────────────────────────────────────────

pub(super) fn resolve_incr_decr(
    ctx: &mut CompileContext,
    op: StepOp,
    prefix: bool,
    operand: Expr,
    span: Span,
) -> Resolved<Expr> {
    let mut x = resolve(ctx, operand)?;
    let ty = x.value_type().clone();
    let symbol = match op {
        StepOp::Incr => "++",
        StepOp::Decr => "--",
    };
    if !ty.is_numeric() {
        return Err(ctx.error(span, "ACT-T002", "Numeric type expected"));
    }
    if ty == Type::Bool {
        return Err(ctx.error(span, "ACT-T007", format!("{symbol} is not allowed on type bool")));
    }
    require_writable(ctx, &mut x, span)?;
    Ok(Expr::typed(ExprKind::IncrDecr { op, prefix, operand: x.boxed() }, span, ty))
}

/// Opcode and constant operand that step a value of `class` by one.
fn step(em: &mut Emitter, op: StepOp, class: RegClass) -> (u8, u16) {
    match (class, op) {
        (RegClass::Float, StepOp::Incr) => (OP_ADDF_RK, em.b.float_const(1.0)),
        (RegClass::Float, StepOp::Decr) => (OP_SUBF_RK, em.b.float_const(1.0)),
        (_, StepOp::Incr) => (OP_ADD_RK, em.b.int_const(1)),
        (_, StepOp::Decr) => (OP_SUB_RK, em.b.int_const(1)),
    }
}

pub(super) fn emit_incr_decr(em: &mut Emitter, e: &Expr, op: StepOp, prefix: bool, operand: &Expr) -> ExpEmit {
    let ty = operand.value_type();
    let class = ty.reg_class();
    let pointer = em.emit(operand);
    let (instr, one) = step(em, op, class);
    let zero = em.b.int_const(0);

    if pointer.target {
        if prefix {
            em.b.emit_abc(instr, pointer.reg, pointer.reg, one);
            return if e.address_requested { pointer } else { ExpEmit { target: false, ..pointer } };
        }
        // the old value survives in a copy, the local is stepped in place
        let old = ExpEmit::alloc(&mut em.b, class);
        em.b.emit_abc(move_op(class), old.reg, pointer.reg, 0);
        em.b.emit_abc(instr, pointer.reg, pointer.reg, one);
        return old;
    }

    let value = ExpEmit::alloc(&mut em.b, class);
    em.b.emit_abc(load_op(ty), value.reg, pointer.reg, zero);
    if prefix {
        em.b.emit_abc(instr, value.reg, value.reg, one);
        em.b.emit_abc(store_op(ty), pointer.reg, value.reg, zero);
        if e.address_requested {
            value.free(&mut em.b);
            return pointer;
        }
        pointer.free(&mut em.b);
        return value;
    }
    let stepped = ExpEmit::alloc(&mut em.b, class);
    em.b.emit_abc(instr, stepped.reg, value.reg, one);
    em.b.emit_abc(store_op(ty), pointer.reg, stepped.reg, zero);
    pointer.free(&mut em.b);
    stepped.free(&mut em.b);
    value
}

// ── Assignment ───────────────────────────────────────────────────────

pub(super) fn resolve_assign(ctx: &mut CompileContext, base: Expr, right: Expr, span: Span) -> Resolved<Expr> {
    let mut base = resolve(ctx, base)?;
    let ty = base.value_type().clone();

    ctx.push_assign_base(ty.clone());
    let right = resolve(ctx, right);
    ctx.pop_assign_base();
    let mut right = right?;
    let rty = right.value_type().clone();

    if ty.is_numeric() && rty.is_numeric() {
        if rty != ty {
            right = match &ty {
                Type::Bool => cast::bool_cast(ctx, right)?,
                Type::Float(_) => retype(cast::float_cast(ctx, right)?, ty.clone()),
                _ => {
                    let no_warn = ctx.lax;
                    retype(cast::int_cast(ctx, right, no_warn)?, ty.clone())
                }
            };
        }
    } else if ty == rty {
        match ty {
            Type::Array { .. } => return Err(ctx.error(span, "ACT-T006", "Cannot assign arrays")),
            Type::Struct(_) => return Err(ctx.error(span, "ACT-T006", "Struct assignment not implemented yet")),
            _ => {}
        }
    } else if ty.is_pointer() && rty == Type::NullPtr {
        right = retype(right, ty.clone());
    } else if let Type::ClassPtr(target) = ty {
        right = states::resolve_class_type_cast(ctx, right, target, span)?;
    } else if ty == Type::String && matches!(rty, Type::Name | Type::Sound) {
        right = resolve(ctx, Expr::new(ExprKind::StringCast(right.boxed()), span))?;
    } else if ty == Type::Name && rty == Type::String {
        right = resolve(ctx, Expr::new(ExprKind::NameCast(right.boxed()), span))?;
    } else {
        return Err(ctx.error(span, "ACT-T001", "Assignment between incompatible types."));
    }

    require_writable(ctx, &mut base, span)?;
    Ok(Expr::typed(ExprKind::Assign { base: base.boxed(), right: right.boxed() }, span, ty))
}

/// Stores the right side through the base's address. The value of the
/// whole expression is the stored value, or the address when requested.
pub(super) fn emit_assign(em: &mut Emitter, e: &Expr, base: &Expr, right: &Expr) -> ExpEmit {
    let ty = base.value_type();
    let pointer = em.emit(base);

    em.assign_addresses.push(pointer);
    let result = em.emit(right);
    em.assign_addresses.pop();

    let result = if pointer.target {
        if result.konst {
            em.b.emit_abx(load_const_op(result.class), pointer.reg, result.reg);
        } else {
            em.b.emit_abc(move_op(result.class), pointer.reg, result.reg, 0);
        }
        result
    } else {
        let value = em.to_reg(result);
        let zero = em.b.int_const(0);
        em.b.emit_abc(store_op(ty), pointer.reg, value.reg, zero);
        value
    };

    if e.address_requested {
        result.free(&mut em.b);
        return pointer;
    }
    pointer.free(&mut em.b);
    result
}

/// The left side of the enclosing compound assignment, read once more.
pub(super) fn resolve_assign_self(ctx: &mut CompileContext, span: Span) -> Resolved<Expr> {
    match ctx.assign_base() {
        Some(ty) => Ok(Expr::typed(ExprKind::AssignSelf, span, ty.clone())),
        None => Err(ctx.error(span, "ACT-R005", "Compound assignment without a left side")),
    }
}

pub(super) fn emit_assign_self(em: &mut Emitter, e: &Expr) -> ExpEmit {
    let Some(pointer) = em.assign_addresses.last().copied() else {
        return em.unresolved("compound assignment");
    };
    if pointer.target {
        return ExpEmit { target: false, fixed: true, ..pointer };
    }
    let ty = e.value_type();
    let out = ExpEmit::alloc(&mut em.b, ty.reg_class());
    let zero = em.b.int_const(0);
    em.b.emit_abc(load_op(ty), out.reg, pointer.reg, zero);
    out
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::diagnostic::Severity;

    #[test]
    fn negation_folds_by_type() {
        assert_eq!(constant_of("-5"), Constant::int(-5));
        assert_eq!(constant_of("-2.5"), Constant::float(-2.5));
        assert_eq!(constant_of("-(1 - 4)"), Constant::int(3));
        assert_eq!(resolve_src("-\"x\"").unwrap_err().message, "Numeric type expected");
    }

    #[test]
    fn bitwise_not_wants_integers() {
        assert_eq!(constant_of("~5"), Constant::int(-6));
        assert_eq!(resolve_src("~1.5").unwrap_err().message, "Integer type expected");
        let (e, _) = resolve_with(&lax_options(), "~1.5");
        assert_eq!(e.unwrap().as_constant(), Some(&Constant::int(-2)));
    }

    #[test]
    fn bitwise_not_keeps_unsigned() {
        assert_eq!(constant_of("~4294967295"), Constant::uint(0));
        assert_eq!(constant_of("~3000000000"), Constant::uint(!3_000_000_000u32));
        assert_eq!(resolve_src("~flags").unwrap().ty, Some(Type::UINT));
        assert_eq!(resolve_src("~health").unwrap().ty, Some(Type::INT));
    }

    #[test]
    fn boolean_not_casts_first() {
        assert_eq!(constant_of("!0"), Constant::bool(true));
        assert_eq!(constant_of("!2.5"), Constant::bool(false));
        let chunk = compile_src("bool b = !health;").chunk;
        let seq = ops(&chunk);
        let not = seq.iter().position(|op| *op == "not").unwrap();
        assert_eq!(seq[not + 1], "and_rk");
    }

    #[test]
    fn minus_on_a_local_does_not_clobber_it() {
        let chunk = compile_src("int i = 3; return -i;").chunk;
        let seq = ops(&chunk);
        let neg = seq.iter().position(|op| *op == "neg").unwrap();
        assert_eq!(seq[neg - 1], "move");
    }

    #[test]
    fn sizeof_and_alignof() {
        assert_eq!(constant_of("sizeof(health)"), Constant::int(4));
        assert_eq!(constant_of("sizeof(args)"), Constant::int(20));
        assert_eq!(constant_of("alignof(speed)"), Constant::int(8));
        assert_eq!(constant_of("sizeof(frame)"), Constant::int(1));
        assert_eq!(resolve_src("sizeof(3)").unwrap_err().message, "cannot determine size of a constant");
        assert_eq!(
            resolve_src("alignof(health + 1)").unwrap_err().message,
            "Operand must be addressable to determine alignment"
        );
    }

    #[test]
    fn increment_rejects_bool_constants_and_readonly() {
        assert_eq!(compile_error("friendly++;"), "++ is not allowed on type bool");
        assert_eq!(compile_error("--friendly;"), "-- is not allowed on type bool");
        assert_eq!(compile_error("spawnhealth++;"), "Expression must be a modifiable value");
        assert_eq!(compile_error("tag++;"), "Numeric type expected");
    }

    #[test]
    fn member_increment_loads_steps_and_stores() {
        let chunk = compile_src("tid++;").chunk;
        let seq = ops(&chunk);
        for op in ["adda_rk", "lw", "add_rk", "sw"] {
            assert!(seq.contains(&op), "missing {op} in {seq:?}");
        }
        let chunk = compile_src("--speed;").chunk;
        assert!(ops(&chunk).contains(&"subf_rk"));
    }

    #[test]
    fn post_increment_of_local_keeps_old_value() {
        let chunk = compile_src("int i = 0; int j = i++; return j;").chunk;
        let seq = ops(&chunk);
        let add = seq.iter().position(|op| *op == "add_rk").unwrap();
        assert_eq!(seq[add - 1], "move");
    }

    #[test]
    fn pre_increment_of_local_is_in_place() {
        let chunk = compile_src("int i = 0; return ++i;").chunk;
        assert_eq!(ops(&chunk), vec!["li", "add_rk", "ret"]);
    }

    #[test]
    fn assignment_coerces_numbers() {
        let (e, diags) = resolve_with(&actor_options(), "health = 2.5");
        let e = e.unwrap();
        let ExprKind::Assign { right, .. } = &e.kind else { panic!("{e:?}") };
        assert_eq!(right.as_constant(), Some(&Constant::int(2)));
        assert!(diags.iter().any(|d| d.severity == Severity::Warning));

        let e = resolve_src("speed = 3").unwrap();
        let ExprKind::Assign { right, .. } = &e.kind else { panic!("{e:?}") };
        assert_eq!(right.value_type(), &Type::DOUBLE);
    }

    #[test]
    fn assignment_type_rules() {
        assert_eq!(resolve_src("args = args").unwrap_err().message, "Cannot assign arrays");
        assert_eq!(resolve_src("health = \"x\"").unwrap_err().message, "Assignment between incompatible types.");
        assert!(resolve_src("target = null").is_ok());
        assert!(resolve_src("curstate = null").is_ok());

        let e = resolve_src("species = \"Imp\"").unwrap();
        let ExprKind::Assign { right, .. } = &e.kind else { panic!("{e:?}") };
        assert_eq!(right.as_constant(), Some(&Constant::name("Imp")));

        let e = resolve_src("tag = species").unwrap();
        let ExprKind::Assign { right, .. } = &e.kind else { panic!("{e:?}") };
        assert!(matches!(right.kind, ExprKind::StringCast(_)));
    }

    #[test]
    fn compound_assignment_reads_the_address_once() {
        let chunk = compile_src("tid += 2;").chunk;
        assert_eq!(ops(&chunk), vec!["adda_rk", "lw", "add_rk", "sw", "ret"]);
    }

    #[test]
    fn first_field_needs_no_address_arithmetic() {
        let chunk = compile_src("health += 2;").chunk;
        assert_eq!(ops(&chunk), vec!["lw", "add_rk", "sw", "ret"]);
        let chunk = compile_src("health++;").chunk;
        assert!(!ops(&chunk).contains(&"adda_rk"));
    }

    #[test]
    fn assignment_to_local_moves() {
        let chunk = compile_src("int i; i = health; return i;").chunk;
        assert!(ops(&chunk).contains(&"move"));
    }
}
