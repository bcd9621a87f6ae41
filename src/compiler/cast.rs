use crate::ast::{Expr, ExprKind, Span};
use crate::emit::{
    AddrConst, ExpEmit, CAST_F2I, CAST_F2U, CAST_I2F, CAST_N2S, CAST_S2CO, CAST_S2N, CAST_S2SO, CAST_SO2S,
    CAST_U2F, CMP_CHECK, OP_CAST, OP_EQA_K, OP_EQF_K, OP_EQ_R,
};
use crate::types::{tables::parse_color, RegClass, Type};
use crate::value::Constant;

use super::{resolve, retype, states, CompileContext, Emitter, Resolved};

// ── Wrappers used by other nodes ─────────────────────────────────────

pub(super) fn bool_cast(ctx: &mut CompileContext, x: Expr) -> Resolved<Expr> {
    let span = x.span;
    resolve(ctx, Expr::new(ExprKind::BoolCast(x.boxed()), span))
}

pub(super) fn int_cast(ctx: &mut CompileContext, x: Expr, no_warn: bool) -> Resolved<Expr> {
    let span = x.span;
    resolve(ctx, Expr::new(ExprKind::IntCast { operand: x.boxed(), no_warn }, span))
}

pub(super) fn float_cast(ctx: &mut CompileContext, x: Expr) -> Resolved<Expr> {
    let span = x.span;
    resolve(ctx, Expr::new(ExprKind::FloatCast(x.boxed()), span))
}

pub(super) fn type_cast(ctx: &mut CompileContext, x: Expr, to: Type, no_warn: bool) -> Resolved<Expr> {
    let span = x.span;
    resolve(ctx, Expr::new(ExprKind::TypeCast { operand: x.boxed(), to, no_warn }, span))
}

fn cannot_convert(ctx: &CompileContext, span: Span, from: &Type, to: &Type) -> super::CompileError {
    ctx.error(
        span,
        "ACT-T001",
        format!("Cannot convert {} to {}", ctx.describe(from), ctx.describe(to)),
    )
}

// ── Generic conversion ───────────────────────────────────────────────

/// `type(expr)` written in source.
pub(super) fn resolve_explicit(ctx: &mut CompileContext, operand: Expr, to: &str, span: Span) -> Resolved<Expr> {
    let Some(ty) = ctx.symbols.parse_type(to) else {
        return Err(ctx.error(span, "ACT-T014", format!("Unknown type '{to}'")));
    };
    resolve(ctx, Expr::new(ExprKind::TypeCast { operand: operand.boxed(), to: ty, no_warn: true }, span))
}

/// Implicit or explicit conversion to `to`. Dispatches to the specialised
/// cast for the target type, or retypes the operand when the value can be
/// reinterpreted as is.
pub(super) fn resolve_type_cast(
    ctx: &mut CompileContext,
    operand: Expr,
    to: Type,
    no_warn: bool,
    span: Span,
) -> Resolved<Expr> {
    let x = resolve(ctx, operand)?;
    let from = x.value_type().clone();

    if from == Type::Void || to == Type::Void {
        return Err(cannot_convert(ctx, span, &from, &to));
    }
    if from == to {
        return Ok(x);
    }
    if from == Type::NullPtr && to.is_pointer() {
        return Ok(retype(x, to));
    }

    match &to {
        Type::Float(_) => {
            let x = float_cast(ctx, x)?;
            Ok(retype(x, to))
        }
        Type::Int(_) => {
            let x = int_cast(ctx, x, no_warn)?;
            Ok(retype(x, to))
        }
        Type::Bool => bool_cast(ctx, x),
        Type::String => resolve(ctx, Expr::new(ExprKind::StringCast(x.boxed()), span)),
        Type::Name => resolve(ctx, Expr::new(ExprKind::NameCast(x.boxed()), span)),
        Type::Sound => resolve(ctx, Expr::new(ExprKind::SoundCast(x.boxed()), span)),
        Type::Color => resolve(ctx, Expr::new(ExprKind::ColorCast(x.boxed()), span)),
        Type::State => state_cast(ctx, x, span),
        Type::ClassPtr(target) => states::resolve_class_type_cast(ctx, x, *target, span),
        Type::Object(target) => match from {
            Type::Object(c) if ctx.symbols.is_descendant_of(c, *target) => Ok(retype(x, to)),
            _ => Err(cannot_convert(ctx, span, &from, &to)),
        },
        _ => Err(cannot_convert(ctx, span, &from, &to)),
    }
}

/// Labels become multi-name state lookups; integers are frame offsets.
fn state_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let from = x.value_type().clone();
    match (&from, x.as_constant().cloned()) {
        (Type::String | Type::Name, Some(c)) => {
            let text = c.as_text().unwrap_or_default().to_string();
            let node = ExprKind::MultiNameState { text, names: Vec::new(), tail: false };
            resolve(ctx, Expr::new(node, span))
        }
        (Type::Int(_), Some(c)) => {
            let index = c.as_int();
            if index < 0 {
                return Err(ctx.error(span, "ACT-S004", format!("Negative state index {index}")));
            }
            resolve(ctx, Expr::new(ExprKind::StateByIndex(index as u32), span))
        }
        (Type::Int(_), None) => {
            let node = ExprKind::RuntimeStateIndex { index: x.boxed(), tail: false };
            resolve(ctx, Expr::new(node, span))
        }
        _ => Err(cannot_convert(ctx, span, &from, &Type::State)),
    }
}

// ── Numeric casts ────────────────────────────────────────────────────

pub(super) fn resolve_bool_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    let ty = x.value_type();
    if *ty == Type::Bool {
        return Ok(x);
    }
    match ty.reg_class() {
        RegClass::Int | RegClass::Float | RegClass::Pointer => {
            if let Some(c) = x.as_constant() {
                return Ok(Expr::constant(Constant::bool(c.as_bool()), span));
            }
            Ok(Expr::typed(ExprKind::BoolCast(x.boxed()), span, Type::Bool))
        }
        _ => Err(ctx.error(span, "ACT-T002", "Numeric type expected")),
    }
}

/// Names live in integer registers but are not numbers: a legacy script
/// may get away with using one and receives zero instead.
fn name_as_number(ctx: &mut CompileContext, x: &Expr, span: Span) -> Resolved<()> {
    let message = match x.as_constant() {
        Some(c) => format!("Numeric type expected, got \"{}\"", c.as_text().unwrap_or_default()),
        None => "Numeric type expected, got a name".to_string(),
    };
    ctx.opt_error(span, "ACT-T013", message)
}

pub(super) fn resolve_int_cast(ctx: &mut CompileContext, x: Expr, no_warn: bool, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    let ty = x.value_type().clone();

    if ty == Type::Name {
        name_as_number(ctx, &x, span)?;
        return Ok(Expr::constant(Constant::int(0), span));
    }
    if ty.reg_class() == RegClass::Int {
        return Ok(x);
    }
    if !ty.is_float() {
        return Err(ctx.error(span, "ACT-T002", "Numeric type expected"));
    }

    if let Some(c) = x.as_constant() {
        let v = c.as_float();
        if !no_warn && v.trunc() != v {
            ctx.warn(span, "ACT-T004", format!("Truncation of floating point constant {v:.6}"));
        }
        return Ok(Expr::constant(Constant::int(v as i32), span));
    }
    if !no_warn {
        ctx.warn(span, "ACT-T004", "Truncation of floating point value");
    }
    Ok(Expr::typed(ExprKind::IntCast { operand: x.boxed(), no_warn }, span, Type::INT))
}

pub(super) fn resolve_float_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    let ty = x.value_type().clone();

    if ty.is_float() {
        return Ok(x);
    }
    if ty == Type::Name {
        name_as_number(ctx, &x, span)?;
        return Ok(Expr::constant(Constant::float(0.0), span));
    }
    if ty.reg_class() != RegClass::Int {
        return Err(ctx.error(span, "ACT-T002", "Numeric type expected"));
    }
    if let Some(c) = x.as_constant() {
        return Ok(Expr::constant(Constant::float(c.as_float()), span));
    }
    Ok(Expr::typed(ExprKind::FloatCast(x.boxed()), span, Type::DOUBLE))
}

// ── Text-like casts ──────────────────────────────────────────────────

pub(super) fn resolve_name_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    match x.value_type().clone() {
        Type::Name => Ok(x),
        Type::String => match x.as_constant() {
            Some(c) => Ok(Expr::constant(Constant::name(c.as_text().unwrap_or_default()), span)),
            None => Ok(Expr::typed(ExprKind::NameCast(x.boxed()), span, Type::Name)),
        },
        _ => Err(ctx.error(span, "ACT-T001", "Cannot convert to name")),
    }
}

pub(super) fn resolve_string_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    match x.value_type().clone() {
        Type::String => Ok(x),
        Type::Name | Type::Sound => {
            let Some(c) = x.as_constant() else {
                return Ok(Expr::typed(ExprKind::StringCast(x.boxed()), span, Type::String));
            };
            let text = match c.ty {
                Type::Sound => ctx.symbols.sound_name(c.as_int()).to_string(),
                _ => c.as_text().unwrap_or_default().to_string(),
            };
            Ok(Expr::constant(Constant::string(text), span))
        }
        _ => Err(ctx.error(span, "ACT-T001", "Cannot convert to string")),
    }
}

pub(super) fn resolve_color_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    match x.value_type().clone() {
        Type::Color => Ok(x),
        Type::Int(_) => Ok(retype(x, Type::Color)),
        Type::String => {
            let Some(c) = x.as_constant() else {
                return Ok(Expr::typed(ExprKind::ColorCast(x.boxed()), span, Type::Color));
            };
            let text = c.as_text().unwrap_or_default();
            let rgb = match parse_color(text) {
                Some(rgb) => rgb,
                None => {
                    ctx.warn(span, "ACT-T009", format!("Unknown color '{text}'"));
                    0
                }
            };
            Ok(Expr::constant(Constant::color(rgb), span))
        }
        _ => Err(ctx.error(span, "ACT-T001", "Cannot convert to color")),
    }
}

pub(super) fn resolve_sound_cast(ctx: &mut CompileContext, x: Expr, span: Span) -> Resolved<Expr> {
    let x = resolve(ctx, x)?;
    match x.value_type().clone() {
        Type::Sound => Ok(x),
        Type::Int(_) => Ok(retype(x, Type::Sound)),
        Type::String => match x.as_constant() {
            Some(c) => {
                let id = ctx.symbols.sound_id(c.as_text().unwrap_or_default());
                Ok(Expr::constant(Constant::sound(id), span))
            }
            None => Ok(Expr::typed(ExprKind::SoundCast(x.boxed()), span, Type::Sound)),
        },
        _ => Err(ctx.error(span, "ACT-T001", "Cannot convert to sound")),
    }
}

// ── Emission ─────────────────────────────────────────────────────────

/// `li to,0; eq* 1,from,zero; jmp +1; li to,1`
pub(super) fn emit_bool_cast(em: &mut Emitter, operand: &Expr) -> ExpEmit {
    let from = em.emit(operand);
    let from = em.to_reg(from);
    let to = ExpEmit::alloc(&mut em.b, RegClass::Int);
    from.free(&mut em.b);

    let (op, zero) = match from.class {
        RegClass::Float => (OP_EQF_K, em.b.float_const(0.0)),
        RegClass::Pointer => (OP_EQA_K, em.b.addr_const(AddrConst::Null)),
        // `to` holds zero by the time the compare runs
        _ => (OP_EQ_R, to.reg),
    };
    em.bool_idiom(to.reg, op, CMP_CHECK, from.reg, zero);
    to
}

/// Single `cast` instruction from one register class to another.
fn emit_conversion(em: &mut Emitter, operand: &Expr, to: RegClass, kind: u16) -> ExpEmit {
    let from = em.emit(operand);
    let from = em.to_reg(from);
    from.free(&mut em.b);
    let out = ExpEmit::alloc(&mut em.b, to);
    em.b.emit_abc(OP_CAST, out.reg, from.reg, kind);
    out
}

pub(super) fn emit_int_cast(em: &mut Emitter, operand: &Expr, ty: &Type) -> ExpEmit {
    let kind = if ty.is_unsigned() { CAST_F2U } else { CAST_F2I };
    emit_conversion(em, operand, RegClass::Int, kind)
}

pub(super) fn emit_float_cast(em: &mut Emitter, operand: &Expr) -> ExpEmit {
    let kind = if operand.value_type().is_unsigned() { CAST_U2F } else { CAST_I2F };
    emit_conversion(em, operand, RegClass::Float, kind)
}

pub(super) fn emit_name_cast(em: &mut Emitter, operand: &Expr) -> ExpEmit {
    emit_conversion(em, operand, RegClass::Int, CAST_S2N)
}

pub(super) fn emit_string_cast(em: &mut Emitter, operand: &Expr) -> ExpEmit {
    let kind = if *operand.value_type() == Type::Sound { CAST_SO2S } else { CAST_N2S };
    emit_conversion(em, operand, RegClass::String, kind)
}

pub(super) fn emit_color_cast(em: &mut Emitter, operand: &Expr) -> ExpEmit {
    emit_conversion(em, operand, RegClass::Int, CAST_S2CO)
}

pub(super) fn emit_sound_cast(em: &mut Emitter, operand: &Expr) -> ExpEmit {
    emit_conversion(em, operand, RegClass::Int, CAST_S2SO)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::ast::ExprKind;
    use crate::diagnostic::Severity;
    use crate::types::Type;
    use crate::value::Constant;

    #[test]
    fn int_to_float_folds() {
        assert_eq!(constant_of("double(3)"), Constant::float(3.0));
    }

    #[test]
    fn float_constant_truncates_with_warning() {
        let (e, diags) = resolve_with(&actor_options(), "int(2.5) + 0");
        assert_eq!(e.unwrap().as_constant(), Some(&Constant::int(2)));
        // explicit casts do not warn
        assert!(diags.iter().all(|d| d.severity != Severity::Warning));

        let (_, diags) = resolve_with(&actor_options(), "health = 2.5");
        assert!(diags.iter().any(|d| d.message.contains("Truncation of floating point constant 2.500000")));
    }

    #[test]
    fn truncating_a_float_value_warns_once() {
        let (e, diags) = resolve_with(&actor_options(), "health = speed");
        let e = e.unwrap();
        let ExprKind::Assign { right, .. } = &e.kind else { panic!("expected assignment, got {e:?}") };
        assert!(matches!(right.kind, ExprKind::IntCast { .. }));
        let warnings: Vec<_> = diags.iter().filter(|d| d.severity == Severity::Warning).collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Truncation of floating point value");
    }

    #[test]
    fn bool_cast_of_constants_uses_truthiness() {
        assert_eq!(constant_of("bool(0.25)"), Constant::bool(true));
        assert_eq!(constant_of("bool(0)"), Constant::bool(false));
        assert!(resolve_src("bool(\"text\")").is_err());
    }

    #[test]
    fn name_string_round_trip() {
        assert_eq!(constant_of("name(\"Fire\")"), Constant::name("Fire"));
        assert_eq!(constant_of("string('Fire')"), Constant::string("Fire"));
        let err = resolve_src("name(3)").unwrap_err();
        assert_eq!(err.message, "Cannot convert to name");
    }

    #[test]
    fn sound_and_color_constants() {
        let symbols = symbols();
        let id = symbols.sound_id("imp/sight");
        assert_eq!(constant_of("sound(\"imp/sight\")"), Constant::sound(id));
        assert_eq!(constant_of("string(sound(\"imp/sight\"))"), Constant::string("imp/sight"));
        assert_eq!(constant_of("color(\"ff 00 00\")"), Constant::color(0xff0000));
        assert_eq!(constant_of("color(\"Red\")"), Constant::color(0xff0000));

        let (e, diags) = resolve_with(&actor_options(), "color(\"nosuchcolor\")");
        assert_eq!(e.unwrap().as_constant(), Some(&Constant::color(0)));
        assert!(diags.iter().any(|d| d.code == Some("ACT-T009")));
    }

    #[test]
    fn name_used_as_number_is_lax_only() {
        let err = resolve_src("int('Fire')").unwrap_err();
        assert_eq!(err.code, "ACT-T013");
        let (e, diags) = resolve_with(&lax_options(), "int('Fire')");
        assert_eq!(e.unwrap().as_constant(), Some(&Constant::int(0)));
        assert!(diags.iter().any(|d| d.severity == Severity::OptError));
    }

    #[test]
    fn incompatible_conversion_names_both_types() {
        let err = resolve_src("target = 'Fire'").unwrap_err();
        assert_eq!(err.message, "Assignment between incompatible types.");
        let err = resolve_src("state(2.5)").unwrap_err();
        assert_eq!(err.message, "Cannot convert double to state");
    }

    #[test]
    fn unknown_type_in_cast() {
        let err = resolve_src("class<Ghost>(species)").unwrap_err();
        assert_eq!(err.message, "Unknown type 'class<Ghost>'");
    }

    #[test]
    fn null_converts_to_any_pointer() {
        let e = resolve_src("target = null").unwrap();
        let ExprKind::Assign { right, .. } = &e.kind else { panic!() };
        assert!(matches!(right.value_type(), Type::Object(_)));
    }

    #[test]
    fn float_cast_emits_cast_instruction() {
        let chunk = compile_src("int i = health; double d = i; return d;").chunk;
        assert!(ops(&chunk).contains(&"cast"));
    }

    #[test]
    fn bool_cast_emits_compare_idiom() {
        let chunk = compile_src("bool b = speed; return b;").chunk;
        let seq = ops(&chunk);
        let at = seq.iter().position(|op| *op == "eqf_k").unwrap();
        assert_eq!(&seq[at - 1..at + 3], &["li", "eqf_k", "jmp", "li"]);
    }
}
