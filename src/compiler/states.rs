use crate::ast::{Expr, ExprKind, Span};
use crate::emit::{AddrConst, ExpEmit, NativeFn};
use crate::types::{ClassId, FunctionKind, RegClass, StateId, Type};
use crate::value::Constant;

use super::{cast, resolve, retype, CompileContext, Emitter, Resolved};

// ── Class pointers from names ────────────────────────────────────────

/// `class<T>(x)`. Constant names are looked up now; anything else goes
/// through the runtime name table.
pub(super) fn resolve_class_type_cast(
    ctx: &mut CompileContext,
    operand: Expr,
    target: ClassId,
    span: Span,
) -> Resolved<Expr> {
    let x = resolve(ctx, operand)?;
    let to = Type::ClassPtr(target);
    let target_name = ctx.symbols.class_name(target).to_string();

    match x.value_type() {
        Type::NullPtr => return Ok(retype(x, to)),
        Type::ClassPtr(from) => {
            let from = *from;
            if ctx.symbols.is_descendant_of(from, target) {
                return Ok(retype(x, to));
            }
            return Err(ctx.error(
                span,
                "ACT-T011",
                format!(
                    "Cannot convert from {} to {target_name}: Incompatible class types",
                    ctx.symbols.class_name(from)
                ),
            ));
        }
        Type::Name | Type::String => {}
        other => {
            let other = ctx.describe(other);
            return Err(ctx.error(span, "ACT-T001", format!("Cannot convert {other} to class type")));
        }
    }

    if let Some(c) = x.as_constant() {
        let name = c.as_text().unwrap_or_default().to_string();
        let null = Constant { ty: to.clone(), ..Constant::null() };
        if name.is_empty() || name.eq_ignore_ascii_case("none") {
            return Ok(Expr::constant(null, span));
        }
        let Some(class) = ctx.symbols.class_by_name(&name) else {
            ctx.opt_error(span, "ACT-T012", format!("Unknown class name '{name}'"))?;
            return Ok(Expr::constant(null, span));
        };
        if !ctx.symbols.is_descendant_of(class, target) {
            return Err(ctx.error(
                span,
                "ACT-T011",
                format!("class '{name}' is not compatible with '{target_name}'"),
            ));
        }
        ctx.debug_log(span, format!("resolving '{name}' as class name"));
        return Ok(Expr::constant(Constant::class(class, to), span));
    }

    let x = if *x.value_type() == Type::String {
        resolve(ctx, Expr::new(ExprKind::NameCast(x.boxed()), span))?
    } else {
        x
    };
    Ok(Expr::typed(ExprKind::ClassTypeCast { operand: x.boxed(), target }, span, to))
}

/// `param name; param k(class); call NameToClass`
pub(super) fn emit_class_type_cast(em: &mut Emitter, operand: &Expr, target: ClassId) -> ExpEmit {
    let name = em.emit(operand);
    em.param(name);
    let class = em.symbols().class_name(target).to_string();
    let k = em.b.addr_const(AddrConst::Class { name: class });
    em.param(ExpEmit::konst(RegClass::Pointer, k));
    em.call_native(NativeFn::NameToClass, 2, RegClass::Pointer, false)
}

// ── State references ─────────────────────────────────────────────────

/// Frame offset into the enclosing class's own states.
pub(super) fn resolve_state_by_index(ctx: &mut CompileContext, index: u32, span: Span) -> Resolved<Expr> {
    let Some(class) = ctx.class else {
        return Err(ctx.error(span, "ACT-S004", "State index used outside a class"));
    };
    let def = ctx.symbols.class(class);
    if index >= def.num_owned_states {
        return Err(ctx.error(
            span,
            "ACT-S004",
            format!("{}: Attempt to jump to non existing state index {index}", def.name),
        ));
    }
    let state = StateId(def.first_state + index);
    Ok(Expr::constant(Constant::state(Some(state)), span))
}

/// A computed frame offset. The runtime checks that the destination is
/// owned by the same class as the calling state, and maps 0 to null.
pub(super) fn resolve_runtime_state_index(ctx: &mut CompileContext, index: Expr, tail: bool, span: Span) -> Resolved<Expr> {
    if ctx.function_kind() != Some(FunctionKind::Action) {
        return Err(ctx.error(span, "ACT-S005", "Runtime state index is only valid inside action functions"));
    }
    let index = resolve(ctx, index)?;
    if !index.value_type().is_numeric() {
        return Err(ctx.error(span, "ACT-T002", "Numeric type expected"));
    }
    let index = if index.value_type().reg_class() == RegClass::Int {
        index
    } else {
        let no_warn = ctx.lax;
        cast::int_cast(ctx, index, no_warn)?
    };
    Ok(Expr::typed(ExprKind::RuntimeStateIndex { index: index.boxed(), tail }, span, Type::State))
}

/// `param a1; param a2; param index; call HandleRuntimeState`
pub(super) fn emit_runtime_state_index(em: &mut Emitter, index: &Expr, tail: bool) -> ExpEmit {
    em.param(ExpEmit::fixed(RegClass::Pointer, 1));
    em.param(ExpEmit::fixed(RegClass::Pointer, 2));
    let v = em.emit(index);
    em.param(v);
    em.call_native(NativeFn::HandleRuntimeState, 3, RegClass::Pointer, tail)
}

/// `Scope::Label.Sub`. A known scope resolves the label now; without one the
/// label is looked up on the actor at runtime.
pub(super) fn resolve_multi_name_state(ctx: &mut CompileContext, text: &str, span: Span) -> Resolved<Expr> {
    let Some(class) = ctx.class else {
        return Err(ctx.error(span, "ACT-S001", format!("State label '{text}' used outside a class")));
    };
    let (scope_name, path) = match text.split_once("::") {
        Some((scope, path)) => (Some(scope.trim()), path),
        None => (None, text),
    };
    let names: Vec<String> = path.split('.').map(str::trim).filter(|n| !n.is_empty()).map(String::from).collect();

    let scope = match scope_name {
        None => None,
        Some(s) if s.eq_ignore_ascii_case("super") => ctx.symbols.parent_of(class),
        Some(s) => {
            let Some(scope) = ctx.symbols.class_by_name(s) else {
                return Err(ctx.error(span, "ACT-S001", format!("Unknown class '{s}' in state label")));
            };
            if !ctx.symbols.is_descendant_of(class, scope) {
                return Err(ctx.error(
                    span,
                    "ACT-S002",
                    format!("'{s}' is not an ancestor of '{}'", ctx.symbols.class_name(class)),
                ));
            }
            Some(scope)
        }
    };

    if names.is_empty() {
        return Ok(Expr::constant(Constant::state(None), span));
    }
    if let Some(scope) = scope {
        if let Some(state) = ctx.symbols.find_state(scope, &names, false) {
            return Ok(Expr::constant(Constant::state(Some(state)), span));
        }
        // legacy content jumps to labels that only exist in subclasses
        ctx.opt_error(span, "ACT-S003", "Unknown state jump destination")?;
    }
    let node = ExprKind::MultiNameState { text: text.to_string(), names, tail: false };
    Ok(Expr::typed(node, span, Type::State))
}

/// Looks the label up on the state owner (action functions) or self.
pub(super) fn emit_multi_name_state(em: &mut Emitter, names: &[String], tail: bool) -> ExpEmit {
    let owner = match em.kind() {
        FunctionKind::Action => ExpEmit::fixed(RegClass::Pointer, 1),
        _ => em.self_pointer(),
    };
    em.param(owner);
    for name in names {
        let index = em.b.name_index(name);
        em.param_int(index);
    }
    let function = if names.len() == 1 { NativeFn::FindSingleNameState } else { NativeFn::FindMultiNameState };
    em.call_native(function, names.len() as u16 + 1, RegClass::Pointer, tail)
}
