use crate::ast::{Expr, ExprKind, LocalId, Span};
use crate::emit::{indexed, load_op, ExpEmit, OP_ADDA_RK, OP_ADDA_RR, OP_BOUND, OP_SLL_RI};
use crate::types::{ClassId, Field, RegClass, Symbol, Type};
use crate::value::Constant;

use super::{cast, resolve, CompileContext, CompileError, Emitter, Resolved};

// ── Addressability ───────────────────────────────────────────────────

/// Ask `e` for its location instead of its value. Returns whether the
/// location may be written, or `None` when `e` has no address.
pub(super) fn request_address(e: &mut Expr) -> Option<bool> {
    let writable = match &mut e.kind {
        ExprKind::LocalVariable(_) => true,
        ExprKind::ClassMember { readonly, .. } => !*readonly,
        ExprKind::ArrayElement { array, .. } => request_address(array)?,
        ExprKind::Assign { .. } | ExprKind::IncrDecr { prefix: true, .. } => true,
        _ => return None,
    };
    e.address_requested = true;
    Some(writable)
}

/// The left side of an assignment or increment.
pub(super) fn require_writable(ctx: &CompileContext, e: &mut Expr, span: Span) -> Resolved<()> {
    match request_address(e) {
        Some(true) => Ok(()),
        _ => Err(ctx.error(span, "ACT-R005", "Expression must be a modifiable value")),
    }
}

// ── Suggestions ──────────────────────────────────────────────────────

/// Nearest candidate within edit distance 3, ignoring case.
pub(super) fn closest_match<'a>(name: &str, candidates: impl Iterator<Item = &'a String>) -> Option<String> {
    let name = name.to_ascii_lowercase();
    let mut best: Option<(String, usize)> = None;
    for candidate in candidates {
        let dist = levenshtein(&name, &candidate.to_ascii_lowercase());
        if dist <= 3 && best.as_ref().is_none_or(|(_, d)| dist < *d) {
            best = Some((candidate.clone(), dist));
        }
    }
    best.map(|(s, _)| s)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut row = vec![i; b.len() + 1];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

fn unknown_identifier(ctx: &CompileContext, name: &str, span: Span, candidates: Vec<String>) -> CompileError {
    let err = ctx.error(span, "ACT-R001", format!("Unknown identifier '{name}'"));
    match closest_match(name, candidates.iter()) {
        Some(near) => err.with_hint(format!("did you mean '{near}'?")),
        None => err,
    }
}

// ── Identifiers ──────────────────────────────────────────────────────

/// Class and global constants may only hold numbers.
fn make_constant(ctx: &CompileContext, c: &Constant, name: &str, span: Span) -> Resolved<Expr> {
    match c.ty {
        Type::Int(_) | Type::Float(_) => Ok(Expr::constant(c.clone(), span)),
        _ => Err(ctx.error(span, "ACT-T010", format!("Invalid constant '{name}'"))),
    }
}

pub(super) fn local_node(ctx: &CompileContext, id: LocalId, span: Span) -> Expr {
    Expr::typed(ExprKind::LocalVariable(id), span, ctx.local(id).ty.clone())
}

/// Checks shared by bare and qualified field access.
fn check_field(ctx: &mut CompileContext, field: &Field, table: ClassId, span: Span) -> Resolved<()> {
    if field.flags.deprecated {
        ctx.warn(span, "ACT-R003", format!("Accessing deprecated member variable {}", field.name));
    }
    if field.flags.private && Some(table) != ctx.class {
        return Err(ctx.error(span, "ACT-R002", format!("Private member {} not accessible", field.name)));
    }
    if field.flags.is_static {
        return Err(ctx.error(span, "ACT-R004", "Static members not implemented yet."));
    }
    Ok(())
}

fn member_node(object: Expr, field: &Field, span: Span) -> Expr {
    let kind = ExprKind::ClassMember { object: object.boxed(), offset: field.offset, readonly: field.flags.readonly };
    Expr::typed(kind, span, field.ty.clone())
}

/// Locals first, then the class, then globals and line specials.
pub(super) fn resolve_identifier(ctx: &mut CompileContext, name: &str, span: Span) -> Resolved<Expr> {
    if let Some(id) = ctx.find_local(name) {
        return Ok(local_node(ctx, id, span));
    }

    let symbols = ctx.symbols;
    if let Some((sym, table)) = ctx.class.and_then(|c| symbols.find_symbol(c, name)) {
        return match sym {
            Symbol::Const(c) => {
                ctx.debug_log(span, format!("Resolving name '{name}' as class constant"));
                make_constant(ctx, c, name, span)
            }
            Symbol::Field(field) => resolve_own_field(ctx, field, table, name, span),
            Symbol::Function(_) => Err(ctx.error(span, "ACT-R008", format!("Invalid member identifier '{name}'"))),
        };
    }

    if let Some(c) = symbols.global_constant(name) {
        ctx.debug_log(span, format!("Resolving name '{name}' as global constant"));
        return make_constant(ctx, c, name, span);
    }
    if let Some(special) = symbols.line_special(name) {
        ctx.debug_log(span, format!("Resolving name '{name}' as line special {}", special.number));
        return Ok(Expr::constant(Constant::int(special.number), span));
    }

    let mut candidates = ctx.visible_names();
    if let Some(class) = ctx.class {
        candidates.extend(symbols.member_names(class));
    }
    candidates.extend(symbols.global_names().iter().cloned());
    Err(unknown_identifier(ctx, name, span, candidates))
}

/// A field of the enclosing class, read through `self`.
fn resolve_own_field(ctx: &mut CompileContext, field: &Field, table: ClassId, name: &str, span: Span) -> Resolved<Expr> {
    if ctx.function.is_none() {
        return Err(ctx.error(span, "ACT-R008", "Cannot resolve class member outside a function"));
    }
    check_field(ctx, field, table, span)?;
    let Some(self_class) = ctx.self_class() else {
        return Err(ctx.error(span, "ACT-R004", "Unable to access class member from static function"));
    };
    if Some(self_class) != ctx.class {
        // a restricted self pointer must see the same symbol
        if let Some((restricted, _)) = ctx.symbols.find_symbol(self_class, name) {
            if !matches!(restricted, Symbol::Field(f) if f == field) {
                let class = ctx.class.map(|c| ctx.symbols.class_name(c)).unwrap_or_default();
                return Err(ctx.error(
                    span,
                    "ACT-R004",
                    format!("Member variable of {class} not accessible through restricted self pointer"),
                ));
            }
        }
    }
    ctx.debug_log(span, format!("Resolving name '{name}' as member variable, index {}", field.offset));
    let this = resolve_self(ctx, span)?;
    Ok(member_node(this, field, span))
}

/// `object.name`
pub(super) fn resolve_member_identifier(
    ctx: &mut CompileContext,
    object: Expr,
    name: &str,
    span: Span,
) -> Resolved<Expr> {
    let object = resolve(ctx, object)?;
    let Type::Object(class) = *object.value_type() else {
        return Err(ctx.error(span, "ACT-R008", format!("Left side of {name} is not a struct or class")));
    };

    let symbols = ctx.symbols;
    match symbols.find_symbol(class, name) {
        Some((Symbol::Const(c), _)) => {
            ctx.debug_log(span, format!("Resolving name '{name}' as class constant"));
            make_constant(ctx, c, name, span)
        }
        Some((Symbol::Field(field), table)) => {
            check_field(ctx, field, table, span)?;
            Ok(member_node(object, field, span))
        }
        Some((Symbol::Function(_), _)) => {
            Err(ctx.error(span, "ACT-R008", format!("Invalid member identifier '{name}'")))
        }
        None => Err(unknown_identifier(ctx, name, span, symbols.member_names(class))),
    }
}

pub(super) fn resolve_self(ctx: &mut CompileContext, span: Span) -> Resolved<Expr> {
    match ctx.self_class() {
        Some(class) => Ok(Expr::typed(ExprKind::SelfRef, span, Type::Object(class))),
        None => Err(ctx.error(span, "ACT-R004", "self used outside of a member function")),
    }
}

// ── Arrays ───────────────────────────────────────────────────────────

pub(super) fn resolve_array_element(ctx: &mut CompileContext, array: Expr, index: Expr, span: Span) -> Resolved<Expr> {
    let mut array = resolve(ctx, array)?;
    let mut index = resolve(ctx, index)?;

    if index.value_type().is_float() {
        let no_warn = ctx.lax;
        index = cast::int_cast(ctx, index, no_warn)?;
    }
    if index.value_type().reg_class() != RegClass::Int {
        return Err(ctx.error(span, "ACT-R006", "Array index must be integer"));
    }

    let Type::Array { elem, count } = array.value_type().clone() else {
        return Err(ctx.error(span, "ACT-R006", "'[]' can only be used with arrays."));
    };
    if let Some(c) = index.as_constant() {
        if c.as_int() as u32 >= count {
            return Err(ctx.error(span, "ACT-R006", "Array index out of bounds"));
        }
    }
    if !matches!(elem.reg_class(), RegClass::Int | RegClass::Float) {
        return Err(ctx.error(span, "ACT-R006", "Only numeric arrays are supported."));
    }
    if request_address(&mut array).is_none() {
        return Err(ctx.error(span, "ACT-R006", "Unable to dereference array."));
    }
    let kind = ExprKind::ArrayElement { array: array.boxed(), index: index.boxed() };
    Ok(Expr::typed(kind, span, *elem))
}

// ── Emission ─────────────────────────────────────────────────────────

/// Either the field's value or, when the address was requested, a pointer
/// to it.
pub(super) fn emit_class_member(em: &mut Emitter, e: &Expr, object: &Expr, offset: u32) -> ExpEmit {
    let obj = em.emit(object);
    let obj = em.to_reg(obj);

    if e.address_requested {
        if offset == 0 {
            return obj;
        }
        obj.free(&mut em.b);
        let out = ExpEmit::alloc(&mut em.b, RegClass::Pointer);
        let k = em.b.int_const(offset as i32);
        em.b.emit_abc(OP_ADDA_RK, out.reg, obj.reg, k);
        return out;
    }

    let ty = e.value_type();
    let k = em.b.int_const(offset as i32);
    let loc = ExpEmit::alloc(&mut em.b, ty.reg_class());
    em.b.emit_abc(load_op(ty), loc.reg, obj.reg, k);
    obj.free(&mut em.b);
    loc
}

pub(super) fn emit_array_element(em: &mut Emitter, e: &Expr, array: &Expr, index: &Expr) -> ExpEmit {
    let Type::Array { elem, count } = array.value_type() else {
        return em.emit(array);
    };
    let elem_size = elem.size();
    let start = em.emit(array);
    let start = em.to_reg(start);

    if let Some(c) = index.as_constant() {
        let offset = c.as_int() * elem_size as i32;
        let k = em.b.int_const(offset);
        if e.address_requested {
            if offset == 0 {
                return start;
            }
            start.free(&mut em.b);
            let out = ExpEmit::alloc(&mut em.b, RegClass::Pointer);
            em.b.emit_abc(OP_ADDA_RK, out.reg, start.reg, k);
            return out;
        }
        let dest = ExpEmit::alloc(&mut em.b, elem.reg_class());
        em.b.emit_abc(load_op(elem), dest.reg, start.reg, k);
        start.free(&mut em.b);
        return dest;
    }

    // the index is scaled in place
    let idx = em.emit(index);
    let idx = em.to_scratch(idx);
    em.b.emit_abx(OP_BOUND, idx.reg, *count as u16);
    let shift = elem_size.trailing_zeros() as u16;
    if shift > 0 {
        em.b.emit_abc(OP_SLL_RI, idx.reg, idx.reg, shift);
    }

    if e.address_requested {
        start.free(&mut em.b);
        idx.free(&mut em.b);
        let out = ExpEmit::alloc(&mut em.b, RegClass::Pointer);
        em.b.emit_abc(OP_ADDA_RR, out.reg, start.reg, idx.reg);
        return out;
    }
    let dest = ExpEmit::alloc(&mut em.b, elem.reg_class());
    em.b.emit_abc(indexed(load_op(elem)), dest.reg, start.reg, idx.reg);
    idx.free(&mut em.b);
    start.free(&mut em.b);
    dest
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::diagnostic::Severity;
    use crate::types::FunctionKind;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("health", "health"), 0);
        assert_eq!(levenshtein("healt", "health"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn closest_match_ignores_case_and_distance_limit() {
        let names = vec!["Health".to_string(), "speed".to_string()];
        assert_eq!(closest_match("HEALT", names.iter()), Some("Health".into()));
        assert_eq!(closest_match("velocityxyz", names.iter()), None);
    }

    #[test]
    fn unknown_identifier_suggests_nearby_name() {
        let err = resolve_src("healt + 1").unwrap_err();
        assert_eq!(err.code, "ACT-R001");
        assert_eq!(err.message, "Unknown identifier 'healt'");
        assert_eq!(err.hint.as_deref(), Some("did you mean 'health'?"));
    }

    #[test]
    fn class_field_reads_through_self() {
        let e = resolve_src("health").unwrap();
        let ExprKind::ClassMember { object, .. } = &e.kind else { panic!("{e:?}") };
        assert_eq!(object.kind, ExprKind::SelfRef);
        assert_eq!(e.value_type(), &Type::INT);
    }

    #[test]
    fn constants_resolve_with_debug_log() {
        let (e, diags) = resolve_with(&actor_options(), "DEFAULT_HEALTH");
        assert_eq!(e.unwrap().as_constant(), Some(&Constant::int(1000)));
        assert!(diags.iter().any(|d| d.severity == Severity::DebugLog && d.message.contains("class constant")));

        assert_eq!(constant_of("TICRATE"), Constant::int(35));
        assert_eq!(constant_of("Door_Open"), Constant::int(11));
        let err = resolve_src("TAGNAME").unwrap_err();
        assert_eq!(err.message, "Invalid constant 'TAGNAME'");
    }

    #[test]
    fn subclass_constants_need_the_subclass() {
        assert!(resolve_src("IMP_SPEED").is_err());
        let (e, _) = resolve_with(&options_for("DoomImp", FunctionKind::Action), "IMP_SPEED");
        assert_eq!(e.unwrap().as_constant(), Some(&Constant::int(8)));
    }

    #[test]
    fn field_visibility_rules() {
        let imp = options_for("DoomImp", FunctionKind::Action);
        let err = resolve_with(&imp, "internalcounter").0.unwrap_err();
        assert_eq!(err.message, "Private member internalcounter not accessible");
        assert!(resolve_src("internalcounter").is_ok());

        let err = resolve_src("defaultspeed").unwrap_err();
        assert_eq!(err.message, "Static members not implemented yet.");

        let (_, diags) = resolve_with(&actor_options(), "score");
        assert!(diags.iter().any(|d| d.message == "Accessing deprecated member variable score"));
    }

    #[test]
    fn static_functions_cannot_touch_members() {
        let opts = options_for("Actor", FunctionKind::Static);
        let err = resolve_with(&opts, "health").0.unwrap_err();
        assert_eq!(err.message, "Unable to access class member from static function");
        let err = resolve_with(&opts, "self").0.unwrap_err();
        assert_eq!(err.message, "self used outside of a member function");
    }

    #[test]
    fn member_access_through_object() {
        let e = resolve_src("target.health").unwrap();
        let ExprKind::ClassMember { object, .. } = &e.kind else { panic!("{e:?}") };
        assert!(matches!(object.kind, ExprKind::ClassMember { .. }));

        let err = resolve_src("target.nothing").unwrap_err();
        assert_eq!(err.message, "Unknown identifier 'nothing'");
        let err = resolve_src("health.x").unwrap_err();
        assert_eq!(err.message, "Left side of x is not a struct or class");
    }

    #[test]
    fn array_index_checks() {
        assert!(resolve_src("args[4]").is_ok());
        assert_eq!(resolve_src("args[5]").unwrap_err().message, "Array index out of bounds");
        assert_eq!(resolve_src("health[0]").unwrap_err().message, "'[]' can only be used with arrays.");
        assert_eq!(resolve_src("args[\"x\"]").unwrap_err().message, "Array index must be integer");
    }

    #[test]
    fn readonly_member_is_not_writable() {
        let err = resolve_src("spawnhealth = 3").unwrap_err();
        assert_eq!(err.message, "Expression must be a modifiable value");
    }

    #[test]
    fn constant_index_loads_with_offset() {
        let chunk = compile_src("return args[2];").chunk;
        let seq = ops(&chunk);
        assert!(seq.starts_with(&["adda_rk", "lw"]), "{seq:?}");
    }

    #[test]
    fn variable_index_is_bounds_checked_and_scaled() {
        let chunk = compile_src("int i = 1; return args[i];").chunk;
        let seq = ops(&chunk);
        for op in ["move", "bound", "sll_ri", "lw_r"] {
            assert!(seq.contains(&op), "missing {op} in {seq:?}");
        }
    }

    #[test]
    fn member_of_member_loads_twice() {
        let chunk = compile_src("return target.health;").chunk;
        assert!(ops(&chunk).starts_with(&["lp", "lw"]));
    }
}
