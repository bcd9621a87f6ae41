use crate::ast::{Expr, ExprKind, JumpKind, LocalId, Span, Stmt, StmtKind};
use crate::diagnostic::Diagnostic;
use crate::emit::{load_const_op, EmitError, OP_EQ_K, OP_RET, OP_TEST, REGT_NIL, RET_FINAL};
use crate::types::{RegClass, Type};
use crate::value::{Constant, Value};

use super::{cast, resolve, retype, CompileContext, Emitter, LoopJumps, Resolved};

// ── Resolution ───────────────────────────────────────────────────────

pub(super) fn resolve_stmt(ctx: &mut CompileContext, s: Stmt) -> Resolved<Stmt> {
    let span = s.span;
    match s.kind {
        StmtKind::Nop => Ok(Stmt::nop(span)),
        StmtKind::Expr(e) => Ok(Stmt::new(StmtKind::Expr(resolve(ctx, e)?), span)),
        StmtKind::Sequence(body) => {
            let body = body.into_iter().map(|s| resolve_stmt(ctx, s)).collect::<Resolved<Vec<_>>>()?;
            Ok(Stmt::new(StmtKind::Sequence(body), span))
        }
        StmtKind::Compound { body, .. } => Ok(resolve_compound(ctx, body, span)),
        StmtKind::If { cond, then_branch, else_branch } => resolve_if(ctx, cond, then_branch, else_branch, span),
        StmtKind::While { cond, body } => resolve_while(ctx, cond, *body, span),
        StmtKind::DoWhile { body, cond } => resolve_do_while(ctx, *body, cond, span),
        StmtKind::For { init, cond, step, body } => {
            resolve_for(ctx, init.map(|s| *s), cond, step.map(|s| *s), *body, span)
        }
        StmtKind::Jump(kind) => {
            if !ctx.note_jump() {
                return Err(ctx.error(span, "ACT-C001", format!("'{}' outside of a loop", kind.keyword())));
            }
            Ok(Stmt::new(StmtKind::Jump(kind), span))
        }
        StmtKind::Return(value) => resolve_return(ctx, value, span),
        StmtKind::LocalDecl { name, ty, init, .. } => resolve_local_decl(ctx, name, ty, init, span),
    }
}

/// A failing statement is reported and dropped so the rest of the block
/// still gets checked.
fn resolve_compound(ctx: &mut CompileContext, body: Vec<Stmt>, span: Span) -> Stmt {
    ctx.push_block();
    let mut resolved = Vec::with_capacity(body.len());
    for s in body {
        match resolve_stmt(ctx, s) {
            Ok(s) => resolved.push(s),
            Err(e) => ctx.diagnostics.push(Diagnostic::from(&e)),
        }
    }
    let locals = ctx.pop_block();
    Stmt::new(StmtKind::Compound { body: resolved, locals }, span)
}

fn resolve_branch(ctx: &mut CompileContext, s: Option<Box<Stmt>>) -> Resolved<Option<Box<Stmt>>> {
    s.map(|s| resolve_stmt(ctx, *s).map(Box::new)).transpose()
}

fn resolve_if(
    ctx: &mut CompileContext,
    cond: Expr,
    then_branch: Option<Box<Stmt>>,
    else_branch: Option<Box<Stmt>>,
    span: Span,
) -> Resolved<Stmt> {
    if then_branch.is_none() && else_branch.is_none() {
        return Ok(Stmt::nop(span));
    }
    let cond = cast::bool_cast(ctx, cond)?;
    let then_branch = resolve_branch(ctx, then_branch)?;
    let else_branch = resolve_branch(ctx, else_branch)?;

    if let Some(c) = cond.as_constant() {
        let chosen = if c.as_bool() { then_branch } else { else_branch };
        return Ok(chosen.map_or_else(|| Stmt::nop(span), |s| *s));
    }
    Ok(Stmt::new(StmtKind::If { cond, then_branch, else_branch }, span))
}

/// Resolve a loop body with break/continue bound to this loop. Returns the
/// body and the number of jumps inside it.
fn loop_body(ctx: &mut CompileContext, body: Stmt) -> Resolved<(Stmt, usize)> {
    ctx.enter_loop();
    let body = resolve_stmt(ctx, body);
    let jumps = ctx.leave_loop();
    Ok((body?, jumps))
}

fn resolve_while(ctx: &mut CompileContext, cond: Expr, body: Stmt, span: Span) -> Resolved<Stmt> {
    let cond = cast::bool_cast(ctx, cond)?;
    let (body, _) = loop_body(ctx, body)?;
    if let Some(c) = cond.as_constant() {
        if !c.as_bool() {
            return Ok(Stmt::nop(span));
        }
        if body.is_empty() {
            ctx.warn(span, "ACT-C002", "Infinite empty loop");
        }
    }
    Ok(Stmt::new(StmtKind::While { cond, body: Box::new(body) }, span))
}

fn resolve_do_while(ctx: &mut CompileContext, body: Stmt, cond: Expr, span: Span) -> Resolved<Stmt> {
    let (body, jumps) = loop_body(ctx, body)?;
    let cond = cast::bool_cast(ctx, cond)?;
    if let Some(c) = cond.as_constant() {
        if !c.as_bool() && jumps == 0 {
            // runs exactly once
            return Ok(body);
        }
        if c.as_bool() && body.is_empty() {
            ctx.warn(span, "ACT-C002", "Infinite empty loop");
        }
    }
    Ok(Stmt::new(StmtKind::DoWhile { body: Box::new(body), cond }, span))
}

/// The initializer may declare locals, so a loop with one is wrapped in a
/// block that scopes them to the loop.
fn resolve_for(
    ctx: &mut CompileContext,
    init: Option<Stmt>,
    cond: Option<Expr>,
    step: Option<Stmt>,
    body: Stmt,
    span: Span,
) -> Resolved<Stmt> {
    let Some(init) = init else {
        return resolve_for_loop(ctx, cond, step, body, span);
    };
    ctx.push_block();
    let resolved =
        resolve_stmt(ctx, init).and_then(|init| Ok((init, resolve_for_loop(ctx, cond, step, body, span)?)));
    let locals = ctx.pop_block();
    let (init, looped) = resolved?;
    let body = if looped.is_empty() { vec![init] } else { vec![init, looped] };
    Ok(Stmt::new(StmtKind::Compound { body, locals }, span))
}

fn resolve_for_loop(
    ctx: &mut CompileContext,
    cond: Option<Expr>,
    step: Option<Stmt>,
    body: Stmt,
    span: Span,
) -> Resolved<Stmt> {
    let mut cond = cond.map(|c| cast::bool_cast(ctx, c)).transpose()?;
    ctx.enter_loop();
    let rest = resolve_branch(ctx, step.map(Box::new))
        .and_then(|step| Ok((step, resolve_stmt(ctx, body)?)));
    ctx.leave_loop();
    let (step, body) = rest?;

    if let Some(c) = cond.as_ref().and_then(Expr::as_constant) {
        if !c.as_bool() {
            return Ok(Stmt::nop(span));
        }
        cond = None;
    }
    if cond.is_none() && body.is_empty() {
        ctx.warn(span, "ACT-C002", "Infinite empty loop");
    }
    Ok(Stmt::new(StmtKind::For { init: None, cond, step, body: Box::new(body) }, span))
}

/// Calls in return position hand their result straight to the caller.
fn mark_tail(e: &mut Expr) {
    match &mut e.kind {
        ExprKind::VmCall { tail, .. }
        | ExprKind::ActionSpecial { tail, .. }
        | ExprKind::Random { tail, .. }
        | ExprKind::FRandom { tail, .. }
        | ExprKind::Random2 { tail, .. }
        | ExprKind::RuntimeStateIndex { tail, .. }
        | ExprKind::MultiNameState { tail, .. } => *tail = true,
        _ => {}
    }
}

fn resolve_return(ctx: &mut CompileContext, value: Option<Expr>, span: Span) -> Resolved<Stmt> {
    let value = match value {
        Some(v) => {
            let mut v = resolve(ctx, v)?;
            mark_tail(&mut v);
            Some(v)
        }
        None => None,
    };
    let proto = match value.as_ref().map(Expr::value_type) {
        None | Some(Type::Void) => Vec::new(),
        Some(ty) => vec![ty.clone()],
    };
    ctx.check_return(proto, span)?;
    Ok(Stmt::new(StmtKind::Return(value), span))
}

/// The value an uninitialised local starts out with.
fn zero_of(ty: &Type) -> Constant {
    match ty.reg_class() {
        RegClass::Float => Constant { ty: ty.clone(), value: Value::Float(0.0) },
        RegClass::String => Constant::string(""),
        RegClass::Pointer => Constant { ty: ty.clone(), ..Constant::null() },
        _ if *ty == Type::Bool => Constant::bool(false),
        _ => Constant::typed_int(ty.clone(), 0),
    }
}

fn resolve_local_decl(
    ctx: &mut CompileContext,
    name: String,
    ty_name: String,
    init: Option<Expr>,
    span: Span,
) -> Resolved<Stmt> {
    let Some(ty) = ctx.symbols.parse_type(&ty_name) else {
        return Err(ctx.error(span, "ACT-T014", format!("Unknown type '{ty_name}'")));
    };
    if ty.reg_class() == RegClass::Nil {
        return Err(ctx.error(
            span,
            "ACT-R006",
            format!("Local variable {name} of type {} cannot live in a register", ctx.describe(&ty)),
        ));
    }
    // the initializer sees the scope from before the declaration
    let init = match init {
        Some(e) => cast::type_cast(ctx, e, ty.clone(), false)?,
        None => retype(Expr::constant(zero_of(&ty), span), ty.clone()),
    };
    let id = ctx.declare_local(&name, ty.clone(), span)?;
    let ty = ctx.describe(&ty);
    Ok(Stmt::new(StmtKind::LocalDecl { name, ty, init: Some(init), id: Some(id) }, span))
}

// ── Emission ─────────────────────────────────────────────────────────

pub(super) fn emit_stmt(em: &mut Emitter, s: &Stmt) {
    match &s.kind {
        StmtKind::Nop => {}
        StmtKind::Expr(e) => {
            let v = em.emit(e);
            v.free(&mut em.b);
        }
        StmtKind::Sequence(body) => body.iter().for_each(|s| emit_stmt(em, s)),
        StmtKind::Compound { body, locals } => {
            body.iter().for_each(|s| emit_stmt(em, s));
            for id in locals {
                em.release_local(*id);
            }
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            emit_if(em, cond, then_branch.as_deref(), else_branch.as_deref())
        }
        StmtKind::While { cond, body } => emit_while(em, cond, body),
        StmtKind::DoWhile { body, cond } => emit_do_while(em, body, cond),
        StmtKind::For { init, cond, step, body } => {
            emit_for(em, init.as_deref(), cond.as_ref(), step.as_deref(), body)
        }
        StmtKind::Jump(kind) => emit_jump(em, *kind),
        StmtKind::Return(value) => emit_return(em, value.as_ref()),
        StmtKind::LocalDecl { init, id, .. } => match (init, id) {
            (Some(init), Some(id)) => emit_local_decl(em, init, *id),
            _ => em.b.report(EmitError::Unresolved("local declaration")),
        },
    }
}

fn emit_if(em: &mut Emitter, cond: &Expr, then_branch: Option<&Stmt>, else_branch: Option<&Stmt>) {
    // with only an else branch the test is inverted
    let (first, second, check) = match (then_branch, else_branch) {
        (Some(t), e) => (t, e, 1),
        (None, Some(e)) => (e, None, 0),
        (None, None) => return,
    };
    let c = em.emit(cond);
    let c = em.to_reg(c);
    let zero = em.b.int_const(0);
    em.b.emit_abc(OP_EQ_K, check, c.reg, zero);
    let mut skip = em.b.emit_jmp_placeholder();
    c.free(&mut em.b);

    emit_stmt(em, first);
    if let Some(second) = second {
        let over = em.b.emit_jmp_placeholder();
        em.b.patch_jump(skip);
        emit_stmt(em, second);
        skip = over;
    }
    em.b.patch_jump(skip);
}

/// Evaluate a loop condition and emit `test c,check` followed by a jump
/// placeholder. TEST skips the jump on a mismatch, so the jump is taken
/// when the condition equals `check`.
fn emit_loop_test(em: &mut Emitter, cond: &Expr, check: u16) -> usize {
    let c = em.emit(cond);
    let c = em.to_reg(c);
    em.b.emit_abc(OP_TEST, c.reg, check, 0);
    c.free(&mut em.b);
    em.b.emit_jmp_placeholder()
}

fn emit_loop_body(em: &mut Emitter, body: &Stmt) -> LoopJumps {
    em.loops.push(LoopJumps::default());
    emit_stmt(em, body);
    em.loops.pop().unwrap_or_default()
}

fn patch_loop(em: &mut Emitter, jumps: LoopJumps, start: usize, end: usize) {
    for at in jumps.breaks {
        em.b.patch_jump_to(at, end);
    }
    for at in jumps.continues {
        em.b.patch_jump_to(at, start);
    }
}

fn emit_while(em: &mut Emitter, cond: &Expr, body: &Stmt) {
    let start = em.b.pos();
    let exit = (!cond.is_constant()).then(|| emit_loop_test(em, cond, 0));
    let jumps = emit_loop_body(em, body);
    em.b.emit_jump_to(start);
    let end = em.b.pos();
    if let Some(exit) = exit {
        em.b.patch_jump_to(exit, end);
    }
    patch_loop(em, jumps, start, end);
}

fn emit_do_while(em: &mut Emitter, body: &Stmt, cond: &Expr) {
    let code_start = em.b.pos();
    let jumps = emit_loop_body(em, body);
    let start = em.b.pos();
    match cond.as_constant() {
        None => {
            let back = emit_loop_test(em, cond, 1);
            em.b.patch_jump_to(back, code_start);
        }
        Some(c) if c.as_bool() => em.b.emit_jump_to(code_start),
        Some(_) => {}
    }
    let end = em.b.pos();
    patch_loop(em, jumps, start, end);
}

fn emit_for(em: &mut Emitter, init: Option<&Stmt>, cond: Option<&Expr>, step: Option<&Stmt>, body: &Stmt) {
    if let Some(init) = init {
        emit_stmt(em, init);
    }
    let code_start = em.b.pos();
    let exit = cond.map(|c| emit_loop_test(em, c, 0));
    let jumps = emit_loop_body(em, body);
    let start = em.b.pos();
    if let Some(step) = step {
        emit_stmt(em, step);
    }
    em.b.emit_jump_to(code_start);
    let end = em.b.pos();
    if let Some(exit) = exit {
        em.b.patch_jump_to(exit, end);
    }
    patch_loop(em, jumps, start, end);
}

fn emit_jump(em: &mut Emitter, kind: JumpKind) {
    let at = em.b.emit_jmp_placeholder();
    match (em.loops.last_mut(), kind) {
        (Some(l), JumpKind::Break) => l.breaks.push(at),
        (Some(l), JumpKind::Continue) => l.continues.push(at),
        (None, _) => em.b.report(EmitError::Unresolved("jump outside of a loop")),
    }
}

fn emit_return(em: &mut Emitter, value: Option<&Expr>) {
    let Some(value) = value else {
        em.b.emit_abc(OP_RET, RET_FINAL, REGT_NIL as u16, 0);
        return;
    };
    let v = em.emit(value);
    if v.is_final {
        return;
    }
    if *value.value_type() == Type::Void {
        em.b.emit_abc(OP_RET, RET_FINAL, REGT_NIL as u16, 0);
    } else {
        em.b.emit_abc(OP_RET, RET_FINAL, v.tag() as u16, v.reg);
    }
    v.free(&mut em.b);
}

fn emit_local_decl(em: &mut Emitter, init: &Expr, id: LocalId) {
    let class = init.value_type().reg_class();
    let reg = match init.as_constant() {
        Some(Constant { value: Value::Int(n), .. }) if class == RegClass::Int => {
            let reg = em.b.alloc(class);
            em.b.emit_load_int(reg, *n);
            reg
        }
        Some(_) => {
            let k = em.emit(init);
            let reg = em.b.alloc(class);
            em.b.emit_abx(load_const_op(class), reg, k.reg);
            reg
        }
        None => {
            // a freshly computed register is taken over as the local's home
            let v = em.emit(init);
            let v = em.to_scratch(v);
            v.reg
        }
    };
    em.bind_local(id, class, reg);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::diagnostic::Severity;
    use crate::emit::{decode, decode_sbx, OP_JMP};

    fn jump_targets(chunk: &crate::emit::Chunk) -> Vec<(usize, i64)> {
        chunk
            .code
            .iter()
            .enumerate()
            .filter(|(_, inst)| decode(**inst).0 == OP_JMP)
            .map(|(at, inst)| (at, at as i64 + 1 + decode_sbx(*inst) as i64))
            .collect()
    }

    #[test]
    fn if_else_tests_then_jumps_over() {
        let chunk = compile_src("if (health > 0) A_Chase(); else health = 1;").chunk;
        let seq = ops(&chunk);
        let eq = seq.iter().position(|op| *op == "eq_k").unwrap();
        assert_eq!(seq[eq + 1], "jmp");
        assert_eq!(decode(chunk.code[eq]).1, 1);
        // the jump out of the then branch lands on the final ret
        let jumps = jump_targets(&chunk);
        let (_, over) = jumps.last().copied().unwrap();
        assert_eq!(over as usize, chunk.code.len() - 1);
    }

    #[test]
    fn else_only_inverts_the_test() {
        let chunk = compile_src("if (health > 0) ; else A_Chase();").chunk;
        assert_eq!(ops(&chunk).iter().filter(|op| **op == "eq_k").count(), 1);

        let symbols = symbols();
        let cond = crate::parser::parse_expression("health > 0").unwrap();
        let call = crate::parser::parse_body("A_Chase();").unwrap();
        let body = Stmt::new(
            StmtKind::If { cond, then_branch: None, else_branch: Some(Box::new(call)) },
            Span::UNKNOWN,
        );
        let block = Stmt::new(StmtKind::Compound { body: vec![body], locals: vec![] }, Span::UNKNOWN);
        let compiled = super::super::compile_function(&symbols, &actor_options(), &[], block).unwrap();
        let at = ops(&compiled.chunk).iter().position(|op| *op == "eq_k").unwrap();
        assert_eq!(decode(compiled.chunk.code[at]).1, 0);
    }

    #[test]
    fn constant_if_keeps_one_branch() {
        let chunk = compile_src("if (1) A_Chase(); else health = 2;").chunk;
        assert_eq!(ops(&chunk), vec!["param", "param", "param", "call_k", "ret"]);
        let chunk = compile_src("if (false) A_Chase();").chunk;
        assert_eq!(ops(&chunk), vec!["ret"]);
    }

    #[test]
    fn while_loop_tests_and_loops_back() {
        let chunk = compile_src("while (health > 0) health--;").chunk;
        let seq = ops(&chunk);
        let test = seq.iter().position(|op| *op == "test").unwrap();
        // exit is taken when the condition is false
        assert_eq!(decode(chunk.code[test]).2, 0);
        assert_eq!(seq[test + 1], "jmp");
        let jumps = jump_targets(&chunk);
        let exit = jumps.iter().find(|(at, _)| *at == test + 1).unwrap().1;
        assert_eq!(exit as usize, chunk.code.len() - 1);
        assert_eq!(jumps.last().unwrap().1, 0);
    }

    #[test]
    fn constant_false_loops_vanish() {
        assert_eq!(ops(&compile_src("while (false) A_Chase();").chunk), vec!["ret"]);
        assert_eq!(ops(&compile_src("for (;0;) A_Chase();").chunk), vec!["ret"]);
    }

    #[test]
    fn empty_infinite_loop_warns() {
        let compiled = compile_src("while (true) {}");
        assert!(compiled
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message == "Infinite empty loop"));
        assert_eq!(ops(&compiled.chunk), vec!["jmp", "ret"]);
        assert_eq!(jump_targets(&compiled.chunk), vec![(0, 0)]);

        let compiled = compile_src("for (;;) ;");
        assert!(compiled.diagnostics.iter().any(|d| d.code == Some("ACT-C002")));
    }

    #[test]
    fn do_while_false_runs_body_once() {
        let chunk = compile_src("do { A_Chase(); } while (false);").chunk;
        assert_eq!(ops(&chunk), vec!["param", "param", "param", "call_k", "ret"]);
    }

    #[test]
    fn do_while_with_break_keeps_the_loop() {
        let chunk = compile_src("do { break; } while (false);").chunk;
        assert_eq!(ops(&chunk), vec!["jmp", "ret"]);
        assert_eq!(jump_targets(&chunk), vec![(0, 1)]);
    }

    #[test]
    fn do_while_tests_at_the_bottom() {
        let chunk = compile_src("do health--; while (health > 10);").chunk;
        let seq = ops(&chunk);
        let test = seq.iter().position(|op| *op == "test").unwrap();
        assert_eq!(decode(chunk.code[test]).2, 1);
        assert_eq!(jump_targets(&chunk).last().unwrap().1, 0);
    }

    #[test]
    fn break_and_continue_are_backpatched() {
        let chunk = compile_src("while (health > 0) { if (health == 5) break; health--; continue; }").chunk;
        let jumps = jump_targets(&chunk);
        let end = chunk.code.len() as i64 - 1;
        assert!(jumps.iter().any(|(_, to)| *to == end));
        // continue goes back to the condition
        assert!(jumps.iter().filter(|(_, to)| *to == 0).count() >= 2);
    }

    #[test]
    fn for_loop_scopes_its_counter() {
        let compiled = compile_src("for (int i = 0; i < 3; i++) A_Chase(); int j = 7; return j;");
        let seq = ops(&compiled.chunk);
        assert_eq!(seq[0], "li");
        assert!(seq.contains(&"test"));
        // the counter's register is free again for j
        assert_eq!(decode(compiled.chunk.code[0]).1, decode(compiled.chunk.code[seq.len() - 2]).1);
    }

    #[test]
    fn for_with_false_condition_keeps_initializer() {
        let chunk = compile_src("for (health = 1; false; ) A_Chase();").chunk;
        let seq = ops(&chunk);
        assert!(seq.contains(&"sw"));
        assert!(!seq.contains(&"call_k"));
    }

    #[test]
    fn jumps_need_a_loop() {
        assert_eq!(compile_error("break;"), "'break' outside of a loop");
        assert_eq!(compile_error("if (health) continue;"), "'continue' outside of a loop");
    }

    #[test]
    fn return_types_must_agree() {
        let msg = "All return expressions must deduce to the same type";
        assert_eq!(compile_error("if (health) return 1; return 2.0;"), msg);
        assert_eq!(compile_error("if (health) return; return 1;"), msg);
        let compiled = compile_src("if (health) return 1; return 2;");
        assert_eq!(compiled.returns, vec![Type::INT]);
    }

    #[test]
    fn void_return_and_tail_calls() {
        assert_eq!(ops(&compile_src("return;").chunk), vec!["ret"]);
        let chunk = compile_src("return A_Chase();").chunk;
        assert_eq!(ops(&chunk), vec!["param", "param", "param", "tail_k"]);
        let chunk = compile_src("return 3;").chunk;
        assert_eq!(ops(&chunk), vec!["ret"]);
    }

    #[test]
    fn uninitialised_locals_start_at_zero() {
        assert_eq!(ops(&compile_src("int i; return i;").chunk), vec!["li", "ret"]);
        assert_eq!(ops(&compile_src("double d; return d;").chunk), vec!["lkf", "ret"]);
        let chunk = compile_src("Actor a; return a;").chunk;
        assert_eq!(ops(&chunk), vec!["lkp", "ret"]);
        assert!(chunk.addr_consts.contains(&crate::emit::AddrConst::Null));
    }

    #[test]
    fn local_declaration_errors() {
        assert_eq!(compile_error("foo x;"), "Unknown type 'foo'");
        assert_eq!(compile_error("int x; int X;"), "Local variable X already defined");
        assert_eq!(compile_error("int x = \"text\";"), "Numeric type expected");
    }

    #[test]
    fn initializer_copies_other_locals() {
        let chunk = compile_src("int i = 2; int j = i; return j;").chunk;
        assert_eq!(ops(&chunk), vec!["li", "move", "ret"]);
    }

    #[test]
    fn blocks_release_their_registers() {
        let chunk = compile_src("{ int a = health; } { int b = tid; }").chunk;
        assert_eq!(chunk.num_regs[0], 1);
    }

    #[test]
    fn block_reports_every_failing_statement() {
        let failure = compile_with(&actor_options(), "return hp; health = mp;").unwrap_err();
        let errors: Vec<_> = failure.diagnostics.iter().filter(|d| d.severity == Severity::Error).collect();
        assert_eq!(errors.len(), 2);
    }
}
