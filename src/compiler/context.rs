use crate::ast::{LocalId, Span};
use crate::diagnostic::{Diagnostic, Severity};
use crate::types::{ClassId, FunctionKind, SymbolTable, Type};

use super::CompileError;

/// Per-compilation settings, consulted by value.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub name: String,
    pub kind: FunctionKind,
    /// Class whose symbol table identifiers are looked up in.
    pub class: Option<ClassId>,
    /// Type of `self` when it differs from `class` (restricted self pointer).
    pub self_class: Option<ClassId>,
    /// Legacy dialect: downgrade some type errors to warnings.
    pub lax: bool,
    /// Treat opt-errors as fatal.
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            name: "Anonymous".into(),
            kind: FunctionKind::Static,
            class: None,
            self_class: None,
            lax: false,
            strict: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub kind: FunctionKind,
    /// `None` for static functions.
    pub self_class: Option<ClassId>,
}

#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: String,
    pub ty: Type,
    pub is_param: bool,
}

/// Mutable state threaded through the resolve pass of one function or
/// constant expression.
pub struct CompileContext<'a> {
    pub symbols: &'a SymbolTable,
    pub class: Option<ClassId>,
    /// `None` while evaluating a bare constant.
    pub function: Option<FunctionInfo>,
    pub lax: bool,
    pub strict: bool,
    pub return_proto: Option<Vec<Type>>,
    pub diagnostics: Vec<Diagnostic>,
    locals: Vec<LocalVar>,
    params: Vec<LocalId>,
    blocks: Vec<Vec<LocalId>>,
    /// break/continue count of each enclosing loop.
    loops: Vec<usize>,
    assign_bases: Vec<Type>,
}

impl<'a> CompileContext<'a> {
    pub fn new(symbols: &'a SymbolTable, options: &CompileOptions, in_function: bool) -> Self {
        let function = in_function.then(|| FunctionInfo {
            name: options.name.clone(),
            kind: options.kind,
            self_class: match options.kind {
                FunctionKind::Static => None,
                _ => options.self_class.or(options.class),
            },
        });
        CompileContext {
            symbols,
            class: options.class,
            function,
            lax: options.lax,
            strict: options.strict,
            return_proto: None,
            diagnostics: Vec::new(),
            locals: Vec::new(),
            params: Vec::new(),
            blocks: Vec::new(),
            loops: Vec::new(),
            assign_bases: Vec::new(),
        }
    }

    pub fn function_kind(&self) -> Option<FunctionKind> {
        self.function.as_ref().map(|f| f.kind)
    }

    pub fn self_class(&self) -> Option<ClassId> {
        self.function.as_ref().and_then(|f| f.self_class)
    }

    pub fn describe(&self, ty: &Type) -> String {
        self.symbols.describe(ty)
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    pub fn error(&self, span: Span, code: &'static str, message: impl Into<String>) -> CompileError {
        CompileError { code, span, message: message.into(), hint: None }
    }

    fn report(&mut self, severity: Severity, span: Span, code: Option<&'static str>, message: String) {
        let mut d = Diagnostic::new(severity, message).with_span(span, "");
        if let Some(code) = code {
            d = d.with_code(code);
        }
        self.diagnostics.push(d);
    }

    pub fn warn(&mut self, span: Span, code: &'static str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(code, "{message}");
        self.report(Severity::Warning, span, Some(code), message);
    }

    /// An error that legacy content is allowed to get away with: recorded as
    /// an opt-error under `lax`, a hard error otherwise.
    pub fn opt_error(&mut self, span: Span, code: &'static str, message: impl Into<String>) -> Result<(), CompileError> {
        let message = message.into();
        if !self.lax {
            return Err(self.error(span, code, message));
        }
        tracing::warn!(code, strict = self.strict, "{message}");
        self.report(Severity::OptError, span, Some(code), message);
        Ok(())
    }

    pub fn debug_log(&mut self, span: Span, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.report(Severity::DebugLog, span, None, message);
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_fatal(self.strict))
    }

    // ── Locals ───────────────────────────────────────────────────────

    pub fn declare_param(&mut self, name: &str, ty: Type) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalVar { name: name.to_string(), ty, is_param: true });
        self.params.push(id);
        id
    }

    pub fn declare_local(&mut self, name: &str, ty: Type, span: Span) -> Result<LocalId, CompileError> {
        let Some(block) = self.blocks.last() else {
            return Err(self.error(span, "ACT-R007", "Variable declaration outside compound statement"));
        };
        if block.iter().any(|id| self.locals[id.0 as usize].name.eq_ignore_ascii_case(name)) {
            return Err(self.error(span, "ACT-R007", format!("Local variable {name} already defined")));
        }
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalVar { name: name.to_string(), ty, is_param: false });
        if let Some(block) = self.blocks.last_mut() {
            block.push(id);
        }
        Ok(id)
    }

    /// Innermost block outward, then the function parameters.
    pub fn find_local(&self, name: &str) -> Option<LocalId> {
        self.blocks
            .iter()
            .rev()
            .flat_map(|block| block.iter().rev())
            .chain(self.params.iter())
            .copied()
            .find(|id| self.locals[id.0 as usize].name.eq_ignore_ascii_case(name))
    }

    pub fn local(&self, id: LocalId) -> &LocalVar {
        &self.locals[id.0 as usize]
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn visible_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .flatten()
            .chain(self.params.iter())
            .map(|id| self.locals[id.0 as usize].name.clone())
            .collect()
    }

    pub fn push_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    pub fn pop_block(&mut self) -> Vec<LocalId> {
        self.blocks.pop().unwrap_or_default()
    }

    // ── Loops and assignment ─────────────────────────────────────────

    pub fn enter_loop(&mut self) {
        self.loops.push(0);
    }

    /// Returns how many break/continue statements the loop body contained.
    pub fn leave_loop(&mut self) -> usize {
        self.loops.pop().unwrap_or(0)
    }

    /// Record a break or continue; false when there is no enclosing loop.
    pub fn note_jump(&mut self) -> bool {
        match self.loops.last_mut() {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn push_assign_base(&mut self, ty: Type) {
        self.assign_bases.push(ty);
    }

    pub fn pop_assign_base(&mut self) {
        self.assign_bases.pop();
    }

    pub fn assign_base(&self) -> Option<&Type> {
        self.assign_bases.last()
    }

    // ── Return prototype ─────────────────────────────────────────────

    /// Merge a return statement's prototype into the function's. The shorter
    /// list must be a prefix of the longer one.
    pub fn check_return(&mut self, proto: Vec<Type>, span: Span) -> Result<(), CompileError> {
        let Some(current) = &self.return_proto else {
            self.return_proto = Some(proto);
            return Ok(());
        };
        let (short, long) = if proto.len() <= current.len() { (&proto, current) } else { (current, &proto) };
        let compatible = (short.is_empty() == long.is_empty()) && short.iter().zip(long.iter()).all(|(a, b)| a == b);
        if !compatible {
            return Err(self.error(span, "ACT-C003", "All return expressions must deduce to the same type"));
        }
        if proto.len() > current.len() {
            self.return_proto = Some(proto);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CompileOptions {
        CompileOptions { kind: FunctionKind::Action, ..CompileOptions::default() }
    }

    #[test]
    fn locals_shadow_outward() {
        let symbols = SymbolTable::builtin().unwrap();
        let mut ctx = CompileContext::new(&symbols, &options(), true);
        let p = ctx.declare_param("n", Type::INT);
        ctx.push_block();
        let outer = ctx.declare_local("x", Type::INT, Span::UNKNOWN).unwrap();
        ctx.push_block();
        let inner = ctx.declare_local("X", Type::DOUBLE, Span::UNKNOWN).unwrap();
        assert_eq!(ctx.find_local("x"), Some(inner));
        assert_eq!(ctx.find_local("n"), Some(p));
        assert_eq!(ctx.pop_block(), vec![inner]);
        assert_eq!(ctx.find_local("x"), Some(outer));
        ctx.pop_block();
        assert_eq!(ctx.find_local("x"), None);
    }

    #[test]
    fn declaration_needs_a_block() {
        let symbols = SymbolTable::builtin().unwrap();
        let mut ctx = CompileContext::new(&symbols, &options(), true);
        let err = ctx.declare_local("x", Type::INT, Span::UNKNOWN).unwrap_err();
        assert!(err.message.contains("outside compound statement"));
        ctx.push_block();
        ctx.declare_local("x", Type::INT, Span::UNKNOWN).unwrap();
        assert!(ctx.declare_local("x", Type::INT, Span::UNKNOWN).is_err());
    }

    #[test]
    fn return_prototypes_unify_on_prefix() {
        let symbols = SymbolTable::builtin().unwrap();
        let mut ctx = CompileContext::new(&symbols, &options(), true);
        ctx.check_return(vec![Type::INT], Span::UNKNOWN).unwrap();
        ctx.check_return(vec![Type::INT, Type::DOUBLE], Span::UNKNOWN).unwrap();
        assert_eq!(ctx.return_proto.as_ref().map(Vec::len), Some(2));
        assert!(ctx.check_return(vec![Type::DOUBLE], Span::UNKNOWN).is_err());
        assert!(ctx.check_return(vec![], Span::UNKNOWN).is_err());
    }

    #[test]
    fn opt_error_respects_lax_and_strict() {
        let symbols = SymbolTable::builtin().unwrap();
        let mut ctx = CompileContext::new(&symbols, &options(), true);
        assert!(ctx.opt_error(Span::UNKNOWN, "ACT-T012", "Unknown class name 'Foo'").is_err());
        assert!(ctx.diagnostics.is_empty());
        ctx.lax = true;
        ctx.opt_error(Span::UNKNOWN, "ACT-T012", "Unknown class name 'Foo'").unwrap();
        assert!(!ctx.has_fatal());
        ctx.strict = true;
        assert!(ctx.has_fatal());
    }

    #[test]
    fn static_functions_have_no_self() {
        let symbols = SymbolTable::builtin().unwrap();
        let actor = symbols.class_by_name("Actor");
        let opts = CompileOptions { class: actor, ..CompileOptions::default() };
        assert_eq!(CompileContext::new(&symbols, &opts, true).self_class(), None);
        let opts = CompileOptions { kind: FunctionKind::Method, ..opts };
        assert_eq!(CompileContext::new(&symbols, &opts, true).self_class(), actor);
    }
}
