use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lexer::{self, LexError, Token};
use crate::value::Constant;

/// Type names that double as conversion functions: `int(x)`, `state("See")`.
const CAST_TYPES: &[&str] = &[
    "int", "uint", "int8", "int16", "uint8", "uint16", "float", "double", "bool", "name", "string", "sound", "color",
    "state",
];

const MAX_ERRORS: usize = 20;

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    end: Span,
    /// Errors recovered from so far; blocks keep parsing past them.
    errors: Vec<ParseError>,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

/// Everything that can go wrong before resolution starts.
#[derive(Debug, thiserror::Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{}", summarize(.0))]
    Parse(Vec<ParseError>),
}

fn summarize(errors: &[ParseError]) -> String {
    match errors {
        [] => "parse failed".into(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

impl SyntaxError {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            SyntaxError::Lex(e) => vec![Diagnostic::from(e)],
            SyntaxError::Parse(errors) => errors.iter().map(Diagnostic::from).collect(),
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

/// `&&` and `||` short-circuit, so they get their own node.
#[derive(Clone, Copy)]
enum Infix {
    Binary(BinOp),
    Logical(LogicalOp),
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        let end = tokens.last().map(|(_, s)| Span { start: s.end, end: s.end }).unwrap_or(Span::UNKNOWN);
        Parser { tokens, pos: 0, end, errors: Vec::new() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or(self.end)
    }

    /// Access raw token (for lookahead).
    fn token_at(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Consume the next token if it is `expected`.
    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => {
                let message = format!("expected {}, found {}", expected.describe(), tok.describe());
                Err(self.error("ACT-P001", message))
            }
            None => Err(self.error("ACT-P002", format!("expected {}, found end of input", expected.describe()))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(name)
            }
            Some(tok) => Err(self.error("ACT-P001", format!("expected identifier, found {}", tok.describe()))),
            None => Err(self.error("ACT-P002", "expected identifier, found end of input".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError { code, position: self.pos, span: self.peek_span(), message }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(tok) => self.error("ACT-P001", format!("expected {what}, found {}", tok.describe())),
            None => self.error("ACT-P002", format!("expected {what}, found end of input")),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Span of the previously consumed token.
    fn prev_span(&self) -> Span {
        if self.pos > 0 { self.tokens[self.pos - 1].1 } else { Span::UNKNOWN }
    }

    fn since(&self, start: Span) -> Span {
        start.merge(self.prev_span())
    }

    /// Skip to just past the next `;` or to the next `}` so parsing can
    /// resume at a statement boundary.
    fn sync_to_statement(&mut self) {
        let mut depth: usize = 0;
        while let Some(tok) = self.peek() {
            match tok {
                Token::LBrace => depth += 1,
                Token::RBrace if depth == 0 => return,
                Token::RBrace => depth -= 1,
                Token::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ---- Statements ----

    /// Statements up to `}` or end of input, recovering after each error.
    fn parse_statement_list(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        while !self.at_end() && self.peek() != Some(&Token::RBrace) {
            if self.errors.len() >= MAX_ERRORS {
                break;
            }
            let before = self.pos;
            match self.parse_stmt() {
                Ok(s) => body.push(s),
                Err(e) => {
                    self.errors.push(e);
                    self.sync_to_statement();
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        body
    }

    pub fn parse_program_body(&mut self) -> (Stmt, Vec<ParseError>) {
        let start = self.peek_span();
        let mut body = self.parse_statement_list();
        while !self.at_end() && self.errors.len() < MAX_ERRORS {
            // stray closing brace at top level
            let e = self.unexpected("a statement");
            self.errors.push(e);
            self.advance();
            body.extend(self.parse_statement_list());
        }
        let span = start.merge(self.end);
        let body = Stmt::new(StmtKind::Compound { body, locals: Vec::new() }, span);
        (body, std::mem::take(&mut self.errors))
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::LBrace) => self.parse_block(),
            Some(Token::Semi) => {
                self.advance();
                Ok(Stmt::nop(start))
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.advance();
                let cond = self.parse_paren_expr()?;
                let body = self.parse_stmt()?;
                Ok(Stmt::new(StmtKind::While { cond, body: Box::new(body) }, self.since(start)))
            }
            Some(Token::Do) => {
                self.advance();
                let body = self.parse_stmt()?;
                self.expect(&Token::While)?;
                let cond = self.parse_paren_expr()?;
                self.expect(&Token::Semi)?;
                Ok(Stmt::new(StmtKind::DoWhile { body: Box::new(body), cond }, self.since(start)))
            }
            Some(Token::For) => self.parse_for(),
            Some(Token::Break | Token::Continue) => {
                let kind = if self.advance() == Some(Token::Break) { JumpKind::Break } else { JumpKind::Continue };
                self.expect(&Token::Semi)?;
                Ok(Stmt::new(StmtKind::Jump(kind), self.since(start)))
            }
            Some(Token::Return) => {
                self.advance();
                let value = if self.peek() == Some(&Token::Semi) { None } else { Some(self.parse_expr()?) };
                self.expect(&Token::Semi)?;
                Ok(Stmt::new(StmtKind::Return(value), self.since(start)))
            }
            _ if self.at_declaration() => {
                let decl = self.parse_declaration()?;
                self.expect(&Token::Semi)?;
                Ok(decl)
            }
            _ => {
                let e = self.parse_expr()?;
                self.expect(&Token::Semi)?;
                Ok(Stmt::new(StmtKind::Expr(e), self.since(start)))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Stmt> {
        let start = self.expect(&Token::LBrace)?;
        let body = self.parse_statement_list();
        self.expect(&Token::RBrace)?;
        Ok(Stmt::new(StmtKind::Compound { body, locals: Vec::new() }, self.since(start)))
    }

    fn parse_paren_expr(&mut self) -> Result<Expr> {
        self.expect(&Token::LParen)?;
        let e = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        Ok(e)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.expect(&Token::If)?;
        let cond = self.parse_paren_expr()?;
        let then_branch = self.parse_stmt()?;
        let else_branch = if self.eat(&Token::Else) { Some(Box::new(self.parse_stmt()?)) } else { None };
        let kind = StmtKind::If { cond, then_branch: Some(Box::new(then_branch)), else_branch };
        Ok(Stmt::new(kind, self.since(start)))
    }

    /// `for (init; cond; step) body`. Init and step may be comma lists.
    fn parse_for(&mut self) -> Result<Stmt> {
        let start = self.expect(&Token::For)?;
        self.expect(&Token::LParen)?;
        let init = if self.peek() == Some(&Token::Semi) {
            None
        } else if self.at_declaration() {
            Some(Box::new(self.parse_declaration()?))
        } else {
            Some(Box::new(self.parse_expr_list()?))
        };
        self.expect(&Token::Semi)?;
        let cond = if self.peek() == Some(&Token::Semi) { None } else { Some(self.parse_expr()?) };
        self.expect(&Token::Semi)?;
        let step = if self.peek() == Some(&Token::RParen) { None } else { Some(Box::new(self.parse_expr_list()?)) };
        self.expect(&Token::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::new(StmtKind::For { init, cond, step, body: Box::new(body) }, self.since(start)))
    }

    fn parse_expr_list(&mut self) -> Result<Stmt> {
        let start = self.peek_span();
        let mut list = Vec::new();
        loop {
            let e = self.parse_expr()?;
            let span = e.span;
            list.push(Stmt::new(StmtKind::Expr(e), span));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if list.len() == 1 {
            return Ok(list.remove(0));
        }
        Ok(Stmt::new(StmtKind::Sequence(list), self.since(start)))
    }

    /// `Type name`, `class<Type> name`.
    fn at_declaration(&self) -> bool {
        match (self.peek(), self.token_at(self.pos + 1)) {
            (Some(Token::Ident(_)), Some(Token::Ident(_))) => true,
            // class<T> name, but not the cast class<T>(x)
            (Some(Token::Class), Some(Token::Less)) => matches!(self.token_at(self.pos + 4), Some(Token::Ident(_))),
            _ => false,
        }
    }

    fn parse_type_name(&mut self) -> Result<String> {
        if self.eat(&Token::Class) {
            self.expect(&Token::Less)?;
            let class = self.expect_ident()?;
            self.expect(&Token::Greater)?;
            return Ok(format!("class<{class}>"));
        }
        self.expect_ident()
    }

    /// `Type a = 1, b[4], c;`, leaving the semicolon.
    fn parse_declaration(&mut self) -> Result<Stmt> {
        let start = self.peek_span();
        let ty = self.parse_type_name()?;
        let mut decls = Vec::new();
        loop {
            let name_span = self.peek_span();
            let name = self.expect_ident()?;
            let mut ty = ty.clone();
            if self.eat(&Token::LBracket) {
                let count = match self.advance() {
                    Some(Token::Int(n)) => n,
                    _ => return Err(self.error("ACT-P003", "array size must be an integer constant".into())),
                };
                self.expect(&Token::RBracket)?;
                ty = format!("{ty}[{count}]");
            }
            let init = if self.eat(&Token::Assign) { Some(self.parse_assignment()?) } else { None };
            decls.push(Stmt::new(StmtKind::LocalDecl { name, ty, init, id: None }, self.since(name_span)));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if decls.len() == 1 {
            return Ok(decls.remove(0));
        }
        Ok(Stmt::new(StmtKind::Sequence(decls), self.since(start)))
    }

    // ---- Expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let left = self.parse_conditional()?;
        let op = match self.peek() {
            Some(Token::Assign) => None,
            Some(Token::PlusAssign) => Some(BinOp::Add),
            Some(Token::MinusAssign) => Some(BinOp::Sub),
            Some(Token::StarAssign) => Some(BinOp::Mul),
            Some(Token::SlashAssign) => Some(BinOp::Div),
            Some(Token::PercentAssign) => Some(BinOp::Mod),
            Some(Token::ShlAssign) => Some(BinOp::Shl),
            Some(Token::ShrAssign) => Some(BinOp::Shr),
            Some(Token::UshrAssign) => Some(BinOp::Ushr),
            Some(Token::AmpAssign) => Some(BinOp::BitAnd),
            Some(Token::PipeAssign) => Some(BinOp::BitOr),
            Some(Token::CaretAssign) => Some(BinOp::BitXor),
            _ => return Ok(left),
        };
        let op_span = self.peek_span();
        self.advance();
        let right = self.parse_assignment()?;
        let span = left.span.merge(right.span);
        // `a op= b` reads the left side once through AssignSelf
        let right = match op {
            Some(op) => {
                let this = Expr::new(ExprKind::AssignSelf, op_span);
                let rspan = op_span.merge(right.span);
                Expr::new(ExprKind::Binary { op, left: this.boxed(), right: right.boxed() }, rspan)
            }
            None => right,
        };
        Ok(Expr::new(ExprKind::Assign { base: left.boxed(), right: right.boxed() }, span))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let when_true = self.parse_assignment()?;
        self.expect(&Token::Colon)?;
        let when_false = self.parse_conditional()?;
        let span = cond.span.merge(when_false.span);
        let kind = ExprKind::Conditional { cond: cond.boxed(), when_true: when_true.boxed(), when_false: when_false.boxed() };
        Ok(Expr::new(kind, span))
    }

    /// Binding power of the binary operator at the cursor, lowest first.
    fn binary_op(&self) -> Option<(u8, Infix)> {
        let op = match self.peek()? {
            Token::OrOr => (1, Infix::Logical(LogicalOp::Or)),
            Token::AndAnd => (2, Infix::Logical(LogicalOp::And)),
            Token::Pipe => (3, Infix::Binary(BinOp::BitOr)),
            Token::Caret => (4, Infix::Binary(BinOp::BitXor)),
            Token::Amp => (5, Infix::Binary(BinOp::BitAnd)),
            Token::EqEq => (6, Infix::Binary(BinOp::Eq)),
            Token::NotEq => (6, Infix::Binary(BinOp::Ne)),
            Token::ApproxEq => (6, Infix::Binary(BinOp::ApproxEq)),
            Token::Less => (7, Infix::Binary(BinOp::Lt)),
            Token::Greater => (7, Infix::Binary(BinOp::Gt)),
            Token::LessEq => (7, Infix::Binary(BinOp::Le)),
            Token::GreaterEq => (7, Infix::Binary(BinOp::Ge)),
            Token::LtGtEq => (7, Infix::Binary(BinOp::LtGtEq)),
            Token::Shl => (8, Infix::Binary(BinOp::Shl)),
            Token::Shr => (8, Infix::Binary(BinOp::Shr)),
            Token::Ushr => (8, Infix::Binary(BinOp::Ushr)),
            Token::Plus => (9, Infix::Binary(BinOp::Add)),
            Token::Minus => (9, Infix::Binary(BinOp::Sub)),
            Token::Star => (10, Infix::Binary(BinOp::Mul)),
            Token::Slash => (10, Infix::Binary(BinOp::Div)),
            Token::Percent => (10, Infix::Binary(BinOp::Mod)),
            _ => return None,
        };
        Some(op)
    }

    /// Left-associative precedence climbing over the binary operators.
    fn parse_binary(&mut self, min: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((power, op)) = self.binary_op() {
            if power <= min {
                break;
            }
            self.advance();
            let right = self.parse_binary(power)?;
            let span = left.span.merge(right.span);
            let kind = match op {
                Infix::Binary(op) => ExprKind::Binary { op, left: left.boxed(), right: right.boxed() },
                Infix::Logical(op) => ExprKind::Logical { op, left: left.boxed(), right: right.boxed() },
            };
            left = Expr::new(kind, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Minus,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::BoolNot,
            Some(Token::Tilde) => UnaryOp::BitNot,
            Some(Token::PlusPlus | Token::MinusMinus) => {
                let op = if self.advance() == Some(Token::PlusPlus) { StepOp::Incr } else { StepOp::Decr };
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span);
                return Ok(Expr::new(ExprKind::IncrDecr { op, prefix: true, operand: operand.boxed() }, span));
            }
            Some(Token::SizeOf | Token::AlignOf) => {
                let op = if self.advance() == Some(Token::SizeOf) { SizeAlignOp::SizeOf } else { SizeAlignOp::AlignOf };
                let operand = self.parse_paren_expr()?;
                return Ok(Expr::new(ExprKind::SizeAlign { op, operand: operand.boxed() }, self.since(start)));
            }
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);
        Ok(Expr::new(ExprKind::Unary { op, operand: operand.boxed() }, span))
    }

    /// `**` binds tighter than unary minus and associates to the right.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if !self.eat(&Token::StarStar) {
            return Ok(base);
        }
        let exponent = self.parse_unary()?;
        let span = base.span.merge(exponent.span);
        Ok(Expr::new(ExprKind::Binary { op: BinOp::Pow, left: base.boxed(), right: exponent.boxed() }, span))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if self.peek() == Some(&Token::LParen) {
                        let args = self.parse_args()?;
                        let span = self.since(e.span);
                        e = Expr::new(ExprKind::MemberFunctionCall { object: e.boxed(), name, args }, span);
                    } else {
                        let span = self.since(e.span);
                        e = Expr::new(ExprKind::MemberIdentifier { object: e.boxed(), name }, span);
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    let span = self.since(e.span);
                    e = Expr::new(ExprKind::ArrayElement { array: e.boxed(), index: index.boxed() }, span);
                }
                Some(Token::PlusPlus | Token::MinusMinus) => {
                    let op = if self.advance() == Some(Token::PlusPlus) { StepOp::Incr } else { StepOp::Decr };
                    let span = self.since(e.span);
                    e = Expr::new(ExprKind::IncrDecr { op, prefix: false, operand: e.boxed() }, span);
                }
                _ => return Ok(e),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let Some(tok) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        let constant = match &tok {
            Token::Int(v) => Some(self.int_literal(*v)?),
            Token::Float(v) => Some(Constant::float(*v)),
            Token::Str(s) => Some(Constant::string(s.clone())),
            Token::Name(s) => Some(Constant::name(s.clone())),
            Token::True => Some(Constant::bool(true)),
            Token::False => Some(Constant::bool(false)),
            Token::Null => Some(Constant::null()),
            _ => None,
        };
        if let Some(c) = constant {
            self.advance();
            return Ok(Expr::constant(c, start));
        }

        match tok {
            Token::SelfKw => {
                self.advance();
                Ok(Expr::new(ExprKind::SelfRef, start))
            }
            Token::LParen => {
                let e = self.parse_paren_expr()?;
                Ok(Expr { span: self.since(start), ..e })
            }
            Token::Class => {
                let to = self.parse_type_name()?;
                let operand = self.parse_paren_expr()?;
                Ok(Expr::new(ExprKind::ExplicitCast { operand: operand.boxed(), to }, self.since(start)))
            }
            Token::Ident(name) => {
                self.advance();
                self.parse_identifier_tail(name, start)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// An identifier is a call, a cast, an RNG-qualified call or a plain name.
    fn parse_identifier_tail(&mut self, name: String, start: Span) -> Result<Expr> {
        // name[rng](args)
        let rng_call = self.peek() == Some(&Token::LBracket)
            && matches!(self.token_at(self.pos + 1), Some(Token::Ident(_)))
            && self.token_at(self.pos + 2) == Some(&Token::RBracket)
            && self.token_at(self.pos + 3) == Some(&Token::LParen);
        if rng_call {
            self.advance();
            let rng = self.expect_ident()?;
            self.expect(&Token::RBracket)?;
            let args = self.parse_args()?;
            return Ok(Expr::new(ExprKind::FunctionCall { name, rng: Some(rng), args }, self.since(start)));
        }
        if self.peek() != Some(&Token::LParen) {
            return Ok(Expr::new(ExprKind::Identifier(name), start));
        }
        if CAST_TYPES.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
            let operand = self.parse_paren_expr()?;
            let to = name.to_ascii_lowercase();
            return Ok(Expr::new(ExprKind::ExplicitCast { operand: operand.boxed(), to }, self.since(start)));
        }
        let args = self.parse_args()?;
        Ok(Expr::new(ExprKind::FunctionCall { name, rng: None, args }, self.since(start)))
    }

    /// Literals above `i32::MAX` are unsigned.
    fn int_literal(&self, v: u64) -> Result<Constant> {
        if let Ok(v) = i32::try_from(v) {
            return Ok(Constant::int(v));
        }
        match u32::try_from(v) {
            Ok(v) => Ok(Constant::uint(v)),
            Err(_) => Err(self.error("ACT-P003", format!("integer constant {v} is out of range"))),
        }
    }
}

fn tokenize(source: &str) -> std::result::Result<Vec<(Token, Span)>, LexError> {
    Ok(lexer::lex(source)?
        .into_iter()
        .map(|(t, r)| (t, Span { start: r.start, end: r.end }))
        .collect())
}

/// Parse a function body: a sequence of statements wrapped in one block.
pub fn parse_body(source: &str) -> std::result::Result<Stmt, SyntaxError> {
    let mut parser = Parser::new(tokenize(source)?);
    let (body, errors) = parser.parse_program_body();
    if errors.is_empty() { Ok(body) } else { Err(SyntaxError::Parse(errors)) }
}

/// Parse a single expression that must span the whole input.
pub fn parse_expression(source: &str) -> std::result::Result<Expr, SyntaxError> {
    let mut parser = Parser::new(tokenize(source)?);
    let parsed = parser.parse_expr().and_then(|e| {
        if parser.at_end() { Ok(e) } else { Err(parser.unexpected("end of expression")) }
    });
    parsed.map_err(|e| SyntaxError::Parse(vec![e]))
}
