use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use actorc::compiler::{self, CompileFailure, CompileOptions, Compiled};
use actorc::diagnostic::{ansi::AnsiRenderer, json, registry, Diagnostic, Severity};
use actorc::emit::disasm::disassemble;
use actorc::parser::{self, SyntaxError};
use actorc::types::{EnvError, FunctionKind, SymbolTable};

#[derive(Parser)]
#[command(name = "actorc", version, about = "Compile actor behaviour expressions and statements to register bytecode")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging: -v for debug, -vv for trace (RUST_LOG overrides)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// How to print results and diagnostics
    #[arg(long, global = true, value_enum, default_value = "ansi")]
    format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Ansi,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Action,
    Method,
    Static,
}

impl From<Kind> for FunctionKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Action => FunctionKind::Action,
            Kind::Method => FunctionKind::Method,
            Kind::Static => FunctionKind::Static,
        }
    }
}

/// Where the code is compiled: which class, which kind of function.
#[derive(Args, Clone)]
struct Context {
    /// Class whose members and states are visible
    #[arg(long, default_value = "Actor")]
    class: String,

    /// Restrict `self` to this class instead of `--class`
    #[arg(long)]
    self_class: Option<String>,

    #[arg(long, value_enum, default_value = "action")]
    kind: Kind,

    /// Legacy dialect: downgrade some errors to opt-errors
    #[arg(long)]
    lax: bool,

    /// Treat opt-errors as fatal
    #[arg(long)]
    strict: bool,

    /// Extra symbol environment (JSON), loaded over the built-in one
    #[arg(long)]
    env: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a statement body and print its bytecode
    Compile {
        /// Source file holding the body
        #[arg(required_unless_present = "expr", conflicts_with = "expr")]
        file: Option<PathBuf>,

        /// Compile this source text instead of a file
        #[arg(short = 'e', long = "expr")]
        expr: Option<String>,

        #[command(flatten)]
        ctx: Context,
    },
    /// Fold a constant expression and print its value
    Eval {
        expr: String,
        #[command(flatten)]
        ctx: Context,
    },
    /// Compile an expression as a damage function returning int
    Damage {
        expr: String,
        #[command(flatten)]
        ctx: Context,
    },
    /// Explain a diagnostic code, or list them all
    Explain {
        code: Option<String>,
        #[arg(long)]
        list: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("unknown diagnostic code '{0}'")]
    UnknownCode(String),
    #[error("nothing to explain; pass a code or --list")]
    NothingToExplain,
    #[error("nothing to compile; pass a file or -e")]
    NoSource,
    /// Diagnostics were already rendered.
    #[error("{0} error(s)")]
    Reported(usize),
}

fn setup_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "error",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io { path: path.to_path_buf(), source })
}

fn load_symbols(ctx: &Context) -> Result<SymbolTable, CliError> {
    let mut symbols = SymbolTable::builtin()?;
    if let Some(path) = &ctx.env {
        symbols.load_json(&read_file(path)?)?;
        tracing::debug!(path = %path.display(), "environment loaded");
    }
    Ok(symbols)
}

fn options(symbols: &SymbolTable, ctx: &Context, name: &str) -> Result<CompileOptions, CliError> {
    let class = symbols.class_by_name(&ctx.class).ok_or_else(|| CliError::UnknownClass(ctx.class.clone()))?;
    let self_class = match &ctx.self_class {
        Some(name) => Some(symbols.class_by_name(name).ok_or_else(|| CliError::UnknownClass(name.clone()))?),
        None => None,
    };
    Ok(CompileOptions {
        name: name.to_string(),
        kind: ctx.kind.into(),
        class: Some(class),
        self_class,
        lax: ctx.lax,
        strict: ctx.strict,
    })
}

/// Prints diagnostics for one source text in the selected format.
struct Reporter {
    format: Format,
    verbose: bool,
    ansi: AnsiRenderer,
}

impl Reporter {
    /// Debug-level diagnostics only show with `-v`.
    fn visible<'a>(&self, diagnostics: &'a [Diagnostic]) -> Vec<&'a Diagnostic> {
        diagnostics.iter().filter(|d| self.verbose || d.severity >= Severity::Warning).collect()
    }

    fn json(&self, source: &str, diagnostics: &[Diagnostic]) -> serde_json::Value {
        let list = self.visible(diagnostics).into_iter().map(|d| json::to_value(&d.clone().with_source(source))).collect();
        serde_json::Value::Array(list)
    }

    fn ansi(&self, source: &str, diagnostics: &[Diagnostic]) {
        for d in self.visible(diagnostics) {
            eprint!("{}", self.ansi.render(&d.clone().with_source(source)));
        }
    }

    /// Report a failed front end or compilation and turn it into the exit error.
    fn failure(&self, source: &str, diagnostics: &[Diagnostic]) -> CliError {
        let fatal = diagnostics.iter().filter(|d| d.severity >= Severity::OptError).count();
        match self.format {
            Format::Json => {
                let out = serde_json::json!({ "ok": false, "diagnostics": self.json(source, diagnostics) });
                println!("{out}");
            }
            Format::Ansi => self.ansi(source, diagnostics),
        }
        CliError::Reported(fatal.max(1))
    }

    fn syntax(&self, source: &str, e: &SyntaxError) -> CliError {
        self.failure(source, &e.diagnostics())
    }

    fn compile(&self, source: &str, f: &CompileFailure) -> CliError {
        tracing::debug!(function = %f.function, "compilation failed");
        self.failure(source, &f.diagnostics)
    }

    fn compiled(&self, source: &str, compiled: &Compiled) {
        match self.format {
            Format::Json => {
                let out = serde_json::json!({
                    "ok": true,
                    "chunk": compiled.chunk,
                    "diagnostics": self.json(source, &compiled.diagnostics),
                });
                println!("{out}");
            }
            Format::Ansi => {
                self.ansi(source, &compiled.diagnostics);
                print!("{}", disassemble(&compiled.chunk));
            }
        }
    }
}

fn compile(reporter: &Reporter, source: &str, name: &str, ctx: &Context) -> Result<(), CliError> {
    let symbols = load_symbols(ctx)?;
    let options = options(&symbols, ctx, name)?;
    let body = parser::parse_body(source).map_err(|e| reporter.syntax(source, &e))?;
    let compiled = compiler::compile_function(&symbols, &options, &[], body).map_err(|f| reporter.compile(source, &f))?;
    reporter.compiled(source, &compiled);
    Ok(())
}

fn eval(reporter: &Reporter, source: &str, ctx: &Context) -> Result<(), CliError> {
    let symbols = load_symbols(ctx)?;
    let options = options(&symbols, ctx, "Constant")?;
    let expr = parser::parse_expression(source).map_err(|e| reporter.syntax(source, &e))?;
    let (value, diagnostics) =
        compiler::evaluate_constant(&symbols, &options, expr).map_err(|f| reporter.compile(source, &f))?;
    let ty = symbols.describe(&value.ty);
    match reporter.format {
        Format::Json => {
            let out = serde_json::json!({
                "ok": true,
                "value": value.to_string(),
                "type": ty,
                "diagnostics": reporter.json(source, &diagnostics),
            });
            println!("{out}");
        }
        Format::Ansi => {
            reporter.ansi(source, &diagnostics);
            println!("{value} : {ty}");
        }
    }
    Ok(())
}

fn damage(reporter: &Reporter, source: &str, ctx: &Context) -> Result<(), CliError> {
    let symbols = load_symbols(ctx)?;
    let options = options(&symbols, ctx, "Damage")?;
    let expr = parser::parse_expression(source).map_err(|e| reporter.syntax(source, &e))?;
    let compiled = compiler::compile_damage(&symbols, &options, expr).map_err(|f| reporter.compile(source, &f))?;
    reporter.compiled(source, &compiled);
    Ok(())
}

fn explain(code: Option<&str>, list: bool) -> Result<(), CliError> {
    if list {
        for entry in registry::REGISTRY {
            println!("{}  {}", entry.code, entry.short);
        }
        return Ok(());
    }
    let code = code.ok_or(CliError::NothingToExplain)?;
    let entry = registry::lookup(code).ok_or_else(|| CliError::UnknownCode(code.to_string()))?;
    print!("{}", entry.long);
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let reporter = Reporter {
        format: cli.format,
        verbose: cli.verbose > 0,
        ansi: AnsiRenderer { use_color: std::io::stderr().is_terminal() },
    };
    match cli.command {
        Commands::Compile { file, expr, ctx } => match (file, expr) {
            (_, Some(source)) => compile(&reporter, &source, "Anonymous", &ctx),
            (Some(path), None) => {
                let source = read_file(&path)?;
                let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                compile(&reporter, &source, &name, &ctx)
            }
            (None, None) => Err(CliError::NoSource),
        },
        Commands::Eval { expr, ctx } => eval(&reporter, &expr, &ctx),
        Commands::Damage { expr, ctx } => damage(&reporter, &expr, &ctx),
        Commands::Explain { code, list } => explain(code.as_deref(), list),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Reported(count)) => {
            tracing::debug!(count, "exiting after reported errors");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
