pub mod ast;
pub mod compiler;
pub mod diagnostic;
pub mod emit;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod value;
