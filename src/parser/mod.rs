//! Parser for the template language

pub mod ast;
mod grammar;
pub mod lexer;
mod paths;

pub use ast::*;
pub use grammar::{parse, parse_named};
