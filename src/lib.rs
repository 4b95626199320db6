//! # minicc
//!
//! A table-driven compiler front-end for a small imperative language.
//!
//! This library provides functionality to:
//! - Compile a prioritized lexical rule file into NFAs using Thompson Construction
//! - Convert NFAs to DFAs using Subset Construction
//! - Minimize DFAs using partition refinement
//! - Compute FIRST/FOLLOW sets and build an LL(1) predictive parsing table
//! - Scan source text with a maximal-munch DFA driver
//! - Parse the token stream with a stack-driven LL(1) parser into an AST

// Re-export the modules
pub mod ast;
pub mod dfa;
pub mod fa;
pub mod grammar;
pub mod lexer;
pub mod ll1;
pub mod nfa;
pub mod parser;
pub mod regex;

// Re-export commonly used items for convenience
pub use ast::{print_ast, AstNode};
pub use dfa::{construct_dfa, construct_minimal_dfa, DfaTables};
pub use grammar::Grammar;
pub use lexer::{Lexer, Token, TokenKind};
pub use ll1::{LL1Table, ParseTables};
pub use nfa::{combine_nfas, NFA};
pub use parser::Parser;
pub use regex::{build_combined_nfa, parse_rules_text, read_rules_file};
