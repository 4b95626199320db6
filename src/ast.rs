/* AST node variants and the indented tree printer. Nodes own their
 * children; the parser returns a single root. */

use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Loc {
    pub line: usize,
    pub column: usize,
}

impl Loc {
    pub fn new(line: usize, column: usize) -> Self {
        Loc { line, column }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Program {
        decls: Box<AstNode>,
        stmts: Box<AstNode>,
    },
    DeclList(Vec<AstNode>),
    Decl {
        var_type: String,
        name: String,
        loc: Loc,
    },
    StmtList(Vec<AstNode>),
    If {
        cond: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Option<Box<AstNode>>,
    },
    While {
        cond: Box<AstNode>,
        body: Box<AstNode>,
    },
    For {
        init: Box<AstNode>,
        cond: Box<AstNode>,
        update: Box<AstNode>,
        body: Box<AstNode>,
    },
    Compound {
        stmts: Box<AstNode>,
    },
    ExprStmt {
        expr: Option<Box<AstNode>>,
    },
    Read {
        name: String,
        loc: Loc,
    },
    Write {
        expr: Box<AstNode>,
    },
    Binary {
        op: String,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    Ident {
        name: String,
        loc: Loc,
    },
    Number {
        value: String,
        loc: Loc,
    },
    Empty,
}

impl AstNode {
    pub fn is_empty(&self) -> bool {
        matches!(self, AstNode::Empty)
    }

    /// The source location of the leftmost leaf under this node.
    pub fn loc(&self) -> Option<Loc> {
        match self {
            AstNode::Decl { loc, .. }
            | AstNode::Read { loc, .. }
            | AstNode::Ident { loc, .. }
            | AstNode::Number { loc, .. } => Some(*loc),
            AstNode::Program { decls, stmts } => decls.loc().or_else(|| stmts.loc()),
            AstNode::DeclList(items) | AstNode::StmtList(items) => {
                items.iter().find_map(|n| n.loc())
            }
            AstNode::If { cond, .. } => cond.loc(),
            AstNode::While { cond, .. } => cond.loc(),
            AstNode::For { init, .. } => init.loc(),
            AstNode::Compound { stmts } => stmts.loc(),
            AstNode::ExprStmt { expr } => expr.as_ref().and_then(|e| e.loc()),
            AstNode::Write { expr } => expr.loc(),
            AstNode::Binary { left, .. } => left.loc(),
            AstNode::Empty => None,
        }
    }

    /// Render the subtree as an indented listing.
    pub fn write_tree(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match self {
            AstNode::Program { decls, stmts } => {
                let _ = writeln!(out, "{}Program", pad);
                decls.write_tree(out, indent + 1);
                stmts.write_tree(out, indent + 1);
            }
            AstNode::DeclList(items) => {
                let _ = writeln!(out, "{}DeclarationList", pad);
                for item in items {
                    item.write_tree(out, indent + 1);
                }
            }
            AstNode::Decl { var_type, name, loc } => {
                let _ = writeln!(
                    out,
                    "{}Declaration: {} {} (line {}, col {})",
                    pad, var_type, name, loc.line, loc.column
                );
            }
            AstNode::StmtList(items) => {
                let _ = writeln!(out, "{}StatementList", pad);
                for item in items {
                    item.write_tree(out, indent + 1);
                }
            }
            AstNode::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let _ = writeln!(out, "{}IfStatement", pad);
                let _ = writeln!(out, "{}  Condition:", pad);
                cond.write_tree(out, indent + 2);
                let _ = writeln!(out, "{}  Then:", pad);
                then_branch.write_tree(out, indent + 2);
                if let Some(else_branch) = else_branch {
                    let _ = writeln!(out, "{}  Else:", pad);
                    else_branch.write_tree(out, indent + 2);
                }
            }
            AstNode::While { cond, body } => {
                let _ = writeln!(out, "{}WhileStatement", pad);
                let _ = writeln!(out, "{}  Condition:", pad);
                cond.write_tree(out, indent + 2);
                let _ = writeln!(out, "{}  Body:", pad);
                body.write_tree(out, indent + 2);
            }
            AstNode::For {
                init,
                cond,
                update,
                body,
            } => {
                let _ = writeln!(out, "{}ForStatement", pad);
                let _ = writeln!(out, "{}  Init:", pad);
                init.write_tree(out, indent + 2);
                let _ = writeln!(out, "{}  Condition:", pad);
                cond.write_tree(out, indent + 2);
                let _ = writeln!(out, "{}  Update:", pad);
                update.write_tree(out, indent + 2);
                let _ = writeln!(out, "{}  Body:", pad);
                body.write_tree(out, indent + 2);
            }
            AstNode::Compound { stmts } => {
                let _ = writeln!(out, "{}CompoundStatement", pad);
                stmts.write_tree(out, indent + 1);
            }
            AstNode::ExprStmt { expr } => {
                let _ = writeln!(out, "{}ExpressionStatement", pad);
                match expr {
                    Some(expr) => expr.write_tree(out, indent + 1),
                    None => {
                        let _ = writeln!(out, "{}  (empty)", pad);
                    }
                }
            }
            AstNode::Read { name, loc } => {
                let _ = writeln!(
                    out,
                    "{}ReadStatement: {} (line {}, col {})",
                    pad, name, loc.line, loc.column
                );
            }
            AstNode::Write { expr } => {
                let _ = writeln!(out, "{}WriteStatement", pad);
                expr.write_tree(out, indent + 1);
            }
            AstNode::Binary { op, left, right } => {
                let _ = writeln!(out, "{}BinaryExpression: {}", pad, op);
                left.write_tree(out, indent + 1);
                right.write_tree(out, indent + 1);
            }
            AstNode::Ident { name, .. } => {
                let _ = writeln!(out, "{}Identifier: {}", pad, name);
            }
            AstNode::Number { value, .. } => {
                let _ = writeln!(out, "{}NumberLiteral: {}", pad, value);
            }
            AstNode::Empty => {
                let _ = writeln!(out, "{}Empty", pad);
            }
        }
    }
}

/// Render the whole tree from the root.
pub fn print_ast(root: &AstNode) -> String {
    let mut out = String::new();
    root.write_tree(&mut out, 0);
    out
}
