/* Stack-driven LL(1) parser. The parse stack holds grammar symbols and
 * reduction markers; popping a marker pops the production's built
 * children off a parallel AST stack and dispatches on the left-hand
 * side. Left associativity of the arithmetic and relational operators is
 * synthesized by plugging the left operand into the leftmost hole of the
 * prime-chain Binary skeleton. */

use crate::ast::{AstNode, Loc};
use crate::grammar::{Grammar, Production, Symbol};
use crate::lexer::{terminal_name, Token, TokenKind};
use crate::ll1::LL1Table;

#[derive(Debug)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    NoRule {
        non_terminal: String,
        found: String,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    pub fn location(&self) -> (usize, usize) {
        match self {
            ParseError::UnexpectedToken { line, column, .. }
            | ParseError::NoRule { line, column, .. } => (*line, *column),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnexpectedToken {
                expected,
                found,
                line,
                column,
            } => write!(
                f,
                "SyntaxError (line {}, column {}): expected '{}', found '{}'",
                line, column, expected, found
            ),
            ParseError::NoRule {
                non_terminal,
                found,
                line,
                column,
            } => write!(
                f,
                "SyntaxError (line {}, column {}): unexpected '{}' while parsing {}",
                line, column, found, non_terminal
            ),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone)]
enum StackEntry {
    Sym(Symbol),
    Reduce(usize),
}

pub struct Parser<'a> {
    grammar: &'a Grammar,
    table: &'a LL1Table,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    /// The token stream must end with the lexer's `Eof` token.
    pub fn new(grammar: &'a Grammar, table: &'a LL1Table, tokens: Vec<Token>) -> Self {
        Parser {
            grammar,
            table,
            tokens,
            position: 0,
        }
    }

    fn current_token(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn found_text(token: &Token) -> String {
        if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            token.lexeme.clone()
        }
    }

    pub fn parse(&mut self) -> Result<AstNode, ParseError> {
        let mut stack: Vec<StackEntry> = vec![
            StackEntry::Sym(Symbol::terminal("$")),
            StackEntry::Sym(self.grammar.get_start_symbol().clone()),
        ];
        let mut ast_stack: Vec<AstNode> = Vec::new();

        while let Some(top) = stack.last().cloned() {
            let token = self.current_token().clone();
            let lookahead = terminal_name(&token).to_string();

            match top {
                StackEntry::Reduce(index) => {
                    stack.pop();
                    self.reduce(index, &mut ast_stack);
                }
                StackEntry::Sym(Symbol::Terminal(name)) if name == "$" => {
                    if lookahead == "$" {
                        stack.pop();
                        return Ok(ast_stack.pop().unwrap_or(AstNode::Empty));
                    }
                    return Err(ParseError::UnexpectedToken {
                        expected: "end of input".to_string(),
                        found: Self::found_text(&token),
                        line: token.line,
                        column: token.column,
                    });
                }
                StackEntry::Sym(Symbol::Terminal(name)) => {
                    if name == lookahead {
                        stack.pop();
                        ast_stack.push(Self::leaf(&token));
                        self.position += 1;
                    } else {
                        return Err(ParseError::UnexpectedToken {
                            expected: name,
                            found: Self::found_text(&token),
                            line: token.line,
                            column: token.column,
                        });
                    }
                }
                StackEntry::Sym(Symbol::NonTerminal(name)) => {
                    let non_terminal = Symbol::NonTerminal(name);
                    match self.table.lookup(self.grammar, &non_terminal, &lookahead) {
                        Some(index) => {
                            stack.pop();
                            stack.push(StackEntry::Reduce(index));
                            let production = &self.grammar.get_productions()[index];
                            if !production.is_epsilon() {
                                for symbol in production.right.iter().rev() {
                                    stack.push(StackEntry::Sym(symbol.clone()));
                                }
                            }
                        }
                        None => {
                            return Err(ParseError::NoRule {
                                non_terminal: non_terminal.name().to_string(),
                                found: Self::found_text(&token),
                                line: token.line,
                                column: token.column,
                            });
                        }
                    }
                }
                StackEntry::Sym(Symbol::Epsilon) => {
                    stack.pop();
                }
            }
        }

        Ok(ast_stack.pop().unwrap_or(AstNode::Empty))
    }

    /// Terminal leaves: identifiers and numbers keep their lexeme and
    /// location; keywords, operators and punctuation become Ident nodes
    /// carrying their literal text for later operator extraction.
    fn leaf(token: &Token) -> AstNode {
        let loc = Loc::new(token.line, token.column);
        match token.kind {
            TokenKind::Number => AstNode::Number {
                value: token.lexeme.clone(),
                loc,
            },
            _ => AstNode::Ident {
                name: token.lexeme.clone(),
                loc,
            },
        }
    }

    fn reduce(&self, index: usize, ast_stack: &mut Vec<AstNode>) {
        let production = &self.grammar.get_productions()[index];

        if production.is_epsilon() {
            ast_stack.push(Self::empty_node_for(production));
            return;
        }

        let k = production.right.len();
        debug_assert!(ast_stack.len() >= k, "AST stack underflow at {}", production);
        let children: Vec<AstNode> = ast_stack.split_off(ast_stack.len() - k);

        ast_stack.push(Self::build_node(production, children));
    }

    /// ε reductions: the list non-terminals contribute empty lists,
    /// everything else an Empty placeholder.
    fn empty_node_for(production: &Production) -> AstNode {
        match production.left.name() {
            "<declaration_list>" => AstNode::DeclList(Vec::new()),
            "<statement_list>" => AstNode::StmtList(Vec::new()),
            _ => AstNode::Empty,
        }
    }

    fn build_node(production: &Production, mut children: Vec<AstNode>) -> AstNode {
        match production.left.name() {
            "<program>" => {
                // { <declaration_list> <statement_list> }
                let stmts = children.swap_remove(2);
                let decls = children.swap_remove(1);
                AstNode::Program {
                    decls: Box::new(decls),
                    stmts: Box::new(stmts),
                }
            }
            "<declaration_list>" => {
                let rest = children.pop().unwrap_or(AstNode::Empty);
                let head = children.pop().unwrap_or(AstNode::Empty);
                let mut items = vec![head];
                if let AstNode::DeclList(rest_items) = rest {
                    items.extend(rest_items);
                }
                AstNode::DeclList(items)
            }
            "<declaration_stat>" => {
                // int IDENTIFIER ;
                let (name, loc) = Self::ident_parts(&children[1]);
                let var_type = Self::op_text(&children[0]);
                AstNode::Decl {
                    var_type,
                    name,
                    loc,
                }
            }
            "<statement_list>" => {
                let rest = children.pop().unwrap_or(AstNode::Empty);
                let head = children.pop().unwrap_or(AstNode::Empty);
                let mut items = vec![head];
                if let AstNode::StmtList(rest_items) = rest {
                    items.extend(rest_items);
                }
                AstNode::StmtList(items)
            }
            "<if_stat>" => {
                // if ( <expression> ) <statement> <else_part>
                let else_part = children.swap_remove(5);
                let then_branch = children.swap_remove(4);
                let cond = children.swap_remove(2);
                AstNode::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: if else_part.is_empty() {
                        None
                    } else {
                        Some(Box::new(else_part))
                    },
                }
            }
            "<else_part>" => children.swap_remove(1),
            "<while_stat>" => {
                // while ( <expression> ) <statement>
                let body = children.swap_remove(4);
                let cond = children.swap_remove(2);
                AstNode::While {
                    cond: Box::new(cond),
                    body: Box::new(body),
                }
            }
            "<for_stat>" => {
                // for ( <expression> ; <expression> ; <expression> ) <statement>
                let body = children.swap_remove(8);
                let update = children.swap_remove(6);
                let cond = children.swap_remove(4);
                let init = children.swap_remove(2);
                AstNode::For {
                    init: Box::new(init),
                    cond: Box::new(cond),
                    update: Box::new(update),
                    body: Box::new(body),
                }
            }
            "<read_stat>" => {
                // read IDENTIFIER ;
                let (name, loc) = Self::ident_parts(&children[1]);
                AstNode::Read { name, loc }
            }
            "<write_stat>" => {
                // write <expression> ;
                AstNode::Write {
                    expr: Box::new(children.swap_remove(1)),
                }
            }
            "<compound_stat>" => AstNode::Compound {
                stmts: Box::new(children.swap_remove(1)),
            },
            "<expression_stat>" => {
                if production.right[0].is_terminal() {
                    // the lone `;` statement
                    AstNode::ExprStmt { expr: None }
                } else {
                    AstNode::ExprStmt {
                        expr: Some(Box::new(children.swap_remove(0))),
                    }
                }
            }
            "<expression>" | "<additive_expr>" | "<term>" => {
                let prime = children.swap_remove(1);
                let operand = children.swap_remove(0);
                if prime.is_empty() {
                    operand
                } else {
                    plug_leftmost(prime, operand)
                }
            }
            "<expression_prime>" => {
                // <rel_op> <additive_expr>  or  = <expression>
                let right = children.swap_remove(1);
                let op = Self::op_text(&children[0]);
                AstNode::Binary {
                    op,
                    left: Box::new(AstNode::Empty),
                    right: Box::new(right),
                }
            }
            "<additive_expr_prime>" | "<term_prime>" => {
                // op <operand> <prime>
                let rest = children.swap_remove(2);
                let operand = children.swap_remove(1);
                let op = Self::op_text(&children[0]);
                let inner = AstNode::Binary {
                    op,
                    left: Box::new(AstNode::Empty),
                    right: Box::new(operand),
                };
                if rest.is_empty() {
                    inner
                } else {
                    plug_leftmost(rest, inner)
                }
            }
            "<factor>" => {
                if children.len() == 3 {
                    // ( <expression> )
                    children.swap_remove(1)
                } else {
                    children.swap_remove(0)
                }
            }
            _ => {
                if children.is_empty() {
                    AstNode::Empty
                } else {
                    children.swap_remove(0)
                }
            }
        }
    }

    fn ident_parts(node: &AstNode) -> (String, Loc) {
        match node {
            AstNode::Ident { name, loc } => (name.clone(), *loc),
            _ => (String::new(), Loc::default()),
        }
    }

    fn op_text(node: &AstNode) -> String {
        match node {
            AstNode::Ident { name, .. } => name.clone(),
            _ => String::new(),
        }
    }
}

/// Descend the left spine of a Binary skeleton and fill its hole.
fn plug_leftmost(skeleton: AstNode, value: AstNode) -> AstNode {
    match skeleton {
        AstNode::Binary { op, left, right } => {
            if left.is_empty() {
                AstNode::Binary {
                    op,
                    left: Box::new(value),
                    right,
                }
            } else {
                AstNode::Binary {
                    op,
                    left: Box::new(plug_leftmost(*left, value)),
                    right,
                }
            }
        }
        other => other,
    }
}
