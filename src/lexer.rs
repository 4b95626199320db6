/* Table-driven maximal-munch scanner. The driver walks the DFA tables
 * recording the last accepting checkpoint and rewinds to it when the
 * automaton dies, so the longest labelled prefix always wins. */

use crate::dfa::DfaTables;

const KEYWORDS: [&str; 14] = [
    "if", "else", "while", "for", "return", "int", "float", "char", "string", "bool", "true",
    "false", "read", "write",
];

pub fn is_keyword(identifier: &str) -> bool {
    KEYWORDS.contains(&identifier)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    Keyword,
    DoubleOp,
    SingleOp,
    Division,
    CommentOpen,
    CommentClose,
    Singleword,
    Eof,
    Unknown,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Number => "NUMBER",
            TokenKind::Keyword => "KEYWORD",
            TokenKind::DoubleOp => "COMPARISON_DOUBLE",
            TokenKind::SingleOp => "COMPARISON_SINGLE",
            TokenKind::Division => "DIVISION",
            TokenKind::CommentOpen => "COMMENT_FIRST",
            TokenKind::CommentClose => "COMMENT_LAST",
            TokenKind::Singleword => "SINGLEWORD",
            TokenKind::Eof => "EOF",
            TokenKind::Unknown => "UNKNOWN",
        }
    }
}

/// Map a DFA accept label to the token kind the parser understands.
pub fn map_token_name(token_name: &str) -> TokenKind {
    match token_name {
        "<identifier>" => TokenKind::Identifier,
        "<number>" => TokenKind::Number,
        "<singleword>" => TokenKind::Singleword,
        "<comparison_double>" => TokenKind::DoubleOp,
        "<comparison_single>" => TokenKind::SingleOp,
        "<division>" => TokenKind::Division,
        "<commentfirst>" => TokenKind::CommentOpen,
        "<commentlast>" => TokenKind::CommentClose,
        _ => TokenKind::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: &str, line: usize, column: usize, offset: usize) -> Self {
        Token {
            kind,
            lexeme: lexeme.to_string(),
            line,
            column,
            offset,
        }
    }
}

#[derive(Debug)]
pub enum LexError {
    UnterminatedComment { line: usize, column: usize },
    IsolatedCommentClose { line: usize, column: usize },
    UnknownCharacter { ch: char, line: usize, column: usize },
}

impl LexError {
    pub fn location(&self) -> (usize, usize) {
        match self {
            LexError::UnterminatedComment { line, column }
            | LexError::IsolatedCommentClose { line, column }
            | LexError::UnknownCharacter { line, column, .. } => (*line, *column),
        }
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexError::UnterminatedComment { line, column } => {
                write!(f, "LexError (line {}, column {}): unterminated comment", line, column)
            }
            LexError::IsolatedCommentClose { line, column } => write!(
                f,
                "LexError (line {}, column {}): isolated comment end '*/' found",
                line, column
            ),
            LexError::UnknownCharacter { ch, line, column } => write!(
                f,
                "LexError (line {}, column {}): unknown character {:?}",
                line, column, ch
            ),
        }
    }
}

impl std::error::Error for LexError {}

pub struct Lexer<'a> {
    input: Vec<char>,
    tables: &'a DfaTables,
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &str, tables: &'a DfaTables) -> Self {
        Lexer {
            input: input.chars().collect(),
            tables,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() && ch != '\n' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self, open_line: usize, open_column: usize) -> Result<(), LexError> {
        while self.current_char().is_some() {
            if self.current_char() == Some('*') && self.peek_char(1) == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }
        Err(LexError::UnterminatedComment {
            line: open_line,
            column: open_column,
        })
    }

    /// Produce the next token. Comments are skipped here; newlines come
    /// out as synthesized Singleword tokens that `tokenize` drops.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let ch = match self.current_char() {
            None => {
                return Ok(Token::new(
                    TokenKind::Eof,
                    "",
                    self.line,
                    self.column,
                    self.position,
                ))
            }
            Some(ch) => ch,
        };

        if ch == '\n' {
            let token = Token::new(
                TokenKind::Singleword,
                "\\n",
                self.line,
                self.column,
                self.position,
            );
            self.advance();
            return Ok(token);
        }

        let token = self.run_dfa()?;

        if token.kind == TokenKind::CommentOpen {
            self.skip_comment(token.line, token.column)?;
            return self.next_token();
        }

        if token.kind == TokenKind::CommentClose {
            return Err(LexError::IsolatedCommentClose {
                line: token.line,
                column: token.column,
            });
        }

        Ok(token)
    }

    /// The maximal-munch core: walk the transition table, checkpoint at
    /// every accepting state, rewind to the last checkpoint when stuck.
    fn run_dfa(&mut self) -> Result<Token, LexError> {
        let start_pos = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let mut current_state = self.tables.start_state;
        let mut value = String::new();

        struct Checkpoint {
            state: usize,
            position: usize,
            line: usize,
            column: usize,
            value: String,
        }
        let mut last_accept: Option<Checkpoint> = None;

        loop {
            if self.tables.accept_states.contains_key(&current_state) {
                last_accept = Some(Checkpoint {
                    state: current_state,
                    position: self.position,
                    line: self.line,
                    column: self.column,
                    value: value.clone(),
                });
            }

            let ch = match self.current_char() {
                None => break,
                Some(ch) => ch,
            };

            let target = self
                .tables
                .transitions
                .get(&current_state)
                .and_then(|row| row.get(&ch));

            match target {
                Some(&next_state) => {
                    current_state = next_state;
                    value.push(ch);
                    self.advance();
                }
                None => break,
            }
        }

        if self.tables.accept_states.contains_key(&current_state) {
            last_accept = Some(Checkpoint {
                state: current_state,
                position: self.position,
                line: self.line,
                column: self.column,
                value,
            });
        }

        match last_accept {
            Some(checkpoint) => {
                self.position = checkpoint.position;
                self.line = checkpoint.line;
                self.column = checkpoint.column;

                let token_name = &self.tables.accept_states[&checkpoint.state];
                let mut kind = map_token_name(token_name);
                if kind == TokenKind::Identifier && is_keyword(&checkpoint.value) {
                    kind = TokenKind::Keyword;
                }

                Ok(Token::new(kind, &checkpoint.value, start_line, start_column, start_pos))
            }
            None => {
                // No prefix reached an accepting state: the character at
                // the start of the attempt is the offender.
                self.position = start_pos;
                self.line = start_line;
                self.column = start_column;
                let ch = self.current_char().unwrap_or('\0');
                self.advance();
                Err(LexError::UnknownCharacter {
                    ch,
                    line: start_line,
                    column: start_column,
                })
            }
        }
    }

    /// Run `next_token` to end of input, dropping synthesized newline
    /// tokens. The terminating `Eof` token is included.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            if token.kind == TokenKind::Singleword && token.lexeme == "\\n" {
                continue;
            }
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

/// Render a token stream in the generator's dump format:
/// `KIND lexeme line column`, one token per line.
pub fn format_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let lexeme = if token.lexeme.is_empty()
            || token.lexeme.chars().any(|c| c.is_whitespace())
        {
            format!("{:?}", token.lexeme)
        } else {
            token.lexeme.clone()
        };
        out.push_str(&format!(
            "{} {} {} {}\n",
            token.kind.as_str(),
            lexeme,
            token.line,
            token.column
        ));
    }
    out
}

/// Build the terminal-name view of a token for table lookup: identifiers
/// and numbers map to their class names, end of input maps to `$`, and
/// everything else is its literal text.
pub fn terminal_name(token: &Token) -> &str {
    match token.kind {
        TokenKind::Identifier => "IDENTIFIER",
        TokenKind::Number => "NUMBER",
        TokenKind::Eof => "$",
        _ => token.lexeme.as_str(),
    }
}

#[cfg(test)]
mod lexer_tests {
    use super::*;
    use crate::dfa::{construct_dfa, construct_minimal_dfa, DfaTables};
    use crate::regex::{build_combined_nfa, parse_rules_text};

    fn tables() -> DfaTables {
        let rules = parse_rules_text(include_str!("../data/lex_rules.txt"));
        let nfa = build_combined_nfa(rules).unwrap();
        let dfa = construct_minimal_dfa(&construct_dfa(&nfa));
        DfaTables::from_dfa(&dfa)
    }

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        let tables = tables();
        let mut lexer = Lexer::new(input, &tables);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.lexeme))
            .collect()
    }

    #[test]
    fn test_identifiers_and_keywords() {
        let tokens = kinds("int counter intx");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "int".to_string()),
                (TokenKind::Identifier, "counter".to_string()),
                (TokenKind::Identifier, "intx".to_string()),
                (TokenKind::Eof, "".to_string()),
            ]
        );
    }

    #[test]
    fn test_maximal_munch_on_operators() {
        let tokens = kinds("<= < == = a<=b");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::DoubleOp, "<=".to_string()),
                (TokenKind::SingleOp, "<".to_string()),
                (TokenKind::DoubleOp, "==".to_string()),
                (TokenKind::Singleword, "=".to_string()),
                (TokenKind::Identifier, "a".to_string()),
                (TokenKind::DoubleOp, "<=".to_string()),
                (TokenKind::Identifier, "b".to_string()),
                (TokenKind::Eof, "".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers_and_arithmetic() {
        let tokens = kinds("x=3+41*5/2;");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Identifier, "x".to_string()),
                (TokenKind::Singleword, "=".to_string()),
                (TokenKind::Number, "3".to_string()),
                (TokenKind::Singleword, "+".to_string()),
                (TokenKind::Number, "41".to_string()),
                (TokenKind::Singleword, "*".to_string()),
                (TokenKind::Number, "5".to_string()),
                (TokenKind::Division, "/".to_string()),
                (TokenKind::Number, "2".to_string()),
                (TokenKind::Singleword, ";".to_string()),
                (TokenKind::Eof, "".to_string()),
            ]
        );
    }

    #[test]
    fn test_comment_elision() {
        let with_comment = kinds("{ int x; /* set x */ x = 1; }");
        let without_comment = kinds("{ int x; x = 1; }");
        assert_eq!(with_comment, without_comment);
    }

    #[test]
    fn test_multiline_comment_and_positions() {
        let tables = tables();
        let mut lexer = Lexer::new("a\n/* two\nlines */\nb", &tables);
        let tokens = lexer.tokenize().unwrap();
        assert_eq!(tokens[0].lexeme, "a");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!(tokens[1].lexeme, "b");
        assert_eq!((tokens[1].line, tokens[1].column), (4, 1));
    }

    #[test]
    fn test_unterminated_comment() {
        let tables = tables();
        let mut lexer = Lexer::new("x = 1;\n  /* never closed", &tables);
        let error = lexer.tokenize().unwrap_err();
        match error {
            LexError::UnterminatedComment { line, column } => {
                assert_eq!((line, column), (2, 3));
            }
            other => panic!("Expected UnterminatedComment, got {:?}", other),
        }
    }

    #[test]
    fn test_isolated_comment_close() {
        let tables = tables();
        let mut lexer = Lexer::new("x */ y", &tables);
        let error = lexer.tokenize().unwrap_err();
        assert!(matches!(error, LexError::IsolatedCommentClose { .. }));
    }

    #[test]
    fn test_unknown_character() {
        let tables = tables();
        let mut lexer = Lexer::new("x = @;", &tables);
        let error = lexer.tokenize().unwrap_err();
        match error {
            LexError::UnknownCharacter { ch, line, column } => {
                assert_eq!(ch, '@');
                assert_eq!((line, column), (1, 5));
            }
            other => panic!("Expected UnknownCharacter, got {:?}", other),
        }
    }

    #[test]
    fn test_line_column_tracking() {
        let tables = tables();
        let mut lexer = Lexer::new("int a;\n  a = 1;", &tables);
        let tokens = lexer.tokenize().unwrap();

        let a_decl = &tokens[1];
        assert_eq!((a_decl.line, a_decl.column), (1, 5));
        let a_use = &tokens[3];
        assert_eq!((a_use.line, a_use.column), (2, 3));

        // Leaf positions never go backwards
        let mut last = (0, 0);
        for token in &tokens {
            assert!((token.line, token.column) >= last);
            last = (token.line, token.column);
        }
    }

    #[test]
    fn test_terminal_name_mapping() {
        let tables = tables();
        let mut lexer = Lexer::new("while x 42 <=", &tables);
        let tokens = lexer.tokenize().unwrap();
        let names: Vec<&str> = tokens.iter().map(terminal_name).collect();
        assert_eq!(names, vec!["while", "IDENTIFIER", "NUMBER", "<=", "$"]);
    }

    #[test]
    fn test_token_dump_format() {
        let tables = tables();
        let mut lexer = Lexer::new("read x;", &tables);
        let tokens = lexer.tokenize().unwrap();
        let dump = format_tokens(&tokens);
        assert!(dump.starts_with("KEYWORD read 1 1\n"));
        assert!(dump.contains("IDENTIFIER x 1 6\n"));
        assert!(dump.contains("SINGLEWORD ; 1 7\n"));
    }
}
