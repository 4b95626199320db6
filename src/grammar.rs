/* Grammar file loading and the FIRST/FOLLOW fixpoint computations that
 * feed predictive-table construction. One production per line, `|`
 * separates alternatives, the first left-hand side is the start symbol. */

use std::collections::{HashMap, HashSet};
use std::fs;

/// Grammar symbols are ordered by (kind, name) so they can serve as
/// stable map keys and sort keys during table export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Terminal(String),
    NonTerminal(String),
    Epsilon,
}

impl Symbol {
    pub fn terminal(name: &str) -> Symbol {
        Symbol::Terminal(name.to_string())
    }

    pub fn non_terminal(name: &str) -> Symbol {
        Symbol::NonTerminal(name.to_string())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn is_non_terminal(&self) -> bool {
        matches!(self, Symbol::NonTerminal(_))
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Symbol::Epsilon)
    }

    pub fn name(&self) -> &str {
        match self {
            Symbol::Terminal(name) => name,
            Symbol::NonTerminal(name) => name,
            Symbol::Epsilon => "ε",
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Terminal(name) => write!(f, "\"{}\"", name),
            Symbol::NonTerminal(name) => write!(f, "{}", name),
            Symbol::Epsilon => write!(f, "ε"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Production {
    pub left: Symbol,
    pub right: Vec<Symbol>,
    pub index: usize,
}

impl Production {
    pub fn is_epsilon(&self) -> bool {
        self.right.is_empty() || (self.right.len() == 1 && self.right[0].is_epsilon())
    }
}

impl std::fmt::Display for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ->", self.left)?;
        if self.is_epsilon() {
            write!(f, " ε")?;
        } else {
            for symbol in &self.right {
                write!(f, " {}", symbol)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum GrammarError {
    FileOpen(String),
    EmptyGrammar,
    MalformedLine(String),
}

impl std::fmt::Display for GrammarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrammarError::FileOpen(err_line) => write!(f, "{}", err_line),
            GrammarError::EmptyGrammar => {
                write!(f, "Error: No productions found in grammar file")
            }
            GrammarError::MalformedLine(line) => {
                write!(f, "Error: Malformed grammar line: {}", line)
            }
        }
    }
}

impl std::error::Error for GrammarError {}

#[derive(Debug, Clone)]
pub struct Grammar {
    start_symbol: Symbol,
    terminals: HashSet<Symbol>,
    non_terminals: HashSet<Symbol>,
    productions: Vec<Production>,
    first_sets: HashMap<Symbol, HashSet<Symbol>>,
    follow_sets: HashMap<Symbol, HashSet<Symbol>>,
}

impl Grammar {
    pub fn load_from_file(path: &str) -> Result<Grammar, GrammarError> {
        let text = fs::read_to_string(path).map_err(|error| {
            GrammarError::FileOpen(format!("Error: Failed to open grammar file: {}", error))
        })?;
        Grammar::from_text(&text)
    }

    pub fn from_text(text: &str) -> Result<Grammar, GrammarError> {
        let mut grammar = Grammar {
            start_symbol: Symbol::Epsilon,
            terminals: HashSet::new(),
            non_terminals: HashSet::new(),
            productions: Vec::new(),
            first_sets: HashMap::new(),
            follow_sets: HashMap::new(),
        };

        for line in text.lines() {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            grammar.parse_grammar_line(line)?;
        }

        if grammar.productions.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }

        grammar.start_symbol = grammar.productions[0].left.clone();
        grammar.compute_first_sets();
        grammar.compute_follow_sets();
        Ok(grammar)
    }

    fn parse_grammar_line(&mut self, line: &str) -> Result<(), GrammarError> {
        let mut parts = line.split_whitespace();

        let left = match parts.next() {
            Some(text) if text.starts_with('<') && text.ends_with('>') => {
                Symbol::non_terminal(text)
            }
            _ => return Err(GrammarError::MalformedLine(line.to_string())),
        };
        self.non_terminals.insert(left.clone());

        let mut right: Vec<Symbol> = Vec::new();

        for token in parts {
            if token == "|" {
                if right.is_empty() {
                    return Err(GrammarError::MalformedLine(line.to_string()));
                }
                self.push_production(left.clone(), std::mem::take(&mut right));
            } else if token == "ε" {
                right.push(Symbol::Epsilon);
            } else if token.starts_with('<') && token.ends_with('>') {
                let symbol = Symbol::non_terminal(token);
                self.non_terminals.insert(symbol.clone());
                right.push(symbol);
            } else {
                let symbol = Symbol::terminal(token);
                self.terminals.insert(symbol.clone());
                right.push(symbol);
            }
        }

        if right.is_empty() {
            return Err(GrammarError::MalformedLine(line.to_string()));
        }
        self.push_production(left, right);
        Ok(())
    }

    fn push_production(&mut self, left: Symbol, right: Vec<Symbol>) {
        let index = self.productions.len();
        self.productions.push(Production { left, right, index });
    }

    pub fn get_start_symbol(&self) -> &Symbol {
        &self.start_symbol
    }

    pub fn get_terminals(&self) -> &HashSet<Symbol> {
        &self.terminals
    }

    pub fn get_non_terminals(&self) -> &HashSet<Symbol> {
        &self.non_terminals
    }

    pub fn get_productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn first_of(&self, symbol: &Symbol) -> Option<&HashSet<Symbol>> {
        self.first_sets.get(symbol)
    }

    pub fn follow_of(&self, symbol: &Symbol) -> Option<&HashSet<Symbol>> {
        self.follow_sets.get(symbol)
    }

    /// FIRST of a symbol sequence with ε threading: a prefix of nullable
    /// non-terminals contributes its FIRST sets minus ε, and ε itself
    /// only if every symbol of the sequence is nullable.
    pub fn first_of_sequence(&self, symbols: &[Symbol]) -> HashSet<Symbol> {
        let mut result = HashSet::new();

        if symbols.is_empty() || symbols[0].is_epsilon() {
            result.insert(Symbol::Epsilon);
            return result;
        }

        for (i, symbol) in symbols.iter().enumerate() {
            if symbol.is_terminal() {
                result.insert(symbol.clone());
                break;
            }

            let first_set = match self.first_sets.get(symbol) {
                Some(set) => set,
                None => break,
            };

            for sym in first_set {
                if !sym.is_epsilon() {
                    result.insert(sym.clone());
                }
            }

            if !first_set.contains(&Symbol::Epsilon) {
                break;
            }

            if i == symbols.len() - 1 {
                result.insert(Symbol::Epsilon);
            }
        }
        result
    }

    fn compute_first_sets(&mut self) {
        for nt in &self.non_terminals {
            self.first_sets.insert(nt.clone(), HashSet::new());
        }

        let mut changed = true;
        while changed {
            changed = false;
            for prod_index in 0..self.productions.len() {
                let left = self.productions[prod_index].left.clone();
                let first_alpha = self.first_of_sequence(&self.productions[prod_index].right.clone());

                let entry = self.first_sets.get_mut(&left).unwrap();
                let before = entry.len();
                entry.extend(first_alpha);
                if entry.len() > before {
                    changed = true;
                }
            }
        }
    }

    fn compute_follow_sets(&mut self) {
        for nt in &self.non_terminals {
            self.follow_sets.insert(nt.clone(), HashSet::new());
        }
        self.follow_sets
            .get_mut(&self.start_symbol)
            .unwrap()
            .insert(Symbol::terminal("$"));

        let mut changed = true;
        while changed {
            changed = false;

            for prod_index in 0..self.productions.len() {
                let left = self.productions[prod_index].left.clone();
                let right = self.productions[prod_index].right.clone();

                for (i, symbol) in right.iter().enumerate() {
                    if !symbol.is_non_terminal() {
                        continue;
                    }

                    let beta = &right[i + 1..];
                    let beta_first = self.first_of_sequence(beta);
                    let follow_left = self.follow_sets.get(&left).cloned().unwrap_or_default();

                    let entry = self.follow_sets.get_mut(symbol).unwrap();
                    let before = entry.len();

                    for sym in &beta_first {
                        if !sym.is_epsilon() {
                            entry.insert(sym.clone());
                        }
                    }
                    if beta.is_empty() || beta_first.contains(&Symbol::Epsilon) {
                        entry.extend(follow_left);
                    }

                    if entry.len() > before {
                        changed = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod grammar_tests {
    use super::*;

    const EXPR_GRAMMAR: &str = "\
<E> <T> <E'>
<E'> + <T> <E'> | ε
<T> <F> <T'>
<T'> * <F> <T'> | ε
<F> ( <E> ) | id
";

    fn terminals(set: &HashSet<Symbol>) -> HashSet<String> {
        set.iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn test_load_and_index_productions() {
        let grammar = Grammar::from_text(EXPR_GRAMMAR).unwrap();
        assert_eq!(grammar.get_start_symbol(), &Symbol::non_terminal("<E>"));
        assert_eq!(grammar.get_productions().len(), 8);
        for (i, production) in grammar.get_productions().iter().enumerate() {
            assert_eq!(production.index, i);
        }
        // Alternatives split into separate productions
        assert!(grammar.get_productions()[2].is_epsilon());
        assert_eq!(grammar.get_productions()[7].right, vec![Symbol::terminal("id")]);
    }

    #[test]
    fn test_first_sets() {
        let grammar = Grammar::from_text(EXPR_GRAMMAR).unwrap();

        let first_e = terminals(grammar.first_of(&Symbol::non_terminal("<E>")).unwrap());
        assert_eq!(first_e, HashSet::from(["(".to_string(), "id".to_string()]));

        let first_ep = grammar.first_of(&Symbol::non_terminal("<E'>")).unwrap();
        assert!(first_ep.contains(&Symbol::terminal("+")));
        assert!(first_ep.contains(&Symbol::Epsilon));
        assert_eq!(first_ep.len(), 2);
    }

    #[test]
    fn test_follow_sets() {
        let grammar = Grammar::from_text(EXPR_GRAMMAR).unwrap();

        let follow_e = terminals(grammar.follow_of(&Symbol::non_terminal("<E>")).unwrap());
        assert_eq!(follow_e, HashSet::from(["$".to_string(), ")".to_string()]));

        let follow_t = terminals(grammar.follow_of(&Symbol::non_terminal("<T>")).unwrap());
        assert_eq!(
            follow_t,
            HashSet::from(["+".to_string(), "$".to_string(), ")".to_string()])
        );

        let follow_f = terminals(grammar.follow_of(&Symbol::non_terminal("<F>")).unwrap());
        assert_eq!(
            follow_f,
            HashSet::from([
                "*".to_string(),
                "+".to_string(),
                "$".to_string(),
                ")".to_string()
            ])
        );
    }

    #[test]
    fn test_first_subset_property() {
        // FIRST(α) ⊆ FIRST(A) for every production A → α.
        let grammar = Grammar::from_text(EXPR_GRAMMAR).unwrap();
        for production in grammar.get_productions() {
            let first_alpha = grammar.first_of_sequence(&production.right);
            let first_left = grammar.first_of(&production.left).unwrap();
            for sym in &first_alpha {
                assert!(
                    first_left.contains(sym),
                    "{} from {} missing in FIRST({})",
                    sym,
                    production,
                    production.left
                );
            }
        }
    }

    #[test]
    fn test_dollar_in_follow_of_start() {
        let grammar = Grammar::from_text(EXPR_GRAMMAR).unwrap();
        assert!(grammar
            .follow_of(grammar.get_start_symbol())
            .unwrap()
            .contains(&Symbol::terminal("$")));
    }

    #[test]
    fn test_malformed_line_rejected() {
        assert!(matches!(
            Grammar::from_text("not_a_non_terminal a b\n"),
            Err(GrammarError::MalformedLine(_))
        ));
        assert!(matches!(
            Grammar::from_text("<A>\n"),
            Err(GrammarError::MalformedLine(_))
        ));
        assert!(matches!(
            Grammar::from_text("\n# only comments\n"),
            Err(GrammarError::EmptyGrammar)
        ));
    }

    #[test]
    fn test_nullable_chain_threads_epsilon() {
        let grammar = Grammar::from_text("<S> <A> <B> x\n<A> a | ε\n<B> b | ε\n").unwrap();
        let first_s = grammar.first_of(&Symbol::non_terminal("<S>")).unwrap();
        assert!(first_s.contains(&Symbol::terminal("a")));
        assert!(first_s.contains(&Symbol::terminal("b")));
        assert!(first_s.contains(&Symbol::terminal("x")));
        assert!(!first_s.contains(&Symbol::Epsilon));
    }
}
