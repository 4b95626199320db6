/* Lexical rule compilation: load the rule file, expand macros, insert
 * explicit concatenation, convert each rule to postfix and interpret the
 * postfix with a stack of Thompson fragments. Rules with priority 0 are
 * macros and are only ever substituted textually. */

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::nfa::{combine_nfas, NFA};

#[derive(Debug, Clone, Copy)]
pub enum Quantifier {
    Star,
    Plus,
}

#[derive(Debug, Clone)]
pub struct LexRule {
    pub name: String,
    pub pattern: String,
    pub priority: i32,
}

impl LexRule {
    pub fn is_macro(&self) -> bool {
        self.priority == 0
    }
}

#[derive(Debug)]
pub enum RegexError {
    MalformedRule(String),
    UndefinedMacro { macro_name: String, rule: String },
    MacroCycle(String),
    InvalidRegex { rule: String, reason: String },
    UnterminatedEscape(String),
    UnbalancedParenthesis(String),
    NoRules,
    FileOpen(String),
    FileRead(String),
}

impl std::fmt::Display for RegexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegexError::MalformedRule(line) => {
                write!(f, "Error: Invalid rule format in line: {}", line)
            }
            RegexError::UndefinedMacro { macro_name, rule } => {
                write!(f, "Error: Undefined macro {} in rule {}", macro_name, rule)
            }
            RegexError::MacroCycle(rule) => write!(
                f,
                "Warning: Maximum macro expansion iterations reached while expanding {}. \
                 Check for circular macro definitions.",
                rule
            ),
            RegexError::InvalidRegex { rule, reason } => {
                write!(f, "Error: Invalid regex for rule {}: {}", rule, reason)
            }
            RegexError::UnterminatedEscape(rule) => {
                write!(f, "Error: Incomplete escape sequence in rule {}", rule)
            }
            RegexError::UnbalancedParenthesis(rule) => {
                write!(f, "Error: Unbalanced parenthesis in rule {}", rule)
            }
            RegexError::NoRules => write!(f, "Error: No lexical rules could be compiled"),
            RegexError::FileOpen(err_line) => write!(f, "{}", err_line),
            RegexError::FileRead(err_line) => write!(f, "{}", err_line),
        }
    }
}

impl std::error::Error for RegexError {}

/// Read the rule file. Lines are `<name> <regex> [priority]`; `#` starts
/// a comment and blank lines are skipped. File order is rule order.
pub fn read_rules_file(file_path: &str) -> Result<Vec<LexRule>, RegexError> {
    let file_path = PathBuf::from(file_path);

    let file = match File::open(&file_path) {
        Ok(file) => file,
        Err(error) => {
            let err_line = format!("Error: Failed to open the rules file: {}", error);
            return Err(RegexError::FileOpen(err_line));
        }
    };
    let reader = BufReader::new(file);

    let mut text = String::new();
    for (line_number, line) in reader.lines().enumerate() {
        match line {
            Ok(line) => {
                text.push_str(&line);
                text.push('\n');
            }
            Err(error) => {
                let err_line = format!(
                    "Error: Failed to read line {} in rules file: {}",
                    line_number, error
                );
                return Err(RegexError::FileRead(err_line));
            }
        }
    }

    Ok(parse_rules_text(&text))
}

/// Parse rule-file text already in memory (the shipped defaults are
/// embedded with `include_str!`). Malformed lines are reported and
/// skipped.
pub fn parse_rules_text(text: &str) -> Vec<LexRule> {
    let mut rules = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        match parse_rule_line(line) {
            Some(rule) => rules.push(rule),
            None => eprintln!("{}", RegexError::MalformedRule(line.to_string())),
        }
    }
    rules
}

pub fn parse_rule_line(line: &str) -> Option<LexRule> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let pattern = parts.next()?;

    if !name.starts_with('<') || !name.ends_with('>') || name.len() < 3 {
        return None;
    }

    let priority = match parts.next() {
        Some(text) => text.parse::<i32>().ok()?,
        None => 0,
    };

    Some(LexRule {
        name: name.to_string(),
        pattern: pattern.to_string(),
        priority,
    })
}

/// One unit of a regex: a plain character or an escaped one. Escapes are
/// kept as units so the operator passes never misread them.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Unit {
    Plain(char),
    Escaped(char),
}

fn units_of(pattern: &str, rule: &str) -> Result<Vec<Unit>, RegexError> {
    let mut units = Vec::new();
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) => units.push(Unit::Escaped(next)),
                None => return Err(RegexError::UnterminatedEscape(rule.to_string())),
            }
        } else {
            units.push(Unit::Plain(ch));
        }
    }
    Ok(units)
}

fn render(units: &[Unit]) -> String {
    let mut out = String::new();
    for unit in units {
        match unit {
            Unit::Plain(ch) => out.push(*ch),
            Unit::Escaped(ch) => {
                out.push('\\');
                out.push(*ch);
            }
        }
    }
    out
}

/// Insert the explicit concat symbol between the two characters of the
/// relational double operators so later passes treat them as literals.
pub fn protect_double_operators(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();

    let mut i = 0;
    while i < chars.len() {
        out.push(chars[i]);
        if i + 1 < chars.len()
            && matches!(chars[i], '<' | '>' | '=' | '!')
            && chars[i + 1] == '='
        {
            out.push('.');
        }
        i += 1;
    }
    out
}

fn is_macro_name(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expand `<name>` references by textual substitution, parenthesizing
/// the macro body. Bounded at 10 passes; self-references are skipped and
/// undefined macros reported.
pub fn expand_macros(rules: &mut [LexRule]) -> Vec<RegexError> {
    const MAX_ITERATIONS: usize = 10;
    let mut errors: Vec<RegexError> = Vec::new();

    let mut changed = true;
    let mut iteration = 0;

    while changed && iteration < MAX_ITERATIONS {
        changed = false;
        iteration += 1;

        let table: std::collections::HashMap<String, String> = rules
            .iter()
            .map(|r| (r.name.clone(), r.pattern.clone()))
            .collect();

        for rule in rules.iter_mut() {
            let chars: Vec<char> = rule.pattern.chars().collect();
            let mut out = String::new();
            let mut i = 0;

            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    out.push(chars[i]);
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if chars[i] == '<' {
                    if let Some(close) = chars[i + 1..].iter().position(|&c| c == '>') {
                        let content: String = chars[i + 1..i + 1 + close].iter().collect();
                        if is_macro_name(&content) {
                            let reference = format!("<{}>", content);
                            if reference == rule.name {
                                // A macro never substitutes into itself
                                out.push(chars[i]);
                                i += 1;
                                continue;
                            }
                            match table.get(&reference) {
                                Some(body) => {
                                    out.push('(');
                                    out.push_str(body);
                                    out.push(')');
                                    changed = true;
                                    i += close + 2;
                                    continue;
                                }
                                None => {
                                    if !errors.iter().any(|e| matches!(e,
                                        RegexError::UndefinedMacro { macro_name, rule: r }
                                            if *macro_name == reference && *r == rule.name))
                                    {
                                        errors.push(RegexError::UndefinedMacro {
                                            macro_name: reference,
                                            rule: rule.name.clone(),
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
                out.push(chars[i]);
                i += 1;
            }
            rule.pattern = out;
        }
    }

    if changed {
        errors.push(RegexError::MacroCycle("rule set".to_string()));
    }
    errors
}

fn is_operator(ch: char) -> bool {
    matches!(ch, '|' | '.' | '*' | '+' | '(' | ')')
}

/// Insert the explicit concat operator between adjacent atoms: the left
/// side must end an operand (atom, closure or close paren) and the right
/// side must begin one (atom, open paren or escape).
pub fn insert_explicit_concat(pattern: &str, rule: &str) -> Result<String, RegexError> {
    let units = units_of(pattern, rule)?;
    let mut out: Vec<Unit> = Vec::new();

    for (i, unit) in units.iter().enumerate() {
        out.push(*unit);

        if i + 1 >= units.len() {
            continue;
        }

        let left_closes = match unit {
            Unit::Escaped(_) => true,
            Unit::Plain(ch) => !is_operator(*ch) || matches!(ch, ')' | '*' | '+'),
        };
        let right_opens = match units[i + 1] {
            Unit::Escaped(_) => true,
            Unit::Plain(ch) => !is_operator(ch) || ch == '(',
        };

        if left_closes && right_opens {
            out.push(Unit::Plain('.'));
        }
    }
    Ok(render(&out))
}

fn precedence(op: char) -> u8 {
    match op {
        '*' | '+' => 3,
        '.' => 2,
        '|' => 1,
        _ => 0,
    }
}

fn is_left_associative(op: char) -> bool {
    !matches!(op, '*' | '+')
}

/// Shunting-yard conversion of a preprocessed (explicit-concat) regex.
pub fn infix_to_postfix(pattern: &str, rule: &str) -> Result<String, RegexError> {
    let units = units_of(pattern, rule)?;
    let mut postfix: Vec<Unit> = Vec::new();
    let mut ops: Vec<char> = Vec::new();

    for unit in units {
        match unit {
            Unit::Escaped(_) => postfix.push(unit),
            Unit::Plain('(') => ops.push('('),
            Unit::Plain(')') => {
                loop {
                    match ops.pop() {
                        Some('(') => break,
                        Some(op) => postfix.push(Unit::Plain(op)),
                        None => {
                            return Err(RegexError::UnbalancedParenthesis(rule.to_string()))
                        }
                    }
                }
            }
            Unit::Plain(ch) if matches!(ch, '.' | '|' | '*' | '+') => {
                while let Some(&top) = ops.last() {
                    if top == '(' {
                        break;
                    }
                    if precedence(top) > precedence(ch)
                        || (precedence(top) == precedence(ch) && is_left_associative(ch))
                    {
                        postfix.push(Unit::Plain(top));
                        ops.pop();
                    } else {
                        break;
                    }
                }
                ops.push(ch);
            }
            Unit::Plain(_) => postfix.push(unit),
        }
    }

    while let Some(op) = ops.pop() {
        if op == '(' {
            return Err(RegexError::UnbalancedParenthesis(rule.to_string()));
        }
        postfix.push(Unit::Plain(op));
    }

    Ok(render(&postfix))
}

/// Interpret a postfix regex with a stack of NFA fragments.
pub fn compile_postfix(postfix: &str, rule: &str) -> Result<NFA, RegexError> {
    let units = units_of(postfix, rule)?;
    let mut stack: Vec<NFA> = Vec::new();

    let underflow = |reason: &str| RegexError::InvalidRegex {
        rule: rule.to_string(),
        reason: reason.to_string(),
    };

    for unit in units {
        match unit {
            Unit::Plain('|') => {
                let second = stack.pop().ok_or_else(|| underflow("missing operand for |"))?;
                let first = stack.pop().ok_or_else(|| underflow("missing operand for |"))?;
                stack.push(NFA::alternation(first, second));
            }
            Unit::Plain('.') => {
                let second = stack.pop().ok_or_else(|| underflow("missing operand for concat"))?;
                let first = stack.pop().ok_or_else(|| underflow("missing operand for concat"))?;
                stack.push(NFA::concatenate(first, second));
            }
            Unit::Plain('*') => {
                let inner = stack.pop().ok_or_else(|| underflow("missing operand for *"))?;
                stack.push(NFA::closure(inner, Quantifier::Star));
            }
            Unit::Plain('+') => {
                let inner = stack.pop().ok_or_else(|| underflow("missing operand for +"))?;
                stack.push(NFA::closure(inner, Quantifier::Plus));
            }
            Unit::Plain(ch) => stack.push(NFA::literal(ch)),
            Unit::Escaped(ch) => stack.push(NFA::literal(ch)),
        }
    }

    if stack.len() != 1 {
        return Err(RegexError::InvalidRegex {
            rule: rule.to_string(),
            reason: format!("final fragment stack size is {}", stack.len()),
        });
    }
    Ok(stack.pop().unwrap())
}

/// Run the whole pipeline over a rule list: protect double operators,
/// expand macros, compile every non-macro rule and union the results.
/// A rule that fails to compile is reported and skipped.
pub fn build_combined_nfa(mut rules: Vec<LexRule>) -> Result<NFA, RegexError> {
    for rule in rules.iter_mut() {
        rule.pattern = protect_double_operators(&rule.pattern);
    }

    for error in expand_macros(&mut rules) {
        eprintln!("{}", error);
    }

    let mut rule_nfas = Vec::new();

    for (rule_index, rule) in rules.iter().enumerate() {
        if rule.is_macro() {
            continue;
        }

        let compiled = insert_explicit_concat(&rule.pattern, &rule.name)
            .and_then(|explicit| infix_to_postfix(&explicit, &rule.name))
            .and_then(|postfix| compile_postfix(&postfix, &rule.name));

        match compiled {
            Ok(mut nfa) => {
                nfa.set_label(&rule.name);
                nfa.tag_accept(&rule.name, rule.priority, rule_index);
                rule_nfas.push(nfa);
            }
            Err(error) => {
                eprintln!("{}", error);
                eprintln!("Skipping rule {}", rule.name);
            }
        }
    }

    if rule_nfas.is_empty() {
        return Err(RegexError::NoRules);
    }
    Ok(combine_nfas(rule_nfas))
}

#[cfg(test)]
mod regex_tests {
    use super::*;

    fn rule(name: &str, pattern: &str, priority: i32) -> LexRule {
        LexRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            priority,
        }
    }

    #[test]
    fn test_parse_rule_line() {
        let parsed = parse_rule_line("<identifier> <letter>(<letter>|<digit>)* 10").unwrap();
        assert_eq!(parsed.name, "<identifier>");
        assert_eq!(parsed.pattern, "<letter>(<letter>|<digit>)*");
        assert_eq!(parsed.priority, 10);

        let implicit = parse_rule_line("<letter> a|b").unwrap();
        assert_eq!(implicit.priority, 0);
        assert!(implicit.is_macro());

        assert!(parse_rule_line("identifier a|b 10").is_none());
        assert!(parse_rule_line("<identifier>").is_none());
    }

    #[test]
    fn test_protect_double_operators() {
        assert_eq!(protect_double_operators("<=|>=|==|!="), "<.=|>.=|=.=|!.=");
        assert_eq!(protect_double_operators("abc"), "abc");
        assert_eq!(protect_double_operators("="), "=");
    }

    #[test]
    fn test_macro_expansion() {
        let mut rules = vec![
            rule("<letter>", "a|b", 0),
            rule("<identifier>", "<letter><letter>*", 10),
        ];
        let errors = expand_macros(&mut rules);
        assert!(errors.is_empty());
        assert_eq!(rules[1].pattern, "(a|b)(a|b)*");
    }

    #[test]
    fn test_nested_macro_expansion() {
        let mut rules = vec![
            rule("<digit>", "0|1", 0),
            rule("<letter>", "a|<digit>", 0),
            rule("<word>", "<letter>*", 10),
        ];
        let errors = expand_macros(&mut rules);
        assert!(errors.is_empty());
        assert_eq!(rules[2].pattern, "(a|(0|1))*");
    }

    #[test]
    fn test_undefined_macro_reported() {
        let mut rules = vec![rule("<word>", "<letter>*", 10)];
        let errors = expand_macros(&mut rules);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            RegexError::UndefinedMacro { macro_name, .. } if macro_name == "<letter>"
        ));
    }

    #[test]
    fn test_self_reference_skipped() {
        let mut rules = vec![rule("<loop>", "a<loop>", 0)];
        let errors = expand_macros(&mut rules);
        assert!(errors.is_empty());
        assert_eq!(rules[0].pattern, "a<loop>");
    }

    #[test]
    fn test_macro_cycle_bounded() {
        let mut rules = vec![
            rule("<a>", "<b>", 0),
            rule("<b>", "<c>", 0),
            rule("<c>", "<a>", 0),
        ];
        let errors = expand_macros(&mut rules);
        assert!(errors
            .iter()
            .any(|e| matches!(e, RegexError::MacroCycle(_))));
    }

    #[test]
    fn test_protected_operator_is_not_a_macro() {
        let mut rules = vec![rule("<comparison_double>", "<.=|>.=|=.=|!.=", 20)];
        let errors = expand_macros(&mut rules);
        assert!(errors.is_empty());
        assert_eq!(rules[0].pattern, "<.=|>.=|=.=|!.=");
    }

    #[test]
    fn test_insert_explicit_concat() {
        assert_eq!(insert_explicit_concat("ab", "<t>").unwrap(), "a.b");
        assert_eq!(insert_explicit_concat("a|b", "<t>").unwrap(), "a|b");
        assert_eq!(insert_explicit_concat("(a|b)c", "<t>").unwrap(), "(a|b).c");
        assert_eq!(insert_explicit_concat("a*b", "<t>").unwrap(), "a*.b");
        assert_eq!(insert_explicit_concat("a\\*b", "<t>").unwrap(), "a.\\*.b");
        assert_eq!(insert_explicit_concat("/\\*", "<t>").unwrap(), "/.\\*");
    }

    #[test]
    fn test_infix_to_postfix() {
        assert_eq!(infix_to_postfix("a.b", "<t>").unwrap(), "ab.");
        assert_eq!(infix_to_postfix("a|b", "<t>").unwrap(), "ab|");
        assert_eq!(infix_to_postfix("a.b|c", "<t>").unwrap(), "ab.c|");
        assert_eq!(infix_to_postfix("(a|b).c", "<t>").unwrap(), "ab|c.");
        assert_eq!(infix_to_postfix("a.b*", "<t>").unwrap(), "ab*.");
        assert_eq!(infix_to_postfix("/.\\*", "<t>").unwrap(), "/\\*.");
        assert!(matches!(
            infix_to_postfix("(a.b", "<t>"),
            Err(RegexError::UnbalancedParenthesis(_))
        ));
    }

    #[test]
    fn test_compile_postfix() {
        let nfa = compile_postfix("ab|c.", "<t>").unwrap();
        assert!(nfa.accepts("ac"));
        assert!(nfa.accepts("bc"));
        assert!(!nfa.accepts("c"));
        assert!(!nfa.accepts("abc"));
    }

    #[test]
    fn test_compile_postfix_underflow() {
        assert!(matches!(
            compile_postfix("a|", "<t>"),
            Err(RegexError::InvalidRegex { .. })
        ));
        assert!(matches!(
            compile_postfix("ab", "<t>"),
            Err(RegexError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_unterminated_escape() {
        assert!(matches!(
            infix_to_postfix("a\\", "<t>"),
            Err(RegexError::UnterminatedEscape(_))
        ));
    }

    #[test]
    fn test_build_combined_nfa_skips_bad_rule() {
        let rules = vec![
            rule("<good>", "ab", 10),
            rule("<bad>", "a|", 10),
            rule("<other>", "c", 10),
        ];
        let combined = build_combined_nfa(rules).unwrap();
        assert_eq!(combined.match_label("ab"), Some("<good>".to_string()));
        assert_eq!(combined.match_label("c"), Some("<other>".to_string()));
    }

    #[test]
    fn test_identifier_pipeline() {
        let rules = vec![
            rule("<letter>", "a|b|c", 0),
            rule("<digit>", "0|1", 0),
            rule("<identifier>", "<letter>(<letter>|<digit>)*", 10),
            rule("<number>", "<digit><digit>*", 10),
        ];
        let combined = build_combined_nfa(rules).unwrap();
        assert_eq!(combined.match_label("abc01"), Some("<identifier>".to_string()));
        assert_eq!(combined.match_label("10"), Some("<number>".to_string()));
        assert_eq!(combined.match_label("0a"), None);
    }
}
