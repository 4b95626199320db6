use clap::{Arg, Command};
use color_eyre::eyre::Result;
use std::fs;

use minicc::fa::FA;
use minicc::lexer::format_tokens;
use minicc::{
    build_combined_nfa, construct_dfa, construct_minimal_dfa, parse_rules_text, print_ast,
    read_rules_file, DfaTables, Grammar, LL1Table, Lexer, ParseTables, Parser,
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Command::new("minicc")
        .version("1.0")
        .about("A table-driven compiler front-end for the mini imperative language")
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("The source file to compile")
                .required(true),
        )
        .arg(
            Arg::new("rules")
                .long("rules")
                .value_name("FILE")
                .help("Lexical rule file overriding the built-in rules"),
        )
        .arg(
            Arg::new("grammar")
                .long("grammar")
                .value_name("FILE")
                .help("Grammar file overriding the built-in grammar"),
        )
        .arg(
            Arg::new("emit-tokens")
                .long("emit-tokens")
                .help("Print the token stream before parsing")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save-nfa")
                .short('n')
                .long("save-nfa")
                .help("Save the combined NFA after Thompson Construction")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save-dfa")
                .short('d')
                .long("save-dfa")
                .help("Save the un-optimized DFA obtained after Subset Construction")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save-minimal-dfa")
                .short('m')
                .long("save-minimal-dfa")
                .help("Save the minimal DFA after partition refinement")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dump-dfa-tables")
                .long("dump-dfa-tables")
                .value_name("FILE")
                .help("Write the generated scanner tables as a Rust module"),
        )
        .arg(
            Arg::new("dump-parse-tables")
                .long("dump-parse-tables")
                .value_name("FILE")
                .help("Write the generated parser tables as a Rust module"),
        )
        .get_matches();

    // Scanner tables are rebuilt at startup from the rule file and stay
    // immutable afterwards.
    let rules = match args.get_one::<String>("rules") {
        Some(path) => read_rules_file(path)?,
        None => parse_rules_text(include_str!("../data/lex_rules.txt")),
    };

    let nfa = build_combined_nfa(rules)?;
    if args.get_flag("save-nfa") {
        nfa.show_fa("combined_nfa");
    }

    let dfa = construct_dfa(&nfa);
    if args.get_flag("save-dfa") {
        dfa.show_fa("combined_dfa");
    }

    let minimal_dfa = construct_minimal_dfa(&dfa);
    if args.get_flag("save-minimal-dfa") {
        minimal_dfa.show_fa("combined_dfa_min");
    }

    let dfa_tables = DfaTables::from_dfa(&minimal_dfa);
    if let Some(path) = args.get_one::<String>("dump-dfa-tables") {
        fs::write(path, dfa_tables.export_rust_source())?;
        println!("Scanner tables written to {}", path);
    }

    let grammar = match args.get_one::<String>("grammar") {
        Some(path) => Grammar::load_from_file(path)?,
        None => Grammar::from_text(include_str!("../data/grammar.txt"))?,
    };
    let table = LL1Table::build(&grammar)?;

    if let Some(path) = args.get_one::<String>("dump-parse-tables") {
        let parse_tables = ParseTables::from_grammar(&grammar, &table);
        fs::write(path, parse_tables.export_rust_source())?;
        println!("Parser tables written to {}", path);
    }

    let source_path = args.get_one::<String>("source").unwrap();
    let source = fs::read_to_string(source_path)?;

    let mut lexer = Lexer::new(&source, &dfa_tables);
    let tokens = lexer.tokenize()?;

    if args.get_flag("emit-tokens") {
        print!("{}", format_tokens(&tokens));
    }

    let ast = Parser::new(&grammar, &table, tokens).parse()?;
    print!("{}", print_ast(&ast));

    Ok(())
}
