/* Thompson construction of rule NFAs and union of all rule NFAs into
 * one combined NFA. Fragments always have exactly one start and one
 * accept state; constructors copy their arguments so no two automata
 * ever share a state. */

use bitvec::prelude::*;
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::process::Command;

use crate::fa::{Symbol, FA};
use crate::regex::Quantifier;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NFAState {
    id: usize,
    transitions: HashMap<Symbol, HashSet<usize>>,
    token_name: Option<String>,
    priority: i32,
    rule_index: usize,
}

impl NFAState {
    fn new(id: usize) -> Self {
        NFAState {
            id,
            transitions: HashMap::new(),
            token_name: None,
            priority: 0,
            rule_index: usize::MAX,
        }
    }

    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.entry(symbol).or_default().insert(to);
    }

    pub fn get_transitions(&self) -> &HashMap<Symbol, HashSet<usize>> {
        &self.transitions
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_token_name(&self) -> Option<&str> {
        self.token_name.as_deref()
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    pub fn get_rule_index(&self) -> usize {
        self.rule_index
    }
}

#[derive(Debug, Clone)]
pub struct NFA {
    states: Vec<NFAState>,
    start_state: usize,
    accept_state: usize,
    accept_states: BitVec<u8>,
    alphabet: HashSet<char>,
    label: String,
}

impl FA for NFA {
    fn show_fa(&self, file_name: &str) {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for state in &self.states {
            let node = graph.add_node(format!("State {}", state.id));
            node_map.insert(state.id, node);
        }

        for state in &self.states {
            for (symbol, targets) in &state.transitions {
                for target in targets {
                    let symbol_str = match symbol {
                        Symbol::Char(c) => c.to_string(),
                        Symbol::Epsilon => "𝛆".to_string(),
                    };
                    graph.add_edge(node_map[&state.id], node_map[target], symbol_str);
                }
            }
        }

        let start_node = node_map[&self.start_state];
        graph[start_node] = format!("Start\nState {}", self.start_state);

        for accept in self.accept_states.iter_ones() {
            let accept_node = node_map[&accept];
            graph[accept_node] = format!("Accept\nState {}", accept);
        }

        let dot = Dot::new(&graph);

        let dot_filename = format!("{}.dot", file_name);
        match File::create(&dot_filename).and_then(|mut f| f.write_all(dot.to_string().as_bytes()))
        {
            Ok(()) => {}
            Err(err) => {
                eprintln!("Warning: failed to write {}: {}", dot_filename, err);
                return;
            }
        }

        match Command::new("dot")
            .args(["-Tjpg", &dot_filename, "-o", &format!("{}.jpg", file_name)])
            .output()
        {
            Ok(_) => println!("NFA visualization saved as {}.jpg", file_name),
            Err(_) => println!("NFA dot file saved as {} (Graphviz not available)", dot_filename),
        }
    }

    fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(NFAState::new(state_id));
        self.accept_states.push(false);
        state_id
    }

    fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
        self.accept_state = state_id;
    }

    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_start_state(&self) -> usize {
        self.start_state
    }

    fn get_alphabet(&self) -> &HashSet<char> {
        &self.alphabet
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_label(&self) -> &str {
        &self.label
    }
}

impl NFA {
    fn new() -> Self {
        NFA {
            states: Vec::new(),
            start_state: 0,
            accept_state: 0,
            accept_states: BitVec::new(),
            alphabet: HashSet::new(),
            label: String::new(),
        }
    }

    pub fn get_state(&self, id: usize) -> &NFAState {
        match self.states.get(id) {
            Some(state) => state,
            None => panic!("Invalid state index provided"),
        }
    }

    pub fn get_accept_state(&self) -> usize {
        self.accept_state
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        self.states[from].add_transition(symbol, to);
    }

    /// Tag the accept state with the rule it recognizes. Labels survive
    /// the union construction and drive DFA state labelling later.
    pub fn tag_accept(&mut self, token_name: &str, priority: i32, rule_index: usize) {
        let accept = self.accept_state;
        self.states[accept].token_name = Some(token_name.to_string());
        self.states[accept].priority = priority;
        self.states[accept].rule_index = rule_index;
    }

    /// Copy every state of `other` into `self`, renumbering by offset.
    /// Token labels ride along with their states.
    fn absorb(&mut self, other: NFA) -> usize {
        let offset = self.states.len();

        for mut state in other.states {
            state.id += offset;
            let mut new_transitions = HashMap::new();

            for (symbol, targets) in state.transitions {
                let new_targets: HashSet<usize> = targets.into_iter().map(|t| t + offset).collect();
                new_transitions.insert(symbol, new_targets);
            }
            state.transitions = new_transitions;
            self.states.push(state);
            self.accept_states.push(false);
        }

        self.alphabet.extend(other.alphabet.iter());
        offset
    }

    /// Two states, one transition on `character`.
    pub fn literal(character: char) -> NFA {
        let mut result = NFA::new();
        let start_state = result.add_state();
        let end_state = result.add_state();
        result.alphabet.insert(character);
        result.add_transition(start_state, Symbol::Char(character), end_state);

        result.start_state = start_state;
        result.set_accept_state(end_state);
        result
    }

    /// A then B: ε from A's accept to B's start.
    pub fn concatenate(first: NFA, second: NFA) -> NFA {
        let mut result = NFA::new();

        let first_start = first.start_state;
        let first_accept = first.accept_state;
        let second_start = second.start_state;
        let second_accept = second.accept_state;

        let offset1 = result.absorb(first);
        let offset2 = result.absorb(second);

        result.add_transition(first_accept + offset1, Symbol::Epsilon, second_start + offset2);

        result.start_state = first_start + offset1;
        result.set_accept_state(second_accept + offset2);
        result
    }

    /// A or B: fresh start forks into both, both accepts join a fresh accept.
    pub fn alternation(first: NFA, second: NFA) -> NFA {
        let mut result = NFA::new();
        let new_start = result.add_state();

        let first_start = first.start_state;
        let first_accept = first.accept_state;
        let second_start = second.start_state;
        let second_accept = second.accept_state;

        let offset1 = result.absorb(first);
        result.add_transition(new_start, Symbol::Epsilon, first_start + offset1);

        let offset2 = result.absorb(second);
        result.add_transition(new_start, Symbol::Epsilon, second_start + offset2);

        let new_accept = result.add_state();
        result.add_transition(first_accept + offset1, Symbol::Epsilon, new_accept);
        result.add_transition(second_accept + offset2, Symbol::Epsilon, new_accept);

        result.start_state = new_start;
        result.set_accept_state(new_accept);
        result
    }

    /// Kleene star or positive closure over A.
    pub fn closure(nfa: NFA, quantifier: Quantifier) -> NFA {
        let mut result = NFA::new();
        let new_start = result.add_state();

        let inner_start = nfa.start_state;
        let inner_accept = nfa.accept_state;

        let offset = result.absorb(nfa);
        result.add_transition(new_start, Symbol::Epsilon, inner_start + offset);

        let new_accept = result.add_state();
        if let Quantifier::Star = quantifier {
            // Zero repetitions are allowed
            result.add_transition(new_start, Symbol::Epsilon, new_accept);
        }

        result.add_transition(inner_accept + offset, Symbol::Epsilon, inner_start + offset);
        result.add_transition(inner_accept + offset, Symbol::Epsilon, new_accept);

        result.start_state = new_start;
        result.set_accept_state(new_accept);
        result
    }

    fn epsilon_closure_set(&self, seed: &[usize]) -> BitVec<u8> {
        let mut closure: BitVec<u8, Lsb0> = BitVec::repeat(false, self.states.len());
        let mut stack: Vec<usize> = seed.to_vec();

        for &s in seed {
            closure.set(s, true);
        }

        while let Some(state) = stack.pop() {
            if let Some(targets) = self.states[state].transitions.get(&Symbol::Epsilon) {
                for &target in targets {
                    if !closure[target] {
                        closure.set(target, true);
                        stack.push(target);
                    }
                }
            }
        }
        closure
    }

    /// Simulate the automaton over `input`; true iff the final state set
    /// contains the accept state.
    pub fn accepts(&self, input: &str) -> bool {
        match self.simulate(input) {
            Some(current) => current[self.accept_state],
            None => false,
        }
    }

    /// Simulate and return the winning token label, if any: among
    /// labelled states in the final set, highest priority wins, ties go
    /// to the earliest rule.
    pub fn match_label(&self, input: &str) -> Option<String> {
        let current = self.simulate(input)?;
        let mut best: Option<(&NFAState, i32, usize)> = None;
        for id in current.iter_ones() {
            let state = &self.states[id];
            if state.token_name.is_none() {
                continue;
            }
            let candidate = (state, state.priority, state.rule_index);
            best = match best {
                None => Some(candidate),
                Some(b) if candidate.1 > b.1 || (candidate.1 == b.1 && candidate.2 < b.2) => {
                    Some(candidate)
                }
                Some(b) => Some(b),
            };
        }
        best.and_then(|(state, _, _)| state.token_name.clone())
    }

    fn simulate(&self, input: &str) -> Option<BitVec<u8>> {
        let mut current = self.epsilon_closure_set(&[self.start_state]);

        for ch in input.chars() {
            let mut next_seed = Vec::new();
            for id in current.iter_ones() {
                if let Some(targets) = self.states[id].transitions.get(&Symbol::Char(ch)) {
                    next_seed.extend(targets.iter().copied());
                }
            }
            if next_seed.is_empty() {
                return None;
            }
            current = self.epsilon_closure_set(&next_seed);
        }
        Some(current)
    }
}

/// Union all per-rule NFAs under a fresh start/accept pair. The original
/// rule accepts keep their token labels as intermediate states.
pub fn combine_nfas(rule_nfas: Vec<NFA>) -> NFA {
    let mut combined = NFA::new();
    combined.label = "combined".to_string();
    let new_start = combined.add_state();

    let mut rule_accepts = Vec::new();

    for nfa in rule_nfas {
        let rule_start = nfa.start_state;
        let rule_accept = nfa.accept_state;
        let offset = combined.absorb(nfa);

        combined.add_transition(new_start, Symbol::Epsilon, rule_start + offset);
        rule_accepts.push(rule_accept + offset);
    }

    let new_accept = combined.add_state();
    for accept in rule_accepts {
        combined.add_transition(accept, Symbol::Epsilon, new_accept);
    }

    combined.start_state = new_start;
    combined.set_accept_state(new_accept);
    combined
}
