/* Subset construction of the combined NFA into a DFA, partition
 * refinement into the minimal DFA, and export of the transition/accept
 * tables the scanner consumes. A DFA state is accepting iff some backing
 * NFA state carries a token label; the combined NFA's plain accept state
 * does not make a DFA state accepting on its own. */

use bitvec::prelude::*;
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::Write;
use std::process::Command;

use crate::fa::{Symbol, FA};
use crate::nfa::NFA;

#[derive(Debug, Clone)]
pub struct DFAState {
    id: usize,
    transitions: HashMap<char, usize>,
    token_name: Option<String>,
    priority: i32,
    rule_index: usize,
    nfa_set: BitVec<u8>,
}

impl DFAState {
    fn new(id: usize) -> Self {
        DFAState {
            id,
            transitions: HashMap::new(),
            token_name: None,
            priority: 0,
            rule_index: usize::MAX,
            nfa_set: BitVec::new(),
        }
    }

    pub fn get_transitions(&self) -> &HashMap<char, usize> {
        &self.transitions
    }

    pub fn get_token_name(&self) -> Option<&str> {
        self.token_name.as_deref()
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    pub fn get_nfa_set(&self) -> &BitVec<u8> {
        &self.nfa_set
    }
}

#[derive(Debug, Clone)]
pub struct DFA {
    states: Vec<DFAState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    alphabet: HashSet<char>,
    label: String,
}

impl FA for DFA {
    fn show_fa(&self, file_name: &str) {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for state in &self.states {
            let node = graph.add_node(format!("State {}", state.id));
            node_map.insert(state.id, node);
        }

        for state in &self.states {
            for (symbol, target) in &state.transitions {
                graph.add_edge(node_map[&state.id], node_map[target], symbol.to_string());
            }
        }

        let start_node = node_map[&self.start_state];
        graph[start_node] = format!("Start\nState {}", self.start_state);

        for accept in self.accept_states.iter_ones() {
            let accept_node = node_map[&accept];
            let token = self.states[accept].token_name.as_deref().unwrap_or("");
            graph[accept_node] = format!("{}\nAccept\nState {}", token, accept);
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
            Ok(_) => println!("DFA visualization saved as {}.jpg", file_name),
            Err(_) => println!("DFA dot file saved as {} (Graphviz not available)", dot_filename),
        }
    }

    fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(DFAState::new(state_id));
        self.accept_states.push(false);
        state_id
    }

    fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
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

impl DFA {
    fn new() -> Self {
        DFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            alphabet: HashSet::new(),
            label: String::new(),
        }
    }

    pub fn get_state(&self, id: usize) -> &DFAState {
        match self.states.get(id) {
            Some(state) => state,
            None => panic!("Invalid state index provided"),
        }
    }

    fn add_transition(&mut self, from: usize, symbol: char, to: usize) {
        self.states[from].transitions.insert(symbol, to);
    }

    pub fn is_accepting(&self, state_id: usize) -> bool {
        self.accept_states[state_id]
    }

    /// Walk the DFA over `input`; true iff the final state is labelled.
    pub fn accepts(&self, input: &str) -> bool {
        self.match_label(input).is_some()
    }

    /// Walk the DFA over `input` and return the final state's label.
    pub fn match_label(&self, input: &str) -> Option<String> {
        let mut state = self.start_state;
        for ch in input.chars() {
            state = *self.states[state].transitions.get(&ch)?;
        }
        self.states[state].token_name.clone()
    }
}

/// The set of NFA states reachable from `nfa_states` via ε-transitions
/// alone, including the seed states.
pub fn get_epsilon_closure(nfa: &NFA, nfa_states: &BitVec<u8>) -> BitVec<u8> {
    let num_states = nfa.get_num_states();

    let mut epsilon_closure: BitVec<u8, Lsb0> = BitVec::repeat(false, num_states);
    let mut work: VecDeque<usize> = nfa_states.iter_ones().collect();

    for state in nfa_states.iter_ones() {
        epsilon_closure.set(state, true);
    }

    while let Some(state) = work.pop_front() {
        let transitions = nfa.get_state(state).get_transitions();
        if let Some(targets) = transitions.get(&Symbol::Epsilon) {
            for &target in targets {
                if !epsilon_closure[target] {
                    epsilon_closure.set(target, true);
                    work.push_back(target);
                }
            }
        }
    }
    epsilon_closure
}

/// The set of NFA states reachable from `q` on character `c`.
pub fn delta(nfa: &NFA, q: &BitVec<u8>, c: char) -> BitVec<u8> {
    let mut result = BitVec::repeat(false, q.len());
    for node in q.iter_ones() {
        let transitions = nfa.get_state(node).get_transitions();
        if let Some(target_state_ids) = transitions.get(&Symbol::Char(c)) {
            for &state_id in target_state_ids {
                result.set(state_id, true);
            }
        }
    }
    result
}

/// Pick the token label for a DFA state backed by `nfa_set`: highest
/// priority wins, equal priorities with different names warn and resolve
/// to the earliest rule.
fn label_state(nfa: &NFA, nfa_set: &BitVec<u8>) -> Option<(String, i32, usize)> {
    let mut best: Option<(String, i32, usize)> = None;

    for id in nfa_set.iter_ones() {
        let state = nfa.get_state(id);
        let name = match state.get_token_name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let priority = state.get_priority();
        let rule_index = state.get_rule_index();

        best = match best {
            None => Some((name, priority, rule_index)),
            Some((bname, bprio, brule)) => {
                if priority > bprio {
                    Some((name, priority, rule_index))
                } else if priority == bprio && name != bname {
                    eprintln!(
                        "Warning: token priority tie between {} and {}, keeping earlier rule",
                        bname, name
                    );
                    if rule_index < brule {
                        Some((name, priority, rule_index))
                    } else {
                        Some((bname, bprio, brule))
                    }
                } else {
                    Some((bname, bprio, brule))
                }
            }
        };
    }
    best
}

/// Subset construction. DFA state numbering is deterministic: the
/// alphabet is walked in sorted order.
pub fn construct_dfa(nfa: &NFA) -> DFA {
    let mut result = DFA::new();
    result.alphabet = nfa.get_alphabet().clone();
    result.label = format!("{}_dfa", nfa.get_label());

    let mut alphabet: Vec<char> = result.alphabet.iter().copied().collect();
    alphabet.sort_unstable();

    let mut seed = BitVec::repeat(false, nfa.get_num_states());
    seed.set(nfa.get_start_state(), true);
    let q0 = get_epsilon_closure(nfa, &seed);

    let d0 = result.add_state();
    result.start_state = d0;
    result.states[d0].nfa_set = q0.clone();
    if let Some((name, priority, rule_index)) = label_state(nfa, &q0) {
        result.states[d0].token_name = Some(name);
        result.states[d0].priority = priority;
        result.states[d0].rule_index = rule_index;
        result.set_accept_state(d0);
    }

    let mut q_list: HashMap<BitVec<u8>, usize> = HashMap::new();
    q_list.insert(q0.clone(), d0);

    let mut work_list = VecDeque::new();
    work_list.push_back(q0);

    while let Some(q) = work_list.pop_front() {
        for &c in alphabet.iter() {
            let end_states = delta(nfa, &q, c);
            if end_states.not_any() {
                continue;
            }
            let t = get_epsilon_closure(nfa, &end_states);

            let dt = match q_list.get(&t) {
                Some(&dt) => dt,
                None => {
                    let dt = result.add_state();
                    result.states[dt].nfa_set = t.clone();
                    if let Some((name, priority, rule_index)) = label_state(nfa, &t) {
                        result.states[dt].token_name = Some(name);
                        result.states[dt].priority = priority;
                        result.states[dt].rule_index = rule_index;
                        result.set_accept_state(dt);
                    }
                    q_list.insert(t.clone(), dt);
                    work_list.push_back(t);
                    dt
                }
            };

            let dq = q_list[&q];
            result.add_transition(dq, c, dt);
        }
    }
    result
}

/// Partition refinement to the minimal DFA. The initial partition keeps
/// distinct token labels in distinct blocks so minimization never merges
/// two different tokens.
pub fn construct_minimal_dfa(dfa: &DFA) -> DFA {
    let num_states = dfa.get_num_states();

    let mut alphabet: Vec<char> = dfa.get_alphabet().iter().copied().collect();
    alphabet.sort_unstable();

    // Initial partition: one block of non-accepting states, one block
    // per distinct token name.
    let mut blocks: Vec<Vec<usize>> = Vec::new();
    let mut non_accepting: Vec<usize> = Vec::new();
    let mut by_token: BTreeMap<&str, Vec<usize>> = BTreeMap::new();

    for state_id in 0..num_states {
        match dfa.states[state_id].token_name.as_deref() {
            Some(name) => by_token.entry(name).or_default().push(state_id),
            None => non_accepting.push(state_id),
        }
    }
    if !non_accepting.is_empty() {
        blocks.push(non_accepting);
    }
    blocks.extend(by_token.into_values());

    // Refine to fixpoint: split every block by the signature of where
    // each member goes, measured in block indices.
    loop {
        let mut state_block = vec![0usize; num_states];
        for (block_id, block) in blocks.iter().enumerate() {
            for &state in block {
                state_block[state] = block_id;
            }
        }

        let mut next_blocks: Vec<Vec<usize>> = Vec::new();
        let mut split_any = false;

        for block in blocks.iter() {
            let mut groups: Vec<(Vec<i64>, Vec<usize>)> = Vec::new();

            for &state in block {
                let signature: Vec<i64> = alphabet
                    .iter()
                    .map(|c| match dfa.states[state].transitions.get(c) {
                        Some(&target) => state_block[target] as i64,
                        None => -1,
                    })
                    .collect();

                match groups.iter_mut().find(|(sig, _)| *sig == signature) {
                    Some((_, members)) => members.push(state),
                    None => groups.push((signature, vec![state])),
                }
            }

            if groups.len() > 1 {
                split_any = true;
            }
            next_blocks.extend(groups.into_iter().map(|(_, members)| members));
        }

        blocks = next_blocks;
        if !split_any {
            break;
        }
    }

    // Rebuild: one state per block, representative transitions rewired
    // through the block mapping. The block holding the old start becomes
    // the new start, with the old start as its representative.
    let mut state_block = vec![0usize; num_states];
    for (block_id, block) in blocks.iter().enumerate() {
        for &state in block {
            state_block[state] = block_id;
        }
    }

    let mut result = DFA::new();
    result.alphabet = dfa.alphabet.clone();
    result.label = format!("{}_min", dfa.label);

    for block in blocks.iter() {
        let id = result.add_state();
        let representative = if block.contains(&dfa.start_state) {
            dfa.start_state
        } else {
            block[0]
        };
        let old = &dfa.states[representative];
        result.states[id].token_name = old.token_name.clone();
        result.states[id].priority = old.priority;
        result.states[id].rule_index = old.rule_index;
        result.states[id].nfa_set = old.nfa_set.clone();
        if old.token_name.is_some() {
            result.set_accept_state(id);
        }
    }

    for (block_id, block) in blocks.iter().enumerate() {
        let representative = if block.contains(&dfa.start_state) {
            dfa.start_state
        } else {
            block[0]
        };
        for (&c, &target) in dfa.states[representative].transitions.iter() {
            result.add_transition(block_id, c, state_block[target]);
        }
    }

    result.start_state = state_block[dfa.start_state];
    result
}

/// The serializable scanner tables: everything the runtime lexer needs.
#[derive(Debug, Clone)]
pub struct DfaTables {
    pub start_state: usize,
    pub state_count: usize,
    pub transitions: HashMap<usize, HashMap<char, usize>>,
    pub accept_states: HashMap<usize, String>,
}

impl DfaTables {
    pub fn from_dfa(dfa: &DFA) -> Self {
        let mut transitions: HashMap<usize, HashMap<char, usize>> = HashMap::new();
        let mut accept_states = HashMap::new();

        for state in dfa.states.iter() {
            if !state.transitions.is_empty() {
                transitions.insert(state.id, state.transitions.clone());
            }
            if let Some(name) = &state.token_name {
                accept_states.insert(state.id, name.clone());
            }
        }

        DfaTables {
            start_state: dfa.start_state,
            state_count: dfa.get_num_states(),
            transitions,
            accept_states,
        }
    }

    /// Render the tables as a Rust constant-data module, the embedded
    /// form the runtime can compile in instead of rebuilding at startup.
    pub fn export_rust_source(&self) -> String {
        let mut out = String::new();
        out.push_str("// Generated scanner tables. Do not edit by hand.\n\n");
        out.push_str(&format!("pub const DFA_START_STATE: usize = {};\n", self.start_state));
        out.push_str(&format!("pub const DFA_STATE_COUNT: usize = {};\n\n", self.state_count));

        out.push_str("pub const DFA_TRANSITIONS: &[(usize, char, usize)] = &[\n");
        let mut entries: Vec<(usize, char, usize)> = Vec::new();
        for (&from, row) in self.transitions.iter() {
            for (&ch, &to) in row.iter() {
                entries.push((from, ch, to));
            }
        }
        entries.sort_unstable();
        for (from, ch, to) in entries {
            out.push_str(&format!("    ({}, {:?}, {}),\n", from, ch, to));
        }
        out.push_str("];\n\n");

        out.push_str("pub const DFA_ACCEPT_STATES: &[(usize, &str)] = &[\n");
        let mut accepts: Vec<(usize, &String)> = self.accept_states.iter().map(|(k, v)| (*k, v)).collect();
        accepts.sort_unstable_by_key(|(id, _)| *id);
        for (id, name) in accepts {
            out.push_str(&format!("    ({}, {:?}),\n", id, name));
        }
        out.push_str("];\n");
        out
    }
}

#[cfg(test)]
mod dfa_tests {
    use super::*;
    use crate::regex::{build_combined_nfa, LexRule};

    fn rule(name: &str, pattern: &str, priority: i32) -> LexRule {
        LexRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            priority,
        }
    }

    fn sample_nfa() -> NFA {
        build_combined_nfa(vec![
            rule("<letter>", "a|b|c|i|f", 0),
            rule("<identifier>", "<letter>(<letter>|0|1)*", 10),
            rule("<number>", "(0|1)(0|1)*", 10),
            rule("<if>", "if", 20),
        ])
        .unwrap()
    }

    #[test]
    fn test_subset_construction_is_deterministic() {
        let nfa = sample_nfa();
        let first = construct_dfa(&nfa);
        let second = construct_dfa(&nfa);
        assert_eq!(first.get_num_states(), second.get_num_states());
        assert_eq!(first.get_start_state(), second.get_start_state());
    }

    #[test]
    fn test_dfa_agrees_with_nfa() {
        let nfa = sample_nfa();
        let dfa = construct_dfa(&nfa);
        let minimal = construct_minimal_dfa(&dfa);

        let samples = [
            "a", "ab", "abc01", "0", "01", "10", "if", "i", "f", "2", "a2", "", "0a",
        ];
        for w in samples {
            assert_eq!(nfa.accepts(w), dfa.accepts(w), "dfa disagrees on {:?}", w);
            assert_eq!(
                dfa.accepts(w),
                minimal.accepts(w),
                "minimal dfa disagrees on {:?}",
                w
            );
            assert_eq!(
                nfa.match_label(w),
                dfa.match_label(w),
                "label disagrees on {:?}",
                w
            );
            assert_eq!(
                dfa.match_label(w),
                minimal.match_label(w),
                "minimal label disagrees on {:?}",
                w
            );
        }
    }

    #[test]
    fn test_priority_labelling() {
        // "if" is accepted by both <identifier> and <if>; the higher
        // priority keyword rule must label the state.
        let nfa = sample_nfa();
        let dfa = construct_dfa(&nfa);
        assert_eq!(dfa.match_label("if"), Some("<if>".to_string()));
        assert_eq!(dfa.match_label("ifa"), Some("<identifier>".to_string()));
    }

    #[test]
    fn test_minimization_reduces_and_is_idempotent() {
        let nfa = sample_nfa();
        let dfa = construct_dfa(&nfa);
        let minimal = construct_minimal_dfa(&dfa);
        assert!(minimal.get_num_states() <= dfa.get_num_states());

        let again = construct_minimal_dfa(&minimal);
        assert_eq!(again.get_num_states(), minimal.get_num_states());
    }

    #[test]
    fn test_minimization_merges_equivalent_states() {
        // a|b compiles into parallel branches whose accepting ends are
        // equivalent; minimization must fold them.
        let nfa = build_combined_nfa(vec![rule("<t>", "(a|b)(a|b)", 10)]).unwrap();
        let dfa = construct_dfa(&nfa);
        let minimal = construct_minimal_dfa(&dfa);
        assert!(minimal.get_num_states() < dfa.get_num_states());
        assert!(minimal.accepts("ab"));
        assert!(minimal.accepts("ba"));
        assert!(!minimal.accepts("a"));
        assert!(!minimal.accepts("aba"));
    }

    #[test]
    fn test_final_states_keep_labels() {
        let nfa = sample_nfa();
        let minimal = construct_minimal_dfa(&construct_dfa(&nfa));
        for accept in minimal.get_acceptor_states().iter_ones() {
            assert!(minimal.get_state(accept).get_token_name().is_some());
        }
    }

    #[test]
    fn test_tables_roundtrip() {
        let nfa = sample_nfa();
        let minimal = construct_minimal_dfa(&construct_dfa(&nfa));
        let tables = DfaTables::from_dfa(&minimal);

        assert_eq!(tables.state_count, minimal.get_num_states());
        assert_eq!(tables.start_state, minimal.get_start_state());
        assert_eq!(
            tables.accept_states.len(),
            minimal.get_acceptor_states().count_ones()
        );

        let source = tables.export_rust_source();
        assert!(source.contains("DFA_START_STATE"));
        assert!(source.contains("DFA_TRANSITIONS"));
        assert!(source.contains("<identifier>"));
    }
}
