use bitvec::prelude::BitVec;
use std::collections::HashSet;

/// A transition label: a concrete input character or ε.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

/// Operations shared by both automaton kinds. States live in a dense
/// arena inside the automaton and are referenced by index only.
pub trait FA {
    fn show_fa(&self, file_name: &str);
    fn add_state(&mut self) -> usize;
    fn set_accept_state(&mut self, state_id: usize);
    fn get_num_states(&self) -> usize;
    fn get_start_state(&self) -> usize;
    fn get_alphabet(&self) -> &HashSet<char>;
    fn get_acceptor_states(&self) -> &BitVec<u8>;
    fn get_label(&self) -> &str;
}
