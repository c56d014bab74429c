//! `Clause`: a compiled graph-pattern triple, one position per datom field
//! that a query can range over (`spec.md` §6's `Clause := [Term, Term,
//! Term]`, after prefix expansion and Ident resolution have already run).
//!
//! Generalises the teacher's `query/clause.rs` `DataPattern` (four
//! `Pattern<u64>` positions including `tx`) down to the three positions
//! `spec.md`'s wire `Clause` actually exposes — `tx` visibility is handled
//! entirely by `AsOfView`, never by the query language itself — and widens
//! `entity`/`attribute` from `u64` to [`Ident`] and `value` to [`Value`].

use std::rc::Rc;

use crate::datom::Value;
use crate::ident::Ident;
use crate::query::pattern::Pattern;

#[derive(Clone, Debug, Default)]
pub struct Clause {
    pub entity: Pattern<Ident>,
    pub attribute: Pattern<Ident>,
    pub value: Pattern<Value>,
}

impl Clause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: Pattern<Ident>) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_attribute(mut self, attribute: Pattern<Ident>) -> Self {
        self.attribute = attribute;
        self
    }

    pub fn with_value(mut self, value: Pattern<Value>) -> Self {
        self.value = value;
        self
    }

    /// Every variable name this clause binds, in entity/attribute/value
    /// order, duplicated if the same name appears in more than one
    /// position (e.g. `[?x, a, ?x]`) — callers that need a set should
    /// collect into one themselves.
    pub fn free_variables(&self) -> Vec<Rc<str>> {
        let mut variables = Vec::with_capacity(3);
        if let Some(name) = self.entity.variable_name() {
            variables.push(Rc::from(name));
        }
        if let Some(name) = self.attribute.variable_name() {
            variables.push(Rc::from(name));
        }
        if let Some(name) = self.value.variable_name() {
            variables.push(Rc::from(name));
        }
        variables
    }
}
