//! `Resolver`: the backtracking join over per-clause cursors that turns a
//! compiled clause list into a stream of [`Assignment`]s.
//!
//! Kept from the teacher's `query/resolver.rs` `Resolver`/`Frame` almost
//! exactly: probe the current clause with a `Restricts` built from whatever
//! is already bound, bind each returned datom, and either emit (clause list
//! exhausted) or push a deeper frame and keep draining the current cursor.
//! One deliberate departure: completeness here is "every clause walked"
//! rather than the teacher's "every query variable bound" — a clause made
//! entirely of ground terms still needs to be probed even after every
//! variable the query mentions has already been bound by an earlier clause,
//! otherwise it would silently stop constraining the join (see DESIGN.md).

use crate::datom::Datom;
use crate::ident::Ident;
use crate::storage::{ReadStorage, Restricts};

use super::assignment::{bind, Assignment};
use super::clause::Clause;
use crate::asof::AsOfView;
use crate::query::pattern::Pattern;

pub struct Resolver<'a, S: ReadStorage> {
    storage: &'a S,
    view: &'a AsOfView,
    clauses: Vec<Clause>,
    frame: Frame,
    stack: Vec<Frame>,
    iterator: S::Iter,
}

struct Frame {
    clause_index: usize,
    assignment: Assignment,
}

impl<'a, S: ReadStorage> Resolver<'a, S> {
    /// `clauses` must be non-empty; `QuerySpec::compile` guarantees this
    /// before a `Resolver` is ever constructed.
    pub fn new(storage: &'a S, view: &'a AsOfView, clauses: Vec<Clause>) -> Self {
        let frame = Frame {
            clause_index: 0,
            assignment: Assignment::new(),
        };
        let iterator = Self::probe(storage, view, &clauses, &frame);
        Self {
            storage,
            view,
            clauses,
            frame,
            stack: Vec::new(),
            iterator,
        }
    }

    fn probe(storage: &'a S, view: &AsOfView, clauses: &[Clause], frame: &Frame) -> S::Iter {
        let restricts = restricts_for(&clauses[frame.clause_index], &frame.assignment);
        view.find(storage, restricts)
    }

    fn process(&mut self, datom: Datom) -> Option<<Self as Iterator>::Item> {
        let clause = &self.clauses[self.frame.clause_index];
        let Some(assignment) = bind(&self.frame.assignment, clause, &datom) else {
            return self.next();
        };
        let next_index = self.frame.clause_index + 1;
        if next_index == self.clauses.len() {
            return Some(Ok(assignment));
        }
        self.stack.push(Frame {
            clause_index: next_index,
            assignment,
        });
        self.next()
    }

    fn advance(&mut self) -> Option<<Self as Iterator>::Item> {
        self.frame = self.stack.pop()?;
        self.iterator = Self::probe(self.storage, self.view, &self.clauses, &self.frame);
        self.next()
    }
}

impl<'a, S: ReadStorage> Iterator for Resolver<'a, S> {
    type Item = Result<Assignment, S::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iterator.next() {
            Some(Err(err)) => Some(Err(err)),
            Some(Ok(datom)) => self.process(datom),
            None => self.advance(),
        }
    }
}

/// Builds the equality-only `Restricts` the next probe should use: ground
/// terms constrain directly, and a `Variable` already bound by an earlier
/// clause becomes a ground constraint too — this is what makes a repeated
/// variable a join key instead of an independent free column. `Probe` and
/// `Blank` never narrow the storage-level filter; `Probe`'s predicate is
/// checked afterwards, in [`bind`].
fn restricts_for(clause: &Clause, assignment: &Assignment) -> Restricts {
    let mut restricts = Restricts::new();
    if let Some(entity) = ident_constraint(&clause.entity, assignment) {
        restricts = restricts.with_entity(entity);
    }
    if let Some(attribute) = ident_constraint(&clause.attribute, assignment) {
        restricts = restricts.with_attribute(attribute);
    }
    if let Some(value) = value_constraint(&clause.value, assignment) {
        restricts = restricts.with_value(value);
    }
    restricts
}

fn ident_constraint(pattern: &Pattern<Ident>, assignment: &Assignment) -> Option<Ident> {
    match pattern {
        Pattern::Constant(ident) => Some(*ident),
        Pattern::Variable(name) => assignment.get(name.as_str()).and_then(|value| value.as_ident()),
        Pattern::Probe(_, _) | Pattern::Blank => None,
    }
}

fn value_constraint(pattern: &Pattern<crate::datom::Value>, assignment: &Assignment) -> Option<crate::datom::Value> {
    match pattern {
        Pattern::Constant(value) => Some(value.clone()),
        Pattern::Variable(name) => assignment.get(name.as_str()).cloned(),
        Pattern::Probe(_, _) | Pattern::Blank => None,
    }
}
