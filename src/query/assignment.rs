//! `Assignment`: the partial variable→value binding a backtracking join
//! step carries, plus `bind`, which extends one against a freshly probed
//! datom.
//!
//! Generalises the teacher's `query/assignment.rs` `Assignment` (an
//! "assigned"/"unassigned" pair tracking completeness by variable-set
//! membership) to a plain `HashMap<Rc<str>, Value>`: completeness here is
//! tracked positionally by [`super::resolver::Resolver`] (how many clauses
//! have been walked), not by variable-set membership, because a variable
//! that happens to get bound by an early clause must not let a later
//! all-ground clause go unprobed — see DESIGN.md for why this departs from
//! the teacher.

use std::collections::HashMap;
use std::rc::Rc;

use crate::datom::{Datom, Value};
use crate::ident::Ident;
use crate::query::clause::Clause;
use crate::query::pattern::Pattern;

pub type Assignment = HashMap<Rc<str>, Value>;

/// Extends `assignment` with the bindings `clause` derives from `datom`,
/// checking every `Probe` predicate and every binding's consistency with a
/// value already assigned to the same variable (`spec.md` §4.7 step 3: "Rows
/// that conflict with a ground term ... are discarded", generalised here to
/// cover a variable reused across positions or clauses). Returns `None` if
/// `datom` doesn't survive.
pub fn bind(assignment: &Assignment, clause: &Clause, datom: &Datom) -> Option<Assignment> {
    let mut next = assignment.clone();
    bind_ident(&mut next, &clause.entity, datom.entity)?;
    bind_ident(&mut next, &clause.attribute, datom.attribute)?;
    bind_value(&mut next, &clause.value, &datom.value)?;
    Some(next)
}

fn bind_ident(assignment: &mut Assignment, pattern: &Pattern<Ident>, actual: Ident) -> Option<()> {
    match pattern {
        Pattern::Constant(_) | Pattern::Blank => Some(()),
        Pattern::Variable(name) => assign(assignment, name, Value::Ident(actual)),
        Pattern::Probe(name, predicates) => {
            if !predicates.iter().all(|predicate| predicate.matches(&actual)) {
                return None;
            }
            assign(assignment, name, Value::Ident(actual))
        }
    }
}

fn bind_value(assignment: &mut Assignment, pattern: &Pattern<Value>, actual: &Value) -> Option<()> {
    match pattern {
        Pattern::Constant(_) | Pattern::Blank => Some(()),
        Pattern::Variable(name) => assign(assignment, name, actual.clone()),
        Pattern::Probe(name, predicates) => {
            if !predicates.iter().all(|predicate| predicate.matches(actual)) {
                return None;
            }
            assign(assignment, name, actual.clone())
        }
    }
}

/// Binds `name` to `value`, or checks the existing binding still agrees —
/// this is what makes a variable repeated across clauses (e.g. `?release`
/// appearing in two clauses) act as a join key instead of two independent
/// bindings.
fn assign(assignment: &mut Assignment, name: &str, value: Value) -> Option<()> {
    match assignment.get(name) {
        Some(existing) if existing == &value => Some(()),
        Some(_) => None,
        None => {
            assignment.insert(Rc::from(name), value);
            Some(())
        }
    }
}
