//! Projects a completed [`Assignment`] down to the `select`ed variables
//! (`spec.md` §4.7 step 5), or passes every bound variable through when no
//! `select` was given.
//!
//! The teacher's `query/projector.rs` projected a fixed `Vec<Find>` (plain
//! variables or aggregates) out of an iterator of assignments; aggregates
//! are dropped here (`spec.md` §1 defers aggregation), so projection is
//! just a key filter over the binding map.

use std::collections::HashMap;

use crate::datom::Value;

use super::assignment::Assignment;

/// `select = None` means "every variable the query bound" (`spec.md` §6).
pub fn project(assignment: Assignment, select: Option<&[String]>) -> HashMap<String, Value> {
    match select {
        Some(variables) => variables
            .iter()
            .filter_map(|variable| assignment.get(variable.as_str()).map(|value| (variable.clone(), value.clone())))
            .collect(),
        None => assignment.into_iter().map(|(variable, value)| (variable.to_string(), value)).collect(),
    }
}
