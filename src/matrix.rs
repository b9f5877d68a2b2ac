//! Clause/literal incidence matrix.
//!
//! Rows are clauses and columns are literals: every variable owns two adjacent
//! columns, `2v` for the positive literal and `2v + 1` for its negation. Each
//! column also carries the literal's implication store, an AVL index of the
//! literals that become true whenever this one does.

use crate::avl::{AvlTree, Direction, Iter, Pool};
use crate::formula::{Literal, Variable};
use std::fmt::{self, Display, Formatter};

/// Column index of a literal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Lit(usize);

impl Lit {
    pub fn new(variable: Variable, positive: bool) -> Self {
        Lit(variable.0 * 2 + if positive { 0 } else { 1 })
    }

    pub fn variable(self) -> Variable {
        Variable(self.0 / 2)
    }

    pub fn is_positive(self) -> bool {
        self.0 & 1 == 0
    }

    pub fn negated(self) -> Self {
        Lit(self.0 ^ 1)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Lit(index)
    }
}

impl From<Literal> for Lit {
    fn from(literal: Literal) -> Self {
        Lit::new(*literal.variable(), literal.is_positive())
    }
}

impl From<Lit> for Literal {
    fn from(lit: Lit) -> Self {
        if lit.is_positive() {
            Literal::Positive(lit.variable())
        } else {
            Literal::Negative(lit.variable())
        }
    }
}

impl Display for Lit {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Literal::from(*self).fmt(f)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RowId(pub usize);

#[derive(Debug)]
pub struct Row {
    lits: Vec<Lit>,
    unbound: usize,
    satisfied: bool,
}

impl Row {
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    /// Literals of this clause that have not been falsified yet.
    pub fn unbound(&self) -> usize {
        self.unbound
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn lits(&self) -> &[Lit] {
        &self.lits
    }
}

#[derive(Debug, Default)]
pub struct Column {
    rows: Vec<RowId>,
    assigned: bool,
    implications: AvlTree<Lit, ()>,
}

impl Column {
    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    /// Whether this literal has been made true.
    pub fn is_assigned(&self) -> bool {
        self.assigned
    }
}

#[derive(Debug, Default)]
pub struct Matrix {
    rows: Vec<Row>,
    columns: Vec<Column>,
    pool: Pool<Lit, ()>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every clause and variable. Implication stores go back to the node
    /// pool, which is kept for the next problem.
    pub fn reset(&mut self) {
        for column in &mut self.columns {
            column.implications.free(&mut self.pool);
        }
        self.columns.clear();
        self.rows.clear();
    }

    /// Releases the node pool's cached memory.
    pub fn cleanup(&mut self) {
        self.pool.cleanup();
    }

    pub fn new_variable(&mut self) -> Variable {
        let variable = Variable(self.columns.len() / 2);
        self.columns.push(Column::default());
        self.columns.push(Column::default());
        variable
    }

    pub fn num_variables(&self) -> usize {
        self.columns.len() / 2
    }

    /// Adds a clause over existing variables. Repeated literals are stored once.
    pub fn add_clause(&mut self, literals: impl IntoIterator<Item = Literal>) -> RowId {
        let id = RowId(self.rows.len());
        let mut lits: Vec<Lit> = vec![];
        for literal in literals {
            let lit = Lit::from(literal);
            assert!(
                lit.index() < self.columns.len(),
                "clause mentions unknown variable {}",
                lit.variable().0
            );
            if !lits.contains(&lit) {
                lits.push(lit);
                self.columns[lit.index()].rows.push(id);
            }
        }
        self.rows.push(Row {
            unbound: lits.len(),
            lits,
            satisfied: false,
        });
        id
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl DoubleEndedIterator<Item = (RowId, &Row)> {
        self.rows.iter().enumerate().map(|(i, row)| (RowId(i), row))
    }

    pub fn row(&self, id: RowId) -> &Row {
        &self.rows[id.0]
    }

    pub fn column(&self, lit: Lit) -> &Column {
        &self.columns[lit.index()]
    }

    pub fn columns(&self) -> impl Iterator<Item = (Lit, &Column)> {
        self.columns.iter().enumerate().map(|(i, column)| (Lit(i), column))
    }

    pub fn is_assigned(&self, lit: Lit) -> bool {
        self.columns[lit.index()].assigned
    }

    /// Records `a => b`, returning `true` if the edge is new. Self-loops are ignored.
    pub fn add_implication(&mut self, a: Lit, b: Lit) -> bool {
        if a == b {
            return false;
        }
        !self.columns[a.index()].implications.insert(&mut self.pool, b, ())
    }

    pub fn is_implied(&self, a: Lit, b: Lit) -> bool {
        self.columns[a.index()].implications.is_member(&self.pool, &b)
    }

    pub fn implication_count(&self, a: Lit) -> usize {
        self.columns[a.index()].implications.count()
    }

    /// Snapshot of the literals implied by `a`; hand it back with [`Matrix::release`].
    pub fn implications(&mut self, a: Lit) -> Iter<Lit, ()> {
        self.columns[a.index()]
            .implications
            .iter(&mut self.pool, Direction::Forward)
    }

    /// Gives back a snapshot taken by [`Matrix::implications`] on `a`. The store
    /// must not have grown while the snapshot was in use.
    pub fn release(&mut self, a: Lit, iter: Iter<Lit, ()>) {
        debug_assert!(
            !self.columns[a.index()].implications.is_modified(),
            "implications of {} changed while being iterated",
            a
        );
        iter.close(&mut self.pool);
    }

    /// Unassigns every literal and restores every clause to unsatisfied with all
    /// literals unbound. Implication stores are left alone.
    pub fn clear_assignment(&mut self) {
        for column in &mut self.columns {
            column.assigned = false;
        }
        for row in &mut self.rows {
            row.unbound = row.lits.len();
            row.satisfied = false;
        }
    }

    pub(crate) fn assign(&mut self, lit: Lit) {
        debug_assert!(!self.columns[lit.index()].assigned);
        self.columns[lit.index()].assigned = true;
    }

    pub(crate) fn unassign(&mut self, lit: Lit) {
        self.columns[lit.index()].assigned = false;
    }

    pub(crate) fn decrement(&mut self, id: RowId) -> usize {
        let row = &mut self.rows[id.0];
        row.unbound -= 1;
        row.unbound
    }

    pub(crate) fn increment(&mut self, id: RowId) {
        self.rows[id.0].unbound += 1;
    }

    pub(crate) fn set_satisfied(&mut self, id: RowId, satisfied: bool) {
        self.rows[id.0].satisfied = satisfied;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{n, p};
    use test_env_log::test;

    fn matrix_with(vars: usize) -> Matrix {
        let mut m = Matrix::new();
        for _ in 0..vars {
            m.new_variable();
        }
        m
    }

    #[test]
    fn literal_encoding() {
        let x = Lit::from(p(3));
        assert_eq!(x.index(), 6);
        assert_eq!(x.negated().index(), 7);
        assert_eq!(x.negated().negated(), x);
        assert_eq!(Literal::from(x.negated()), n(3));
        assert_eq!(x.negated().to_string(), "!3");
    }

    #[test]
    fn new_variable_allocates_two_columns() {
        let mut m = Matrix::new();
        assert_eq!(m.new_variable(), Variable(0));
        assert_eq!(m.new_variable(), Variable(1));
        assert_eq!(m.num_variables(), 2);
        assert_eq!(m.columns().count(), 4);
        for (lit, column) in m.columns() {
            assert!(!column.is_assigned());
            assert_eq!(m.implication_count(lit), 0);
        }
    }

    #[test]
    fn add_clause_links_rows_and_columns() {
        let mut m = matrix_with(3);
        let r0 = m.add_clause(vec![p(0), n(1), p(0)]);
        let r1 = m.add_clause(vec![n(1), p(2)]);
        assert_eq!(m.row(r0).len(), 2);
        assert_eq!(m.row(r0).unbound(), 2);
        assert!(!m.row(r0).is_satisfied());
        assert_eq!(m.column(Lit::from(n(1))).rows(), &[r0, r1]);
        assert_eq!(m.column(Lit::from(p(1))).rows(), &[] as &[RowId]);
    }

    #[test]
    #[should_panic(expected = "unknown variable")]
    fn add_clause_rejects_unknown_variable() {
        let mut m = matrix_with(1);
        m.add_clause(vec![p(4)]);
    }

    #[test]
    fn add_implication_is_idempotent() {
        let mut m = matrix_with(2);
        let a = Lit::from(p(0));
        let b = Lit::from(n(1));
        assert!(m.add_implication(a, b));
        assert!(!m.add_implication(a, b));
        assert_eq!(m.implication_count(a), 1);
        assert!(m.is_implied(a, b));
        assert!(!m.is_implied(b, a));
    }

    #[test]
    fn add_implication_rejects_self_loop() {
        let mut m = matrix_with(1);
        let a = Lit::from(p(0));
        assert!(!m.add_implication(a, a));
        assert_eq!(m.implication_count(a), 0);
    }

    #[test]
    fn implications_snapshot_is_sorted() {
        let mut m = matrix_with(4);
        let a = Lit::from(p(0));
        for l in [n(3), p(1), n(2)] {
            m.add_implication(a, Lit::from(l));
        }
        let iter = m.implications(a);
        let implied: Vec<Literal> = iter.map(|(l, _)| Literal::from(l)).collect();
        assert_eq!(implied, vec![p(1), n(2), n(3)]);
        let iter = m.implications(a);
        m.release(a, iter);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "changed while being iterated")]
    fn release_rejects_store_grown_during_iteration() {
        let mut m = matrix_with(3);
        let a = Lit::from(p(0));
        m.add_implication(a, Lit::from(p(1)));
        let iter = m.implications(a);
        m.add_implication(a, Lit::from(n(2)));
        m.release(a, iter);
    }

    #[test]
    fn reset_returns_nodes_to_pool() {
        let mut m = matrix_with(3);
        m.add_clause(vec![p(0), p(1)]);
        m.add_implication(Lit::from(n(0)), Lit::from(p(1)));
        m.add_implication(Lit::from(n(1)), Lit::from(p(0)));
        m.reset();
        assert_eq!(m.num_variables(), 0);
        assert_eq!(m.num_rows(), 0);
        assert_eq!(m.pool.live_nodes(), 0);
        assert_eq!(m.pool.cached_nodes(), 2);

        m.new_variable();
        m.new_variable();
        assert!(m.add_implication(Lit::from(p(0)), Lit::from(p(1))));
        assert_eq!(m.pool.cached_nodes(), 1);
        m.cleanup();
        assert_eq!(m.pool.cached_nodes(), 1);
    }

    #[test]
    fn clear_assignment_restores_rows() {
        let mut m = matrix_with(2);
        let r = m.add_clause(vec![p(0), p(1)]);
        m.assign(Lit::from(n(0)));
        m.decrement(r);
        m.set_satisfied(r, true);
        m.clear_assignment();
        assert!(!m.is_assigned(Lit::from(n(0))));
        assert_eq!(m.row(r).unbound(), 2);
        assert!(!m.row(r).is_satisfied());
    }
}
