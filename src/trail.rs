use crate::matrix::{Lit, Matrix, RowId};

/// Lengths of the three trail stacks at some point in the search.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Checkpoint {
    var: usize,
    inc: usize,
    cla: usize,
}

/// Undo log for propagation.
///
/// `var` holds literals made true, `inc` holds clauses whose unbound count was
/// decremented, and `cla` holds clauses newly marked satisfied.
#[derive(Debug, Default)]
pub struct Trail {
    var: Vec<Lit>,
    inc: Vec<RowId>,
    cla: Vec<RowId>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            var: self.var.len(),
            inc: self.inc.len(),
            cla: self.cla.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.var.is_empty() && self.inc.is_empty() && self.cla.is_empty()
    }

    pub fn assigned(&self) -> &[Lit] {
        &self.var
    }

    pub(crate) fn assign(&mut self, matrix: &mut Matrix, lit: Lit) {
        matrix.assign(lit);
        self.var.push(lit);
    }

    pub(crate) fn decrement(&mut self, matrix: &mut Matrix, row: RowId) -> usize {
        self.inc.push(row);
        matrix.decrement(row)
    }

    pub(crate) fn satisfy(&mut self, matrix: &mut Matrix, row: RowId) {
        matrix.set_satisfied(row, true);
        self.cla.push(row);
    }

    /// Makes everything on the trail permanent by forgetting it.
    pub(crate) fn commit(&mut self) {
        self.var.clear();
        self.inc.clear();
        self.cla.clear();
    }

    /// Reverts every operation recorded since `checkpoint`, newest first.
    /// Stacks already shorter than the checkpoint (after a commit) are left alone.
    pub fn undo(&mut self, matrix: &mut Matrix, checkpoint: Checkpoint) {
        while self.var.len() > checkpoint.var {
            if let Some(lit) = self.var.pop() {
                matrix.unassign(lit);
            }
        }
        while self.cla.len() > checkpoint.cla {
            if let Some(row) = self.cla.pop() {
                matrix.set_satisfied(row, false);
            }
        }
        while self.inc.len() > checkpoint.inc {
            if let Some(row) = self.inc.pop() {
                matrix.increment(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{n, p};
    use test_env_log::test;

    fn setup() -> (Matrix, Trail, RowId) {
        let mut m = Matrix::new();
        m.new_variable();
        m.new_variable();
        let r = m.add_clause(vec![p(0), p(1)]);
        (m, Trail::new(), r)
    }

    #[test]
    fn undo_of_fresh_checkpoint_is_noop() {
        let (mut m, mut trail, r) = setup();
        trail.assign(&mut m, Lit::from(n(0)));
        trail.decrement(&mut m, r);
        let cp = trail.checkpoint();
        trail.undo(&mut m, cp);
        assert_eq!(trail.checkpoint(), cp);
        assert!(m.is_assigned(Lit::from(n(0))));
        assert_eq!(m.row(r).unbound(), 1);
    }

    #[test]
    fn undo_reverts_to_checkpoint() {
        let (mut m, mut trail, r) = setup();
        let cp = trail.checkpoint();
        trail.assign(&mut m, Lit::from(n(0)));
        assert_eq!(trail.decrement(&mut m, r), 1);
        trail.assign(&mut m, Lit::from(p(1)));
        trail.satisfy(&mut m, r);
        assert_eq!(trail.assigned(), &[Lit::from(n(0)), Lit::from(p(1))]);

        trail.undo(&mut m, cp);
        assert!(trail.is_empty());
        assert!(!m.is_assigned(Lit::from(n(0))));
        assert!(!m.is_assigned(Lit::from(p(1))));
        assert_eq!(m.row(r).unbound(), 2);
        assert!(!m.row(r).is_satisfied());
    }

    #[test]
    fn commit_survives_undo() {
        let (mut m, mut trail, r) = setup();
        trail.assign(&mut m, Lit::from(p(0)));
        trail.satisfy(&mut m, r);
        let cp = trail.checkpoint();
        trail.commit();
        trail.undo(&mut m, cp);
        assert!(m.is_assigned(Lit::from(p(0))));
        assert!(m.row(r).is_satisfied());
    }
}
