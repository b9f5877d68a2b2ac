use crate::formula::{Formula, Literal, Variable};
use crate::matrix::{Lit, Matrix, RowId};
use crate::strategy::{self, Strategy, STRATEGIES};
use crate::trail::Trail;
use crate::{SatResult, Value};
use log::{debug, info, trace};

/// Propagation reached a literal whose negation is already true, or a clause
/// with every literal false.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Conflict;

/// What a clause still allows under the current assignment.
enum ClauseState {
    Satisfied,
    Unit(Lit),
    Open,
    Violated,
}

/// Counters accumulated over one call to [`Solver::solve`].
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct SolverStats {
    pub backtracks: usize,
    /// Implication edges added, from binary clauses and from probing.
    pub implications: usize,
    pub probes: usize,
    /// Root decisions whose propagation failed and whose negation was fixed instead.
    pub root_refutations: usize,
    pub strategies_tried: usize,
}

pub struct Solver {
    matrix: Matrix,
    trail: Trail,
    strategy: Strategy,
    backtracks: usize,
    gave_up: bool,
    implications_exhausted: bool,
    verbosity: u32,
    stats: SolverStats,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        Self {
            matrix: Matrix::new(),
            trail: Trail::new(),
            strategy: STRATEGIES[0],
            backtracks: 0,
            gave_up: false,
            implications_exhausted: false,
            verbosity: 0,
            stats: SolverStats::default(),
        }
    }

    pub fn from_formula(formula: &Formula) -> Self {
        let mut solver = Self::new();
        while solver.num_variables() < formula.num_variables() {
            solver.new_variable();
        }
        for clause in formula.clauses() {
            solver.add_clause(clause.literals().copied());
        }
        solver
    }

    /// Forgets every clause and variable so the solver can take a new problem.
    pub fn reset(&mut self) {
        self.matrix.reset();
        self.trail = Trail::new();
        self.stats = SolverStats::default();
    }

    /// Releases memory cached for implication stores.
    pub fn cleanup(&mut self) {
        self.matrix.cleanup();
    }

    pub fn new_variable(&mut self) -> Variable {
        self.matrix.new_variable()
    }

    pub fn num_variables(&self) -> usize {
        self.matrix.num_variables()
    }

    /// Adds a clause, creating any variables it mentions that don't exist yet.
    pub fn add_clause(&mut self, literals: impl IntoIterator<Item = Literal>) -> RowId {
        let literals: Vec<Literal> = literals.into_iter().collect();
        if let Some(max) = literals.iter().map(|l| l.idx()).max() {
            while self.num_variables() <= max {
                self.new_variable();
            }
        }
        self.matrix.add_clause(literals)
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Records that `a` being true forces `b` to be true. Returns `true` if the edge is new.
    pub fn add_implication(&mut self, a: Literal, b: Literal) -> bool {
        self.learn(Lit::from(a), Lit::from(b))
    }

    pub fn implication_count(&self, a: Literal) -> usize {
        self.matrix.implication_count(Lit::from(a))
    }

    pub fn get_value(&self, literal: Literal) -> Value {
        let lit = Lit::from(literal);
        if self.matrix.is_assigned(lit) {
            Value::True
        } else if self.matrix.is_assigned(lit.negated()) {
            Value::False
        } else {
            Value::Unknown
        }
    }

    /// The true literal of every assigned variable.
    pub fn model(&self) -> Vec<Literal> {
        (0..self.num_variables())
            .map(Variable)
            .filter_map(|v| match self.get_value(Literal::Positive(v)) {
                Value::True => Some(Literal::Positive(v)),
                Value::False => Some(Literal::Negative(v)),
                Value::Unknown => None,
            })
            .collect()
    }

    /// Whether the current assignment makes some literal of every clause of `formula` true.
    pub fn satisfies(&self, formula: &Formula) -> bool {
        formula.clauses().all(|clause| {
            clause
                .literals()
                .any(|l| l.idx() < self.num_variables() && self.get_value(*l) == Value::True)
        })
    }

    /// Decides the clauses added so far, trying cheap strategies first.
    ///
    /// `fast_mode` limits the run to the first few strategies. A result of
    /// [`SatResult::GaveUp`] means every strategy ran out of backtracks, not that
    /// the problem is unsatisfiable.
    pub fn solve(&mut self, fast_mode: bool, verbosity: u32) -> SatResult {
        self.verbosity = verbosity;
        self.restart();

        if self.preprocess().is_err() {
            debug!("refuted during preprocessing");
            return SatResult::Absurd;
        }

        let mut result = SatResult::GaveUp;
        for strategy in strategy::schedule(fast_mode) {
            self.stats.strategies_tried += 1;
            debug!("trying strategy {}", strategy);
            result = self.branch_and_bound(*strategy);
            if result != SatResult::GaveUp {
                break;
            }
        }
        debug!("result {:?} after {:?}", result, self.stats);
        result
    }

    fn restart(&mut self) {
        self.matrix.clear_assignment();
        self.trail = Trail::new();
        self.backtracks = 0;
        self.gave_up = false;
        self.implications_exhausted = false;
        self.stats = SolverStats::default();
    }

    /// Rejects empty clauses, turns binary clauses into implication edges, and
    /// asserts unit clauses.
    fn preprocess(&mut self) -> Result<(), Conflict> {
        let mut units = vec![];
        let mut binaries = vec![];
        for (id, row) in self.matrix.rows() {
            match row.lits() {
                [] => {
                    debug!("clause {} is empty", id.0);
                    return Err(Conflict);
                }
                [unit] => units.push(*unit),
                [a, b] => binaries.push((*a, *b)),
                _ => {}
            }
        }
        for (a, b) in binaries {
            self.learn(a.negated(), b);
            self.learn(b.negated(), a);
        }
        for unit in units {
            trace!("unit clause {}", unit);
            self.fix_literal(unit)?;
        }
        Ok(())
    }

    fn learn(&mut self, a: Lit, b: Lit) -> bool {
        let added = self.matrix.add_implication(a, b);
        if added {
            self.stats.implications += 1;
        }
        added
    }

    /// Makes `c` true and propagates to a fixpoint.
    ///
    /// Each literal taken off the trail first pushes along its implication edges,
    /// then shrinks the clauses containing its negation (forcing the last open
    /// literal of any clause that becomes unit), then marks the clauses containing
    /// it satisfied. With `add_contrapositive`, every literal `m` forced through a
    /// clause also records `!m => !c`; that is only valid when `c` is asserted at
    /// the root.
    fn bound(&mut self, c: Lit, add_contrapositive: bool) -> Result<(), Conflict> {
        debug_assert!(!self.matrix.is_assigned(c) && !self.matrix.is_assigned(c.negated()));
        let mut next = self.trail.assigned().len();
        self.trail.assign(&mut self.matrix, c);

        while next < self.trail.assigned().len() {
            let lit = self.trail.assigned()[next];
            next += 1;

            let mut implied = self.matrix.implications(lit);
            let mut conflict = false;
            for (m, ()) in &mut implied {
                if self.matrix.is_assigned(m.negated()) {
                    trace!("{} implies {}, which is false", lit, m);
                    conflict = true;
                    break;
                }
                if !self.matrix.is_assigned(m) {
                    self.trail.assign(&mut self.matrix, m);
                }
            }
            self.matrix.release(lit, implied);
            if conflict {
                return Err(Conflict);
            }

            let falsified = lit.negated();
            for i in 0..self.matrix.column(falsified).rows().len() {
                let row = self.matrix.column(falsified).rows()[i];
                if self.matrix.row(row).is_satisfied() {
                    continue;
                }
                // Counts lag the assignment flags, so anything at or below two is rescanned.
                if self.trail.decrement(&mut self.matrix, row) > 2 {
                    continue;
                }
                match self.clause_state(row) {
                    ClauseState::Satisfied | ClauseState::Open => {}
                    ClauseState::Unit(m) => {
                        self.trail.assign(&mut self.matrix, m);
                        if add_contrapositive {
                            self.learn(m.negated(), c.negated());
                        }
                    }
                    ClauseState::Violated => {
                        trace!("clause {} violated after {}", row.0, lit);
                        return Err(Conflict);
                    }
                }
            }

            for i in 0..self.matrix.column(lit).rows().len() {
                let row = self.matrix.column(lit).rows()[i];
                if !self.matrix.row(row).is_satisfied() {
                    self.trail.satisfy(&mut self.matrix, row);
                }
            }
        }
        Ok(())
    }

    fn clause_state(&self, row: RowId) -> ClauseState {
        let mut open = None;
        let mut count = 0;
        for &l in self.matrix.row(row).lits() {
            if self.matrix.is_assigned(l) {
                return ClauseState::Satisfied;
            }
            if !self.matrix.is_assigned(l.negated()) {
                open = Some(l);
                count += 1;
            }
        }
        match (open, count) {
            (None, _) => ClauseState::Violated,
            (Some(l), 1) => ClauseState::Unit(l),
            _ => ClauseState::Open,
        }
    }

    /// Permanently asserts `c`. Only valid outside speculative search, since a
    /// successful propagation is committed rather than left on the trail.
    fn fix_literal(&mut self, c: Lit) -> Result<(), Conflict> {
        if self.matrix.is_assigned(c) {
            return Ok(());
        }
        if self.matrix.is_assigned(c.negated()) {
            return Err(Conflict);
        }
        debug_assert!(self.trail.is_empty(), "fixing {} inside a speculative branch", c);
        self.bound(c, false)?;
        trace!("fixed {}", c);
        self.trail.commit();
        Ok(())
    }

    /// Probes every open literal that has implication edges. A literal whose
    /// propagation conflicts has its negation fixed when the strategy asks for it.
    /// Returns how many implications and fixed literals were found.
    fn find_implications(&mut self) -> Result<usize, Conflict> {
        let before = self.stats.implications;
        let mut fixed = 0;
        let columns = self.matrix.columns().count();
        for index in 0..columns {
            let lit = Lit::from_index(index);
            if self.matrix.is_assigned(lit)
                || self.matrix.is_assigned(lit.negated())
                || self.matrix.implication_count(lit) == 0
            {
                continue;
            }
            self.stats.probes += 1;
            let checkpoint = self.trail.checkpoint();
            let probe = self.bound(lit, self.strategy.add_implications);
            self.trail.undo(&mut self.matrix, checkpoint);
            if probe.is_err() && self.strategy.force_unique {
                trace!("probing {} failed", lit);
                self.fix_literal(lit.negated())?;
                fixed += 1;
            }
        }
        Ok(self.stats.implications - before + fixed)
    }

    /// Picks an open literal from the first unsatisfied clause at or after
    /// `start` in the strategy's scan direction.
    fn find_next_lit(&self, start: RowId) -> Option<(Lit, RowId)> {
        let order = self.strategy.var_order;
        let unsatisfied = |r: &RowId| !self.matrix.row(*r).is_satisfied();
        let row = if order.is_forward() {
            (start.0..self.matrix.num_rows()).map(RowId).find(unsatisfied)
        } else {
            (0..=start.0).rev().map(RowId).find(unsatisfied)
        }?;

        let mut open = self
            .matrix
            .row(row)
            .lits()
            .iter()
            .copied()
            .filter(|&l| !self.matrix.is_assigned(l) && !self.matrix.is_assigned(l.negated()));
        let lit = if order.stops_at_first() { open.next() } else { open.last() }?;
        Some((lit, row))
    }

    /// Returns `true` when the clauses from `start` on are satisfied or the
    /// backtrack budget ran out (check `gave_up`); `false` leaves the trail dirty
    /// for the caller to undo.
    fn branch(&mut self, start: RowId) -> bool {
        let (lit, row) = match self.find_next_lit(start) {
            Some(found) => found,
            None => return true,
        };
        let checkpoint = self.trail.checkpoint();
        trace!("branch on {}", lit);
        if self.bound(lit, false).is_ok() && self.branch(row) {
            return true;
        }

        self.backtracks += 1;
        self.stats.backtracks += 1;
        if self.backtracks > self.strategy.bktrack_lim {
            debug!("backtrack limit {} reached", self.strategy.bktrack_lim);
            self.gave_up = true;
            return true;
        }
        self.trail.undo(&mut self.matrix, checkpoint);
        trace!("branch on {}", lit.negated());
        self.bound(lit.negated(), false).is_ok() && self.branch(row)
    }

    fn branch_and_bound(&mut self, strategy: Strategy) -> SatResult {
        self.strategy = strategy;
        self.backtracks = 0;
        self.gave_up = false;
        let start = self.trail.checkpoint();

        if !self.implications_exhausted {
            for pass in 0..strategy.n_static_pass {
                let found = match self.find_implications() {
                    Ok(found) => found,
                    Err(Conflict) => {
                        debug!("refuted while probing");
                        return SatResult::Absurd;
                    }
                };
                if self.verbosity > 0 {
                    info!("static pass {}: {} new implications", pass + 1, found);
                } else {
                    debug!("static pass {}: {} new implications", pass + 1, found);
                }
                if found == 0 {
                    self.implications_exhausted = true;
                    break;
                }
            }
        }

        let rows = self.matrix.num_rows();
        if rows == 0 {
            return SatResult::Solved;
        }
        let first = if strategy.var_order.is_forward() { RowId(0) } else { RowId(rows - 1) };

        while let Some((lit, row)) = self.find_next_lit(first) {
            let checkpoint = self.trail.checkpoint();
            if self.bound(lit, strategy.add_implications).is_ok() && self.branch(row) {
                break;
            }
            self.trail.undo(&mut self.matrix, checkpoint);
            self.stats.root_refutations += 1;
            trace!("{} refuted at the root", lit);
            if self.fix_literal(lit.negated()).is_err() {
                return SatResult::Absurd;
            }
        }

        if self.gave_up {
            self.trail.undo(&mut self.matrix, start);
            SatResult::GaveUp
        } else {
            SatResult::Solved
        }
    }
}
