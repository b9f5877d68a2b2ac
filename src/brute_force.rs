use crate::*;

// Exhaustive reference solver for property tests
pub(crate) fn solve_brute_force(f: &Formula) -> SatResult {
    let num_variables = f.num_variables();
    assert!(num_variables <= 15); // just for safety

    fn assignment_for(assignment: u32, x: usize) -> bool {
        assignment & (1 << x) == 0
    }

    'search: for assignment in 0..2u32.pow(num_variables as u32) {
        'clauses: for clause in f.clauses() {
            for literal in clause.literals() {
                if assignment_for(assignment, literal.idx()) == literal.is_positive() {
                    // this clause is satisfied, let's go to the next one
                    continue 'clauses;
                }
            }
            // if we got here, this clause was not satisfied, so this assignment is bogus
            continue 'search;
        }
        // if we got here, every clause was satisfied, so we're done and satisfiable
        return SatResult::Solved;
    }
    // no assignment is valid
    SatResult::Absurd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{n, p};
    use test_env_log::test;

    #[test]
    fn brute_force_sat() {
        let c1 = Clause::new(vec![p(0), p(1)]);
        let c2 = Clause::new(vec![n(0)]);
        let f = Formula::new(vec![c1, c2]);

        assert_eq!(solve_brute_force(&f), SatResult::Solved);
    }

    #[test]
    fn brute_force_unsat() {
        let c1 = Clause::new(vec![p(0), p(1)]);
        let c2 = Clause::new(vec![n(0)]);
        let c3 = Clause::new(vec![n(1)]);
        let f = Formula::new(vec![c1, c2, c3]);

        assert_eq!(solve_brute_force(&f), SatResult::Absurd);
    }

    #[test]
    fn brute_force_empty_clause() {
        let f = Formula::new(vec![Clause::new(vec![p(0)]), Clause::new(Vec::<Literal>::new())]);
        assert_eq!(solve_brute_force(&f), SatResult::Absurd);
    }
}
