pub mod dimacs;

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug)]
pub struct Variable(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Literal {
    Positive(Variable),
    Negative(Variable),
}

impl Literal {
    pub fn variable(&self) -> &Variable {
        match self {
            Literal::Positive(v) => v,
            Literal::Negative(v) => v,
        }
    }

    pub fn is_positive(&self) -> bool {
        match self {
            Literal::Positive(_) => true,
            Literal::Negative(_) => false,
        }
    }

    pub fn idx(&self) -> usize {
        self.variable().0
    }

    pub fn negated(&self) -> Self {
        match self {
            Literal::Positive(v) => Literal::Negative(*v),
            Literal::Negative(v) => Literal::Positive(*v),
        }
    }

    /// DIMACS form: variables are numbered as-is, negative literals are negative.
    pub fn to_dimacs(&self) -> isize {
        match self {
            Literal::Positive(Variable(x)) => *x as isize,
            Literal::Negative(Variable(x)) => -(*x as isize),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Literal::Positive(Variable(x)) => write!(f, "{}", x),
            Literal::Negative(Variable(x)) => write!(f, "!{}", x),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Clause {
    literals: Vec<Literal>,
}

impl Clause {
    pub fn new(disjuncts: impl IntoIterator<Item = Literal>) -> Self {
        Self {
            literals: disjuncts.into_iter().collect(),
        }
    }

    pub fn literals(&self) -> impl Iterator<Item = &Literal> {
        self.literals.iter()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.literals.len() > 1 {
            f.write_str("(")?;
        }
        let mut first_literal = true;
        for literal in &self.literals {
            if first_literal {
                first_literal = false;
            } else {
                f.write_str(" | ")?;
            }
            write!(f, "{}", literal)?;
        }
        if self.literals.len() > 1 {
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Formula {
    clauses: Vec<Clause>,
}

impl Formula {
    pub fn new(conjuncts: impl IntoIterator<Item = Clause>) -> Self {
        Self {
            clauses: conjuncts.into_iter().collect(),
        }
    }

    /// One more than the largest variable index mentioned, so indices can be used directly.
    pub fn num_variables(&self) -> usize {
        self.clauses
            .iter()
            .flat_map(|clause| clause.literals())
            .map(|literal| literal.idx() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter()
    }

    /// Renumbers the variables densely from 0 in order of first appearance.
    /// Returns a map from each new variable back to the one it replaced.
    pub fn canonicalize(&mut self) -> HashMap<Variable, Variable> {
        let mut rewrite = HashMap::new();
        for clause in &mut self.clauses {
            for literal in &mut clause.literals {
                let next = Variable(rewrite.len());
                let v = *rewrite.entry(*literal.variable()).or_insert(next);
                *literal = if literal.is_positive() {
                    Literal::Positive(v)
                } else {
                    Literal::Negative(v)
                };
            }
        }
        rewrite.into_iter().map(|(old, new)| (new, old)).collect()
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut first_clause = true;
        for clause in &self.clauses {
            if first_clause {
                first_clause = false;
            } else {
                f.write_str(" & ")?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn p(x: usize) -> Literal {
    Literal::Positive(Variable(x))
}

#[cfg(test)]
pub(crate) fn n(x: usize) -> Literal {
    Literal::Negative(Variable(x))
}

/// Random 3-literal clauses over a handful of variables, small enough to brute force.
#[cfg(test)]
pub(crate) fn formula_3sat_strategy() -> impl proptest::strategy::Strategy<Value = Formula> {
    use proptest::prelude::*;

    const MAX_VARS: usize = 10;
    const MAX_CLAUSES: usize = 40;

    (1..=MAX_VARS).prop_flat_map(|num_vars| {
        let literal = (0..num_vars, any::<bool>()).prop_map(|(v, positive)| if positive { p(v) } else { n(v) });
        let clause = proptest::collection::vec(literal, 1..=3).prop_map(Clause::new);
        proptest::collection::vec(clause, 1..MAX_CLAUSES).prop_map(Formula::new)
    })
}
