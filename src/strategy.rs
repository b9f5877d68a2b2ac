//! Search strategies and the table the driver walks through.

use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// How the next branching literal is picked.
///
/// The discriminants are the historical numeric codes; `3` was never used.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarOrder {
    /// Scan clauses first to last, take the first open literal of the first open clause.
    ForwardFirst = 1,
    /// Scan clauses first to last, take the last open literal of the first open clause.
    ForwardLast = 2,
    /// Scan clauses last to first, take the first open literal of the first open clause.
    BackwardFirst = 4,
    /// Scan clauses last to first, take the last open literal of the first open clause.
    BackwardLast = 5,
}

impl VarOrder {
    pub fn is_forward(self) -> bool {
        matches!(self, VarOrder::ForwardFirst | VarOrder::ForwardLast)
    }

    /// Whether the literal scan inside a clause stops at the first candidate.
    pub fn stops_at_first(self) -> bool {
        matches!(self, VarOrder::ForwardFirst | VarOrder::BackwardFirst)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StrategyError {
    #[error("unknown literal selection order {0}")]
    UnknownOrder(u8),
}

impl TryFrom<u8> for VarOrder {
    type Error = StrategyError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(VarOrder::ForwardFirst),
            2 => Ok(VarOrder::ForwardLast),
            4 => Ok(VarOrder::BackwardFirst),
            5 => Ok(VarOrder::BackwardLast),
            _ => Err(StrategyError::UnknownOrder(code)),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Strategy {
    pub var_order: VarOrder,
    /// Failed branches tolerated before giving up on this strategy.
    pub bktrack_lim: usize,
    /// Upper bound on probing passes before the search starts.
    pub n_static_pass: usize,
    /// Record contrapositive implications discovered at the root.
    pub add_implications: bool,
    /// When probing a literal fails, permanently assert its negation.
    pub force_unique: bool,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "order={} limit={} static={}{}{}",
            self.var_order as u8,
            self.bktrack_lim,
            self.n_static_pass,
            if self.add_implications { " +impl" } else { "" },
            if self.force_unique { " +unique" } else { "" },
        )
    }
}

const fn plain(var_order: VarOrder, bktrack_lim: usize) -> Strategy {
    Strategy {
        var_order,
        bktrack_lim,
        n_static_pass: 0,
        add_implications: false,
        force_unique: false,
    }
}

const fn probing(var_order: VarOrder, bktrack_lim: usize, n_static_pass: usize) -> Strategy {
    Strategy {
        var_order,
        bktrack_lim,
        n_static_pass,
        add_implications: true,
        force_unique: true,
    }
}

/// Strategies tried in fast mode: a prefix of [`STRATEGIES`].
pub const FAST_STRATEGIES: usize = 4;

/// Strategies in the order the driver tries them, cheapest first.
pub static STRATEGIES: [Strategy; 12] = [
    plain(VarOrder::ForwardFirst, 50),
    plain(VarOrder::BackwardFirst, 50),
    probing(VarOrder::ForwardFirst, 200, 1),
    probing(VarOrder::BackwardFirst, 200, 1),
    plain(VarOrder::ForwardLast, 1_000),
    plain(VarOrder::BackwardLast, 1_000),
    probing(VarOrder::ForwardFirst, 5_000, 2),
    probing(VarOrder::BackwardFirst, 5_000, 2),
    probing(VarOrder::ForwardLast, 20_000, 3),
    probing(VarOrder::BackwardLast, 20_000, 3),
    probing(VarOrder::ForwardFirst, 100_000, 4),
    probing(VarOrder::BackwardFirst, 1_000_000, 4),
];

/// The strategies `solve` walks through for the given mode.
pub fn schedule(fast_mode: bool) -> &'static [Strategy] {
    if fast_mode {
        &STRATEGIES[..FAST_STRATEGIES]
    } else {
        &STRATEGIES[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_env_log::test;

    #[test]
    fn order_codes() {
        for code in [1u8, 2, 4, 5] {
            assert_eq!(VarOrder::try_from(code).map(|o| o as u8), Ok(code));
        }
        assert_eq!(VarOrder::try_from(3), Err(StrategyError::UnknownOrder(3)));
        assert_eq!(VarOrder::try_from(0), Err(StrategyError::UnknownOrder(0)));
    }

    #[test]
    fn order_directions() {
        assert!(VarOrder::ForwardLast.is_forward());
        assert!(!VarOrder::BackwardFirst.is_forward());
        assert!(VarOrder::BackwardFirst.stops_at_first());
        assert!(!VarOrder::ForwardLast.stops_at_first());
    }

    #[test]
    fn schedule_sizes() {
        assert_eq!(schedule(true).len(), 4);
        assert_eq!(schedule(false).len(), 12);
        // Budgets never shrink along the table.
        assert!(STRATEGIES.windows(2).all(|w| w[0].bktrack_lim <= w[1].bktrack_lim));
        assert!(schedule(true).iter().any(|s| s.n_static_pass > 0));
    }

    #[test]
    fn display() {
        assert_eq!(STRATEGIES[2].to_string(), "order=1 limit=200 static=1 +impl +unique");
        assert_eq!(STRATEGIES[0].to_string(), "order=1 limit=50 static=0");
    }
}
