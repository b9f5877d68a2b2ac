use crate::formula::{Clause, Formula, Literal, Variable};
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;

pub fn parse<R: Read>(reader: R) -> Result<Formula, DimacsParseError> {
    let reader = BufReader::new(reader);

    let mut clauses = vec![];
    let mut num_clauses = None;
    // DIMACS clauses may span lines; they end at a `0`.
    let mut clause = vec![];

    for line in reader.lines() {
        let line = line?;
        let mut line = line.split_whitespace().peekable();

        match line.peek() {
            Some(&"c") | Some(&"%") | None => continue,
            Some(&"p") => {
                let _ = line.next();

                if line.next() != Some("cnf") {
                    return Err(DimacsParseError::Format("missing 'cnf'".into()));
                }

                let _num_variables = line
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| DimacsParseError::Format("invalid num_variables".into()))?;

                num_clauses = Some(
                    line.next()
                        .and_then(|c| c.parse::<usize>().ok())
                        .ok_or_else(|| DimacsParseError::Format("invalid num_clauses".into()))?,
                );
            }
            Some(_) => {
                let expected = num_clauses
                    .ok_or_else(|| DimacsParseError::Format("missing 'p' line before clauses".into()))?;

                for x in line {
                    match parse_literal(x)? {
                        Some(l) => clause.push(l),
                        None => clauses.push(Clause::new(std::mem::take(&mut clause))),
                    }
                }

                if clauses.len() >= expected {
                    break;
                }
            }
        }
    }

    if num_clauses.is_none() {
        return Err(DimacsParseError::Format("missing 'p' line before clauses".into()));
    }
    if !clause.is_empty() {
        clauses.push(Clause::new(clause));
    }

    let formula = Formula::new(clauses);
    Ok(formula)
}

fn parse_literal(s: &str) -> Result<Option<Literal>, DimacsParseError> {
    let l = s
        .parse::<isize>()
        .map_err(|_| DimacsParseError::Format(format!("invalid literal '{}'", s)))?;
    if l > 0 {
        Ok(Some(Literal::Positive(Variable(l as usize))))
    } else if l < 0 {
        Ok(Some(Literal::Negative(Variable(l.unsigned_abs()))))
    } else {
        Ok(None)
    }
}

#[derive(Error, Debug)]
pub enum DimacsParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed DIMACS: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use crate::formula::{n, p};
    use crate::{SatResult, Solver};

    use super::*;
    use test_env_log::test;

    #[test]
    fn parse_cnf_basic() {
        let cnf = "c  simple_v3_c2.cnf
c
p cnf 3 2
1 -3 0
2 3 -1 0";
        let f = parse(cnf.as_bytes()).expect("failed to parse");
        assert_eq!(f.clauses().count(), 2);

        assert_eq!(
            f.clauses().nth(0).unwrap().literals().cloned().collect::<Vec<_>>(),
            vec![p(1), n(3)]
        );
        assert_eq!(
            f.clauses().nth(1).unwrap().literals().cloned().collect::<Vec<_>>(),
            vec![p(2), p(3), n(1)]
        );
    }

    #[test]
    fn parse_clause_across_lines() {
        let cnf = "p cnf 3 2\n1 -3\n 2 0 -1\n0\n";
        let f = parse(cnf.as_bytes()).expect("failed to parse");
        let clauses: Vec<Vec<Literal>> = f.clauses().map(|c| c.literals().cloned().collect()).collect();
        assert_eq!(clauses, vec![vec![p(1), n(3), p(2)], vec![n(1)]]);
    }

    #[test]
    fn parse_empty_clause() {
        let f = parse("p cnf 1 2\n1 0\n0\n".as_bytes()).expect("failed to parse");
        assert_eq!(f.clauses().count(), 2);
        assert!(f.clauses().nth(1).unwrap().is_empty());
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse("1 2 0\n".as_bytes()), Err(DimacsParseError::Format(_))));
        assert!(matches!(parse("p dnf 1 1\n".as_bytes()), Err(DimacsParseError::Format(_))));
        assert!(matches!(parse("p cnf 2 1\n1 x 0\n".as_bytes()), Err(DimacsParseError::Format(_))));
        assert!(matches!(parse("".as_bytes()), Err(DimacsParseError::Format(_))));
    }

    #[test]
    fn parse_extreme_literals() {
        let cnf = format!("p cnf 1 2\n{} 0\n{} 0\n", isize::MIN, isize::MAX);
        let f = parse(cnf.as_bytes()).expect("failed to parse");
        let literals: Vec<Literal> = f.clauses().flat_map(|c| c.literals().copied()).collect();
        assert_eq!(
            literals,
            vec![
                Literal::Negative(Variable(isize::MIN.unsigned_abs())),
                Literal::Positive(Variable(isize::MAX as usize)),
            ]
        );
    }

    #[test]
    fn parse_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "p cnf 2 2\n1 2 0\n-1 0").unwrap();
        let f = parse(std::fs::File::open(file.path()).unwrap()).expect("failed to parse");
        assert_eq!(f.clauses().count(), 2);
    }

    #[test]
    fn solve_cnf_quinn() {
        let cnf = "c  quinn.cnf
c
p cnf 16 18
  1    2  0
 -2   -4  0
  3    4  0
 -4   -5  0
  5   -6  0
  6   -7  0
  6    7  0
  7  -16  0
  8   -9  0
 -8  -14  0
  9   10  0
  9  -10  0
-10  -11  0
 10   12  0
 11   12  0
 13   14  0
 14  -15  0
 15   16  0
";

        let f = parse(cnf.as_bytes()).expect("failed to parse");

        let mut solver = Solver::from_formula(&f);
        let r = solver.solve(false, 0);

        assert_eq!(r, SatResult::Solved);
        assert!(solver.satisfies(&f));
    }
}
