use bbsat::formula::dimacs::{parse, DimacsParseError};
use bbsat::formula::Formula;
use bbsat::*;
use clap::{App, Arg};
use std::fs::File;

/// Run-time knobs passed straight through to [`Solver::solve`].
#[derive(Clone, Copy, Debug)]
struct SolveOptions {
    fast_mode: bool,
    verbosity: u32,
}

fn main() {
    env_logger::init();

    let matches = App::new("bbsat")
        .about("Branch-and-bound SAT solver")
        .arg(Arg::with_name("INPUT").help("input file (in CNF)").index(1))
        .arg(
            Arg::with_name("fast")
                .long("fast")
                .help("only try the cheapest strategies"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("report probing progress"),
        )
        .arg(
            Arg::with_name("model")
                .long("model")
                .help("print the satisfying assignment"),
        )
        .get_matches();

    let options = SolveOptions {
        fast_mode: matches.is_present("fast"),
        verbosity: matches.occurrences_of("verbose") as u32,
    };

    let f = if let Some(path) = matches.value_of("INPUT") {
        parse_from_file(path)
    } else {
        parse(std::io::stdin())
    };

    match f {
        Ok(f) => {
            let mut solver = Solver::from_formula(&f);

            let exit_code = match solver.solve(options.fast_mode, options.verbosity) {
                SatResult::Solved => {
                    println!("s SATISFIABLE");
                    if matches.is_present("model") {
                        let model: Vec<String> = solver
                            .model()
                            .iter()
                            .filter(|l| l.idx() > 0)
                            .map(|l| l.to_dimacs().to_string())
                            .collect();
                        println!("v {} 0", model.join(" "));
                    }
                    10
                }
                SatResult::Absurd => {
                    println!("s UNSATISFIABLE");
                    20
                }
                SatResult::GaveUp => {
                    println!("s UNKNOWN");
                    0
                }
            };
            log::info!("{:?}", solver.stats());
            std::process::exit(exit_code);
        }
        Err(e) => {
            eprintln!("parse error: {}", e);
            std::process::exit(-1);
        }
    }
}

fn parse_from_file(path: &str) -> Result<Formula, DimacsParseError> {
    let file = File::open(path)?;
    parse(file)
}
