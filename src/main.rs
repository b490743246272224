// src/main.rs
//! Demo driver: runs built-in sample programs through the evaluator.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use arqon::core::ast::{AstNode as N, CallTarget};
use arqon::core::evaluator::Evaluator;
use arqon::core::qasm::{compile, LocalSimulator};
use arqon::core::memory::ScopeKind;
use arqon::Config;

#[derive(Parser, Debug)]
#[command(name = "arqon", about = "Hybrid classical/quantum evaluation core demo")]
struct Cli {
    /// Sample program to run: "classical" or "quantum".
    #[arg(default_value = "classical")]
    sample: String,

    /// Config file path (defaults to ~/.arqon/config.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable evaluator trace output (same as ARQON_DEBUG=1).
    #[arg(long)]
    debug: bool,

    /// Print the compiled assembly of the quantum sample instead of
    /// running it.
    #[arg(long)]
    dump_qasm: bool,
}

/// Classical sample: declare, branch, mutate, print. Prints "8".
fn classical_sample() -> N {
    N::new_program(vec![N::new_main(
        "X",
        vec![
            N::new_decl("a", "int", None, vec![N::new_entity(None, N::int(3))]),
            N::new_if(
                N::new_builtin_call("gt", vec![N::symbol("a"), N::int(2)]),
                vec![
                    N::new_assign(
                        "a",
                        vec![N::new_entity(None, N::new_builtin_call("add", vec![N::int(5)]))],
                    ),
                    N::ExitBody,
                ],
                None,
                Some(N::new_else(vec![N::new_assign(
                    "a",
                    vec![N::new_entity(None, N::int(0))],
                )])),
            ),
            N::new_call(CallTarget::Builtin("print".into()), vec![N::symbol("a")]),
        ],
    )])
}

/// Quantum sample: Bell pair, measured into a distribution.
fn quantum_sample() -> N {
    N::new_program(vec![N::new_main(
        "X",
        vec![
            N::new_qdecl(
                "q",
                "circuit",
                Some(2),
                vec![
                    N::new_entity(None, N::new_builtin_call("@h", vec![N::int(0)])),
                    N::new_entity(
                        None,
                        N::new_builtin_call("@cnot", vec![N::int(0), N::int(1)]),
                    ),
                ],
            ),
            N::new_decl(
                "m",
                "measurement",
                None,
                vec![N::new_entity(None, N::qsymbol("q"))],
            ),
            N::new_call(CallTarget::Builtin("print".into()), vec![N::symbol("m")]),
        ],
    )])
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = Config::load(cli.config.as_deref())?;
    let program = match cli.sample.as_str() {
        "classical" => classical_sample(),
        "quantum" => quantum_sample(),
        other => anyhow::bail!("unknown sample '{}'; try classical or quantum", other),
    };

    if cli.dump_qasm {
        // Build the circuit, then show the assembly it compiles to.
        let mut ev = evaluator_from(&cfg);
        ev.run_program(&program)?;
        if ev.mem.is_var(ScopeKind::Main, "X", "q") {
            let frags = ev.mem.fragments(ScopeKind::Main, "X", "q")?;
            let qubits = ev.mem.len_of(ScopeKind::Main, "X", "q")?;
            print!("{}", compile(&frags, qubits));
        }
        return Ok(());
    }

    let mut ev = evaluator_from(&cfg);
    ev.run_program(&program)?;
    Ok(())
}

fn evaluator_from(cfg: &Config) -> Evaluator {
    let sim = match cfg.seed {
        Some(seed) => LocalSimulator::seeded(seed),
        None => LocalSimulator::new(),
    };
    let mut ev = Evaluator::with_parts(Box::new(sim), Box::new(std::io::stdout()));
    ev.set_shots(cfg.shots.read, cfg.shots.statement);
    ev
}

fn main() {
    let cli = Cli::parse();
    if cli.debug {
        // Must happen before the first trace call reads the variable.
        std::env::set_var("ARQON_DEBUG", "1");
    }
    if let Err(err) = run(&cli) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
