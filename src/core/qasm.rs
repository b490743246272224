// src/core/qasm.rs
//! Assembly bridge: circuit fragments → OpenQASM 2.0 text → simulated
//! measurement distribution → reduction into language values.
//!
//! The local simulator only has to understand the statement forms this
//! module emits. Every supported gate has a real-valued matrix, so the
//! statevector stays in plain f64 amplitudes. Qubit k is bit k of the
//! outcome (least significant bit first).

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::error::CoreError;
use crate::core::gate::{Fragment, GateOp};
use crate::core::value::{TypeTag, Value};
use crate::debug_log;

/// Shots used when a circuit collapses at statement level.
pub const STMT_SHOTS: u32 = 1024;
/// Shots used when a circuit is read in a numeric context.
pub const READ_SHOTS: u32 = 2048;

/// Measurement outcome keys (hex bitstrings) → shot counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Distribution(pub BTreeMap<String, u32>);

impl Distribution {
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.0.iter()
    }

    /// Decodes an outcome key. Accepts a `0x` prefix or bare hex
    /// digits.
    pub fn decode_key(key: &str) -> Result<u64, CoreError> {
        let digits = key.strip_prefix("0x").unwrap_or(key);
        u64::from_str_radix(digits, 16)
            .map_err(|_| CoreError::simulation(format!("bad outcome key '{}'", key)))
    }
}

/// Emits the assembly text for a fragment list over `qubits` wires.
pub fn compile(fragments: &[Fragment], qubits: usize) -> String {
    let mut out = String::new();
    out.push_str("OPENQASM 2.0;\n");
    out.push_str("include \"qelib1.inc\";\n");
    out.push_str(&format!("qreg q[{}];\n", qubits));
    out.push_str(&format!("creg c[{}];\n", qubits));
    for frag in fragments {
        for gate in frag.flatten() {
            if gate.ct.is_some() {
                // Multi-qubit gate: one statement, comma-separated.
                let args: Vec<String> =
                    gate.indices.iter().map(|i| format!("q[{}]", i)).collect();
                out.push_str(&format!("{} {};\n", gate.op.mnemonic(), args.join(",")));
            } else {
                // Single-qubit operator spread over its index list.
                for i in &gate.indices {
                    out.push_str(&format!("{} q[{}];\n", gate.op.mnemonic(), i));
                }
            }
        }
    }
    out.push_str("measure q -> c;\n");
    out
}

/// Blocking back end turning assembly text into outcome counts.
pub trait Simulator {
    fn run(&self, qasm: &str, shots: u32) -> Result<Distribution, CoreError>;
}

/// Statevector simulator over the emitted gate set. Shot allocation is
/// deterministic (largest-remainder apportionment of the expected
/// counts) unless a seed is set, in which case shots are sampled.
#[derive(Debug, Clone, Default)]
pub struct LocalSimulator {
    pub seed: Option<u64>,
}

impl LocalSimulator {
    pub fn new() -> LocalSimulator {
        LocalSimulator { seed: None }
    }

    pub fn seeded(seed: u64) -> LocalSimulator {
        LocalSimulator { seed: Some(seed) }
    }
}

impl Simulator for LocalSimulator {
    fn run(&self, qasm: &str, shots: u32) -> Result<Distribution, CoreError> {
        let program = parse_asm(qasm)?;
        let mut state = vec![0.0f64; 1 << program.qubits];
        state[0] = 1.0;
        for stmt in &program.stmts {
            apply_gate(&mut state, program.qubits, stmt)?;
        }
        let probs: Vec<f64> = state.iter().map(|a| a * a).collect();
        debug_log!("simulated {} qubits, {} stmts", program.qubits, program.stmts.len());
        let counts = match self.seed {
            Some(seed) => sample_counts(&probs, shots, seed),
            None => apportion_counts(&probs, shots),
        };
        let mut dist = BTreeMap::new();
        for (basis, count) in counts.into_iter().enumerate() {
            if count > 0 {
                dist.insert(format!("{:x}", basis), count);
            }
        }
        Ok(Distribution(dist))
    }
}

struct AsmProgram {
    qubits: usize,
    stmts: Vec<(GateOp, Vec<usize>)>,
}

fn mnemonic_op(name: &str) -> Option<GateOp> {
    match name {
        "h" => Some(GateOp::H),
        "x" => Some(GateOp::X),
        "z" => Some(GateOp::Z),
        "cx" => Some(GateOp::Cnot),
        "swap" => Some(GateOp::Swap),
        "cz" => Some(GateOp::Cz),
        "ccx" => Some(GateOp::Toffoli),
        _ => None,
    }
}

fn parse_asm(qasm: &str) -> Result<AsmProgram, CoreError> {
    let mut qubits = None;
    let mut stmts = Vec::new();
    for line in qasm.lines() {
        let line = line.trim().trim_end_matches(';');
        if line.is_empty()
            || line.starts_with("OPENQASM")
            || line.starts_with("include")
            || line.starts_with("creg")
            || line.starts_with("measure")
        {
            continue;
        }
        if let Some(rest) = line.strip_prefix("qreg q[") {
            let n: usize = rest
                .trim_end_matches(']')
                .parse()
                .map_err(|_| CoreError::simulation(format!("bad qreg line '{}'", line)))?;
            qubits = Some(n);
            continue;
        }
        let (name, args) = line
            .split_once(' ')
            .ok_or_else(|| CoreError::simulation(format!("bad statement '{}'", line)))?;
        let op = mnemonic_op(name)
            .ok_or_else(|| CoreError::simulation(format!("unknown gate '{}'", name)))?;
        let mut indices = Vec::new();
        for arg in args.split(',') {
            let i: usize = arg
                .trim()
                .trim_start_matches("q[")
                .trim_end_matches(']')
                .parse()
                .map_err(|_| CoreError::simulation(format!("bad operand '{}'", arg)))?;
            indices.push(i);
        }
        if indices.len() != op.arity() {
            return Err(CoreError::simulation(format!(
                "'{}' takes {} operands, got {}",
                name,
                op.arity(),
                indices.len()
            )));
        }
        stmts.push((op, indices));
    }
    let qubits =
        qubits.ok_or_else(|| CoreError::simulation("missing qreg declaration"))?;
    for (op, indices) in &stmts {
        if let Some(max) = indices.iter().max() {
            if *max >= qubits {
                return Err(CoreError::simulation(format!(
                    "'{}' touches q[{}] outside register of {}",
                    op, max, qubits
                )));
            }
        }
    }
    Ok(AsmProgram { qubits, stmts })
}

fn apply_gate(
    state: &mut [f64],
    qubits: usize,
    stmt: &(GateOp, Vec<usize>),
) -> Result<(), CoreError> {
    let (op, ix) = stmt;
    let dim = 1usize << qubits;
    match op {
        GateOp::H => {
            let q = ix[0];
            let bit = 1usize << q;
            let inv_sqrt2 = std::f64::consts::FRAC_1_SQRT_2;
            for i in 0..dim {
                if i & bit == 0 {
                    let a = state[i];
                    let b = state[i | bit];
                    state[i] = inv_sqrt2 * (a + b);
                    state[i | bit] = inv_sqrt2 * (a - b);
                }
            }
        }
        GateOp::X => {
            let bit = 1usize << ix[0];
            for i in 0..dim {
                if i & bit == 0 {
                    state.swap(i, i | bit);
                }
            }
        }
        GateOp::Z => {
            let bit = 1usize << ix[0];
            for i in 0..dim {
                if i & bit != 0 {
                    state[i] = -state[i];
                }
            }
        }
        GateOp::Cnot => {
            let (c, t) = (1usize << ix[0], 1usize << ix[1]);
            for i in 0..dim {
                if i & c != 0 && i & t == 0 {
                    state.swap(i, i | t);
                }
            }
        }
        GateOp::Swap => {
            let (a, b) = (1usize << ix[0], 1usize << ix[1]);
            for i in 0..dim {
                if i & a != 0 && i & b == 0 {
                    state.swap(i, (i & !a) | b);
                }
            }
        }
        GateOp::Cz => {
            let (a, b) = (1usize << ix[0], 1usize << ix[1]);
            for i in 0..dim {
                if i & a != 0 && i & b != 0 {
                    state[i] = -state[i];
                }
            }
        }
        GateOp::Toffoli => {
            let (c1, c2, t) = (1usize << ix[0], 1usize << ix[1], 1usize << ix[2]);
            for i in 0..dim {
                if i & c1 != 0 && i & c2 != 0 && i & t == 0 {
                    state.swap(i, i | t);
                }
            }
        }
    }
    Ok(())
}

/// Largest-remainder apportionment of `shots` over basis states; a pure
/// function of the probabilities, so repeated runs agree exactly.
fn apportion_counts(probs: &[f64], shots: u32) -> Vec<u32> {
    let mut counts: Vec<u32> = Vec::with_capacity(probs.len());
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(probs.len());
    let mut assigned = 0u32;
    for (i, p) in probs.iter().enumerate() {
        let exact = p * shots as f64;
        let floor = exact.floor() as u32;
        counts.push(floor);
        assigned += floor;
        remainders.push((i, exact - floor as f64));
    }
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut left = shots.saturating_sub(assigned) as usize;
    for (i, _) in remainders {
        if left == 0 {
            break;
        }
        counts[i] += 1;
        left -= 1;
    }
    counts
}

fn sample_counts(probs: &[f64], shots: u32, seed: u64) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = vec![0u32; probs.len()];
    for _ in 0..shots {
        let mut roll: f64 = rng.gen();
        let mut picked = probs.len() - 1;
        for (i, p) in probs.iter().enumerate() {
            if roll < *p {
                picked = i;
                break;
            }
            roll -= p;
        }
        counts[picked] += 1;
    }
    counts
}

/// What a distribution reduces to for a given target type.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduced {
    Scalar(Value),
    Counts(Distribution),
}

/// Collapses a measurement distribution into the target type: a
/// measurement target keeps the full distribution; a single outcome key
/// decodes directly; multiple keys collapse to the shot-weighted mean,
/// truncated toward zero for integers.
pub fn reduce(dist: &Distribution, target: TypeTag) -> Result<Reduced, CoreError> {
    if target == TypeTag::Measurement {
        return Ok(Reduced::Counts(dist.clone()));
    }
    match target {
        TypeTag::Int | TypeTag::Float | TypeTag::Str => {}
        other => return Err(CoreError::unsupported_reduction(other)),
    }
    if dist.0.len() == 1 {
        let key = dist.0.keys().next().ok_or_else(|| {
            CoreError::simulation("empty distribution")
        })?;
        let n = Distribution::decode_key(key)?;
        return Ok(Reduced::Scalar(decode_scalar(n, target)?));
    }
    let total = dist.total();
    if total == 0 {
        return Err(CoreError::simulation("empty distribution"));
    }
    let mut acc = 0.0f64;
    for (key, count) in dist.iter() {
        acc += Distribution::decode_key(key)? as f64 * *count as f64;
    }
    let mean = acc / total as f64;
    match target {
        TypeTag::Float => Ok(Reduced::Scalar(Value::Float(mean))),
        _ => decode_scalar(mean as i64 as u64, target).map(Reduced::Scalar),
    }
}

fn decode_scalar(n: u64, target: TypeTag) -> Result<Value, CoreError> {
    match target {
        TypeTag::Int => Ok(Value::Int(n as i64)),
        TypeTag::Float => Ok(Value::Float(n as f64)),
        TypeTag::Str => {
            let c = char::from_u32(n as u32).unwrap_or('\u{fffd}');
            Ok(Value::Str(c.to_string()))
        }
        other => Err(CoreError::unsupported_reduction(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::Gate;

    fn bell_fragments() -> Vec<Fragment> {
        vec![
            Fragment::Gate(Gate::multi(GateOp::H, vec![0]).unwrap()),
            Fragment::Gate(Gate::single(GateOp::Cnot, vec![0, 1]).unwrap()),
        ]
    }

    #[test]
    fn compile_emits_header_gates_and_measure() {
        let text = compile(&bell_fragments(), 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "OPENQASM 2.0;");
        assert_eq!(lines[1], "include \"qelib1.inc\";");
        assert_eq!(lines[2], "qreg q[2];");
        assert_eq!(lines[3], "creg c[2];");
        assert_eq!(lines[4], "h q[0];");
        assert_eq!(lines[5], "cx q[0],q[1];");
        assert_eq!(lines[6], "measure q -> c;");
    }

    #[test]
    fn multi_index_gate_spreads_one_statement_per_index() {
        let frag = Fragment::Gate(Gate::multi(GateOp::H, vec![0, 1]).unwrap());
        let text = compile(&[frag], 2);
        assert!(text.contains("h q[0];\nh q[1];"));
    }

    #[test]
    fn bell_state_splits_shots_between_00_and_11() {
        let sim = LocalSimulator::new();
        let dist = sim.run(&compile(&bell_fragments(), 2), 1024).unwrap();
        assert_eq!(dist.total(), 1024);
        assert_eq!(dist.0.get("0"), Some(&512));
        assert_eq!(dist.0.get("3"), Some(&512));
    }

    #[test]
    fn x_gate_flips_deterministically() {
        let frag = Fragment::Gate(Gate::multi(GateOp::X, vec![0]).unwrap());
        let sim = LocalSimulator::new();
        let dist = sim.run(&compile(&[frag], 1), 100).unwrap();
        assert_eq!(dist.0.get("1"), Some(&100));
    }

    #[test]
    fn seeded_runs_agree() {
        let sim = LocalSimulator::seeded(7);
        let asm = compile(&bell_fragments(), 2);
        let a = sim.run(&asm, 256).unwrap();
        let b = sim.run(&asm, 256).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total(), 256);
    }

    #[test]
    fn reduce_single_key_decodes_hex() {
        let mut d = BTreeMap::new();
        d.insert("a".to_string(), 1024u32);
        let out = reduce(&Distribution(d), TypeTag::Int).unwrap();
        assert_eq!(out, Reduced::Scalar(Value::Int(10)));
    }

    #[test]
    fn reduce_measurement_keeps_distribution() {
        let mut d = BTreeMap::new();
        d.insert("0".to_string(), 600u32);
        d.insert("1".to_string(), 424u32);
        let dist = Distribution(d);
        let out = reduce(&dist, TypeTag::Measurement).unwrap();
        assert_eq!(out, Reduced::Counts(dist));
    }

    #[test]
    fn reduce_multi_key_int_truncates_weighted_mean() {
        let mut d = BTreeMap::new();
        d.insert("0".to_string(), 600u32);
        d.insert("1".to_string(), 424u32);
        // mean = 424/1024 ≈ 0.414 → 0
        let out = reduce(&Distribution(d), TypeTag::Int).unwrap();
        assert_eq!(out, Reduced::Scalar(Value::Int(0)));
    }

    #[test]
    fn reduce_rejects_unknown_target() {
        let mut d = BTreeMap::new();
        d.insert("0".to_string(), 10u32);
        let err = reduce(&Distribution(d), TypeTag::Circuit).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedReduction { .. }));
    }
}
