// src/core/gate.rs
//! Gate and circuit-fragment model.
//!
//! A `Gate` is an operator applied to pairwise-distinct qubit indices,
//! optionally with a control/target split. Composing two gates merges
//! them into one multi-index gate when the operator matches and the
//! index sets are disjoint; otherwise the pair becomes a `GateArray`.

use std::fmt;

use crate::core::error::CoreError;

/// The fixed operator set the assembly bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateOp {
    H,
    X,
    Z,
    Cnot,
    Swap,
    Cz,
    Toffoli,
}

impl GateOp {
    /// Qubits consumed by one application of the operator.
    pub fn arity(&self) -> usize {
        match self {
            GateOp::H | GateOp::X | GateOp::Z => 1,
            GateOp::Cnot | GateOp::Swap | GateOp::Cz => 2,
            GateOp::Toffoli => 3,
        }
    }

    /// Control/target split for multi-qubit operators.
    pub fn ct(&self) -> Option<(usize, usize)> {
        match self {
            GateOp::H | GateOp::X | GateOp::Z => None,
            GateOp::Cnot | GateOp::Swap | GateOp::Cz => Some((1, 1)),
            GateOp::Toffoli => Some((2, 1)),
        }
    }

    pub fn from_builtin(name: &str) -> Option<GateOp> {
        match name {
            "@h" => Some(GateOp::H),
            "@x" => Some(GateOp::X),
            "@z" => Some(GateOp::Z),
            "@cnot" => Some(GateOp::Cnot),
            "@swap" => Some(GateOp::Swap),
            "@cz" => Some(GateOp::Cz),
            "@toffoli" => Some(GateOp::Toffoli),
            _ => None,
        }
    }

    /// Assembly mnemonic for the OpenQASM 2.0 dialect.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            GateOp::H => "h",
            GateOp::X => "x",
            GateOp::Z => "z",
            GateOp::Cnot => "cx",
            GateOp::Swap => "swap",
            GateOp::Cz => "cz",
            GateOp::Toffoli => "ccx",
        }
    }
}

impl fmt::Display for GateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Index argument shape for control/target construction: either a flat
/// index or a nested tuple of indices.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexTuple {
    Leaf(usize),
    Nested(Vec<IndexTuple>),
}

impl IndexTuple {
    fn flatten_into(&self, out: &mut Vec<usize>) {
        match self {
            IndexTuple::Leaf(i) => out.push(*i),
            IndexTuple::Nested(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    /// Leaf count at this level only (a nested tuple counts as one
    /// argument slot whose own width is validated recursively).
    fn width(&self) -> usize {
        match self {
            IndexTuple::Leaf(_) => 1,
            IndexTuple::Nested(items) => items.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub op: GateOp,
    pub indices: Vec<usize>,
    /// `(controls, targets)` when the operator splits its indices.
    pub ct: Option<(usize, usize)>,
}

impl Gate {
    /// Single-application gate over exactly `op.arity()` indices.
    pub fn single(op: GateOp, indices: Vec<usize>) -> Result<Gate, CoreError> {
        if indices.len() != op.arity() {
            return Err(CoreError::invalid_gate(format!(
                "'{}' takes {} indices, got {}",
                op,
                op.arity(),
                indices.len()
            )));
        }
        check_distinct(&indices, op)?;
        Ok(Gate { op, indices, ct: op.ct() })
    }

    /// Multi-index gate: one single-qubit operator applied across many
    /// indices at once.
    pub fn multi(op: GateOp, indices: Vec<usize>) -> Result<Gate, CoreError> {
        if op.arity() != 1 {
            return Err(CoreError::invalid_gate(format!(
                "'{}' cannot spread over an index list",
                op
            )));
        }
        if indices.is_empty() {
            return Err(CoreError::invalid_gate("empty index list"));
        }
        check_distinct(&indices, op)?;
        Ok(Gate { op, indices, ct: None })
    }

    /// Control/target gate built from nested index tuples. Validates the
    /// argument mask recursively: the control and target groups must
    /// carry exactly the widths the operator declares, at every level.
    pub fn control_target(
        op: GateOp,
        controls: &IndexTuple,
        targets: &IndexTuple,
    ) -> Result<Gate, CoreError> {
        let (nc, nt) = op.ct().ok_or_else(|| {
            CoreError::invalid_gate(format!("'{}' has no control/target split", op))
        })?;
        check_mask(controls, nc, op)?;
        check_mask(targets, nt, op)?;
        let mut indices = Vec::new();
        controls.flatten_into(&mut indices);
        targets.flatten_into(&mut indices);
        check_distinct(&indices, op)?;
        Ok(Gate { op, indices, ct: Some((nc, nt)) })
    }

    /// Two gates merge when neither has a control/target split, the
    /// operator matches, and the index sets are disjoint.
    pub fn can_merge(&self, other: &Gate) -> bool {
        self.op == other.op
            && self.ct.is_none()
            && other.ct.is_none()
            && other.indices.iter().all(|i| !self.indices.contains(i))
    }

    pub fn merged(&self, other: &Gate) -> Gate {
        let mut indices = self.indices.clone();
        indices.extend_from_slice(&other.indices);
        Gate { op: self.op, indices, ct: None }
    }

    pub fn max_index(&self) -> usize {
        self.indices.iter().copied().max().unwrap_or(0)
    }
}

fn check_distinct(indices: &[usize], op: GateOp) -> Result<(), CoreError> {
    for (n, i) in indices.iter().enumerate() {
        if indices[..n].contains(i) {
            return Err(CoreError::invalid_gate(format!(
                "duplicate index {} in '{}'",
                i, op
            )));
        }
    }
    Ok(())
}

fn check_mask(tuple: &IndexTuple, want: usize, op: GateOp) -> Result<(), CoreError> {
    let got = tuple.width();
    if got != want {
        return Err(CoreError::invalid_gate(format!(
            "'{}' expects {} index(es) in group, got {}",
            op, want, got
        )));
    }
    if let IndexTuple::Nested(items) = tuple {
        // Nested groups inside a control/target slot must each resolve
        // to a single qubit.
        for item in items {
            if let IndexTuple::Nested(_) = item {
                check_mask(item, 1, op)?;
            }
        }
    }
    Ok(())
}

/// One entry of a circuit slot: a gate or a nested array of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Gate(Gate),
    Array(GateArray),
}

impl Fragment {
    pub fn max_index(&self) -> usize {
        match self {
            Fragment::Gate(g) => g.max_index(),
            Fragment::Array(a) => a.max_index(),
        }
    }

    /// Program-order flat view of the gates this fragment holds.
    pub fn flatten(&self) -> Vec<Gate> {
        match self {
            Fragment::Gate(g) => vec![g.clone()],
            Fragment::Array(a) => a.flatten(),
        }
    }

    /// Sequential composition with the merge rule applied.
    pub fn compose(self, other: Fragment) -> Fragment {
        match (self, other) {
            (Fragment::Gate(a), Fragment::Gate(b)) if a.can_merge(&b) => {
                Fragment::Gate(a.merged(&b))
            }
            (a, b) => Fragment::Array(GateArray::of(vec![a, b])),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateArray {
    pub items: Vec<Fragment>,
}

impl GateArray {
    pub fn of(items: Vec<Fragment>) -> GateArray {
        GateArray { items }
    }

    pub fn flatten(&self) -> Vec<Gate> {
        let mut out = Vec::new();
        for item in &self.items {
            out.extend(item.flatten());
        }
        out
    }

    pub fn max_index(&self) -> usize {
        self.items.iter().map(Fragment::max_index).max().unwrap_or(0)
    }

    /// All indices touched, in program order, without duplicates.
    pub fn indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for gate in self.flatten() {
            for i in gate.indices {
                if !out.contains(&i) {
                    out.push(i);
                }
            }
        }
        out
    }

    /// Operator names touched, in program order, without duplicates.
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for gate in self.flatten() {
            let name = gate.op.mnemonic();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }
}
