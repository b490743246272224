// src/core/memory.rs
//! Scoped variable memory: scope → function → variable → slot.
//!
//! Scalar-like slots hold an index → value table sized to `len`;
//! hashmap/measurement slots hold a key → value table; circuit slots
//! hold an append-only fragment list validated against the register
//! width. `resize` is destructive: data is re-derived from the type's
//! default value at the new length.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::error::CoreError;
use crate::core::gate::Fragment;
use crate::core::value::{TypeTag, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeKind {
    Main,
    Func,
}

impl ScopeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Main => "main",
            ScopeKind::Func => "func",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Address of one cell or keyed entry inside a slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Pos(usize),
    Name(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Pos(i) => write!(f, "{}", i),
            Key::Name(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotData {
    Values(BTreeMap<usize, Value>),
    Map(BTreeMap<String, Value>),
    Circuit(Vec<Fragment>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub ty: TypeTag,
    pub len: usize,
    pub fixed_size: bool,
    pub data: SlotData,
}

impl Slot {
    fn new(ty: TypeTag) -> Slot {
        let data = match ty {
            TypeTag::Hashmap | TypeTag::Measurement => SlotData::Map(BTreeMap::new()),
            TypeTag::Circuit => SlotData::Circuit(Vec::new()),
            _ => {
                let mut cells = BTreeMap::new();
                cells.insert(0, ty.default_value());
                SlotData::Values(cells)
            }
        };
        Slot { ty, len: 1, fixed_size: false, data }
    }
}

type VarTable = BTreeMap<String, Slot>;
type FuncTable = BTreeMap<String, VarTable>;

#[derive(Debug, Default)]
pub struct Memory {
    scopes: BTreeMap<ScopeKind, FuncTable>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }

    /// Drops every scope. Fresh-start semantics for a new program.
    pub fn restart(&mut self) {
        self.scopes.clear();
    }

    /// Declares a variable with one default cell. No-op if it already
    /// exists.
    pub fn create(&mut self, scope: ScopeKind, func: &str, var: &str, ty: TypeTag) {
        let vars = self
            .scopes
            .entry(scope)
            .or_default()
            .entry(func.to_string())
            .or_default();
        vars.entry(var.to_string()).or_insert_with(|| Slot::new(ty));
    }

    pub fn is_var(&self, scope: ScopeKind, func: &str, var: &str) -> bool {
        self.scopes
            .get(&scope)
            .and_then(|fns| fns.get(func))
            .map(|vars| vars.contains_key(var))
            .unwrap_or(false)
    }

    fn slot(&self, scope: ScopeKind, func: &str, var: &str) -> Result<&Slot, CoreError> {
        self.scopes
            .get(&scope)
            .and_then(|fns| fns.get(func))
            .and_then(|vars| vars.get(var))
            .ok_or_else(|| CoreError::memory_lookup(scope, func, var))
    }

    fn slot_mut(
        &mut self,
        scope: ScopeKind,
        func: &str,
        var: &str,
    ) -> Result<&mut Slot, CoreError> {
        self.scopes
            .get_mut(&scope)
            .and_then(|fns| fns.get_mut(func))
            .and_then(|vars| vars.get_mut(var))
            .ok_or_else(|| CoreError::memory_lookup(scope, func, var))
    }

    /// Writes one cell or keyed entry.
    pub fn write(
        &mut self,
        scope: ScopeKind,
        func: &str,
        var: &str,
        key: &Key,
        value: Value,
    ) -> Result<(), CoreError> {
        let slot = self.slot_mut(scope, func, var)?;
        match (&mut slot.data, key) {
            (SlotData::Values(cells), Key::Pos(i)) => {
                if *i >= slot.len {
                    return Err(CoreError::memory_lookup(scope, func, var));
                }
                cells.insert(*i, value);
                Ok(())
            }
            (SlotData::Map(map), key) => {
                // Hashmap/measurement writes key by name; a positional
                // key is accepted as its decimal spelling.
                map.insert(key.to_string(), value);
                Ok(())
            }
            (SlotData::Circuit(_), _) => Err(CoreError::type_mismatch(
                "write",
                TypeTag::Circuit,
                value.type_tag(),
            )),
            (SlotData::Values(_), Key::Name(_)) => {
                Err(CoreError::memory_lookup(scope, func, var))
            }
        }
    }

    /// Whole-store replacement: every cell takes `value`.
    pub fn write_all(
        &mut self,
        scope: ScopeKind,
        func: &str,
        var: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let slot = self.slot_mut(scope, func, var)?;
        match &mut slot.data {
            SlotData::Values(cells) => {
                for i in 0..slot.len {
                    cells.insert(i, value.clone());
                }
                Ok(())
            }
            _ => Err(CoreError::type_mismatch("write", slot.ty, value.type_tag())),
        }
    }

    /// Destructive length change: data is rebuilt from the type default
    /// at the new length and the size becomes fixed.
    pub fn resize(
        &mut self,
        scope: ScopeKind,
        func: &str,
        var: &str,
        len: usize,
    ) -> Result<(), CoreError> {
        let slot = self.slot_mut(scope, func, var)?;
        slot.len = len;
        slot.fixed_size = true;
        match &mut slot.data {
            SlotData::Values(cells) => {
                cells.clear();
                for i in 0..len {
                    cells.insert(i, slot.ty.default_value());
                }
            }
            SlotData::Map(map) => map.clear(),
            SlotData::Circuit(frags) => frags.clear(),
        }
        Ok(())
    }

    /// Appends one fragment to a circuit slot, merging with the tail
    /// when the merge rule allows it. Fragment indices must fit the
    /// register width.
    pub fn append_fragment(
        &mut self,
        scope: ScopeKind,
        func: &str,
        var: &str,
        frag: Fragment,
    ) -> Result<(), CoreError> {
        let slot = self.slot_mut(scope, func, var)?;
        let width = slot.len;
        match &mut slot.data {
            SlotData::Circuit(frags) => {
                if frag.max_index() >= width {
                    return Err(CoreError::invalid_gate(format!(
                        "index {} outside register of width {} ('{}')",
                        frag.max_index(),
                        width,
                        var
                    )));
                }
                match (frags.pop(), frag) {
                    (Some(Fragment::Gate(tail)), Fragment::Gate(next))
                        if tail.can_merge(&next) =>
                    {
                        frags.push(Fragment::Gate(tail.merged(&next)));
                    }
                    (Some(prev), next) => {
                        frags.push(prev);
                        frags.push(next);
                    }
                    (None, next) => frags.push(next),
                }
                Ok(())
            }
            _ => Err(CoreError::type_mismatch("append", slot.ty, TypeTag::Circuit)),
        }
    }

    pub fn read(
        &self,
        scope: ScopeKind,
        func: &str,
        var: &str,
        key: &Key,
    ) -> Result<Value, CoreError> {
        let slot = self.slot(scope, func, var)?;
        match (&slot.data, key) {
            (SlotData::Values(cells), Key::Pos(i)) => cells
                .get(i)
                .cloned()
                .ok_or_else(|| CoreError::memory_lookup(scope, func, var)),
            (SlotData::Map(map), key) => map
                .get(&key.to_string())
                .cloned()
                .ok_or_else(|| CoreError::memory_lookup(scope, func, var)),
            _ => Err(CoreError::memory_lookup(scope, func, var)),
        }
    }

    /// All values in index order. Map slots yield values in key order;
    /// circuit slots have no value view (use `fragments`).
    pub fn read_all(
        &self,
        scope: ScopeKind,
        func: &str,
        var: &str,
    ) -> Result<Vec<Value>, CoreError> {
        let slot = self.slot(scope, func, var)?;
        match &slot.data {
            SlotData::Values(cells) => Ok(cells.values().cloned().collect()),
            SlotData::Map(map) => Ok(map.values().cloned().collect()),
            SlotData::Circuit(_) => {
                Err(CoreError::type_mismatch("read", TypeTag::Circuit, "values"))
            }
        }
    }

    pub fn fragments(
        &self,
        scope: ScopeKind,
        func: &str,
        var: &str,
    ) -> Result<Vec<Fragment>, CoreError> {
        let slot = self.slot(scope, func, var)?;
        match &slot.data {
            SlotData::Circuit(frags) => Ok(frags.clone()),
            _ => Err(CoreError::type_mismatch("read", slot.ty, TypeTag::Circuit)),
        }
    }

    /// Index set of the slot: positions for scalar-like and circuit
    /// slots, key names for map slots.
    pub fn get_indices(
        &self,
        scope: ScopeKind,
        func: &str,
        var: &str,
    ) -> Result<Vec<Key>, CoreError> {
        let slot = self.slot(scope, func, var)?;
        match &slot.data {
            SlotData::Values(cells) => Ok(cells.keys().map(|i| Key::Pos(*i)).collect()),
            SlotData::Map(map) => Ok(map.keys().map(|k| Key::Name(k.clone())).collect()),
            SlotData::Circuit(_) => Ok((0..slot.len).map(Key::Pos).collect()),
        }
    }

    pub fn len_of(&self, scope: ScopeKind, func: &str, var: &str) -> Result<usize, CoreError> {
        Ok(self.slot(scope, func, var)?.len)
    }

    pub fn type_of(&self, scope: ScopeKind, func: &str, var: &str) -> Result<TypeTag, CoreError> {
        Ok(self.slot(scope, func, var)?.ty)
    }

    pub fn is_fixed_size(
        &self,
        scope: ScopeKind,
        func: &str,
        var: &str,
    ) -> Result<bool, CoreError> {
        Ok(self.slot(scope, func, var)?.fixed_size)
    }

    /// Moves one variable between scopes in a single take-and-insert.
    pub fn move_scope(
        &mut self,
        from: ScopeKind,
        func: &str,
        var: &str,
        to: ScopeKind,
        to_func: &str,
    ) -> Result<(), CoreError> {
        let slot = self
            .scopes
            .get_mut(&from)
            .and_then(|fns| fns.get_mut(func))
            .and_then(|vars| vars.remove(var))
            .ok_or_else(|| CoreError::memory_lookup(from, func, var))?;
        self.scopes
            .entry(to)
            .or_default()
            .entry(to_func.to_string())
            .or_default()
            .insert(var.to_string(), slot);
        Ok(())
    }

    /// Frees one function's variables, or the whole scope when `func`
    /// is `None`. Missing entries are fine; free is idempotent.
    pub fn free(&mut self, scope: ScopeKind, func: Option<&str>) {
        match func {
            Some(name) => {
                if let Some(fns) = self.scopes.get_mut(&scope) {
                    fns.remove(name);
                }
            }
            None => {
                self.scopes.remove(&scope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gate::{Fragment, Gate, GateOp};

    #[test]
    fn create_is_noop_on_existing() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Main, "X", "a", TypeTag::Int);
        mem.write(ScopeKind::Main, "X", "a", &Key::Pos(0), Value::Int(7))
            .unwrap();
        mem.create(ScopeKind::Main, "X", "a", TypeTag::Int);
        assert_eq!(
            mem.read(ScopeKind::Main, "X", "a", &Key::Pos(0)).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn scopes_key_independent_tables() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Main, "X", "a", TypeTag::Int);
        mem.create(ScopeKind::Func, "X", "a", TypeTag::Str);
        assert_eq!(mem.type_of(ScopeKind::Main, "X", "a").unwrap(), TypeTag::Int);
        assert_eq!(mem.type_of(ScopeKind::Func, "X", "a").unwrap(), TypeTag::Str);
    }

    #[test]
    fn missing_var_is_memory_lookup() {
        let mem = Memory::new();
        let err = mem.read(ScopeKind::Main, "X", "ghost", &Key::Pos(0)).unwrap_err();
        assert!(matches!(err, CoreError::MemoryLookup { .. }));
    }

    #[test]
    fn resize_is_destructive_and_fixes_size() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Main, "X", "a", TypeTag::Int);
        mem.write(ScopeKind::Main, "X", "a", &Key::Pos(0), Value::Int(9))
            .unwrap();
        mem.resize(ScopeKind::Main, "X", "a", 3).unwrap();
        assert_eq!(
            mem.read_all(ScopeKind::Main, "X", "a").unwrap(),
            vec![Value::Int(0), Value::Int(0), Value::Int(0)]
        );
        assert!(mem.is_fixed_size(ScopeKind::Main, "X", "a").unwrap());
    }

    #[test]
    fn circuit_append_validates_register_width() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Main, "X", "q", TypeTag::Circuit);
        mem.resize(ScopeKind::Main, "X", "q", 2).unwrap();
        let ok = Gate::multi(GateOp::H, vec![0, 1]).unwrap();
        mem.append_fragment(ScopeKind::Main, "X", "q", Fragment::Gate(ok))
            .unwrap();
        let out_of_range = Gate::multi(GateOp::H, vec![2]).unwrap();
        let err = mem
            .append_fragment(ScopeKind::Main, "X", "q", Fragment::Gate(out_of_range))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidGate(_)));
    }

    #[test]
    fn circuit_append_merges_with_tail() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Main, "X", "q", TypeTag::Circuit);
        mem.resize(ScopeKind::Main, "X", "q", 2).unwrap();
        let a = Gate::multi(GateOp::H, vec![0]).unwrap();
        let b = Gate::multi(GateOp::H, vec![1]).unwrap();
        mem.append_fragment(ScopeKind::Main, "X", "q", Fragment::Gate(a))
            .unwrap();
        mem.append_fragment(ScopeKind::Main, "X", "q", Fragment::Gate(b))
            .unwrap();
        let frags = mem.fragments(ScopeKind::Main, "X", "q").unwrap();
        assert_eq!(frags.len(), 1);
        match &frags[0] {
            Fragment::Gate(g) => assert_eq!(g.indices, vec![0, 1]),
            other => panic!("expected merged gate, got {:?}", other),
        }
    }

    #[test]
    fn map_slot_keys_in_order() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Main, "X", "m", TypeTag::Hashmap);
        mem.write(
            ScopeKind::Main,
            "X",
            "m",
            &Key::Name("b".into()),
            Value::Int(2),
        )
        .unwrap();
        mem.write(
            ScopeKind::Main,
            "X",
            "m",
            &Key::Name("a".into()),
            Value::Int(1),
        )
        .unwrap();
        assert_eq!(
            mem.get_indices(ScopeKind::Main, "X", "m").unwrap(),
            vec![Key::Name("a".into()), Key::Name("b".into())]
        );
    }

    #[test]
    fn move_scope_relocates_slot() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Func, "F", "r", TypeTag::Int);
        mem.write(ScopeKind::Func, "F", "r", &Key::Pos(0), Value::Int(4))
            .unwrap();
        mem.move_scope(ScopeKind::Func, "F", "r", ScopeKind::Main, "X")
            .unwrap();
        assert!(!mem.is_var(ScopeKind::Func, "F", "r"));
        assert_eq!(
            mem.read(ScopeKind::Main, "X", "r", &Key::Pos(0)).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn free_is_idempotent() {
        let mut mem = Memory::new();
        mem.create(ScopeKind::Func, "F", "r", TypeTag::Int);
        mem.free(ScopeKind::Func, Some("F"));
        mem.free(ScopeKind::Func, Some("F"));
        assert!(!mem.is_var(ScopeKind::Func, "F", "r"));
    }
}
