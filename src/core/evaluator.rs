// src/core/evaluator.rs
//! Depth-first AST walker threading an owned evaluation context.
//!
//! Dispatch is a static NodeKind → handler table; every handler takes
//! the node plus the context by move and returns it. All intermediate
//! results flow through the context's `args`/`idx`/`to_var` buffers.
//! Branch suppression is a skip counter consumed one sibling statement
//! at a time: a false test adds 1, an explicit body exit adds 2, and
//! leftover skips propagate outward to suppress chained branches.

use std::collections::HashMap;
use std::io::Write;

use once_cell::sync::Lazy;

use crate::core::ast::{AstNode, CallTarget, IndexSpec, Literal, NodeKind};
use crate::core::builtins::{self, ApplyMode, Builtin, BuiltinKind};
use crate::core::error::CoreError;
use crate::core::gate::{Fragment, Gate};
use crate::core::memory::{Key, Memory, ScopeKind};
use crate::core::qasm::{self, Distribution, LocalSimulator, Reduced, Simulator};
use crate::core::value::{TypeTag, Value};
use crate::debug_log;

/// Section of a definition currently being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKey {
    Type,
    Params,
    Body,
    Return,
}

/// A pending result: classical value or circuit fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Fragment(Fragment),
}

/// Evaluation context. One instance per program walk, moved through
/// every handler.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub scope: Option<ScopeKind>,
    pub func: String,
    pub var: String,
    pub ty: Option<TypeTag>,
    pub key: Option<SectionKey>,
    pub ctx: Option<NodeKind>,
    pub level: u32,
    pub skip: u32,
    pub args: Vec<Value>,
    pub idx: Vec<Key>,
    pub to_var: Vec<Outcome>,
}

impl Stats {
    fn scope_kind(&self) -> ScopeKind {
        self.scope.unwrap_or(ScopeKind::Main)
    }

    fn target_ty(&self) -> TypeTag {
        self.ty.unwrap_or(TypeTag::Null)
    }

    fn clear_buffers(&mut self) {
        self.args.clear();
        self.idx.clear();
        self.to_var.clear();
    }
}

type Handler = fn(&mut Evaluator, &AstNode, Stats) -> Result<Stats, CoreError>;

static HANDLERS: Lazy<HashMap<NodeKind, Handler>> = Lazy::new(|| {
    let mut t: HashMap<NodeKind, Handler> = HashMap::new();
    t.insert(NodeKind::Program, Evaluator::on_program);
    t.insert(NodeKind::FuncDef, Evaluator::on_func_def);
    t.insert(NodeKind::AttrDecl, Evaluator::on_attr_decl);
    t.insert(NodeKind::AttrAssign, Evaluator::on_attr_assign);
    t.insert(NodeKind::AttrHeader, Evaluator::on_attr_header);
    t.insert(NodeKind::Entity, Evaluator::on_entity);
    t.insert(NodeKind::IndexAssign, Evaluator::on_index_assign);
    t.insert(NodeKind::Call, Evaluator::on_call);
    t.insert(NodeKind::Args, Evaluator::on_args);
    t.insert(NodeKind::IfStmt, Evaluator::on_if);
    t.insert(NodeKind::ElifStmt, Evaluator::on_branch);
    t.insert(NodeKind::ElseStmt, Evaluator::on_branch);
    t.insert(NodeKind::Tests, Evaluator::on_tests);
    t.insert(NodeKind::Body, Evaluator::on_body);
    t.insert(NodeKind::ExitBody, Evaluator::on_exit_body);
    t.insert(NodeKind::Literal, Evaluator::on_literal);
    t.insert(NodeKind::Symbol, Evaluator::on_symbol);
    t.insert(NodeKind::QSymbol, Evaluator::on_qsymbol);
    t
});

pub struct Evaluator {
    pub mem: Memory,
    funcs: HashMap<String, AstNode>,
    sim: Box<dyn Simulator>,
    out: Box<dyn Write>,
    read_shots: u32,
    stmt_shots: u32,
}

impl Evaluator {
    pub fn new() -> Evaluator {
        Evaluator::with_parts(Box::new(LocalSimulator::new()), Box::new(std::io::stdout()))
    }

    pub fn with_parts(sim: Box<dyn Simulator>, out: Box<dyn Write>) -> Evaluator {
        Evaluator {
            mem: Memory::new(),
            funcs: HashMap::new(),
            sim,
            out,
            read_shots: qasm::READ_SHOTS,
            stmt_shots: qasm::STMT_SHOTS,
        }
    }

    pub fn set_shots(&mut self, read: u32, stmt: u32) {
        self.read_shots = read;
        self.stmt_shots = stmt;
    }

    /// Runs one program from a fresh memory state.
    pub fn run_program(&mut self, program: &AstNode) -> Result<(), CoreError> {
        self.mem.restart();
        self.funcs.clear();
        let stats = Stats::default();
        self.walk(program, stats)?;
        self.out
            .flush()
            .map_err(|e| CoreError::internal(format!("output sink: {}", e)))
    }

    fn walk(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        let kind = node.kind();
        debug_log!(
            "walk {:?} (key={:?}, skip={}, var='{}')",
            kind,
            stats.key,
            stats.skip,
            stats.var
        );
        let handler = HANDLERS
            .get(&kind)
            .ok_or_else(|| CoreError::internal(format!("no handler for {:?}", kind)))?;
        handler(self, node, stats)
    }

    /// Statement-sequence walk with skip consumption: each pending skip
    /// suppresses exactly one sibling without evaluating it.
    fn walk_seq(&mut self, nodes: &[AstNode], mut stats: Stats) -> Result<Stats, CoreError> {
        for node in nodes {
            if stats.skip > 0 {
                stats.skip -= 1;
                continue;
            }
            stats = self.walk(node, stats)?;
        }
        Ok(stats)
    }

    // ----- handlers -----

    fn on_program(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let defs = match node {
            AstNode::Program(defs) => defs,
            _ => return Err(CoreError::internal("program handler on non-program")),
        };
        // Function definitions register first so main can call forward.
        for def in defs {
            if let AstNode::FuncDef { scope, name, .. } = def {
                if scope == "func" {
                    self.funcs.insert(name.clone(), def.clone());
                }
            }
        }
        for def in defs {
            if let AstNode::FuncDef { scope, .. } = def {
                if scope == "main" {
                    stats = self.walk(def, stats)?;
                }
            }
        }
        Ok(stats)
    }

    fn on_func_def(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let (name, body) = match node {
            AstNode::FuncDef { name, body, .. } => (name, body),
            _ => return Err(CoreError::internal("func-def handler on non-def")),
        };
        stats.scope = Some(ScopeKind::Main);
        stats.func = name.clone();
        stats.key = Some(SectionKey::Body);
        stats = self.walk_seq(body, stats)?;
        stats.key = None;
        stats.skip = 0;
        Ok(stats)
    }

    fn on_attr_decl(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let (header, entities) = match node {
            AstNode::AttrDecl { header, entities } => (header, entities),
            _ => return Err(CoreError::internal("decl handler on non-decl")),
        };
        stats = self.walk(header, stats)?;
        for entity in entities {
            stats = self.walk(entity, stats)?;
        }
        stats.var.clear();
        stats.ty = None;
        stats.clear_buffers();
        Ok(stats)
    }

    fn on_attr_assign(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let (var, entities) = match node {
            AstNode::AttrAssign { var, entities } => (var, entities),
            _ => return Err(CoreError::internal("assign handler on non-assign")),
        };
        let name = match var.as_ref() {
            AstNode::Symbol(s) | AstNode::QSymbol(s) => s.clone(),
            other => {
                return Err(CoreError::internal(format!(
                    "assign target {:?}",
                    other.kind()
                )))
            }
        };
        let scope = stats.scope_kind();
        stats.ty = Some(self.mem.type_of(scope, &stats.func, &name)?);
        stats.var = name;
        for entity in entities {
            stats = self.walk(entity, stats)?;
        }
        stats.var.clear();
        stats.ty = None;
        stats.clear_buffers();
        Ok(stats)
    }

    fn on_attr_header(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let (var, type_expr) = match node {
            AstNode::AttrHeader { var, type_expr } => (var, type_expr),
            _ => return Err(CoreError::internal("header handler on non-header")),
        };
        let name = match var.as_ref() {
            AstNode::Symbol(s) | AstNode::QSymbol(s) => s.clone(),
            other => {
                return Err(CoreError::internal(format!(
                    "declaration target {:?}",
                    other.kind()
                )))
            }
        };
        let (ty_name, size) = match type_expr.as_ref() {
            AstNode::TypeExpr { name, size } => (name, *size),
            other => {
                return Err(CoreError::internal(format!(
                    "declaration type {:?}",
                    other.kind()
                )))
            }
        };
        let ty = TypeTag::parse(ty_name)
            .ok_or_else(|| CoreError::type_mismatch("declare", ty_name, "known type"))?;
        let scope = stats.scope_kind();
        self.mem.create(scope, &stats.func, &name, ty);
        if let Some(n) = size {
            self.mem.resize(scope, &stats.func, &name, n)?;
        }
        stats.var = name;
        stats.ty = Some(ty);
        Ok(stats)
    }

    /// One initializer/assignment arm: optional index selector, value
    /// expression, then the merge-write of pending results.
    fn on_entity(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let (index, value) = match node {
            AstNode::Entity { index, value } => (index, value),
            _ => return Err(CoreError::internal("entity handler on non-entity")),
        };
        let saved_ctx = stats.ctx;
        stats.ctx = Some(NodeKind::Entity);
        stats.clear_buffers();
        if let Some(spec) = index {
            stats = self.push_index_spec(spec, stats)?;
        }
        stats = self.walk(value, stats)?;
        stats = self.merge_write(stats)?;
        stats.clear_buffers();
        stats.ctx = saved_ctx;
        Ok(stats)
    }

    fn on_index_assign(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        match node {
            AstNode::IndexAssign(spec) => self.push_index_spec(spec, stats),
            _ => Err(CoreError::internal("index handler on non-index")),
        }
    }

    fn push_index_spec(&mut self, spec: &IndexSpec, mut stats: Stats) -> Result<Stats, CoreError> {
        match spec {
            IndexSpec::All => {
                let keys =
                    self.mem
                        .get_indices(stats.scope_kind(), &stats.func, &stats.var)?;
                stats.idx.extend(keys);
            }
            IndexSpec::One(i) => stats.idx.push(Key::Pos(*i)),
            IndexSpec::Many(items) => {
                stats.idx.extend(items.iter().map(|i| Key::Pos(*i)));
            }
        }
        Ok(stats)
    }

    /// Merges pending results into the current variable: circuit slots
    /// take fragment appends; everything else zips results against the
    /// target indices, broadcasting a single result.
    fn merge_write(&mut self, mut stats: Stats) -> Result<Stats, CoreError> {
        let scope = stats.scope_kind();
        let target_ty = stats.target_ty();
        if target_ty == TypeTag::Circuit {
            for outcome in stats.to_var.drain(..) {
                match outcome {
                    Outcome::Fragment(f) => {
                        self.mem.append_fragment(scope, &stats.func, &stats.var, f)?;
                    }
                    Outcome::Value(v) => {
                        return Err(CoreError::type_mismatch(
                            "append",
                            TypeTag::Circuit,
                            v.type_tag(),
                        ))
                    }
                }
            }
            return Ok(stats);
        }
        let mut results = Vec::with_capacity(stats.to_var.len());
        for outcome in stats.to_var.drain(..) {
            match outcome {
                Outcome::Value(v) => results.push(v),
                Outcome::Fragment(_) => {
                    return Err(CoreError::type_mismatch(
                        "write",
                        target_ty,
                        TypeTag::Circuit,
                    ))
                }
            }
        }
        if results.is_empty() {
            return Ok(stats);
        }
        let targets = if stats.idx.is_empty() {
            self.mem.get_indices(scope, &stats.func, &stats.var)?
        } else {
            stats.idx.clone()
        };
        if results.len() == targets.len() {
            for (key, value) in targets.iter().zip(results) {
                self.mem.write(scope, &stats.func, &stats.var, key, value)?;
            }
        } else if results.len() == 1 {
            let value = results.remove(0);
            for key in &targets {
                self.mem
                    .write(scope, &stats.func, &stats.var, key, value.clone())?;
            }
        } else {
            return Err(CoreError::type_mismatch(
                "write",
                format!("{} results", results.len()),
                format!("{} indices", targets.len()),
            ));
        }
        Ok(stats)
    }

    fn on_args(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let items = match node {
            AstNode::Args(items) => items,
            _ => return Err(CoreError::internal("args handler on non-args")),
        };
        let saved_ctx = stats.ctx;
        stats.ctx = Some(NodeKind::Args);
        for item in items {
            let mark = stats.to_var.len();
            stats = self.walk(item, stats)?;
            // Classical results produced by the child become call
            // arguments; fragments stay pending for the merge-write.
            let mut kept = Vec::new();
            for outcome in stats.to_var.drain(mark..) {
                match outcome {
                    Outcome::Value(v) => stats.args.push(v),
                    frag => kept.push(frag),
                }
            }
            stats.to_var.extend(kept);
        }
        stats.ctx = saved_ctx;
        Ok(stats)
    }

    fn on_call(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        let (target, args) = match node {
            AstNode::Call { target, args } => (target, args),
            _ => return Err(CoreError::internal("call handler on non-call")),
        };
        debug_log!("call '{}'", target.name());
        match target {
            CallTarget::Builtin(name) => {
                let builtin = builtins::lookup(name)?;
                self.apply_builtin(builtin, args, stats)
            }
            CallTarget::Symbol(name) => {
                if self.funcs.contains_key(name) {
                    self.call_function(name, args, stats)
                } else if builtins::is_builtin(name) {
                    let builtin = builtins::lookup(name)?;
                    self.apply_builtin(builtin, args, stats)
                } else {
                    Err(CoreError::unknown_builtin(name))
                }
            }
            CallTarget::QSymbol(name) => {
                // Indexed read of a quantum variable: the arguments are
                // the wire selection.
                let mut stats = stats;
                let outer_args = std::mem::take(&mut stats.args);
                stats = self.walk(args, stats)?;
                let picked = std::mem::replace(&mut stats.args, outer_args);
                let saved_idx = std::mem::take(&mut stats.idx);
                for v in picked {
                    match v {
                        Value::Int(i) if i >= 0 => stats.idx.push(Key::Pos(i as usize)),
                        other => {
                            return Err(CoreError::type_mismatch(
                                "index",
                                other.type_tag(),
                                TypeTag::Int,
                            ))
                        }
                    }
                }
                stats = self.resolve_qsymbol(name, stats)?;
                stats.idx = saved_idx;
                Ok(stats)
            }
        }
    }

    fn apply_builtin(
        &mut self,
        builtin: Builtin,
        args: &AstNode,
        mut stats: Stats,
    ) -> Result<Stats, CoreError> {
        let outer_args = std::mem::take(&mut stats.args);
        stats = self.walk(args, stats)?;
        let call_args = std::mem::replace(&mut stats.args, outer_args);
        debug_log!(
            "apply '{}' ({:?}) with {} args",
            builtin.name,
            builtin.mode,
            call_args.len()
        );
        match builtin.mode {
            ApplyMode::Morpher => self.run_morpher(builtin, call_args, stats),
            ApplyMode::Appender => self.run_appender(builtin, call_args, stats),
            ApplyMode::Nuller => self.run_nuller(builtin, call_args, stats),
        }
    }

    /// Per-index read-combine-write path. Without a target variable the
    /// arguments fold among themselves and yield one pending value.
    fn run_morpher(
        &mut self,
        builtin: Builtin,
        call_args: Vec<Value>,
        mut stats: Stats,
    ) -> Result<Stats, CoreError> {
        let scope = stats.scope_kind();
        let targets: Vec<Key> = if !stats.idx.is_empty() {
            stats.idx.clone()
        } else if !stats.var.is_empty() && stats.ctx == Some(NodeKind::Entity) {
            self.mem.get_indices(scope, &stats.func, &stats.var)?
        } else {
            Vec::new()
        };
        if targets.is_empty() {
            let result = match builtin.kind {
                BuiltinKind::Classical(f) => {
                    let mut it = call_args.into_iter();
                    let mut acc = it.next().ok_or_else(|| {
                        CoreError::internal(format!("'{}' with no arguments", builtin.name))
                    })?;
                    for v in it {
                        acc = f(&acc, &v)?;
                    }
                    acc
                }
                BuiltinKind::Unary(f) => {
                    let first = call_args.first().ok_or_else(|| {
                        CoreError::internal(format!("'{}' with no arguments", builtin.name))
                    })?;
                    f(first)?
                }
                _ => return Err(CoreError::internal("non-classical morpher")),
            };
            stats.to_var.push(Outcome::Value(result));
            return Ok(stats);
        }
        for key in &targets {
            let current = self.mem.read(scope, &stats.func, &stats.var, key)?;
            let result = match builtin.kind {
                BuiltinKind::Classical(f) => {
                    let mut acc: Option<Value> = None;
                    for v in &call_args {
                        acc = Some(match acc {
                            Some(a) => f(&a, v)?,
                            None => v.clone(),
                        });
                    }
                    match acc {
                        Some(a) => f(&a, &current)?,
                        None => current,
                    }
                }
                BuiltinKind::Unary(f) => f(&current)?,
                _ => return Err(CoreError::internal("non-classical morpher")),
            };
            stats.to_var.push(Outcome::Value(result));
        }
        Ok(stats)
    }

    /// Gate path: argument values are wire positions; one gate per
    /// complete arity tuple becomes a pending fragment.
    fn run_appender(
        &mut self,
        builtin: Builtin,
        call_args: Vec<Value>,
        mut stats: Stats,
    ) -> Result<Stats, CoreError> {
        let op = match builtin.kind {
            BuiltinKind::Gate(op) => op,
            _ => return Err(CoreError::internal("non-gate appender")),
        };
        let mut positions: Vec<usize> = Vec::new();
        if call_args.is_empty() {
            for key in &stats.idx {
                match key {
                    Key::Pos(i) => positions.push(*i),
                    Key::Name(n) => {
                        return Err(CoreError::invalid_gate(format!(
                            "named index '{}' on '{}'",
                            n, builtin.name
                        )))
                    }
                }
            }
        } else {
            for v in &call_args {
                match v {
                    Value::Int(i) if *i >= 0 => positions.push(*i as usize),
                    other => {
                        return Err(CoreError::invalid_gate(format!(
                            "'{}' index must be a non-negative int, got {}",
                            builtin.name, other
                        )))
                    }
                }
            }
        }
        let arity = op.arity();
        if positions.is_empty() || positions.len() % arity != 0 {
            return Err(CoreError::invalid_gate(format!(
                "'{}' takes index groups of {}, got {}",
                builtin.name,
                arity,
                positions.len()
            )));
        }
        for chunk in positions.chunks(arity) {
            let gate = if arity == 1 {
                Gate::multi(op, chunk.to_vec())?
            } else {
                Gate::single(op, chunk.to_vec())?
            };
            stats.to_var.push(Outcome::Fragment(Fragment::Gate(gate)));
        }
        Ok(stats)
    }

    /// Side-effect path: prints argument values, or the current
    /// variable's cells when called bare.
    fn run_nuller(
        &mut self,
        _builtin: Builtin,
        call_args: Vec<Value>,
        mut stats: Stats,
    ) -> Result<Stats, CoreError> {
        let parts: Vec<String> = if call_args.is_empty() && !stats.var.is_empty() {
            self.mem
                .read_all(stats.scope_kind(), &stats.func, &stats.var)?
                .iter()
                .map(|v| v.to_string())
                .collect()
        } else {
            call_args.iter().map(|v| v.to_string()).collect()
        };
        writeln!(self.out, "{}", parts.join(" "))
            .map_err(|e| CoreError::internal(format!("output sink: {}", e)))?;
        stats.args.clear();
        Ok(stats)
    }

    /// Calls a registered function: bind parameters into the function
    /// scope, walk the body, resolve the return section, free the
    /// scope, and leave the results pending for the caller.
    fn call_function(
        &mut self,
        name: &str,
        args: &AstNode,
        mut stats: Stats,
    ) -> Result<Stats, CoreError> {
        let def = self
            .funcs
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_builtin(name))?;
        let (ret_type, params, body, ret) = match &def {
            AstNode::FuncDef { ret_type, params, body, ret, .. } => {
                (ret_type, params, body, ret)
            }
            _ => return Err(CoreError::internal("registered non-function")),
        };
        let ret_ty = TypeTag::parse(ret_type)
            .ok_or_else(|| CoreError::type_mismatch("declare", ret_type, "known type"))?;

        let outer_args = std::mem::take(&mut stats.args);
        stats = self.walk(args, stats)?;
        let arg_values = std::mem::replace(&mut stats.args, outer_args);
        if arg_values.len() != params.len() {
            return Err(CoreError::type_mismatch(
                "call",
                format!("{} parameters", params.len()),
                format!("{} arguments", arg_values.len()),
            ));
        }

        let mut callee = Stats {
            scope: Some(ScopeKind::Func),
            func: name.to_string(),
            key: Some(SectionKey::Type),
            ..Stats::default()
        };

        callee.key = Some(SectionKey::Params);
        for (param, value) in params.iter().zip(arg_values) {
            let ty = TypeTag::parse(&param.type_name).ok_or_else(|| {
                CoreError::type_mismatch("declare", &param.type_name, "known type")
            })?;
            self.mem.create(ScopeKind::Func, name, &param.name, ty);
            self.mem
                .write(ScopeKind::Func, name, &param.name, &Key::Pos(0), value)?;
        }

        callee.key = Some(SectionKey::Body);
        callee = self.walk_seq(body, callee)?;
        callee.skip = 0;
        callee.var.clear();
        callee.ty = None;
        callee.clear_buffers();

        // A quantum read in the return section reduces to the declared
        // return type.
        callee.key = Some(SectionKey::Return);
        callee.ty = Some(ret_ty);
        for node in ret {
            callee = self.walk(node, callee)?;
        }
        let mut results = Vec::new();
        for outcome in callee.to_var.drain(..) {
            results.push(outcome);
        }
        self.mem.free(ScopeKind::Func, Some(name));

        stats.to_var.extend(results);
        Ok(stats)
    }

    /// Outermost conditional: walks `[Tests, Body, ElifStmt?,
    /// ElseStmt?]` with skip consumption, then clears any leftover —
    /// suppression never leaks past the statement.
    fn on_if(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        let parts = match node {
            AstNode::IfStmt(parts) => parts,
            _ => return Err(CoreError::internal("if handler on non-if")),
        };
        let mut stats = self.walk_seq(parts, stats)?;
        stats.skip = 0;
        Ok(stats)
    }

    /// Nested chain links: leftover skips propagate upward so an exit
    /// in an inner branch suppresses the rest of the chain.
    fn on_branch(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        let parts = match node {
            AstNode::ElifStmt(parts) | AstNode::ElseStmt(parts) => parts,
            _ => return Err(CoreError::internal("branch handler on non-branch")),
        };
        self.walk_seq(parts, stats)
    }

    fn on_tests(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let expr = match node {
            AstNode::Tests(expr) => expr,
            _ => return Err(CoreError::internal("tests handler on non-tests")),
        };
        let saved_ctx = stats.ctx;
        stats.ctx = Some(NodeKind::Tests);
        let mark = stats.to_var.len();
        stats = self.walk(expr, stats)?;
        if stats.level != 0 {
            stats.level += 1;
        }
        let outcome = stats.to_var.drain(mark..).next_back();
        match outcome {
            Some(Outcome::Value(Value::Bool(true))) => {}
            Some(Outcome::Value(Value::Bool(false))) => stats.skip += 1,
            Some(Outcome::Value(other)) => {
                return Err(CoreError::type_mismatch("test", other.type_tag(), TypeTag::Bool))
            }
            Some(Outcome::Fragment(_)) => {
                return Err(CoreError::type_mismatch("test", TypeTag::Circuit, TypeTag::Bool))
            }
            None => return Err(CoreError::internal("test produced no result")),
        }
        stats.ctx = saved_ctx;
        Ok(stats)
    }

    fn on_body(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        match node {
            AstNode::Body(stmts) => self.walk_seq(stmts, stats),
            _ => Err(CoreError::internal("body handler on non-body")),
        }
    }

    fn on_exit_body(&mut self, _node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        // A body exit only makes sense while a body section is being
        // walked; in a params or return section it is a front-end bug.
        if stats.key != Some(SectionKey::Body) {
            return Err(CoreError::internal("body exit outside a body section"));
        }
        stats.skip += 2;
        Ok(stats)
    }

    fn on_literal(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let value = match node {
            AstNode::Literal(Literal::Bool(b)) => Value::Bool(*b),
            AstNode::Literal(Literal::Int(n)) => Value::Int(*n),
            AstNode::Literal(Literal::Float(x)) => Value::Float(*x),
            AstNode::Literal(Literal::Str(s)) => Value::Str(s.clone()),
            _ => return Err(CoreError::internal("literal handler on non-literal")),
        };
        stats.to_var.push(Outcome::Value(value));
        Ok(stats)
    }

    fn on_symbol(&mut self, node: &AstNode, mut stats: Stats) -> Result<Stats, CoreError> {
        let name = match node {
            AstNode::Symbol(s) => s,
            _ => return Err(CoreError::internal("symbol handler on non-symbol")),
        };
        let scope = stats.scope_kind();
        let values = self.mem.read_all(scope, &stats.func, name)?;
        stats
            .to_var
            .extend(values.into_iter().map(Outcome::Value));
        Ok(stats)
    }

    fn on_qsymbol(&mut self, node: &AstNode, stats: Stats) -> Result<Stats, CoreError> {
        let name = match node {
            AstNode::QSymbol(s) => s.clone(),
            _ => return Err(CoreError::internal("qsymbol handler on non-qsymbol")),
        };
        self.resolve_qsymbol(&name, stats)
    }

    /// Resolves a quantum symbol against the current context: inside a
    /// circuit target the fragments flow onward (remapped through any
    /// pending wire selection); in a classical context the circuit is
    /// compiled, simulated, and reduced to the target type.
    fn resolve_qsymbol(&mut self, name: &str, mut stats: Stats) -> Result<Stats, CoreError> {
        let scope = stats.scope_kind();
        let fragments = self.mem.fragments(scope, &stats.func, name)?;
        let qubits = self.mem.len_of(scope, &stats.func, name)?;

        if stats.target_ty() == TypeTag::Circuit {
            let fragments = if stats.idx.is_empty() {
                fragments
            } else {
                remap_fragments(&fragments, &stats.idx, name)?
            };
            stats
                .to_var
                .extend(fragments.into_iter().map(Outcome::Fragment));
            stats.idx.clear();
            return Ok(stats);
        }

        if stats.target_ty() == TypeTag::Hashmap {
            return Err(CoreError::unsupported_reduction(
                "hashmap; use a measurement variable instead",
            ));
        }

        let asm = qasm::compile(&fragments, qubits);
        let shots = if stats.ctx == Some(NodeKind::Entity) {
            self.read_shots
        } else {
            self.stmt_shots
        };
        debug_log!("collapse '{}' over {} qubits, {} shots", name, qubits, shots);
        let dist = self.sim.run(&asm, shots)?;

        if stats.target_ty() == TypeTag::Measurement {
            stats = self.push_distribution(dist, stats);
            return Ok(stats);
        }

        let target = match stats.target_ty() {
            TypeTag::Null => TypeTag::Int,
            t => t,
        };
        match qasm::reduce(&dist, target)? {
            Reduced::Scalar(v) => stats.to_var.push(Outcome::Value(v)),
            Reduced::Counts(d) => stats = self.push_distribution(d, stats),
        }
        Ok(stats)
    }

    fn push_distribution(&mut self, dist: Distribution, mut stats: Stats) -> Stats {
        for (key, count) in dist.iter() {
            stats.idx.push(Key::Name(key.clone()));
            stats.to_var.push(Outcome::Value(Value::Int(*count as i64)));
        }
        stats
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

/// Rewires fragment indices through an explicit wire selection: wire i
/// of the source circuit maps to the i-th selected position.
fn remap_fragments(
    fragments: &[Fragment],
    idx: &[Key],
    name: &str,
) -> Result<Vec<Fragment>, CoreError> {
    let mut map = Vec::with_capacity(idx.len());
    for key in idx {
        match key {
            Key::Pos(i) => map.push(*i),
            Key::Name(n) => {
                return Err(CoreError::invalid_gate(format!(
                    "named index '{}' selecting wires of '{}'",
                    n, name
                )))
            }
        }
    }
    let mut out = Vec::new();
    for frag in fragments {
        for gate in frag.flatten() {
            let mut indices = Vec::with_capacity(gate.indices.len());
            for wire in &gate.indices {
                let mapped = map.get(*wire).copied().ok_or_else(|| {
                    CoreError::invalid_gate(format!(
                        "wire {} of '{}' has no selected position",
                        wire, name
                    ))
                })?;
                indices.push(mapped);
            }
            out.push(Fragment::Gate(Gate { op: gate.op, indices, ct: gate.ct }));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::AstNode as N;

    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn run_collect(program: &AstNode) -> (Evaluator, String) {
        let sink = SharedSink::default();
        let mut ev = Evaluator::with_parts(
            Box::new(LocalSimulator::new()),
            Box::new(sink.clone()),
        );
        ev.run_program(program).unwrap();
        let out = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        (ev, out)
    }

    #[test]
    fn decl_then_morpher_updates_cell() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![
                N::new_decl(
                    "a",
                    "int",
                    None,
                    vec![N::new_entity(None, N::int(3))],
                ),
                N::new_assign(
                    "a",
                    vec![N::new_entity(
                        None,
                        N::new_builtin_call("add", vec![N::int(5)]),
                    )],
                ),
            ],
        )]);
        let (ev, _) = run_collect(&program);
        assert_eq!(
            ev.mem
                .read(ScopeKind::Main, "X", "a", &Key::Pos(0))
                .unwrap(),
            Value::Int(8)
        );
    }

    #[test]
    fn print_writes_args_to_sink() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![N::new_builtin_call("print", vec![N::int(7), N::string("ok")])],
        )]);
        let (_, out) = run_collect(&program);
        assert_eq!(out, "7 ok\n");
    }

    #[test]
    fn false_test_skips_body_sibling() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![
                N::new_decl("a", "int", None, vec![N::new_entity(None, N::int(1))]),
                N::new_if(
                    N::boolean(false),
                    vec![N::new_assign(
                        "a",
                        vec![N::new_entity(None, N::int(99))],
                    )],
                    None,
                    None,
                ),
            ],
        )]);
        let (ev, _) = run_collect(&program);
        assert_eq!(
            ev.mem
                .read(ScopeKind::Main, "X", "a", &Key::Pos(0))
                .unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn exit_body_suppresses_following_branches() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![
                N::new_decl("a", "int", None, vec![N::new_entity(None, N::int(0))]),
                N::new_if(
                    N::boolean(true),
                    vec![
                        N::new_assign("a", vec![N::new_entity(None, N::int(1))]),
                        N::ExitBody,
                    ],
                    Some(N::new_elif(
                        N::boolean(true),
                        vec![N::new_assign("a", vec![N::new_entity(None, N::int(2))])],
                        None,
                    )),
                    Some(N::new_else(vec![N::new_assign(
                        "a",
                        vec![N::new_entity(None, N::int(3))],
                    )])),
                ),
            ],
        )]);
        let (ev, _) = run_collect(&program);
        assert_eq!(
            ev.mem
                .read(ScopeKind::Main, "X", "a", &Key::Pos(0))
                .unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn function_call_returns_into_caller() {
        use crate::core::ast::Param;
        let program = N::new_program(vec![
            N::new_func(
                "double",
                "int",
                vec![Param { name: "n".into(), type_name: "int".into() }],
                vec![N::new_assign(
                    "n",
                    vec![N::new_entity(
                        None,
                        N::new_builtin_call("times", vec![N::int(2)]),
                    )],
                )],
                vec![N::symbol("n")],
            ),
            N::new_main(
                "X",
                vec![N::new_decl(
                    "a",
                    "int",
                    None,
                    vec![N::new_entity(
                        None,
                        N::new_call(
                            crate::core::ast::CallTarget::Symbol("double".into()),
                            vec![N::int(21)],
                        ),
                    )],
                )],
            ),
        ]);
        let (ev, _) = run_collect(&program);
        assert_eq!(
            ev.mem
                .read(ScopeKind::Main, "X", "a", &Key::Pos(0))
                .unwrap(),
            Value::Int(42)
        );
        // Function scope is freed after the call.
        assert!(!ev.mem.is_var(ScopeKind::Func, "double", "n"));
    }

    #[test]
    fn body_exit_in_return_section_is_rejected() {
        use crate::core::ast::Param;
        let program = N::new_program(vec![
            N::new_func(
                "bad",
                "int",
                vec![Param { name: "n".into(), type_name: "int".into() }],
                vec![],
                vec![N::ExitBody],
            ),
            N::new_main(
                "X",
                vec![N::new_decl(
                    "a",
                    "int",
                    None,
                    vec![N::new_entity(
                        None,
                        N::new_call(
                            crate::core::ast::CallTarget::Symbol("bad".into()),
                            vec![N::int(1)],
                        ),
                    )],
                )],
            ),
        ]);
        let buf: Vec<u8> = Vec::new();
        let mut ev = Evaluator::with_parts(
            Box::new(LocalSimulator::new()),
            Box::new(std::io::Cursor::new(buf)),
        );
        let err = ev.run_program(&program).unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    #[test]
    fn gate_call_appends_to_circuit() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![N::new_qdecl(
                "q",
                "circuit",
                Some(2),
                vec![
                    N::new_entity(
                        None,
                        N::new_builtin_call("@h", vec![N::int(0)]),
                    ),
                    N::new_entity(
                        None,
                        N::new_builtin_call("@cnot", vec![N::int(0), N::int(1)]),
                    ),
                ],
            )]),
        ]);
        let (ev, _) = run_collect(&program);
        let frags = ev.mem.fragments(ScopeKind::Main, "X", "q").unwrap();
        assert_eq!(frags.len(), 2);
    }

    #[test]
    fn measurement_decl_preserves_distribution() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![
                N::new_qdecl(
                    "q",
                    "circuit",
                    Some(1),
                    vec![N::new_entity(
                        None,
                        N::new_builtin_call("@x", vec![N::int(0)]),
                    )],
                ),
                N::new_decl(
                    "m",
                    "measurement",
                    None,
                    vec![N::new_entity(None, N::qsymbol("q"))],
                ),
            ],
        )]);
        let (ev, _) = run_collect(&program);
        assert_eq!(
            ev.mem
                .read(ScopeKind::Main, "X", "m", &Key::Name("1".into()))
                .unwrap(),
            Value::Int(2048)
        );
    }

    #[test]
    fn quantum_read_into_int_collapses() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![
                N::new_qdecl(
                    "q",
                    "circuit",
                    Some(1),
                    vec![N::new_entity(
                        None,
                        N::new_builtin_call("@x", vec![N::int(0)]),
                    )],
                ),
                N::new_decl(
                    "n",
                    "int",
                    None,
                    vec![N::new_entity(None, N::qsymbol("q"))],
                ),
            ],
        )]);
        let (ev, _) = run_collect(&program);
        assert_eq!(
            ev.mem
                .read(ScopeKind::Main, "X", "n", &Key::Pos(0))
                .unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn gate_into_classical_target_is_a_type_mismatch() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![N::new_decl(
                "a",
                "int",
                None,
                vec![N::new_entity(
                    None,
                    N::new_builtin_call("@h", vec![N::int(0)]),
                )],
            )],
        )]);
        let buf: Vec<u8> = Vec::new();
        let mut ev = Evaluator::with_parts(
            Box::new(LocalSimulator::new()),
            Box::new(std::io::Cursor::new(buf)),
        );
        let err = ev.run_program(&program).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type Mismatch Error: 'write' on int and circuit"
        );
    }

    #[test]
    fn hashmap_target_rejects_collapse() {
        let program = N::new_program(vec![N::new_main(
            "X",
            vec![
                N::new_qdecl(
                    "q",
                    "circuit",
                    Some(1),
                    vec![N::new_entity(
                        None,
                        N::new_builtin_call("@x", vec![N::int(0)]),
                    )],
                ),
                N::new_decl(
                    "h",
                    "hashmap",
                    None,
                    vec![N::new_entity(None, N::qsymbol("q"))],
                ),
            ],
        )]);
        let buf: Vec<u8> = Vec::new();
        let mut ev = Evaluator::with_parts(
            Box::new(LocalSimulator::new()),
            Box::new(std::io::Cursor::new(buf)),
        );
        let err = ev.run_program(&program).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedReduction { .. }));
    }
}
