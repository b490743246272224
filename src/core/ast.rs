// src/core/ast.rs
//! Closed abstract syntax tree for the evaluation core.
//!
//! Nodes are produced by the front end and never rewritten during
//! evaluation. Every variant carries its payload directly; `NodeKind`
//! is the discriminant the evaluator's handler table is keyed on.

use std::fmt;

/// Discriminant for handler dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    FuncDef,
    AttrDecl,
    AttrAssign,
    AttrHeader,
    TypeExpr,
    Entity,
    IndexAssign,
    Call,
    Args,
    IfStmt,
    ElifStmt,
    ElseStmt,
    Tests,
    Body,
    ExitBody,
    Literal,
    Symbol,
    QSymbol,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Index selector on a declaration or assignment target.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSpec {
    All,
    One(usize),
    Many(Vec<usize>),
}

/// Who a call names: a builtin operator/gate, a classical symbol, or a
/// quantum symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Builtin(String),
    Symbol(String),
    QSymbol(String),
}

impl CallTarget {
    pub fn name(&self) -> &str {
        match self {
            CallTarget::Builtin(s) | CallTarget::Symbol(s) | CallTarget::QSymbol(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// Top level: function definitions in program order.
    Program(Vec<AstNode>),
    /// One definition; `scope` is "main" or "func". Sections are walked
    /// in the fixed order type, params, body, return.
    FuncDef {
        scope: String,
        name: String,
        ret_type: String,
        params: Vec<Param>,
        body: Vec<AstNode>,
        ret: Vec<AstNode>,
    },
    /// Declaration with initializers: header then entities.
    AttrDecl {
        header: Box<AstNode>,
        entities: Vec<AstNode>,
    },
    /// Assignment to an existing variable.
    AttrAssign {
        var: Box<AstNode>,
        entities: Vec<AstNode>,
    },
    /// Variable + declared type of a declaration.
    AttrHeader {
        var: Box<AstNode>,
        type_expr: Box<AstNode>,
    },
    /// Type name with optional size, e.g. `int` or `circuit(2)`.
    TypeExpr {
        name: String,
        size: Option<usize>,
    },
    /// One initializer/assignment arm: optional index selector plus the
    /// value expression producing the results to merge in.
    Entity {
        index: Option<IndexSpec>,
        value: Box<AstNode>,
    },
    IndexAssign(IndexSpec),
    Call {
        target: CallTarget,
        args: Box<AstNode>,
    },
    Args(Vec<AstNode>),
    /// `[Tests, Body, ElifStmt?, ElseStmt?]` — the chain nests inside
    /// the statement, it is never a run of siblings.
    IfStmt(Vec<AstNode>),
    /// `[Tests, Body, ElifStmt?]`.
    ElifStmt(Vec<AstNode>),
    /// `[Body]`.
    ElseStmt(Vec<AstNode>),
    Tests(Box<AstNode>),
    Body(Vec<AstNode>),
    ExitBody,
    Literal(Literal),
    Symbol(String),
    QSymbol(String),
}

impl AstNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            AstNode::Program(_) => NodeKind::Program,
            AstNode::FuncDef { .. } => NodeKind::FuncDef,
            AstNode::AttrDecl { .. } => NodeKind::AttrDecl,
            AstNode::AttrAssign { .. } => NodeKind::AttrAssign,
            AstNode::AttrHeader { .. } => NodeKind::AttrHeader,
            AstNode::TypeExpr { .. } => NodeKind::TypeExpr,
            AstNode::Entity { .. } => NodeKind::Entity,
            AstNode::IndexAssign(_) => NodeKind::IndexAssign,
            AstNode::Call { .. } => NodeKind::Call,
            AstNode::Args(_) => NodeKind::Args,
            AstNode::IfStmt(_) => NodeKind::IfStmt,
            AstNode::ElifStmt(_) => NodeKind::ElifStmt,
            AstNode::ElseStmt(_) => NodeKind::ElseStmt,
            AstNode::Tests(_) => NodeKind::Tests,
            AstNode::Body(_) => NodeKind::Body,
            AstNode::ExitBody => NodeKind::ExitBody,
            AstNode::Literal(_) => NodeKind::Literal,
            AstNode::Symbol(_) => NodeKind::Symbol,
            AstNode::QSymbol(_) => NodeKind::QSymbol,
        }
    }

    // ----- constructors -----

    pub fn new_program(defs: Vec<AstNode>) -> AstNode {
        AstNode::Program(defs)
    }

    pub fn new_main(name: &str, body: Vec<AstNode>) -> AstNode {
        AstNode::FuncDef {
            scope: "main".to_string(),
            name: name.to_string(),
            ret_type: "null".to_string(),
            params: Vec::new(),
            body,
            ret: Vec::new(),
        }
    }

    pub fn new_func(
        name: &str,
        ret_type: &str,
        params: Vec<Param>,
        body: Vec<AstNode>,
        ret: Vec<AstNode>,
    ) -> AstNode {
        AstNode::FuncDef {
            scope: "func".to_string(),
            name: name.to_string(),
            ret_type: ret_type.to_string(),
            params,
            body,
            ret,
        }
    }

    pub fn new_decl(var: &str, type_name: &str, size: Option<usize>, entities: Vec<AstNode>) -> AstNode {
        AstNode::AttrDecl {
            header: Box::new(AstNode::AttrHeader {
                var: Box::new(AstNode::Symbol(var.to_string())),
                type_expr: Box::new(AstNode::TypeExpr {
                    name: type_name.to_string(),
                    size,
                }),
            }),
            entities,
        }
    }

    pub fn new_qdecl(var: &str, type_name: &str, size: Option<usize>, entities: Vec<AstNode>) -> AstNode {
        AstNode::AttrDecl {
            header: Box::new(AstNode::AttrHeader {
                var: Box::new(AstNode::QSymbol(var.to_string())),
                type_expr: Box::new(AstNode::TypeExpr {
                    name: type_name.to_string(),
                    size,
                }),
            }),
            entities,
        }
    }

    pub fn new_assign(var: &str, entities: Vec<AstNode>) -> AstNode {
        AstNode::AttrAssign {
            var: Box::new(AstNode::Symbol(var.to_string())),
            entities,
        }
    }

    pub fn new_entity(index: Option<IndexSpec>, value: AstNode) -> AstNode {
        AstNode::Entity { index, value: Box::new(value) }
    }

    pub fn new_call(target: CallTarget, args: Vec<AstNode>) -> AstNode {
        AstNode::Call {
            target,
            args: Box::new(AstNode::Args(args)),
        }
    }

    pub fn new_builtin_call(name: &str, args: Vec<AstNode>) -> AstNode {
        AstNode::new_call(CallTarget::Builtin(name.to_string()), args)
    }

    pub fn new_if(
        tests: AstNode,
        body: Vec<AstNode>,
        elif: Option<AstNode>,
        els: Option<AstNode>,
    ) -> AstNode {
        let mut parts = vec![AstNode::Tests(Box::new(tests)), AstNode::Body(body)];
        if let Some(e) = elif {
            parts.push(e);
        }
        if let Some(e) = els {
            parts.push(e);
        }
        AstNode::IfStmt(parts)
    }

    pub fn new_elif(tests: AstNode, body: Vec<AstNode>, next: Option<AstNode>) -> AstNode {
        let mut parts = vec![AstNode::Tests(Box::new(tests)), AstNode::Body(body)];
        if let Some(e) = next {
            parts.push(e);
        }
        AstNode::ElifStmt(parts)
    }

    pub fn new_else(body: Vec<AstNode>) -> AstNode {
        AstNode::ElseStmt(vec![AstNode::Body(body)])
    }

    pub fn int(n: i64) -> AstNode {
        AstNode::Literal(Literal::Int(n))
    }

    pub fn boolean(b: bool) -> AstNode {
        AstNode::Literal(Literal::Bool(b))
    }

    pub fn string(s: &str) -> AstNode {
        AstNode::Literal(Literal::Str(s.to_string()))
    }

    pub fn symbol(name: &str) -> AstNode {
        AstNode::Symbol(name.to_string())
    }

    pub fn qsymbol(name: &str) -> AstNode {
        AstNode::QSymbol(name.to_string())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(AstNode::int(3).kind(), NodeKind::Literal);
        assert_eq!(AstNode::symbol("a").kind(), NodeKind::Symbol);
        assert_eq!(
            AstNode::new_builtin_call("add", vec![AstNode::int(1)]).kind(),
            NodeKind::Call
        );
    }

    #[test]
    fn decl_constructor_builds_header() {
        let decl = AstNode::new_decl("a", "int", None, vec![]);
        match decl {
            AstNode::AttrDecl { header, .. } => match *header {
                AstNode::AttrHeader { type_expr, .. } => match *type_expr {
                    AstNode::TypeExpr { name, size } => {
                        assert_eq!(name, "int");
                        assert_eq!(size, None);
                    }
                    other => panic!("unexpected type expr {:?}", other),
                },
                other => panic!("unexpected header {:?}", other),
            },
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn if_nests_its_chain() {
        let node = AstNode::new_if(
            AstNode::boolean(true),
            vec![AstNode::ExitBody],
            Some(AstNode::new_elif(
                AstNode::boolean(false),
                vec![],
                None,
            )),
            Some(AstNode::new_else(vec![])),
        );
        match node {
            AstNode::IfStmt(parts) => {
                assert_eq!(parts.len(), 4);
                assert_eq!(parts[0].kind(), NodeKind::Tests);
                assert_eq!(parts[1].kind(), NodeKind::Body);
                assert_eq!(parts[2].kind(), NodeKind::ElifStmt);
                assert_eq!(parts[3].kind(), NodeKind::ElseStmt);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }
}
