//! GLSL Abstract Syntax Tree (AST).
//!
//! Nodes live in a per-invocation arena ([`Ast`]) and refer to each other by
//! [`NodeId`]. Rewrites swap ids in parent slots; nodes that fall out of the
//! tree stay in the arena until the whole tree is dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use glint_core::{Capability, GlintError, GlintResult};

use crate::lexer::Span;

/// Stable index of a node in its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of node categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    TranslationUnit,
    Declaration,
    FunctionDefinition,
    Statement,
    Expression,
    Primary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageQualifier {
    Const,
    In,
    Out,
    InOut,
    Attribute,
    Uniform,
    Varying,
    Buffer,
    Shared,
    Centroid,
    Sample,
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Flat,
    Smooth,
    NoPerspective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryQualifier {
    Coherent,
    Volatile,
    Restrict,
    ReadOnly,
    WriteOnly,
}

impl StorageQualifier {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageQualifier::Const => "const",
            StorageQualifier::In => "in",
            StorageQualifier::Out => "out",
            StorageQualifier::InOut => "inout",
            StorageQualifier::Attribute => "attribute",
            StorageQualifier::Uniform => "uniform",
            StorageQualifier::Varying => "varying",
            StorageQualifier::Buffer => "buffer",
            StorageQualifier::Shared => "shared",
            StorageQualifier::Centroid => "centroid",
            StorageQualifier::Sample => "sample",
            StorageQualifier::Patch => "patch",
        }
    }
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::High => "highp",
            Precision::Medium => "mediump",
            Precision::Low => "lowp",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "highp" => Some(Precision::High),
            "mediump" => Some(Precision::Medium),
            "lowp" => Some(Precision::Low),
            _ => None,
        }
    }
}

/// One `name` or `name = value` entry of a `layout(...)` qualifier.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutItem {
    pub name: String,
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Qualifier {
    Storage(StorageQualifier),
    Layout(Vec<LayoutItem>),
    Precision(Precision),
    Interpolation(Interpolation),
    Memory(MemoryQualifier),
    Invariant,
    Precise,
    /// `subroutine` or `subroutine(TypeA, TypeB)`.
    Subroutine(Vec<String>),
}

impl Qualifier {
    /// Map a qualifier keyword to its qualifier.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let qualifier = match word {
            "const" => Qualifier::Storage(StorageQualifier::Const),
            "in" => Qualifier::Storage(StorageQualifier::In),
            "out" => Qualifier::Storage(StorageQualifier::Out),
            "inout" => Qualifier::Storage(StorageQualifier::InOut),
            "attribute" => Qualifier::Storage(StorageQualifier::Attribute),
            "uniform" => Qualifier::Storage(StorageQualifier::Uniform),
            "varying" => Qualifier::Storage(StorageQualifier::Varying),
            "buffer" => Qualifier::Storage(StorageQualifier::Buffer),
            "shared" => Qualifier::Storage(StorageQualifier::Shared),
            "centroid" => Qualifier::Storage(StorageQualifier::Centroid),
            "sample" => Qualifier::Storage(StorageQualifier::Sample),
            "patch" => Qualifier::Storage(StorageQualifier::Patch),
            "flat" => Qualifier::Interpolation(Interpolation::Flat),
            "smooth" => Qualifier::Interpolation(Interpolation::Smooth),
            "noperspective" => Qualifier::Interpolation(Interpolation::NoPerspective),
            "coherent" => Qualifier::Memory(MemoryQualifier::Coherent),
            "volatile" => Qualifier::Memory(MemoryQualifier::Volatile),
            "restrict" => Qualifier::Memory(MemoryQualifier::Restrict),
            "readonly" => Qualifier::Memory(MemoryQualifier::ReadOnly),
            "writeonly" => Qualifier::Memory(MemoryQualifier::WriteOnly),
            "invariant" => Qualifier::Invariant,
            "precise" => Qualifier::Precise,
            other => Qualifier::Precision(Precision::from_keyword(other)?),
        };
        Some(qualifier)
    }

    /// Keyword text for every qualifier except `layout` and `subroutine(...)`.
    pub fn keyword(&self) -> Option<&'static str> {
        let word = match self {
            Qualifier::Storage(s) => s.as_str(),
            Qualifier::Precision(p) => p.as_str(),
            Qualifier::Interpolation(Interpolation::Flat) => "flat",
            Qualifier::Interpolation(Interpolation::Smooth) => "smooth",
            Qualifier::Interpolation(Interpolation::NoPerspective) => "noperspective",
            Qualifier::Memory(MemoryQualifier::Coherent) => "coherent",
            Qualifier::Memory(MemoryQualifier::Volatile) => "volatile",
            Qualifier::Memory(MemoryQualifier::Restrict) => "restrict",
            Qualifier::Memory(MemoryQualifier::ReadOnly) => "readonly",
            Qualifier::Memory(MemoryQualifier::WriteOnly) => "writeonly",
            Qualifier::Invariant => "invariant",
            Qualifier::Precise => "precise",
            Qualifier::Subroutine(types) if types.is_empty() => "subroutine",
            Qualifier::Layout(_) | Qualifier::Subroutine(_) => return None,
        };
        Some(word)
    }
}

/// Array dimensions; `None` is an unsized `[]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArraySpec {
    pub dims: Vec<Option<NodeId>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeName {
    /// Builtin keyword type (`float`, `sampler2D`, ...).
    Builtin(String),
    /// Reference to a user struct type.
    Named(String),
    /// Inline struct definition.
    Struct(StructBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructBody {
    pub name: Option<String>,
    pub members: Vec<StructMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub ty: FullType,
    pub declarators: Vec<MemberDeclarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDeclarator {
    pub name: String,
    pub array: Option<ArraySpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpecifier {
    pub name: TypeName,
    pub array: Option<ArraySpec>,
}

impl TypeSpecifier {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: TypeName::Builtin(name.into()),
            array: None,
        }
    }

    /// The type's name, if it has one.
    pub fn type_name(&self) -> Option<&str> {
        match &self.name {
            TypeName::Builtin(name) | TypeName::Named(name) => Some(name),
            TypeName::Struct(body) => body.name.as_deref(),
        }
    }
}

/// A type specifier with its qualifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct FullType {
    pub qualifiers: Vec<Qualifier>,
    pub specifier: TypeSpecifier,
}

impl FullType {
    pub fn has_storage(&self, storage: StorageQualifier) -> bool {
        self.qualifiers
            .iter()
            .any(|q| *q == Qualifier::Storage(storage))
    }

    /// Every `layout(...)` item, across all layout qualifiers.
    pub fn layout_items(&self) -> impl Iterator<Item = &LayoutItem> {
        layout_items(&self.qualifiers)
    }

    /// Append `name = value` to the first layout qualifier, creating one
    /// in front of the other qualifiers if needed.
    pub fn add_layout_item(&mut self, name: impl Into<String>, value: Option<NodeId>) {
        let item = LayoutItem {
            name: name.into(),
            value,
        };
        for qualifier in &mut self.qualifiers {
            if let Qualifier::Layout(items) = qualifier {
                items.push(item);
                return;
            }
        }
        self.qualifiers.insert(0, Qualifier::Layout(vec![item]));
    }
}

pub fn layout_items(qualifiers: &[Qualifier]) -> impl Iterator<Item = &LayoutItem> {
    qualifiers.iter().flat_map(|q| match q {
        Qualifier::Layout(items) => items.as_slice(),
        _ => &[],
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub ty: FullType,
    pub name: Option<String>,
    pub array: Option<ArraySpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub return_type: FullType,
    pub name: String,
    pub params: Vec<Parameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    LeftShift,
    RightShift,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^^",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 4,
            BinaryOp::Xor => 5,
            BinaryOp::And => 6,
            BinaryOp::BitOr => 7,
            BinaryOp::BitXor => 8,
            BinaryOp::BitAnd => 9,
            BinaryOp::Equal | BinaryOp::NotEqual => 10,
            BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEqual | BinaryOp::GreaterEqual => 11,
            BinaryOp::LeftShift | BinaryOp::RightShift => 12,
            BinaryOp::Add | BinaryOp::Sub => 13,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LeftShift,
    RightShift,
    And,
    Xor,
    Or,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::LeftShift => "<<=",
            AssignOp::RightShift => ">>=",
            AssignOp::And => "&=",
            AssignOp::Xor => "^=",
            AssignOp::Or => "|=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreIncrement => "++",
            UnaryOp::PreDecrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

impl PostfixOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PostfixOp::Increment => "++",
            PostfixOp::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Int,
    UInt,
    Float,
    Double,
    Bool,
}

/// A literal with its original spelling.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub text: String,
}

impl Literal {
    /// Value of a non-negative integer literal (`0x10`, `8u`, `010`).
    pub fn as_u32(&self) -> Option<u32> {
        if !matches!(self.kind, LiteralKind::Int | LiteralKind::UInt) {
            return None;
        }
        let digits = self.text.trim_end_matches(['u', 'U']);
        if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).ok()
        } else if digits.len() > 1 && digits.starts_with('0') {
            u32::from_str_radix(&digits[1..], 8).ok()
        } else {
            digits.parse().ok()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// Function, builtin function or struct constructor, by name.
    Function(String),
    /// Builtin type constructor, possibly an array (`vec3[](...)`).
    Constructor(TypeSpecifier),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    TranslationUnit {
        declarations: Vec<NodeId>,
    },

    // Declarations
    /// `qualifiers type a, b[2] = ...;` or a bare struct declaration.
    Declaration {
        ty: FullType,
        declarators: Vec<NodeId>,
    },
    Declarator {
        name: String,
        array: Option<ArraySpec>,
        initializer: Option<NodeId>,
    },
    FunctionPrototype {
        prototype: Prototype,
    },
    InterfaceBlock {
        qualifiers: Vec<Qualifier>,
        block_name: String,
        members: Vec<StructMember>,
        instance: Option<MemberDeclarator>,
    },
    PrecisionDeclaration {
        precision: Precision,
        ty: TypeSpecifier,
    },
    /// `invariant gl_Position;` or `layout(local_size_x = 8) in;`.
    QualifierDeclaration {
        qualifiers: Vec<Qualifier>,
        names: Vec<String>,
    },

    FunctionDefinition {
        prototype: Prototype,
        body: NodeId,
    },

    // Statements
    Compound {
        statements: Vec<NodeId>,
    },
    DeclarationStatement {
        declaration: NodeId,
    },
    ExpressionStatement {
        expression: Option<NodeId>,
    },
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    Switch {
        selector: NodeId,
        body: NodeId,
    },
    /// `case value:` or `default:` inside a switch body.
    CaseLabel {
        value: Option<NodeId>,
    },
    For {
        init: Option<NodeId>,
        condition: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    },
    While {
        condition: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        condition: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Jump(JumpKind),

    // Expressions
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Postfix {
        op: PostfixOp,
        operand: NodeId,
    },
    Assignment {
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    },
    Ternary {
        condition: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
    Call {
        callee: Callee,
        args: Vec<NodeId>,
    },
    /// `receiver.method(args)`, in practice `.length()`.
    MethodCall {
        receiver: NodeId,
        method: String,
        args: Vec<NodeId>,
    },
    Index {
        base: NodeId,
        index: NodeId,
    },
    Member {
        base: NodeId,
        field: String,
    },
    Sequence {
        expressions: Vec<NodeId>,
    },
    InitializerList {
        elements: Vec<NodeId>,
    },

    // Primaries
    Literal(Literal),
    Identifier(String),
}

/// A mutable child position inside a node.
pub enum SlotMut<'a> {
    Required(&'a mut NodeId),
    Optional(&'a mut Option<NodeId>),
    List(&'a mut Vec<NodeId>),
}

fn array_children(array: &Option<ArraySpec>, out: &mut Vec<NodeId>) {
    if let Some(array) = array {
        out.extend(array.dims.iter().flatten().copied());
    }
}

fn array_slots<'a>(array: &'a mut Option<ArraySpec>, out: &mut Vec<SlotMut<'a>>) {
    if let Some(array) = array {
        out.extend(array.dims.iter_mut().map(SlotMut::Optional));
    }
}

fn qualifier_children(qualifiers: &[Qualifier], out: &mut Vec<NodeId>) {
    out.extend(layout_items(qualifiers).filter_map(|item| item.value));
}

fn qualifier_slots<'a>(qualifiers: &'a mut [Qualifier], out: &mut Vec<SlotMut<'a>>) {
    for qualifier in qualifiers {
        if let Qualifier::Layout(items) = qualifier {
            out.extend(items.iter_mut().map(|item| SlotMut::Optional(&mut item.value)));
        }
    }
}

fn member_children(members: &[StructMember], out: &mut Vec<NodeId>) {
    for member in members {
        full_type_children(&member.ty, out);
        for declarator in &member.declarators {
            array_children(&declarator.array, out);
        }
    }
}

fn member_slots<'a>(members: &'a mut [StructMember], out: &mut Vec<SlotMut<'a>>) {
    for member in members {
        full_type_slots(&mut member.ty, out);
        for declarator in &mut member.declarators {
            array_slots(&mut declarator.array, out);
        }
    }
}

fn specifier_children(specifier: &TypeSpecifier, out: &mut Vec<NodeId>) {
    if let TypeName::Struct(body) = &specifier.name {
        member_children(&body.members, out);
    }
    array_children(&specifier.array, out);
}

fn specifier_slots<'a>(specifier: &'a mut TypeSpecifier, out: &mut Vec<SlotMut<'a>>) {
    if let TypeName::Struct(body) = &mut specifier.name {
        member_slots(&mut body.members, out);
    }
    array_slots(&mut specifier.array, out);
}

fn full_type_children(ty: &FullType, out: &mut Vec<NodeId>) {
    qualifier_children(&ty.qualifiers, out);
    specifier_children(&ty.specifier, out);
}

fn full_type_slots<'a>(ty: &'a mut FullType, out: &mut Vec<SlotMut<'a>>) {
    qualifier_slots(&mut ty.qualifiers, out);
    specifier_slots(&mut ty.specifier, out);
}

fn prototype_children(prototype: &Prototype, out: &mut Vec<NodeId>) {
    full_type_children(&prototype.return_type, out);
    for param in &prototype.params {
        full_type_children(&param.ty, out);
        array_children(&param.array, out);
    }
}

fn prototype_slots<'a>(prototype: &'a mut Prototype, out: &mut Vec<SlotMut<'a>>) {
    full_type_slots(&mut prototype.return_type, out);
    for param in &mut prototype.params {
        full_type_slots(&mut param.ty, out);
        array_slots(&mut param.array, out);
    }
}

impl NodeKind {
    pub fn category(&self) -> NodeCategory {
        match self {
            NodeKind::TranslationUnit { .. } => NodeCategory::TranslationUnit,
            NodeKind::Declaration { .. }
            | NodeKind::Declarator { .. }
            | NodeKind::FunctionPrototype { .. }
            | NodeKind::InterfaceBlock { .. }
            | NodeKind::PrecisionDeclaration { .. }
            | NodeKind::QualifierDeclaration { .. } => NodeCategory::Declaration,
            NodeKind::FunctionDefinition { .. } => NodeCategory::FunctionDefinition,
            NodeKind::Compound { .. }
            | NodeKind::DeclarationStatement { .. }
            | NodeKind::ExpressionStatement { .. }
            | NodeKind::If { .. }
            | NodeKind::Switch { .. }
            | NodeKind::CaseLabel { .. }
            | NodeKind::For { .. }
            | NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::Return { .. }
            | NodeKind::Jump(_) => NodeCategory::Statement,
            NodeKind::Binary { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Postfix { .. }
            | NodeKind::Assignment { .. }
            | NodeKind::Ternary { .. }
            | NodeKind::Call { .. }
            | NodeKind::MethodCall { .. }
            | NodeKind::Index { .. }
            | NodeKind::Member { .. }
            | NodeKind::Sequence { .. }
            | NodeKind::InitializerList { .. } => NodeCategory::Expression,
            NodeKind::Literal(_) | NodeKind::Identifier(_) => NodeCategory::Primary,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self.category(),
            NodeCategory::Expression | NodeCategory::Primary
        )
    }

    /// Child node ids in source order, including expressions embedded in
    /// types (array sizes, layout values).
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            NodeKind::TranslationUnit { declarations } => out.extend(declarations),
            NodeKind::Declaration { ty, declarators } => {
                full_type_children(ty, &mut out);
                out.extend(declarators);
            }
            NodeKind::Declarator {
                array, initializer, ..
            } => {
                array_children(array, &mut out);
                out.extend(initializer);
            }
            NodeKind::FunctionPrototype { prototype } => prototype_children(prototype, &mut out),
            NodeKind::InterfaceBlock {
                qualifiers,
                members,
                instance,
                ..
            } => {
                qualifier_children(qualifiers, &mut out);
                member_children(members, &mut out);
                if let Some(instance) = instance {
                    array_children(&instance.array, &mut out);
                }
            }
            NodeKind::PrecisionDeclaration { ty, .. } => specifier_children(ty, &mut out),
            NodeKind::QualifierDeclaration { qualifiers, .. } => {
                qualifier_children(qualifiers, &mut out)
            }
            NodeKind::FunctionDefinition { prototype, body } => {
                prototype_children(prototype, &mut out);
                out.push(*body);
            }
            NodeKind::Compound { statements } => out.extend(statements),
            NodeKind::DeclarationStatement { declaration } => out.push(*declaration),
            NodeKind::ExpressionStatement { expression } => out.extend(expression),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push(*condition);
                out.push(*then_branch);
                out.extend(else_branch);
            }
            NodeKind::Switch { selector, body } => out.extend([*selector, *body]),
            NodeKind::CaseLabel { value } => out.extend(value),
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                out.extend(init);
                out.extend(condition);
                out.extend(step);
                out.push(*body);
            }
            NodeKind::While { condition, body } => out.extend([*condition, *body]),
            NodeKind::DoWhile { body, condition } => out.extend([*body, *condition]),
            NodeKind::Return { value } => out.extend(value),
            NodeKind::Jump(_) => {}
            NodeKind::Binary { lhs, rhs, .. } => out.extend([*lhs, *rhs]),
            NodeKind::Unary { operand, .. } | NodeKind::Postfix { operand, .. } => {
                out.push(*operand)
            }
            NodeKind::Assignment { target, value, .. } => out.extend([*target, *value]),
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => out.extend([*condition, *then_expr, *else_expr]),
            NodeKind::Call { callee, args } => {
                if let Callee::Constructor(specifier) = callee {
                    specifier_children(specifier, &mut out);
                }
                out.extend(args);
            }
            NodeKind::MethodCall { receiver, args, .. } => {
                out.push(*receiver);
                out.extend(args);
            }
            NodeKind::Index { base, index } => out.extend([*base, *index]),
            NodeKind::Member { base, .. } => out.push(*base),
            NodeKind::Sequence { expressions } => out.extend(expressions),
            NodeKind::InitializerList { elements } => out.extend(elements),
            NodeKind::Literal(_) | NodeKind::Identifier(_) => {}
        }
        out
    }

    /// Mutable child slots, in the same order as [`NodeKind::children`].
    pub fn slots_mut(&mut self) -> Vec<SlotMut<'_>> {
        let mut out = Vec::new();
        match self {
            NodeKind::TranslationUnit { declarations } => out.push(SlotMut::List(declarations)),
            NodeKind::Declaration { ty, declarators } => {
                full_type_slots(ty, &mut out);
                out.push(SlotMut::List(declarators));
            }
            NodeKind::Declarator {
                array, initializer, ..
            } => {
                array_slots(array, &mut out);
                out.push(SlotMut::Optional(initializer));
            }
            NodeKind::FunctionPrototype { prototype } => prototype_slots(prototype, &mut out),
            NodeKind::InterfaceBlock {
                qualifiers,
                members,
                instance,
                ..
            } => {
                qualifier_slots(qualifiers, &mut out);
                member_slots(members, &mut out);
                if let Some(instance) = instance {
                    array_slots(&mut instance.array, &mut out);
                }
            }
            NodeKind::PrecisionDeclaration { ty, .. } => specifier_slots(ty, &mut out),
            NodeKind::QualifierDeclaration { qualifiers, .. } => {
                qualifier_slots(qualifiers, &mut out)
            }
            NodeKind::FunctionDefinition { prototype, body } => {
                prototype_slots(prototype, &mut out);
                out.push(SlotMut::Required(body));
            }
            NodeKind::Compound { statements } => out.push(SlotMut::List(statements)),
            NodeKind::DeclarationStatement { declaration } => {
                out.push(SlotMut::Required(declaration))
            }
            NodeKind::ExpressionStatement { expression } => out.push(SlotMut::Optional(expression)),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push(SlotMut::Required(condition));
                out.push(SlotMut::Required(then_branch));
                out.push(SlotMut::Optional(else_branch));
            }
            NodeKind::Switch { selector, body } => {
                out.push(SlotMut::Required(selector));
                out.push(SlotMut::Required(body));
            }
            NodeKind::CaseLabel { value } => out.push(SlotMut::Optional(value)),
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                out.push(SlotMut::Optional(init));
                out.push(SlotMut::Optional(condition));
                out.push(SlotMut::Optional(step));
                out.push(SlotMut::Required(body));
            }
            NodeKind::While { condition, body } => {
                out.push(SlotMut::Required(condition));
                out.push(SlotMut::Required(body));
            }
            NodeKind::DoWhile { body, condition } => {
                out.push(SlotMut::Required(body));
                out.push(SlotMut::Required(condition));
            }
            NodeKind::Return { value } => out.push(SlotMut::Optional(value)),
            NodeKind::Jump(_) => {}
            NodeKind::Binary { lhs, rhs, .. } => {
                out.push(SlotMut::Required(lhs));
                out.push(SlotMut::Required(rhs));
            }
            NodeKind::Unary { operand, .. } | NodeKind::Postfix { operand, .. } => {
                out.push(SlotMut::Required(operand))
            }
            NodeKind::Assignment { target, value, .. } => {
                out.push(SlotMut::Required(target));
                out.push(SlotMut::Required(value));
            }
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                out.push(SlotMut::Required(condition));
                out.push(SlotMut::Required(then_expr));
                out.push(SlotMut::Required(else_expr));
            }
            NodeKind::Call { callee, args } => {
                if let Callee::Constructor(specifier) = callee {
                    specifier_slots(specifier, &mut out);
                }
                out.push(SlotMut::List(args));
            }
            NodeKind::MethodCall { receiver, args, .. } => {
                out.push(SlotMut::Required(receiver));
                out.push(SlotMut::List(args));
            }
            NodeKind::Index { base, index } => {
                out.push(SlotMut::Required(base));
                out.push(SlotMut::Required(index));
            }
            NodeKind::Member { base, .. } => out.push(SlotMut::Required(base)),
            NodeKind::Sequence { expressions } => out.push(SlotMut::List(expressions)),
            NodeKind::InitializerList { elements } => out.push(SlotMut::List(elements)),
            NodeKind::Literal(_) | NodeKind::Identifier(_) => {}
        }
        out
    }
}

/// A node: its kind plus the span it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// Arena owning every node of one program.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    files: Vec<String>,
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: Vec<String>) -> Self {
        Self {
            nodes: Vec::new(),
            files,
        }
    }

    /// Register a file name for spans, returning its id.
    pub fn add_file(&mut self, name: impl Into<String>) -> u32 {
        self.files.push(name.into());
        (self.files.len() - 1) as u32
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file_name(&self, id: u32) -> &str {
        self.files
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.push(Node { kind, span });
        NodeId((self.nodes.len() - 1) as u32)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self[id].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self[id].span
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self[id].kind.children()
    }

    /// All nodes below and including `root`, in pre-order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// A transform error located at `id`'s authoring position.
    pub fn transform_error(&self, id: NodeId, message: impl Into<String>) -> GlintError {
        let span = self.span(id);
        GlintError::transform(message, self.file_name(span.file), span.line, span.column)
    }

    /// Verify every reachable node sits in a slot its parent's grammar allows
    /// and that no node has two parents.
    pub fn check_well_formed(&self, root: NodeId) -> GlintResult<()> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if id.index() >= self.nodes.len() {
                return Err(GlintError::transform(
                    format!("dangling node id {}", id),
                    "<ast>",
                    0,
                    0,
                ));
            }
            if std::mem::replace(&mut seen[id.index()], true) {
                return Err(self.transform_error(id, format!("node {} has more than one parent", id)));
            }
            self.check_node(id)?;
            stack.extend(self.children(id));
        }
        Ok(())
    }

    fn check_node(&self, id: NodeId) -> GlintResult<()> {
        let expect = |child: NodeId, ok: bool, what: &str| -> GlintResult<()> {
            if ok {
                Ok(())
            } else {
                Err(self.transform_error(
                    child,
                    format!("malformed tree: {} expected under node {}", what, id),
                ))
            }
        };
        let category = |child: NodeId| self.kind(child).category();
        let is_expr = |child: NodeId| self.kind(child).is_expression();
        let is_statement = |child: NodeId| category(child) == NodeCategory::Statement;

        match self.kind(id) {
            NodeKind::TranslationUnit { declarations } => {
                for &decl in declarations {
                    let ok = matches!(
                        category(decl),
                        NodeCategory::Declaration | NodeCategory::FunctionDefinition
                    ) && !matches!(self.kind(decl), NodeKind::Declarator { .. });
                    expect(decl, ok, "external declaration")?;
                }
            }
            NodeKind::Declaration { ty, declarators } => {
                if declarators.is_empty() && !matches!(ty.specifier.name, TypeName::Struct(_)) {
                    return Err(self.transform_error(id, "declaration without declarators"));
                }
                for &declarator in declarators {
                    let ok = matches!(self.kind(declarator), NodeKind::Declarator { .. });
                    expect(declarator, ok, "declarator")?;
                }
            }
            NodeKind::Declarator {
                initializer: Some(init),
                ..
            } => expect(*init, is_expr(*init), "initializer expression")?,
            NodeKind::FunctionDefinition { body, .. } => {
                let ok = matches!(self.kind(*body), NodeKind::Compound { .. });
                expect(*body, ok, "function body")?;
            }
            NodeKind::Compound { statements } => {
                for &statement in statements {
                    expect(statement, is_statement(statement), "statement")?;
                }
            }
            NodeKind::DeclarationStatement { declaration } => {
                let ok = matches!(
                    self.kind(*declaration),
                    NodeKind::Declaration { .. } | NodeKind::PrecisionDeclaration { .. }
                );
                expect(*declaration, ok, "local declaration")?;
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                expect(*condition, is_expr(*condition), "condition")?;
                expect(*then_branch, is_statement(*then_branch), "statement")?;
                if let Some(else_branch) = else_branch {
                    expect(*else_branch, is_statement(*else_branch), "statement")?;
                }
            }
            NodeKind::Switch { selector, body } => {
                expect(*selector, is_expr(*selector), "selector")?;
                let ok = matches!(self.kind(*body), NodeKind::Compound { .. });
                expect(*body, ok, "switch body")?;
            }
            NodeKind::For { init, body, .. } => {
                if let Some(init) = init {
                    let ok = matches!(
                        self.kind(*init),
                        NodeKind::DeclarationStatement { .. } | NodeKind::ExpressionStatement { .. }
                    );
                    expect(*init, ok, "for-loop initializer")?;
                }
                expect(*body, is_statement(*body), "statement")?;
            }
            NodeKind::While { condition, body } | NodeKind::DoWhile { body, condition } => {
                expect(*condition, is_expr(*condition), "condition")?;
                expect(*body, is_statement(*body), "statement")?;
            }
            kind if kind.is_expression() => {
                for child in kind.children() {
                    expect(child, is_expr(child), "expression")?;
                }
            }
            NodeKind::ExpressionStatement {
                expression: Some(expression),
            }
            | NodeKind::Return {
                value: Some(expression),
            }
            | NodeKind::CaseLabel {
                value: Some(expression),
            } => expect(*expression, is_expr(*expression), "expression")?,
            _ => {}
        }
        Ok(())
    }

    /// Render `root` as a span-free S-expression. Two trees are
    /// structurally equivalent exactly when their dumps are equal.
    pub fn dump(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.dump_node(root, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::TranslationUnit { declarations } => {
                out.push_str("(unit");
                self.dump_list(declarations, out);
                out.push(')');
            }
            NodeKind::Declaration { ty, declarators } => {
                out.push_str("(decl ");
                self.dump_full_type(ty, out);
                self.dump_list(declarators, out);
                out.push(')');
            }
            NodeKind::Declarator {
                name,
                array,
                initializer,
            } => {
                out.push_str("(var ");
                out.push_str(name);
                self.dump_array(array, out);
                if let Some(init) = initializer {
                    out.push_str(" = ");
                    self.dump_node(*init, out);
                }
                out.push(')');
            }
            NodeKind::FunctionPrototype { prototype } => {
                out.push_str("(prototype ");
                self.dump_prototype(prototype, out);
                out.push(')');
            }
            NodeKind::InterfaceBlock {
                qualifiers,
                block_name,
                members,
                instance,
            } => {
                out.push_str("(interface");
                self.dump_qualifiers(qualifiers, out);
                out.push(' ');
                out.push_str(block_name);
                self.dump_members(members, out);
                if let Some(instance) = instance {
                    out.push_str(" (instance ");
                    out.push_str(&instance.name);
                    self.dump_array(&instance.array, out);
                    out.push(')');
                }
                out.push(')');
            }
            NodeKind::PrecisionDeclaration { precision, ty } => {
                out.push_str("(precision ");
                out.push_str(precision.as_str());
                out.push(' ');
                self.dump_specifier(ty, out);
                out.push(')');
            }
            NodeKind::QualifierDeclaration { qualifiers, names } => {
                out.push_str("(qualify");
                self.dump_qualifiers(qualifiers, out);
                for name in names {
                    out.push(' ');
                    out.push_str(name);
                }
                out.push(')');
            }
            NodeKind::FunctionDefinition { prototype, body } => {
                out.push_str("(function ");
                self.dump_prototype(prototype, out);
                out.push(' ');
                self.dump_node(*body, out);
                out.push(')');
            }
            NodeKind::Compound { statements } => {
                out.push_str("(block");
                self.dump_list(statements, out);
                out.push(')');
            }
            NodeKind::DeclarationStatement { declaration } => self.dump_node(*declaration, out),
            NodeKind::ExpressionStatement { expression } => {
                out.push_str("(expr");
                self.dump_optional(*expression, out);
                out.push(')');
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push_str("(if");
                self.dump_list(&[*condition, *then_branch], out);
                self.dump_optional(*else_branch, out);
                out.push(')');
            }
            NodeKind::Switch { selector, body } => {
                out.push_str("(switch");
                self.dump_list(&[*selector, *body], out);
                out.push(')');
            }
            NodeKind::CaseLabel { value } => match value {
                Some(value) => {
                    out.push_str("(case ");
                    self.dump_node(*value, out);
                    out.push(')');
                }
                None => out.push_str("(default)"),
            },
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                out.push_str("(for");
                for part in [init, condition, step] {
                    match part {
                        Some(part) => {
                            out.push(' ');
                            self.dump_node(*part, out);
                        }
                        None => out.push_str(" ()"),
                    }
                }
                out.push(' ');
                self.dump_node(*body, out);
                out.push(')');
            }
            NodeKind::While { condition, body } => {
                out.push_str("(while");
                self.dump_list(&[*condition, *body], out);
                out.push(')');
            }
            NodeKind::DoWhile { body, condition } => {
                out.push_str("(do");
                self.dump_list(&[*body, *condition], out);
                out.push(')');
            }
            NodeKind::Return { value } => {
                out.push_str("(return");
                self.dump_optional(*value, out);
                out.push(')');
            }
            NodeKind::Jump(kind) => out.push_str(match kind {
                JumpKind::Break => "(break)",
                JumpKind::Continue => "(continue)",
                JumpKind::Discard => "(discard)",
            }),
            NodeKind::Binary { op, lhs, rhs } => {
                out.push('(');
                out.push_str(op.as_str());
                self.dump_list(&[*lhs, *rhs], out);
                out.push(')');
            }
            NodeKind::Unary { op, operand } => {
                out.push_str("(prefix ");
                out.push_str(op.as_str());
                self.dump_list(&[*operand], out);
                out.push(')');
            }
            NodeKind::Postfix { op, operand } => {
                out.push_str("(postfix ");
                out.push_str(op.as_str());
                self.dump_list(&[*operand], out);
                out.push(')');
            }
            NodeKind::Assignment { op, target, value } => {
                out.push('(');
                out.push_str(op.as_str());
                self.dump_list(&[*target, *value], out);
                out.push(')');
            }
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                out.push_str("(?:");
                self.dump_list(&[*condition, *then_expr, *else_expr], out);
                out.push(')');
            }
            NodeKind::Call { callee, args } => {
                out.push_str("(call ");
                match callee {
                    Callee::Function(name) => out.push_str(name),
                    Callee::Constructor(specifier) => self.dump_specifier(specifier, out),
                }
                self.dump_list(args, out);
                out.push(')');
            }
            NodeKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                out.push_str("(method ");
                out.push_str(method);
                self.dump_list(&[*receiver], out);
                self.dump_list(args, out);
                out.push(')');
            }
            NodeKind::Index { base, index } => {
                out.push_str("(index");
                self.dump_list(&[*base, *index], out);
                out.push(')');
            }
            NodeKind::Member { base, field } => {
                out.push_str("(. ");
                out.push_str(field);
                self.dump_list(&[*base], out);
                out.push(')');
            }
            NodeKind::Sequence { expressions } => {
                out.push_str("(,");
                self.dump_list(expressions, out);
                out.push(')');
            }
            NodeKind::InitializerList { elements } => {
                out.push_str("(init");
                self.dump_list(elements, out);
                out.push(')');
            }
            NodeKind::Literal(literal) => out.push_str(&literal.text),
            NodeKind::Identifier(name) => out.push_str(name),
        }
    }

    fn dump_list(&self, ids: &[NodeId], out: &mut String) {
        for id in ids {
            out.push(' ');
            self.dump_node(*id, out);
        }
    }

    fn dump_optional(&self, id: Option<NodeId>, out: &mut String) {
        if let Some(id) = id {
            out.push(' ');
            self.dump_node(id, out);
        }
    }

    fn dump_array(&self, array: &Option<ArraySpec>, out: &mut String) {
        let Some(array) = array else {
            return;
        };
        for dim in &array.dims {
            out.push('[');
            if let Some(size) = dim {
                self.dump_node(*size, out);
            }
            out.push(']');
        }
    }

    fn dump_qualifiers(&self, qualifiers: &[Qualifier], out: &mut String) {
        for qualifier in qualifiers {
            out.push(' ');
            match qualifier {
                Qualifier::Layout(items) => {
                    out.push_str("layout(");
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        out.push_str(&item.name);
                        if let Some(value) = item.value {
                            out.push('=');
                            self.dump_node(value, out);
                        }
                    }
                    out.push(')');
                }
                Qualifier::Subroutine(types) if !types.is_empty() => {
                    out.push_str("subroutine(");
                    out.push_str(&types.join(" "));
                    out.push(')');
                }
                other => out.push_str(other.keyword().unwrap_or("?")),
            }
        }
    }

    fn dump_specifier(&self, specifier: &TypeSpecifier, out: &mut String) {
        match &specifier.name {
            TypeName::Builtin(name) | TypeName::Named(name) => out.push_str(name),
            TypeName::Struct(body) => {
                out.push_str("(struct ");
                out.push_str(body.name.as_deref().unwrap_or("_"));
                self.dump_members(&body.members, out);
                out.push(')');
            }
        }
        self.dump_array(&specifier.array, out);
    }

    fn dump_full_type(&self, ty: &FullType, out: &mut String) {
        out.push_str("(type");
        self.dump_qualifiers(&ty.qualifiers, out);
        out.push(' ');
        self.dump_specifier(&ty.specifier, out);
        out.push(')');
    }

    fn dump_members(&self, members: &[StructMember], out: &mut String) {
        for member in members {
            out.push_str(" (member ");
            self.dump_full_type(&member.ty, out);
            for declarator in &member.declarators {
                out.push(' ');
                out.push_str(&declarator.name);
                self.dump_array(&declarator.array, out);
            }
            out.push(')');
        }
    }

    fn dump_prototype(&self, prototype: &Prototype, out: &mut String) {
        self.dump_full_type(&prototype.return_type, out);
        out.push(' ');
        out.push_str(&prototype.name);
        out.push_str(" (params");
        for param in &prototype.params {
            out.push_str(" (param ");
            self.dump_full_type(&param.ty, out);
            if let Some(name) = &param.name {
                out.push(' ');
                out.push_str(name);
            }
            self.dump_array(&param.array, out);
            out.push(')');
        }
        out.push(')');
    }
}

/// `#version number [profile]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VersionDirective {
    pub number: u32,
    pub profile: Option<String>,
}

impl fmt::Display for VersionDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#version {}", self.number)?;
        if let Some(profile) = &self.profile {
            write!(f, " {}", profile)?;
        }
        Ok(())
    }
}

/// A parsed shader: the tree plus the directives that frame it.
#[derive(Debug, Clone)]
pub struct ProgramUnit {
    pub ast: Ast,
    pub root: NodeId,
    pub version: Option<VersionDirective>,
    /// Pass-through directives without the leading `#`, in source order.
    pub directives: Vec<String>,
    /// Capabilities named by `#pragma capability(...)` per top-level node.
    pub capability_guards: BTreeMap<NodeId, Vec<Capability>>,
    /// `layout(binding = N)` values lifted off declarations for targets
    /// without explicit bindings, by declared name.
    pub bindings: BTreeMap<String, u32>,
}

impl ProgramUnit {
    pub fn new(mut ast: Ast) -> Self {
        let root = ast.alloc(
            NodeKind::TranslationUnit {
                declarations: Vec::new(),
            },
            Span::default(),
        );
        Self {
            ast,
            root,
            version: None,
            directives: Vec::new(),
            capability_guards: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Top-level declarations in order.
    pub fn declarations(&self) -> &[NodeId] {
        match self.ast.kind(self.root) {
            NodeKind::TranslationUnit { declarations } => declarations,
            _ => &[],
        }
    }

    pub fn declarations_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self.ast.kind_mut(self.root) {
            NodeKind::TranslationUnit { declarations } => Some(declarations),
            _ => None,
        }
    }

    /// Add a directive unless an identical one is already present.
    pub fn add_directive(&mut self, directive: impl Into<String>) {
        let directive = directive.into();
        if !self.directives.contains(&directive) {
            self.directives.push(directive);
        }
    }

    pub fn check_well_formed(&self) -> GlintResult<()> {
        self.ast.check_well_formed(self.root)
    }

    pub fn dump(&self) -> String {
        self.ast.dump(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(ast: &mut Ast, name: &str) -> NodeId {
        ast.alloc(NodeKind::Identifier(name.into()), Span::default())
    }

    fn int(ast: &mut Ast, text: &str) -> NodeId {
        ast.alloc(
            NodeKind::Literal(Literal {
                kind: LiteralKind::Int,
                text: text.into(),
            }),
            Span::default(),
        )
    }

    #[test]
    fn test_children_include_array_sizes() {
        let mut ast = Ast::new();
        let size = int(&mut ast, "4");
        let declarator = ast.alloc(
            NodeKind::Declarator {
                name: "a".into(),
                array: Some(ArraySpec {
                    dims: vec![Some(size)],
                }),
                initializer: None,
            },
            Span::default(),
        );
        assert_eq!(ast.children(declarator), vec![size]);
        assert_eq!(ast.dump(declarator), "(var a[4])");
    }

    #[test]
    fn test_slots_match_children() {
        let mut ast = Ast::new();
        let a = ident(&mut ast, "a");
        let b = ident(&mut ast, "b");
        let call = ast.alloc(
            NodeKind::Call {
                callee: Callee::Function("f".into()),
                args: vec![a, b],
            },
            Span::default(),
        );
        let slots = ast.kind_mut(call).slots_mut();
        assert_eq!(slots.len(), 1);
        assert!(matches!(&slots[0], SlotMut::List(args) if args.len() == 2));
        assert_eq!(ast.dump(call), "(call f a b)");
    }

    #[test]
    fn test_categories() {
        let mut ast = Ast::new();
        let x = ident(&mut ast, "x");
        assert_eq!(ast.kind(x).category(), NodeCategory::Primary);
        let neg = ast.alloc(
            NodeKind::Unary {
                op: UnaryOp::Minus,
                operand: x,
            },
            Span::default(),
        );
        assert_eq!(ast.kind(neg).category(), NodeCategory::Expression);
        assert_eq!(ast.descendants(neg), vec![neg, x]);
    }

    #[test]
    fn test_shared_node_is_malformed() {
        let mut ast = Ast::new();
        let x = ident(&mut ast, "x");
        let sum = ast.alloc(
            NodeKind::Binary {
                op: BinaryOp::Add,
                lhs: x,
                rhs: x,
            },
            Span::default(),
        );
        assert!(matches!(
            ast.check_well_formed(sum),
            Err(GlintError::Transform { .. })
        ));
    }

    #[test]
    fn test_statement_in_expression_slot_is_malformed() {
        let mut ast = Ast::new();
        let brk = ast.alloc(NodeKind::Jump(JumpKind::Break), Span::default());
        let x = ident(&mut ast, "x");
        let assign = ast.alloc(
            NodeKind::Assignment {
                op: AssignOp::Assign,
                target: x,
                value: brk,
            },
            Span::default(),
        );
        assert!(ast.check_well_formed(assign).is_err());
    }

    #[test]
    fn test_literal_values() {
        let lit = |text: &str| Literal {
            kind: LiteralKind::Int,
            text: text.into(),
        };
        assert_eq!(lit("3").as_u32(), Some(3));
        assert_eq!(lit("0x10").as_u32(), Some(16));
        assert_eq!(lit("2u").as_u32(), Some(2));
    }

    #[test]
    fn test_add_layout_item() {
        let mut ty = FullType {
            qualifiers: vec![Qualifier::Storage(StorageQualifier::Out)],
            specifier: TypeSpecifier::builtin("vec4"),
        };
        ty.add_layout_item("location", None);
        assert!(matches!(&ty.qualifiers[0], Qualifier::Layout(items) if items[0].name == "location"));
        assert!(ty.has_storage(StorageQualifier::Out));
    }
}
