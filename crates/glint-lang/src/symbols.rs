//! Global symbol table and the rewrite context threaded through transforms.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use glint_core::TargetProfile;

use crate::ast::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SymbolKind {
    Variable,
    Function,
    Struct,
    Block,
}

/// A global name and the top-level node declaring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub node: NodeId,
}

/// Global names of a program. Functions may be declared more than once
/// (prototype, overloads), so a name maps to every declaring node.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    globals: BTreeMap<String, Vec<Symbol>>,
}

impl SymbolTable {
    pub fn build(unit: &ProgramUnit) -> Self {
        let mut table = Self::default();
        for &id in unit.declarations() {
            for (name, kind) in declared_names(&unit.ast, id) {
                table.declare(name, kind, id);
            }
        }
        table
    }

    pub fn declare(&mut self, name: impl Into<String>, kind: SymbolKind, node: NodeId) {
        let name = name.into();
        self.globals.entry(name.clone()).or_default().push(Symbol { name, kind, node });
    }

    pub fn lookup(&self, name: &str) -> &[Symbol] {
        self.globals.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

/// State shared by consecutive transform passes of one pipeline run.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub profile: TargetProfile,
    pub symbols: SymbolTable,
    /// `(original, renamed)` pairs applied by merges, in order.
    pub renames: Vec<(String, String)>,
    /// Names removed by capability stripping.
    pub stripped: Vec<String>,
    rename_counter: u32,
}

impl RewriteContext {
    pub fn new(profile: TargetProfile) -> Self {
        Self {
            profile,
            symbols: SymbolTable::default(),
            renames: Vec::new(),
            stripped: Vec::new(),
            rename_counter: 0,
        }
    }

    /// Rebuild the symbol table from the current tree.
    pub fn refresh(&mut self, unit: &ProgramUnit) {
        self.symbols = SymbolTable::build(unit);
    }

    /// `base_N` for the next counter value not taken by a global or by
    /// `reserved`.
    pub fn fresh_name(&mut self, base: &str, reserved: &BTreeSet<String>) -> String {
        loop {
            self.rename_counter += 1;
            let candidate = format!("{}_{}", base, self.rename_counter);
            if !self.symbols.contains(&candidate) && !reserved.contains(&candidate) {
                return candidate;
            }
        }
    }
}

/// Names a top-level node introduces into the global scope.
pub fn declared_names(ast: &Ast, id: NodeId) -> Vec<(String, SymbolKind)> {
    let mut names = Vec::new();
    match ast.kind(id) {
        NodeKind::Declaration { ty, declarators } => {
            if let TypeName::Struct(StructBody { name: Some(name), .. }) = &ty.specifier.name {
                names.push((name.clone(), SymbolKind::Struct));
            }
            for &declarator in declarators {
                if let NodeKind::Declarator { name, .. } = ast.kind(declarator) {
                    names.push((name.clone(), SymbolKind::Variable));
                }
            }
        }
        NodeKind::FunctionPrototype { prototype } | NodeKind::FunctionDefinition { prototype, .. } => {
            names.push((prototype.name.clone(), SymbolKind::Function));
        }
        NodeKind::InterfaceBlock {
            block_name,
            members,
            instance,
            ..
        } => {
            names.push((block_name.clone(), SymbolKind::Block));
            match instance {
                Some(instance) => names.push((instance.name.clone(), SymbolKind::Variable)),
                None => {
                    for member in members {
                        for declarator in &member.declarators {
                            names.push((declarator.name.clone(), SymbolKind::Variable));
                        }
                    }
                }
            }
        }
        _ => {}
    }
    names
}

/// Every name bound anywhere below `root`: globals, locals, parameters and
/// local struct types.
pub fn bound_names(ast: &Ast, root: NodeId) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for id in ast.descendants(root) {
        names.extend(declared_names(ast, id).into_iter().map(|(name, _)| name));
        if let NodeKind::FunctionPrototype { prototype } | NodeKind::FunctionDefinition { prototype, .. } = ast.kind(id) {
            names.extend(prototype.params.iter().filter_map(|param| param.name.clone()));
        }
    }
    names
}

/// Rename the names a top-level node declares.
pub fn rename_declared(ast: &mut Ast, id: NodeId, renames: &BTreeMap<String, String>) {
    let apply = |name: &mut String| {
        if let Some(new) = renames.get(name.as_str()) {
            *name = new.clone();
        }
    };
    let declarators = match ast.kind_mut(id) {
        NodeKind::Declaration { ty, declarators } => {
            if let TypeName::Struct(StructBody { name: Some(name), .. }) = &mut ty.specifier.name {
                apply(name);
            }
            declarators.clone()
        }
        NodeKind::FunctionPrototype { prototype } | NodeKind::FunctionDefinition { prototype, .. } => {
            apply(&mut prototype.name);
            Vec::new()
        }
        NodeKind::InterfaceBlock {
            block_name,
            members,
            instance,
            ..
        } => {
            apply(block_name);
            match instance {
                Some(instance) => apply(&mut instance.name),
                None => members
                    .iter_mut()
                    .flat_map(|member| member.declarators.iter_mut())
                    .for_each(|declarator| apply(&mut declarator.name)),
            }
            Vec::new()
        }
        _ => Vec::new(),
    };
    for declarator in declarators {
        if let NodeKind::Declarator { name, .. } = ast.kind_mut(declarator) {
            apply(name);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Identifier in an expression.
    Value,
    /// Function call or struct constructor.
    Call,
    /// User type named in a declaration.
    Type,
}

/// A use of a name not bound by any enclosing local scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub kind: ReferenceKind,
    pub node: NodeId,
}

/// Every free reference below `root`, in source order.
///
/// Takes the arena mutably because collection shares its scope walk with
/// [`rename_references`]; nothing is modified.
pub fn free_references(ast: &mut Ast, root: NodeId) -> Vec<Reference> {
    let mut found = Vec::new();
    let mut record = |node: NodeId, name: &mut String, kind: ReferenceKind| {
        found.push(Reference {
            name: name.clone(),
            kind,
            node,
        });
    };
    ScopeWalker::new(&mut record).walk(ast, root);
    found
}

/// Rewrite every free reference below `root` found in `renames`.
pub fn rename_references(ast: &mut Ast, root: NodeId, renames: &BTreeMap<String, String>) {
    let mut rename = |_: NodeId, name: &mut String, _: ReferenceKind| {
        if let Some(new) = renames.get(name.as_str()) {
            *name = new.clone();
        }
    };
    ScopeWalker::new(&mut rename).walk(ast, root);
}

fn named_types(ty: &mut FullType) -> Vec<&mut String> {
    let mut out = Vec::new();
    collect_named(&mut ty.specifier, &mut out);
    out
}

fn collect_named<'a>(specifier: &'a mut TypeSpecifier, out: &mut Vec<&'a mut String>) {
    match &mut specifier.name {
        TypeName::Named(name) => out.push(name),
        TypeName::Struct(body) => {
            for member in &mut body.members {
                collect_named(&mut member.ty.specifier, out);
            }
        }
        TypeName::Builtin(_) => {}
    }
}

fn prototype_types(prototype: &mut Prototype) -> Vec<&mut String> {
    let mut out = Vec::new();
    collect_named(&mut prototype.return_type.specifier, &mut out);
    for param in &mut prototype.params {
        collect_named(&mut param.ty.specifier, &mut out);
    }
    out
}

type RefVisit<'f> = &'f mut dyn FnMut(NodeId, &mut String, ReferenceKind);

/// Lexically scoped walk reporting names that resolve outside the walked
/// subtree. Locals live from the end of their declarator to the end of the
/// enclosing block; parameters live for the function body.
struct ScopeWalker<'f> {
    scopes: Vec<HashSet<String>>,
    visit: RefVisit<'f>,
}

impl<'f> ScopeWalker<'f> {
    fn new(visit: RefVisit<'f>) -> Self {
        Self {
            scopes: Vec::new(),
            visit,
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn reference(&mut self, node: NodeId, name: &mut String, kind: ReferenceKind) {
        if !self.is_bound(name) {
            (self.visit)(node, name, kind);
        }
    }

    fn walk_all(&mut self, ast: &mut Ast, ids: Vec<NodeId>) {
        for id in ids {
            self.walk(ast, id);
        }
    }

    fn walk(&mut self, ast: &mut Ast, id: NodeId) {
        // Names used by the node itself.
        let kind = &mut ast[id].kind;
        let mut uses: Vec<(&mut String, ReferenceKind)> = Vec::new();
        match kind {
            NodeKind::Identifier(name) => uses.push((name, ReferenceKind::Value)),
            NodeKind::Call {
                callee: Callee::Function(name),
                ..
            } => uses.push((name, ReferenceKind::Call)),
            NodeKind::Call {
                callee: Callee::Constructor(specifier),
                ..
            } => {
                let mut named = Vec::new();
                collect_named(specifier, &mut named);
                uses.extend(named.into_iter().map(|n| (n, ReferenceKind::Call)));
            }
            NodeKind::Declaration { ty, .. } => {
                uses.extend(named_types(ty).into_iter().map(|n| (n, ReferenceKind::Type)))
            }
            NodeKind::FunctionPrototype { prototype } | NodeKind::FunctionDefinition { prototype, .. } => {
                uses.extend(prototype_types(prototype).into_iter().map(|n| (n, ReferenceKind::Type)))
            }
            NodeKind::InterfaceBlock { members, .. } => {
                for member in members.iter_mut() {
                    uses.extend(named_types(&mut member.ty).into_iter().map(|n| (n, ReferenceKind::Type)));
                }
            }
            _ => {}
        }
        for (name, kind) in uses {
            self.reference(id, name, kind);
        }

        // Children, with scoping.
        match ast.kind(id).clone() {
            NodeKind::Compound { statements } => {
                self.scopes.push(HashSet::new());
                self.walk_all(ast, statements);
                self.scopes.pop();
            }
            NodeKind::For { .. } => {
                self.scopes.push(HashSet::new());
                self.walk_all(ast, ast.children(id));
                self.scopes.pop();
            }
            NodeKind::FunctionDefinition { prototype, body } => {
                let mut types = ast.children(id);
                types.retain(|child| *child != body);
                self.walk_all(ast, types);
                self.scopes.push(HashSet::new());
                for param in prototype.params.iter().filter_map(|p| p.name.as_deref()) {
                    self.bind(param);
                }
                self.walk(ast, body);
                self.scopes.pop();
            }
            NodeKind::Declaration { ty, declarators } => {
                let mut type_exprs = ast.children(id);
                type_exprs.retain(|child| !declarators.contains(child));
                self.walk_all(ast, type_exprs);
                if let TypeName::Struct(StructBody { name: Some(name), .. }) = &ty.specifier.name {
                    self.bind(name);
                }
                for declarator in declarators {
                    self.walk_all(ast, ast.children(declarator));
                    if let NodeKind::Declarator { name, .. } = ast.kind(declarator) {
                        let name = name.clone();
                        self.bind(&name);
                    }
                }
            }
            _ => self.walk_all(ast, ast.children(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::parse_program;

    fn unit(src: &str) -> ProgramUnit {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        let outcome = parse_program(tokens, lexer.file_names(), true);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        outcome.unit
    }

    fn free_names(unit: &mut ProgramUnit) -> Vec<String> {
        let root = unit.root;
        free_references(&mut unit.ast, root)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    #[test]
    fn test_symbol_table() {
        let unit = unit(
            "struct Light { vec3 c; } sun;\nuniform float a, b;\nfloat f();\nfloat f() { return 1.0; }\n\
             uniform Block { vec4 tint; };\nlayout(std140) uniform Named { vec4 x; } named;",
        );
        let table = SymbolTable::build(&unit);
        assert_eq!(table.lookup("Light")[0].kind, SymbolKind::Struct);
        assert_eq!(table.lookup("sun")[0].kind, SymbolKind::Variable);
        assert!(table.contains("a") && table.contains("b"));
        assert_eq!(table.lookup("f").len(), 2);
        assert!(table.contains("tint"));
        assert!(table.contains("named"));
        assert!(!table.contains("x"));
    }

    #[test]
    fn test_locals_and_parameters_are_not_free() {
        let mut unit = unit(
            "float g(float k) { float t = k * scale; for (int i = 0; i < 2; i++) t += helper(i); return t; }",
        );
        assert_eq!(free_names(&mut unit), vec!["scale", "helper"]);
    }

    #[test]
    fn test_initializer_sees_outer_name() {
        let mut unit = unit("void main() { float x = x + 1.0; { float y = x; } y; }");
        assert_eq!(free_names(&mut unit), vec!["x", "y"]);
    }

    #[test]
    fn test_struct_types_and_fields() {
        let mut unit = unit("void main() { Light l = Light(vec3(1.0)); l.color = base.rgb; }");
        assert_eq!(free_names(&mut unit), vec!["Light", "Light", "base"]);
    }

    #[test]
    fn test_rename_references_respects_shadowing() {
        let mut unit = unit(
            "float foo() { return 1.0; }\nfloat bar(float k) { float a = foo(); { float foo = k; return foo; } }",
        );
        let renames = BTreeMap::from([("foo".to_string(), "foo_1".to_string())]);
        let root = unit.root;
        rename_references(&mut unit.ast, root, &renames);
        let bar = unit.ast.dump(unit.declarations()[1]);
        assert!(bar.contains("(call foo_1)"), "{}", bar);
        assert!(bar.contains("(return foo)"), "{}", bar);
    }

    #[test]
    fn test_rename_declared() {
        let mut unit = unit("struct S { float v; } s, t[2];\nvoid foo() {}");
        let renames = BTreeMap::from([
            ("S".to_string(), "S_1".to_string()),
            ("t".to_string(), "t_2".to_string()),
            ("foo".to_string(), "foo_3".to_string()),
        ]);
        let ids = unit.declarations().to_vec();
        for id in ids {
            rename_declared(&mut unit.ast, id, &renames);
        }
        let table = SymbolTable::build(&unit);
        assert!(table.contains("S_1") && table.contains("s") && table.contains("t_2") && table.contains("foo_3"));
        assert!(!table.contains("foo"));
    }

    #[test]
    fn test_fresh_name_skips_taken() {
        let unit = unit("float foo_1;");
        let mut ctx = RewriteContext::new(TargetProfile::default());
        ctx.refresh(&unit);
        let reserved = BTreeSet::from(["foo_2".to_string()]);
        assert_eq!(ctx.fresh_name("foo", &reserved), "foo_3");
        assert_eq!(ctx.fresh_name("bar", &reserved), "bar_4");
    }
}
