use std::collections::{BTreeMap, BTreeSet};

use glint_core::{Capability, GlintResult};

use super::Transform;
use crate::ast::*;
use crate::metadata::layout_u32;
use crate::symbols::{declared_names, free_references, RewriteContext};
use crate::visitor::{walk_unit, VisitAction, Visitor};

/// Remove top-level declarations that need a capability the target lacks.
///
/// Stripping is a node removal. Anything left in the program that still
/// refers to a stripped name fails the pass. Explicit bindings are the
/// exception: without them the `binding` layout item is lifted into
/// [`ProgramUnit::bindings`] and the declaration stays.
#[derive(Debug, Clone)]
pub struct StripCapabilities {
    extra_unsupported: Vec<Capability>,
}

impl StripCapabilities {
    pub fn new(extra_unsupported: Vec<Capability>) -> Self {
        Self { extra_unsupported }
    }

    fn unsupported(&self, ctx: &RewriteContext) -> BTreeSet<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| !ctx.profile.supports(*cap))
            .chain(self.extra_unsupported.iter().copied())
            .collect()
    }
}

/// Removes the selected top-level nodes and leaves everything else alone.
struct RemoveTopLevel<'a> {
    targets: &'a BTreeMap<NodeId, Capability>,
}

impl RemoveTopLevel<'_> {
    fn decide(&self, id: NodeId) -> VisitAction {
        if self.targets.contains_key(&id) {
            VisitAction::Remove
        } else {
            VisitAction::SkipChildren
        }
    }
}

impl Visitor for RemoveTopLevel<'_> {
    fn visit_declaration(&mut self, _ast: &mut Ast, id: NodeId) -> GlintResult<VisitAction> {
        Ok(self.decide(id))
    }

    fn visit_function(&mut self, _ast: &mut Ast, id: NodeId) -> GlintResult<VisitAction> {
        Ok(self.decide(id))
    }
}

impl Transform for StripCapabilities {
    fn name(&self) -> &str {
        "strip_capabilities"
    }

    fn apply(&self, unit: &mut ProgramUnit, ctx: &mut RewriteContext) -> GlintResult<()> {
        let unsupported = self.unsupported(ctx);
        if unsupported.contains(&Capability::ExplicitBinding) {
            lift_bindings(unit);
        }
        let mut targets = BTreeMap::new();
        for &id in unit.declarations() {
            let mut required = implicit_requirements(&unit.ast, id);
            if let Some(guard) = unit.capability_guards.get(&id) {
                required.extend(guard.iter().copied());
            }
            if let Some(cap) = required.into_iter().find(|cap| unsupported.contains(cap)) {
                targets.insert(id, cap);
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mut removed_names: BTreeMap<String, Capability> = BTreeMap::new();
        for (&id, &cap) in &targets {
            for (name, _) in declared_names(&unit.ast, id) {
                tracing::debug!("stripping '{}' (needs {})", name, cap);
                removed_names.insert(name, cap);
            }
        }

        walk_unit(unit, &mut RemoveTopLevel { targets: &targets })?;
        unit.capability_guards.retain(|id, _| !targets.contains_key(id));

        // A stripped name may survive through another declaration, such as
        // a function overload that was kept.
        ctx.refresh(unit);
        removed_names.retain(|name, _| !ctx.symbols.contains(name));

        let root = unit.root;
        for reference in free_references(&mut unit.ast, root) {
            if let Some(cap) = removed_names.get(&reference.name) {
                return Err(unit.ast.transform_error(
                    reference.node,
                    format!(
                        "'{}' is still referenced but its declaration was stripped (requires {})",
                        reference.name, cap
                    ),
                ));
            }
        }
        ctx.stripped.extend(removed_names.into_keys());
        Ok(())
    }
}

fn is_atomic_counter(ty: &FullType) -> bool {
    matches!(&ty.specifier.name, TypeName::Builtin(name) if name == "atomic_uint")
}

fn remove_binding(qualifiers: &mut Vec<Qualifier>) {
    for qualifier in qualifiers.iter_mut() {
        if let Qualifier::Layout(items) = qualifier {
            items.retain(|item| item.name != "binding");
        }
    }
    qualifiers.retain(|q| !matches!(q, Qualifier::Layout(items) if items.is_empty()));
}

/// Move constant `layout(binding = N)` values off top-level declarations
/// into the unit's binding table. Atomic counters keep theirs.
fn lift_bindings(unit: &mut ProgramUnit) {
    for id in unit.declarations().to_vec() {
        let (names, binding) = match unit.ast.kind(id) {
            NodeKind::Declaration { ty, declarators } if !is_atomic_counter(ty) => {
                let names: Vec<String> = declarators
                    .iter()
                    .filter_map(|&d| match unit.ast.kind(d) {
                        NodeKind::Declarator { name, .. } => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
                (names, layout_u32(&unit.ast, &ty.qualifiers, "binding"))
            }
            NodeKind::InterfaceBlock {
                qualifiers, block_name, ..
            } => (vec![block_name.clone()], layout_u32(&unit.ast, qualifiers, "binding")),
            _ => continue,
        };
        let Some(binding) = binding else {
            continue;
        };
        match unit.ast.kind_mut(id) {
            NodeKind::Declaration { ty, .. } => remove_binding(&mut ty.qualifiers),
            NodeKind::InterfaceBlock { qualifiers, .. } => remove_binding(qualifiers),
            _ => continue,
        }
        for name in names {
            tracing::debug!("lifting binding {} off '{}'", binding, name);
            unit.bindings.insert(name, binding);
        }
    }
}

fn type_requirements(specifier: &TypeSpecifier, out: &mut BTreeSet<Capability>) {
    match &specifier.name {
        TypeName::Builtin(name) => {
            if name == "double" || name.starts_with("dvec") || name.starts_with("dmat") {
                out.insert(Capability::Fp64);
            }
            if name.starts_with("image") || name.starts_with("iimage") || name.starts_with("uimage") {
                out.insert(Capability::ImageLoadStore);
            }
        }
        TypeName::Struct(body) => {
            for member in &body.members {
                full_type_requirements(&member.ty, out);
            }
        }
        TypeName::Named(_) => {}
    }
}

fn qualifier_requirements(qualifiers: &[Qualifier], out: &mut BTreeSet<Capability>) {
    for qualifier in qualifiers {
        match qualifier {
            Qualifier::Storage(StorageQualifier::Buffer) => {
                out.insert(Capability::StorageBuffer);
            }
            Qualifier::Subroutine(_) => {
                out.insert(Capability::Subroutine);
            }
            _ => {}
        }
    }
}

fn full_type_requirements(ty: &FullType, out: &mut BTreeSet<Capability>) {
    qualifier_requirements(&ty.qualifiers, out);
    type_requirements(&ty.specifier, out);
}

fn prototype_requirements(prototype: &Prototype, out: &mut BTreeSet<Capability>) {
    full_type_requirements(&prototype.return_type, out);
    for param in &prototype.params {
        full_type_requirements(&param.ty, out);
    }
}

/// Capabilities a top-level node needs because of its own types and
/// qualifiers. Function bodies are not inspected.
pub fn implicit_requirements(ast: &Ast, id: NodeId) -> BTreeSet<Capability> {
    let mut out = BTreeSet::new();
    match ast.kind(id) {
        NodeKind::Declaration { ty, .. } => full_type_requirements(ty, &mut out),
        NodeKind::FunctionPrototype { prototype } | NodeKind::FunctionDefinition { prototype, .. } => {
            prototype_requirements(prototype, &mut out)
        }
        NodeKind::InterfaceBlock {
            qualifiers, members, ..
        } => {
            qualifier_requirements(qualifiers, &mut out);
            if qualifiers.contains(&Qualifier::Storage(StorageQualifier::Uniform)) {
                out.insert(Capability::UniformBuffer);
            }
            for member in members {
                full_type_requirements(&member.ty, &mut out);
            }
        }
        NodeKind::QualifierDeclaration { qualifiers, .. } => {
            qualifier_requirements(qualifiers, &mut out);
            if layout_items(qualifiers).any(|item| item.name.starts_with("local_size")) {
                out.insert(Capability::Compute);
            }
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::test_support::unit;
    use super::*;
    use glint_core::{GlintError, TargetProfile};

    fn strip(unit: &mut ProgramUnit, profile: TargetProfile, extra: Vec<Capability>) -> GlintResult<RewriteContext> {
        let mut ctx = RewriteContext::new(profile);
        ctx.refresh(unit);
        StripCapabilities::new(extra).apply(unit, &mut ctx)?;
        unit.check_well_formed()?;
        Ok(ctx)
    }

    #[test]
    fn test_implicit_requirements() {
        let unit = unit(
            "uniform dvec3 d;\nlayout(std430, binding = 2) buffer Data { float v[]; };\n\
             layout(std140) uniform Params { vec4 tint; };\nlayout(local_size_x = 8) in;\nuniform float plain;",
        );
        let ids = unit.declarations().to_vec();
        let caps = |i: usize| implicit_requirements(&unit.ast, ids[i]).into_iter().collect::<Vec<_>>();
        assert_eq!(caps(0), vec![Capability::Fp64]);
        assert_eq!(caps(1), vec![Capability::StorageBuffer]);
        assert_eq!(caps(2), vec![Capability::UniformBuffer]);
        assert_eq!(caps(3), vec![Capability::Compute]);
        assert!(caps(4).is_empty());
    }

    #[test]
    fn test_strips_unsupported_and_unreferenced() {
        let mut unit = unit(
            "uniform double precise_time;\n#pragma capability(geometry)\nfloat geo() { return 1.0; }\n\
             uniform float t;\nvoid main() { float x = t; }",
        );
        let ctx = strip(&mut unit, TargetProfile::Glsl140, Vec::new()).unwrap();
        assert_eq!(ctx.stripped, vec!["geo".to_string(), "precise_time".to_string()]);
        assert_eq!(unit.declarations().len(), 2);
        assert!(unit.capability_guards.is_empty());
    }

    #[test]
    fn test_supported_profile_keeps_everything() {
        let mut unit = unit("uniform double d;\nvoid main() { float x = float(d); }");
        strip(&mut unit, TargetProfile::Glsl450, Vec::new()).unwrap();
        assert_eq!(unit.declarations().len(), 2);
    }

    #[test]
    fn test_extra_unsupported_capability() {
        let mut unit = unit("uniform vec2 offset;\nvoid main() {}");
        unit.capability_guards.insert(unit.declarations()[0], vec![Capability::Tessellation]);
        let ctx = strip(&mut unit, TargetProfile::Glsl450, vec![Capability::Tessellation]).unwrap();
        assert_eq!(ctx.stripped, vec!["offset".to_string()]);
        assert_eq!(unit.declarations().len(), 1);
    }

    #[test]
    fn test_bindings_are_lifted_below_420() {
        let mut unit = unit(
            "layout(binding = 0) uniform sampler2D tex;\nlayout(std140, binding = 2) uniform Params { vec4 tint; };\n\
             layout(binding = 1, offset = 0) uniform atomic_uint hits;\nvoid main() {}",
        );
        let ctx = strip(&mut unit, TargetProfile::Glsl330, Vec::new()).unwrap();
        assert!(ctx.stripped.is_empty());
        assert_eq!(unit.declarations().len(), 4);
        assert_eq!(unit.bindings.get("tex"), Some(&0));
        assert_eq!(unit.bindings.get("Params"), Some(&2));
        assert!(!unit.bindings.contains_key("hits"));
        let dump = unit.dump();
        assert!(!dump.contains("binding=0"), "{}", dump);
        assert!(!dump.contains("binding=2"), "{}", dump);
        assert!(dump.contains("layout(std140)"), "{}", dump);
        assert!(dump.contains("binding=1"), "{}", dump);
    }

    #[test]
    fn test_bindings_kept_when_supported() {
        let mut unit = unit("layout(binding = 3) uniform sampler2D tex;\nvoid main() {}");
        strip(&mut unit, TargetProfile::Glsl430, Vec::new()).unwrap();
        assert!(unit.bindings.is_empty());
        assert!(unit.dump().contains("binding=3"));
    }

    #[test]
    fn test_dangling_reference_is_an_error() {
        let mut unit = unit("uniform double d;\nvoid main() {\n    float x = float(d);\n}");
        let err = strip(&mut unit, TargetProfile::Glsl330, Vec::new()).unwrap_err();
        match err {
            GlintError::Transform { message, line, .. } => {
                assert!(message.contains("'d'"), "{}", message);
                assert!(message.contains("fp64"), "{}", message);
                assert_eq!(line, 3);
            }
            other => panic!("expected transform error, got {:?}", other),
        }
    }

    #[test]
    fn test_shadowed_local_is_not_a_dangling_reference() {
        let mut unit = unit("uniform double d;\nvoid main() { float d = 1.0; d += 1.0; }");
        strip(&mut unit, TargetProfile::Glsl330, Vec::new()).unwrap();
        assert_eq!(unit.declarations().len(), 1);
    }
}
