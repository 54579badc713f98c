//! Small targeted rewrites: function hooks, version bumps and output
//! location marking.

use std::collections::BTreeSet;

use glint_core::{GlintResult, HookPosition};

use super::{parse_snippet_statements, Transform};
use crate::ast::*;
use crate::symbols::RewriteContext;

/// Insert statements at the head or tail of a function body.
#[derive(Debug, Clone)]
pub struct FunctionHook {
    function: String,
    code: String,
    position: HookPosition,
    parameters: Option<usize>,
}

impl FunctionHook {
    pub fn new(function: String, code: String, position: HookPosition, parameters: Option<usize>) -> Self {
        Self {
            function,
            code,
            position,
            parameters,
        }
    }

    fn find_body(&self, unit: &ProgramUnit) -> Option<NodeId> {
        unit.declarations().iter().find_map(|&id| match unit.ast.kind(id) {
            NodeKind::FunctionDefinition { prototype, body }
                if prototype.name == self.function
                    && self.parameters.map_or(true, |n| n == prototype.params.len()) =>
            {
                Some(*body)
            }
            _ => None,
        })
    }
}

impl Transform for FunctionHook {
    fn name(&self) -> &str {
        "function_hook"
    }

    fn apply(&self, unit: &mut ProgramUnit, _ctx: &mut RewriteContext) -> GlintResult<()> {
        let Some(body) = self.find_body(unit) else {
            let wanted = match self.parameters {
                Some(n) => format!("'{}' with {} parameter(s)", self.function, n),
                None => format!("'{}'", self.function),
            };
            return Err(unit
                .ast
                .transform_error(unit.root, format!("no function definition {} to hook", wanted)));
        };
        let label = format!("<hook:{}>", self.function);
        let statements = parse_snippet_statements(unit, &self.code, &label)?;
        tracing::debug!(
            "hooking {} statement(s) into '{}' ({:?})",
            statements.len(),
            self.function,
            self.position
        );

        let (len, ends_in_return) = match unit.ast.kind(body) {
            NodeKind::Compound { statements } => (
                statements.len(),
                statements
                    .last()
                    .is_some_and(|&last| matches!(unit.ast.kind(last), NodeKind::Return { .. })),
            ),
            _ => return Err(unit.ast.transform_error(body, "function body is not a block")),
        };
        let at = match self.position {
            HookPosition::Head => 0,
            HookPosition::Tail if ends_in_return => len - 1,
            HookPosition::Tail => len,
        };
        if let NodeKind::Compound { statements: existing } = unit.ast.kind_mut(body) {
            existing.splice(at..at, statements);
        }
        Ok(())
    }
}

/// Raise `#version` to at least a minimum.
#[derive(Debug, Clone)]
pub struct RequireVersion {
    version: u32,
    profile: Option<String>,
}

impl RequireVersion {
    pub fn new(version: u32, profile: Option<String>) -> Self {
        Self { version, profile }
    }
}

impl Transform for RequireVersion {
    fn name(&self) -> &str {
        "require_version"
    }

    fn apply(&self, unit: &mut ProgramUnit, _ctx: &mut RewriteContext) -> GlintResult<()> {
        let directive = unit.version.get_or_insert(VersionDirective {
            number: self.version,
            profile: None,
        });
        if directive.number < self.version {
            tracing::debug!("raising #version {} to {}", directive.number, self.version);
            directive.number = self.version;
        }
        if let Some(profile) = &self.profile {
            directive.profile = Some(profile.clone());
        }
        Ok(())
    }
}

/// Give every global `out` without a location the next free one.
#[derive(Debug, Clone, Copy)]
pub struct MarkOutputs;

fn explicit_location(ast: &Ast, qualifiers: &[Qualifier]) -> Option<Option<u32>> {
    layout_items(qualifiers)
        .find(|item| item.name == "location")
        .map(|item| match item.value.map(|value| ast.kind(value)) {
            Some(NodeKind::Literal(literal)) => literal.as_u32(),
            _ => None,
        })
}

impl Transform for MarkOutputs {
    fn name(&self) -> &str {
        "mark_outputs"
    }

    fn apply(&self, unit: &mut ProgramUnit, _ctx: &mut RewriteContext) -> GlintResult<()> {
        let mut used = BTreeSet::new();
        let mut unlocated = Vec::new();
        for &id in unit.declarations() {
            let qualifiers = match unit.ast.kind(id) {
                NodeKind::Declaration { ty, .. } => &ty.qualifiers,
                NodeKind::InterfaceBlock { qualifiers, .. } => qualifiers,
                _ => continue,
            };
            if !qualifiers.contains(&Qualifier::Storage(StorageQualifier::Out)) {
                continue;
            }
            match explicit_location(&unit.ast, qualifiers) {
                Some(Some(location)) => {
                    used.insert(location);
                }
                Some(None) => {}
                None if matches!(unit.ast.kind(id), NodeKind::Declaration { .. }) => unlocated.push(id),
                None => {}
            }
        }

        let mut next = 0u32;
        for id in unlocated {
            while used.contains(&next) {
                next += 1;
            }
            let span = unit.ast.span(id);
            let value = unit.ast.alloc(
                NodeKind::Literal(Literal {
                    kind: LiteralKind::Int,
                    text: next.to_string(),
                }),
                span,
            );
            if let NodeKind::Declaration { ty, .. } = unit.ast.kind_mut(id) {
                ty.add_layout_item("location", Some(value));
            }
            used.insert(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::unit;
    use super::*;
    use glint_core::{GlintError, TargetProfile};

    fn run(transform: &dyn Transform, unit: &mut ProgramUnit) -> GlintResult<()> {
        let mut ctx = RewriteContext::new(TargetProfile::Glsl330);
        ctx.refresh(unit);
        transform.apply(unit, &mut ctx)?;
        unit.check_well_formed()
    }

    #[test]
    fn test_hook_head_and_tail() {
        let mut unit = unit("float f(float x) { x += 1.0; return x; }\nvoid main() { a(); }");
        run(
            &FunctionHook::new("f".into(), "x *= 2.0;".into(), HookPosition::Tail, None),
            &mut unit,
        )
        .unwrap();
        run(
            &FunctionHook::new("main".into(), "b(); c();".into(), HookPosition::Head, None),
            &mut unit,
        )
        .unwrap();
        run(
            &FunctionHook::new("main".into(), "d();".into(), HookPosition::Tail, None),
            &mut unit,
        )
        .unwrap();
        let dump = unit.dump();
        assert!(
            dump.contains("(block (expr (+= x 1.0)) (expr (*= x 2.0)) (return x))"),
            "{}",
            dump
        );
        assert!(
            dump.contains("(block (expr (call b)) (expr (call c)) (expr (call a)) (expr (call d)))"),
            "{}",
            dump
        );
    }

    #[test]
    fn test_hook_matches_parameter_count() {
        let mut unit = unit("void f() {}\nvoid f(int a) {}");
        run(
            &FunctionHook::new("f".into(), "a++;".into(), HookPosition::Head, Some(1)),
            &mut unit,
        )
        .unwrap();
        assert!(unit.dump().contains("(param (type int) a)) (block (expr (postfix ++ a))))"));
    }

    #[test]
    fn test_hook_missing_function() {
        let mut unit = unit("void main() {}");
        let err = run(
            &FunctionHook::new("shade".into(), "x = 1;".into(), HookPosition::Head, None),
            &mut unit,
        )
        .unwrap_err();
        assert!(matches!(err, GlintError::Transform { ref message, .. } if message.contains("'shade'")));
    }

    #[test]
    fn test_require_version_never_lowers() {
        let mut unit = unit("#version 400\nvoid main() {}");
        run(&RequireVersion::new(330, None), &mut unit).unwrap();
        assert_eq!(unit.version.as_ref().map(|v| v.number), Some(400));
        run(&RequireVersion::new(450, Some("core".into())), &mut unit).unwrap();
        assert_eq!(unit.version.as_ref().unwrap().to_string(), "#version 450 core");
    }

    #[test]
    fn test_require_version_adds_missing_directive() {
        let mut unit = unit("void main() {}");
        run(&RequireVersion::new(150, None), &mut unit).unwrap();
        assert_eq!(unit.version.as_ref().map(|v| v.number), Some(150));
    }

    #[test]
    fn test_mark_outputs_skips_claimed_locations() {
        let mut unit = unit(
            "out vec4 color;\nlayout(location = 0) out vec4 normal;\nflat out int id;\nin vec2 uv;\nvoid main() {}",
        );
        run(&MarkOutputs, &mut unit).unwrap();
        let dump = unit.dump();
        assert!(dump.contains("(decl (type layout(location=1) out vec4) (var color))"), "{}", dump);
        assert!(dump.contains("(decl (type layout(location=0) out vec4) (var normal))"), "{}", dump);
        assert!(dump.contains("(decl (type layout(location=2) flat out int) (var id))"), "{}", dump);
        assert!(dump.contains("(decl (type in vec2) (var uv))"), "{}", dump);
    }
}
