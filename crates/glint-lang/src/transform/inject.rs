use glint_core::GlintResult;

use super::{adopt_fragment_metadata, insert_declarations, insertion_point, parse_snippet, Transform};
use crate::ast::ProgramUnit;
use crate::symbols::{declared_names, RewriteContext};

/// Insert declarations (uniforms, parameter blocks) right before the first
/// function definition.
///
/// Injected names must be new; a clash is an error rather than a silent
/// shadow. Use [`super::Merge`] for library code that may collide.
#[derive(Debug, Clone)]
pub struct Inject {
    source: String,
}

impl Inject {
    pub fn new(source: String) -> Self {
        Self { source }
    }
}

impl Transform for Inject {
    fn name(&self) -> &str {
        "inject"
    }

    fn apply(&self, unit: &mut ProgramUnit, ctx: &mut RewriteContext) -> GlintResult<()> {
        let fragment = parse_snippet(unit, &self.source, "<inject>")?;
        for &id in &fragment.declarations {
            for (name, kind) in declared_names(&unit.ast, id) {
                if let Some(existing) = ctx.symbols.lookup(&name).first() {
                    let line = unit.ast.span(existing.node).line;
                    return Err(unit.ast.transform_error(
                        id,
                        format!("injected '{}' collides with the declaration on line {}", name, line),
                    ));
                }
                ctx.symbols.declare(name, kind, id);
            }
        }
        let at = insertion_point(unit);
        tracing::debug!(
            "injecting {} declaration(s) at position {}",
            fragment.declarations.len(),
            at
        );
        adopt_fragment_metadata(unit, &fragment);
        insert_declarations(unit, at, fragment.declarations)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::unit;
    use super::*;
    use glint_core::{GlintError, TargetProfile};

    fn inject(unit: &mut ProgramUnit, source: &str) -> GlintResult<()> {
        let mut ctx = RewriteContext::new(TargetProfile::Glsl330);
        ctx.refresh(unit);
        Inject::new(source.into()).apply(unit, &mut ctx)
    }

    #[test]
    fn test_inserts_before_first_function() {
        let mut unit = unit("uniform float a;\nfloat f() { return a; }\nvoid main() {}");
        inject(&mut unit, "uniform vec4 injectedColor;\nuniform float gain;").unwrap();
        assert_eq!(
            unit.dump(),
            "(unit (decl (type uniform float) (var a)) \
             (decl (type uniform vec4) (var injectedColor)) \
             (decl (type uniform float) (var gain)) \
             (function (type float) f (params) (block (return a))) \
             (function (type void) main (params) (block)))"
        );
        unit.check_well_formed().unwrap();
    }

    #[test]
    fn test_collision_is_rejected() {
        let mut unit = unit("uniform float a;\nvoid main() {}");
        let err = inject(&mut unit, "uniform vec2 a;").unwrap_err();
        assert!(matches!(err, GlintError::Transform { .. }));
    }

    #[test]
    fn test_duplicate_within_snippet_is_rejected() {
        let mut unit = unit("void main() {}");
        assert!(inject(&mut unit, "uniform float k;\nuniform float k;").is_err());
    }

    #[test]
    fn test_snippet_directives_are_adopted() {
        let mut unit = unit("void main() {}");
        inject(&mut unit, "#extension GL_ARB_gpu_shader_fp64 : enable\nuniform double d;").unwrap();
        assert_eq!(unit.directives, vec!["extension GL_ARB_gpu_shader_fp64 : enable".to_string()]);
    }
}
