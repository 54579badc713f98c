//! Structural rewrite passes.
//!
//! Each [`Transform`] is built from a [`TransformSpec`] and runs as one full
//! pass over the program. Passes share nothing but the [`RewriteContext`]
//! handed from one to the next. The tree is checked for well-formedness
//! after every pass, so a broken rewrite fails before the emitter sees it.

mod hooks;
mod inject;
mod merge;
mod strip;

pub use hooks::{FunctionHook, MarkOutputs, RequireVersion};
pub use inject::Inject;
pub use merge::Merge;
pub use strip::{implicit_requirements, StripCapabilities};

use glint_core::{GlintError, GlintResult, TransformSpec};

use crate::ast::{NodeId, NodeKind, ProgramUnit};
use crate::parser::{parse_fragment, parse_statements, Fragment};
use crate::symbols::RewriteContext;

/// One rewrite pass over a program unit.
pub trait Transform {
    fn name(&self) -> &str;

    fn apply(&self, unit: &mut ProgramUnit, ctx: &mut RewriteContext) -> GlintResult<()>;
}

/// Instantiate the pass described by `spec`.
pub fn build(spec: &TransformSpec) -> Box<dyn Transform> {
    match spec {
        TransformSpec::Inject { source } => Box::new(Inject::new(source.clone())),
        TransformSpec::Merge { source, label } => Box::new(Merge::new(source.clone(), label.clone())),
        TransformSpec::StripCapabilities { unsupported } => {
            Box::new(StripCapabilities::new(unsupported.clone()))
        }
        TransformSpec::FunctionHook {
            function,
            code,
            position,
            parameters,
        } => Box::new(FunctionHook::new(function.clone(), code.clone(), *position, *parameters)),
        TransformSpec::RequireVersion { version, profile } => {
            Box::new(RequireVersion::new(*version, profile.clone()))
        }
        TransformSpec::MarkOutputs => Box::new(MarkOutputs),
    }
}

/// Run `specs` in order, refreshing the symbol table before each pass.
pub fn run_transforms(
    unit: &mut ProgramUnit,
    specs: &[TransformSpec],
    ctx: &mut RewriteContext,
) -> GlintResult<()> {
    for (index, spec) in specs.iter().enumerate() {
        let transform = build(spec);
        ctx.refresh(unit);
        tracing::debug!("transform pass {}: {}", index, transform.name());
        transform.apply(unit, ctx)?;
        unit.check_well_formed()?;
    }
    ctx.refresh(unit);
    Ok(())
}

/// Position of the first function definition, or the end of the unit.
pub(crate) fn insertion_point(unit: &ProgramUnit) -> usize {
    unit.declarations()
        .iter()
        .position(|&id| matches!(unit.ast.kind(id), NodeKind::FunctionDefinition { .. }))
        .unwrap_or(unit.declarations().len())
}

/// Insert top-level declarations at `at`.
pub(crate) fn insert_declarations(unit: &mut ProgramUnit, at: usize, ids: Vec<NodeId>) -> GlintResult<()> {
    match unit.declarations_mut() {
        Some(declarations) => {
            let at = at.min(declarations.len());
            declarations.splice(at..at, ids);
            Ok(())
        }
        None => Err(unit
            .ast
            .transform_error(unit.root, "program root is not a translation unit")),
    }
}

/// Errors in caller-supplied snippets surface as transform failures.
fn snippet_error(label: &str, err: GlintError) -> GlintError {
    match err {
        GlintError::Lex { message, file, line, column }
        | GlintError::Parse { message, file, line, column } => {
            GlintError::transform(format!("in {label}: {message}"), file, line, column)
        }
        other => other,
    }
}

pub(crate) fn parse_snippet(unit: &mut ProgramUnit, source: &str, label: &str) -> GlintResult<Fragment> {
    parse_fragment(&mut unit.ast, source, label).map_err(|err| snippet_error(label, err))
}

pub(crate) fn parse_snippet_statements(
    unit: &mut ProgramUnit,
    source: &str,
    label: &str,
) -> GlintResult<Vec<NodeId>> {
    parse_statements(&mut unit.ast, source, label).map_err(|err| snippet_error(label, err))
}

/// Carry a fragment's directives and guards over into the unit.
pub(crate) fn adopt_fragment_metadata(unit: &mut ProgramUnit, fragment: &Fragment) {
    for directive in &fragment.directives {
        unit.add_directive(directive.clone());
    }
    for (id, caps) in &fragment.capability_guards {
        unit.capability_guards.insert(*id, caps.clone());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ast::ProgramUnit;
    use crate::lexer::Lexer;
    use crate::parser::parse_program;

    pub fn unit(src: &str) -> ProgramUnit {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        let outcome = parse_program(tokens, lexer.file_names(), true);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        outcome.unit
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::unit;
    use super::*;
    use glint_core::TargetProfile;

    #[test]
    fn test_passes_run_in_order() {
        let mut unit = unit("#version 150\nout vec4 color;\nvoid main() { color = vec4(1.0); }");
        let specs = vec![
            TransformSpec::Inject {
                source: "uniform vec4 tint;".into(),
            },
            TransformSpec::FunctionHook {
                function: "main".into(),
                code: "color *= tint;".into(),
                position: glint_core::HookPosition::Tail,
                parameters: None,
            },
        ];
        let mut ctx = RewriteContext::new(TargetProfile::Glsl150);
        run_transforms(&mut unit, &specs, &mut ctx).unwrap();
        assert!(ctx.symbols.contains("tint"));
        assert!(unit.dump().contains("(expr (*= color tint))"));
    }

    #[test]
    fn test_snippet_errors_are_transform_errors() {
        let mut unit = unit("void main() {}");
        let specs = vec![TransformSpec::Inject {
            source: "uniform vec4 ;".into(),
        }];
        let mut ctx = RewriteContext::new(TargetProfile::Glsl330);
        let err = run_transforms(&mut unit, &specs, &mut ctx).unwrap_err();
        assert!(matches!(err, GlintError::Transform { .. }), "{:?}", err);
    }

    #[test]
    fn test_insertion_into_non_unit_root_is_a_transform_error() {
        let mut unit = unit("uniform float a;\nvoid main() {}");
        unit.root = unit.declarations()[0];
        let err = insert_declarations(&mut unit, 0, Vec::new()).unwrap_err();
        assert_eq!(err.stage(), glint_core::Stage::Transform);
        assert!(err.to_string().contains("not a translation unit"), "{}", err);
    }

    #[test]
    fn test_insertion_point_without_functions() {
        let unit = unit("uniform float a;\nuniform float b;");
        assert_eq!(insertion_point(&unit), 2);
    }
}
