use std::collections::{BTreeMap, BTreeSet};

use glint_core::GlintResult;

use super::{adopt_fragment_metadata, insert_declarations, insertion_point, parse_snippet, Transform};
use crate::ast::ProgramUnit;
use crate::symbols::{bound_names, declared_names, free_references, rename_declared, rename_references, RewriteContext};

/// Merge library code into the program.
///
/// Every global the library declares that already exists in the program is
/// renamed to `name_N`, where `N` comes from the context's rename counter.
/// References inside the library follow the rename; the program's own
/// declarations and references are never touched.
#[derive(Debug, Clone)]
pub struct Merge {
    source: String,
    label: Option<String>,
}

impl Merge {
    pub fn new(source: String, label: Option<String>) -> Self {
        Self { source, label }
    }
}

impl Transform for Merge {
    fn name(&self) -> &str {
        "merge"
    }

    fn apply(&self, unit: &mut ProgramUnit, ctx: &mut RewriteContext) -> GlintResult<()> {
        let label = match &self.label {
            Some(label) => format!("<merge:{}>", label),
            None => "<merge>".to_string(),
        };
        let fragment = parse_snippet(unit, &self.source, &label)?;

        let mut declared = Vec::new();
        for &id in &fragment.declarations {
            for (name, _) in declared_names(&unit.ast, id) {
                if !declared.contains(&name) {
                    declared.push(name);
                }
            }
        }
        // a fresh name must not be captured by anything the library binds,
        // locals and parameters included
        let mut reserved: BTreeSet<String> = declared.iter().cloned().collect();
        for &id in &fragment.declarations {
            reserved.extend(bound_names(&unit.ast, id));
            reserved.extend(free_references(&mut unit.ast, id).into_iter().map(|r| r.name));
        }

        let colliding: Vec<String> = declared
            .iter()
            .filter(|name| ctx.symbols.contains(name.as_str()))
            .cloned()
            .collect();
        let mut renames = BTreeMap::new();
        for name in colliding {
            let fresh = ctx.fresh_name(&name, &reserved);
            tracing::debug!("{}: renaming colliding '{}' to '{}'", label, name, fresh);
            reserved.insert(fresh.clone());
            ctx.renames.push((name.clone(), fresh.clone()));
            renames.insert(name.clone(), fresh);
        }

        if !renames.is_empty() {
            for &id in &fragment.declarations {
                rename_declared(&mut unit.ast, id, &renames);
                rename_references(&mut unit.ast, id, &renames);
            }
        }

        let at = insertion_point(unit);
        adopt_fragment_metadata(unit, &fragment);
        insert_declarations(unit, at, fragment.declarations)
    }
}
