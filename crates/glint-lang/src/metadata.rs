//! Interface metadata handed to the host along with emitted source.

use serde::Serialize;

use glint_core::GlintResult;

use crate::ast::*;
use crate::emitter::{expression_text, type_text};
use crate::preprocessor::PreprocessHints;

/// A uniform the host must bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniformInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<u32>,
    /// Enclosing uniform block, for block members.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

/// A global shader input (`in` / `attribute`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShaderMetadata {
    pub uniforms: Vec<UniformInfo>,
    pub attributes: Vec<AttributeInfo>,
    pub required_extensions: Vec<String>,
}

impl ShaderMetadata {
    /// Every name a uniform can be looked up by, block names included.
    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms
            .iter()
            .flat_map(|u| std::iter::once(u.name.as_str()).chain(u.block.as_deref()))
    }
}

pub(crate) fn layout_u32(ast: &Ast, qualifiers: &[Qualifier], name: &str) -> Option<u32> {
    layout_items(qualifiers)
        .filter(|item| item.name == name)
        .find_map(|item| match ast.kind(item.value?) {
            NodeKind::Literal(literal) => literal.as_u32(),
            _ => None,
        })
}

fn array_suffix(ast: &Ast, array: &Option<ArraySpec>) -> GlintResult<String> {
    let mut out = String::new();
    if let Some(array) = array {
        for dim in &array.dims {
            match dim {
                Some(size) => out.push_str(&format!("[{}]", expression_text(ast, *size)?)),
                None => out.push_str("[]"),
            }
        }
    }
    Ok(out)
}

/// Type text for metadata: struct types by name, arrays spelled out.
fn declared_type(ast: &Ast, specifier: &TypeSpecifier, array: &Option<ArraySpec>) -> GlintResult<String> {
    let base = match &specifier.name {
        TypeName::Struct(body) => {
            let name = body.name.clone().unwrap_or_else(|| "struct".to_string());
            format!("{}{}", name, array_suffix(ast, &specifier.array)?)
        }
        _ => type_text(ast, specifier)?,
    };
    Ok(format!("{}{}", base, array_suffix(ast, array)?))
}

fn extension_name(directive: &str) -> Option<&str> {
    let rest = directive.strip_prefix("extension")?;
    let (name, behavior) = rest.split_once(':')?;
    match behavior.trim() {
        "disable" => None,
        _ => Some(name.trim()),
    }
}

/// Collect uniforms, inputs and extensions from the final program.
pub fn collect(unit: &ProgramUnit, hints: &PreprocessHints) -> GlintResult<ShaderMetadata> {
    let ast = &unit.ast;
    let mut metadata = ShaderMetadata::default();

    for &id in unit.declarations() {
        match ast.kind(id) {
            NodeKind::Declaration { ty, declarators } => {
                let uniform = ty.has_storage(StorageQualifier::Uniform);
                let input = ty.has_storage(StorageQualifier::In) || ty.has_storage(StorageQualifier::Attribute);
                if !uniform && !input {
                    continue;
                }
                for &declarator in declarators {
                    let NodeKind::Declarator { name, array, .. } = ast.kind(declarator) else {
                        continue;
                    };
                    let type_name = declared_type(ast, &ty.specifier, array)?;
                    if uniform {
                        metadata.uniforms.push(UniformInfo {
                            name: name.clone(),
                            ty: type_name,
                            binding: layout_u32(ast, &ty.qualifiers, "binding")
                                .or_else(|| unit.bindings.get(name).copied()),
                            block: None,
                        });
                    } else {
                        metadata.attributes.push(AttributeInfo {
                            name: name.clone(),
                            ty: type_name,
                            location: layout_u32(ast, &ty.qualifiers, "location"),
                        });
                    }
                }
            }
            NodeKind::InterfaceBlock {
                qualifiers,
                block_name,
                members,
                instance,
            } if qualifiers.contains(&Qualifier::Storage(StorageQualifier::Uniform)) => {
                let binding =
                    layout_u32(ast, qualifiers, "binding").or_else(|| unit.bindings.get(block_name).copied());
                for member in members {
                    for declarator in &member.declarators {
                        let name = match instance {
                            Some(instance) => format!("{}.{}", instance.name, declarator.name),
                            None => declarator.name.clone(),
                        };
                        metadata.uniforms.push(UniformInfo {
                            name,
                            ty: declared_type(ast, &member.ty.specifier, &declarator.array)?,
                            binding,
                            block: Some(block_name.clone()),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let from_unit = unit.directives.iter().filter_map(|d| extension_name(d));
    for extension in hints.required_extensions.iter().map(String::as_str).chain(from_unit) {
        if !metadata.required_extensions.iter().any(|e| e == extension) {
            metadata.required_extensions.push(extension.to_string());
        }
    }
    Ok(metadata)
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

    #[test]
    fn test_uniforms_and_inputs() {
        let unit = unit(
            "uniform float a[4];\nlayout(binding = 3) uniform sampler2D tex;\nuniform mat4 mvp, model;\n\
             layout(location = 1) in vec3 normal;\nattribute vec2 uv;\nout vec4 color;\nconst float k = 1.0;",
        );
        let metadata = collect(&unit, &PreprocessHints::default()).unwrap();
        let uniforms: Vec<_> = metadata
            .uniforms
            .iter()
            .map(|u| (u.name.as_str(), u.ty.as_str(), u.binding))
            .collect();
        assert_eq!(
            uniforms,
            vec![
                ("a", "float[4]", None),
                ("tex", "sampler2D", Some(3)),
                ("mvp", "mat4", None),
                ("model", "mat4", None),
            ]
        );
        assert_eq!(
            metadata.attributes,
            vec![
                AttributeInfo {
                    name: "normal".into(),
                    ty: "vec3".into(),
                    location: Some(1)
                },
                AttributeInfo {
                    name: "uv".into(),
                    ty: "vec2".into(),
                    location: None
                },
            ]
        );
    }

    #[test]
    fn test_block_members() {
        let unit = unit(
            "layout(std140, binding = 2) uniform Params { vec4 tint; float w[2]; } params;\n\
             uniform Globals { float time; };",
        );
        let metadata = collect(&unit, &PreprocessHints::default()).unwrap();
        let names: Vec<_> = metadata.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["params.tint", "params.w", "time"]);
        assert_eq!(metadata.uniforms[1].ty, "float[2]");
        assert_eq!(metadata.uniforms[0].binding, Some(2));
        assert_eq!(metadata.uniforms[2].block.as_deref(), Some("Globals"));
        assert!(metadata.uniform_names().any(|n| n == "Params"));
    }

    #[test]
    fn test_lifted_bindings_are_reported() {
        let mut unit = unit("uniform sampler2D tex;\nuniform Params { vec4 tint; };\nuniform float plain;");
        unit.bindings.insert("tex".into(), 4);
        unit.bindings.insert("Params".into(), 1);
        let metadata = collect(&unit, &PreprocessHints::default()).unwrap();
        let bindings: Vec<_> = metadata.uniforms.iter().map(|u| (u.name.as_str(), u.binding)).collect();
        assert_eq!(bindings, vec![("tex", Some(4)), ("tint", Some(1)), ("plain", None)]);
    }

    #[test]
    fn test_extensions_merge_hints_and_directives() {
        let mut unit = unit("void main() {}");
        unit.add_directive("extension GL_ARB_b : enable");
        unit.add_directive("extension GL_ARB_c : disable");
        let hints = PreprocessHints {
            required_extensions: vec!["GL_ARB_a".into(), "GL_ARB_b".into()],
            uniform_candidates: Vec::new(),
        };
        let metadata = collect(&unit, &hints).unwrap();
        assert_eq!(metadata.required_extensions, vec!["GL_ARB_a", "GL_ARB_b"]);
    }

    #[test]
    fn test_serializes_type_field() {
        let info = UniformInfo {
            name: "a".into(),
            ty: "float[4]".into(),
            binding: None,
            block: None,
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"name":"a","type":"float[4]"}"#
        );
    }
}
