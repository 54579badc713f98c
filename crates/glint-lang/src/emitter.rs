//! GLSL emitter: arena AST → source text.
//!
//! Output depends only on the tree: four-space indentation, one statement
//! per line, parentheses exactly where operator precedence needs them.
//! Anything the emitter cannot place is an internal defect reported as
//! [`GlintError::Emit`].

use glint_core::{GlintError, GlintResult};

use crate::ast::*;

const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGNMENT: u8 = 2;
const PREC_TERNARY: u8 = 3;
const PREC_LOGICAL_OR: u8 = 4;
const PREC_PREFIX: u8 = 15;
const PREC_POSTFIX: u8 = 16;
const PREC_PRIMARY: u8 = 17;

pub struct Emitter<'a> {
    ast: &'a Ast,
    indent_level: usize,
    output: String,
}

impl<'a> Emitter<'a> {
    /// Emit a whole program unit.
    pub fn emit(unit: &ProgramUnit) -> GlintResult<String> {
        let mut emitter = Emitter {
            ast: &unit.ast,
            indent_level: 0,
            output: String::new(),
        };
        emitter.emit_unit(unit)?;
        Ok(emitter.output)
    }

    fn new(ast: &'a Ast) -> Self {
        Emitter {
            ast,
            indent_level: 0,
            output: String::new(),
        }
    }

    fn indent(&mut self) {
        self.output.push_str(&"    ".repeat(self.indent_level));
    }

    fn push_line(&mut self, text: &str) {
        self.indent();
        self.output.push_str(text);
        self.output.push('\n');
    }

    /// Start a line, or continue the previous one (`} else`).
    fn open_line(&mut self, text: &str, inline: bool) {
        if inline {
            if self.output.ends_with('\n') {
                self.output.pop();
            }
            self.output.push(' ');
        } else {
            self.indent();
        }
        self.output.push_str(text);
    }

    fn misplaced(&self, id: NodeId, expected: &str) -> GlintError {
        GlintError::Emit(format!(
            "node {} ({:?}) cannot be emitted as {}",
            id,
            self.ast.kind(id).category(),
            expected
        ))
    }

    fn emit_unit(&mut self, unit: &ProgramUnit) -> GlintResult<()> {
        if let Some(version) = &unit.version {
            self.push_line(&version.to_string());
        }
        for directive in &unit.directives {
            self.push_line(&format!("#{}", directive));
        }
        let declarations = unit.declarations();
        if !self.output.is_empty() && !declarations.is_empty() {
            self.output.push('\n');
        }
        let mut previous_was_function = false;
        for (i, &id) in declarations.iter().enumerate() {
            let is_function = matches!(self.ast.kind(id), NodeKind::FunctionDefinition { .. });
            if i > 0 && (is_function || previous_was_function) {
                self.output.push('\n');
            }
            self.emit_external(id)?;
            previous_was_function = is_function;
        }
        Ok(())
    }

    fn emit_external(&mut self, id: NodeId) -> GlintResult<()> {
        match self.ast.kind(id) {
            NodeKind::FunctionDefinition { prototype, body } => {
                let header = self.prototype_text(prototype)?;
                self.emit_clause(&header, *body, false)
            }
            _ => {
                let text = self.declaration_text(id)?;
                self.push_line(&format!("{};", text));
                Ok(())
            }
        }
    }

    // ── Types and declarations ──────────────────────────────────────

    fn array_text(&self, array: &Option<ArraySpec>) -> GlintResult<String> {
        let mut out = String::new();
        if let Some(array) = array {
            for dim in &array.dims {
                match dim {
                    Some(size) => out.push_str(&format!("[{}]", self.expr(*size, PREC_SEQUENCE)?)),
                    None => out.push_str("[]"),
                }
            }
        }
        Ok(out)
    }

    fn qualifiers_text(&self, qualifiers: &[Qualifier]) -> GlintResult<String> {
        let mut words = Vec::with_capacity(qualifiers.len());
        for qualifier in qualifiers {
            match qualifier {
                Qualifier::Layout(items) => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items {
                        match item.value {
                            Some(value) => parts.push(format!(
                                "{} = {}",
                                item.name,
                                self.expr(value, PREC_ASSIGNMENT)?
                            )),
                            None => parts.push(item.name.clone()),
                        }
                    }
                    words.push(format!("layout({})", parts.join(", ")));
                }
                Qualifier::Subroutine(types) if !types.is_empty() => {
                    words.push(format!("subroutine({})", types.join(", ")))
                }
                other => words.push(other.keyword().unwrap_or_default().to_string()),
            }
        }
        Ok(words.join(" "))
    }

    fn members_text(&self, members: &[StructMember]) -> GlintResult<String> {
        let inner = "    ".repeat(self.indent_level + 1);
        let mut out = String::from("{\n");
        for member in members {
            let mut names = Vec::with_capacity(member.declarators.len());
            for declarator in &member.declarators {
                names.push(format!("{}{}", declarator.name, self.array_text(&declarator.array)?));
            }
            out.push_str(&format!(
                "{}{} {};\n",
                inner,
                self.full_type_text(&member.ty)?,
                names.join(", ")
            ));
        }
        out.push_str(&"    ".repeat(self.indent_level));
        out.push('}');
        Ok(out)
    }

    fn specifier_text(&self, specifier: &TypeSpecifier) -> GlintResult<String> {
        let name = match &specifier.name {
            TypeName::Builtin(name) | TypeName::Named(name) => name.clone(),
            TypeName::Struct(body) => match &body.name {
                Some(name) => format!("struct {} {}", name, self.members_text(&body.members)?),
                None => format!("struct {}", self.members_text(&body.members)?),
            },
        };
        Ok(format!("{}{}", name, self.array_text(&specifier.array)?))
    }

    fn full_type_text(&self, ty: &FullType) -> GlintResult<String> {
        let specifier = self.specifier_text(&ty.specifier)?;
        if ty.qualifiers.is_empty() {
            return Ok(specifier);
        }
        Ok(format!("{} {}", self.qualifiers_text(&ty.qualifiers)?, specifier))
    }

    fn prototype_text(&self, prototype: &Prototype) -> GlintResult<String> {
        let mut params = Vec::with_capacity(prototype.params.len());
        for param in &prototype.params {
            let mut text = self.full_type_text(&param.ty)?;
            if let Some(name) = &param.name {
                text.push(' ');
                text.push_str(name);
            }
            text.push_str(&self.array_text(&param.array)?);
            params.push(text);
        }
        Ok(format!(
            "{} {}({})",
            self.full_type_text(&prototype.return_type)?,
            prototype.name,
            params.join(", ")
        ))
    }

    /// A declaration without its trailing `;`.
    fn declaration_text(&self, id: NodeId) -> GlintResult<String> {
        match self.ast.kind(id) {
            NodeKind::Declaration { ty, declarators } => {
                let mut text = self.full_type_text(ty)?;
                for (i, &declarator) in declarators.iter().enumerate() {
                    text.push_str(if i == 0 { " " } else { ", " });
                    text.push_str(&self.declarator_text(declarator)?);
                }
                Ok(text)
            }
            NodeKind::FunctionPrototype { prototype } => self.prototype_text(prototype),
            NodeKind::InterfaceBlock {
                qualifiers,
                block_name,
                members,
                instance,
            } => {
                let mut text = format!(
                    "{} {} {}",
                    self.qualifiers_text(qualifiers)?,
                    block_name,
                    self.members_text(members)?
                );
                if let Some(instance) = instance {
                    text.push(' ');
                    text.push_str(&instance.name);
                    text.push_str(&self.array_text(&instance.array)?);
                }
                Ok(text)
            }
            NodeKind::PrecisionDeclaration { precision, ty } => Ok(format!(
                "precision {} {}",
                precision.as_str(),
                self.specifier_text(ty)?
            )),
            NodeKind::QualifierDeclaration { qualifiers, names } => {
                let qualifiers = self.qualifiers_text(qualifiers)?;
                if names.is_empty() {
                    Ok(qualifiers)
                } else {
                    Ok(format!("{} {}", qualifiers, names.join(", ")))
                }
            }
            _ => Err(self.misplaced(id, "a declaration")),
        }
    }

    fn declarator_text(&self, id: NodeId) -> GlintResult<String> {
        let NodeKind::Declarator {
            name,
            array,
            initializer,
        } = self.ast.kind(id)
        else {
            return Err(self.misplaced(id, "a declarator"));
        };
        let mut text = format!("{}{}", name, self.array_text(array)?);
        if let Some(init) = initializer {
            text.push_str(" = ");
            text.push_str(&self.expr(*init, PREC_ASSIGNMENT)?);
        }
        Ok(text)
    }

    // ── Statements ──────────────────────────────────────────────────

    /// `header {` + block, or `header` + one indented statement.
    fn emit_clause(&mut self, header: &str, body: NodeId, inline: bool) -> GlintResult<()> {
        match self.ast.kind(body) {
            NodeKind::Compound { statements } => {
                self.open_line(header, inline);
                self.output.push_str(" {\n");
                self.indent_level += 1;
                for &statement in statements {
                    self.emit_statement(statement)?;
                }
                self.indent_level -= 1;
                self.push_line("}");
            }
            _ => {
                self.open_line(header, inline);
                self.output.push('\n');
                self.indent_level += 1;
                self.emit_statement(body)?;
                self.indent_level -= 1;
            }
        }
        Ok(())
    }

    /// Statements that fit on one line, with their `;`.
    fn simple_statement(&self, id: NodeId) -> GlintResult<String> {
        match self.ast.kind(id) {
            NodeKind::DeclarationStatement { declaration } => {
                Ok(format!("{};", self.declaration_text(*declaration)?))
            }
            NodeKind::ExpressionStatement { expression } => match expression {
                Some(expression) => Ok(format!("{};", self.expr(*expression, PREC_SEQUENCE)?)),
                None => Ok(";".to_string()),
            },
            NodeKind::Return { value } => match value {
                Some(value) => Ok(format!("return {};", self.expr(*value, PREC_SEQUENCE)?)),
                None => Ok("return;".to_string()),
            },
            NodeKind::Jump(JumpKind::Break) => Ok("break;".to_string()),
            NodeKind::Jump(JumpKind::Continue) => Ok("continue;".to_string()),
            NodeKind::Jump(JumpKind::Discard) => Ok("discard;".to_string()),
            NodeKind::CaseLabel { value: Some(value) } => {
                Ok(format!("case {}:", self.expr(*value, PREC_SEQUENCE)?))
            }
            NodeKind::CaseLabel { value: None } => Ok("default:".to_string()),
            _ => Err(self.misplaced(id, "a simple statement")),
        }
    }

    fn emit_statement(&mut self, id: NodeId) -> GlintResult<()> {
        self.emit_statement_inline(id, false)
    }

    fn emit_statement_inline(&mut self, id: NodeId, inline: bool) -> GlintResult<()> {
        match self.ast.kind(id) {
            NodeKind::Compound { statements } => {
                self.open_line("{\n", inline);
                self.indent_level += 1;
                for &statement in statements {
                    self.emit_statement(statement)?;
                }
                self.indent_level -= 1;
                self.push_line("}");
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let header = format!("if ({})", self.expr(*condition, PREC_SEQUENCE)?);
                self.emit_clause(&header, *then_branch, inline)?;
                if let Some(else_branch) = else_branch {
                    let after_block = matches!(self.ast.kind(*then_branch), NodeKind::Compound { .. });
                    match self.ast.kind(*else_branch) {
                        NodeKind::If { .. } => {
                            self.open_line("else", after_block);
                            self.emit_statement_inline(*else_branch, true)?;
                        }
                        _ => self.emit_clause("else", *else_branch, after_block)?,
                    }
                }
            }
            NodeKind::Switch { selector, body } => {
                let header = format!("switch ({})", self.expr(*selector, PREC_SEQUENCE)?);
                let NodeKind::Compound { statements } = self.ast.kind(*body) else {
                    return self.emit_clause(&header, *body, inline);
                };
                self.open_line(&header, inline);
                self.output.push_str(" {\n");
                self.indent_level += 1;
                for &statement in statements {
                    if matches!(self.ast.kind(statement), NodeKind::CaseLabel { .. }) {
                        self.emit_statement(statement)?;
                    } else {
                        self.indent_level += 1;
                        self.emit_statement(statement)?;
                        self.indent_level -= 1;
                    }
                }
                self.indent_level -= 1;
                self.push_line("}");
            }
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                let mut header = String::from("for (");
                match init {
                    Some(init) => header.push_str(&self.simple_statement(*init)?),
                    None => header.push(';'),
                }
                if let Some(condition) = condition {
                    header.push(' ');
                    header.push_str(&self.expr(*condition, PREC_SEQUENCE)?);
                }
                header.push(';');
                if let Some(step) = step {
                    header.push(' ');
                    header.push_str(&self.expr(*step, PREC_SEQUENCE)?);
                }
                header.push(')');
                self.emit_clause(&header, *body, inline)?;
            }
            NodeKind::While { condition, body } => {
                let header = format!("while ({})", self.expr(*condition, PREC_SEQUENCE)?);
                self.emit_clause(&header, *body, inline)?;
            }
            NodeKind::DoWhile { body, condition } => {
                self.emit_clause("do", *body, inline)?;
                let after_block = matches!(self.ast.kind(*body), NodeKind::Compound { .. });
                let tail = format!("while ({});\n", self.expr(*condition, PREC_SEQUENCE)?);
                self.open_line(&tail, after_block);
            }
            _ => {
                let text = self.simple_statement(id)?;
                self.open_line(&text, inline);
                self.output.push('\n');
            }
        }
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn precedence(&self, id: NodeId) -> u8 {
        match self.ast.kind(id) {
            NodeKind::Sequence { .. } => PREC_SEQUENCE,
            NodeKind::Assignment { .. } => PREC_ASSIGNMENT,
            NodeKind::Ternary { .. } => PREC_TERNARY,
            NodeKind::Binary { op, .. } => op.precedence(),
            NodeKind::Unary { .. } => PREC_PREFIX,
            NodeKind::Postfix { .. }
            | NodeKind::Call { .. }
            | NodeKind::MethodCall { .. }
            | NodeKind::Index { .. }
            | NodeKind::Member { .. } => PREC_POSTFIX,
            _ => PREC_PRIMARY,
        }
    }

    fn list(&self, ids: &[NodeId]) -> GlintResult<String> {
        let mut parts = Vec::with_capacity(ids.len());
        for &id in ids {
            parts.push(self.expr(id, PREC_ASSIGNMENT)?);
        }
        Ok(parts.join(", "))
    }

    /// Render `id`, parenthesized if it binds looser than `min`.
    fn expr(&self, id: NodeId, min: u8) -> GlintResult<String> {
        let text = match self.ast.kind(id) {
            NodeKind::Literal(literal) => literal.text.clone(),
            NodeKind::Identifier(name) => name.clone(),
            NodeKind::Sequence { expressions } => {
                let mut parts = Vec::with_capacity(expressions.len());
                for &expression in expressions {
                    parts.push(self.expr(expression, PREC_ASSIGNMENT)?);
                }
                parts.join(", ")
            }
            NodeKind::Assignment { op, target, value } => format!(
                "{} {} {}",
                self.expr(*target, PREC_PREFIX)?,
                op.as_str(),
                self.expr(*value, PREC_ASSIGNMENT)?
            ),
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => format!(
                "{} ? {} : {}",
                self.expr(*condition, PREC_LOGICAL_OR)?,
                self.expr(*then_expr, PREC_ASSIGNMENT)?,
                self.expr(*else_expr, PREC_TERNARY)?
            ),
            NodeKind::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                format!(
                    "{} {} {}",
                    self.expr(*lhs, p)?,
                    op.as_str(),
                    self.expr(*rhs, p + 1)?
                )
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.expr(*operand, PREC_PREFIX)?;
                let op = op.as_str();
                // `- -x` must not become `--x`
                if op.ends_with(['+', '-']) && operand.starts_with(&op[op.len() - 1..]) {
                    format!("{} {}", op, operand)
                } else {
                    format!("{}{}", op, operand)
                }
            }
            NodeKind::Postfix { op, operand } => {
                format!("{}{}", self.expr(*operand, PREC_POSTFIX)?, op.as_str())
            }
            NodeKind::Call { callee, args } => {
                let callee = match callee {
                    Callee::Function(name) => name.clone(),
                    Callee::Constructor(specifier) => self.specifier_text(specifier)?,
                };
                format!("{}({})", callee, self.list(args)?)
            }
            NodeKind::MethodCall {
                receiver,
                method,
                args,
            } => format!(
                "{}.{}({})",
                self.expr(*receiver, PREC_POSTFIX)?,
                method,
                self.list(args)?
            ),
            NodeKind::Index { base, index } => format!(
                "{}[{}]",
                self.expr(*base, PREC_POSTFIX)?,
                self.expr(*index, PREC_SEQUENCE)?
            ),
            NodeKind::Member { base, field } => {
                format!("{}.{}", self.expr(*base, PREC_POSTFIX)?, field)
            }
            NodeKind::InitializerList { elements } => format!("{{{}}}", self.list(elements)?),
            _ => return Err(self.misplaced(id, "an expression")),
        };
        if self.precedence(id) < min {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }
}

/// Render one expression subtree.
pub fn expression_text(ast: &Ast, id: NodeId) -> GlintResult<String> {
    Emitter::new(ast).expr(id, PREC_SEQUENCE)
}

/// Render a type specifier, array suffix included.
pub fn type_text(ast: &Ast, specifier: &TypeSpecifier) -> GlintResult<String> {
    Emitter::new(ast).specifier_text(specifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::parse_program;

    fn parse(src: &str) -> ProgramUnit {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize().unwrap();
        let outcome = parse_program(tokens, lexer.file_names(), true);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        outcome.unit
    }

    fn emit(src: &str) -> String {
        Emitter::emit(&parse(src)).unwrap()
    }

    fn assert_round_trip(src: &str) {
        let first = parse(src);
        let text = Emitter::emit(&first).unwrap();
        let second = parse(&text);
        assert_eq!(first.dump(), second.dump(), "emitted:\n{}", text);
        assert_eq!(Emitter::emit(&second).unwrap(), text);
    }

    #[test]
    fn test_layout_of_a_small_shader() {
        let out = emit(
            "#version 330 core\n#extension GL_ARB_foo : enable\nuniform float a[4];in vec2 uv;\n\
             out vec4 color;void main(){if(a[0]>0.5){color=vec4(uv,0.0,1.0);}else color=vec4(0.0);}",
        );
        assert_eq!(
            out,
            "#version 330 core\n\
             #extension GL_ARB_foo : enable\n\
             \n\
             uniform float a[4];\n\
             in vec2 uv;\n\
             out vec4 color;\n\
             \n\
             void main() {\n\
             \x20   if (a[0] > 0.5) {\n\
             \x20       color = vec4(uv, 0.0, 1.0);\n\
             \x20   } else\n\
             \x20       color = vec4(0.0);\n\
             }\n"
        );
    }

    #[test]
    fn test_parentheses_follow_precedence() {
        let unit = parse("void main() { x = (a + b) * c - (d - e) + (f ? g : h) + -(-y) + (i, j); }");
        let out = Emitter::emit(&unit).unwrap();
        assert!(
            out.contains("x = (a + b) * c - (d - e) + (f ? g : h) + - -y + (i, j);"),
            "{}",
            out
        );
    }

    #[test]
    fn test_declarations() {
        let out = emit(
            "precision mediump float;\nlayout(std140, binding = 1) uniform Params { vec4 tint; float k[2]; } params;\n\
             struct Light { vec3 color; float radius; };\ninvariant gl_Position;\nconst int N = 3, M[2] = int[](1, 2);\n\
             vec3 shade(in Light l, float w[2]);",
        );
        assert_eq!(
            out,
            "precision mediump float;\n\
             layout(std140, binding = 1) uniform Params {\n\
             \x20   vec4 tint;\n\
             \x20   float k[2];\n\
             } params;\n\
             struct Light {\n\
             \x20   vec3 color;\n\
             \x20   float radius;\n\
             };\n\
             invariant gl_Position;\n\
             const int N = 3, M[2] = int[](1, 2);\n\
             vec3 shade(in Light l, float w[2]);\n"
        );
    }

    #[test]
    fn test_control_flow_round_trip() {
        assert_round_trip(
            "void main() {\n\
               for (int i = 0; i < 4; ++i) { if (i == 2) continue; else if (i > 2) break; }\n\
               for (;;) { discard; }\n\
               int k = 0; while (k < 3) k++;\n\
               do { k -= 1; } while (k > 0);\n\
               switch (k) { case 0: k = 1; break; default: k = 2; }\n\
               { float inner = 1.0; }\n\
               float v[3] = float[3](1.0, 2.0, 3.0); float s = v.length() > 2 ? v[1] : v[0];\n\
               bool b = !(k < 1) && (k | 2) != 0;\n\
             }",
        );
    }

    #[test]
    fn test_declaration_round_trip() {
        assert_round_trip(
            "#version 450\nlayout(local_size_x = 8, local_size_y = 8) in;\n\
             layout(std430, binding = 0) buffer Data { float values[]; };\n\
             struct S { vec2 p; } s = S(vec2(0.0));\nflat out int id;\nvec4 f(void);\n\
             vec4 f() { return vec4(1.0); }",
        );
    }

    #[test]
    fn test_misplaced_node_is_emit_error() {
        let mut unit = parse("void main() {}");
        let stray = unit.ast.alloc(NodeKind::Jump(JumpKind::Break), crate::lexer::Span::default());
        if let Some(declarations) = unit.declarations_mut() {
            declarations.push(stray);
        }
        assert!(matches!(Emitter::emit(&unit), Err(GlintError::Emit(_))));
    }
}
