//! GLSL parser: tokens → arena AST.
//!
//! Recursive descent for declarations and statements, precedence climbing
//! for binary expressions. In lenient mode a failed statement or external
//! declaration is recorded and the parser skips to the next `;` or the end
//! of the enclosing block before continuing.

use std::collections::BTreeMap;

use glint_core::{Capability, GlintError, GlintResult};

use crate::ast::*;
use crate::lexer::{Lexer, Span, Token, TokenKind};

/// Deepest statement, expression or initializer nesting accepted.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Result of parsing a translation unit: the (possibly partial) program
/// plus every syntax error collected on the way.
#[derive(Debug)]
pub struct ParseOutcome {
    pub unit: ProgramUnit,
    pub errors: Vec<GlintError>,
}

impl ParseOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Declarations parsed from a snippet into an existing arena.
#[derive(Debug, Default)]
pub struct Fragment {
    pub declarations: Vec<NodeId>,
    pub directives: Vec<String>,
    pub capability_guards: BTreeMap<NodeId, Vec<Capability>>,
}

/// Parse a whole token stream into a fresh program unit.
///
/// `files` names the file ids carried by the token spans.
pub fn parse_program(tokens: Vec<Token>, files: Vec<String>, strict: bool) -> ParseOutcome {
    let mut unit = ProgramUnit::new(Ast::new());
    let mut parser = Parser::new(&mut unit.ast, tokens, files).strict(strict);
    let declarations = parser.parse_translation_unit();
    let Parser {
        version,
        directives,
        guards,
        errors,
        ..
    } = parser;
    unit.version = version;
    unit.directives = directives;
    unit.capability_guards = guards;
    if let Some(slot) = unit.declarations_mut() {
        *slot = declarations;
    }
    ParseOutcome { unit, errors }
}

/// Parse GLSL source text of external declarations into `ast`.
///
/// Snippets are parsed strictly: the first error is returned.
pub fn parse_fragment(ast: &mut Ast, source: &str, name: &str) -> GlintResult<Fragment> {
    let mut lexer = Lexer::new(source).with_file_name(name);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(ast, tokens, lexer.file_names()).strict(true);
    let declarations = parser.parse_translation_unit();
    if let Some(err) = parser.errors.into_iter().next() {
        return Err(err);
    }
    if parser.version.is_some() {
        return Err(GlintError::parse("#version is not allowed in a snippet", name, 1, 1));
    }
    Ok(Fragment {
        declarations,
        directives: parser.directives,
        capability_guards: parser.guards,
    })
}

/// Parse GLSL source text of statements (a function body without braces)
/// into `ast`.
pub fn parse_statements(ast: &mut Ast, source: &str, name: &str) -> GlintResult<Vec<NodeId>> {
    let mut lexer = Lexer::new(source).with_file_name(name);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(ast, tokens, lexer.file_names()).strict(true);
    let mut statements = Vec::new();
    while parser.peek() != &TokenKind::Eof {
        statements.push(parser.parse_statement()?);
    }
    Ok(statements)
}

/// The GLSL parser.
pub struct Parser<'a> {
    ast: &'a mut Ast,
    tokens: Vec<Token>,
    pos: usize,
    strict: bool,
    errors: Vec<GlintError>,
    version: Option<VersionDirective>,
    directives: Vec<String>,
    pending_guard: Option<Vec<Capability>>,
    guards: BTreeMap<NodeId, Vec<Capability>>,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Parser allocating into `ast`. Span file ids are rebased onto the
    /// arena's file table.
    pub fn new(ast: &'a mut Ast, mut tokens: Vec<Token>, files: Vec<String>) -> Self {
        let base = ast.files().len() as u32;
        for file in files {
            ast.add_file(file);
        }
        for token in &mut tokens {
            token.span.file += base;
        }
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, span));
        }
        Self {
            ast,
            tokens,
            pos: 0,
            strict: false,
            errors: Vec::new(),
            version: None,
            directives: Vec::new(),
            pending_guard: None,
            guards: BTreeMap::new(),
            depth: 0,
        }
    }

    /// Abort on the first error instead of recovering.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    // ── Token access ────────────────────────────────────────────────

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        let token = self
            .tokens
            .get(index)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, Span::default()));
        if self.pos < self.tokens.len() && token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> GlintError {
        GlintError::parse(message, self.ast.file_name(span.file), span.line, span.column)
    }

    fn unexpected(&self, expected: &str) -> GlintError {
        let message = match self.peek() {
            TokenKind::Error(text) => format!("expected {}, got invalid token '{}'", expected, text),
            other => format!("expected {}, got '{}'", expected, other),
        };
        self.error_at(message, self.current_span())
    }

    fn expect(&mut self, expected: &TokenKind) -> GlintResult<Token> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{}'", expected)))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> GlintResult<(String, Span)> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.ast.alloc(kind, span)
    }

    /// Enter one more level of nesting. Callers restore `depth` on every
    /// exit path, errors included.
    fn descend(&mut self) -> GlintResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_at(
                format!("nesting exceeds {} levels", MAX_NESTING_DEPTH),
                self.current_span(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    // ── Recovery ────────────────────────────────────────────────────

    /// Record `err` and resynchronize, or hand it back in strict mode.
    fn recover(&mut self, err: GlintError) -> GlintResult<()> {
        if self.strict {
            return Err(err);
        }
        self.errors.push(err);
        self.synchronize();
        Ok(())
    }

    /// Skip past the next `;` or to the end of the current block.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ── Directives ──────────────────────────────────────────────────

    /// Consume a directive token. Malformed directives are recorded
    /// without skipping the following declaration.
    fn directive(&mut self) -> GlintResult<()> {
        match self.read_directive() {
            Err(err) if !self.strict => {
                self.errors.push(err);
                Ok(())
            }
            other => other,
        }
    }

    fn read_directive(&mut self) -> GlintResult<()> {
        let token = self.advance();
        let TokenKind::Directive(text) = token.kind else {
            return Ok(());
        };
        let mut words = text.split_whitespace();
        match words.next() {
            Some("version") => {
                if self.version.is_some() {
                    return Err(self.error_at("duplicate #version directive", token.span));
                }
                let number = words
                    .next()
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| self.error_at(format!("malformed #{}", text), token.span))?;
                self.version = Some(VersionDirective {
                    number,
                    profile: words.next().map(str::to_string),
                });
            }
            Some("pragma") => {
                let body = text["pragma".len()..].trim();
                match body.strip_prefix("capability") {
                    Some(list) => {
                        let capabilities = parse_capability_list(list)
                            .map_err(|message| self.error_at(message, token.span))?;
                        self.pending_guard
                            .get_or_insert_with(Vec::new)
                            .extend(capabilities);
                    }
                    None => self.directives.push(text),
                }
            }
            _ => self.directives.push(text),
        }
        Ok(())
    }

    // ── Declarations ────────────────────────────────────────────────

    fn parse_translation_unit(&mut self) -> Vec<NodeId> {
        let mut declarations = Vec::new();
        loop {
            let start = self.pos;
            let result = match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Directive(_) => self.directive().map(|_| None),
                _ => self.parse_external_declaration(),
            };
            match result {
                Ok(Some(id)) => {
                    if let Some(guard) = self.pending_guard.take() {
                        self.guards.insert(id, guard);
                    }
                    declarations.push(id);
                }
                Ok(None) => {}
                Err(err) => {
                    if let Err(err) = self.recover(err) {
                        self.errors.push(err);
                        break;
                    }
                    if self.pos == start {
                        self.advance();
                    }
                }
            }
        }
        declarations
    }

    /// One external declaration; `None` for a stray `;`.
    fn parse_external_declaration(&mut self) -> GlintResult<Option<NodeId>> {
        let span = self.current_span();
        if self.eat(&TokenKind::Semicolon) {
            return Ok(None);
        }
        if self.peek() == &TokenKind::Precision {
            return self.parse_precision().map(Some);
        }

        let qualifiers = self.parse_qualifiers()?;
        if !qualifiers.is_empty() {
            if self.eat(&TokenKind::Semicolon) {
                return Ok(Some(self.alloc(
                    NodeKind::QualifierDeclaration {
                        qualifiers,
                        names: Vec::new(),
                    },
                    span,
                )));
            }
            if let TokenKind::Identifier(_) = self.peek() {
                match self.peek_at(1) {
                    TokenKind::LeftBrace => return self.parse_interface_block(qualifiers, span).map(Some),
                    TokenKind::Semicolon | TokenKind::Comma => {
                        return self.parse_qualifier_declaration(qualifiers, span).map(Some)
                    }
                    _ => {}
                }
            }
        }

        let specifier = self.parse_type_specifier()?;
        let ty = FullType {
            qualifiers,
            specifier,
        };
        if self.peek() == &TokenKind::Semicolon && matches!(ty.specifier.name, TypeName::Struct(_)) {
            self.advance();
            return Ok(Some(self.alloc(
                NodeKind::Declaration {
                    ty,
                    declarators: Vec::new(),
                },
                span,
            )));
        }

        let (name, name_span) = self.expect_identifier("declaration name")?;
        if self.peek() == &TokenKind::LeftParen {
            let params = self.parse_parameters()?;
            let prototype = Prototype {
                return_type: ty,
                name,
                params,
            };
            if self.eat(&TokenKind::Semicolon) {
                return Ok(Some(self.alloc(NodeKind::FunctionPrototype { prototype }, span)));
            }
            let body = self.parse_compound()?;
            return Ok(Some(self.alloc(NodeKind::FunctionDefinition { prototype, body }, span)));
        }

        self.parse_declarators(ty, name, name_span, span).map(Some)
    }

    fn parse_precision(&mut self) -> GlintResult<NodeId> {
        let span = self.advance().span;
        let precision = match self.peek() {
            TokenKind::Qualifier(word) => Precision::from_keyword(word),
            _ => None,
        }
        .ok_or_else(|| self.unexpected("precision qualifier"))?;
        self.advance();
        let ty = self.parse_type_specifier()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(self.alloc(NodeKind::PrecisionDeclaration { precision, ty }, span))
    }

    fn parse_qualifier_declaration(&mut self, qualifiers: Vec<Qualifier>, span: Span) -> GlintResult<NodeId> {
        let mut names = vec![self.expect_identifier("variable name")?.0];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier("variable name")?.0);
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(self.alloc(NodeKind::QualifierDeclaration { qualifiers, names }, span))
    }

    fn parse_interface_block(&mut self, qualifiers: Vec<Qualifier>, span: Span) -> GlintResult<NodeId> {
        let (block_name, _) = self.expect_identifier("block name")?;
        let members = self.parse_members()?;
        let instance = match self.peek() {
            TokenKind::Identifier(_) => {
                let (name, _) = self.expect_identifier("instance name")?;
                let array = self.parse_array_spec()?;
                Some(MemberDeclarator { name, array })
            }
            _ => None,
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(self.alloc(
            NodeKind::InterfaceBlock {
                qualifiers,
                block_name,
                members,
                instance,
            },
            span,
        ))
    }

    /// `{ member; ... }` of a struct or interface block.
    fn parse_members(&mut self) -> GlintResult<Vec<StructMember>> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut members = Vec::new();
        while self.peek() != &TokenKind::RightBrace {
            let qualifiers = self.parse_qualifiers()?;
            let specifier = self.parse_type_specifier()?;
            let mut declarators = Vec::new();
            loop {
                let (name, _) = self.expect_identifier("member name")?;
                let array = self.parse_array_spec()?;
                declarators.push(MemberDeclarator { name, array });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Semicolon)?;
            members.push(StructMember {
                ty: FullType {
                    qualifiers,
                    specifier,
                },
                declarators,
            });
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(members)
    }

    fn parse_qualifiers(&mut self) -> GlintResult<Vec<Qualifier>> {
        let mut qualifiers = Vec::new();
        loop {
            let qualifier = match self.peek().clone() {
                TokenKind::Qualifier(word) => {
                    self.advance();
                    Qualifier::from_keyword(&word)
                        .ok_or_else(|| self.error_at(format!("unknown qualifier '{}'", word), self.current_span()))?
                }
                TokenKind::Invariant => {
                    self.advance();
                    Qualifier::Invariant
                }
                TokenKind::Precise => {
                    self.advance();
                    Qualifier::Precise
                }
                TokenKind::Layout => self.parse_layout()?,
                TokenKind::Subroutine => {
                    self.advance();
                    let mut types = Vec::new();
                    if self.eat(&TokenKind::LeftParen) {
                        loop {
                            types.push(self.expect_identifier("subroutine type")?.0);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RightParen)?;
                    }
                    Qualifier::Subroutine(types)
                }
                _ => break,
            };
            qualifiers.push(qualifier);
        }
        Ok(qualifiers)
    }

    fn parse_layout(&mut self) -> GlintResult<Qualifier> {
        self.advance();
        self.expect(&TokenKind::LeftParen)?;
        let mut items = Vec::new();
        loop {
            let name = match self.peek().clone() {
                TokenKind::Identifier(name) | TokenKind::Qualifier(name) => {
                    self.advance();
                    name
                }
                _ => return Err(self.unexpected("layout qualifier name")),
            };
            let value = if self.eat(&TokenKind::Assign) {
                Some(self.parse_conditional()?)
            } else {
                None
            };
            items.push(LayoutItem { name, value });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(Qualifier::Layout(items))
    }

    fn parse_type_specifier(&mut self) -> GlintResult<TypeSpecifier> {
        let name = match self.peek().clone() {
            TokenKind::TypeName(name) => {
                self.advance();
                TypeName::Builtin(name)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                TypeName::Named(name)
            }
            TokenKind::Struct => {
                self.advance();
                let name = match self.peek().clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                self.descend()?;
                let members = self.parse_members();
                self.depth -= 1;
                TypeName::Struct(StructBody {
                    name,
                    members: members?,
                })
            }
            _ => return Err(self.unexpected("type")),
        };
        let array = self.parse_array_spec()?;
        Ok(TypeSpecifier { name, array })
    }

    /// Zero or more `[size]` / `[]` suffixes.
    fn parse_array_spec(&mut self) -> GlintResult<Option<ArraySpec>> {
        let mut dims = Vec::new();
        while self.eat(&TokenKind::LeftBracket) {
            if self.eat(&TokenKind::RightBracket) {
                dims.push(None);
                continue;
            }
            dims.push(Some(self.parse_conditional()?));
            self.expect(&TokenKind::RightBracket)?;
        }
        Ok((!dims.is_empty()).then_some(ArraySpec { dims }))
    }

    fn parse_parameters(&mut self) -> GlintResult<Vec<Parameter>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if self.peek() == &TokenKind::TypeName("void".into()) && self.peek_at(1) == &TokenKind::RightParen {
            self.advance();
        }
        if self.eat(&TokenKind::RightParen) {
            return Ok(params);
        }
        loop {
            let qualifiers = self.parse_qualifiers()?;
            let specifier = self.parse_type_specifier()?;
            let name = match self.peek().clone() {
                TokenKind::Identifier(name) => {
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let array = if name.is_some() {
                self.parse_array_spec()?
            } else {
                None
            };
            params.push(Parameter {
                ty: FullType {
                    qualifiers,
                    specifier,
                },
                name,
                array,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    /// `name[..] = init, name2 ...;` after the type and first name.
    fn parse_declarators(&mut self, ty: FullType, first: String, first_span: Span, span: Span) -> GlintResult<NodeId> {
        let mut declarators = Vec::new();
        let (mut name, mut name_span) = (first, first_span);
        loop {
            let array = self.parse_array_spec()?;
            let initializer = if self.eat(&TokenKind::Assign) {
                Some(self.parse_initializer()?)
            } else {
                None
            };
            declarators.push(self.alloc(
                NodeKind::Declarator {
                    name,
                    array,
                    initializer,
                },
                name_span,
            ));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            (name, name_span) = self.expect_identifier("variable name")?;
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(self.alloc(NodeKind::Declaration { ty, declarators }, span))
    }

    fn parse_initializer(&mut self) -> GlintResult<NodeId> {
        if self.peek() != &TokenKind::LeftBrace {
            return self.parse_assignment();
        }
        self.descend()?;
        let span = self.advance().span;
        let elements = self.parse_initializer_elements();
        self.depth -= 1;
        let elements = elements?;
        Ok(self.alloc(NodeKind::InitializerList { elements }, span))
    }

    fn parse_initializer_elements(&mut self) -> GlintResult<Vec<NodeId>> {
        let mut elements = Vec::new();
        while self.peek() != &TokenKind::RightBrace {
            elements.push(self.parse_initializer()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(elements)
    }

    // ── Statements ──────────────────────────────────────────────────

    /// Index of the first token after balanced `[...]` groups starting at
    /// `index`.
    fn skip_brackets(&self, mut index: usize) -> usize {
        while self.tokens.get(index).map(|t| &t.kind) == Some(&TokenKind::LeftBracket) {
            let mut depth = 0usize;
            while let Some(token) = self.tokens.get(index) {
                match token.kind {
                    TokenKind::LeftBracket => depth += 1,
                    TokenKind::RightBracket => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Eof => return index,
                    _ => {}
                }
                index += 1;
            }
            index += 1;
        }
        index
    }

    fn starts_declaration(&self) -> bool {
        match self.peek() {
            TokenKind::Qualifier(_)
            | TokenKind::Layout
            | TokenKind::Invariant
            | TokenKind::Precise
            | TokenKind::Struct => true,
            TokenKind::TypeName(_) | TokenKind::Identifier(_) => {
                let after = self.skip_brackets(self.pos + 1);
                matches!(
                    self.tokens.get(after).map(|t| &t.kind),
                    Some(TokenKind::Identifier(_))
                )
            }
            _ => false,
        }
    }

    fn parse_local_declaration(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        let qualifiers = self.parse_qualifiers()?;
        let specifier = self.parse_type_specifier()?;
        let ty = FullType {
            qualifiers,
            specifier,
        };
        let declaration = if self.peek() == &TokenKind::Semicolon
            && matches!(ty.specifier.name, TypeName::Struct(_))
        {
            self.advance();
            self.alloc(
                NodeKind::Declaration {
                    ty,
                    declarators: Vec::new(),
                },
                span,
            )
        } else {
            let (name, name_span) = self.expect_identifier("variable name")?;
            self.parse_declarators(ty, name, name_span, span)?
        };
        Ok(self.alloc(NodeKind::DeclarationStatement { declaration }, span))
    }

    fn parse_compound(&mut self) -> GlintResult<NodeId> {
        let span = self.expect(&TokenKind::LeftBrace)?.span;
        let mut statements = Vec::new();
        loop {
            let result = match self.peek() {
                TokenKind::RightBrace | TokenKind::Eof => break,
                TokenKind::Directive(_) => self.directive().map(|_| None),
                _ => self.parse_statement().map(Some),
            };
            match result {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => {}
                Err(err) => self.recover(err)?,
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(self.alloc(NodeKind::Compound { statements }, span))
    }

    fn parse_statement(&mut self) -> GlintResult<NodeId> {
        self.descend()?;
        let result = self.parse_statement_kind();
        self.depth -= 1;
        result
    }

    fn parse_statement_kind(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        match self.peek() {
            TokenKind::LeftBrace => self.parse_compound(),
            TokenKind::If => {
                self.advance();
                self.expect(&TokenKind::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                let then_branch = self.parse_statement()?;
                let else_branch = if self.eat(&TokenKind::Else) {
                    Some(self.parse_statement()?)
                } else {
                    None
                };
                Ok(self.alloc(
                    NodeKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    span,
                ))
            }
            TokenKind::Switch => {
                self.advance();
                self.expect(&TokenKind::LeftParen)?;
                let selector = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                let body = self.parse_compound()?;
                Ok(self.alloc(NodeKind::Switch { selector, body }, span))
            }
            TokenKind::Case => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(&TokenKind::Colon)?;
                Ok(self.alloc(NodeKind::CaseLabel { value: Some(value) }, span))
            }
            TokenKind::Default => {
                self.advance();
                self.expect(&TokenKind::Colon)?;
                Ok(self.alloc(NodeKind::CaseLabel { value: None }, span))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::While => {
                self.advance();
                self.expect(&TokenKind::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                let body = self.parse_statement()?;
                Ok(self.alloc(NodeKind::While { condition, body }, span))
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_statement()?;
                self.expect(&TokenKind::While)?;
                self.expect(&TokenKind::LeftParen)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(self.alloc(NodeKind::DoWhile { body, condition }, span))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.peek() == &TokenKind::Semicolon {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(self.alloc(NodeKind::Return { value }, span))
            }
            TokenKind::Break | TokenKind::Continue | TokenKind::Discard => {
                let kind = match self.advance().kind {
                    TokenKind::Break => JumpKind::Break,
                    TokenKind::Continue => JumpKind::Continue,
                    _ => JumpKind::Discard,
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(self.alloc(NodeKind::Jump(kind), span))
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(self.alloc(NodeKind::ExpressionStatement { expression: None }, span))
            }
            TokenKind::Precision => {
                let declaration = self.parse_precision()?;
                Ok(self.alloc(NodeKind::DeclarationStatement { declaration }, span))
            }
            _ if self.starts_declaration() => self.parse_local_declaration(),
            _ => {
                let expression = self.parse_expression()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(self.alloc(
                    NodeKind::ExpressionStatement {
                        expression: Some(expression),
                    },
                    span,
                ))
            }
        }
    }

    fn parse_for(&mut self) -> GlintResult<NodeId> {
        let span = self.advance().span;
        self.expect(&TokenKind::LeftParen)?;
        let init = if self.peek() == &TokenKind::Semicolon {
            self.advance();
            None
        } else if self.starts_declaration() {
            Some(self.parse_local_declaration()?)
        } else {
            let init_span = self.current_span();
            let expression = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(self.alloc(
                NodeKind::ExpressionStatement {
                    expression: Some(expression),
                },
                init_span,
            ))
        };
        let condition = if self.peek() == &TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let step = if self.peek() == &TokenKind::RightParen {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen)?;
        let body = self.parse_statement()?;
        Ok(self.alloc(
            NodeKind::For {
                init,
                condition,
                step,
                body,
            },
            span,
        ))
    }

    // ── Expressions ─────────────────────────────────────────────────

    /// Comma expression.
    fn parse_expression(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        let first = self.parse_assignment()?;
        if self.peek() != &TokenKind::Comma {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat(&TokenKind::Comma) {
            expressions.push(self.parse_assignment()?);
        }
        Ok(self.alloc(NodeKind::Sequence { expressions }, span))
    }

    fn parse_assignment(&mut self) -> GlintResult<NodeId> {
        self.descend()?;
        let result = self.parse_assignment_chain();
        self.depth -= 1;
        result
    }

    fn parse_assignment_chain(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        let target = self.parse_conditional()?;
        let Some(op) = assign_op(self.peek()) else {
            return Ok(target);
        };
        self.advance();
        let value = self.parse_assignment()?;
        Ok(self.alloc(NodeKind::Assignment { op, target, value }, span))
    }

    fn parse_conditional(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        let condition = self.parse_binary(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_expression()?;
        self.expect(&TokenKind::Colon)?;
        let else_expr = self.parse_assignment()?;
        Ok(self.alloc(
            NodeKind::Ternary {
                condition,
                then_expr,
                else_expr,
            },
            span,
        ))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> GlintResult<NodeId> {
        let depth = self.depth;
        let result = self.parse_binary_chain(min_precedence);
        self.depth = depth;
        result
    }

    /// Each operator of a left-associative chain nests the tree one level.
    fn parse_binary_chain(&mut self, min_precedence: u8) -> GlintResult<NodeId> {
        let span = self.current_span();
        let mut lhs = self.parse_unary()?;
        while let Some(op) = binary_op(self.peek()) {
            if op.precedence() <= min_precedence {
                break;
            }
            self.descend()?;
            self.advance();
            let rhs = self.parse_binary(op.precedence())?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        let op = match self.peek() {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Increment => UnaryOp::PreIncrement,
            TokenKind::Decrement => UnaryOp::PreDecrement,
            _ => return self.parse_postfix(),
        };
        self.descend()?;
        self.advance();
        let operand = self.parse_unary();
        self.depth -= 1;
        let operand = operand?;
        Ok(self.alloc(NodeKind::Unary { op, operand }, span))
    }

    fn parse_postfix(&mut self) -> GlintResult<NodeId> {
        let depth = self.depth;
        let result = self.parse_postfix_chain();
        self.depth = depth;
        result
    }

    fn parse_postfix_chain(&mut self) -> GlintResult<NodeId> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.current_span();
            if matches!(
                self.peek(),
                TokenKind::LeftBracket | TokenKind::Dot | TokenKind::Increment | TokenKind::Decrement
            ) {
                self.descend()?;
            }
            match self.peek() {
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr = self.alloc(NodeKind::Index { base: expr, index }, span);
                }
                TokenKind::Dot => {
                    self.advance();
                    let (field, _) = self.expect_identifier("field name")?;
                    if self.peek() == &TokenKind::LeftParen {
                        let args = self.parse_arguments()?;
                        expr = self.alloc(
                            NodeKind::MethodCall {
                                receiver: expr,
                                method: field,
                                args,
                            },
                            span,
                        );
                    } else {
                        expr = self.alloc(NodeKind::Member { base: expr, field }, span);
                    }
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    let op = if self.advance().kind == TokenKind::Increment {
                        PostfixOp::Increment
                    } else {
                        PostfixOp::Decrement
                    };
                    expr = self.alloc(NodeKind::Postfix { op, operand: expr }, span);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_arguments(&mut self) -> GlintResult<Vec<NodeId>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if self.peek() == &TokenKind::TypeName("void".into()) && self.peek_at(1) == &TokenKind::RightParen {
            self.advance();
        }
        if self.eat(&TokenKind::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> GlintResult<NodeId> {
        let span = self.current_span();
        let kind = match self.peek().clone() {
            TokenKind::IntLiteral(text) => {
                self.advance();
                let kind = if text.ends_with(['u', 'U']) {
                    LiteralKind::UInt
                } else {
                    LiteralKind::Int
                };
                NodeKind::Literal(Literal { kind, text })
            }
            TokenKind::FloatLiteral(text) => {
                self.advance();
                let lower = text.to_ascii_lowercase();
                let kind = if lower.ends_with("lf") {
                    LiteralKind::Double
                } else {
                    LiteralKind::Float
                };
                NodeKind::Literal(Literal { kind, text })
            }
            TokenKind::BoolLiteral(value) => {
                self.advance();
                NodeKind::Literal(Literal {
                    kind: LiteralKind::Bool,
                    text: value.to_string(),
                })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.peek() == &TokenKind::LeftParen {
                    let args = self.parse_arguments()?;
                    NodeKind::Call {
                        callee: Callee::Function(name),
                        args,
                    }
                } else {
                    NodeKind::Identifier(name)
                }
            }
            TokenKind::TypeName(_) => {
                let specifier = self.parse_type_specifier()?;
                let args = self.parse_arguments()?;
                NodeKind::Call {
                    callee: Callee::Constructor(specifier),
                    args,
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(self.alloc(kind, span))
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::OrOr => BinaryOp::Or,
        TokenKind::XorXor => BinaryOp::Xor,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::Ampersand => BinaryOp::BitAnd,
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::NotEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        TokenKind::LeftShift => BinaryOp::LeftShift,
        TokenKind::RightShift => BinaryOp::RightShift,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    let op = match kind {
        TokenKind::Assign => AssignOp::Assign,
        TokenKind::AddAssign => AssignOp::Add,
        TokenKind::SubAssign => AssignOp::Sub,
        TokenKind::MulAssign => AssignOp::Mul,
        TokenKind::DivAssign => AssignOp::Div,
        TokenKind::ModAssign => AssignOp::Mod,
        TokenKind::LeftAssign => AssignOp::LeftShift,
        TokenKind::RightAssign => AssignOp::RightShift,
        TokenKind::AndAssign => AssignOp::And,
        TokenKind::XorAssign => AssignOp::Xor,
        TokenKind::OrAssign => AssignOp::Or,
        _ => return None,
    };
    Some(op)
}

/// `(name, name, ...)` after `#pragma capability`.
fn parse_capability_list(text: &str) -> Result<Vec<Capability>, String> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| format!("malformed #pragma capability{}", text))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<Capability>().map_err(|err| err.to_string()))
        .collect()
}
