//! C-preprocessor-compatible front stage.
//!
//! Resolves includes through a [`SourceProvider`], evaluates conditional
//! compilation, expands object-like and function-like macros and records a
//! [`SourceMap`] so later stages can report authoring positions. Expansion
//! depth is tracked per token: every token produced by a macro is one level
//! deeper than the invocation it replaced, and reaching
//! `max_expansion_depth` fails with [`GlintError::MacroRecursion`]. A
//! self-referential macro therefore fails instead of looping.

mod expr;
mod source_map;
mod token;

pub use source_map::{Location, Segment, SourceMap};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use glint_core::{
    Diagnostic, Diagnostics, GlintError, GlintResult, PipelineConfig, Stage,
};

use crate::source::{resolve_include_path, IncludeCache, SourceError, SourceFile, SourceProvider};
use token::{classify, render, stringify, tokenize_line, PpKind, PpToken};

/// Upper bound on macro replacements while expanding one line.
const MAX_EXPANSIONS_PER_LINE: usize = 1 << 20;

/// Facts discovered while preprocessing, consumed by the pipeline facade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessHints {
    /// Extensions named by `#extension` with a behavior other than `disable`.
    pub required_extensions: Vec<String>,
    /// Names that look like uniform declarations in the expanded text.
    pub uniform_candidates: Vec<String>,
}

/// Fully preprocessed text plus everything needed to map it back.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub text: String,
    pub source_map: SourceMap,
    pub hints: PreprocessHints,
    /// Non-fatal diagnostics such as macro redefinition warnings.
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Macro {
    params: Option<Vec<String>>,
    body: Vec<PpToken>,
    builtin: bool,
}

impl Macro {
    fn object(body: Vec<PpToken>, builtin: bool) -> Self {
        Self {
            params: None,
            body,
            builtin,
        }
    }

    fn same_definition(&self, other: &Macro) -> bool {
        self.params == other.params
            && self.body.len() == other.body.len()
            && self.body.iter().zip(&other.body).enumerate().all(|(i, (a, b))| {
                a.text == b.text && (i == 0 || a.space_before == b.space_before)
            })
    }
}

#[derive(Debug, Clone)]
struct Conditional {
    directive: &'static str,
    line: usize,
    column: usize,
    /// Lines in the current branch are kept.
    active: bool,
    /// Some branch of this group was already taken.
    taken: bool,
    parent_active: bool,
    seen_else: bool,
}

/// Where a directive appeared.
struct Site {
    file_id: u32,
    file: String,
    line: usize,
    column: usize,
    base_depth: usize,
}

impl Site {
    fn error(&self, message: impl Into<String>) -> GlintError {
        GlintError::preprocess(message, self.file.clone(), self.line, self.column)
    }
}

pub struct Preprocessor<'a> {
    config: &'a PipelineConfig,
    provider: &'a dyn SourceProvider,
    cache: &'a IncludeCache,
    macros: HashMap<String, Macro>,
    conditionals: Vec<Conditional>,
    include_stack: Vec<String>,
    included_once: HashSet<String>,
    lines: Vec<String>,
    map: SourceMap,
    hints: PreprocessHints,
    diagnostics: Diagnostics,
    next_expansion: u32,
    expansion_steps: usize,
    /// Macro calls nested inside arguments currently being pre-expanded.
    argument_nesting: usize,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        provider: &'a dyn SourceProvider,
        cache: &'a IncludeCache,
    ) -> Self {
        Self {
            config,
            provider,
            cache,
            macros: HashMap::new(),
            conditionals: Vec::new(),
            include_stack: Vec::new(),
            included_once: HashSet::new(),
            lines: Vec::new(),
            map: SourceMap::new(),
            hints: PreprocessHints::default(),
            diagnostics: Diagnostics::new(),
            next_expansion: 0,
            expansion_steps: 0,
            argument_nesting: 0,
        }
    }

    /// Preprocess `source`, named `file_name` in diagnostics.
    ///
    /// Returns every collected diagnostic on failure. In strict mode the
    /// first error stops processing.
    pub fn run(mut self, source: &str, file_name: &str) -> Result<PreprocessOutput, Diagnostics> {
        let profile = self.config.target_profile;
        self.define_builtin("__VERSION__", &profile.version().to_string());
        if profile.is_es() {
            self.define_builtin("GL_ES", "1");
        }
        for (name, value) in &self.config.defined_macros {
            let body = tokenize_line(value, 0, 0);
            self.macros.insert(name.clone(), Macro::object(body, false));
        }

        let file = Arc::new(SourceFile::new(file_name, source));
        if let Err(err) = self.process_file(&file) {
            self.diagnostics.push(err.into_diagnostic());
        }
        if self.diagnostics.has_errors() {
            return Err(self.diagnostics);
        }
        tracing::debug!(
            "preprocessed {} into {} lines ({} macros defined)",
            file_name,
            self.lines.len(),
            self.macros.len()
        );
        Ok(PreprocessOutput {
            text: self.lines.join("\n"),
            source_map: self.map,
            hints: self.hints,
            diagnostics: self.diagnostics,
        })
    }

    fn define_builtin(&mut self, name: &str, value: &str) {
        self.macros
            .insert(name.to_string(), Macro::object(tokenize_line(value, 0, 0), true));
    }

    /// Record a recoverable error, or abort in strict mode.
    fn fail(&mut self, err: GlintError) -> GlintResult<()> {
        if self.config.strict_error_recovery {
            return Err(err);
        }
        self.diagnostics.push(err.into_diagnostic());
        Ok(())
    }

    fn warn(&mut self, message: String, site: &Site) {
        tracing::warn!("{} at {}:{}", message, site.file, site.line);
        self.diagnostics.push(Diagnostic::warning(
            Stage::Preprocess,
            message,
            site.file.clone(),
            site.line,
            site.column,
        ));
    }

    fn is_active(&self) -> bool {
        self.conditionals.last().map(|c| c.active).unwrap_or(true)
    }

    fn push_line(&mut self, text: String, segments: Vec<Segment>) {
        self.lines.push(text);
        self.map.push_line(segments);
    }

    fn process_file(&mut self, file: &Arc<SourceFile>) -> GlintResult<()> {
        let file_id = self.map.add_file(&file.path);
        self.include_stack.push(file.path.clone());
        let base_depth = self.conditionals.len();
        let mut line_delta: isize = 0;
        let mut index = 0;

        while index < file.lines.len() {
            let line = &file.lines[index];
            index += 1;
            let number = shift_line(line.number, line_delta);
            let trimmed = line.text.trim_start();

            if let Some(rest) = trimmed.strip_prefix('#') {
                let site = Site {
                    file_id,
                    file: file.path.clone(),
                    line: number,
                    column: line.text.chars().count() - trimmed.chars().count() + 1,
                    base_depth,
                };
                if let Some(target) = self.directive(rest.trim(), &site, line.number, &mut line_delta)? {
                    self.include(&target, &site, &file.path)?;
                }
                continue;
            }
            if !self.is_active() || trimmed.is_empty() {
                continue;
            }

            let tokens = tokenize_line(&line.text, file_id, number);
            let mut more = || -> Option<Vec<PpToken>> {
                let next = file.lines.get(index)?;
                if next.text.trim_start().starts_with('#') {
                    return None;
                }
                index += 1;
                let mut tokens = tokenize_line(&next.text, file_id, shift_line(next.number, line_delta));
                if let Some(first) = tokens.first_mut() {
                    first.space_before = true;
                }
                Some(tokens)
            };
            self.expansion_steps = 0;
            match self.expand(tokens, &mut more) {
                Ok(expanded) => self.emit_tokens(&expanded),
                Err(err) => self.fail(err)?,
            }
        }

        while self.conditionals.len() > base_depth {
            if let Some(open) = self.conditionals.pop() {
                self.fail(GlintError::preprocess(
                    format!("unterminated #{} (missing #endif)", open.directive),
                    file.path.clone(),
                    open.line,
                    open.column,
                ))?;
            }
        }
        self.include_stack.pop();
        Ok(())
    }

    fn emit_tokens(&mut self, tokens: &[PpToken]) {
        if tokens.is_empty() {
            return;
        }
        self.scan_uniforms(tokens);
        let (text, segments) = render(tokens);
        self.push_line(text, segments);
    }

    fn pass_through(&mut self, text: String, site: &Site) {
        let location = Location {
            file: site.file_id,
            line: site.line,
            column: site.column,
            expansion: None,
        };
        self.push_line(
            text,
            vec![Segment {
                out_column: 1,
                location,
            }],
        );
    }

    /// Handle one directive. Returns an include target to process.
    fn directive(
        &mut self,
        text: &str,
        site: &Site,
        physical_line: usize,
        line_delta: &mut isize,
    ) -> GlintResult<Option<String>> {
        let name_len = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len());
        let (name, args) = text.split_at(name_len);
        let args = args.trim();

        match name {
            "ifdef" | "ifndef" => {
                let condition = if self.is_active() {
                    match leading_identifier(args) {
                        Some(macro_name) => {
                            let defined = self.macros.contains_key(macro_name);
                            if name == "ifdef" { defined } else { !defined }
                        }
                        None => {
                            self.fail(site.error(format!("#{} requires a macro name", name)))?;
                            false
                        }
                    }
                } else {
                    false
                };
                self.open_conditional(if name == "ifdef" { "ifdef" } else { "ifndef" }, condition, site);
            }
            "if" => {
                let condition = if self.is_active() { self.condition(args, site)? } else { false };
                self.open_conditional("if", condition, site);
            }
            "elif" => {
                let evaluate = match self.innermost(site, "#elif")? {
                    Some(open) if open.seen_else => {
                        self.fail(site.error("#elif after #else"))?;
                        false
                    }
                    Some(open) => open.parent_active && !open.taken,
                    None => return Ok(None),
                };
                let condition = if evaluate { self.condition(args, site)? } else { false };
                if let Some(open) = self.conditionals.last_mut() {
                    open.active = condition;
                    open.taken |= condition;
                }
            }
            "else" => {
                match self.innermost(site, "#else")? {
                    Some(open) if open.seen_else => self.fail(site.error("duplicate #else"))?,
                    Some(_) => {}
                    None => return Ok(None),
                }
                if let Some(open) = self.conditionals.last_mut() {
                    open.active = open.parent_active && !open.taken;
                    open.taken = true;
                    open.seen_else = true;
                }
            }
            "endif" => {
                if self.innermost(site, "#endif")?.is_some() {
                    self.conditionals.pop();
                }
            }
            _ if !self.is_active() => {}
            "" => {}
            "define" => self.define(args, site)?,
            "undef" => match leading_identifier(args) {
                Some(macro_name) => {
                    self.macros.remove(macro_name);
                }
                None => self.fail(site.error("#undef requires a macro name"))?,
            },
            "include" => match parse_include_target(args) {
                Some(target) => return Ok(Some(target)),
                None => self.fail(site.error(format!("malformed #include {}", args)))?,
            },
            "error" => self.fail(site.error(format!("#error {}", args)))?,
            "pragma" => {
                let mut words = args.split_whitespace();
                if words.next() != Some("once") {
                    tracing::trace!("passing through #pragma {}", args);
                    self.pass_through(format!("#pragma {}", args), site);
                }
            }
            "version" => self.version(args, site),
            "extension" => {
                let (extension, behavior) = match args.split_once(':') {
                    Some((ext, behavior)) => (ext.trim(), behavior.trim()),
                    None => (args, ""),
                };
                if extension.is_empty() || behavior.is_empty() {
                    self.fail(site.error(format!("malformed #extension {}", args)))?;
                } else {
                    if behavior != "disable"
                        && !self.hints.required_extensions.iter().any(|e| e == extension)
                    {
                        self.hints.required_extensions.push(extension.to_string());
                    }
                    self.pass_through(format!("#extension {} : {}", extension, behavior), site);
                }
            }
            "line" => {
                let number = args
                    .split_whitespace()
                    .next()
                    .and_then(|n| n.parse::<isize>().ok());
                match number {
                    Some(number) => *line_delta = number - (physical_line as isize + 1),
                    None => self.fail(site.error(format!("malformed #line {}", args)))?,
                }
            }
            other => self.fail(site.error(format!("unknown preprocessor directive '#{}'", other)))?,
        }
        Ok(None)
    }

    fn open_conditional(&mut self, directive: &'static str, condition: bool, site: &Site) {
        let parent_active = self.is_active();
        let active = parent_active && condition;
        self.conditionals.push(Conditional {
            directive,
            line: site.line,
            column: site.column,
            active,
            taken: active || !parent_active,
            parent_active,
            seen_else: false,
        });
    }

    /// The innermost open conditional of the current file.
    fn innermost(&mut self, site: &Site, directive: &str) -> GlintResult<Option<Conditional>> {
        if self.conditionals.len() <= site.base_depth {
            self.fail(site.error(format!("{} without #if", directive)))?;
            return Ok(None);
        }
        Ok(self.conditionals.last().cloned())
    }

    fn condition(&mut self, args: &str, site: &Site) -> GlintResult<bool> {
        let raw = tokenize_line(args, site.file_id, site.line);
        let mut resolved = Vec::with_capacity(raw.len());
        let mut iter = raw.into_iter().peekable();
        while let Some(token) = iter.next() {
            if token.kind != PpKind::Ident || token.text != "defined" {
                resolved.push(token);
                continue;
            }
            let parenthesized = iter.peek().is_some_and(|t| t.is_punct("("));
            if parenthesized {
                iter.next();
            }
            let name = match iter.next() {
                Some(t) if t.kind == PpKind::Ident => t.text,
                _ => {
                    self.fail(site.error("'defined' requires a macro name"))?;
                    return Ok(false);
                }
            };
            if parenthesized && !iter.next().is_some_and(|t| t.is_punct(")")) {
                self.fail(site.error("missing ')' after 'defined'"))?;
                return Ok(false);
            }
            let value = if self.macros.contains_key(&name) { "1" } else { "0" };
            resolved.push(PpToken {
                kind: PpKind::Number,
                text: value.to_string(),
                ..token
            });
        }

        self.expansion_steps = 0;
        let expanded = match self.expand(resolved, &mut || None) {
            Ok(tokens) => tokens,
            Err(err) => {
                self.fail(err)?;
                return Ok(false);
            }
        };
        match expr::evaluate(&expanded) {
            Ok(value) => Ok(value != 0),
            Err(message) => {
                self.fail(site.error(message))?;
                Ok(false)
            }
        }
    }

    fn define(&mut self, args: &str, site: &Site) -> GlintResult<()> {
        let Some(name) = leading_identifier(args) else {
            return self.fail(site.error("#define requires a macro name"));
        };
        let rest = &args[name.len()..];
        let (params, body_text) = match rest.strip_prefix('(') {
            Some(after) => {
                let Some(close) = after.find(')') else {
                    return self.fail(site.error(format!("missing ')' in parameter list of '{}'", name)));
                };
                let list = after[..close].trim();
                let params: Vec<String> = if list.is_empty() {
                    Vec::new()
                } else {
                    list.split(',').map(|p| p.trim().to_string()).collect()
                };
                let valid = params.iter().all(|p| leading_identifier(p) == Some(p.as_str()));
                let unique = params.iter().collect::<HashSet<_>>().len() == params.len();
                if !valid || !unique {
                    return self.fail(site.error(format!("invalid parameter list for macro '{}'", name)));
                }
                (Some(params), &after[close + 1..])
            }
            None => (None, rest),
        };

        let mut body = tokenize_line(body_text, site.file_id, site.line);
        if let Some(first) = body.first_mut() {
            first.space_before = false;
        }
        if body.first().is_some_and(|t| t.is_punct("##")) || body.last().is_some_and(|t| t.is_punct("##")) {
            return self.fail(site.error("'##' cannot appear at either end of a macro body"));
        }

        let definition = Macro {
            params,
            body,
            builtin: false,
        };
        if let Some(existing) = self.macros.get(name) {
            if existing.builtin {
                self.warn(format!("redefinition of builtin macro '{}'", name), site);
            } else if !existing.same_definition(&definition) {
                self.warn(format!("macro '{}' redefined", name), site);
            }
        }
        self.macros.insert(name.to_string(), definition);
        Ok(())
    }

    fn version(&mut self, args: &str, site: &Site) {
        if self.include_stack.len() > 1 {
            self.warn("ignoring #version in included file".to_string(), site);
            return;
        }
        let mut words = args.split_whitespace();
        let number = words.next().unwrap_or("");
        let profile = words.next();
        if let Ok(version) = number.parse::<u32>() {
            self.define_builtin("__VERSION__", number);
            self.macros.remove("GL_ES");
            self.macros.remove("GL_core_profile");
            self.macros.remove("GL_compatibility_profile");
            match profile {
                Some("es") => self.define_builtin("GL_ES", "1"),
                Some("compatibility") => self.define_builtin("GL_compatibility_profile", "1"),
                Some("core") => self.define_builtin("GL_core_profile", "1"),
                None if version == 100 => self.define_builtin("GL_ES", "1"),
                None if version >= 150 => self.define_builtin("GL_core_profile", "1"),
                _ => {}
            }
        }
        self.pass_through(format!("#version {}", args), site);
    }

    fn include(&mut self, target: &str, site: &Site, including: &str) -> GlintResult<()> {
        let resolved = resolve_include_path(including, target);
        if self.include_stack.contains(&resolved) {
            return self.fail(site.error(format!("recursive include of '{}'", resolved)));
        }
        if self.include_stack.len() > self.config.max_include_depth {
            return self.fail(site.error(format!(
                "include depth exceeds {} at '{}'",
                self.config.max_include_depth, resolved
            )));
        }
        if self.included_once.contains(&resolved) {
            tracing::trace!("skipping {} (#pragma once)", resolved);
            return Ok(());
        }
        let file = match self.cache.load(&resolved, self.provider) {
            Ok(file) => file,
            Err(SourceError::NotFound(path)) => {
                return self.fail(GlintError::FileNotFound {
                    path,
                    file: site.file.clone(),
                    line: site.line,
                });
            }
            Err(other) => return self.fail(site.error(other.to_string())),
        };
        if file.pragma_once {
            self.included_once.insert(resolved);
        }
        self.process_file(&file)
    }

    fn recursion_error(&self, site: &PpToken) -> GlintError {
        GlintError::MacroRecursion {
            name: site.text.clone(),
            limit: self.config.max_expansion_depth,
            file: self.map.file_name(site.file).to_string(),
            line: site.line,
            column: site.column,
        }
    }

    /// Expand every macro in `tokens`, rescanning replacements.
    fn expand(
        &mut self,
        tokens: Vec<PpToken>,
        more: &mut dyn FnMut() -> Option<Vec<PpToken>>,
    ) -> GlintResult<Vec<PpToken>> {
        let mut input: VecDeque<PpToken> = tokens.into();
        let mut output = Vec::with_capacity(input.len());

        while let Some(token) = input.pop_front() {
            if token.kind != PpKind::Ident {
                output.push(token);
                continue;
            }
            match token.text.as_str() {
                "__LINE__" => {
                    output.push(PpToken {
                        kind: PpKind::Number,
                        text: token.line.to_string(),
                        ..token
                    });
                    continue;
                }
                "__FILE__" => {
                    output.push(PpToken {
                        kind: PpKind::Number,
                        text: token.file.to_string(),
                        ..token
                    });
                    continue;
                }
                _ => {}
            }
            let Some(definition) = self.macros.get(&token.text).cloned() else {
                output.push(token);
                continue;
            };

            let replacement = match &definition.params {
                None => {
                    self.check_budget(&token)?;
                    let id = self.fresh_expansion();
                    let mut body: Vec<PpToken> =
                        definition.body.iter().map(|t| t.placed_at(&token, id)).collect();
                    if let Some(first) = body.first_mut() {
                        first.space_before = token.space_before;
                    }
                    body
                }
                Some(params) => {
                    if input.is_empty() {
                        if let Some(extra) = more() {
                            input.extend(extra);
                        }
                    }
                    if !input.front().is_some_and(|t| t.is_punct("(")) {
                        output.push(token);
                        continue;
                    }
                    self.check_budget(&token)?;
                    let args = collect_arguments(&mut input, more, &token, self.map.file_name(token.file))?;
                    self.substitute(&definition, params, args, &token)?
                }
            };
            for replaced in replacement.into_iter().rev() {
                input.push_front(replaced);
            }
        }
        Ok(output)
    }

    fn check_budget(&mut self, token: &PpToken) -> GlintResult<()> {
        self.expansion_steps += 1;
        if token.depth >= self.config.max_expansion_depth
            || self.expansion_steps > MAX_EXPANSIONS_PER_LINE
        {
            return Err(self.recursion_error(token));
        }
        Ok(())
    }

    fn fresh_expansion(&mut self) -> u32 {
        let id = self.next_expansion;
        self.next_expansion += 1;
        id
    }

    fn substitute(
        &mut self,
        definition: &Macro,
        params: &[String],
        args: Vec<Vec<PpToken>>,
        site: &PpToken,
    ) -> GlintResult<Vec<PpToken>> {
        let empty_call = params.is_empty() && args.len() == 1 && args[0].is_empty();
        if args.len() != params.len() && !empty_call {
            return Err(GlintError::preprocess(
                format!(
                    "macro '{}' expects {} argument(s), got {}",
                    site.text,
                    params.len(),
                    args.len()
                ),
                self.map.file_name(site.file).to_string(),
                site.line,
                site.column,
            ));
        }

        let id = self.fresh_expansion();
        let param_index = |token: &PpToken| {
            if token.kind == PpKind::Ident {
                params.iter().position(|p| *p == token.text)
            } else {
                None
            }
        };
        let body = &definition.body;
        let mut result: Vec<PpToken> = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let token = &body[i];

            if token.is_punct("#") {
                if let Some(p) = body.get(i + 1).and_then(|next| param_index(next)) {
                    let mut literal = token.placed_at(site, id);
                    literal.kind = PpKind::Str;
                    literal.text = stringify(&args[p]);
                    result.push(literal);
                    i += 2;
                    continue;
                }
            }

            if token.is_punct("##") {
                let rhs: Vec<PpToken> = match body.get(i + 1) {
                    Some(next) => match param_index(next) {
                        Some(p) => args[p].clone(),
                        None => vec![next.placed_at(site, id)],
                    },
                    None => Vec::new(),
                };
                i += 2;
                let mut rhs = rhs.into_iter();
                match (result.pop(), rhs.next()) {
                    (Some(left), Some(right)) => {
                        let text = format!("{}{}", left.text, right.text);
                        let mut pasted = left.placed_at(site, id);
                        pasted.kind = classify(&text);
                        pasted.text = text;
                        pasted.space_before = left.space_before;
                        result.push(pasted);
                    }
                    (Some(left), None) => result.push(left),
                    (None, Some(right)) => result.push(right),
                    (None, None) => {}
                }
                result.extend(rhs);
                continue;
            }

            if let Some(p) = param_index(token) {
                let pasted = body.get(i + 1).is_some_and(|t| t.is_punct("##"))
                    || (i > 0 && body[i - 1].is_punct("##"));
                let mut replacement = if pasted {
                    args[p].clone()
                } else {
                    if self.argument_nesting >= self.config.max_expansion_depth {
                        return Err(self.recursion_error(site));
                    }
                    self.argument_nesting += 1;
                    let expanded = self.expand(args[p].clone(), &mut || None);
                    self.argument_nesting -= 1;
                    expanded?
                };
                if let Some(first) = replacement.first_mut() {
                    first.space_before = token.space_before;
                }
                result.extend(replacement);
                i += 1;
                continue;
            }

            result.push(token.placed_at(site, id));
            i += 1;
        }

        for token in &mut result {
            token.depth = token.depth.max(site.depth + 1);
        }
        if let Some(first) = result.first_mut() {
            first.space_before = site.space_before;
        }
        Ok(result)
    }

    fn scan_uniforms(&mut self, tokens: &[PpToken]) {
        let mut i = 0;
        while i < tokens.len() {
            if !(tokens[i].kind == PpKind::Ident && tokens[i].text == "uniform") {
                i += 1;
                continue;
            }
            let mut last_ident: Option<&str> = None;
            let mut depth = 0usize;
            i += 1;
            while i < tokens.len() {
                let token = &tokens[i];
                i += 1;
                match (token.kind, token.text.as_str()) {
                    (PpKind::Ident, text) if depth == 0 => last_ident = Some(text),
                    (PpKind::Punct, "{") => break,
                    (PpKind::Punct, "(" | "[") => {
                        if depth == 0 && token.text == "[" {
                            self.push_uniform_candidate(last_ident.take());
                        }
                        depth += 1;
                    }
                    (PpKind::Punct, ")" | "]") => depth = depth.saturating_sub(1),
                    (PpKind::Punct, "," | "=") if depth == 0 => {
                        self.push_uniform_candidate(last_ident.take());
                    }
                    (PpKind::Punct, ";") => {
                        self.push_uniform_candidate(last_ident.take());
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    fn push_uniform_candidate(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            if !self.hints.uniform_candidates.iter().any(|c| c == name) {
                self.hints.uniform_candidates.push(name.to_string());
            }
        }
    }
}

fn shift_line(line: usize, delta: isize) -> usize {
    (line as isize + delta).max(1) as usize
}

fn leading_identifier(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    let ident = &text[..end];
    match ident.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => Some(ident),
        _ => None,
    }
}

/// `"path"`, `<path>` or a bare `namespace:path`.
fn parse_include_target(args: &str) -> Option<String> {
    let args = args.trim();
    let target = if let Some(rest) = args.strip_prefix('"') {
        &rest[..rest.find('"')?]
    } else if let Some(rest) = args.strip_prefix('<') {
        &rest[..rest.find('>')?]
    } else {
        args.split_whitespace().next()?
    };
    (!target.is_empty()).then(|| target.to_string())
}

fn collect_arguments(
    input: &mut VecDeque<PpToken>,
    more: &mut dyn FnMut() -> Option<Vec<PpToken>>,
    site: &PpToken,
    file_name: &str,
) -> GlintResult<Vec<Vec<PpToken>>> {
    input.pop_front();
    let mut args = vec![Vec::new()];
    let mut depth = 0usize;
    loop {
        let token = match input.pop_front() {
            Some(token) => token,
            None => match more() {
                Some(extra) => {
                    input.extend(extra);
                    continue;
                }
                None => {
                    return Err(GlintError::preprocess(
                        format!("unterminated invocation of macro '{}'", site.text),
                        file_name,
                        site.line,
                        site.column,
                    ))
                }
            },
        };
        if token.is_punct("(") {
            depth += 1;
        } else if token.is_punct(")") {
            if depth == 0 {
                break;
            }
            depth -= 1;
        } else if token.is_punct(",") && depth == 0 {
            args.push(Vec::new());
            continue;
        }
        if let Some(current) = args.last_mut() {
            current.push(token);
        }
    }
    for arg in &mut args {
        if let Some(first) = arg.first_mut() {
            first.space_before = false;
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySourceProvider;
    use glint_core::{Severity, TargetProfile};

    fn run_with(
        src: &str,
        config: &PipelineConfig,
        provider: &MemorySourceProvider,
    ) -> Result<PreprocessOutput, Diagnostics> {
        let cache = IncludeCache::new();
        Preprocessor::new(config, provider, &cache).run(src, "main.glsl")
    }

    fn run(src: &str) -> Result<PreprocessOutput, Diagnostics> {
        run_with(src, &PipelineConfig::default(), &MemorySourceProvider::new())
    }

    fn text(src: &str) -> String {
        run(src).unwrap().text
    }

    #[test]
    fn test_object_macro() {
        assert_eq!(text("#define N 4\nuniform float a[N];"), "uniform float a[4];");
    }

    #[test]
    fn test_function_macro_with_nested_arguments() {
        let out = text("#define MIX(a, b) mix(a, b, 0.5)\nvec3 c = MIX(f(x, y), b);");
        assert_eq!(out, "vec3 c = mix(f(x, y), b, 0.5);");
    }

    #[test]
    fn test_arguments_expanded_before_substitution() {
        let out = text("#define TWO 2\n#define SQ(x) ((x) * (x))\nint a = SQ(TWO);");
        assert_eq!(out, "int a = ((2) * (2));");
    }

    #[test]
    fn test_stringify_and_paste() {
        let out = text("#define CAT(a, b) a ## b\n#define STR(x) #x\nCAT(tex, Coord) STR(a+b)");
        assert_eq!(out, "texCoord \"a+b\"");
    }

    #[test]
    fn test_function_macro_name_without_call() {
        assert_eq!(text("#define F(x) x\nfloat F;"), "float F;");
    }

    #[test]
    fn test_multiline_invocation() {
        let out = text("#define ADD(a, b) (a + b)\nfloat x = ADD(1.0,\n    2.0);");
        assert_eq!(out, "float x = (1.0 + 2.0);");
    }

    #[test]
    fn test_self_reference_terminates() {
        let err = run("#define A A + 1\nint x = A;").unwrap_err();
        assert_eq!(err.len(), 1);
        let diag = err.iter().next().unwrap();
        assert_eq!(diag.stage, Stage::Preprocess);
        assert!(diag.message.contains("'A'"));
        assert_eq!(diag.line, 2);
    }

    #[test]
    fn test_deeply_nested_arguments_are_bounded() {
        let call = |depth: usize| format!("{}1{}", "F(".repeat(depth), ")".repeat(depth));
        let out = text(&format!("#define F(x) x\nint v = {};", call(100)));
        assert_eq!(out, "int v = 1;");

        let err = run(&format!("#define F(x) x\nint v = {};", call(5_000))).unwrap_err();
        let diag = err.iter().next().unwrap();
        assert_eq!(diag.stage, Stage::Preprocess);
        assert!(diag.message.contains("'F'"), "{}", diag.message);
    }

    #[test]
    fn test_deep_if_expression_is_an_error() {
        let deep = format!("#if {}1{}\nint x;\n#endif", "(".repeat(5_000), ")".repeat(5_000));
        let err = run(&deep).unwrap_err();
        assert_eq!(err.iter().next().map(|d| d.stage), Some(Stage::Preprocess));
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let config = PipelineConfig {
            max_expansion_depth: 16,
            ..PipelineConfig::default()
        };
        let result = run_with(
            "#define A B\n#define B A\nA",
            &config,
            &MemorySourceProvider::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_conditionals() {
        let src = "#define FOO 2\n#if FOO > 1 && defined(FOO)\nint a;\n#elif 1\nint b;\n#else\nint c;\n#endif\n#ifndef BAR\nint d;\n#endif";
        assert_eq!(text(src), "int a;\nint d;");
    }

    #[test]
    fn test_nested_inactive_conditionals() {
        let src = "#if 0\n#if 1\nint a;\n#else\nint b;\n#endif\n#else\nint c;\n#endif";
        assert_eq!(text(src), "int c;");
    }

    #[test]
    fn test_unterminated_conditional() {
        let err = run("#ifdef FOO\nint a;").unwrap_err();
        assert_eq!(err.len(), 1);
        let diag = err.iter().next().unwrap();
        assert_eq!(diag.stage, Stage::Preprocess);
        assert_eq!(diag.line, 1);
        assert!(diag.message.contains("#ifdef"));
    }

    #[test]
    fn test_endif_without_if() {
        assert!(run("#endif").is_err());
    }

    #[test]
    fn test_arity_mismatch() {
        let err = run("#define F(a, b) a\nint x = F(1);").unwrap_err();
        assert!(err.iter().next().unwrap().message.contains("expects 2"));
    }

    #[test]
    fn test_lenient_collects_multiple_errors() {
        let err = run("#error first\nint a;\n#error second").unwrap_err();
        assert_eq!(err.errors().count(), 2);
        let strict = PipelineConfig::default().strict(true);
        let err = run_with("#error first\n#error second", &strict, &MemorySourceProvider::new()).unwrap_err();
        assert_eq!(err.errors().count(), 1);
    }

    #[test]
    fn test_include_and_pragma_once() {
        let provider = MemorySourceProvider::new()
            .with_file("lib/common.glsl", "#pragma once\nfloat common;")
            .with_file("lib/other.glsl", "#include \"./common.glsl\"\nfloat other;");
        let out = run_with(
            "#include \"lib/common.glsl\"\n#include <lib/other.glsl>\nvoid main() {}",
            &PipelineConfig::default(),
            &provider,
        )
        .unwrap();
        assert_eq!(out.text, "float common;\nfloat other;\nvoid main() {}");
        assert_eq!(out.source_map.files(), &["main.glsl", "lib/common.glsl", "lib/other.glsl"]);
        let location = out.source_map.lookup(2, 7).unwrap();
        assert_eq!(out.source_map.file_name(location.file), "lib/other.glsl");
        assert_eq!(location.line, 2);
    }

    #[test]
    fn test_missing_include() {
        let err = run("\n#include \"nope.glsl\"").unwrap_err();
        let diag = err.iter().next().unwrap();
        assert!(diag.message.contains("nope.glsl"));
        assert_eq!(diag.line, 2);
    }

    #[test]
    fn test_include_cycle() {
        let provider = MemorySourceProvider::new()
            .with_file("a.glsl", "#include \"b.glsl\"")
            .with_file("b.glsl", "#include \"a.glsl\"");
        let err = run_with("#include \"a.glsl\"", &PipelineConfig::default(), &provider).unwrap_err();
        assert!(err.iter().any(|d| d.message.contains("recursive include")));
    }

    #[test]
    fn test_directives_pass_through_and_hints() {
        let out = run(
            "#version 330 core\n#extension GL_ARB_a : require\n#extension GL_ARB_b : disable\n#pragma optimize(off)\nuniform vec4 color;\nuniform float a, b[2];",
        )
        .unwrap();
        assert_eq!(
            out.text,
            "#version 330 core\n#extension GL_ARB_a : require\n#extension GL_ARB_b : disable\n#pragma optimize(off)\nuniform vec4 color;\nuniform float a, b[2];"
        );
        assert_eq!(out.hints.required_extensions, vec!["GL_ARB_a".to_string()]);
        assert_eq!(out.hints.uniform_candidates, vec!["color", "a", "b"]);
    }

    #[test]
    fn test_predefined_macros() {
        let out = text("#version 300 es\n#ifdef GL_ES\nint v = __VERSION__;\n#endif\nint l = __LINE__;");
        assert_eq!(out, "#version 300 es\nint v = 300;\nint l = 5;");
        let es = PipelineConfig::new(TargetProfile::Essl100);
        let out = run_with("#if defined(GL_ES) && __VERSION__ == 100\nint es;\n#endif", &es, &MemorySourceProvider::new()).unwrap();
        assert_eq!(out.text, "int es;");
    }

    #[test]
    fn test_redefinition_warns() {
        let out = run("#define A 1\n#define A 1\n#define A 2\nint x = A;").unwrap();
        assert_eq!(out.text, "int x = 2;");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics.iter().next().unwrap().severity, Severity::Warning);
    }

    #[test]
    fn test_config_macros() {
        let config = PipelineConfig::default().with_macro("N", "4");
        let out = run_with("float a[N];", &config, &MemorySourceProvider::new()).unwrap();
        assert_eq!(out.text, "float a[4];");
    }

    #[test]
    fn test_expansion_maps_to_invocation() {
        let out = text_and_map("#define BAD 1 +\n\nfloat y = BAD;");
        let location = out.source_map.lookup(1, 13).unwrap();
        assert_eq!((location.line, location.column), (3, 11));
        assert!(location.expansion.is_some());
    }

    #[test]
    fn test_line_directive_remaps() {
        let out = text_and_map("#line 100\nint a;");
        assert_eq!(out.source_map.lookup(1, 1).unwrap().line, 100);
    }

    fn text_and_map(src: &str) -> PreprocessOutput {
        run(src).unwrap()
    }
}
