//! Pipeline facade: raw GLSL text in, emitted GLSL plus metadata out.
//!
//! Stages run strictly in order (RAW → PREPROCESSED → TOKENIZED → PARSED →
//! TRANSFORMED → EMITTED). A stage that reports any error diagnostic ends
//! the run; later stages never see its output. Panics inside a stage are
//! caught and reported as internal-error diagnostics.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use glint_core::{
    hash_source, ContentHash, Diagnostic, Diagnostics, GlintError, PipelineConfig, Severity, Stage,
};

use crate::ast::ProgramUnit;
use crate::emitter::Emitter;
use crate::lexer::{Lexer, Token};
use crate::metadata::{self, AttributeInfo, UniformInfo};
use crate::parser::parse_program;
use crate::preprocessor::{PreprocessOutput, Preprocessor};
use crate::source::{IncludeCache, MemorySourceProvider, SourceProvider};
use crate::symbols::RewriteContext;
use crate::transform::run_transforms;

/// How far a pipeline run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Raw,
    Preprocessed,
    Tokenized,
    Parsed,
    Transformed,
    Emitted,
}

impl PipelineState {
    /// The stage that moves a run out of this state.
    pub fn next_stage(self) -> Stage {
        match self {
            PipelineState::Raw => Stage::Preprocess,
            PipelineState::Preprocessed => Stage::Lex,
            PipelineState::Tokenized => Stage::Parse,
            PipelineState::Parsed => Stage::Transform,
            PipelineState::Transformed | PipelineState::Emitted => Stage::Emit,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Raw => "RAW",
            PipelineState::Preprocessed => "PREPROCESSED",
            PipelineState::Tokenized => "TOKENIZED",
            PipelineState::Parsed => "PARSED",
            PipelineState::Transformed => "TRANSFORMED",
            PipelineState::Emitted => "EMITTED",
        };
        f.write_str(name)
    }
}

/// Successful pipeline output, ready for the shader compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedShader {
    pub source_text: String,
    pub declared_uniforms: Vec<UniformInfo>,
    pub declared_attributes: Vec<AttributeInfo>,
    pub required_extensions: Vec<String>,
    pub content_hash: ContentHash,
    /// Non-fatal diagnostics (warnings, notes) gathered along the way.
    pub warnings: Vec<Diagnostic>,
}

/// Result of a run together with the last state it reached.
#[derive(Debug)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub result: Result<EmittedShader, Diagnostics>,
}

/// Reusable pipeline bound to a source provider and include cache.
#[derive(Clone)]
pub struct Pipeline {
    provider: Arc<dyn SourceProvider>,
    cache: Arc<IncludeCache>,
    file_name: String,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("file_name", &self.file_name)
            .field("cached_includes", &self.cache.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            provider,
            cache: Arc::new(IncludeCache::new()),
            file_name: "<shader>".to_string(),
        }
    }

    /// Share an include cache with other pipelines.
    pub fn with_cache(mut self, cache: Arc<IncludeCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Name of the main source in diagnostics and `__FILE__`.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn cache(&self) -> &Arc<IncludeCache> {
        &self.cache
    }

    pub fn process(&self, source: &str, config: &PipelineConfig) -> Result<EmittedShader, Diagnostics> {
        self.process_traced(source, config).result
    }

    /// Like [`Pipeline::process`], also reporting the last state reached.
    pub fn process_traced(&self, source: &str, config: &PipelineConfig) -> PipelineRun {
        let mut state = PipelineState::Raw;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(source, config, &mut state)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("internal error after {}: {}", state, reason);
                Err(Diagnostics::from(vec![Diagnostic::error(
                    state.next_stage(),
                    format!("internal error: {}", reason),
                    self.file_name.clone(),
                    0,
                    0,
                )]))
            }
        };
        PipelineRun { state, result }
    }

    fn run(
        &self,
        source: &str,
        config: &PipelineConfig,
        state: &mut PipelineState,
    ) -> Result<EmittedShader, Diagnostics> {
        config.validate().map_err(single)?;

        tracing::debug!("{}: preprocessing", self.file_name);
        let preprocessed = Preprocessor::new(config, self.provider.as_ref(), &self.cache)
            .run(source, &self.file_name)?;
        *state = PipelineState::Preprocessed;
        let mut warnings = preprocessed.diagnostics.clone().into_vec();

        tracing::debug!("{}: tokenizing", self.file_name);
        let (tokens, files) = tokenize(&preprocessed, config.strict_error_recovery)?;
        *state = PipelineState::Tokenized;

        tracing::debug!("{}: parsing {} tokens", self.file_name, tokens.len());
        let outcome = parse_program(tokens, files, config.strict_error_recovery);
        if !outcome.errors.is_empty() {
            return Err(collect(outcome.errors));
        }
        let mut unit: ProgramUnit = outcome.unit;
        *state = PipelineState::Parsed;

        tracing::debug!(
            "{}: running {} transform(s)",
            self.file_name,
            config.enabled_transforms.len()
        );
        let mut ctx = RewriteContext::new(config.target_profile);
        run_transforms(&mut unit, &config.enabled_transforms, &mut ctx).map_err(single)?;
        *state = PipelineState::Transformed;

        let source_text = Emitter::emit(&unit).map_err(single)?;
        let metadata = metadata::collect(&unit, &preprocessed.hints).map_err(single)?;
        for candidate in &preprocessed.hints.uniform_candidates {
            if !metadata.uniform_names().any(|name| name == candidate) {
                warnings.push(Diagnostic {
                    stage: Stage::Transform,
                    severity: Severity::Info,
                    message: format!("uniform '{}' is not declared in the emitted shader", candidate),
                    file: self.file_name.clone(),
                    line: 0,
                    column: 0,
                });
            }
        }
        *state = PipelineState::Emitted;
        tracing::debug!("{}: emitted {} bytes", self.file_name, source_text.len());

        Ok(EmittedShader {
            content_hash: hash_source(&source_text),
            source_text,
            declared_uniforms: metadata.uniforms,
            declared_attributes: metadata.attributes,
            required_extensions: metadata.required_extensions,
            warnings,
        })
    }
}

fn single(err: GlintError) -> Diagnostics {
    Diagnostics::from(vec![err.into_diagnostic()])
}

fn collect(errors: Vec<GlintError>) -> Diagnostics {
    Diagnostics::from(errors.into_iter().map(GlintError::into_diagnostic).collect::<Vec<_>>())
}

fn tokenize(preprocessed: &PreprocessOutput, strict: bool) -> Result<(Vec<Token>, Vec<String>), Diagnostics> {
    let mut lexer = Lexer::with_source_map(&preprocessed.text, &preprocessed.source_map);
    let tokens = if strict {
        lexer.tokenize().map_err(single)?
    } else {
        let (tokens, errors) = lexer.tokenize_recovering();
        if !errors.is_empty() {
            return Err(collect(errors));
        }
        tokens
    };
    Ok((tokens, lexer.file_names()))
}

/// Run the pipeline on a self-contained shader (no includes).
pub fn process(source: &str, config: &PipelineConfig) -> Result<EmittedShader, Diagnostics> {
    Pipeline::new(Arc::new(MemorySourceProvider::new())).process(source, config)
}
