//! # glint-lang
//!
//! GLSL front end for the Glint shader pipeline.
//! Preprocesses and parses shader source into an arena AST, runs the
//! configured rewrite passes over it and emits GLSL text plus metadata.

pub mod ast;
pub mod emitter;
pub mod lexer;
pub mod metadata;
pub mod parser;
pub mod pipeline;
pub mod preprocessor;
pub mod source;
pub mod symbols;
pub mod transform;
pub mod visitor;

pub use ast::{Ast, NodeId, NodeKind, ProgramUnit};
pub use emitter::Emitter;
pub use lexer::{Lexer, Token, TokenKind};
pub use metadata::{AttributeInfo, ShaderMetadata, UniformInfo};
pub use parser::{parse_program, Parser};
pub use pipeline::{process, EmittedShader, Pipeline, PipelineRun, PipelineState};
pub use preprocessor::Preprocessor;
pub use source::{FsSourceProvider, IncludeCache, MemorySourceProvider, SourceProvider};
pub use symbols::{RewriteContext, SymbolTable};
pub use transform::Transform;
pub use visitor::{VisitAction, Visitor};
