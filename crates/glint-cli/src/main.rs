use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use glint_core::{Diagnostic, Diagnostics, PipelineConfig, Severity, TargetProfile};
use glint_lang::{EmittedShader, FsSourceProvider, Pipeline};

#[derive(Parser)]
#[command(
    name = "glint",
    version,
    about = "Glint - GLSL preprocessing, rewriting and emission",
    long_about = "Glint runs GLSL shaders through a preprocessor, parser and a list of\nstructural rewrite passes, then emits compiler-ready GLSL plus interface metadata."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that runs the pipeline.
#[derive(clap::Args)]
struct PipelineArgs {
    /// Path to the shader to process
    #[arg()]
    file: PathBuf,

    /// TOML pipeline configuration (profile, macros, transforms)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for #include lookups (default: the shader's directory)
    #[arg(long)]
    include_dir: Option<PathBuf>,

    /// Define a macro, e.g. -D MAX_LIGHTS=8
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    defines: Vec<String>,

    /// Target profile, e.g. glsl330 or essl300
    #[arg(long)]
    profile: Option<String>,

    /// Stop at the first error instead of collecting all of them
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a shader and print the emitted GLSL
    Process {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit JSON with source text and metadata
        #[arg(long)]
        json: bool,
    },

    /// Run the pipeline and report diagnostics only
    Check {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries shader text, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process {
            pipeline,
            output,
            json,
        } => cmd_process(pipeline, output, json),
        Commands::Check { pipeline } => cmd_check(pipeline),
    }
}

/// Parse a `-D NAME=VALUE` argument. A bare `NAME` defines it as `1`.
fn parse_define(define: &str) -> Result<(String, String)> {
    let (name, value) = match define.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (define.trim(), "1"),
    };
    if name.is_empty() {
        anyhow::bail!("invalid macro definition '{}'", define);
    }
    Ok((name.to_string(), value.to_string()))
}

fn build_config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(profile) = &args.profile {
        config.target_profile = profile
            .parse::<TargetProfile>()
            .with_context(|| format!("invalid --profile '{}'", profile))?;
    }
    for define in &args.defines {
        let (name, value) = parse_define(define)?;
        config.defined_macros.insert(name, value);
    }
    if args.strict {
        config.strict_error_recovery = true;
    }
    Ok(config)
}

fn include_root(args: &PipelineArgs) -> PathBuf {
    match &args.include_dir {
        Some(dir) => dir.clone(),
        None => args
            .file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

fn run_pipeline(args: &PipelineArgs) -> Result<Result<EmittedShader, Diagnostics>> {
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read file: {}", args.file.display()))?;
    let config = build_config(args)?;
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.display().to_string());

    let start = Instant::now();
    let pipeline = Pipeline::new(Arc::new(FsSourceProvider::new(include_root(args))))
        .with_file_name(file_name);
    let result = pipeline.process(&source, &config);
    tracing::info!(
        "processed {} for {} in {:.1}ms",
        args.file.display(),
        config.target_profile,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(result)
}

fn report<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) {
    for diagnostic in diagnostics {
        eprintln!("{}", diagnostic);
    }
}

fn failure(diagnostics: &Diagnostics) -> anyhow::Error {
    let count = diagnostics.errors().count();
    anyhow::anyhow!("{} error(s) found", count)
}

#[derive(Serialize)]
struct ProcessReport<'a> {
    file: String,
    #[serde(flatten)]
    shader: &'a EmittedShader,
}

fn cmd_process(args: PipelineArgs, output: Option<PathBuf>, json: bool) -> Result<()> {
    let shader = match run_pipeline(&args)? {
        Ok(shader) => shader,
        Err(diagnostics) => {
            report(diagnostics.iter());
            return Err(failure(&diagnostics));
        }
    };
    report(&shader.warnings);

    let rendered = if json {
        let report = ProcessReport {
            file: args.file.display().to_string(),
            shader: &shader,
        };
        let mut text = serde_json::to_string_pretty(&report).context("failed to serialize result")?;
        text.push('\n');
        text
    } else {
        shader.source_text.clone()
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory: {}", parent.display()))?;
            }
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write output: {}", path.display()))?;
            tracing::info!("wrote {} ({})", path.display(), shader.content_hash);
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_check(args: PipelineArgs) -> Result<()> {
    match run_pipeline(&args)? {
        Ok(shader) => {
            report(&shader.warnings);
            let warnings = shader
                .warnings
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .count();
            println!(
                "{}: ok ({} uniform(s), {} attribute(s), {} warning(s))",
                args.file.display(),
                shader.declared_uniforms.len(),
                shader.declared_attributes.len(),
                warnings
            );
            Ok(())
        }
        Err(diagnostics) => {
            for diagnostic in diagnostics.iter() {
                println!("{}", diagnostic);
            }
            Err(failure(&diagnostics))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: &str) -> PipelineArgs {
        PipelineArgs {
            file: PathBuf::from(file),
            config: None,
            include_dir: None,
            defines: Vec::new(),
            profile: None,
            strict: false,
        }
    }

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("MAX_LIGHTS=8").unwrap(),
            ("MAX_LIGHTS".to_string(), "8".to_string())
        );
        assert_eq!(parse_define("DEBUG").unwrap(), ("DEBUG".to_string(), "1".to_string()));
        assert!(parse_define("=3").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let mut args = args("shaders/main.frag");
        args.defines = vec!["N=4".into()];
        args.profile = Some("essl300".into());
        args.strict = true;
        let config = build_config(&args).unwrap();
        assert_eq!(config.target_profile, TargetProfile::Essl300);
        assert_eq!(config.defined_macros.get("N").map(String::as_str), Some("4"));
        assert!(config.strict_error_recovery);

        args.profile = Some("glsl999".into());
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_include_root_defaults_to_shader_directory() {
        assert_eq!(include_root(&args("shaders/main.frag")), PathBuf::from("shaders"));
        let mut with_dir = args("main.frag");
        with_dir.include_dir = Some(PathBuf::from("lib"));
        assert_eq!(include_root(&with_dir), PathBuf::from("lib"));
    }
}
