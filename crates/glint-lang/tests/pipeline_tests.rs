use std::sync::Arc;

use glint_core::{PipelineConfig, Severity, Stage, TargetProfile, TransformSpec};
use glint_lang::symbols::SymbolTable;
use glint_lang::{
    parse_program, process, IncludeCache, Lexer, MemorySourceProvider, Pipeline, PipelineState, ProgramUnit,
};

fn parse(source: &str) -> ProgramUnit {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize().expect("emitted text should lex");
    let outcome = parse_program(tokens, lexer.file_names(), true);
    assert!(outcome.errors.is_empty(), "{:?}\n{}", outcome.errors, source);
    outcome.unit
}

fn inject(source: &str) -> TransformSpec {
    TransformSpec::Inject {
        source: source.to_string(),
    }
}

fn merge(source: &str) -> TransformSpec {
    TransformSpec::Merge {
        source: source.to_string(),
        label: Some("library".to_string()),
    }
}

#[test]
fn test_scenario_a_macro_and_injection() {
    let config = PipelineConfig::new(TargetProfile::Glsl150)
        .with_macro("N", "4")
        .with_transform(inject("uniform vec4 injectedColor;"));
    let shader = process(
        "#version 150\n#define N 4\nuniform float a[N];\nvoid main(){}",
        &config,
    )
    .expect("scenario A should succeed");

    assert_eq!(
        shader.source_text,
        "#version 150\n\nuniform float a[4];\nuniform vec4 injectedColor;\n\nvoid main() {\n}\n"
    );
    let uniforms: Vec<_> = shader
        .declared_uniforms
        .iter()
        .map(|u| (u.name.as_str(), u.ty.as_str()))
        .collect();
    assert_eq!(uniforms, vec![("a", "float[4]"), ("injectedColor", "vec4")]);
    assert!(shader.warnings.is_empty(), "{:?}", shader.warnings);
}

#[test]
fn test_scenario_b_unterminated_conditional() {
    let pipeline = Pipeline::new(Arc::new(MemorySourceProvider::new()));
    let run = pipeline.process_traced(
        "#version 330\n#ifdef FOO\nvoid main() {}\n",
        &PipelineConfig::default(),
    );
    assert_eq!(run.state, PipelineState::Raw);
    let diagnostics = run.result.expect_err("scenario B should fail");
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Preprocess);
    assert_eq!(diagnostic.severity, Severity::Error);
}

#[test]
fn test_determinism() {
    let config = PipelineConfig::default()
        .with_macro("SCALE", "2.0")
        .with_transform(inject("uniform float gain;\nuniform vec3 tint;"))
        .with_transform(merge("vec3 shade(vec3 c) { return c * tint * gain; }"))
        .with_transform(TransformSpec::MarkOutputs);
    let source = "#version 330\nin vec3 color;\nout vec4 frag;\nvec3 shade(vec3 c) { return c; }\n\
                  void main() { frag = vec4(shade(color) * SCALE, 1.0); }";

    let first = process(source, &config).unwrap();
    for _ in 0..5 {
        let again = process(source, &config).unwrap();
        assert_eq!(again.source_text, first.source_text);
        assert_eq!(again.content_hash, first.content_hash);
    }
}

#[test]
fn test_collision_safe_merge() {
    let config = PipelineConfig::default().with_transform(merge(
        "float foo(float x) { return x > 1.0 ? foo(x * 0.5) : x; }\n\
         float useFoo(float v) { return foo(v) + foo(1.0); }",
    ));
    let shader = process(
        "float foo(float x) { return x; }\nvoid main() { float y = foo(2.0); }",
        &config,
    )
    .unwrap();

    let unit = parse(&shader.source_text);
    let symbols = SymbolTable::build(&unit);
    assert_eq!(symbols.lookup("foo").len(), 1);
    assert_eq!(symbols.lookup("foo_1").len(), 1);
    assert!(shader.source_text.contains("return x > 1.0 ? foo_1(x * 0.5) : x;"));
    assert!(shader.source_text.contains("return foo_1(v) + foo_1(1.0);"));
    // the original and its call-site are untouched
    assert!(shader.source_text.contains("float foo(float x) {\n    return x;\n}"));
    assert!(shader.source_text.contains("float y = foo(2.0);"));
}

#[test]
fn test_self_referential_macro_terminates() {
    let mut config = PipelineConfig::default();
    config.max_expansion_depth = 64;
    let diagnostics = process("#define LOOP (LOOP + 1)\nfloat x = LOOP;\n", &config).unwrap_err();
    let diagnostic = diagnostics.errors().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Preprocess);
    assert!(diagnostic.message.contains("LOOP"), "{}", diagnostic.message);
}

#[test]
fn test_errors_point_at_macro_invocation() {
    let source = "#define BROKEN foo(,)\n\nvoid main() {\n    float y = BROKEN;\n}\n";
    let diagnostics = process(source, &PipelineConfig::default()).unwrap_err();
    let diagnostic = diagnostics.errors().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Parse);
    assert_eq!(diagnostic.line, 4);

    let source = "#define ODD(x) x @ x\nvoid main() {\n\n    float y = ODD(1.0);\n}\n";
    let diagnostics = process(source, &PipelineConfig::default()).unwrap_err();
    let diagnostic = diagnostics.errors().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Lex);
    assert_eq!(diagnostic.line, 4);
}

#[test]
fn test_round_trip_is_structurally_equivalent() {
    let source = "#version 430 core\n\
        #extension GL_ARB_shading_language_include : require\n\
        precision highp float;\n\
        layout(std140, binding = 0) uniform Camera { mat4 view; mat4 proj; } camera;\n\
        layout(location = 0) in vec3 position;\n\
        struct Material { vec3 albedo; float roughness; };\n\
        uniform Material materials[4];\n\
        const float weights[3] = float[3](0.25, 0.5, 0.25);\n\
        out vec4 fragColor;\n\
        float blend(float a, float b, float t) { return a + (b - a) * clamp(t, 0.0, 1.0); }\n\
        void main() {\n\
            vec4 p = camera.proj * camera.view * vec4(position, 1.0);\n\
            float acc = 0.0;\n\
            for (int i = 0; i < 3; i++) { acc += weights[i] * materials[i].roughness; }\n\
            int mode = int(acc * 4.0) % 3;\n\
            switch (mode) { case 0: acc = -acc; break; case 1: acc = ~mode > 0 ? acc : 1.0 - acc; break; default: break; }\n\
            if (acc < 0.0 || !(acc <= 1.0)) discard;\n\
            fragColor = vec4(materials[mode].albedo * blend(acc, p.z, 0.5), 1.0);\n\
        }";
    let shader = process(source, &PipelineConfig::new(TargetProfile::Glsl430)).unwrap();
    assert_eq!(parse(source).dump(), parse(&shader.source_text).dump());

    let again = process(&shader.source_text, &PipelineConfig::new(TargetProfile::Glsl430)).unwrap();
    assert_eq!(again.source_text, shader.source_text);
}

#[test]
fn test_includes_share_one_cache() {
    let provider = Arc::new(
        MemorySourceProvider::new()
            .with_file("lib/noise.glsl", "#pragma once\nfloat hash(vec2 p) { return fract(sin(dot(p, vec2(12.9898, 78.233))) * 43758.5453); }"),
    );
    let cache = Arc::new(IncludeCache::new());
    let source = "#version 330\n#include \"lib/noise.glsl\"\nout vec4 c;\nvoid main() { c = vec4(hash(gl_FragCoord.xy)); }";

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let pipeline = Pipeline::new(provider.clone())
                .with_cache(cache.clone())
                .with_file_name("main.frag");
            scope.spawn(move || {
                let shader = pipeline.process(source, &PipelineConfig::default()).unwrap();
                assert!(shader.source_text.contains("float hash(vec2 p) {"));
            });
        }
    });
    assert_eq!(cache.len(), 1);
    assert!(cache.contains("lib/noise.glsl"));
}

#[test]
fn test_missing_include_is_file_not_found() {
    let pipeline = Pipeline::new(Arc::new(MemorySourceProvider::new())).with_file_name("main.frag");
    let diagnostics = pipeline
        .process("#include \"missing.glsl\"\nvoid main() {}", &PipelineConfig::default())
        .unwrap_err();
    let diagnostic = diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Preprocess);
    assert_eq!(diagnostic.file, "main.frag");
    assert!(diagnostic.message.contains("missing.glsl"));
}

#[test]
fn test_capability_stripping_through_config() {
    let config = PipelineConfig::from_toml_str(
        r#"
        target_profile = "glsl330"

        [[enabled_transforms]]
        kind = "strip_capabilities"

        [[enabled_transforms]]
        kind = "require_version"
        version = 330
        profile = "core"
        "#,
    )
    .unwrap();
    let shader = process(
        "#version 150\nuniform dmat4 highPrecision;\n#pragma capability(subroutine)\nvoid emitGeometry() {}\nvoid main() {}",
        &config,
    )
    .unwrap();
    assert_eq!(shader.source_text, "#version 330 core\n\nvoid main() {\n}\n");
    assert!(shader.declared_uniforms.is_empty());
}

#[test]
fn test_dangling_reference_after_strip_fails() {
    let config = PipelineConfig::default().with_transform(TransformSpec::StripCapabilities {
        unsupported: Vec::new(),
    });
    let diagnostics = process(
        "uniform dvec2 offset;\nvoid main() {\n    vec2 p = vec2(offset);\n}",
        &config,
    )
    .unwrap_err();
    let diagnostic = diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Transform);
    assert_eq!(diagnostic.line, 3);
    assert!(diagnostic.message.contains("offset"));
}

#[test]
fn test_merge_rename_is_not_captured_by_library_locals() {
    let config = PipelineConfig::default().with_transform(merge(
        "float foo() { return 1.0; }\nfloat g() { float foo_1 = 2.0; return foo() + foo_1; }",
    ));
    let shader = process("float foo() { return 0.0; }\nvoid main() {}", &config).unwrap();

    assert!(shader.source_text.contains("float foo_2() {"), "{}", shader.source_text);
    assert!(shader.source_text.contains("float foo_1 = 2.0;"), "{}", shader.source_text);
    assert!(shader.source_text.contains("return foo_2() + foo_1;"), "{}", shader.source_text);
    let symbols = SymbolTable::build(&parse(&shader.source_text));
    assert!(!symbols.contains("foo_1"));
}

#[test]
fn test_deep_nesting_is_a_parse_error() {
    let source = format!(
        "void main() {{ float x = {}1.0{}; }}",
        "(".repeat(50_000),
        ")".repeat(50_000)
    );
    let pipeline = Pipeline::new(Arc::new(MemorySourceProvider::new()));
    let run = pipeline.process_traced(&source, &PipelineConfig::default());
    assert_eq!(run.state, PipelineState::Tokenized);
    let diagnostics = run.result.unwrap_err();
    let diagnostic = diagnostics.errors().next().unwrap();
    assert_eq!(diagnostic.stage, Stage::Parse);
    assert!(diagnostic.message.contains("nesting"), "{}", diagnostic.message);

    let source = format!("#if {}1{}\nvoid main() {{}}\n#endif", "(".repeat(50_000), ")".repeat(50_000));
    let diagnostics = process(&source, &PipelineConfig::default()).unwrap_err();
    assert_eq!(diagnostics.errors().next().unwrap().stage, Stage::Preprocess);
}

#[test]
fn test_bindings_lifted_for_old_targets() {
    let config = PipelineConfig::new(TargetProfile::Glsl330).with_transform(TransformSpec::StripCapabilities {
        unsupported: Vec::new(),
    });
    let shader = process(
        "#version 330\nlayout(binding = 0) uniform sampler2D tex;\nout vec4 c;\nvoid main() { c = texture(tex, vec2(0.5)); }",
        &config,
    )
    .unwrap();
    assert!(shader.source_text.contains("\nuniform sampler2D tex;\n"), "{}", shader.source_text);
    assert!(!shader.source_text.contains("binding"), "{}", shader.source_text);
    let tex = &shader.declared_uniforms[0];
    assert_eq!((tex.name.as_str(), tex.binding), ("tex", Some(0)));

    let shader = process(
        "#version 430\nlayout(binding = 0) uniform sampler2D tex;\nvoid main() {}",
        &PipelineConfig::new(TargetProfile::Glsl430).with_transform(TransformSpec::StripCapabilities {
            unsupported: Vec::new(),
        }),
    )
    .unwrap();
    assert!(shader.source_text.contains("binding = 0"), "{}", shader.source_text);
}
