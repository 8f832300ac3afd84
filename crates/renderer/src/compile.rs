//! ShaderToy fragment wrapping.
//!
//! Shader bodies arrive as bare `mainImage` definitions written against the
//! ShaderToy globals. [`wrap_fragment`] turns one into a standalone Vulkan
//! flavoured GLSL 450 fragment shader:
//!
//! 1. Strip `#version` directives and ShaderToy uniform declarations so the
//!    prelude can provide its own definitions.
//! 2. Prepend [`PRELUDE`] which declares the uniform block, the sampler
//!    bindings, the legacy texture macro aliases, and the older
//!    `iChannel[n].resolution`/`.time` struct array.
//! 3. Append [`MAIN_SHIM`] which remaps `gl_FragCoord` to a bottom-left origin,
//!    calls `mainImage`, and writes an opaque colour.

/// Identifiers the prelude defines. Body declarations of these are dropped.
const SHADERTOY_UNIFORMS: [&str; 14] = [
    "iResolution",
    "iTimeDelta",
    "iTime",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
    "iChannelTime",
    "iChannelResolution",
    "iChannel[",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
];

pub fn wrap_fragment(body: &str) -> String {
    let mut sanitized = String::with_capacity(body.len());
    let mut skipped_version = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            continue;
        }
        if trimmed.starts_with("struct Channel") && trimmed.contains('}') {
            continue;
        }
        if trimmed.starts_with("uniform ")
            && SHADERTOY_UNIFORMS
                .iter()
                .any(|name| trimmed.contains(name))
        {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{PRELUDE}\n#line 1\n{sanitized}{MAIN_SHIM}")
}

/// Uniform block layout must match `GpuUniforms` in `gpu/uniforms.rs`.
pub const PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 reel_out_color;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    int _iFrame;
    float _iSampleRate;
    float _padding0;
    vec4 _iMouse;
    vec4 _iDate;
    float _iChannelTime[4];
    vec3 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iGlobalTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrame ubo._iFrame
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iSampleRate ubo._iSampleRate
#define iChannelTime ubo._iChannelTime
#define iChannelResolution ubo._iChannelResolution

struct Channel {
    vec3 resolution;
    float time;
};
Channel iChannel[4];

layout(set = 1, binding = 0) uniform texture2D reel_channel0_texture;
layout(set = 1, binding = 1) uniform sampler reel_channel0_sampler;
layout(set = 1, binding = 2) uniform texture2D reel_channel1_texture;
layout(set = 1, binding = 3) uniform sampler reel_channel1_sampler;
layout(set = 1, binding = 4) uniform texture2D reel_channel2_texture;
layout(set = 1, binding = 5) uniform sampler reel_channel2_sampler;
layout(set = 1, binding = 6) uniform texture2D reel_channel3_texture;
layout(set = 1, binding = 7) uniform sampler reel_channel3_sampler;

#define iChannel0 sampler2D(reel_channel0_texture, reel_channel0_sampler)
#define iChannel1 sampler2D(reel_channel1_texture, reel_channel1_sampler)
#define iChannel2 sampler2D(reel_channel2_texture, reel_channel2_sampler)
#define iChannel3 sampler2D(reel_channel3_texture, reel_channel3_sampler)

#define texture2D texture
#define texture2DLodEXT textureLod
#define texture2DGradEXT textureGrad

vec4 reel_frag_coord;
#define gl_FragCoord reel_frag_coord
";

/// Entry point appended after the body.
pub const MAIN_SHIM: &str = r"void main() {
    #undef gl_FragCoord
    vec2 builtin_coord = gl_FragCoord.xy;
    #define gl_FragCoord reel_frag_coord

    vec2 frag_coord = vec2(builtin_coord.x, iResolution.y - builtin_coord.y);
    reel_frag_coord = vec4(frag_coord, 0.0, 1.0);
    for (int i = 0; i < 4; i++) {
        iChannel[i] = Channel(iChannelResolution[i], iChannelTime[i]);
    }

    vec4 color = vec4(0.0);
    mainImage(color, frag_coord);
    reel_out_color = vec4(color.rgb, 1.0);
}
";

/// Full-screen triangle.
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[gl_VertexIndex];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
