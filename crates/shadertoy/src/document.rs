//! Parsing and validation of Shadertoy definition payloads.
//!
//! The payload is walked as a loose [`serde_json::Value`] rather than through
//! derived structs: the API omits fields freely, older payloads use different
//! key names, and every rejection needs to say exactly which part of the
//! document was wrong.
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ContentId;

/// Number of texture channels a shader can sample (`iChannel0..3`).
pub const CHANNEL_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("definition is not valid JSON: {0}")]
    Malformed(String),
    #[error("remote rejected the request: {0}")]
    RemoteRejected(String),
    #[error("definition does not match the expected schema: {0}")]
    SchemaViolation(String),
    #[error("definition uses an unsupported feature: {0}")]
    UnsupportedFeature(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
    Mipmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerConfig {
    pub filter: FilterMode,
    pub wrap: WrapMode,
    pub vflip: bool,
    pub srgb: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub channel: usize,
    /// Media path exactly as referenced by the definition.
    pub source: String,
    pub sampler: SamplerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderMetadata {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDefinition {
    pub id: ContentId,
    /// Fragment body defining `mainImage`, without any prelude.
    pub body: String,
    pub bindings: [Option<ResourceBinding>; CHANNEL_COUNT],
    pub metadata: ShaderMetadata,
}

impl ContentDefinition {
    pub fn bindings(&self) -> impl Iterator<Item = &ResourceBinding> {
        self.bindings.iter().flatten()
    }

    /// Channel occupancy as a compact string such as `"x.x."`.
    pub fn channel_summary(&self) -> String {
        self.bindings
            .iter()
            .map(|slot| if slot.is_some() { 'x' } else { '.' })
            .collect()
    }
}

/// Validates a raw definition payload for `id` and extracts the image pass.
pub fn parse(id: &ContentId, bytes: &[u8]) -> Result<ContentDefinition, ParseError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|err| ParseError::Malformed(err.to_string()))?;

    if let Some(message) = root.get("Error").and_then(Value::as_str) {
        return Err(ParseError::RemoteRejected(message.to_string()));
    }

    let shader = object(&root, "Shader", "top level")?;
    let passes = shader
        .get("renderpass")
        .and_then(Value::as_array)
        .ok_or_else(|| schema("Shader.renderpass must be an array"))?;
    let (image_index, image_pass) = passes
        .iter()
        .enumerate()
        .find(|(_, pass)| pass.get("type").and_then(Value::as_str) == Some("image"))
        .ok_or_else(|| schema("no render pass of type 'image'"))?;
    let image_pass = image_pass
        .as_object()
        .ok_or_else(|| schema("image render pass must be an object"))?;
    let code = image_pass
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| schema("image pass is missing 'code'"))?;
    let inputs = image_pass
        .get("inputs")
        .and_then(Value::as_array)
        .ok_or_else(|| schema("image pass is missing 'inputs'"))?;

    if let Some((index, pass)) = passes
        .iter()
        .enumerate()
        .find(|(index, _)| *index != image_index)
    {
        let kind = pass
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(ParseError::UnsupportedFeature(format!(
            "multi-pass shader (pass {index} has type '{kind}')"
        )));
    }

    let mut bindings: [Option<ResourceBinding>; CHANNEL_COUNT] = Default::default();
    for (index, input) in inputs.iter().enumerate() {
        let binding = parse_input(index, input)?;
        let channel = binding.channel;
        bindings[channel] = Some(binding);
    }

    // Metadata is read last so unsupported inputs win over a missing `info`.
    let info = object_in(shader, "info", "Shader")?;
    let title = string_in(info, "name", "Shader.info")?;
    let author = string_in(info, "username", "Shader.info")?;
    let description = info
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    Ok(ContentDefinition {
        id: id.clone(),
        body: code.replace("\\n", "\n"),
        bindings,
        metadata: ShaderMetadata {
            title: title.to_string(),
            author: author.to_string(),
            description,
        },
    })
}

fn parse_input(index: usize, input: &Value) -> Result<ResourceBinding, ParseError> {
    let input = input
        .as_object()
        .ok_or_else(|| schema(format!("input {index} must be an object")))?;

    let kind = input
        .get("ctype")
        .or_else(|| input.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| schema(format!("input {index} has no kind")))?;
    if kind != "texture" {
        return Err(ParseError::UnsupportedFeature(format!(
            "input {index} has kind '{kind}'; only textures are supported"
        )));
    }

    let context = format!("input {index}");
    let source = string_in(input, "src", &context)?;
    let channel = input
        .get("channel")
        .and_then(channel_index)
        .ok_or_else(|| schema(format!("{context}: 'channel' must be a number in 0..=3")))?;

    let sampler = object_in(input, "sampler", &context)?;
    let sampler_context = format!("{context}.sampler");
    let filter = match string_in(sampler, "filter", &sampler_context)? {
        "mipmap" => FilterMode::Mipmap,
        "linear" => FilterMode::Linear,
        _ => FilterMode::Nearest,
    };
    let wrap = match string_in(sampler, "wrap", &sampler_context)? {
        "repeat" => WrapMode::Repeat,
        _ => WrapMode::Clamp,
    };
    let vflip = flag_in(sampler, "vflip", &sampler_context)?;
    let srgb = flag_in(sampler, "srgb", &sampler_context)?;

    Ok(ResourceBinding {
        channel,
        source: source.to_string(),
        sampler: SamplerConfig {
            filter,
            wrap,
            vflip,
            srgb,
        },
    })
}

fn channel_index(value: &Value) -> Option<usize> {
    let channel = match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|v| v.fract() == 0.0 && *v >= 0.0)
                    .map(|v| v as u64)
            })?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    usize::try_from(channel)
        .ok()
        .filter(|channel| *channel < CHANNEL_COUNT)
}

fn schema(message: impl Into<String>) -> ParseError {
    ParseError::SchemaViolation(message.into())
}

fn object<'a>(
    value: &'a Value,
    key: &str,
    context: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    value
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| schema(format!("{context}: '{key}' must be an object")))
}

fn object_in<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    map.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| schema(format!("{context}: '{key}' must be an object")))
}

fn string_in<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<&'a str, ParseError> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| schema(format!("{context}: '{key}' must be a string")))
}

/// Sampler flags arrive as `"true"`/`"false"` strings; plain booleans are
/// accepted as well.
fn flag_in(map: &Map<String, Value>, key: &str, context: &str) -> Result<bool, ParseError> {
    match map.get(key) {
        Some(Value::String(text)) => Ok(text == "true"),
        Some(Value::Bool(flag)) => Ok(*flag),
        _ => Err(schema(format!("{context}: '{key}' must be a string"))),
    }
}
