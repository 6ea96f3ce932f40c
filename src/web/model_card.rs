//! Model card generation for merged models.
//!
//! Reads a merge configuration document, works out the model name and the
//! list of source models, and renders a README with minijinja.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use minijinja::{context, Environment};
use serde_yaml::Value;

use merge_control_types::{ControlError, ControlResult};

const CARD_TEMPLATE_NAME: &str = "model_card.md";

const CARD_TEMPLATE: &str = r#"---
license: apache-2.0
tags:
- merge
- mergekit
{%- for model in models %}
- {{ model }}
{%- endfor %}
---

# {{ model_name }}

{{ model_name }} is a merge of the following models using [mergekit](https://github.com/cg123/mergekit):
{% for model in models %}
* [{{ model }}](https://huggingface.co/{{ model }})
{%- endfor %}

## Configuration

```yaml
{{ yaml_config }}
```
"#;

/// Everything the card and the upload need from a configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSource {
    pub model_name: String,
    pub models: Vec<String>,
    /// Registry namespace named by the document itself, if any.
    pub user_name: Option<String>,
    pub config_text: String,
}

pub fn load_card_source(config_path: &Path) -> ControlResult<CardSource> {
    let text = fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ControlError::not_found(format!("YAML file not found: {}", config_path.display()))
        } else {
            e.into()
        }
    })?;
    parse_card_source(&text)
}

pub fn parse_card_source(config_text: &str) -> ControlResult<CardSource> {
    let doc: Value = serde_yaml::from_str(config_text)
        .map_err(|e| ControlError::invalid_config(format!("not a YAML document: {e}")))?;
    if !doc.is_mapping() {
        return Err(ControlError::invalid_config("top level must be a mapping"));
    }

    Ok(CardSource {
        model_name: extract_model_name(&doc)?,
        models: extract_models(&doc)?,
        user_name: doc.get("user_name").and_then(Value::as_str).map(str::to_string),
        config_text: config_text.to_string(),
    })
}

/// Source models, by the first matching document shape:
/// a `models` list (entries carrying `parameters`), a top-level `parameters`
/// block over the sources of the first slice, or a `slices` list taking the
/// first source of each slice.
fn extract_models(doc: &Value) -> ControlResult<Vec<String>> {
    if let Some(models) = doc.get("models") {
        let entries = models
            .as_sequence()
            .ok_or_else(|| ControlError::invalid_config("`models` must be a list"))?;
        return entries
            .iter()
            .filter(|entry| entry.get("parameters").is_some())
            .map(model_of)
            .collect();
    }

    if doc.get("parameters").is_some() {
        let first = slices(doc)?
            .first()
            .ok_or_else(|| ControlError::invalid_config("`slices` is empty"))?;
        return sources(first)?.iter().map(model_of).collect();
    }

    if doc.get("slices").is_some() {
        return slices(doc)?
            .iter()
            .map(|slice| {
                let first = sources(slice)?
                    .first()
                    .ok_or_else(|| ControlError::invalid_config("slice has no sources"))?;
                model_of(first)
            })
            .collect();
    }

    Err(ControlError::invalid_config("No models or slices found in yaml config"))
}

fn extract_model_name(doc: &Value) -> ControlResult<String> {
    if let Some(name) = doc.get("MODEL_NAME") {
        return name
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ControlError::invalid_config("`MODEL_NAME` must be a string"));
    }

    doc.get("models")
        .and_then(Value::as_sequence)
        .and_then(|models| models.first())
        .ok_or_else(|| ControlError::invalid_config("no MODEL_NAME and no models list"))
        .and_then(model_of)
}

fn slices(doc: &Value) -> ControlResult<&Vec<Value>> {
    doc.get("slices")
        .and_then(Value::as_sequence)
        .ok_or_else(|| ControlError::invalid_config("`slices` must be a list"))
}

fn sources(slice: &Value) -> ControlResult<&Vec<Value>> {
    slice
        .get("sources")
        .and_then(Value::as_sequence)
        .ok_or_else(|| ControlError::invalid_config("slice `sources` must be a list"))
}

fn model_of(entry: &Value) -> ControlResult<String> {
    entry
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ControlError::invalid_config("entry has no `model` string"))
}

pub fn render_card(source: &CardSource) -> ControlResult<String> {
    let mut env = Environment::new();
    env.add_template(CARD_TEMPLATE_NAME, CARD_TEMPLATE)
        .map_err(|e| ControlError::Template(e.to_string()))?;
    let template = env
        .get_template(CARD_TEMPLATE_NAME)
        .map_err(|e| ControlError::Template(e.to_string()))?;

    template
        .render(context! {
            model_name => &source.model_name,
            models => &source.models,
            yaml_config => source.config_text.trim_end(),
        })
        .map_err(|e| ControlError::Template(e.to_string()))
}

/// Render the card and write it to `<output_dir>/README.md`.
pub fn write_card(output_dir: &Path, source: &CardSource) -> ControlResult<PathBuf> {
    let card = render_card(source)?;
    let path = output_dir.join("README.md");
    fs::write(&path, card)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS_SHAPE: &str = "\
MODEL_NAME: Marcoro14-7B
models:
  - model: mistralai/Mistral-7B-v0.1
  - model: AIDC-ai-business/Marcoroni-7B-v3
    parameters:
      density: 0.53
      weight: 0.4
  - model: EmbeddedLLM/Mistral-7B-Merge-14-v0.1
    parameters:
      density: 0.53
      weight: 0.3
merge_method: dare_ties
base_model: mistralai/Mistral-7B-v0.1
";

    const PARAMETERS_SHAPE: &str = "\
MODEL_NAME: Slerp-7B
user_name: someone
slices:
  - sources:
      - model: OpenPipe/mistral-ft-optimized-1218
        layer_range: [0, 32]
      - model: mlabonne/NeuralHermes-2.5-Mistral-7B
        layer_range: [0, 32]
merge_method: slerp
base_model: OpenPipe/mistral-ft-optimized-1218
parameters:
  t:
    - value: 0.5
";

    const SLICES_SHAPE: &str = "\
MODEL_NAME: Passthrough-9B
slices:
  - sources:
    - model: OpenPipe/mistral-ft-optimized-1218
      layer_range: [0, 32]
  - sources:
    - model: mlabonne/NeuralHermes-2.5-Mistral-7B
      layer_range: [24, 32]
merge_method: passthrough
";

    #[test]
    fn test_models_shape_keeps_entries_with_parameters() {
        let source = parse_card_source(MODELS_SHAPE).unwrap();
        assert_eq!(source.model_name, "Marcoro14-7B");
        assert_eq!(
            source.models,
            vec!["AIDC-ai-business/Marcoroni-7B-v3", "EmbeddedLLM/Mistral-7B-Merge-14-v0.1"]
        );
        assert_eq!(source.user_name, None);
    }

    #[test]
    fn test_parameters_shape_uses_first_slice_sources() {
        let source = parse_card_source(PARAMETERS_SHAPE).unwrap();
        assert_eq!(
            source.models,
            vec!["OpenPipe/mistral-ft-optimized-1218", "mlabonne/NeuralHermes-2.5-Mistral-7B"]
        );
        assert_eq!(source.user_name.as_deref(), Some("someone"));
    }

    #[test]
    fn test_slices_shape_takes_first_source_per_slice() {
        let source = parse_card_source(SLICES_SHAPE).unwrap();
        assert_eq!(
            source.models,
            vec!["OpenPipe/mistral-ft-optimized-1218", "mlabonne/NeuralHermes-2.5-Mistral-7B"]
        );
    }

    #[test]
    fn test_earlier_shape_wins_when_several_match() {
        // `models` beats `parameters` and `slices`
        let doc = "\
MODEL_NAME: Mixed
models:
  - model: org/base
  - model: org/tuned
    parameters:
      weight: 0.5
parameters:
  t: 0.5
slices:
  - sources:
      - model: org/slice-a
      - model: org/slice-b
";
        assert_eq!(parse_card_source(doc).unwrap().models, vec!["org/tuned"]);

        // `parameters` beats `slices`: all sources of the first slice
        let doc = "\
MODEL_NAME: Mixed
parameters:
  t: 0.5
slices:
  - sources:
      - model: org/slice-a
      - model: org/slice-b
  - sources:
      - model: org/slice-c
";
        assert_eq!(
            parse_card_source(doc).unwrap().models,
            vec!["org/slice-a", "org/slice-b"]
        );
    }

    #[test]
    fn test_model_name_falls_back_to_first_model() {
        let source = parse_card_source("models:\n  - model: org/base\n  - model: org/other\n    parameters: {}\n")
            .unwrap();
        assert_eq!(source.model_name, "org/base");
        assert_eq!(source.models, vec!["org/other"]);
    }

    #[test]
    fn test_unrecognized_shape_is_invalid_config() {
        let err = parse_card_source("MODEL_NAME: x\nmerge_method: linear\n").unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));

        let err = parse_card_source("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));

        let err = parse_card_source("MODEL_NAME: x\nslices:\n  - layers: 3\n").unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));
    }

    #[test]
    fn test_render_card_embeds_models_and_config() {
        let source = parse_card_source(PARAMETERS_SHAPE).unwrap();
        let card = render_card(&source).unwrap();

        assert!(card.starts_with("---\nlicense: apache-2.0\n"));
        assert!(card.contains("- mergekit\n- OpenPipe/mistral-ft-optimized-1218\n"));
        assert!(card.contains("# Slerp-7B"));
        assert!(card.contains(
            "* [mlabonne/NeuralHermes-2.5-Mistral-7B](https://huggingface.co/mlabonne/NeuralHermes-2.5-Mistral-7B)"
        ));
        assert!(card.contains("```yaml\nMODEL_NAME: Slerp-7B\n"));
        assert!(card.contains("merge_method: slerp"));
    }

    #[test]
    fn test_write_card() {
        let dir = tempfile::tempdir().unwrap();
        let source = parse_card_source(SLICES_SHAPE).unwrap();
        let path = write_card(dir.path(), &source).unwrap();
        assert_eq!(path, dir.path().join("README.md"));
        assert!(fs::read_to_string(path).unwrap().contains("# Passthrough-9B"));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_card_source(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }
}
