use std::path::PathBuf;

use serde::Deserialize;

use merge_control_types::{ControlError, ControlResult};

/// Body of a start request. Flag names match the merge tool's own options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeRequest {
    #[serde(rename = "--copy-tokenizer", default)]
    pub copy_tokenizer: Option<bool>,
    #[serde(rename = "--allow-crimes", default)]
    pub allow_crimes: Option<bool>,
    #[serde(rename = "--out-shard-size", default)]
    pub out_shard_size: Option<ShardSize>,
    #[serde(rename = "--lazy-unpickle", default)]
    pub lazy_unpickle: Option<bool>,
    #[serde(default)]
    pub yaml_file_path: Option<String>,
    #[serde(default)]
    pub merged_folder: Option<String>,
}

/// Shard size accepted either as a plain number or as a tool-formatted
/// string such as `"1B"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ShardSize {
    Count(u64),
    Text(String),
}

impl ShardSize {
    /// The argument value, or `None` when the value is zero or blank.
    fn as_arg(&self) -> Option<String> {
        match self {
            ShardSize::Count(0) => None,
            ShardSize::Count(n) => Some(n.to_string()),
            ShardSize::Text(s) if s.trim().is_empty() => None,
            ShardSize::Text(s) => Some(s.trim().to_string()),
        }
    }
}

/// Validated command line for one merge run.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeInvocation {
    pub program: String,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub copy_tokenizer: bool,
    pub allow_crimes: bool,
    pub out_shard_size: Option<String>,
    pub lazy_unpickle: bool,
}

impl MergeInvocation {
    pub fn from_request(program: &str, request: &MergeRequest) -> ControlResult<Self> {
        let config_path = required(&request.yaml_file_path, "YAML file path not provided")?;
        let output_dir = required(&request.merged_folder, "merged folder not provided")?;

        Ok(Self {
            program: program.to_string(),
            config_path: PathBuf::from(config_path),
            output_dir: PathBuf::from(output_dir),
            copy_tokenizer: request.copy_tokenizer.unwrap_or(false),
            allow_crimes: request.allow_crimes.unwrap_or(false),
            out_shard_size: request.out_shard_size.as_ref().and_then(ShardSize::as_arg),
            lazy_unpickle: request.lazy_unpickle.unwrap_or(false),
        })
    }

    /// Arguments passed to the program: positionals first, then only the
    /// flags that are switched on.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.config_path.to_string_lossy().into_owned(),
            self.output_dir.to_string_lossy().into_owned(),
        ];

        if self.copy_tokenizer {
            args.push("--copy-tokenizer".to_string());
        }

        if self.allow_crimes {
            args.push("--allow-crimes".to_string());
        }

        if let Some(size) = &self.out_shard_size {
            args.push("--out-shard-size".to_string());
            args.push(size.clone());
        }

        if self.lazy_unpickle {
            args.push("--lazy-unpickle".to_string());
        }

        args
    }

    /// Program plus arguments, as recorded in the job registry.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.to_args());
        argv
    }
}

/// The value as sent; blank values count as missing.
fn required<'a>(value: &'a Option<String>, message: &str) -> ControlResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ControlError::invalid_request(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MergeRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_minimal_request_has_only_positionals() {
        let req = parse(r#"{"yaml_file_path": "cfg.yaml", "merged_folder": "out/"}"#);
        let inv = MergeInvocation::from_request("mergekit-yaml", &req).unwrap();
        assert_eq!(inv.argv(), vec!["mergekit-yaml", "cfg.yaml", "out/"]);
    }

    #[test]
    fn test_all_flags_in_order() {
        let req = parse(
            r#"{
                "yaml_file_path": "cfg.yaml",
                "merged_folder": "out",
                "--copy-tokenizer": true,
                "--allow-crimes": true,
                "--out-shard-size": "1B",
                "--lazy-unpickle": true
            }"#,
        );
        let inv = MergeInvocation::from_request("mergekit-yaml", &req).unwrap();
        assert_eq!(
            inv.to_args(),
            vec![
                "cfg.yaml",
                "out",
                "--copy-tokenizer",
                "--allow-crimes",
                "--out-shard-size",
                "1B",
                "--lazy-unpickle",
            ]
        );
    }

    #[test]
    fn test_falsy_values_are_omitted() {
        let req = parse(
            r#"{
                "yaml_file_path": "cfg.yaml",
                "merged_folder": "out",
                "--copy-tokenizer": false,
                "--allow-crimes": null,
                "--out-shard-size": 0,
                "--lazy-unpickle": false
            }"#,
        );
        let inv = MergeInvocation::from_request("mergekit-yaml", &req).unwrap();
        assert_eq!(inv.to_args(), vec!["cfg.yaml", "out"]);

        let req = parse(r#"{"yaml_file_path": "a", "merged_folder": "b", "--out-shard-size": " "}"#);
        let inv = MergeInvocation::from_request("m", &req).unwrap();
        assert!(inv.out_shard_size.is_none());
    }

    #[test]
    fn test_numeric_shard_size() {
        let req = parse(r#"{"yaml_file_path": "a", "merged_folder": "b", "--out-shard-size": 500}"#);
        let inv = MergeInvocation::from_request("m", &req).unwrap();
        assert_eq!(inv.to_args(), vec!["a", "b", "--out-shard-size", "500"]);
    }

    #[test]
    fn test_missing_config_path_is_invalid_request() {
        let req = parse(r#"{"merged_folder": "out"}"#);
        let err = MergeInvocation::from_request("m", &req).unwrap_err();
        assert!(matches!(err, ControlError::InvalidRequest(_)));

        let req = parse(r#"{"yaml_file_path": "", "merged_folder": "out"}"#);
        let err = MergeInvocation::from_request("m", &req).unwrap_err();
        assert!(matches!(err, ControlError::InvalidRequest(_)));
    }

    #[test]
    fn test_paths_are_passed_through_verbatim() {
        let req = parse(r#"{"yaml_file_path": " cfg.yaml", "merged_folder": "out dir "}"#);
        let inv = MergeInvocation::from_request("m", &req).unwrap();
        assert_eq!(inv.config_path, PathBuf::from(" cfg.yaml"));
        assert_eq!(inv.to_args(), vec![" cfg.yaml", "out dir "]);
    }

    #[test]
    fn test_missing_output_dir_is_invalid_request() {
        let req = parse(r#"{"yaml_file_path": "cfg.yaml"}"#);
        let err = MergeInvocation::from_request("m", &req).unwrap_err();
        assert!(matches!(err, ControlError::InvalidRequest(_)));
    }
}
