//! Task graph documents.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::expand_path;
use crate::error::Imars3dError;

/// A single stage of a [TaskGraph]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StageDescriptor {
    /// Stage name, used in logs and error messages
    pub name: String,
    /// Registry key of the function to call
    pub function: String,
    /// Positional arguments: references or literals
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    /// Keyword options, deserialised into the function's options struct
    #[serde(default)]
    pub kwargs: serde_json::Map<String, serde_json::Value>,
    /// Context names bound to the function's outputs. Empty discards them.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Allow outputs to replace existing context names
    #[serde(default)]
    pub overwrite: bool,
}

/// An ordered list of stages
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskGraph {
    /// Workflow name
    #[serde(default)]
    pub name: Option<String>,
    /// Stages in execution order
    pub stages: Vec<StageDescriptor>,
}

impl TaskGraph {
    /// Load a task graph, choosing YAML or JSON by extension.
    pub fn load(path: &str) -> Result<Self, Imars3dError> {
        let path = expand_path(path);
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        let contents = || std::fs::read_to_string(&path).map_err(|err| Imars3dError::io(&path, err));
        match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml(&contents()?),
            Some("json") => Self::from_json(&contents()?, &path),
            _ => Err(Imars3dError::ExtensionMismatch {
                path,
                expected: ".yaml, .yml or .json".to_string(),
            }),
        }
    }

    pub fn from_yaml(document: &str) -> Result<Self, Imars3dError> {
        Ok(serde_yaml::from_str(document)?)
    }

    fn from_json(document: &str, path: &Path) -> Result<Self, Imars3dError> {
        serde_json::from_str(document).map_err(|source| Imars3dError::InvalidOptions {
            context: path.display().to_string(),
            source,
        })
    }

    /// Display name of the workflow.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }
}

/// A parsed positional argument
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// `$root.field.sub`
    Reference { root: String, path: Vec<String> },
    /// Any other value
    Literal(serde_json::Value),
}

impl Arg {
    /// Parse an argument. Strings starting with `$` are references, `$$` is a literal `$`.
    pub fn parse(value: &serde_json::Value) -> Self {
        match value.as_str() {
            Some(text) if text.starts_with("$$") => {
                Arg::Literal(serde_json::Value::String(text[1..].to_string()))
            }
            Some(text) if text.starts_with('$') => {
                let mut parts = text[1..].split('.').map(str::to_string);
                let root = parts.next().unwrap_or_default();
                Arg::Reference {
                    root,
                    path: parts.collect(),
                }
            }
            _ => Arg::Literal(value.clone()),
        }
    }

    /// Reference text as written in the graph, without the sigil.
    pub fn reference_name(root: &str, path: &[String]) -> String {
        std::iter::once(root)
            .chain(path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};

    #[test]
    fn descriptor_tokens() {
        let stage = StageDescriptor {
            name: "load".to_string(),
            function: "series.open".to_string(),
            args: vec![json!("$config.ct")],
            kwargs: serde_json::Map::new(),
            outputs: vec!["ct".to_string()],
            overwrite: false,
        };
        assert_de_tokens(
            &stage,
            &[
                Token::Struct {
                    name: "StageDescriptor",
                    len: 4,
                },
                Token::Str("name"),
                Token::Str("load"),
                Token::Str("function"),
                Token::Str("series.open"),
                Token::Str("args"),
                Token::Seq { len: Some(1) },
                Token::Str("$config.ct"),
                Token::SeqEnd,
                Token::Str("outputs"),
                Token::Seq { len: Some(1) },
                Token::Str("ct"),
                Token::SeqEnd,
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn descriptor_unknown_field() {
        assert_de_tokens_error::<StageDescriptor>(
            &[
                Token::Struct {
                    name: "StageDescriptor",
                    len: 1,
                },
                Token::Str("func"),
            ],
            "unknown field `func`, expected one of `name`, `function`, `args`, `kwargs`, `outputs`, `overwrite`",
        );
    }

    #[test]
    fn descriptor_missing_function() {
        assert_de_tokens_error::<StageDescriptor>(
            &[
                Token::Struct {
                    name: "StageDescriptor",
                    len: 1,
                },
                Token::Str("name"),
                Token::Str("load"),
                Token::StructEnd,
            ],
            "missing field `function`",
        );
    }

    #[test]
    fn yaml_graph() {
        let graph = TaskGraph::from_yaml(
            r#"
name: reduction
stages:
  - name: load
    function: series.open
    args: ["/data/ct_{}.tiff"]
    kwargs:
      identifiers: [0, 180]
    outputs: [ct]
  - name: tilt
    function: tilt.estimate
    args: [$ct]
    outputs: [tilt]
"#,
        )
        .unwrap();
        assert_eq!("reduction", graph.display_name());
        assert_eq!(2, graph.stages.len());
        assert_eq!(json!([0, 180]), graph.stages[0].kwargs["identifiers"]);
        assert!(!graph.stages[1].overwrite);
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("graph.json");
        std::fs::write(&json_path, r#"{"stages": []}"#).unwrap();
        let graph = TaskGraph::load(&json_path.to_string_lossy()).unwrap();
        assert!(graph.stages.is_empty());
        assert_eq!("workflow", graph.display_name());

        let txt_path = dir.path().join("graph.txt");
        std::fs::write(&txt_path, "stages: []").unwrap();
        assert!(matches!(
            TaskGraph::load(&txt_path.to_string_lossy()),
            Err(Imars3dError::ExtensionMismatch { .. })
        ));
        assert!(matches!(
            TaskGraph::load(&dir.path().join("absent.yaml").to_string_lossy()),
            Err(Imars3dError::NotFound { .. })
        ));
    }

    #[test]
    fn parse_args() {
        assert_eq!(
            Arg::Reference {
                root: "config".to_string(),
                path: vec!["ct".to_string(), "template".to_string()]
            },
            Arg::parse(&json!("$config.ct.template"))
        );
        assert_eq!(Arg::Literal(json!("$5")), Arg::parse(&json!("$$5")));
        assert_eq!(Arg::Literal(json!("ct")), Arg::parse(&json!("ct")));
        assert_eq!(Arg::Literal(json!(1.5)), Arg::parse(&json!(1.5)));
        assert_eq!(
            "config.ct",
            Arg::reference_name("config", &["ct".to_string()])
        );
    }
}
