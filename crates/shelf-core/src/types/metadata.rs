//! Cookbook metadata.
//!
//! Every cookbook carries a `metadata.json` or a `metadata.rb` naming itself,
//! its version and the cookbooks it depends on. The Ruby form is read with a
//! line scanner that understands the literal `name`, `version` and `depends`
//! forms; anything computed at runtime is ignored.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::constraint::{Constraint, ConstraintSet};
use super::version::Version;
use crate::error::{ShelfError, ShelfResult};

pub const METADATA_JSON: &str = "metadata.json";
pub const METADATA_RB: &str = "metadata.rb";

/// Parsed cookbook metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookMetadata {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl CookbookMetadata {
    /// Create metadata with no dependencies
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: BTreeMap::new(),
            description: None,
            maintainer: None,
            license: None,
        }
    }

    /// Add a dependency
    pub fn depends(mut self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.dependencies.insert(name.into(), constraint);
        self
    }

    /// Find the metadata file in a cookbook directory, preferring JSON
    pub fn locate(dir: &Utf8Path) -> Option<Utf8PathBuf> {
        [METADATA_JSON, METADATA_RB]
            .iter()
            .map(|file| dir.join(file))
            .find(|path| path.is_file())
    }

    /// Load metadata from a cookbook directory
    pub fn from_dir(dir: &Utf8Path) -> ShelfResult<Self> {
        let path = Self::locate(dir).ok_or_else(|| ShelfError::MetadataParse {
            path: dir.to_string(),
            message: format!("neither {} nor {} present", METADATA_JSON, METADATA_RB),
        })?;

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ShelfError::io(format!("Failed to read {}", path), e))?;

        if path.file_name() == Some(METADATA_JSON) {
            Self::from_json_str(&content).map_err(|message| ShelfError::MetadataParse {
                path: path.to_string(),
                message,
            })
        } else {
            Self::from_ruby_str(&content, dir.file_name()).map_err(|message| ShelfError::MetadataParse {
                path: path.to_string(),
                message,
            })
        }
    }

    /// Parse `metadata.json` content
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Parse `metadata.rb` content; `fallback_name` is used when no `name` line exists
    pub fn from_ruby_str(content: &str, fallback_name: Option<&str>) -> Result<Self, String> {
        let mut name = None;
        let mut version = None;
        let mut metadata_fields: BTreeMap<&str, String> = BTreeMap::new();
        let mut dependencies = BTreeMap::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (keyword, rest) = match line.split_once(|c: char| c.is_whitespace() || c == '(') {
                Some((k, r)) => (k, r),
                None => continue,
            };
            let args = quoted_strings(rest);

            match keyword {
                "name" => name = args.into_iter().next(),
                "version" => {
                    if let Some(raw) = args.first() {
                        let parsed = Version::from_str(raw)
                            .map_err(|e| format!("line {}: {}", index + 1, e))?;
                        version = Some(parsed);
                    }
                },
                "depends" => {
                    let mut args = args.into_iter();
                    let Some(dep) = args.next() else {
                        return Err(format!("line {}: depends without a cookbook name", index + 1));
                    };
                    let constraint = match args.next() {
                        Some(text) => Constraint::parse(&text).map_err(|e| format!("line {}: {}", index + 1, e))?,
                        None => Constraint::any(),
                    };
                    dependencies.insert(dep, constraint);
                },
                "description" | "maintainer" | "license" => {
                    if let Some(value) = args.into_iter().next() {
                        metadata_fields.insert(keyword, value);
                    }
                },
                _ => {},
            }
        }

        let name = name
            .or_else(|| fallback_name.map(str::to_string))
            .ok_or_else(|| "missing cookbook name".to_string())?;
        let version = version.ok_or_else(|| "missing literal version".to_string())?;

        Ok(Self {
            name,
            version,
            dependencies,
            description: metadata_fields.remove("description"),
            maintainer: metadata_fields.remove("maintainer"),
            license: metadata_fields.remove("license"),
        })
    }

    /// Render as `metadata.json` content
    pub fn to_json_pretty(&self) -> ShelfResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ShelfError::MetadataParse {
            path: METADATA_JSON.to_string(),
            message: e.to_string(),
        })
    }

    /// Dependencies as one-element constraint sets, in name order
    pub fn requirements(&self) -> impl Iterator<Item = (&str, ConstraintSet)> {
        self.dependencies
            .iter()
            .map(|(name, constraint)| (name.as_str(), ConstraintSet::single(constraint.clone())))
    }
}

/// Extract single- or double-quoted string literals in order of appearance
fn quoted_strings(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '#' => break,
            '"' | '\'' => {
                let literal: String = chars.by_ref().take_while(|&n| n != c).collect();
                out.push(literal);
            },
            _ => {},
        }
    }

    out
}
