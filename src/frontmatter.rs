//! Front-matter extraction and validation.
//!
//! A content file starts with an optional metadata block, fenced either as
//! YAML or TOML:
//!
//! ```text
//! ---                      +++
//! title: Getting started   title = "Getting started"
//! order: 2                 order = 2
//! ---                      +++
//! Body markdown…           Body markdown…
//! ```
//!
//! Extraction ([`extract`]) is purely syntactic: it splits the block from the
//! body and parses it into an untyped record. Validation ([`validate`]) then
//! enforces the typed fields. Keeping the two apart lets discovery report a
//! malformed block and a missing title as distinct error kinds.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Untyped front-matter record, exactly as written in the file.
pub type RawFrontmatter = BTreeMap<String, Value>;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("front-matter opened with `{0}` is never closed")]
    Unterminated(&'static str),
    #[error("invalid YAML front-matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid TOML front-matter: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("front-matter must be a mapping of fields")]
    NotAMapping,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field `title`")]
    MissingTitle,
    #[error("field `title` is empty")]
    EmptyTitle,
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    /// Another content file already renders to the same output path.
    #[error("output `{}` is already produced by `{}`", .output.display(), .other.display())]
    DuplicateOutput { output: PathBuf, other: PathBuf },
}

/// A content file split into its metadata record and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub body: String,
    pub frontmatter: RawFrontmatter,
}

/// Validated front-matter.
///
/// `title` is guaranteed non-empty. Fields the pipeline does not interpret
/// are kept in `extra` and handed to templates untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter {
    pub title: String,
    pub description: Option<String>,
    /// Navigation sort key, ascending.
    pub order: Option<i64>,
    /// Layout variant name; `None` selects `default`.
    pub layout: Option<String>,
    /// Explicit navigation section, overriding the directory-derived one.
    pub section: Option<String>,
    /// `false` keeps the page out of navigation.
    pub nav: bool,
    pub extra: BTreeMap<String, Value>,
}

impl Frontmatter {
    /// Frontmatter with just a title, everything else defaulted.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            order: None,
            layout: None,
            section: None,
            nav: true,
            extra: BTreeMap::new(),
        }
    }
}

const YAML_FENCE: &str = "---";
const TOML_FENCE: &str = "+++";

/// Split raw file contents into front-matter and body.
///
/// A file without an opening fence has an empty record and the whole text
/// as body.
pub fn extract(raw: &str) -> Result<Extracted, FrontmatterError> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut lines = text.split_inclusive('\n');
    let first = lines.next().unwrap_or("");
    let fence = match first.trim_end() {
        YAML_FENCE => YAML_FENCE,
        TOML_FENCE => TOML_FENCE,
        _ => {
            return Ok(Extracted {
                body: text.to_string(),
                frontmatter: RawFrontmatter::new(),
            });
        }
    };

    let mut block = String::new();
    let mut consumed = first.len();
    let mut closed = false;
    for line in lines {
        consumed += line.len();
        if line.trim_end() == fence {
            closed = true;
            break;
        }
        block.push_str(line);
    }
    if !closed {
        return Err(FrontmatterError::Unterminated(fence));
    }

    let frontmatter = if fence == YAML_FENCE {
        parse_yaml(&block)?
    } else {
        parse_toml(&block)?
    };

    Ok(Extracted {
        body: text[consumed..].to_string(),
        frontmatter,
    })
}

fn parse_yaml(block: &str) -> Result<RawFrontmatter, FrontmatterError> {
    if block.trim().is_empty() {
        return Ok(RawFrontmatter::new());
    }
    match serde_yaml::from_str::<Value>(block)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(RawFrontmatter::new()),
        _ => Err(FrontmatterError::NotAMapping),
    }
}

fn parse_toml(block: &str) -> Result<RawFrontmatter, FrontmatterError> {
    match toml::from_str::<Value>(block)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(FrontmatterError::NotAMapping),
    }
}

/// Check required fields and lift the recognised ones into typed slots.
pub fn validate(mut raw: RawFrontmatter) -> Result<Frontmatter, ValidationError> {
    let title = match raw.remove("title") {
        None | Some(Value::Null) => return Err(ValidationError::MissingTitle),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "title",
                expected: "a string",
            });
        }
    };
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }

    let description = take_string(&mut raw, "description")?;
    let layout = take_string(&mut raw, "layout")?;
    let section = take_string(&mut raw, "section")?;

    let order = match raw.remove("order") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_i64().ok_or(ValidationError::WrongType {
            field: "order",
            expected: "an integer",
        })?),
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "order",
                expected: "an integer",
            });
        }
    };

    let nav = match raw.remove("nav") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => b,
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "nav",
                expected: "a boolean",
            });
        }
    };

    Ok(Frontmatter {
        title,
        description,
        order,
        layout,
        section,
        nav,
        extra: raw,
    })
}

fn take_string(
    raw: &mut RawFrontmatter,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match raw.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ValidationError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_block_is_split_from_body() {
        let raw = "---\ntitle: Home\norder: 1\n---\n# Welcome\n";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.body, "# Welcome\n");
        assert_eq!(extracted.frontmatter["title"], Value::from("Home"));
        assert_eq!(extracted.frontmatter["order"], Value::from(1));
    }

    #[test]
    fn toml_block_is_split_from_body() {
        let raw = "+++\ntitle = \"Intro\"\ndescription = \"First steps\"\n+++\nBody";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.body, "Body");
        assert_eq!(extracted.frontmatter["description"], Value::from("First steps"));
    }

    #[test]
    fn file_without_fence_has_empty_record() {
        let extracted = extract("Just text\n").unwrap();
        assert!(extracted.frontmatter.is_empty());
        assert_eq!(extracted.body, "Just text\n");
    }

    #[test]
    fn crlf_fences_are_recognised() {
        let extracted = extract("---\r\ntitle: Win\r\n---\r\nBody\r\n").unwrap();
        assert_eq!(extracted.frontmatter["title"], Value::from("Win"));
        assert_eq!(extracted.body, "Body\r\n");
    }

    #[test]
    fn byte_order_mark_is_skipped() {
        let extracted = extract("\u{feff}---\ntitle: Bom\n---\n").unwrap();
        assert_eq!(extracted.frontmatter["title"], Value::from("Bom"));
    }

    #[test]
    fn unterminated_block_is_error() {
        let err = extract("---\ntitle: Oops\nno closing fence\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::Unterminated("---")));
    }

    #[test]
    fn malformed_yaml_is_error() {
        let err = extract("---\ntitle: [unclosed\n---\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::Yaml(_)));
    }

    #[test]
    fn malformed_toml_is_error() {
        let err = extract("+++\ntitle = \n+++\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::Toml(_)));
    }

    #[test]
    fn scalar_yaml_document_is_not_a_mapping() {
        let err = extract("---\njust a string\n---\n").unwrap_err();
        assert!(matches!(err, FrontmatterError::NotAMapping));
    }

    #[test]
    fn validate_requires_title() {
        let mut raw = RawFrontmatter::new();
        raw.insert("description".into(), Value::from("no title here"));
        assert_eq!(validate(raw).unwrap_err(), ValidationError::MissingTitle);
    }

    #[test]
    fn validate_rejects_blank_title() {
        let mut raw = RawFrontmatter::new();
        raw.insert("title".into(), Value::from("   "));
        assert_eq!(validate(raw).unwrap_err(), ValidationError::EmptyTitle);
    }

    #[test]
    fn validate_trims_title_and_keeps_extras() {
        let raw = extract("---\ntitle: '  Guide '\nauthor: Ada\ntags: [a, b]\n---\n")
            .unwrap()
            .frontmatter;
        let fm = validate(raw).unwrap();
        assert_eq!(fm.title, "Guide");
        assert!(fm.nav);
        assert_eq!(fm.extra["author"], Value::from("Ada"));
        assert_eq!(fm.extra["tags"], serde_json::json!(["a", "b"]));
        assert!(!fm.extra.contains_key("title"));
    }

    #[test]
    fn validate_lifts_typed_fields() {
        let raw = extract(
            "---\ntitle: Home\norder: 3\nlayout: home\nsection: footer\nnav: false\n---\n",
        )
        .unwrap()
        .frontmatter;
        let fm = validate(raw).unwrap();
        assert_eq!(fm.order, Some(3));
        assert_eq!(fm.layout.as_deref(), Some("home"));
        assert_eq!(fm.section.as_deref(), Some("footer"));
        assert!(!fm.nav);
    }

    #[test]
    fn fractional_order_is_rejected() {
        let raw = extract("---\ntitle: X\norder: 1.5\n---\n").unwrap().frontmatter;
        assert_eq!(
            validate(raw).unwrap_err(),
            ValidationError::WrongType {
                field: "order",
                expected: "an integer"
            }
        );
    }
}
