use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declarative rubric item
///
/// The check type lives in the `type` field of the wire form and selects the
/// parameter set. Types this build does not know are kept as
/// `CheckKind::Unknown` so a newer content pack still loads; they grade as a
/// failed check instead of aborting the attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckSpec {
    pub id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub on_pass: Option<String>,
    #[serde(default)]
    pub on_fail: Option<String>,
    #[serde(flatten)]
    pub kind: CheckKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckKind {
    FileExists(FileExistsParams),
    FileTextExact(FileTextExactParams),
    FileLinesCount(FileLinesCountParams),
    FileLinesMatchRegex(FileLinesMatchRegexParams),
    FileSorted(FileSortedParams),
    CommandOutputEqualsFile(CommandOutputParams),
    CmdlogContainsRegex(CmdlogContainsParams),
    CmdlogForbidsRegex(CmdlogForbidsParams),
    Unknown { type_name: String },
}

impl CheckKind {
    /// Wire name of the check type
    pub fn type_name(&self) -> &str {
        match self {
            CheckKind::FileExists(_) => "file_exists",
            CheckKind::FileTextExact(_) => "file_text_exact",
            CheckKind::FileLinesCount(_) => "file_lines_count",
            CheckKind::FileLinesMatchRegex(_) => "file_lines_match_regex",
            CheckKind::FileSorted(_) => "file_sorted",
            CheckKind::CommandOutputEqualsFile(_) => "command_output_equals_file",
            CheckKind::CmdlogContainsRegex(_) => "cmdlog_contains_regex",
            CheckKind::CmdlogForbidsRegex(_) => "cmdlog_forbids_regex",
            CheckKind::Unknown { type_name } => type_name,
        }
    }
}

fn params<T: serde::de::DeserializeOwned, E: de::Error>(fields: Map<String, Value>) -> Result<T, E> {
    serde_json::from_value(Value::Object(fields)).map_err(E::custom)
}

impl<'de> Deserialize<'de> for CheckKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::deserialize(deserializer)?;
        let type_name = match fields.remove("type") {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "check type must be a string, got {}",
                    other
                )))
            }
            None => return Err(de::Error::missing_field("type")),
        };

        Ok(match type_name.as_str() {
            "file_exists" => CheckKind::FileExists(params(fields)?),
            "file_text_exact" => CheckKind::FileTextExact(params(fields)?),
            "file_lines_count" => CheckKind::FileLinesCount(params(fields)?),
            "file_lines_match_regex" => CheckKind::FileLinesMatchRegex(params(fields)?),
            "file_sorted" => CheckKind::FileSorted(params(fields)?),
            "command_output_equals_file" => CheckKind::CommandOutputEqualsFile(params(fields)?),
            "cmdlog_contains_regex" => CheckKind::CmdlogContainsRegex(params(fields)?),
            "cmdlog_forbids_regex" => CheckKind::CmdlogForbidsRegex(params(fields)?),
            _ => CheckKind::Unknown { type_name },
        })
    }
}

fn default_true() -> bool {
    true
}

/// Text normalization applied to both sides of a comparison.
/// Each rule toggles independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeSpec {
    #[serde(default = "default_true")]
    pub normalize_crlf: bool,
    #[serde(default)]
    pub trim_trailing_whitespace: bool,
    #[serde(default)]
    pub trim_final_newline: bool,
}

impl Default for NormalizeSpec {
    fn default() -> Self {
        Self {
            normalize_crlf: true,
            trim_trailing_whitespace: false,
            trim_final_newline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExistsParams {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTextExactParams {
    pub path: String,
    pub expected: String,
    #[serde(default)]
    pub normalize: NormalizeSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLinesCountParams {
    pub path: String,
    #[serde(default)]
    pub equals: Option<usize>,
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLinesMatchRegexParams {
    pub path: String,
    pub pattern: String,
    /// `all_lines`, `any_line` or `min_matches`; kept as text so an
    /// unsupported mode grades as a failure instead of a load error
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub min_matches: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Lex,
    CaseInsensitive,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSortedParams {
    pub path: String,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub key: SortKey,
    /// 1-based column; absent or 0 means the whole line
    #[serde(default)]
    pub column: Option<usize>,
    /// Column separator; whitespace when absent
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutputParams {
    pub command: String,
    pub expected_path: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub normalize: NormalizeSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdlogContainsParams {
    pub pattern: String,
    #[serde(default)]
    pub min_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdlogForbidsParams {
    pub pattern: String,
}
