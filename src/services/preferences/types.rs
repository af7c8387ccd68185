//! 偏好文档与相关数据类型
//!
//! 这些类型同时是远端存储的线上格式，字段名保持与存储一致。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::inclusion::DirectoryExclusion;
use super::path::normalize;
use super::symbols::PerFileExclusionEntry;
use super::tree::deserialize_opt_id;

/// 将 `null` 视为默认值
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 文档输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DocFormat {
    #[default]
    Html,
    Pdf,
    Markdown,
}

impl DocFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocFormat::Html => "HTML",
            DocFormat::Pdf => "PDF",
            DocFormat::Markdown => "Markdown",
        }
    }

    /// 宽松解析：未知值回退到 HTML
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("Unknown documentation format '{}', falling back to HTML", value);
            DocFormat::Html
        })
    }
}

impl FromStr for DocFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "html" | "htm" => Ok(DocFormat::Html),
            "pdf" => Ok(DocFormat::Pdf),
            "markdown" | "md" => Ok(DocFormat::Markdown),
            other => Err(format!("unsupported format: {}", other)),
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DocFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DocFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(DocFormat::parse_lenient(&value))
    }
}

/// 项目显示设置
///
/// 除 `format` 外的键原样保留
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DocFormat>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProjectSettings {
    /// 按键合并，`update` 中出现的键覆盖当前值
    pub fn merge(&mut self, update: ProjectSettings) {
        if update.format.is_some() {
            self.format = update.format;
        }
        for (key, value) in update.extra {
            self.extra.insert(key, value);
        }
    }
}

/// 偏好文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPreferenceDocument")]
pub struct PreferenceDocument {
    pub directory_exclusion: DirectoryExclusion,
    pub per_file_exclusion: Vec<PerFileExclusionEntry>,
    pub project_settings: ProjectSettings,
    pub format: DocFormat,
    #[serde(rename = "current_Step")]
    pub current_step: u8,
}

impl Default for PreferenceDocument {
    fn default() -> Self {
        Self {
            directory_exclusion: DirectoryExclusion::default(),
            per_file_exclusion: Vec::new(),
            project_settings: ProjectSettings {
                format: Some(DocFormat::Html),
                extra: serde_json::Map::new(),
            },
            format: DocFormat::Html,
            current_step: 0,
        }
    }
}

impl PreferenceDocument {
    /// 有效的文档格式
    pub fn doc_format(&self) -> DocFormat {
        self.format
    }

    /// 同时写入顶层和 project_settings 中的格式
    pub fn set_format(&mut self, format: DocFormat) {
        self.format = format;
        self.project_settings.format = Some(format);
    }
}

/// 存储返回的原始文档，任何字段都可能缺失或为 null
#[derive(Deserialize)]
struct RawPreferenceDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    directory_exclusion: DirectoryExclusion,
    #[serde(default, deserialize_with = "null_as_default")]
    per_file_exclusion: Vec<PerFileExclusionEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    project_settings: ProjectSettings,
    #[serde(default)]
    format: Option<String>,
    #[serde(default, rename = "current_Step", alias = "current_step")]
    current_step: Option<u8>,
}

impl From<RawPreferenceDocument> for PreferenceDocument {
    fn from(raw: RawPreferenceDocument) -> Self {
        // format 优先取顶层，其次取 project_settings，最后默认 HTML
        let format = raw
            .format
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(DocFormat::parse_lenient)
            .or(raw.project_settings.format)
            .unwrap_or_default();

        let mut project_settings = raw.project_settings;
        project_settings.format = Some(format);

        Self {
            directory_exclusion: raw.directory_exclusion.sanitized(),
            per_file_exclusion: PerFileExclusionEntry::sanitize_list(raw.per_file_exclusion),
            project_settings,
            format,
            current_step: raw.current_step.unwrap_or(0).min(2),
        }
    }
}

/// 符号信息（函数或方法）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// 类信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub methods: Vec<SymbolInfo>,
}

/// 单个文件的符号元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default, deserialize_with = "deserialize_opt_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub functions: Vec<SymbolInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classes: Vec<ClassInfo>,
}

impl FileRecord {
    /// 记录键：path / filename / name 中第一个非空值的规范化形式
    pub fn key(&self) -> Option<String> {
        [&self.path, &self.filename, &self.name]
            .into_iter()
            .flatten()
            .map(|s| normalize(s.trim()))
            .find(|s| !s.is_empty())
    }

    /// 是否含有函数或类
    pub fn has_symbols(&self) -> bool {
        !self.functions.is_empty() || !self.classes.is_empty()
    }
}

/// 访问令牌
///
/// Debug 输出时遮蔽中间部分，避免令牌进入日志
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({})", mask_token(&self.0))
    }
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// 文档计划条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanItemKind {
    Function,
    Class,
    Method,
}

/// 文档计划条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PlanItemKind,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
}

/// 文档生成计划
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentationPlan {
    #[serde(default)]
    pub format: DocFormat,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<PlanItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub included_files: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub excluded_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_format_parse() {
        assert_eq!("markdown".parse::<DocFormat>().unwrap(), DocFormat::Markdown);
        assert_eq!("MD".parse::<DocFormat>().unwrap(), DocFormat::Markdown);
        assert_eq!("Pdf".parse::<DocFormat>().unwrap(), DocFormat::Pdf);
        assert!("docx".parse::<DocFormat>().is_err());
        assert_eq!(DocFormat::parse_lenient("docx"), DocFormat::Html);
        assert_eq!(serde_json::to_value(DocFormat::Markdown).unwrap(), json!("Markdown"));
    }

    #[test]
    fn test_document_sanitizes_on_load() {
        let doc: PreferenceDocument = serde_json::from_value(json!({
            "_id": "abc",
            "directory_exclusion": {"exclude_files": ["./lib\\a.py"], "exclude_dirs": null},
            "per_file_exclusion": [
                {"filename": "", "exclude_functions": ["x"]},
                {"filename": "./m.py", "exclude_functions": [], "exclude_classes": null},
                {"filename": "n.py", "exclude_functions": ["f"]}
            ],
            "project_settings": {"theme": "dark"},
            "format": null,
            "current_Step": 2
        }))
        .unwrap();

        assert!(doc.directory_exclusion.exclude_files.contains("lib/a.py"));
        assert_eq!(doc.per_file_exclusion.len(), 1);
        assert_eq!(doc.per_file_exclusion[0].filename, "n.py");
        assert_eq!(doc.format, DocFormat::Html);
        assert_eq!(doc.project_settings.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(doc.current_step, 2);
    }

    #[test]
    fn test_format_resolution_order() {
        let from_settings: PreferenceDocument =
            serde_json::from_value(json!({"project_settings": {"format": "pdf"}})).unwrap();
        assert_eq!(from_settings.doc_format(), DocFormat::Pdf);

        let top_level_wins: PreferenceDocument =
            serde_json::from_value(json!({"format": "markdown", "project_settings": {"format": "pdf"}}))
                .unwrap();
        assert_eq!(top_level_wins.doc_format(), DocFormat::Markdown);
        assert_eq!(top_level_wins.project_settings.format, Some(DocFormat::Markdown));
    }

    #[test]
    fn test_document_wire_shape() {
        let mut doc = PreferenceDocument::default();
        doc.set_format(DocFormat::Pdf);
        doc.current_step = 1;
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["format"], json!("PDF"));
        assert_eq!(value["project_settings"]["format"], json!("PDF"));
        assert_eq!(value["current_Step"], json!(1));
        assert_eq!(value["directory_exclusion"]["exclude_files"], json!([]));
    }

    #[test]
    fn test_file_record_key() {
        let record: FileRecord = serde_json::from_value(json!({
            "_id": 7,
            "path": "",
            "filename": ".\\pkg\\mod.py",
            "functions": null,
            "classes": [{"name": "A", "methods": [{"name": "run", "code": "def run(self): pass"}]}]
        }))
        .unwrap();
        assert_eq!(record.id.as_deref(), Some("7"));
        assert_eq!(record.key().as_deref(), Some("pkg/mod.py"));
        assert!(record.has_symbols());
        assert!(FileRecord::default().key().is_none());
    }

    #[test]
    fn test_credentials_debug_is_masked() {
        let creds = Credentials::new("sk-1234567890abcdef");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("567890"));
        assert!(debug.contains("sk-1"));
    }

    #[test]
    fn test_settings_merge_preserves_unknown_keys() {
        let mut settings: ProjectSettings =
            serde_json::from_value(json!({"format": "HTML", "theme": "dark", "toc": true})).unwrap();
        let update: ProjectSettings =
            serde_json::from_value(json!({"format": "md", "toc": false})).unwrap();
        settings.merge(update);
        assert_eq!(settings.format, Some(DocFormat::Markdown));
        assert_eq!(settings.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(settings.extra.get("toc"), Some(&json!(false)));
    }
}
