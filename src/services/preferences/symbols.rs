//! 文件内符号级排除
//!
//! 以规范化文件路径为键，记录每个文件中被排除的函数、类和方法。
//! 类的排除状态会级联到其全部方法，方法名取自文件元数据构建的符号目录。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use super::path::normalize;
use super::types::{null_as_default, FileRecord};

/// 符号类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Functions,
    Classes,
    Methods,
}

/// 单个文件的符号排除集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolExclusion {
    pub excluded_functions: BTreeSet<String>,
    pub excluded_classes: BTreeSet<String>,
    pub excluded_methods: BTreeSet<String>,
}

impl SymbolExclusion {
    pub fn is_empty(&self) -> bool {
        self.excluded_functions.is_empty()
            && self.excluded_classes.is_empty()
            && self.excluded_methods.is_empty()
    }

    fn set_mut(&mut self, kind: SymbolKind) -> &mut BTreeSet<String> {
        match kind {
            SymbolKind::Functions => &mut self.excluded_functions,
            SymbolKind::Classes => &mut self.excluded_classes,
            SymbolKind::Methods => &mut self.excluded_methods,
        }
    }
}

/// 线上格式的单文件排除条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFileExclusionEntry {
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclude_functions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclude_classes: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclude_methods: Vec<String>,
}

impl PerFileExclusionEntry {
    /// 清洗线上列表：规范化文件名、去掉空条目、合并重复文件名
    pub fn sanitize_list(entries: Vec<PerFileExclusionEntry>) -> Vec<PerFileExclusionEntry> {
        SymbolExclusionStore::from_entries(entries).serialize()
    }
}

fn clean_names(names: Vec<String>) -> impl Iterator<Item = String> {
    names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// 符号排除存储
#[derive(Debug, Clone, Default)]
pub struct SymbolExclusionStore {
    entries: BTreeMap<String, SymbolExclusion>,
    /// 文件 -> 类名 -> 方法名列表
    catalog: HashMap<String, HashMap<String, Vec<String>>>,
}

impl SymbolExclusionStore {
    /// 从线上条目构建
    pub fn from_entries(entries: Vec<PerFileExclusionEntry>) -> Self {
        let mut store = Self::default();
        store.replace_entries(entries);
        store
    }

    /// 用线上条目替换当前排除状态，符号目录保持不变
    pub fn replace_entries(&mut self, entries: Vec<PerFileExclusionEntry>) {
        self.entries.clear();
        for entry in entries {
            let file = normalize(entry.filename.trim());
            if file.is_empty() {
                continue;
            }
            let exclusion = self.entries.entry(file).or_default();
            exclusion.excluded_functions.extend(clean_names(entry.exclude_functions));
            exclusion.excluded_classes.extend(clean_names(entry.exclude_classes));
            exclusion.excluded_methods.extend(clean_names(entry.exclude_methods));
        }
        self.entries.retain(|_, e| !e.is_empty());
    }

    /// 根据文件元数据构建类 -> 方法目录
    pub fn set_catalog(&mut self, records: &[FileRecord]) {
        self.catalog.clear();
        for record in records {
            let Some(key) = record.key() else {
                continue;
            };
            let classes = self.catalog.entry(key).or_default();
            for class in &record.classes {
                classes
                    .entry(class.name.clone())
                    .or_default()
                    .extend(class.methods.iter().map(|m| m.name.clone()));
            }
        }
        debug!("Symbol catalog built for {} files", self.catalog.len());
    }

    fn class_methods(&self, file: &str, class: &str) -> Vec<String> {
        self.catalog
            .get(file)
            .and_then(|classes| classes.get(class))
            .cloned()
            .unwrap_or_default()
    }

    /// 翻转成员关系，返回新的排除状态
    fn flip(&mut self, file: &str, kind: SymbolKind, name: &str) -> bool {
        let set = self.entries.entry(file.to_string()).or_default().set_mut(kind);
        let excluded = if set.remove(name) {
            false
        } else {
            set.insert(name.to_string());
            true
        };
        self.prune(file);
        excluded
    }

    fn assign(&mut self, file: &str, kind: SymbolKind, name: &str, exclude: bool) {
        let set = self.entries.entry(file.to_string()).or_default().set_mut(kind);
        if exclude {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    fn cascade_to_methods(&mut self, file: &str, class: &str, exclude: bool) {
        for method in self.class_methods(file, class) {
            self.assign(file, SymbolKind::Methods, &method, exclude);
        }
    }

    fn prune(&mut self, file: &str) {
        if self.entries.get(file).is_some_and(SymbolExclusion::is_empty) {
            self.entries.remove(file);
        }
    }

    /// 切换函数排除状态，返回切换后是否被排除
    pub fn toggle_function(&mut self, file: &str, name: &str) -> bool {
        let file = normalize(file);
        self.flip(&file, SymbolKind::Functions, name)
    }

    /// 切换类排除状态，并将其所有方法设为同样的状态
    pub fn toggle_class(&mut self, file: &str, name: &str) -> bool {
        let file = normalize(file);
        let excluded = self.flip(&file, SymbolKind::Classes, name);
        self.cascade_to_methods(&file, name, excluded);
        self.prune(&file);
        excluded
    }

    /// 切换方法排除状态（不影响所属类）
    pub fn toggle_method(&mut self, file: &str, method: &str, owning_class: Option<&str>) -> bool {
        let file = normalize(file);
        let excluded = self.flip(&file, SymbolKind::Methods, method);
        debug!(
            "Method '{}' (class {:?}) in '{}' excluded={}",
            method, owning_class, file, excluded
        );
        excluded
    }

    /// 批量设置排除状态，类会级联到方法
    pub fn bulk_set<S: AsRef<str>>(&mut self, file: &str, kind: SymbolKind, names: &[S], exclude: bool) {
        let file = normalize(file);
        for name in names {
            let name = name.as_ref();
            self.assign(&file, kind, name, exclude);
            if kind == SymbolKind::Classes {
                self.cascade_to_methods(&file, name, exclude);
            }
        }
        self.prune(&file);
    }

    pub fn is_function_excluded(&self, file: &str, name: &str) -> bool {
        self.get(file)
            .is_some_and(|e| e.excluded_functions.contains(name))
    }

    pub fn is_class_excluded(&self, file: &str, name: &str) -> bool {
        self.get(file)
            .is_some_and(|e| e.excluded_classes.contains(name))
    }

    /// 方法被排除：方法名在排除集合中，或所属类被排除
    pub fn is_method_excluded(&self, file: &str, name: &str, owning_class: Option<&str>) -> bool {
        self.get(file).is_some_and(|e| {
            e.excluded_methods.contains(name)
                || owning_class.is_some_and(|class| e.excluded_classes.contains(class))
        })
    }

    /// 获取文件的排除集合
    pub fn get(&self, file: &str) -> Option<&SymbolExclusion> {
        self.entries.get(&normalize(file))
    }

    /// 清空单个文件的排除
    pub fn reset_file(&mut self, file: &str) {
        self.entries.remove(&normalize(file));
    }

    /// 清空所有排除
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 输出线上格式，只包含非空条目，名称有序
    pub fn serialize(&self) -> Vec<PerFileExclusionEntry> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_empty())
            .map(|(file, e)| PerFileExclusionEntry {
                filename: normalize(file),
                exclude_functions: e.excluded_functions.iter().cloned().collect(),
                exclude_classes: e.excluded_classes.iter().cloned().collect(),
                exclude_methods: e.excluded_methods.iter().cloned().collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::preferences::types::{ClassInfo, SymbolInfo};

    fn record() -> FileRecord {
        FileRecord {
            path: Some("pkg/f.py".to_string()),
            functions: vec![SymbolInfo { name: "helper".to_string(), code: None }],
            classes: vec![ClassInfo {
                name: "C".to_string(),
                code: None,
                methods: vec![
                    SymbolInfo { name: "m1".to_string(), code: None },
                    SymbolInfo { name: "m2".to_string(), code: None },
                ],
            }],
            ..Default::default()
        }
    }

    fn store() -> SymbolExclusionStore {
        let mut store = SymbolExclusionStore::default();
        store.set_catalog(&[record()]);
        store
    }

    #[test]
    fn test_class_cascade_both_directions() {
        let mut store = store();
        assert!(store.toggle_class("pkg/f.py", "C"));
        assert!(store.is_method_excluded("pkg/f.py", "m1", Some("C")));
        assert!(store.is_method_excluded("pkg/f.py", "m2", Some("C")));
        assert!(store.is_method_excluded("pkg/f.py", "m1", None));

        assert!(!store.toggle_class("pkg/f.py", "C"));
        assert!(!store.is_method_excluded("pkg/f.py", "m1", Some("C")));
        assert!(!store.is_method_excluded("pkg/f.py", "m2", Some("C")));
    }

    #[test]
    fn test_including_class_reincludes_individually_excluded_method() {
        let mut store = store();
        store.toggle_method("pkg/f.py", "m1", Some("C"));
        store.toggle_class("pkg/f.py", "C");
        store.toggle_class("pkg/f.py", "C");
        assert!(!store.is_method_excluded("pkg/f.py", "m1", Some("C")));
    }

    #[test]
    fn test_toggle_method_leaves_class_alone() {
        let mut store = store();
        assert!(store.toggle_method("./pkg/f.py", "m2", Some("C")));
        assert!(store.is_method_excluded("pkg/f.py", "m2", Some("C")));
        assert!(!store.is_class_excluded("pkg/f.py", "C"));
    }

    #[test]
    fn test_serialize_drops_empty_entries() {
        let mut store = store();
        store.toggle_function("pkg/f.py", "helper");
        store.toggle_function("other.py", "x");
        store.toggle_function("pkg/f.py", "helper");

        let entries = store.serialize();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "other.py");
        assert_eq!(entries[0].exclude_functions, vec!["x".to_string()]);
    }

    #[test]
    fn test_bulk_set_classes_cascades() {
        let mut store = store();
        store.bulk_set("pkg/f.py", SymbolKind::Classes, &["C"], true);
        assert!(store.is_class_excluded("pkg/f.py", "C"));
        assert_eq!(
            store.get("pkg/f.py").unwrap().excluded_methods,
            ["m1".to_string(), "m2".to_string()].into_iter().collect()
        );

        store.bulk_set("pkg/f.py", SymbolKind::Classes, &["C"], false);
        assert!(store.get("pkg/f.py").is_none());

        store.bulk_set("pkg/f.py", SymbolKind::Functions, &["helper", "other"], true);
        assert!(store.is_function_excluded("pkg/f.py", "other"));
        store.reset_file("pkg/f.py");
        assert!(store.serialize().is_empty());
    }

    #[test]
    fn test_from_entries_merges_duplicates() {
        let store = SymbolExclusionStore::from_entries(vec![
            PerFileExclusionEntry {
                filename: "pkg\\f.py".to_string(),
                exclude_functions: vec!["b".to_string(), " ".to_string()],
                ..Default::default()
            },
            PerFileExclusionEntry {
                filename: "./pkg/f.py".to_string(),
                exclude_functions: vec!["a".to_string()],
                exclude_methods: vec!["m1".to_string()],
                ..Default::default()
            },
            PerFileExclusionEntry {
                filename: "empty.py".to_string(),
                ..Default::default()
            },
        ]);

        let entries = store.serialize();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "pkg/f.py");
        assert_eq!(entries[0].exclude_functions, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(entries[0].exclude_methods, vec!["m1".to_string()]);
    }
}
