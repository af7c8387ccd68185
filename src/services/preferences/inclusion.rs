//! 目录级包含/排除判定
//!
//! 只存储"排除"，不存储"包含"：不在排除集合中的路径默认被包含，
//! 因此后续新增的文件无需任何迁移即被纳入文档生成范围。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::path::{ancestors, basename, node_path, normalize};
use super::tree::{collect_subtree, FileTreeNode};
use super::types::null_as_default;

/// 默认排除的文件名模式
pub const DEFAULT_FILE_PRESETS: &[&str] = &["__init__.py", "setup.py"];

/// 默认排除的目录名模式
pub const DEFAULT_DIR_PRESETS: &[&str] = &["venv", "__pycache__", "tests", "node_modules"];

/// 目录排除配置（线上格式）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryExclusion {
    /// 被排除的文件路径
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclude_files: BTreeSet<String>,
    /// 被排除的目录路径
    #[serde(default, deserialize_with = "null_as_default")]
    pub exclude_dirs: BTreeSet<String>,
}

impl DirectoryExclusion {
    /// 规范化所有路径并去掉空路径
    pub fn sanitized(self) -> Self {
        fn clean(set: BTreeSet<String>) -> BTreeSet<String> {
            set.iter()
                .map(|p| normalize(p.trim()))
                .filter(|p| !p.is_empty())
                .collect()
        }

        Self {
            exclude_files: clean(self.exclude_files),
            exclude_dirs: clean(self.exclude_dirs),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exclude_files.is_empty() && self.exclude_dirs.is_empty()
    }
}

/// 目录排除的部分更新，缺省的字段保留原值
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryExclusionUpdate {
    #[serde(default)]
    pub exclude_files: Option<BTreeSet<String>>,
    #[serde(default)]
    pub exclude_dirs: Option<BTreeSet<String>>,
}

impl From<DirectoryExclusion> for DirectoryExclusionUpdate {
    fn from(exclusion: DirectoryExclusion) -> Self {
        Self {
            exclude_files: Some(exclusion.exclude_files),
            exclude_dirs: Some(exclusion.exclude_dirs),
        }
    }
}

impl DirectoryExclusion {
    /// 按字段浅合并更新
    pub fn merged(self, update: DirectoryExclusionUpdate) -> Self {
        Self {
            exclude_files: update.exclude_files.unwrap_or(self.exclude_files),
            exclude_dirs: update.exclude_dirs.unwrap_or(self.exclude_dirs),
        }
    }
}

/// 编译后的默认排除模式
#[derive(Debug, Clone)]
pub struct ExclusionPresets {
    files: Vec<glob::Pattern>,
    dirs: Vec<glob::Pattern>,
}

impl ExclusionPresets {
    /// 编译模式，无效模式记录警告后跳过
    pub fn new<S: AsRef<str>>(files: &[S], dirs: &[S]) -> Self {
        Self {
            files: compile_patterns(files),
            dirs: compile_patterns(dirs),
        }
    }

    fn matches_file(&self, name: &str) -> bool {
        self.files.iter().any(|p| p.matches(name))
    }

    fn matches_dir(&self, name: &str) -> bool {
        self.dirs.iter().any(|p| p.matches(name))
    }
}

impl Default for ExclusionPresets {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_PRESETS, DEFAULT_DIR_PRESETS)
    }
}

fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p.as_ref()) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("Invalid exclusion preset '{}': {}", p.as_ref(), e);
                None
            }
        })
        .collect()
}

/// 包含判定器
#[derive(Debug, Clone, Default)]
pub struct InclusionResolver {
    exclusion: DirectoryExclusion,
}

impl InclusionResolver {
    pub fn new(exclusion: DirectoryExclusion) -> Self {
        Self {
            exclusion: exclusion.sanitized(),
        }
    }

    /// 当前排除集合
    pub fn exclusion(&self) -> &DirectoryExclusion {
        &self.exclusion
    }

    /// 整体替换排除集合
    pub fn replace(&mut self, exclusion: DirectoryExclusion) {
        self.exclusion = exclusion.sanitized();
    }

    /// 判断节点是否被包含
    ///
    /// 目录只看自身路径；文件还要检查每一级祖先目录
    pub fn is_included(&self, node: &FileTreeNode, parent_path: &str) -> bool {
        let path = node_path(node, parent_path);
        if node.is_dir() {
            !self.exclusion.exclude_dirs.contains(&path)
        } else {
            self.is_path_included(&path)
        }
    }

    /// 按文件语义判断一个裸路径是否被包含
    pub fn is_path_included(&self, path: &str) -> bool {
        let path = normalize(path);
        if self.exclusion.exclude_files.contains(&path) {
            return false;
        }
        !ancestors(&path)
            .iter()
            .any(|dir| self.exclusion.exclude_dirs.contains(dir))
    }

    /// 设置节点的包含状态
    ///
    /// 目录的包含/排除会级联到整棵子树；文件只影响自身。
    /// 根节点（空路径）本身从不记录在排除集合中。
    pub fn set_included(&mut self, node: &FileTreeNode, parent_path: &str, included: bool) {
        if node.is_file() {
            let path = node_path(node, parent_path);
            if included {
                self.exclusion.exclude_files.remove(&path);
            } else {
                self.exclusion.exclude_files.insert(path);
            }
            return;
        }

        let subtree = collect_subtree(node, parent_path);
        let files = subtree.files.into_iter().filter(|p| !p.is_empty());
        let dirs = subtree.dirs.into_iter().filter(|p| !p.is_empty());

        if included {
            for path in files.chain(dirs) {
                self.exclusion.exclude_files.remove(&path);
                self.exclusion.exclude_dirs.remove(&path);
            }
        } else {
            self.exclusion.exclude_files.extend(files);
            self.exclusion.exclude_dirs.extend(dirs);
        }

        debug!(
            "Directory '{}' set included={} ({} files / {} dirs excluded)",
            node_path(node, parent_path),
            included,
            self.exclusion.exclude_files.len(),
            self.exclusion.exclude_dirs.len()
        );
    }

    /// 应用默认排除模式，返回新增的排除路径数
    pub fn apply_default_exclusions(&mut self, root: &FileTreeNode, presets: &ExclusionPresets) -> usize {
        let before = self.exclusion.exclude_files.len() + self.exclusion.exclude_dirs.len();

        let mut matched_dirs = Vec::new();
        for entry in root.walk() {
            if entry.path.is_empty() {
                continue;
            }
            let name = basename(&entry.path);
            if entry.node.is_file() {
                if presets.matches_file(&name) {
                    self.exclusion.exclude_files.insert(entry.path);
                }
            } else if presets.matches_dir(&name) {
                matched_dirs.push((entry.node, entry.parent_path));
            }
        }

        for (node, parent_path) in matched_dirs {
            self.set_included(node, &parent_path, false);
        }

        let added = self.exclusion.exclude_files.len() + self.exclusion.exclude_dirs.len() - before;
        debug!("Default exclusions added {} paths", added);
        added
    }

    /// 清空所有排除（全部包含）
    pub fn clear(&mut self) {
        self.exclusion = DirectoryExclusion::default();
    }
}
