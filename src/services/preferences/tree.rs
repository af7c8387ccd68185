//! 文件树节点与遍历器
//!
//! 文件树在会话开始时获取一次，之后只读。所有组件都通过 [`TreeWalk`]
//! 以确定的先序深度优先顺序遍历（子节点保持给定顺序），该顺序同时决定界面列表顺序。

use serde::{Deserialize, Deserializer, Serialize};

use super::path::{node_path, normalize};

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Directory,
    File,
}

/// 文件树节点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawTreeNode")]
pub struct FileTreeNode {
    /// 节点名称
    pub name: String,
    /// 后端提供的权威路径（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 节点类型
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// 子节点（仅目录有效，保持顺序）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileTreeNode>,
    /// 文件 ID（仅文件有效，用于获取文件内容）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// 后端返回的原始节点结构
///
/// `type` 可能是 directory / folder / file，也可能缺失；
/// 缺失时带 `children` 数组的节点视为目录。
#[derive(Deserialize)]
struct RawTreeNode {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    node_type: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    children: Option<Vec<FileTreeNode>>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    id: Option<String>,
}

impl From<RawTreeNode> for FileTreeNode {
    fn from(raw: RawTreeNode) -> Self {
        let kind = match raw.node_type.as_deref().map(str::to_lowercase).as_deref() {
            Some("directory") | Some("folder") | Some("dir") => NodeKind::Directory,
            Some("file") => NodeKind::File,
            _ if raw.children.is_some() => NodeKind::Directory,
            _ => NodeKind::File,
        };

        let (children, id) = match kind {
            NodeKind::Directory => (raw.children.unwrap_or_default(), None),
            NodeKind::File => (Vec::new(), raw.id),
        };

        Self {
            name: raw.name,
            path: raw.path,
            kind,
            children,
            id,
        }
    }
}

/// 反序列化可能为字符串或数字的 ID
pub(crate) fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl FileTreeNode {
    /// 创建目录节点
    pub fn dir(name: impl Into<String>, path: Option<&str>, children: Vec<FileTreeNode>) -> Self {
        Self {
            name: name.into(),
            path: path.map(str::to_string),
            kind: NodeKind::Directory,
            children,
            id: None,
        }
    }

    /// 创建文件节点
    pub fn file(name: impl Into<String>, path: Option<&str>, id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            path: path.map(str::to_string),
            kind: NodeKind::File,
            children: Vec::new(),
            id: id.map(str::to_string),
        }
    }

    /// 空的根节点（文件树获取失败时使用）
    pub fn empty_root() -> Self {
        Self::dir("root", Some(""), Vec::new())
    }

    /// 将根节点锚定为项目容器
    ///
    /// 没有显式路径的根节点取空路径，这样根节点名称不会成为子节点路径前缀。
    pub fn anchored(mut self) -> Self {
        if self.path.is_none() {
            self.path = Some(String::new());
        }
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// 先序遍历
    pub fn walk(&self) -> TreeWalk<'_> {
        TreeWalk::new(self, "")
    }

    /// 从指定父路径开始先序遍历
    pub fn walk_from<'a>(&'a self, parent_path: &str) -> TreeWalk<'a> {
        TreeWalk::new(self, parent_path)
    }

    /// 统计文件数量
    pub fn file_count(&self) -> usize {
        self.walk().filter(|entry| entry.node.is_file()).count()
    }

    /// 按遍历顺序收集所有文件路径
    pub fn file_paths(&self) -> Vec<String> {
        self.walk()
            .filter(|entry| entry.node.is_file())
            .map(|entry| entry.path)
            .collect()
    }
}

/// 遍历项
#[derive(Debug, Clone)]
pub struct WalkEntry<'a> {
    pub node: &'a FileTreeNode,
    /// 深度（起始节点为 0）
    pub depth: u32,
    /// 父节点的规范化路径
    pub parent_path: String,
    /// 本节点的规范化路径
    pub path: String,
}

/// 先序深度优先遍历器（显式栈实现）
pub struct TreeWalk<'a> {
    stack: Vec<(&'a FileTreeNode, u32, String)>,
}

impl<'a> TreeWalk<'a> {
    fn new(root: &'a FileTreeNode, parent_path: &str) -> Self {
        Self {
            stack: vec![(root, 0, normalize(parent_path))],
        }
    }
}

impl<'a> Iterator for TreeWalk<'a> {
    type Item = WalkEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth, parent_path) = self.stack.pop()?;
        let path = node_path(node, &parent_path);

        if node.is_dir() {
            // 逆序入栈，保证按原顺序出栈
            for child in node.children.iter().rev() {
                self.stack.push((child, depth + 1, path.clone()));
            }
        }

        Some(WalkEntry {
            node,
            depth,
            parent_path,
            path,
        })
    }
}

/// 子树路径集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtreePaths {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

/// 收集节点下的所有文件和目录路径
///
/// 节点本身是目录时也包含其自身路径
pub fn collect_subtree(node: &FileTreeNode, parent_path: &str) -> SubtreePaths {
    let mut paths = SubtreePaths::default();
    for entry in node.walk_from(parent_path) {
        if entry.node.is_dir() {
            paths.dirs.push(entry.path);
        } else {
            paths.files.push(entry.path);
        }
    }
    paths
}

/// 查找第一个满足条件的节点（短路）
pub fn find<'a, P>(root: &'a FileTreeNode, mut predicate: P) -> Option<&'a FileTreeNode>
where
    P: FnMut(&WalkEntry<'a>) -> bool,
{
    root.walk().find(|entry| predicate(entry)).map(|entry| entry.node)
}

/// 按规范化路径查找节点，返回遍历项（含父路径）
pub fn find_by_path<'a>(root: &'a FileTreeNode, path: &str) -> Option<WalkEntry<'a>> {
    let target = normalize(path);
    root.walk().find(|entry| entry.path == target)
}
