//! 路径规范化工具
//!
//! 文件树、排除集合和符号排除表都以规范化后的路径作为唯一标识，
//! 所有路径在存储或比较之前必须经过 [`normalize`]。

use super::tree::FileTreeNode;

/// 规范化路径
///
/// 规则依次为：反斜杠替换为正斜杠；去掉开头重复的 `./`；去掉开头重复的 `/`
pub fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");

    let mut rest = replaced.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped.trim_start_matches('/');
    }

    rest.trim_start_matches('/').to_string()
}

/// 获取文件名（路径最后一段）
pub fn basename(path: &str) -> String {
    let normalized = normalize(path);
    normalized
        .split('/')
        .filter(|part| !part.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or(normalized)
}

/// 获取父目录路径（根级路径返回空字符串）
pub fn dirname(path: &str) -> String {
    let normalized = normalize(path);
    let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() <= 1 {
        return String::new();
    }
    parts[..parts.len() - 1].join("/")
}

/// 拼接路径片段，空片段会被跳过
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined)
}

/// 计算节点路径
///
/// 后端提供了 `path` 时以其为准，否则由父路径和节点名拼出
pub fn node_path(node: &FileTreeNode, parent_path: &str) -> String {
    match node.path.as_deref() {
        Some(path) => normalize(path),
        None => join_path(&[parent_path, node.name.as_str()]),
    }
}

/// 返回路径的所有祖先目录（不含自身），由浅到深
///
/// `a/b/c.py` -> `["a", "a/b"]`
pub fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut dir = dirname(path);
    while !dir.is_empty() {
        let parent = dirname(&dir);
        result.push(dir);
        dir = parent;
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("src\\utils\\helper.py"), "src/utils/helper.py");
        assert_eq!(normalize("./././src/main.py"), "src/main.py");
        assert_eq!(normalize(".//src/main.py"), "src/main.py");
        assert_eq!(normalize("///abs/path.py"), "abs/path.py");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("lib/b.py"), "lib/b.py");
    }

    #[test]
    fn test_basename_dirname() {
        assert_eq!(basename("lib/sub/b.py"), "b.py");
        assert_eq!(basename("b.py"), "b.py");
        assert_eq!(dirname("lib/sub/b.py"), "lib/sub");
        assert_eq!(dirname("b.py"), "");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["", "lib", "b.py"]), "lib/b.py");
        assert_eq!(join_path(&["./lib", "sub", "c.py"]), "lib/sub/c.py");
    }

    #[test]
    fn test_node_path() {
        let explicit = FileTreeNode::file("b.py", Some("\\lib\\b.py"), None);
        assert_eq!(node_path(&explicit, "ignored"), "lib/b.py");

        let derived = FileTreeNode::file("c.py", None, None);
        assert_eq!(node_path(&derived, "lib"), "lib/c.py");
        assert_eq!(node_path(&derived, ""), "c.py");
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("x/y/z.py"), vec!["x".to_string(), "x/y".to_string()]);
        assert!(ancestors("z.py").is_empty());
    }
}
