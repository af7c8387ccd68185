//! 本地计划预览与计数

use serde::Serialize;

use super::inclusion::InclusionResolver;
use super::symbols::SymbolExclusionStore;
use super::types::{DocFormat, DocumentationPlan, FileRecord, PlanItem, PlanItemKind};

/// 单类条目的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemCount {
    pub total: usize,
    pub included: usize,
    pub excluded: usize,
}

impl ItemCount {
    fn add(&mut self, included: bool) {
        self.total += 1;
        if included {
            self.included += 1;
        } else {
            self.excluded += 1;
        }
    }

    fn merge(self, other: ItemCount) -> ItemCount {
        ItemCount {
            total: self.total + other.total,
            included: self.included + other.included,
            excluded: self.excluded + other.excluded,
        }
    }
}

/// 被包含文件中的函数/类/方法计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FunctionClassCounts {
    pub functions: ItemCount,
    pub classes: ItemCount,
    pub methods: ItemCount,
}

/// 全部条目计数（文件 + 符号）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllItemCounts {
    pub files: ItemCount,
    pub functions: ItemCount,
    pub classes: ItemCount,
    pub methods: ItemCount,
    pub overall: ItemCount,
}

/// 目录级被包含的文件记录，附带其规范化键
pub fn included_records<'a>(
    records: &'a [FileRecord],
    resolver: &'a InclusionResolver,
) -> impl Iterator<Item = (String, &'a FileRecord)> + 'a {
    records
        .iter()
        .filter_map(|record| record.key().map(|key| (key, record)))
        .filter(|(key, _)| resolver.is_path_included(key))
}

pub fn function_class_counts(
    records: &[FileRecord],
    resolver: &InclusionResolver,
    symbols: &SymbolExclusionStore,
) -> FunctionClassCounts {
    let mut counts = FunctionClassCounts::default();

    for (key, record) in included_records(records, resolver) {
        for function in &record.functions {
            counts
                .functions
                .add(!symbols.is_function_excluded(&key, &function.name));
        }
        for class in &record.classes {
            counts.classes.add(!symbols.is_class_excluded(&key, &class.name));
            for method in &class.methods {
                counts
                    .methods
                    .add(!symbols.is_method_excluded(&key, &method.name, Some(&class.name)));
            }
        }
    }

    counts
}

pub fn all_item_counts(
    records: &[FileRecord],
    resolver: &InclusionResolver,
    symbols: &SymbolExclusionStore,
) -> AllItemCounts {
    let mut files = ItemCount::default();
    for record in records {
        if let Some(key) = record.key() {
            files.add(resolver.is_path_included(&key));
        }
    }

    let symbol_counts = function_class_counts(records, resolver, symbols);
    let overall = files
        .merge(symbol_counts.functions)
        .merge(symbol_counts.classes)
        .merge(symbol_counts.methods);

    AllItemCounts {
        files,
        functions: symbol_counts.functions,
        classes: symbol_counts.classes,
        methods: symbol_counts.methods,
        overall,
    }
}

/// 按当前工作状态在本地计算文档计划
///
/// 与远端计划使用相同的包含语义，用于保存前预览
pub fn preview_plan(
    records: &[FileRecord],
    resolver: &InclusionResolver,
    symbols: &SymbolExclusionStore,
    format: DocFormat,
) -> DocumentationPlan {
    let mut plan = DocumentationPlan {
        format,
        ..Default::default()
    };

    for record in records {
        let Some(key) = record.key() else {
            continue;
        };
        if !resolver.is_path_included(&key) {
            plan.excluded_files.push(key);
            continue;
        }

        for function in &record.functions {
            if !symbols.is_function_excluded(&key, &function.name) {
                plan.items.push(PlanItem {
                    name: function.name.clone(),
                    kind: PlanItemKind::Function,
                    file: key.clone(),
                    parent_class: None,
                });
            }
        }

        for class in &record.classes {
            if !symbols.is_class_excluded(&key, &class.name) {
                plan.items.push(PlanItem {
                    name: class.name.clone(),
                    kind: PlanItemKind::Class,
                    file: key.clone(),
                    parent_class: None,
                });
            }
            for method in &class.methods {
                if !symbols.is_method_excluded(&key, &method.name, Some(&class.name)) {
                    plan.items.push(PlanItem {
                        name: method.name.clone(),
                        kind: PlanItemKind::Method,
                        file: key.clone(),
                        parent_class: Some(class.name.clone()),
                    });
                }
            }
        }

        plan.included_files.push(key);
    }

    plan.total_items = plan.items.len();
    plan
}
