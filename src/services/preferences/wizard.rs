//! 三步向导的步骤门控
//!
//! 步骤 0 始终可访问；步骤 1 和 2 仅在步骤 0 完成后可访问，二者互不依赖。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 向导步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    /// 文件选择
    FilePreferences = 0,
    /// 函数/类选择
    SymbolPreferences = 1,
    /// 格式与确认
    Finalize = 2,
}

impl WizardStep {
    pub const ALL: [WizardStep; 3] = [
        WizardStep::FilePreferences,
        WizardStep::SymbolPreferences,
        WizardStep::Finalize,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WizardStep {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WizardStep::FilePreferences),
            1 => Ok(WizardStep::SymbolPreferences),
            2 => Ok(WizardStep::Finalize),
            other => Err(other),
        }
    }
}

/// 步骤显示状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Active,
    Accessible,
    Locked,
}

/// 向导状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardState {
    completed: BTreeSet<WizardStep>,
    current: WizardStep,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            completed: BTreeSet::new(),
            current: WizardStep::FilePreferences,
        }
    }
}

impl WizardState {
    /// 从持久化的当前步骤恢复，已完成集合为空
    ///
    /// 不可访问的步骤回退到步骤 0
    pub fn restored(current: u8) -> Self {
        let mut wizard = Self::default();
        if let Ok(step) = WizardStep::try_from(current) {
            wizard.go_to(step);
        }
        wizard
    }

    pub fn current(&self) -> WizardStep {
        self.current
    }

    pub fn completed(&self) -> &BTreeSet<WizardStep> {
        &self.completed
    }

    pub fn is_completed(&self, step: WizardStep) -> bool {
        self.completed.contains(&step)
    }

    pub fn is_accessible(&self, step: WizardStep) -> bool {
        step == WizardStep::FilePreferences || self.is_completed(WizardStep::FilePreferences)
    }

    pub fn status(&self, step: WizardStep) -> StepStatus {
        if self.is_completed(step) {
            StepStatus::Completed
        } else if self.is_accessible(step) {
            if self.current == step {
                StepStatus::Active
            } else {
                StepStatus::Accessible
            }
        } else {
            StepStatus::Locked
        }
    }

    /// 跳转到步骤，不可访问时返回 false
    pub fn go_to(&mut self, step: WizardStep) -> bool {
        if !self.is_accessible(step) {
            return false;
        }
        self.current = step;
        true
    }

    /// 标记步骤完成（只增不减）
    pub fn mark_completed(&mut self, step: WizardStep) {
        self.completed.insert(step);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
