//! 研究任务：外部入队的不可变值

use serde::{Deserialize, Serialize};

/// 一个研究任务：名称、提交给研究助手的问题、结果输出位置
///
/// 创建后不再修改；执行结束（成功或失败）即丢弃，核心不保留历史。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchTask {
    pub name: String,
    pub query: String,
    /// 相对 `executor.output_dir` 的输出文件，空字符串表示不导出
    #[serde(default)]
    pub output_target: String,
}

impl ResearchTask {
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        output_target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            output_target: output_target.into(),
        }
    }

    /// 名称与问题均非空（HTTP 入口做的唯一形状校验）
    pub fn is_well_formed(&self) -> bool {
        !self.name.trim().is_empty() && !self.query.trim().is_empty()
    }
}
