//! 注入研究助手页面的脚本
//!
//! 脚本都是立即执行函数，返回 `JSON.stringify(...)` 后的字符串，
//! 由 [`parse_outcome`] / [`parse_probe`] 解析。页面结构（输入框、按钮文案）
//! 属于前端，这里只依赖最稳定的几个选择器。

use serde::Deserialize;
use serde_json::Value;

use crate::core::error::AgentError;

/// 提交脚本的返回值
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub ok: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// 是否找到并点击了 Deep Research 开关
    #[serde(default)]
    pub deep_research: bool,
}

/// 构造提交脚本：写入问题、尽量启用 Deep Research、发送
pub fn build_submit_script(query: &str) -> String {
    // serde_json 负责转义引号、换行与 Unicode
    let query_literal = Value::String(query.to_string()).to_string();
    format!(
        r#"
(async function() {{
    const sleep = (ms) => new Promise(r => setTimeout(r, ms));
    const input = document.querySelector('[contenteditable="true"]');
    if (!input) {{
        return JSON.stringify({{ ok: false, reason: 'input not found' }});
    }}
    input.focus();
    input.textContent = {query};
    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
    await sleep(500);

    let deepResearch = false;
    const buttons = Array.from(document.querySelectorAll('button'));
    const toolButton = buttons.find(b =>
        (b.textContent || '').includes('工具') ||
        (b.getAttribute('aria-label') || '').includes('工具') ||
        (b.textContent || '').trim() === 'Tools');
    if (toolButton) {{
        toolButton.click();
        await sleep(800);
        const item = Array.from(document.querySelectorAll('button, [role="menuitem"], [role="menuitemcheckbox"]'))
            .find(el => (el.textContent || '').includes('Deep Research'));
        if (item) {{
            item.click();
            deepResearch = true;
            await sleep(500);
        }} else {{
            document.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Escape', bubbles: true }}));
        }}
    }}

    const send = document.querySelector('button[aria-label="发送"], button[aria-label="Send"], button[aria-label="Send message"]');
    if (send && !send.disabled) {{
        send.click();
    }} else {{
        input.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true }}));
    }}
    return JSON.stringify({{ ok: true, deep_research: deepResearch }});
}})()
"#,
        query = query_literal
    )
}

/// 读取页面可见文本，用于完成检测
pub const PROBE_SCRIPT: &str =
    "JSON.stringify({ text: document.body ? document.body.innerText : '' })";

#[derive(Debug, Deserialize)]
struct ProbeResult {
    text: String,
}

/// 把脚本返回值（JSON 字符串）解析为结构体
fn decode<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, AgentError> {
    let raw = value
        .as_str()
        .ok_or_else(|| AgentError::ActionSubmission(format!("unexpected script result: {}", value)))?;
    serde_json::from_str(raw)
        .map_err(|e| AgentError::ActionSubmission(format!("malformed script result: {}", e)))
}

/// 解析提交结果；`ok: false` 视为提交失败
pub fn parse_outcome(value: &Value) -> Result<SubmitOutcome, AgentError> {
    let outcome: SubmitOutcome = decode(value)?;
    if !outcome.ok {
        let reason = outcome
            .reason
            .clone()
            .unwrap_or_else(|| "interaction target not found".to_string());
        return Err(AgentError::ActionSubmission(reason));
    }
    Ok(outcome)
}

/// 解析探测脚本，返回页面文本
pub fn parse_probe(value: &Value) -> Result<String, AgentError> {
    decode::<ProbeResult>(value).map(|p| p.text)
}
