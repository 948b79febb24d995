//! Prompt construction for the two input modes

use crate::core::models::GenerationOptions;

/// Fixed instruction block of the template prompt
pub const TEMPLATE_INSTRUCTIONS: &str = "请生成一段真诚、温暖、符合中文表达习惯的祝福语。祝福语应该：
1. 符合指定的祝福场合和氛围
2. 针对目标人群使用合适的称呼和语气
3. 内容积极正面，表达美好祝愿
4. 长度适中，大约50-80字
5. 语言流畅自然，避免过于华丽的辞藻";

/// Fixed instruction block of the smart prompt
pub const SMART_INSTRUCTIONS: &str = "请生成一段真诚、个性化、符合情境的祝福语。要求：
1. 深度理解用户描述中的所有细节：人物关系、具体情况、情感背景等
2. 自动识别并恰当使用文中提到的姓名、称呼、关系
3. 根据描述的场景和情境选择最合适的语气和风格
4. 体现对具体情况的理解和针对性关怀
5. 长度适中（50-100字），真诚自然，避免套话模板
6. 语言温暖有力，富有个人色彩和情感共鸣
7. 如果描述中包含特殊背景，要巧妙地体现出来";

const RETURN_ONLY: &str = "请直接返回祝福语内容，不需要其他说明。";

/// Build the prompt for a request, choosing the mode from the options
pub fn build_prompt(options: &GenerationOptions) -> String {
    if options.is_smart_mode() {
        smart_prompt(options.description().unwrap_or_default())
    } else {
        template_prompt(options)
    }
}

/// Prompt built around a free-text description
pub fn smart_prompt(description: &str) -> String {
    format!(
        "请根据以下描述生成一段个性化的祝福语：\n\n用户描述：{}\n\n{}\n\n{}",
        description.trim(),
        SMART_INSTRUCTIONS,
        RETURN_ONLY
    )
}

/// Prompt built from occasion, recipient and style
pub fn template_prompt(options: &GenerationOptions) -> String {
    format!(
        "请为我生成一段祝福语，要求如下：\n- 祝福场合：{}\n- 目标人群：{}\n- 风格：{}\n\n{}\n\n{}",
        options.scenario.trim(),
        options.target_person.trim(),
        options.style_or_default(),
        TEMPLATE_INSTRUCTIONS,
        RETURN_ONLY
    )
}
