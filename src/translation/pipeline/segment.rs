//! 分段结果的数据类型

use std::fmt;

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::get_node_name;

/// 上下文分隔标记
pub const CONTEXT_MARKER: &str = "...";

/// 段落文本的内容指纹（blake3 十六进制摘要）
///
/// 只由修剪后的文本决定，与上下文和位置无关。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        Self(blake3::hash(text.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 日志里只需要前缀
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// 相邻段落的上下文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentContext {
    pub before: Option<String>,
    pub after: Option<String>,
}

impl SegmentContext {
    pub fn is_empty(&self) -> bool {
        self.before.is_none() && self.after.is_none()
    }
}

/// 一次翻译调用对应的连续文本
#[derive(Clone)]
pub struct Segment {
    /// 按文档顺序排列的文本叶子（不拥有）
    pub leaves: Vec<Handle>,
    /// 拼接并修剪后的文本，非空
    pub text: String,
    /// 段落起点所在的块级祖先
    pub anchor_top: Handle,
    /// 最后触及的元素
    pub anchor_bottom: Handle,
    pub context: SegmentContext,
    pub fingerprint: Fingerprint,
}

impl Segment {
    pub fn new(leaves: Vec<Handle>, text: &str, anchor_top: Handle, anchor_bottom: Handle) -> Self {
        let text = text.trim().to_string();
        let fingerprint = Fingerprint::of(&text);
        Self {
            leaves,
            text,
            anchor_top,
            anchor_bottom,
            context: SegmentContext::default(),
            fingerprint,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// 发送给翻译服务的文本：有上下文时写成 `before... text ...after`
    ///
    /// 上下文里的 `...` 会被改写，保证每个分隔标记只出现一次。
    pub fn payload(&self) -> String {
        let mut payload = String::new();
        if let Some(before) = &self.context.before {
            payload.push_str(clean_context(before).trim_end_matches('.'));
            payload.push_str(CONTEXT_MARKER);
            payload.push(' ');
        }
        payload.push_str(&self.text);
        if let Some(after) = &self.context.after {
            payload.push(' ');
            payload.push_str(CONTEXT_MARKER);
            payload.push_str(clean_context(after).trim_start_matches('.'));
        }
        payload
    }

    /// 从译文中去掉上下文部分
    ///
    /// 优先按标记切分；标记被翻译服务改写时退化为去掉首尾各一个空白分隔的词。
    pub fn strip_context(&self, translated: &str) -> String {
        let mut out = translated.trim();
        if self.context.before.is_some() {
            out = match out.find(CONTEXT_MARKER) {
                Some(index) => &out[index + CONTEXT_MARKER.len()..],
                None => drop_first_token(out),
            };
        }
        if self.context.after.is_some() {
            out = match out.rfind(CONTEXT_MARKER) {
                Some(index) => &out[..index],
                None => drop_last_token(out),
            };
        }
        out.trim().to_string()
    }
}

fn clean_context(context: &str) -> String {
    context.trim().replace(CONTEXT_MARKER, "…")
}

fn drop_first_token(text: &str) -> &str {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(index) => &text[index..],
        None => text,
    }
}

fn drop_last_token(text: &str) -> &str {
    let text = text.trim_end();
    match text.rfind(char::is_whitespace) {
        Some(index) => &text[..index],
        None => text,
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("text", &self.text)
            .field("leaves", &self.leaves.len())
            .field("anchor_top", &get_node_name(&self.anchor_top))
            .field("anchor_bottom", &get_node_name(&self.anchor_bottom))
            .field("context", &self.context)
            .field("fingerprint", &self.fingerprint.to_string())
            .finish()
    }
}
