//! 节点边界分类
//!
//! 判断一个结构节点在分段时是可以跨越的行内节点、需要断开的块级节点，
//! 还是整棵子树都要跳过的节点。

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::dom::{get_node_attr, get_node_name};
use crate::parsers::html::style::{Display, StyleResolver};
use crate::translation::config::Setting;

/// 节点的边界信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryInfo {
    pub is_inline: bool,
    pub is_skipped: bool,
    pub is_translatable: bool,
}

impl BoundaryInfo {
    const SKIPPED: Self = Self {
        is_inline: false,
        is_skipped: true,
        is_translatable: false,
    };

    const BLOCK: Self = Self {
        is_inline: false,
        is_skipped: false,
        is_translatable: true,
    };
}

/// 边界分类器，结果只取决于节点自身
#[derive(Clone)]
pub struct BoundaryClassifier {
    setting: Rc<Setting>,
    style: Rc<dyn StyleResolver>,
}

impl BoundaryClassifier {
    pub fn new(setting: Rc<Setting>, style: Rc<dyn StyleResolver>) -> Self {
        Self { setting, style }
    }

    pub fn setting(&self) -> &Setting {
        &self.setting
    }

    pub fn style(&self) -> &Rc<dyn StyleResolver> {
        &self.style
    }

    pub fn classify(&self, node: &Handle) -> BoundaryInfo {
        let tag = match &node.data {
            NodeData::Element { .. } => get_node_name(node).unwrap_or_default(),
            NodeData::Text { .. } => {
                return BoundaryInfo {
                    is_inline: true,
                    is_skipped: false,
                    is_translatable: true,
                }
            }
            NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } | NodeData::Doctype { .. } => {
                return BoundaryInfo::SKIPPED
            }
            // 文档根和片段根
            NodeData::Document => return BoundaryInfo::BLOCK,
        };

        if self.is_skip_tagged(node) || self.is_opted_out(node) || self.is_editable(node) {
            return BoundaryInfo::SKIPPED;
        }

        let display = self.style.display(node);
        if display == Display::None {
            return BoundaryInfo::SKIPPED;
        }

        BoundaryInfo {
            is_inline: self.setting.is_inline_tag(tag) || display.is_inline_like(),
            is_skipped: false,
            is_translatable: true,
        }
    }

    /// 标签在跳过列表中，或是注入的宿主标记
    pub fn is_skip_tagged(&self, node: &Handle) -> bool {
        get_node_name(node).is_some_and(|tag| {
            self.setting.is_skip_tag(tag) || tag.eq_ignore_ascii_case(&self.setting.host_tag)
        })
    }

    pub fn is_host_marker(&self, node: &Handle) -> bool {
        get_node_name(node).is_some_and(|tag| tag.eq_ignore_ascii_case(&self.setting.host_tag))
    }

    /// `translate="no"` 或 `notranslate` 类
    pub fn is_opted_out(&self, node: &Handle) -> bool {
        if get_node_attr(node, "translate").is_some_and(|v| v.trim().eq_ignore_ascii_case("no")) {
            return true;
        }
        get_node_attr(node, "class")
            .is_some_and(|class| class.split_ascii_whitespace().any(|c| c == "notranslate"))
    }

    pub fn is_editable(&self, node: &Handle) -> bool {
        get_node_attr(node, "contenteditable").is_some_and(|value| {
            let value = value.trim().to_ascii_lowercase();
            value != "false"
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{create_element, create_text};
    use crate::parsers::html::style::InlineStyleResolver;

    fn classifier() -> BoundaryClassifier {
        BoundaryClassifier::new(Rc::new(Setting::default()), Rc::new(InlineStyleResolver::new()))
    }

    #[test]
    fn test_inline_and_block() {
        let c = classifier();
        assert!(c.classify(&create_element("span", &[])).is_inline);
        assert!(!c.classify(&create_element("p", &[])).is_inline);
        assert!(!c.classify(&create_element("li", &[])).is_inline);
        assert!(c.classify(&create_text("x")).is_inline);
        let styled = create_element("div", &[("style", "display: inline-flex")]);
        assert!(c.classify(&styled).is_inline);
    }

    #[test]
    fn test_skip_and_opt_out() {
        let c = classifier();
        assert_eq!(c.classify(&create_element("script", &[])), BoundaryInfo::SKIPPED);
        assert!(c.classify(&create_element("web-translator-host", &[])).is_skipped);
        assert!(c.classify(&create_element("p", &[("translate", "no")])).is_skipped);
        assert!(c.classify(&create_element("p", &[("class", "x notranslate")])).is_skipped);
        assert!(c.classify(&create_element("div", &[("style", "display:none")])).is_skipped);
    }

    #[test]
    fn test_editable_content() {
        let c = classifier();
        let editable = c.classify(&create_element("div", &[("contenteditable", "")]));
        assert!(editable.is_skipped);
        assert!(!editable.is_translatable);
        let explicit_off = c.classify(&create_element("div", &[("contenteditable", "false")]));
        assert!(!explicit_off.is_skipped);
    }
}
