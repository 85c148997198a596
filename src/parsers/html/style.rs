//! 内联样式解析与布局显示推断
//!
//! 没有真实布局引擎时，用元素的 `style` 属性和 HTML 默认显示类型近似计算
//! “有效显示类别”和可见性。宿主环境若有真实的计算样式，可以实现
//! [`StyleResolver`] 替换默认实现。

use std::collections::HashMap;

use cssparser::{Parser, ParserInput, Token};
use markup5ever_rcdom::{Handle, NodeData};

use super::dom::{get_node_attr, get_node_name, get_parent};

/// 默认以块级方式布局的 HTML 标签
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "details", "dialog",
    "dir", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "frameset",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "html", "legend", "listing",
    "main", "menu", "nav", "ol", "optgroup", "option", "p", "plaintext", "pre", "search",
    "section", "summary", "ul", "xmp", "br",
];

/// 默认不渲染的标签
const HIDDEN_TAGS: &[&str] = &[
    "head", "script", "style", "template", "noscript", "title", "meta", "link", "base",
];

/// 有效显示类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Inline,
    InlineBlock,
    InlineFlex,
    InlineGrid,
    Contents,
    Block,
    Flex,
    Grid,
    ListItem,
    Table,
    TableRowGroup,
    TableRow,
    TableCell,
    TableCaption,
    None,
}

impl Display {
    /// 解析 CSS `display` 值，未知值返回 `None`
    pub fn parse(value: &str) -> Option<Self> {
        let display = match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Display::Inline,
            "inline-block" => Display::InlineBlock,
            "inline-flex" => Display::InlineFlex,
            "inline-grid" | "inline-table" => Display::InlineGrid,
            "contents" => Display::Contents,
            "block" | "flow-root" => Display::Block,
            "flex" => Display::Flex,
            "grid" => Display::Grid,
            "list-item" => Display::ListItem,
            "table" => Display::Table,
            "table-row-group" | "table-header-group" | "table-footer-group" => {
                Display::TableRowGroup
            }
            "table-row" => Display::TableRow,
            "table-cell" => Display::TableCell,
            "table-caption" => Display::TableCaption,
            "none" => Display::None,
            _ => return None,
        };
        Some(display)
    }

    /// 行内类显示：文本可以跨越这类元素继续拼接
    pub fn is_inline_like(self) -> bool {
        matches!(
            self,
            Display::Inline
                | Display::InlineBlock
                | Display::InlineFlex
                | Display::InlineGrid
                | Display::Contents
        )
    }

    /// 标签的 HTML 默认显示类别
    pub fn default_for_tag(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        match tag.as_str() {
            "li" => Display::ListItem,
            "table" => Display::Table,
            "thead" | "tbody" | "tfoot" => Display::TableRowGroup,
            "tr" => Display::TableRow,
            "td" | "th" => Display::TableCell,
            "caption" => Display::TableCaption,
            t if HIDDEN_TAGS.contains(&t) => Display::None,
            t if BLOCK_TAGS.contains(&t) => Display::Block,
            _ => Display::Inline,
        }
    }
}

/// 布局信息来源
pub trait StyleResolver {
    /// 元素的有效显示类别
    fn display(&self, node: &Handle) -> Display;

    /// 元素本身或其祖先是否不可见
    fn is_hidden(&self, node: &Handle) -> bool;
}

/// 基于内联 `style` 属性和标签默认值的解析器
#[derive(Debug, Clone, Default)]
pub struct InlineStyleResolver;

impl InlineStyleResolver {
    pub fn new() -> Self {
        Self
    }

    /// 元素自身是否被隐藏（不看祖先）
    fn hides_self(&self, node: &Handle) -> bool {
        if !matches!(node.data, NodeData::Element { .. }) {
            return false;
        }
        if get_node_attr(node, "hidden").is_some() {
            return true;
        }
        let declarations = inline_declarations(node);
        if declarations
            .get("display")
            .is_some_and(|value| value.eq_ignore_ascii_case("none"))
        {
            return true;
        }
        if declarations.get("visibility").is_some_and(|value| {
            value.eq_ignore_ascii_case("hidden") || value.eq_ignore_ascii_case("collapse")
        }) {
            return true;
        }
        declarations
            .get("opacity")
            .is_some_and(|value| opacity_is_zero(value))
    }
}

impl StyleResolver for InlineStyleResolver {
    fn display(&self, node: &Handle) -> Display {
        let Some(tag) = get_node_name(node) else {
            return Display::Block;
        };
        inline_declarations(node)
            .get("display")
            .and_then(|value| Display::parse(value))
            .unwrap_or_else(|| Display::default_for_tag(tag))
    }

    fn is_hidden(&self, node: &Handle) -> bool {
        let mut current = Some(node.clone());
        while let Some(element) = current {
            if self.hides_self(&element) {
                return true;
            }
            current = get_parent(&element);
        }
        false
    }
}

/// 读取元素内联样式声明
pub fn inline_declarations(node: &Handle) -> HashMap<String, String> {
    get_node_attr(node, "style")
        .map(|style| parse_declarations(&style))
        .unwrap_or_default()
}

/// 解析声明列表（`a: b; c: d`），属性名统一小写，后出现的覆盖先出现的
///
/// 语法错误的声明被跳过，不影响其余声明。
pub fn parse_declarations(css: &str) -> HashMap<String, String> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut declarations = HashMap::new();

    loop {
        let name = match parser.next().cloned() {
            Ok(Token::Ident(name)) => name.to_ascii_lowercase(),
            Ok(Token::Semicolon) => continue,
            Ok(_) => {
                skip_to_semicolon(&mut parser);
                continue;
            }
            Err(_) => break,
        };

        match parser.next().cloned() {
            Ok(Token::Colon) => {}
            Ok(Token::Semicolon) => continue,
            Ok(_) => {
                skip_to_semicolon(&mut parser);
                continue;
            }
            Err(_) => break,
        }

        let mut value = String::new();
        loop {
            let token = match parser.next().cloned() {
                Ok(token) => token,
                Err(_) => break,
            };
            match token {
                Token::Semicolon => break,
                // `!important` 之后的内容不属于值
                Token::Delim('!') => {
                    skip_to_semicolon(&mut parser);
                    break;
                }
                Token::Ident(ident) => push_part(&mut value, &ident),
                Token::Number { value: number, .. } => push_part(&mut value, &number.to_string()),
                Token::Percentage { unit_value, .. } => {
                    push_part(&mut value, &format!("{}%", unit_value * 100.0))
                }
                Token::Dimension {
                    value: number,
                    unit,
                    ..
                } => push_part(&mut value, &format!("{number}{unit}")),
                Token::QuotedString(text) => push_part(&mut value, &text),
                _ => {}
            }
        }

        if !value.is_empty() {
            declarations.insert(name, value);
        }
    }

    declarations
}

fn push_part(value: &mut String, part: &str) {
    if !value.is_empty() {
        value.push(' ');
    }
    value.push_str(part);
}

fn skip_to_semicolon(parser: &mut Parser) {
    while let Ok(token) = parser.next().cloned() {
        if matches!(token, Token::Semicolon) {
            break;
        }
    }
}

fn opacity_is_zero(value: &str) -> bool {
    value
        .trim_end_matches('%')
        .parse::<f32>()
        .is_ok_and(|opacity| opacity <= 0.0)
}
