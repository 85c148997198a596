//! 选择器解析与匹配
//!
//! 规则里的选择器以分号分隔，每一段可以是逗号分隔的选择器列表，并支持
//! `host::shadow::inner` 形式穿入嵌套片段。支持的语法子集：
//!
//! - 类型选择器 `p`、通配符 `*`
//! - `#id`、`.class`
//! - 属性选择器 `[attr]`、`[attr=v]`、`[attr~=v]`、`[attr^=v]`、`[attr$=v]`、`[attr*=v]`、`[attr|=v]`
//! - 后代（空格）和子代（`>`）组合符
//!
//! 词法分析交给 cssparser。

use cssparser::{ParseError, Parser, ParserInput, Token};
use markup5ever_rcdom::{Handle, NodeData};

use crate::translation::error::{TranslationError, TranslationResult};

use super::dom::{find_elements, get_node_attr, get_node_name, get_parent, NodeRef};
use super::fragments::FragmentRegistry;

/// 嵌套片段分隔符
pub const SHADOW_SEPARATOR: &str = "::shadow::";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    Prefix,
    Suffix,
    Substring,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: Option<(AttrOp, String)>,
}

impl AttrSelector {
    fn matches(&self, node: &Handle) -> bool {
        let Some(actual) = get_node_attr(node, &self.name) else {
            return false;
        };
        match &self.op {
            None => true,
            Some((AttrOp::Equals, expected)) => actual == *expected,
            Some((AttrOp::Includes, expected)) => {
                actual.split_ascii_whitespace().any(|word| word == expected)
            }
            Some((AttrOp::Prefix, expected)) => {
                !expected.is_empty() && actual.starts_with(expected.as_str())
            }
            Some((AttrOp::Suffix, expected)) => {
                !expected.is_empty() && actual.ends_with(expected.as_str())
            }
            Some((AttrOp::Substring, expected)) => {
                !expected.is_empty() && actual.contains(expected.as_str())
            }
            Some((AttrOp::DashMatch, expected)) => {
                actual == *expected || actual.starts_with(&format!("{expected}-"))
            }
        }
    }
}

/// 复合选择器，如 `div.note[lang]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
    universal: bool,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && !self.universal
    }

    fn matches(&self, node: &Handle) -> bool {
        let Some(name) = get_node_name(node) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if get_node_attr(node, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = get_node_attr(node, "class").unwrap_or_default();
            let classes: Vec<&str> = class_attr.split_ascii_whitespace().collect();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|attr| attr.matches(node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// 由组合符连接的复合选择器序列
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl ComplexSelector {
    fn matches(&self, node: &Handle) -> bool {
        self.match_from(self.compounds.len() - 1, node)
    }

    fn match_from(&self, index: usize, node: &Handle) -> bool {
        if !self.compounds[index].matches(node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => parent_element(node)
                .is_some_and(|parent| self.match_from(index - 1, &parent)),
            Combinator::Descendant => {
                let mut current = parent_element(node);
                while let Some(ancestor) = current {
                    if self.match_from(index - 1, &ancestor) {
                        return true;
                    }
                    current = parent_element(&ancestor);
                }
                false
            }
        }
    }
}

/// 选择器不跨越片段根向上匹配
fn parent_element(node: &Handle) -> Option<Handle> {
    get_parent(node).filter(|parent| matches!(parent.data, NodeData::Element { .. }))
}

/// 逗号分隔的选择器列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    /// 解析选择器列表
    pub fn parse(source: &str) -> TranslationResult<Self> {
        let invalid = |reason: &str| {
            TranslationError::InvalidSelector(format!("{reason}: `{}`", source.trim()))
        };

        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(invalid("空选择器"));
        }

        let mut input = ParserInput::new(trimmed);
        let mut parser = Parser::new(&mut input);

        let mut selectors = Vec::new();
        let mut compounds: Vec<Compound> = Vec::new();
        let mut combinators: Vec<Combinator> = Vec::new();
        let mut current = Compound::default();
        let mut pending: Option<Combinator> = None;

        // 结束当前复合选择器；组合符跟随在后面时登记它
        fn flush(
            current: &mut Compound,
            compounds: &mut Vec<Compound>,
            combinators: &mut Vec<Combinator>,
            pending: &mut Option<Combinator>,
        ) -> bool {
            if current.is_empty() {
                return false;
            }
            if !compounds.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }
            compounds.push(std::mem::take(current));
            true
        }

        loop {
            let token = match parser.next_including_whitespace().cloned() {
                Ok(token) => token,
                Err(_) => break,
            };
            match token {
                Token::WhiteSpace(_) => {
                    if flush(&mut current, &mut compounds, &mut combinators, &mut pending) {
                        pending = Some(Combinator::Descendant);
                    }
                }
                Token::Delim('>') => {
                    flush(&mut current, &mut compounds, &mut combinators, &mut pending);
                    if compounds.is_empty() {
                        return Err(invalid("组合符前缺少选择器"));
                    }
                    pending = Some(Combinator::Child);
                }
                Token::Comma => {
                    flush(&mut current, &mut compounds, &mut combinators, &mut pending);
                    if compounds.is_empty() || pending == Some(Combinator::Child) {
                        return Err(invalid("逗号前缺少选择器"));
                    }
                    selectors.push(ComplexSelector {
                        compounds: std::mem::take(&mut compounds),
                        combinators: std::mem::take(&mut combinators),
                    });
                    pending = None;
                }
                Token::Ident(name) => {
                    if !current.is_empty() {
                        return Err(invalid("类型选择器必须位于复合选择器开头"));
                    }
                    current.tag = Some(name.to_ascii_lowercase());
                }
                Token::Delim('*') => {
                    if !current.is_empty() {
                        return Err(invalid("通配符必须位于复合选择器开头"));
                    }
                    current.universal = true;
                }
                Token::IDHash(id) | Token::Hash(id) => current.id = Some(id.to_string()),
                Token::Delim('.') => match parser.next_including_whitespace().cloned() {
                    Ok(Token::Ident(class)) => current.classes.push(class.to_string()),
                    _ => return Err(invalid("`.` 之后缺少类名")),
                },
                Token::SquareBracketBlock => {
                    let attr: Result<AttrSelector, ParseError<'_, ()>> =
                        parser.parse_nested_block(|input| {
                            let name = input.expect_ident()?.to_ascii_lowercase();
                            if input.is_exhausted() {
                                return Ok(AttrSelector { name, op: None });
                            }
                            let op = match input.next()?.clone() {
                                Token::Delim('=') => AttrOp::Equals,
                                Token::IncludeMatch => AttrOp::Includes,
                                Token::PrefixMatch => AttrOp::Prefix,
                                Token::SuffixMatch => AttrOp::Suffix,
                                Token::SubstringMatch => AttrOp::Substring,
                                Token::DashMatch => AttrOp::DashMatch,
                                _ => return Err(input.new_custom_error(())),
                            };
                            let value = match input.next()?.clone() {
                                Token::Ident(value) | Token::QuotedString(value) => {
                                    value.to_string()
                                }
                                _ => return Err(input.new_custom_error(())),
                            };
                            Ok(AttrSelector {
                                name,
                                op: Some((op, value)),
                            })
                        });
                    match attr {
                        Ok(attr) => current.attrs.push(attr),
                        Err(_) => return Err(invalid("属性选择器无效")),
                    }
                }
                _ => return Err(invalid("不支持的选择器语法")),
            }
        }

        flush(&mut current, &mut compounds, &mut combinators, &mut pending);
        if compounds.is_empty() || pending == Some(Combinator::Child) {
            return Err(invalid("选择器不完整"));
        }
        selectors.push(ComplexSelector {
            compounds,
            combinators,
        });

        Ok(Self { selectors })
    }

    /// 节点是否匹配列表中任一选择器
    pub fn matches(&self, node: &Handle) -> bool {
        matches!(node.data, NodeData::Element { .. })
            && self.selectors.iter().any(|selector| selector.matches(node))
    }

    /// 子树中（含根）所有匹配的元素，文档顺序，不进入嵌套片段
    pub fn query_all(&self, root: &Handle) -> Vec<Handle> {
        find_elements(root, &|node| self.matches(node))
    }
}

/// 一段选择器：由 `::shadow::` 串联的若干选择器列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorChain {
    steps: Vec<SelectorList>,
}

impl SelectorChain {
    pub fn parse(source: &str) -> TranslationResult<Self> {
        let steps = source
            .split(SHADOW_SEPARATOR)
            .map(SelectorList::parse)
            .collect::<TranslationResult<Vec<_>>>()?;
        Ok(Self { steps })
    }

    pub fn is_nested(&self) -> bool {
        self.steps.len() > 1
    }

    /// 逐级匹配：除最后一级外，每级的匹配结果换成其片段根继续匹配
    pub fn query_all(&self, root: &Handle, fragments: &FragmentRegistry) -> Vec<Handle> {
        let mut scopes = vec![root.clone()];
        let last = self.steps.len() - 1;
        for (index, step) in self.steps.iter().enumerate() {
            let matched: Vec<Handle> = scopes.iter().flat_map(|s| step.query_all(s)).collect();
            if index == last {
                return matched;
            }
            scopes = matched
                .iter()
                .filter_map(|host| fragments.fragment_of(host))
                .collect();
        }
        Vec::new()
    }
}

/// 完整的规则选择器：分号分隔的多段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorSpec {
    chains: Vec<SelectorChain>,
}

impl SelectorSpec {
    /// 严格解析，任何一段无效都返回错误
    pub fn parse(spec: &str) -> TranslationResult<Self> {
        let chains = spec
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(SelectorChain::parse)
            .collect::<TranslationResult<Vec<_>>>()?;
        Ok(Self { chains })
    }

    /// 宽松解析：无效的段记录警告后丢弃
    pub fn parse_lenient(spec: &str) -> Self {
        let chains = spec
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| match SelectorChain::parse(part) {
                Ok(chain) => Some(chain),
                Err(e) => {
                    tracing::warn!("忽略无效选择器: {}", e);
                    None
                }
            })
            .collect();
        Self { chains }
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// 所有段的匹配结果去重合并，保持首次出现的顺序
    pub fn query_all(&self, root: &Handle, fragments: &FragmentRegistry) -> Vec<Handle> {
        let mut seen = std::collections::HashSet::new();
        self.chains
            .iter()
            .flat_map(|chain| chain.query_all(root, fragments))
            .filter(|node| seen.insert(NodeRef::new(node)))
            .collect()
    }

    /// 节点是否被某个不穿入片段的段直接匹配
    pub fn matches(&self, node: &Handle) -> bool {
        self.chains
            .iter()
            .filter(|chain| !chain.is_nested())
            .any(|chain| chain.steps[0].matches(node))
    }
}
