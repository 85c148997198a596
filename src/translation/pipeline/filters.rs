//! 内容语言过滤
//!
//! 包装外部语言识别器，只保留源文本语言与预期源语言一致的段落。识别不可靠
//! 或识别器出错时一律放行，分段永远不会因为识别器不可用而被阻塞。

use std::rc::Rc;

use async_trait::async_trait;
use futures::future::join_all;

use super::segment::Segment;
use crate::translation::error::TranslationResult;

/// 语言识别结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageGuess {
    /// ISO 639-1 代码
    pub lang: Option<String>,
    pub reliable: bool,
}

impl LanguageGuess {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn reliable(lang: &str) -> Self {
        Self {
            lang: Some(lang.to_string()),
            reliable: true,
        }
    }
}

/// 语言识别器
#[async_trait(?Send)]
pub trait LanguageClassifier {
    async fn detect(&self, text: &str) -> TranslationResult<LanguageGuess>;
}

/// 基于 whatlang 的默认识别器
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangClassifier;

#[async_trait(?Send)]
impl LanguageClassifier for WhatlangClassifier {
    async fn detect(&self, text: &str) -> TranslationResult<LanguageGuess> {
        Ok(match whatlang::detect(text) {
            Some(info) => LanguageGuess {
                lang: lang_to_code(info.lang()).map(str::to_string),
                reliable: info.is_reliable(),
            },
            None => LanguageGuess::unknown(),
        })
    }
}

fn lang_to_code(lang: whatlang::Lang) -> Option<&'static str> {
    use whatlang::Lang::*;
    let code = match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        Swe => "sv",
        Dan => "da",
        Fin => "fi",
        Ces => "cs",
        Ell => "el",
        Heb => "he",
        Ind => "id",
        _ => return None,
    };
    Some(code)
}

/// 取语言代码的主语言部分，`zh-CN` → `zh`
fn primary_subtag(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// 内容语言过滤器
#[derive(Clone)]
pub struct ContentLanguageFilter {
    classifier: Rc<dyn LanguageClassifier>,
    source_lang: String,
}

impl ContentLanguageFilter {
    /// `source_lang` 为 `auto` 时不过滤
    pub fn new(classifier: Rc<dyn LanguageClassifier>, source_lang: &str) -> Self {
        Self {
            classifier,
            source_lang: primary_subtag(source_lang),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.source_lang.is_empty() && self.source_lang != "auto"
    }

    /// 文本是否属于源语言，无法可靠判断时返回 true
    pub async fn is_source_language(&self, text: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }
        match self.classifier.detect(text).await {
            Ok(LanguageGuess {
                lang: Some(lang),
                reliable: true,
            }) => primary_subtag(&lang) == self.source_lang,
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("语言识别失败，按源语言处理: {}", e);
                true
            }
        }
    }

    /// 批量过滤段落，保持原有顺序
    pub async fn filter_by_source_language(&self, segments: Vec<Segment>) -> Vec<Segment> {
        if !self.is_enabled() || segments.is_empty() {
            return segments;
        }
        let verdicts = join_all(segments.iter().map(|s| self.is_source_language(&s.text))).await;
        let before = segments.len();
        let kept: Vec<Segment> = segments
            .into_iter()
            .zip(verdicts)
            .filter_map(|(segment, keep)| keep.then_some(segment))
            .collect();
        if kept.len() < before {
            tracing::debug!("语言过滤: 保留 {}/{} 个段落", kept.len(), before);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{create_element, create_text};
    use crate::translation::error::TranslationError;

    struct FixedClassifier(TranslationResult<LanguageGuess>);

    #[async_trait(?Send)]
    impl LanguageClassifier for FixedClassifier {
        async fn detect(&self, _text: &str) -> TranslationResult<LanguageGuess> {
            self.0.clone()
        }
    }

    /// 以文本首词作为语言代码
    struct FirstWordClassifier;

    #[async_trait(?Send)]
    impl LanguageClassifier for FirstWordClassifier {
        async fn detect(&self, text: &str) -> TranslationResult<LanguageGuess> {
            let word = text.split_whitespace().next().unwrap_or_default();
            Ok(LanguageGuess::reliable(word))
        }
    }

    fn segment(text: &str) -> Segment {
        let p = create_element("p", &[]);
        Segment::new(vec![create_text(text)], text, p.clone(), p)
    }

    #[tokio::test]
    async fn test_auto_disables_filter() {
        let filter = ContentLanguageFilter::new(
            Rc::new(FixedClassifier(Ok(LanguageGuess::reliable("fr")))),
            "auto",
        );
        assert!(filter.is_source_language("bonjour").await);
    }

    #[tokio::test]
    async fn test_fail_open() {
        let unreliable = ContentLanguageFilter::new(
            Rc::new(FixedClassifier(Ok(LanguageGuess {
                lang: Some("fr".into()),
                reliable: false,
            }))),
            "en",
        );
        assert!(unreliable.is_source_language("x").await);

        let failing = ContentLanguageFilter::new(
            Rc::new(FixedClassifier(Err(TranslationError::ClassifierError(
                "模型未加载".into(),
            )))),
            "en",
        );
        assert!(failing.is_source_language("x").await);
    }

    #[tokio::test]
    async fn test_batch_filter_keeps_order() {
        let filter = ContentLanguageFilter::new(Rc::new(FirstWordClassifier), "en-US");
        let kept = filter
            .filter_by_source_language(vec![
                segment("en one"),
                segment("fr deux"),
                segment("en three"),
            ])
            .await;
        let texts: Vec<&str> = kept.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["en one", "en three"]);
    }

    #[tokio::test]
    async fn test_whatlang_detects_by_script() {
        // 汉字脚本只对应一种语言，结果稳定
        let guess = WhatlangClassifier
            .detect("这是一个用于测试语言识别的中文句子，内容足够长。")
            .await
            .unwrap();
        assert_eq!(guess.lang.as_deref(), Some("zh"));

        let guess = WhatlangClassifier
            .detect(
                "This is a long English sentence that we use to check that the \
                 detector can tell which language the page was written in, \
                 because there are many common words here.",
            )
            .await
            .unwrap();
        if guess.reliable {
            assert_eq!(guess.lang.as_deref(), Some("en"));
        }
    }
}
