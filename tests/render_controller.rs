//! 渲染控制器集成测试
//!
//! 覆盖两种显示模式、重复渲染、过期结果丢弃、并发去重、失败重试、拆除还原、
//! 触发源和规则重建。

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::Handle;
use tokio::task::LocalSet;

use common::*;
use web_translator::parsers::html::dom::{
    append_child, create_element, create_fragment_root, create_text, find_elements,
    get_node_attr, set_text,
};
use web_translator::parsers::html::FragmentRegistry;
use web_translator::translation::storage::TargetState;
use web_translator::translation::{
    DisplayMode, FeedOptions, RecordingFeed, RenderController, RenderOutcome, RetryPolicy,
    RuleCallbacks, StaticSettings, TranslationError, TriggerFeed, Trigger, UserSettings,
};

fn stylesheets(root: &Handle) -> Vec<Handle> {
    find_elements(root, &|n: &Handle| {
        get_node_attr(n, "data-web-translator-style").is_some()
    })
}

// ============================================================================
// 显示模式
// ============================================================================

#[tokio::test]
async fn test_replace_mode_rewrites_text() {
    let env = TestEnvironment::new(
        r#"<span id="s">Hi</span>"#,
        TestConfigBuilder::new("span").mode(DisplayMode::Replace).build(),
    );
    env.controller.start();
    let span = env.node("s");

    assert_eq!(
        env.controller.render(&span).await,
        RenderOutcome::Rendered { segments: 1 }
    );
    assert_eq!(text(&span), "X:Hi");
    AssertionHelper::no_hosts(&env.root());
    assert_eq!(env.controller.state_of(&span), Some(TargetState::Rendered));
}

#[tokio::test]
async fn test_overlay_mode_inserts_host() {
    let env = TestEnvironment::new(
        r#"<div id="d">Hello world</div>"#,
        TestConfigBuilder::new("div").build(),
    );
    env.controller.start();
    let div = env.node("d");

    assert!(env.controller.render(&div).await.is_rendered());

    let host = AssertionHelper::single_host(&div);
    assert_eq!(text(&host), "X:Hello world");
    assert_eq!(get_node_attr(&host, "data-mode").as_deref(), Some("overlay"));
    assert_eq!(get_node_attr(&host, "data-style").as_deref(), Some("none"));
    // 原文保留
    assert!(text(&div).starts_with("Hello world"));
    assert!(Rc::ptr_eq(&env.controller.host_of(&div).unwrap(), &host));
}

#[tokio::test]
async fn test_inline_children_form_one_segment() {
    let env = TestEnvironment::new(
        r#"<p id="p">Hello <b>bold</b> world.</p>"#,
        TestConfigBuilder::new("p").build(),
    );
    env.controller.start();
    let p = env.node("p");

    assert_eq!(
        env.controller.render(&p).await,
        RenderOutcome::Rendered { segments: 1 }
    );
    assert_eq!(env.provider.seen(), vec!["Hello bold world.".to_string()]);
}

#[tokio::test]
async fn test_rerender_is_idempotent() {
    for mode in [DisplayMode::Overlay, DisplayMode::Replace] {
        let env = TestEnvironment::new(
            r#"<p id="p">Hello <b>bold</b> world.</p>"#,
            TestConfigBuilder::new("p").mode(mode).build(),
        );
        env.controller.start();
        let p = env.node("p");

        assert!(env.controller.render(&p).await.is_rendered());
        let first = serialize(&env.root());
        assert!(env.controller.render(&p).await.is_rendered());
        let second = serialize(&env.root());

        assert_eq!(first, second, "re-render changed the document in {} mode", mode);
        // 第二次命中缓存
        assert_eq!(env.provider.calls(), 1);
        assert_eq!(env.controller.stats().cache_hits, 1);
    }
}

#[tokio::test]
async fn test_user_mode_overrides_rule() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let provider = Rc::new(DelayedProvider::new("X:"));
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").mode(DisplayMode::Overlay).build(),
        provider,
    )
    .settings(Rc::new(StaticSettings(UserSettings {
        mode: Some(DisplayMode::Replace),
        ..UserSettings::default()
    })))
    .build()
    .unwrap();
    controller.start();
    let p = by_id(&dom.document, "p");

    assert!(controller.render(&p).await.is_rendered());
    assert_eq!(text(&p), "X:Hello there");
    AssertionHelper::no_hosts(&dom.document);
}

#[tokio::test]
async fn test_disabled_settings_register_nothing() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").build(),
        Rc::new(DelayedProvider::new("X:")),
    )
    .settings(Rc::new(StaticSettings(UserSettings {
        enabled: false,
        ..UserSettings::default()
    })))
    .build()
    .unwrap();

    assert_eq!(controller.start(), 0);
    assert_eq!(controller.registered_count(), 0);
    let p = by_id(&dom.document, "p");
    assert_eq!(controller.render(&p).await, RenderOutcome::NotRegistered);
}

// ============================================================================
// 并发
// ============================================================================

#[tokio::test]
async fn test_stale_render_is_discarded() {
    let env = TestEnvironment::new(
        r#"<p id="p">Hello</p>"#,
        TestConfigBuilder::new("p").build(),
    );
    env.controller.start();
    let p = env.node("p");
    env.provider.delay("Hello", Duration::from_millis(80));

    let leaf = p.children.borrow()[0].clone();
    let (first, second) = tokio::join!(env.controller.render(&p), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        set_text(&leaf, "World");
        env.controller.invalidate_segments();
        env.controller.render(&p).await
    });

    assert_eq!(first, RenderOutcome::Superseded);
    assert!(second.is_rendered());
    let host = AssertionHelper::single_host(&p);
    assert_eq!(text(&host), "X:World");
    assert_eq!(env.controller.stats().renders_superseded, 1);
}

#[tokio::test]
async fn test_concurrent_identical_text_is_translated_once() {
    let env = TestEnvironment::new(
        r#"<p id="a">Same text</p><p id="b">Same text</p>"#,
        TestConfigBuilder::new("p").build(),
    );
    env.controller.start();
    env.provider.delay("Same text", Duration::from_millis(30));
    let (a, b) = (env.node("a"), env.node("b"));

    let (ra, rb) = tokio::join!(env.controller.render(&a), env.controller.render(&b));

    assert!(ra.is_rendered());
    assert!(rb.is_rendered());
    assert_eq!(env.provider.calls(), 1);
    assert_eq!(env.controller.stats().dedup_joins, 1);
    assert_eq!(text(&AssertionHelper::single_host(&a)), "X:Same text");
    assert_eq!(text(&AssertionHelper::single_host(&b)), "X:Same text");
}

#[tokio::test]
async fn test_translation_started_before_teardown_is_not_reused() {
    let env = TestEnvironment::new(
        r#"<p id="a">Hello</p><p id="b">Hello</p>"#,
        TestConfigBuilder::new("p").build(),
    );
    env.controller.start();
    env.provider.delay("Hello", Duration::from_millis(100));
    let (a, b) = (env.node("a"), env.node("b"));

    let (old, fresh, late) = tokio::join!(
        env.controller.render(&a),
        async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            env.controller.teardown();
            env.controller.start();
            env.controller.render(&a).await
        },
        async {
            // 拆除前的请求已返回，拆除后的请求还在进行
            tokio::time::sleep(Duration::from_millis(120)).await;
            env.controller.render(&b).await
        }
    );

    assert_eq!(old, RenderOutcome::Superseded);
    assert!(fresh.is_rendered());
    assert!(late.is_rendered());
    assert_eq!(env.provider.calls(), 2);
    let stats = env.controller.stats();
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(stats.dedup_joins, 1);
    assert_eq!(text(&AssertionHelper::single_host(&b)), "X:Hello");
}

// ============================================================================
// 失败处理
// ============================================================================

#[tokio::test]
async fn test_failed_render_leaves_document_untouched() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let provider = Rc::new(FlakyProvider::new(1, false));
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").build(),
        provider.clone(),
    )
    .retry(RetryPolicy::none())
    .build()
    .unwrap();
    controller.start();
    let p = by_id(&dom.document, "p");
    let before = serialize(&dom.document);

    match controller.render(&p).await {
        RenderOutcome::Failed(TranslationError::ConfigError(_)) => {}
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(controller.error_stats().total_errors, 1);
    assert_eq!(controller.stats().renders_failed, 1);
    assert_eq!(serialize(&dom.document), before);
    assert_eq!(controller.state_of(&p), Some(TargetState::Registered));

    // 失败的结果不进缓存，可以再次触发
    assert!(controller.render(&p).await.is_rendered());
    assert_eq!(text(&AssertionHelper::single_host(&p)), "OK:Hello there");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_retryable_errors_are_retried() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let provider = Rc::new(FlakyProvider::new(2, true));
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").build(),
        provider.clone(),
    )
    .retry(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    })
    .build()
    .unwrap();
    controller.start();
    let p = by_id(&dom.document, "p");

    assert!(controller.render(&p).await.is_rendered());
    assert_eq!(provider.calls(), 3);
    // 重试发生在一次翻译调用内部
    assert_eq!(controller.stats().provider_calls, 1);
}

// ============================================================================
// 语言过滤
// ============================================================================

#[tokio::test]
async fn test_language_filter_skips_other_languages() {
    let dom = parse(r#"<p id="en">Hello there</p><p id="fr">Bonjour tout le monde</p>"#);
    let provider = Rc::new(DelayedProvider::new("X:"));
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").source_lang("en").build(),
        provider.clone(),
    )
    .classifier(Rc::new(KeywordClassifier::new(&[
        ("Hello", "en"),
        ("Bonjour", "fr"),
    ])))
    .build()
    .unwrap();
    controller.start();

    let en = by_id(&dom.document, "en");
    let fr = by_id(&dom.document, "fr");
    assert!(controller.render(&en).await.is_rendered());
    assert_eq!(controller.render(&fr).await, RenderOutcome::Empty);
    assert_eq!(provider.seen(), vec!["Hello there".to_string()]);
}

#[tokio::test]
async fn test_classifier_failure_does_not_block() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").source_lang("en").build(),
        Rc::new(DelayedProvider::new("X:")),
    )
    .classifier(Rc::new(BrokenClassifier))
    .build()
    .unwrap();
    controller.start();

    let p = by_id(&dom.document, "p");
    assert!(controller.render(&p).await.is_rendered());
}

// ============================================================================
// 嵌套与片段
// ============================================================================

#[tokio::test]
async fn test_nested_target_host_placement() {
    let env = TestEnvironment::new(
        r#"<div id="outer">Intro text<p id="inner">Body text</p></div>"#,
        TestConfigBuilder::new("div, p").build(),
    );
    env.controller.start();
    let outer = env.node("outer");
    let inner = env.node("inner");
    assert!(env.controller.is_registered(&outer));
    assert!(env.controller.is_registered(&inner));

    assert!(env.controller.render(&outer).await.is_rendered());
    assert!(env.controller.render(&inner).await.is_rendered());

    // 外层的译文只包含自身文本，紧跟在自身文本之后
    let outer_host = env.controller.host_of(&outer).unwrap();
    assert_eq!(text(&outer_host), "X:Intro text");
    assert!(Rc::ptr_eq(&outer.children.borrow()[1], &outer_host));
    assert_eq!(text(&AssertionHelper::single_host(&inner)), "X:Body text");

    // 重新渲染外层不影响内层的宿主
    assert!(env.controller.render(&outer).await.is_rendered());
    assert_eq!(hosts_under(&outer).len(), 2);
}

#[tokio::test]
async fn test_fragment_target_gets_own_stylesheet() {
    let dom = parse(r#"<x-card id="card"></x-card>"#);
    let card = by_id(&dom.document, "card");
    let fragments = Rc::new(FragmentRegistry::new());
    let shadow = create_fragment_root();
    let title = create_element("h2", &[("id", "title")]);
    append_child(&title, &create_text("Inside the card"));
    append_child(&shadow, &title);
    fragments.attach(&card, &shadow);

    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("x-card::shadow::h2").build(),
        Rc::new(DelayedProvider::new("X:")),
    )
    .fragments(fragments)
    .build()
    .unwrap();
    assert_eq!(controller.start(), 1);
    assert!(controller.is_registered(&title));

    assert!(controller.render(&title).await.is_rendered());
    assert_eq!(text(&AssertionHelper::single_host(&title)), "X:Inside the card");
    assert_eq!(stylesheets(&shadow).len(), 1);
    assert!(stylesheets(&dom.document).is_empty());

    controller.teardown();
    assert!(stylesheets(&shadow).is_empty());
    AssertionHelper::no_hosts(&shadow);
}

// ============================================================================
// 拆除
// ============================================================================

#[tokio::test]
async fn test_teardown_restores_document() {
    let html = r#"<html><head><title>T</title></head><body><div id="a">Hello world</div><p id="b">Second <b>bold</b> line.</p></body></html>"#;
    for mode in [DisplayMode::Overlay, DisplayMode::Replace] {
        let env = TestEnvironment::new(html, TestConfigBuilder::new("div, p").mode(mode).build());
        let before = serialize(&env.root());
        env.controller.start();

        assert!(env.controller.render(&env.node("a")).await.is_rendered());
        assert!(env.controller.render(&env.node("b")).await.is_rendered());
        assert_ne!(serialize(&env.root()), before);

        env.controller.teardown();
        assert_eq!(serialize(&env.root()), before, "teardown left changes in {} mode", mode);
        assert_eq!(env.controller.registered_count(), 0);
    }
}

#[tokio::test]
async fn test_stylesheet_injected_once() {
    let env = TestEnvironment::new(
        r#"<html><head></head><body><p id="a">One thing</p><p id="b">Another thing</p></body></html>"#,
        TestConfigBuilder::new("p").build(),
    );
    env.controller.start();
    assert!(env.controller.render(&env.node("a")).await.is_rendered());
    assert!(env.controller.render(&env.node("b")).await.is_rendered());

    let sheets = stylesheets(&env.root());
    assert_eq!(sheets.len(), 1);
    assert!(text(&sheets[0]).contains(HOST_TAG));

    env.controller.teardown();
    assert!(stylesheets(&env.root()).is_empty());
}

#[tokio::test]
async fn test_callbacks_fire() {
    let started = Rc::new(Cell::new(0));
    let removed = Rc::new(Cell::new(0));
    let callbacks = RuleCallbacks {
        on_render_start: Some({
            let started = started.clone();
            Rc::new(move |_: &Handle| started.set(started.get() + 1))
        }),
        on_removed: Some({
            let removed = removed.clone();
            Rc::new(move |_: &Handle| removed.set(removed.get() + 1))
        }),
    };

    let dom = parse(r#"<p id="a">One thing</p><p id="b">Another thing</p>"#);
    let controller = RenderController::builder(
        dom.document.clone(),
        TestConfigBuilder::new("p").build(),
        Rc::new(DelayedProvider::new("X:")),
    )
    .callbacks(callbacks)
    .build()
    .unwrap();
    controller.start();

    let a = by_id(&dom.document, "a");
    assert!(controller.render(&a).await.is_rendered());
    assert_eq!(started.get(), 1);

    assert!(controller.unregister(&a));
    assert_eq!(removed.get(), 1);
    AssertionHelper::no_hosts(&a);

    controller.teardown();
    assert_eq!(removed.get(), 2);
}

// ============================================================================
// 触发方式
// ============================================================================

#[tokio::test]
async fn test_open_trigger_renders_on_registration() {
    let env = TestEnvironment::new(
        r#"<p id="a">One thing</p><p id="b">Another thing</p>"#,
        TestConfigBuilder::new("p").trigger(Trigger::Open).build(),
    );

    LocalSet::new()
        .run_until(async {
            assert_eq!(env.controller.start(), 2);
            env.controller.wait_idle().await;
        })
        .await;

    assert_eq!(env.controller.stats().renders_completed, 2);
    assert_eq!(text(&AssertionHelper::single_host(&env.node("a"))), "X:One thing");
    assert_eq!(text(&AssertionHelper::single_host(&env.node("b"))), "X:Another thing");
}

#[tokio::test]
async fn test_visibility_trigger_waits_for_feed() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let feed = Rc::new(RecordingFeed::new());
    let threshold = Rc::new(Cell::new(0.0f32));
    let mut config = TestConfigBuilder::new("p").trigger(Trigger::Scroll).build();
    config.setting.visibility_threshold = 0.75;
    let controller = {
        let feed = feed.clone();
        let threshold = threshold.clone();
        RenderController::builder(
            dom.document.clone(),
            config,
            Rc::new(DelayedProvider::new("X:")),
        )
        .visibility_feed(move |options: &FeedOptions| {
            threshold.set(options.visibility_threshold);
            feed.clone() as Rc<dyn TriggerFeed>
        })
        .build()
        .unwrap()
    };
    let p = by_id(&dom.document, "p");

    LocalSet::new()
        .run_until(async {
            controller.start();
            controller.wait_idle().await;
            assert!(feed.is_observing(&p));
            assert_eq!(threshold.get(), 0.75);
            assert!(controller.is_waiting_for_trigger(&p));
            AssertionHelper::no_hosts(&p);

            assert!(controller.on_visible(&p));
            controller.wait_idle().await;
        })
        .await;

    assert!(!feed.is_observing(&p));
    assert_eq!(text(&AssertionHelper::single_host(&p)), "X:Hello there");
}

#[tokio::test]
async fn test_hover_trigger_and_fallback() {
    let dom = parse(r#"<p id="p">Hello there</p>"#);
    let feed = Rc::new(RecordingFeed::new());
    let controller = {
        let feed = feed.clone();
        RenderController::builder(
            dom.document.clone(),
            TestConfigBuilder::new("p").trigger(Trigger::Hover).build(),
            Rc::new(DelayedProvider::new("X:")),
        )
        .hover_feed(move |_: &FeedOptions| feed.clone() as Rc<dyn TriggerFeed>)
        .build()
        .unwrap()
    };
    let p = by_id(&dom.document, "p");

    LocalSet::new()
        .run_until(async {
            controller.start();
            assert!(feed.is_observing(&p));
            assert!(controller.on_hover(&p));
            controller.wait_idle().await;
        })
        .await;
    assert_eq!(hosts_under(&p).len(), 1);

    // 没有配置触发源时直接渲染
    let env = TestEnvironment::new(
        r#"<p id="q">Hello again</p>"#,
        TestConfigBuilder::new("p").trigger(Trigger::Scroll).build(),
    );
    LocalSet::new()
        .run_until(async {
            env.controller.start();
            env.controller.wait_idle().await;
        })
        .await;
    assert_eq!(hosts_under(&env.node("q")).len(), 1);
}

// ============================================================================
// 规则变更
// ============================================================================

#[tokio::test]
async fn test_update_rule_reflows_after_debounce() {
    let env = TestEnvironment::new(
        r#"<p id="p">Hello there</p>"#,
        TestConfigBuilder::new("p").reflow_debounce_ms(20).build(),
    );
    let p = env.node("p");

    LocalSet::new()
        .run_until(async {
            env.controller.start();
            assert!(env.controller.render(&p).await.is_rendered());
            assert_eq!(hosts_under(&p).len(), 1);

            let mut rule = env.controller.config().rule;
            rule.mode = DisplayMode::Overlay;
            env.controller.update_rule(rule.clone());
            rule.mode = DisplayMode::Replace;
            env.controller.update_rule(rule);
            assert!(env.controller.has_pending_reflow());

            tokio::time::sleep(Duration::from_millis(80)).await;
            env.controller.wait_idle().await;
        })
        .await;

    // 两次更新合并成一次重建
    assert_eq!(env.controller.stats().reflows, 1);
    assert_eq!(env.controller.config().rule.mode, DisplayMode::Replace);
    assert!(!env.controller.has_pending_reflow());
    AssertionHelper::no_hosts(&p);
    assert!(env.controller.is_registered(&p));

    assert!(env.controller.render(&p).await.is_rendered());
    assert_eq!(text(&p), "X:Hello there");
}

#[tokio::test]
async fn test_invalid_rule_keeps_previous() {
    let env = TestEnvironment::new(
        r#"<p id="p">Hello there</p>"#,
        TestConfigBuilder::new("p").build(),
    );

    LocalSet::new()
        .run_until(async {
            env.controller.start();
            let mut rule = env.controller.config().rule;
            rule.min_text_length = 10;
            rule.max_text_length = 1;
            env.controller.update_rule(rule);
            assert!(env.controller.reflow_now());
        })
        .await;

    assert_eq!(env.controller.config().rule.max_text_length, 5000);
    assert_eq!(env.controller.stats().reflows, 1);
    assert!(env.controller.is_registered(&env.node("p")));
}
