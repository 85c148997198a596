//! 命令行入口：翻译一个 HTML 文件并输出结果

use std::fs;
use std::io::{self, Write};
use std::process;
use std::rc::Rc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use web_translator::env::{core::LogLevel, generate_env_docs, EnvVar};
use web_translator::parsers::{get_charset, html_to_dom, serialize_document};
use web_translator::translation::config::load_engine_config;
use web_translator::translation::error::helpers;
use web_translator::translation::{
    translate_document, ConfigManager, DisplayMode, EngineConfig, PrefixProvider,
    TranslationProvider, TranslationResult,
};

const DEFAULT_ENCODING: &str = "utf-8";

#[derive(Parser, Debug)]
#[command(
    name = "web-translator",
    version,
    about = "Translate the readable text of an HTML document in place"
)]
struct Cli {
    /// Input HTML file
    #[arg(required_unless_present_any = ["generate_config", "list_env"])]
    input: Option<String>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Selector spec, parts separated by ';' (supports `host::shadow::inner`)
    #[arg(short, long)]
    selector: Option<String>,

    /// Display mode: overlay or replace
    #[arg(short, long)]
    mode: Option<DisplayMode>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Translate offline by prefixing every segment
    #[arg(long)]
    echo_prefix: Option<String>,

    /// DeepLX-compatible endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Target language code
    #[arg(short, long)]
    target_lang: Option<String>,

    /// Source language code, `auto` disables language filtering
    #[arg(long)]
    source_lang: Option<String>,

    /// Input charset, detected from the document when omitted
    #[arg(short, long)]
    encoding: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<String>,

    /// Print the supported environment variables and exit
    #[arg(long)]
    list_env: bool,
}

fn main() {
    ConfigManager::load_dotenv();
    init_tracing();

    let cli = Cli::parse();

    if cli.list_env {
        print!("{}", generate_env_docs());
        return;
    }

    if let Some(path) = cli.generate_config.as_deref() {
        if let Err(e) = ConfigManager::generate_example_config(path) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        return;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let level = LogLevel::get().unwrap_or_else(|e| {
        eprintln!("Warning: {}", e);
        "info".to_string()
    });
    let filter = EnvFilter::new(format!("web_translator={}", level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> TranslationResult<()> {
    let input = cli
        .input
        .as_deref()
        .ok_or_else(|| helpers::config_error("缺少输入文件"))?;
    let config = build_config(&cli)?;

    let data = fs::read(input)?;
    let encoding = match cli.encoding.as_deref() {
        Some(encoding) => encoding.to_string(),
        None => detect_charset(&data)?,
    };
    let dom = html_to_dom(&data, &encoding)?;

    let provider = build_provider(&cli, &config)?;
    let stats = translate_document(dom.document.clone(), config, provider).await?;
    if stats.renders_failed > 0 {
        tracing::warn!("{} 个节点翻译失败，保留原文", stats.renders_failed);
    }

    let output = serialize_document(&dom.document, &encoding)?;
    match cli.output.as_deref() {
        Some(path) if path != "-" => fs::write(path, output)?,
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&output)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn build_config(cli: &Cli) -> TranslationResult<EngineConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => ConfigManager::from_file(path)?.into_config(),
        None => load_engine_config(),
    };

    if let Some(selector) = cli.selector.as_ref() {
        config.rule.selector = selector.clone();
    }
    if let Some(mode) = cli.mode {
        config.rule.mode = mode;
    }
    if let Some(api_url) = cli.api_url.as_ref() {
        config.provider.api_url = api_url.clone();
    }
    if let Some(target_lang) = cli.target_lang.as_ref() {
        config.provider.target_lang = target_lang.clone();
    }
    if let Some(source_lang) = cli.source_lang.as_ref() {
        config.provider.source_lang = source_lang.clone();
    }

    config.validate()?;
    Ok(config)
}

/// 先按 UTF-8 解析一遍，读取文档声明的字符集
fn detect_charset(data: &[u8]) -> TranslationResult<String> {
    let probe = html_to_dom(data, DEFAULT_ENCODING)?;
    Ok(get_charset(&probe.document)
        .filter(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()).is_some())
        .unwrap_or_else(|| DEFAULT_ENCODING.to_string()))
}

fn build_provider(cli: &Cli, config: &EngineConfig) -> TranslationResult<Rc<dyn TranslationProvider>> {
    if let Some(prefix) = cli.echo_prefix.as_deref() {
        return Ok(Rc::new(PrefixProvider::new(prefix)));
    }

    #[cfg(feature = "deeplx")]
    {
        use web_translator::translation::{DeepLxProvider, LazyProvider};

        let provider_config = config.provider.clone();
        let lazy = LazyProvider::new(move || {
            let provider_config = provider_config.clone();
            async move { DeepLxProvider::new(&provider_config) }
        });
        Ok(Rc::new(lazy))
    }

    #[cfg(not(feature = "deeplx"))]
    {
        let _ = config;
        Err(helpers::config_error(
            "未启用 deeplx 功能，请使用 --echo-prefix",
        ))
    }
}
