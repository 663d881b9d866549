use anyhow::{bail, Context};
use clap::Parser;
use dermavision::cli::{Cli, Commands};
use dermavision::config::Config;
use dermavision::http::{HttpTransport, ReqwestTransport};
use dermavision::orchestrator::{Orchestrator, Phase};
use dermavision::render::{self, ConsoleRenderer};
use dermavision_common::{
    derive_result_locator, parse_analysis_result, transform, IngredientSplitter, LocaleMap, SelectedFile,
};
use dialoguer::{Confirm, MultiSelect};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("設定ファイルを読み込めません: {}", config_path.display()))?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Analyze { file, aux, interactive, locale, preset, max_attempts, no_retry } => {
            println!("🧴 dermavision - 肌画像解析\n");

            if let Some(max_attempts) = max_attempts {
                config.max_poll_attempts = max_attempts;
            }
            if let Some(map) = resolve_locale(locale.as_deref(), preset.as_deref())? {
                config.label_locale_map = map;
            }
            config.validate()?;

            let selected = read_selected_file(&file)?;
            let aux = if interactive {
                choose_aux(&config.aux_choices)?
            } else {
                aux
            };

            let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.request_timeout())?);
            let mut orchestrator = Orchestrator::new(&config, transport)?;
            let renderer = if cli.verbose {
                ConsoleRenderer::without_spinner()
            } else {
                ConsoleRenderer::new()
            };
            orchestrator.subscribe(Box::new(renderer));

            orchestrator.select_file(Some(selected));
            if orchestrator.phase() != Phase::FileSelected || !orchestrator.submit(&aux) {
                bail!(last_error_message(&orchestrator, "ファイルを送信できません"));
            }

            loop {
                match orchestrator.run_until_settled().await {
                    Phase::Succeeded => break,
                    Phase::GaveUp if !no_retry => {
                        let retry = Confirm::new()
                            .with_prompt("もう一度結果を確認しますか？")
                            .default(true)
                            .interact()?;
                        if !retry || !orchestrator.retry_poll() {
                            bail!(last_error_message(&orchestrator, "解析結果を取得できませんでした"));
                        }
                    }
                    _ => bail!(last_error_message(&orchestrator, "解析に失敗しました")),
                }
            }

            println!("\n✅ 完了");
        }

        Commands::Locate { key } => {
            let rules = config.result_key_rules();
            if !rules.matches(&key) {
                eprintln!("⚠ プレフィックス書き換え規則に一致しません（キーをそのまま使用）");
            }
            let locator = derive_result_locator(&key, &config.result_host, &rules);
            println!("{}", locator);
        }

        Commands::Render { input, locale, preset, json } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("ファイルを読み込めません: {}", input.display()))?;
            let splitter = IngredientSplitter::new(&config.ingredient_delimiters)?;
            let result = parse_analysis_result(&content, &splitter)?;

            let locale_map = resolve_locale(locale.as_deref(), preset.as_deref())?
                .unwrap_or_else(|| config.label_locale_map.clone());
            let view = transform(&result, &locale_map, &config.transform_options());

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                render::print_view_model(&view);
            }
        }

        Commands::Config { show, init } => {
            if init {
                if config_path.exists() {
                    println!("設定ファイルは既に存在します: {}", config_path.display());
                } else {
                    Config::default().save_to(&config_path)?;
                    println!("✔ 設定ファイルを作成しました: {}", config_path.display());
                }
            }

            if show || !init {
                println!("設定: {}", config_path.display());
                println!("  presignEndpoint: {}", config.presign_endpoint);
                println!("  presignMode: {:?}", config.presign_mode);
                println!(
                    "  resultHost: {}",
                    if config.result_host.is_empty() { "(未設定)" } else { config.result_host.as_str() }
                );
                println!("  acceptedMimeTypes: {}", config.accepted_mime_types.join(", "));
                println!(
                    "  ポーリング: 初回{}ms / 間隔{}ms / 最大{}回",
                    config.initial_poll_delay_ms, config.poll_interval_ms, config.max_poll_attempts
                );
                println!("  ラベル翻訳: {}件", config.label_locale_map.len());
                match config.validate() {
                    Ok(()) => println!("  状態: OK"),
                    Err(e) => println!("  状態: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "dermavision=debug,dermavision_common=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_selected_file(path: &Path) -> anyhow::Result<SelectedFile> {
    let bytes = std::fs::read(path).with_context(|| format!("ファイルを読み込めません: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SelectedFile::new(file_name, bytes))
}

/// ラベル翻訳の上書き（ファイル優先）
fn resolve_locale(path: Option<&Path>, preset: Option<&str>) -> anyhow::Result<Option<LocaleMap>> {
    if let Some(path) = path {
        let map = LocaleMap::from_file(path)
            .with_context(|| format!("ラベル翻訳ファイルを読み込めません: {}", path.display()))?;
        return Ok(Some(map));
    }
    match preset {
        Some(name) => match LocaleMap::from_preset(name) {
            Some(map) => Ok(Some(map)),
            None => bail!("不明なプリセット: {}（th または raw）", name),
        },
        None => Ok(None),
    }
}

fn choose_aux(choices: &[String]) -> anyhow::Result<Vec<String>> {
    if choices.is_empty() {
        return Ok(Vec::new());
    }
    let selected = MultiSelect::new()
        .with_prompt("肌タイプを選択（スペースで選択、Enterで確定）")
        .items(choices)
        .interact()?;
    Ok(selected.into_iter().map(|i| choices[i].clone()).collect())
}

fn last_error_message(orchestrator: &Orchestrator, fallback: &str) -> String {
    orchestrator
        .state()
        .last_error
        .as_ref()
        .map(|report| report.to_string())
        .unwrap_or_else(|| fallback.to_string())
}
