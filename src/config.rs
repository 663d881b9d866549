use crate::error::{DermaError, Result};
use crate::poller::PollSettings;
use crate::presign::PresignMode;
use dermavision_common::{
    IngredientSplitter, LocaleMap, PrefixRewrite, ResultKeyRules, TransformOptions, ValidationRules,
    DEFAULT_INGREDIENT_DELIMITERS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// バックエンドURL未設定を示すプレースホルダ
pub const PLACEHOLDER_ENDPOINT: &str = "YOUR_API_GATEWAY_URL_HERE";

pub const ENV_PRESIGN_ENDPOINT: &str = "DERMAVISION_PRESIGN_ENDPOINT";
pub const ENV_RESULT_HOST: &str = "DERMAVISION_RESULT_HOST";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub presign_endpoint: String,
    pub presign_mode: PresignMode,
    /// 結果オブジェクトを配信するホスト（末尾の / は不要）
    pub result_host: String,
    pub user_id: Option<String>,

    pub accepted_mime_types: Vec<String>,
    pub require_aux_selection: bool,
    pub max_file_size_bytes: Option<u64>,
    /// 補助選択を送るフィールド名
    pub aux_field_name: String,
    /// 対話モードで提示する補助選択肢
    pub aux_choices: Vec<String>,

    pub initial_poll_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub max_poll_duration_ms: Option<u64>,
    pub request_timeout_seconds: u64,

    pub prefix_rewrite_table: Vec<PrefixRewrite>,
    pub result_suffix: String,

    pub label_locale_map: LocaleMap,
    pub ingredient_delimiters: String,
    pub currency_suffix: String,
    pub placeholder_image_url: String,
}

impl Default for Config {
    fn default() -> Self {
        let validation = ValidationRules::default();
        let result_keys = ResultKeyRules::default();
        let poll = PollSettings::default();
        let transform = TransformOptions::default();

        Self {
            presign_endpoint: PLACEHOLDER_ENDPOINT.into(),
            presign_mode: PresignMode::default(),
            result_host: String::new(),
            user_id: None,
            accepted_mime_types: validation.accepted_mime_types,
            require_aux_selection: validation.require_aux_selection,
            max_file_size_bytes: validation.max_file_size_bytes,
            aux_field_name: "skinTypes".into(),
            aux_choices: ["ผิวมัน", "ผิวแห้ง", "ผิวผสม", "ผิวแพ้ง่าย", "ผิวธรรมดา"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            initial_poll_delay_ms: poll.initial_delay.as_millis() as u64,
            poll_interval_ms: poll.interval.as_millis() as u64,
            max_poll_attempts: poll.max_attempts,
            max_poll_duration_ms: None,
            request_timeout_seconds: 30,
            prefix_rewrite_table: result_keys.prefix_rewrites,
            result_suffix: result_keys.result_suffix,
            label_locale_map: LocaleMap::from_preset("th").unwrap_or_default(),
            ingredient_delimiters: DEFAULT_INGREDIENT_DELIMITERS.into(),
            currency_suffix: transform.currency_suffix,
            placeholder_image_url: transform.placeholder_image_url,
        }
    }
}

impl Config {
    /// 設定ファイルを読み込み、環境変数で上書きする
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// 指定パスから読み込む（なければデフォルト）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DermaError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("dermavision").join("config.json"))
    }

    /// 環境変数を優先
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_PRESIGN_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.presign_endpoint = endpoint.trim().to_string();
        }
        if let Some(host) = lookup(ENV_RESULT_HOST).filter(|v| !v.trim().is_empty()) {
            self.result_host = host.trim().to_string();
        }
    }

    /// 提出前に必要な設定が揃っているか検査
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.presign_endpoint.trim();
        if endpoint.is_empty() || endpoint.contains(PLACEHOLDER_ENDPOINT) {
            return Err(DermaError::Config(format!(
                "presignEndpoint が未設定です（{} または {} を設定してください）",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.json".into()),
                ENV_PRESIGN_ENDPOINT
            )));
        }
        if self.max_poll_attempts == 0 {
            return Err(DermaError::Config("maxPollAttempts は1以上にしてください".into()));
        }
        if self.accepted_mime_types.iter().all(|m| m.trim().is_empty()) {
            return Err(DermaError::Config("acceptedMimeTypes が空です".into()));
        }
        IngredientSplitter::new(&self.ingredient_delimiters)?;
        Ok(())
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            accepted_mime_types: self.accepted_mime_types.clone(),
            require_aux_selection: self.require_aux_selection,
            max_file_size_bytes: self.max_file_size_bytes,
        }
    }

    pub fn result_key_rules(&self) -> ResultKeyRules {
        ResultKeyRules {
            prefix_rewrites: self.prefix_rewrite_table.clone(),
            result_suffix: self.result_suffix.clone(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            initial_delay: Duration::from_millis(self.initial_poll_delay_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            max_duration: self.max_poll_duration_ms.map(Duration::from_millis),
        }
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            currency_suffix: self.currency_suffix.clone(),
            placeholder_image_url: self.placeholder_image_url.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}
