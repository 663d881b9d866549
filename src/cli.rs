use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dermavision")]
#[command(about = "肌画像アップロード・解析結果取得ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（省略時は ~/.config/dermavision/config.json）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像をアップロードして解析結果を表示
    Analyze {
        /// 画像ファイルのパス
        #[arg(required = true)]
        file: PathBuf,

        /// 補助選択（肌タイプ等、複数指定可）
        #[arg(short, long = "aux")]
        aux: Vec<String>,

        /// 補助選択を対話的に選ぶ
        #[arg(short, long)]
        interactive: bool,

        /// ラベル翻訳ファイル（JSON）
        #[arg(long)]
        locale: Option<PathBuf>,

        /// ラベル翻訳プリセット (th/raw)
        #[arg(long)]
        preset: Option<String>,

        /// 最大ポーリング回数（設定値を上書き）
        #[arg(long)]
        max_attempts: Option<u32>,

        /// 上限に達しても再試行を確認しない
        #[arg(long)]
        no_retry: bool,
    },

    /// オブジェクトキーから解析結果のURLを表示
    Locate {
        /// アップロードしたオブジェクトキー
        #[arg(required = true)]
        key: String,
    },

    /// 保存済みの解析結果JSONを表示
    Render {
        /// 解析結果JSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// ラベル翻訳ファイル（JSON）
        #[arg(long)]
        locale: Option<PathBuf>,

        /// ラベル翻訳プリセット (th/raw)
        #[arg(long)]
        preset: Option<String>,

        /// ビューモデルをJSONで出力
        #[arg(long)]
        json: bool,
    },

    /// 設定を表示/初期化
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// デフォルト設定ファイルを書き出す
        #[arg(long)]
        init: bool,
    },
}
