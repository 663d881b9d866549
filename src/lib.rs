//! dermavision
//!
//! 肌画像をpresigned URLでアップロードし、解析パイプラインが書き出す
//! 結果オブジェクトをポーリングして表示用ビューモデルに変換する。

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod poller;
pub mod presign;
pub mod render;
pub mod upload;
