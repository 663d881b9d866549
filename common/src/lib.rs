//! Dermavision Common Library
//!
//! アップロード〜結果表示ワークフローのうち、I/Oを伴わない部分
//! （型・入力検証・結果キー導出・結果パース・翻訳・表示変換）

pub mod types;
pub mod validator;
pub mod locator;
pub mod parser;
pub mod locale;
pub mod transformer;
pub mod error;

pub use types::{
    AnalysisResult, PresignedTarget, Recommendation, ResultLocator, SelectedFile, UploadMethod,
    UploadRequest, UNKNOWN_MIME_TYPE,
};
pub use validator::{validate, validate_file, file_extension, mime_type_for_extension, Rejection, ValidationRules};
pub use locator::{derive_result_locator, PrefixRewrite, ResultKeyRules};
pub use parser::{parse_analysis_result, IngredientSplitter, DEFAULT_INGREDIENT_DELIMITERS};
pub use locale::LocaleMap;
pub use transformer::{
    format_price, transform, LabelView, RecommendationGroup, RecommendationView, TransformOptions,
    ViewModel, ViewOutcome,
};
pub use error::{Error, Result};
