//! 解析結果パーサー
//!
//! 結果オブジェクト（snake_caseのワイヤ形式）をパースし、
//! 内部モデル `AnalysisResult` へ変換する。
//!
//! ```json
//! {
//!   "analysis_labels": ["Acne"],
//!   "recommendations": [
//!     { "problem": "Acne", "name": "...", "brand": "...", "price": 8942.5,
//!       "image_url": "...", "ingredients": "water | dimethicone" }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use crate::types::{AnalysisResult, Recommendation};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// 既定の成分区切り文字（パイプとカンマ）
pub const DEFAULT_INGREDIENT_DELIMITERS: &str = "|,";

lazy_static! {
    static ref DEFAULT_DELIMITER_PATTERN: Regex =
        build_delimiter_pattern(DEFAULT_INGREDIENT_DELIMITERS).expect("default delimiter pattern");
}

fn build_delimiter_pattern(delimiters: &str) -> std::result::Result<Regex, regex::Error> {
    let class: String = delimiters
        .chars()
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    Regex::new(&format!("[{}]", class))
}

/// 成分文字列の分割器
#[derive(Debug, Clone)]
pub struct IngredientSplitter {
    pattern: Regex,
}

impl Default for IngredientSplitter {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_DELIMITER_PATTERN.clone(),
        }
    }
}

impl IngredientSplitter {
    /// 区切り文字の集合から作成
    pub fn new(delimiters: &str) -> Result<Self> {
        if delimiters.is_empty() {
            return Err(Error::Config("ingredient delimiters must not be empty".into()));
        }
        let pattern = build_delimiter_pattern(delimiters)
            .map_err(|e| Error::Config(format!("invalid ingredient delimiters: {}", e)))?;
        Ok(Self { pattern })
    }

    /// 分割して各要素をtrimし、空要素は捨てる
    pub fn split(&self, raw: &str) -> Vec<String> {
        self.pattern
            .split(raw)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    analysis_labels: Option<Vec<String>>,
    #[serde(default)]
    recommendations: Option<Vec<WireRecommendation>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRecommendation {
    problem: Option<String>,
    name: Option<String>,
    brand: Option<String>,
    price: Option<WirePrice>,
    image_url: Option<String>,
    ingredients: Option<WireIngredients>,
}

/// DynamoDB由来の価格は数値か数値文字列のどちらか
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePrice {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireIngredients {
    Text(String),
    List(Vec<String>),
}

impl WireRecommendation {
    fn into_model(self, splitter: &IngredientSplitter) -> Result<Recommendation> {
        let price = match self.price {
            None => 0.0,
            Some(WirePrice::Number(n)) => n,
            Some(WirePrice::Text(s)) if s.trim().is_empty() => 0.0,
            Some(WirePrice::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::Parse(format!("price is not a number: {:?}", s)))?,
        };

        let ingredients = match self.ingredients {
            None => Vec::new(),
            Some(WireIngredients::Text(raw)) => splitter.split(&raw),
            Some(WireIngredients::List(items)) => items
                .iter()
                .flat_map(|item| splitter.split(item))
                .collect(),
        };

        Ok(Recommendation {
            problem: self.problem.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            brand: self.brand.unwrap_or_default(),
            price,
            image_url: self.image_url.unwrap_or_default(),
            ingredients,
        })
    }
}

/// 結果オブジェクトをパース
///
/// # Returns
/// * `Ok(AnalysisResult)` - パース成功（欠落フィールドは空として扱う）
/// * `Err(Error::Parse)` - JSONでない、またはスキーマ不一致
pub fn parse_analysis_result(body: &str, splitter: &IngredientSplitter) -> Result<AnalysisResult> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::Parse("result body is empty".into()));
    }

    let wire: WireResult = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("result JSON does not match schema: {}", e)))?;

    let recommendations = wire
        .recommendations
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.into_model(splitter))
        .collect::<Result<Vec<_>>>()?;

    Ok(AnalysisResult {
        labels: wire.analysis_labels.unwrap_or_default(),
        recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_default_delimiters() {
        let splitter = IngredientSplitter::default();
        assert_eq!(
            splitter.split("water | dimethicone | isododecane | algae (seaweed) extract"),
            vec!["water", "dimethicone", "isododecane", "algae (seaweed) extract"]
        );
        assert_eq!(splitter.split("Aqua, Glycerin|Silica"), vec!["Aqua", "Glycerin", "Silica"]);
    }

    #[test]
    fn test_split_drops_empty_fragments() {
        let splitter = IngredientSplitter::default();
        assert_eq!(splitter.split("water||  |glycerin,"), vec!["water", "glycerin"]);
        assert!(splitter.split("").is_empty());
    }

    #[test]
    fn test_custom_delimiters() {
        let splitter = IngredientSplitter::new(";").unwrap();
        assert_eq!(splitter.split("a; b|c"), vec!["a", "b|c"]);
        assert!(IngredientSplitter::new("").is_err());
        // 正規表現の特殊文字もそのまま区切り文字になる
        let splitter = IngredientSplitter::new("]^").unwrap();
        assert_eq!(splitter.split("a]b^c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_minimal_result() {
        let body = r#"{"analysis_labels": ["Acne"], "recommendations": [{"problem": "Acne", "ingredients": "water|glycerin"}]}"#;
        let result = parse_analysis_result(body, &IngredientSplitter::default()).unwrap();

        assert_eq!(result.labels, vec!["Acne"]);
        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.recommendations[0].problem, "Acne");
        assert_eq!(result.recommendations[0].ingredients, vec!["water", "glycerin"]);
        assert_eq!(result.recommendations[0].price, 0.0);
    }

    #[test]
    fn test_parse_full_recommendation() {
        let body = r#"{
            "user_info": {"bucket": "dermadataaa", "key": "uploads/a.jpg"},
            "analysis_labels": ["Acne", "Enlarged-Pores"],
            "recommendations": [
                {
                    "problem": "Enlarged-Pores",
                    "name": "Pore Minimizing Serum",
                    "brand": "Clarins",
                    "price": "2500",
                    "image_url": "https://example.com/serum.jpg",
                    "ingredients": "Aqua | Glycerin | Silica"
                }
            ]
        }"#;
        let result = parse_analysis_result(body, &IngredientSplitter::default()).unwrap();
        let rec = &result.recommendations[0];
        assert_eq!(rec.brand, "Clarins");
        assert_eq!(rec.price, 2500.0);
        assert_eq!(rec.image_url, "https://example.com/serum.jpg");
        assert_eq!(rec.ingredients, vec!["Aqua", "Glycerin", "Silica"]);
    }

    #[test]
    fn test_parse_null_fields_and_empty_object() {
        let body = r#"{"analysis_labels": null, "recommendations": [{"name": null, "price": null, "ingredients": null}]}"#;
        let result = parse_analysis_result(body, &IngredientSplitter::default()).unwrap();
        assert!(result.labels.is_empty());
        assert_eq!(result.recommendations[0].name, "");
        assert!(result.recommendations[0].ingredients.is_empty());

        let empty = parse_analysis_result("{}", &IngredientSplitter::default()).unwrap();
        assert_eq!(empty, AnalysisResult::default());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let splitter = IngredientSplitter::default();
        assert!(matches!(parse_analysis_result("", &splitter), Err(Error::Parse(_))));
        assert!(matches!(parse_analysis_result("<Error>NoSuchKey</Error>", &splitter), Err(Error::Parse(_))));
        assert!(matches!(parse_analysis_result(r#"{"analysis_labels": "Acne"}"#, &splitter), Err(Error::Parse(_))));
        assert!(matches!(parse_analysis_result("[1, 2]", &splitter), Err(Error::Parse(_))));
        assert!(matches!(
            parse_analysis_result(r#"{"recommendations": [{"price": "free"}]}"#, &splitter),
            Err(Error::Parse(_))
        ));
    }
}
