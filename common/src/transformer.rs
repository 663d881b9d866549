//! 表示用ビューモデルへの変換
//!
//! `AnalysisResult` からラベル翻訳・価格整形・問題別グルーピングを行った
//! `ViewModel` を毎回新しく組み立てる。

use crate::locale::LocaleMap;
use crate::types::{AnalysisResult, Recommendation};
use serde::{Deserialize, Serialize};

/// 変換オプション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    /// 価格の後ろに付ける通貨表記
    pub currency_suffix: String,
    /// 画像URLが空の商品に使う画像
    pub placeholder_image_url: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            currency_suffix: "บาท".into(),
            placeholder_image_url: "./Image/placeholder.png".into(),
        }
    }
}

/// 翻訳済みラベル
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelView {
    pub raw: String,
    pub display: String,
}

/// 表示用の商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationView {
    /// "ブランド - 商品名"（ブランドが空なら商品名のみ）
    pub title: String,
    pub name: String,
    pub brand: String,
    pub price_display: String,
    pub image_url: String,
    pub ingredients: Vec<String>,
}

/// 問題ごとの商品グループ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationGroup {
    pub problem: String,
    pub problem_display: String,
    pub items: Vec<RecommendationView>,
}

/// おすすめ商品の有無
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewOutcome {
    HasRecommendations,
    /// 結果は届いたが該当商品なし（描画待ちとは区別する）
    NoRecommendations,
}

/// 表示用ビューモデル
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub labels: Vec<LabelView>,
    pub groups: Vec<RecommendationGroup>,
    pub outcome: ViewOutcome,
    /// 問題ラベルが1つもない
    pub healthy: bool,
}

impl ViewModel {
    pub fn has_recommendations(&self) -> bool {
        self.outcome == ViewOutcome::HasRecommendations
    }

    pub fn recommendation_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }
}

/// 解析結果をビューモデルへ変換
pub fn transform(result: &AnalysisResult, locale: &LocaleMap, options: &TransformOptions) -> ViewModel {
    let labels: Vec<LabelView> = result
        .labels
        .iter()
        .map(|raw| LabelView {
            raw: raw.clone(),
            display: locale.translate(raw).to_string(),
        })
        .collect();

    // 初出順でグルーピング
    let mut groups: Vec<RecommendationGroup> = Vec::new();
    for rec in &result.recommendations {
        let view = recommendation_view(rec, options);
        match groups.iter_mut().find(|g| g.problem == rec.problem) {
            Some(group) => group.items.push(view),
            None => groups.push(RecommendationGroup {
                problem: rec.problem.clone(),
                problem_display: locale.translate(&rec.problem).to_string(),
                items: vec![view],
            }),
        }
    }

    let outcome = if groups.is_empty() {
        ViewOutcome::NoRecommendations
    } else {
        ViewOutcome::HasRecommendations
    };

    ViewModel {
        healthy: labels.is_empty(),
        labels,
        groups,
        outcome,
    }
}

fn recommendation_view(rec: &Recommendation, options: &TransformOptions) -> RecommendationView {
    let title = if rec.brand.trim().is_empty() {
        rec.name.clone()
    } else {
        format!("{} - {}", rec.brand, rec.name)
    };

    let price = format_price(rec.price);
    let price_display = if options.currency_suffix.is_empty() {
        price
    } else {
        format!("{} {}", price, options.currency_suffix)
    };

    let image_url = if rec.image_url.trim().is_empty() {
        options.placeholder_image_url.clone()
    } else {
        rec.image_url.clone()
    };

    RecommendationView {
        title,
        name: rec.name.clone(),
        brand: rec.brand.clone(),
        price_display,
        image_url,
        ingredients: rec
            .ingredients
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// 価格を3桁区切りで整形（小数は最大2桁、末尾の0は省く）
///
/// `8942.5` → `"8,942.5"`, `2500.0` → `"2,500"`
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return "-".to_string();
    }

    // 100倍すると整数部が正確に表せない桁では小数を捨て、floatの10進表記をそのまま区切る
    if price.abs() >= LARGE_PRICE {
        let sign = if price < 0.0 { "-" } else { "" };
        return format!("{}{}", sign, group_digits(&format!("{:.0}", price.abs())));
    }

    let cents = (price.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let fraction = cents % 100;
    let grouped = group_digits(&whole.to_string());

    let sign = if price < 0.0 && cents > 0 { "-" } else { "" };
    match fraction {
        0 => format!("{}{}", sign, grouped),
        f if f % 10 == 0 => format!("{}{}.{}", sign, grouped, f / 10),
        f => format!("{}{}.{:02}", sign, grouped, f),
    }
}

/// これ以上は f64 で小数2桁まで正確に表せない
const LARGE_PRICE: f64 = 1e13;

fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
