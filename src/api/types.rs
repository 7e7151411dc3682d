//! 解析サーバーのレスポンス型
//!
//! `/analyze` のJSONを遺物情報（Recognized）または
//! 未認識（Unrecognized）に分類する。
//! 通信・パース失敗は `Result` のエラー側で表現し、
//! 1回のアップロードに対して結果は必ず3通りのうち1つになる。

use crate::error::{Result, ZyaratError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 認識された遺物の情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactInfo {
    pub title: String,
    pub period: String,
    pub description: String,
    pub significance: String,
    pub location: String,
    /// 認識信頼度 (0..1)。しきい値の判断はサーバー側の責務
    pub confidence: f64,
}

/// 1回の解析の分類結果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ArtifactAnalysis {
    /// チュニジア遺物として認識された
    Recognized(ArtifactInfo),
    /// 遺物として認識されなかった（エラーではなく正常な分類）
    Unrecognized {
        possible_identification: Option<String>,
        explanation: Option<String>,
        confidence: f64,
    },
}

impl ArtifactAnalysis {
    pub fn is_recognized(&self) -> bool {
        matches!(self, ArtifactAnalysis::Recognized(_))
    }

    pub fn confidence(&self) -> f64 {
        match self {
            ArtifactAnalysis::Recognized(info) => info.confidence,
            ArtifactAnalysis::Unrecognized { confidence, .. } => *confidence,
        }
    }
}

/// サーバーのJSONレスポンスを分類する
///
/// 分類ルール:
/// - `error` フィールドが真値 → `Unrecognized`
/// - それ以外 → `Recognized`（`title` 必須、他フィールドは欠落時デフォルト）
/// - オブジェクトでない・`title` 欠落 → `ApiParse` エラー
pub fn parse_analysis(value: &Value) -> Result<ArtifactAnalysis> {
    let Some(map) = value.as_object() else {
        return Err(ZyaratError::ApiParse(format!(
            "JSONオブジェクトではありません: {}",
            value
        )));
    };

    // errorフィールドが真値なら未認識レスポンス
    let has_error = map
        .get("error")
        .map(|v| match v {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .unwrap_or(false);

    if has_error {
        return Ok(ArtifactAnalysis::Unrecognized {
            possible_identification: get_string(map, "possible_identification"),
            explanation: get_string(map, "explanation"),
            confidence: get_f64(map, "confidence").unwrap_or(0.3),
        });
    }

    let Some(title) = get_string(map, "title") else {
        return Err(ZyaratError::ApiParse(
            "認識結果にtitleがありません".to_string(),
        ));
    };

    Ok(ArtifactAnalysis::Recognized(ArtifactInfo {
        title,
        period: get_string(map, "period").unwrap_or_else(|| "Unknown".to_string()),
        description: get_string(map, "description").unwrap_or_else(|| "Unknown".to_string()),
        significance: get_string(map, "significance").unwrap_or_else(|| "Unknown".to_string()),
        location: get_string(map, "location").unwrap_or_else(|| "Unknown".to_string()),
        confidence: get_f64(map, "confidence").unwrap_or(0.7),
    }))
}

fn get_string(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    let value = map.get(key)?;
    if let Some(s) = value.as_str() {
        if s.is_empty() {
            return None;
        }
        return Some(s.to_string());
    }
    if value.is_null() {
        return None;
    }
    Some(value.to_string())
}

fn get_f64(map: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    let value = map.get(key)?;
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    if let Some(s) = value.as_str() {
        return s.parse().ok();
    }
    None
}
