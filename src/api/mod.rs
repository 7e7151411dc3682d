//! 解析サーバー連携モジュール
//!
//! - `/health`: 接続確認（5秒タイムアウト、リトライなし）
//! - `/analyze`: multipartで画像をアップロードし、遺物情報を受け取る

mod types;

pub use types::{parse_analysis, ArtifactAnalysis, ArtifactInfo};

use crate::error::{Result, ZyaratError};
use crate::prepare::PreparedImage;
use serde_json::Value;
use std::time::Duration;

/// ヘルスチェックのタイムアウト（秒）
const HEALTH_TIMEOUT_SECS: u64 = 5;

/// アップロード時のファイル名（サーバー側contractに合わせる）
const UPLOAD_FILE_NAME: &str = "artifact.jpg";

/// 接続確認の結果
///
/// 失敗も「準備できていない」という答えであり、エラーにはしない。
/// リトライするかどうかは呼び出し側（ユーザー操作）が決める。
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub ready: bool,
    pub detail: String,
}

/// 解析サーバーのHTTPクライアント
#[derive(Debug, Clone)]
pub struct ServerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ZyaratError::Config(format!("HTTPクライアント初期化失敗: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// サーバーの接続確認
    ///
    /// HTTP 2xx かつ `status == "ok"` のときだけ ready になる
    pub async fn check_health(&self) -> HealthStatus {
        let url = format!("{}/health", self.base_url);
        tracing::debug!(%url, "ヘルスチェック開始");

        let response = match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "ヘルスチェック失敗");
                return HealthStatus {
                    ready: false,
                    detail: e.to_string(),
                };
            }
        };

        if !response.status().is_success() {
            return HealthStatus {
                ready: false,
                detail: format!("HTTPステータス {}", response.status()),
            };
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                return HealthStatus {
                    ready: false,
                    detail: format!("ヘルスレスポンスが不正: {}", e),
                };
            }
        };

        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        if status != "ok" {
            return HealthStatus {
                ready: false,
                detail: format!("サーバーが準備できていません: {}", status),
            };
        }

        HealthStatus {
            ready: true,
            detail: "ok".to_string(),
        }
    }

    /// 準備済み画像をアップロードして解析結果を受け取る
    ///
    /// ネットワーク・HTTP失敗は `Upload`、JSONの不正は `ApiParse`。
    /// 未認識はエラーではなく `ArtifactAnalysis::Unrecognized` として返る。
    pub async fn analyze_image(&self, image: &PreparedImage) -> Result<ArtifactAnalysis> {
        let url = format!("{}/analyze", self.base_url);
        tracing::info!(%url, bytes = image.jpeg.len(), "画像アップロード開始");

        let part = reqwest::multipart::Part::bytes(image.jpeg.clone())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(|e| ZyaratError::Upload(format!("multipart構築失敗: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ZyaratError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ZyaratError::Upload(format!(
                "サーバーエラー ({}): {}",
                status, body
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ZyaratError::ApiParse(e.to_string()))?;

        let analysis = parse_analysis(&value)?;
        tracing::info!(
            recognized = analysis.is_recognized(),
            confidence = analysis.confidence(),
            "解析完了"
        );

        Ok(analysis)
    }
}
