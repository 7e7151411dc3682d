use crate::error::{Result, ZyaratError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_url: Option<String>,
    pub max_image_width: u32,
    pub jpeg_quality: u8,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ZyaratError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("zyarat").join("config.json"))
    }

    /// 解析サーバーのベースURLを取得
    ///
    /// 環境変数 ZYARAT_SERVER_URL を優先し、未設定なら設定ファイルの値を使う
    pub fn get_server_url(&self) -> Result<String> {
        if let Ok(url) = std::env::var("ZYARAT_SERVER_URL") {
            if !url.trim().is_empty() {
                return Ok(url);
            }
        }

        self.server_url.clone().ok_or(ZyaratError::MissingServerUrl)
    }

    pub fn set_server_url(&mut self, url: String) -> Result<()> {
        self.server_url = Some(url);
        self.save()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            max_image_width: 900,  // アップロード前のリサイズ幅
            jpeg_quality: 80,
            timeout_seconds: 30,
        }
    }
}
