use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZyaratError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("解析サーバーのURLが設定されていません。`zyarat config --set-server-url URL` で設定するか、環境変数 ZYARAT_SERVER_URL を指定してください")]
    MissingServerUrl,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("画像の準備に失敗しました（撮り直してください）: {0}")]
    ImagePreparation(String),

    #[error("解析サーバーに接続できません（接続を確認して再試行してください）: {0}")]
    Connectivity(String),

    #[error("画像のアップロードに失敗しました（再試行してください）: {0}")]
    Upload(String),

    #[error("解析レスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("Kronodex: {0}")]
    DuplicateSave(String),

    #[error("チケット予約が不正です: {0}")]
    InvalidReservation(String),

    #[error("操作できない状態です: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, ZyaratError>;
