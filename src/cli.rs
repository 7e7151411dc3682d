use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "zyarat")]
#[command(about = "チュニジア遺物スキャン・解析ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 写真を解析サーバーへ送って遺物を識別する
    Scan {
        /// 写真ファイルのパス
        #[arg(required = true)]
        image: PathBuf,

        /// リサイズの最大幅（省略時は設定値）
        #[arg(long)]
        max_width: Option<u32>,

        /// Kronodex保存の確認プロンプトを出さない
        #[arg(long)]
        no_save_prompt: bool,
    },

    /// 解析サーバーの接続確認
    Health,

    /// 設定を表示/編集
    Config {
        /// 解析サーバーのURLを設定
        #[arg(long)]
        set_server_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
