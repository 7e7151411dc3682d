//! Zyarat - チュニジア遺物スキャンアプリのコア
//!
//! 撮影した写真を解析サーバーへアップロードして遺物を識別し、
//! 結果を画面間で受け渡すパイプラインと、コレクション（Kronodex）・
//! チケットのインメモリストアを提供する。

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod kronodex;
pub mod params;
pub mod prepare;
pub mod scan;
pub mod tickets;
