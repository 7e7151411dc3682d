//! Kronodex（スキャンした遺物のコレクション）
//!
//! 保存済み遺物のインメモリストア。同じ遺物は2回保存できない
//! （上書きではなく拒否）。一覧は常にタイトル昇順。

use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Mutex;

/// 新規保存時に獲得するXP
const KRONODEX_SAVE_XP: u32 = 25;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// タイトルを同一性判定用に正規化する
///
/// 前後の空白を落とし、連続空白を1つにまとめ、小文字化する。
/// 安定した遺物IDが無いため、正規化タイトルをIDとして使う。
pub fn normalize_title(title: &str) -> String {
    WHITESPACE
        .replace_all(title.trim(), " ")
        .to_lowercase()
}

/// Kronodexの1エントリ
#[derive(Debug, Clone)]
pub struct KronodexEntry {
    pub title: String,
    pub period: String,
    pub description: String,
    pub significance: String,
    pub location: String,
    pub image_path: Option<PathBuf>,
    pub saved_at: DateTime<Local>,
}

/// 保存リクエスト（保存日時はストア側で付与）
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub period: String,
    pub description: String,
    pub significance: String,
    pub location: String,
    pub image_path: Option<PathBuf>,
}

/// 保存操作の結果
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub accepted: bool,
    pub message: String,
    pub xp_earned: Option<u32>,
}

impl AddOutcome {
    /// 拒否をエラーとして扱いたい呼び出し側向けの変換
    pub fn into_result(self) -> crate::error::Result<AddOutcome> {
        if self.accepted {
            Ok(self)
        } else {
            Err(crate::error::ZyaratError::DuplicateSave(self.message))
        }
    }
}

#[derive(Debug)]
struct Stored {
    entry: KronodexEntry,
    /// 挿入順（同タイトル時の安定ソート用）
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    items: Vec<Stored>,
    next_seq: u64,
}

/// 保存済み遺物のストア
#[derive(Debug, Default)]
pub struct Kronodex {
    inner: Mutex<Inner>,
}

impl Kronodex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 遺物を保存する
    ///
    /// 同一性チェックと挿入は1ロック内で行う。重複時はストアを
    /// 変更せず `accepted = false` と理由を返す。
    pub fn add(&self, new_entry: NewEntry) -> AddOutcome {
        let id = normalize_title(&new_entry.title);
        let mut inner = self.inner.lock().unwrap();

        if inner
            .items
            .iter()
            .any(|s| normalize_title(&s.entry.title) == id)
        {
            tracing::debug!(title = %new_entry.title, "Kronodex重複保存を拒否");
            return AddOutcome {
                accepted: false,
                message: format!("{} is already in your Kronodex.", new_entry.title),
                xp_earned: None,
            };
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entry = KronodexEntry {
            title: new_entry.title,
            period: new_entry.period,
            description: new_entry.description,
            significance: new_entry.significance,
            location: new_entry.location,
            image_path: new_entry.image_path,
            saved_at: Local::now(),
        };
        let title = entry.title.clone();

        inner.items.push(Stored { entry, seq });
        // タイトル昇順、同タイトルは挿入順
        inner
            .items
            .sort_by(|a, b| a.entry.title.cmp(&b.entry.title).then(a.seq.cmp(&b.seq)));

        tracing::info!(title = %title, "Kronodexに保存");

        AddOutcome {
            accepted: true,
            message: format!(
                "{} added to Kronodex! +{} XP Earned!",
                title, KRONODEX_SAVE_XP
            ),
            xp_earned: Some(KRONODEX_SAVE_XP),
        }
    }

    /// 保存済みかどうか（正規化タイトルで判定）
    pub fn contains(&self, title: &str) -> bool {
        let id = normalize_title(title);
        self.inner
            .lock()
            .unwrap()
            .items
            .iter()
            .any(|s| normalize_title(&s.entry.title) == id)
    }

    /// 明示的な削除
    pub fn remove(&self, title: &str) -> bool {
        let id = normalize_title(title);
        let mut inner = self.inner.lock().unwrap();
        let before = inner.items.len();
        inner
            .items
            .retain(|s| normalize_title(&s.entry.title) != id);
        inner.items.len() < before
    }

    /// タイトル昇順の一覧
    pub fn items(&self) -> Vec<KronodexEntry> {
        self.inner
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|s| s.entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
