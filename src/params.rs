//! 画面間パラメータストア
//!
//! ナビゲーションにパラメータを載せると途中で落ちることがあるため、
//! 遷移直前に書き込み、遷移先のマウント時に取り出す小さな中継ストア。
//! キューではない: 取り出し前に同じキーへ書けば上書きされる。

use std::collections::HashMap;
use std::sync::Mutex;

/// スキャン結果を受け渡すキー
pub const SCAN_RESULTS_KEY: &str = "scanResults";

/// キー付きの単一スロット中継ストア
///
/// `set` は本体のマップと予備スロットの両方に書く。
/// 本体がライフサイクル等で先に消えても、予備スロットから1回だけ
/// 復元できる。`take` は読み取りとクリアを1操作で行い、
/// 同じ値が二度配送されることはない。
#[derive(Debug, Default)]
pub struct ParamStore<T> {
    store: Mutex<HashMap<String, T>>,
    /// 予備スロット（直近のsetを1件だけ保持）
    fallback: Mutex<Option<(String, T)>>,
}

impl<T: Clone> ParamStore<T> {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            fallback: Mutex::new(None),
        }
    }

    /// 値を格納する（同じキーは上書き）
    pub fn set(&self, key: &str, value: T) {
        let mut store = self.store.lock().unwrap();
        store.insert(key.to_string(), value.clone());
        *self.fallback.lock().unwrap() = Some((key.to_string(), value));
        tracing::debug!(key, "パラメータ格納");
    }

    /// 値を取り出してクリアする
    ///
    /// 本体に無ければ予備スロットを1回だけ使う。
    /// 2回目の呼び出しは必ず `None`。
    pub fn take(&self, key: &str) -> Option<T> {
        let taken = self.store.lock().unwrap().remove(key);

        if let Some(value) = taken {
            // 同じキーの予備も消して再配送を防ぐ
            let mut fallback = self.fallback.lock().unwrap();
            if fallback.as_ref().map(|(k, _)| k == key).unwrap_or(false) {
                *fallback = None;
            }
            tracing::debug!(key, "パラメータ取得");
            return Some(value);
        }

        // 本体が消えていた場合の復元（1回限り）
        let mut fallback = self.fallback.lock().unwrap();
        if fallback.as_ref().map(|(k, _)| k == key).unwrap_or(false) {
            tracing::debug!(key, "予備スロットから復元");
            return fallback.take().map(|(_, v)| v);
        }

        None
    }

    /// 指定キーを本体からクリアする（予備スロットは残る）
    pub fn clear(&self, key: &str) {
        self.store.lock().unwrap().remove(key);
        tracing::debug!(key, "パラメータクリア");
    }

    /// 全キーをクリアする
    pub fn clear_all(&self) {
        self.store.lock().unwrap().clear();
        *self.fallback.lock().unwrap() = None;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().unwrap().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// setしたらtakeでちょうど1回取り出せる
    #[test]
    fn test_set_take_once() {
        let store = ParamStore::new();
        store.set("scanResults", "payload".to_string());

        assert_eq!(store.take("scanResults"), Some("payload".to_string()));
        // 2回目は空
        assert_eq!(store.take("scanResults"), None);
    }

    /// 取り出す前のsetは上書き（キューではない）
    #[test]
    fn test_set_overwrites() {
        let store = ParamStore::new();
        store.set("key", 1);
        store.set("key", 2);

        assert_eq!(store.take("key"), Some(2));
        assert_eq!(store.take("key"), None);
    }

    /// 本体がクリアされても予備スロットから1回だけ復元できる
    #[test]
    fn test_fallback_recovery() {
        let store = ParamStore::new();
        store.set("scanResults", "payload".to_string());

        // ライフサイクルで本体だけ消えたことにする
        store.clear("scanResults");
        assert!(!store.contains("scanResults"));

        assert_eq!(store.take("scanResults"), Some("payload".to_string()));
        // 復元は1回限り
        assert_eq!(store.take("scanResults"), None);
    }

    /// 別キーのtakeは予備スロットに触らない
    #[test]
    fn test_take_other_key() {
        let store = ParamStore::new();
        store.set("a", 10);

        assert_eq!(store.take("b"), None);
        assert_eq!(store.take("a"), Some(10));
    }

    /// clear_allは予備スロットも消す
    #[test]
    fn test_clear_all() {
        let store = ParamStore::new();
        store.set("a", 1);
        store.clear_all();

        assert_eq!(store.take("a"), None);
    }

    /// 未設定キーはNone
    #[test]
    fn test_take_absent() {
        let store: ParamStore<String> = ParamStore::new();
        assert_eq!(store.take("missing"), None);
    }
}
