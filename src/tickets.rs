//! チケット予約ストア
//!
//! イベントチケットのインメモリストア。購入1回で枚数分の
//! チケットを発行する。発行後のチケットは変更も削除もされない
//! （キャンセル・払い戻しはスコープ外）。

use crate::error::{Result, ZyaratError};
use chrono::{DateTime, Local, NaiveDate};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Mutex;

/// 発行済みチケット
#[derive(Debug, Clone)]
pub struct Ticket {
    /// 一意なチケットID（発行後不変）
    pub id: String,
    pub event_id: String,
    /// 来場予定日
    pub event_date: NaiveDate,
    pub purchased_at: DateTime<Local>,
    pub unit_price: f64,
    /// 購入枚数から導出した合計金額
    pub total: f64,
    /// 入場時に提示するコード（QRペイロード）
    pub redemption_code: String,
}

/// チケットストア
#[derive(Debug, Default)]
pub struct Tickets {
    items: Mutex<Vec<Ticket>>,
}

impl Tickets {
    pub fn new() -> Self {
        Self::default()
    }

    /// チケットを購入する
    ///
    /// `quantity` 枚をまとめて発行し、それぞれに新しいIDを振る。
    /// 日付・単価・イベントは全チケット共通。
    ///
    /// # Errors
    /// 枚数0、または来場日が購入日より過去なら `InvalidReservation`
    pub fn purchase(
        &self,
        event_id: &str,
        event_date: NaiveDate,
        unit_price: f64,
        quantity: u32,
    ) -> Result<Vec<Ticket>> {
        self.purchase_with_today(
            event_id,
            event_date,
            unit_price,
            quantity,
            Local::now().date_naive(),
        )
    }

    fn purchase_with_today(
        &self,
        event_id: &str,
        event_date: NaiveDate,
        unit_price: f64,
        quantity: u32,
        today: NaiveDate,
    ) -> Result<Vec<Ticket>> {
        if quantity == 0 {
            return Err(ZyaratError::InvalidReservation(
                "枚数は1以上を指定してください".to_string(),
            ));
        }

        if event_date < today {
            return Err(ZyaratError::InvalidReservation(format!(
                "来場日が過去です: {}",
                event_date
            )));
        }

        let purchased_at = Local::now();
        let millis = purchased_at.timestamp_millis();
        let total = unit_price * quantity as f64;

        let tickets: Vec<Ticket> = (0..quantity)
            .map(|_| Ticket {
                id: format!("ticket_{}_{}", millis, random_suffix()),
                event_id: event_id.to_string(),
                event_date,
                purchased_at,
                unit_price,
                total,
                redemption_code: format!("ZYARAT_TICKET_{}_{}", event_id, millis),
            })
            .collect();

        let mut items = self.items.lock().unwrap();
        items.extend(tickets.iter().cloned());

        tracing::info!(event_id, quantity, %event_date, "チケット発行");

        Ok(tickets)
    }

    /// 今日以降のチケット枚数
    ///
    /// 読み取りのたびに現在時刻から計算し直す（日をまたいでも
    /// 古いカウントを返さない）
    pub fn upcoming_count(&self) -> usize {
        self.upcoming_count_at(Local::now().date_naive())
    }

    /// 指定日を「今日」としたときの今後のチケット枚数
    pub fn upcoming_count_at(&self, today: NaiveDate) -> usize {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.event_date >= today)
            .count()
    }

    /// 購入履歴（発行順）
    pub fn all(&self) -> Vec<Ticket> {
        self.items.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// IDの衝突防止用サフィックス（英数6文字）
fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}
