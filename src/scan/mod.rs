//! スキャンセッション（撮影→接続確認→準備→解析→受け渡し）
//!
//! 1回のスキャンを状態機械として進める:
//! `Idle → Capturing → Analyzing → Succeeded | Failed`
//!
//! - 解析中の再撮影は拒否（UI側はボタン無効化で防ぐ）
//! - 自動リトライはしない。失敗後の再試行は必ずユーザー操作
//! - キャンセルは協調的: 送信中のアップロードは中断せず、
//!   遅れて届いた結果を破棄する
//! - 結果は画面遷移を要求する前にパラメータストアへ格納する

use crate::api::{ArtifactAnalysis, HealthStatus, ServerClient};
use crate::error::{Result, ZyaratError};
use crate::params::{ParamStore, SCAN_RESULTS_KEY};
use crate::prepare::{self, PrepareSettings, PreparedImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// 接続確認をやり直すまでの間隔
const PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// 接続確認のシーム（テストでは偽物に差し替える）
#[allow(async_fn_in_trait)]
pub trait HealthCheck {
    async fn check_health(&self) -> HealthStatus;
}

/// 画像解析のシーム
#[allow(async_fn_in_trait)]
pub trait ImageAnalyzer {
    async fn analyze_image(&self, image: &PreparedImage) -> Result<ArtifactAnalysis>;
}

impl HealthCheck for ServerClient {
    async fn check_health(&self) -> HealthStatus {
        ServerClient::check_health(self).await
    }
}

impl ImageAnalyzer for ServerClient {
    async fn analyze_image(&self, image: &PreparedImage) -> Result<ArtifactAnalysis> {
        ServerClient::analyze_image(self, image).await
    }
}

/// セッションの状態
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPhase {
    Idle,
    Capturing,
    Analyzing,
    Succeeded,
    Failed(ScanFailure),
}

/// 失敗の分類（どれもユーザー操作で再試行できる）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFailure {
    /// サーバーに到達できない
    Connectivity,
    /// 画像が準備できない（撮り直しが必要）
    Preparation,
    /// アップロードまたはレスポンスの失敗
    Upload,
}

/// 結果画面へ受け渡すペイロード
#[derive(Debug, Clone)]
pub struct ScanResults {
    pub image_path: PathBuf,
    pub artifact: ArtifactAnalysis,
}

/// 解析中のキャンセル用ハンドル
///
/// UI側で確認ダイアログを出してから呼ぶ想定。
/// フラグは各状態遷移の前に確認される。
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct Reachability {
    reachable: bool,
    last_probe: Option<Instant>,
}

/// スキャンセッション
pub struct ScanSession<P, A> {
    prober: P,
    analyzer: A,
    params: Arc<ParamStore<ScanResults>>,
    settings: PrepareSettings,
    phase: Mutex<ScanPhase>,
    cancel: CancelHandle,
    reachability: Mutex<Reachability>,
    observers: Mutex<Vec<Box<dyn Fn(&ScanPhase) + Send>>>,
}

impl<P: HealthCheck, A: ImageAnalyzer> ScanSession<P, A> {
    pub fn new(
        prober: P,
        analyzer: A,
        params: Arc<ParamStore<ScanResults>>,
        settings: PrepareSettings,
    ) -> Self {
        Self {
            prober,
            analyzer,
            params,
            settings,
            phase: Mutex::new(ScanPhase::Idle),
            cancel: CancelHandle::default(),
            reachability: Mutex::new(Reachability {
                reachable: false,
                last_probe: None,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// 現在の状態
    pub fn phase(&self) -> ScanPhase {
        self.phase.lock().unwrap().clone()
    }

    /// 状態遷移の購読
    pub fn subscribe(&self, f: impl Fn(&ScanPhase) + Send + 'static) {
        self.observers.lock().unwrap().push(Box::new(f));
    }

    /// キャンセルハンドルを取得
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 撮影を開始する
    ///
    /// `Idle`・前回の `Succeeded`/`Failed` からのみ入れる。
    /// 解析中・撮影中の再開始は拒否する。
    pub fn begin_capture(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock().unwrap();
            match *phase {
                ScanPhase::Idle | ScanPhase::Succeeded | ScanPhase::Failed(_) => {
                    *phase = ScanPhase::Capturing;
                }
                ScanPhase::Capturing => {
                    return Err(ZyaratError::InvalidState("すでに撮影中です".to_string()));
                }
                ScanPhase::Analyzing => {
                    return Err(ZyaratError::InvalidState(
                        "解析中は撮影できません".to_string(),
                    ));
                }
            }
        }
        self.cancel.reset();
        self.notify(&ScanPhase::Capturing);
        Ok(())
    }

    /// 撮影を取りやめる
    pub fn cancel_capture(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != ScanPhase::Capturing {
                return Err(ZyaratError::InvalidState(
                    "撮影中ではありません".to_string(),
                ));
            }
            *phase = ScanPhase::Idle;
        }
        self.notify(&ScanPhase::Idle);
        Ok(())
    }

    /// 撮影済みの写真を解析する
    ///
    /// 接続確認→画像準備→アップロードを順に行い、成功したら
    /// 結果をパラメータストアに格納してから `Succeeded` になる。
    /// 途中でキャンセルされた場合は結果を破棄して `Ok(None)`。
    pub async fn analyze(&self, photo: &Path) -> Result<Option<ArtifactAnalysis>> {
        self.enter_analyzing()?;

        if self.abort_if_cancelled() {
            return Ok(None);
        }

        // 接続確認（未確認・前回失敗・前回から時間が経過したときだけ）
        if self.needs_probe() {
            let health = self.prober.check_health().await;
            self.record_probe(health.ready);

            if !health.ready {
                tracing::warn!(detail = %health.detail, "接続確認に失敗");
                return Err(self.fail(
                    ScanFailure::Connectivity,
                    ZyaratError::Connectivity(health.detail),
                ));
            }
        }

        if self.abort_if_cancelled() {
            return Ok(None);
        }

        // 画像準備（失敗はこのスキャンにとって致命的）
        let prepared = match prepare::prepare_image(photo, &self.settings) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(ScanFailure::Preparation, e)),
        };

        if self.abort_if_cancelled() {
            return Ok(None);
        }

        // アップロード（中断できないため、完了後にキャンセルを再確認する）
        let analysis = match self.analyzer.analyze_image(&prepared).await {
            Ok(a) => a,
            Err(e) => {
                if self.cancel.is_cancelled() {
                    // キャンセル済みの試行のエラーは報告しない
                    self.set_phase(ScanPhase::Idle);
                    return Ok(None);
                }
                self.mark_unreachable_on_upload_error(&e);
                return Err(self.fail(ScanFailure::Upload, e));
            }
        };

        if self.abort_if_cancelled() {
            tracing::info!("キャンセル済みのため解析結果を破棄");
            return Ok(None);
        }

        let image_path = match prepare::write_prepared(&prepared) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(ScanFailure::Preparation, e)),
        };

        // 遷移要求より先に結果を格納する（結果画面が空振りしないように）
        self.params.set(
            SCAN_RESULTS_KEY,
            ScanResults {
                image_path,
                artifact: analysis.clone(),
            },
        );

        self.set_phase(ScanPhase::Succeeded);
        Ok(Some(analysis))
    }

    fn enter_analyzing(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != ScanPhase::Capturing {
                return Err(ZyaratError::InvalidState(
                    "撮影を開始していません".to_string(),
                ));
            }
            *phase = ScanPhase::Analyzing;
        }
        self.notify(&ScanPhase::Analyzing);
        Ok(())
    }

    fn needs_probe(&self) -> bool {
        let reach = self.reachability.lock().unwrap();
        if !reach.reachable {
            return true;
        }
        match reach.last_probe {
            None => true,
            Some(at) => at.elapsed() > PROBE_INTERVAL,
        }
    }

    fn record_probe(&self, reachable: bool) {
        let mut reach = self.reachability.lock().unwrap();
        reach.reachable = reachable;
        reach.last_probe = Some(Instant::now());
    }

    fn mark_unreachable_on_upload_error(&self, error: &ZyaratError) {
        if matches!(error, ZyaratError::Upload(_)) {
            self.reachability.lock().unwrap().reachable = false;
        }
    }

    fn abort_if_cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            self.set_phase(ScanPhase::Idle);
            true
        } else {
            false
        }
    }

    fn fail(&self, failure: ScanFailure, error: ZyaratError) -> ZyaratError {
        self.set_phase(ScanPhase::Failed(failure));
        error
    }

    fn set_phase(&self, phase: ScanPhase) {
        *self.phase.lock().unwrap() = phase.clone();
        self.notify(&phase);
    }

    fn notify(&self, phase: &ScanPhase) {
        for observer in self.observers.lock().unwrap().iter() {
            observer(phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    struct ReadyProbe;

    impl HealthCheck for ReadyProbe {
        async fn check_health(&self) -> HealthStatus {
            HealthStatus {
                ready: true,
                detail: "ok".to_string(),
            }
        }
    }

    struct FixedAnalyzer(ArtifactAnalysis);

    impl ImageAnalyzer for FixedAnalyzer {
        async fn analyze_image(&self, _image: &PreparedImage) -> Result<ArtifactAnalysis> {
            Ok(self.0.clone())
        }
    }

    fn unrecognized() -> ArtifactAnalysis {
        ArtifactAnalysis::Unrecognized {
            possible_identification: None,
            explanation: None,
            confidence: 0.2,
        }
    }

    fn test_photo(dir: &Path) -> PathBuf {
        let path = dir.join("photo.jpg");
        let img = ImageBuffer::from_fn(64, 48, |x, _| Rgb([x as u8, 100, 50]));
        img.save(&path).expect("テスト画像の保存失敗");
        path
    }

    type TestSession = ScanSession<ReadyProbe, FixedAnalyzer>;

    fn session() -> (TestSession, Arc<ParamStore<ScanResults>>) {
        let params = Arc::new(ParamStore::new());
        let session = ScanSession::new(
            ReadyProbe,
            FixedAnalyzer(unrecognized()),
            Arc::clone(&params),
            PrepareSettings::default(),
        );
        (session, params)
    }

    /// 初期状態はIdle、撮影開始でCapturing
    #[test]
    fn test_begin_capture() {
        let (session, _params) = session();
        assert_eq!(session.phase(), ScanPhase::Idle);

        session.begin_capture().unwrap();
        assert_eq!(session.phase(), ScanPhase::Capturing);
    }

    /// 撮影中の再開始は拒否
    #[test]
    fn test_begin_capture_twice_rejected() {
        let (session, _params) = session();
        session.begin_capture().unwrap();

        let result = session.begin_capture();
        assert!(matches!(result, Err(ZyaratError::InvalidState(_))));
    }

    /// 撮影の取りやめでIdleに戻る
    #[test]
    fn test_cancel_capture() {
        let (session, _params) = session();
        session.begin_capture().unwrap();

        session.cancel_capture().unwrap();
        assert_eq!(session.phase(), ScanPhase::Idle);

        // 再び撮影に入れる
        session.begin_capture().unwrap();
    }

    /// 撮影していない状態のanalyzeは拒否
    #[tokio::test]
    async fn test_analyze_without_capture_rejected() {
        let (session, _params) = session();
        let result = session.analyze(Path::new("whatever.jpg")).await;
        assert!(matches!(result, Err(ZyaratError::InvalidState(_))));
    }

    /// 購読者は遷移のたびに呼ばれる
    #[tokio::test]
    async fn test_observers_see_transitions() {
        let dir = tempdir().expect("Failed to create temp dir");
        let photo = test_photo(dir.path());

        let (session, _params) = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        session.subscribe(move |phase| seen2.lock().unwrap().push(phase.clone()));

        session.begin_capture().unwrap();
        session.analyze(&photo).await.unwrap();

        let phases = seen.lock().unwrap();
        assert_eq!(
            *phases,
            vec![
                ScanPhase::Capturing,
                ScanPhase::Analyzing,
                ScanPhase::Succeeded
            ]
        );
    }

    /// 未認識の結果もパラメータストアに載る
    #[tokio::test]
    async fn test_unrecognized_is_staged() {
        let dir = tempdir().expect("Failed to create temp dir");
        let photo = test_photo(dir.path());

        let (session, params) = session();
        session.begin_capture().unwrap();
        let outcome = session.analyze(&photo).await.unwrap();

        assert!(outcome.is_some());
        assert_eq!(session.phase(), ScanPhase::Succeeded);

        let staged = params.take(SCAN_RESULTS_KEY).expect("結果が格納されていない");
        assert!(!staged.artifact.is_recognized());
    }
}
