use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use zyarat_rust::api::{ArtifactAnalysis, ServerClient};
use zyarat_rust::cli::{Cli, Commands};
use zyarat_rust::config::Config;
use zyarat_rust::error::Result;
use zyarat_rust::kronodex::{Kronodex, NewEntry};
use zyarat_rust::params::{ParamStore, SCAN_RESULTS_KEY};
use zyarat_rust::prepare::{self, PrepareSettings};
use zyarat_rust::scan::{ScanResults, ScanSession};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = Config::load()?;

    match cli.command {
        Commands::Scan {
            image,
            max_width,
            no_save_prompt,
        } => {
            println!("🏺 zyarat - 遺物スキャン\n");

            let base_url = config.get_server_url()?;
            let client = ServerClient::new(&base_url, config.timeout_seconds)?;
            let settings = PrepareSettings {
                max_width: max_width.unwrap_or(config.max_image_width),
                jpeg_quality: config.jpeg_quality,
            };

            let params = Arc::new(ParamStore::new());
            let session =
                ScanSession::new(client.clone(), client, Arc::clone(&params), settings);

            // 1. 写真読み込み
            println!("[1/3] 写真を読み込み中...");
            let info = prepare::read_photo_info(&image)?;
            match &info.date {
                Some(date) => println!("✔ {} (撮影: {})\n", info.file_name, date),
                None => println!("✔ {}\n", info.file_name),
            }

            // 2. 解析
            println!("[2/3] AI解析中...");
            let spinner = indicatif::ProgressBar::new_spinner();
            spinner.set_message("解析サーバーに問い合わせ中...");
            spinner.enable_steady_tick(Duration::from_millis(120));

            session.begin_capture()?;
            let outcome = session.analyze(&info.path).await;
            spinner.finish_and_clear();

            let analysis = outcome?;
            if analysis.is_none() {
                println!("スキャンはキャンセルされました");
                return Ok(());
            }
            println!("✔ 解析完了\n");

            // 3. 結果表示（結果画面と同じくストアから取り出す）
            println!("[3/3] 結果");
            let Some(results) = params.take(SCAN_RESULTS_KEY) else {
                println!("結果が見つかりませんでした");
                return Ok(());
            };
            print_results(&results);

            // Kronodexへの保存
            if let ArtifactAnalysis::Recognized(info) = &results.artifact {
                let save = if no_save_prompt {
                    false
                } else {
                    dialoguer::Confirm::new()
                        .with_prompt("Kronodexに保存しますか？")
                        .default(true)
                        .interact()
                        .unwrap_or(false)
                };

                if save {
                    let kronodex = Kronodex::new();
                    let outcome = kronodex.add(NewEntry {
                        title: info.title.clone(),
                        period: info.period.clone(),
                        description: info.description.clone(),
                        significance: info.significance.clone(),
                        location: info.location.clone(),
                        image_path: Some(results.image_path.clone()),
                    });
                    println!("\n{}", outcome.message);
                }
            }

            println!("\n✅ スキャン完了");
        }

        Commands::Health => {
            println!("🛰 zyarat - 接続確認\n");

            let base_url = config.get_server_url()?;
            let client = ServerClient::new(&base_url, config.timeout_seconds)?;
            let health = client.check_health().await;

            if health.ready {
                println!("✔ サーバーは稼働中です: {}", client.base_url());
            } else {
                println!("✖ サーバーに接続できません: {}", health.detail);
            }
        }

        Commands::Config {
            set_server_url,
            show,
        } => {
            let mut config = config;

            if let Some(url) = set_server_url {
                config.set_server_url(url)?;
                println!("✔ サーバーURLを設定しました");
            }

            if show {
                println!("設定:");
                println!(
                    "  サーバーURL: {}",
                    config.server_url.as_deref().unwrap_or("未設定")
                );
                println!("  最大画像幅: {}px", config.max_image_width);
                println!("  JPEG品質: {}", config.jpeg_quality);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
            }
        }
    }

    Ok(())
}

/// 結果画面と同じ構成で解析結果を表示する
fn print_results(results: &ScanResults) {
    match &results.artifact {
        ArtifactAnalysis::Recognized(info) => {
            println!("  {}", info.title);
            println!("  信頼度: {:.1}%", info.confidence * 100.0);
            println!("  時代: {}", info.period);
            println!("  場所: {}", info.location);
            println!("  説明: {}", info.description);
            println!("  歴史的意義: {}", info.significance);
        }
        ArtifactAnalysis::Unrecognized {
            possible_identification,
            explanation,
            confidence,
        } => {
            println!("  遺物として認識できませんでした (信頼度 {:.1}%)", confidence * 100.0);
            if let Some(possible) = possible_identification {
                println!("  推定: {}", possible);
            }
            if let Some(explanation) = explanation {
                println!("  補足: {}", explanation);
            }
        }
    }
    println!("  画像: {}", results.image_path.display());
}
