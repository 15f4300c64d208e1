// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use migration::{Migrator, MigratorTrait};
use taxrs::config::settings::Settings;
use taxrs::domain::services::captcha_solver::{CaptchaSolver, SolverTiming};
use taxrs::domain::services::challenge_transcriber::AudioChallengeTranscriber;
use taxrs::domain::services::entity_extractor::EntityExtractor;
use taxrs::domain::services::persistence_gateway::PersistenceGateway;
use taxrs::engines::audio_fetcher::ReqwestAudioFetcher;
use taxrs::engines::chromium_session::ChromiumBrowser;
use taxrs::engines::traits::SessionFactory;
use taxrs::infrastructure::audio::FfmpegTranscoder;
use taxrs::infrastructure::company_info::CompanyInfoClient;
use taxrs::infrastructure::database::connection;
use taxrs::infrastructure::repositories::company_repo_impl::CompanyRepoImpl;
use taxrs::infrastructure::snapshot::CsvSnapshotRepository;
use taxrs::infrastructure::speech::GoogleSpeechRecognizer;
use taxrs::utils::input_loader;
use taxrs::utils::retry_policy::RetryPolicy;
use taxrs::utils::telemetry::{self, LogFormat};
use taxrs::workers::orchestrator::{QueryForm, ScrapePipeline, SharedWorkingSet, WorkingSet};
use taxrs::workers::WorkerManager;

#[derive(Parser)]
#[command(name = "taxrs")]
#[command(about = "Tax registry scraper for business identification numbers", long_about = None)]
struct Cli {
    /// BIN values to query
    identifiers: Vec<String>,

    /// Read BIN values from a CSV or plain-text file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Number of parallel browser sessions (overrides scrape.workers)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Fetch public company info for every BIN in a region CSV or a directory of them
    #[arg(long, value_name = "PATH")]
    enrich: Option<PathBuf>,

    /// Output directory for enriched CSV files (overrides company_info.output_dir)
    #[arg(short, long, requires = "enrich")]
    output: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "TAXRS_LOG_FORMAT")]
    log_format: LogFormat,
}

/// 主函数
///
/// 初始化所有组件，处理标识号队列，输出运行统计
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    let cli = Cli::parse();
    telemetry::init_telemetry(cli.log_format);
    info!("Starting taxrs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    if let Some(input) = cli.enrich.as_ref() {
        let output_dir = cli
            .output
            .clone()
            .unwrap_or_else(|| settings.company_info.output_dir.clone());
        let client = CompanyInfoClient::new(&settings.company_info)?;
        let results = client.enrich_path(input, &output_dir).await?;
        for (path, summary) in &results {
            info!("Wrote {:?}: {}", path, summary);
        }
        info!("Enrichment finished, {} files written", results.len());
        return Ok(());
    }

    let mut identifiers = cli.identifiers;
    if let Some(path) = cli.file.as_ref() {
        identifiers.extend(input_loader::load_identifiers(path)?);
    }
    if identifiers.is_empty() {
        warn!("No identifiers given, nothing to do");
        return Ok(());
    }
    settings.speech.require_api_key()?;

    // 3. Connect to database
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Persistence
    let window = settings.scrape.year_window();
    let repository = CompanyRepoImpl::new(db.clone());
    repository.ensure_year_columns(window).await?;
    let gateway = Arc::new(PersistenceGateway::new(
        Arc::new(repository),
        Arc::new(CsvSnapshotRepository::new(
            settings.scrape.snapshot_path.clone(),
            window,
        )),
    ));
    let seed = match gateway.load_snapshot().await {
        Ok(records) => records,
        Err(e) => {
            warn!("Ignoring unreadable snapshot: {}", e);
            Vec::new()
        }
    };
    info!("Working set seeded with {} records", seed.len());

    // 5. Captcha pipeline
    let transcriber = Arc::new(AudioChallengeTranscriber::new(
        Arc::new(ReqwestAudioFetcher::new(settings.browser.request_timeout())?),
        Arc::new(FfmpegTranscoder::new(settings.captcha.ffmpeg_binary.clone())),
        Arc::new(GoogleSpeechRecognizer::new(&settings.speech)?),
        settings.speech.language.clone(),
    ));
    let solver = CaptchaSolver::new(
        transcriber,
        SolverTiming::from(&settings.captcha),
        settings.captcha.artifact_root(),
    );

    let pipeline = ScrapePipeline {
        solver: Arc::new(solver),
        extractor: Arc::new(EntityExtractor::new(&settings.portal, window)),
        gateway,
        working_set: Arc::new(SharedWorkingSet::new(WorkingSet::from_records(seed))),
        form: QueryForm::from_settings(&settings),
        retry: RetryPolicy::from_settings(&settings.scrape),
    };

    // 6. Browser and run
    let browser = Arc::new(ChromiumBrowser::launch(&settings.browser).await?);
    info!("Browser ready");

    let workers = cli.workers.unwrap_or(settings.scrape.workers).max(1);
    let summary = if workers == 1 {
        let session = browser.create_session().await?;
        let summary = pipeline.orchestrator(session.clone()).run(&identifiers).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close session: {}", e);
        }
        summary
    } else {
        let factory: Arc<dyn SessionFactory> = browser.clone();
        WorkerManager::new(factory, pipeline.clone())
            .run(identifiers, workers)
            .await?
    };

    info!(
        working_set = pipeline.working_set.len(),
        "Scraping finished: {}", summary
    );

    // 7. Shutdown
    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.shutdown().await,
        Err(_) => warn!("Browser still in use, leaving it to exit with the process"),
    }

    Ok(())
}
