use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use movimentacoes_cli::audit::PendingAudit;
use movimentacoes_cli::batch::input::{cases_from_list, load_cases};
use movimentacoes_cli::batch::BatchOrchestrator;
use movimentacoes_cli::config::{
    BatchSettings, PortalsConfig, DEFAULT_CASE_COLUMN, DEFAULT_TAG_COLUMN,
};
use movimentacoes_cli::eproc::EprocClient;
use movimentacoes_cli::logging;
use movimentacoes_cli::portal::captcha_solver::CaptchaSolver;
use movimentacoes_cli::portal::PortalAdapter;
use movimentacoes_cli::processo::CaseNumber;
use movimentacoes_cli::projudi::ProjudiClient;
use movimentacoes_cli::router::{classify_number, Route, Tribunal};

const LOG_DIR: &str = "logs";

#[derive(Parser)]
#[command(name = "movimentacoes-cli")]
#[command(about = "Coleta de movimentações processuais no Projudi e no eproc", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Processa um lote de processos e grava os arquivos de movimentações e erros
    Run {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Lista de processos separados por vírgula, no lugar da planilha
        #[arg(long)]
        numbers: Option<String>,

        /// Tempo limite por processo, em segundos
        #[arg(short, long)]
        timeout: Option<u64>,

        #[arg(long)]
        save_interval: Option<usize>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_CASE_COLUMN)]
        case_column: String,

        #[arg(long, default_value = DEFAULT_TAG_COLUMN)]
        tag_column: String,
    },

    /// Mostra o tribunal de cada número sem acessar os portais
    Classify {
        #[arg(required = true)]
        numbers: Vec<String>,
    },

    /// Lista os processos da planilha que não aparecem em nenhum arquivo de saída
    Pending {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long, num_args = 1..)]
        movements: Vec<PathBuf>,

        #[arg(long, num_args = 1..)]
        errors: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = DEFAULT_CASE_COLUMN)]
        case_column: String,
    },
}

async fn connect_portals(config: &PortalsConfig) -> Result<Vec<(Tribunal, Arc<dyn PortalAdapter>)>> {
    info!("Inicializando clientes dos tribunais");

    let projudi = ProjudiClient::connect(
        &config.projudi.base_url,
        config.projudi.credentials.clone(),
        config.login_retry.clone(),
    )
    .await
    .context("Falha ao efetuar login no Projudi")?;

    let eproc_rs = EprocClient::new(
        Tribunal::EprocRs.label(),
        &config.eproc_rs.base_url,
        config.eproc_rs.credentials.clone(),
        CaptchaSolver::new(config.twocaptcha_api_key.clone()),
        config.login_retry.clone(),
    );
    let eproc_sc = EprocClient::new(
        Tribunal::EprocSc.label(),
        &config.eproc_sc.base_url,
        config.eproc_sc.credentials.clone(),
        CaptchaSolver::new(config.twocaptcha_api_key.clone()),
        config.login_retry.clone(),
    );

    info!("✅ Clientes dos tribunais inicializados com sucesso");
    Ok(vec![
        (Tribunal::Projudi, Arc::new(projudi) as Arc<dyn PortalAdapter>),
        (Tribunal::EprocRs, Arc::new(eproc_rs) as Arc<dyn PortalAdapter>),
        (Tribunal::EprocSc, Arc::new(eproc_sc) as Arc<dyn PortalAdapter>),
    ])
}

/// Resolves on Ctrl-C. Never resolves when the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Não foi possível registrar o tratamento de Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_batch(
    file: Option<PathBuf>,
    numbers: Option<String>,
    timeout: Option<u64>,
    save_interval: Option<usize>,
    output_dir: Option<PathBuf>,
    case_column: String,
    tag_column: String,
) -> Result<()> {
    let log_file = logging::init_with_file(Path::new(LOG_DIR))?;
    info!("Registrando log em {}", log_file.display());

    let mut settings = BatchSettings::from_env()?;
    if let Some(secs) = timeout.filter(|s| *s > 0) {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(interval) = save_interval.filter(|i| *i > 0) {
        settings.save_interval = interval;
    }
    if let Some(dir) = output_dir {
        settings.output_dir = dir;
    }
    settings.case_column = case_column;
    settings.tag_column = tag_column;

    let cases = match (file, numbers) {
        (Some(_), Some(_)) => bail!("--file e --numbers não podem ser usados juntos"),
        (Some(path), None) => load_cases(&path, &settings.case_column, &settings.tag_column)?,
        (None, Some(list)) => cases_from_list(&list),
        (None, None) => bail!("Informe a planilha com --file ou os processos com --numbers"),
    };
    if cases.is_empty() {
        info!("Nenhum processo para processar.");
        return Ok(());
    }

    let portals = PortalsConfig::from_env()?;
    let mut orchestrator = BatchOrchestrator::new(&settings, Local::now());
    for (tribunal, adapter) in connect_portals(&portals).await? {
        orchestrator = orchestrator.with_adapter(tribunal, adapter);
    }

    let summary = orchestrator.run(cases, interrupted()).await?;
    summary.report.display();
    for path in &summary.final_files {
        println!("📁 {}", path.display());
    }
    if summary.interrupted {
        info!("Processo interrompido pelo usuário");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            numbers,
            timeout,
            save_interval,
            output_dir,
            case_column,
            tag_column,
        } => {
            run_batch(
                file,
                numbers,
                timeout,
                save_interval,
                output_dir,
                case_column,
                tag_column,
            )
            .await?;
        }

        Commands::Classify { numbers } => {
            logging::init_stdout();
            for raw in numbers {
                let number = CaseNumber::normalize(&raw);
                let target = match classify_number(&number) {
                    Route::Supported(tribunal) => tribunal.label().to_string(),
                    Route::Unsupported => "não suportado".to_string(),
                };
                println!("{:<28} {:<28} {}", raw, number.formatted(), target);
            }
        }

        Commands::Pending {
            file,
            movements,
            errors,
            output,
            case_column,
        } => {
            logging::init_stdout();
            if movements.is_empty() && errors.is_empty() {
                bail!("Informe ao menos um arquivo em --movements ou --errors");
            }
            let report = PendingAudit {
                input: &file,
                case_column: &case_column,
                movements: &movements,
                errors: &errors,
                output: &output,
            }
            .run()?;
            println!(
                "Total: {} | Com movimentações: {} | Com erro: {} | Pendentes: {}",
                report.total, report.with_movements, report.with_errors, report.pending
            );
        }
    }

    Ok(())
}
