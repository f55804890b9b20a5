use clap::Parser;
use cloud_alloc::adapters::{HttpMatrixDispatcher, LocalStorage, LogOnlySink};
use cloud_alloc::app::http::{provider_router, serve, user_router};
use cloud_alloc::core::optimizer::UserOptimizer;
use cloud_alloc::core::calculations::format_allocation_vector;
use cloud_alloc::deploy::{DryRunRunner, SystemCommandRunner};
use cloud_alloc::domain::model::Role;
use cloud_alloc::domain::ports::{CommandRunner, Storage, SubmissionSink};
use cloud_alloc::utils::{logger, validation::Validate};
use cloud_alloc::{
    AllocError, Bootstrapper, CliConfig, Command, DeployConfig, FunctionPackager, GameConfig,
    GameSimulation, ProviderNode, Result, UserNode,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting cloud-alloc {}", config.command.name());
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(config: CliConfig) -> Result<()> {
    let deploy = DeployConfig::load(config.config.as_deref())?;
    deploy.validate()?;
    let game = match &config.game_config {
        Some(path) => GameConfig::from_file(path)?,
        None => GameConfig::default(),
    };

    match config.command {
        Command::Bootstrap {
            role,
            identifier,
            dry_run,
            target_dir,
        } => {
            let mut bootstrap = deploy.bootstrap.clone();
            if let Some(dir) = target_dir {
                bootstrap.target_dir = dir;
            }
            let role = Role::parse(&role);
            let identifier = identifier.as_deref();
            if dry_run {
                run_bootstrap(Bootstrapper::new(bootstrap, DryRunRunner), &role, identifier)
            } else {
                run_bootstrap(
                    Bootstrapper::new(bootstrap, SystemCommandRunner),
                    &role,
                    identifier,
                )
            }
        }

        Command::Package {
            dry_run,
            bucket,
            prefix,
        } => match bucket {
            Some(bucket) => {
                upload_archives(&deploy, bucket, prefix, dry_run).await
            }
            None => {
                let storage = LocalStorage::new(deploy.packaging.output_dir.clone());
                if dry_run {
                    run_packager(&deploy, storage, DryRunRunner).await
                } else {
                    run_packager(&deploy, storage, SystemCommandRunner).await
                }
            }
        },

        Command::Simulate { json } => {
            let report = GameSimulation::new(&game)?.run()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
            Ok(())
        }

        Command::Optimize {
            user_id,
            execution_times,
        } => {
            let mut optimizer = UserOptimizer::new(&game, &user_id)?;
            let custom = (!execution_times.is_empty()).then_some(execution_times.as_slice());
            let (allocation, utility) = optimizer.optimize(custom)?;
            println!(
                "{}: {} expected utility {:.4}",
                user_id,
                format_allocation_vector(&allocation),
                utility
            );
            Ok(())
        }

        Command::ShowConfig => {
            let rendered = toml::to_string_pretty(&deploy).map_err(|e| AllocError::ConfigError {
                message: format!("Failed to render configuration: {}", e),
            })?;
            println!("{}", rendered);
            println!("{}", game.describe());
            Ok(())
        }

        Command::ServeUser { user_id, port } => {
            let sink = submission_sink(&deploy).await;
            let node = Arc::new(UserNode::new(&game, &user_id, sink)?);
            tracing::info!("Starting user node {} on port {}", user_id, port);
            serve(user_router(node), port).await
        }

        Command::ServeProvider { port } => {
            if deploy.cloud.user_urls.is_empty() {
                tracing::warn!("⚠️ No user URLs configured, matrices will not be pushed");
            }
            let dispatcher = Arc::new(HttpMatrixDispatcher::new(deploy.cloud.user_urls.clone())?);
            let node = Arc::new(ProviderNode::new(&game, dispatcher));
            tracing::info!("Starting resource manager on port {}", port);
            serve(provider_router(node), port).await
        }
    }
}

fn run_bootstrap<R: CommandRunner>(
    bootstrapper: Bootstrapper<R>,
    role: &Role,
    identifier: Option<&str>,
) -> Result<()> {
    let instructions = bootstrapper.run(role, identifier)?;
    println!("✅ Setup complete");
    if let Some(instructions) = instructions {
        println!("To start the {} node run:", role);
        for line in instructions.lines() {
            println!("  {}", line);
        }
    }
    Ok(())
}

async fn run_packager<S: Storage, R: CommandRunner>(
    deploy: &DeployConfig,
    storage: S,
    runner: R,
) -> Result<()> {
    let packager = FunctionPackager::new(deploy.packaging.clone(), storage, runner);
    let archives = packager.run().await?;
    println!("✅ Packaging complete");
    for archive in archives {
        println!(
            "📦 {} -> {} ({} files, {} bytes)",
            archive.handler,
            archive.location,
            archive.entries.iter().filter(|e| !e.ends_with('/')).count(),
            archive.size
        );
    }
    Ok(())
}

#[cfg(feature = "aws")]
async fn upload_archives(
    deploy: &DeployConfig,
    bucket: String,
    prefix: Option<String>,
    dry_run: bool,
) -> Result<()> {
    use aws_config::BehaviorVersion;
    use cloud_alloc::adapters::S3Storage;

    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new(deploy.cloud.region.clone()))
        .load()
        .await;
    let storage = S3Storage::new(aws_sdk_s3::Client::new(&shared), bucket, prefix);
    if dry_run {
        run_packager(deploy, storage, DryRunRunner).await
    } else {
        run_packager(deploy, storage, SystemCommandRunner).await
    }
}

#[cfg(not(feature = "aws"))]
async fn upload_archives(
    _deploy: &DeployConfig,
    bucket: String,
    _prefix: Option<String>,
    _dry_run: bool,
) -> Result<()> {
    Err(AllocError::ConfigError {
        message: format!(
            "Uploading to s3://{} needs a build with the 'aws' feature",
            bucket
        ),
    })
}

#[cfg(feature = "aws")]
async fn submission_sink(deploy: &DeployConfig) -> Arc<dyn SubmissionSink> {
    use aws_config::BehaviorVersion;
    use cloud_alloc::adapters::SqsSubmissionSink;

    if deploy.cloud.queue_url.trim().is_empty() {
        return Arc::new(LogOnlySink);
    }
    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_sdk_sqs::config::Region::new(deploy.cloud.region.clone()))
        .load()
        .await;
    tracing::info!("📨 Submissions go to {}", deploy.cloud.queue_url);
    Arc::new(SqsSubmissionSink::new(
        aws_sdk_sqs::Client::new(&shared),
        deploy.cloud.queue_url.clone(),
    ))
}

#[cfg(not(feature = "aws"))]
async fn submission_sink(deploy: &DeployConfig) -> Arc<dyn SubmissionSink> {
    if !deploy.cloud.queue_url.trim().is_empty() {
        tracing::warn!("⚠️ SQS_QUEUE_URL is set but this build has no 'aws' feature, logging only");
    }
    Arc::new(LogOnlySink)
}
