//! Provision command - the pipeline's main phase
//!
//! Sequences binary provisioning (with its own downloads-cache check),
//! condarc generation, shell hook installation, environment
//! orchestration, variable export, and the closing `micromamba info`
//! report.

use crate::cache::{CacheGateway, DirCache};
use crate::cli::args::ProvisionArgs;
use crate::condarc;
use crate::download::{self, InstalledBinary};
use crate::env_export::{vars, EnvFileExporter, VariableExporter};
use crate::error::{SetupError, SetupResult};
use crate::fingerprint::{binary_key, NameResolver};
use crate::mamba::{CreateRequest, Micromamba, MicromambaBuilder};
use crate::options::{FileConfig, Options};
use crate::orchestrator::EnvironmentOrchestrator;
use crate::shell::{self, ProfileRegistrar};
use crate::state::PhaseState;
use futures_util::future::join_all;
use tracing::{info, warn};

/// Execute the provision command
pub async fn execute(args: ProvisionArgs, file_config: Option<FileConfig>) -> SetupResult<()> {
    let options = Options::resolve(&args, file_config)?;
    let cache = DirCache::new(options.cache_dir.clone());

    let url = options.micromamba_source.url()?;
    let downloads_key = binary_key(&url);

    let resolver = NameResolver::new(
        options.environment_name.clone(),
        options.environment_file.clone(),
    );
    // The binary always lands at the configured path, so the handle and
    // builder can exist before the download finishes
    let mamba = Micromamba::new(
        options.bin_path.clone(),
        options.log_level.clone(),
        Some(options.condarc_file.clone()),
    );
    let builder = MicromambaBuilder::new(
        mamba.clone(),
        CreateRequest {
            root_prefix: options.root_prefix.clone(),
            environment_file: options.environment_file.clone(),
            explicit_name: options.environment_name.clone(),
            extra_args: options.create_args.clone(),
        },
    );
    let registrar = ProfileRegistrar::new(options.home.clone());
    let env_cache: Option<&dyn CacheGateway> =
        options.cache_environment.then_some(&cache as &dyn CacheGateway);
    let orchestrator = options.create_environment.then(|| {
        EnvironmentOrchestrator::new(
            &resolver,
            env_cache,
            &builder,
            &registrar,
            &options.init_shells,
            &options.root_prefix,
        )
    });

    // The two keyspace lookups have no data dependency on each other;
    // dispatch both and join before anything acts on either outcome
    let binary_branch = async {
        let downloads_hit = restore_binary(&cache, &downloads_key, &options).await;
        let binary = if downloads_hit {
            InstalledBinary {
                path: options.bin_path.clone(),
                sha256: String::new(),
            }
        } else {
            download::provision(&url, &options.bin_path).await?
        };
        Ok::<_, SetupError>((downloads_hit, binary))
    };
    let environment_probe = async {
        match &orchestrator {
            Some(orchestrator) => orchestrator.probe().await.map(Some),
            None => Ok(None),
        }
    };
    let (probe, binary_outcome) = tokio::join!(environment_probe, binary_branch);
    let probe = probe?;
    let (downloads_hit, binary) = binary_outcome?;

    // The post phase saves the downloads cache once the run is done
    PhaseState::new(
        options.cache_downloads,
        downloads_hit,
        downloads_key,
        binary.path.clone(),
    )
    .save(&options.state_file)
    .await?;

    condarc::generate(
        &options.condarc_file,
        options.write_condarc,
        options.condarc_contents.as_deref(),
    )
    .await?;

    // Hook installation per shell flavor, dispatched concurrently
    let inits = options
        .init_shells
        .iter()
        .map(|flavor| mamba.shell_init(flavor.as_str(), &options.root_prefix));
    join_all(inits)
        .await
        .into_iter()
        .collect::<SetupResult<Vec<()>>>()?;

    if let (Some(orchestrator), Some(probe)) = (&orchestrator, probe) {
        let report = orchestrator.run_from(probe).await?;
        info!(
            "Environment `{}` provisioned (cache {})",
            report.name, report.outcome
        );

        if options.generate_run_shell {
            if cfg!(windows) {
                info!("Skipping run shell generation on Windows.");
            } else {
                shell::write_run_shell(
                    &options.run_shell_path,
                    &binary.path,
                    &options.root_prefix,
                    report.name.as_str(),
                )
                .await?;
            }
        }
    }

    export_variables(&options).await?;

    // Closing report for the job log; tolerant of a missing name
    let info_name = if options.create_environment {
        Some(resolver.resolve()?.to_string())
    } else {
        None
    };
    mamba.info(&options.root_prefix, info_name.as_deref()).await?;

    Ok(())
}

/// Try the downloads keyspace; unavailable stores degrade to a miss
async fn restore_binary(cache: &DirCache, key: &str, options: &Options) -> bool {
    if !options.cache_downloads {
        return false;
    }
    match cache.restore(key).await {
        Ok(Some(path)) if path == options.bin_path && path.exists() => {
            info!("Restored micromamba from downloads cache");
            true
        }
        Ok(Some(path)) => {
            // Saved under a different install path; re-download rather
            // than trust a stale location
            warn!(
                "Downloads cache entry points at {}, expected {}; ignoring",
                path.display(),
                options.bin_path.display()
            );
            false
        }
        Ok(None) => false,
        Err(e) => {
            warn!("{e}; treating as downloads cache miss");
            false
        }
    }
}

/// Export the runtime's state for downstream pipeline steps
async fn export_variables(options: &Options) -> SetupResult<()> {
    info!("Set environment variables.");
    let exporter = EnvFileExporter::new(options.pipeline_env_file.clone());
    exporter
        .export(vars::ROOT_PREFIX, &options.root_prefix.display().to_string())
        .await?;
    exporter
        .export(vars::EXE, &options.bin_path.display().to_string())
        .await?;
    exporter
        .export(vars::CONDARC, &options.condarc_file.display().to_string())
        .await?;
    Ok(())
}
