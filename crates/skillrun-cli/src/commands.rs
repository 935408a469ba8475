// Command handlers

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use skillrun_config::{ConfigLoader, RuntimeConfig};
use skillrun_registry::{InstallOptions, InstallSource, ListQuery};
use skillrun_retrieval::{SearchFilters, SearchOptions};
use skillrun_runtime::{ExecuteRequest, SkillRuntime};
use skillrun_sandbox::ExecutionOptions;
use skillrun_skills::ValidationLevel;
use tracing::warn;

use crate::cli::{Cli, Commands};
use crate::output::print_json;

/// Resolve configuration from flags, file and environment
pub fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader
        .load()
        .with_context(|| format!("loading {}", loader.config_path().display()))?;
    if let Some(root) = &cli.root {
        config.registry.root = root.clone();
    }
    Ok(config)
}

/// Install source for a path: directories are copied, files are unpacked
pub fn install_source(path: &Path) -> InstallSource {
    if path.is_dir() {
        InstallSource::Directory(path.to_path_buf())
    } else {
        InstallSource::Archive(path.to_path_buf())
    }
}

/// Run one command to completion
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let runtime = SkillRuntime::open(config)
        .await
        .context("opening skill runtime")?;
    let compact = cli.compact;

    match cli.command {
        Commands::Install {
            source,
            overwrite,
            skip_indexing,
            strict,
        } => {
            let options = InstallOptions {
                overwrite,
                skip_indexing,
                validation_level: if strict {
                    ValidationLevel::Strict
                } else {
                    ValidationLevel::Standard
                },
            };
            let result = runtime
                .install(install_source(&source), options)
                .await
                .with_context(|| format!("installing {}", source.display()))?;
            print_json(&result, compact)?;
        }

        Commands::Uninstall { name } => {
            let result = runtime.uninstall(&name).await?;
            print_json(&result, compact)?;
        }

        Commands::Update { name, description } => {
            let result = runtime.update(&name, &description).await?;
            print_json(&result, compact)?;
        }

        Commands::List {
            name,
            tags,
            sort_by,
            order,
            page,
            limit,
        } => {
            let query = ListQuery {
                name,
                tags,
                sort_by: sort_by.into_iter().map(Into::into).collect(),
                sort_order: order.into(),
                page,
                limit,
            };
            print_json(&runtime.list(&query), compact)?;
        }

        Commands::Show { name } => match runtime.get_installed(&name) {
            Some(skill) => print_json(
                &json!({
                    "manifest": skill.manifest,
                    "path": skill.path,
                    "installedAt": skill.installed_at,
                    "sizeBytes": skill.size_bytes,
                    "vectorized": skill.vectorized,
                }),
                compact,
            )?,
            None => anyhow::bail!("Skill not found: {name}"),
        },

        Commands::Exists { name } => {
            let exists = runtime.exists(&name);
            print_json(&json!({ "name": name, "exists": exists }), compact)?;
            if !exists {
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Stats => {
            print_json(&runtime.stats().await, compact)?;
        }

        Commands::Search {
            query,
            limit,
            min_score,
            tags,
            tool_type,
            skip_cache,
            no_cache,
            detailed,
        } => {
            let options = SearchOptions {
                limit,
                min_score,
                skip_cache,
                no_cache,
                filters: SearchFilters {
                    tags,
                    tool_type: tool_type.map(Into::into),
                },
                ..SearchOptions::default()
            };
            if detailed {
                print_json(&runtime.search_detailed(&query, &options).await, compact)?;
            } else {
                print_json(&runtime.search(&query, &options).await, compact)?;
            }
        }

        Commands::Exec {
            name,
            tools,
            mode,
            timeout_ms,
            memory_mb,
            max_output,
            env,
            args,
        } => {
            let mut options = ExecutionOptions::new().args(args);
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }
            if let Some(mb) = memory_mb {
                options = options.memory_limit_mb(mb);
            }
            if let Some(bytes) = max_output {
                options = options.max_output_bytes(bytes);
            }
            for (key, value) in env {
                options = options.env(key, value);
            }
            let mut request = ExecuteRequest::new(name).tools(tools).options(options);
            if let Some(mode) = mode {
                request = request.mode(mode.into());
            }

            let execution = runtime.execute(request);
            tokio::pin!(execution);
            let finished = tokio::select! {
                result = &mut execution => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(result) = finished else {
                warn!("Interrupted, terminating running skills");
                // keep polling the execution so it observes cancellation and cleans up
                let (_, result) = tokio::join!(runtime.shutdown(), &mut execution);
                print_json(&result?, compact)?;
                return Ok(ExitCode::from(130));
            };
            let result = result?;
            print_json(&result, compact)?;
            if !result.success {
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Reindex => {
            print_json(&runtime.reindex().await?, compact)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
