// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BookflowError, Result};
use crate::types::Level;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::BookflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_pools(cfg)?;
    validate_orchestrator(cfg)?;
    validate_retry(cfg)?;
    validate_packaging(cfg)?;
    Ok(())
}

fn validate_pools(cfg: &RawConfigFile) -> Result<()> {
    // (name, workers, levels) triples, whichever form the config uses.
    let pools: Vec<(String, usize, Vec<Level>)> = if cfg.scheduler.pool.is_empty() {
        vec![
            ("high".to_string(), cfg.scheduler.high_workers, vec![Level::High]),
            ("medium".to_string(), cfg.scheduler.medium_workers, vec![Level::Medium]),
            ("low".to_string(), cfg.scheduler.low_workers, vec![Level::Low]),
        ]
    } else {
        cfg.scheduler
            .pool
            .iter()
            .map(|p| (p.name.clone(), p.workers, p.levels.clone()))
            .collect()
    };

    let mut names = HashSet::new();
    for (name, _, levels) in &pools {
        if !names.insert(name.as_str()) {
            return Err(BookflowError::ConfigError(format!(
                "[scheduler] pool name '{name}' is used more than once"
            )));
        }
        if levels.is_empty() {
            return Err(BookflowError::ConfigError(format!(
                "[scheduler] pool '{name}' must serve at least one level"
            )));
        }
    }

    for level in Level::ALL {
        let served = pools
            .iter()
            .any(|(_, workers, levels)| *workers >= 1 && levels.contains(&level));
        if !served {
            return Err(BookflowError::ConfigError(format!(
                "[scheduler] no pool with workers >= 1 serves level '{level}'"
            )));
        }
    }

    Ok(())
}

fn validate_orchestrator(cfg: &RawConfigFile) -> Result<()> {
    if cfg.orchestrator.interval_secs == 0 {
        return Err(BookflowError::ConfigError(
            "[orchestrator].interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.orchestrator.download_sync_secs == 0 {
        return Err(BookflowError::ConfigError(
            "[orchestrator].download_sync_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry(cfg: &RawConfigFile) -> Result<()> {
    if cfg.retry.max_attempts == 0 {
        return Err(BookflowError::ConfigError(
            "[retry].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_packaging(cfg: &RawConfigFile) -> Result<()> {
    let threshold = cfg.packaging.blur_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(BookflowError::ConfigError(format!(
            "[packaging].blur_threshold must be within 0.0..=1.0 (got {threshold})"
        )));
    }
    Ok(())
}
