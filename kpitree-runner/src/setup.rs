//! Wiring: concrete collaborators and workflow settings from a loaded config.

use anyhow::{Context, Result};

use kpitree_core::collab::{ObjectStore, QueryStore};
use kpitree_core::date::DateStrictness;

use crate::adapters::{
    FileQueryStore, GcloudTokenSource, GsutilStore, LocalDirStore, ProcessGenerator,
    SheetsQueryStore, StaticToken, TokenSource,
};
use crate::config::{PublishConfig, QueryBackend, StorageBackend};
use crate::context::DeploymentContext;
use crate::policy::{ExecutionPolicy, RunMode};
use crate::workflow::WorkflowSettings;

/// Environment variable holding a ready-made OAuth token for the Sheets API.
/// When set, gcloud is not invoked.
pub const ACCESS_TOKEN_ENV: &str = "KPITREE_ACCESS_TOKEN";

/// The collaborators a run needs, built from configuration.
pub struct Collaborators {
    pub query_store: Box<dyn QueryStore>,
    pub generator: ProcessGenerator,
    pub object_store: Box<dyn ObjectStore>,
}

impl Collaborators {
    pub fn from_config(config: &PublishConfig, ctx: &DeploymentContext) -> Result<Self> {
        Ok(Self {
            query_store: query_store(config, ctx)?,
            generator: generator(config, ctx),
            object_store: object_store(config, ctx),
        })
    }
}

pub fn query_store(config: &PublishConfig, ctx: &DeploymentContext) -> Result<Box<dyn QueryStore>> {
    let q = &config.query;
    Ok(match q.backend {
        QueryBackend::File => Box::new(FileQueryStore::new(
            ctx.resolve(&q.template),
            ctx.resolve(&q.rendered),
        )),
        QueryBackend::Sheets => {
            let credential = ctx.resolve(&config.credentials.service_account);
            let token: Box<dyn TokenSource> = match std::env::var(ACCESS_TOKEN_ENV) {
                Ok(t) if !t.trim().is_empty() => Box::new(StaticToken(t.trim().to_string())),
                _ => Box::new(GcloudTokenSource::new(
                    config.credentials.gcloud.clone(),
                    credential.clone(),
                )),
            };
            let store = SheetsQueryStore::new(q.spreadsheet_id.clone(), q.range.clone(), credential, token)
                .context("failed to build the Sheets client")?;
            Box::new(store)
        }
    })
}

pub fn generator(config: &PublishConfig, ctx: &DeploymentContext) -> ProcessGenerator {
    let g = &config.generator;
    ProcessGenerator::new(
        g.program.clone(),
        g.args.clone(),
        g.config.clone(),
        ctx.root(),
        ctx.resolve(&g.artifact),
    )
}

pub fn object_store(config: &PublishConfig, ctx: &DeploymentContext) -> Box<dyn ObjectStore> {
    match config.storage.backend {
        StorageBackend::Gsutil => Box::new(GsutilStore::new(config.storage.gsutil.clone())),
        StorageBackend::Local => Box::new(LocalDirStore::new(ctx.resolve(&config.storage.local_root))),
    }
}

/// Policy for `mode` with the config's `[policy]` overrides applied.
pub fn policy(config: &PublishConfig, mode: RunMode) -> ExecutionPolicy {
    ExecutionPolicy::for_mode(mode).with_overrides(&config.policy)
}

pub fn workflow_settings(
    config: &PublishConfig,
    ctx: &DeploymentContext,
    publish_alias: bool,
    strict_dates: bool,
) -> WorkflowSettings {
    let strictness = if strict_dates {
        DateStrictness::Calendar
    } else {
        config.query.strictness()
    };
    WorkflowSettings {
        base: config.storage.base.clone(),
        alias_key: config.storage.today_alias.clone(),
        publish_alias,
        calendar_index: ctx.resolve(&config.calendar.index),
        marker: config.generator.marker.clone(),
        strictness,
        refresh_instructions: config.query.refresh_instructions.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn settings_resolve_against_root() {
        let ctx = DeploymentContext::at("/srv/kpi");
        let config = PublishConfig::default();
        let s = workflow_settings(&config, &ctx, true, false);
        assert_eq!(s.calendar_index, Path::new("/srv/kpi/static/calendar-data.json"));
        assert!(s.publish_alias);
        assert_eq!(s.strictness, DateStrictness::Shape);

        let strict = workflow_settings(&config, &ctx, false, true);
        assert_eq!(strict.strictness, DateStrictness::Calendar);
    }

    #[test]
    fn generator_runs_in_root() {
        let ctx = DeploymentContext::at("/srv/kpi");
        let g = generator(&PublishConfig::default(), &ctx);
        assert_eq!(g.artifact(), Path::new("/srv/kpi/output/index.html"));
    }

    #[test]
    fn backends_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DeploymentContext::at(dir.path());
        let mut config = PublishConfig::default();
        config.storage.backend = StorageBackend::Local;
        let c = Collaborators::from_config(&config, &ctx).unwrap();
        assert_eq!(c.object_store.name(), "local");
        assert_eq!(c.query_store.name(), "file");
        assert!(c.query_store.credential_path().is_none());

        config.query.backend = QueryBackend::Sheets;
        config.query.spreadsheet_id = "sheet-id".into();
        let sheets = query_store(&config, &ctx).unwrap();
        assert_eq!(sheets.name(), "sheets");
        assert_eq!(
            sheets.credential_path(),
            Some(dir.path().join("keys/service-account-key.json").as_path())
        );
    }

    #[test]
    fn policy_overrides_apply() {
        let config = PublishConfig::from_toml("[policy]\npublish_failure = \"fatal\"\n").unwrap();
        let p = policy(&config, RunMode::Unattended);
        assert_eq!(p.publish_failure, crate::policy::Severity::Fatal);
        assert_eq!(p.missing_credential, crate::policy::Severity::Skip);
    }
}
