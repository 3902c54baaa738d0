//! Top-level traversal: one task per selected (org, space) pair.

use std::sync::Arc;

use tenantshift_platform::Organization;
use tracing::{info, warn};

use crate::context::{Direction, Location, MigrationContext};
use crate::error::{MigrateError, Result};
use crate::group::TaskGroup;
use crate::space::{SpaceExporter, SpaceImporter};

/// What a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every organization passing the org filter
    All,
    /// One organization, by name
    Org(String),
    /// One space, by org and space name
    Space {
        /// Organization name
        org: String,
        /// Space name
        space: String,
    },
}

impl Scope {
    fn selects(&self, org: &str, space: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Org(name) => name == org,
            Scope::Space { org: o, space: s } => o == org && s == space,
        }
    }
}

/// Exports the orgs and spaces in scope from the source foundation.
#[derive(Debug, Clone)]
pub struct OrgExporter {
    ctx: Arc<MigrationContext>,
    spaces: Arc<SpaceExporter>,
}

impl OrgExporter {
    /// Exporter over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let spaces = Arc::new(SpaceExporter::new(Arc::clone(&ctx)));
        Self { ctx, spaces }
    }

    async fn orgs(&self, scope: &Scope) -> Result<Vec<Organization>> {
        let source = &self.ctx.source;
        match scope {
            Scope::All => {
                let filter = self.ctx.config.org_filter()?;
                Ok(source
                    .list_orgs()
                    .await?
                    .into_iter()
                    .filter(|o| filter.matches(&o.name))
                    .collect())
            }
            Scope::Org(name) | Scope::Space { org: name, .. } => {
                let org = source
                    .get_org_by_name(name)
                    .await?
                    .ok_or_else(|| MigrateError::NotFound(format!("organization {} on source", name)))?;
                Ok(vec![org])
            }
        }
    }

    /// Exports everything in `scope`. Listing failures are fatal.
    pub async fn export(&self, scope: &Scope) -> Result<()> {
        let orgs = self.orgs(scope).await?;
        info!(orgs = orgs.len(), "exporting organizations");

        let mut group = TaskGroup::new(self.ctx.config.parallelism, &self.ctx.cancel);
        for org in orgs {
            let spaces = self.ctx.source.list_spaces(&org.guid).await?;
            for space in spaces.into_iter().filter(|s| scope.selects(&org.name, &s.name)) {
                let exporter = Arc::clone(&self.spaces);
                let location = Location::new(org.name.clone(), space.name, org.guid.clone(), space.guid);
                let token = group.token();
                group.spawn(async move { exporter.export(location, &token).await });
            }
        }
        if group.is_empty() {
            warn!(scope = ?scope, "nothing to export");
        }
        group.wait().await
    }
}

/// Imports the exported orgs and spaces in scope into the target foundation.
#[derive(Debug, Clone)]
pub struct OrgImporter {
    ctx: Arc<MigrationContext>,
    spaces: Arc<SpaceImporter>,
}

impl OrgImporter {
    /// Importer over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let spaces = Arc::new(SpaceImporter::new(Arc::clone(&ctx)));
        Self { ctx, spaces }
    }

    /// Imports every exported space in `scope`.
    pub async fn import(&self, scope: &Scope) -> Result<()> {
        let filter = self.ctx.config.org_filter()?;
        let pairs: Vec<(String, String)> = self
            .ctx
            .marshaller
            .list_spaces()?
            .into_iter()
            .filter(|(org, space)| scope.selects(org, space))
            .filter(|(org, _)| *scope != Scope::All || filter.matches(org))
            .collect();
        info!(spaces = pairs.len(), "importing spaces");
        if pairs.is_empty() {
            warn!(scope = ?scope, "nothing to import");
        }

        let mut group = TaskGroup::new(self.ctx.config.parallelism, &self.ctx.cancel);
        for (org, space) in pairs {
            let importer = Arc::clone(&self.spaces);
            let token = group.token();
            group.spawn(async move { importer.import(&org, &space, &token).await });
        }
        group.wait().await
    }
}

/// Runs an export or import over `scope`.
pub async fn run(ctx: Arc<MigrationContext>, direction: Direction, scope: &Scope) -> Result<()> {
    match direction {
        Direction::Export => OrgExporter::new(ctx).export(scope).await,
        Direction::Import => OrgImporter::new(ctx).import(scope).await,
    }
}
