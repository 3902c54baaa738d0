//! Migrators as ordered pipelines of named steps.

use async_trait::async_trait;
use tenantshift_core::ServiceInstance;
use tracing::debug;

use crate::config::MigratorKind;
use crate::context::Direction;
use crate::error::{MigrateError, Result};

/// Moves one service instance in one direction.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Strategy implemented.
    fn kind(&self) -> MigratorKind;

    /// Rejects the instance before anything is changed.
    async fn validate(&self, instance: &ServiceInstance) -> Result<()>;

    /// Performs the migration. The instance may be enriched along the way.
    async fn migrate(&self, instance: &mut ServiceInstance) -> Result<()>;
}

/// A read-only check run by [`Migrator::validate`].
#[async_trait]
pub trait Precondition: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fails when the instance must not be migrated.
    async fn check(&self, instance: &ServiceInstance) -> Result<()>;
}

/// One unit of work in a pipeline.
#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Runs the step.
    async fn run(&self, instance: &mut ServiceInstance) -> Result<()>;
}

/// Steps run in order; the first failure aborts the rest.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn then(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step, wrapping the first error with the failing step's name.
    pub async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        for step in &self.steps {
            debug!(step = step.name(), instance = %instance.name, "running step");
            step.run(instance).await.map_err(|e| MigrateError::Step {
                step: step.name(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.step_names()).finish()
    }
}

/// A [`Migrator`] made of preconditions and a pipeline.
pub struct Flow {
    kind: MigratorKind,
    direction: Direction,
    preconditions: Vec<Box<dyn Precondition>>,
    pipeline: Pipeline,
}

impl Flow {
    /// Flow with no preconditions.
    pub fn new(kind: MigratorKind, direction: Direction, pipeline: Pipeline) -> Self {
        Self {
            kind,
            direction,
            preconditions: Vec::new(),
            pipeline,
        }
    }

    /// Adds a precondition checked by `validate`.
    pub fn require(mut self, precondition: impl Precondition + 'static) -> Self {
        self.preconditions.push(Box::new(precondition));
        self
    }

    /// Direction this flow migrates in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Underlying pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field(
                "preconditions",
                &self.preconditions.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[async_trait]
impl Migrator for Flow {
    fn kind(&self) -> MigratorKind {
        self.kind
    }

    async fn validate(&self, instance: &ServiceInstance) -> Result<()> {
        for precondition in &self.preconditions {
            precondition.check(instance).await.map_err(|e| MigrateError::Step {
                step: precondition.name(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    async fn migrate(&self, instance: &mut ServiceInstance) -> Result<()> {
        self.pipeline.run(instance).await
    }
}

/// Instance must carry a name.
#[derive(Debug, Default, Clone, Copy)]
pub struct HasName;

#[async_trait]
impl Precondition for HasName {
    fn name(&self) -> &'static str {
        "has-name"
    }

    async fn check(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.name.trim().is_empty() {
            return Err(MigrateError::Validation {
                instance: instance.guid.clone(),
                reason: "instance has no name".into(),
            });
        }
        Ok(())
    }
}

/// Managed instance must name its service and plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct HasPlan;

#[async_trait]
impl Precondition for HasPlan {
    fn name(&self) -> &'static str {
        "has-plan"
    }

    async fn check(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.is_user_provided() {
            return Err(MigrateError::Validation {
                instance: instance.name.clone(),
                reason: "expected a managed instance".into(),
            });
        }
        if instance.service.is_empty() || instance.plan.is_empty() {
            return Err(MigrateError::Validation {
                instance: instance.name.clone(),
                reason: "service and plan are required".into(),
            });
        }
        Ok(())
    }
}

/// Instance must carry its GUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct HasGuid;

#[async_trait]
impl Precondition for HasGuid {
    fn name(&self) -> &'static str {
        "has-guid"
    }

    async fn check(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.guid.trim().is_empty() {
            return Err(MigrateError::Validation {
                instance: instance.name.clone(),
                reason: "instance has no guid".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Step for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
            self.log.lock().push(self.name);
            instance.tags.push(self.name.to_string());
            if self.fail {
                return Err(MigrateError::NotFound("thing".into()));
            }
            Ok(())
        }
    }

    fn step(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Record {
        Record {
            name,
            log: Arc::clone(log),
            fail,
        }
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .then(step("a", &log, false))
            .then(step("b", &log, false));
        let mut instance = ServiceInstance::default();
        pipeline.run(&mut instance).await.unwrap();
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(instance.tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn first_failure_stops_pipeline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .then(step("load", &log, false))
            .then(step("save", &log, true))
            .then(step("delete", &log, false));
        let err = pipeline.run(&mut ServiceInstance::default()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Step { step: "save", .. }));
        assert_eq!(*log.lock(), vec!["load", "save"]);
    }

    #[tokio::test]
    async fn validation_runs_preconditions() {
        let flow = Flow::new(MigratorKind::Managed, Direction::Import, Pipeline::new())
            .require(HasName)
            .require(HasPlan);
        let mut instance = ServiceInstance {
            name: "db".into(),
            service: "p.mysql".into(),
            ..Default::default()
        };
        let err = flow.validate(&instance).await.unwrap_err();
        assert!(matches!(err, MigrateError::Step { step: "has-plan", .. }));

        instance.plan = "small".into();
        flow.validate(&instance).await.unwrap();
    }

    #[tokio::test]
    async fn guid_is_required_when_asked() {
        let flow = Flow::new(MigratorKind::Ccdb, Direction::Export, Pipeline::new()).require(HasGuid);
        let instance = ServiceInstance {
            name: "db".into(),
            ..Default::default()
        };
        assert!(flow.validate(&instance).await.is_err());
    }
}
