//! Workflow execution.

use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use tracing::{error, info, info_span};

use super::context::{Context, Value, ValueKind};
use super::graph::{Arg, StageDescriptor, TaskGraph};
use super::registry::{Invocation, Registry, Services};
use crate::error::Imars3dError;
use crate::metrics;

/// Execution state of an [Engine]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineState {
    /// Nothing has run yet
    Init,
    /// Stage `stage` is running
    Running { stage: usize },
    /// Every stage completed
    Done,
    /// Stage `stage` failed; later stages did not run
    Failed { stage: usize },
}

/// What validation knows about a context name before anything runs.
enum Binding<'a> {
    /// Supplied in the initial context
    Known(&'a Value),
    /// Produced by an earlier stage
    Declared(ValueKind),
}

/// Runs a [TaskGraph] stage by stage over a [Context].
pub struct Engine {
    registry: Registry,
    services: Services,
    context: Context,
    state: EngineState,
}

impl Engine {
    /// Return a new Engine with an initial context.
    pub fn new(registry: Registry, services: Services, context: Context) -> Self {
        Engine {
            registry,
            services,
            context,
            state: EngineState::Init,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Check the whole graph against the registry and the initial context.
    ///
    /// Fails on the first unknown function, invalid options, wrong number of arguments or
    /// outputs, unresolved or mistyped reference, or output name collision.
    pub fn validate(&self, graph: &TaskGraph) -> Result<(), Imars3dError> {
        let mut bindings: HashMap<&str, Binding> = HashMap::new();
        for name in self.context.names() {
            if let Some(value) = self.context.get(name) {
                bindings.insert(name, Binding::Known(value));
            }
        }
        for stage in &graph.stages {
            let handler =
                self.registry
                    .get(&stage.function)
                    .ok_or_else(|| Imars3dError::UnknownFunction {
                        stage: stage.name.clone(),
                        function: stage.function.clone(),
                    })?;
            handler.check_options(&stage.name, &stage.kwargs)?;
            let arity = |what, expected: usize, found: usize| {
                if expected == found {
                    Ok(())
                } else {
                    Err(Imars3dError::Arity {
                        stage: stage.name.clone(),
                        function: stage.function.clone(),
                        what,
                        expected,
                        found,
                    })
                }
            };
            arity("arguments", handler.params.len(), stage.args.len())?;
            for (index, (arg, &expected)) in stage.args.iter().zip(&handler.params).enumerate() {
                let (name, found) = match Arg::parse(arg) {
                    Arg::Literal(literal) => (index.to_string(), Value::from_json(&literal).kind()),
                    Arg::Reference { root, path } => {
                        let name = Arg::reference_name(&root, &path);
                        let unresolved = || Imars3dError::UnresolvedReference {
                            stage: stage.name.clone(),
                            name: name.clone(),
                        };
                        let kind = match bindings.get(root.as_str()) {
                            Some(Binding::Known(value)) => {
                                value.get_path(&path).ok_or_else(unresolved)?.kind()
                            }
                            Some(Binding::Declared(kind)) if path.is_empty() => *kind,
                            Some(Binding::Declared(ValueKind::Map | ValueKind::Any)) => {
                                ValueKind::Any
                            }
                            _ => return Err(unresolved()),
                        };
                        (format!("${name}"), kind)
                    }
                };
                if !expected.accepts(found) {
                    return Err(Imars3dError::TypeMismatch {
                        stage: stage.name.clone(),
                        name,
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
            }
            if !stage.outputs.is_empty() {
                arity("outputs", handler.outputs.len(), stage.outputs.len())?;
            }
            let mut produced = HashSet::new();
            for (output, &kind) in stage.outputs.iter().zip(&handler.outputs) {
                let collides = bindings.contains_key(output.as_str()) && !stage.overwrite;
                if collides || !produced.insert(output.as_str()) {
                    return Err(Imars3dError::OutputCollision {
                        stage: stage.name.clone(),
                        name: output.clone(),
                    });
                }
                bindings.insert(output, Binding::Declared(kind));
            }
        }
        Ok(())
    }

    /// Resolve the positional arguments of `stage` against the current context.
    fn resolve(&self, stage: &StageDescriptor) -> Result<Vec<Value>, Imars3dError> {
        stage
            .args
            .iter()
            .map(|arg| match Arg::parse(arg) {
                Arg::Literal(literal) => Ok(Value::from_json(&literal)),
                Arg::Reference { root, path } => self
                    .context
                    .resolve(&root, &path)
                    .cloned()
                    .ok_or_else(|| Imars3dError::UnresolvedReference {
                        stage: stage.name.clone(),
                        name: Arg::reference_name(&root, &path),
                    }),
            })
            .collect()
    }

    fn run_stage(&mut self, stage: &StageDescriptor) -> Result<(), Imars3dError> {
        let handler =
            self.registry
                .get(&stage.function)
                .ok_or_else(|| Imars3dError::UnknownFunction {
                    stage: stage.name.clone(),
                    function: stage.function.clone(),
                })?;
        let invocation = Invocation {
            stage: &stage.name,
            args: self.resolve(stage)?,
            options: &stage.kwargs,
            services: &self.services,
        };
        let start = Instant::now();
        let outputs = handler.call(&invocation)?;
        metrics::record_stage_time(&stage.function, start.elapsed());
        if outputs.len() != handler.outputs.len() {
            return Err(Imars3dError::Arity {
                stage: stage.name.clone(),
                function: stage.function.clone(),
                what: "outputs",
                expected: handler.outputs.len(),
                found: outputs.len(),
            });
        }
        for (name, value) in stage.outputs.iter().zip(outputs) {
            self.context.insert(name, value);
        }
        Ok(())
    }

    /// Validate `graph`, then run its stages in order.
    ///
    /// A failing stage stops the run. Outputs already written by earlier stages stay on disk,
    /// so a second run resumes where the first one stopped.
    pub fn run(&mut self, graph: &TaskGraph) -> Result<&Context, Imars3dError> {
        self.validate(graph)?;
        let workflow = graph.display_name();
        info!(workflow, stages = graph.stages.len(), "workflow started");
        for (index, stage) in graph.stages.iter().enumerate() {
            self.state = EngineState::Running { stage: index };
            let span = info_span!("stage", name = %stage.name, function = %stage.function);
            let _enter = span.enter();
            info!("stage started");
            if let Err(err) = self.run_stage(stage) {
                self.state = EngineState::Failed { stage: index };
                error!(stage = %stage.name, "stage failed");
                return Err(err);
            }
            info!("stage finished");
        }
        self.state = EngineState::Done;
        info!(workflow, "workflow finished");
        Ok(&self.context)
    }
}
