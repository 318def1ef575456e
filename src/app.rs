//! Application setup: wire the command line arguments into a workflow [Engine] and run it.

use tracing::info;

use crate::cli::CommandLineArgs;
use crate::config::{self, expand_path};
use crate::error::Imars3dError;
use crate::metrics;
use crate::resource_manager::ResourceManager;
use crate::workflow::{Context, Engine, Registry, Services, TaskGraph, Value};

/// Build the initial context, binding the `--context` document to `config`.
pub fn initial_context(args: &CommandLineArgs) -> Result<Context, Imars3dError> {
    let mut context = Context::new();
    if let Some(path) = &args.context {
        let document: serde_json::Value = config::load_value(&expand_path(path))?;
        context.insert("config", Value::from_json(&document));
    }
    Ok(context)
}

/// Return an [Engine] with the built in functions and resources sized from `args`.
pub fn engine(args: &CommandLineArgs, registry: Registry) -> Result<Engine, Imars3dError> {
    let resources = ResourceManager::new(
        args.worker_limit,
        args.reserved_cpus,
        args.memory_limit_bytes()?,
    );
    info!(
        workers = resources.workers(),
        memory_limit = resources.memory_limit(),
        "resources"
    );
    Ok(Engine::new(
        registry,
        Services::new(resources)?,
        initial_context(args)?,
    ))
}

fn write_metrics(path: &str) -> Result<(), Imars3dError> {
    let path = expand_path(path);
    std::fs::write(&path, metrics::gather()).map_err(|err| Imars3dError::io(&path, err))
}

/// Load the task graph and run it, or only validate it with `--validate-only`.
///
/// Metrics are written to `--metrics-file` whether or not the run succeeds.
pub fn run(args: &CommandLineArgs, registry: Registry) -> Result<(), Imars3dError> {
    metrics::register_metrics();
    let graph = TaskGraph::load(&args.graph)?;
    let mut engine = engine(args, registry)?;
    let result = if args.validate_only {
        engine.validate(&graph).map(|_| {
            info!(workflow = graph.display_name(), "task graph is valid");
        })
    } else {
        engine.run(&graph).map(|_| ())
    };
    if let Some(path) = &args.metrics_file {
        write_metrics(path)?;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use crate::workflow::EngineState;

    use clap::Parser;
    use ndarray::Array2;

    fn write_workflow(dir: &std::path::Path) -> (String, String) {
        let series = test_utils::series(dir, "ct", "raw/ct_{}.tiff", &[0.0, 1.0]);
        test_utils::fill_series(&series, |_| Array2::from_elem((4, 4), 10.0));
        let context = dir.join("context.json");
        std::fs::write(
            &context,
            serde_json::json!({
                "raw": dir.join("raw/ct_{}.tiff").to_string_lossy(),
                "smooth": dir.join("smooth/ct_{}.tiff").to_string_lossy(),
            })
            .to_string(),
        )
        .unwrap();
        let graph = dir.join("graph.yaml");
        std::fs::write(
            &graph,
            r#"
stages:
  - {name: load, function: series.open, args: [$config.raw], outputs: [ct]}
  - {name: smooth, function: correction.smooth, args: [$ct, $config.smooth], outputs: [smooth]}
"#,
        )
        .unwrap();
        (
            graph.to_string_lossy().into_owned(),
            context.to_string_lossy().into_owned(),
        )
    }

    #[test]
    fn run_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, context) = write_workflow(dir.path());
        let metrics = dir.path().join("metrics.txt");
        let args = CommandLineArgs::try_parse_from([
            "imars3d",
            &graph,
            "--context",
            &context,
            "--worker-limit",
            "2",
            "--metrics-file",
            &metrics.to_string_lossy(),
        ])
        .unwrap();
        run(&args, Registry::with_defaults()).unwrap();
        assert!(dir.path().join("smooth/ct_1.tiff").is_file());
        let metrics = std::fs::read_to_string(metrics).unwrap();
        assert!(metrics.contains("stage_time"), "{metrics}");
    }

    #[test]
    fn validate_only_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, context) = write_workflow(dir.path());
        let args = CommandLineArgs::try_parse_from([
            "imars3d",
            &graph,
            "--context",
            &context,
            "--validate-only",
        ])
        .unwrap();
        run(&args, Registry::with_defaults()).unwrap();
        assert!(!dir.path().join("smooth").exists());
    }

    #[test]
    fn missing_context_reference() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, _) = write_workflow(dir.path());
        let args = CommandLineArgs::try_parse_from(["imars3d", &graph]).unwrap();
        let graph = TaskGraph::load(&args.graph).unwrap();
        let engine = engine(&args, Registry::with_defaults()).unwrap();
        assert!(matches!(
            engine.validate(&graph),
            Err(Imars3dError::UnresolvedReference { .. })
        ));
        assert_eq!(EngineState::Init, engine.state());
    }
}
