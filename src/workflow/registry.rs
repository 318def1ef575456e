//! Function registry.
//!
//! Every function a stage can call is registered up front under a stable key together with
//! the kinds of its positional arguments and outputs and a check for its options. This lets
//! the engine reject a bad graph before any work starts.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use validator::Validate;

use super::context::{Value, ValueKind};
use super::handlers;
use crate::dispatch::Dispatcher;
use crate::error::Imars3dError;
use crate::models::CropWindow;
use crate::recon::Reconstructor;
use crate::resource_manager::ResourceManager;
use crate::series::ImageSeries;

/// Keyword options of a stage
pub type Options = serde_json::Map<String, serde_json::Value>;

type OptionsCheck = fn(&str, &Options) -> Result<(), Imars3dError>;
type Call = dyn Fn(&Invocation) -> Result<Vec<Value>, Imars3dError> + Send + Sync;

/// Deserialise and validate stage options.
pub fn parse_options<T: DeserializeOwned + Validate>(
    stage: &str,
    options: &Options,
) -> Result<T, Imars3dError> {
    let options: T = serde_json::from_value(serde_json::Value::Object(options.clone())).map_err(
        |source| Imars3dError::InvalidOptions {
            context: format!("stage {stage}"),
            source,
        },
    )?;
    options.validate()?;
    Ok(options)
}

/// Shared execution resources handed to every stage
pub struct Services {
    pub dispatcher: Dispatcher,
    pub resources: ResourceManager,
}

impl Services {
    /// Return new Services sized by `resources`.
    pub fn new(resources: ResourceManager) -> Result<Self, Imars3dError> {
        Ok(Services {
            dispatcher: Dispatcher::from_resources(&resources)?,
            resources,
        })
    }
}

/// A single call of a registered function
pub struct Invocation<'a> {
    /// Name of the calling stage
    pub stage: &'a str,
    /// Resolved positional arguments
    pub args: Vec<Value>,
    /// Keyword options
    pub options: &'a Options,
    pub services: &'a Services,
}

impl<'a> Invocation<'a> {
    fn mismatch(&self, index: usize, expected: ValueKind) -> Imars3dError {
        Imars3dError::TypeMismatch {
            stage: self.stage.to_string(),
            name: index.to_string(),
            expected: expected.to_string(),
            found: self
                .args
                .get(index)
                .map_or("nothing".to_string(), |value| value.kind().to_string()),
        }
    }

    pub fn value(&self, index: usize) -> Result<&Value, Imars3dError> {
        self.args.get(index).ok_or_else(|| self.mismatch(index, ValueKind::Any))
    }

    pub fn series(&self, index: usize) -> Result<&ImageSeries, Imars3dError> {
        match self.args.get(index) {
            Some(Value::Series(series)) => Ok(series),
            _ => Err(self.mismatch(index, ValueKind::Series)),
        }
    }

    pub fn text(&self, index: usize) -> Result<&str, Imars3dError> {
        match self.args.get(index) {
            Some(Value::Text(text)) => Ok(text),
            _ => Err(self.mismatch(index, ValueKind::Text)),
        }
    }

    pub fn number(&self, index: usize) -> Result<f64, Imars3dError> {
        match self.args.get(index) {
            Some(Value::Number(number)) => Ok(*number),
            _ => Err(self.mismatch(index, ValueKind::Number)),
        }
    }

    /// A crop window given as a window value, a `[left, right, top, bottom]` list or a map.
    pub fn window(&self, index: usize) -> Result<CropWindow, Imars3dError> {
        let window = match self.args.get(index) {
            Some(Value::Window(window)) => *window,
            Some(value @ (Value::List(_) | Value::Map(_))) => serde_json::from_value(value.to_json())
                .map_err(|source| Imars3dError::InvalidOptions {
                    context: format!("stage {} argument {index}", self.stage),
                    source,
                })?,
            _ => return Err(self.mismatch(index, ValueKind::Window)),
        };
        window.validate()?;
        Ok(window)
    }

    /// Deserialise and validate the stage options.
    pub fn options<T: DeserializeOwned + Validate>(&self) -> Result<T, Imars3dError> {
        parse_options(self.stage, self.options)
    }
}

/// A registered function
pub struct Handler {
    /// Kinds of the positional arguments
    pub params: Vec<ValueKind>,
    /// Kinds of the outputs
    pub outputs: Vec<ValueKind>,
    check_options: OptionsCheck,
    call: Box<Call>,
}

impl Handler {
    /// Return a new Handler that accepts no options.
    pub fn new<F>(params: Vec<ValueKind>, outputs: Vec<ValueKind>, call: F) -> Self
    where
        F: Fn(&Invocation) -> Result<Vec<Value>, Imars3dError> + Send + Sync + 'static,
    {
        Handler {
            params,
            outputs,
            check_options: |stage, options| {
                parse_options::<crate::models::NoOptions>(stage, options).map(|_| ())
            },
            call: Box::new(call),
        }
    }

    /// Accept options deserialising into `T`.
    pub fn with_options<T: DeserializeOwned + Validate>(mut self) -> Self {
        self.check_options = |stage, options| parse_options::<T>(stage, options).map(|_| ());
        self
    }

    /// Check stage options without running anything.
    pub fn check_options(&self, stage: &str, options: &Options) -> Result<(), Imars3dError> {
        (self.check_options)(stage, options)
    }

    /// Run the function.
    pub fn call(&self, invocation: &Invocation) -> Result<Vec<Value>, Imars3dError> {
        (self.call)(invocation)
    }
}

/// Registry of functions keyed by name
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Handler>,
}

impl Registry {
    /// Return an empty Registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a Registry with the built in functions.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        handlers::register_defaults(&mut registry);
        registry
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: &str, handler: Handler) {
        self.handlers.insert(name.to_string(), handler);
    }

    /// Register `recon.reconstruct` backed by `reconstructor`.
    pub fn register_reconstructor(&mut self, reconstructor: Arc<dyn Reconstructor>) {
        self.register("recon.reconstruct", handlers::reconstruct(reconstructor));
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TiltOptions;

    use serde_json::json;

    fn options(value: serde_json::Value) -> Options {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn default_functions() {
        let registry = Registry::with_defaults();
        for name in [
            "series.open",
            "correction.gamma",
            "correction.dead_pixel",
            "correction.normalize",
            "correction.intensity_fluctuation",
            "crop.detect",
            "correction.crop",
            "correction.smooth",
            "tilt.estimate",
            "tilt.apply",
            "sinogram.build",
            "config.save",
        ] {
            assert!(registry.get(name).is_some(), "{name}");
        }
        assert!(registry.get("recon.reconstruct").is_none());
    }

    #[test]
    fn options_are_checked() {
        let handler = Handler::new(vec![], vec![], |_| Ok(vec![])).with_options::<TiltOptions>();
        assert!(handler
            .check_options("tilt", &options(json!({"max_tilt": 2.0})))
            .is_ok());
        assert!(matches!(
            handler.check_options("tilt", &options(json!({"max_tilt": 2.0, "bogus": 1}))),
            Err(Imars3dError::InvalidOptions { .. })
        ));
        assert!(matches!(
            handler.check_options("tilt", &options(json!({"max_tilt": 60.0}))),
            Err(Imars3dError::Validation(_))
        ));
    }

    #[test]
    fn no_options_by_default() {
        let handler = Handler::new(vec![], vec![], |_| Ok(vec![]));
        assert!(handler.check_options("s", &Options::new()).is_ok());
        assert!(handler.check_options("s", &options(json!({"x": 1}))).is_err());
    }

    #[test]
    fn invocation_accessors() {
        let services = Services::new(ResourceManager::new(Some(1), 0, None)).unwrap();
        let options = Options::new();
        let invocation = Invocation {
            stage: "s",
            args: vec![
                Value::Text("t".to_string()),
                Value::Number(1.5),
                Value::from_json(&json!([1, 2, 3, 4])),
                Value::from_json(&json!([5, 2, 3, 4])),
            ],
            options: &options,
            services: &services,
        };
        assert_eq!("t", invocation.text(0).unwrap());
        assert_eq!(1.5, invocation.number(1).unwrap());
        assert_eq!(CropWindow::new(1, 2, 3, 4), invocation.window(2).unwrap());
        assert!(matches!(
            invocation.window(3),
            Err(Imars3dError::Validation(_))
        ));
        let err = invocation.series(0).unwrap_err();
        assert_eq!(
            "stage s: argument 0 has kind text, expected series",
            err.to_string()
        );
        assert!(invocation.value(9).is_err());
    }
}
