use std::error::Error;
use std::path::PathBuf;

use crate::state::{AppConfig, AppState, StateError};

/// What every command gets: where the pod directory lives.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    /// Pod directory given with `--config-path`, ~/.pod otherwise
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub fn pod_dir(&self) -> Result<PathBuf, StateError> {
        AppState::pod_dir(self.config_path.clone())
    }

    /// Create the pod directory and write `config` (or the defaults).
    pub fn init_state(&self, config: Option<AppConfig>) -> Result<AppState, StateError> {
        AppState::init(self.config_path.clone(), config)
    }

    /// The state of an already initialized pod directory.
    pub fn load_state(&self) -> Result<AppState, StateError> {
        AppState::load(self.config_path.clone())
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output: std::fmt::Display;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Builds `Command`, `OpOutput` and `OpError` from a list of
/// `(Variant, OpType)` pairs and dispatches `Op::execute` to each.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        impl Command {
            /// The subcommand as typed on the command line.
            pub fn name(&self) -> String {
                match self {
                    $(Command::$variant(_) => stringify!($variant).to_lowercase(),)*
                }
            }
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => std::fmt::Display::fmt(output, f),)*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_context_uses_custom_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pod");
        let ctx = OpContext::new(Some(dir.clone()));
        assert_eq!(ctx.pod_dir().unwrap(), dir);

        assert!(matches!(ctx.load_state(), Err(StateError::NotInitialized)));
        let created = ctx.init_state(None).unwrap();
        assert_eq!(ctx.load_state().unwrap().config, created.config);
    }
}
