use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod content;
pub mod dialog;
pub mod nav;
pub mod persist;
pub mod settings;

pub use content::{
    load_dialog_config, parse_dialog_document, ContentErrorCode, ContentLoadError,
    ContentRequest, DiscoveryError, SourceLocation,
};
pub use dialog::{
    ActionContext, ActionError, ActionRegistry, ContentTemplates, DataRetention, DialogAction,
    DialogConfig, DialogEngine, DialogEvent, DialogService, NavigationSnapshot, RenderedDialog,
    ScreenLayer, StateDefinition, StateId, StateKind,
};
pub use nav::{
    GridCell, PathfindingConfig, PathfindingError, PathfindingService, Tilemap, TilemapError,
    WalkabilityOracle, Waypoint,
};
pub use persist::PersistError;
pub use settings::{SettingValue, SettingsError, SettingsService};

pub const ROOT_ENV_VAR: &str = "CYBEROPS_ROOT";
pub const SETTINGS_FILE: &str = "settings.json";
pub const NAVIGATION_SNAPSHOT_FILE: &str = "navigation.json";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub base_content_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "CYBEROPS_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
PowerShell: $env:{env_var}=\"C:\\path\\to\\cyberops\"\n\
Bash/zsh: export {env_var}=\"/path/to/cyberops\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

impl AppPaths {
    /// Standard layout under `root`. Nothing is created on disk.
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            base_content_dir: root.join("assets").join("base"),
            mods_dir: root.join("mods"),
            cache_dir: root.join("cache"),
            root,
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.cache_dir.join(SETTINGS_FILE)
    }

    pub fn saves_dir(&self) -> PathBuf {
        self.cache_dir.join("saves")
    }

    pub fn navigation_snapshot_path(&self) -> PathBuf {
        self.saves_dir().join(NAVIGATION_SNAPSHOT_FILE)
    }
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let app_paths = AppPaths::from_root(resolve_root()?);
    fs::create_dir_all(&app_paths.cache_dir).map_err(|source| StartupError::CreateCacheDir {
        path: app_paths.cache_dir.clone(),
        source,
    })?;
    Ok(app_paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
