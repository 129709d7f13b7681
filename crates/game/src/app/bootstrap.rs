use cyberops_engine::{
    load_dialog_config, resolve_app_paths, AppPaths, ContentRequest, DialogEngine,
    SettingsService,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::actions::build_actions;
use super::runtime::GameApp;
use super::screens::ScreenRouter;
use super::session::{GameSession, DIFFICULTY, MASTER_VOLUME};
use super::templates::build_templates;

const ENABLED_MODS_ENV_VAR: &str = "CYBEROPS_ENABLED_MODS";

pub(crate) const INITIAL_SCREEN: &str = "splash";

pub(crate) fn build_app() -> Result<GameApp, String> {
    init_tracing();
    info!("=== CyberOps Startup ===");

    let app_paths = resolve_app_paths().map_err(|error| error.to_string())?;
    info!(root = %app_paths.root.display(), "app_root_resolved");
    let request = ContentRequest::with_mods(parse_enabled_mods_from_env());
    build_app_with(app_paths, &request)
}

/// Wires settings, content, the dialog engine and the session under `app_paths`.
pub(crate) fn build_app_with(
    app_paths: AppPaths,
    request: &ContentRequest,
) -> Result<GameApp, String> {
    let mut settings = SettingsService::with_engine_defaults();
    settings
        .register_default(MASTER_VOLUME, 0.8_f64)
        .map_err(|error| error.to_string())?;
    settings
        .register_default(DIFFICULTY, "normal".to_string())
        .map_err(|error| error.to_string())?;
    let settings_path = app_paths.settings_path();
    if let Err(error) = settings.load(&settings_path) {
        warn!(
            path = %settings_path.display(),
            error = %error,
            "settings_load_failed_using_defaults"
        );
    }

    let config = load_dialog_config(&app_paths, request).map_err(|error| error.to_string())?;
    info!(
        states = config.len(),
        mods = request.enabled_mods.len(),
        fingerprint = %config.fingerprint(),
        "dialog_config_loaded"
    );
    let router = ScreenRouter::from_config(&config);
    let engine = DialogEngine::builder(config)
        .templates(build_templates())
        .actions(build_actions())
        .retention(settings.data_retention())
        .screen_layer(router)
        .build()
        .map_err(|error| error.to_string())?;

    let session = GameSession::new(app_paths, settings);
    Ok(GameApp::new(engine, session))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_enabled_mods_from_env() -> Vec<String> {
    std::env::var(ENABLED_MODS_ENV_VAR)
        .ok()
        .map(|raw| parse_enabled_mods(&raw))
        .unwrap_or_default()
}

fn parse_enabled_mods(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}
