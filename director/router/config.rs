use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, ensure, Context, Result};
use director_catalog::{ConsoleCatalog, ScoringProfile, WorldCatalog};
use director_grammar::GrammarScratch;
use serde::Deserialize;
use shared_event_bus::FileEventPublisher;
use tracing::warn;

use crate::{
    inference::ProcessInference,
    router::{CommandRouter, CommandRouterBuilder, RoutingSettings},
    telemetry::DirectorTelemetry,
};

/// Largest accepted per-catalog `top_k`.
pub const MAX_TOP_K: usize = 64;
/// Overrides `[inference].program`.
pub const ENV_INFERENCE_PROGRAM: &str = "DIRECTOR_INFERENCE_PROGRAM";
/// Overrides `[inference].timeout_secs`.
pub const ENV_INFERENCE_TIMEOUT: &str = "DIRECTOR_INFERENCE_TIMEOUT_SECS";

/// Router configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Catalog sources.
    pub catalogs: CatalogPaths,
    /// Retrieval limits.
    pub routing: RoutingSettings,
    /// Scoring overrides per catalog.
    pub scoring: ScoringSection,
    /// Grammar scratch settings.
    pub grammar: GrammarSettings,
    /// Inference runner settings.
    pub inference: InferenceSettings,
    /// Log and event sinks.
    pub telemetry: TelemetrySettings,
}

/// Catalog JSON files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogPaths {
    /// World action array.
    pub world: Option<PathBuf>,
    /// Console command array.
    pub console: Option<PathBuf>,
}

/// Per-catalog scoring overrides on top of the built-in profiles.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    /// World action overrides.
    pub world: ScoringOverrides,
    /// Console command overrides.
    pub console: ScoringOverrides,
}

impl ScoringSection {
    /// Effective world profile.
    #[must_use]
    pub fn world_profile(&self) -> ScoringProfile {
        self.world.apply(ScoringProfile::world_actions())
    }

    /// Effective console profile.
    #[must_use]
    pub fn console_profile(&self) -> ScoringProfile {
        self.console.apply(ScoringProfile::console_commands())
    }
}

/// Individually optional scoring constants.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ScoringOverrides {
    /// See [`ScoringProfile::cosine_weight`].
    pub cosine_weight: Option<f32>,
    /// See [`ScoringProfile::bonus_weight`].
    pub bonus_weight: Option<f32>,
    /// See [`ScoringProfile::exact_key_bonus`].
    pub exact_key_bonus: Option<f32>,
    /// See [`ScoringProfile::alias_bonus`].
    pub alias_bonus: Option<f32>,
    /// See [`ScoringProfile::tag_bonus`].
    pub tag_bonus: Option<f32>,
    /// See [`ScoringProfile::bonus_ceiling`].
    pub bonus_ceiling: Option<f32>,
}

impl ScoringOverrides {
    /// Applies the set fields over `base`.
    #[must_use]
    pub fn apply(&self, base: ScoringProfile) -> ScoringProfile {
        ScoringProfile {
            cosine_weight: self.cosine_weight.unwrap_or(base.cosine_weight),
            bonus_weight: self.bonus_weight.unwrap_or(base.bonus_weight),
            exact_key_bonus: self.exact_key_bonus.unwrap_or(base.exact_key_bonus),
            alias_bonus: self.alias_bonus.unwrap_or(base.alias_bonus),
            tag_bonus: self.tag_bonus.unwrap_or(base.tag_bonus),
            bonus_ceiling: self.bonus_ceiling.unwrap_or(base.bonus_ceiling),
        }
    }
}

/// Where grammar files go and how they are named.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrammarSettings {
    /// Scratch directory.
    pub scratch_dir: PathBuf,
    /// File name prefix.
    pub prefix: String,
    /// File extension.
    pub extension: String,
}

impl Default for GrammarSettings {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("director"),
            prefix: "tool_chooser".into(),
            extension: "ebnf".into(),
        }
    }
}

/// External runner invoked per directive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Runner executable; no backend is configured when absent.
    pub program: Option<PathBuf>,
    /// Arguments placed before `--grammar` and `--user`.
    pub args: Vec<String>,
    /// Working directory of the runner.
    pub working_dir: Option<PathBuf>,
    /// Per-invocation timeout.
    pub timeout_secs: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            working_dir: None,
            timeout_secs: 60,
        }
    }
}

/// Log and event sinks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Module label on every record.
    pub module: String,
    /// JSON-lines log file.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file.
    pub event_log_path: Option<PathBuf>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            module: "director".into(),
            log_path: None,
            event_log_path: None,
        }
    }
}

impl DirectorConfig {
    /// Loads configuration from a TOML file. Relative paths resolve against
    /// the file's directory; environment overrides are applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading director config {}", path.display()))?;
        let base = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut config = Self::from_toml_str(&raw, &base)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document, resolving relative paths against `base`.
    pub fn from_toml_str(raw: &str, base: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.resolve_paths(base);
        Ok(config)
    }

    /// Applies runner overrides from `lookup` (normally the environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(program) = lookup(ENV_INFERENCE_PROGRAM).filter(|p| !p.trim().is_empty()) {
            self.inference.program = Some(PathBuf::from(program));
        }
        if let Some(secs) = lookup(ENV_INFERENCE_TIMEOUT) {
            self.inference.timeout_secs = secs
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_INFERENCE_TIMEOUT} must be whole seconds, got {secs:?}"))?;
        }
        Ok(())
    }

    /// Rejects limits and constants the router cannot use.
    pub fn validate(&self) -> Result<()> {
        let routing = &self.routing;
        ensure!(
            routing.world_top_k <= MAX_TOP_K && routing.console_top_k <= MAX_TOP_K,
            "routing top_k must be at most {MAX_TOP_K}"
        );
        ensure!(
            routing.world_min_score.is_finite() && routing.console_min_score.is_finite(),
            "routing min_score must be finite"
        );
        if !self.scoring.world_profile().is_valid() {
            bail!("scoring.world constants must be finite and non-negative");
        }
        if !self.scoring.console_profile().is_valid() {
            bail!("scoring.console constants must be finite and non-negative");
        }
        ensure!(self.inference.timeout_secs > 0, "inference timeout_secs must be positive");
        ensure!(!self.grammar.prefix.trim().is_empty(), "grammar prefix must not be empty");
        Ok(())
    }

    /// Inference backend described by `[inference]`, if a program is set.
    #[must_use]
    pub fn inference_backend(&self) -> Option<ProcessInference> {
        let program = self.inference.program.as_ref()?;
        let mut backend = ProcessInference::new(program)
            .args(self.inference.args.iter().cloned())
            .timeout(Duration::from_secs(self.inference.timeout_secs));
        if let Some(dir) = &self.inference.working_dir {
            backend = backend.working_dir(dir);
        }
        Some(backend)
    }

    /// Telemetry described by `[telemetry]`, if any sink is set.
    pub fn telemetry(&self) -> Result<Option<DirectorTelemetry>> {
        let settings = &self.telemetry;
        if settings.log_path.is_none() && settings.event_log_path.is_none() {
            return Ok(None);
        }
        let mut builder = DirectorTelemetry::builder(settings.module.clone());
        if let Some(path) = &settings.log_path {
            builder = builder.log_path(path);
        }
        if let Some(path) = &settings.event_log_path {
            builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
        }
        builder.build().map(Some)
    }

    /// Loads both catalogs and assembles a router builder. A catalog that
    /// fails to load is logged and left empty.
    pub fn router_builder(&self) -> Result<CommandRouterBuilder> {
        let world = Arc::new(WorldCatalog::new());
        if let Some(path) = &self.catalogs.world {
            if !world.load_path(path) {
                warn!(path = %path.display(), "world catalog loaded no entries");
            }
        }
        let console = Arc::new(ConsoleCatalog::new());
        if let Some(path) = &self.catalogs.console {
            if !console.load_path(path) {
                warn!(path = %path.display(), "console catalog loaded no entries");
            }
        }

        let mut builder = CommandRouter::builder()
            .world_catalog(world)
            .console_catalog(console)
            .settings(self.routing)
            .world_profile(self.scoring.world_profile())
            .console_profile(self.scoring.console_profile())
            .scratch(GrammarScratch::with_naming(
                &self.grammar.scratch_dir,
                self.grammar.prefix.clone(),
                self.grammar.extension.clone(),
            ));
        if let Some(backend) = self.inference_backend() {
            builder = builder.inference(Arc::new(backend));
        }
        if let Some(telemetry) = self.telemetry()? {
            builder = builder.telemetry(telemetry);
        }
        Ok(builder)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        self.catalogs.world.iter_mut().for_each(resolve);
        self.catalogs.console.iter_mut().for_each(resolve);
        resolve(&mut self.grammar.scratch_dir);
        self.inference.working_dir.iter_mut().for_each(resolve);
        self.telemetry.log_path.iter_mut().for_each(resolve);
        self.telemetry.event_log_path.iter_mut().for_each(resolve);
        if let Some(program) = &mut self.inference.program {
            // Bare names are looked up on PATH.
            if program.components().count() > 1 {
                resolve(program);
            }
        }
    }
}
