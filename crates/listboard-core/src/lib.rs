pub mod auth;
pub mod categories;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod feedback;
pub mod forest;
pub mod items;
pub mod lists;
pub mod model;
pub mod prefs;
pub mod profile;
pub mod render;
pub mod reorder;
pub mod search;
pub mod settings;
pub mod stats;
pub mod store;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting listboard CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    store::DocumentStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open document store \
         at {}",
        data_dir.display()
      )
    })?;

  let user = profile::with_stored_name(
    &store,
    auth::Identity::from_config(&cfg)
  )?;

  let mut session = commands::Session {
    store,
    user,
    policy:
      auth::AdminPolicy::from_config(
        &cfg
      ),
    hub: settings::SettingsHub::new(),
    renderer: render::Renderer::new(
      &cfg
    )?,
    prefs: prefs::load_prefs(&data_dir),
    data_dir
  };

  let settings_changes =
    session.hub.subscribe();

  commands::dispatch(
    &mut session,
    cli.command
  )?;

  for change in settings_changes.try_iter()
  {
    info!(
      user_id = %change.user_id,
      compact = change.settings.compact_mode,
      theme = ?change.settings.theme,
      "settings changed"
    );
  }

  info!("done");
  Ok(())
}
