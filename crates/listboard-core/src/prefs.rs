use std::fs;
use std::io::Write;
use std::path::{
  Path,
  PathBuf
};

use anyhow::Context;
use listboard_shared::Theme;
use serde::{
  Deserialize,
  Serialize
};
use tempfile::NamedTempFile;
use tracing::{
  debug,
  info,
  warn
};

const PREFS_FILE: &str = "prefs.toml";

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  En,
  #[default]
  Es
}

impl std::str::FromStr for Language {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str()
    {
      | "en" => Ok(Self::En),
      | "es" => Ok(Self::Es),
      | other => {
        anyhow::bail!(
          "unsupported language: {other} \
           (expected en or es)"
        )
      }
    }
  }
}

/// Device-local preferences that never
/// leave this machine.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(
  rename_all = "camelCase",
  default
)]
pub struct LocalPrefs {
  pub theme:         Theme,
  pub language:      Language,
  pub has_seen_tour: bool
}

pub fn prefs_path(
  data_dir: &Path
) -> PathBuf {
  data_dir.join(PREFS_FILE)
}

/// Reads `prefs.toml`. A missing file
/// yields defaults; an unreadable one
/// is logged and also yields defaults.
#[tracing::instrument(skip(data_dir))]
pub fn load_prefs(
  data_dir: &Path
) -> LocalPrefs {
  let path = prefs_path(data_dir);
  if !path.exists() {
    debug!(file = %path.display(), "no prefs file; using defaults");
    return LocalPrefs::default();
  }

  let raw = match fs::read_to_string(
    &path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      warn!(
        file = %path.display(),
        error = %err,
        "failed reading prefs file"
      );
      return LocalPrefs::default();
    }
  };

  match toml::from_str::<LocalPrefs>(
    &raw
  ) {
    | Ok(prefs) => prefs,
    | Err(err) => {
      warn!(
        file = %path.display(),
        error = %err,
        "failed parsing prefs file"
      );
      LocalPrefs::default()
    }
  }
}

#[tracing::instrument(skip(
  data_dir, prefs
))]
pub fn save_prefs(
  data_dir: &Path,
  prefs: &LocalPrefs
) -> anyhow::Result<()> {
  let path = prefs_path(data_dir);
  let text = toml::to_string(prefs)
    .context(
      "failed to serialize prefs"
    )?;

  let mut temp =
    NamedTempFile::new_in(data_dir)
      .with_context(|| {
        format!(
          "failed to create temp file in {}",
          data_dir.display()
        )
      })?;
  temp.write_all(text.as_bytes())?;
  temp.flush()?;
  temp.persist(&path).map_err(|err| {
    anyhow::anyhow!(
      "failed to persist {}: {}",
      path.display(),
      err.error
    )
  })?;

  info!(file = %path.display(), "saved prefs");
  Ok(())
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn defaults_when_missing_or_broken() {
    let dir =
      tempdir().expect("tempdir");
    let prefs = load_prefs(dir.path());
    assert_eq!(
      prefs.language,
      Language::Es
    );
    assert_eq!(prefs.theme, Theme::System);
    assert!(!prefs.has_seen_tour);

    fs::write(
      prefs_path(dir.path()),
      "theme = 42"
    )
    .expect("write");
    assert_eq!(
      load_prefs(dir.path()),
      LocalPrefs::default()
    );
  }

  #[test]
  fn saved_prefs_load_back() {
    let dir =
      tempdir().expect("tempdir");
    let prefs = LocalPrefs {
      theme:         Theme::Dark,
      language:      Language::En,
      has_seen_tour: true
    };
    save_prefs(dir.path(), &prefs)
      .expect("save");

    let raw = fs::read_to_string(
      prefs_path(dir.path())
    )
    .expect("read");
    assert!(raw.contains("hasSeenTour = true"));
    assert_eq!(load_prefs(dir.path()), prefs);
  }

  #[test]
  fn language_parsing() {
    assert_eq!(
      "EN".parse::<Language>()
        .expect("en"),
      Language::En
    );
    assert!("fr".parse::<Language>().is_err());
  }
}
