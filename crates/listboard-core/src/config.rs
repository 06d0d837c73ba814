//! The rc file: `key = value` lines,
//! `#` comments and `include PATH`.
//! Only the keys in [`KNOWN_KEYS`] are
//! kept; anything else is reported and
//! ignored.

use std::collections::{
  BTreeMap,
  HashSet
};
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  warn
};

pub const DATA_LOCATION: &str =
  "data.location";
pub const USER_ID: &str = "user.id";
pub const USER_EMAIL: &str =
  "user.email";
pub const USER_NAME: &str = "user.name";
pub const ADMIN_EMAILS: &str =
  "admin.emails";
pub const COLOR: &str = "color";

pub const KNOWN_KEYS: &[&str] = &[
  DATA_LOCATION,
  USER_ID,
  USER_EMAIL,
  USER_NAME,
  ADMIN_EMAILS,
  COLOR
];

const DEFAULT_USER_ID: &str = "local";
const DEFAULT_DATA_DIR: &str =
  ".listboard";

#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine {
  Entry {
    key:   String,
    value: String
  },
  Include(String)
}

#[derive(Debug, Clone, Default)]
pub struct Config {
  values:           BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rcfile_override
  ))]
  pub fn load(
    rcfile_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();
    match resolve_rcfile_path(
      rcfile_override
    )? {
      | Some(path) => {
        info!(rcfile = %path.display(), "loading rc file");
        cfg.read_file(
          &path,
          &mut HashSet::new()
        )?;
      }
      | None => {
        debug!("no rc file; defaults only")
      }
    }
    Ok(cfg)
  }

  /// `--rc key=value` and positional
  /// `rc.key=value` overrides; the
  /// `rc.` prefix is optional.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key)
        .to_string();
      debug!(%key, %value, "applying override");
      self.set(key, value);
    }
  }

  pub fn data_location(
    &self
  ) -> anyhow::Result<PathBuf> {
    match self.value(DATA_LOCATION) {
      | Some(raw) => {
        Ok(expand_tilde(Path::new(raw)))
      }
      | None => Ok(
        home_dir()?
          .join(DEFAULT_DATA_DIR)
      )
    }
  }

  pub fn user_id(&self) -> String {
    self
      .value(USER_ID)
      .filter(|id| !id.is_empty())
      .unwrap_or(DEFAULT_USER_ID)
      .to_string()
  }

  pub fn user_email(&self) -> String {
    self
      .value(USER_EMAIL)
      .unwrap_or_default()
      .to_string()
  }

  pub fn user_name(
    &self
  ) -> Option<String> {
    self
      .value(USER_NAME)
      .filter(|name| !name.is_empty())
      .map(str::to_string)
  }

  pub fn admin_emails(
    &self
  ) -> Vec<String> {
    self.get_list(ADMIN_EMAILS)
  }

  /// Colour output, on unless the rc
  /// file says otherwise.
  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    Ok(
      self
        .get_bool(COLOR)?
        .unwrap_or(true)
    )
  }

  /// `None` when unset; a value that is
  /// not a recognised boolean is an
  /// error.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .value(key)
      .map(|raw| {
        parse_bool(raw).ok_or_else(|| {
          anyhow!(
            "invalid boolean for \
             {key}: {raw}"
          )
        })
      })
      .transpose()
  }

  /// Comma separated list value,
  /// trimmed, empty entries dropped.
  pub fn get_list(
    &self,
    key: &str
  ) -> Vec<String> {
    self
      .value(key)
      .map(|v| {
        v.split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }

  fn value(
    &self,
    key: &str
  ) -> Option<&str> {
    self.values.get(key).map(String::as_str)
  }

  fn set(
    &mut self,
    key: String,
    value: String
  ) {
    if KNOWN_KEYS.contains(&key.as_str())
    {
      self.values.insert(key, value);
    } else {
      warn!(%key, "unknown config key; ignored");
    }
  }

  fn read_file(
    &mut self,
    path: &Path,
    visited: &mut HashSet<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if !visited.insert(path.clone()) {
      warn!(file = %path.display(), "include cycle; skipping");
      return Ok(());
    }

    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for line in parse_rc(&path, &text)? {
      match line {
        | RcLine::Entry {
          key,
          value
        } => self.set(key, value),
        | RcLine::Include(target) => {
          let target = expand_tilde(
            Path::new(&target)
          );
          let target =
            if target.is_absolute() {
              target
            } else {
              base_dir.join(target)
            };
          if target.exists() {
            self.read_file(
              &target, visited
            )?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
      }
    }
    Ok(())
  }
}

/// Splits rc text into entries and
/// includes, stripping comments.
fn parse_rc(
  path: &Path,
  text: &str
) -> anyhow::Result<Vec<RcLine>> {
  let mut lines = Vec::new();
  for (idx, raw) in
    text.lines().enumerate()
  {
    let line = raw
      .split_once('#')
      .map_or(raw, |(before, _)| before)
      .trim();
    if line.is_empty() {
      continue;
    }

    if let Some(target) =
      line.strip_prefix("include ")
    {
      let target = target.trim();
      if target.is_empty() {
        bail!(
          "{}:{}: include path cannot \
           be empty",
          path.display(),
          idx + 1
        );
      }
      lines.push(RcLine::Include(
        target.to_string()
      ));
      continue;
    }

    let Some((key, value)) =
      line.split_once('=')
    else {
      bail!(
        "invalid config line {}:{}: {}",
        path.display(),
        idx + 1,
        raw
      );
    };
    lines.push(RcLine::Entry {
      key:   key.trim().to_string(),
      value: value.trim().to_string()
    });
  }
  Ok(lines)
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => cfg.data_location()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }
  Ok(dir)
}

/// `--rcfile`, then `LISTBOARDRC`
/// (`/dev/null` disables), then
/// `~/.listboardrc` when present.
fn resolve_rcfile_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }
  if let Ok(env) =
    std::env::var("LISTBOARDRC")
  {
    return Ok(
      (env != "/dev/null")
        .then(|| PathBuf::from(env))
    );
  }

  let candidate =
    home_dir()?.join(".listboardrc");
  Ok(candidate.exists().then_some(candidate))
}

fn home_dir() -> anyhow::Result<PathBuf>
{
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home directory"
    )
  })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

pub fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
