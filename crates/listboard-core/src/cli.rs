use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "listboard",
    version,
    about = "Lists, columns and categorized items from the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rcfile")]
    pub rcfile: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create, show and manage lists
    #[command(subcommand)]
    List(ListCmd),
    /// Manage the columns of a list
    #[command(subcommand)]
    Column(ColumnCmd),
    /// Manage items
    #[command(subcommand)]
    Item(ItemCmd),
    /// Manage categories and subcategories
    #[command(subcommand)]
    Category(CategoryCmd),
    /// Item distribution over columns and categories
    Stats {
        list: String,
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        json: bool,
    },
    /// Display settings stored with the account
    #[command(subcommand)]
    Settings(SettingsCmd),
    /// Preferences kept on this machine only
    #[command(subcommand)]
    Prefs(PrefsCmd),
    /// The display name shown for the current user
    #[command(subcommand)]
    Profile(ProfileCmd),
    #[command(subcommand)]
    Feedback(FeedbackCmd),
    /// Write all data of the current user as JSON
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a JSON export for the current user
    Import { input: PathBuf },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ListCmd {
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    Ls,
    /// Print the board, optionally filtered by search terms
    Show {
        list: String,
        #[command(flatten)]
        search: SearchArgs,
    },
    Edit {
        list: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
    },
    Delete { list: String },
    /// Rewrite gapped or duplicated orders
    Repair { list: String },
    /// Turn subcategory tags into explicit subcategory references
    MigrateTags { list: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ColumnCmd {
    Add { list: String, header: String },
    Rename { list: String, column: String, header: String },
    Delete { list: String, column: String },
    /// Move the column at position FROM to position TO
    Move { list: String, from: usize, to: usize },
}

/// Narrows the working set of `list show` and `stats`.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Phrase matched against titles and descriptions; words are joined with single spaces
    #[arg(allow_hyphen_values = true)]
    pub query: Vec<String>,
    /// Require a tag
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Exclude a tag
    #[arg(long = "no-tag")]
    pub without_tags: Vec<String>,
}

impl SearchArgs {
    pub fn phrase(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ItemFields {
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(short, long)]
    pub category: Option<String>,
    #[arg(short, long)]
    pub subcategory: Option<String>,
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ItemCmd {
    Add {
        list: String,
        column: String,
        title: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    Edit {
        list: String,
        item: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
        /// Field names to clear: description, category, subcategory, start, end, tags
        #[arg(long = "clear", value_delimiter = ',')]
        clear: Vec<String>,
    },
    Delete { list: String, item: String },
    Duplicate { list: String, item: String },
    /// Move an item to INDEX inside COLUMN
    Move {
        list: String,
        item: String,
        column: String,
        index: usize,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCmd {
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    Ls,
    Edit {
        category: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "clear_icon")]
        icon: Option<String>,
        #[arg(long)]
        clear_icon: bool,
    },
    /// Move under PARENT, or to the top level without one
    Reparent { category: String, parent: Option<String> },
    Delete { category: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCmd {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PrefsCmd {
    Show,
    Theme { theme: String },
    Language { language: String },
    TourDone,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileCmd {
    Show,
    /// Set the display name; without a name it is cleared
    Name { name: Option<String> },
}

#[derive(Subcommand, Debug, Clone)]
pub enum FeedbackCmd {
    Submit {
        /// bug, feature or other
        kind: String,
        subject: String,
        message: String,
    },
    Ls {
        #[arg(long)]
        status: Option<String>,
    },
    Status { id: String, status: String },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["listboard", "rc.user.id=bob", "list", "ls", "rc.color:off"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["listboard", "list", "ls"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.user.id".to_string(), "bob".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn item_add_parses_fields() {
        let cli = GlobalCli::try_parse_from([
            "listboard", "--rc", "user.id=u1", "item", "add", "L", "C", "Dune", "-t", "scifi", "-t", "classic",
            "--start", "2024-01-02",
        ])
        .expect("parse");
        assert_eq!(cli.rc_overrides[0].key, "user.id");
        let Command::Item(ItemCmd::Add { title, fields, .. }) = cli.command else {
            panic!("expected item add");
        };
        assert_eq!(title, "Dune");
        assert_eq!(fields.tags, vec!["scifi", "classic"]);
        assert_eq!(fields.start, NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn stats_query_keeps_phrase_and_tag_flags_apart() {
        let cli = GlobalCli::try_parse_from([
            "listboard", "stats", "L", "--tag", "scifi", "--no-tag", "read", "-5", "degrees",
        ])
        .expect("parse");
        let Command::Stats { search, .. } = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(search.phrase(), "-5 degrees");
        assert_eq!(search.tags, vec!["scifi"]);
        assert_eq!(search.without_tags, vec!["read"]);
    }

    #[test]
    fn keyval_requires_equals() {
        assert!("novalue".parse::<KeyVal>().is_err());
        let kv: KeyVal = " a = b ".parse().expect("kv");
        assert_eq!((kv.key.as_str(), kv.value.as_str()), ("a", "b"));
    }
}
