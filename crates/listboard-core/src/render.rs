use std::collections::HashMap;
use std::io::{IsTerminal, Write};

use chrono::Local;
use listboard_shared::DefaultView;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::forest::{build_forest, flatten, sort_roots_by_name};
use crate::lists::Board;
use crate::model::{Category, Feedback, List, ListItem, UserProfile, UserSettings};
use crate::prefs::LocalPrefs;
use crate::stats::{Share, Statistics};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color()?;
        Ok(Self {
            color: color && std::io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn write_lists<W: Write>(&self, out: &mut W, lists: &[List]) -> anyhow::Result<()> {
        let headers = ["ID", "Name", "Description", "Created"];
        let rows = lists
            .iter()
            .map(|list| {
                vec![
                    self.paint(&list.id, "33"),
                    list.name.clone(),
                    list.description.clone().unwrap_or_default(),
                    list.created_at.with_timezone(&Local).format("%Y-%m-%d").to_string(),
                ]
            })
            .collect();
        write_table(out, &headers, rows)
    }

    /// Prints the list in the user's preferred layout: one section per
    /// column for the board view, a single table for the list view.
    #[tracing::instrument(skip_all, fields(list_id = %board.list.id))]
    pub fn write_board<W: Write>(
        &self,
        out: &mut W,
        board: &Board,
        items: &[ListItem],
        categories: &[Category],
        settings: &UserSettings,
    ) -> anyhow::Result<()> {
        let by_id: HashMap<&str, &Category> = categories.iter().map(|c| (c.id.as_str(), c)).collect();

        writeln!(out, "{}", self.paint(&board.list.name, "1"))?;
        if let Some(description) = &board.list.description {
            writeln!(out, "{description}")?;
        }

        match settings.default_view {
            DefaultView::Board => {
                for column in &board.columns {
                    let members: Vec<&ListItem> = items.iter().filter(|i| i.column_id == column.id).collect();
                    writeln!(out)?;
                    writeln!(out, "{} ({})", self.paint(&column.header, "36"), members.len())?;
                    for (idx, item) in members.iter().enumerate() {
                        self.write_card(out, idx, item, &by_id, settings)?;
                    }
                }
            }
            DefaultView::List => {
                let headers = ["Column", "#", "Title", "Category", "Dates", "Tags"];
                let headers_by_column: HashMap<&str, &str> = board
                    .columns
                    .iter()
                    .map(|c| (c.id.as_str(), c.header.as_str()))
                    .collect();
                let rows = items
                    .iter()
                    .map(|item| {
                        vec![
                            headers_by_column.get(item.column_id.as_str()).copied().unwrap_or("?").to_string(),
                            item.order.to_string(),
                            item.title.clone(),
                            self.category_label(item, &by_id, settings),
                            if settings.show_item_dates { format_dates(item) } else { String::new() },
                            if settings.show_item_tags { format_tags(item) } else { String::new() },
                        ]
                    })
                    .collect();
                writeln!(out)?;
                write_table(out, &headers, rows)?;
            }
        }
        Ok(())
    }

    fn write_card<W: Write>(
        &self,
        out: &mut W,
        idx: usize,
        item: &ListItem,
        categories: &HashMap<&str, &Category>,
        settings: &UserSettings,
    ) -> anyhow::Result<()> {
        let mut line = format!("  {} {}", self.paint(&idx.to_string(), "33"), item.title);
        let label = self.category_label(item, categories, settings);
        if !label.is_empty() {
            line.push_str(&format!("  [{label}]"));
        }
        if settings.show_item_dates && item.has_dates() {
            line.push_str(&format!("  {}", format_dates(item)));
        }
        if settings.show_item_tags && !item.tags.is_empty() {
            line.push_str(&format!("  {}", format_tags(item)));
        }
        line.push_str(&format!("  {}", self.paint(&item.id, "2")));
        writeln!(out, "{line}")?;

        if !settings.compact_mode
            && settings.show_item_description
            && let Some(description) = item.description.as_deref().filter(|d| !d.trim().is_empty())
        {
            writeln!(out, "      {description}")?;
        }
        Ok(())
    }

    fn category_label(&self, item: &ListItem, categories: &HashMap<&str, &Category>, settings: &UserSettings) -> String {
        let Some(category) = item.category_id.as_deref().and_then(|id| categories.get(id)) else {
            return String::new();
        };

        let mut label = String::new();
        if settings.show_category_icons
            && let Some(icon) = &category.icon
        {
            label.push_str(icon);
            label.push(' ');
        }
        if settings.show_category_labels {
            label.push_str(&category.name);
            if let Some(sub) = item.subcategory_id.as_deref().and_then(|id| categories.get(id)) {
                label.push_str(" / ");
                label.push_str(&sub.name);
            }
        }

        let label = label.trim().to_string();
        if settings.disable_category_colors || label.is_empty() {
            label
        } else {
            self.paint_hex(&label, &category.color)
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn write_categories<W: Write>(&self, out: &mut W, categories: &[Category]) -> anyhow::Result<()> {
        let mut forest = build_forest(categories);
        sort_roots_by_name(&mut forest);
        for (category, depth) in flatten(&forest) {
            let icon = category.icon.as_deref().map(|i| format!("{i} ")).unwrap_or_default();
            writeln!(
                out,
                "{}{}{}  {}  {}",
                "  ".repeat(depth),
                icon,
                self.paint_hex(&category.name, &category.color),
                category.color,
                self.paint(&category.id, "2"),
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn write_stats<W: Write>(&self, out: &mut W, stats: &Statistics) -> anyhow::Result<()> {
        writeln!(out, "{} {}", self.paint("Items", "1"), stats.total_items)?;

        writeln!(out)?;
        let rows = stats
            .by_column
            .iter()
            .map(|c| vec![c.header.clone(), c.share.count.to_string(), format_percent(c.share)])
            .collect();
        write_table(out, &["Column", "Count", "%"], rows)?;

        writeln!(out)?;
        let mut rows = Vec::new();
        for category in &stats.by_category {
            rows.push(vec![
                self.paint_hex(&category.name, &category.color),
                category.total.count.to_string(),
                format_percent(category.total),
            ]);
            if category.direct.count > 0 || !category.subcategories.is_empty() {
                rows.push(vec![
                    "  (direct)".to_string(),
                    category.direct.count.to_string(),
                    format_percent(category.direct),
                ]);
            }
            for sub in &category.subcategories {
                rows.push(vec![
                    format!("  {}", sub.name),
                    sub.share.count.to_string(),
                    format_percent(sub.share),
                ]);
            }
        }
        rows.push(vec![
            "Uncategorized".to_string(),
            stats.uncategorized.count.to_string(),
            format_percent(stats.uncategorized),
        ]);
        if stats.orphaned.count > 0 {
            rows.push(vec![
                self.paint("Unknown category", "31"),
                stats.orphaned.count.to_string(),
                format_percent(stats.orphaned),
            ]);
        }
        write_table(out, &["Category", "Count", "%"], rows)?;

        writeln!(out)?;
        let completion = &stats.completion;
        let rows = vec![
            vec!["With dates".to_string(), completion.with_dates.count.to_string(), format_percent(completion.with_dates)],
            vec!["With tags".to_string(), completion.with_tags.count.to_string(), format_percent(completion.with_tags)],
            vec![
                "With description".to_string(),
                completion.with_description.count.to_string(),
                format_percent(completion.with_description),
            ],
            vec![
                "With category".to_string(),
                completion.with_category.count.to_string(),
                format_percent(completion.with_category),
            ],
        ];
        write_table(out, &["Completion", "Count", "%"], rows)
    }

    #[tracing::instrument(skip_all)]
    pub fn write_feedback<W: Write>(&self, out: &mut W, entries: &[Feedback]) -> anyhow::Result<()> {
        let rows = entries
            .iter()
            .map(|f| {
                vec![
                    self.paint(&f.id, "33"),
                    format!("{:?}", f.kind).to_lowercase(),
                    format!("{:?}", f.status).to_lowercase(),
                    f.user_email.clone(),
                    f.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                    f.subject.clone(),
                ]
            })
            .collect();
        write_table(out, &["ID", "Kind", "Status", "From", "Date", "Subject"], rows)
    }

    pub fn write_settings<W: Write>(&self, out: &mut W, settings: &UserSettings) -> anyhow::Result<()> {
        let value = serde_json::to_value(settings)?;
        if let Some(map) = value.as_object() {
            let rows = map
                .iter()
                .map(|(key, value)| {
                    let shown = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    vec![key.clone(), shown]
                })
                .collect();
            write_table(out, &["Setting", "Value"], rows)?;
        }
        Ok(())
    }

    pub fn write_profile<W: Write>(&self, out: &mut W, profile: &UserProfile) -> anyhow::Result<()> {
        let rows = vec![
            vec!["Name".to_string(), profile.display_name.clone().unwrap_or_else(|| "-".to_string())],
            vec!["Email".to_string(), profile.email.clone()],
            vec![
                "Since".to_string(),
                profile.created_at.with_timezone(&Local).format("%Y-%m-%d").to_string(),
            ],
        ];
        write_table(out, &["Profile", ""], rows)
    }

    pub fn write_prefs<W: Write>(&self, out: &mut W, prefs: &LocalPrefs) -> anyhow::Result<()> {
        let text = toml::to_string(prefs)?;
        write!(out, "{text}")?;
        Ok(())
    }

    pub fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_hex(&self, text: &str, hex: &str) -> String {
        match parse_hex(hex) {
            Some((r, g, b)) => self.paint(text, &format!("38;2;{r};{g};{b}")),
            None => text.to_string(),
        }
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn format_percent(share: Share) -> String {
    format!("{:.1}", share.percentage)
}

fn format_dates(item: &ListItem) -> String {
    match (item.start_date, item.end_date) {
        (Some(start), Some(end)) => format!("{start}..{end}"),
        (Some(start), None) => format!("{start}.."),
        (None, Some(end)) => format!("..{end}"),
        (None, None) => String::new(),
    }
}

fn format_tags(item: &ListItem) -> String {
    item.tags
        .iter()
        .map(|tag| format!("+{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_table<W: Write>(writer: &mut W, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::model::Column;

    fn board() -> (Board, Vec<Category>) {
        let now = Utc::now();
        let list = List {
            id: "l1".to_string(),
            name: "Books".to_string(),
            description: None,
            user_id: "u1".to_string(),
            created_at: now,
            updated_at: now,
        };
        let columns = vec![Column {
            id: "c1".to_string(),
            header: "To read".to_string(),
            order: 0,
        }];
        let mut item = ListItem::new("Dune", "c1", 0);
        item.category_id = Some("scifi".to_string());
        item.tags = vec!["classic".to_string()];
        item.description = Some("desert planet".to_string());
        item.start_date = NaiveDate::from_ymd_opt(2024, 1, 2);
        let categories = vec![Category {
            id: "scifi".to_string(),
            name: "Sci-Fi".to_string(),
            color: "#3B82F6".to_string(),
            icon: None,
            parent_id: None,
            user_id: "u1".to_string(),
        }];
        (
            Board {
                list,
                columns,
                items: vec![item],
            },
            categories,
        )
    }

    fn render(settings: &UserSettings) -> String {
        let (board, categories) = board();
        let mut out = Vec::new();
        Renderer::plain()
            .write_board(&mut out, &board, &board.items, &categories, settings)
            .expect("render");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn board_view_honours_display_settings() {
        let text = render(&UserSettings::default());
        assert!(text.contains("To read (1)"));
        assert!(text.contains("[Sci-Fi]"));
        assert!(text.contains("+classic"));
        assert!(text.contains("2024-01-02.."));
        assert!(text.contains("desert planet"));

        let quiet = UserSettings {
            show_category_labels: false,
            show_item_tags: false,
            compact_mode: true,
            ..UserSettings::default()
        };
        let text = render(&quiet);
        assert!(!text.contains("Sci-Fi"));
        assert!(!text.contains("+classic"));
        assert!(!text.contains("desert planet"));
    }

    #[test]
    fn list_view_is_a_table() {
        let settings = UserSettings {
            default_view: DefaultView::List,
            ..UserSettings::default()
        };
        let text = render(&settings);
        assert!(text.contains("Column"));
        assert!(text.contains("To read"));
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            &["A", "B"],
            vec![vec!["\x1b[31mxy\x1b[0m".to_string(), "z".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A  B ");
        assert_eq!(strip_ansi(lines[2]), "xy z ");
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex("#3B82F6"), Some((0x3b, 0x82, 0xf6)));
        assert_eq!(parse_hex("blue"), None);
    }
}
