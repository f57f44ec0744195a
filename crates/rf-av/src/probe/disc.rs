//! Grammar for `dvdbackup -I` output.
//!
//! Extracts the quoted disc title, the "Main feature" summary block, and
//! the title-set block the main feature points at. dvdbackup terminates
//! each block with a blank line and indents title-set details with runs of
//! tabs, which are normalised to a single tab for display.

use regex::Regex;
use std::sync::OnceLock;

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"DVD-Video information of the DVD with title "(?P<name>.*)""#).unwrap()
    })
}

fn main_feature_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?P<mainfeature>Main feature:.*?)\n\n").unwrap())
}

fn title_set_num_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Title set containing the main feature is (?P<num>\d+)").unwrap()
    })
}

fn tab_runs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t+").unwrap())
}

/// Facts extracted from a disc info probe. Every field is empty when its
/// pattern did not match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscInfo {
    /// Disc title from the quoted header line.
    pub name: String,
    /// The "Main feature:" block, blank-line terminated.
    pub main_feature: String,
    /// The title-set block the main feature points at, tab-normalised.
    pub title_set: String,
}

impl DiscInfo {
    /// Two-part summary shown to collaborators.
    pub fn summary(&self) -> String {
        format!("{}\n{}", self.main_feature, self.title_set)
    }
}

/// Parse disc info probe text. Absent patterns yield empty fields.
pub fn parse_disc_info(text: &str) -> DiscInfo {
    let name = title_re()
        .captures(text)
        .map(|c| c["name"].to_string())
        .unwrap_or_default();

    let main_feature = main_feature_re()
        .captures(text)
        .map(|c| c["mainfeature"].to_string())
        .unwrap_or_default();

    let mut title_set = String::new();
    if !main_feature.is_empty() {
        if let Some(c) = title_set_num_re().captures(&main_feature) {
            let num = &c["num"];
            // The block for this specific title set, blank-line terminated.
            let block_re =
                Regex::new(&format!(r"(?s)(?P<titleset>Title set {num}.*?)\n\n")).unwrap();
            if let Some(c) = block_re.captures(text) {
                title_set = tab_runs_re().replace_all(&c["titleset"], "\t").to_string();
            }
        }
    }

    DiscInfo {
        name,
        main_feature,
        title_set,
    }
}
