use lazy_static::lazy_static;

/// Theme substrings that mark a GKG record as economically relevant.
pub const DEFAULT_THEMES: [&str; 12] = [
    "ECON_", "TAX_", "BUS_",
    "WB_470", "WB_325", "WB_1104", "WB_698", "WB_2433",
    "IMF", "WORLD_BANK", "FED", "CENTRAL_BANK",
];

lazy_static! {
    pub static ref ECONOMIC_THEMES: ThemeFilter = ThemeFilter::new(DEFAULT_THEMES);
}

/// Case-insensitive substring predicate over a GKG themes field.
///
/// Matching is ASCII case folding only; theme codes are ASCII upper-case in
/// every published GKG generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeFilter {
    keywords: Vec<String>,
}

impl ThemeFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Builds a filter from a comma-separated keyword list such as `"ECON_,TAX_"`.
    pub fn parse(spec: &str) -> Self {
        Self::new(spec.split(','))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// True when any keyword occurs in `themes`. Missing or empty input never matches.
    pub fn is_relevant(&self, themes: Option<&str>) -> bool {
        let haystack = match themes {
            Some(t) if !t.is_empty() => t.as_bytes(),
            _ => return false,
        };
        self.keywords
            .iter()
            .any(|k| contains_ignore_ascii_case(haystack, k.as_bytes()))
    }
}

impl Default for ThemeFilter {
    fn default() -> Self {
        ECONOMIC_THEMES.clone()
    }
}

fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
