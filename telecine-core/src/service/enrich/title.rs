//! Title derivation from file names and captions: promo-prefix
//! stripping, release-name parsing, and quality labeling.

use std::sync::LazyLock;

use regex::Regex;

/// Promo/username patterns stripped from derived titles. The first
/// matching pattern wins and the scan stops, so ordering is part of the
/// observable behavior.
static SANITIZE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // "@uploader_Title" — strip the handle, keep the separator.
        (r"^@[\w\.-]+?_", " _"),
        // Inline handles in any position.
        (
            r"_@[A-Za-z]+_|@[A-Za-z]+_|[\[\]\s@]*@[^.\s\[\]]+[\]\[\s@]*",
            " ",
        ),
        // "Group_Uploads_Title".
        (r"^[\w\.-]+?_Uploads_", " _Uploads_"),
        // "by_someone_Title" / "from-someone_Title".
        (r"^(?:by|from)[\s_-]+[\w\.-]+?_", " _"),
        // "[Group] Title".
        (r"^\[[\w\.-]+?\][\s_-]*", " "),
        // "(Group) Title".
        (r"^\([\w\.-]+?\)[\s_-]*", " "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("sanitize pattern must compile"),
            replacement,
        )
    })
    .collect()
});

static EDGE_TRIM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_\s-]+|[_\s-]+$").expect("trim pattern must compile"));

/// Remove username/promo prefixes from a derived title. Applies the
/// first matching rule only, then trims separator runs at both edges.
#[must_use]
pub fn sanitize_title(raw: &str) -> String {
    let input = raw.replace('\n', "\\n");

    let mut result = input;
    for (pattern, replacement) in SANITIZE_RULES.iter() {
        if pattern.is_match(&result) {
            result = pattern.replace_all(&result, *replacement).into_owned();
            break;
        }
    }

    EDGE_TRIM.replace_all(&result, " ").into_owned()
}

/// Parsed release-name coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
}

static SEASON_EPISODE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bS(\d{1,2})[\s._-]*E(\d{1,3})\b",
        r"(?i)\b(\d{1,2})x(\d{1,3})\b",
        r"(?i)\bSeason[\s._-]*(\d{1,2})[\s._-]*Episode[\s._-]*(\d{1,3})\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("season/episode pattern must compile"))
    .collect()
});

static SEASON_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:S(\d{1,2})|Season[\s._-]*(\d{1,2}))\b")
        .expect("season pattern must compile")
});

static YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("year pattern must compile")
});

/// Parse `{title, year?, season?, episode?}` out of a release name.
///
/// The title is everything before the first recognized marker (season
/// tag or year), with separators normalized to single spaces.
#[must_use]
pub fn parse_title(raw: &str) -> ParsedTitle {
    let mut season = None;
    let mut episode = None;
    let mut cut = raw.len();

    for pattern in SEASON_EPISODE.iter() {
        if let Some(caps) = pattern.captures(raw) {
            let whole = caps.get(0).expect("match");
            season = caps.get(1).and_then(|m| m.as_str().parse().ok());
            episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
            cut = cut.min(whole.start());
            break;
        }
    }

    if season.is_none() {
        if let Some(caps) = SEASON_ONLY.captures(raw) {
            let whole = caps.get(0).expect("match");
            season = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            cut = cut.min(whole.start());
        }
    }

    let mut year = None;
    if let Some(caps) = YEAR.captures(raw) {
        let whole = caps.get(0).expect("match");
        year = caps.get(1).and_then(|m| m.as_str().parse().ok());
        cut = cut.min(whole.start());
    }

    let title = normalize_title(&raw[..cut]);
    ParsedTitle {
        title,
        year,
        season,
        episode,
    }
}

fn normalize_title(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '.' | '_' | '-' | ':' | '(' | ')' | '[' | ']' => ' ',
            other => other,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Quality label chosen by frame-height thresholds.
#[must_use]
pub fn quality_label(height: u32) -> &'static str {
    const THRESHOLDS: [(u32, &str); 7] = [
        (360, "360p"),
        (480, "480p"),
        (540, "540p"),
        (720, "720p"),
        (1080, "1080p"),
        (2160, "2160p"),
        (4320, "4320p"),
    ];
    for (threshold, label) in THRESHOLDS {
        if height <= threshold {
            return label;
        }
    }
    "8640p"
}

/// Human-readable file size, e.g. "1.40GB".
#[must_use]
pub fn readable_file_size(size_in_bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if size_in_bytes == 0 {
        return "0B".to_string();
    }
    let mut size = size_in_bytes as f64;
    let mut index = 0;
    while size >= 1024.0 && index < UNITS.len() - 1 {
        size /= 1024.0;
        index += 1;
    }
    format!("{size:.2}{}", UNITS[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_leading_handle() {
        // The stripped prefix collapses to a single leading space.
        assert_eq!(
            sanitize_title("@uploads_Inception.2010.1080p"),
            " Inception.2010.1080p"
        );
    }

    #[test]
    fn sanitize_strips_bracketed_group() {
        assert_eq!(
            sanitize_title("[RelGrp] Inception 2010"),
            " Inception 2010"
        );
    }

    #[test]
    fn sanitize_applies_only_first_matching_rule() {
        // The inline-handle rule fires first; the bracket rule must not
        // run afterwards even though it would also match.
        let result = sanitize_title("@grp_[Other] Movie");
        assert!(!result.starts_with('@'), "handle not stripped: {result}");
        assert!(
            result.contains("[Other]"),
            "second rule must not run: {result}"
        );
    }

    #[test]
    fn sanitize_keeps_clean_titles() {
        assert_eq!(
            sanitize_title("Blade.Runner.1982.1080p.mkv"),
            "Blade.Runner.1982.1080p.mkv"
        );
    }

    #[test]
    fn parse_movie_with_year() {
        let parsed = parse_title("Blade.Runner.1982.1080p.BluRay.x264");
        assert_eq!(parsed.title, "Blade Runner");
        assert_eq!(parsed.year, Some(1982));
        assert_eq!(parsed.season, None);
        assert_eq!(parsed.episode, None);
    }

    #[test]
    fn parse_episode_sxxeyy() {
        let parsed = parse_title("The.Expanse.S02E03.720p.WEB-DL");
        assert_eq!(parsed.title, "The Expanse");
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, Some(3));
    }

    #[test]
    fn parse_episode_cross_notation() {
        let parsed = parse_title("Fleabag 1x04 HDTV");
        assert_eq!(parsed.title, "Fleabag");
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, Some(4));
    }

    #[test]
    fn parse_season_without_episode() {
        let parsed = parse_title("Dark Season 2 Complete 1080p");
        assert_eq!(parsed.title, "Dark");
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, None);
    }

    #[test]
    fn parse_title_without_markers() {
        let parsed = parse_title("Stalker");
        assert_eq!(parsed.title, "Stalker");
        assert_eq!(parsed.year, None);
        assert_eq!(parsed.season, None);
    }

    #[test]
    fn parse_uses_earliest_marker_for_title_cut() {
        let parsed = parse_title("Fargo.2014.S01E01.1080p");
        assert_eq!(parsed.title, "Fargo");
        assert_eq!(parsed.year, Some(2014));
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, Some(1));
    }

    #[test]
    fn quality_label_thresholds() {
        assert_eq!(quality_label(240), "360p");
        assert_eq!(quality_label(360), "360p");
        assert_eq!(quality_label(361), "480p");
        assert_eq!(quality_label(544), "720p");
        assert_eq!(quality_label(1080), "1080p");
        assert_eq!(quality_label(1440), "2160p");
        assert_eq!(quality_label(4000), "4320p");
        assert_eq!(quality_label(8000), "8640p");
    }

    #[test]
    fn readable_sizes() {
        assert_eq!(readable_file_size(0), "0B");
        assert_eq!(readable_file_size(512), "512.00B");
        assert_eq!(readable_file_size(1024), "1.00KB");
        assert_eq!(readable_file_size(1_503_238_553), "1.40GB");
    }
}
