//! Positional layouts for the GDELT tables this crate reads.
//!
//! GDELT files carry no header row, so every column is addressed by offset.
//! Knowledge-graph (GKG) files come in two generations with different widths
//! and offsets; the rest of the crate only ever sees the normalized
//! five-column projection described by [`GkgLayout`].

use std::fmt;

/// First lines with at most this many tab-separated fields are legacy GKG.
pub const LEGACY_FIELD_LIMIT: usize = 15;

/// Column names of the normalized GKG projection, in current-version naming.
pub const NORMALIZED_COLUMNS: [&str; 5] = [
    "DATE",
    "SourceCommonName",
    "Themes",
    "V2Tone",
    "Organizations",
];

/// Header of the economic-signal sink.
pub const SIGNAL_HEADER: [&str; 5] = [
    "Date",
    "News_Sentiment",
    "News_Disagreement",
    "News_Volatility",
    "News_Volume",
];

pub const LEGACY_GKG_COLUMNS: [&str; 11] = [
    "DATE", "NUMARTS", "COUNTS", "THEMES", "LOCATIONS",
    "PERSONS", "ORGANIZATIONS", "TONE", "CAMEOEVENTIDS",
    "SOURCES", "SOURCEURLS",
];

pub const GKG_COLUMNS: [&str; 27] = [
    "GKGRECORDID", "DATE", "SourceCollectionIdentifier", "SourceCommonName",
    "DocumentIdentifier", "Counts", "V2Counts", "Themes", "V2Themes",
    "Locations", "V2Locations", "Persons", "V2Persons", "Organizations",
    "V2Organizations", "V2Tone", "Dates", "GCAM", "SharingImage", "RelatedImages",
    "SocialImageEmbeds", "SocialVideoEmbeds", "Quotations", "AllNames",
    "Amounts", "TranslationInfo", "Extras",
];

pub const EXPORT_COLUMNS: [&str; 61] = [
    "GLOBALEVENTID", "SQLDATE", "MonthYear", "Year", "FractionDate",
    "Actor1Code", "Actor1Name", "Actor1CountryCode", "Actor1KnownGroupCode",
    "Actor1EthnicCode", "Actor1Religion1Code", "Actor1Religion2Code",
    "Actor1Type1Code", "Actor1Type2Code", "Actor1Type3Code",
    "Actor2Code", "Actor2Name", "Actor2CountryCode", "Actor2KnownGroupCode",
    "Actor2EthnicCode", "Actor2Religion1Code", "Actor2Religion2Code",
    "Actor2Type1Code", "Actor2Type2Code", "Actor2Type3Code",
    "IsRootEvent", "EventCode", "EventBaseCode", "EventRootCode",
    "QuadClass", "GoldsteinScale", "NumMentions", "NumSources", "NumArticles",
    "AvgTone", "Actor1Geo_Type", "Actor1Geo_FullName", "Actor1Geo_CountryCode",
    "Actor1Geo_ADM1Code", "Actor1Geo_ADM2Code", "Actor1Geo_Lat", "Actor1Geo_Long",
    "Actor1Geo_FeatureID", "Actor2Geo_Type", "Actor2Geo_FullName",
    "Actor2Geo_CountryCode", "Actor2Geo_ADM1Code", "Actor2Geo_ADM2Code",
    "Actor2Geo_Lat", "Actor2Geo_Long", "Actor2Geo_FeatureID",
    "ActionGeo_Type", "ActionGeo_FullName", "ActionGeo_CountryCode",
    "ActionGeo_ADM1Code", "ActionGeo_ADM2Code", "ActionGeo_Lat", "ActionGeo_Long",
    "ActionGeo_FeatureID", "DATEADDED", "SOURCEURL",
];

pub const MENTIONS_COLUMNS: [&str; 16] = [
    "GLOBALEVENTID", "EventTimeDate", "MentionTimeDate", "MentionType",
    "MentionSourceName", "MentionIdentifier", "SentenceID", "Actor1CharOffset",
    "Actor2CharOffset", "ActionCharOffset", "InRawText", "Confidence",
    "MentionDocLen", "MentionDocTone", "MentionDocTranslationInfo", "Extras",
];

/// Schema generation of a knowledge-graph file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GkgVersion {
    /// GKG 1.0 daily files, 11 columns.
    Legacy,
    /// GKG 2.x files, 27 columns.
    Current,
}

impl GkgVersion {
    pub fn layout(self) -> &'static GkgLayout {
        match self {
            GkgVersion::Legacy => &LEGACY_LAYOUT,
            GkgVersion::Current => &CURRENT_LAYOUT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GkgVersion::Legacy => "legacy",
            GkgVersion::Current => "current",
        }
    }
}

impl fmt::Display for GkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offsets of the five projected columns for one GKG generation.
#[derive(Debug)]
pub struct GkgLayout {
    pub version: GkgVersion,
    pub columns: &'static [&'static str],
    pub date: usize,
    pub source: usize,
    pub themes: usize,
    pub tone: usize,
    pub organizations: usize,
}

impl GkgLayout {
    /// Offsets in [`NORMALIZED_COLUMNS`] order.
    pub fn offsets(&self) -> [usize; 5] {
        [self.date, self.source, self.themes, self.tone, self.organizations]
    }

    /// Source column names that map onto [`NORMALIZED_COLUMNS`], same order.
    pub fn source_names(&self) -> [&'static str; 5] {
        self.offsets().map(|offset| self.columns[offset])
    }

    /// Shortest line that still carries every projected column.
    pub fn min_fields(&self) -> usize {
        self.offsets().into_iter().max().unwrap_or(0) + 1
    }
}

static LEGACY_LAYOUT: GkgLayout = GkgLayout {
    version: GkgVersion::Legacy,
    columns: &LEGACY_GKG_COLUMNS,
    date: 0,
    source: 9,
    themes: 3,
    tone: 7,
    organizations: 6,
};

static CURRENT_LAYOUT: GkgLayout = GkgLayout {
    version: GkgVersion::Current,
    columns: &GKG_COLUMNS,
    date: 1,
    source: 3,
    themes: 7,
    tone: 15,
    organizations: 13,
};

/// How duplicate rows are collapsed when merging raw files of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedupe {
    /// Keep the last row seen for each value of the column at this offset.
    LastByColumn(usize),
    /// Drop rows identical to an earlier row.
    ExactRow,
}

/// The three table families published by GDELT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Export,
    Gkg,
    Mentions,
}

impl FileKind {
    pub const ALL: [FileKind; 3] = [FileKind::Export, FileKind::Gkg, FileKind::Mentions];

    /// File-name suffix used by the fetch step.
    pub fn suffix(self) -> &'static str {
        match self {
            FileKind::Export => ".export.CSV",
            FileKind::Gkg => ".gkg.csv",
            FileKind::Mentions => ".mentions.CSV",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            FileKind::Export => &EXPORT_COLUMNS,
            FileKind::Gkg => &GKG_COLUMNS,
            FileKind::Mentions => &MENTIONS_COLUMNS,
        }
    }

    pub fn dedupe(self) -> Dedupe {
        match self {
            FileKind::Export | FileKind::Gkg => Dedupe::LastByColumn(0),
            FileKind::Mentions => Dedupe::ExactRow,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Export => "export",
            FileKind::Gkg => "gkg",
            FileKind::Mentions => "mentions",
        }
    }

    pub fn default_output(self) -> &'static str {
        match self {
            FileKind::Export => "merged_export.csv",
            FileKind::Gkg => "merged_gkg.csv",
            FileKind::Mentions => "merged_mentions.csv",
        }
    }
}
