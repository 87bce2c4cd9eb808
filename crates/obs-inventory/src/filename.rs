//! Filename grammar for archived observation files.
//!
//! Observation filenames encode several fields positionally, separated by
//! `.`:
//!
//! ```text
//! gdas.t00z.1bamua.tm00.bufr_d.nr
//! ^^^^ ^^^^ ^^^^^^ ^^^^^^^^^^^^^^
//! |    |    |      suffix (".tm00.bufr_d.nr")
//! |    |    data type
//! |    cycle tag (hour of day)
//! prefix
//! ```
//!
//! The data format is not positional. Legacy files are inconsistently
//! delimited, so it is detected by an ordered chain of strategies, see
//! [`FORMAT_STRATEGIES`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SECONDS_IN_A_DAY: i64 = 24 * 3600;

/// Trailing marker carried by files in the not-restricted distribution.
pub const NOT_RESTRICTED_MARKER: &str = ".nr";

const SEPARATOR: char = '.';

// filename part positions
const PREFIX: usize = 0;
const CYCLE_TAG: usize = 1;
const DATA_TYPE: usize = 2;
const SUFFIX_START: usize = 3;

/// Numeric extensions used by old GRIB2 analyses (grid sizes).
const ADDITIONAL_GRIB2_EXTENSIONS: [&str; 2] = ["1536", "576"];

/// Storage format of an observation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Bufr,
    BufrD,
    Grb,
    Grib2,
    Unknown,
}

impl DataFormat {
    /// Known formats in detection order.
    pub const KNOWN: [DataFormat; 4] = [Self::Bufr, Self::BufrD, Self::Grb, Self::Grib2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bufr => "bufr",
            Self::BufrD => "bufr_d",
            Self::Grb => "grb",
            Self::Grib2 => "grib2",
            Self::Unknown => "unknown",
        }
    }

    /// Exact match of a known format name.
    fn from_known(s: &str) -> Option<Self> {
        Self::KNOWN.into_iter().find(|f| f.as_str() == s)
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_known(s).unwrap_or(Self::Unknown))
    }
}

/// Fields derived from a single filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameMeta {
    pub prefix: Option<String>,
    pub cycle_tag: Option<String>,
    pub data_type: Option<String>,
    /// Seconds into the day, within `[0, SECONDS_IN_A_DAY]`.
    pub cycle_time: Option<i64>,
    pub data_format: DataFormat,
    pub suffix: Option<String>,
    pub not_restricted_tag: bool,
}

impl FilenameMeta {
    fn empty() -> Self {
        Self {
            prefix: None,
            cycle_tag: None,
            data_type: None,
            cycle_time: None,
            data_format: DataFormat::Unknown,
            suffix: None,
            not_restricted_tag: false,
        }
    }
}

/// Parse a raw archive filename into its metadata fields.
///
/// Never fails: fields that cannot be derived are reported as absent.
pub fn parse_filename(filename: &str) -> FilenameMeta {
    if filename.is_empty() {
        return FilenameMeta::empty();
    }

    let parts: Vec<&str> = filename.split(SEPARATOR).collect();
    let tag = cycle_tag(&parts);

    FilenameMeta {
        prefix: parts.get(PREFIX).map(|p| p.to_string()),
        cycle_tag: tag.map(str::to_string),
        data_type: data_type(&parts).map(str::to_string),
        cycle_time: tag.and_then(cycle_time),
        data_format: data_format(filename),
        suffix: combined_suffix(&parts),
        not_restricted_tag: filename.ends_with(NOT_RESTRICTED_MARKER),
    }
}

pub fn cycle_tag<'a>(parts: &[&'a str]) -> Option<&'a str> {
    parts.get(CYCLE_TAG).copied()
}

pub fn data_type<'a>(parts: &[&'a str]) -> Option<&'a str> {
    parts.get(DATA_TYPE).copied()
}

/// Convert a cycle tag such as `t06z` into seconds since midnight.
///
/// The tag is `t`, a one or two digit hour (00-23), then `z`; both letters
/// match in either case. Anything else yields `None`.
pub fn cycle_time(tag: &str) -> Option<i64> {
    let hour = tag
        .strip_prefix(['t', 'T'])
        .and_then(|rest| rest.strip_suffix(['z', 'Z']))
        .filter(|digits| {
            (1..=2).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
        })
        .and_then(|digits| digits.parse::<i64>().ok())
        .filter(|hour| *hour < 24);

    let Some(hour) = hour else {
        debug!(tag = %tag, "Not a valid cycle time");
        return None;
    };

    let seconds = hour * 3600;
    if !(0..=SECONDS_IN_A_DAY).contains(&seconds) {
        return None;
    }
    Some(seconds)
}

/// A single format detection strategy. Returns `None` for "no decision".
pub type FormatStrategy = fn(&str) -> Option<DataFormat>;

/// Format detection strategies, evaluated in order against the filename
/// with any trailing `.nr` marker removed.
pub const FORMAT_STRATEGIES: [(&str, FormatStrategy); 4] = [
    ("extension", match_extension),
    ("trailing", match_trailing_format),
    ("legacy_grib2_extension", match_legacy_grib2_extension),
    ("embedded", match_embedded_format),
];

/// Detect the storage format of a file from its name.
pub fn data_format(filename: &str) -> DataFormat {
    let name = filename
        .strip_suffix(NOT_RESTRICTED_MARKER)
        .unwrap_or(filename);

    FORMAT_STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(name))
        .unwrap_or(DataFormat::Unknown)
}

/// The final dot-segment of the last path component equals a known format.
pub fn match_extension(name: &str) -> Option<DataFormat> {
    final_extension(name).and_then(DataFormat::from_known)
}

/// The name ends with a known format string.
pub fn match_trailing_format(name: &str) -> Option<DataFormat> {
    DataFormat::KNOWN
        .into_iter()
        .find(|f| name.ends_with(f.as_str()))
}

/// The final dot-segment is one of the numeric GRIB2 extensions.
pub fn match_legacy_grib2_extension(name: &str) -> Option<DataFormat> {
    final_extension(name)
        .filter(|ext| ADDITIONAL_GRIB2_EXTENSIONS.contains(ext))
        .map(|_| DataFormat::Grib2)
}

/// A known format string appears anywhere in the name.
pub fn match_embedded_format(name: &str) -> Option<DataFormat> {
    DataFormat::KNOWN
        .into_iter()
        .find(|f| name.contains(f.as_str()))
}

/// Extension of the last path component, without the dot.
///
/// Hidden-file style names (`.bufr`) and names ending in a dot have none.
fn final_extension(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let dot = base.rfind(SEPARATOR)?;
    if dot == 0 || dot + 1 == base.len() {
        return None;
    }
    Some(&base[dot + 1..])
}

/// Join every part from position 3 onward, each with a leading `.`.
pub fn combined_suffix(parts: &[&str]) -> Option<String> {
    let rest = parts.get(SUFFIX_START..).filter(|rest| !rest.is_empty())?;
    Some(rest.iter().map(|part| format!(".{}", part)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_filename() {
        let meta = parse_filename("gdas.t06z.1bamua.tm00.bufr_d.nr");
        assert_eq!(meta.prefix.as_deref(), Some("gdas"));
        assert_eq!(meta.cycle_tag.as_deref(), Some("t06z"));
        assert_eq!(meta.data_type.as_deref(), Some("1bamua"));
        assert_eq!(meta.cycle_time, Some(21600));
        assert_eq!(meta.data_format, DataFormat::BufrD);
        assert_eq!(meta.suffix.as_deref(), Some(".tm00.bufr_d.nr"));
        assert!(meta.not_restricted_tag);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let name = "gdas.t18z.prepbufr.acft_profiles";
        assert_eq!(parse_filename(name), parse_filename(name));
    }

    #[test]
    fn test_empty_filename_is_all_absent() {
        let meta = parse_filename("");
        assert_eq!(meta, FilenameMeta::empty());
    }

    #[test]
    fn test_single_token() {
        let meta = parse_filename("README");
        assert_eq!(meta.prefix.as_deref(), Some("README"));
        assert_eq!(meta.cycle_tag, None);
        assert_eq!(meta.data_type, None);
        assert_eq!(meta.cycle_time, None);
        assert_eq!(meta.suffix, None);
        assert_eq!(meta.data_format, DataFormat::Unknown);
    }

    #[test]
    fn test_cycle_time_bounds() {
        assert_eq!(cycle_time("t00Z"), Some(0));
        assert_eq!(cycle_time("t23Z"), Some(82800));
        assert_eq!(cycle_time("t12z"), Some(43200));
        assert_eq!(cycle_time("T6Z"), Some(21600));
    }

    #[test]
    fn test_cycle_time_malformed() {
        assert_eq!(cycle_time("xyz"), None);
        assert_eq!(cycle_time("t24z"), None);
        assert_eq!(cycle_time("t006z"), None);
        assert_eq!(cycle_time("tz"), None);
        assert_eq!(cycle_time("t0az"), None);
        assert_eq!(cycle_time(""), None);
    }

    #[test]
    fn test_suffix_presence() {
        assert_eq!(combined_suffix(&["a", "b", "c"]), None);
        assert_eq!(combined_suffix(&["a", "b", "c", "d"]).as_deref(), Some(".d"));
        assert_eq!(
            combined_suffix(&["a", "b", "c", "d", "e"]).as_deref(),
            Some(".d.e")
        );
        assert_eq!(combined_suffix(&[]), None);
    }

    #[test]
    fn test_format_strategy_extension() {
        assert_eq!(match_extension("gdas.t00z.sfcshp.tm00.bufr_d"), Some(DataFormat::BufrD));
        assert_eq!(match_extension("gdas.t00z.prepbufr"), None);
        assert_eq!(match_extension("dir.bufr/noext"), None);
        assert_eq!(match_extension(".bufr"), None);
    }

    #[test]
    fn test_format_strategy_trailing() {
        assert_eq!(match_trailing_format("gdas.t00z.prepbufr"), Some(DataFormat::Bufr));
        assert_eq!(match_trailing_format("gdas.t00z.satwnd"), None);
    }

    #[test]
    fn test_format_strategy_legacy_grib2() {
        assert_eq!(
            match_legacy_grib2_extension("gdas1.t00z.sstgrb.1536"),
            Some(DataFormat::Grib2)
        );
        assert_eq!(
            match_legacy_grib2_extension("rtgssthr.576"),
            Some(DataFormat::Grib2)
        );
        assert_eq!(match_legacy_grib2_extension("a.b.1024"), None);
    }

    #[test]
    fn test_format_strategy_embedded() {
        assert_eq!(
            match_embedded_format("gdas.t00z.grib2.f000.idx"),
            Some(DataFormat::Grib2)
        );
        assert_eq!(match_embedded_format("gdas.t00z.status"), None);
    }

    #[test]
    fn test_format_chain_order() {
        // extension wins over the embedded match
        assert_eq!(data_format("x.grb.bufr"), DataFormat::Bufr);
        // legacy grib2 extension is checked before the embedded search
        assert_eq!(data_format("gdas1.t00z.sstgrb.1536"), DataFormat::Grib2);
        // embedded search uses the known-format order
        assert_eq!(data_format("gdas.t00z.bufr_d.tm00"), DataFormat::Bufr);
        assert_eq!(data_format("gdas.t00z.syndata.tcvitals"), DataFormat::Unknown);
    }

    #[test]
    fn test_format_with_restriction_marker() {
        for format in DataFormat::KNOWN {
            let plain = format!("gdas.t00z.obs.{}", format);
            let restricted = format!("{}.nr", plain);

            let meta = parse_filename(&plain);
            assert_eq!(meta.data_format, format, "{}", plain);
            assert!(!meta.not_restricted_tag);

            let meta = parse_filename(&restricted);
            assert_eq!(meta.data_format, format, "{}", restricted);
            assert!(meta.not_restricted_tag);
        }
    }

    #[test]
    fn test_data_format_from_str() {
        assert_eq!("bufr_d".parse::<DataFormat>().unwrap(), DataFormat::BufrD);
        assert_eq!("netcdf".parse::<DataFormat>().unwrap(), DataFormat::Unknown);
        assert_eq!(DataFormat::Grib2.to_string(), "grib2");
    }
}
