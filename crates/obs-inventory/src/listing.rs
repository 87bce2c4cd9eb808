//! Conversion of inspected tarball contents into inventory records.

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::filename::parse_filename;
use crate::hpss::{InspectedFile, TarballContents};
use crate::records::TarballFileMeta;

/// Build one inventory record per file in `contents`.
///
/// Records keep the order of the listing; duplicate entries are kept.
/// Entries rejected while parsing the listing are logged here and produce
/// no record.
pub fn process_inspect_tarball_resp(
    contents: &TarballContents,
    search: &SearchConfig,
) -> Vec<TarballFileMeta> {
    for rejected in &contents.rejected {
        warn!(
            source = %search.key,
            path = %contents.parent_dir,
            error = %rejected,
            "Skipping malformed listing entry"
        );
    }

    contents
        .inspected_files
        .iter()
        .map(|file| tarball_file_meta(file, contents, search))
        .collect()
}

fn tarball_file_meta(
    file: &InspectedFile,
    contents: &TarballContents,
    search: &SearchConfig,
) -> TarballFileMeta {
    let meta = parse_filename(&file.name);
    debug!(filename = %file.name, meta = ?meta, "Parsed filename");

    let parent_dir = match &file.member_dir {
        Some(dir) => format!("{}/{}", contents.parent_dir, dir),
        None => contents.parent_dir.clone(),
    };

    TarballFileMeta {
        filename: file.name.clone(),
        parent_dir,
        platform: search.platform.clone(),
        s3_bucket: search.s3_bucket.clone(),
        prefix: meta.prefix,
        cycle_tag: meta.cycle_tag,
        data_type: meta.data_type,
        cycle_time: meta.cycle_time,
        obs_day: contents.observation_day,
        data_format: meta.data_format,
        suffix: meta.suffix,
        nr_tag: meta.not_restricted_tag,
        file_size: file.size,
        permissions: file.permissions.clone(),
        last_modified: file.last_modified,
        submitted_at: contents.submitted_at,
        latency: contents.latency,
        inserted_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filename::DataFormat;
    use crate::hpss::ListingEntryError;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn file(name: &str, member_dir: Option<&str>) -> InspectedFile {
        InspectedFile {
            name: name.to_string(),
            member_dir: member_dir.map(str::to_string),
            size: 512,
            permissions: "-rw-r--r--".to_string(),
            owner: "nwprod/nwprod".to_string(),
            last_modified: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 0).unwrap(),
        }
    }

    fn contents(files: Vec<InspectedFile>) -> TarballContents {
        TarballContents {
            parent_dir: "/NCEPPROD/rh2020/gdas.20200101.tar".to_string(),
            observation_day: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            inspected_files: files,
            rejected: vec![ListingEntryError {
                line: "HTAR: -rw-r--r-- x/y ??".to_string(),
                reason: "invalid size '??'".to_string(),
            }],
            submitted_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            latency: Duration::from_millis(1500),
        }
    }

    fn search() -> SearchConfig {
        let day = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut config = SearchConfig::for_test("gdas", "/NCEPPROD/rh%Y/gdas.%Y%m%d.tar", day, day);
        config.s3_bucket = Some("noaa-reanalyses-pds".to_string());
        config
    }

    #[test]
    fn test_records_carry_envelope_and_filename_fields() {
        let contents = contents(vec![
            file("gdas.t12z.prepbufr.nr", None),
            file("gdas.t00z.1bamua.tm00.bufr_d", Some("gdas.20200101/00")),
        ]);
        let records = process_inspect_tarball_resp(&contents, &search());
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.filename, "gdas.t12z.prepbufr.nr");
        assert_eq!(first.parent_dir, "/NCEPPROD/rh2020/gdas.20200101.tar");
        assert_eq!(first.platform, "hera_hpss");
        assert_eq!(first.s3_bucket.as_deref(), Some("noaa-reanalyses-pds"));
        assert_eq!(first.cycle_time, Some(43200));
        assert_eq!(first.data_format, DataFormat::Bufr);
        assert!(first.nr_tag);
        assert_eq!(first.obs_day, contents.observation_day);
        assert_eq!(first.submitted_at, contents.submitted_at);
        assert_eq!(first.latency, Duration::from_millis(1500));
        assert_eq!(first.file_size, 512);

        let second = &records[1];
        assert_eq!(
            second.parent_dir,
            "/NCEPPROD/rh2020/gdas.20200101.tar/gdas.20200101/00"
        );
        assert_eq!(second.data_format, DataFormat::BufrD);
        assert_eq!(second.suffix.as_deref(), Some(".tm00.bufr_d"));
    }

    #[test]
    fn test_duplicates_and_order_preserved() {
        let contents = contents(vec![
            file("b.t00z.x.bufr", None),
            file("a.t00z.x.bufr", None),
            file("b.t00z.x.bufr", None),
        ]);
        let names: Vec<_> = process_inspect_tarball_resp(&contents, &search())
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["b.t00z.x.bufr", "a.t00z.x.bufr", "b.t00z.x.bufr"]);
    }

    #[test]
    fn test_empty_listing_yields_no_records() {
        let records = process_inspect_tarball_resp(&contents(Vec::new()), &search());
        assert!(records.is_empty());
    }
}
