//! Generators for synthetic `htar -tvf` output.
//!
//! These produce listings in the exact column layout `htar` prints so tests
//! can build archives of any size without hand-writing fixture text.

/// One member of a generated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub permissions: String,
    pub owner: String,
    pub size: u64,
    /// `YYYY-MM-DD HH:MM`
    pub modified: String,
    pub member: String,
}

impl ListingEntry {
    /// A regular file owned by `nwprod/prod`.
    pub fn file(member: &str, size: u64) -> Self {
        Self {
            permissions: "-rw-r--r--".to_string(),
            owner: "nwprod/prod".to_string(),
            size,
            modified: "2020-01-02 03:41".to_string(),
            member: member.to_string(),
        }
    }

    /// Render the entry as one `htar` listing line.
    pub fn to_line(&self) -> String {
        format!(
            "HTAR: {}  {} {:>12} {}  ./{}",
            self.permissions, self.owner, self.size, self.modified, self.member
        )
    }
}

/// Build a complete successful listing for `entries`.
///
/// # Example
///
/// ```
/// use test_utils::{htar_listing, ListingEntry};
///
/// let listing = htar_listing(&[ListingEntry::file("gdas.t00z.prepbufr", 10)]);
/// assert!(listing.contains("./gdas.t00z.prepbufr"));
/// assert!(listing.ends_with("HTAR: HTAR SUCCESSFUL\n"));
/// ```
pub fn htar_listing(entries: &[ListingEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_line());
        out.push('\n');
    }
    out.push_str(&format!(
        "HTAR: Listing complete, {} files {} total objects\n",
        entries.len(),
        entries.len()
    ));
    out.push_str("HTAR: HTAR SUCCESSFUL\n");
    out
}

/// Listing of `count` prepbufr members, one per synoptic cycle.
pub fn cycle_listing(prefix: &str, count: usize) -> String {
    let entries: Vec<ListingEntry> = (0..count)
        .map(|i| {
            let hour = (i % 4) * 6;
            ListingEntry::file(&format!("{}.t{:02}z.prepbufr", prefix, hour), 1024 * (i as u64 + 1))
        })
        .collect();
    htar_listing(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_line_layout() {
        let line = ListingEntry::file("a.t00z.b.bufr_d", 42).to_line();
        assert!(line.starts_with("HTAR: -rw-r--r--  nwprod/prod "));
        assert!(line.ends_with("2020-01-02 03:41  ./a.t00z.b.bufr_d"));
    }

    #[test]
    fn test_cycle_listing_counts() {
        let listing = cycle_listing("gdas", 5);
        assert_eq!(listing.lines().filter(|l| l.contains("prepbufr")).count(), 5);
        assert!(listing.contains("gdas.t18z.prepbufr"));
        assert!(listing.contains("5 files"));
    }
}
