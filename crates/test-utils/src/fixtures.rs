//! Common test fixtures for inventory tests.
//!
//! Filenames and listings modelled on what the NCEP production archive
//! holds for GDAS and GFS observation tarballs.

/// Archive member filenames covering each data format.
pub mod filenames {
    /// Restricted-distribution PREPBUFR with the `.nr` marker.
    pub const PREPBUFR_NR: &str = "gdas.t00z.prepbufr.nr";

    pub const PREPBUFR: &str = "gdas.t12z.prepbufr";

    /// Raw BUFR dump with a `.tm00` time-offset suffix.
    pub const BUFR_D: &str = "gdas.t06z.1bamua.tm00.bufr_d";

    pub const BUFR_D_NR: &str = "gdas.t18z.sfcshp.tm00.bufr_d.nr";

    pub const GRB: &str = "gdas.t00z.sstgrb.grb";

    pub const GRIB2: &str = "gfs.t12z.sstgrb.grib2";

    /// Older grib2 products named by their grid resolution.
    pub const LEGACY_GRIB2: &str = "gdas.t00z.snogrb_t1534.1536";

    /// Member with no recognizable format.
    pub const TEXT: &str = "gdas.t00z.syndata.tcvitals.tm00";

    /// A bare name with no dots.
    pub const BARE: &str = "README";
}

/// Archive paths and templates.
pub mod paths {
    pub const GDAS_TEMPLATE: &str =
        "/NCEPPROD/hpssprod/runhistory/rh%Y/%Y%m/%Y%m%d/com_gfs_prod_gdas.%Y%m%d_00.gdas.tar";

    pub const GDAS_2020_01_01: &str =
        "/NCEPPROD/hpssprod/runhistory/rh2020/202001/20200101/com_gfs_prod_gdas.20200101_00.gdas.tar";

    pub const SIMPLE_TEMPLATE: &str = "/rh%Y/%Y%m%d/obs.%Y%m%d.tar";
}

/// Raw `htar` output.
pub mod listings {
    /// Output of a successful `htar -tvf` with three members.
    pub const GDAS_THREE_FILES: &str = "\
HTAR: -rw-r--r--  nwprod/rstprod   104857600 2020-01-02 03:41  ./gdas.20200101/00/gdas.t00z.prepbufr.nr
HTAR: -rw-r--r--  nwprod/prod        2048000 2020-01-02 03:42  ./gdas.20200101/00/gdas.t00z.1bamua.tm00.bufr_d
HTAR: -rw-r--r--  nwprod/prod          51200 2020-01-02 03:43  ./gdas.20200101/00/gdas.t00z.sstgrb.grib2
HTAR: Listing complete for /NCEPPROD/gdas.tar, 3 files 3 total objects
HTAR: HTAR SUCCESSFUL
";

    /// A listing with a directory entry, which is not an inventory member.
    pub const WITH_DIRECTORY: &str = "\
HTAR: drwxr-xr-x  nwprod/prod              0 2020-01-02 03:40  ./gdas.20200101/00/
HTAR: -rw-r--r--  nwprod/prod          51200 2020-01-02 03:43  ./gdas.20200101/00/gdas.t00z.sstgrb.grb
HTAR: HTAR SUCCESSFUL
";

    /// One entry with a non-numeric size among valid ones.
    pub const ONE_MALFORMED: &str = "\
HTAR: -rw-r--r--  nwprod/prod   1024 2020-01-02 03:41  ./gdas.t00z.prepbufr
HTAR: -rw-r--r--  nwprod/prod   lots 2020-01-02 03:41  ./gdas.t06z.prepbufr
HTAR: -rw-r--r--  nwprod/prod   2048 2020-01-02 03:42  ./gdas.t12z.prepbufr
HTAR: HTAR SUCCESSFUL
";

    /// stderr from `htar` when the tarball does not exist.
    pub const MISSING_TARBALL_STDERR: &str =
        "HTAR: HTAR FAILED\n###WARNING  htar returned non-zero exit status.\n";
}
