//! The record-stream decoder shared by every InterOp metric file.
//!
//! Every file starts with a version byte and (for most formats) a record-size
//! field, optionally followed by format-specific layout values such as channel
//! counts or grid sizes. After that the file is a plain run of records with
//! no count field: decoding stops when the input runs out. Running out exactly
//! at a record boundary is the normal end of a file; running out inside a
//! record is a [`InteropError::TruncatedRecord`].

use std::{
    fmt::Debug,
    fs::File,
    io::{BufRead, BufReader, ErrorKind, Read},
    path::Path,
};

use log::{debug, warn};

use crate::codec::{read_header, FileHeader, RecordSizeWidth};
use crate::error::{DecodeFailure, InteropError, Result};
use crate::geometry::{LaneTileKey, LaneTileSet};

/// One InterOp file family: its name, accepted versions, header shape and
/// record layout.
pub trait MetricFormat: Debug {
    /// One decoded record
    type Record: Debug + Clone + Send + Sync;
    /// Values read once after the header and needed to decode each record
    type Layout: Debug + Clone + Send + Sync;

    /// Human-readable family name, used in errors and logs
    const NAME: &'static str;
    /// Versions this layout table can decode
    const VERSIONS: &'static [u8];
    /// Width of the record-size field after the version byte
    const RECORD_SIZE: RecordSizeWidth;

    /// Reads whatever the format stores between the header and the first record
    fn read_layout<R: Read>(header: &FileHeader, rdr: &mut R) -> Result<Self::Layout>;

    /// Reads one record. An `UnexpectedEof` from here means the record was cut short.
    fn read_record<R: Read>(
        header: &FileHeader,
        layout: &Self::Layout,
        rdr: &mut R,
    ) -> std::io::Result<Self::Record>;
}

/// Everything decoded from one metrics file
#[derive(Debug, Clone)]
pub struct MetricsFile<F: MetricFormat> {
    pub header: FileHeader,
    pub layout: F::Layout,
    pub records: Vec<F::Record>,
}

impl<F: MetricFormat> MetricsFile<F> {
    /// Decode a metrics file from any byte source positioned at its first byte
    pub fn decode<R: Read>(rdr: R) -> std::result::Result<Self, DecodeFailure<F>> {
        let mut rdr = BufReader::new(rdr);

        let header = read_header(&mut rdr, F::RECORD_SIZE)?;
        if !F::VERSIONS.contains(&header.version) {
            return Err(InteropError::UnsupportedVersion {
                format: F::NAME,
                version: header.version,
            }
            .into());
        }

        let layout = F::read_layout(&header, &mut rdr)?;

        let mut records = Vec::new();
        loop {
            // an empty buffer here is a clean end of stream
            if rdr.fill_buf()?.is_empty() {
                break;
            }

            match F::read_record(&header, &layout, &mut rdr) {
                Ok(record) => records.push(record),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    warn!(
                        "{} stream ends inside a record after {} records",
                        F::NAME,
                        records.len()
                    );
                    let error = InteropError::TruncatedRecord {
                        format: F::NAME,
                        records: records.len(),
                    };
                    return Err(DecodeFailure {
                        error,
                        partial: Some(MetricsFile {
                            header,
                            layout,
                            records,
                        }),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            "decoded {} {} records (version {})",
            records.len(),
            F::NAME,
            header.version
        );

        Ok(MetricsFile {
            header,
            layout,
            records,
        })
    }

    /// Open and decode the file at `path`
    pub fn from_path(path: &Path) -> std::result::Result<Self, DecodeFailure<F>> {
        let rdr = File::open(path)?;
        debug!("decoding {} from {}", F::NAME, path.display());
        MetricsFile::decode(rdr)
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<F: MetricFormat> MetricsFile<F>
where
    F::Record: LaneTileKey,
{
    /// A copy of this file keeping only records whose (lane, tile) is allowed
    pub fn filter_by_lane_tile(&self, allow: &LaneTileSet) -> Self {
        MetricsFile {
            header: self.header,
            layout: self.layout.clone(),
            records: crate::geometry::filter_by_lane_tile(&self.records, allow),
        }
    }
}

/// The version byte of a stream without consuming it, `None` if it is empty.
///
/// Families whose record layout changed shape between versions use this to
/// pick a format before decoding.
pub fn peek_version<R: BufRead>(rdr: &mut R) -> std::io::Result<Option<u8>> {
    Ok(rdr.fill_buf()?.first().cloned())
}

/// Decode two independent files at once and wait for both.
///
/// The first failure (in argument order) is returned only after both decodes
/// have finished.
pub fn decode_pair<A, B>(a: &Path, b: &Path) -> Result<(MetricsFile<A>, MetricsFile<B>)>
where
    A: MetricFormat,
    B: MetricFormat,
{
    let (a, b) = rayon::join(
        || MetricsFile::<A>::from_path(a).map_err(InteropError::from),
        || MetricsFile::<B>::from_path(b).map_err(InteropError::from),
    );

    Ok((a?, b?))
}
